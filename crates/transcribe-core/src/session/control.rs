//! Control-plane message parsing for `/ws/transcribe` text frames.

use serde::Deserialize;
use uuid::Uuid;

use crate::error::SessionError;
use crate::protocol_constants::{DEFAULT_LANGUAGE_CODE, DEFAULT_MODEL};

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum RawControlMessage {
    Start {
        session_id: Option<String>,
        presentation_id: Option<String>,
        lecture_id: Option<i64>,
        language_code: Option<String>,
        model: Option<String>,
        enable_interim_results: Option<bool>,
    },
    Stop,
}

/// A validated `start` request.
#[derive(Debug, Clone)]
pub struct StartRequest {
    pub session_id: String,
    pub presentation_id: String,
    pub lecture_id: i64,
    pub language_code: String,
    pub model: String,
    pub enable_interim_results: bool,
}

/// A parsed control message, ready for the session state machine.
#[derive(Debug, Clone)]
pub enum ControlMessage {
    Start(StartRequest),
    Stop,
}

/// Parses one text frame as a control message, dispatching on `action`.
pub fn parse_control_message(text: &str) -> Result<ControlMessage, SessionError> {
    let raw: RawControlMessage = serde_json::from_str(text)
        .map_err(|e| SessionError::BadRequest(format!("invalid control message: {e}")))?;

    match raw {
        RawControlMessage::Start {
            session_id,
            presentation_id,
            lecture_id,
            language_code,
            model,
            enable_interim_results,
        } => {
            let lecture_id = lecture_id
                .ok_or_else(|| SessionError::BadRequest("lecture_id is required".into()))?;
            let session_id = session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
            let presentation_id = presentation_id.unwrap_or_else(|| session_id.clone());

            Ok(ControlMessage::Start(StartRequest {
                session_id,
                presentation_id,
                lecture_id,
                language_code: language_code.unwrap_or_else(|| DEFAULT_LANGUAGE_CODE.to_string()),
                model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
                enable_interim_results: enable_interim_results.unwrap_or(true),
            }))
        }
        RawControlMessage::Stop => Ok(ControlMessage::Stop),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_without_optional_fields_uses_defaults() {
        let msg = parse_control_message(r#"{"action":"start","lecture_id":7}"#).unwrap();
        let ControlMessage::Start(req) = msg else {
            panic!("expected start");
        };
        assert_eq!(req.lecture_id, 7);
        assert_eq!(req.language_code, "ja-JP");
        assert_eq!(req.model, "latest_long");
        assert!(req.enable_interim_results);
        assert_eq!(req.presentation_id, req.session_id);
    }

    #[test]
    fn start_without_lecture_id_is_bad_request() {
        let err = parse_control_message(r#"{"action":"start"}"#).unwrap_err();
        assert!(matches!(err, SessionError::BadRequest(_)));
    }

    #[test]
    fn stop_parses_with_no_fields() {
        let msg = parse_control_message(r#"{"action":"stop"}"#).unwrap();
        assert!(matches!(msg, ControlMessage::Stop));
    }

    #[test]
    fn unknown_action_is_bad_request() {
        let err = parse_control_message(r#"{"action":"pause"}"#).unwrap_err();
        assert!(matches!(err, SessionError::BadRequest(_)));
    }

    #[test]
    fn malformed_json_is_bad_request() {
        let err = parse_control_message("not json").unwrap_err();
        assert!(matches!(err, SessionError::BadRequest(_)));
    }
}
