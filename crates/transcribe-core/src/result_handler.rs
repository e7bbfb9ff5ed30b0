//! Turns provider events into published transcription results, with interim
//! rate-limiting, final dedup and slide matching.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::asr::{EpochEvent, EpochOutcome, ProviderEvent, WordTiming};
use crate::events::{EventEmitter, SessionEvent};
use crate::protocol_constants::{
    INTERIM_MATERIAL_EDIT_DISTANCE, INTERIM_PUBLISH_INTERVAL, SLIDE_MATCH_DEADLINE,
    SLIDE_MATCH_MIN_SCORE,
};
use crate::sink::{Sink, SinkRecord};
use crate::slide::SlideMatcher;
use crate::utils::{edit_distance, now_millis};

/// One word's timing, as published to the client.
#[derive(Debug, Clone, Serialize)]
pub struct PublishedWord {
    pub word: String,
    pub start_secs: f64,
    pub end_secs: f64,
}

impl From<WordTiming> for PublishedWord {
    fn from(w: WordTiming) -> Self {
        Self {
            word: w.word,
            start_secs: w.start_secs,
            end_secs: w.end_secs,
        }
    }
}

/// Slide annotation attached to a final, the `slide` field on the wire.
#[derive(Debug, Clone, Serialize)]
pub struct PublishedSlideMatch {
    pub slide_id: u32,
    pub score: f32,
    pub confidence: f32,
    pub matched_keywords: Vec<String>,
}

/// A published transcription result, matching the `transcription` event's
/// `result` payload.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptionResult {
    pub session_id: String,
    pub presentation_id: String,
    pub text: String,
    pub is_final: bool,
    pub confidence: f32,
    pub timestamp: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub words: Vec<PublishedWord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slide: Option<PublishedSlideMatch>,
}

/// Dedup state scoped to one epoch; reset whenever an event arrives from a
/// newer epoch, since provider result ids are only unique within one stream.
struct EpochState {
    epoch_index: u64,
    seen_finals: HashSet<String>,
}

impl EpochState {
    fn new(epoch_index: u64) -> Self {
        Self {
            epoch_index,
            seen_finals: HashSet::new(),
        }
    }
}

/// Identity and stream configuration carried on every result published for
/// this session.
#[derive(Debug, Clone)]
pub struct SessionIdentity {
    pub session_id: String,
    pub lecture_id: i64,
    pub presentation_id: String,
    pub language_code: String,
    pub model: String,
}

pub struct ResultHandler {
    identity: SessionIdentity,
    emitter: Arc<dyn EventEmitter>,
    sink: Arc<dyn Sink>,
    matcher: Arc<dyn SlideMatcher>,
    /// Shared with the session manager: whichever side observes the session
    /// start condition first (the driver's first commit, or a stop with no
    /// audio at all) emits `session_started`.
    started: Arc<AtomicBool>,
    epoch: EpochState,
    last_interim_text: String,
    last_interim_publish_at: Option<Instant>,
}

impl ResultHandler {
    pub fn new(
        identity: SessionIdentity,
        emitter: Arc<dyn EventEmitter>,
        sink: Arc<dyn Sink>,
        matcher: Arc<dyn SlideMatcher>,
        started: Arc<AtomicBool>,
    ) -> Self {
        Self {
            identity,
            emitter,
            sink,
            matcher,
            started,
            epoch: EpochState::new(0),
            last_interim_text: String::new(),
            last_interim_publish_at: None,
        }
    }

    /// Processes one tagged epoch event from the driver. `Eof`/`Error`
    /// outcomes are no-ops here; the driver and session manager own
    /// lifecycle decisions for those.
    pub async fn handle(&mut self, event: EpochEvent) {
        if event.epoch_index != self.epoch.epoch_index {
            self.epoch = EpochState::new(event.epoch_index);
        }

        let provider_event = match event.outcome {
            EpochOutcome::Event(provider_event) => provider_event,
            EpochOutcome::Committed => {
                self.announce_started();
                return;
            }
            EpochOutcome::Eof | EpochOutcome::Error(_) => return,
        };

        let ProviderEvent {
            result_id,
            text,
            is_final,
            confidence,
            words,
        } = provider_event;

        if is_final {
            self.handle_final(result_id, text, confidence, words).await;
        } else {
            self.handle_interim(text, confidence, words);
        }
    }

    /// Emits `session_started` exactly once per session. Arrives on the same
    /// ordered channel as results, so it always precedes the first
    /// `transcription` event.
    fn announce_started(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        self.emitter.emit(SessionEvent::SessionStarted {
            session_id: self.identity.session_id.clone(),
            presentation_id: self.identity.presentation_id.clone(),
            language_code: self.identity.language_code.clone(),
            model: self.identity.model.clone(),
        });
    }

    fn handle_interim(&mut self, text: String, confidence: f32, words: Vec<WordTiming>) {
        let materially_changed =
            edit_distance(&text, &self.last_interim_text) > INTERIM_MATERIAL_EDIT_DISTANCE;
        let interval_elapsed = self
            .last_interim_publish_at
            .is_none_or(|t| t.elapsed() >= INTERIM_PUBLISH_INTERVAL);

        if !materially_changed && !interval_elapsed {
            return;
        }

        self.last_interim_text = text.clone();
        self.last_interim_publish_at = Some(Instant::now());

        let result = self.build_result(text, false, confidence, words, None);
        self.emitter.emit(SessionEvent::Transcription { result });
    }

    async fn handle_final(
        &mut self,
        result_id: Option<String>,
        text: String,
        confidence: f32,
        words: Vec<WordTiming>,
    ) {
        // Provider result id when available, text hash otherwise. Keyed
        // within the current epoch only; `EpochState` resets on renewal.
        let dedup_key =
            result_id.unwrap_or_else(|| format!("h:{:x}", hash_text(&text)));
        if !self.epoch.seen_finals.insert(dedup_key) {
            return;
        }

        let slide = match tokio::time::timeout(SLIDE_MATCH_DEADLINE, self.matcher.find_match(&text))
            .await
        {
            Ok(Some(m)) if m.score >= SLIDE_MATCH_MIN_SCORE => Some(PublishedSlideMatch {
                slide_id: m.slide_id,
                score: m.score,
                confidence: m.confidence,
                matched_keywords: m.matched_keywords,
            }),
            Ok(_) => None,
            Err(_) => {
                tracing::warn!(session_id = %self.identity.session_id, "slide match deadline exceeded");
                None
            }
        };

        let result = self.build_result(text.clone(), true, confidence, words, slide.clone());

        self.emitter.emit(SessionEvent::Transcription {
            result: result.clone(),
        });

        self.sink
            .publish(SinkRecord {
                lecture_id: self.identity.lecture_id,
                session_id: self.identity.session_id.clone(),
                presentation_id: self.identity.presentation_id.clone(),
                text,
                confidence,
                timestamp: result.timestamp,
                is_final: true,
                slide_number: slide.as_ref().map(|s| s.slide_id),
                slide_score: slide.as_ref().map(|s| s.score),
                slide_confidence: slide.as_ref().map(|s| s.confidence),
                matched_keywords: slide.map(|s| s.matched_keywords),
            })
            .await;
    }

    fn build_result(
        &self,
        text: String,
        is_final: bool,
        confidence: f32,
        words: Vec<WordTiming>,
        slide: Option<PublishedSlideMatch>,
    ) -> TranscriptionResult {
        TranscriptionResult {
            session_id: self.identity.session_id.clone(),
            presentation_id: self.identity.presentation_id.clone(),
            text,
            is_final,
            confidence,
            timestamp: now_millis(),
            words: words.into_iter().map(PublishedWord::from).collect(),
            slide,
        }
    }
}

fn hash_text(text: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}
