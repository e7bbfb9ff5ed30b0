//! Optional matching of a final transcription against a loaded slide index.

use async_trait::async_trait;

/// A candidate match between a final's text and one slide in the active
/// presentation.
#[derive(Debug, Clone, PartialEq)]
pub struct SlideMatch {
    pub slide_id: u32,
    pub score: f32,
    pub confidence: f32,
    pub matched_keywords: Vec<String>,
}

/// Looks up the best slide for a piece of final transcript text. The result
/// handler owns the `SLIDE_MATCH_DEADLINE` timeout; this trait only
/// describes the lookup itself.
#[async_trait]
pub trait SlideMatcher: Send + Sync {
    async fn find_match(&self, text: &str) -> Option<SlideMatch>;
}

/// Matcher used when a session has no presentation loaded.
pub struct NoSlideMatcher;

#[async_trait]
impl SlideMatcher for NoSlideMatcher {
    async fn find_match(&self, _text: &str) -> Option<SlideMatch> {
        None
    }
}

/// Keyword-overlap matcher: each slide carries a bag of keywords, and the
/// score is the fraction of a slide's keywords found in the final text.
/// Production presentations load their keyword bags at session start from
/// the backend; this matcher takes them directly for testability.
pub struct KeywordSlideMatcher {
    slides: Vec<(u32, Vec<String>)>,
}

impl KeywordSlideMatcher {
    #[must_use]
    pub fn new(slides: Vec<(u32, Vec<String>)>) -> Self {
        Self { slides }
    }
}

#[async_trait]
impl SlideMatcher for KeywordSlideMatcher {
    async fn find_match(&self, text: &str) -> Option<SlideMatch> {
        let lowered = text.to_lowercase();
        let mut best: Option<SlideMatch> = None;

        for (slide_id, keywords) in &self.slides {
            if keywords.is_empty() {
                continue;
            }
            let matched: Vec<String> = keywords
                .iter()
                .filter(|kw| lowered.contains(&kw.to_lowercase()))
                .cloned()
                .collect();
            if matched.is_empty() {
                continue;
            }
            let score = matched.len() as f32 / keywords.len() as f32;
            let confidence = score;
            let is_better = best.as_ref().is_none_or(|b| score > b.score);
            if is_better {
                best = Some(SlideMatch {
                    slide_id: *slide_id,
                    score,
                    confidence,
                    matched_keywords: matched,
                });
            }
        }

        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_slide_matcher_always_returns_none() {
        let matcher = NoSlideMatcher;
        assert!(matcher.find_match("anything").await.is_none());
    }

    #[tokio::test]
    async fn keyword_matcher_picks_highest_scoring_slide() {
        let matcher = KeywordSlideMatcher::new(vec![
            (1, vec!["gradient".into(), "descent".into()]),
            (2, vec!["gradient".into()]),
        ]);
        let result = matcher
            .find_match("today we cover gradient descent in detail")
            .await
            .unwrap();
        assert_eq!(result.slide_id, 1);
        assert!((result.score - 1.0).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn keyword_matcher_returns_none_without_overlap() {
        let matcher = KeywordSlideMatcher::new(vec![(1, vec!["quantum".into()])]);
        assert!(matcher.find_match("baking bread at home").await.is_none());
    }
}
