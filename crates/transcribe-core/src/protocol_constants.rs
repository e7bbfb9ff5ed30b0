//! Fixed protocol constants that should NOT be changed.
//!
//! These values are defined by the session protocol and the ASR provider's
//! contract; changing them would break renewal timing, backpressure budgets,
//! or the wire format clients already depend on.

use std::time::Duration;

// ─────────────────────────────────────────────────────────────────────────────
// Audio Frame Sizing
// ─────────────────────────────────────────────────────────────────────────────

/// Minimum canonical frame size in bytes (100 ms of PCM16@16kHz mono).
pub const MIN_FRAME_BYTES: usize = 3200;

/// Maximum canonical frame size in bytes (300 ms of PCM16@16kHz mono).
pub const MAX_FRAME_BYTES: usize = 9600;

/// Sample rate the provider and the wire format are fixed to.
pub const SAMPLE_RATE_HZ: u32 = 16_000;

/// Bits per sample, PCM16.
pub const BITS_PER_SAMPLE: u16 = 16;

/// Mono audio only.
pub const CHANNELS: u16 = 1;

// ─────────────────────────────────────────────────────────────────────────────
// Audio Queue
// ─────────────────────────────────────────────────────────────────────────────

/// Capacity of the bounded Audio Queue, in frames (~6.4 s at MIN_FRAME_BYTES).
pub const AUDIO_QUEUE_CAPACITY: usize = 64;

/// Maximum time a producer suspends on a full queue before failing the
/// session with `kBackpressure`.
pub const PRODUCER_BLOCK: Duration = Duration::from_millis(200);

// ─────────────────────────────────────────────────────────────────────────────
// ASR Stream Driver
// ─────────────────────────────────────────────────────────────────────────────

/// Age at which the driver begins renewing the current epoch.
pub const EPOCH_SOFT_LIMIT: Duration = Duration::from_secs(270);

/// Absolute age at which the provider itself terminates the stream. Once
/// the soft limit has passed, the time left until this deadline bounds how
/// long a renewal may take before the session is failed.
pub const EPOCH_HARD_LIMIT: Duration = Duration::from_secs(300);

/// Maximum time since the last non-empty frame before the session is stopped
/// with `kIdleTimeout`.
pub const SILENCE_LIMIT: Duration = Duration::from_secs(60);

/// Window within which a second consecutive provider transport failure is
/// treated as `kProviderUnavailable` rather than retried again.
pub const PROVIDER_RETRY_WINDOW: Duration = Duration::from_secs(10);

// ─────────────────────────────────────────────────────────────────────────────
// Result Handler
// ─────────────────────────────────────────────────────────────────────────────

/// Minimum edit distance between successive interim texts to republish before
/// the rate-limit window elapses.
pub const INTERIM_MATERIAL_EDIT_DISTANCE: usize = 3;

/// Minimum time between interim publishes when the text hasn't changed
/// materially.
pub const INTERIM_PUBLISH_INTERVAL: Duration = Duration::from_millis(150);

/// Hard deadline for a slide-match lookup; a timeout yields an unannotated
/// final rather than blocking the receiver loop.
pub const SLIDE_MATCH_DEADLINE: Duration = Duration::from_millis(50);

/// Minimum match score for a Slide Match to be attached to a final.
pub const SLIDE_MATCH_MIN_SCORE: f32 = 0.35;

/// Sink HTTP callback timeout, per attempt.
pub const SINK_TIMEOUT: Duration = Duration::from_secs(3);

/// Sink callback is attempted once, then retried once on failure, then
/// dropped with a logged warning.
pub const SINK_MAX_ATTEMPTS: u32 = 2;

// ─────────────────────────────────────────────────────────────────────────────
// Session Manager / Cancellation
// ─────────────────────────────────────────────────────────────────────────────

/// Time the receiver loop is given to flush pending finals after cancellation
/// before the epoch is forcibly aborted.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Default WebSocket control defaults.
pub const DEFAULT_LANGUAGE_CODE: &str = "ja-JP";
pub const DEFAULT_MODEL: &str = "latest_long";

/// Default maximum concurrent sessions; see `SESSION_MAX` env var.
pub const DEFAULT_SESSION_MAX: usize = 128;

/// Default Sink HTTP callback timeout override (seconds), see
/// `BACKEND_CALLBACK_TIMEOUT`.
pub const DEFAULT_BACKEND_CALLBACK_TIMEOUT_SECS: u64 = 5;

// ─────────────────────────────────────────────────────────────────────────────
// Application Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Application name used in logging spans and User-Agent headers.
pub const APP_NAME: &str = "transcribe-server";
