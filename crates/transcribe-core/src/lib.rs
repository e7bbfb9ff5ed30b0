//! Transcribe Core - shared library for the live transcription session service.
//!
//! This crate drives one WebSocket connection per lecture session: it
//! normalizes incoming microphone audio, forwards it over a renewing gRPC
//! stream to an ASR provider, classifies the provider's responses into
//! interim/final transcription events, and fans the results out to both the
//! connected client and an HTTP backend callback.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`api`]: HTTP/WebSocket layer - router construction, server startup
//! - [`session`]: Per-connection state machine, control protocol, capacity registry
//! - [`asr`]: gRPC ASR provider client and the renewing stream driver
//! - [`audio`]: Audio frame normalization and backpressure queue
//! - [`result_handler`]: Interim/final classification, dedup, slide matching
//! - [`sink`]: Backend callback publication for final transcripts
//! - [`slide`]: Slide-matching abstraction for aligning transcripts to slides
//! - [`events`]: Event system for real-time client communication
//! - [`state`]: Application configuration, loaded fail-fast from the environment
//! - [`bootstrap`]: Composition root wiring all services together
//! - [`error`]: Centralized error types
//!
//! # Abstraction Traits
//!
//! The crate defines traits at each external seam so the core logic can be
//! tested without a live ASR provider or backend:
//!
//! - [`asr::AsrProvider`]: Opening provider streams
//! - [`sink::Sink`]: Publishing final transcripts to the backend
//! - [`slide::SlideMatcher`]: Aligning a transcript to a presentation slide
//! - [`events::EventEmitter`]: Emitting session events to a connected client

#![warn(clippy::all)]

pub mod api;
pub mod asr;
pub mod audio;
pub mod bootstrap;
pub mod error;
pub mod events;
pub mod protocol_constants;
pub mod result_handler;
pub mod session;
pub mod sink;
pub mod slide;
pub mod state;
pub mod utils;

pub use api::{start_server, AppState, AppStateBuilder, ServerError};
pub use asr::{AsrProvider, AsrStreamDriver, DriverExit, DriverStats, GrpcAsrProvider, StreamConfig};
pub use bootstrap::{bootstrap_services, BootstrappedServices};
pub use error::{ErrorCode, SessionError, SessionResult, Severity};
pub use events::{EventEmitter, SessionEvent, SessionEventBridge};
pub use result_handler::{ResultHandler, SessionIdentity, TranscriptionResult};
pub use session::{ControlMessage, SessionHandle, SessionRegistry, SessionState, StartRequest};
pub use sink::{HttpSink, NullSink, Sink};
pub use slide::{KeywordSlideMatcher, NoSlideMatcher, SlideMatcher};
pub use state::{Config, ConfigError};
