//! The ASR stream driver: the renewal protocol between a session's audio
//! queue and its underlying provider stream.

mod driver;
mod epoch;
mod grpc_provider;
mod provider;

pub use driver::{AsrStreamDriver, DriverExit, DriverStats};
pub use epoch::{Epoch, EpochEvent, EpochOutcome};
pub use grpc_provider::GrpcAsrProvider;
pub use provider::{AsrProvider, AsrSink, AsrSource, ProviderEvent, StreamConfig, WordTiming};
