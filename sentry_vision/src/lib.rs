// THEORY:
// This file is the main entry point for the `sentry_vision` library crate.
// It exposes the `TrackingPipeline` and the message types shared with the
// network layer (`protocol`) as the public API consumed by the server and the
// capture binary.
//
// The pipeline runs entirely on the caller's thread and never touches a
// socket. Everything that crosses into the network context does so through
// the `CommandSink` trait, so the vision cadence can be tested, and run,
// without a live server.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod pipeline;
pub mod protocol;

pub use config::VisionConfig;
pub use core_modules::dispatcher::CommandSink;
pub use core_modules::frame::Frame;
pub use error::{ConfigError, FrameError, HandoffError, ProtocolError};
pub use pipeline::{CycleReport, TrackingPipeline};
