//! rewind - record-and-replay API testing engine.
//!
//! This library re-executes previously captured HTTP interactions against a
//! user application while the interception layer serves previously captured
//! outbound dependency responses (mocks), then compares live responses to
//! recorded ones under configurable noise tolerance.
//!
//! The core entry point is [`replay::Replayer`]. Collaborators (the
//! instrumentation backend, the stores, the request emulator and the
//! telemetry sink) are injected through the traits in [`service`].

#![forbid(unsafe_code)]
#![allow(
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]

pub mod config;
pub mod emulator;
pub mod error;
pub mod http;
pub mod models;
pub mod noise;
pub mod normalize;
pub mod replay;
pub mod report;
pub mod scope;
pub mod script;
pub mod service;
pub mod storage;
pub mod telemetry;
pub mod urlrewrite;

pub use error::{Error, Result};
pub use replay::Replayer;
