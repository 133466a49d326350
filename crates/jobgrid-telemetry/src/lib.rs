//! jobgrid-telemetry — host resource sampling for admission control.
//!
//! `ResourceTelemetry` samples CPU, memory and the primary volume on a
//! fixed interval and publishes each reading through a `watch` channel.
//! Readers hold a `TelemetryHandle` and always see the latest completed
//! sample without taking a lock on the sampler.
//!
//! # Degraded start
//!
//! Until the first sample completes, readers see an all-zero
//! `ResourceSnapshot`. `run` takes its first sample immediately to keep
//! that window short.

pub mod sampler;

pub use sampler::{ResourceTelemetry, TelemetryHandle};
