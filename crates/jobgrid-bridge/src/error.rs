//! Scheduler bridge error types.

use thiserror::Error;

/// Errors from scheduler command invocations.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("scheduler command `{command}` failed (exit {code:?}): {stderr}")]
    Command {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse {what}: {detail}")]
    Parse { what: &'static str, detail: String },

    #[error("no external scheduler configured")]
    Unsupported,
}

pub type BridgeResult<T> = Result<T, BridgeError>;
