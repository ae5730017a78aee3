//! Error types for the engine binary.
//!
//! [`EngineError`] wraps every failure that can end the process. Domain
//! failures never reach it; those are `error` responses on stdout.

/// Top-level error for the engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: causim_core::config::ConfigError,
    },

    /// The session actor stopped accepting messages.
    #[error("runner error: {source}")]
    Runner {
        /// The underlying runner error.
        #[from]
        source: causim_core::RunnerError,
    },

    /// Reading stdin or writing stdout failed.
    #[error("I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// A response could not be encoded as JSON.
    #[error("encode error: {source}")]
    Encode {
        /// The underlying serialization error.
        #[from]
        source: serde_json::Error,
    },

    /// A spawned task panicked or was cancelled.
    #[error("task error: {source}")]
    Join {
        /// The underlying join error.
        #[from]
        source: tokio::task::JoinError,
    },
}
