//! Error types for the broadcast server

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to build network runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("Failed to spawn network thread: {0}")]
    Thread(#[source] std::io::Error),

    #[error("Network thread exited before the server was listening")]
    Startup,

    #[error("Network thread panicked")]
    Panicked,
}
