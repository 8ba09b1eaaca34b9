use thiserror::Error;

/// Fatal failures surfaced by the pty and fanout layers.
///
/// Policy-level outcomes (a missing override entry, an unavailable
/// credential) are not errors: they fall through the decision precedence
/// instead, so a connection always degrades toward the client's own
/// interactive authentication.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to start client: {0}")]
    ProcessStart(String),

    #[error("{0}")]
    Environment(String),

    #[error("multiplexer control: {0}")]
    Control(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
