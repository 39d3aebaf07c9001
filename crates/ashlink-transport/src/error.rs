/// Errors that can occur in serial transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// An I/O error occurred on the underlying stream.
    #[error("serial I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A byte was written while the output buffer had no room left.
    #[error("output buffer full")]
    OutputFull,

    /// The peer used a flow-control protocol the port was not configured for.
    #[error("flow control violation: {0}")]
    FlowControl(&'static str),

    /// The port has been closed by the other side.
    #[error("port closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, TransportError>;
