use std::fmt;
use std::io;

use ashlink_host::{DisconnectReason, HostError, HostFault};
use ashlink_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const LINK_DOWN: i32 = 20;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Io(source) => io_error(context, source),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn host_error(context: &str, err: HostError) -> CliError {
    match err {
        HostError::Transport(err) => transport_error(context, err),
        HostError::DataTooShort { .. } | HostError::DataTooLong { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        HostError::InvalidConfig(_) | HostError::UnknownPreset { .. } => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        HostError::Disconnected(DisconnectReason::Host(HostFault::Timeouts)) => {
            CliError::new(TIMEOUT, format!("{context}: {err}"))
        }
        HostError::Disconnected(DisconnectReason::Host(HostFault::Serial)) => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
        HostError::Disconnected(_) | HostError::NotConnected => {
            CliError::new(LINK_DOWN, format!("{context}: {err}"))
        }
        HostError::NoTxSpace => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}
