//! Session configuration and the built-in presets.

use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;

use ashlink_transport::{FlowControl, StreamPort};
use serde::{Deserialize, Serialize};

use crate::error::{HostError, Result};

/// Largest number of unacknowledged DATA frames the 3-bit sequence allows.
pub const MAX_WINDOW_SIZE: u8 = 7;

/// How the host resets the NCP before connecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResetMethod {
    /// Send a RST frame.
    Rst,
    /// Pulse the DTR line through a [`crate::ResetHook`].
    Dtr,
    /// Run an application-defined [`crate::ResetHook`].
    Custom,
    /// Do nothing; the NCP resets on its own.
    None,
}

impl ResetMethod {
    pub const ALL: [ResetMethod; 4] = [Self::Rst, Self::Dtr, Self::Custom, Self::None];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rst => "rst",
            Self::Dtr => "dtr",
            Self::Custom => "custom",
            Self::None => "none",
        }
    }
}

impl fmt::Display for ResetMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResetMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown reset method '{s}' (expected rst, dtr, custom or none)"))
    }
}

/// NCP hardware family; decides the reset reason expected after a line reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NcpType {
    Em2xx,
    Avr,
}

impl NcpType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Em2xx => "em2xx",
            Self::Avr => "avr",
        }
    }
}

impl fmt::Display for NcpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NcpType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "em2xx" => Ok(Self::Em2xx),
            "avr" => Ok(Self::Avr),
            _ => Err(format!("unknown NCP type '{s}' (expected em2xx or avr)")),
        }
    }
}

/// Host configuration. Fixed for the lifetime of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Serial device name.
    pub serial_port: String,
    pub baud_rate: u32,
    pub stop_bits: u8,
    /// RTS/CTS when true, XON/XOFF otherwise.
    pub rts_cts: bool,
    /// Bytes buffered before a serial write.
    pub out_block_len: usize,
    /// Bytes read from the serial device at a time.
    pub in_block_len: usize,
    /// Bitmask of trace categories; any non-zero value enables frame logging.
    pub trace_flags: u8,
    /// Maximum unacknowledged DATA frames (1..=7).
    pub window_size: u8,
    /// XOR DATA fields with the pseudo-random sequence.
    pub randomize: bool,
    pub ack_time_init_ms: u64,
    pub ack_time_min_ms: u64,
    pub ack_time_max_ms: u64,
    /// Time allowed for the NCP to answer a reset.
    pub reset_time_ms: u64,
    /// Free receive buffers below which the host reports not-ready.
    pub nr_low_limit: usize,
    /// Free receive buffers above which the host reports ready again.
    pub nr_high_limit: usize,
    /// Interval at which a not-ready ACK is repeated.
    pub nr_time_ms: u64,
    pub reset_method: ResetMethod,
    pub ncp_type: NcpType,
    /// Consecutive ACK timeouts tolerated before giving up.
    pub max_timeouts: u8,
    /// Transmit buffers shared by pending and unacknowledged frames.
    pub tx_buffers: usize,
    /// Receive buffers shared by frames in assembly and the ready queue.
    pub rx_buffers: usize,
}

/// Names of the built-in presets, by index.
pub const PRESETS: [&str; 3] = [
    "em2xx-115200-rtscts",
    "em2xx-57600-xonxoff",
    "avr-38400-xonxoff",
];

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            serial_port: "/dev/ttyS0".to_string(),
            baud_rate: 115_200,
            stop_bits: 1,
            rts_cts: true,
            out_block_len: 256,
            in_block_len: 256,
            trace_flags: 0,
            window_size: 3,
            randomize: true,
            ack_time_init_ms: 800,
            ack_time_min_ms: 400,
            ack_time_max_ms: 2400,
            reset_time_ms: 2500,
            nr_low_limit: 8,
            nr_high_limit: 12,
            nr_time_ms: 480,
            reset_method: ResetMethod::Rst,
            ncp_type: NcpType::Em2xx,
            max_timeouts: 4,
            tx_buffers: 10,
            rx_buffers: 20,
        }
    }
}

impl HostConfig {
    /// Build one of the built-in presets.
    pub fn preset(index: usize) -> Result<Self> {
        let base = Self::default();
        match index {
            0 => Ok(base),
            1 => Ok(Self {
                baud_rate: 57_600,
                rts_cts: false,
                ..base
            }),
            2 => Ok(Self {
                baud_rate: 38_400,
                rts_cts: false,
                ack_time_init_ms: 1000,
                ack_time_min_ms: 500,
                ack_time_max_ms: 2800,
                reset_time_ms: 1500,
                ncp_type: NcpType::Avr,
                ..base
            }),
            _ => Err(HostError::UnknownPreset {
                index,
                count: PRESETS.len(),
            }),
        }
    }

    pub fn flow_control(&self) -> FlowControl {
        if self.rts_cts {
            FlowControl::Hardware
        } else {
            FlowControl::Software
        }
    }

    /// Wrap an opened serial device with this configuration's flow control
    /// and block sizes.
    pub fn stream_port<T: Read + Write>(&self, device: T) -> StreamPort<T> {
        StreamPort::with_blocks(
            device,
            self.flow_control(),
            self.out_block_len,
            self.in_block_len,
        )
    }

    /// Check every field against its allowed range.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(HostError::InvalidConfig(msg));

        if !(1..=MAX_WINDOW_SIZE).contains(&self.window_size) {
            return invalid(format!(
                "window_size must be 1..={MAX_WINDOW_SIZE}, got {}",
                self.window_size
            ));
        }
        if self.ack_time_min_ms == 0 {
            return invalid("ack_time_min_ms must be positive".into());
        }
        if !(self.ack_time_min_ms..=self.ack_time_max_ms).contains(&self.ack_time_init_ms) {
            return invalid(format!(
                "ack_time_init_ms {} outside [{}, {}]",
                self.ack_time_init_ms, self.ack_time_min_ms, self.ack_time_max_ms
            ));
        }
        if self.reset_time_ms == 0 {
            return invalid("reset_time_ms must be positive".into());
        }
        if self.nr_low_limit > self.nr_high_limit {
            return invalid(format!(
                "nr_low_limit {} exceeds nr_high_limit {}",
                self.nr_low_limit, self.nr_high_limit
            ));
        }
        if self.nr_high_limit >= self.rx_buffers {
            return invalid(format!(
                "nr_high_limit {} must be below rx_buffers {}",
                self.nr_high_limit, self.rx_buffers
            ));
        }
        if self.tx_buffers == 0 {
            return invalid("tx_buffers must be positive".into());
        }
        if self.max_timeouts == 0 {
            return invalid("max_timeouts must be positive".into());
        }
        if self.baud_rate == 0 {
            return invalid("baud_rate must be positive".into());
        }
        if !(1..=2).contains(&self.stop_bits) {
            return invalid(format!("stop_bits must be 1 or 2, got {}", self.stop_bits));
        }
        if self.in_block_len == 0 || self.out_block_len == 0 {
            return invalid("serial block lengths must be positive".into());
        }
        Ok(())
    }
}
