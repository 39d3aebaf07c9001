mod common;

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read, Write};
use std::rc::Rc;

use ashlink_frame::{encode_frame, FrameHeader, Seq, ASH_VERSION, CAN, FLAG, SUB};
use ashlink_host::{
    reset_reason, ConnectionState, DisconnectReason, Host, HostConfig, HostError, HostFault,
    ManualClock, SimulatedNcp,
};
use ashlink_transport::XOFF;
use bytes::BytesMut;

use common::{connected, pump, SimHost};

fn naks_sent(host: &SimHost) -> usize {
    host.port()
        .host_frames()
        .iter()
        .filter(|f| matches!(f.header, FrameHeader::Nak { .. }))
        .count()
}

#[test]
fn comm_error_inside_data_frame_is_naked() {
    let (mut host, _clock) = connected(HostConfig::default(), SimulatedNcp::new(true));

    // Enough bytes for the frame to move into a pool buffer before SUB.
    host.port_mut()
        .inject_raw(&[0x00, 0x01, 0x02, 0x03, 0x04, 0x05, SUB, 0x06, FLAG]);
    pump(&mut host, 2);

    assert_eq!(host.counters().rx_comm_errors, 1);
    assert_eq!(naks_sent(&host), 1);
    assert_eq!(host.free_rx_buffers(), host.config().rx_buffers);
    assert_eq!(host.ready_frames(), 0);
    assert!(host.is_connected());
}

#[test]
fn oversize_frame_is_naked_and_its_buffer_freed() {
    let (mut host, _clock) = connected(HostConfig::default(), SimulatedNcp::new(true));
    let mut frame = vec![0x00];
    frame.extend(std::iter::repeat(0x42).take(140));
    let mut wire = BytesMut::new();
    encode_frame(&frame, &mut wire);

    host.port_mut().inject_raw(&wire);
    pump(&mut host, 2);

    assert_eq!(host.counters().rx_too_long, 1);
    assert_eq!(host.counters().rx_crc_errors, 0);
    assert_eq!(naks_sent(&host), 1);
    assert_eq!(host.free_rx_buffers(), host.config().rx_buffers);

    // The line recovers at the next flag.
    host.port_mut()
        .inject_data(Seq::ZERO, Seq::ZERO, true, &[7, 7, 7]);
    pump(&mut host, 1);
    assert_eq!(host.ready_frames(), 1);
}

#[test]
fn cancel_is_counted_only_once_connected() {
    let mut host = Host::new(
        HostConfig::default(),
        SimulatedNcp::scripted(true),
        ManualClock::new(),
    )
    .expect("default config should be valid");

    host.reset().expect("reset should succeed");
    host.port_mut().inject_raw(&[0x00, 0x01, 0x02, 0x03, CAN]);
    host.poll().expect("poll should succeed");
    assert_eq!(host.counters().rx_cancelled, 0);

    host.port_mut()
        .inject_reset_ack(ASH_VERSION, reset_reason::SOFTWARE);
    host.poll().expect("poll should succeed");
    assert!(host.is_connected());

    host.port_mut().inject_raw(&[0x00, 0x01, 0x02, 0x03, CAN]);
    pump(&mut host, 2);
    assert_eq!(host.counters().rx_cancelled, 1);
    assert_eq!(naks_sent(&host), 0);
    assert_eq!(host.free_rx_buffers(), host.config().rx_buffers);
}

#[test]
fn invalid_frames_are_naked_only_after_data_control() {
    let (mut host, _clock) = connected(HostConfig::default(), SimulatedNcp::new(true));

    // ACK with a stray data byte, then an undefined control byte.
    host.port_mut().inject_frame(&[0x80, 0x00]);
    host.port_mut().inject_frame(&[0xC3]);
    pump(&mut host, 2);

    assert_eq!(host.counters().rx_bad_length, 1);
    assert_eq!(host.counters().rx_bad_control, 1);
    assert_eq!(host.counters().rx_ack_frames, 0);
    assert_eq!(naks_sent(&host), 0);

    // A DATA frame with a two-byte data field.
    host.port_mut().inject_frame(&[0x00, 0x01, 0x02]);
    pump(&mut host, 2);

    assert_eq!(host.counters().rx_bad_length, 2);
    assert_eq!(naks_sent(&host), 1);
    assert_eq!(host.ready_frames(), 0);
    assert!(host.is_connected());
}

/// Non-blocking in-memory line: input is fed by the test, output is kept.
#[derive(Clone, Default)]
struct Line {
    input: Rc<RefCell<VecDeque<u8>>>,
    output: Rc<RefCell<Vec<u8>>>,
}

impl Line {
    fn feed(&self, bytes: &[u8]) {
        self.input.borrow_mut().extend(bytes);
    }
}

impl Read for Line {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut input = self.input.borrow_mut();
        if input.is_empty() {
            return Err(ErrorKind::WouldBlock.into());
        }
        let n = buf.len().min(input.len());
        for (slot, byte) in buf.iter_mut().zip(input.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for Line {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.output.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn xoff_with_hardware_flow_control_is_fatal() {
    let config = HostConfig::default();
    assert!(config.rts_cts);
    let line = Line::default();
    let port = config.stream_port(line.clone());
    let mut host = Host::new(config, port, ManualClock::new()).expect("config should be valid");

    host.reset().expect("reset should succeed");
    host.send_exec().expect("send should succeed");
    assert!(!line.output.borrow().is_empty());

    let mut wire = BytesMut::new();
    encode_frame(
        &[FrameHeader::ResetAck.encode(), ASH_VERSION, reset_reason::SOFTWARE],
        &mut wire,
    );
    line.feed(&wire);
    host.poll().expect("poll should succeed");
    assert!(host.is_connected());

    line.feed(&[XOFF]);
    assert!(matches!(
        host.poll(),
        Err(HostError::Disconnected(DisconnectReason::Host(
            HostFault::FlowControl
        )))
    ));
    assert_eq!(
        host.state(),
        ConnectionState::HostFatal(HostFault::FlowControl)
    );
    assert!(host.state().is_fatal());
    assert!(!host.is_connected());
}
