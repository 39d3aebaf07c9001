#![allow(dead_code)]

use ashlink_host::{Host, HostConfig, ManualClock, SimulatedNcp};
use bytes::Bytes;

pub type SimHost = Host<SimulatedNcp, ManualClock>;

pub fn config(window_size: u8) -> HostConfig {
    HostConfig {
        window_size,
        ..HostConfig::default()
    }
}

/// A host connected to a simulated NCP, plus a handle on its clock.
pub fn connected(config: HostConfig, ncp: SimulatedNcp) -> (SimHost, ManualClock) {
    let clock = ManualClock::new();
    clock.set_idle_step(10);
    let mut host = Host::new(config, ncp, clock.clone()).expect("config should be valid");
    host.connect().expect("simulated NCP should connect");
    (host, clock)
}

/// Poll `rounds` times, failing the test on a fatal error.
pub fn pump(host: &mut SimHost, rounds: usize) {
    for _ in 0..rounds {
        host.poll().expect("poll should succeed");
    }
}

/// Poll until a payload is ready, up to `rounds` polls.
pub fn receive(host: &mut SimHost, rounds: usize) -> Option<Bytes> {
    for _ in 0..rounds {
        host.poll().expect("poll should succeed");
        if let Some(payload) = host.try_receive().expect("receive should succeed") {
            return Some(payload);
        }
    }
    None
}
