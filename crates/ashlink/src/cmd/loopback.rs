use std::path::Path;

use ashlink_host::{Clock, Counters, Host, HostConfig, ManualClock, SimulatedNcp, PRESETS};
use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, info};

use crate::cmd::LoopbackArgs;
use crate::exit::{host_error, io_error, CliError, CliResult, DATA_INVALID, SUCCESS, TIMEOUT};
use crate::output::{hex, print_counters, print_json, print_raw, table, OutputFormat};

/// Virtual milliseconds that pass between polls.
const TICK_MS: u64 = 10;
/// Polls allowed per echo; covers several back-to-back ACK timeouts.
const MAX_POLLS: usize = 5_000;

type LoopbackHost = Host<SimulatedNcp, ManualClock>;

#[derive(Serialize)]
struct EchoOutput {
    index: usize,
    size: usize,
    round_trip_ms: u64,
    payload: String,
    #[serde(skip)]
    data: Bytes,
}

#[derive(Serialize)]
struct LoopbackOutput<'a> {
    source: &'a str,
    window_size: u8,
    randomize: bool,
    frames: &'a [EchoOutput],
    counters: &'a Counters,
}

pub fn run(args: LoopbackArgs, format: OutputFormat) -> CliResult<i32> {
    let (mut config, source) = match &args.config {
        Some(path) => (load_config(path)?, path.display().to_string()),
        None => {
            let config =
                HostConfig::preset(args.preset).map_err(|err| host_error("preset", err))?;
            (config, PRESETS[args.preset].to_string())
        }
    };
    if let Some(window) = args.window {
        config.window_size = window;
    }
    if args.no_randomize {
        config.randomize = false;
    }

    let clock = ManualClock::new();
    clock.set_idle_step(TICK_MS);
    let ncp = SimulatedNcp::new(config.randomize).with_echo();
    let mut host =
        Host::new(config, ncp, clock.clone()).map_err(|err| host_error("configure", err))?;
    host.connect().map_err(|err| host_error("connect", err))?;
    info!(source = %source, "connected to simulated NCP");

    let mut frames = Vec::with_capacity(args.count);
    for index in 0..args.count {
        let payload = pattern(index, args.size);
        if args
            .drop_every
            .is_some_and(|n| (index + 1) % n as usize == 0)
        {
            debug!(index, "dropping first transmission");
            host.port_mut().drop_data_frames(1);
        }
        let started = clock.now_ms();
        host.send(&payload).map_err(|err| host_error("send", err))?;
        let reply = wait_for_echo(&mut host)?;
        if reply.as_ref() != payload.as_slice() {
            return Err(CliError::new(
                DATA_INVALID,
                format!("frame {index}: echo does not match payload"),
            ));
        }
        frames.push(EchoOutput {
            index,
            size: reply.len(),
            round_trip_ms: clock.now_ms() - started,
            payload: hex(&reply),
            data: reply,
        });
    }
    // Let the final ACK go out before reading the counters.
    host.poll().map_err(|err| host_error("poll", err))?;

    let window_size = host.config().window_size;
    let randomize = host.config().randomize;
    let counters = host.counters();
    match format {
        OutputFormat::Json => print_json(&LoopbackOutput {
            source: &source,
            window_size,
            randomize,
            frames: &frames,
            counters,
        }),
        OutputFormat::Table => {
            let mut table = table(vec!["FRAME", "SIZE", "RTT MS", "PAYLOAD"]);
            for frame in &frames {
                table.add_row(vec![
                    frame.index.to_string(),
                    frame.size.to_string(),
                    frame.round_trip_ms.to_string(),
                    frame.payload.clone(),
                ]);
            }
            println!("{table}");
            print_counters(counters, format);
        }
        OutputFormat::Pretty => {
            for frame in &frames {
                println!(
                    "frame={} size={} rtt_ms={} payload={}",
                    frame.index, frame.size, frame.round_trip_ms, frame.payload
                );
            }
            print_counters(counters, format);
        }
        OutputFormat::Raw => {
            for frame in &frames {
                print_raw(&frame.data);
            }
        }
    }
    Ok(SUCCESS)
}

fn load_config(path: &Path) -> CliResult<HostConfig> {
    let text = std::fs::read_to_string(path)
        .map_err(|err| io_error(&format!("read {}", path.display()), err))?;
    serde_json::from_str(&text).map_err(|err| {
        CliError::new(
            DATA_INVALID,
            format!("parse {}: {err}", path.display()),
        )
    })
}

fn wait_for_echo(host: &mut LoopbackHost) -> CliResult<Bytes> {
    for _ in 0..MAX_POLLS {
        host.poll().map_err(|err| host_error("poll", err))?;
        if let Some(reply) = host.try_receive().map_err(|err| host_error("receive", err))? {
            return Ok(reply);
        }
        host.clock().idle();
    }
    Err(CliError::new(TIMEOUT, "no echo from simulated NCP"))
}

/// Deterministic payload bytes, including values the codec must escape.
fn pattern(index: usize, size: usize) -> Vec<u8> {
    const RESERVED: [u8; 6] = [0x7E, 0x7D, 0x11, 0x13, 0x18, 0x1A];
    (0..size)
        .map(|i| {
            if i % 5 == 4 {
                RESERVED[(index + i) % RESERVED.len()]
            } else {
                (index as u8).wrapping_mul(31).wrapping_add(i as u8)
            }
        })
        .collect()
}
