use ashlink_host::{HostConfig, PRESETS};
use serde::Serialize;

use crate::cmd::PresetsArgs;
use crate::exit::{host_error, CliResult, SUCCESS};
use crate::output::{print_json, table, OutputFormat};

#[derive(Serialize)]
struct PresetOutput {
    index: usize,
    name: &'static str,
    #[serde(flatten)]
    config: HostConfig,
}

pub fn run(args: PresetsArgs, format: OutputFormat) -> CliResult<i32> {
    match args.index {
        Some(index) => show(index, format),
        None => list(format),
    }
}

fn load(index: usize) -> CliResult<PresetOutput> {
    let config = HostConfig::preset(index).map_err(|err| host_error("preset", err))?;
    Ok(PresetOutput {
        index,
        name: PRESETS[index],
        config,
    })
}

fn flow(config: &HostConfig) -> &'static str {
    if config.rts_cts {
        "rts/cts"
    } else {
        "xon/xoff"
    }
}

fn list(format: OutputFormat) -> CliResult<i32> {
    let presets = (0..PRESETS.len())
        .map(load)
        .collect::<CliResult<Vec<_>>>()?;

    match format {
        OutputFormat::Json => print_json(&presets),
        OutputFormat::Table => {
            let mut table = table(vec![
                "INDEX", "NAME", "BAUD", "FLOW", "NCP", "RESET", "ACK MS",
            ]);
            for p in &presets {
                table.add_row(vec![
                    p.index.to_string(),
                    p.name.to_string(),
                    p.config.baud_rate.to_string(),
                    flow(&p.config).to_string(),
                    p.config.ncp_type.to_string(),
                    p.config.reset_method.to_string(),
                    format!(
                        "{}/{}/{}",
                        p.config.ack_time_init_ms,
                        p.config.ack_time_min_ms,
                        p.config.ack_time_max_ms
                    ),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for p in &presets {
                println!(
                    "{} {} baud={} flow={} ncp={}",
                    p.index,
                    p.name,
                    p.config.baud_rate,
                    flow(&p.config),
                    p.config.ncp_type
                );
            }
        }
        OutputFormat::Raw => {
            for p in &presets {
                println!("{}", p.name);
            }
        }
    }
    Ok(SUCCESS)
}

fn show(index: usize, format: OutputFormat) -> CliResult<i32> {
    let preset = load(index)?;
    let settings = serde_json::to_value(&preset.config)
        .ok()
        .and_then(|value| value.as_object().cloned())
        .unwrap_or_default();

    match format {
        OutputFormat::Json => print_json(&preset),
        OutputFormat::Table => {
            let mut table = table(vec!["SETTING", "VALUE"]);
            table.add_row(vec!["name".to_string(), preset.name.to_string()]);
            for (key, value) in &settings {
                table.add_row(vec![key.clone(), value.to_string()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("name = {}", preset.name);
            for (key, value) in &settings {
                println!("{key} = {value}");
            }
        }
        OutputFormat::Raw => println!("{}", preset.name),
    }
    Ok(SUCCESS)
}
