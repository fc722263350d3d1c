//! Modbus read planner CLI.
//!
//! Loads a device configuration, plans the read transactions for each
//! device and prints them. Plans can also be written to a file for a
//! transport to execute.

use anyhow::{Context, Result};
use clap::Parser;
use regplan_common::{Format, LoggingConfig};
use regplan_modbus::config::{DeviceConfig, PlannerConfig};
use regplan_modbus::plan::ReadPlan;
use std::path::PathBuf;
use tracing::info;

/// Modbus read planner.
#[derive(Parser, Debug)]
#[command(name = "regplan-modbus")]
#[command(about = "Groups configured Modbus registers into read transactions")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format)
    #[arg(short, long, default_value = "modbus.json5")]
    config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,

    /// Plan only the named device.
    #[arg(short, long)]
    device: Option<String>,

    /// Write the plans to this file.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Encoding for --output (json or cbor).
    #[arg(long, default_value = "json", value_parser = parse_format)]
    format: Format,
}

fn parse_format(s: &str) -> Result<Format, String> {
    match s.to_lowercase().as_str() {
        "json" => Ok(Format::Json),
        "cbor" => Ok(Format::Cbor),
        other => Err(format!("unknown format '{}' (use json or cbor)", other)),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = PlannerConfig::load_from_file(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    // Initialize logging
    let log_config = LoggingConfig {
        level: args
            .log_level
            .clone()
            .unwrap_or_else(|| config.logging.level.clone()),
        format: config.logging.format,
    };
    regplan_common::init_tracing(&log_config)
        .map_err(|e| anyhow::anyhow!("Failed to init tracing: {}", e))?;

    info!("Loaded configuration from {:?}", args.config);

    let devices: Vec<&DeviceConfig> = match &args.device {
        Some(name) => vec![
            config
                .device(name)
                .ok_or_else(|| anyhow::anyhow!("Unknown device '{}'", name))?,
        ],
        None => config.modbus.devices.iter().collect(),
    };

    let mut plans = Vec::with_capacity(devices.len());
    for device in devices {
        let plan = ReadPlan::for_device(device, &config.modbus)
            .with_context(|| format!("Failed to plan reads for device '{}'", device.name))?;

        info!(
            "Device '{}' ({}): {} read(s), {} requested, {} hole register(s)",
            device.name,
            device.connection,
            plan.transaction_count(),
            plan.requested_registers(),
            plan.hole_registers()
        );

        print_plan(&plan);
        plans.push(plan);
    }

    if let Some(path) = &args.output {
        let payload = regplan_common::encode(&plans, args.format)
            .map_err(|e| anyhow::anyhow!("Failed to encode plans: {}", e))?;
        std::fs::write(path, payload)
            .with_context(|| format!("Failed to write plans to {:?}", path))?;
        info!(
            "Wrote {} plan(s) to {:?} ({})",
            plans.len(),
            path,
            args.format.mime_type()
        );
    }

    Ok(())
}

fn print_plan(plan: &ReadPlan) {
    let policy = plan.policy();
    println!(
        "{} (unit {}, holes {}, max {})",
        plan.device(),
        plan.unit_id(),
        if policy.allow_holes { "on" } else { "off" },
        policy.max_read_size
    );
    for read in plan.reads() {
        println!(
            "  fc=0x{:02x} {:<8} {}",
            read.register_type.read_function_code(),
            read.register_type.as_str(),
            read.range
        );
    }
}
