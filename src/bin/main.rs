use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use embassy_executor::Spawner;
use embassy_time::Delay;
use keymap_core::{
    CommandChannel, KeyMap, KeySink, KeymapBridge, LogKeySink, MappingEngine, PluginRegistry,
};
use log::{error, info};
use serial_keymapper::{logging, Config, SerialTransport, SystemClock, DEFAULT_BAUD_RATE};

/// Map microcontroller pins to keyboard keys over a serial link
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the JSON configuration file
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Logging verbosity, 0 (quiet) to 4 (raw serial traffic)
    #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(0..=4))]
    log: u8,

    /// Serial port, overriding the one in the configuration (e.g. /dev/ttyUSB0)
    #[arg(short, long, env = "KEYMAPPER_PORT")]
    port: Option<String>,

    /// Serial baud rate
    #[arg(short, long, default_value_t = DEFAULT_BAUD_RATE)]
    baud: u32,

    /// Log key actions instead of injecting them
    #[arg(long)]
    dry_run: bool,
}

#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    let args = Args::parse();
    logging::init(args.log);

    info!("Serial keymapper starting...");

    // The std executor never returns, so leave explicitly once everything
    // has been dropped.
    match run(args).await {
        Ok(()) => process::exit(0),
        Err(e) => {
            error!("{:#}", e);
            process::exit(1);
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let config = Config::load(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    let keymap = config.keymap().context("invalid key mapping")?;
    let port = args
        .port
        .or_else(|| config.port.clone())
        .ok_or_else(|| anyhow!("no serial port configured (set \"port\" or pass --port)"))?;

    let sink = key_sink(&keymap, args.dry_run)?;
    let plugins = config.plugins(&PluginRegistry::builtin());
    let transport = SerialTransport::open(&port, args.baud)
        .with_context(|| format!("failed to open serial port {}", port))?;

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))
            .context("failed to install interrupt handler")?;
    }

    let channel = CommandChannel::new(transport, SystemClock, Delay);
    let engine = MappingEngine::new(keymap, sink);
    let mut bridge = KeymapBridge::new(channel, engine, plugins);

    bridge.setup().await;
    bridge.run(&running).await;

    info!("Shutting down");
    let transport = bridge.shutdown().await;
    info!("Closing {}", transport.name().unwrap_or(port));
    Ok(())
}

fn key_sink(keymap: &KeyMap, dry_run: bool) -> Result<Box<dyn KeySink>> {
    if dry_run {
        info!("Dry run: key actions are only logged");
        return Ok(Box::new(LogKeySink));
    }

    let names: BTreeSet<&str> = keymap.iter().flat_map(|(_, mapping)| mapping.keys()).collect();

    #[cfg(all(target_os = "linux", feature = "uinput"))]
    {
        let sink = serial_keymapper::output::UinputKeySink::new(names)
            .context("failed to create virtual keyboard")?;
        Ok(Box::new(sink))
    }

    #[cfg(not(all(target_os = "linux", feature = "uinput")))]
    {
        log::warn!(
            "Key injection is unavailable in this build, logging {} keys instead",
            names.len()
        );
        Ok(Box::new(LogKeySink))
    }
}
