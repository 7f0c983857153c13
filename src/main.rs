use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::ops::ControlFlow;
use std::path::Path;
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use log::{error, info, warn};
use sercap::configuration::{Settings, SettingsArgs};
use sercap::controller::Controller;
use sercap::device::{DeviceIdentity, SerialDeviceProvider};

#[derive(Parser)]
#[command(name = "sercap")]
#[command(version)]
#[command(about = "Captures the line output of USB serial devices into time-partitioned files")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Capture from every enabled and attached device until interrupted
    Run {
        #[command(flatten)]
        settings: SettingsArgs,
    },
    /// Print known and attached devices as JSON
    Devices {
        #[command(flatten)]
        settings: SettingsArgs,
    },
    /// Change the settings of a known device
    Set {
        #[command(flatten)]
        settings: SettingsArgs,
        /// Device identity (sanitized serial number)
        device: String,
        #[arg(long)]
        baud_rate: Option<u32>,
        #[arg(long, value_enum)]
        capture: Option<Toggle>,
        #[arg(long)]
        name: Option<String>,
    },
    /// Print records received in [start, end) as JSON lines
    Query {
        #[command(flatten)]
        settings: SettingsArgs,
        /// Device identity (sanitized serial number)
        device: String,
        /// Inclusive start, epoch milliseconds
        #[arg(long)]
        start: i64,
        /// Exclusive end, epoch milliseconds
        #[arg(long)]
        end: i64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

/// Duplicates log output to stderr and a file.
struct TeeWriter {
    file: File,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        self.file.flush()
    }
}

fn init_logging(log_file: Option<&Path>) {
    // https://docs.rs/env_logger/latest/env_logger/
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    builder.format_target(false);
    let mut file_error = None;
    if let Some(path) = log_file {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                builder.target(env_logger::Target::Pipe(Box::new(TeeWriter { file })));
            }
            Err(e) => file_error = Some(format!("Cannot open log file {}: {}", path.display(), e)),
        }
    }
    builder.init();
    if let Some(e) = file_error {
        warn!("{}", e);
    }
}

fn prepare(args: &SettingsArgs) -> Controller {
    let settings = match Settings::resolve(args) {
        Ok(settings) => settings,
        Err(e) => {
            init_logging(None);
            error!("Unable to load settings: {}", e);
            process::exit(1);
        }
    };
    init_logging(settings.log_file.as_deref());

    let devices = Arc::new(SerialDeviceProvider::new());
    match Controller::new(settings, devices) {
        Ok(controller) => controller,
        Err(e) => {
            error!("Unable to create a controller instance: {}, exiting...", e);
            process::exit(1);
        }
    }
}

fn identity(raw: &str) -> DeviceIdentity {
    DeviceIdentity::sanitize(raw).unwrap_or_else(|| {
        error!("'{}' is not a usable device identity", raw);
        process::exit(2);
    })
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(json) => println!("{}", json),
        Err(e) => error!("Failed to serialize output: {}", e),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Command::Run { settings } => {
            let controller = prepare(&settings);
            // registers newly attached devices so they can be enabled
            let known = controller.list_connections();
            info!(
                "Capturing into {} ({} known device(s))",
                controller.settings().base_dir.display(),
                known.len()
            );
            if let Err(e) = controller.start() {
                error!("Unable to start capture: {}", e);
                process::exit(1);
            }
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Unable to listen for shutdown signal: {}", e);
            }
            info!("Shutdown requested");
            controller.shutdown().await;
        }
        Command::Devices { settings } => {
            let controller = prepare(&settings);
            match serde_json::to_string_pretty(&controller.list_connections()) {
                Ok(json) => println!("{}", json),
                Err(e) => error!("Failed to serialize output: {}", e),
            }
        }
        Command::Set {
            settings,
            device,
            baud_rate,
            capture,
            name,
        } => {
            let controller = prepare(&settings);
            let identity = identity(&device);
            // make sure attached devices have an entry to change
            controller.list_connections();
            let mut results = Vec::new();
            if let Some(baud_rate) = baud_rate {
                results.push(controller.set_baud_rate(&identity, baud_rate));
            }
            if let Some(capture) = capture {
                results.push(controller.set_data_capture(&identity, matches!(capture, Toggle::On)));
            }
            if let Some(name) = name {
                results.push(controller.set_name(&identity, &name));
            }
            for result in results {
                match result {
                    Ok(true) => {}
                    Ok(false) => {
                        error!("Unknown device {}", identity);
                        process::exit(1);
                    }
                    Err(e) => {
                        error!("{}", e);
                        process::exit(1);
                    }
                }
            }
        }
        Command::Query {
            settings,
            device,
            start,
            end,
        } => {
            let controller = prepare(&settings);
            controller.scan(&identity(&device), start, end, |record| {
                print_json(&record);
                ControlFlow::Continue(())
            });
        }
    }
}
