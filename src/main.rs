//! CLI entry point for `mpa`.
//!
//! Provides command-line access to:
//! - the telemetry logger (select an application, start a remote session,
//!   write CSV samples until the errored-seconds threshold is reached)
//! - the BER helper (decode two register bytes, given or typed in)
//! - register peeks, page dumps and pre-FEC BER reads
//! - laser and test control
//!
//! # Usage
//!
//! ```bash
//! mpa --host 10.10.40.197 log --output data.txt --threshold 2
//! mpa ber cb e8
//! mpa --host 10.10.40.197 dump 32
//! MPA_LOGGING__LEVEL=debug mpa --host 10.10.40.197 laser on
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use mpa_scpi::ber::BerValue;
use mpa_scpi::config::MpaConfig;
use mpa_scpi::logging;
use mpa_scpi::operations::{register::hex_byte, PreFecVendor, RegisterPage, ToggleTarget};
use mpa_scpi::session::Session;
use mpa_scpi::telemetry::{poll, stop_at_threshold, CsvSink};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "mpa")]
#[command(about = "Remote control for MPA bit-error-rate testers", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = mpa_scpi::config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Instrument host, overriding the configuration
    #[arg(long, global = true)]
    host: Option<String>,

    /// Bootstrap base port, overriding the configuration
    #[arg(long, global = true)]
    base_port: Option<u16>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll telemetry into a CSV file until the error threshold is reached
    Log {
        /// Application to select (default: from config, else the port 1 application)
        #[arg(long)]
        application: Option<String>,

        /// CSV output file
        #[arg(long)]
        output: Option<PathBuf>,

        /// Stop once errored seconds reach this count
        #[arg(long)]
        threshold: Option<u64>,

        /// Seconds between samples
        #[arg(long)]
        interval_secs: Option<u64>,
    },

    /// List the applications running on ports 1 and 2
    Apps,

    /// Decode a BER word from its two register bytes (prompts when omitted)
    Ber {
        /// High byte in hex, e.g. cb
        high: Option<String>,
        /// Low byte in hex, e.g. e8
        low: Option<String>,
    },

    /// Read one register byte
    Peek {
        /// Register page
        #[arg(long)]
        page: u8,
        /// Register address
        #[arg(long)]
        address: u8,
    },

    /// Dump a half page of registers as a hex grid
    Dump {
        /// `base` for page 0 lower memory, or a page number for its upper memory
        page: RegisterPage,
    },

    /// Read the transceiver's pre-FEC BER
    PreFec {
        /// Transceiver vendor (inphi, eopto)
        vendor: PreFecVendor,
    },

    /// Laser control
    Laser {
        #[arg(value_enum)]
        action: LaserAction,
    },

    /// Test control
    Test {
        #[arg(value_enum)]
        action: TestAction,
    },

    /// Print the effective configuration as TOML
    ShowConfig,
}

#[derive(Clone, Copy, ValueEnum)]
enum LaserAction {
    On,
    Off,
    Status,
}

#[derive(Clone, Copy, ValueEnum)]
enum TestAction {
    Start,
    Stop,
    Restart,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = MpaConfig::load_from(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    if let Some(host) = cli.host {
        config.instrument.host = host;
    }
    if let Some(port) = cli.base_port {
        config.instrument.base_port = port;
    }
    config.validate().context("Invalid configuration")?;
    logging::init_from_config(&config).context("Failed to initialise logging")?;

    match cli.command {
        Commands::Log {
            application,
            output,
            threshold,
            interval_secs,
        } => {
            if let Some(application) = application {
                config.telemetry.application = Some(application);
            }
            if let Some(output) = output {
                config.telemetry.output = output;
            }
            if let Some(threshold) = threshold {
                config.telemetry.error_threshold = threshold;
            }
            if let Some(secs) = interval_secs {
                config.telemetry.interval = Duration::from_secs(secs);
            }
            run_logger(&config).await
        }
        Commands::Apps => {
            let mut session = connect(&config).await?;
            let running = session.list_running_applications().await?;
            println!("port 1: {}", running.port1.as_deref().unwrap_or("-"));
            println!("port 2: {}", running.port2.as_deref().unwrap_or("-"));
            session.close().await?;
            Ok(())
        }
        Commands::Ber { high, low } => {
            let high = match high {
                Some(byte) => byte,
                None => prompt("9e: ")?,
            };
            let low = match low {
                Some(byte) => byte,
                None => prompt("9f: ")?,
            };
            let ber = BerValue::from_hex(&high, &low)?;
            println!("{ber}");
            Ok(())
        }
        Commands::Peek { page, address } => {
            let mut session = connect(&config).await?;
            let byte = session.peek_byte(page, address).await?;
            println!("{}", hex_byte(byte));
            session.close().await?;
            Ok(())
        }
        Commands::Dump { page } => {
            let mut session = connect(&config).await?;
            let dump = session.dump_page(page).await?;
            print!("{dump}");
            session.close().await?;
            Ok(())
        }
        Commands::PreFec { vendor } => {
            let mut session = connect(&config).await?;
            let ber = session.read_pre_fec_ber(vendor).await?;
            println!("{ber}");
            session.close().await?;
            Ok(())
        }
        Commands::Laser { action } => {
            let mut session = connect(&config).await?;
            match action {
                LaserAction::On => println!("{:?}", session.laser_on().await?),
                LaserAction::Off => println!("{:?}", session.laser_off().await?),
                LaserAction::Status => {
                    let state = session.toggle_state(ToggleTarget::Laser).await?;
                    match state {
                        Some(state) => println!("{state}"),
                        None => println!("unknown"),
                    }
                }
            }
            session.close().await?;
            Ok(())
        }
        Commands::Test { action } => {
            let mut session = connect(&config).await?;
            let reply = match action {
                TestAction::Start => session.test_start().await?,
                TestAction::Stop => session.test_stop().await?,
                TestAction::Restart => session.test_restart().await?,
            };
            info!(reply = ?reply.as_str(), "Test command acknowledged");
            session.close().await?;
            Ok(())
        }
        Commands::ShowConfig => {
            let text = toml::to_string_pretty(&config).context("Failed to render configuration")?;
            print!("{text}");
            Ok(())
        }
    }
}

async fn connect(config: &MpaConfig) -> Result<Session> {
    Session::bootstrap_from_config(config).await.with_context(|| {
        format!(
            "Failed to connect to {}:{}",
            config.instrument.host, config.instrument.base_port
        )
    })
}

async fn run_logger(config: &MpaConfig) -> Result<()> {
    let mut session = connect(config).await?;

    let running = session.list_running_applications().await?;
    info!(?running, "Running applications");

    let application = match (&config.telemetry.application, &running.port1) {
        (Some(configured), _) => configured.clone(),
        (None, Some(port1)) => port1.clone(),
        (None, None) => bail!("No application configured and none running on port 1"),
    };
    session.select_application(&application).await?;
    session.create_session().await?;

    let mut sink = CsvSink::create(&config.telemetry.output)?;
    let summary = poll(
        &mut session,
        &mut sink,
        stop_at_threshold(config.telemetry.error_threshold),
        config.telemetry.interval,
    )
    .await?;

    println!(
        "{} samples written to {} (errored seconds: {})",
        summary.rows,
        config.telemetry.output.display(),
        summary
            .last_error_count
            .map_or_else(|| "unknown".to_string(), |count| count.to_string())
    );
    session.close().await?;
    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    let mut stdout = std::io::stdout();
    write!(stdout, "{label}")?;
    stdout.flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    let byte = line.trim().to_string();
    if byte.is_empty() {
        bail!("No byte entered");
    }
    Ok(byte)
}
