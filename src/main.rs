//! CLI entry point for tdc-daq
//!
//! Drives the V775 driver against a simulated crate sized from the
//! configuration file:
//!
//! ```bash
//! tdc-daq status
//! tdc-daq poll --events 5
//! tdc-daq block --id 1 --events 16
//! tdc-daq interrupt --threshold 4 --triggers 20
//! tdc-daq decode 0x02000300 0x00000011 0x04000007
//! tdc-daq --config config/tdc.toml config
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use daq_driver_c775::{decode_event, format_event};
use tdc_daq::config::{TdcConfig, DEFAULT_CONFIG_PATH};
use tdc_daq::session::{parse_word, split_events, Session};
use tdc_daq::tracing_setup;
use tracing::info;

#[derive(Parser)]
#[command(name = "tdc-daq")]
#[command(about = "CAEN V775 TDC acquisition shell", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the status report of one or every module
    Status {
        /// Module id (all modules when omitted)
        #[arg(long)]
        id: Option<usize>,
    },

    /// Gate a module and read the events one at a time
    Poll {
        /// Module id
        #[arg(long, default_value_t = 0)]
        id: usize,
        /// Number of events
        #[arg(long, default_value_t = 1)]
        events: usize,
    },

    /// Gate a module and read the events with one DMA block transfer
    Block {
        /// Module id
        #[arg(long, default_value_t = 0)]
        id: usize,
        /// Number of events (1-32)
        #[arg(long, default_value_t = 4)]
        events: usize,
    },

    /// Interrupt-driven run on the configured source module
    Interrupt {
        /// Events per interrupt (defaults to the configured threshold)
        #[arg(long)]
        threshold: Option<u16>,
        /// Number of gates
        #[arg(long, default_value_t = 10)]
        triggers: usize,
    },

    /// Decode raw event words given in hex
    Decode {
        /// Words, `0x` prefix optional
        #[arg(required = true)]
        words: Vec<String>,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = TdcConfig::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    config.validate()?;
    tracing_setup::init_from_config(&config)?;
    info!(name = %config.application.name, "Starting");

    match cli.command {
        Commands::Status { id } => {
            let session = Session::open(config)?;
            for report in session.status(id)? {
                println!("{report}");
            }
        }
        Commands::Poll { id, events } => {
            let mut session = Session::open(config)?;
            for words in session.poll(id, events)? {
                println!("{}", format_event(id, &words));
            }
        }
        Commands::Block { id, events } => {
            let mut session = Session::open(config)?;
            let words = session.block(id, events)?;
            for event in split_events(&words) {
                println!("{}", format_event(id, event));
            }
        }
        Commands::Interrupt { threshold, triggers } => {
            let threshold = threshold.unwrap_or(config.interrupt.threshold);
            let mut session = Session::open(config)?;
            let status = session.interrupt_run(threshold, triggers).await?;
            println!(
                "Interrupts serviced: {} (module {:?}, level {}, vector {:#x}, every {} events)",
                status.count, status.source, status.level, status.vector, status.threshold
            );
            for report in session.status(status.source)? {
                println!("{report}");
            }
        }
        Commands::Decode { words } => {
            let words = words
                .iter()
                .map(|w| parse_word(w))
                .collect::<Result<Vec<_>, _>>()?;
            for (raw, word) in words.iter().zip(decode_event(&words)) {
                println!("{raw:#010x}  {word:?}");
            }
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
    }
    Ok(())
}
