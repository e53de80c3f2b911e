use clap::{Parser, Subcommand};
use log::{error, info};
use shmseg::{ManagerConfig, SegmentManager, SegmentView};
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

/// Bytes covered by `--pattern` and `--verify`.
const PATTERN_LEN: usize = 100;

#[derive(Parser)]
#[command(name = "shmseg", about = "Create, inspect and remove named shared memory segments")]
struct Cli {
    /// TOML manager configuration.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Overrides the configured key prefix.
    #[arg(long, global = true)]
    prefix: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a segment.
    Set {
        key: String,
        size: usize,
        /// Write `i % 256` into the first 100 bytes.
        #[arg(long)]
        pattern: bool,
        /// Keep the mapping for this long before exiting.
        #[arg(long, default_value_t = 0)]
        hold_ms: u64,
        /// Unlink the segment before exiting.
        #[arg(long)]
        remove: bool,
    },
    /// Open a segment and print its head.
    Get {
        key: String,
        /// Fail unless the first 100 bytes hold `i % 256`.
        #[arg(long)]
        verify: bool,
        #[arg(long)]
        remove: bool,
    },
    /// Unlink a segment.
    Remove { key: String },
}

fn write_pattern(view: &mut SegmentView) -> shmseg::Result<()> {
    let n = PATTERN_LEN.min(view.len());
    let pattern: Vec<u8> = (0..n).map(|i| (i % 256) as u8).collect();
    view.write_at(0, &pattern)
}

fn verify_pattern(view: &SegmentView) -> Result<(), String> {
    let n = PATTERN_LEN.min(view.len());
    for i in 0..n {
        let found = view.get(i).unwrap_or_default();
        if found != (i % 256) as u8 {
            return Err(format!("byte {} is {}, expected {}", i, found, i % 256));
        }
    }
    Ok(())
}

fn head(view: &SegmentView) -> Vec<u8> {
    let mut buf = vec![0; view.len().min(10)];
    let _ = view.read_at(0, &mut buf);
    buf
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => ManagerConfig::load(path)?,
        None => ManagerConfig::default(),
    };
    if let Some(prefix) = cli.prefix {
        config = config.with_prefix(prefix);
    }
    let manager = SegmentManager::new(config)?;

    match cli.command {
        Command::Set {
            key,
            size,
            pattern,
            hold_ms,
            remove,
        } => {
            let mut view = manager.create(&key, size)?;
            println!("{} {}", view.name(), view.len());
            if pattern {
                write_pattern(&mut view)?;
                view.flush()?;
                info!("wrote pattern into {}", view.name());
            }
            println!("head {:?}", head(&view));
            if hold_ms > 0 {
                thread::sleep(Duration::from_millis(hold_ms));
            }
            drop(view);
            if remove {
                println!("removed {}", manager.remove(&key)?);
            } else {
                manager.release(&key)?;
            }
        }
        Command::Get { key, verify, remove } => {
            let view = manager.open(&key)?;
            println!("{} {}", view.name(), view.len());
            println!("head {:?}", head(&view));
            let verified = if verify { verify_pattern(&view) } else { Ok(()) };
            drop(view);
            if remove {
                println!("removed {}", manager.remove(&key)?);
            }
            verified?;
        }
        Command::Remove { key } => {
            println!("removed {}", manager.remove(&key)?);
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            eprintln!("shmseg: {}", err);
            ExitCode::FAILURE
        }
    }
}
