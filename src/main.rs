use clap::{Parser, Subcommand, ValueEnum};
use std::cell::Cell;
use std::path::PathBuf;
use tracing_subscriber::filter::LevelFilter;

use vast_video::async_api;
use vast_video::click;
use vast_video::host::PlaybackClock;
use vast_video::network::LoggingDispatcher;
use vast_video::tracking::IconChange;
use vast_video::{Aggregation, Settings, TrackingSession};

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

/// Resolve VAST video ads and simulate their tracking
#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Settings file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (possible values: error, warn, info, debug, trace)
    #[arg(short, long, global = true, default_value = "warn")]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a VAST file or URL, following wrappers, and print the video config
    Parse {
        /// Path to the VAST file or URL
        #[arg(short, long)]
        input: String,

        /// Pretty print the output
        #[arg(short, long)]
        pretty: bool,
    },

    /// Resolve, then play the ad against a virtual clock and print every tracker fired
    Simulate {
        /// Path to the VAST file or URL
        #[arg(short, long)]
        input: String,

        /// Video duration in milliseconds
        #[arg(short, long)]
        duration: u32,

        /// Clock step in milliseconds
        #[arg(short, long, default_value_t = 250)]
        step: u32,

        /// Seek back this far once the midpoint is passed
        #[arg(long)]
        seek_back: Option<u32>,
    },

    /// Show how a click-through URL would be handled
    Click {
        #[arg(short, long)]
        url: String,
    },
}

struct VirtualClock {
    position: Cell<u32>,
    duration: u32,
}

impl PlaybackClock for VirtualClock {
    fn current_position_millis(&self) -> Option<u32> {
        Some(self.position.get())
    }

    fn duration_millis(&self) -> Option<u32> {
        Some(self.duration)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    init_logging(cli.log_level)?;

    let settings = Settings::load(cli.config.as_deref())?;

    match &cli.command {
        Commands::Parse { input, pretty } => {
            let aggregation = async_api::resolve_vast(input.clone(), settings, LoggingDispatcher).await?;
            let output = match aggregation {
                Aggregation::Ready(config) => serde_json::to_value(config)?,
                Aggregation::NoAd(reason) => serde_json::json!({ "no_ad": reason }),
            };
            if *pretty {
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                println!("{}", output);
            }
        }
        Commands::Simulate {
            input,
            duration,
            step,
            seek_back,
        } => {
            let aggregation = async_api::resolve_vast(input.clone(), settings, LoggingDispatcher).await?;
            let mut config = match aggregation {
                Aggregation::Ready(config) => config,
                Aggregation::NoAd(reason) => {
                    println!("No ad: {reason}");
                    return Ok(());
                }
            };
            config.duration_millis = Some(*duration);
            simulate(config, *duration, (*step).max(1), *seek_back);
        }
        Commands::Click { url } => {
            println!("{:?}", click::resolve_click_through(url));
        }
    }

    Ok(())
}

fn init_logging(level: LogLevel) -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::from(level))
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| e.to_string())?;
    Ok(())
}

fn simulate(config: vast_video::VastVideoConfig, duration: u32, step: u32, seek_back: Option<u32>) {
    let mut session = TrackingSession::new(config, LoggingDispatcher);
    let clock = VirtualClock {
        position: Cell::new(0),
        duration,
    };
    let mut seek_back = seek_back;

    for url in session.handle_impression(0) {
        println!("{:>8} ms  impression  {url}", 0);
    }

    loop {
        let position = clock.position.get();
        let report = session.tick(&clock);
        for url in &report.fired {
            println!("{position:>8} ms  tracker     {url}");
        }
        match report.icon {
            Some(IconChange::Shown) => println!("{position:>8} ms  icon shown"),
            Some(IconChange::Hidden) => println!("{position:>8} ms  icon hidden"),
            None => {}
        }
        if report.skip_became_available {
            println!("{position:>8} ms  skip available");
        }
        // The virtual player is always fully on screen
        let viewable_after = session
            .config()
            .viewability_tracker
            .as_ref()
            .map(|tracker| tracker.viewable_playtime_millis);
        if viewable_after.is_some_and(|millis| position >= millis) {
            for url in session.handle_viewable(position) {
                println!("{position:>8} ms  viewable    {url}");
            }
        }

        if position >= duration {
            break;
        }
        let next = match seek_back {
            Some(back) if position >= duration / 2 => {
                seek_back = None;
                println!("{position:>8} ms  seek back {back} ms");
                position.saturating_sub(back)
            }
            _ => position.saturating_add(step).min(duration),
        };
        clock.position.set(next);
    }

    for url in session.handle_complete(duration) {
        println!("{duration:>8} ms  complete    {url}");
    }
    for url in session.handle_close(duration) {
        println!("{duration:>8} ms  close       {url}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_installs_once() {
        assert!(init_logging(LogLevel::Debug).is_ok());
        assert!(init_logging(LogLevel::Debug).is_err());
    }

    #[test]
    fn test_cli_parses_global_flags() {
        let cli = Cli::try_parse_from(["vast-video", "click", "--url", "about:blank", "--log-level", "debug"]).unwrap();
        assert_eq!(cli.log_level, LogLevel::Debug);
        assert!(matches!(cli.command, Commands::Click { .. }));
    }
}
