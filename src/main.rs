//! mobhunt - perceive, decide, act.
//!
//! ```bash
//! mobhunt init
//! mobhunt check
//! mobhunt run --replay detections.jsonl
//! mobhunt run --replay detections.jsonl --live-input   # needs --features input
//! ```

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use mobhunt::capture::RegionFrameSource;
use mobhunt::cli::{
    print_banner, print_config, print_error, print_info, print_success, print_summary, print_warning,
};
use mobhunt::detection::ReplayDetector;
use mobhunt::input::mock::MockSimulator;
use mobhunt::input::InputSimulator;
use mobhunt::logging::{self, LogOptions};
use mobhunt::{ConfigManager, ControlInbox, ControlSignal, HuntConfig, HuntLoop, RunLimits};

#[derive(Parser)]
#[command(name = "mobhunt")]
#[command(author = "G-Tech SD")]
#[command(version)]
#[command(about = "Detection-driven hunting controller for side-scrolling games")]
struct Args {
    /// Configuration file (default: <config dir>/mobhunt/config.toml)
    #[arg(short, long, global = true, env = "MOBHUNT_CONFIG")]
    config: Option<PathBuf>,

    /// Show debug output
    #[arg(long, global = true)]
    debug: bool,

    /// Log as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Show the effective configuration
    Show,
    /// Load and validate the configuration
    Check,
    /// Run the hunt loop
    Run {
        /// Recorded detections, one JSON array per line
        #[arg(long, value_name = "JSONL")]
        replay: PathBuf,

        /// Start the recording over when it ends
        #[arg(long)]
        loop_replay: bool,

        /// Drive the real mouse and keyboard (DANGEROUS)
        #[arg(long)]
        live_input: bool,

        /// Stop after this many cycles
        #[arg(long, value_name = "N")]
        max_cycles: Option<u64>,

        /// Seed for the random search pattern
        #[arg(long)]
        seed: Option<u64>,
    },
}

fn config_manager(path: &Option<PathBuf>) -> ConfigManager {
    match path {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new(),
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(e) = run(args).await {
        print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let manager = config_manager(&args.config);

    match args.command {
        Commands::Init { force } => {
            if manager.exists() && !force {
                print_warning(&format!(
                    "{} already exists (use --force to overwrite)",
                    manager.path().display()
                ));
                return Ok(());
            }
            manager
                .save(&HuntConfig::default())
                .with_context(|| format!("writing {}", manager.path().display()))?;
            print_success(&format!("Wrote {}", manager.path().display()));
        }
        Commands::Show => {
            let config = manager.load().context("loading configuration")?;
            print_info(&format!("Configuration: {}", manager.path().display()));
            print_config(&config);
        }
        Commands::Check => {
            manager.load().context("configuration is invalid")?;
            print_success(&format!("{} is valid", manager.path().display()));
        }
        Commands::Run {
            replay,
            loop_replay,
            live_input,
            max_cycles,
            seed,
        } => {
            let config = manager.load().context("loading configuration")?;
            let options = LogOptions::from_config(&config.logging)
                .with_debug(args.debug)
                .with_json(args.log_json);
            logging::init(&options).context("initializing logging")?;

            let mut detector = ReplayDetector::from_path(&replay)
                .with_context(|| format!("loading replay {}", replay.display()))?
                .looping(loop_replay);
            let frames = RegionFrameSource::new(config.capture_region);
            let input = select_input(live_input)?;

            print_banner();
            let mut hunt = HuntLoop::new(config, input)?;
            if let Some(seed) = seed {
                hunt = hunt.with_search_seed(seed);
            }

            let inbox = hunt.inbox();
            install_controls(inbox)?;
            print_info("Type p + Enter to pause/resume, q + Enter (or Ctrl+C) to stop");

            let snapshot = hunt
                .run(&frames, &mut detector, RunLimits { max_cycles })
                .await?;
            if let Some(cause) = hunt.stop_cause() {
                print_info(&format!("Session ended: {}", cause));
            }
            print_summary(&snapshot);
        }
    }
    Ok(())
}

fn select_input(live: bool) -> anyhow::Result<Arc<dyn InputSimulator>> {
    if !live {
        return Ok(Arc::new(MockSimulator::new()));
    }

    #[cfg(feature = "input")]
    {
        let sim = mobhunt::input::enigo_backend::EnigoSimulator::new()
            .context("opening the input device")?;
        print_warning("Live input enabled: move the pointer into the failsafe corner to stop");
        Ok(Arc::new(sim))
    }

    #[cfg(not(feature = "input"))]
    {
        anyhow::bail!("--live-input needs a build with `--features input`")
    }
}

/// Ctrl+C and stdin keys feed the control inbox.
fn install_controls(inbox: ControlInbox) -> anyhow::Result<()> {
    let ctrlc_inbox = inbox.clone();
    ctrlc::set_handler(move || ctrlc_inbox.request_stop())
        .context("installing Ctrl+C handler")?;

    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            match line.trim() {
                "p" | "P" => inbox.send(ControlSignal::TogglePause),
                "q" | "Q" => {
                    inbox.send(ControlSignal::Stop);
                    break;
                }
                _ => {}
            }
        }
    });
    Ok(())
}
