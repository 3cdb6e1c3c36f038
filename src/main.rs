use std::error::Error;
use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

use radar_wrangler::config::{WranglerConfig, resolve_config_path};
use radar_wrangler::ingest::decode::ExternalConverter;
use radar_wrangler::logging::{self, LogLevel, Stage};
use radar_wrangler::pipeline::{self, RunOptions};
use radar_wrangler::report::{self, RunReport};

#[derive(Parser, Debug)]
#[command(
    name = "radar_wrangler",
    version,
    about = "Extracts, converts and gap-fills radar archives for named storm events"
)]
struct Cli {
    /// TOML config (falls back to $WRANGLER_CONFIG, then ./wrangler.toml)
    #[arg(short = 'c', long = "config", global = true)]
    config: Option<PathBuf>,

    /// Append log lines to this file
    #[arg(long = "log-file", global = true)]
    log_file: Option<String>,

    /// Show debug messages with timestamps
    #[arg(short = 'v', long = "verbose", action = ArgAction::SetTrue, global = true)]
    verbose: bool,

    /// Redo extraction and decoding even if their outputs exist
    #[arg(long = "force", action = ArgAction::SetTrue, global = true)]
    force: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the archive-time window of every event
    Windows,
    /// Select and stage archive files for every event
    Extract,
    /// Decode staged files into the artifact store
    Decode,
    /// Write the missing-files table and fill gaps
    Fill,
    /// Write per-category statistics
    Summarize,
    /// Run every stage in order
    Run,
}

fn main() {
    if let Err(e) = run() {
        logging::error(Stage::System, None, &e.to_string());
        eprintln!("radar_wrangler: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let level = if cli.verbose { LogLevel::Debug } else { LogLevel::Info };
    logging::init_logger(level, cli.log_file.as_deref(), cli.verbose);

    let config_path = resolve_config_path(cli.config.as_deref());
    let config = WranglerConfig::load(&config_path)?;
    logging::debug(
        Stage::System,
        None,
        &format!("config loaded from {}", config_path.display()),
    );

    let banner = format!("*{:^58}*", "Radar data wrangler");
    println!("{}", "*".repeat(banner.len()));
    println!("{}", banner);
    println!("{}", "*".repeat(banner.len()));

    match cli.command {
        Command::Windows => {
            let (_, windows) = pipeline::load_windows(&config)?;
            for w in windows {
                println!(
                    "|{:<18}| start: {} | end: {} |",
                    w.label,
                    w.start.format("%Y%m%d.%H%M"),
                    w.end.format("%Y%m%d.%H%M")
                );
            }
        }
        Command::Extract => {
            let mut report = RunReport::new();
            let (events, windows) = pipeline::load_windows(&config)?;
            report.summary.events = events.len();
            pipeline::extract(&config, &windows, &mut report)?;
            report::print_summary(&report);
        }
        Command::Decode => {
            let mut report = RunReport::new();
            let converter = ExternalConverter::new(
                &config.paths.converter_dir,
                config.paths.scratch_dir.as_deref(),
            )?;
            pipeline::decode_staged(&config, &converter, &mut report)?;
            report::print_summary(&report);
        }
        Command::Fill => {
            let mut report = RunReport::new();
            let (events, _) = pipeline::load_windows(&config)?;
            report.summary.events = events.len();
            pipeline::fill_gaps(&config, &events, &mut report)?;
            report::print_summary(&report);
        }
        Command::Summarize => {
            for s in pipeline::summarize(&config)? {
                println!("{:>5}: |mu: {:6.3} |std: {:6.3}", s.category.as_str(), s.mean, s.std);
            }
        }
        Command::Run => {
            let converter = ExternalConverter::new(
                &config.paths.converter_dir,
                config.paths.scratch_dir.as_deref(),
            )?;
            let report = pipeline::run(&config, &converter, RunOptions { force: cli.force })?;
            report::print_summary(&report);
        }
    }
    Ok(())
}
