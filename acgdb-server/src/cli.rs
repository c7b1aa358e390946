//! Manages the CLI, argument parsing and logging.

use anyhow::Context;
use clap::{Arg, Command};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use std::env;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Mutex;

/// Represents arguments passed to the program.
pub struct Args {
    pub command: Subcommand,
    pub directory: PathBuf,
    pub ephemeral: bool,
    pub production: bool,
    pub mirror_interval: u64,
    pub log_config: LogConfig,
}

/// What the program was asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subcommand {
    Run,
    Check,
    Migrate,
    Stats,
}

#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    quiet: bool,
    file: Option<String>,
}

fn app() -> Command<'static> {
    Command::new("acgdb")
        .about("Runs and maintains an acgdb catalog store")
        .arg(
            Arg::new("dir")
                .long("dir")
                .short('d')
                .takes_value(true)
                .value_name("DIR")
                .help("The directory holding the table files [env: ACGDB_DIRECTORY]"),
        )
        .arg(
            Arg::new("ephemeral")
                .long("ephemeral")
                .help("Never write the tables back [env: ACGDB_EPHEMERAL]"),
        )
        .arg(
            Arg::new("interval")
                .long("interval")
                .short('i')
                .takes_value(true)
                .value_name("SECONDS")
                .help("Also save changed tables every SECONDS while running"),
        )
        .arg(
            Arg::new("quiet")
                .long("quiet")
                .short('q')
                .help("Only log warnings and errors"),
        )
        .arg(
            Arg::new("logfile")
                .long("logfile")
                .takes_value(true)
                .value_name("FILE")
                .help("Write the log to FILE instead of the console"),
        )
        .subcommand(Command::new("run").about("Loads the store and keeps it open until Ctrl-C"))
        .subcommand(Command::new("check").about("Reports every dangling reference in the store"))
        .subcommand(Command::new("migrate").about("Upgrades outdated tables and writes them back"))
        .subcommand(Command::new("stats").about("Prints the number of rows of every table"))
}

fn env_flag(name: &str) -> bool {
    env::var(name).map_or(false, |value| !value.is_empty() && value != "0" && value != "false")
}

/// Loads the arguments that were passed to the program, falling back to the environment.
pub fn load_args() -> anyhow::Result<Args> {
    dotenv::dotenv().ok();

    let matches = app().get_matches();

    let command = match matches.subcommand_name() {
        Some("check") => Subcommand::Check,
        Some("migrate") => Subcommand::Migrate,
        Some("stats") => Subcommand::Stats,
        _ => Subcommand::Run,
    };

    let directory = matches
        .value_of("dir")
        .map(String::from)
        .or_else(|| env::var("ACGDB_DIRECTORY").ok())
        .unwrap_or_else(|| "./data".to_string());

    let mirror_interval = match matches.value_of("interval") {
        Some(interval) => interval
            .parse::<u64>()
            .with_context(|| format!("invalid interval `{}`", interval))?,
        None => 0,
    };

    Ok(Args {
        command,
        directory: PathBuf::from(directory),
        ephemeral: matches.is_present("ephemeral") || env_flag("ACGDB_EPHEMERAL"),
        production: env_flag("PRODUCTION"),
        mirror_interval,
        log_config: LogConfig {
            quiet: matches.is_present("quiet"),
            file: matches.value_of("logfile").map(String::from),
        },
    })
}

/// Installs the global subscriber.
///
/// `ACGDB_LOG` overrides the level chosen by `--quiet`.
pub fn init_logging(config: &LogConfig) -> anyhow::Result<()> {
    let level = if config.quiet { "warn" } else { "info" };
    let filter = EnvFilter::try_from_env("ACGDB_LOG").unwrap_or_else(|_| EnvFilter::new(level));

    let (console, file) = match &config.file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("log file `{}` could not be created", path))?;
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file));
            (None, Some(layer))
        }
        None => (Some(tracing_subscriber::fmt::layer().with_target(false)), None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .init();

    Ok(())
}
