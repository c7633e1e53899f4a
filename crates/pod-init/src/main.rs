//! Minimal PID 1 for containers.
//!
//! `pod-init [OPTIONS] --- COMMAND... [--- COMMAND...]`
//!
//! Spawns every `---`-separated command, forwards configured signals,
//! reaps all descendants, and once any command exits escalates the
//! rest through the termination sequence. The process exit status is
//! the first non-zero child status observed, in reap order, or 1 on
//! setup failure or termination-sequence exhaustion.

use std::ffi::OsString;
use std::fmt;
use std::time::Instant;

use clap::Parser;
use init_core::{Config, InitResult};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::time::FormatTime;

/// Token separating options from commands and commands from each
/// other. Never passed through to spawned programs.
const DELIMITER: &str = "---";

struct Elapsed(Instant);

impl FormatTime for Elapsed {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> fmt::Result {
        let d = self.0.elapsed();
        let total_secs = d.as_secs();
        let mins = total_secs / 60;
        let secs = total_secs % 60;
        let millis = d.subsec_millis();
        write!(w, "[{mins:02}:{secs:02}:{millis:03}]")
    }
}

#[derive(Parser)]
#[command(
    name = "pod-init",
    version,
    about = "Minimal container init: spawns commands, relays signals, reaps orphans",
    after_help = "Commands follow the first '---' and are separated by further '---' \
                  tokens. Once any command exits, the remaining ones are walked through \
                  the termination sequence, one stage per timeout interval; exhausting \
                  the sequence exits with status 1."
)]
struct Cli {
    /// Seconds to wait between termination stages
    #[arg(short = 't', long = "timeout", default_value_t = 2)]
    timeout: u32,

    /// Ordered comma-separated termination signal sequence
    #[arg(long = "term-sequence", default_value = "TERM,KILL", value_delimiter = ',')]
    term_sequence: Vec<String>,

    /// Comma-separated signals to forward verbatim to children
    #[arg(long = "forward", default_value = "INT", value_delimiter = ',')]
    forward: Vec<String>,

    /// Log supervisor activity to stderr
    #[arg(short, long)]
    verbose: bool,
}

/// Split the raw argument vector at the first delimiter: everything
/// before it is the clap option prefix, everything after is split on
/// further delimiters into command segments.
fn split_argv(args: Vec<OsString>) -> (Vec<OsString>, Vec<Vec<OsString>>) {
    let mut iter = args.into_iter();
    let mut prefix = Vec::new();
    for arg in iter.by_ref() {
        if arg == DELIMITER {
            break;
        }
        prefix.push(arg);
    }
    let mut segments = Vec::new();
    let mut current = Vec::new();
    for arg in iter {
        if arg == DELIMITER {
            segments.push(std::mem::take(&mut current));
        } else {
            current.push(arg);
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }
    (prefix, segments)
}

/// Parse comma-separated signal lists, skipping empty entries so that
/// an explicitly empty sequence reaches config validation as empty.
fn parse_signals(names: &[String]) -> InitResult<Vec<init_core::config::Signal>> {
    names
        .iter()
        .filter(|name| !name.trim().is_empty())
        .map(|name| init_core::config::parse_signal(name))
        .collect()
}

fn build_config(cli: &Cli, segments: Vec<Vec<OsString>>) -> InitResult<Config> {
    Ok(Config {
        termination_signals: parse_signals(&cli.term_sequence)?,
        forward_signals: parse_signals(&cli.forward)?,
        timeout_secs: cli.timeout,
        segments,
    })
}

fn main() {
    let (prefix, segments) = split_argv(std::env::args_os().collect());
    let cli = Cli::parse_from(prefix);

    tracing_subscriber::fmt()
        .with_timer(Elapsed(Instant::now()))
        .with_writer(std::io::stderr)
        .with_max_level(if cli.verbose {
            LevelFilter::DEBUG
        } else {
            LevelFilter::INFO
        })
        .init();

    let result = build_config(&cli, segments).and_then(init_core::run);
    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}
