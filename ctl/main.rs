#![forbid(unsafe_code)]

//! `agent-beacon-ctl` — local CLI for finding and attaching to sessions.
//!
//! Scans the session registry, prints what it finds, and runs the attach
//! handshake against a chosen session.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};

use agent_beacon::attach::client::{attach, AttachOptions};
use agent_beacon::clock::SystemClock;
use agent_beacon::config::GlobalConfig;
use agent_beacon::models::descriptor::DiscoveredSession;
use agent_beacon::registry::{discover, reap_stale, select_session};

#[derive(Debug, Parser)]
#[command(
    name = "agent-beacon-ctl",
    about = "Discover and attach to local agent sessions",
    version,
    long_about = None
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Registry directory to scan instead of the configured one.
    #[arg(long, global = true)]
    registry_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List discovered sessions, freshest first.
    List {
        /// Include stale sessions.
        #[arg(long)]
        all: bool,
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
        /// Staleness threshold in milliseconds.
        #[arg(long)]
        stale_ms: Option<u64>,
    },

    /// Attach to a session by id or unique id prefix, or the freshest
    /// healthy one.
    Attach {
        /// Session id or prefix.
        session: Option<String>,
        /// Handshake deadline in milliseconds.
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Remove descriptors of stale sessions whose process has exited.
    Prune {
        /// Staleness threshold in milliseconds.
        #[arg(long)]
        stale_ms: Option<u64>,
    },
}

fn main() -> ExitCode {
    let args = Cli::parse();

    let mut config = match GlobalConfig::load_or_default(args.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {err}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(dir) = args.registry_dir {
        config.registry_dir = Some(dir);
    }

    match args.command {
        Command::List {
            all,
            json,
            stale_ms,
        } => list(&config, all, json, stale_ms),
        Command::Attach {
            session,
            timeout_ms,
        } => attach_session(&config, session.as_deref(), timeout_ms),
        Command::Prune { stale_ms } => prune(&config, stale_ms),
    }
}

fn stale_threshold(config: &GlobalConfig, stale_ms: Option<u64>) -> Duration {
    stale_ms.map_or_else(|| config.stale_threshold(), Duration::from_millis)
}

fn list(config: &GlobalConfig, all: bool, json: bool, stale_ms: Option<u64>) -> ExitCode {
    let sessions: Vec<DiscoveredSession> = discover(
        &config.registry_dir(),
        stale_threshold(config, stale_ms),
        &SystemClock,
    )
    .into_iter()
    .filter(|s| all || s.healthy)
    .collect();

    if json {
        match serde_json::to_string_pretty(&sessions) {
            Ok(body) => println!("{body}"),
            Err(err) => {
                eprintln!("Error: {err}");
                return ExitCode::FAILURE;
            }
        }
        return ExitCode::SUCCESS;
    }

    if sessions.is_empty() {
        println!("No sessions found.");
        return ExitCode::SUCCESS;
    }
    println!(
        "{:<38} {:<20} {:>8} {:<9} {:>10}  STATE",
        "SESSION", "NAME", "PID", "STATUS", "AGE(ms)"
    );
    for s in &sessions {
        let d = &s.descriptor;
        let status = format!("{:?}", d.status).to_lowercase();
        let age = if s.age_ms == u64::MAX {
            "-".to_owned()
        } else {
            s.age_ms.to_string()
        };
        println!(
            "{:<38} {:<20} {:>8} {:<9} {:>10}  {}",
            d.session_id,
            d.display_name,
            d.pid,
            status,
            age,
            if s.healthy { "healthy" } else { "stale" }
        );
    }
    ExitCode::SUCCESS
}

fn attach_session(
    config: &GlobalConfig,
    query: Option<&str>,
    timeout_ms: Option<u64>,
) -> ExitCode {
    let sessions = discover(
        &config.registry_dir(),
        config.stale_threshold(),
        &SystemClock,
    );
    let Some(target) = select_session(&sessions, query) else {
        match query {
            Some(query) => eprintln!("Error: no unique session matches '{query}'"),
            None => eprintln!("Error: no healthy session found"),
        }
        return ExitCode::FAILURE;
    };

    let options = AttachOptions {
        timeout: timeout_ms.map_or_else(|| config.attach_timeout(), Duration::from_millis),
        ..AttachOptions::default()
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Error: failed to build tokio runtime: {err}");
            return ExitCode::FAILURE;
        }
    };
    let outcome = runtime.block_on(attach(&target.descriptor, &options));

    let report = serde_json::to_string_pretty(&outcome.to_json()).unwrap_or_default();
    println!("{report}");
    if outcome.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn prune(config: &GlobalConfig, stale_ms: Option<u64>) -> ExitCode {
    let removed = reap_stale(
        &config.registry_dir(),
        stale_threshold(config, stale_ms),
        &SystemClock,
    );
    for path in &removed {
        println!("removed {}", path.display());
    }
    println!("{} descriptor(s) pruned", removed.len());
    ExitCode::SUCCESS
}
