use std::io::Write;
use std::path::PathBuf;
use std::process::Command;
use std::time::{Duration, UNIX_EPOCH};

use clap::{Parser, Subcommand};
use serde::Serialize;

use tagmirror::MirrorConfig;
use tagmirror::cache::DEFAULT_TTL;

#[derive(Parser)]
#[command(
    name = "tagmirror",
    about = "Read files at git tags from a cached local mirror"
)]
struct Cli {
    /// Remote repository (path or URL)
    #[arg(short, long)]
    remote: String,

    /// Mirror directory [default: <user cache dir>/tagmirror/<remote>]
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Seconds a refreshed mirror stays fresh (0 refreshes every time)
    #[arg(long, default_value_t = DEFAULT_TTL.as_secs())]
    ttl: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the remote's tags
    Tags {
        /// Print a JSON array
        #[arg(long)]
        json: bool,
    },

    /// Print a file as it was at a tag
    Read {
        /// Tag name
        tag: String,
        /// Path inside the repository
        path: String,
    },

    /// Run a program inside a temporary checkout of a tag
    Checkout {
        /// Tag name
        tag: String,
        /// Program to run
        program: String,
        /// Arguments for the program
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Refresh the mirror if it is stale
    Refresh {
        /// Refresh even if the mirror is fresh
        #[arg(long)]
        force: bool,
    },

    /// Delete the mirror
    Clear,

    /// Show mirror status
    Status {
        /// Print JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Serialize)]
struct StatusReport {
    remote: String,
    mirror: String,
    exists: bool,
    last_refresh: Option<u64>,
    stale: bool,
    ttl_secs: u64,
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    let mut config = MirrorConfig::new(cli.remote).with_ttl(Duration::from_secs(cli.ttl));
    if let Some(dir) = cli.cache_dir {
        config = config.with_mirror_dir(dir);
    }

    let result = match cli.command {
        Commands::Tags { json } => cmd_tags(&config, json),
        Commands::Read { tag, path } => cmd_read(&config, &tag, &path),
        Commands::Checkout { tag, program, args } => cmd_checkout(&config, &tag, &program, &args),
        Commands::Refresh { force } => cmd_refresh(&config, force),
        Commands::Clear => cmd_clear(&config),
        Commands::Status { json } => cmd_status(&config, json),
    };

    match result {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn cmd_tags(config: &MirrorConfig, json: bool) -> Result<i32, Box<dyn std::error::Error>> {
    let tags = config.reader().tags()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&tags)?);
    } else {
        for tag in tags {
            println!("{}", tag);
        }
    }

    Ok(0)
}

fn cmd_read(config: &MirrorConfig, tag: &str, path: &str) -> Result<i32, Box<dyn std::error::Error>> {
    let contents = config.reader().read_file(path, tag)?;

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&contents)?;
    stdout.flush()?;

    Ok(0)
}

fn cmd_checkout(
    config: &MirrorConfig,
    tag: &str,
    program: &str,
    args: &[String],
) -> Result<i32, Box<dyn std::error::Error>> {
    let status = config
        .reader()
        .with_tag(tag, |dir| Command::new(program).args(args).current_dir(dir).status())??;

    // Killed by a signal, no exit code to pass on
    Ok(status.code().unwrap_or(1))
}

fn cmd_refresh(config: &MirrorConfig, force: bool) -> Result<i32, Box<dyn std::error::Error>> {
    let cache = config.cache_manager();
    let outcome = if force {
        cache.force_refresh()?
    } else {
        cache.ensure_fresh()?
    };

    println!("{}: {}", cache.mirror_path().display(), outcome);

    Ok(0)
}

fn cmd_clear(config: &MirrorConfig) -> Result<i32, Box<dyn std::error::Error>> {
    let cache = config.cache_manager();
    cache.clear()?;

    println!("Cleared {}", cache.mirror_path().display());

    Ok(0)
}

fn cmd_status(config: &MirrorConfig, json: bool) -> Result<i32, Box<dyn std::error::Error>> {
    let cache = config.cache_manager();
    let report = StatusReport {
        remote: cache.remote().to_string(),
        mirror: cache.mirror_path().display().to_string(),
        exists: cache.exists(),
        last_refresh: cache
            .last_refresh()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs()),
        stale: cache.is_stale(),
        ttl_secs: cache.ttl().as_secs(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(0);
    }

    println!("Mirror Status");
    println!("  Remote:       {}", report.remote);
    println!("  Mirror:       {}", report.mirror);
    println!("  Exists:       {}", if report.exists { "yes" } else { "no" });
    println!(
        "  Last refresh: {}",
        report
            .last_refresh
            .map(|secs| secs.to_string())
            .unwrap_or_else(|| "never".to_string())
    );
    println!("  Stale:        {}", if report.stale { "yes" } else { "no" });
    println!("  TTL:          {}s", report.ttl_secs);

    Ok(0)
}
