//! mixcache - operator CLI
//!
//! Downloads resources with the ranged fetcher and inspects cache entries.

use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use mixcache::cache::{Artifact, Codec, Lookup, MissReason};
use mixcache::{Config, RangeFetcher};

/// Namespace whose entries are audio; every other namespace is structured
const AUDIO_NAMESPACE: &str = "audio";

/// CLI command
#[derive(Debug)]
enum Command {
    /// Download a URL into a local file
    Fetch { url: String, output: PathBuf },
    /// Print a cached entry
    Show { namespace: String, key: String },
    /// Print the on-disk path of a cache entry
    Locate { namespace: String, key: String },
    /// Show help
    Help,
}

fn print_help() {
    eprintln!(
        r#"mixcache - ranged downloads and a disk cache for audio artifacts

USAGE:
    mixcache fetch <url> <output>
    mixcache show <namespace> <key>
    mixcache locate <namespace> <key>
    mixcache help

COMMANDS:
    fetch   Download <url> with parallel range requests into <output>
    show    Print the entry for <key>: JSON for structured namespaces,
            a summary for the "audio" namespace
    locate  Print the file that holds (or would hold) the entry for <key>
    help    Show this help message

ENVIRONMENT:
    MIXCACHE_DIR           Cache root (default: platform cache dir/mixcache)
    MIXCACHE_CHUNK_SIZE    Bytes per range request (default: 1000000)
    MIXCACHE_CONCURRENCY   Range requests in flight (default: 12)
    MIXCACHE_TIMEOUT_SECS  Abort a fetch after this many seconds
    MIXCACHE_MAX_SIZE      Refuse resources larger than this many bytes
    RUST_LOG               Log level (trace, debug, info, warn, error)
"#
    );
}

fn parse_args() -> Result<Command> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        return Ok(Command::Help);
    }

    let pair = |usage: &str| -> Result<(String, String)> {
        if args.len() < 4 {
            return Err(anyhow!("Usage: mixcache {}", usage));
        }
        Ok((args[2].clone(), args[3].clone()))
    };

    match args[1].as_str() {
        "fetch" => {
            let (url, output) = pair("fetch <url> <output>")?;
            Ok(Command::Fetch {
                url,
                output: PathBuf::from(output),
            })
        }
        "show" => {
            let (namespace, key) = pair("show <namespace> <key>")?;
            Ok(Command::Show { namespace, key })
        }
        "locate" => {
            let (namespace, key) = pair("locate <namespace> <key>")?;
            Ok(Command::Locate { namespace, key })
        }
        "help" | "--help" | "-h" => Ok(Command::Help),
        _ => {
            eprintln!("Unknown command: {}", args[1]);
            Ok(Command::Help)
        }
    }
}

fn codec_for(namespace: &str) -> Codec {
    if namespace == AUDIO_NAMESPACE {
        Codec::BinaryAudio
    } else {
        Codec::Structured
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let log_level = env::var("RUST_LOG")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let command = match parse_args() {
        Ok(cmd) => cmd,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            std::process::exit(1);
        }
    };

    let config = Config::from_env();

    match command {
        Command::Fetch { url, output } => {
            let received = Arc::new(AtomicU64::new(0));
            let counter = Arc::clone(&received);
            let fetcher = RangeFetcher::new(config.fetcher.clone())
                .context("Failed to create HTTP client")?
                .with_progress(move |n| {
                    counter.fetch_add(n, Ordering::Relaxed);
                });

            info!(url = %url, output = %output.display(), "Starting download...");
            let data = fetcher
                .fetch(&url)
                .await
                .with_context(|| format!("Failed to download {}", url))?;

            tokio::fs::write(&output, &data)
                .await
                .with_context(|| format!("Failed to write {}", output.display()))?;

            info!(
                size = data.len(),
                received = received.load(Ordering::Relaxed),
                output = %output.display(),
                "Saved download"
            );
        }
        Command::Show { namespace, key } => {
            let store = config
                .cache_root
                .namespace(&namespace, codec_for(&namespace))
                .with_context(|| format!("Failed to open namespace {}", namespace))?;

            match store.get(&key)? {
                Lookup::Hit(Artifact::Structured(value)) => {
                    println!("{}", serde_json::to_string_pretty(&value)?);
                }
                Lookup::Hit(Artifact::Audio(audio)) => {
                    println!(
                        "sample_rate={} channels={} frames={} duration={:.2}s",
                        audio.sample_rate,
                        audio.channel_count(),
                        audio.frame_count(),
                        audio.duration_secs()
                    );
                }
                Lookup::Miss(MissReason::Absent) => {
                    println!("No entry for {:?} in {}", key, namespace);
                }
                Lookup::Miss(MissReason::Corrupt(reason)) => {
                    println!("Entry for {:?} in {} is unreadable: {}", key, namespace, reason);
                }
            }
        }
        Command::Locate { namespace, key } => {
            let store = config
                .cache_root
                .namespace(&namespace, codec_for(&namespace))
                .with_context(|| format!("Failed to open namespace {}", namespace))?;
            println!("{}", store.entry_path(&key).display());
        }
        Command::Help => {
            print_help();
        }
    }

    Ok(())
}
