//! `scribe-replay`: rebuild a document from an exported revision log.
//!
//! Usage:
//!   scribe-replay [--operation] [PATH]
//!
//! The export `{"checkpoint": {...} | null, "history": {"<id>": {...}}}` is
//! read from PATH, or from stdin when no path is given. Prints the document
//! text, or the composed operation as JSON with `--operation`. Invalid
//! revisions are skipped and reported on stderr; set `RUST_LOG` for more.

use std::io::{self, Read};

use scribe_log::{AdapterConfig, MemoryHub, RevisionLogAdapter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let mut print_operation = false;
    let mut path = None;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--operation" => print_operation = true,
            flag if flag.starts_with("--") => {
                eprintln!("Unknown flag {flag}. Usage: scribe-replay [--operation] [PATH]");
                std::process::exit(1);
            }
            _ => path = Some(arg),
        }
    }

    let input = match path {
        Some(path) => std::fs::read_to_string(&path),
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf).map(|_| buf)
        }
    };
    let input = match input {
        Ok(input) => input,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    match replay(&input, print_operation) {
        Ok(output) => println!("{output}"),
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}

fn replay(input: &str, print_operation: bool) -> Result<String, Box<dyn std::error::Error>> {
    let export: serde_json::Value = serde_json::from_str(input)?;
    let hub = MemoryHub::from_export(&export)?;
    let config = AdapterConfig {
        checkpoint_frequency: 0,
    };
    let mut adapter = RevisionLogAdapter::with_user_id(hub.connect(), "scribe-replay", config);
    adapter.start()?;
    adapter.dispose()?;
    if print_operation {
        Ok(adapter.document().to_string())
    } else {
        Ok(adapter.document_text()?)
    }
}
