//! # CLI — BasaltKV interactive shell
//!
//! A REPL over the storage engine. Reads commands from stdin, executes them,
//! prints results to stdout. Works interactively and scripted (pipe commands
//! via stdin).
//!
//! ## Commands
//!
//! ```text
//! SET key value    Insert or overwrite a key
//! GET key          Look up a key (prints value or "(nil)")
//! DEL key          Delete a key (writes a tombstone)
//! SYNC             Force all buffered data onto disk
//! TREE             Print the LSM tree shape
//! STATS            Print engine debug info
//! EXIT / QUIT      Shut down gracefully
//! ```
//!
//! ## Configuration
//!
//! ```text
//! BASALT_DIR          database directory       (default: "basalt_data")
//! BASALT_MEMTABLE_KB  rollover threshold, KiB  (default: 4096 = 4 MiB)
//! BASALT_WAL_FSYNC    fsync every WAL append   (default: "false")
//! RUST_LOG            tracing filter           (default: "info")
//! ```

use anyhow::Result;
use engine::{Engine, Options};
use std::io::{self, BufRead, Write};
use tracing_subscriber::EnvFilter;

/// Reads a configuration value from the environment, falling back to `default`.
fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let db_dir = env_or("BASALT_DIR", "basalt_data");
    let memtable_kb: usize = env_or("BASALT_MEMTABLE_KB", "4096").parse().unwrap_or(4096);
    let wal_fsync: bool = env_or("BASALT_WAL_FSYNC", "false").parse().unwrap_or(false);

    let opts = Options {
        memtable_max_bytes: memtable_kb * 1024,
        wal_fsync,
        ..Options::default()
    };
    let engine = Engine::open_with_options(&db_dir, opts)?;

    tracing::info!(db_dir = %db_dir, memtable_kb, wal_fsync, "engine started");
    println!("basalt ready (dir={}, seq={})", db_dir, engine.seq());
    println!("Commands: SET key value | GET key | DEL key | SYNC | TREE | STATS | EXIT");
    print!("> ");
    io::stdout().flush().ok();

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        if let Some(cmd) = parts.next() {
            match cmd.to_uppercase().as_str() {
                "SET" => {
                    if let Some(k) = parts.next() {
                        let v: String = parts.collect::<Vec<&str>>().join(" ");
                        match engine.set(k.as_bytes().to_vec(), v.into_bytes()) {
                            Ok(()) => println!("OK"),
                            Err(e) => println!("ERR set failed: {}", e),
                        }
                    } else {
                        println!("ERR usage: SET key value");
                    }
                }
                "GET" => {
                    if let Some(k) = parts.next() {
                        match engine.get(k.as_bytes()) {
                            Ok(Some(v)) => println!("{}", String::from_utf8_lossy(&v)),
                            Ok(None) => println!("(nil)"),
                            Err(e) => println!("ERR read failed: {}", e),
                        }
                    } else {
                        println!("ERR usage: GET key");
                    }
                }
                "DEL" => {
                    if let Some(k) = parts.next() {
                        match engine.del(k.as_bytes().to_vec()) {
                            Ok(()) => println!("OK"),
                            Err(e) => println!("ERR del failed: {}", e),
                        }
                    } else {
                        println!("ERR usage: DEL key");
                    }
                }
                "SYNC" => match engine.sync() {
                    Ok(()) => println!("OK"),
                    Err(e) => println!("ERR sync failed: {}", e),
                },
                "TREE" => {
                    print!("{}", engine.debug_print_tree());
                }
                "STATS" => {
                    println!("{:?}", engine);
                }
                "EXIT" | "QUIT" => {
                    println!("bye");
                    break;
                }
                other => {
                    println!("unknown command: {}", other);
                }
            }
        }

        print!("> ");
        io::stdout().flush().ok();
    }

    Ok(())
}
