//! # CLI - vgcache Maintenance Shell
//!
//! A REPL over a [`cache::CacheManager`]. Reads commands from stdin, runs
//! them against the cache, and prints one reply per command to stdout.
//! Logs go to stderr so piped sessions stay scriptable.
//!
//! ## Commands
//!
//! ```text
//! TILE pyramid pos [suffix]     Stamp a tile and print its file path
//! ESET surface key_hex h dh     Store an elevation sample (model version 1)
//! EGET surface key_hex          Print "h dh tick" or "(nil)"
//! FETCH url                     Fetch through the cache, print the body size
//! DELFILE url                   Forget a URL and delete its local copy
//! TS / NEWTS                    Print / advance the logical clock
//! GC                            Run one Tile GC and one Elevation GC pass
//! STATS                         Print a cache snapshot
//! COMMIT                        Persist roots and flush the store
//! DELETE                        Delete the cache and reopen it empty
//! EXIT / QUIT                   Close the cache and leave
//! ```
//!
//! ## Configuration
//!
//! `VGCACHE_DIR` selects the cache directory (default: `vgcache`); every
//! other `VGCACHE_*` variable is read by [`config::CacheConfig::from_env`].
//! `RUST_LOG` controls logging (default: `warn`).
//!
//! ## Example
//!
//! ```text
//! $ cargo run -p cli
//! vgcache started (dir=vgcache, tick=-2147483647)
//! > TILE imagery 0123 png
//! vgcache/Tiles/<pyramid id>/012/3.png
//! > ESET dem 0a0b 120 -3
//! OK
//! > EGET dem 0a0b
//! 120 -3 -2147483646
//! > EXIT
//! bye
//! ```

mod shell;

use anyhow::Result;
use cache::CacheManager;
use config::CacheConfig;
use shell::{Reply, Shell};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let dir = PathBuf::from(std::env::var("VGCACHE_DIR").unwrap_or_else(|_| "vgcache".into()));
    let manager = CacheManager::new(CacheConfig::from_env())?;
    match manager.open(&dir) {
        Ok(()) => {}
        // The failed open left the delete sentinel, so this one rebuilds.
        Err(e) if e.needs_rebuild() => {
            tracing::warn!(error = %e, "rebuilding unusable cache");
            manager.open(&dir)?;
        }
        Err(e) => return Err(e.into()),
    }

    println!(
        "vgcache started (dir={}, tick={})",
        dir.display(),
        manager.ts().unwrap_or_default()
    );
    print!("> ");
    io::stdout().flush().ok();

    let mut shell = Shell::new(manager, dir);
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        match shell.execute(&line) {
            Some(Reply::Text(out)) => println!("{out}"),
            Some(Reply::Exit) => break,
            None => {}
        }
        print!("> ");
        io::stdout().flush().ok();
    }

    shell.manager().close(true);
    println!("bye");
    Ok(())
}

#[cfg(test)]
mod tests;
