use crate::shell::{parse_hex, Reply, Shell};
use cache::{CacheManager, FetchError, FetchOutcome, Fetcher};
use config::CacheConfig;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Serves a fixed body for every URL.
struct FixedFetcher(&'static [u8]);

impl Fetcher for FixedFetcher {
    fn fetch(&self, _url: &str, _since: Option<SystemTime>) -> Result<FetchOutcome, FetchError> {
        Ok(FetchOutcome::Fresh(Box::new(Cursor::new(self.0))))
    }
}

fn shell(dir: &Path) -> Shell {
    let config = CacheConfig::default().with_startup_delay(Duration::from_secs(3600));
    let manager = CacheManager::with_fetcher(config, Arc::new(FixedFetcher(b"hello world")));
    manager.open(dir).unwrap();
    Shell::new(manager, dir.to_path_buf())
}

fn run(shell: &mut Shell, line: &str) -> String {
    match shell.execute(line) {
        Some(Reply::Text(s)) => s,
        Some(Reply::Exit) => "<exit>".into(),
        None => String::new(),
    }
}

#[test]
fn hex_keys_parse() {
    assert_eq!(parse_hex("0a1B"), Some(vec![0x0a, 0x1b]));
    assert_eq!(parse_hex(""), None);
    assert_eq!(parse_hex("abc"), None);
    assert_eq!(parse_hex("zz"), None);
}

#[test]
fn elevation_commands_round_trip() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let mut sh = shell(dir.path());
    assert_eq!(run(&mut sh, "EGET dem 0a0b"), "(nil)");
    assert_eq!(run(&mut sh, "ESET dem 0a0b 120 -3"), "OK");
    let reply = run(&mut sh, "eget dem 0a0b");
    assert!(reply.starts_with("120 -3 "), "{reply}");
    assert!(run(&mut sh, "ESET dem xyz 1 1").starts_with("ERR usage"));
    Ok(())
}

#[test]
fn tile_and_clock_commands() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let mut sh = shell(dir.path());
    let t0: i32 = run(&mut sh, "TS").parse()?;
    let path = run(&mut sh, "TILE imagery 0123 png");
    assert!(path.ends_with("3.png"), "{path}");
    assert_eq!(run(&mut sh, "TILE imagery 0123 p.g"), "(nil)");
    let t1: i32 = run(&mut sh, "NEWTS").parse()?;
    assert_eq!(t1, t0 + 2);
    assert!(run(&mut sh, "STATS").contains("tiles=1"));
    Ok(())
}

#[test]
fn fetch_delete_and_maintenance_commands() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let mut sh = shell(dir.path());
    assert_eq!(run(&mut sh, "FETCH http://example.com/a"), "11 bytes");
    assert!(run(&mut sh, "STATS").contains("files=1"));
    assert_eq!(run(&mut sh, "DELFILE http://example.com/a"), "OK");
    assert!(run(&mut sh, "STATS").contains("files=0"));

    assert!(run(&mut sh, "GC").contains("tiles_evicted=0"));
    assert_eq!(run(&mut sh, "COMMIT"), "OK");

    run(&mut sh, "TILE imagery 0123 png");
    assert_eq!(run(&mut sh, "DELETE"), "OK");
    assert!(run(&mut sh, "STATS").contains("tiles=0"));
    Ok(())
}

#[test]
fn unknown_blank_and_exit() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let mut sh = shell(dir.path());
    assert!(sh.execute("   ").is_none());
    assert!(run(&mut sh, "FROB").starts_with("ERR unknown command"));
    assert!(run(&mut sh, "TILE").starts_with("ERR usage"));
    assert_eq!(run(&mut sh, "quit"), "<exit>");
    Ok(())
}
