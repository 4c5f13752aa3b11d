use crate::fetch::{FetchError, FetchOutcome, Fetcher};
use crate::state::OpenState;
use crate::CacheManager;
use config::CacheConfig;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Collectors never wake up on their own; tests drive them through
/// `run_gc_pass`.
pub fn quiet_config() -> CacheConfig {
    CacheConfig::default()
        .with_startup_delay(Duration::from_secs(3600))
        .with_idle_backoff(Duration::from_secs(3600))
}

#[derive(Clone)]
pub enum Reply {
    Fresh(Vec<u8>),
    NotModified,
    Fail,
}

/// In-memory [`Fetcher`] that records every request.
#[derive(Default)]
pub struct MockFetcher {
    replies: Mutex<HashMap<String, Reply>>,
    pub requests: Mutex<Vec<(String, Option<SystemTime>)>>,
}

impl MockFetcher {
    pub fn reply(&self, url: &str, reply: Reply) {
        self.replies.lock().insert(url.to_string(), reply);
    }

    pub fn last_request(&self) -> Option<(String, Option<SystemTime>)> {
        self.requests.lock().last().cloned()
    }
}

impl Fetcher for MockFetcher {
    fn fetch(
        &self,
        url: &str,
        if_modified_since: Option<SystemTime>,
    ) -> Result<FetchOutcome, FetchError> {
        self.requests
            .lock()
            .push((url.to_string(), if_modified_since));
        match self.replies.lock().get(url).cloned() {
            Some(Reply::Fresh(body)) => Ok(FetchOutcome::Fresh(Box::new(Cursor::new(body)))),
            Some(Reply::NotModified) => Ok(FetchOutcome::NotModified),
            Some(Reply::Fail) | None => Err(FetchError::Status(503)),
        }
    }
}

pub fn manager_with(config: CacheConfig) -> (CacheManager, Arc<MockFetcher>) {
    let fetcher = Arc::new(MockFetcher::default());
    let manager = CacheManager::with_fetcher(config, fetcher.clone());
    (manager, fetcher)
}

pub fn open_manager(dir: &Path) -> (CacheManager, Arc<MockFetcher>) {
    let (manager, fetcher) = manager_with(quiet_config());
    manager.open(dir).unwrap();
    (manager, fetcher)
}

pub fn state(manager: &CacheManager) -> Arc<OpenState> {
    manager.inner.live_state().expect("manager is open")
}

/// Moves the eviction cutoff as the Tile GC would.
pub fn set_cutoff(manager: &CacheManager, cut: i32) -> i32 {
    state(manager).clock.advance_gc_cutoff(cut)
}

pub fn read_all(mut stream: crate::InputStream) -> Vec<u8> {
    let mut buf = Vec::new();
    std::io::Read::read_to_end(&mut stream, &mut buf).unwrap();
    buf
}
