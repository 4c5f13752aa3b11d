//! Conditional network fetch backing [`crate::CacheManager::input_stream`].
//!
//! The cache only needs one primitive: "give me the body of this URL unless
//! it has not changed since `t`". [`Fetcher`] is that primitive;
//! [`HttpFetcher`] implements it over a blocking `reqwest` client and tests
//! substitute an in-memory fake.

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderValue, CACHE_CONTROL, IF_MODIFIED_SINCE};
use reqwest::StatusCode;
use std::io::{self, Read};
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tracing::debug;

/// User agent sent with every request.
const USER_AGENT: &str = concat!("vgcache/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with something other than 200 or 304.
    #[error("unexpected http status {0}")]
    Status(u16),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Result of a conditional fetch.
pub enum FetchOutcome {
    /// A body newer than the local copy (or there was no local copy).
    Fresh(Box<dyn Read + Send>),
    /// The local copy is current.
    NotModified,
}

impl std::fmt::Debug for FetchOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchOutcome::Fresh(_) => f.write_str("Fresh(..)"),
            FetchOutcome::NotModified => f.write_str("NotModified"),
        }
    }
}

/// Blocking conditional GET.
pub trait Fetcher: Send + Sync {
    fn fetch(
        &self,
        url: &str,
        if_modified_since: Option<SystemTime>,
    ) -> Result<FetchOutcome, FetchError>;
}

/// Formats `t` as an RFC 7231 IMF-fixdate.
pub fn http_date(t: SystemTime) -> String {
    let dt: DateTime<Utc> = t.into();
    dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// [`Fetcher`] over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(
        &self,
        url: &str,
        if_modified_since: Option<SystemTime>,
    ) -> Result<FetchOutcome, FetchError> {
        let mut request = self
            .client
            .get(url)
            .header(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        if let Some(t) = if_modified_since {
            request = request.header(IF_MODIFIED_SINCE, http_date(t));
        }
        let response = request.send()?;
        match response.status() {
            StatusCode::OK => Ok(FetchOutcome::Fresh(Box::new(response))),
            StatusCode::NOT_MODIFIED => {
                debug!(url, "not modified");
                Ok(FetchOutcome::NotModified)
            }
            other => Err(FetchError::Status(other.as_u16())),
        }
    }
}
