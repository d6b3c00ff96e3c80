use std::io::ErrorKind;
use std::time::Duration;

use compat_matrix_core::prelude::{HarnessError, MatrixResult};

use crate::result::ScrapeResult;

/// The path the exporter serves its metrics on.
pub const METRICS_PATH: &str = "/metrics";

/// Fetches the metrics endpoint of one environment.
///
/// Holds the address only, every [Scraper::scrape] is a fresh request. Nothing is retried, the
/// caller decides what a failed scrape means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scraper {
    host: String,
    port: u16,
}

impl Scraper {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}:{}{METRICS_PATH}", self.host, self.port)
    }

    /// Issue a single GET against the metrics endpoint and split the body into lines.
    ///
    /// The `timeout` bounds the whole call, connecting included.
    pub fn scrape(&self, timeout: Duration) -> MatrixResult<ScrapeResult> {
        let url = self.url();
        log::trace!("Scraping '{url}'");

        let agent = ureq::config::Config::builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .new_agent();

        let mut response = agent
            .get(&url)
            .header("Accept", "text/plain")
            .call()
            .map_err(|e| classify_error(&url, timeout, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(HarnessError::ScrapeProtocol {
                url,
                reason: format!("unexpected HTTP status {status}"),
            }
            .into());
        }

        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| classify_error(&url, timeout, e))?;

        let result = ScrapeResult::from_body(&body);
        log::debug!("Scraped {} lines from '{url}'", result.len());

        Ok(result)
    }
}

fn classify_error(url: &str, timeout: Duration, err: ureq::Error) -> anyhow::Error {
    let url = url.to_string();
    match err {
        ureq::Error::Timeout(_) => HarnessError::ScrapeTimeout { url, timeout },
        ureq::Error::Io(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
            HarnessError::ScrapeTimeout { url, timeout }
        }
        ureq::Error::Io(e) => HarnessError::ScrapeConnection {
            url,
            reason: e.to_string(),
        },
        e @ (ureq::Error::ConnectionFailed | ureq::Error::HostNotFound) => {
            HarnessError::ScrapeConnection {
                url,
                reason: e.to_string(),
            }
        }
        e => HarnessError::ScrapeProtocol {
            url,
            reason: e.to_string(),
        },
    }
    .into()
}
