use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio::sync::Semaphore;

use crate::error::RssError;

/// Hard per-fetch timeout; a feed host that never responds must not stall
/// the ingester indefinitely.
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// At most this many feed fetches run concurrently, so a slow or
/// misbehaving host can't monopolize the ingester's connection budget.
const MAX_CONCURRENT_FETCHES: usize = 2;

const USER_AGENT: &str = "seedcore/0.1";

/// Bounded-concurrency HTTP fetcher shared by every subscribed feed.
#[derive(Clone)]
pub struct FetchPool {
    client: Client,
    permits: Arc<Semaphore>,
}

impl FetchPool {
    /// Build a fetch pool with the default concurrency limit and timeout.
    ///
    /// # Errors
    ///
    /// Returns [`RssError::ClientBuild`] if the underlying HTTP client
    /// cannot be constructed.
    pub fn new() -> Result<Self, RssError> {
        let client = Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(RssError::ClientBuild)?;
        Ok(Self { client, permits: Arc::new(Semaphore::new(MAX_CONCURRENT_FETCHES)) })
    }

    /// Fetch `url`'s body, queuing behind the concurrency limit if every
    /// permit is already in use.
    ///
    /// # Errors
    ///
    /// Returns [`RssError::Fetch`] if the request fails or times out.
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, RssError> {
        let _permit = self.permits.acquire().await.expect("semaphore is never closed");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| RssError::Fetch { url: url.to_string(), source })?
            .error_for_status()
            .map_err(|source| RssError::Fetch { url: url.to_string(), source })?;
        let bytes = response
            .bytes()
            .await
            .map_err(|source| RssError::Fetch { url: url.to_string(), source })?;
        Ok(bytes.to_vec())
    }
}
