// Catalog fetch: pulls hotels, rooms and countries from the REST backend and loads them into an engine
use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::backend::{assemble_listings, CountriesPayload, HotelsPayload, RoomsPayload};
use crate::config::{ClientConfig, ClientError, RetryConfig};
use crate::criteria::FilterError;
use crate::engine::CatalogFilterEngine;
use crate::models::{CountryRecord, ListingRecord};
use crate::response_cache::ResponseCache;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("API error: {status_code} - {message}")]
    Status {
        status_code: u16,
        message: String,
        is_retryable: bool,
    },

    #[error("Could not decode {endpoint}: {message}")]
    Decode { endpoint: String, message: String },
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Network(_) | FetchError::Timeout(_) => true,
            FetchError::Status { is_retryable, .. } => *is_retryable,
            FetchError::Decode { .. } => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum LoadError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Filter(#[from] FilterError),
}

/// Where the engine's catalog comes from.
#[async_trait]
pub trait CatalogSource: Send + Sync + 'static {
    async fn fetch_countries(&self) -> Result<Vec<CountryRecord>, FetchError>;

    // Listings with their rooms attached
    async fn fetch_listings(&self) -> Result<Vec<ListingRecord>, FetchError>;
}

/// Fetches both collections concurrently and replaces the engine's catalog.
/// On failure the engine keeps what it had.
pub async fn load_catalog<S>(source: &S, engine: &mut CatalogFilterEngine) -> Result<(), FetchError>
where
    S: CatalogSource + ?Sized,
{
    let (countries, listings) =
        futures::try_join!(source.fetch_countries(), source.fetch_listings())?;
    engine.load(listings, countries);
    Ok(())
}

/// Like [`load_catalog`], keeping only listings of the country named `country_name`.
pub async fn load_scoped_catalog<S>(
    source: &S,
    engine: &mut CatalogFilterEngine,
    country_name: &str,
) -> Result<(), LoadError>
where
    S: CatalogSource + ?Sized,
{
    let (countries, listings) =
        futures::try_join!(source.fetch_countries(), source.fetch_listings())?;
    engine.load_scoped_to_country(listings, countries, country_name)?;
    Ok(())
}

#[derive(Debug, Default)]
struct ClientCounters {
    requests_sent: AtomicUsize,
    requests_succeeded: AtomicUsize,
    requests_failed: AtomicUsize,
    requests_retried: AtomicUsize,
    cache_hits: AtomicUsize,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ClientStats {
    pub requests_sent: usize,
    pub requests_succeeded: usize,
    pub requests_failed: usize,
    pub requests_retried: usize,
    pub cache_hits: usize,
}

pub struct HttpCatalogClient {
    http: reqwest::Client,
    config: ClientConfig,
    cache: ResponseCache,
    counters: ClientCounters,
}

impl HttpCatalogClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| ClientError::InitError(e.to_string()))?;

        Ok(Self {
            http,
            cache: ResponseCache::new(config.cache_config.clone()),
            config,
            counters: ClientCounters::default(),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Drops cached bodies so the next fetch hits the backend.
    pub fn invalidate_cache(&self) -> usize {
        self.cache.invalidate(Some(self.config.base_url.as_str()))
    }

    pub fn stats(&self) -> ClientStats {
        ClientStats {
            requests_sent: self.counters.requests_sent.load(Ordering::SeqCst),
            requests_succeeded: self.counters.requests_succeeded.load(Ordering::SeqCst),
            requests_failed: self.counters.requests_failed.load(Ordering::SeqCst),
            requests_retried: self.counters.requests_retried.load(Ordering::SeqCst),
            cache_hits: self.counters.cache_hits.load(Ordering::SeqCst),
        }
    }

    // Exponential backoff with jitter
    pub fn calculate_backoff(retry_attempt: u32, config: &RetryConfig) -> Duration {
        let base_backoff_ms = (config.initial_backoff_ms as f64
            * config.backoff_multiplier.powf(retry_attempt as f64))
        .min(config.max_backoff_ms as f64);

        let jitter = rand::random::<f64>() * config.jitter_factor * base_backoff_ms;
        let backoff_ms = base_backoff_ms * (1.0 - config.jitter_factor / 2.0) + jitter;

        Duration::from_millis(backoff_ms as u64)
    }

    /// Fetches and decodes `path`. Only bodies that decode are cached.
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, FetchError> {
        let url = self.config.url(path);
        if let Some(body) = self.cache.get(&url) {
            match decode(path, &body) {
                Ok(payload) => {
                    debug!("Serving {} from cache", url);
                    self.counters.cache_hits.fetch_add(1, Ordering::SeqCst);
                    return Ok(payload);
                }
                Err(err) => {
                    warn!("Dropping cached body of {}: {}", url, err);
                    self.cache.remove(&url);
                }
            }
        }

        let body = self.fetch_body(&url).await?;
        let payload = decode(path, &body)?;
        self.cache.store(&url, body, None);
        Ok(payload)
    }

    async fn fetch_body(&self, url: &str) -> Result<Bytes, FetchError> {
        let retry = &self.config.retry_config;
        let mut attempt = 0;
        loop {
            self.counters.requests_sent.fetch_add(1, Ordering::SeqCst);
            match self.send(url).await {
                Ok(body) => {
                    self.counters.requests_succeeded.fetch_add(1, Ordering::SeqCst);
                    return Ok(body);
                }
                Err(err) if err.is_retryable() && attempt < retry.max_retries => {
                    let backoff = Self::calculate_backoff(attempt, retry);
                    warn!(
                        "GET {} failed ({}), retrying in {}ms",
                        url,
                        err,
                        backoff.as_millis()
                    );
                    self.counters.requests_retried.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(err) => {
                    warn!("GET {} failed: {}", url, err);
                    self.counters.requests_failed.fetch_add(1, Ordering::SeqCst);
                    return Err(err);
                }
            }
        }
    }

    async fn send(&self, url: &str) -> Result<Bytes, FetchError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status_code: status.as_u16(),
                message: status
                    .canonical_reason()
                    .unwrap_or("unexpected status")
                    .to_string(),
                is_retryable: status.is_server_error()
                    || status == reqwest::StatusCode::TOO_MANY_REQUESTS,
            });
        }

        response.bytes().await.map_err(|e| self.transport_error(e))
    }

    fn transport_error(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout(self.config.timeout_ms)
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

fn decode<T: DeserializeOwned>(endpoint: &str, body: &[u8]) -> Result<T, FetchError> {
    serde_json::from_slice(body).map_err(|e| FetchError::Decode {
        endpoint: endpoint.to_string(),
        message: e.to_string(),
    })
}

#[async_trait]
impl CatalogSource for HttpCatalogClient {
    async fn fetch_countries(&self) -> Result<Vec<CountryRecord>, FetchError> {
        let payload: CountriesPayload = self.get_json(&self.config.countries_path).await?;
        Ok(payload.payes.into_iter().map(CountryRecord::from).collect())
    }

    async fn fetch_listings(&self) -> Result<Vec<ListingRecord>, FetchError> {
        let (hotels, rooms) = futures::try_join!(
            self.get_json::<HotelsPayload>(&self.config.hotels_path),
            self.get_json::<RoomsPayload>(&self.config.rooms_path)
        )?;
        let listings = assemble_listings(hotels.hotels, rooms.into_rooms());
        info!("Fetched {} listings", listings.len());
        Ok(listings)
    }
}
