use serde::Deserialize;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(2);
const DEFAULT_ENDPOINT: &str = "http://ip-api.com/json";

#[derive(Debug, Error)]
pub enum GeoError {
    #[error("geoip request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("geoip lookup rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub country: String,
    pub city: String,
}

impl Location {
    pub fn unknown() -> Self {
        Self {
            country: "Unknown".to_string(),
            city: "Unknown".to_string(),
        }
    }

    fn localhost() -> Self {
        Self {
            country: "Localhost".to_string(),
            city: "Localhost".to_string(),
        }
    }
}

/// Resolves a client address to a coarse location. Never fails; lookups
/// that cannot complete yield [`Location::unknown`].
pub trait GeoLocator: Send + Sync {
    fn locate(&self, ip: &str) -> Pin<Box<dyn Future<Output = Location> + Send>>;
}

#[derive(Deserialize)]
struct IpApiResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    country: String,
    #[serde(default)]
    city: String,
}

/// Lookup against the ip-api.com JSON endpoint.
#[derive(Clone)]
pub struct IpApiLocator {
    client: reqwest::Client,
    endpoint: String,
}

impl IpApiLocator {
    pub fn new() -> Self {
        Self::with_endpoint(DEFAULT_ENDPOINT)
    }

    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        }
    }
}

impl Default for IpApiLocator {
    fn default() -> Self {
        Self::new()
    }
}

async fn lookup(client: reqwest::Client, url: String) -> Result<Location, GeoError> {
    let body: IpApiResponse = client
        .get(url)
        .timeout(LOOKUP_TIMEOUT)
        .send()
        .await?
        .json()
        .await?;

    if body.status == "fail" {
        return Err(GeoError::Rejected(body.message));
    }

    Ok(Location {
        country: body.country,
        city: body.city,
    })
}

impl GeoLocator for IpApiLocator {
    #[instrument(skip(self))]
    fn locate(&self, ip: &str) -> Pin<Box<dyn Future<Output = Location> + Send>> {
        let ip = ip.trim().to_string();
        let client = self.client.clone();
        let url = format!("{}/{}", self.endpoint, ip);

        Box::pin(async move {
            if ip.is_empty() {
                return Location::unknown();
            }
            if ip == "127.0.0.1" || ip == "::1" {
                return Location::localhost();
            }

            match lookup(client, url).await {
                Ok(location) => location,
                Err(err) => {
                    debug!(%err, "GeoIP lookup failed");
                    Location::unknown()
                }
            }
        })
    }
}
