// # Meraki Client Source
//
// This crate provides a Meraki Dashboard API v1 client source for mpsync.
//
// ## Behaviour
//
// - One logical read per trait call; pagination (`Link: <...>; rel=next`) is
//   followed until the last page, so callers always get the complete list
// - No retry or backoff: the core wraps this source in a retrying decorator
// - Rate limiting (429) and server errors (5xx) are reported as transient,
//   with the `Retry-After` hint when the API sends one
// - 20 second request timeout
//
// ## Security Requirements
//
// - API key NEVER appears in logs or `Debug` output
//
// ## API Reference
//
// - List networks: GET `/organizations/:org_id/networks`
// - List clients: GET `/networks/:network_id/clients?timespan=...&perPage=1000`
// - Authentication header: `X-Cisco-Meraki-API-Key`

use async_trait::async_trait;
use mpsync_core::config::ClientSourceConfig;
use mpsync_core::traits::{ClientRecord, ClientSource, ClientSourceFactory, Network};
use mpsync_core::{Error, Registry, Result};
use reqwest::header::{HeaderMap, LINK, RETRY_AFTER};
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Public Dashboard API v1 base URL
pub const MERAKI_API_BASE: &str = "https://api.meraki.com/api/v1";

/// Request timeout
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(20);

/// Largest page size the clients endpoint accepts
const CLIENTS_PER_PAGE: u32 = 1000;

/// Hard stop for pagination loops
const MAX_PAGES: usize = 100;

const API_KEY_HEADER: &str = "X-Cisco-Meraki-API-Key";

/// Network as returned by the organization networks endpoint
#[derive(Debug, Deserialize)]
struct ApiNetwork {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

/// Client as returned by the network clients endpoint
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiClient {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    dhcp_hostname: Option<String>,
    #[serde(default)]
    mac: Option<String>,
    #[serde(default)]
    ip: Option<String>,
    #[serde(default)]
    fixed_ip_assignment: Option<ApiFixedIp>,
}

#[derive(Debug, Deserialize)]
struct ApiFixedIp {
    #[serde(default)]
    ip: Option<String>,
}

impl From<ApiClient> for ClientRecord {
    fn from(client: ApiClient) -> Self {
        ClientRecord {
            id: client.id,
            description: client.description,
            hostname_hint: client.dhcp_hostname,
            mac: client.mac,
            observed_ip: client.ip,
            fixed_ip: client.fixed_ip_assignment.and_then(|f| f.ip),
            network_id: None,
        }
    }
}

/// Meraki Dashboard client source
///
/// # Security
///
/// The Debug implementation does not expose the API key.
pub struct MerakiClientSource {
    /// Dashboard API key
    api_key: String,

    /// API base URL without trailing slash
    base_url: String,

    client: reqwest::Client,
}

impl std::fmt::Debug for MerakiClientSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MerakiClientSource")
            .field("api_key", &"<REDACTED>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl MerakiClientSource {
    /// Create a source talking to the public Dashboard API
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if the key is empty or the HTTP client cannot be
    /// built.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::config("Meraki API key cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_key,
            base_url: MERAKI_API_BASE.to_string(),
            client,
        })
    }

    /// Point the source at another API base URL (regional clouds, tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// GET every page starting at `url`, decoding each page as a JSON array
    async fn get_all_pages<T>(&self, url: String, query: &[(&str, String)]) -> Result<Vec<T>>
    where
        T: for<'de> Deserialize<'de>,
    {
        let mut items = Vec::new();
        let mut request = self.client.get(&url).query(query);

        for page in 1..=MAX_PAGES {
            let response = request
                .header(API_KEY_HEADER, &self.api_key)
                .header("Accept", "application/json")
                .send()
                .await
                .map_err(map_send_error)?;

            let response = check_status(response).await?;
            let next = next_link(response.headers());

            let batch: Vec<T> = response
                .json()
                .await
                .map_err(|e| Error::upstream("meraki", format!("Failed to parse response: {}", e)))?;
            debug!(page, count = batch.len(), "Fetched Meraki page");
            items.extend(batch);

            match next {
                Some(next) => request = self.client.get(next),
                None => return Ok(items),
            }
        }

        Err(Error::upstream(
            "meraki",
            format!("Pagination exceeded {} pages for {}", MAX_PAGES, url),
        ))
    }
}

#[async_trait]
impl ClientSource for MerakiClientSource {
    async fn list_networks(&self, org_id: &str) -> Result<Vec<Network>> {
        let url = format!("{}/organizations/{}/networks", self.base_url, org_id);
        let networks: Vec<ApiNetwork> = self.get_all_pages(url, &[]).await?;

        debug!(org_id, count = networks.len(), "Fetched Meraki networks");
        Ok(networks
            .into_iter()
            .map(|n| {
                let name = n.name.unwrap_or_else(|| format!("ID-{}", n.id));
                Network::new(n.id, name)
            })
            .collect())
    }

    async fn list_clients(&self, network_id: &str, timespan_secs: u64) -> Result<Vec<ClientRecord>> {
        let url = format!("{}/networks/{}/clients", self.base_url, network_id);
        let query = [
            ("timespan", timespan_secs.to_string()),
            ("perPage", CLIENTS_PER_PAGE.to_string()),
        ];
        let clients: Vec<ApiClient> = self.get_all_pages(url, &query).await?;

        Ok(clients.into_iter().map(ClientRecord::from).collect())
    }

    fn source_name(&self) -> &'static str {
        "meraki"
    }
}

fn map_send_error(e: reqwest::Error) -> Error {
    if e.is_timeout() || e.is_connect() {
        Error::transient("meraki", format!("HTTP request failed: {}", e))
    } else {
        Error::upstream("meraki", format!("HTTP request failed: {}", e))
    }
}

/// Map a non-success status to the error taxonomy
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = parse_retry_after(response.headers());
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unable to read error response".to_string());
    let body: String = body.chars().take(200).collect();

    Err(match status {
        StatusCode::TOO_MANY_REQUESTS => Error::rate_limited(
            "meraki",
            format!("Rate limit exceeded. Status: {}", status),
            retry_after,
        ),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::auth(format!(
            "Meraki rejected the API key or it lacks access. Status: {}",
            status
        )),
        StatusCode::NOT_FOUND => Error::not_found(format!("Meraki resource not found: {}", body)),
        s if s.is_server_error() => {
            Error::transient("meraki", format!("Meraki server error: {} - {}", status, body))
        }
        _ => Error::upstream("meraki", format!("Request failed: {} - {}", status, body)),
    })
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Extract the `rel=next` target of an RFC 8288 `Link` header
fn next_link(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(LINK)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .find_map(|link| {
            let mut parts = link.split(';');
            let target = parts.next()?.trim();
            let is_next = parts.any(|param| {
                let param = param.trim().replace('"', "");
                param.eq_ignore_ascii_case("rel=next")
            });
            if !is_next {
                return None;
            }
            target
                .strip_prefix('<')
                .and_then(|t| t.strip_suffix('>'))
                .map(str::to_string)
        })
}

/// Factory for creating Meraki client sources
pub struct MerakiFactory;

impl ClientSourceFactory for MerakiFactory {
    fn create(&self, config: &ClientSourceConfig) -> Result<Box<dyn ClientSource>> {
        match config {
            ClientSourceConfig::Meraki { api_key, base_url } => {
                let mut source = MerakiClientSource::new(api_key.clone())?;
                if let Some(base_url) = base_url {
                    source = source.with_base_url(base_url.clone());
                }
                Ok(Box::new(source))
            }
            _ => Err(Error::config("Invalid config for Meraki client source")),
        }
    }
}

/// Register the Meraki client source with a registry
pub fn register(registry: &Registry) {
    registry.register_source("meraki", Box::new(MerakiFactory));
}
