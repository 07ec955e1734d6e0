// # Pi-hole DNS Record Store
//
// This crate provides a Pi-hole v6 REST API record store for mpsync.
//
// ## Behaviour
//
// - Custom DNS records live in the `dns.hosts` config array as `"ip domain"`
//   lines; lines with any other shape are ignored
// - Domains are lowercased on read; the first line wins for duplicates
// - Session id cached after the first login and sent as `X-FTL-SID`
// - A rejected session (401/403) is dropped and the request is retried once
//   after logging in again
// - Deleting a record that is already gone succeeds
// - No retry or backoff: the core wraps reads in a retrying decorator
// - 10 second request timeout
//
// ## Dry-Run Mode
//
// Reads still hit the API; additions and deletions are only logged.
//
// ## Security Requirements
//
// - Password and session id NEVER appear in logs or `Debug` output
//
// ## API Reference
//
// - Login: POST `/api/auth` with `{"password": ...}`
// - List records: GET `/api/config/dns/hosts`
// - Add record: PUT `/api/config/dns/hosts/{ip domain}`
// - Delete record: DELETE `/api/config/dns/hosts/{ip domain}`

use async_trait::async_trait;
use mpsync_core::config::DnsStoreConfig;
use mpsync_core::traits::{DnsRecordStore, DnsRecordStoreFactory, RecordSet};
use mpsync_core::{Error, Registry, Result};
use reqwest::header::{ACCEPT, HeaderMap, RETRY_AFTER};
use reqwest::{Method, Response, StatusCode, Url};
use serde::Deserialize;
use std::net::IpAddr;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Request timeout
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

const SID_HEADER: &str = "X-FTL-SID";

const HOSTS_PATH: [&str; 4] = ["api", "config", "dns", "hosts"];

const APP_SUDO_HINT: &str = "Pi-hole refused the change (forbidden). Application passwords \
     need `webserver.api.app_sudo = true` to modify the configuration";

#[derive(Debug, Deserialize)]
struct AuthResponse {
    session: ApiSession,
}

#[derive(Debug, Deserialize)]
struct ApiSession {
    #[serde(default)]
    valid: bool,
    #[serde(default)]
    totp: bool,
    #[serde(default)]
    sid: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HostsResponse {
    config: HostsConfig,
}

#[derive(Debug, Deserialize)]
struct HostsConfig {
    dns: HostsDns,
}

#[derive(Debug, Deserialize)]
struct HostsDns {
    #[serde(default)]
    hosts: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    key: String,
    #[serde(default)]
    message: Option<String>,
}

/// Established login; `sid` is `None` when the server has no password set
struct Session {
    sid: Option<String>,
}

/// Pi-hole v6 record store
///
/// # Security
///
/// The Debug implementation does not expose the password or session id.
pub struct PiholeRecordStore {
    /// Base URL with any `/admin` or `/api.php` suffix removed
    base_url: Url,

    /// Web or application password; `None` sends requests unauthenticated
    password: Option<String>,

    /// If true, log mutations without performing them
    dry_run: bool,

    session: Mutex<Option<Session>>,

    client: reqwest::Client,
}

impl std::fmt::Debug for PiholeRecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PiholeRecordStore")
            .field("base_url", &self.base_url.as_str())
            .field("password", &self.password.as_ref().map(|_| "<REDACTED>"))
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl PiholeRecordStore {
    /// Create a store for the Pi-hole at `url`
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if the URL cannot be parsed or the HTTP client
    /// cannot be built.
    pub fn new(url: &str, password: Option<String>, dry_run: bool) -> Result<Self> {
        let normalized = normalize_base_url(url);
        let base_url = Url::parse(&normalized)
            .map_err(|e| Error::config(format!("Invalid Pi-hole URL '{}': {}", url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::config(format!("Invalid Pi-hole URL '{}'", url)));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url,
            password: password.filter(|p| !p.is_empty()),
            dry_run,
            session: Mutex::new(None),
            client,
        })
    }

    /// Whether mutations are only logged
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::config(format!("Invalid Pi-hole URL '{}'", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// URL of one `dns.hosts` entry; the space is percent-encoded
    fn host_entry_url(&self, domain: &str, ip: IpAddr) -> Result<Url> {
        let entry = format!("{} {}", ip, domain);
        let mut segments: Vec<&str> = HOSTS_PATH.to_vec();
        segments.push(entry.as_str());
        self.endpoint(&segments)
    }

    /// Session id to send, logging in first when needed
    async fn session_id(&self) -> Result<Option<String>> {
        let Some(password) = &self.password else {
            return Ok(None);
        };

        let mut session = self.session.lock().await;
        if let Some(existing) = session.as_ref() {
            return Ok(existing.sid.clone());
        }

        let established = self.login(password).await?;
        let sid = established.sid.clone();
        *session = Some(established);
        Ok(sid)
    }

    async fn login(&self, password: &str) -> Result<Session> {
        let url = self.endpoint(&["api", "auth"])?;
        let response = self
            .client
            .post(url)
            .header(ACCEPT, "application/json")
            .json(&serde_json::json!({ "password": password }))
            .send()
            .await
            .map_err(map_send_error)?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(Error::auth("Pi-hole rejected the password"));
        }
        let response = check_status(response).await?;
        let body: AuthResponse = response
            .json()
            .await
            .map_err(|e| Error::upstream("pihole", format!("Failed to parse auth response: {}", e)))?;

        let session = body.session;
        if session.totp {
            warn!("Pi-hole has two-factor authentication enabled; use an application password");
        }
        if !session.valid {
            return Err(Error::auth(format!(
                "Pi-hole authentication failed: {}",
                session.message.as_deref().unwrap_or("session not valid")
            )));
        }

        debug!("Pi-hole session established");
        Ok(Session { sid: session.sid })
    }

    /// Send a request, logging in again once if the session was rejected
    async fn send(&self, method: Method, url: Url) -> Result<Response> {
        let mut relogged = false;
        loop {
            let sid = self.session_id().await?;
            let mut request = self
                .client
                .request(method.clone(), url.clone())
                .header(ACCEPT, "application/json");
            if let Some(sid) = &sid {
                request = request.header(SID_HEADER, sid);
            }

            let response = request.send().await.map_err(map_send_error)?;
            let rejected = matches!(
                response.status(),
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
            );
            if rejected && self.password.is_some() && !relogged {
                debug!(status = %response.status(), "Pi-hole session rejected, logging in again");
                self.session.lock().await.take();
                relogged = true;
                continue;
            }

            return check_status(response).await;
        }
    }
}

#[async_trait]
impl DnsRecordStore for PiholeRecordStore {
    async fn list_records(&self) -> Result<RecordSet> {
        let url = self.endpoint(&HOSTS_PATH)?;
        let response = self.send(Method::GET, url).await?;
        let body: HostsResponse = response
            .json()
            .await
            .map_err(|e| Error::upstream("pihole", format!("Failed to parse hosts: {}", e)))?;

        let records = parse_hosts(&body.config.dns.hosts);
        debug!(count = records.len(), "Fetched Pi-hole records");
        Ok(records)
    }

    async fn add_record(&self, domain: &str, ip: IpAddr) -> Result<()> {
        if self.dry_run {
            info!("[DRY-RUN] Would add DNS record: {} -> {}", domain, ip);
            return Ok(());
        }

        let url = self.host_entry_url(domain, ip)?;
        self.send(Method::PUT, url)
            .await
            .map_err(|e| Error::mutation(domain, e.to_string()))?;
        Ok(())
    }

    async fn delete_record(&self, domain: &str, ip: IpAddr) -> Result<()> {
        if self.dry_run {
            info!("[DRY-RUN] Would delete DNS record: {} -> {}", domain, ip);
            return Ok(());
        }

        let url = self.host_entry_url(domain, ip)?;
        match self.send(Method::DELETE, url).await {
            Ok(_) => Ok(()),
            Err(Error::NotFound(_)) => {
                debug!(domain, %ip, "Record already absent");
                Ok(())
            }
            Err(e) => Err(Error::mutation(domain, e.to_string())),
        }
    }

    fn store_name(&self) -> &'static str {
        "pihole"
    }
}

/// Strip a trailing slash and the `/admin` or `/api.php` suffix users
/// tend to paste from the browser
fn normalize_base_url(raw: &str) -> String {
    let mut url = raw.trim().trim_end_matches('/');
    for suffix in ["/api.php", "/admin"] {
        if let Some(stripped) = url.strip_suffix(suffix) {
            url = stripped.trim_end_matches('/');
        }
    }
    url.to_string()
}

/// Parse `"ip domain"` lines into a record set
fn parse_hosts(lines: &[String]) -> RecordSet {
    let mut records = RecordSet::new();
    for line in lines {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let [addr, domain] = parts.as_slice() else {
            debug!(line = %line, "Ignoring hosts line");
            continue;
        };
        let Ok(ip) = addr.parse::<IpAddr>() else {
            debug!(line = %line, "Ignoring hosts line with invalid address");
            continue;
        };

        let domain = domain.to_lowercase();
        if let Some(kept) = records.get(&domain) {
            warn!(domain = %domain, kept = %kept, ignored = %ip, "Duplicate Pi-hole record");
            continue;
        }
        records.insert(domain, ip);
    }
    records
}

fn map_send_error(e: reqwest::Error) -> Error {
    if e.is_timeout() || e.is_connect() {
        Error::transient("pihole", format!("HTTP request failed: {}", e))
    } else {
        Error::upstream("pihole", format!("HTTP request failed: {}", e))
    }
}

/// Map a non-success status to the error taxonomy
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = parse_retry_after(response.headers());
    let body = response.text().await.unwrap_or_default();
    let api_error = serde_json::from_str::<ApiErrorBody>(&body).ok().map(|b| b.error);

    if api_error.as_ref().is_some_and(|e| e.key == "forbidden") {
        warn!("{}", APP_SUDO_HINT);
        return Err(Error::auth(APP_SUDO_HINT));
    }
    let detail = api_error
        .and_then(|e| e.message)
        .unwrap_or_else(|| body.chars().take(200).collect());

    Err(match status {
        StatusCode::TOO_MANY_REQUESTS => Error::rate_limited(
            "pihole",
            format!("Rate limit exceeded. Status: {}", status),
            retry_after,
        ),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Error::auth(format!("Pi-hole rejected the session. Status: {}", status))
        }
        StatusCode::NOT_FOUND => Error::not_found(format!("Pi-hole resource not found: {}", detail)),
        s if s.is_server_error() => {
            Error::transient("pihole", format!("Pi-hole server error: {} - {}", status, detail))
        }
        _ => Error::upstream("pihole", format!("Request failed: {} - {}", status, detail)),
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

/// Factory for creating Pi-hole record stores
pub struct PiholeFactory;

impl DnsRecordStoreFactory for PiholeFactory {
    fn create(&self, config: &DnsStoreConfig) -> Result<Box<dyn DnsRecordStore>> {
        match config {
            DnsStoreConfig::Pihole {
                url,
                password,
                dry_run,
            } => {
                if *dry_run {
                    warn!("Pi-hole store running in DRY-RUN mode - no changes will be made");
                }
                Ok(Box::new(PiholeRecordStore::new(url, password.clone(), *dry_run)?))
            }
            _ => Err(Error::config("Invalid config for Pi-hole record store")),
        }
    }
}

/// Register the Pi-hole record store with a registry
pub fn register(registry: &Registry) {
    registry.register_store("pihole", Box::new(PiholeFactory));
}
