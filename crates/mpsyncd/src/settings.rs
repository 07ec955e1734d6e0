//! Environment configuration for the daemon
//!
//! Everything is read once at startup through a lookup function so the
//! parsing can be tested without touching the process environment.

use anyhow::{Result, bail};
use mpsync_core::{ClientSourceConfig, DnsStoreConfig, EngineConfig, SyncConfig};
use std::net::SocketAddr;
use tracing::Level;

pub const ENV_MERAKI_API_KEY: &str = "MERAKI_API_KEY";
pub const ENV_MERAKI_ORG_ID: &str = "MERAKI_ORG_ID";
pub const ENV_MERAKI_NETWORK_IDS: &str = "MERAKI_NETWORK_IDS";
pub const ENV_MERAKI_CLIENT_TIMESPAN: &str = "MERAKI_CLIENT_TIMESPAN_SECONDS";
pub const ENV_MERAKI_API_BASE_URL: &str = "MERAKI_API_BASE_URL";
pub const ENV_PIHOLE_API_URL: &str = "PIHOLE_API_URL";
pub const ENV_PIHOLE_API_KEY: &str = "PIHOLE_API_KEY";
pub const ENV_HOSTNAME_SUFFIX: &str = "HOSTNAME_SUFFIX";
pub const ENV_SYNC_INTERVAL: &str = "SYNC_INTERVAL_SECONDS";
pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";
pub const ENV_MODE: &str = "MPSYNC_MODE";
pub const ENV_RUN_ONCE: &str = "MPSYNC_RUN_ONCE";
pub const ENV_HTTP_ADDR: &str = "MPSYNC_HTTP_ADDR";
pub const ENV_HISTORY_CAPACITY: &str = "MPSYNC_HISTORY_CAPACITY";
pub const ENV_PURGE_ON_EMPTY: &str = "MPSYNC_PURGE_ON_EMPTY";
pub const ENV_MAX_FETCH_ATTEMPTS: &str = "MPSYNC_MAX_FETCH_ATTEMPTS";

const DEFAULT_TIMESPAN_SECS: u64 = 86_400;
const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:8080";

const MANDATORY_VARS: [(&str, &str); 4] = [
    (ENV_MERAKI_API_KEY, "Meraki API Key"),
    (ENV_MERAKI_ORG_ID, "Meraki Organization ID"),
    (ENV_PIHOLE_API_URL, "Pi-hole API URL"),
    (ENV_HOSTNAME_SUFFIX, "Hostname Suffix"),
];

const EXAMPLE_SUFFIXES: [&str; 4] = [
    ".LOCAL",
    ".YOURDOMAIN.LOCAL",
    ".YOURCUSTOMDOMAIN.LOCAL",
    "YOUR_HOSTNAME_SUFFIX",
];

/// Daemon configuration
#[derive(Debug)]
pub struct DaemonConfig {
    /// Resolved engine configuration
    pub sync: SyncConfig,

    pub log_level: Level,

    /// Status API bind address; `None` disables the API
    pub http_addr: Option<SocketAddr>,

    /// Run one pass and exit
    pub run_once: bool,

    /// Problems worth a warning, logged once tracing is up
    pub warnings: Vec<String>,
}

impl DaemonConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut warnings = Vec::new();

        let missing: Vec<String> = MANDATORY_VARS
            .iter()
            .filter(|(name, _)| get(*name).is_none())
            .map(|(name, desc)| format!("{} ({})", desc, name))
            .collect();
        if !missing.is_empty() {
            bail!(
                "Missing mandatory environment variables: {}",
                missing.join(", ")
            );
        }

        let api_key = get(ENV_MERAKI_API_KEY).unwrap_or_default();
        let org_id = get(ENV_MERAKI_ORG_ID).unwrap_or_default();
        let pihole_url = get(ENV_PIHOLE_API_URL).unwrap_or_default();
        let suffix = get(ENV_HOSTNAME_SUFFIX).unwrap_or_default().to_lowercase();

        if org_id.eq_ignore_ascii_case("YOUR_MERAKI_ORGANIZATION_ID") {
            bail!("Placeholder value detected for {}", ENV_MERAKI_ORG_ID);
        }
        let url_upper = pihole_url.to_uppercase();
        if url_upper == "YOUR_PIHOLE_API_URL" || url_upper.contains("YOUR_PIHOLE_IP_OR_HOSTNAME") {
            bail!("Placeholder value detected for {}", ENV_PIHOLE_API_URL);
        }
        if EXAMPLE_SUFFIXES.contains(&suffix.to_uppercase().as_str()) {
            warnings.push(format!(
                "Possible example/placeholder value detected for {} ('{}'). \
                 Ensure this is your intended suffix.",
                ENV_HOSTNAME_SUFFIX, suffix
            ));
        }

        let network_ids: Vec<String> = get(ENV_MERAKI_NETWORK_IDS)
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let client_timespan_secs = match get(ENV_MERAKI_CLIENT_TIMESPAN) {
            None => DEFAULT_TIMESPAN_SECS,
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => secs,
                _ => {
                    warnings.push(format!(
                        "Invalid value for {}: '{}'. Using default {} seconds (24 hours).",
                        ENV_MERAKI_CLIENT_TIMESPAN, raw, DEFAULT_TIMESPAN_SECS
                    ));
                    DEFAULT_TIMESPAN_SECS
                }
            },
        };

        let dry_run = match get(ENV_MODE).map(|m| m.to_lowercase()).as_deref() {
            None | Some("live") => false,
            Some("dry-run") => true,
            Some(other) => bail!(
                "{} '{}' is not valid. Valid modes: live, dry-run",
                ENV_MODE,
                other
            ),
        };

        let defaults = EngineConfig::default();
        let engine = EngineConfig {
            max_fetch_attempts: parse_or(&get, ENV_MAX_FETCH_ATTEMPTS, defaults.max_fetch_attempts)?,
            sync_interval_secs: parse_or(&get, ENV_SYNC_INTERVAL, defaults.sync_interval_secs)?,
            history_capacity: parse_or(&get, ENV_HISTORY_CAPACITY, defaults.history_capacity)?,
            purge_on_empty: parse_flag(&get, ENV_PURGE_ON_EMPTY)?,
            ..defaults
        };

        let log_level = match get(ENV_LOG_LEVEL)
            .unwrap_or_else(|| "info".to_string())
            .to_lowercase()
            .as_str()
        {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" | "warning" => Level::WARN,
            "error" => Level::ERROR,
            other => bail!(
                "{} '{}' is not valid. Valid levels: trace, debug, info, warn, error",
                ENV_LOG_LEVEL,
                other
            ),
        };

        let http_addr = match get(ENV_HTTP_ADDR).as_deref() {
            Some("off") => None,
            Some(addr) => Some(parse_addr(addr)?),
            None => Some(parse_addr(DEFAULT_HTTP_ADDR)?),
        };

        let sync = SyncConfig::new(
            ClientSourceConfig::Meraki {
                api_key,
                base_url: get(ENV_MERAKI_API_BASE_URL),
            },
            DnsStoreConfig::Pihole {
                url: pihole_url,
                password: get(ENV_PIHOLE_API_KEY),
                dry_run,
            },
            org_id,
            suffix,
        )
        .with_network_ids(network_ids)
        .with_engine(engine);
        let sync = SyncConfig {
            client_timespan_secs,
            ..sync
        };

        sync.validate()?;

        Ok(Self {
            sync,
            log_level,
            http_addr,
            run_once: parse_flag(&get, ENV_RUN_ONCE)?,
            warnings,
        })
    }
}

fn parse_or<G, T>(get: &G, name: &str, default: T) -> Result<T>
where
    G: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match get(name) {
        None => Ok(default),
        Some(raw) => match raw.parse() {
            Ok(value) => Ok(value),
            Err(_) => bail!("{} must be a non-negative integer. Got: {}", name, raw),
        },
    }
}

fn parse_flag<G>(get: &G, name: &str) -> Result<bool>
where
    G: Fn(&str) -> Option<String>,
{
    match get(name).map(|v| v.to_lowercase()).as_deref() {
        None | Some("0" | "false" | "no" | "off") => Ok(false),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some(other) => bail!("{} must be true or false. Got: {}", name, other),
    }
}

fn parse_addr(raw: &str) -> Result<SocketAddr> {
    match raw.parse() {
        Ok(addr) => Ok(addr),
        Err(_) => bail!(
            "{} must be a socket address like {} or 'off'. Got: {}",
            ENV_HTTP_ADDR,
            DEFAULT_HTTP_ADDR,
            raw
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_env() -> HashMap<&'static str, String> {
        HashMap::from([
            (ENV_MERAKI_API_KEY, "key".to_string()),
            (ENV_MERAKI_ORG_ID, "123456".to_string()),
            (ENV_PIHOLE_API_URL, "http://pi.hole".to_string()),
            (ENV_PIHOLE_API_KEY, "secret".to_string()),
            (ENV_HOSTNAME_SUFFIX, ".Lan".to_string()),
        ])
    }

    fn load(env: &HashMap<&'static str, String>) -> Result<DaemonConfig> {
        DaemonConfig::from_lookup(|name| env.get(name).cloned())
    }

    #[test]
    fn defaults_are_applied() {
        let config = load(&base_env()).unwrap();

        assert_eq!(config.sync.hostname_suffix, ".lan");
        assert_eq!(config.sync.client_timespan_secs, 86_400);
        assert_eq!(config.sync.engine.sync_interval_secs, 300);
        assert!(config.sync.network_ids.is_empty());
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.http_addr, Some("0.0.0.0:8080".parse().unwrap()));
        assert!(!config.run_once);
        assert!(config.warnings.is_empty());
        assert!(matches!(
            config.sync.store,
            DnsStoreConfig::Pihole { dry_run: false, ref password, .. } if password.as_deref() == Some("secret")
        ));
    }

    #[test]
    fn missing_variables_are_all_listed() {
        let mut env = base_env();
        env.remove(ENV_MERAKI_API_KEY);
        env.insert(ENV_HOSTNAME_SUFFIX, "  ".to_string());

        let err = load(&env).unwrap_err().to_string();
        assert!(err.contains(ENV_MERAKI_API_KEY));
        assert!(err.contains(ENV_HOSTNAME_SUFFIX));
        assert!(!err.contains(ENV_MERAKI_ORG_ID));
    }

    #[test]
    fn pihole_password_is_optional() {
        let mut env = base_env();
        env.remove(ENV_PIHOLE_API_KEY);

        let config = load(&env).unwrap();
        assert!(matches!(config.sync.store, DnsStoreConfig::Pihole { password: None, .. }));
    }

    #[test]
    fn placeholders_are_rejected() {
        let mut env = base_env();
        env.insert(ENV_MERAKI_ORG_ID, "your_meraki_organization_id".to_string());
        assert!(load(&env).is_err());

        let mut env = base_env();
        env.insert(ENV_PIHOLE_API_URL, "http://YOUR_PIHOLE_IP_OR_HOSTNAME".to_string());
        assert!(load(&env).is_err());
    }

    #[test]
    fn example_suffix_only_warns() {
        let mut env = base_env();
        env.insert(ENV_HOSTNAME_SUFFIX, ".local".to_string());

        let config = load(&env).unwrap();
        assert_eq!(config.warnings.len(), 1);
        assert!(config.warnings[0].contains(ENV_HOSTNAME_SUFFIX));
    }

    #[test]
    fn invalid_timespan_falls_back_to_default() {
        let mut env = base_env();
        env.insert(ENV_MERAKI_CLIENT_TIMESPAN, "a day".to_string());

        let config = load(&env).unwrap();
        assert_eq!(config.sync.client_timespan_secs, 86_400);
        assert_eq!(config.warnings.len(), 1);
    }

    #[test]
    fn optional_settings_are_parsed() {
        let mut env = base_env();
        env.insert(ENV_MERAKI_NETWORK_IDS, "N_1, N_2,,".to_string());
        env.insert(ENV_MERAKI_CLIENT_TIMESPAN, "3600".to_string());
        env.insert(ENV_SYNC_INTERVAL, "60".to_string());
        env.insert(ENV_MODE, "DRY-RUN".to_string());
        env.insert(ENV_RUN_ONCE, "true".to_string());
        env.insert(ENV_HTTP_ADDR, "off".to_string());
        env.insert(ENV_PURGE_ON_EMPTY, "yes".to_string());
        env.insert(ENV_LOG_LEVEL, "DEBUG".to_string());

        let config = load(&env).unwrap();
        assert_eq!(config.sync.network_ids, vec!["N_1", "N_2"]);
        assert_eq!(config.sync.client_timespan_secs, 3600);
        assert_eq!(config.sync.engine.sync_interval_secs, 60);
        assert!(config.sync.engine.purge_on_empty);
        assert!(config.run_once);
        assert_eq!(config.http_addr, None);
        assert_eq!(config.log_level, Level::DEBUG);
        assert!(matches!(config.sync.store, DnsStoreConfig::Pihole { dry_run: true, .. }));
    }

    #[test]
    fn invalid_values_are_rejected() {
        for (name, value) in [
            (ENV_SYNC_INTERVAL, "0"),
            (ENV_SYNC_INTERVAL, "soon"),
            (ENV_MODE, "yolo"),
            (ENV_LOG_LEVEL, "verbose"),
            (ENV_HTTP_ADDR, "localhost"),
            (ENV_RUN_ONCE, "maybe"),
            (ENV_MAX_FETCH_ATTEMPTS, "0"),
            (ENV_PIHOLE_API_URL, "pi.hole"),
        ] {
            let mut env = base_env();
            env.insert(name, value.to_string());
            assert!(load(&env).is_err(), "{}={} should be rejected", name, value);
        }
    }
}
