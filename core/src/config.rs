/// Configuration management
use crate::error::{MessagingError, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

const DEFAULT_API_URL: &str = "http://localhost:5000";
const DEFAULT_HUB_ADDR: &str = "127.0.0.1:5001";

/// Client session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the REST backend
    pub api_base_url: String,

    /// Real-time hub as `host:port`; host names are resolved on connect
    pub hub_addr: String,

    /// Value for the `Authorization` header, passed through as-is
    pub auth_token: Option<String>,

    /// Per-request timeout for REST calls and the hub connect
    pub request_timeout: Duration,

    /// Avatar shown for first-contact senders
    pub placeholder_avatar: Option<String>,

    /// Open the most recent conversation once the index is loaded
    pub open_latest_on_start: bool,

    /// Report opened conversations as read to the backend
    pub sync_read_state: bool,

    /// Persist sent messages through the REST backend
    pub persist_sent_messages: bool,

    /// Capacity of the observer event buffer
    pub event_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            hub_addr: DEFAULT_HUB_ADDR.to_string(),
            auth_token: None,
            request_timeout: Duration::from_secs(10),
            placeholder_avatar: None,
            open_latest_on_start: false,
            sync_read_state: true,
            persist_sent_messages: true,
            event_capacity: 256,
        }
    }
}

fn default_hub_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 5001))
}

fn parse_addr(value: &str, flag: &str) -> Result<SocketAddr> {
    value
        .parse()
        .map_err(|_| MessagingError::Config(format!("{} must be a socket address like {}", flag, DEFAULT_HUB_ADDR)))
}

/// Check a `host:port` hub target without resolving it
fn parse_hub_target(value: &str, flag: &str) -> Result<String> {
    let valid = match value.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    };
    if !valid {
        return Err(MessagingError::Config(format!(
            "{} must be host:port like {} or hub.example.com:5001",
            flag, DEFAULT_HUB_ADDR
        )));
    }
    Ok(value.to_string())
}

fn flag_value<'a>(args: &'a [String], i: usize, flag: &str) -> Result<&'a String> {
    args.get(i + 1)
        .ok_or_else(|| MessagingError::Config(format!("{} requires an argument", flag)))
}

impl Config {
    /// Parse `<self_id> [--api-url <http://host:port>] [--hub <host:port>]
    /// [--token <value>] [--timeout-ms <ms>] [--open-latest]`. Returns the
    /// identity and the config. The REST client speaks plain HTTP only.
    pub fn from_args(args: &[String]) -> Result<(String, Self)> {
        if args.len() < 2 || args[1].starts_with("--") {
            return Err(MessagingError::Config(format!(
                "Usage: {} <self_id> [--api-url <http://host:port>] [--hub <host:port>] [--token <value>] [--timeout-ms <ms>] [--open-latest]\n  (the REST client speaks plain HTTP; put a TLS proxy in front for https)",
                args.first().map(String::as_str).unwrap_or("cli")
            )));
        }
        let self_id = args[1].clone();
        let mut config = Self::default();

        let mut i = 2;
        while i < args.len() {
            match args[i].as_str() {
                "--api-url" => {
                    config.api_base_url = flag_value(args, i, "--api-url")?.clone();
                    i += 2;
                }
                "--hub" => {
                    config.hub_addr = parse_hub_target(flag_value(args, i, "--hub")?, "--hub")?;
                    i += 2;
                }
                "--token" => {
                    config.auth_token = Some(flag_value(args, i, "--token")?.clone());
                    i += 2;
                }
                "--timeout-ms" => {
                    let ms = flag_value(args, i, "--timeout-ms")?
                        .parse::<u64>()
                        .map_err(|_| MessagingError::Config("--timeout-ms must be a number".to_string()))?;
                    config.request_timeout = Duration::from_millis(ms);
                    i += 2;
                }
                "--open-latest" => {
                    config.open_latest_on_start = true;
                    i += 1;
                }
                other => {
                    return Err(MessagingError::Config(format!("Unknown argument: {}", other)));
                }
            }
        }

        // Env overrides (nice for scripts)
        if let Ok(url) = std::env::var("MENTEECHAT_API_URL") {
            config.api_base_url = url;
        }
        if let Ok(addr) = std::env::var("MENTEECHAT_HUB_ADDR") {
            config.hub_addr = parse_hub_target(&addr, "MENTEECHAT_HUB_ADDR")?;
        }
        if let Ok(token) = std::env::var("MENTEECHAT_TOKEN") {
            config.auth_token = Some(token);
        }

        config.validate()?;
        Ok((self_id, config))
    }

    pub fn validate(&self) -> Result<()> {
        if !self.api_base_url.starts_with("http://") {
            return Err(MessagingError::Config(format!(
                "api_base_url must be an http:// URL (https is not supported), got {}",
                self.api_base_url
            )));
        }
        if self.request_timeout.is_zero() {
            return Err(MessagingError::Config("request_timeout must be non-zero".to_string()));
        }
        Ok(())
    }
}

/// Hub server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    pub listen_addr: SocketAddr,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_hub_addr(),
        }
    }
}

impl HubConfig {
    /// Parse `[--listen <addr>]`
    pub fn from_args(args: &[String]) -> Result<Self> {
        let mut config = Self::default();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--listen" => {
                    config.listen_addr = parse_addr(flag_value(args, i, "--listen")?, "--listen")?;
                    i += 2;
                }
                other => {
                    return Err(MessagingError::Config(format!(
                        "Unknown argument: {} (usage: hub [--listen <addr>])",
                        other
                    )));
                }
            }
        }

        if let Ok(addr) = std::env::var("MENTEECHAT_HUB_LISTEN") {
            config.listen_addr = parse_addr(&addr, "MENTEECHAT_HUB_LISTEN")?;
        }
        Ok(config)
    }
}
