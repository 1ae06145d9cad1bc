use std::{env, time::Duration};

use crate::relay::list::validate_url;

pub const DEFAULT_RELAYS: [&str; 4] = [
  "wss://relay.damus.io",
  "wss://relay.primal.net",
  "wss://relay.nostr.pub",
  "wss://nos.lol",
];
pub const DEFAULT_REQUIRED_DOMAIN: &str = "fuzzedrecords.com";

/// [`ClientConfig`] error
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
  #[error("{name} must be a number, got '{value}'")]
  InvalidNumber { name: String, value: String },

  #[error("invalid relay url '{0}' in RELAY_URLS")]
  InvalidRelayUrl(String),
}

///
/// Settings of the client, read from the environment.
///
/// | variable                | default                |
/// |-------------------------|------------------------|
/// | `RELAY_URLS`            | [`DEFAULT_RELAYS`]     |
/// | `RELAY_CONNECT_TIMEOUT` | `2.0` seconds          |
/// | `PROFILE_FETCH_TIMEOUT` | `5.0` seconds          |
/// | `CACHE_TIMEOUT`         | `300` seconds          |
/// | `DISABLE_TLS_VERIFY`    | unset (verify)         |
/// | `REQUIRED_DOMAIN`       | `fuzzedrecords.com`    |
/// | `POLL_INTERVAL_MS`      | `50`                   |
///
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
  pub relay_urls: Vec<String>,
  pub connect_timeout: Duration,
  pub profile_fetch_timeout: Duration,
  pub cache_timeout: Duration,
  pub tls_verify: bool,
  pub required_domain: String,
  pub poll_interval: Duration,
}

impl Default for ClientConfig {
  fn default() -> Self {
    Self {
      relay_urls: DEFAULT_RELAYS.iter().map(|url| url.to_string()).collect(),
      connect_timeout: Duration::from_secs(2),
      profile_fetch_timeout: Duration::from_secs(5),
      cache_timeout: Duration::from_secs(300),
      tls_verify: true,
      required_domain: DEFAULT_REQUIRED_DOMAIN.to_string(),
      poll_interval: Duration::from_millis(50),
    }
  }
}

fn parse_seconds(name: &str, value: &str) -> Result<Duration, Error> {
  value
    .trim()
    .parse::<f64>()
    .ok()
    .filter(|seconds| seconds.is_finite() && *seconds >= 0.0)
    .map(Duration::from_secs_f64)
    .ok_or_else(|| Error::InvalidNumber {
      name: name.to_string(),
      value: value.to_string(),
    })
}

fn parse_integer(name: &str, value: &str) -> Result<u64, Error> {
  value.trim().parse::<u64>().map_err(|_| Error::InvalidNumber {
    name: name.to_string(),
    value: value.to_string(),
  })
}

impl ClientConfig {
  /// Reads the process environment. Call `dotenv::dotenv()` first to honour a `.env` file.
  pub fn from_env() -> Result<Self, Error> {
    Self::from_vars(|name| env::var(name).ok())
  }

  ///
  /// Builds the configuration from an arbitrary variable lookup.
  ///
  /// Unset or blank variables keep their default.
  ///
  pub fn from_vars<F>(lookup: F) -> Result<Self, Error>
  where
    F: Fn(&str) -> Option<String>,
  {
    let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
    let mut config = Self::default();

    if let Some(urls) = var("RELAY_URLS") {
      config.relay_urls = urls
        .split(',')
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(|url| validate_url(url).map_err(|_| Error::InvalidRelayUrl(url.to_string())))
        .collect::<Result<Vec<String>, Error>>()?;
    }
    if let Some(value) = var("RELAY_CONNECT_TIMEOUT") {
      config.connect_timeout = parse_seconds("RELAY_CONNECT_TIMEOUT", &value)?;
    }
    if let Some(value) = var("PROFILE_FETCH_TIMEOUT") {
      config.profile_fetch_timeout = parse_seconds("PROFILE_FETCH_TIMEOUT", &value)?;
    }
    if let Some(value) = var("CACHE_TIMEOUT") {
      config.cache_timeout = Duration::from_secs(parse_integer("CACHE_TIMEOUT", &value)?);
    }
    if let Some(value) = var("DISABLE_TLS_VERIFY") {
      let disabled = matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes");
      config.tls_verify = !disabled;
    }
    if let Some(value) = var("REQUIRED_DOMAIN") {
      config.required_domain = value.trim().to_string();
    }
    if let Some(value) = var("POLL_INTERVAL_MS") {
      config.poll_interval = Duration::from_millis(parse_integer("POLL_INTERVAL_MS", &value)?);
    }

    Ok(config)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;

  #[cfg(test)]
  use pretty_assertions::assert_eq;

  fn make_sut(vars: &[(&str, &str)]) -> Result<ClientConfig, Error> {
    let vars: HashMap<String, String> = vars
      .iter()
      .map(|(name, value)| (name.to_string(), value.to_string()))
      .collect();
    ClientConfig::from_vars(|name| vars.get(name).cloned())
  }

  #[test]
  fn test_defaults() {
    let config = make_sut(&[]).unwrap();

    assert_eq!(config, ClientConfig::default());
    assert_eq!(config.relay_urls.len(), 4);
    assert_eq!(config.connect_timeout, Duration::from_secs(2));
    assert!(config.tls_verify);
  }

  #[test]
  fn test_every_variable_is_read() {
    let config = make_sut(&[
      ("RELAY_URLS", "wss://a.relay, ws://127.0.0.1:8080 ,"),
      ("RELAY_CONNECT_TIMEOUT", "0.5"),
      ("PROFILE_FETCH_TIMEOUT", "3"),
      ("CACHE_TIMEOUT", "60"),
      ("DISABLE_TLS_VERIFY", "Yes"),
      ("REQUIRED_DOMAIN", "example.com"),
      ("POLL_INTERVAL_MS", "10"),
    ])
    .unwrap();

    assert_eq!(
      config,
      ClientConfig {
        relay_urls: vec![String::from("wss://a.relay"), String::from("ws://127.0.0.1:8080")],
        connect_timeout: Duration::from_millis(500),
        profile_fetch_timeout: Duration::from_secs(3),
        cache_timeout: Duration::from_secs(60),
        tls_verify: false,
        required_domain: String::from("example.com"),
        poll_interval: Duration::from_millis(10),
      }
    );
  }

  #[test]
  fn test_tls_toggle_values() {
    for (value, verify) in [("1", false), ("TRUE", false), ("no", true), ("0", true), ("", true)] {
      let config = make_sut(&[("DISABLE_TLS_VERIFY", value)]).unwrap();
      assert_eq!(config.tls_verify, verify, "{value}");
    }
  }

  #[test]
  fn test_malformed_values_are_errors() {
    assert_eq!(
      make_sut(&[("RELAY_CONNECT_TIMEOUT", "soon")]),
      Err(Error::InvalidNumber {
        name: String::from("RELAY_CONNECT_TIMEOUT"),
        value: String::from("soon"),
      })
    );
    assert!(make_sut(&[("CACHE_TIMEOUT", "1.5")]).is_err());
    assert!(make_sut(&[("PROFILE_FETCH_TIMEOUT", "-1")]).is_err());
    assert_eq!(
      make_sut(&[("RELAY_URLS", "wss://ok.relay,https://web.site")]),
      Err(Error::InvalidRelayUrl(String::from("https://web.site")))
    );
  }
}
