use std::time::Duration;

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Deserializer},
};

use moltis_protocol::{
    ClientHello, ClientInfo, DEFAULT_GATEWAY_URL, HANDSHAKE_TIMEOUT_MS, RECONNECT_DELAY_MS,
    REQUEST_TIMEOUT_MS,
};

use crate::{Error, Result};

/// Environment variable holding the gateway URL.
pub const URL_ENV: &str = "MOLTIS_GATEWAY_URL";
/// Environment variable holding the bearer token sent in the hello.
pub const TOKEN_ENV: &str = "MOLTIS_GATEWAY_TOKEN";

/// Delay schedule for reconnecting after an established connection drops.
///
/// The default (`multiplier = 1.0`) retries every `initial_delay`. A larger
/// multiplier grows the delay per failed attempt, capped at `max_delay`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReconnectPolicy {
    pub enabled: bool,
    #[serde(rename = "initialDelayMs", deserialize_with = "millis")]
    pub initial_delay: Duration,
    #[serde(rename = "maxDelayMs", deserialize_with = "millis")]
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay: Duration::from_millis(RECONNECT_DELAY_MS),
            max_delay: Duration::from_secs(60),
            multiplier: 1.0,
        }
    }
}

impl ReconnectPolicy {
    /// A fixed-delay policy.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
            ..Self::default()
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Delay before reconnect attempt number `attempt` (0-based).
    ///
    /// Never shorter than `initial_delay`, even when `max_delay` is smaller.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let cap = self.max_delay.max(self.initial_delay);
        let factor = self.multiplier.max(1.0).powi(attempt.min(32) as i32);
        let secs = (self.initial_delay.as_secs_f64() * factor).min(cap.as_secs_f64());
        if secs.is_finite() && secs >= 0.0 {
            Duration::from_secs_f64(secs).max(self.initial_delay)
        } else {
            cap
        }
    }
}

/// Connection settings for a [`GatewayClient`](crate::GatewayClient).
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GatewayClientConfig {
    pub url: String,
    pub token: Option<Secret<String>>,
    #[serde(rename = "connectTimeoutMs", deserialize_with = "millis")]
    pub connect_timeout: Duration,
    #[serde(rename = "requestTimeoutMs", deserialize_with = "millis")]
    pub request_timeout: Duration,
    pub reconnect: ReconnectPolicy,
    pub client: ClientInfo,
}

impl Default for GatewayClientConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_GATEWAY_URL.to_string(),
            token: None,
            connect_timeout: Duration::from_millis(HANDSHAKE_TIMEOUT_MS),
            request_timeout: Duration::from_millis(REQUEST_TIMEOUT_MS),
            reconnect: ReconnectPolicy::default(),
            client: default_client_info(),
        }
    }
}

impl GatewayClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(Secret::new(token.into()));
        self
    }

    /// Defaults overridden by `MOLTIS_GATEWAY_URL` / `MOLTIS_GATEWAY_TOKEN`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable source.
    /// Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(url) = lookup(URL_ENV).filter(|v| !v.trim().is_empty()) {
            config.url = url.trim().to_string();
        }
        if let Some(token) = lookup(TOKEN_ENV).filter(|v| !v.is_empty()) {
            config.token = Some(Secret::new(token));
        }
        config
    }

    /// Reject configurations the client cannot run with.
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.url)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(Error::config(format!(
                "unsupported url scheme '{}', expected ws or wss",
                url.scheme()
            )));
        }
        if self.connect_timeout.is_zero() {
            return Err(Error::config("connect timeout must be non-zero"));
        }
        if self.request_timeout.is_zero() {
            return Err(Error::config("request timeout must be non-zero"));
        }
        if self.reconnect.enabled && self.reconnect.initial_delay.is_zero() {
            return Err(Error::config("reconnect delay must be non-zero"));
        }
        if self.reconnect.enabled && self.reconnect.max_delay < self.reconnect.initial_delay {
            return Err(Error::config(format!(
                "reconnect max delay ({}ms) is below the initial delay ({}ms)",
                self.reconnect.max_delay.as_millis(),
                self.reconnect.initial_delay.as_millis()
            )));
        }
        Ok(())
    }

    /// The hello frame sent right after the socket opens.
    pub fn hello(&self) -> ClientHello {
        ClientHello::new(
            self.client.clone(),
            self.token.as_ref().map(|t| t.expose_secret().as_str()),
        )
    }
}

fn default_client_info() -> ClientInfo {
    ClientInfo {
        id: "moltis-monitor".into(),
        display_name: None,
        version: env!("CARGO_PKG_VERSION").into(),
        platform: std::env::consts::OS.into(),
        mode: "monitor".into(),
    }
}

fn millis<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_millis)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use {super::*, rstest::rstest};

    #[test]
    fn defaults_match_protocol_constants() {
        let config = GatewayClientConfig::default();
        assert_eq!(config.url, DEFAULT_GATEWAY_URL);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.reconnect.initial_delay, Duration::from_secs(5));
        assert!(config.token.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn lookup_overrides_url_and_token() {
        let config = GatewayClientConfig::from_lookup(|key| match key {
            URL_ENV => Some("wss://gateway.example:443/ws".into()),
            TOKEN_ENV => Some("tok".into()),
            _ => None,
        });
        assert_eq!(config.url, "wss://gateway.example:443/ws");
        assert_eq!(config.token.unwrap().expose_secret(), "tok");
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let config = GatewayClientConfig::from_lookup(|_| Some(String::new()));
        assert_eq!(config.url, DEFAULT_GATEWAY_URL);
        assert!(config.token.is_none());
    }

    #[test]
    fn debug_output_redacts_token() {
        let config = GatewayClientConfig::default().with_token("super-secret");
        assert!(!format!("{config:?}").contains("super-secret"));
    }

    #[test]
    fn hello_carries_token_only_when_set() {
        let anonymous = GatewayClientConfig::default().hello();
        assert!(anonymous.auth.is_none());

        let authed = GatewayClientConfig::default().with_token("abc").hello();
        assert_eq!(authed.auth.unwrap().token.as_deref(), Some("abc"));
    }

    #[rstest]
    #[case("http://127.0.0.1:18789")]
    #[case("127.0.0.1:18789")]
    #[case("")]
    fn validate_rejects_non_websocket_urls(#[case] url: &str) {
        assert!(GatewayClientConfig::new(url).validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_timeouts() {
        let mut config = GatewayClientConfig::default();
        config.request_timeout = Duration::ZERO;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[rstest]
    #[case(5000, 0)]
    #[case(5000, 4999)]
    #[case(1, 0)]
    fn validate_rejects_max_delay_below_initial(#[case] initial_ms: u64, #[case] max_ms: u64) {
        let reconnect: ReconnectPolicy = serde_json::from_value(serde_json::json!({
            "initialDelayMs": initial_ms,
            "maxDelayMs": max_ms
        }))
        .unwrap();
        let mut config = GatewayClientConfig::default();
        config.reconnect = reconnect;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        config.reconnect.enabled = false;
        config.validate().unwrap();
    }

    #[rstest]
    #[case(0)]
    #[case(3)]
    #[case(40)]
    fn delay_never_drops_below_initial(#[case] attempt: u32) {
        let policy = ReconnectPolicy {
            enabled: true,
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::ZERO,
            multiplier: 2.0,
        };
        assert_eq!(policy.delay_for(attempt), Duration::from_secs(5));
    }

    #[test]
    fn deserializes_from_camel_case_millis() {
        let config: GatewayClientConfig = serde_json::from_value(serde_json::json!({
            "url": "ws://10.0.0.2:18789",
            "token": "t",
            "requestTimeoutMs": 1500,
            "reconnect": { "initialDelayMs": 250, "multiplier": 2.0 }
        }))
        .unwrap();
        assert_eq!(config.url, "ws://10.0.0.2:18789");
        assert_eq!(config.request_timeout, Duration::from_millis(1500));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.reconnect.initial_delay, Duration::from_millis(250));
        assert!(config.reconnect.enabled);
    }

    #[rstest]
    #[case(0, 5)]
    #[case(1, 5)]
    #[case(10, 5)]
    fn default_policy_uses_fixed_delay(#[case] attempt: u32, #[case] secs: u64) {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(attempt), Duration::from_secs(secs));
    }

    #[rstest]
    #[case(0, 1)]
    #[case(1, 2)]
    #[case(2, 4)]
    #[case(3, 8)]
    #[case(20, 30)]
    fn exponential_policy_is_capped(#[case] attempt: u32, #[case] secs: u64) {
        let policy = ReconnectPolicy {
            enabled: true,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        };
        assert_eq!(policy.delay_for(attempt), Duration::from_secs(secs));
    }
}
