use std::time::Duration;

/// Default endpoint path, relative to the REST API host
pub const DEFAULT_ENDPOINT_PATH: &str = "/ws";

/// Configuration for the notification client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Path of the STOMP endpoint on the API host
    pub endpoint_path: String,
    /// Timeout applied separately to opening the transport and to the handshake; also caps each send
    pub connect_timeout: Duration,
    /// Which transports to try when opening a connection
    pub transport_mode: TransportMode,
    /// Backoff settings for reconnection
    pub backoff: BackoffConfig,
    /// Heartbeat settings negotiated at handshake time
    pub heartbeat: HeartbeatConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint_path: DEFAULT_ENDPOINT_PATH.to_string(),
            connect_timeout: Duration::from_secs(10),
            transport_mode: TransportMode::default(),
            backoff: BackoffConfig::default(),
            heartbeat: HeartbeatConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Create a new builder for configuration
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Check the configuration for values the client cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let backoff = &self.backoff;
        if backoff.max_delay < backoff.initial_delay {
            return Err(ConfigError::InvalidBackoff(
                "max_delay must be >= initial_delay".to_string(),
            ));
        }

        if !backoff.multiplier.is_finite() || backoff.multiplier <= 0.0 {
            return Err(ConfigError::InvalidBackoff(
                "multiplier must be > 0".to_string(),
            ));
        }

        if backoff.max_attempts == 0 {
            return Err(ConfigError::InvalidBackoff(
                "max_attempts cannot be 0".to_string(),
            ));
        }

        if !self.heartbeat.tolerance.is_finite() || self.heartbeat.tolerance < 1.0 {
            return Err(ConfigError::InvalidHeartbeat(
                "tolerance must be >= 1.0".to_string(),
            ));
        }

        if !self.endpoint_path.starts_with('/') {
            return Err(ConfigError::InvalidEndpoint(format!(
                "endpoint path must start with '/': {}",
                self.endpoint_path
            )));
        }

        if self.connect_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "connect_timeout cannot be 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for ClientConfig
#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Set the endpoint path (e.g. `/ws`)
    pub fn endpoint_path(mut self, path: impl Into<String>) -> Self {
        self.config.endpoint_path = path.into();
        self
    }

    /// Set the connect/handshake timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the transport mode
    pub fn transport_mode(mut self, mode: TransportMode) -> Self {
        self.config.transport_mode = mode;
        self
    }

    /// Set backoff configuration
    pub fn backoff(mut self, config: BackoffConfig) -> Self {
        self.config.backoff = config;
        self
    }

    /// Set heartbeat configuration
    pub fn heartbeat(mut self, config: HeartbeatConfig) -> Self {
        self.config.heartbeat = config;
        self
    }

    /// Build the configuration with validation.
    pub fn build(self) -> Result<ClientConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Invalid backoff configuration
    #[error("Invalid backoff configuration: {0}")]
    InvalidBackoff(String),
    /// Invalid heartbeat configuration
    #[error("Invalid heartbeat configuration: {0}")]
    InvalidHeartbeat(String),
    /// Invalid endpoint path
    #[error("Invalid endpoint configuration: {0}")]
    InvalidEndpoint(String),
    /// Invalid timeout
    #[error("Invalid timeout: {0}")]
    InvalidTimeout(String),
}

/// Which transports the client may use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransportMode {
    /// Native WebSocket, falling back to HTTP polling when it cannot be opened
    #[default]
    Auto,
    /// Native WebSocket only
    WebSocketOnly,
    /// HTTP polling emulation only
    PollingOnly,
}

/// Backoff configuration for reconnection
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the first reconnection attempt
    pub initial_delay: Duration,
    /// Maximum delay between reconnection attempts
    pub max_delay: Duration,
    /// Multiplier for exponential backoff (typically 2.0)
    pub multiplier: f64,
    /// Reconnection attempts before giving up
    pub max_attempts: u32,
    /// Whether to add random jitter to delays
    pub jitter: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_attempts: 10,
            jitter: false,
        }
    }
}

impl BackoffConfig {
    /// Calculate the delay for a given attempt number (1-indexed).
    ///
    /// `min(initial_delay * multiplier^(attempt - 1), max_delay)`; attempt 0 is treated as 1.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base_delay = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped_delay = base_delay.min(self.max_delay.as_millis() as f64);

        if self.jitter {
            // Full jitter: random value between 0 and capped_delay
            let jittered = rand::random::<f64>() * capped_delay;
            Duration::from_millis(jittered as u64)
        } else {
            Duration::from_millis(capped_delay as u64)
        }
    }
}

/// Heartbeat configuration
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// How often we offer to send heartbeats (zero disables)
    pub outgoing: Duration,
    /// How often we ask the server to send heartbeats (zero disables)
    pub incoming: Duration,
    /// Inbound silence allowed, as a multiple of the negotiated incoming interval
    pub tolerance: f64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            outgoing: Duration::from_secs(10),
            incoming: Duration::from_secs(10),
            tolerance: 2.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_delay_calculation() {
        let config = BackoffConfig::default();

        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(2000));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(4000));
        assert_eq!(config.delay_for_attempt(5), Duration::from_millis(16000));

        // Should cap at max_delay
        assert_eq!(config.delay_for_attempt(6), Duration::from_secs(30));
        assert_eq!(config.delay_for_attempt(10), Duration::from_secs(30));
        assert_eq!(config.delay_for_attempt(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_backoff_attempt_zero_behaves_like_first() {
        let config = BackoffConfig::default();
        assert_eq!(config.delay_for_attempt(0), config.delay_for_attempt(1));
    }

    #[test]
    fn test_backoff_with_jitter() {
        let config = BackoffConfig {
            jitter: true,
            ..BackoffConfig::default()
        };

        // With jitter, delay should be between 0 and the calculated delay
        for attempt in 1..8 {
            let delay = config.delay_for_attempt(attempt);
            let max_expected = Duration::from_millis(
                (1000.0 * 2.0_f64.powi(attempt as i32 - 1)).min(30_000.0) as u64,
            );
            assert!(delay <= max_expected);
        }
    }

    #[test]
    fn test_config_builder() {
        let config = ClientConfig::builder()
            .endpoint_path("/notifications")
            .transport_mode(TransportMode::PollingOnly)
            .build()
            .expect("valid config");

        assert_eq!(config.endpoint_path, "/notifications");
        assert_eq!(config.transport_mode, TransportMode::PollingOnly);
        assert_eq!(config.backoff.max_attempts, 10); // default
        assert_eq!(config.heartbeat.outgoing, Duration::from_secs(10));
    }

    #[test]
    fn test_config_builder_rejects_inverted_backoff() {
        let result = ClientConfig::builder()
            .backoff(BackoffConfig {
                initial_delay: Duration::from_secs(60),
                ..BackoffConfig::default()
            })
            .build();

        assert!(matches!(result, Err(ConfigError::InvalidBackoff(_))));
    }

    #[test]
    fn test_config_builder_rejects_zero_attempts() {
        let result = ClientConfig::builder()
            .backoff(BackoffConfig {
                max_attempts: 0,
                ..BackoffConfig::default()
            })
            .build();

        assert!(result.is_err());
    }

    #[test]
    fn test_config_builder_rejects_relative_path() {
        let result = ClientConfig::builder().endpoint_path("ws").build();
        assert!(matches!(result, Err(ConfigError::InvalidEndpoint(_))));
    }

    #[test]
    fn test_validate_rejects_unusable_tolerance() {
        for tolerance in [f64::NAN, -1.0, 0.5, f64::INFINITY] {
            let mut config = ClientConfig::default();
            config.heartbeat.tolerance = tolerance;
            assert!(
                matches!(config.validate(), Err(ConfigError::InvalidHeartbeat(_))),
                "tolerance {} accepted",
                tolerance
            );
        }
        assert!(ClientConfig::default().validate().is_ok());
    }
}
