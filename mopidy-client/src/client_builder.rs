//! Client builder and connection settings
//!
//! The `ClientBuilder` resolves an immutable [`ConnectionSettings`] and
//! creates a [`MopidyClient`]. It allows you to:
//! - Point the client at a server, or inject a transport factory
//! - Choose the calling convention for the generated API
//! - Tune the reconnection backoff
//! - Configure observability (OpenTelemetry)
//!
//! # Examples
//!
//! ```rust,no_run
//! use mopidy_client::{CallingConvention, ClientBuilder};
//! use std::time::Duration;
//!
//! # async fn example() -> mopidy_core::Result<()> {
//! let client = ClientBuilder::new()
//!     .url("ws://mopidy.local:6680/mopidy/ws")
//!     .calling_convention(CallingConvention::ByPositionOrByName)
//!     .backoff_delay_max(Duration::from_secs(30))
//!     .build()
//!     .await?;
//!
//! client.wait_until_online().await;
//! # Ok(())
//! # }
//! ```

use crate::api::{CallingConvention, MethodNaming};
use crate::reconnect::ExponentialBackoff;
use crate::transport::TransportFactory;
use crate::{ClientMetrics, MopidyClient, WebSocketConnector};
use mopidy_core::{Error, ObservabilityConfig, Result};
use std::sync::Arc;
use std::time::Duration;

/// Environment variable naming the host of the default server URL.
pub const MOPIDY_HOST_ENV: &str = "MOPIDY_HOST";

pub const DEFAULT_BACKOFF_DELAY_MIN: Duration = Duration::from_millis(1000);
pub const DEFAULT_BACKOFF_DELAY_MAX: Duration = Duration::from_millis(64000);
pub const DEFAULT_BACKOFF_FACTOR: u32 = 2;

/// `ws://<host>/mopidy/ws`, with `localhost` when no host is known
pub fn default_url_for(host: Option<&str>) -> String {
    let host = host.filter(|h| !h.is_empty()).unwrap_or("localhost");
    format!("ws://{}/mopidy/ws", host)
}

/// Default URL using [`MOPIDY_HOST_ENV`]
pub fn default_url() -> String {
    default_url_for(std::env::var(MOPIDY_HOST_ENV).ok().as_deref())
}

/// Settings resolved at construction; read-only afterwards
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSettings {
    pub url: String,
    pub auto_connect: bool,
    pub calling_convention: CallingConvention,
    /// False when the convention fell back to the default
    pub calling_convention_explicit: bool,
    pub method_naming: MethodNaming,
    pub backoff_delay_min: Duration,
    pub backoff_delay_max: Duration,
    pub backoff_factor: u32,
    pub backoff_jitter: bool,
}

impl ConnectionSettings {
    /// A fresh backoff at its minimum delay
    pub fn backoff(&self) -> ExponentialBackoff {
        let backoff = ExponentialBackoff::new(self.backoff_delay_min, self.backoff_delay_max)
            .with_factor(self.backoff_factor);
        if self.backoff_jitter {
            backoff.with_jitter()
        } else {
            backoff
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.url.is_empty() {
            return Err(Error::Config("url must not be empty".to_string()));
        }
        if self.backoff_delay_min.is_zero() {
            return Err(Error::Config(
                "backoff_delay_min must be greater than zero".to_string(),
            ));
        }
        if self.backoff_delay_min > self.backoff_delay_max {
            return Err(Error::Config(format!(
                "backoff_delay_min ({:?}) exceeds backoff_delay_max ({:?})",
                self.backoff_delay_min, self.backoff_delay_max
            )));
        }
        if self.backoff_factor == 0 {
            return Err(Error::Config("backoff_factor must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Builder for configuring and creating a [`MopidyClient`]
pub struct ClientBuilder {
    url: Option<String>,
    transport: Option<Arc<dyn TransportFactory>>,
    auto_connect: bool,
    calling_convention: Option<CallingConvention>,
    method_naming: MethodNaming,
    backoff_delay_min: Duration,
    backoff_delay_max: Duration,
    backoff_factor: u32,
    backoff_jitter: bool,
    observability_config: Option<ObservabilityConfig>,
    service_name: Option<String>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            url: None,
            transport: None,
            auto_connect: true,
            calling_convention: None,
            method_naming: MethodNaming::default(),
            backoff_delay_min: DEFAULT_BACKOFF_DELAY_MIN,
            backoff_delay_max: DEFAULT_BACKOFF_DELAY_MAX,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            backoff_jitter: false,
            observability_config: None,
            service_name: None,
        }
    }

    /// Server URL; defaults to [`default_url`]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Use `factory` instead of opening WebSocket connections directly
    pub fn with_transport(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.transport = Some(factory);
        self
    }

    /// Connect during `build()` (default `true`)
    pub fn auto_connect(mut self, enabled: bool) -> Self {
        self.auto_connect = enabled;
        self
    }

    pub fn calling_convention(mut self, convention: CallingConvention) -> Self {
        self.calling_convention = Some(convention);
        self
    }

    pub fn method_naming(mut self, naming: MethodNaming) -> Self {
        self.method_naming = naming;
        self
    }

    pub fn backoff_delay_min(mut self, delay: Duration) -> Self {
        self.backoff_delay_min = delay;
        self
    }

    pub fn backoff_delay_max(mut self, delay: Duration) -> Self {
        self.backoff_delay_max = delay;
        self
    }

    pub fn backoff_factor(mut self, factor: u32) -> Self {
        self.backoff_factor = factor;
        self
    }

    /// Randomize each reconnection delay by up to 25%
    pub fn with_jitter(mut self) -> Self {
        self.backoff_jitter = true;
        self
    }

    /// Enable OpenTelemetry observability with custom configuration
    pub fn with_observability(mut self, config: ObservabilityConfig) -> Self {
        self.observability_config = Some(config);
        self
    }

    /// Enable OpenTelemetry observability with default configuration
    pub fn with_default_observability(mut self) -> Self {
        self.observability_config = Some(ObservabilityConfig::default());
        self
    }

    /// Set service name for observability (used if observability is enabled)
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Resolve and validate the settings without building a client
    pub fn settings(&self) -> Result<ConnectionSettings> {
        let settings = ConnectionSettings {
            url: self.url.clone().unwrap_or_else(default_url),
            auto_connect: self.auto_connect,
            calling_convention: self.calling_convention.unwrap_or_default(),
            calling_convention_explicit: self.calling_convention.is_some(),
            method_naming: self.method_naming,
            backoff_delay_min: self.backoff_delay_min,
            backoff_delay_max: self.backoff_delay_max,
            backoff_factor: self.backoff_factor,
            backoff_jitter: self.backoff_jitter,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Create the client, connecting right away when auto-connect is on
    ///
    /// The client is returned once the connection attempt has started;
    /// use [`MopidyClient::wait_until_online`] to wait for the API.
    pub async fn build(self) -> Result<MopidyClient> {
        let settings = self.settings()?;

        let metrics = if let Some(mut config) = self.observability_config {
            if let Some(name) = self.service_name {
                config.service_name = name;
            }

            mopidy_core::init_observability(config.clone()).map_err(|e| {
                Error::Internal(format!("Failed to initialize observability: {}", e))
            })?;

            Some(Arc::new(ClientMetrics::new(config.service_name.clone())))
        } else {
            None
        };

        if !settings.calling_convention_explicit {
            tracing::warn!(
                default = %settings.calling_convention,
                "No calling convention set; the default may change in a future release. \
                 Set one explicitly with ClientBuilder::calling_convention"
            );
        }

        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(WebSocketConnector::new()));

        let client = MopidyClient::new(settings, transport, metrics).await;
        if client.settings().auto_connect {
            client.connect().await?;
        }
        Ok(client)
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
