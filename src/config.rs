//! # Configuration Management
//!
//! This module handles loading and managing application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Environment variables (APP_SERVER_HOST, VAPI_API_KEY, etc.)
//! 2. Configuration file (config.toml)
//! 3. Default values (defined in the Default impl)
//!
//! ## Deployment special cases:
//! A handful of variables used by the original deployment and by hosting
//! platforms don't follow the APP_ prefix convention: HOST, PORT,
//! VAPI_API_KEY, VAPI_ASSISTANT_ID and SERVER_DOMAIN are applied as overrides
//! after the prefixed sources.

use crate::audio::transcode::AudioEncoding;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Main application configuration that contains all settings.
///
/// ## Why separate config structs:
/// Breaking configuration into logical groups (server, backend, audio)
/// makes it easier to understand and maintain as the application grows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub backend: BackendConfig,
    pub audio: AudioConfig,
}

/// Server-specific configuration settings.
///
/// ## Fields:
/// - `host`: IP address or hostname to bind the server to (e.g., "127.0.0.1", "0.0.0.0")
/// - `port`: TCP port number to listen on (1-65535, typically 8080 for development)
/// - `public_domain`: externally reachable domain used to build the WebSocket
///   address handed to the telephony provider (wss://{public_domain}/media-stream)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub public_domain: String,
}

/// Voice-AI backend configuration.
///
/// ## Fields:
/// - `api_base_url`: base URL of the backend REST API (call creation lives at {api_base_url}/call)
/// - `api_key`: bearer token for the call-creation request (passed through, never logged)
/// - `assistant_id`: which assistant the backend should attach to the call
/// - `request_timeout_secs`: bound on the call-creation exchange and the
///   backend socket dial; negotiation never blocks longer than this
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub api_base_url: String,
    pub api_key: String,
    pub assistant_id: String,
    pub request_timeout_secs: u64,
}

/// Defaults applied when a telephony `start` event omits negotiation fields.
///
/// The source deployments disagreed on these defaults, so they are explicit
/// configuration here rather than inferred behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Encoding label assumed when the start event carries none ("audio/pcmu")
    pub default_encoding: String,
    /// Sample rate assumed when the start event carries none
    pub default_sample_rate: u32,
    /// Channel count assumed when the start event carries none
    pub default_channels: u16,
}

/// Provides default configuration values.
///
/// ## Why defaults matter:
/// Default values ensure the application can start even if no configuration
/// file exists. They also serve as documentation of reasonable starting values.
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                public_domain: "localhost:8080".to_string(),
            },
            backend: BackendConfig {
                api_base_url: "https://api.vapi.ai".to_string(),
                api_key: String::new(),
                assistant_id: String::new(),
                request_timeout_secs: 30,
            },
            audio: AudioConfig {
                // Telephony-side native format: mu-law at 8 kHz mono
                default_encoding: "audio/pcmu".to_string(),
                default_sample_rate: 8000,
                default_channels: 1,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Configuration Loading Process:
    /// 1. Start with built-in defaults
    /// 2. Override with values from config.toml (if it exists)
    /// 3. Override with environment variables prefixed with APP_
    /// 4. Handle special-case variables (HOST, PORT, VAPI_*, SERVER_DOMAIN)
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            // Example: APP_SERVER_HOST becomes server.host in the config
            .add_source(config::Environment::with_prefix("APP").separator("_"));

        // Variables used by deployment platforms and the original deployment
        // that don't follow the APP_ prefix convention
        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        if let Ok(domain) = env::var("SERVER_DOMAIN") {
            settings = settings.set_override("server.public_domain", domain)?;
        }

        if let Ok(key) = env::var("VAPI_API_KEY") {
            settings = settings.set_override("backend.api_key", key)?;
        }

        if let Ok(assistant) = env::var("VAPI_ASSISTANT_ID") {
            settings = settings.set_override("backend.assistant_id", assistant)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - Server port is not 0 (port 0 is reserved and can't be used)
    /// - The default audio encoding label is one the transcoder understands
    /// - Sample rate, channel count and the negotiation timeout are non-zero
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.server.public_domain.is_empty() {
            return Err(anyhow::anyhow!("server.public_domain must be set"));
        }

        if AudioEncoding::from_label(&self.audio.default_encoding).is_none() {
            return Err(anyhow::anyhow!(
                "Unknown default audio encoding: {}",
                self.audio.default_encoding
            ));
        }

        if self.audio.default_sample_rate == 0 {
            return Err(anyhow::anyhow!("Default sample rate must be greater than 0"));
        }

        if self.audio.default_channels == 0 {
            return Err(anyhow::anyhow!("Default channel count must be greater than 0"));
        }

        if self.backend.request_timeout_secs == 0 {
            return Err(anyhow::anyhow!("Backend request timeout must be greater than 0"));
        }

        Ok(())
    }

}

impl AudioConfig {
    /// Default encoding as the transcoder enum.
    ///
    /// validate() guarantees the label parses; an unexpected label here falls
    /// back to the mu-law default rather than panicking mid-call.
    pub fn default_encoding(&self) -> AudioEncoding {
        AudioEncoding::from_label(&self.default_encoding).unwrap_or(AudioEncoding::Ulaw8k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test that the default configuration is valid and has expected values.
    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.audio.default_sample_rate, 8000);
        assert!(config.validate().is_ok());
    }

    /// Test that validation catches invalid configurations.
    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.audio.default_encoding = "audio/opus".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.backend.request_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    /// Test that the default encoding label resolves to mu-law.
    #[test]
    fn test_default_encoding_resolution() {
        let config = AppConfig::default();
        assert_eq!(config.audio.default_encoding(), AudioEncoding::Ulaw8k);

        let mut audio = config.audio.clone();
        audio.default_encoding = "audio/l16".to_string();
        assert_eq!(audio.default_encoding(), AudioEncoding::Pcm16Be);
    }
}
