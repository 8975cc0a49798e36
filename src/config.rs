//! Server Configuration
//!
//! Layered configuration in the order defaults < file < environment < CLI.
//! Environment variables use the `GRAPHMEM_` prefix with `__` as the section
//! separator (e.g. `GRAPHMEM_SERVER__PORT=7070`).

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::{EngineError, EngineResult};
use crate::rag::embedding::{HashedEmbedder, LocalEmbedder, TextEmbedder};
use crate::rag::extraction::{EntityExtractor, ExternalNlpExtractor, PatternExtractor};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Host to bind
    #[arg(long, env = "HOST")]
    pub host: Option<String>,

    /// Extraction capability: "pattern" or "external"
    #[arg(long, env = "EXTRACTOR")]
    pub extractor: Option<String>,

    /// Embedding capability: "local" or "hashed"
    #[arg(long, env = "EMBEDDER")]
    pub embedder: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub capabilities: CapabilityConfig,
    pub session: SessionDefaults,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    /// Per-request timeout applied by the HTTP layer, in seconds.
    pub request_timeout_seconds: u64,
}

/// Which extraction/embedding providers to construct at startup.
#[derive(Debug, Deserialize, Clone)]
pub struct CapabilityConfig {
    /// "pattern" or "external".
    pub extractor: String,
    /// Base URL of the external NLP service; required when `extractor` is
    /// "external".
    pub extractor_url: Option<String>,
    /// "local" (fastembed) or "hashed" (deterministic, offline).
    pub embedder: String,
    /// Dimensionality of the hashed embedder.
    pub hashed_dimension: usize,
}

/// Server-side defaults applied when a session is created over the API.
#[derive(Debug, Deserialize, Clone)]
pub struct SessionDefaults {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub auto_detect_communities: bool,
    pub capability_timeout_seconds: u64,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;

        let mut builder = Config::builder()
            .set_default("server.port", 6161)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.request_timeout_seconds", 120)?
            .set_default("capabilities.extractor", "pattern")?
            .set_default("capabilities.embedder", "local")?
            .set_default("capabilities.hashed_dimension", 256)?
            .set_default("session.chunk_size", 800)?
            .set_default("session.chunk_overlap", 100)?
            .set_default("session.auto_detect_communities", true)?
            .set_default("session.capability_timeout_seconds", 30)?;

        // Config file: explicit path wins (clap also reads CONFIG_FILE),
        // ./config.{yaml,toml,...} is an optional fallback.
        if let Some(path) = cli.config.as_deref() {
            builder = builder.add_source(File::with_name(path));
        } else {
            builder = builder.add_source(File::with_name("config").required(false));
        }

        // Environment variables, GRAPHMEM_SERVER__PORT and friends.
        builder = builder.add_source(
            Environment::with_prefix("GRAPHMEM")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        // CLI overrides win over everything.
        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", i64::from(port))?;
        }
        if let Some(host) = cli.host {
            builder = builder.set_override("server.host", host)?;
        }
        if let Some(extractor) = cli.extractor {
            builder = builder.set_override("capabilities.extractor", extractor)?;
        }
        if let Some(embedder) = cli.embedder {
            builder = builder.set_override("capabilities.embedder", embedder)?;
        }

        let cfg = builder.build()?;
        cfg.try_deserialize()
    }
}

impl CapabilityConfig {
    /// Construct the configured extraction capability.
    ///
    /// Selecting "external" without a URL is a configuration error, raised
    /// here at startup rather than on the first indexing call.
    pub fn build_extractor(&self) -> EngineResult<Arc<dyn EntityExtractor>> {
        match self.extractor.as_str() {
            "pattern" => Ok(Arc::new(PatternExtractor::new())),
            "external" => {
                let url = self
                    .extractor_url
                    .as_deref()
                    .map(str::trim)
                    .filter(|u| !u.is_empty())
                    .ok_or_else(|| {
                        EngineError::Configuration(
                            "extractor_url is required for the external extractor".to_string(),
                        )
                    })?;
                Ok(Arc::new(ExternalNlpExtractor::new(url)))
            }
            other => Err(EngineError::Configuration(format!(
                "unknown extractor capability: {other}"
            ))),
        }
    }

    /// Construct the configured embedding capability.
    pub fn build_embedder(&self) -> EngineResult<Arc<dyn TextEmbedder>> {
        match self.embedder.as_str() {
            "local" => Ok(Arc::new(LocalEmbedder::new())),
            "hashed" => Ok(Arc::new(HashedEmbedder::new(self.hashed_dimension))),
            other => Err(EngineError::Configuration(format!(
                "unknown embedder capability: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_external_extractor_requires_url() {
        let caps = CapabilityConfig {
            extractor: "external".to_string(),
            extractor_url: None,
            embedder: "hashed".to_string(),
            hashed_dimension: 64,
        };
        assert!(matches!(
            caps.build_extractor(),
            Err(EngineError::Configuration(_))
        ));

        let caps = CapabilityConfig {
            extractor_url: Some("http://localhost:8080".to_string()),
            ..caps
        };
        assert!(caps.build_extractor().is_ok());
    }

    #[test]
    fn test_unknown_capabilities_rejected() {
        let caps = CapabilityConfig {
            extractor: "quantum".to_string(),
            extractor_url: None,
            embedder: "psychic".to_string(),
            hashed_dimension: 64,
        };
        assert!(caps.build_extractor().is_err());
        assert!(caps.build_embedder().is_err());
    }
}
