//! External NLP Service Client
//!
//! REST client for extraction backends (SpaCy, Stanza, LLM gateways, ...)
//! exposing a `POST /extract` endpoint.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{EntityExtractor, ExtractionConfig};
use crate::domain::{EntityType, ExtractedEntity, ExtractedRelationship, Extraction};
use crate::error::{EngineError, EngineResult};

// =============================================================================
// REST API Request/Response Types
// =============================================================================

/// Request body for the /extract endpoint.
#[derive(Debug, Serialize)]
struct ExtractRequest<'a> {
    text: &'a str,
    extract_entities: bool,
    extract_relations: bool,
}

/// Response from the /extract endpoint.
#[derive(Debug, Deserialize)]
struct ExtractResponse {
    #[serde(default)]
    entities: Vec<EntityDto>,
    #[serde(default)]
    relations: Vec<RelationDto>,
}

/// Entity as returned by the external service.
#[derive(Debug, Deserialize)]
struct EntityDto {
    text: String,
    label: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    confidence: Option<f32>,
}

/// Relation as returned by the external service.
#[derive(Debug, Deserialize)]
struct RelationDto {
    subject: String,
    predicate: String,
    object: String,
    #[serde(default)]
    confidence: Option<f32>,
}

// =============================================================================
// External NLP Extractor
// =============================================================================

/// Extraction capability backed by an external NLP REST service.
#[derive(Debug, Clone)]
pub struct ExternalNlpExtractor {
    client: Client,
    base_url: String,
    config: ExtractionConfig,
}

impl ExternalNlpExtractor {
    /// Create a new extractor pointed at `base_url`
    /// (e.g. `http://localhost:8080`).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            config: ExtractionConfig::default(),
        }
    }

    /// Create with custom configuration.
    pub fn with_config(base_url: impl Into<String>, config: ExtractionConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            config,
        }
    }
}

#[async_trait]
impl EntityExtractor for ExternalNlpExtractor {
    async fn extract(&self, text: &str) -> EngineResult<Extraction> {
        let url = format!("{}/extract", self.base_url);

        let request = ExtractRequest {
            text,
            extract_entities: true,
            extract_relations: true,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    EngineError::Connection(format!("NLP service unreachable: {e}"))
                } else {
                    EngineError::Extraction(format!("NLP request failed: {e}"))
                }
            })?;

        if !response.status().is_success() {
            return Err(EngineError::Extraction(format!(
                "NLP service returned status {}",
                response.status()
            )));
        }

        let parsed: ExtractResponse = response
            .json()
            .await
            .map_err(|e| EngineError::Extraction(format!("bad NLP response: {e}")))?;

        let entities: Vec<ExtractedEntity> = parsed
            .entities
            .into_iter()
            .filter(|e| e.confidence.unwrap_or(1.0) >= self.config.min_confidence)
            .take(self.config.max_entities)
            .map(|e| {
                let description = e
                    .description
                    .unwrap_or_else(|| format!("{} ({})", e.text, e.label));
                ExtractedEntity {
                    entity_type: EntityType::parse_label(&e.label),
                    title: e.text,
                    description,
                    weight: e.confidence.unwrap_or(1.0),
                }
            })
            .collect();

        let relationships: Vec<ExtractedRelationship> = parsed
            .relations
            .into_iter()
            .map(|r| ExtractedRelationship {
                description: format!("{} {} {}", r.subject, r.predicate, r.object),
                source_title: r.subject,
                target_title: r.object,
                relationship_type: r.predicate,
                weight: r.confidence.unwrap_or(1.0),
            })
            .collect();

        Ok(Extraction {
            entities,
            relationships,
        })
    }

    fn name(&self) -> &'static str {
        "external_nlp"
    }
}

// =============================================================================
// Tests
// =============================================================================
