//! services/api/src/adapters/specialists_llm.rs
//!
//! This module contains the adapter for the nearby-dermatologist lookup.
//! It implements the `SpecialistFinderService` port from the `core` crate by
//! asking the inference service for a JSON-schema-constrained listing around
//! the supplied coordinates.

const SPECIALIST_INSTRUCTIONS: &str = r#"List dermatology clinics and practitioners near latitude {latitude}, longitude {longitude}.
For each entry provide the practitioner name, clinic name, street address, phone number,
a rating (e.g. "4.6"), and the approximate distance from the coordinates (e.g. "2.3 km").

Return ONLY raw JSON matching the requested schema. Do not use Markdown code blocks."#;

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs, ResponseFormat,
        ResponseFormatJsonSchema,
    },
    Client,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use skin_consult_core::{
    domain::Dermatologist,
    ports::{PortError, PortResult, SpecialistFinderService},
};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `SpecialistFinderService` using an
/// OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiSpecialistAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

/// Strict-mode response formats require an object root, so the array rides
/// under a single `specialists` key.
#[derive(Deserialize)]
struct SpecialistListing {
    specialists: Vec<Dermatologist>,
}

impl OpenAiSpecialistAdapter {
    /// Creates a new `OpenAiSpecialistAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }

    fn response_schema() -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "specialists": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "name": { "type": "string" },
                            "clinic_name": { "type": "string" },
                            "address": { "type": "string" },
                            "phone": { "type": "string" },
                            "rating": { "type": "string" },
                            "distance": { "type": "string" }
                        },
                        "required": ["name", "clinic_name", "address", "phone", "rating", "distance"],
                        "additionalProperties": false
                    }
                }
            },
            "required": ["specialists"],
            "additionalProperties": false
        })
    }
}

//=========================================================================================
// `SpecialistFinderService` Trait Implementation
//=========================================================================================

#[async_trait]
impl SpecialistFinderService for OpenAiSpecialistAdapter {
    /// Looks up dermatologists near the given coordinates. The returned
    /// list keeps the order the model produced it in.
    async fn find_specialists(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> PortResult<Vec<Dermatologist>> {
        let prompt = SPECIALIST_INSTRUCTIONS
            .replace("{latitude}", &latitude.to_string())
            .replace("{longitude}", &longitude.to_string());

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(vec![ChatCompletionRequestUserMessageArgs::default()
                .content(prompt)
                .build()
                .map_err(|e| PortError::Location(e.to_string()))?
                .into()])
            .response_format(ResponseFormat::JsonSchema {
                json_schema: ResponseFormatJsonSchema {
                    name: "specialist_listing".to_string(),
                    description: Some("Dermatologists near the given coordinates.".to_string()),
                    schema: Some(Self::response_schema()),
                    strict: Some(true),
                },
            })
            .build()
            .map_err(|e| PortError::Location(e.to_string()))?;

        // Call the API and manually map the error, which respects the orphan rule.
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Location(e.to_string()))?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                PortError::Location("No response generated from the AI model.".to_string())
            })?;

        let listing = serde_json::from_str::<SpecialistListing>(&content).map_err(|e| {
            PortError::Location(format!("Model response was not a valid specialist listing: {e}"))
        })?;

        Ok(listing.specialists)
    }
}
