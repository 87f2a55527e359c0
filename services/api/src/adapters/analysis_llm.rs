//! services/api/src/adapters/analysis_llm.rs
//!
//! This module contains the adapter for the image-analysis LLM.
//! It implements the `ImageAnalysisService` port from the `core` crate.

const ANALYSIS_INSTRUCTIONS: &str = r#"Analyze this skin condition image as an expert dermatology assistant.
Identify the condition, estimate confidence (0-100), assess severity, list observed symptoms,
provide recommendations, and potential treatment options.

Return ONLY raw JSON matching the requested schema. Do not use Markdown code blocks."#;

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessageContentPartImageArgs,
        ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, ImageUrlArgs, ResponseFormat, ResponseFormatJsonSchema,
    },
    Client,
};
use async_trait::async_trait;
use serde_json::json;
use skin_consult_core::{
    domain::{ImagePayload, SkinAnalysisResult},
    ports::{ImageAnalysisService, PortError, PortResult},
};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `ImageAnalysisService` using an
/// OpenAI-compatible multimodal LLM with a strict JSON-schema response.
#[derive(Clone)]
pub struct OpenAiAnalysisAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiAnalysisAdapter {
    /// Creates a new `OpenAiAnalysisAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }

    /// The JSON schema the model's response is constrained to. It enumerates
    /// exactly the `SkinAnalysisResult` fields and the severity enum.
    fn response_schema() -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "condition_name": { "type": "string" },
                "confidence_score": {
                    "type": "number",
                    "description": "Confidence score between 0 and 100"
                },
                "severity": { "type": "string", "enum": ["Mild", "Moderate", "Severe"] },
                "description": { "type": "string" },
                "symptoms_observed": { "type": "array", "items": { "type": "string" } },
                "recommendations": { "type": "array", "items": { "type": "string" } },
                "treatment_options": { "type": "array", "items": { "type": "string" } }
            },
            "required": [
                "condition_name",
                "confidence_score",
                "severity",
                "description",
                "symptoms_observed",
                "recommendations",
                "treatment_options"
            ],
            "additionalProperties": false
        })
    }
}

//=========================================================================================
// `ImageAnalysisService` Trait Implementation
//=========================================================================================

#[async_trait]
impl ImageAnalysisService for OpenAiAnalysisAdapter {
    /// Classifies a skin-condition image into a `SkinAnalysisResult`.
    async fn analyze_image(&self, image: &ImagePayload) -> PortResult<SkinAnalysisResult> {
        let data_url = format!("data:{};base64,{}", image.mime_type, image.data);

        let user_message = ChatCompletionRequestUserMessageArgs::default()
            .content(vec![
                ChatCompletionRequestMessageContentPartImageArgs::default()
                    .image_url(
                        ImageUrlArgs::default()
                            .url(data_url)
                            .build()
                            .map_err(|e| PortError::Analysis(e.to_string()))?,
                    )
                    .build()
                    .map_err(|e| PortError::Analysis(e.to_string()))?
                    .into(),
                ChatCompletionRequestMessageContentPartTextArgs::default()
                    .text(ANALYSIS_INSTRUCTIONS)
                    .build()
                    .map_err(|e| PortError::Analysis(e.to_string()))?
                    .into(),
            ])
            .build()
            .map_err(|e| PortError::Analysis(e.to_string()))?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(vec![user_message.into()])
            .response_format(ResponseFormat::JsonSchema {
                json_schema: ResponseFormatJsonSchema {
                    name: "skin_analysis_result".to_string(),
                    description: Some("Structured skin-condition classification.".to_string()),
                    schema: Some(Self::response_schema()),
                    strict: Some(true),
                },
            })
            .build()
            .map_err(|e| PortError::Analysis(e.to_string()))?;

        // Call the API and manually map the error, which respects the orphan rule.
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Analysis(e.to_string()))?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                PortError::Analysis("No response generated from the AI model.".to_string())
            })?;

        serde_json::from_str::<SkinAnalysisResult>(&content).map_err(|e| {
            PortError::Analysis(format!("Model response was not valid analysis JSON: {e}"))
        })
    }
}
