//! Model listing over the REST API, used to check a key and pick a model.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tracing::debug;

use crate::session::config::ApiKey;

pub const MODELS_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub supported_generation_methods: Vec<String>,
}

impl ModelInfo {
    /// Whether the model can be used over the Live websocket.
    pub fn supports_live(&self) -> bool {
        self.supported_generation_methods
            .iter()
            .any(|m| m == "bidiGenerateContent")
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelList {
    #[serde(default)]
    models: Vec<ModelInfo>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// Fetch every model visible to `api_key`, following pagination.
pub async fn list_models(endpoint: &str, api_key: &ApiKey) -> Result<Vec<ModelInfo>> {
    let client = reqwest::Client::new();
    let mut models = Vec::new();
    let mut page_token: Option<String> = None;

    loop {
        let mut request = client
            .get(endpoint)
            .query(&[("key", api_key.expose())]);
        if let Some(token) = &page_token {
            request = request.query(&[("pageToken", token.as_str())]);
        }

        let response = request.send().await.context("Model list request failed")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Model list request returned {status}: {body}");
        }

        let page: ModelList = response
            .json()
            .await
            .context("Invalid model list response")?;
        debug!("Fetched {} models", page.models.len());
        models.extend(page.models);

        match page.next_page_token.filter(|t| !t.is_empty()) {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }

    Ok(models)
}
