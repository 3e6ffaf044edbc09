use std::time::Duration;

use reqwest::{multipart, Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::cargas::model::RemoteHandles;

const UPLOAD_PATH: &str = "/storage/pdf";
const BATCH_ID_PATH: &str = "/dashboard/id-carga";

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("batch id is empty, cannot submit the PDF")]
    MissingBatchId,
}

#[derive(Debug, Deserialize)]
struct BatchIdResponse {
    #[serde(default)]
    id_carga: Option<Value>,
}

/// Client for the remote ingestion API that stores the PDFs.
#[derive(Clone)]
pub struct IngestionService {
    client: Client,
    upload_url: String,
    batch_id_url: String,
}

impl IngestionService {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, IngestionError> {
        let client = Client::builder().timeout(timeout).build()?;
        let base = base_url.trim_end_matches('/');

        Ok(Self {
            client,
            upload_url: format!("{}{}", base, UPLOAD_PATH),
            batch_id_url: format!("{}{}", base, BATCH_ID_PATH),
        })
    }

    /// Ask the ingestion API for a fresh batch id.
    #[instrument(skip(self))]
    pub async fn issue_batch_id(&self) -> Result<String, IngestionError> {
        let response = self.client.get(&self.batch_id_url).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(IngestionError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        let parsed: BatchIdResponse = serde_json::from_str(&body)
            .map_err(|e| IngestionError::InvalidResponse(format!("{}: {}", e, body)))?;

        // The API has been seen returning the id both as a string and as a number
        let id = match parsed.id_carga {
            Some(Value::String(s)) => s,
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        };

        if id.trim().is_empty() {
            return Err(IngestionError::InvalidResponse(body));
        }

        debug!(id_carga = %id, "Batch id issued");
        Ok(id)
    }

    /// Submit one PDF under `batch_id`, returning the storage handles on success.
    #[instrument(skip(self, content), fields(size = content.len()))]
    pub async fn submit_pdf(
        &self,
        content: Vec<u8>,
        filename: &str,
        batch_id: &str,
    ) -> Result<RemoteHandles, IngestionError> {
        if batch_id.trim().is_empty() {
            return Err(IngestionError::MissingBatchId);
        }

        let file_part = multipart::Part::bytes(content)
            .file_name(filename.to_string())
            .mime_str("application/pdf")?;
        let form = multipart::Form::new()
            .part("file", file_part)
            .text("id_carga", batch_id.to_string());

        let response = self.client.post(&self.upload_url).multipart(form).send().await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        debug!(status = status.as_u16(), "Ingestion API answered");

        if status != StatusCode::OK && status != StatusCode::CREATED {
            return Err(IngestionError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let json: Value = serde_json::from_str(&body)
            .map_err(|e| IngestionError::InvalidResponse(format!("{}: {}", e, body)))?;

        Ok(handles_from_response(&json))
    }
}

/// The API answers `{ "blob": { container, blob_name, url }, "mongo": {...} }`.
/// Missing fields become empty strings.
fn handles_from_response(json: &Value) -> RemoteHandles {
    let blob = json.get("blob");
    let field = |name: &str| {
        blob.and_then(|b| b.get(name))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    RemoteHandles {
        container: field("container"),
        blob_name: field("blob_name"),
        blob_url: field("url"),
    }
}
