use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    InProgress,
    Completed,
    Error,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::InProgress => "IN_PROGRESS",
            BatchStatus::Completed => "COMPLETED",
            BatchStatus::Error => "ERROR",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "IN_PROGRESS" => Some(BatchStatus::InProgress),
            "COMPLETED" => Some(BatchStatus::Completed),
            "ERROR" => Some(BatchStatus::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    Pending,
    Ok,
    Error,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "PENDING",
            DocumentStatus::Ok => "OK",
            DocumentStatus::Error => "ERROR",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(DocumentStatus::Pending),
            "OK" => Some(DocumentStatus::Ok),
            "ERROR" => Some(DocumentStatus::Error),
            _ => None,
        }
    }
}

/// A batch ("carga") of files submitted together under one id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub status: BatchStatus,
    pub status_comment: String,
}

impl Batch {
    pub fn new(id: String) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            status: BatchStatus::InProgress,
            status_comment: "batch started".to_string(),
        }
    }
}

/// Opaque handles the ingestion API hands back for a stored file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteHandles {
    pub container: String,
    pub blob_name: String,
    pub blob_url: String,
}

/// Processing record of one file within a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub original_name: String,
    pub submitted_name: String,
    pub local_backup_path: Option<String>,
    pub status: DocumentStatus,
    pub error_detail: String,
    #[serde(flatten)]
    pub handles: RemoteHandles,
    pub size_bytes: u64,
}

impl Document {
    pub fn pending(original_name: impl Into<String>) -> Self {
        Self {
            original_name: original_name.into(),
            submitted_name: String::new(),
            local_backup_path: None,
            status: DocumentStatus::Pending,
            error_detail: String::new(),
            handles: RemoteHandles::default(),
            size_bytes: 0,
        }
    }

    pub fn mark_ok(&mut self, handles: RemoteHandles, size_bytes: u64) {
        self.status = DocumentStatus::Ok;
        self.error_detail.clear();
        self.handles = handles;
        self.size_bytes = size_bytes;
    }

    pub fn mark_error(&mut self, detail: impl Into<String>) {
        self.status = DocumentStatus::Error;
        self.error_detail = detail.into();
    }

    pub fn is_error(&self) -> bool {
        self.status == DocumentStatus::Error
    }
}

/// One file handed to the upload executor.
#[derive(Debug, Clone)]
pub struct InputFile {
    pub name: String,
    pub content: Vec<u8>,
}

impl InputFile {
    pub fn new(name: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content,
        }
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// Batch plus its documents, as returned to API callers.
#[derive(Debug, Clone, Serialize)]
pub struct BatchDetail {
    #[serde(flatten)]
    pub batch: Batch,
    pub documents: Vec<Document>,
}

/// Aggregate status derived from the document list.
pub fn aggregate_status(documents: &[Document]) -> BatchStatus {
    if documents.iter().any(|d| d.status == DocumentStatus::Error) {
        BatchStatus::Error
    } else if !documents.is_empty() && documents.iter().all(|d| d.status == DocumentStatus::Ok) {
        BatchStatus::Completed
    } else {
        BatchStatus::InProgress
    }
}
