use thiserror::Error;

/// Why a single document ended in ERROR. Recorded on the document, never
/// propagated past the per-file loop.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    #[error("empty PDF file")]
    EmptyInput,

    #[error("only PDF files are accepted")]
    NotPdf,

    #[error("local backup failed: {0}")]
    LocalBackupWrite(String),

    #[error("{0}")]
    RemoteSubmission(String),

    #[error("no local backup available to retry (enable local backup)")]
    LocalBackupMissing,
}

impl DocumentError {
    pub fn kind(&self) -> &'static str {
        match self {
            DocumentError::EmptyInput => "empty_input",
            DocumentError::NotPdf => "not_pdf",
            DocumentError::LocalBackupWrite(_) => "local_backup_write",
            DocumentError::RemoteSubmission(_) => "remote_submission",
            DocumentError::LocalBackupMissing => "local_backup_missing",
        }
    }
}

pub type DocumentOutcome<T> = Result<T, DocumentError>;
