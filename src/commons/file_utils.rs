use std::{
    io,
    path::{Path, PathBuf},
};

use tokio::{fs, io::AsyncWriteExt};
use uuid::Uuid;

/// `report.pdf` -> `report_<32 hex chars>.pdf`. A fresh token on every call.
pub fn unique_submitted_name(original: &str) -> String {
    let token = Uuid::new_v4().simple().to_string();
    let path = Path::new(original);

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    match path.extension() {
        Some(ext) => format!("{}_{}.{}", stem, token, ext.to_string_lossy()),
        None => format!("{}_{}", stem, token),
    }
}

/// Case-insensitive `.pdf` check on the file name.
pub fn has_pdf_extension(name: &str) -> bool {
    Path::new(name)
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

pub fn backup_path(root: &Path, submitted_name: &str) -> PathBuf {
    root.join(submitted_name)
}

pub async fn init_upload_dir(root: &Path) -> io::Result<()> {
    fs::create_dir_all(root).await
}

pub async fn write_backup(root: &Path, submitted_name: &str, content: &[u8]) -> io::Result<PathBuf> {
    let path = backup_path(root, submitted_name);
    let mut file = fs::File::create(&path).await?;
    file.write_all(content).await?;
    file.flush().await?;
    Ok(path)
}

/// Backed-up bytes, or `None` when the file is gone or empty.
pub async fn read_backup(path: &Path) -> Option<Vec<u8>> {
    match fs::read(path).await {
        Ok(bytes) if !bytes.is_empty() => Some(bytes),
        _ => None,
    }
}
