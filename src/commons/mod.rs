pub mod file_utils;
pub mod ingestion_service;
