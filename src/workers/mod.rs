pub mod error;
pub mod metrics;
pub mod retry_worker;
pub mod upload_worker;

pub use metrics::BatchMetrics;
