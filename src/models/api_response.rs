use serde::{Deserialize, Serialize};

pub const API_ENTITY: &str = "CARGA_PDF_SERVICE";

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub errors: Option<Vec<ApiError>>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            errors: None,
        }
    }

    pub fn failure(code: &str, cause: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            errors: Some(vec![ApiError {
                entity: API_ENTITY.to_string(),
                code: code.to_string(),
                cause: cause.into(),
            }]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiError {
    pub entity: String,
    pub code: String,
    pub cause: String,
}
