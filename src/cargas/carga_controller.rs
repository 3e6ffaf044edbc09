use actix_web::{web, HttpResponse};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::{error, info_span, warn};
use validator::Validate;

use crate::{
    cargas::{carga_service::CargaService, error::CargaError, model::InputFile},
    models::api_response::ApiResponse,
};

#[derive(Debug, Deserialize, Validate)]
pub struct UploadRequest {
    pub id_carga: Option<String>,
    pub keep_local_backup: Option<bool>,
    #[validate(length(min = 1))]
    pub files: Vec<UploadFileRequest>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct UploadFileRequest {
    #[validate(length(min = 1))]
    pub name: String,
    #[serde(default)]
    pub content_base64: String,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    // id-carga before {id} so it is not captured as a batch id
    cfg.service(next_batch_id)
        .service(list_batches)
        .service(get_batch)
        .service(upload)
        .service(retry)
        .service(metrics);
}

fn error_response(e: &CargaError) -> HttpResponse {
    match e {
        CargaError::BatchNotFound(_) | CargaError::DocumentNotFound { .. } => {
            HttpResponse::NotFound().json(ApiResponse::<()>::failure("1002", e.to_string()))
        }
        CargaError::DuplicateBatch(_) | CargaError::InvalidBatchId(_) => {
            HttpResponse::UnprocessableEntity().json(ApiResponse::<()>::failure("1001", e.to_string()))
        }
        CargaError::Ingestion(_) => {
            HttpResponse::BadGateway().json(ApiResponse::<()>::failure("1003", e.to_string()))
        }
        _ => {
            error!("Request failed: {}", e);
            HttpResponse::InternalServerError().json(ApiResponse::<()>::failure("1000", "SYSTEM_ERROR"))
        }
    }
}

#[actix_web::get("/cargas/id-carga")]
async fn next_batch_id(service: web::Data<CargaService>) -> HttpResponse {
    match service.next_batch_id().await {
        Ok(id) => HttpResponse::Ok().json(ApiResponse::ok(serde_json::json!({ "id_carga": id }))),
        Err(e) => error_response(&e),
    }
}

#[actix_web::get("/cargas")]
async fn list_batches(service: web::Data<CargaService>) -> HttpResponse {
    match service.list_batches().await {
        Ok(batches) => HttpResponse::Ok().json(ApiResponse::ok(batches)),
        Err(e) => error_response(&e),
    }
}

#[actix_web::get("/cargas/{id}")]
async fn get_batch(service: web::Data<CargaService>, id: web::Path<String>) -> HttpResponse {
    match service.batch_detail(&id).await {
        Ok(detail) => HttpResponse::Ok().json(ApiResponse::ok(detail)),
        Err(e) => error_response(&e),
    }
}

#[actix_web::post("/cargas")]
async fn upload(service: web::Data<CargaService>, request: web::Json<UploadRequest>) -> HttpResponse {
    let _span = info_span!("upload-api", correlation_id = uuid::Uuid::new_v4().to_string()).entered();

    let request = request.into_inner();
    if request.validate().is_err() || request.files.iter().any(|f| f.validate().is_err()) {
        return HttpResponse::UnprocessableEntity()
            .json(ApiResponse::<()>::failure("1001", "INVALID_UPLOAD_REQUEST"));
    }

    let mut files = Vec::with_capacity(request.files.len());
    for file in request.files {
        match STANDARD.decode(file.content_base64.trim()) {
            Ok(content) => files.push(InputFile::new(file.name, content)),
            Err(e) => {
                warn!(file = %file.name, "Invalid base64 content: {}", e);
                return HttpResponse::UnprocessableEntity()
                    .json(ApiResponse::<()>::failure("1001", "INVALID_FILE_CONTENT"));
            }
        }
    }
    drop(_span);

    match service
        .start_upload(request.id_carga, files, request.keep_local_backup)
        .await
    {
        Ok(result) => HttpResponse::Ok().json(ApiResponse::ok(result)),
        Err(e) => error_response(&e),
    }
}

#[actix_web::post("/cargas/{id}/reintentar")]
async fn retry(service: web::Data<CargaService>, id: web::Path<String>) -> HttpResponse {
    match service.retry(&id).await {
        Ok(result) => HttpResponse::Ok().json(ApiResponse::ok(result)),
        Err(e) => error_response(&e),
    }
}

#[actix_web::get("/metrics")]
async fn metrics(service: web::Data<CargaService>) -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::ok(service.metrics()))
}
