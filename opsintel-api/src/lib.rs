pub mod handlers;
pub mod metrics;
pub mod server;
pub mod state;

use axum::{http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use opsintel_core::model::DateRange;
use opsintel_core::OpsError;
use serde::{Deserialize, Serialize};

pub use server::{router, ApiServer};
pub use state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn error(error: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            timestamp: Utc::now(),
        }
    }
}

/// Dataset headline figures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Overview {
    pub date_range: Option<DateRange>,
    pub total_tpv: f64,
}

pub type ApiResult<T> = std::result::Result<Json<ApiResponse<T>>, ApiError>;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = Json(ApiResponse::<()>::error(self.message));
        (self.status, body).into_response()
    }
}

impl From<OpsError> for ApiError {
    fn from(err: OpsError) -> Self {
        let status = match &err {
            OpsError::InsufficientData { .. } => StatusCode::NOT_FOUND,
            e if e.is_data_access() => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}
