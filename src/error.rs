use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

pub type ApiResult<T> = Result<T, ApiError>;

/// Error half of the response envelope. Every handler failure funnels
/// through this type so clients always see the same JSON shape.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    errors: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    status_code: u16,
    message: String,
    success: bool,
    errors: Vec<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            errors: Vec::new(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Self::not_found("Resource not found"),
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
                Self::conflict("Resource already exists")
            }
            _ => {
                tracing::error!(error = %err, "database error");
                Self::internal("Internal server error")
            }
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!(error = %err, "internal error");
        Self::internal("Internal server error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = Json(ErrorBody {
            status_code: self.status.as_u16(),
            message: self.message,
            success: false,
            errors: self.errors,
        });
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_body_has_envelope_shape() {
        let err = ApiError::bad_request("All fields are required");
        let body = ErrorBody {
            status_code: err.status.as_u16(),
            message: err.message.clone(),
            success: false,
            errors: err.errors.clone(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["statusCode"], 400);
        assert_eq!(json["message"], "All fields are required");
        assert_eq!(json["success"], false);
        assert!(json["errors"].as_array().unwrap().is_empty());
    }

    #[test]
    fn row_not_found_maps_to_not_found() {
        // RowNotFound is the only sqlx variant constructible without a live
        // connection; the 23505 branch is covered by the registration flow.
        let err: ApiError = sqlx::Error::RowNotFound.into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }
}
