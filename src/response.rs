use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

/// Success half of the response envelope.
#[derive(Debug)]
pub struct ApiResponse<T: Serialize> {
    status: StatusCode,
    data: T,
    message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SuccessBody<T: Serialize> {
    status_code: u16,
    data: T,
    message: String,
    success: bool,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::OK,
            data,
            message: message.into(),
        }
    }

    pub fn created(data: T, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CREATED,
            data,
            message: message.into(),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> axum::response::Response {
        let body = Json(SuccessBody {
            status_code: self.status.as_u16(),
            data: self.data,
            message: self.message,
            success: true,
        });
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_body_has_envelope_shape() {
        let body = SuccessBody {
            status_code: 201,
            data: serde_json::json!({"username": "ann"}),
            message: "User registered successfully".to_string(),
            success: true,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["statusCode"], 201);
        assert_eq!(json["data"]["username"], "ann");
        assert_eq!(json["success"], true);
    }
}
