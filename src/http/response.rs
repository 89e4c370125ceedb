//! Framework-neutral response.

use crate::error::ServiceError;
use serde::Serialize;
use serde_json::json;

pub const JSON: &str = "Content-Type: application/json; charset=utf-8";
pub const TEXT: &str = "Content-Type: text/plain; version=0.0.4; charset=utf-8";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl ApiResponse {
    /// Serialize `value` as the JSON body
    pub fn json<T: Serialize>(status: u16, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self {
                status,
                content_type: JSON,
                body,
            },
            Err(err) => {
                log::error!("response serialization failed: {err}");
                Self::message(500, "Internal server error")
            }
        }
    }

    /// `{ "message": … }`
    pub fn message(status: u16, message: &str) -> Self {
        Self {
            status,
            content_type: JSON,
            body: json!({ "message": message }).to_string().into_bytes(),
        }
    }

    pub fn text(status: u16, body: String) -> Self {
        Self {
            status,
            content_type: TEXT,
            body: body.into_bytes(),
        }
    }

    pub fn not_found() -> Self {
        Self::message(404, "Risorsa non trovata")
    }

    pub fn error(err: &ServiceError) -> Self {
        Self::message(err.status(), &err.public_message())
    }

    /// Reason phrase for the status line
    pub fn reason(&self) -> &'static str {
        reason_phrase(self.status)
    }
}

pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        409 => "Conflict",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_body_uses_public_message() {
        let rsp = ApiResponse::error(&ServiceError::Conflict("Questo username è già stato preso.".into()));
        assert_eq!(rsp.status, 409);
        assert_eq!(rsp.reason(), "Conflict");
        let body: serde_json::Value = serde_json::from_slice(&rsp.body).expect("json");
        assert_eq!(body["message"], "Questo username è già stato preso.");
    }

    #[test]
    fn test_not_found() {
        let rsp = ApiResponse::not_found();
        assert_eq!(rsp.status, 404);
        assert_eq!(rsp.content_type, JSON);
    }
}
