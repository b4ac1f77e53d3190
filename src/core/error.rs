// Centralized error handling for the login service

use crate::models::inventory::TreeError;
use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Errors that abort a login negotiation
#[derive(Error, Debug)]
pub enum LoginError {
    #[error("Malformed login request: {0}")]
    MalformedRequest(String),

    /// The requested name pair cannot be used for a login
    #[error("Account could not be resolved: {0}")]
    AccountResolution(String),

    #[error("Storage failure: {0}")]
    Storage(#[from] StoreError),

    #[error("Feature negotiation failed: {0}")]
    Negotiation(String),
}

impl LoginError {
    /// Numeric fault code reported to XML-RPC clients
    pub fn fault_code(&self) -> i32 {
        match self {
            LoginError::MalformedRequest(_) => 400,
            LoginError::AccountResolution(_) => 404,
            LoginError::Storage(_) => 500,
            LoginError::Negotiation(_) => 500,
        }
    }
}

impl IntoResponse for LoginError {
    fn into_response(self) -> Response {
        let body = crate::rpc::encoder::encode_fault(self.fault_code(), &self.to_string());

        // Faults travel in-band, the HTTP exchange itself succeeded
        (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/xml")],
            body,
        )
            .into_response()
    }
}

impl From<RpcParseError> for LoginError {
    fn from(err: RpcParseError) -> Self {
        LoginError::MalformedRequest(err.to_string())
    }
}

/// XML-RPC document errors
#[derive(Error, Debug, PartialEq)]
pub enum RpcParseError {
    #[error("Unexpected end of document while reading {0}")]
    UnexpectedEof(&'static str),

    #[error("Expected {expected}, found {found}")]
    Unexpected { expected: String, found: String },

    #[error("Invalid {kind} value '{text}'")]
    InvalidScalar { kind: &'static str, text: String },

    #[error("Unknown entity '&{0};'")]
    UnknownEntity(String),

    #[error("Values nested deeper than {0} levels")]
    TooDeep(usize),
}

/// Account and inventory persistence failures
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt record in {path}: {reason}")]
    Corrupt { path: String, reason: String },

    #[error("Failed to serialize record: {0}")]
    Serialize(String),

    #[error("Journal write failed: {0}")]
    Journal(String),

    /// A shared record's name is already held by an unrelated record
    #[error("Concurrent bootstrap of {0}")]
    BootstrapConflict(String),

    #[error("Invalid tree: {0}")]
    Tree(#[from] TreeError),
}

/// Failures decoding a circuit establishment packet
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CircuitDecodeError {
    #[error("Packet truncated while reading {field}")]
    Truncated { field: &'static str },

    #[error("Field {field} is not valid UTF-8")]
    InvalidUtf8 { field: &'static str },

    #[error("Field {field} is not a valid UUID")]
    InvalidUuid { field: &'static str },
}

/// Failures binding transport traffic to a presence
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PresenceError {
    #[error("No presence holds circuit code {0}")]
    UnknownCircuit(u32),

    #[error("Session or agent id does not match circuit {0}")]
    SessionMismatch(u32),
}

/// Outcome of a failing feature provider
#[derive(Error, Debug)]
pub enum FeatureError {
    /// Persistence failed; the whole negotiation is aborted
    #[error("Storage failure: {0}")]
    Storage(#[from] StoreError),

    /// The provider could not contribute; other providers still run
    #[error("{0}")]
    Failed(String),
}

#[derive(Error, Debug)]
pub enum MonitoringError {
    #[error("Invalid API key")]
    InvalidApiKey,
}

impl IntoResponse for MonitoringError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            MonitoringError::InvalidApiKey => (StatusCode::UNAUTHORIZED, "Unauthorized"),
        };

        (status, message).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn test_login_error_renders_fault() {
        let response = LoginError::MalformedRequest("missing field 'first'".to_string()).into_response();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/xml"
        );

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = String::from_utf8(bytes.to_vec()).unwrap();

        assert!(body.contains("<fault>"));
        assert!(body.contains("<int>400</int>"));
        assert!(body.contains("missing field &apos;first&apos;"));
    }

    #[tokio::test]
    async fn test_monitoring_error_unauthorized() {
        let response = MonitoringError::InvalidApiKey.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_fault_codes() {
        assert_eq!(LoginError::MalformedRequest(String::new()).fault_code(), 400);
        assert_eq!(
            LoginError::Storage(StoreError::Serialize("x".to_string())).fault_code(),
            500
        );
    }
}
