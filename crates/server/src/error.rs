//! Structured errors for the media-repo server.
//!
//! Every failure reaches the client as an MCP error whose `data` carries
//! `{"errcode": ..., "error": ...}` with a Matrix-style error code.

use rmcp::model::{ErrorCode, ErrorData as McpError};
use serde::Serialize;

use mediarepo_core::Error;
use mediarepo_core::config::ConfigError;

/// Structured errors for the media-repo server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Repo(#[from] Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A result could not be serialized.
    #[error("INTERNAL: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn errcode(&self) -> &'static str {
        match self {
            ServerError::Repo(err) => match err {
                Error::NotFound(_) => "M_NOT_FOUND",
                Error::TooLarge(_) => "M_TOO_LARGE",
                Error::InvalidInput(_) => "M_INVALID_PARAM",
                Error::Forbidden(_) => "M_FORBIDDEN",
                Error::Disabled(_) => "M_UNRECOGNIZED",
                Error::Upstream(_) | Error::Malformed(_) => "M_UNKNOWN",
            },
            ServerError::Config(_) | ServerError::Internal(_) => "M_UNKNOWN",
        }
    }
}

/// The `data` payload of an error reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub errcode: &'static str,
    pub error: String,
}

impl From<&ServerError> for ErrorBody {
    fn from(err: &ServerError) -> Self {
        Self { errcode: err.errcode(), error: err.to_string() }
    }
}

impl From<ServerError> for McpError {
    fn from(err: ServerError) -> Self {
        let code = match &err {
            ServerError::Repo(Error::InvalidInput(_)) => -32602,
            ServerError::Internal(_) => -32603,
            _ => -32000,
        };
        let body = ErrorBody::from(&err);
        tracing::debug!(errcode = body.errcode, error = %body.error, "tool call failed");

        McpError { code: ErrorCode(code), message: body.error.clone().into(), data: serde_json::to_value(body).ok() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errcodes() {
        let cases = [
            (Error::NotFound("x".into()), "M_NOT_FOUND"),
            (Error::TooLarge("x".into()), "M_TOO_LARGE"),
            (Error::Upstream("x".into()), "M_UNKNOWN"),
            (Error::Malformed("x".into()), "M_UNKNOWN"),
            (Error::InvalidInput("x".into()), "M_INVALID_PARAM"),
            (Error::Forbidden("x".into()), "M_FORBIDDEN"),
            (Error::Disabled("x".into()), "M_UNRECOGNIZED"),
        ];
        for (err, code) in cases {
            assert_eq!(ServerError::from(err).errcode(), code);
        }
    }

    #[test]
    fn test_error_body_keeps_message() {
        let err = ServerError::from(Error::NotFound("example.org/abc not found on origin".into()));
        let body = ErrorBody::from(&err);
        assert_eq!(body.errcode, "M_NOT_FOUND");
        assert_eq!(body.error, "NOT_FOUND: example.org/abc not found on origin");
    }

    #[test]
    fn test_mcp_error_carries_errcode() {
        let err = McpError::from(ServerError::from(Error::InvalidInput("empty media id".into())));
        assert_eq!(err.code, ErrorCode(-32602));
        assert_eq!(err.message, "INVALID_INPUT: empty media id");
        assert_eq!(err.data.unwrap()["errcode"], "M_INVALID_PARAM");

        let err = McpError::from(ServerError::from(Error::Forbidden("blocked IP: 10.0.0.1".into())));
        assert_eq!(err.code, ErrorCode(-32000));
        assert_eq!(err.data.unwrap()["errcode"], "M_FORBIDDEN");
    }
}
