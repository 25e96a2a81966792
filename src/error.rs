use thiserror::Error;

/// Failures of a single request against the chat service.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("network error on {endpoint}: {message}")]
    Network { endpoint: String, message: String },

    #[error("server returned {status} for {endpoint}")]
    Server { endpoint: String, status: u16 },

    #[error("malformed response from {endpoint}: {message}")]
    MalformedResponse { endpoint: String, message: String },
}

impl ApiError {
    pub fn network(endpoint: &str, err: impl std::fmt::Display) -> Self {
        ApiError::Network {
            endpoint: endpoint.to_string(),
            message: err.to_string(),
        }
    }

    pub fn malformed(endpoint: &str, err: impl std::fmt::Display) -> Self {
        ApiError::MalformedResponse {
            endpoint: endpoint.to_string(),
            message: err.to_string(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Server { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
