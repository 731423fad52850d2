//! API error types for GitHub calls

use std::fmt;

/// Errors that can occur when interacting with the GitHub API
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// 401 Unauthorized - token invalid or expired
    Unauthorized { provider: String },
    /// 403 Forbidden - token lacks required permissions
    Forbidden { provider: String, message: String },
    /// 404 Not Found - organization or enterprise does not exist (or is hidden)
    NotFound { provider: String, resource: String },
    /// 429 Rate Limited, or 403 with an exhausted rate limit
    RateLimited {
        provider: String,
        retry_after_secs: Option<u64>,
    },
    /// Network or timeout error
    NetworkError { provider: String, message: String },
    /// Other HTTP errors
    HttpError {
        provider: String,
        status: u16,
        message: String,
    },
    /// Response body could not be decoded, or GraphQL returned errors
    InvalidResponse { provider: String, message: String },
}

impl ApiError {
    /// Check if the error means the addressed organization does not exist.
    ///
    /// Besides the dedicated variant, any error whose text carries a "404" or
    /// "not found" signal counts, since GraphQL and CLI failures only surface
    /// that way.
    pub fn is_not_found(&self) -> bool {
        if matches!(
            self,
            ApiError::NotFound { .. } | ApiError::HttpError { status: 404, .. }
        ) {
            return true;
        }
        let text = self.to_string().to_lowercase();
        text.contains("404") || text.contains("not found")
    }

    /// Create an unauthorized error for a provider
    pub fn unauthorized(provider: impl Into<String>) -> Self {
        ApiError::Unauthorized {
            provider: provider.into(),
        }
    }

    /// Create a forbidden error for a provider
    pub fn forbidden(provider: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::Forbidden {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a not found error for a resource
    pub fn not_found(provider: impl Into<String>, resource: impl Into<String>) -> Self {
        ApiError::NotFound {
            provider: provider.into(),
            resource: resource.into(),
        }
    }

    /// Create a rate limited error for a provider
    pub fn rate_limited(provider: impl Into<String>, retry_after: Option<u64>) -> Self {
        ApiError::RateLimited {
            provider: provider.into(),
            retry_after_secs: retry_after,
        }
    }

    /// Create a network error for a provider
    pub fn network(provider: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::NetworkError {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create an HTTP error for a provider
    pub fn http(provider: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        ApiError::HttpError {
            provider: provider.into(),
            status,
            message: message.into(),
        }
    }

    /// Create an invalid response error for a provider
    pub fn invalid_response(provider: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::InvalidResponse {
            provider: provider.into(),
            message: message.into(),
        }
    }

}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Unauthorized { provider } => {
                write!(f, "{provider}: Unauthorized (401) - token invalid or expired")
            }
            ApiError::Forbidden { provider, message } => {
                if message.is_empty() {
                    write!(f, "{provider}: Forbidden (403) - insufficient permissions")
                } else {
                    write!(f, "{provider}: Forbidden (403) - {message}")
                }
            }
            ApiError::NotFound { provider, resource } => {
                write!(f, "{provider}: Not found (404) - {resource}")
            }
            ApiError::RateLimited {
                provider,
                retry_after_secs,
            } => {
                if let Some(secs) = retry_after_secs {
                    write!(f, "{provider}: Rate limited - retry after {secs}s")
                } else {
                    write!(f, "{provider}: Rate limited")
                }
            }
            ApiError::NetworkError { provider, message } => {
                write!(f, "{provider}: Network error - {message}")
            }
            ApiError::HttpError {
                provider,
                status,
                message,
            } => {
                write!(f, "{provider}: HTTP {status} - {message}")
            }
            ApiError::InvalidResponse { provider, message } => {
                write!(f, "{provider}: Invalid response - {message}")
            }
        }
    }
}

impl std::error::Error for ApiError {}
