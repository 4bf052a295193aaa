//! Loader error types

use thiserror::Error;

/// Errors from fetching a single asset
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("URL must start with http:// or https://: {url}")]
    InvalidUrl { url: String },

    #[error("Request to {url} failed: {message}")]
    Network { url: String, message: String },

    #[error("HTTP error {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Asset at {url} too large ({size} bytes, limit {limit})")]
    TooLarge { url: String, size: usize, limit: usize },

    #[error("HTTP client setup failed: {0}")]
    Client(String),
}

/// Errors from running a fetched asset
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Asset {url} is empty")]
    Empty { url: String },

    #[error("Asset {url} is not valid UTF-8")]
    NotUtf8 { url: String },

    #[error("Fragment {fragment} failed to initialize: {message}")]
    Init { fragment: String, message: String },

    #[error("Fragment {fragment} panicked during initialization: {message}")]
    Panicked { fragment: String, message: String },
}

impl ExecutionError {
    /// Turn a caught panic payload into an error for `fragment`
    pub fn from_panic(fragment: impl Into<String>, payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic".to_string()
        };
        Self::Panicked {
            fragment: fragment.into(),
            message,
        }
    }
}

/// Outcome-level error of a fragment load
///
/// Cloneable so every caller joined to one in-flight load gets the same failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("Failed to load code for {name} from {url}: {reason}")]
    CodeLoadFailure { name: String, url: String, reason: String },

    #[error("Failed to load style for {name} from {url}: {reason}")]
    StyleLoadFailure { name: String, url: String, reason: String },

    #[error("Load of {name} aborted: {reason}")]
    Aborted { name: String, reason: String },
}

impl LoadError {
    pub fn is_code_failure(&self) -> bool {
        matches!(self, Self::CodeLoadFailure { .. })
    }

    pub fn is_style_failure(&self) -> bool {
        matches!(self, Self::StyleLoadFailure { .. })
    }

    /// Name of the fragment whose load failed
    pub fn fragment(&self) -> &str {
        match self {
            Self::CodeLoadFailure { name, .. } | Self::StyleLoadFailure { name, .. } | Self::Aborted { name, .. } => name,
        }
    }
}
