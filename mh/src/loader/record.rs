//! Load requests, records and outcomes

use std::fmt;

use fragbus::Capabilities;

/// What to load for one fragment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    pub name: String,
    pub code_url: String,
    pub style_url: Option<String>,
    pub capabilities: Capabilities,
}

impl LoadRequest {
    pub fn new(name: impl Into<String>, code_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            code_url: code_url.into(),
            style_url: None,
            capabilities: Capabilities::full(),
        }
    }

    pub fn with_style(mut self, style_url: impl Into<String>) -> Self {
        self.style_url = Some(style_url.into());
        self
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }
}

/// Per-fragment load lifecycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LoadRecord {
    #[default]
    NotLoaded,
    Loading,
    Loaded,
    Failed {
        reason: String,
    },
}

impl LoadRecord {
    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded)
    }
}

impl fmt::Display for LoadRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotLoaded => write!(f, "not loaded"),
            Self::Loading => write!(f, "loading"),
            Self::Loaded => write!(f, "loaded"),
            Self::Failed { reason } => write!(f, "failed: {}", reason),
        }
    }
}

/// How a successful `load` was satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Assets were fetched by this call
    Fetched,
    /// Already loaded; nothing fetched
    Cached,
    /// Attached to a load another caller started
    Joined,
}
