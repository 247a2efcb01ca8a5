//! Search provider implementations.

pub mod keyword;
pub mod semantic;

use serde::{Deserialize, Serialize};

/// Available search providers.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchProvider {
    /// Keyword web search (Jina reader search).
    #[default]
    Keyword,
    /// Semantic/neural search (Exa).
    Semantic,
}

impl SearchProvider {
    /// Get the display name of the provider.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Keyword => "Jina Search",
            Self::Semantic => "Exa",
        }
    }

    /// Cache key prefix for this provider.
    #[must_use]
    pub const fn cache_prefix(&self) -> &'static str {
        match self {
            Self::Keyword => "kw",
            Self::Semantic => "sem",
        }
    }
}
