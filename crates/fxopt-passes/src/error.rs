//! Error types for rewrite passes.

use fxopt_core::CoreError;
use thiserror::Error;

/// Errors produced while building or running rewrite passes.
#[derive(Debug, Error)]
pub enum PassError {
    /// A graph or hierarchy operation failed inside a pass.
    #[error("pass '{pass}' failed: {source}")]
    Core {
        pass: &'static str,
        #[source]
        source: CoreError,
    },

    /// A pass returned a module that no longer lints.
    #[error("pass '{pass}' produced an invalid graph module: {source}")]
    Lint {
        pass: &'static str,
        #[source]
        source: CoreError,
    },

    /// No pass is registered under this name.
    #[error("unknown pass '{name}' (expected one of: {expected})")]
    UnknownPass { name: String, expected: String },
}

impl PassError {
    /// Tags a core error with the pass it came from.
    pub fn core(pass: &'static str) -> impl FnOnce(CoreError) -> PassError {
        move |source| PassError::Core { pass, source }
    }

    /// Name of the failing pass, if the error came from one.
    pub fn pass(&self) -> Option<&'static str> {
        match self {
            PassError::Core { pass, .. } | PassError::Lint { pass, .. } => Some(*pass),
            PassError::UnknownPass { .. } => None,
        }
    }
}
