//! Dispatch errors.

use thiserror::Error;

/// A dispatch that could not complete. Running out of eligible resources is
/// not an error; see [`crate::Dispatch::Unschedulable`].
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Cannot resolve builder: {0}")]
    Resolution(#[source] kiln_core::Error),

    #[error("Catalog unavailable: {0}")]
    Catalog(#[source] kiln_core::Error),

    #[error("Builder name '{0}' cannot name a job directory")]
    InvalidJobRoot(String),

    #[error("Cannot assemble job: {0}")]
    Assembly(#[source] kiln_core::Error),

    #[error("Execution engine rejected '{builder}': {source}")]
    Submission {
        builder: String,
        #[source]
        source: kiln_core::Error,
    },
}

pub type Result<T> = std::result::Result<T, DispatchError>;
