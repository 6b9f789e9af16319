//! Builder dispatch for Kiln CI.
//!
//! Ties the engine to its collaborators: a catalog to match against and an
//! execution engine to hand assembled jobs to.

pub mod dispatcher;
pub mod engine;
pub mod error;

pub use dispatcher::{Dispatch, Dispatcher};
pub use engine::DryRunEngine;
pub use error::{DispatchError, Result};
