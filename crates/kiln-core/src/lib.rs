//! Kiln CI Core
//!
//! Builder definition resolution and resource matching for Kiln CI.
//! Everything here is a pure function over immutable inputs: definitions are
//! flattened by an explicit fold, filters are evaluated by one interpreter,
//! and catalogs are always point-in-time snapshots passed in by the caller.
//! This crate performs no I/O and emits no logs.

pub mod assembler;
pub mod attribute;
pub mod definition;
pub mod error;
pub mod filter;
pub mod ids;
pub mod matcher;
pub mod ports;
pub mod property;
pub mod resolver;
pub mod resource;

pub use assembler::{JobDescription, JobStep, PipelineAssembler};
pub use attribute::{Attribute, Combinator};
pub use definition::{BuilderDefinition, DefinitionSet, StepSpec};
pub use error::{Error, Result};
pub use filter::FilterExpr;
pub use ids::*;
pub use matcher::{MatchReport, ResourceMatcher};
pub use property::{PropertyTable, PropertyValue};
pub use resolver::{ResolvedDefinition, Resolver};
pub use resource::{CatalogSnapshot, Resource};
