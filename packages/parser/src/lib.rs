#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Section parsing infrastructure.
//!
//! A region's extraction rules are split into sections. Each section is a
//! [`SectionParser`] described by a [`SectionDescriptor`] (name,
//! prerequisite sections, factory, patches) and registered in a
//! [`SectionRegistry`] under its region and scope. The
//! [`DependencyGraph`] orders sections so prerequisites run first, and
//! every parser runs against a [`ParseContext`] that carries the download
//! cache, the shared output document and the region resources.

pub mod context;
pub mod patch;
pub mod progress;
pub mod registry;
pub mod resources;
pub mod scheduler;

use async_trait::async_trait;

pub use context::{ParseContext, Warnings};
pub use patch::{Override, Patch, PatchScope, PatchSet, PatchedWriter};
pub use registry::{SectionDescriptor, SectionRegistry};
pub use resources::RegionResources;
pub use scheduler::{DependencyGraph, SchedulerError};

use aip_source::SourceError;

/// Extraction rules for one section.
///
/// Implementations read their source documents through the context and
/// add features to the shared document. Parsers that later sections depend
/// on must leave their features in the document even when they fail part
/// way through.
#[async_trait(?Send)]
pub trait SectionParser {
    /// Parses the section into the context's document.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] if the section cannot be converted.
    async fn parse(&mut self, ctx: &mut ParseContext<'_>) -> Result<(), ParseError>;
}

/// Errors raised while parsing sections.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// A source document could not be fetched or decoded.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Sections could not be ordered.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    /// An extraction rule failed.
    #[error("Section {section}: {message}")]
    Extraction {
        /// Section that failed.
        section: String,
        /// What went wrong.
        message: String,
    },

    /// Patches were attached while another set was still attached.
    #[error("Patches already attached while parsing {0}")]
    PatchesAlreadyAttached(String),

    /// Nothing is registered for the region and scope.
    #[error("No sections registered for region {region} scope {scope}")]
    UnknownRegion {
        /// Region code.
        region: String,
        /// Scope name.
        scope: String,
    },
}
