#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! AIP conversion runner.
//!
//! Drives one conversion of a region: reads the persisted configuration
//! and the region's fixtures and borders, orders the registered sections
//! by their dependencies, parses them inside one download cache session,
//! validates the resulting document and writes it out.
//!
//! ```text
//! ReadConfig -> ReadRegion -> ReadParsers -> ParseSections
//!            -> ValidateDocument -> WriteOutputs -> WriteConfig
//! ```

pub mod config;
pub mod paths;
pub mod region;
pub mod regions;
pub mod runner;
pub mod schema;

pub use config::Config;
pub use runner::{RunOptions, RunReport, Runner};

use aip_border::BorderError;
use aip_document::DocumentError;
use aip_parser::{ParseError, SchedulerError};
use aip_source::SourceError;

/// Errors that abort a run.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The configuration file is unreadable or malformed.
    #[error("Config {path}: {message}")]
    Config {
        /// Config file path.
        path: String,
        /// What is wrong with it.
        message: String,
    },

    /// The region directory or one of its resources is unusable.
    #[error("Region {region}: {message}")]
    Region {
        /// Region code.
        region: String,
        /// What is wrong with it.
        message: String,
    },

    /// A section failed and the run is not keeping going.
    #[error("Section {section} failed: {source}")]
    Section {
        /// Section that failed.
        section: String,
        /// Underlying error.
        source: ParseError,
    },

    /// The document has duplicate or invalid features and the run is not
    /// forced.
    #[error("Document failed validation with {count} problem(s)")]
    Validation {
        /// Number of duplicates plus invalid features.
        count: usize,
    },

    /// Sections could not be looked up.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Sections could not be ordered.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    /// The download cache could not be opened or saved.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// A border file could not be loaded.
    #[error(transparent)]
    Border(#[from] BorderError),

    /// The document could not be serialised.
    #[error(transparent)]
    Document(#[from] DocumentError),

    /// The manifest could not be written.
    #[error("Manifest error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O error at a known path.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

impl RunnerError {
    pub(crate) fn io(path: &std::path::Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}
