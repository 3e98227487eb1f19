//! # t3x Core
//!
//! Reading and extracting TYPO3 extension archives (`.t3x` files).
//!
//! A `.t3x` container is `<md5>:<compression>:<payload>`. The payload is a
//! PHP-serialized manifest whose `FILES` entry lists the extension's files
//! with their contents inline.
//!
//! ## Features
//!
//! - Container decoding with checksum verification (identity and zlib)
//! - A byte-exact reader and writer for the PHP serialization format
//! - An aligned human-readable manifest dump
//! - Extraction of the `FILES` list into a fresh directory
//! - Layered `KEY=VALUE` configuration
//! - Archive retrieval from the extension repository (TER)
//!
//! ## Example
//!
//! ```no_run
//! use t3x_core::{Printer, decode, materialize};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let bytes = std::fs::read("news_1.0.0.t3x")?;
//! let manifest = decode(&bytes)?;
//!
//! // Dump the manifest
//! Printer::default().print(&mut std::io::stdout(), &manifest)?;
//!
//! // Extract its files
//! let report = materialize(&manifest, Path::new("news_1.0.0.t3x-extracted"))?;
//! println!("Wrote {} files", report.files_written);
//! # Ok(())
//! # }
//! ```

mod config;
mod container;
mod dump;
mod emconf;
mod error;
mod fetch;
mod materialize;
pub mod serialize;
mod update;
mod value;

pub use config::{Config, GLOBAL_CONFIG_FILE, Resolver, Setting, UnknownKeys, export};
pub use container::{Compression, Container, checksum, decode, encode};
pub use dump::{DEFAULT_STRING_LIMIT, Printer};
pub use emconf::read_version;
pub use error::{Error, Result};
pub use fetch::{ArchiveFetcher, DEFAULT_REPOSITORY, Source, TerFetcher, archive_file_name};
pub use materialize::{FILES_KEY, FileEntry, MaterializeReport, file_entries, materialize};
pub use update::{DEFAULT_UPDATE_BASE, UpdateStatus, Updater, replace_executable};
pub use value::{Key, Mapping, ValueNode};
