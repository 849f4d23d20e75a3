//! Core data model, transcoding and file storage for Keepsake.
//!
//! This crate has no notion of live entities. It provides the pieces the
//! engine is built from:
//! - [`model`]: identifiers, schemas and field values
//! - [`transcode`]: field value <-> JSON storage form
//! - [`relation`]: relationship fields <-> stored identifiers
//! - [`storage`]: storage records and the blob store they are written to
//! - [`config`]: store settings

pub mod config;
pub mod error;
pub mod model;
pub mod relation;
pub mod storage;
pub mod transcode;

pub use config::StoreConfig;
pub use error::CoreError;
