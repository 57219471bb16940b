//! # inspecta-core
//!
//! Core types, traits, and abstractions for the inspecta
//! machinery-inspection backend.
//!
//! This crate provides the foundational data structures and trait
//! definitions that the persistence and API crates depend on: the
//! error taxonomy, the domain models, the content hasher, and the
//! storage category classifier.

pub mod category;
pub mod error;
pub mod hashing;
pub mod logging;
pub mod models;
pub mod traits;
pub mod uuid_utils;

// Re-export commonly used types at crate root
pub use category::{classify, extension_of, is_allowed, Category};
pub use error::{Error, Result};
pub use hashing::{derived_copy_hash, hash_bytes, hash_url, Sha256Stream};
pub use models::{
    Archive, DeletionOutcome, DeletionState, Inspection, InspectionAssignment, ItemResponse,
    Observation, ResultOutcome, ResultRecord, TemplateSelection,
};
pub use traits::{
    ArchiveRepository, CreateInspectionRequest, InspectionRepository, IntakeFileRequest,
    IntakeUrlRequest, ListArchivesRequest, ListArchivesResponse, ObservationRepository,
    UpdateArchiveRequest, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT,
};
pub use uuid_utils::new_v7;
