//! # Access Projection
//!
//! Resolves the caller's access profile for a document and turns it into
//! the store projection plus the per-field READ conditions applied to
//! every fetched record.
//!
//! # Modules
//! - `profile`: profile lookup and field permissions
//! - `projection`: projection building and field masking

pub mod errors;
pub mod profile;
pub mod projection;

pub use errors::{AccessError, AccessResult};
pub use profile::{access_for, field_permissions, AccessField, FieldConditions};
pub use projection::{
    build_access_projection, clear_projection_path_collision, AccessProjection,
};
