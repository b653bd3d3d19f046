//! # Metadata Registry
//!
//! Read-only snapshot of document metadata, access profiles and display
//! metadata. Loaded once and shared as `Arc<MetaRegistry>`; every request
//! receives it explicitly.

mod access;
mod errors;
mod object;
mod registry;

pub use access::{AccessRule, FieldAccessRules, FieldDefaults, MetaAccess};
pub use errors::{MetaError, MetaResult};
pub use object::{localized, DisplayMeta, FieldMeta, Labels, MetaObject};
pub use registry::MetaRegistry;
