//! Schema registry
//!
//! Categories, per-field merge policies and the category schemas that
//! validate candidate records before they reach the knowledge store.

pub mod category;
pub mod policy;
pub mod registry;

pub use category::Category;
pub use policy::MergePolicy;
pub use registry::{CategorySchema, FieldKind, FieldSpec, SchemaRegistry};
