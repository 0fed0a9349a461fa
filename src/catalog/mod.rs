//! Expiration Catalog
//!
//! Which collections expire documents, and how.

mod cache;
mod spec;

pub use cache::{CatalogError, ExpirationCatalog, TtlCollectionCache};
pub use spec::{BoundKind, TtlSpec, TtlStrategy};
