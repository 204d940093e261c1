//! Register source adapters: tabular parsing, the source registry, catalog
//! acquisition and row mapping into candidate records.

pub mod catalog;
pub mod mapping;
pub mod registry;
pub mod tabular;

pub use catalog::{
    acquire, select_latest_resource, AcquireError, AcquiredDataset, Catalog, CatalogResource,
    HttpCatalog,
};
pub use mapping::rows_to_candidates;
pub use registry::{SourceConfig, SourceRegistry};
pub use tabular::{parse_delimited, Delimiter, TabularError, TabularRow};

pub const CRATE_NAME: &str = "ari-adapters";
