//! Committed state for one tablespace: table stores, hash indexes, and the
//! versioned metadata catalog, plus the overlay types transactions buffer
//! their pending writes in.

pub mod catalog;
pub mod index;
pub mod overlay;
pub mod table;
pub mod tablespace;

pub use catalog::{CatalogSnapshot, IndexMeta, MetadataCatalog, MetadataMutation};
pub use index::HashIndex;
pub use overlay::{IndexOverlay, RowDelta, TableOverlay};
pub use table::TableStore;
pub use tablespace::TablespaceStorage;
