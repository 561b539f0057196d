//! Predicate model and rule-based access-path selection.
//!
//! Planning is deliberately non-transactional: the selector only ever
//! consults the committed catalog snapshot, so an index created inside an
//! open transaction is not chosen until that transaction commits.

pub mod access_path;
pub mod plan;
pub mod predicate;

pub use access_path::{AccessPathSelector, IndexOperation};
pub use plan::{translate_scan, ScanStatement, TranslatedQuery};
pub use predicate::{CmpOp, Predicate};
