// The spatial store: per-key values composing the geometry hash, the
// R-tree index, the handle bijection and active fences, plus the
// keyspace, fence engine and snapshot plumbing around them.

pub mod fence;
pub mod keyspace;
pub mod snapshot;
pub mod value;

pub use fence::{Fence, SearchMode, SearchPredicate};
pub use keyspace::Keyspace;
pub use snapshot::LoadStats;
pub use value::SpatialValue;
