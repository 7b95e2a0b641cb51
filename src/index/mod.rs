pub mod rtree;

pub use rtree::RTree;
