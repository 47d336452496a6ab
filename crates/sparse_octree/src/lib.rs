//! sparse_octree - pool-allocated sparse octree with a flat, GPU-friendly view
//!
//! The octree lives in normalized octree space, `[-1, 1]³`, with the root
//! centered on the origin. Payloads are point-like records (a position plus
//! one extra float) inserted together with the bounding box they occupy.
//! Nodes split lazily when a second payload needs a finer home and merge back
//! when a split turns out to be useless.
//!
//! After any change, [`Octree::update`] rebuilds a [`FlatHierarchy`]: four
//! parallel arrays (packed node records, center/width, payloads, per-node
//! payload counts) addressed by index, ready to be copied into a contiguous
//! buffer.
//!
//! # Example
//!
//! ```
//! use glam::Vec3;
//! use sparse_octree::Octree;
//!
//! let mut octree = Octree::new(4).unwrap();
//! octree.insert_point(Vec3::new(0.5, 0.5, 0.5), 1.0);
//! octree.insert_point(Vec3::new(-0.5, -0.5, -0.5), 2.0);
//!
//! assert!(octree.update().unwrap());
//! let flat = octree.flat();
//! assert_eq!(flat.data().len(), 2);
//! assert!(flat.find_leaf(Vec3::new(-0.5, -0.5, -0.5)).is_some());
//! ```

pub mod bounds;
pub mod error;
pub mod flat;
pub mod node;
pub mod pool;
pub mod tree;

// Re-exports
pub use bounds::Aabb3;
pub use error::OctreeError;
pub use flat::{FlatHierarchy, PackedNode, MAX_DATA_ITEMS, MAX_HIERARCHY_NODES, MAX_LEVEL_COUNT};
pub use node::{Item, Node, NodeId, Payload, CHILD_OFFSETS};
pub use pool::NodePool;
pub use tree::{Octree, OctreeStats, Traverse};
