//! Node records owned by the pool, and the payloads they carry.
//!
//! A node is either a leaf or owns exactly 8 children, allocated as one
//! contiguous block in the [`NodePool`](crate::NodePool). Children are
//! addressed through the id of the first sibling.

use glam::{Vec3, Vec4};

use crate::bounds::Aabb3;

/// Child center offsets in units of the parent's quarter width.
///
/// Signs are (x, y, z). The order is fixed: flattened hierarchies and
/// `find_leaf` tie-breaking on shared faces both depend on it.
pub const CHILD_OFFSETS: [Vec3; 8] = [
  Vec3::new(-1.0, -1.0, -1.0),
  Vec3::new(-1.0, 1.0, -1.0),
  Vec3::new(1.0, 1.0, -1.0),
  Vec3::new(1.0, -1.0, -1.0),
  Vec3::new(-1.0, -1.0, 1.0),
  Vec3::new(-1.0, 1.0, 1.0),
  Vec3::new(1.0, 1.0, 1.0),
  Vec3::new(1.0, -1.0, 1.0),
];

/// Handle to a node slot in the pool.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
  /// The root always occupies the first slot.
  pub const ROOT: NodeId = NodeId(0);

  /// Slot index inside the pool.
  #[inline]
  pub fn index(self) -> usize {
    self.0 as usize
  }

  /// Sibling `octant` of a block whose first child is `self`.
  #[inline]
  pub(crate) fn offset(self, octant: usize) -> NodeId {
    debug_assert!(octant < 8);
    NodeId(self.0 + octant as u32)
  }
}

/// Point-like payload: a position and one free float (radius, id, weight...).
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Payload {
  pub position: Vec3,
  pub extra: f32,
}

impl Payload {
  pub fn new(position: Vec3, extra: f32) -> Self {
    Self { position, extra }
  }

  /// GPU layout: xyz = position, w = extra.
  #[inline]
  pub fn to_vec4(self) -> Vec4 {
    self.position.extend(self.extra)
  }
}

impl From<Vec4> for Payload {
  fn from(v: Vec4) -> Self {
    Self {
      position: v.truncate(),
      extra: v.w,
    }
  }
}

/// A stored payload together with the box it was inserted with.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Item {
  pub payload: Payload,
  pub bounds: Aabb3,
}

/// Tree-internal node.
#[derive(Clone, Debug)]
pub struct Node {
  pub(crate) is_leaf: bool,
  pub(crate) is_active: bool,
  pub(crate) level: u32,
  pub(crate) center: Vec3,
  pub(crate) width: f32,
  pub(crate) parent: Option<NodeId>,
  pub(crate) children: Option<NodeId>,
  pub(crate) items: Vec<Item>,
}

impl Default for Node {
  /// Defaults describe the root: an inactive leaf spanning `[-1, 1]³`.
  fn default() -> Self {
    Self {
      is_leaf: true,
      is_active: false,
      level: 0,
      center: Vec3::ZERO,
      width: 2.0,
      parent: None,
      children: None,
      items: Vec::new(),
    }
  }
}

impl Node {
  /// Fresh child of `parent` in the given octant.
  pub(crate) fn child(parent_id: NodeId, parent: &Node, octant: usize) -> Self {
    Self {
      level: parent.level + 1,
      center: parent.center + CHILD_OFFSETS[octant] * (parent.width * 0.25),
      width: parent.width * 0.5,
      parent: Some(parent_id),
      ..Self::default()
    }
  }

  /// True when the node has no children.
  #[inline]
  pub fn is_leaf(&self) -> bool {
    self.is_leaf
  }

  /// True when this node or something below it holds data.
  #[inline]
  pub fn is_active(&self) -> bool {
    self.is_active
  }

  /// Depth, 0 at the root.
  #[inline]
  pub fn level(&self) -> u32 {
    self.level
  }

  #[inline]
  pub fn center(&self) -> Vec3 {
    self.center
  }

  /// Edge length in octree space.
  #[inline]
  pub fn width(&self) -> f32 {
    self.width
  }

  #[inline]
  pub fn half_width(&self) -> f32 {
    self.width * 0.5
  }

  /// Octree-space region covered by this node.
  #[inline]
  pub fn bounds(&self) -> Aabb3 {
    Aabb3::from_center_width(self.center, self.width)
  }

  /// Payloads stored at this node, in insertion order.
  #[inline]
  pub fn items(&self) -> &[Item] {
    &self.items
  }

  #[inline]
  pub fn parent(&self) -> Option<NodeId> {
    self.parent
  }

  /// Child in `octant`, `None` on leaves.
  #[inline]
  pub fn child_id(&self, octant: usize) -> Option<NodeId> {
    self.children.map(|first| first.offset(octant))
  }

  /// All 8 children in octant order (empty on leaves).
  pub fn child_ids(&self) -> impl Iterator<Item = NodeId> {
    let first = self.children;
    (0..8).filter_map(move |octant| first.map(|f| f.offset(octant)))
  }
}
