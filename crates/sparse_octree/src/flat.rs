//! Flattened, index-addressed snapshot of an octree.
//!
//! Four parallel arrays, one entry per emitted node (except `data`, which is
//! indexed through each node's data index):
//!
//! ```text
//! nodes        PackedNode  level:4 | child_count:4 | child_index:12 | data_index:12
//! center_width Vec4        xyz = center, w = width
//! data         Vec4        payloads, each node's slice is contiguous
//! data_count   u32         payloads per node
//! ```
//!
//! Only active nodes are emitted. A node's emitted children are contiguous,
//! so `child_index..child_index + child_count` addresses all of them.

use std::ops::Range;

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};
use smallvec::{smallvec, SmallVec};

use crate::bounds::Aabb3;
use crate::error::OctreeError;
use crate::node::{Node, NodeId};
use crate::pool::NodePool;

pub const LEVEL_BITS: u32 = 4;
pub const CHILD_COUNT_BITS: u32 = 4;
pub const CHILD_INDEX_BITS: u32 = 12;
pub const DATA_INDEX_BITS: u32 = 12;

/// Levels addressable by the packed level field.
pub const MAX_LEVEL_COUNT: u32 = 1 << LEVEL_BITS;
/// Records addressable by the packed child index.
pub const MAX_HIERARCHY_NODES: usize = 1 << CHILD_INDEX_BITS;
/// Payloads addressable by the packed data index.
pub const MAX_DATA_ITEMS: usize = 1 << DATA_INDEX_BITS;

/// Nominal traversal stack size.
pub(crate) const TRAVERSAL_STACK: usize = 32;

/// Worst-case stack for a depth-first walk that pushes up to 8 children per
/// level and pops one: `7 * (levels - 1) + 1`.
#[inline]
pub(crate) fn stack_bound(level_count: u32) -> usize {
  7 * (level_count.saturating_sub(1) as usize) + 1
}

/// One packed 32-bit hierarchy record.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct PackedNode(u32);

impl PackedNode {
  const LEVEL_SHIFT: u32 = 0;
  const CHILD_COUNT_SHIFT: u32 = LEVEL_BITS;
  const CHILD_INDEX_SHIFT: u32 = Self::CHILD_COUNT_SHIFT + CHILD_COUNT_BITS;
  const DATA_INDEX_SHIFT: u32 = Self::CHILD_INDEX_SHIFT + CHILD_INDEX_BITS;

  /// Pack all four fields, failing on any value wider than its field.
  pub fn new(
    level: u32,
    child_count: u32,
    child_index: u32,
    data_index: u32,
  ) -> Result<Self, OctreeError> {
    let mut packed = Self(0);
    packed.set_level(level)?;
    packed.set_child_count(child_count)?;
    packed.set_child_index(child_index)?;
    packed.set_data_index(data_index)?;
    Ok(packed)
  }

  /// Raw 32-bit value as uploaded.
  #[inline]
  pub fn raw(self) -> u32 {
    self.0
  }

  #[inline]
  pub fn level(self) -> u32 {
    self.field(Self::LEVEL_SHIFT, LEVEL_BITS)
  }

  #[inline]
  pub fn child_count(self) -> u32 {
    self.field(Self::CHILD_COUNT_SHIFT, CHILD_COUNT_BITS)
  }

  /// Index of the first emitted child (meaningless when `child_count == 0`).
  #[inline]
  pub fn child_index(self) -> u32 {
    self.field(Self::CHILD_INDEX_SHIFT, CHILD_INDEX_BITS)
  }

  /// Start of this node's payload slice (meaningless when it holds none).
  #[inline]
  pub fn data_index(self) -> u32 {
    self.field(Self::DATA_INDEX_SHIFT, DATA_INDEX_BITS)
  }

  /// Emitted children as a range of hierarchy indices.
  #[inline]
  pub fn children(self) -> Range<u32> {
    let first = self.child_index();
    first..first + self.child_count()
  }

  pub(crate) fn set_level(&mut self, value: u32) -> Result<(), OctreeError> {
    self.set_field("level", value, Self::LEVEL_SHIFT, LEVEL_BITS)
  }

  pub(crate) fn set_child_count(&mut self, value: u32) -> Result<(), OctreeError> {
    self.set_field("child_count", value, Self::CHILD_COUNT_SHIFT, CHILD_COUNT_BITS)
  }

  pub(crate) fn set_child_index(&mut self, value: u32) -> Result<(), OctreeError> {
    self.set_field("child_index", value, Self::CHILD_INDEX_SHIFT, CHILD_INDEX_BITS)
  }

  pub(crate) fn set_data_index(&mut self, value: u32) -> Result<(), OctreeError> {
    self.set_field("data_index", value, Self::DATA_INDEX_SHIFT, DATA_INDEX_BITS)
  }

  #[inline]
  fn field(self, shift: u32, bits: u32) -> u32 {
    (self.0 >> shift) & ((1 << bits) - 1)
  }

  fn set_field(
    &mut self,
    field: &'static str,
    value: u32,
    shift: u32,
    bits: u32,
  ) -> Result<(), OctreeError> {
    let max = (1u32 << bits) - 1;
    if value > max {
      return Err(OctreeError::FieldOverflow { field, value, bits });
    }
    self.0 = (self.0 & !(max << shift)) | (value << shift);
    Ok(())
  }
}

/// Index-addressed snapshot produced by [`Octree::update`](crate::Octree::update).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FlatHierarchy {
  nodes: Vec<PackedNode>,
  center_width: Vec<Vec4>,
  data: Vec<Vec4>,
  data_count: Vec<u32>,
}

impl FlatHierarchy {
  /// Number of emitted nodes.
  #[inline]
  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  #[inline]
  pub fn nodes(&self) -> &[PackedNode] {
    &self.nodes
  }

  #[inline]
  pub fn center_widths(&self) -> &[Vec4] {
    &self.center_width
  }

  #[inline]
  pub fn data(&self) -> &[Vec4] {
    &self.data
  }

  #[inline]
  pub fn data_counts(&self) -> &[u32] {
    &self.data_count
  }

  #[inline]
  pub fn node(&self, index: u32) -> PackedNode {
    self.nodes[index as usize]
  }

  /// xyz = center, w = width of the node at `index`.
  #[inline]
  pub fn center_width(&self, index: u32) -> Vec4 {
    self.center_width[index as usize]
  }

  /// Octree-space region of the node at `index`.
  pub fn node_bounds(&self, index: u32) -> Aabb3 {
    let cw = self.center_width(index);
    Aabb3::from_center_width(cw.truncate(), cw.w)
  }

  /// Payload slice of the node at `index`.
  pub fn node_data(&self, index: u32) -> &[Vec4] {
    let count = self.data_count[index as usize] as usize;
    if count == 0 {
      return &[];
    }
    let start = self.nodes[index as usize].data_index() as usize;
    &self.data[start..start + count]
  }

  /// Hierarchy records as raw bytes.
  pub fn hierarchy_bytes(&self) -> &[u8] {
    bytemuck::cast_slice(&self.nodes)
  }

  pub fn center_width_bytes(&self) -> &[u8] {
    bytemuck::cast_slice(&self.center_width)
  }

  /// Payloads as raw bytes. Never empty: a zero payload pads an empty tree
  /// so a buffer can always be created from it.
  pub fn data_bytes(&self) -> &[u8] {
    static PAD: [Vec4; 1] = [Vec4::ZERO];
    if self.data.is_empty() {
      bytemuck::cast_slice(&PAD)
    } else {
      bytemuck::cast_slice(&self.data)
    }
  }

  pub fn data_count_bytes(&self) -> &[u8] {
    bytemuck::cast_slice(&self.data_count)
  }

  /// Index of the leaf whose region contains `point`.
  ///
  /// `None` when the point is outside the root, or lands in a region whose
  /// node was never emitted (an empty octant). `Some(0)` means the root
  /// itself is the containing leaf.
  pub fn find_leaf(&self, point: Vec3) -> Option<u32> {
    if self.nodes.is_empty() {
      return None;
    }

    let bound = stack_bound(MAX_LEVEL_COUNT);
    let mut stack: SmallVec<[u32; TRAVERSAL_STACK]> = smallvec![0];
    while let Some(index) = stack.pop() {
      if !self.node_bounds(index).contains_point(point) {
        continue;
      }

      let node = self.node(index);
      if node.child_count() == 0 {
        return Some(index);
      }

      stack.extend(node.children());
      debug_assert!(stack.len() <= bound, "find_leaf stack exceeded {}", bound);
    }
    None
  }

  /// Append a record for `node`, returning its hierarchy index.
  fn push_record(&mut self, node: &Node) -> Result<usize, OctreeError> {
    let index = self.nodes.len();
    if index >= MAX_HIERARCHY_NODES {
      return Err(OctreeError::HierarchyOverflow {
        limit: MAX_HIERARCHY_NODES,
      });
    }

    let mut record = PackedNode::default();
    record.set_level(node.level)?;
    self.nodes.push(record);
    self.center_width.push(node.center.extend(node.width));
    self.data_count.push(node.items.len() as u32);
    Ok(index)
  }
}

/// Rebuild the flat view from the tree rooted at `root`.
///
/// The root is always emitted. Nodes are visited depth first; each visited
/// node first emits all of its active children back to back, which is what
/// keeps sibling ranges contiguous. Inactive subtrees contribute nothing.
pub(crate) fn build(
  pool: &NodePool,
  root: NodeId,
  item_count: usize,
  level_count: u32,
) -> Result<FlatHierarchy, OctreeError> {
  if item_count > MAX_DATA_ITEMS {
    return Err(OctreeError::DataOverflow {
      items: item_count,
      limit: MAX_DATA_ITEMS,
    });
  }

  let mut flat = FlatHierarchy {
    data: Vec::with_capacity(item_count),
    ..FlatHierarchy::default()
  };
  flat.push_record(&pool[root])?;

  let bound = stack_bound(level_count);
  let mut stack: SmallVec<[(NodeId, usize); TRAVERSAL_STACK]> = smallvec![(root, 0)];
  while let Some((id, index)) = stack.pop() {
    let node = &pool[id];
    if !node.is_active {
      continue;
    }

    if !node.items.is_empty() {
      flat.nodes[index].set_data_index(flat.data.len() as u32)?;
      flat
        .data
        .extend(node.items.iter().map(|item| item.payload.to_vec4()));
    }

    for child_id in node.child_ids() {
      let child = &pool[child_id];
      if !child.is_active {
        continue;
      }

      let child_index = flat.push_record(child)?;
      let record = &mut flat.nodes[index];
      if record.child_count() == 0 {
        record.set_child_index(child_index as u32)?;
      }
      record.set_child_count(record.child_count() + 1)?;
      stack.push((child_id, child_index));
    }
    debug_assert!(
      stack.len() <= bound,
      "flatten stack exceeded {} for {} levels",
      bound,
      level_count
    );
  }

  Ok(flat)
}

#[cfg(test)]
#[path = "flat_test.rs"]
mod flat_test;
