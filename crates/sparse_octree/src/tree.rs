//! Octree - lazily split sparse octree over normalized space.
//!
//! # Insertion policy
//!
//! Walking down from the root, a payload is stored at the first node where
//! one of these holds:
//!
//! 1. the node is an empty leaf, or a leaf at the max level;
//! 2. the payload box is wider than half the node (it could never fit a child);
//! 3. no child fully contains the payload box.
//!
//! A leaf that is neither empty nor at the max level is split before the
//! child test. If case 3 follows, the split is undone so a node never stays
//! subdivided for a single occupant.
//!
//! Payloads already sitting at a node are never pushed down by a later split.

use glam::Vec3;
use smallvec::{smallvec, SmallVec};

use crate::bounds::Aabb3;
use crate::error::OctreeError;
use crate::flat::{self, stack_bound, FlatHierarchy, MAX_LEVEL_COUNT, TRAVERSAL_STACK};
use crate::node::{Item, Node, NodeId, Payload};
use crate::pool::NodePool;

/// Counters for debug overlays and tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OctreeStats {
  /// Allocated nodes, root included.
  pub node_count: usize,
  /// Nodes on a branch holding data.
  pub active_node_count: usize,
  /// Stored payloads.
  pub item_count: usize,
  /// Largest payload count seen at a single node.
  pub max_node_data_count: usize,
  /// Times `update` rebuilt the flat hierarchy.
  pub rebuild_count: u64,
}

/// Sparse octree with a cached flat view.
pub struct Octree {
  pool: NodePool,
  level_count: u32,
  max_level: u32,
  item_count: usize,
  max_node_data_count: usize,
  flat: FlatHierarchy,
  dirty: bool,
  rebuild_count: u64,
}

impl Octree {
  /// Create a tree with a single empty root leaf spanning `[-1, 1]³`.
  ///
  /// `level_count` must be in `1..=16`, the range of the packed level field.
  pub fn new(level_count: u32) -> Result<Self, OctreeError> {
    if level_count == 0 || level_count > MAX_LEVEL_COUNT {
      return Err(OctreeError::InvalidLevelCount {
        count: level_count,
        max: MAX_LEVEL_COUNT,
      });
    }

    Ok(Self {
      pool: NodePool::new(Node::default()),
      level_count,
      max_level: level_count - 1,
      item_count: 0,
      max_node_data_count: 0,
      flat: FlatHierarchy::default(),
      dirty: true,
      rebuild_count: 0,
    })
  }

  #[inline]
  pub fn level_count(&self) -> u32 {
    self.level_count
  }

  #[inline]
  pub fn max_level(&self) -> u32 {
    self.max_level
  }

  /// True when the flat view is out of date.
  #[inline]
  pub fn is_dirty(&self) -> bool {
    self.dirty
  }

  /// Last successfully built flat view.
  #[inline]
  pub fn flat(&self) -> &FlatHierarchy {
    &self.flat
  }

  /// Flat index of the leaf containing `point`, looked up in the last built
  /// view.
  #[inline]
  pub fn find_leaf(&self, point: Vec3) -> Option<u32> {
    self.flat.find_leaf(point)
  }

  #[inline]
  pub fn root(&self) -> &Node {
    &self.pool[NodeId::ROOT]
  }

  #[inline]
  pub fn node(&self, id: NodeId) -> &Node {
    &self.pool[id]
  }

  /// Insert a payload occupying `bounds` (both in octree space).
  pub fn insert(&mut self, payload: Payload, bounds: Aabb3) {
    let size = bounds.width();
    let mut current = NodeId::ROOT;

    loop {
      let max_level = self.max_level;
      let node = &mut self.pool[current];

      // Everything on the way down is on a branch that will hold data
      node.is_active = true;

      if node.is_leaf && (node.items.is_empty() || node.level == max_level) {
        break;
      }

      // Too large for any child
      if size > node.half_width() {
        break;
      }

      let split_here = node.is_leaf;
      if split_here {
        self.split(current);
      }

      match self.containing_child(current, &bounds) {
        Some(child) => current = child,
        None => {
          if split_here {
            self.merge(current);
          }
          break;
        }
      }
    }

    self.store(current, Item { payload, bounds });
  }

  /// Insert a payload with a zero-extent box at `position`.
  pub fn insert_point(&mut self, position: Vec3, extra: f32) {
    self.insert(Payload::new(position, extra), Aabb3::from_point(position));
  }

  /// Rebuild the flat view if anything changed since the last rebuild.
  ///
  /// Returns `Ok(true)` after a rebuild and `Ok(false)` when the tree was
  /// clean. On overflow the previous view is kept and the tree stays dirty.
  #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, name = "octree::update"))]
  pub fn update(&mut self) -> Result<bool, OctreeError> {
    if !self.dirty {
      return Ok(false);
    }

    match flat::build(&self.pool, NodeId::ROOT, self.item_count, self.level_count) {
      Ok(flat) => {
        #[cfg(feature = "tracing")]
        tracing::debug!(
          nodes = flat.len(),
          items = flat.data().len(),
          "rebuilt flat hierarchy"
        );
        self.flat = flat;
        self.dirty = false;
        self.rebuild_count += 1;
        Ok(true)
      }
      Err(err) => {
        #[cfg(feature = "tracing")]
        tracing::warn!(%err, "flat hierarchy rebuild failed");
        Err(err)
      }
    }
  }

  /// Merge the whole tree back into the root, keeping every payload there.
  pub fn collapse(&mut self) {
    self.merge(NodeId::ROOT);
  }

  /// Merge the whole tree and drop all payloads.
  pub fn clear(&mut self) {
    self.merge(NodeId::ROOT);
    let root = &mut self.pool[NodeId::ROOT];
    root.items.clear();
    root.is_active = false;
    self.item_count = 0;
    self.max_node_data_count = 0;
    self.dirty = true;
  }

  /// Lazy depth-first walk from the root.
  ///
  /// `descend` is asked for every visited node; children are visited only
  /// when it returns true. Each call starts a fresh walk.
  pub fn traverse<F>(&self, descend: F) -> Traverse<'_, F>
  where
    F: FnMut(NodeId, &Node) -> bool,
  {
    Traverse {
      pool: &self.pool,
      stack: smallvec![NodeId::ROOT],
      bound: stack_bound(self.level_count),
      descend,
    }
  }

  /// All current leaves, active or not.
  pub fn leaves(&self) -> impl Iterator<Item = (NodeId, &Node)> + '_ {
    self
      .traverse(|_, _| true)
      .filter(|(_, node)| node.is_leaf())
  }

  pub fn stats(&self) -> OctreeStats {
    OctreeStats {
      node_count: self.pool.live_nodes(),
      active_node_count: self
        .traverse(|_, node| node.is_active())
        .filter(|(_, node)| node.is_active())
        .count(),
      item_count: self.item_count,
      max_node_data_count: self.max_node_data_count,
      rebuild_count: self.rebuild_count,
    }
  }

  fn store(&mut self, id: NodeId, item: Item) {
    let node = &mut self.pool[id];
    node.items.push(item);
    self.max_node_data_count = self.max_node_data_count.max(node.items.len());
    self.item_count += 1;
    self.dirty = true;
  }

  /// First child (in octant order) whose region fully contains `bounds`.
  fn containing_child(&self, id: NodeId, bounds: &Aabb3) -> Option<NodeId> {
    self
      .pool[id]
      .child_ids()
      .find(|&child| self.pool[child].bounds().contains_box(bounds))
  }

  /// Allocate all 8 children of a leaf. No-op on internal nodes.
  fn split(&mut self, id: NodeId) {
    let parent = self.pool[id].shape();
    if !parent.is_leaf {
      return;
    }
    debug_assert!(
      parent.level < self.max_level,
      "split past max level {}",
      self.max_level
    );

    let first = self
      .pool
      .alloc_block(|octant| Node::child(id, &parent, octant));

    let node = &mut self.pool[id];
    node.children = Some(first);
    node.is_leaf = false;
    self.dirty = true;
  }

  /// Collapse the subtree below `id` into `id`, moving payloads upwards.
  /// No-op on leaves.
  ///
  /// Internal nodes are gathered in pre-order and merged in reverse, so every
  /// node is merged only after all of its descendants.
  fn merge(&mut self, id: NodeId) {
    if self.pool[id].is_leaf {
      return;
    }

    let mut internal: SmallVec<[NodeId; TRAVERSAL_STACK]> = SmallVec::new();
    let mut stack: SmallVec<[NodeId; TRAVERSAL_STACK]> = smallvec![id];
    while let Some(current) = stack.pop() {
      let node = &self.pool[current];
      if !node.is_leaf {
        internal.push(current);
        stack.extend(node.child_ids());
      }
    }

    for &current in internal.iter().rev() {
      let Some(first) = self.pool[current].children else {
        continue;
      };

      let mut moved = Vec::new();
      for child in self.pool[current].child_ids() {
        moved.append(&mut self.pool[child].items);
      }
      self.pool.free_block(first);

      let node = &mut self.pool[current];
      node.items.append(&mut moved);
      node.children = None;
      node.is_leaf = true;
      self.max_node_data_count = self.max_node_data_count.max(node.items.len());
    }

    self.dirty = true;
  }
}

impl Node {
  /// Copy of everything but the payloads, for building children while the
  /// pool is borrowed mutably.
  fn shape(&self) -> Node {
    Node {
      is_leaf: self.is_leaf,
      is_active: self.is_active,
      level: self.level,
      center: self.center,
      width: self.width,
      parent: self.parent,
      children: self.children,
      items: Vec::new(),
    }
  }
}

/// Iterator returned by [`Octree::traverse`].
pub struct Traverse<'a, F> {
  pool: &'a NodePool,
  stack: SmallVec<[NodeId; TRAVERSAL_STACK]>,
  bound: usize,
  descend: F,
}

impl<'a, F> Iterator for Traverse<'a, F>
where
  F: FnMut(NodeId, &Node) -> bool,
{
  type Item = (NodeId, &'a Node);

  fn next(&mut self) -> Option<Self::Item> {
    let id = self.stack.pop()?;
    let pool = self.pool;
    let node = &pool[id];
    if (self.descend)(id, node) {
      self.stack.extend(node.child_ids());
      debug_assert!(
        self.stack.len() <= self.bound,
        "traversal stack exceeded {}",
        self.bound
      );
    }
    Some((id, node))
  }
}

#[cfg(test)]
#[path = "tree_test.rs"]
mod tree_test;
