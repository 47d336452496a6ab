//! Fixed-block node pool.
//!
//! The root lives on its own; every other allocation is a block of 8
//! siblings stored as one [`Slab`] entry, so children are addressed through
//! the id of the first one. Slab keys map onto node ids as
//! `1 + key * 8 + octant`, keeping siblings contiguous in id space. Freed
//! blocks are recycled by the slab before it grows, and growth reserves a
//! whole chunk of blocks at a time.

use std::ops::{Index, IndexMut};

use slab::Slab;

use crate::node::{Node, NodeId};

/// Nodes reserved per growth step.
pub const DEFAULT_CHUNK_NODES: usize = 512;

/// Sibling block size.
pub const BLOCK_NODES: usize = 8;

type Block = [Node; BLOCK_NODES];

/// Slab of nodes handed out in blocks of 8.
pub struct NodePool {
  root: Node,
  blocks: Slab<Block>,
  chunk_blocks: usize,
}

impl NodePool {
  /// Create a pool holding `root` at [`NodeId::ROOT`].
  pub fn new(root: Node) -> Self {
    Self::with_chunk_size(root, DEFAULT_CHUNK_NODES)
  }

  /// Create a pool that reserves room for `chunk_nodes` nodes at a time.
  pub fn with_chunk_size(root: Node, chunk_nodes: usize) -> Self {
    let chunk_blocks = (chunk_nodes / BLOCK_NODES).max(1);
    Self {
      root,
      blocks: Slab::with_capacity(chunk_blocks),
      chunk_blocks,
    }
  }

  /// Allocate 8 siblings, `init(octant)` builds each one.
  ///
  /// Returns the id of the first sibling.
  pub fn alloc_block(&mut self, init: impl FnMut(usize) -> Node) -> NodeId {
    if self.blocks.len() == self.blocks.capacity() {
      self.blocks.reserve(self.chunk_blocks);
    }
    let key = self.blocks.insert(std::array::from_fn(init));
    NodeId((1 + key * BLOCK_NODES) as u32)
  }

  /// Return a sibling block to the pool.
  pub fn free_block(&mut self, first: NodeId) {
    debug_assert!(first != NodeId::ROOT, "the root is not part of a block");
    let (key, octant) = Self::locate(first);
    debug_assert!(octant == 0, "{:?} is not the first slot of a block", first);

    let removed = self.blocks.try_remove(key);
    debug_assert!(removed.is_some(), "double free of {:?}", first);
  }

  /// Nodes currently allocated (root included).
  #[inline]
  pub fn live_nodes(&self) -> usize {
    1 + self.blocks.len() * BLOCK_NODES
  }

  #[inline]
  pub fn get(&self, id: NodeId) -> &Node {
    if id == NodeId::ROOT {
      return &self.root;
    }
    let (key, octant) = Self::locate(id);
    &self.blocks[key][octant]
  }

  #[inline]
  pub fn get_mut(&mut self, id: NodeId) -> &mut Node {
    if id == NodeId::ROOT {
      return &mut self.root;
    }
    let (key, octant) = Self::locate(id);
    &mut self.blocks[key][octant]
  }

  /// Slab key and octant of a non-root id.
  #[inline]
  fn locate(id: NodeId) -> (usize, usize) {
    let slot = id.index() - 1;
    (slot / BLOCK_NODES, slot % BLOCK_NODES)
  }
}

impl Index<NodeId> for NodePool {
  type Output = Node;

  fn index(&self, id: NodeId) -> &Node {
    self.get(id)
  }
}

impl IndexMut<NodeId> for NodePool {
  fn index_mut(&mut self, id: NodeId) -> &mut Node {
    self.get_mut(id)
  }
}
