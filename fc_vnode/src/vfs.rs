//! Node lookup 节点查找

use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;

use crate::{NodeKey, Vnode};

/// Resolve node identity to a node / 由节点标识解析节点
pub trait Vfs: Send + Sync {
  fn lookup(&self, key: NodeKey) -> Option<Arc<dyn Vnode>>;
}

/// Registry of nodes by key / 按键登记的节点表
#[derive(Default)]
pub struct MemVfs {
  nodes: RwLock<HashMap<NodeKey, Arc<dyn Vnode>>>,
}

impl MemVfs {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register node, replacing any previous one with the same key
  /// 登记节点，替换同键旧节点
  pub fn add(&self, node: Arc<dyn Vnode>) {
    self.nodes.write().insert(node.key(), node);
  }

  pub fn remove(&self, key: NodeKey) -> Option<Arc<dyn Vnode>> {
    self.nodes.write().remove(&key)
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.nodes.read().len()
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.nodes.read().is_empty()
  }
}

impl Vfs for MemVfs {
  fn lookup(&self, key: NodeKey) -> Option<Arc<dyn Vnode>> {
    self.nodes.read().get(&key).cloned()
  }
}
