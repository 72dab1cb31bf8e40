//! Node trait 节点接口

use std::fmt;

use crate::Result;

/// Node identity / 节点标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NodeKey {
  pub dev: u32,
  pub ino: u64,
}

impl NodeKey {
  #[inline]
  pub const fn new(dev: u32, ino: u64) -> Self {
    Self { dev, ino }
  }
}

impl fmt::Display for NodeKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.dev, self.ino)
  }
}

/// Opaque per-open value forwarded to the store / 透传给存储的打开句柄值
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Cookie(pub u64);

/// Total length of a vector list / 向量列表总长度
#[inline]
pub fn vecs_len<T: AsRef<[u8]>>(vecs: &[T]) -> usize {
  vecs.iter().map(|v| v.as_ref().len()).sum()
}

/// Storage node / 存储节点
pub trait Vnode: Send + Sync {
  fn key(&self) -> NodeKey;

  /// Scatter read from `offset` into `vecs`, returns bytes read
  /// 从 `offset` 分散读入 `vecs`，返回读取字节数
  ///
  /// Stops short at the end of the store. Bytes past the returned count are
  /// left as they were.
  /// 到达存储末尾时提前结束，返回数量之后的字节保持原样。
  fn read_pages(&self, cookie: Cookie, offset: u64, vecs: &mut [&mut [u8]]) -> Result<usize>;

  /// Gather write `vecs` at `offset`, extending the store as needed
  /// 在 `offset` 聚集写入 `vecs`，必要时扩展存储
  fn write_pages(&self, cookie: Cookie, offset: u64, vecs: &[&[u8]]) -> Result<usize>;

  /// Truncate or extend the store / 截断或扩展存储
  fn set_size(&self, _size: u64) -> Result<()> {
    Ok(())
  }
}
