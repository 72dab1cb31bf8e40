//! In-memory node with I/O counters and fault injection
//! 带 I/O 计数与故障注入的内存节点

use std::{
  sync::atomic::{AtomicBool, AtomicU64, Ordering},
  thread,
  time::Duration,
};

use log::trace;
use parking_lot::RwLock;

use crate::{Cookie, Error, NodeKey, Result, Vnode, vecs_len};

/// Byte written past a short read when scribbling is on / 短读后涂写的字节
pub const SCRIBBLE: u8 = 0xA5;

/// Snapshot of node I/O counters / 节点 I/O 计数快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VnodeStats {
  /// read_pages calls / 读调用次数
  pub reads: u64,
  /// write_pages calls / 写调用次数
  pub writes: u64,
  pub read_bytes: u64,
  pub written_bytes: u64,
}

#[derive(Default)]
struct Counters {
  reads: AtomicU64,
  writes: AtomicU64,
  read_bytes: AtomicU64,
  written_bytes: AtomicU64,
}

pub struct MemVnode {
  key: NodeKey,
  data: RwLock<Vec<u8>>,
  counters: Counters,
  fail_reads: AtomicBool,
  fail_writes: AtomicBool,
  scribble: AtomicBool,
  read_delay_ms: AtomicU64,
}

impl MemVnode {
  pub fn new(key: NodeKey, data: Vec<u8>) -> Self {
    Self {
      key,
      data: RwLock::new(data),
      counters: Counters::default(),
      fail_reads: AtomicBool::new(false),
      fail_writes: AtomicBool::new(false),
      scribble: AtomicBool::new(false),
      read_delay_ms: AtomicU64::new(0),
    }
  }

  /// Node of `len` zero bytes / `len` 个零字节的节点
  pub fn zeroed(key: NodeKey, len: usize) -> Self {
    Self::new(key, vec![0; len])
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.data.read().len()
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.data.read().is_empty()
  }

  /// Copy of the stored bytes / 存储内容副本
  pub fn contents(&self) -> Vec<u8> {
    self.data.read().clone()
  }

  pub fn stats(&self) -> VnodeStats {
    let c = &self.counters;
    VnodeStats {
      reads: c.reads.load(Ordering::Relaxed),
      writes: c.writes.load(Ordering::Relaxed),
      read_bytes: c.read_bytes.load(Ordering::Relaxed),
      written_bytes: c.written_bytes.load(Ordering::Relaxed),
    }
  }

  pub fn set_fail_reads(&self, fail: bool) {
    self.fail_reads.store(fail, Ordering::Relaxed);
  }

  pub fn set_fail_writes(&self, fail: bool) {
    self.fail_writes.store(fail, Ordering::Relaxed);
  }

  /// Fill what a short read did not write with [`SCRIBBLE`]
  /// 用 [`SCRIBBLE`] 填充短读未写到的部分
  pub fn set_scribble(&self, on: bool) {
    self.scribble.store(on, Ordering::Relaxed);
  }

  /// Sleep before every read / 每次读前休眠
  pub fn set_read_delay(&self, ms: u64) {
    self.read_delay_ms.store(ms, Ordering::Relaxed);
  }
}

impl Vnode for MemVnode {
  fn key(&self) -> NodeKey {
    self.key
  }

  fn read_pages(&self, _cookie: Cookie, offset: u64, vecs: &mut [&mut [u8]]) -> Result<usize> {
    self.counters.reads.fetch_add(1, Ordering::Relaxed);
    let delay = self.read_delay_ms.load(Ordering::Relaxed);
    if delay > 0 {
      thread::sleep(Duration::from_millis(delay));
    }
    if self.fail_reads.load(Ordering::Relaxed) {
      return Err(Error::Injected("read"));
    }
    let scribble = self.scribble.load(Ordering::Relaxed);
    let data = self.data.read();
    let mut pos = usize::try_from(offset).unwrap_or(usize::MAX);
    let mut done = 0;
    for v in vecs.iter_mut() {
      let n = data.len().saturating_sub(pos).min(v.len());
      if n > 0 {
        v[..n].copy_from_slice(&data[pos..pos + n]);
        pos += n;
        done += n;
      }
      if n < v.len() && scribble {
        v[n..].fill(SCRIBBLE);
      }
    }
    trace!("{} read {done}/{} at {offset}", self.key, vecs_len(vecs));
    self
      .counters
      .read_bytes
      .fetch_add(done as u64, Ordering::Relaxed);
    Ok(done)
  }

  fn write_pages(&self, _cookie: Cookie, offset: u64, vecs: &[&[u8]]) -> Result<usize> {
    self.counters.writes.fetch_add(1, Ordering::Relaxed);
    if self.fail_writes.load(Ordering::Relaxed) {
      return Err(Error::Injected("write"));
    }
    let total = vecs_len(vecs);
    let start = offset as usize;
    let mut data = self.data.write();
    if data.len() < start + total {
      data.resize(start + total, 0);
    }
    let mut pos = start;
    for v in vecs {
      data[pos..pos + v.len()].copy_from_slice(v);
      pos += v.len();
    }
    trace!("{} wrote {total} at {offset}", self.key);
    self
      .counters
      .written_bytes
      .fetch_add(total as u64, Ordering::Relaxed);
    Ok(total)
  }

  fn set_size(&self, size: u64) -> Result<()> {
    self.data.write().resize(size as usize, 0);
    Ok(())
  }
}
