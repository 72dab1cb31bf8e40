//! Per-file cache handle 单文件缓存句柄

use std::sync::Arc;

use fc_page::{PAGE_MASK, page_align_down};
use fc_vm::VmCache;
use fc_vnode::{Cookie, NodeKey, Vnode};
use log::debug;
use parking_lot::Mutex;

use crate::{
  AccessRing, Error, Result,
  bypass::write_zeros,
  cache::Ctx,
  io::{Buf, Req, cache_io},
};

/// Byte-stream view over one node's VM cache
/// 单个节点 VM 缓存之上的字节流视图
pub struct FileCacheRef {
  pub(crate) ctx: Arc<Ctx>,
  pub(crate) cache: Arc<VmCache>,
  pub(crate) access: Mutex<AccessRing>,
  /// Nesting count, cached iff zero / 嵌套计数，为零时启用缓存
  disabled: Mutex<u32>,
}

impl FileCacheRef {
  pub(crate) fn new(ctx: Arc<Ctx>, cache: Arc<VmCache>) -> Self {
    Self {
      ctx,
      cache,
      access: Mutex::new(AccessRing::default()),
      disabled: Mutex::new(0),
    }
  }

  #[inline]
  pub fn key(&self) -> NodeKey {
    self.cache.key()
  }

  #[inline]
  pub fn cache(&self) -> &Arc<VmCache> {
    &self.cache
  }

  #[inline]
  pub(crate) fn vnode(&self) -> &Arc<dyn Vnode> {
    self.cache.vnode()
  }

  /// File size as the cache sees it / 缓存视角的文件大小
  #[inline]
  pub fn size(&self) -> u64 {
    self.cache.lock().virtual_end
  }

  #[inline]
  pub(crate) fn push_access(&self, offset: u64, bytes: usize, is_write: bool) {
    self
      .access
      .lock()
      .push(offset as i64, bytes as i64, is_write);
  }

  /// Undo one [`Self::disable`] / 撤销一次 [`Self::disable`]
  ///
  /// Panics when caching is already enabled.
  /// 缓存已启用时 panic。
  pub fn enable(&self) {
    let mut d = self.disabled.lock();
    assert!(*d > 0, "enable on enabled file cache {}", self.key());
    *d -= 1;
    if *d == 0 {
      debug!("{} cache enabled", self.key());
    }
  }

  /// Stop caching, flushing and dropping every page on the first call
  /// 停止缓存，首次调用时回写并丢弃全部页
  ///
  /// On failure the cache stays enabled.
  /// 失败时保持启用。
  pub fn disable(&self) -> Result<()> {
    let mut d = self.disabled.lock();
    if *d == 0 {
      self.cache.flush_and_remove_all()?;
      debug!("{} cache disabled", self.key());
    }
    *d += 1;
    Ok(())
  }

  #[inline]
  pub fn is_enabled(&self) -> bool {
    *self.disabled.lock() == 0
  }

  /// Change the file size / 修改文件大小
  ///
  /// Pages past the new end are dropped, and on shrink the tail of a new
  /// partial last page is zeroed and the store is truncated, so extending
  /// again never brings old bytes back.
  /// 丢弃越过新末尾的页；缩小时清零新的末尾残页尾部并截断存储，
  /// 因此再次扩展不会带回旧数据。
  pub fn set_size(&self, size: i64) -> Result<()> {
    let size = u64::try_from(size).map_err(|_| Error::bad("negative file size"))?;
    let mut g = self.cache.lock();
    let old = g.virtual_end;
    self.cache.resize(&mut g, size);
    if size >= old {
      return Ok(());
    }
    let partial = (size & PAGE_MASK) as usize;
    if partial != 0 {
      let at = page_align_down(size);
      while let Some(e) = g.lookup(at) {
        if e.busy {
          self.cache.wait_not_busy(&mut g);
          continue;
        }
        self.ctx.pool.frame(e.page).write().zero_from(partial);
        break;
      }
    }
    drop(g);
    self.vnode().set_size(size)?;
    debug!("{} shrunk {old} -> {size}", self.key());
    Ok(())
  }

  /// Write every modified page back / 回写全部已修改页
  pub fn sync(&self) -> Result<()> {
    self.cache.write_modified(0..u64::MAX)?;
    Ok(())
  }

  /// Read at `offset`, clipped to the file size, returns bytes read
  /// 在 `offset` 处读取，截断到文件大小，返回读取字节数
  pub fn read(&self, cookie: Cookie, offset: i64, buf: &mut [u8]) -> Result<usize> {
    if !self.is_enabled() {
      return self.read_direct(cookie, offset, buf);
    }
    let size = buf.len();
    let mut req = Req {
      cookie,
      buf: Buf::Read(Some(buf)),
    };
    cache_io(self, &mut req, offset, size)
  }

  /// Bring `[offset, offset + size)` into the cache without copying out
  /// 将 `[offset, offset + size)` 读入缓存但不复制出来
  pub fn populate(&self, cookie: Cookie, offset: i64, size: usize) -> Result<usize> {
    if !self.is_enabled() {
      return Ok(0);
    }
    let mut req = Req {
      cookie,
      buf: Buf::Read(None),
    };
    cache_io(self, &mut req, offset, size)
  }

  /// Write `size` bytes at `offset`, zeros when `buf` is `None`
  /// 在 `offset` 处写入 `size` 字节，`buf` 为 `None` 时写零
  ///
  /// Clipped to the file size, grow it first with [`Self::set_size`].
  /// 截断到文件大小，需先用 [`Self::set_size`] 扩展。
  pub fn write(&self, cookie: Cookie, offset: i64, buf: Option<&[u8]>, size: usize) -> Result<usize> {
    if buf.is_some_and(|b| b.len() < size) {
      return Err(Error::bad("buffer shorter than size"));
    }
    if !self.is_enabled() {
      return self.write_direct(cookie, offset, buf, size);
    }
    let mut req = Req {
      cookie,
      buf: Buf::Write(buf),
    };
    cache_io(self, &mut req, offset, size)
  }

  /// Bytes of `[offset, offset + size)` inside the file / 落在文件内的字节数
  fn clip(&self, offset: i64, size: usize) -> Option<(u64, usize)> {
    let offset = u64::try_from(offset).ok()?;
    let end = self.size();
    if offset >= end || size == 0 {
      return None;
    }
    Some((offset, size.min((end - offset) as usize)))
  }

  fn read_direct(&self, cookie: Cookie, offset: i64, buf: &mut [u8]) -> Result<usize> {
    let Some((offset, len)) = self.clip(offset, buf.len()) else {
      return Ok(0);
    };
    let dst = &mut buf[..len];
    let n = self.vnode().read_pages(cookie, offset, &mut [&mut *dst])?;
    dst[n.min(len)..].fill(0);
    Ok(len)
  }

  fn write_direct(&self, cookie: Cookie, offset: i64, buf: Option<&[u8]>, size: usize) -> Result<usize> {
    let Some((offset, len)) = self.clip(offset, size) else {
      return Ok(0);
    };
    match buf {
      Some(b) => Ok(self.vnode().write_pages(cookie, offset, &[&b[..len]])?),
      None => write_zeros(&self.ctx, self.vnode(), cookie, offset, len),
    }
  }
}

/// The live handle behind a VM cache, if any / VM 缓存背后的存活句柄
pub(crate) fn file_ref_of(cache: &VmCache) -> Option<Arc<FileCacheRef>> {
  cache.file_ref()?.downcast::<FileCacheRef>().ok()
}
