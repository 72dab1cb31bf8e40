//! Asynchronous prefetch 异步预取
//!
//! A [`PrecacheIo`] owns a run of freshly allocated busy pages and one
//! vectored read. When it completes, transferred pages become visible and
//! the rest are dropped.
//! [`PrecacheIo`] 持有一段新分配的忙页与一次向量化读。完成后已传输的页变为可见，
//! 其余页被丢弃。

use std::{
  panic::{self, AssertUnwindSafe},
  sync::Arc,
};

use fc_page::{
  PAGE_SIZE, PageId, PageState, Reservation, page_align_down, page_align_up, pages_for,
};
use fc_vm::{Guard, VmCache};
use fc_vnode::Cookie;
use log::{trace, warn};
use parking_lot::MutexGuard;

use crate::{Error, Result, cache::Ctx, file_ref::file_ref_of, io_queue::IoQueue};

const PS: u64 = PAGE_SIZE as u64;

pub(crate) struct PrecacheIo {
  cache: Arc<VmCache>,
  offset: u64,
  size: usize,
  pages: Vec<PageId>,
}

impl PrecacheIo {
  pub fn new(cache: Arc<VmCache>, offset: u64, size: usize) -> Self {
    Self {
      cache,
      offset,
      size,
      pages: Vec::new(),
    }
  }

  /// Allocate and insert busy pages, rolling back on failure
  /// 分配并插入忙页，失败时回滚
  pub fn prepare(&mut self, g: &mut Guard<'_>, res: &mut Reservation) -> Result<()> {
    let count = pages_for(self.size);
    if count == 0 {
      return Err(Error::bad("empty precache"));
    }
    let pool = self.cache.pool();
    self.pages.reserve_exact(count);
    for i in 0..count {
      match pool.allocate(PageState::Active, Some(res), false) {
        Ok(page) => {
          g.insert(self.offset + i as u64 * PS, page, true);
          self.pages.push(page);
        }
        Err(e) => {
          for j in 0..self.pages.len() {
            self.cache.discard(g, self.offset + j as u64 * PS);
          }
          self.pages.clear();
          return Err(e.into());
        }
      }
    }
    Ok(())
  }

  /// Hand the read to the worker / 将读取交给工作线程
  pub fn read_async(self, io: &IoQueue) {
    io.submit(Box::new(move || self.run()));
  }

  fn run(self) {
    let pool = self.cache.pool();
    // A panicking store still releases the busy pages
    // 存储 panic 时仍释放忙页
    let read = panic::catch_unwind(AssertUnwindSafe(|| {
      let mut frames: Vec<_> = self.pages.iter().map(|&p| pool.frame(p).write()).collect();
      let mut vecs: Vec<&mut [u8]> = frames.iter_mut().map(|f| &mut f[..]).collect();
      self
        .cache
        .vnode()
        .read_pages(Cookie::default(), self.offset, &mut vecs)
    }));
    let n = match read {
      Ok(Ok(n)) => n,
      Ok(Err(e)) => {
        warn!("{} precache at {}: {e}", self.cache.key(), self.offset);
        0
      }
      Err(_) => {
        warn!("{} precache at {}: store panicked", self.cache.key(), self.offset);
        0
      }
    };
    self.finished(n);
  }

  /// Completion: publish transferred pages, drop the others
  /// 完成回调：发布已传输页，丢弃其余页
  fn finished(self, transferred: usize) {
    let pool = self.cache.pool();
    let mut g = self.cache.lock();
    let done_pages = pages_for(transferred);
    let bytes = (transferred as u64).min(g.virtual_end.saturating_sub(self.offset));
    let tail = (bytes % PS) as usize;

    for (i, &page) in self.pages.iter().enumerate() {
      let at = self.offset + i as u64 * PS;
      if i < done_pages {
        if i + 1 == done_pages && tail != 0 {
          pool.frame(page).write().zero_from(tail);
        }
        self.cache.mark_unbusy(&mut g, at);
      } else {
        self.cache.discard(&mut g, at);
      }
    }
    trace!(
      "{} precached {done_pages}/{} pages at {}",
      self.cache.key(),
      self.pages.len(),
      self.offset
    );
  }
}

/// Prefetch `[offset, offset + size)` of the node behind `cache`
/// 预取 `cache` 所属节点的 `[offset, offset + size)`
///
/// Best effort: skipped when free pages are scarce, when the cache already
/// holds a large share of the file, or when caching is disabled.
/// 尽力而为：空闲页不足、缓存已占文件较大比例或缓存被禁用时跳过。
pub(crate) fn prefetch_cache(ctx: &Ctx, cache: &Arc<VmCache>, offset: i64, size: usize) {
  match file_ref_of(cache) {
    Some(r) if r.is_enabled() => {}
    _ => return,
  }
  let Ok(offset) = u64::try_from(offset) else {
    return;
  };
  let pool = &ctx.pool;
  let (file_size, resident) = {
    let g = cache.lock();
    (g.virtual_end, g.page_count())
  };
  if offset >= file_size || size == 0 {
    return;
  }
  let size = (size as u64).min(file_size - offset);
  let start = page_align_down(offset);
  let end = page_align_up(offset + size);
  let count = ((end - start) / PS) as usize;
  let file_pages = pages_for(file_size as usize);
  let (num, den) = ctx.conf.prefetch_max_fraction;
  if pool.unused() < 2 * count || den * resident > num * file_pages {
    trace!("{} prefetch skipped", cache.key());
    return;
  }

  let mut res = Reservation::new();
  if let Err(e) = pool.reserve(&mut res, count) {
    warn!("{} prefetch of {count} pages: {e}", cache.key());
    return;
  }
  let mut g = cache.lock();
  let mut run = start;
  let mut at = start;
  loop {
    if at < end && g.lookup(at).is_none() {
      at += PS;
      continue;
    }
    if at > run {
      let mut io = PrecacheIo::new(cache.clone(), run, (at - run) as usize);
      if let Err(e) = io.prepare(&mut g, &mut res) {
        warn!("{} prefetch at {run}: {e}", cache.key());
        break;
      }
      MutexGuard::unlocked(&mut g, || io.read_async(&ctx.io));
    }
    if at >= end {
      break;
    }
    at += PS;
    run = at;
  }
  drop(g);
  pool.unreserve(&mut res);
}
