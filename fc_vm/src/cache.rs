//! VM cache: page map, busy protocol, resize and write-back
//! VM 缓存：页映射、忙页协议、调整大小与回写

use std::{
  any::Any,
  ops::Range,
  sync::{Arc, Weak},
};

use fc_page::{PAGE_SIZE, PageId, PagePool, PageState, Reclaim, page_align_up};
use fc_vnode::{Cookie, NodeKey, Vnode, vecs_len};
use log::{debug, trace, warn};
use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::{Error, Result, VmState};

/// Pages per write-back call / 每次回写调用的页数
const WRITE_RUN: usize = 32;

pub type Guard<'a> = MutexGuard<'a, VmState>;

type FileRef = Weak<dyn Any + Send + Sync>;

pub struct VmCache {
  pool: Arc<PagePool>,
  vnode: Arc<dyn Vnode>,
  state: Mutex<VmState>,
  not_busy: Condvar,
  file_ref: Mutex<Option<FileRef>>,
}

impl VmCache {
  /// Create and register as a page thief / 创建并注册为偷页者
  pub fn new(pool: Arc<PagePool>, vnode: Arc<dyn Vnode>) -> Arc<Self> {
    let cache = Arc::new(Self {
      pool,
      vnode,
      state: Mutex::new(VmState::default()),
      not_busy: Condvar::new(),
      file_ref: Mutex::new(None),
    });
    let thief: Weak<dyn Reclaim> = Arc::downgrade(&cache) as Weak<dyn Reclaim>;
    cache.pool.add_reclaimer(thief);
    cache
  }

  #[inline]
  pub fn pool(&self) -> &Arc<PagePool> {
    &self.pool
  }

  #[inline]
  pub fn vnode(&self) -> &Arc<dyn Vnode> {
    &self.vnode
  }

  #[inline]
  pub fn key(&self) -> NodeKey {
    self.vnode.key()
  }

  #[inline]
  pub fn lock(&self) -> Guard<'_> {
    self.state.lock()
  }

  /// Sleep until some page turns unbusy, caller re-checks its own page
  /// 睡眠直到某页变为非忙，调用者需重新检查目标页
  #[inline]
  pub fn wait_not_busy(&self, g: &mut Guard<'_>) {
    self.not_busy.wait(g);
  }

  pub fn mark_unbusy(&self, g: &mut Guard<'_>, offset: u64) {
    g.set_busy(offset, false);
    self.not_busy.notify_all();
  }

  /// Drop page from the cache and return it to the pool
  /// 从缓存移除页并归还页池
  pub fn discard(&self, g: &mut Guard<'_>, offset: u64) {
    if let Some(e) = g.remove(offset) {
      self.pool.free(e.page);
      self.not_busy.notify_all();
    }
  }

  /// Set `virtual_end`, dropping pages wholly past it
  /// 设置 `virtual_end`，丢弃完全越过它的页
  pub fn resize(&self, g: &mut Guard<'_>, new_end: u64) {
    let keep = page_align_up(new_end);
    while let Some(offset) = g.first_busy_from(keep) {
      trace!("{} resize waits for busy page {offset}", self.key());
      self.not_busy.wait(g);
    }
    let dropped = g.split_off(keep);
    for e in dropped.values() {
      self.pool.free(e.page);
    }
    if !dropped.is_empty() {
      debug!("{} resize to {new_end}: dropped {} pages", self.key(), dropped.len());
    }
    g.virtual_end = new_end;
  }

  /// Write back modified, unbusy pages in `range`, returns pages written
  /// 回写 `range` 内已修改且非忙的页，返回写出页数
  pub fn write_modified(&self, range: Range<u64>) -> Result<usize> {
    let mut g = self.lock();
    self.write_modified_locked(&mut g, range)
  }

  /// Same as [`Self::write_modified`] with the lock already held, the lock
  /// is dropped around each store call.
  /// 同 [`Self::write_modified`]，调用者已持锁，每次存储调用期间释放锁。
  pub fn write_modified_locked(&self, g: &mut Guard<'_>, range: Range<u64>) -> Result<usize> {
    let dirty: Vec<(u64, PageId)> = g
      .range(range)
      .filter(|(_, e)| !e.busy && self.pool.state(e.page) == PageState::Modified)
      .map(|(o, e)| (o, e.page))
      .collect();
    if dirty.is_empty() {
      return Ok(0);
    }
    for &(o, _) in &dirty {
      g.set_busy(o, true);
    }
    let end = g.virtual_end;

    let mut written = 0;
    let mut first_err = None;
    for run in runs(&dirty) {
      let res = MutexGuard::unlocked(g, || self.write_run(run, end));
      let ok = res.is_ok();
      if let Err(e) = res {
        warn!("{} write back at {}: {e}", self.key(), run[0].0);
        first_err.get_or_insert(e);
      }
      for &(o, page) in run {
        if ok {
          self.pool.set_state(page, PageState::Active);
        }
        g.set_busy(o, false);
      }
      if ok {
        written += run.len();
      }
      self.not_busy.notify_all();
    }
    trace!("{} wrote back {written} pages", self.key());
    match first_err {
      Some(e) => Err(e),
      None => Ok(written),
    }
  }

  /// Store call for one contiguous run, clipped to `end`
  /// 单个连续段的存储调用，截断到 `end`
  fn write_run(&self, run: &[(u64, PageId)], end: u64) -> Result<()> {
    let frames: Vec<_> = run.iter().map(|&(_, p)| self.pool.frame(p).read()).collect();
    let vecs: Vec<&[u8]> = frames
      .iter()
      .zip(run)
      .filter_map(|(f, &(o, _))| {
        let len = end.saturating_sub(o).min(PAGE_SIZE as u64) as usize;
        (len > 0).then(|| &f[..len])
      })
      .collect();
    let want = vecs_len(&vecs);
    if want == 0 {
      return Ok(());
    }
    let offset = run[0].0;
    let done = self.vnode.write_pages(Cookie::default(), offset, &vecs)?;
    if done < want {
      return Err(Error::ShortWrite { offset, want, done });
    }
    Ok(())
  }

  /// Write back everything, then drop every page
  /// 全部回写后丢弃所有页
  pub fn flush_and_remove_all(&self) -> Result<()> {
    let mut g = self.lock();
    loop {
      self.write_modified_locked(&mut g, 0..u64::MAX)?;
      if g.any_busy() {
        self.not_busy.wait(&mut g);
        continue;
      }
      // Dirtied again while unlocked / 解锁期间再次变脏
      if g
        .pages()
        .any(|(_, e)| self.pool.state(e.page) == PageState::Modified)
      {
        continue;
      }
      break;
    }
    let all = g.take_all();
    for e in all.values() {
      self.pool.free(e.page);
    }
    debug!("{} flushed and removed {} pages", self.key(), all.len());
    Ok(())
  }

  /// Evict up to `want` clean, unbusy pages, returns pages freed
  /// 驱逐至多 `want` 个干净非忙页，返回释放数
  pub fn evict_clean(&self, g: &mut Guard<'_>, want: usize) -> usize {
    let victims: Vec<u64> = g
      .pages()
      .filter(|(_, e)| !e.busy && self.pool.state(e.page).is_clean_cached())
      .take(want)
      .map(|(o, _)| o)
      .collect();
    for &o in &victims {
      if let Some(e) = g.remove(o) {
        self.pool.free(e.page);
      }
    }
    victims.len()
  }

  /// Back pointer to the owning file cache, never owns it
  /// 指向所属文件缓存的反向指针，不持有所有权
  pub fn set_file_ref(&self, file_ref: Option<FileRef>) {
    *self.file_ref.lock() = file_ref;
  }

  pub fn file_ref(&self) -> Option<Arc<dyn Any + Send + Sync>> {
    self.file_ref.lock().as_ref().and_then(Weak::upgrade)
  }
}

/// Split into runs of adjacent pages, at most [`WRITE_RUN`] each
/// 切分为相邻页段，每段至多 [`WRITE_RUN`] 页
fn runs(pages: &[(u64, PageId)]) -> Vec<&[(u64, PageId)]> {
  let mut out = Vec::new();
  let mut start = 0;
  for i in 1..=pages.len() {
    let split = i == pages.len()
      || i - start == WRITE_RUN
      || pages[i].0 != pages[i - 1].0 + PAGE_SIZE as u64;
    if split {
      out.push(&pages[start..i]);
      start = i;
    }
  }
  out
}

impl Reclaim for VmCache {
  fn reclaim(&self, want: usize) -> usize {
    let Some(mut g) = self.state.try_lock() else {
      return 0;
    };
    if g.mappings > 0 {
      return 0;
    }
    let mut n = self.evict_clean(&mut g, want);
    // Short on clean pages, write dirty ones back first
    // 干净页不足时先回写脏页
    if n < want {
      match self.write_modified_locked(&mut g, 0..u64::MAX) {
        Ok(0) => {}
        Ok(_) => n += self.evict_clean(&mut g, want - n),
        Err(e) => warn!("{} reclaim write back: {e}", self.key()),
      }
    }
    if n > 0 {
      trace!("{} gave {n} pages to the thief", self.key());
    }
    n
  }
}

impl Drop for VmCache {
  fn drop(&mut self) {
    let all = self.state.get_mut().take_all();
    for e in all.values() {
      self.pool.free(e.page);
    }
  }
}
