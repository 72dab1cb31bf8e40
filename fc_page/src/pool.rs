//! Page pool: allocation, state transitions and reservations
//! 页池：分配、状态迁移与预留

use std::{
  sync::Weak,
  time::Duration,
};

use log::{debug, trace};
use parking_lot::{Condvar, Mutex, MutexGuard, RwLock};

use crate::{
  Error, Frame, LowMemory, PageId, PageState, PoolConf, Result, USAGE_HOT,
  queue::Queues,
};

/// Page thief hook: gives clean pages back under pressure
/// 偷页钩子：内存紧张时归还干净页
pub trait Reclaim: Send + Sync {
  /// Evict up to `want` pages, return how many were freed
  /// 驱逐至多 `want` 页，返回释放数量
  fn reclaim(&self, want: usize) -> usize;
}

/// Cumulative pool counters / 页池累计计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
  pub reserve_calls: u64,
  pub reserved: u64,
  pub unreserved: u64,
  /// Reserved pages turned into allocations / 转为分配的预留页
  pub consumed: u64,
  pub allocated: u64,
  pub freed: u64,
  pub stolen: u64,
}

struct Inner {
  queues: Queues,
  /// Outstanding reservation / 未归还的预留
  reserved: usize,
  stats: PoolStats,
  forced: Option<LowMemory>,
}

impl Inner {
  #[inline]
  fn unused(&self) -> usize {
    self.queues.len(PageState::Free) + self.queues.len(PageState::Clear)
  }

  #[inline]
  fn available(&self) -> usize {
    self.unused().saturating_sub(self.reserved)
  }

  /// Pages that can ever be handed out / 可能分配出去的页数
  #[inline]
  fn capacity(&self) -> usize {
    self.queues.total() - self.queues.len(PageState::Wired) - self.queues.len(PageState::Unused)
  }
}

/// Pages promised to one caller, redeemed by [`PagePool::allocate`]
/// 向单个调用者承诺的页，通过 [`PagePool::allocate`] 兑现
#[derive(Debug, Default)]
pub struct Reservation {
  count: usize,
}

impl Reservation {
  #[inline]
  pub fn new() -> Self {
    Self::default()
  }

  /// Pages still held / 仍持有的页数
  #[inline]
  pub fn count(&self) -> usize {
    self.count
  }
}

/// Page queue manager / 页队列管理器
pub struct PagePool {
  conf: PoolConf,
  inner: Mutex<Inner>,
  frames: Box<[RwLock<Frame>]>,
  freed: Condvar,
  thieves: Mutex<Vec<Weak<dyn Reclaim>>>,
}

impl PagePool {
  /// Create pool, all pages free / 创建页池，所有页空闲
  pub fn new(conf: PoolConf) -> Result<Self> {
    let frames = (0..conf.pages)
      .map(|_| Frame::page().map(RwLock::new))
      .collect::<Result<Vec<_>>>()?
      .into_boxed_slice();
    debug!("page pool: {} pages", conf.pages);
    Ok(Self {
      inner: Mutex::new(Inner {
        queues: Queues::new(conf.pages),
        reserved: 0,
        stats: PoolStats::default(),
        forced: None,
      }),
      frames,
      freed: Condvar::new(),
      thieves: Mutex::new(Vec::new()),
      conf,
    })
  }

  #[inline]
  pub fn conf(&self) -> &PoolConf {
    &self.conf
  }

  /// Total pages / 总页数
  #[inline]
  pub fn total(&self) -> usize {
    self.conf.pages
  }

  /// Frame of a page / 页的页帧
  ///
  /// Content may be touched only by the holder of the page's busy flag,
  /// or under the owning cache's lock.
  /// 仅持有页忙标志者或持有所属缓存锁者可访问内容。
  #[inline]
  pub fn frame(&self, id: PageId) -> &RwLock<Frame> {
    &self.frames[id.idx()]
  }

  /// Free + Clear pages / 空闲与已清零页数
  #[inline]
  pub fn unused(&self) -> usize {
    self.inner.lock().unused()
  }

  /// Unused pages not promised to a reservation / 未被预留的空闲页
  #[inline]
  pub fn available(&self) -> usize {
    self.inner.lock().available()
  }

  /// Outstanding reservation / 当前预留
  #[inline]
  pub fn reserved(&self) -> usize {
    self.inner.lock().reserved
  }

  #[inline]
  pub fn count(&self, state: PageState) -> usize {
    self.inner.lock().queues.len(state)
  }

  #[inline]
  pub fn stats(&self) -> PoolStats {
    self.inner.lock().stats
  }

  #[inline]
  pub fn state(&self, id: PageId) -> PageState {
    self.inner.lock().queues.node(id).state
  }

  #[inline]
  pub fn usage(&self, id: PageId) -> u8 {
    self.inner.lock().queues.node(id).usage
  }

  /// Current low memory level / 当前低内存等级
  pub fn low_memory(&self) -> LowMemory {
    let inner = self.inner.lock();
    if let Some(level) = inner.forced {
      return level;
    }
    let total = inner.queues.total();
    if total == 0 {
      return LowMemory::Critical;
    }
    let pct = inner.available() * 100 / total;
    if pct <= self.conf.critical_pct {
      LowMemory::Critical
    } else if pct <= self.conf.warning_pct {
      LowMemory::Warning
    } else if pct <= self.conf.note_pct {
      LowMemory::Note
    } else {
      LowMemory::None
    }
  }

  /// Force the low memory level, `None` returns to the computed one
  /// 强制低内存等级，`None` 恢复计算值
  pub fn set_low_memory(&self, level: Option<LowMemory>) {
    self.inner.lock().forced = level;
  }

  /// Register a page thief / 注册偷页者
  pub fn add_reclaimer(&self, thief: Weak<dyn Reclaim>) {
    let mut thieves = self.thieves.lock();
    thieves.retain(|t| t.strong_count() > 0);
    thieves.push(thief);
  }

  /// Ask page thieves for up to `want` pages / 向偷页者索取至多 `want` 页
  fn steal(&self, want: usize) -> usize {
    let thieves: Vec<_> = self.thieves.lock().iter().filter_map(Weak::upgrade).collect();
    let mut got = 0;
    for thief in thieves {
      if got >= want {
        break;
      }
      got += thief.reclaim(want - got);
    }
    if got > 0 {
      trace!("page pool: stole {got} pages");
      self.inner.lock().stats.stolen += got as u64;
    }
    got
  }

  /// Add `n` pages to `res`, blocking until they are available
  /// 向 `res` 追加 `n` 页预留，不足时阻塞
  ///
  /// `NoMemory` when `n` exceeds the pages that can ever circulate, that
  /// is the pool minus wired and retired pages.
  /// `n` 超过可流通页数（总数减去固定页与退役页）时返回 `NoMemory`。
  ///
  /// Must not be called with a cache lock held.
  /// 调用时不得持有缓存锁。
  pub fn reserve(&self, res: &mut Reservation, n: usize) -> Result<()> {
    let mut inner = self.inner.lock();
    inner.stats.reserve_calls += 1;
    if n == 0 {
      return Ok(());
    }
    let capacity = inner.capacity();
    if n > capacity {
      debug!("page pool: reserve {n} pages exceeds capacity {capacity}");
      return Err(Error::NoMemory);
    }
    let wait = Duration::from_millis(self.conf.reserve_wait_ms.max(1));
    loop {
      let avail = inner.available();
      if avail >= n {
        inner.reserved += n;
        inner.stats.reserved += n as u64;
        res.count += n;
        return Ok(());
      }
      let want = n - avail;
      let got = MutexGuard::unlocked(&mut inner, || self.steal(want));
      if got == 0 && inner.available() < n {
        trace!("page pool: waiting for {want} pages");
        self.freed.wait_for(&mut inner, wait);
      }
    }
  }

  /// Give back what is left of `res` / 归还 `res` 剩余预留
  pub fn unreserve(&self, res: &mut Reservation) {
    let n = std::mem::take(&mut res.count);
    if n == 0 {
      return;
    }
    let mut inner = self.inner.lock();
    assert!(
      n <= inner.reserved,
      "unreserve {n} pages but only {} reserved",
      inner.reserved
    );
    inner.reserved -= n;
    inner.stats.unreserved += n as u64;
    drop(inner);
    self.freed.notify_all();
  }

  /// Allocate a page into `state`
  /// 分配一页并置为 `state`
  ///
  /// A page is drawn from `res` while it holds any, such an allocation
  /// cannot fail. Otherwise only unreserved pages are used and `NoMemory`
  /// is returned when none are left. `clear` zeroes the frame.
  /// `res` 有剩余时从中扣取，不会失败；否则只使用未预留页，耗尽时返回
  /// `NoMemory`。`clear` 清零页帧。
  pub fn allocate(
    &self,
    state: PageState,
    res: Option<&mut Reservation>,
    clear: bool,
  ) -> Result<PageId> {
    debug_assert!(!state.is_unused(), "allocate into {state:?}");
    let mut inner = self.inner.lock();
    match res {
      Some(res) if res.count > 0 => {
        res.count -= 1;
        inner.reserved -= 1;
        inner.stats.consumed += 1;
      }
      _ => {
        if inner.available() == 0 {
          return Err(Error::NoMemory);
        }
      }
    }
    let (id, zeroed) = match inner.queues.pop_front(PageState::Clear) {
      Some(id) => (id, true),
      None => (
        inner
          .queues
          .pop_front(PageState::Free)
          .ok_or(Error::NoMemory)?,
        false,
      ),
    };
    inner.queues.insert(id, state);
    inner.queues.node_mut(id).usage = 0;
    inner.stats.allocated += 1;
    drop(inner);
    if clear && !zeroed {
      self.frames[id.idx()].write().fill(0);
    }
    Ok(id)
  }

  /// Move page to another queue, `Free`/`Clear` return it to the pool
  /// 换队，`Free`/`Clear` 即归还页池
  pub fn set_state(&self, id: PageId, state: PageState) {
    let mut inner = self.inner.lock();
    let old = inner.queues.node(id).state;
    if old == state {
      return;
    }
    inner.queues.move_to(id, state);
    let returned = state.is_unused() && !old.is_unused();
    if returned {
      inner.stats.freed += 1;
      inner.queues.node_mut(id).usage = 0;
    }
    drop(inner);
    if returned {
      self.freed.notify_all();
    }
  }

  /// Return page to the pool / 归还页
  #[inline]
  pub fn free(&self, id: PageId) {
    self.set_state(id, PageState::Free);
  }

  /// Move page to the tail of its queue / 移到所在队列队尾
  pub fn requeue(&self, id: PageId) {
    let mut inner = self.inner.lock();
    let state = inner.queues.node(id).state;
    inner.queues.move_to(id, state);
  }

  /// Mark page recently used / 标记最近使用
  pub fn mark_hot(&self, id: PageId) {
    self.inner.lock().queues.node_mut(id).usage = USAGE_HOT;
  }
}
