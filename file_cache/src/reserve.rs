//! Reservation with local reclaim under memory pressure
//! 内存紧张时先本地回收再预留

use fc_page::{LowMemory, Reservation};
use log::{trace, warn};

use crate::{FileCacheRef, Result};

/// Reserve `n` pages for the next batch / 为下一批预留 `n` 页
///
/// Under pressure, an unmapped cache read or written sequentially first
/// helps itself: writers push their trailing dirty pages out, readers drop
/// their own clean pages.
/// 内存紧张时，未映射且顺序访问的缓存先自助：写者回写身后的脏页，
/// 读者丢弃自身的干净页。
///
/// Must be called with the cache unlocked.
/// 调用时不得持有缓存锁。
pub(crate) fn reserve_pages(r: &FileCacheRef, res: &mut Reservation, n: usize, is_write: bool) -> Result<()> {
  let pool = &r.ctx.pool;
  if pool.low_memory() != LowMemory::None {
    let mut g = r.cache.lock();
    if g.consumers == 0 && g.mappings == 0 {
      let (sequential, range) = {
        let access = r.access.lock();
        (access.is_sequential(), access.write_back_range())
      };
      if sequential {
        if is_write {
          if let Some(range) = range
            && let Err(e) = r.cache.write_modified_locked(&mut g, range)
          {
            warn!("{} write back under pressure: {e}", r.key());
          }
        } else {
          let freed = r.cache.evict_clean(&mut g, n);
          trace!("{} freed {freed} own pages", r.key());
        }
      }
    }
  }
  pool.reserve(res, n)?;
  Ok(())
}
