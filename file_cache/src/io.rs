//! Synchronous I/O walker 同步 I/O 遍历器
//!
//! Walks the request page by page under the cache lock. Resident pages are
//! copied directly, runs of missing pages ("gaps") are collected and handed
//! to a batch function: fill/drain through the cache, or straight to the
//! store when memory is low and the request is large. The choice is made
//! again every `reevaluate_pages` pages.
//! 持缓存锁逐页遍历请求。驻留页直接复制，连续缺页（缺口）累积后交给批处理函数：
//! 经缓存填充/写入，或在内存紧张且请求较大时直达存储。每隔
//! `reevaluate_pages` 页重新选择一次。

use fc_page::{LowMemory, PAGE_MASK, PAGE_SIZE, PageState, Reservation, pages_for};
use fc_vm::Guard;
use fc_vnode::Cookie;
use log::trace;
use parking_lot::MutexGuard;

use crate::{
  FileCacheRef, Result,
  bypass::{read_from_file, write_to_file},
  fill::{read_into_cache, write_to_cache},
  reserve::reserve_pages,
};

const PS: u64 = PAGE_SIZE as u64;

/// Caller buffer, `None` writes zeros or only fills the cache
/// 调用者缓冲区，`None` 表示写零或仅填充缓存
pub(crate) enum Buf<'a> {
  Read(Option<&'a mut [u8]>),
  Write(Option<&'a [u8]>),
}

pub(crate) struct Req<'a> {
  pub cookie: Cookie,
  pub buf: Buf<'a>,
}

impl Req<'_> {
  #[inline]
  pub fn is_write(&self) -> bool {
    matches!(self.buf, Buf::Write(_))
  }

  #[inline]
  pub fn uses_buffer(&self) -> bool {
    matches!(self.buf, Buf::Read(Some(_)) | Buf::Write(Some(_)))
  }

  /// Copy page bytes out to the caller at `pos` / 将页内容复制到调用者 `pos` 处
  #[inline]
  pub fn copy_out(&mut self, pos: usize, src: &[u8]) {
    if let Buf::Read(Some(b)) = &mut self.buf {
      b[pos..pos + src.len()].copy_from_slice(src);
    }
  }

  /// Fill page bytes from the caller at `pos`, or zeros
  /// 从调用者 `pos` 处填充页内容，无缓冲区时写零
  #[inline]
  pub fn copy_in(&self, pos: usize, dst: &mut [u8]) {
    match &self.buf {
      Buf::Write(Some(b)) => dst.copy_from_slice(&b[pos..pos + dst.len()]),
      _ => dst.fill(0),
    }
  }
}

/// One contiguous sub-range of the request / 请求中的一个连续子区间
#[derive(Debug, Clone, Copy)]
pub(crate) struct Batch {
  /// Page-aligned file offset / 页对齐的文件偏移
  pub offset: u64,
  /// In-page offset of the first byte / 首字节的页内偏移
  pub page_off: usize,
  /// Position in the caller buffer / 在调用者缓冲区中的位置
  pub pos: usize,
  pub len: usize,
  /// Pages to reserve for the next batch / 为下一批预留的页数
  pub reserve: usize,
}

/// Called with the cache locked, returns with it locked again. Gives back
/// what `res` holds once the lock is dropped and reserves `Batch::reserve`
/// pages, cache fills only after their own pages stop being busy.
/// 持锁调用，返回时重新持锁。释放锁后归还 `res` 剩余预留并预留
/// `Batch::reserve` 页；填充缓存的变体在自身页解除忙状态后才预留。
pub(crate) type BatchFn =
  fn(&FileCacheRef, &mut Guard<'_>, &mut Req<'_>, &mut Reservation, Batch) -> Result<()>;

fn select(r: &FileCacheRef, size: usize, is_write: bool) -> BatchFn {
  let bypass =
    size >= r.ctx.conf.bypass_io_size && r.ctx.pool.low_memory() != LowMemory::None;
  match (bypass, is_write) {
    (true, false) => read_from_file,
    (true, true) => write_to_file,
    (false, false) => read_into_cache,
    (false, true) => write_to_cache,
  }
}

/// Flush the gap `[last.pos, pos)` and start a new one at `offset`
/// 提交缺口 `[last.pos, pos)` 并从 `offset` 开始新缺口
#[allow(clippy::too_many_arguments)]
fn satisfy(
  r: &FileCacheRef,
  g: &mut Guard<'_>,
  req: &mut Req<'_>,
  res: &mut Reservation,
  func: BatchFn,
  last: &mut Batch,
  offset: u64,
  pos: usize,
  left: usize,
) -> Result<()> {
  if pos == last.pos {
    return Ok(());
  }
  let request = pos - last.pos;
  let reserve = r
    .ctx
    .conf
    .max_io_vecs
    .min(pages_for(last.len - request + last.page_off));
  func(
    r,
    g,
    req,
    res,
    Batch {
      len: request,
      reserve,
      ..*last
    },
  )?;
  *last = Batch {
    offset,
    page_off: 0,
    pos,
    len: left,
    reserve: 0,
  };
  Ok(())
}

/// A failed batch after some bytes moved is a short transfer
/// 已传输部分字节后批次失败，视为短传输
#[inline]
fn short(done: usize, e: crate::Error) -> Result<usize> {
  if done > 0 {
    trace!("short transfer {done}: {e}");
    Ok(done)
  } else {
    Err(e)
  }
}

pub(crate) fn cache_io(r: &FileCacheRef, req: &mut Req<'_>, offset: i64, size: usize) -> Result<usize> {
  let Ok(offset) = u64::try_from(offset) else {
    return Ok(0);
  };
  let file_size = r.cache.lock().virtual_end;
  if offset >= file_size || size == 0 {
    return Ok(0);
  }
  let size = size.min((file_size - offset) as usize);

  let conf = &r.ctx.conf;
  let pool = &r.ctx.pool;
  let cache = &r.cache;
  let is_write = req.is_write();
  let max_chunk = conf.max_chunk();

  let mut page_off = (offset & PAGE_MASK) as usize;
  let mut offset = offset - page_off as u64;
  let mut pos = 0;
  let mut left = size;
  let mut last = Batch {
    offset,
    page_off,
    pos,
    len: left,
    reserve: 0,
  };
  trace!(
    "{} {} {size} at {}",
    r.key(),
    if is_write { "write" } else { "read" },
    offset + page_off as u64
  );

  let mut res = Reservation::new();
  reserve_pages(
    r,
    &mut res,
    conf.max_io_vecs.min(pages_for(page_off + left)),
    is_write,
  )?;

  let mut g = cache.lock();
  let mut processed = 0;
  let mut func: BatchFn = read_into_cache;

  while left > 0 {
    if processed % conf.reevaluate_pages == 0 {
      func = select(r, size, is_write);
    }

    let mut entry = g.lookup(offset);
    if entry.is_some() {
      // Flush the gap first, the lock may be dropped below
      // 先提交缺口，下面可能释放锁
      if let Err(e) = satisfy(
        r, &mut g, req, &mut res, func, &mut last, offset, pos, left,
      ) {
        drop(g);
        pool.unreserve(&mut res);
        return short(last.pos, e);
      }
      entry = g.lookup(offset);
      if entry.is_some_and(|e| e.busy) {
        cache.wait_not_busy(&mut g);
        continue;
      }
    }

    let in_page = (PAGE_SIZE - page_off).min(left);

    if let Some(e) = entry {
      if is_write || req.uses_buffer() {
        g.set_busy(offset, true);
        let frame = pool.frame(e.page);
        MutexGuard::unlocked(&mut g, || {
          if is_write {
            req.copy_in(pos, &mut frame.write()[page_off..page_off + in_page]);
          } else {
            req.copy_out(pos, &frame.read()[page_off..page_off + in_page]);
          }
        });
        if is_write {
          pool.set_state(e.page, PageState::Modified);
        }
        cache.mark_unbusy(&mut g, offset);
      }
      pool.mark_hot(e.page);
      let state = pool.state(e.page);
      if state.is_clean_cached() || state == PageState::Modified {
        pool.requeue(e.page);
      }

      if left <= in_page {
        drop(g);
        pool.unreserve(&mut res);
        return Ok(size);
      }

      last = Batch {
        offset: offset + PS,
        page_off: 0,
        pos: pos + in_page,
        len: left - in_page,
        reserve: 0,
      };
    }

    if left <= in_page {
      break;
    }

    pos += in_page;
    left -= in_page;
    page_off = 0;
    offset += PS;
    processed += 1;

    if pos - last.pos + last.page_off >= max_chunk
      && let Err(e) = satisfy(
        r, &mut g, req, &mut res, func, &mut last, offset, pos, left,
      )
    {
      drop(g);
      pool.unreserve(&mut res);
      return short(last.pos, e);
    }
  }

  let tail = Batch { reserve: 0, ..last };
  let ret = if tail.len == 0 {
    Ok(size)
  } else {
    match func(r, &mut g, req, &mut res, tail) {
      Ok(()) => Ok(size),
      Err(e) => short(last.pos, e),
    }
  };
  drop(g);
  pool.unreserve(&mut res);
  ret
}
