//! Cache fill and drain: one vectored store call per batch
//! 缓存填充与写入：每批一次向量化存储调用

use fc_page::{PAGE_SIZE, PageId, PageState, Reservation, pages_for};
use fc_vm::Guard;
use fc_vnode::{Cookie, vecs_len};
use log::warn;
use parking_lot::MutexGuard;

use crate::{
  Error, FileCacheRef, Result,
  io::{Batch, Req},
  reserve::reserve_pages,
};

const PS: u64 = PAGE_SIZE as u64;

/// Allocate `num` busy pages at `offset`, all or none
/// 在 `offset` 处分配 `num` 个忙页，要么全部成功要么全部撤销
fn alloc_batch(
  r: &FileCacheRef,
  g: &mut Guard<'_>,
  res: &mut Reservation,
  offset: u64,
  num: usize,
  state: PageState,
) -> Result<Vec<PageId>> {
  let max = r.ctx.conf.max_io_vecs;
  assert!(num <= max, "batch of {num} pages exceeds {max} vectors");
  let mut pages = Vec::with_capacity(num);
  for i in 0..num {
    match r.ctx.pool.allocate(state, Some(res), false) {
      Ok(page) => {
        g.insert(offset + i as u64 * PS, page, true);
        pages.push(page);
      }
      Err(e) => {
        warn!("{} allocate at {offset}: {e}", r.key());
        for j in 0..pages.len() {
          r.cache.discard(g, offset + j as u64 * PS);
        }
        return Err(e.into());
      }
    }
  }
  Ok(pages)
}

/// Scatter read into page frames, zeroing what the store left untouched
/// 分散读入页帧，清零存储未写到的部分
pub(crate) fn read_frames(
  r: &FileCacheRef,
  cookie: Cookie,
  offset: u64,
  pages: &[PageId],
) -> Result<usize> {
  let mut frames: Vec<_> = pages.iter().map(|&p| r.ctx.pool.frame(p).write()).collect();
  let mut vecs: Vec<&mut [u8]> = frames.iter_mut().map(|f| &mut f[..]).collect();
  let n = r.vnode().read_pages(cookie, offset, &mut vecs)?;
  drop(vecs);
  for (i, f) in frames.iter_mut().enumerate() {
    let start = i * PAGE_SIZE;
    if n < start + PAGE_SIZE {
      f.zero_from(n.saturating_sub(start));
    }
  }
  Ok(n)
}

/// Return the batch's pages to the cache, or drop them on failure
/// 将批次页交还缓存，失败时丢弃
fn finish(r: &FileCacheRef, g: &mut Guard<'_>, offset: u64, pages: &[PageId], ok: bool) {
  for i in (0..pages.len()).rev() {
    let at = offset + i as u64 * PS;
    if ok {
      r.cache.mark_unbusy(g, at);
    } else {
      r.cache.discard(g, at);
    }
  }
}

/// Walk the caller range over the batch pages / 按批次页遍历调用者区间
fn for_each_span(b: &Batch, pages: &[PageId], mut f: impl FnMut(PageId, usize, usize, usize)) {
  let mut pos = b.pos;
  let mut left = b.len;
  let mut page_off = b.page_off;
  for &page in pages {
    if left == 0 {
      break;
    }
    let n = (PAGE_SIZE - page_off).min(left);
    f(page, page_off, pos, n);
    pos += n;
    left -= n;
    page_off = 0;
  }
}

pub(crate) fn read_into_cache(
  r: &FileCacheRef,
  g: &mut Guard<'_>,
  req: &mut Req<'_>,
  res: &mut Reservation,
  b: Batch,
) -> Result<()> {
  let pool = &r.ctx.pool;
  let num = pages_for(b.page_off + b.len);
  let pages = match alloc_batch(r, g, res, b.offset, num, PageState::Active) {
    Ok(p) => p,
    Err(e) => {
      pool.unreserve(res);
      return Err(e);
    }
  };
  r.push_access(b.offset, b.len, false);

  let out = MutexGuard::unlocked(g, || -> Result<()> {
    pool.unreserve(res);
    read_frames(r, req.cookie, b.offset, &pages)?;
    if req.uses_buffer() {
      for_each_span(&b, &pages, |page, page_off, pos, n| {
        req.copy_out(pos, &pool.frame(page).read()[page_off..page_off + n]);
      });
    }
    Ok(())
  });

  if let Err(e) = &out {
    warn!("{} read {} at {}: {e}", r.key(), b.len, b.offset);
  }
  finish(r, g, b.offset, &pages, out.is_ok());
  out?;
  reserve_next(r, g, res, b.reserve, false)
}

pub(crate) fn write_to_cache(
  r: &FileCacheRef,
  g: &mut Guard<'_>,
  req: &mut Req<'_>,
  res: &mut Reservation,
  b: Batch,
) -> Result<()> {
  let pool = &r.ctx.pool;
  let write_through = r.ctx.conf.write_through;
  let num = pages_for(b.page_off + b.len);
  let state = if write_through {
    PageState::Active
  } else {
    PageState::Modified
  };
  let pages = match alloc_batch(r, g, res, b.offset, num, state) {
    Ok(p) => p,
    Err(e) => {
      pool.unreserve(res);
      return Err(e);
    }
  };
  r.push_access(b.offset, b.len, true);
  let file_end = g.virtual_end;

  // Ok(true) when write-through failed and the pages must stay dirty
  // 透写失败、页需保持脏状态时为 Ok(true)
  let out = MutexGuard::unlocked(g, || -> Result<bool> {
    pool.unreserve(res);
    let cookie = req.cookie;

    // Keep the bytes before the write / 保留写入前的字节
    let head_read = b.page_off != 0;
    if head_read {
      read_frames(r, cookie, b.offset, &pages[..1])?;
    }

    let tail_off = (b.page_off + b.len) % PAGE_SIZE;
    if tail_off != 0 {
      let last = pages[num - 1];
      let write_end = b.offset + (b.page_off + b.len) as u64;
      if write_end == file_end {
        pool.frame(last).write().zero_from(tail_off);
      } else if !(head_read && num == 1) {
        read_frames(r, cookie, b.offset + (num as u64 - 1) * PS, &pages[num - 1..])?;
      }
    }

    for_each_span(&b, &pages, |page, page_off, pos, n| {
      req.copy_in(pos, &mut pool.frame(page).write()[page_off..page_off + n]);
    });

    let mut dirty = false;
    if write_through && let Err(e) = write_back(r, cookie, b.offset, &pages, file_end) {
      warn!("{} write through at {}: {e}", r.key(), b.offset);
      dirty = true;
    }

    Ok(dirty)
  });

  if let Ok(true) = out {
    for &page in &pages {
      pool.set_state(page, PageState::Modified);
    }
  }
  if let Err(e) = &out {
    warn!("{} write {} at {}: {e}", r.key(), b.len, b.offset);
  }
  finish(r, g, b.offset, &pages, out.is_ok());
  out?;
  reserve_next(r, g, res, b.reserve, true)
}

/// Reserve for the next batch once this one's pages are no longer busy,
/// so they can be stolen back when the pool runs short
/// 本批页解除忙状态后再为下一批预留，页池不足时这些页可被回收
fn reserve_next(
  r: &FileCacheRef,
  g: &mut Guard<'_>,
  res: &mut Reservation,
  n: usize,
  is_write: bool,
) -> Result<()> {
  if n == 0 {
    return Ok(());
  }
  MutexGuard::unlocked(g, || reserve_pages(r, res, n, is_write))
}

/// Gather write of freshly drained pages, clipped to `end`
/// 聚集写出刚写入的页，截断到 `end`
fn write_back(r: &FileCacheRef, cookie: Cookie, offset: u64, pages: &[PageId], end: u64) -> Result<()> {
  let frames: Vec<_> = pages.iter().map(|&p| r.ctx.pool.frame(p).read()).collect();
  let vecs: Vec<&[u8]> = frames
    .iter()
    .enumerate()
    .filter_map(|(i, f)| {
      let len = end
        .saturating_sub(offset + i as u64 * PS)
        .min(PS) as usize;
      (len > 0).then(|| &f[..len])
    })
    .collect();
  let want = vecs_len(&vecs);
  let done = r.vnode().write_pages(cookie, offset, &vecs)?;
  if done < want {
    return Err(Error::ShortWrite { offset, want, done });
  }
  Ok(())
}
