//! Bypass: caller buffer straight to the store, no cache pages touched
//! 绕过缓存：调用者缓冲区直达存储，不触碰缓存页
//!
//! Keeps the same reservation and access bookkeeping as the cache path.
//! 与缓存路径保持相同的预留与访问记录约定。

use std::sync::Arc;

use fc_page::{PAGE_SIZE, Reservation};
use fc_vm::Guard;
use fc_vnode::{Cookie, Vnode};
use parking_lot::MutexGuard;

use crate::{
  Error, FileCacheRef, Result,
  cache::Ctx,
  io::{Batch, Buf, Req},
  reserve::reserve_pages,
};

pub(crate) fn read_from_file(
  r: &FileCacheRef,
  g: &mut Guard<'_>,
  req: &mut Req<'_>,
  res: &mut Reservation,
  b: Batch,
) -> Result<()> {
  r.push_access(b.offset, b.len, false);
  let pool = &r.ctx.pool;
  MutexGuard::unlocked(g, || -> Result<()> {
    pool.unreserve(res);
    if let Buf::Read(Some(buf)) = &mut req.buf {
      let dst = &mut buf[b.pos..b.pos + b.len];
      let at = b.offset + b.page_off as u64;
      let n = r.vnode().read_pages(req.cookie, at, &mut [&mut *dst])?;
      dst[n.min(b.len)..].fill(0);
    }
    reserve_pages(r, res, b.reserve, false)
  })
}

pub(crate) fn write_to_file(
  r: &FileCacheRef,
  g: &mut Guard<'_>,
  req: &mut Req<'_>,
  res: &mut Reservation,
  b: Batch,
) -> Result<()> {
  r.push_access(b.offset, b.len, true);
  let pool = &r.ctx.pool;
  MutexGuard::unlocked(g, || -> Result<()> {
    pool.unreserve(res);
    let at = b.offset + b.page_off as u64;
    let done = match &req.buf {
      Buf::Write(Some(buf)) => {
        r.vnode()
          .write_pages(req.cookie, at, &[&buf[b.pos..b.pos + b.len]])?
      }
      _ => write_zeros(&r.ctx, r.vnode(), req.cookie, at, b.len)?,
    };
    if done < b.len {
      return Err(Error::ShortWrite {
        offset: at,
        want: b.len,
        done,
      });
    }
    reserve_pages(r, res, b.reserve, true)
  })
}

/// Write `len` zero bytes from the shared zero page, returns bytes written
/// 用共享零页写入 `len` 个零字节，返回写入字节数
///
/// Stops early when the store accepts nothing.
/// 存储不再接受数据时提前结束。
pub(crate) fn write_zeros(
  ctx: &Ctx,
  vnode: &Arc<dyn Vnode>,
  cookie: Cookie,
  offset: u64,
  len: usize,
) -> Result<usize> {
  let zero = ctx.pool.frame(ctx.zero).read();
  let chunk = ctx.conf.zero_vec_size();
  let mut done = 0;
  while done < len {
    let n = chunk.min(len - done);
    let mut vecs: Vec<&[u8]> = vec![&zero[..]; n / PAGE_SIZE];
    if n % PAGE_SIZE != 0 {
      vecs.push(&zero[..n % PAGE_SIZE]);
    }
    let written = vnode.write_pages(cookie, offset + done as u64, &vecs)?;
    if written == 0 {
      break;
    }
    done += written;
  }
  Ok(done)
}
