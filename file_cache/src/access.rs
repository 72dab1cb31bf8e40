//! Access pattern tracker 访问模式追踪
//!
//! Remembers where the last few operations ended, the sign telling reads
//! (positive) from writes (negative). A slot is reset to zero when the next
//! operation in the same direction does not start where it ended.
//! 记录最近几次操作的结束位置，正数为读、负数为写。
//! 同方向的下一次操作不从该位置开始时，该槽清零。

use std::ops::Range;

use fc_page::{PAGE_SHIFT, page_align_down};

/// Ring slots / 环形槽数
pub const LAST_ACCESSES: usize = 3;

#[derive(Debug, Clone, Default)]
pub struct AccessRing {
  last: [i64; LAST_ACCESSES],
  index: usize,
}

#[inline]
const fn prev(i: usize) -> usize {
  (i + LAST_ACCESSES - 1) % LAST_ACCESSES
}

impl AccessRing {
  #[inline]
  fn get(&self, i: usize, is_write: bool) -> i64 {
    if is_write { -self.last[i] } else { self.last[i] }
  }

  /// Record an operation of `bytes` at `offset` / 记录一次操作
  pub fn push(&mut self, offset: i64, bytes: i64, is_write: bool) {
    let index = self.index;
    let previous = prev(index);
    if offset != self.get(previous, is_write) {
      self.last[previous] = 0;
    }
    let end = offset + bytes;
    self.last[index] = if is_write { -end } else { end };
    self.index = (index + 1) % LAST_ACCESSES;
  }

  /// The oldest slot survived, so the operations after it continued it
  /// 最旧槽未被清零，即其后的操作与之衔接
  #[inline]
  pub fn is_sequential(&self) -> bool {
    self.last[self.index] != 0
  }

  /// Pages written since the oldest tracked write, up to the latest write
  /// 从最旧记录的写结束到最近一次写结束之间的页
  pub fn write_back_range(&self) -> Option<Range<u64>> {
    let from = self.get(self.index, true);
    let to = self.get(prev(self.index), true);
    if from < 0 || to <= from {
      return None;
    }
    let from = page_align_down(from as u64);
    let to = (to as u64 >> PAGE_SHIFT) << PAGE_SHIFT;
    (from < to).then_some(from..to)
  }
}
