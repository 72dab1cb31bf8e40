//! Page frame: one page-aligned, page-sized block of memory
//! 页帧：一块页对齐、页大小的内存

use std::{
  alloc::{Layout, alloc_zeroed, dealloc},
  fmt::{Debug, Formatter, Result as FmtResult},
  ops::{Deref, DerefMut},
  ptr::NonNull,
  slice::{from_raw_parts, from_raw_parts_mut},
};

use crate::{Error, PAGE_SIZE, Result};

static FRAME_LAYOUT: Layout = unsafe { Layout::from_size_align_unchecked(PAGE_SIZE, PAGE_SIZE) };

/// Owned page frame, zeroed on creation
/// 拥有所有权的页帧，创建时清零
pub struct Frame {
  ptr: NonNull<u8>,
}

// SAFETY: Frame owns its memory exclusively, access goes through &/&mut
// 安全：Frame 独占内存，访问经由 &/&mut
unsafe impl Send for Frame {}
unsafe impl Sync for Frame {}

impl Frame {
  /// Allocate one zeroed page / 分配一个清零页
  #[inline]
  pub fn page() -> Result<Self> {
    let ptr = unsafe { alloc_zeroed(FRAME_LAYOUT) };
    let ptr = NonNull::new(ptr).ok_or(Error::NoMemory)?;
    Ok(Self { ptr })
  }

  /// Zero `[from, PAGE_SIZE)` / 清零 `[from, PAGE_SIZE)`
  #[inline]
  pub fn zero_from(&mut self, from: usize) {
    if from < PAGE_SIZE {
      self[from..].fill(0);
    }
  }
}

impl Drop for Frame {
  fn drop(&mut self) {
    unsafe { dealloc(self.ptr.as_ptr(), FRAME_LAYOUT) }
  }
}

impl Deref for Frame {
  type Target = [u8];

  #[inline]
  fn deref(&self) -> &[u8] {
    unsafe { from_raw_parts(self.ptr.as_ptr(), PAGE_SIZE) }
  }
}

impl DerefMut for Frame {
  #[inline]
  fn deref_mut(&mut self) -> &mut [u8] {
    unsafe { from_raw_parts_mut(self.ptr.as_ptr(), PAGE_SIZE) }
  }
}

impl Debug for Frame {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    f.debug_struct("Frame").field("ptr", &self.ptr).finish()
  }
}
