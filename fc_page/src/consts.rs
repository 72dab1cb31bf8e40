//! 常量定义 Constants

/// Page size 4KB / 页大小
pub const PAGE_SIZE: usize = 4096;

/// log2(PAGE_SIZE)
pub const PAGE_SHIFT: u32 = 12;

/// Mask of the in-page offset / 页内偏移掩码
pub const PAGE_MASK: u64 = PAGE_SIZE as u64 - 1;

/// Usage count of a page that was just touched / 刚被访问页面的使用计数
pub const USAGE_HOT: u8 = 64;

/// Align down to page boundary / 向下页对齐
#[inline(always)]
pub const fn page_align_down(offset: u64) -> u64 {
  offset & !PAGE_MASK
}

/// Align up to page boundary / 向上页对齐
#[inline(always)]
pub const fn page_align_up(offset: u64) -> u64 {
  (offset + PAGE_MASK) & !PAGE_MASK
}

/// Pages needed to cover `bytes` / 覆盖 `bytes` 所需页数
#[inline(always)]
pub const fn pages_for(bytes: usize) -> usize {
  bytes.div_ceil(PAGE_SIZE)
}
