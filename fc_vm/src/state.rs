//! Lock-protected cache state 受锁保护的缓存状态

use std::{collections::BTreeMap, ops::Range};

use fc_page::PageId;

/// Page slot in the cache / 缓存中的页槽
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
  pub page: PageId,
  /// Owned by an in-flight I/O step / 被进行中的 I/O 步骤独占
  pub busy: bool,
}

#[derive(Debug, Default)]
pub struct VmState {
  /// File size as the cache sees it / 缓存视角的文件大小
  pub virtual_end: u64,
  /// Live memory mappings / 活动内存映射数
  pub mappings: u32,
  /// Caches layered on top of this one / 叠加在本缓存之上的缓存数
  pub consumers: u32,
  pages: BTreeMap<u64, Entry>,
}

impl VmState {
  #[inline]
  pub fn lookup(&self, offset: u64) -> Option<Entry> {
    self.pages.get(&offset).copied()
  }

  /// Panics if `offset` is already occupied / `offset` 已占用时 panic
  pub fn insert(&mut self, offset: u64, page: PageId, busy: bool) {
    let prev = self.pages.insert(offset, Entry { page, busy });
    assert!(prev.is_none(), "page already cached at {offset}");
  }

  #[inline]
  pub fn remove(&mut self, offset: u64) -> Option<Entry> {
    self.pages.remove(&offset)
  }

  /// Panics if no page is cached at `offset` / `offset` 无页时 panic
  pub fn set_busy(&mut self, offset: u64, busy: bool) {
    match self.pages.get_mut(&offset) {
      Some(e) => e.busy = busy,
      None => panic!("no page cached at {offset}"),
    }
  }

  #[inline]
  pub fn page_count(&self) -> usize {
    self.pages.len()
  }

  #[inline]
  pub fn pages(&self) -> impl Iterator<Item = (u64, Entry)> + '_ {
    self.pages.iter().map(|(&o, &e)| (o, e))
  }

  #[inline]
  pub fn range(&self, range: Range<u64>) -> impl Iterator<Item = (u64, Entry)> + '_ {
    self.pages.range(range).map(|(&o, &e)| (o, e))
  }

  /// First busy page at or past `from` / `from` 及之后首个忙页
  pub(crate) fn first_busy_from(&self, from: u64) -> Option<u64> {
    self
      .pages
      .range(from..)
      .find(|(_, e)| e.busy)
      .map(|(&o, _)| o)
  }

  #[inline]
  pub fn any_busy(&self) -> bool {
    self.pages.values().any(|e| e.busy)
  }

  pub(crate) fn split_off(&mut self, from: u64) -> BTreeMap<u64, Entry> {
    self.pages.split_off(&from)
  }

  pub(crate) fn take_all(&mut self) -> BTreeMap<u64, Entry> {
    std::mem::take(&mut self.pages)
  }
}
