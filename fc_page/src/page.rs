//! Page identity and state 页面标识与状态

/// Index of a page in the pool arena / 页在池中的下标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct PageId(pub u32);

impl PageId {
  #[inline(always)]
  pub const fn idx(self) -> usize {
    self.0 as usize
  }
}

/// Page state, one queue per state
/// 页面状态，每个状态对应一个队列
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PageState {
  /// Unused, content undefined / 空闲，内容未定义
  Free = 0,
  /// Unused, content zeroed / 空闲，内容已清零
  Clear,
  /// Cached, clean / 已缓存，干净
  Active,
  /// Cached, clean, cold / 已缓存，干净，冷
  Inactive,
  /// Cached, newer than storage / 已缓存，比存储新
  Modified,
  /// Pinned for the system / 系统固定
  Wired,
  /// Taken out of circulation / 退出流通
  Unused,
}

/// Number of page states / 页面状态数
pub const STATE_COUNT: usize = 7;

impl PageState {
  pub const ALL: [PageState; STATE_COUNT] = [
    PageState::Free,
    PageState::Clear,
    PageState::Active,
    PageState::Inactive,
    PageState::Modified,
    PageState::Wired,
    PageState::Unused,
  ];

  #[inline(always)]
  pub const fn idx(self) -> usize {
    self as usize
  }

  /// Free or Clear / 空闲或已清零
  #[inline(always)]
  pub const fn is_unused(self) -> bool {
    matches!(self, PageState::Free | PageState::Clear)
  }

  /// Clean cached page that may be dropped without write-back
  /// 可直接丢弃无需回写的干净缓存页
  #[inline(always)]
  pub const fn is_clean_cached(self) -> bool {
    matches!(self, PageState::Active | PageState::Inactive)
  }
}

/// System-wide low memory level / 系统低内存等级
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LowMemory {
  #[default]
  None,
  Note,
  Warning,
  Critical,
}
