//! Pool configuration 页池配置

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConf {
  /// Pages in the arena / 页池总页数
  pub pages: usize,
  /// Unused percentage at or below which memory is low (note)
  /// 空闲比例不高于此值时为低内存（提示）
  pub note_pct: usize,
  /// 警告 Warning level
  pub warning_pct: usize,
  /// 严重 Critical level
  pub critical_pct: usize,
  /// Max wait per round while a reservation is short (ms)
  /// 预留不足时每轮最长等待（毫秒）
  pub reserve_wait_ms: u64,
}

impl Default for PoolConf {
  fn default() -> Self {
    Self {
      pages: 4096, // 16MB
      note_pct: 10,
      warning_pct: 5,
      critical_pct: 2,
      reserve_wait_ms: 10,
    }
  }
}

impl PoolConf {
  #[inline]
  pub fn with_pages(pages: usize) -> Self {
    Self {
      pages,
      ..Self::default()
    }
  }
}
