//! Engine configuration 引擎配置

use fc_page::PAGE_SIZE;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Conf {
  /// Pages per vectored store call / 每次向量化存储调用的页数
  pub max_io_vecs: usize,
  /// Requests at least this large may skip the cache under pressure
  /// 不小于此值的请求在内存紧张时可绕过缓存
  pub bypass_io_size: usize,
  /// Pages between re-choosing cache or bypass / 重新选择缓存或绕过路径的页间隔
  pub reevaluate_pages: usize,
  /// Write drained pages to the store at once / 立即将写入页落盘
  pub write_through: bool,
  /// Vectors per zero-fill store call / 每次写零调用的向量数
  pub zero_vec_count: usize,
  /// Skip prefetch once this fraction of the file is resident
  /// 驻留比例达到此值后跳过预取
  pub prefetch_max_fraction: (usize, usize),
  /// Required prefix of cache module names / 缓存模块名必需前缀
  pub module_prefix: String,
}

impl Default for Conf {
  fn default() -> Self {
    Self {
      max_io_vecs: 32,
      bypass_io_size: 64 * 1024,
      reevaluate_pages: 32,
      write_through: false,
      zero_vec_count: 32,
      prefetch_max_fraction: (2, 3),
      module_prefix: "file_cache".into(),
    }
  }
}

impl Conf {
  /// Bytes in one gap batch / 单个缺口批次字节数
  #[inline]
  pub fn max_chunk(&self) -> usize {
    self.max_io_vecs * PAGE_SIZE
  }

  /// Bytes per zero-fill store call / 每次写零调用字节数
  #[inline]
  pub fn zero_vec_size(&self) -> usize {
    self.zero_vec_count * PAGE_SIZE
  }
}
