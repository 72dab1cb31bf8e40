#![cfg_attr(docsrs, feature(doc_cfg))]
//! Per-file VM cache
//! 单文件 VM 缓存
//!
//! Owns the pages resident for one node, keyed by page-aligned offset.
//! A page marked busy belongs to the I/O step that set the flag; everyone
//! else waits on the not-busy condition and re-checks.
//! 持有单个节点的驻留页，以页对齐偏移为键。
//! 忙页归设置该标志的 I/O 步骤独占，其他访问者等待非忙条件后重新检查。

mod cache;
mod error;
mod state;

pub use cache::{Guard, VmCache};
pub use error::{Error, Result};
pub use state::{Entry, VmState};
