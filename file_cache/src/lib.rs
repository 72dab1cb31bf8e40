#![cfg_attr(docsrs, feature(doc_cfg))]
//! Page cache I/O engine
//! 页缓存 I/O 引擎
//!
//! Mediates between a file's byte-addressed reads and writes and the
//! page-granular VM cache behind it: resident pages are copied in place,
//! missing runs are filled or drained with one vectored store call per
//! batch, large requests under memory pressure go straight to the store,
//! and prefetch populates pages ahead of demand.
//! 在文件的按字节读写与其后的按页 VM 缓存之间居中协调：驻留页原地复制，
//! 缺失段每批一次向量化存储调用完成填充或写入，内存紧张时大请求直达存储，
//! 预取则提前填充页面。

mod access;
mod bypass;
mod cache;
mod conf;
mod error;
mod file_ref;
mod fill;
mod io;
mod io_queue;
mod module;
mod precache;
mod reserve;

pub use access::{AccessRing, LAST_ACCESSES};
pub use cache::FileCache;
pub use conf::Conf;
pub use error::{Error, Result};
pub use fc_page::{LowMemory, PAGE_SIZE, PagePool, PoolConf};
pub use fc_vnode::{Cookie, NodeKey, Vfs, Vnode};
pub use file_ref::FileCacheRef;
pub use module::{CacheModule, Control, NoModule};
