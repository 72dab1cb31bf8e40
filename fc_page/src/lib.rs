#![cfg_attr(docsrs, feature(doc_cfg))]

//! Page queue manager for the file cache
//! 文件缓存的页队列管理器
//!
//! Owns every page frame, keeps one intrusive queue per page state and hands
//! out pages against reservations.
//! 持有全部页帧，每种页面状态一个侵入式队列，并按预留分配页面。

mod conf;
mod consts;
mod error;
mod frame;
mod page;
mod pool;
mod queue;

pub use conf::PoolConf;
pub use consts::{
  PAGE_MASK, PAGE_SHIFT, PAGE_SIZE, USAGE_HOT, page_align_down, page_align_up, pages_for,
};
pub use error::{Error, Result};
pub use frame::Frame;
pub use page::{LowMemory, PageId, PageState, STATE_COUNT};
pub use pool::{PagePool, PoolStats, Reclaim, Reservation};
