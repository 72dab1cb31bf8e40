//! VM cache errors VM 缓存错误

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
  #[error("store: {0}")]
  Store(#[from] fc_vnode::Error),

  #[error("short write at {offset}: {done}/{want}")]
  ShortWrite { offset: u64, want: usize, done: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
