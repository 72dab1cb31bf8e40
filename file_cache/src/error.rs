//! File cache errors 文件缓存错误

use fc_vnode::NodeKey;
use hipstr::HipStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
  #[error("out of pages")]
  NoMemory,

  #[error("store: {0}")]
  Io(#[from] fc_vnode::Error),

  #[error("short write at {offset}: {done}/{want}")]
  ShortWrite { offset: u64, want: usize, done: usize },

  #[error("bad value: {0}")]
  BadValue(HipStr<'static>),

  #[error("node {0} not found")]
  NotFound(NodeKey),

  #[error("module {0} not found")]
  ModuleNotFound(HipStr<'static>),

  #[error("unknown control op {0}")]
  BadHandler(u32),
}

impl From<fc_page::Error> for Error {
  fn from(e: fc_page::Error) -> Self {
    match e {
      fc_page::Error::NoMemory => Error::NoMemory,
    }
  }
}

impl From<fc_vm::Error> for Error {
  fn from(e: fc_vm::Error) -> Self {
    match e {
      fc_vm::Error::Store(e) => Error::Io(e),
      fc_vm::Error::ShortWrite { offset, want, done } => Error::ShortWrite { offset, want, done },
    }
  }
}

impl Error {
  #[inline]
  pub(crate) fn bad(msg: &'static str) -> Self {
    Error::BadValue(HipStr::borrowed(msg))
  }
}

pub type Result<T> = std::result::Result<T, Error>;
