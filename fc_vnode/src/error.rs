//! Store errors 存储错误

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
  #[error("io: {0}")]
  Io(#[from] std::io::Error),

  #[error("injected {0} failure")]
  Injected(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
