//! Error types for fc_page
//! fc_page 错误类型

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
  #[error("out of pages")]
  NoMemory,
}

pub type Result<T> = std::result::Result<T, Error>;
