//! Pluggable cache module and control ops 可插拔缓存模块与控制操作

use std::sync::Arc;

use fc_vnode::{NodeKey, Vnode};

use crate::{Error, Result};

/// Hooks for launch and boot heuristics, every hook defaults to a no-op
/// 启动加速启发式的钩子，默认均为空操作
pub trait CacheModule: Send + Sync {
  /// `size` is the cached file size or -1 / `size` 为缓存的文件大小或 -1
  fn node_opened(
    &self,
    _vnode: Option<&Arc<dyn Vnode>>,
    _fd_type: i32,
    _key: NodeKey,
    _parent: u64,
    _name: Option<&str>,
    _size: i64,
  ) {
  }

  fn node_closed(
    &self,
    _vnode: Option<&Arc<dyn Vnode>>,
    _fd_type: i32,
    _key: NodeKey,
    _access_type: i32,
  ) {
  }

  fn node_launched(&self, _args: &[&str]) {}
}

/// No module installed / 未安装模块
#[derive(Debug, Default, Clone, Copy)]
pub struct NoModule;

impl CacheModule for NoModule {}

/// Control operation / 控制操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control<'a> {
  /// Accepted and logged, drops nothing / 接受并记录日志，不丢弃任何内容
  Clear,
  /// Remove the current module, then install the named one if any
  /// 移除当前模块，如指定名称则安装该模块
  SetModule(Option<&'a str>),
}

impl<'a> Control<'a> {
  pub const CLEAR: u32 = 0;
  pub const SET_MODULE: u32 = 1;

  /// Decode a numeric op / 解码数字操作码
  pub fn from_code(code: u32, arg: Option<&'a str>) -> Result<Self> {
    match code {
      Self::CLEAR => Ok(Control::Clear),
      Self::SET_MODULE => Ok(Control::SetModule(arg)),
      _ => Err(Error::BadHandler(code)),
    }
  }
}
