#![cfg_attr(docsrs, feature(doc_cfg))]
//! Backing store seen by the file cache
//! 文件缓存所见的后端存储
//!
//! A [`Vnode`] moves bytes between page-sized buffers and storage with one
//! vectored call per batch. [`Vfs`] resolves `(dev, ino)` to a node.
//! [`Vnode`] 以每批一次向量化调用在页大小缓冲区与存储之间传输字节。
//! [`Vfs`] 将 `(dev, ino)` 解析为节点。

mod error;
mod file;
mod mem;
mod vfs;
mod vnode;

pub use error::{Error, Result};
pub use file::FileVnode;
pub use mem::{MemVnode, SCRIBBLE, VnodeStats};
pub use vfs::{MemVfs, Vfs};
pub use vnode::{Cookie, NodeKey, Vnode, vecs_len};
