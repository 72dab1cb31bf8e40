//! Host file as a node, positional I/O without a shared seek position
//! 宿主文件节点，使用定位 I/O，无共享读写位置

use std::{
  fs::{File, OpenOptions},
  io::ErrorKind,
  os::unix::fs::FileExt,
  path::Path,
  sync::Arc,
};

use crate::{Cookie, NodeKey, Result, Vnode};

#[derive(Debug, Clone)]
pub struct FileVnode {
  key: NodeKey,
  file: Arc<File>,
}

impl FileVnode {
  /// Open read-write, creating the file if missing / 读写打开，不存在则创建
  pub fn open(key: NodeKey, path: impl AsRef<Path>) -> Result<Self> {
    let file = OpenOptions::new()
      .read(true)
      .write(true)
      .create(true)
      .truncate(false)
      .open(path.as_ref())?;
    Ok(Self {
      key,
      file: Arc::new(file),
    })
  }

  pub fn len(&self) -> Result<u64> {
    Ok(self.file.metadata()?.len())
  }

  pub fn is_empty(&self) -> Result<bool> {
    Ok(self.len()? == 0)
  }

  pub fn sync(&self) -> Result<()> {
    self.file.sync_all()?;
    Ok(())
  }
}

impl Vnode for FileVnode {
  fn key(&self) -> NodeKey {
    self.key
  }

  fn read_pages(&self, _cookie: Cookie, offset: u64, vecs: &mut [&mut [u8]]) -> Result<usize> {
    let mut pos = offset;
    let mut done = 0;
    'vecs: for v in vecs.iter_mut() {
      let mut filled = 0;
      while filled < v.len() {
        match self.file.read_at(&mut v[filled..], pos) {
          Ok(0) => break 'vecs,
          Ok(n) => {
            filled += n;
            pos += n as u64;
            done += n;
          }
          Err(e) if e.kind() == ErrorKind::Interrupted => {}
          Err(e) => return Err(e.into()),
        }
      }
    }
    Ok(done)
  }

  fn write_pages(&self, _cookie: Cookie, offset: u64, vecs: &[&[u8]]) -> Result<usize> {
    let mut pos = offset;
    for v in vecs {
      self.file.write_all_at(v, pos)?;
      pos += v.len() as u64;
    }
    Ok((pos - offset) as usize)
  }

  fn set_size(&self, size: u64) -> Result<()> {
    self.file.set_len(size)?;
    Ok(())
  }
}
