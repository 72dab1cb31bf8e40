use std::sync::Arc;

use aok::{OK, Void};
use fc_vnode::{Cookie, FileVnode, MemVfs, MemVnode, NodeKey, SCRIBBLE, Vfs, Vnode};
use log::info;

#[static_init::constructor(0)]
extern "C" fn _log_init() {
  log_init::init();
}

const KEY: NodeKey = NodeKey::new(1, 7);

#[test]
fn test_mem_scatter_gather() -> Void {
  let node = MemVnode::new(KEY, (0..10u8).collect());
  let mut a = [0u8; 4];
  let mut b = [0u8; 4];
  let n = node.read_pages(Cookie(0), 3, &mut [&mut a[..], &mut b[..]])?;
  assert_eq!(n, 7);
  assert_eq!(a, [3, 4, 5, 6]);
  assert_eq!(&b[..3], &[7, 8, 9]);
  assert_eq!(b[3], 0);

  let n = node.write_pages(Cookie(0), 8, &[&[1, 1][..], &[2, 2][..]])?;
  assert_eq!(n, 4);
  assert_eq!(node.len(), 12);
  assert_eq!(&node.contents()[8..], &[1, 1, 2, 2]);

  let s = node.stats();
  assert_eq!(s.reads, 1);
  assert_eq!(s.writes, 1);
  assert_eq!(s.read_bytes, 7);
  assert_eq!(s.written_bytes, 4);
  OK
}

#[test]
fn test_mem_scribble_and_faults() -> Void {
  let node = MemVnode::new(KEY, vec![9; 3]);
  node.set_scribble(true);
  let mut buf = [0u8; 8];
  assert_eq!(node.read_pages(Cookie(0), 0, &mut [&mut buf[..]])?, 3);
  assert_eq!(buf, [9, 9, 9, SCRIBBLE, SCRIBBLE, SCRIBBLE, SCRIBBLE, SCRIBBLE]);

  node.set_fail_reads(true);
  assert!(node.read_pages(Cookie(0), 0, &mut [&mut buf[..]]).is_err());
  node.set_fail_writes(true);
  assert!(node.write_pages(Cookie(0), 0, &[&buf[..]]).is_err());
  assert_eq!(node.contents(), vec![9; 3]);
  OK
}

#[test]
fn test_file_vnode() -> Void {
  let dir = tempfile::tempdir()?;
  let path = dir.path().join("node");
  let node = FileVnode::open(KEY, &path)?;
  assert!(node.is_empty()?);

  let n = node.write_pages(Cookie(0), 4, &[b"abc".as_slice(), b"def".as_slice()])?;
  assert_eq!(n, 6);
  assert_eq!(node.len()?, 10);

  let mut a = [0xffu8; 6];
  let mut b = [0xffu8; 6];
  let n = node.read_pages(Cookie(0), 2, &mut [&mut a[..], &mut b[..]])?;
  assert_eq!(n, 8);
  assert_eq!(&a, b"\0\0abcd");
  assert_eq!(&b[..2], b"ef");
  // Past end stays untouched / 末尾之后保持原样
  assert_eq!(&b[2..], &[0xff; 4]);

  node.set_size(5)?;
  assert_eq!(node.len()?, 5);
  node.sync()?;
  info!("file vnode ok at {}", path.display());
  OK
}

#[test]
fn test_mem_vfs() -> Void {
  let vfs = MemVfs::new();
  assert!(vfs.is_empty());
  vfs.add(Arc::new(MemVnode::zeroed(KEY, 16)));
  assert_eq!(vfs.len(), 1);
  let node = vfs.lookup(KEY).unwrap();
  assert_eq!(node.key(), KEY);
  assert!(vfs.lookup(NodeKey::new(1, 8)).is_none());
  assert!(vfs.remove(KEY).is_some());
  assert!(vfs.lookup(KEY).is_none());
  OK
}
