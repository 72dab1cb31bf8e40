use std::{
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  thread,
};

use aok::{OK, Void};
use fc_page::PageState;
use fc_vnode::{FileVnode, MemVfs, MemVnode};
use file_cache::{
  AccessRing, CacheModule, Conf, Control, Cookie, Error, FileCache, FileCacheRef, LowMemory, NodeKey,
  PAGE_SIZE, PagePool, PoolConf, Vnode,
};
use log::info;
use parking_lot::Mutex;

#[static_init::constructor(0)]
extern "C" fn _log_init() {
  log_init::init();
}

const PS: usize = PAGE_SIZE;
const DEV: u32 = 1;
const C: Cookie = Cookie(0);

struct Env {
  fc: FileCache,
  vfs: Arc<MemVfs>,
}

fn env_with(pages: usize, conf: Conf) -> Env {
  let pool = Arc::new(PagePool::new(PoolConf::with_pages(pages)).unwrap());
  let vfs = Arc::new(MemVfs::new());
  let fc = FileCache::new(conf, pool, vfs.clone()).unwrap();
  Env { fc, vfs }
}

fn env(pages: usize) -> Env {
  env_with(pages, Conf::default())
}

impl Env {
  fn pool(&self) -> &Arc<PagePool> {
    self.fc.pool()
  }

  fn add(&self, ino: u64, data: Vec<u8>) -> Arc<MemVnode> {
    let node = Arc::new(MemVnode::new(NodeKey::new(DEV, ino), data));
    self.vfs.add(node.clone());
    node
  }

  /// Node plus a cache sized to its contents
  fn open(&self, ino: u64, data: Vec<u8>) -> (Arc<MemVnode>, Arc<FileCacheRef>) {
    let size = data.len() as i64;
    let node = self.add(ino, data);
    let f = self.fc.create(DEV, ino, size).unwrap();
    (node, f)
  }

  fn assert_reservations_balanced(&self) {
    let s = self.pool().stats();
    assert_eq!(s.reserved, s.unreserved + s.consumed);
    assert_eq!(self.pool().reserved(), 0);
  }
}

fn pattern(len: usize, seed: u8) -> Vec<u8> {
  (0..len).map(|i| ((i % 251) as u8) ^ seed).collect()
}

fn pages(f: &FileCacheRef) -> usize {
  f.cache().lock().page_count()
}

#[test]
fn test_read_spans_partial_last_page() -> Void {
  let e = env(256);
  let data = pattern(10000, 0x5a);
  let (node, f) = e.open(1, data.clone());

  let mut buf = vec![0u8; 10000];
  assert_eq!(f.read(C, 0, &mut buf)?, 10000);
  assert_eq!(buf, data);
  assert_eq!(pages(&f), 3);
  // One vectored call for the whole gap / 整个缺口一次向量化调用
  assert_eq!(node.stats().reads, 1);

  // Resident now / 已驻留
  let mut again = vec![0u8; 10000];
  assert_eq!(f.read(C, 0, &mut again)?, 10000);
  assert_eq!(again, data);
  assert_eq!(node.stats().reads, 1);

  // Clipped at end of file / 截断到文件末尾
  let mut tail = vec![0u8; 500];
  assert_eq!(f.read(C, 9800, &mut tail)?, 200);
  assert_eq!(&tail[..200], &data[9800..]);
  e.assert_reservations_balanced();
  OK
}

#[test]
fn test_gap_flushed_before_resident_page() -> Void {
  let e = env(256);
  let data = pattern(71 * PS, 0x17);
  let (node, f) = e.open(42, data.clone());
  let mut one = [0u8; 10];
  assert_eq!(f.read(C, 5 * PS as i64, &mut one)?, 10);
  assert_eq!(node.stats().reads, 1);

  // [0,5) before page 5, then [6,38) and [38,70) at the 32 page cap, then [70]
  // 页 5 之前提交 [0,5)，随后按 32 页上限提交 [6,38)、[38,70)，最后 [70]
  let len = 70 * PS;
  let mut buf = vec![0u8; len];
  assert_eq!(f.read(C, 10, &mut buf)?, len);
  assert!(buf[..] == data[10..10 + len]);
  assert_eq!(node.stats().reads, 5);
  assert_eq!(pages(&f), 71);
  e.assert_reservations_balanced();
  OK
}

#[test]
fn test_null_buffer_write_keeps_head() -> Void {
  let e = env(256);
  let (node, f) = e.open(2, vec![0x11; 2 * PS]);

  assert_eq!(f.write(C, 2048, None, 4096)?, 4096);
  let mut buf = vec![0u8; 2 * PS];
  assert_eq!(f.read(C, 0, &mut buf)?, 2 * PS);
  assert!(buf[..2048].iter().all(|&b| b == 0x11));
  assert!(buf[2048..6144].iter().all(|&b| b == 0));
  assert!(buf[6144..].iter().all(|&b| b == 0x11));
  assert_eq!(e.pool().count(PageState::Modified), 2);

  f.sync()?;
  assert_eq!(node.contents(), buf);
  assert_eq!(e.pool().count(PageState::Modified), 0);
  OK
}

#[test]
fn test_disable_flushes_and_bypasses_pages() -> Void {
  let e = env(256);
  let (node, f) = e.open(3, vec![0; 5 * PS]);
  let data = pattern(5 * PS, 7);

  assert_eq!(f.write(C, 0, Some(&data[..]), data.len())?, data.len());
  // Whole pages up to the end need no read before write / 整页写到末尾无需预读
  assert_eq!(node.stats().reads, 0);
  assert_eq!(e.pool().count(PageState::Modified), 5);

  f.disable()?;
  assert!(!f.is_enabled());
  assert_eq!(pages(&f), 0);
  assert_eq!(e.pool().count(PageState::Modified), 0);
  assert_eq!(node.contents(), data);

  let allocated = e.pool().stats().allocated;
  let other = pattern(3 * PS + 10, 9);
  assert_eq!(f.write(C, 100, Some(&other[..]), other.len())?, other.len());
  let mut buf = vec![0u8; other.len()];
  assert_eq!(f.read(C, 100, &mut buf)?, other.len());
  assert_eq!(buf, other);
  assert_eq!(f.populate(C, 0, PS)?, 0);
  assert_eq!(f.write(C, 0, None, 50)?, 50);
  assert_eq!(e.pool().stats().allocated, allocated);
  assert_eq!(pages(&f), 0);
  assert!(node.contents()[..50].iter().all(|&b| b == 0));

  f.enable();
  assert!(f.is_enabled());
  let mut buf = vec![0u8; 10];
  f.read(C, 0, &mut buf)?;
  assert_eq!(pages(&f), 1);
  OK
}

#[test]
fn test_disable_nests() -> Void {
  let e = env(256);
  let (node, f) = e.open(4, vec![0; PS]);
  f.write(C, 0, Some(&[1; 8][..]), 8)?;
  f.disable()?;
  let writes = node.stats().writes;
  f.disable()?;
  assert_eq!(node.stats().writes, writes);
  f.enable();
  assert!(!f.is_enabled());
  f.enable();
  assert!(f.is_enabled());
  OK
}

#[test]
#[should_panic(expected = "enable on enabled")]
fn test_enable_unbalanced_panics() {
  let e = env(256);
  let (_, f) = e.open(5, vec![0; PS]);
  f.enable();
}

#[test]
fn test_disable_error_stays_enabled() -> Void {
  let e = env(256);
  let (node, f) = e.open(6, vec![0; 2 * PS]);
  f.write(C, 0, Some(&[3; 100][..]), 100)?;
  node.set_fail_writes(true);
  assert!(matches!(f.disable(), Err(Error::Io(_))));
  assert!(f.is_enabled());
  assert_eq!(e.pool().count(PageState::Modified), 1);

  node.set_fail_writes(false);
  f.disable()?;
  assert_eq!(&node.contents()[..100], &[3; 100]);
  OK
}

#[test]
fn test_shrink_zeroes_partial_page() -> Void {
  let e = env(256);
  let (node, f) = e.open(7, vec![0; 20000]);
  let data = pattern(20000, 0x33);
  assert_eq!(f.write(C, 0, Some(&data[..]), data.len())?, data.len());
  assert_eq!(pages(&f), 5);

  f.set_size(5000)?;
  assert_eq!(f.size(), 5000);
  assert_eq!(pages(&f), 2);
  assert_eq!(node.len(), 5000);

  let mut buf = vec![0u8; 1000];
  assert_eq!(f.read(C, 4000, &mut buf)?, 1000);
  assert_eq!(buf, &data[4000..5000]);
  assert_eq!(f.read(C, 5000, &mut buf)?, 0);

  // Extend again, no stale bytes come back / 再次扩展不会带回旧数据
  f.set_size(20000)?;
  let mut buf = vec![0xffu8; 15000];
  assert_eq!(f.read(C, 5000, &mut buf)?, 15000);
  assert!(buf.iter().all(|&b| b == 0));

  f.sync()?;
  let stored = node.contents();
  assert_eq!(&stored[..5000], &data[..5000]);
  assert!(stored[5000..].iter().all(|&b| b == 0));
  assert!(matches!(f.set_size(-1), Err(Error::BadValue(_))));
  OK
}

#[test]
fn test_write_reaching_end_skips_read() -> Void {
  let e = env(256);
  let (node, f) = e.open(8, Vec::new());
  assert_eq!(f.write(C, 0, Some(&[1; 10][..]), 10)?, 0);

  f.set_size(5000)?;
  let data = pattern(5000, 1);
  assert_eq!(f.write(C, 0, Some(&data[..]), data.len())?, 5000);
  assert_eq!(node.stats().reads, 0);

  f.sync()?;
  assert_eq!(node.contents(), data);
  OK
}

#[test]
fn test_single_page_offset_write() -> Void {
  let e = env(256);
  let (node, f) = e.open(9, vec![0x33; 2 * PS]);
  assert_eq!(f.write(C, 100, Some(&[0x77; 10][..]), 10)?, 10);
  // Head read only, same page as the tail / 仅读首页，尾页即首页
  assert_eq!(node.stats().reads, 1);

  let mut buf = vec![0u8; PS];
  f.read(C, 0, &mut buf)?;
  assert!(buf[..100].iter().all(|&b| b == 0x33));
  assert!(buf[100..110].iter().all(|&b| b == 0x77));
  assert!(buf[110..].iter().all(|&b| b == 0x33));
  assert_eq!(pages(&f), 1);
  OK
}

#[test]
fn test_boundaries_touch_nothing() -> Void {
  let e = env(256);
  let (node, f) = e.open(10, pattern(10000, 2));
  let allocated = e.pool().stats().allocated;

  assert_eq!(f.read(C, 0, &mut [])?, 0);
  assert_eq!(f.write(C, 0, Some(&[][..]), 0)?, 0);
  let mut buf = [0u8; 16];
  assert_eq!(f.read(C, 10000, &mut buf)?, 0);
  assert_eq!(f.read(C, 50000, &mut buf)?, 0);
  assert_eq!(f.read(C, -4, &mut buf)?, 0);
  assert_eq!(f.write(C, 20000, Some(&buf[..]), 16)?, 0);
  assert_eq!(f.write(C, 20000, None, 16)?, 0);

  assert_eq!(e.pool().stats().allocated, allocated);
  assert_eq!(pages(&f), 0);
  assert_eq!(node.stats().reads, 0);
  assert_eq!(node.stats().writes, 0);
  assert!(matches!(
    f.write(C, 0, Some(&buf[..]), 32),
    Err(Error::BadValue(_))
  ));
  OK
}

#[test]
fn test_short_store_reads_zero_fill() -> Void {
  let e = env(256);
  let node = e.add(11, vec![0x42; 100]);
  node.set_scribble(true);
  let f = e.fc.create(DEV, 11, 3 * PS as i64)?;

  let mut buf = vec![0xffu8; 3 * PS];
  assert_eq!(f.read(C, 0, &mut buf)?, 3 * PS);
  assert!(buf[..100].iter().all(|&b| b == 0x42));
  assert!(buf[100..].iter().all(|&b| b == 0));
  OK
}

#[test]
fn test_read_error_short_transfer() -> Void {
  let e = env(256);
  let data = pattern(3 * PS, 4);
  let (node, f) = e.open(12, data.clone());

  let mut head = [0u8; 10];
  f.read(C, 0, &mut head)?;
  node.set_fail_reads(true);

  // Page 0 was copied before the gap failed / 缺口失败前已复制第 0 页
  let mut buf = vec![0u8; 3 * PS];
  assert_eq!(f.read(C, 0, &mut buf)?, PS);
  assert_eq!(&buf[..PS], &data[..PS]);
  assert_eq!(pages(&f), 1);

  assert!(matches!(f.read(C, PS as i64, &mut head), Err(Error::Io(_))));
  assert_eq!(pages(&f), 1);
  assert!(!f.cache().lock().any_busy());

  node.set_fail_reads(false);
  assert_eq!(f.read(C, 0, &mut buf)?, 3 * PS);
  assert_eq!(buf, data);
  e.assert_reservations_balanced();
  OK
}

#[test]
fn test_bypass_under_pressure() -> Void {
  let e = env(256);
  let len = 64 * PS;
  let data = pattern(len, 8);
  let (node, f) = e.open(13, vec![0; len]);
  e.pool().set_low_memory(Some(LowMemory::Critical));

  assert_eq!(f.write(C, 0, Some(&data[..]), len)?, len);
  assert_eq!(pages(&f), 0);
  assert_eq!(node.contents(), data);

  let mut buf = vec![0u8; len];
  assert_eq!(f.read(C, 0, &mut buf)?, len);
  assert_eq!(buf, data);
  assert_eq!(pages(&f), 0);

  assert_eq!(f.write(C, 0, None, len)?, len);
  assert!(node.contents().iter().all(|&b| b == 0));
  assert_eq!(pages(&f), 0);

  // Small requests keep using the cache / 小请求仍走缓存
  f.read(C, 0, &mut buf[..PS])?;
  assert_eq!(pages(&f), 1);

  e.pool().set_low_memory(None);
  f.read(C, 0, &mut buf)?;
  assert_eq!(pages(&f), 64);
  e.assert_reservations_balanced();
  OK
}

#[test]
fn test_sequential_reads_recycle_own_pages() -> Void {
  let e = env(256);
  let len = 64 * PS;
  let data = pattern(len, 5);
  let (_, f) = e.open(14, data.clone());
  e.pool().set_low_memory(Some(LowMemory::Note));

  let chunk = 4 * PS;
  let mut buf = vec![0u8; chunk];
  for at in (0..len).step_by(chunk) {
    assert_eq!(f.read(C, at as i64, &mut buf)?, chunk);
    assert_eq!(buf, &data[at..at + chunk]);
  }
  info!("resident after sequential scan: {}", pages(&f));
  assert!(pages(&f) <= 16);
  e.assert_reservations_balanced();
  OK
}

#[test]
fn test_sequential_writes_push_dirty_pages() -> Void {
  let e = env(256);
  let len = 64 * PS;
  let data = pattern(len, 6);
  let (node, f) = e.open(15, vec![0; len]);
  e.pool().set_low_memory(Some(LowMemory::Note));

  let chunk = 4 * PS;
  for at in (0..len).step_by(chunk) {
    assert_eq!(f.write(C, at as i64, Some(&data[at..at + chunk]), chunk)?, chunk);
  }
  assert!(node.stats().writes > 0);
  assert!(e.pool().count(PageState::Modified) < 64);

  f.sync()?;
  assert_eq!(node.contents(), data);
  OK
}

#[test]
fn test_write_through() -> Void {
  let e = env_with(
    256,
    Conf {
      write_through: true,
      ..Conf::default()
    },
  );
  let (node, f) = e.open(16, vec![0; 3 * PS]);
  let data = pattern(3 * PS, 4);
  assert_eq!(f.write(C, 0, Some(&data[..]), data.len())?, data.len());
  assert_eq!(e.pool().count(PageState::Modified), 0);
  assert_eq!(node.stats().writes, 1);
  assert_eq!(node.contents(), data);

  // A failed store keeps the pages dirty / 存储失败时页保持脏
  let (node, f) = e.open(17, vec![0; 2 * PS]);
  node.set_fail_writes(true);
  assert_eq!(f.write(C, 0, Some(&data[..PS]), PS)?, PS);
  assert_eq!(e.pool().count(PageState::Modified), 1);
  node.set_fail_writes(false);
  f.sync()?;
  assert_eq!(&node.contents()[..PS], &data[..PS]);
  OK
}

#[test]
fn test_concurrent_disjoint_pages() -> Void {
  const PAGES: usize = 32;
  let e = env(256);
  let (node, f) = e.open(18, vec![0; PAGES * PS]);

  let models: Vec<Vec<u8>> = thread::scope(|s| {
    let handles: Vec<_> = (0..2usize)
      .map(|t| {
        let f = &f;
        s.spawn(move || {
          let mut rng = fastrand::Rng::with_seed(42 + t as u64);
          let mut model = vec![0u8; PAGES * PS];
          for _ in 0..200 {
            let page = rng.usize(0..PAGES / 2) * 2 + t;
            let off = rng.usize(0..PS);
            let len = rng.usize(1..=PS - off);
            let at = page * PS + off;
            let mut data = vec![0u8; len];
            rng.fill(&mut data);
            assert_eq!(f.write(C, at as i64, Some(&data[..]), len).unwrap(), len);
            model[at..at + len].copy_from_slice(&data);

            let start = page * PS;
            let mut got = vec![0u8; PS];
            assert_eq!(f.read(C, start as i64, &mut got).unwrap(), PS);
            assert_eq!(&got[..], &model[start..start + PS]);
          }
          model
        })
      })
      .collect();
    handles.into_iter().map(|h| h.join().unwrap()).collect()
  });

  let mut expect = vec![0u8; PAGES * PS];
  for page in 0..PAGES {
    let r = page * PS..(page + 1) * PS;
    expect[r.clone()].copy_from_slice(&models[page % 2][r]);
  }
  let mut buf = vec![0u8; PAGES * PS];
  assert_eq!(f.read(C, 0, &mut buf)?, buf.len());
  assert_eq!(buf, expect);
  f.sync()?;
  assert_eq!(node.contents(), expect);
  e.assert_reservations_balanced();
  OK
}

#[test]
fn test_prefetch_then_read() -> Void {
  const SIZE: usize = 1 << 20;
  let e = env(1024);
  let data = pattern(SIZE, 3);
  let (node, f) = e.open(19, data.clone());
  node.set_read_delay(20);

  e.fc.prefetch(DEV, 19, 0, SIZE);
  // Pages are in place and busy before the read lands / 读取完成前页已就位且为忙
  assert_eq!(pages(&f), SIZE / PS);

  let mut buf = vec![0u8; SIZE];
  assert_eq!(f.read(C, 0, &mut buf)?, SIZE);
  assert!(buf == data);
  e.fc.wait_io();
  assert_eq!(node.stats().reads, 1);

  // Mostly resident, skipped / 大部分已驻留，跳过
  e.fc.prefetch(DEV, 19, 0, SIZE);
  e.fc.wait_io();
  assert_eq!(node.stats().reads, 1);
  e.assert_reservations_balanced();
  OK
}

/// Store whose reads panic while armed / 启用时读取会 panic 的存储
struct PanicVnode {
  inner: MemVnode,
  armed: AtomicBool,
}

impl Vnode for PanicVnode {
  fn key(&self) -> NodeKey {
    self.inner.key()
  }

  fn read_pages(&self, cookie: Cookie, offset: u64, vecs: &mut [&mut [u8]]) -> fc_vnode::Result<usize> {
    if self.armed.load(Ordering::Relaxed) {
      panic!("store gone at {offset}");
    }
    self.inner.read_pages(cookie, offset, vecs)
  }

  fn write_pages(&self, cookie: Cookie, offset: u64, vecs: &[&[u8]]) -> fc_vnode::Result<usize> {
    self.inner.write_pages(cookie, offset, vecs)
  }
}

#[test]
fn test_prefetch_survives_panicking_store() -> Void {
  const SIZE: usize = 8 * PS;
  let e = env(1024);
  let data = pattern(SIZE, 0x33);
  let node = Arc::new(PanicVnode {
    inner: MemVnode::new(NodeKey::new(DEV, 46), data.clone()),
    armed: AtomicBool::new(true),
  });
  e.vfs.add(node.clone());
  let f = e.fc.create(DEV, 46, SIZE as i64)?;

  e.fc.prefetch(DEV, 46, 0, SIZE);
  e.fc.wait_io();
  // Busy pages are dropped, none left behind / 忙页被丢弃，无残留
  assert_eq!(pages(&f), 0);
  assert!(!f.cache().lock().any_busy());

  // The worker keeps serving / 工作线程继续服务
  node.armed.store(false, Ordering::Relaxed);
  e.fc.prefetch(DEV, 46, 0, SIZE);
  e.fc.wait_io();
  assert_eq!(pages(&f), 8);
  let mut buf = vec![0u8; SIZE];
  assert_eq!(f.read(C, 0, &mut buf)?, SIZE);
  assert!(buf == data);
  e.assert_reservations_balanced();
  OK
}

#[test]
fn test_prefetch_skips_resident_pages() -> Void {
  let e = env(256);
  let data = pattern(8 * PS, 12);
  let (node, f) = e.open(20, data.clone());
  let mut buf = vec![0u8; 10];
  f.read(C, 2 * PS as i64, &mut buf)?;

  let vnode: Arc<dyn Vnode> = node.clone();
  e.fc.prefetch_vnode(&vnode, 0, 8 * PS);
  e.fc.wait_io();
  // Runs [0, 2) and [3, 8) / 两段
  assert_eq!(node.stats().reads, 3);
  assert_eq!(pages(&f), 8);

  let mut buf = vec![0u8; 8 * PS];
  f.read(C, 0, &mut buf)?;
  assert_eq!(buf, data);
  assert_eq!(node.stats().reads, 3);
  OK
}

#[test]
fn test_prefetch_failure_drops_pages() -> Void {
  let e = env(256);
  let data = pattern(4 * PS + 10, 13);
  let (node, f) = e.open(21, data.clone());
  node.set_fail_reads(true);
  e.fc.prefetch(DEV, 21, 0, data.len());
  e.fc.wait_io();
  assert_eq!(pages(&f), 0);

  node.set_fail_reads(false);
  let mut buf = vec![0u8; data.len()];
  assert_eq!(f.read(C, 0, &mut buf)?, data.len());
  assert_eq!(buf, data);

  // Disabled, beyond the end, unknown node: nothing happens / 均不执行
  f.disable()?;
  e.fc.prefetch(DEV, 21, 0, data.len());
  e.fc.prefetch(DEV, 21, 1 << 30, PS);
  e.fc.prefetch(DEV, 999, 0, PS);
  e.fc.wait_io();
  assert_eq!(pages(&f), 0);
  e.assert_reservations_balanced();
  OK
}

#[test]
fn test_lifecycle() -> Void {
  let e = env(256);
  assert!(matches!(e.fc.create(DEV, 404, 0), Err(Error::NotFound(_))));
  e.add(22, pattern(3 * PS, 1));
  assert!(matches!(e.fc.create(DEV, 22, -1), Err(Error::BadValue(_))));

  let a = e.fc.create(DEV, 22, 3 * PS as i64)?;
  let mut buf = vec![0u8; PS];
  a.read(C, 0, &mut buf)?;
  let b = e.fc.create(DEV, 22, 3 * PS as i64)?;
  assert!(Arc::ptr_eq(a.cache(), b.cache()));
  assert_eq!(pages(&b), 1);
  assert_eq!(b.key(), NodeKey::new(DEV, 22));

  e.fc.delete(a);
  assert_eq!(pages(&b), 1);
  let free = e.pool().unused();
  e.fc.delete(b);
  // Last holder gone, pages go back / 最后持有者释放，页归还
  assert_eq!(e.pool().unused(), free + 1);
  OK
}

#[derive(Default)]
struct Recorder {
  events: Mutex<Vec<String>>,
}

impl CacheModule for Recorder {
  fn node_opened(
    &self,
    _vnode: Option<&Arc<dyn Vnode>>,
    _fd_type: i32,
    key: NodeKey,
    _parent: u64,
    name: Option<&str>,
    size: i64,
  ) {
    self
      .events
      .lock()
      .push(format!("open {key} {} {size}", name.unwrap_or("-")));
  }

  fn node_closed(&self, _vnode: Option<&Arc<dyn Vnode>>, _fd_type: i32, key: NodeKey, access_type: i32) {
    self.events.lock().push(format!("close {key} {access_type}"));
  }

  fn node_launched(&self, args: &[&str]) {
    self.events.lock().push(format!("launch {}", args.join(" ")));
  }
}

#[test]
fn test_control_and_modules() -> Void {
  let e = env(256);
  let (_, f) = e.open(23, vec![0; 10000]);
  let rec = Arc::new(Recorder::default());
  e.fc.register_module("file_cache/launch_speedup", rec.clone());
  e.fc.node_launched(&["before"]);

  assert!(matches!(
    e.fc.control(Control::SetModule(Some("launch_speedup"))),
    Err(Error::BadValue(_))
  ));
  assert!(matches!(
    e.fc.control(Control::SetModule(Some("file_cache/missing"))),
    Err(Error::ModuleNotFound(_))
  ));
  e.fc.control(Control::from_code(
    Control::SET_MODULE,
    Some("file_cache/launch_speedup"),
  )?)?;
  assert_eq!(e.fc.module_name().as_deref(), Some("file_cache/launch_speedup"));

  e.fc.node_opened(None, 1, f.key(), 2, Some("app"));
  e.fc.node_opened(None, 1, NodeKey::new(DEV, 99), 2, None);
  e.fc.node_closed(None, 1, f.key());
  e.fc.node_launched(&["app", "-v"]);
  assert_eq!(
    *rec.events.lock(),
    vec!["open 1:23 app 10000", "open 1:99 - -1", "close 1:23 0", "launch app -v"]
  );

  e.fc.control(Control::SetModule(None))?;
  assert_eq!(e.fc.module_name(), None);
  e.fc.node_launched(&["after"]);
  assert_eq!(rec.events.lock().len(), 4);

  e.fc.control(Control::from_code(Control::CLEAR, None)?)?;
  assert!(matches!(Control::from_code(9, None), Err(Error::BadHandler(9))));
  OK
}

#[test]
fn test_conf() -> Void {
  let conf: Conf = serde_json::from_str(r#"{"max_io_vecs":16,"write_through":true}"#)?;
  assert_eq!(conf.max_io_vecs, 16);
  assert!(conf.write_through);
  assert_eq!(conf.bypass_io_size, 65536);
  assert_eq!(conf.prefetch_max_fraction, (2, 3));
  assert_eq!(conf.max_chunk(), 16 * PS);
  assert_eq!(Conf::default().zero_vec_size(), 32 * PS);

  let pool: PoolConf = serde_json::from_str(r#"{"pages":64}"#)?;
  assert_eq!(pool.pages, 64);
  assert_eq!(pool.reserve_wait_ms, PoolConf::default().reserve_wait_ms);

  let bad = FileCache::new(
    Conf {
      max_io_vecs: 0,
      ..Conf::default()
    },
    Arc::new(PagePool::new(PoolConf::with_pages(8))?),
    Arc::new(MemVfs::new()),
  );
  assert!(matches!(bad, Err(Error::BadValue(_))));
  OK
}

#[test]
fn test_pool_smaller_than_two_batches() -> Void {
  let vfs = Arc::new(MemVfs::new());
  // Room for two batches but not the zero page / 够两批但放不下零页
  let pool = Arc::new(PagePool::new(PoolConf::with_pages(64))?);
  let bad = FileCache::new(Conf::default(), pool.clone(), vfs.clone());
  assert!(matches!(bad, Err(Error::BadValue(_))));
  assert_eq!(pool.count(PageState::Wired), 0);

  let conf = Conf {
    max_io_vecs: 8,
    ..Conf::default()
  };
  let pool = Arc::new(PagePool::new(PoolConf::with_pages(16))?);
  assert!(matches!(
    FileCache::new(conf.clone(), pool, vfs.clone()),
    Err(Error::BadValue(_))
  ));
  let pool = Arc::new(PagePool::new(PoolConf::with_pages(17))?);
  FileCache::new(conf, pool, vfs)?;
  OK
}

#[test]
fn test_smallest_pool_moves_whole_files() -> Void {
  const SIZE: usize = 64 * PS;
  let e = env(65);
  let data = pattern(SIZE, 0x21);
  let (a, fa) = e.open(44, data.clone());
  let mut buf = vec![0u8; SIZE];
  assert_eq!(fa.read(C, 0, &mut buf)?, SIZE);
  assert!(buf == data);

  // Second file takes its pages back from the first / 第二个文件从第一个回收页
  let other = pattern(SIZE, 0x42);
  let (_b, fb) = e.open(45, other.clone());
  assert_eq!(fb.read(C, 0, &mut buf)?, SIZE);
  assert!(buf == other);

  let fresh = pattern(SIZE, 0x63);
  assert_eq!(fa.write(C, 0, Some(&fresh[..]), SIZE)?, SIZE);
  fa.sync()?;
  assert!(a.contents() == fresh);
  assert_eq!(fa.read(C, 0, &mut buf)?, SIZE);
  assert!(buf == fresh);
  e.assert_reservations_balanced();
  OK
}

#[test]
fn test_access_ring() -> Void {
  let mut ring = AccessRing::default();
  assert!(!ring.is_sequential());
  for i in 0..3 {
    ring.push(i * 100, 100, false);
  }
  assert!(ring.is_sequential());

  let mut ring = AccessRing::default();
  ring.push(0, 100, false);
  ring.push(500, 100, false);
  ring.push(600, 100, false);
  assert!(!ring.is_sequential());

  let ps = PS as i64;
  let mut ring = AccessRing::default();
  ring.push(0, ps, true);
  ring.push(ps, ps, true);
  ring.push(2 * ps, 2 * ps, true);
  assert!(ring.is_sequential());
  assert_eq!(ring.write_back_range(), Some(PS as u64..4 * PS as u64));

  // Reads leave no write range / 读操作不产生回写区间
  let mut ring = AccessRing::default();
  ring.push(0, ps, false);
  assert_eq!(ring.write_back_range(), None);
  OK
}

#[test]
fn test_file_backed_node() -> Void {
  let e = env(256);
  let dir = tempfile::tempdir()?;
  let path = dir.path().join("data");
  let key = NodeKey::new(2, 1);
  let node = Arc::new(FileVnode::open(key, &path)?);
  e.vfs.add(node.clone());

  let data = pattern(3 * PS + 100, 6);
  let f = e.fc.create(2, 1, 0)?;
  f.set_size(data.len() as i64)?;
  assert_eq!(f.write(C, 0, Some(&data[..]), data.len())?, data.len());
  f.sync()?;
  assert_eq!(node.len()?, data.len() as u64);
  assert_eq!(std::fs::read(&path)?, data);
  e.fc.delete(f);

  // Fresh cache fills from the file / 新缓存从文件填充
  let f = e.fc.create(2, 1, data.len() as i64)?;
  assert_eq!(pages(&f), 0);
  let mut buf = vec![0u8; data.len()];
  assert_eq!(f.read(C, 0, &mut buf)?, data.len());
  assert_eq!(buf, data);
  OK
}
