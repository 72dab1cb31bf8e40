use std::sync::Arc;

use fc_vnode::{MemVfs, MemVnode};
use file_cache::{Conf, Cookie, FileCache, LowMemory, NodeKey, PAGE_SIZE, PagePool, PoolConf};
use proptest::prelude::*;

#[static_init::constructor(0)]
extern "C" fn _log_init() {
  log_init::init();
}

const PS: usize = PAGE_SIZE;
const FILE: usize = 32 * PS;
const C: Cookie = Cookie(0);

proptest! {
  #![proptest_config(ProptestConfig::with_cases(24))]

  /// What is written reads back, cached or not, under any memory level
  /// 无论是否缓存、内存等级如何，写入内容均可读回
  #[test]
  fn prop_write_read_round_trip(
    disabled in any::<bool>(),
    low in any::<bool>(),
    ops in prop::collection::vec((0usize..FILE, 1usize..20 * PS, any::<u8>()), 1..12),
  ) {
    let pool = Arc::new(PagePool::new(PoolConf::with_pages(256)).unwrap());
    let vfs = Arc::new(MemVfs::new());
    let fc = FileCache::new(Conf::default(), pool.clone(), vfs.clone()).unwrap();
    let node = Arc::new(MemVnode::zeroed(NodeKey::new(1, 1), FILE));
    vfs.add(node.clone());
    let f = fc.create(1, 1, FILE as i64).unwrap();
    if disabled {
      f.disable().unwrap();
    }
    if low {
      pool.set_low_memory(Some(LowMemory::Critical));
    }

    let mut model = vec![0u8; FILE];
    for (at, len, seed) in ops {
      let data: Vec<u8> = (0..len).map(|i| seed.wrapping_add(i as u8)).collect();
      let n = f.write(C, at as i64, Some(&data[..]), len).unwrap();
      prop_assert_eq!(n, len.min(FILE - at));
      model[at..at + n].copy_from_slice(&data[..n]);

      let mut back = vec![0u8; n];
      prop_assert_eq!(f.read(C, at as i64, &mut back).unwrap(), n);
      prop_assert_eq!(&back[..], &data[..n]);
    }

    let mut all = vec![0u8; FILE];
    prop_assert_eq!(f.read(C, 0, &mut all).unwrap(), FILE);
    prop_assert!(all == model);
    f.sync().unwrap();
    prop_assert!(node.contents() == model);

    let s = pool.stats();
    prop_assert_eq!(s.reserved, s.unreserved + s.consumed);
    prop_assert_eq!(pool.reserved(), 0);
  }
}
