//! File cache context and lifecycle API 文件缓存上下文与生命周期接口

use std::{
  any::Any,
  collections::HashMap,
  sync::{Arc, Weak},
};

use fc_page::{PageId, PagePool, PageState};
use fc_vm::VmCache;
use fc_vnode::{NodeKey, Vfs, Vnode};
use hipstr::HipStr;
use log::{debug, info};
use parking_lot::{Mutex, RwLock};

use crate::{
  CacheModule, Conf, Control, Error, FileCacheRef, NoModule, Result, file_ref::file_ref_of,
  io_queue::IoQueue, precache::prefetch_cache,
};

struct Installed {
  name: Option<String>,
  module: Arc<dyn CacheModule>,
}

pub(crate) struct Ctx {
  pub conf: Conf,
  pub pool: Arc<PagePool>,
  pub vfs: Arc<dyn Vfs>,
  /// One VM cache per node while anyone holds it / 每节点一个 VM 缓存
  caches: Mutex<HashMap<NodeKey, Weak<VmCache>>>,
  pub io: IoQueue,
  /// Wired page of zeros backing zero-fill writes / 写零使用的固定零页
  pub zero: PageId,
  module: RwLock<Installed>,
  modules: RwLock<HashMap<String, Arc<dyn CacheModule>>>,
}

impl Ctx {
  fn cache_of(&self, key: NodeKey) -> Option<Arc<VmCache>> {
    self.caches.lock().get(&key).and_then(Weak::upgrade)
  }

  #[inline]
  fn module(&self) -> Arc<dyn CacheModule> {
    self.module.read().module.clone()
  }
}

impl Drop for Ctx {
  fn drop(&mut self) {
    self.pool.free(self.zero);
  }
}

/// Page cache engine shared by every cached file
/// 所有缓存文件共享的页缓存引擎
#[derive(Clone)]
pub struct FileCache(Arc<Ctx>);

impl FileCache {
  /// `BadValue` on zero vector counts or a pool under
  /// `2 * max_io_vecs + 1` pages
  /// 向量数为零或页池少于 `2 * max_io_vecs + 1` 页时返回 `BadValue`
  pub fn new(conf: Conf, pool: Arc<PagePool>, vfs: Arc<dyn Vfs>) -> Result<Self> {
    if conf.max_io_vecs == 0 || conf.reevaluate_pages == 0 || conf.zero_vec_count == 0 {
      return Err(Error::bad("vector counts must be positive"));
    }
    if conf.prefetch_max_fraction.1 == 0 {
      return Err(Error::bad("prefetch fraction denominator is zero"));
    }
    // A batch in flight plus the next one, and the zero page
    // 进行中的一批加下一批，外加零页
    if pool.total() < 2 * conf.max_io_vecs + 1 {
      return Err(Error::bad("page pool smaller than two batches plus the zero page"));
    }
    let zero = pool.allocate(PageState::Wired, None, true)?;
    debug!("file cache up: {} pages", pool.total());
    Ok(Self(Arc::new(Ctx {
      conf,
      pool,
      vfs,
      caches: Mutex::new(HashMap::new()),
      io: IoQueue::new(),
      zero,
      module: RwLock::new(Installed {
        name: None,
        module: Arc::new(NoModule),
      }),
      modules: RwLock::new(HashMap::new()),
    })))
  }

  #[inline]
  pub fn conf(&self) -> &Conf {
    &self.0.conf
  }

  #[inline]
  pub fn pool(&self) -> &Arc<PagePool> {
    &self.0.pool
  }

  /// Open a cache over node `(dev, ino)` of `size` bytes
  /// 为节点 `(dev, ino)` 创建大小为 `size` 字节的缓存
  ///
  /// Reuses the node's VM cache while it is alive.
  /// 节点的 VM 缓存存活时复用之。
  pub fn create(&self, dev: u32, ino: u64, size: i64) -> Result<Arc<FileCacheRef>> {
    let size = u64::try_from(size).map_err(|_| Error::bad("negative file size"))?;
    let key = NodeKey::new(dev, ino);
    let vnode = self.0.vfs.lookup(key).ok_or(Error::NotFound(key))?;
    let cache = {
      let mut caches = self.0.caches.lock();
      caches.retain(|_, c| c.strong_count() > 0);
      match caches.get(&key).and_then(Weak::upgrade) {
        Some(c) => c,
        None => {
          let c = VmCache::new(self.0.pool.clone(), vnode);
          caches.insert(key, Arc::downgrade(&c));
          c
        }
      }
    };
    cache.lock().virtual_end = size;
    let r = Arc::new(FileCacheRef::new(self.0.clone(), cache.clone()));
    let any: Arc<dyn Any + Send + Sync> = r.clone();
    cache.set_file_ref(Some(Arc::downgrade(&any)));
    debug!("{key} cache created, size {size}");
    Ok(r)
  }

  /// Release a handle, its pages stay with the VM cache while others hold it
  /// 释放句柄，若仍有他人持有 VM 缓存则页面保留
  pub fn delete(&self, r: Arc<FileCacheRef>) {
    let cache = r.cache.clone();
    if let Some(cur) = cache.file_ref()
      && std::ptr::addr_eq(Arc::as_ptr(&cur), Arc::as_ptr(&r))
    {
      cache.set_file_ref(None);
    }
    debug!("{} cache deleted", r.key());
  }

  /// Best-effort prefetch, returns before the reads complete
  /// 尽力预取，不等待读取完成
  pub fn prefetch_vnode(&self, vnode: &Arc<dyn Vnode>, offset: i64, size: usize) {
    if let Some(cache) = self.0.cache_of(vnode.key()) {
      prefetch_cache(&self.0, &cache, offset, size);
    }
  }

  pub fn prefetch(&self, dev: u32, ino: u64, offset: i64, size: usize) {
    if let Some(vnode) = self.0.vfs.lookup(NodeKey::new(dev, ino)) {
      self.prefetch_vnode(&vnode, offset, size);
    }
  }

  /// Wait for outstanding prefetch reads / 等待未完成的预取读
  pub fn wait_io(&self) {
    self.0.io.drain();
  }

  pub fn node_opened(
    &self,
    vnode: Option<&Arc<dyn Vnode>>,
    fd_type: i32,
    key: NodeKey,
    parent: u64,
    name: Option<&str>,
  ) {
    let size = self
      .0
      .cache_of(key)
      .filter(|c| file_ref_of(c).is_some())
      .map_or(-1, |c| c.lock().virtual_end as i64);
    self
      .0
      .module()
      .node_opened(vnode, fd_type, key, parent, name, size);
  }

  pub fn node_closed(&self, vnode: Option<&Arc<dyn Vnode>>, fd_type: i32, key: NodeKey) {
    self.0.module().node_closed(vnode, fd_type, key, 0);
  }

  pub fn node_launched(&self, args: &[&str]) {
    self.0.module().node_launched(args);
  }

  /// Make a module installable by name / 登记可按名称安装的模块
  pub fn register_module(&self, name: &str, module: Arc<dyn CacheModule>) {
    self.0.modules.write().insert(name.to_owned(), module);
  }

  /// Name of the installed module / 已安装模块名称
  pub fn module_name(&self) -> Option<String> {
    self.0.module.read().name.clone()
  }

  pub fn control(&self, op: Control<'_>) -> Result<()> {
    match op {
      Control::Clear => {
        info!("clear cache requested");
        Ok(())
      }
      Control::SetModule(name) => {
        {
          let mut m = self.0.module.write();
          if let Some(prev) = m.name.take() {
            m.module = Arc::new(NoModule);
            info!("cache module {prev} removed");
          }
        }
        let Some(name) = name else {
          return Ok(());
        };
        if !name.starts_with(self.0.conf.module_prefix.as_str()) {
          return Err(Error::bad("module name lacks the module prefix"));
        }
        let module = self
          .0
          .modules
          .read()
          .get(name)
          .cloned()
          .ok_or_else(|| Error::ModuleNotFound(HipStr::from(name.to_owned())))?;
        *self.0.module.write() = Installed {
          name: Some(name.to_owned()),
          module,
        };
        info!("cache module {name} installed");
        Ok(())
      }
    }
  }
}
