//! Asynchronous I/O worker 异步 I/O 工作线程

use std::{
  panic::{self, AssertUnwindSafe},
  sync::{
    Arc,
    mpsc::{Receiver, SendError, Sender, channel},
  },
  thread::{self, JoinHandle},
};

use log::{debug, warn};
use parking_lot::{Condvar, Mutex};

pub(crate) type Job = Box<dyn FnOnce() + Send>;

enum Msg {
  Run(Job),
  Shutdown,
}

/// Jobs submitted and not yet finished / 已提交未完成的任务
#[derive(Default)]
struct Pending {
  n: Mutex<usize>,
  idle: Condvar,
}

impl Pending {
  fn add(&self) {
    *self.n.lock() += 1;
  }

  fn done(&self) {
    let mut n = self.n.lock();
    *n -= 1;
    if *n == 0 {
      self.idle.notify_all();
    }
  }
}

/// Counts a job done when dropped, unwinding included
/// 析构时记一个任务完成，展开时亦然
struct Done<'a>(&'a Pending);

impl Drop for Done<'_> {
  fn drop(&mut self) {
    self.0.done();
  }
}

/// Single worker running completion-style reads off the caller's thread
/// 单工作线程，在调用者线程之外执行读取并完成回调
pub(crate) struct IoQueue {
  tx: Sender<Msg>,
  pending: Arc<Pending>,
  handle: Option<JoinHandle<()>>,
}

impl IoQueue {
  pub fn new() -> Self {
    let (tx, rx) = channel::<Msg>();
    let pending = Arc::new(Pending::default());
    let p = pending.clone();
    let handle = thread::spawn(move || worker_loop(rx, p));
    Self {
      tx,
      pending,
      handle: Some(handle),
    }
  }

  /// Queue `job`, run it inline if the worker is gone
  /// 提交 `job`，工作线程不在时就地执行
  pub fn submit(&self, job: Job) {
    self.pending.add();
    if let Err(SendError(Msg::Run(job))) = self.tx.send(Msg::Run(job)) {
      let _done = Done(&self.pending);
      job();
    }
  }

  /// Block until every submitted job has finished / 阻塞直到所有已提交任务完成
  pub fn drain(&self) {
    let mut n = self.pending.n.lock();
    while *n > 0 {
      self.pending.idle.wait(&mut n);
    }
  }
}

fn worker_loop(rx: Receiver<Msg>, pending: Arc<Pending>) {
  while let Ok(Msg::Run(job)) = rx.recv() {
    let _done = Done(&pending);
    if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
      warn!("io job panicked");
    }
  }
  debug!("io worker exit");
}

impl Drop for IoQueue {
  fn drop(&mut self) {
    let _ = self.tx.send(Msg::Shutdown);
    if let Some(h) = self.handle.take()
      && h.join().is_err()
    {
      warn!("io worker panicked");
    }
  }
}
