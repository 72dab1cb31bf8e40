//! Intrusive page queues keyed by state
//! 按状态划分的侵入式页队列
//!
//! Links live in the page records, so moving a page between queues and
//! testing membership are O(1).
//! 链接存放在页记录中，因此换队与成员判断均为 O(1)。

use crate::{PageId, PageState, STATE_COUNT};

const NIL: u32 = u32::MAX;

/// Per-page record / 页记录
#[derive(Debug, Clone, Copy)]
pub(crate) struct Node {
  pub state: PageState,
  pub usage: u8,
  prev: u32,
  next: u32,
}

#[derive(Debug, Clone, Copy)]
struct Queue {
  head: u32,
  tail: u32,
  len: usize,
}

impl Queue {
  const EMPTY: Queue = Queue {
    head: NIL,
    tail: NIL,
    len: 0,
  };
}

/// Page records + one queue per state
/// 页记录 + 每个状态一个队列
pub(crate) struct Queues {
  nodes: Vec<Node>,
  queues: [Queue; STATE_COUNT],
}

impl Queues {
  /// All pages start in `Free` / 所有页初始为 `Free`
  pub fn new(pages: usize) -> Self {
    let mut q = Self {
      nodes: Vec::with_capacity(pages),
      queues: [Queue::EMPTY; STATE_COUNT],
    };
    for i in 0..pages {
      q.nodes.push(Node {
        state: PageState::Free,
        usage: 0,
        prev: NIL,
        next: NIL,
      });
      q.push_back(PageState::Free, i as u32);
    }
    q
  }

  #[inline]
  pub fn node(&self, id: PageId) -> &Node {
    &self.nodes[id.idx()]
  }

  #[inline]
  pub fn node_mut(&mut self, id: PageId) -> &mut Node {
    &mut self.nodes[id.idx()]
  }

  #[inline]
  pub fn len(&self, state: PageState) -> usize {
    self.queues[state.idx()].len
  }

  #[inline]
  pub fn total(&self) -> usize {
    self.nodes.len()
  }

  fn push_back(&mut self, state: PageState, i: u32) {
    let q = &mut self.queues[state.idx()];
    let tail = q.tail;
    {
      let n = &mut self.nodes[i as usize];
      n.state = state;
      n.prev = tail;
      n.next = NIL;
    }
    if tail == NIL {
      q.head = i;
    } else {
      self.nodes[tail as usize].next = i;
    }
    q.tail = i;
    q.len += 1;
  }

  fn unlink(&mut self, i: u32) {
    let Node {
      state, prev, next, ..
    } = self.nodes[i as usize];
    let q = &mut self.queues[state.idx()];
    if prev == NIL {
      q.head = next;
    } else {
      self.nodes[prev as usize].next = next;
    }
    if next == NIL {
      q.tail = prev;
    } else {
      self.nodes[next as usize].prev = prev;
    }
    q.len -= 1;
    let n = &mut self.nodes[i as usize];
    n.prev = NIL;
    n.next = NIL;
  }

  /// Take the head of a queue / 取出队首
  pub fn pop_front(&mut self, state: PageState) -> Option<PageId> {
    let head = self.queues[state.idx()].head;
    if head == NIL {
      return None;
    }
    self.unlink(head);
    Some(PageId(head))
  }

  /// Move page to the tail of `state` / 将页移到 `state` 队尾
  pub fn move_to(&mut self, id: PageId, state: PageState) {
    self.unlink(id.0);
    self.push_back(state, id.0);
  }

  /// Insert a detached page / 插入已摘下的页
  pub fn insert(&mut self, id: PageId, state: PageState) {
    self.push_back(state, id.0);
  }
}
