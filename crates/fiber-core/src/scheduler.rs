//! Cooperative task scheduler.
//!
//! Tasks wait in one circular list ordered by absolute deadline (earliest
//! first). The host clock decides when the list is flushed; a running task
//! may ask to be resumed, in which case it keeps its handle and goes back
//! into the list.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use slotmap::{new_key_type, SlotMap};

use crate::expiration_time::MAX_SIGNED_31_BIT_INT;
use crate::platform::HostClock;

new_key_type! {
    /// Handle to a scheduled task.
    pub struct CallbackId;
}

/// Response latency classes, most urgent first.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PriorityLevel {
    Immediate,
    UserBlocking,
    Normal,
    Low,
    Idle,
}

impl PriorityLevel {
    /// Milliseconds from scheduling until the task counts as timed out.
    pub fn timeout_ms(self) -> i64 {
        match self {
            PriorityLevel::Immediate => -1,
            PriorityLevel::UserBlocking => 250,
            PriorityLevel::Normal => 5000,
            PriorityLevel::Low => 10000,
            PriorityLevel::Idle => i64::from(MAX_SIGNED_31_BIT_INT),
        }
    }
}

/// What a task wants after running once.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TaskResult {
    Done,
    /// Put the same task back into the queue and run it again later.
    Continue,
}

/// A unit of schedulable work. The argument is `true` when the task has timed
/// out and must run to completion without yielding.
pub type Task = Box<dyn FnMut(bool) -> TaskResult>;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum NodeState {
    Queued,
    Running,
    Cancelled,
}

struct CallbackNode {
    task: Option<Task>,
    priority_level: PriorityLevel,
    expiration_time: i64,
    next: CallbackId,
    previous: CallbackId,
    state: NodeState,
}

struct SchedulerState {
    nodes: SlotMap<CallbackId, CallbackNode>,
    first: Option<CallbackId>,
    current_priority_level: PriorityLevel,
    current_expiration_time: i64,
    current_did_timeout: bool,
    is_executing_callback: bool,
    is_host_callback_scheduled: bool,
}

impl SchedulerState {
    fn new() -> Self {
        Self {
            nodes: SlotMap::with_key(),
            first: None,
            current_priority_level: PriorityLevel::Normal,
            current_expiration_time: -1,
            current_did_timeout: false,
            is_executing_callback: false,
            is_host_callback_scheduled: false,
        }
    }

    fn expiration_of(&self, id: CallbackId) -> i64 {
        self.nodes[id].expiration_time
    }

    /// Links `id` into the ring right before the first node accepted by
    /// `goes_before`. Returns whether the node became the new head.
    fn link(&mut self, id: CallbackId, goes_before: impl Fn(i64, i64) -> bool) -> bool {
        let Some(first) = self.first else {
            let node = &mut self.nodes[id];
            node.next = id;
            node.previous = id;
            node.state = NodeState::Queued;
            self.first = Some(id);
            return true;
        };

        let expiration_time = self.expiration_of(id);
        let mut next = None;
        let mut cursor = first;
        loop {
            if goes_before(self.expiration_of(cursor), expiration_time) {
                next = Some(cursor);
                break;
            }
            cursor = self.nodes[cursor].next;
            if cursor == first {
                break;
            }
        }

        let became_head = next == Some(first);
        // No later node: the new node goes at the end, which is right before the head.
        let next = next.unwrap_or(first);
        if became_head {
            self.first = Some(id);
        }

        let previous = self.nodes[next].previous;
        self.nodes[previous].next = id;
        self.nodes[next].previous = id;
        let node = &mut self.nodes[id];
        node.next = next;
        node.previous = previous;
        node.state = NodeState::Queued;
        became_head
    }

    fn unlink(&mut self, id: CallbackId) {
        let (next, previous) = {
            let node = &self.nodes[id];
            (node.next, node.previous)
        };
        if next == id {
            self.first = None;
        } else {
            if self.first == Some(id) {
                self.first = Some(next);
            }
            self.nodes[previous].next = next;
            self.nodes[next].previous = previous;
        }
        let node = &mut self.nodes[id];
        node.next = id;
        node.previous = id;
    }
}

struct SchedulerInner {
    clock: Rc<dyn HostClock>,
    state: RefCell<SchedulerState>,
}

/// Shared handle to the task queue.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<SchedulerInner>,
}

impl Scheduler {
    pub fn new(clock: Rc<dyn HostClock>) -> Self {
        Self {
            inner: Rc::new(SchedulerInner {
                clock,
                state: RefCell::new(SchedulerState::new()),
            }),
        }
    }

    pub fn clock(&self) -> &Rc<dyn HostClock> {
        &self.inner.clock
    }

    pub fn now(&self) -> u64 {
        self.inner.clock.now()
    }

    /// Queues `task` with a deadline derived from `priority_level`, or from
    /// `timeout_ms` when given.
    pub fn schedule_callback(
        &self,
        priority_level: PriorityLevel,
        task: Task,
        timeout_ms: Option<i64>,
    ) -> CallbackId {
        let start_time = self.now() as i64;
        let expiration_time = start_time + timeout_ms.unwrap_or_else(|| priority_level.timeout_ms());

        let (id, became_head) = {
            let mut state = self.inner.state.borrow_mut();
            let id = state.nodes.insert_with_key(|id| CallbackNode {
                task: Some(task),
                priority_level,
                expiration_time,
                next: id,
                previous: id,
                state: NodeState::Queued,
            });
            let became_head = state.link(id, |existing, new| existing > new);
            (id, became_head)
        };

        if became_head {
            self.ensure_host_callback();
        }
        id
    }

    /// Withdraws a queued task. Cancelling a task while it runs prevents its
    /// continuation from being queued again. Unknown handles are ignored.
    pub fn cancel_callback(&self, id: CallbackId) {
        let mut state = self.inner.state.borrow_mut();
        let Some(node_state) = state.nodes.get(id).map(|node| node.state) else {
            return;
        };
        match node_state {
            NodeState::Running => state.nodes[id].state = NodeState::Cancelled,
            NodeState::Cancelled => {}
            NodeState::Queued => {
                state.unlink(id);
                state.nodes.remove(id);
            }
        }
    }

    pub fn is_scheduled(&self, id: CallbackId) -> bool {
        self.inner
            .state
            .borrow()
            .nodes
            .get(id)
            .is_some_and(|node| node.state != NodeState::Cancelled)
    }

    pub fn first_callback_node(&self) -> Option<CallbackId> {
        self.inner.state.borrow().first
    }

    /// Number of queued tasks.
    pub fn len(&self) -> usize {
        self.inner
            .state
            .borrow()
            .nodes
            .values()
            .filter(|node| node.state == NodeState::Queued)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn current_priority_level(&self) -> PriorityLevel {
        self.inner.state.borrow().current_priority_level
    }

    /// Runs `f` with `priority_level` as the current priority.
    pub fn run_with_priority<R>(&self, priority_level: PriorityLevel, f: impl FnOnce() -> R) -> R {
        let previous = {
            let mut state = self.inner.state.borrow_mut();
            std::mem::replace(&mut state.current_priority_level, priority_level)
        };
        let result = f();
        self.inner.state.borrow_mut().current_priority_level = previous;
        result
    }

    /// Runs `f` at normal priority, or at the current priority if that is
    /// already normal or lower.
    pub fn next<R>(&self, f: impl FnOnce() -> R) -> R {
        let priority_level = match self.current_priority_level() {
            PriorityLevel::Immediate | PriorityLevel::UserBlocking | PriorityLevel::Normal => {
                PriorityLevel::Normal
            }
            other => other,
        };
        self.run_with_priority(priority_level, f)
    }

    /// Captures the current priority so `f` later runs with it.
    pub fn wrap_callback<R>(&self, mut f: impl FnMut() -> R) -> impl FnMut() -> R {
        let scheduler = self.clone();
        let priority_level = self.current_priority_level();
        move || scheduler.run_with_priority(priority_level, &mut f)
    }

    /// True when a queued task has an earlier deadline than the running one,
    /// or the host asks for control back. Never true once timed out.
    pub fn should_yield(&self) -> bool {
        {
            let state = self.inner.state.borrow();
            if state.current_did_timeout {
                return false;
            }
            if let Some(first) = state.first {
                if state.expiration_of(first) < state.current_expiration_time {
                    return true;
                }
            }
        }
        self.inner.clock.should_yield_now()
    }

    /// Runs queued tasks. With `did_timeout` every expired task runs;
    /// otherwise tasks run until the host asks to yield.
    pub fn flush_work(&self, did_timeout: bool) {
        let previous_did_timeout = {
            let mut state = self.inner.state.borrow_mut();
            if state.is_executing_callback {
                return;
            }
            state.is_executing_callback = true;
            std::mem::replace(&mut state.current_did_timeout, did_timeout)
        };

        if did_timeout {
            loop {
                let current_time = self.now() as i64;
                let expired = {
                    let state = self.inner.state.borrow();
                    state
                        .first
                        .is_some_and(|first| state.expiration_of(first) <= current_time)
                };
                if !expired {
                    break;
                }
                self.flush_first_callback();
            }
        } else if self.first_callback_node().is_some() {
            loop {
                self.flush_first_callback();
                if self.first_callback_node().is_none() || self.inner.clock.should_yield_now() {
                    break;
                }
            }
        }

        let has_more = {
            let mut state = self.inner.state.borrow_mut();
            state.is_executing_callback = false;
            state.current_did_timeout = previous_did_timeout;
            if state.first.is_none() {
                state.is_host_callback_scheduled = false;
            }
            state.first.is_some()
        };
        if has_more {
            self.ensure_host_callback();
        }
    }

    fn flush_first_callback(&self) {
        let (id, mut task, priority_level, previous_priority, previous_expiration) = {
            let mut state = self.inner.state.borrow_mut();
            let Some(id) = state.first else {
                return;
            };
            state.unlink(id);
            let node = &mut state.nodes[id];
            node.state = NodeState::Running;
            let priority_level = node.priority_level;
            let expiration_time = node.expiration_time;
            let task = node.task.take();
            let Some(task) = task else {
                state.nodes.remove(id);
                return;
            };
            let previous_priority =
                std::mem::replace(&mut state.current_priority_level, priority_level);
            let previous_expiration =
                std::mem::replace(&mut state.current_expiration_time, expiration_time);
            (id, task, priority_level, previous_priority, previous_expiration)
        };

        let did_timeout = self.inner.state.borrow().current_did_timeout
            || priority_level == PriorityLevel::Immediate;
        let result = task(did_timeout);

        let became_head = {
            let mut state = self.inner.state.borrow_mut();
            state.current_priority_level = previous_priority;
            state.current_expiration_time = previous_expiration;
            let node = &mut state.nodes[id];
            if result == TaskResult::Continue && node.state == NodeState::Running {
                node.task = Some(task);
                state.link(id, |existing, new| existing >= new)
            } else {
                state.nodes.remove(id);
                false
            }
        };
        if became_head {
            self.ensure_host_callback();
        }
    }

    fn ensure_host_callback(&self) {
        let expiration_time = {
            let mut state = self.inner.state.borrow_mut();
            if state.is_executing_callback {
                return;
            }
            let Some(first) = state.first else {
                return;
            };
            let expiration_time = state.expiration_of(first);
            if state.is_host_callback_scheduled {
                drop(state);
                self.inner.clock.cancel_host_callback();
            } else {
                state.is_host_callback_scheduled = true;
            }
            expiration_time
        };
        let weak: Weak<SchedulerInner> = Rc::downgrade(&self.inner);
        self.inner.clock.request_host_callback(
            Box::new(move |did_timeout| {
                if let Some(inner) = weak.upgrade() {
                    Scheduler { inner }.flush_work(did_timeout);
                }
            }),
            expiration_time,
        );
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("Scheduler")
            .field("queued", &state.nodes.len())
            .field("current_priority_level", &state.current_priority_level)
            .field("is_executing_callback", &state.is_executing_callback)
            .finish()
    }
}

#[cfg(test)]
#[path = "tests/scheduler_tests.rs"]
mod tests;
