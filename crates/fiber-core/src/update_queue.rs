//! Prioritized update queues.
//!
//! A fiber and its alternate may each hold a queue. Both queues read from
//! one shared, append-only log, so an update enqueued once is visible to
//! both; each queue keeps its own cursor into the log, base state and
//! effect lists. A work-in-progress queue that still aliases the current
//! queue is forked (cheaply, sharing the log) the first time it is
//! processed.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use crate::expiration_time::{ExpirationTime, NO_WORK};
use crate::fiber::{EffectTag, FiberArena, FiberId, FiberProps, FiberUpdateQueue, MemoizedState};
use crate::fiber_root::RootState;

/// State that knows how to absorb a partial update.
pub trait MergeState: Clone {
    fn merge(&self, partial: &Self) -> Self;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UpdateTag {
    /// Merge the payload into the previous state.
    UpdateState,
    ReplaceState,
    /// Re-render without changing state.
    ForceUpdate,
    /// Replace the state and mark the fiber as having captured an error.
    CaptureUpdate,
}

pub enum UpdatePayload<S> {
    None,
    Value(S),
    Compute(Rc<dyn Fn(&S, &FiberProps) -> S>),
}

impl<S: Clone> Clone for UpdatePayload<S> {
    fn clone(&self) -> Self {
        match self {
            UpdatePayload::None => UpdatePayload::None,
            UpdatePayload::Value(value) => UpdatePayload::Value(value.clone()),
            UpdatePayload::Compute(compute) => UpdatePayload::Compute(compute.clone()),
        }
    }
}

pub struct Update<S> {
    pub expiration_time: ExpirationTime,
    pub tag: UpdateTag,
    pub payload: UpdatePayload<S>,
    /// Fired after the update commits.
    pub callback: Option<Rc<dyn Fn()>>,
}

impl<S> Update<S> {
    pub fn new(expiration_time: ExpirationTime, payload: UpdatePayload<S>) -> Self {
        Self {
            expiration_time,
            tag: UpdateTag::UpdateState,
            payload,
            callback: None,
        }
    }

    pub fn with_tag(mut self, tag: UpdateTag) -> Self {
        self.tag = tag;
        self
    }

    pub fn with_callback(mut self, callback: impl Fn() + 'static) -> Self {
        self.callback = Some(Rc::new(callback));
        self
    }
}

impl<S: Clone> Clone for Update<S> {
    fn clone(&self) -> Self {
        Self {
            expiration_time: self.expiration_time,
            tag: self.tag,
            payload: self.payload.clone(),
            callback: self.callback.clone(),
        }
    }
}

impl<S> fmt::Debug for Update<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Update")
            .field("expiration_time", &self.expiration_time)
            .field("tag", &self.tag)
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

struct UpdateLog<S> {
    /// Absolute index of `updates[0]`.
    offset: usize,
    updates: VecDeque<Update<S>>,
}

impl<S> UpdateLog<S> {
    fn end(&self) -> usize {
        self.offset + self.updates.len()
    }

    fn prune(&mut self, upto: usize) {
        while self.offset < upto && !self.updates.is_empty() {
            self.updates.pop_front();
            self.offset += 1;
        }
    }
}

/// Result of replaying a queue.
#[derive(Clone, Debug)]
pub struct ProcessedState<S> {
    pub state: S,
    /// Highest expiration time among skipped updates.
    pub remaining_expiration_time: ExpirationTime,
    pub has_force_update: bool,
}

pub struct UpdateQueue<S> {
    base_state: S,
    log: Rc<RefCell<UpdateLog<S>>>,
    first_update: usize,
    effects: Vec<Update<S>>,
}

impl<S: MergeState> UpdateQueue<S> {
    pub fn new(base_state: S) -> Self {
        Self {
            base_state,
            log: Rc::new(RefCell::new(UpdateLog {
                offset: 0,
                updates: VecDeque::new(),
            })),
            first_update: 0,
            effects: Vec::new(),
        }
    }

    /// A queue over the same log with its own cursor and base state.
    /// Effects are not carried over.
    pub fn fork(&self) -> Self {
        Self {
            base_state: self.base_state.clone(),
            log: self.log.clone(),
            first_update: self.first_update,
            effects: Vec::new(),
        }
    }

    /// A second queue sharing this queue's log but starting from `base_state`.
    fn sibling_with_state(&self, base_state: S) -> Self {
        Self {
            base_state,
            ..self.fork()
        }
    }

    pub fn base_state(&self) -> &S {
        &self.base_state
    }

    pub fn shares_log_with(&self, other: &UpdateQueue<S>) -> bool {
        Rc::ptr_eq(&self.log, &other.log)
    }

    pub fn enqueue(&self, update: Update<S>) {
        self.log.borrow_mut().updates.push_back(update);
    }

    /// Updates this queue has not folded into its base state yet.
    pub fn pending_len(&self) -> usize {
        self.log.borrow().end().saturating_sub(self.first_update)
    }

    pub fn has_effects(&self) -> bool {
        !self.effects.is_empty()
    }

    pub(crate) fn take_effects(&mut self) -> Vec<Update<S>> {
        std::mem::take(&mut self.effects)
    }

    /// Replays pending updates at `render_expiration_time`.
    ///
    /// Updates with a lower expiration time are skipped. The first skipped
    /// update becomes the new start of the queue and the state before it the
    /// new base state, so a later pass replays everything from there in
    /// order.
    pub fn process(
        &mut self,
        props: &FiberProps,
        render_expiration_time: ExpirationTime,
        effect_tag: &mut EffectTag,
    ) -> ProcessedState<S> {
        let mut has_force_update = false;
        let mut new_base_state = None;
        let mut new_first_update = None;
        let mut new_expiration_time = NO_WORK;
        let mut result_state = self.base_state.clone();

        let log_end = {
            let log = self.log.borrow();
            let start = self.first_update.max(log.offset);
            for index in start..log.end() {
                let update = &log.updates[index - log.offset];
                if update.expiration_time < render_expiration_time {
                    if new_first_update.is_none() {
                        new_first_update = Some(index);
                        new_base_state = Some(result_state.clone());
                    }
                    new_expiration_time = new_expiration_time.max(update.expiration_time);
                    continue;
                }
                result_state = apply_update(
                    update,
                    &result_state,
                    props,
                    effect_tag,
                    &mut has_force_update,
                );
                if update.callback.is_some() {
                    effect_tag.insert(EffectTag::CALLBACK);
                    self.effects.push(update.clone());
                }
            }
            log.end()
        };

        self.first_update = new_first_update.unwrap_or(log_end);
        self.base_state = new_base_state.unwrap_or_else(|| result_state.clone());

        ProcessedState {
            state: result_state,
            remaining_expiration_time: new_expiration_time,
            has_force_update,
        }
    }
}

impl<S: Clone> Clone for UpdateQueue<S> {
    fn clone(&self) -> Self {
        Self {
            base_state: self.base_state.clone(),
            log: self.log.clone(),
            first_update: self.first_update,
            effects: self.effects.clone(),
        }
    }
}

impl<S> fmt::Debug for UpdateQueue<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateQueue")
            .field("first_update", &self.first_update)
            .field("logged", &self.log.borrow().updates.len())
            .field("effects", &self.effects.len())
            .finish()
    }
}

fn apply_update<S: MergeState>(
    update: &Update<S>,
    previous: &S,
    props: &FiberProps,
    effect_tag: &mut EffectTag,
    has_force_update: &mut bool,
) -> S {
    let payload = || match &update.payload {
        UpdatePayload::None => None,
        UpdatePayload::Value(value) => Some(value.clone()),
        UpdatePayload::Compute(compute) => Some(compute(previous, props)),
    };
    match update.tag {
        UpdateTag::ReplaceState => payload().unwrap_or_else(|| previous.clone()),
        UpdateTag::CaptureUpdate => {
            effect_tag.remove(EffectTag::SHOULD_CAPTURE);
            effect_tag.insert(EffectTag::DID_CAPTURE);
            payload().unwrap_or_else(|| previous.clone())
        }
        UpdateTag::UpdateState => match payload() {
            Some(partial) => previous.merge(&partial),
            None => previous.clone(),
        },
        UpdateTag::ForceUpdate => {
            *has_force_update = true;
            previous.clone()
        }
    }
}

type RootQueue = Rc<RefCell<UpdateQueue<RootState>>>;

fn root_queue(fibers: &FiberArena, fiber: FiberId) -> Option<RootQueue> {
    match &fibers[fiber].update_queue {
        FiberUpdateQueue::Root(queue) => Some(queue.clone()),
        _ => None,
    }
}

fn root_state(fibers: &FiberArena, fiber: FiberId) -> RootState {
    match &fibers[fiber].memoized_state {
        MemoizedState::Root(state) => state.clone(),
        _ => RootState::default(),
    }
}

/// Makes sure `fiber` and its alternate both have queues, creating or
/// forking them lazily, and appends `update` to the shared log.
pub(crate) fn enqueue_update(fibers: &mut FiberArena, fiber: FiberId, update: Update<RootState>) {
    let alternate = fibers[fiber].alternate;
    let queue1 = root_queue(fibers, fiber);
    let queue2 = alternate.and_then(|alternate| root_queue(fibers, alternate));

    let queue = match (queue1, alternate, queue2) {
        (Some(queue1), _, _) if alternate.is_none() => queue1,
        (None, None, _) => {
            let queue = Rc::new(RefCell::new(UpdateQueue::new(root_state(fibers, fiber))));
            fibers[fiber].update_queue = FiberUpdateQueue::Root(queue.clone());
            queue
        }
        (None, Some(alternate), None) => {
            let queue1 = UpdateQueue::new(root_state(fibers, fiber));
            let queue2 = queue1.sibling_with_state(root_state(fibers, alternate));
            let queue1 = Rc::new(RefCell::new(queue1));
            fibers[fiber].update_queue = FiberUpdateQueue::Root(queue1.clone());
            fibers[alternate].update_queue = FiberUpdateQueue::Root(Rc::new(RefCell::new(queue2)));
            queue1
        }
        (None, Some(_), Some(queue2)) => {
            let queue1 = Rc::new(RefCell::new(queue2.borrow().fork()));
            fibers[fiber].update_queue = FiberUpdateQueue::Root(queue1.clone());
            queue1
        }
        (Some(queue1), Some(alternate), None) => {
            let queue2 = Rc::new(RefCell::new(queue1.borrow().fork()));
            fibers[alternate].update_queue = FiberUpdateQueue::Root(queue2);
            queue1
        }
        (Some(queue1), _, _) => queue1,
    };
    queue.borrow().enqueue(update);
}

/// Gives `work_in_progress` its own queue if it still aliases the current one.
fn ensure_work_in_progress_queue_is_a_copy(
    fibers: &mut FiberArena,
    work_in_progress: FiberId,
) -> Option<RootQueue> {
    let queue = root_queue(fibers, work_in_progress)?;
    let current_queue = fibers[work_in_progress]
        .alternate
        .and_then(|current| root_queue(fibers, current));
    if current_queue.is_some_and(|current_queue| Rc::ptr_eq(&current_queue, &queue)) {
        let copy = Rc::new(RefCell::new(queue.borrow().fork()));
        fibers[work_in_progress].update_queue = FiberUpdateQueue::Root(copy.clone());
        return Some(copy);
    }
    Some(queue)
}

/// Processes the root queue of `work_in_progress`, storing the resulting
/// state and remaining expiration time on the fiber. Returns whether a
/// forced update was applied.
pub(crate) fn process_update_queue(
    fibers: &mut FiberArena,
    work_in_progress: FiberId,
    render_expiration_time: ExpirationTime,
) -> bool {
    let Some(queue) = ensure_work_in_progress_queue_is_a_copy(fibers, work_in_progress) else {
        return false;
    };
    let props = fibers[work_in_progress].pending_props.clone();
    let mut effect_tag = fibers[work_in_progress].effect_tag;
    let processed = queue
        .borrow_mut()
        .process(&props, render_expiration_time, &mut effect_tag);

    let current_cursor = fibers[work_in_progress]
        .alternate
        .and_then(|current| root_queue(fibers, current))
        .map(|current_queue| current_queue.borrow().first_update);
    {
        let queue = queue.borrow();
        let upto = current_cursor.map_or(queue.first_update, |cursor| cursor.min(queue.first_update));
        queue.log.borrow_mut().prune(upto);
    }

    let fiber = &mut fibers[work_in_progress];
    fiber.effect_tag = effect_tag;
    fiber.expiration_time = processed.remaining_expiration_time;
    fiber.memoized_state = MemoizedState::Root(processed.state);
    processed.has_force_update
}

/// Fires the callbacks of committed updates.
pub(crate) fn commit_update_queue(queue: &RefCell<UpdateQueue<RootState>>) {
    let effects = queue.borrow_mut().take_effects();
    for update in effects {
        if let Some(callback) = update.callback {
            callback();
        }
    }
}

#[cfg(test)]
#[path = "tests/update_queue_tests.rs"]
mod tests;
