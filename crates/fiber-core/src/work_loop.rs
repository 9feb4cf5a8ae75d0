//! The work driver: schedules roots, runs render passes unit by unit and
//! commits finished trees.
//!
//! At most one root is mid-pass at a time. The position of that pass (root,
//! target expiration time, next unit of work) lives on [`ReconcilerInner`],
//! so a yielded pass resumes from exactly where it stopped when the
//! scheduler runs its task again.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use slotmap::SlotMap;

use crate::begin_work::{begin_work, is_hidden};
use crate::commit_work::{
    commit_deletion, commit_lifecycles, commit_passive_hook_effects, commit_placement,
    commit_reset_text_content, commit_work,
};
use crate::complete_work::complete_work;
use crate::error::FiberError;
use crate::expiration_time::{
    compute_async_expiration, compute_interactive_expiration, expiration_time_to_ms,
    infer_priority_from_expiration_time, ms_to_expiration_time, ExpirationTime, NEVER, NO_WORK,
    SYNC,
};
use crate::fiber::{EffectTag, FiberArena, FiberId, FiberProps, StateNode, WorkTag};
use crate::fiber_root::{FiberRoot, RootId};
use crate::hooks::{try_eager_state, AnyValue, HookQueue, UpdateTarget};
use crate::host::HostConfig;
use crate::scheduler::{CallbackId, PriorityLevel, Scheduler, TaskResult};

/// Synchronous commits one root may trigger in a row before the next update
/// on it fails with [`FiberError::NestedUpdateLimit`].
pub const NESTED_UPDATE_LIMIT: usize = 50;

/// Upper bound for the timeout handed to the scheduler for async work.
const MAX_CALLBACK_TIMEOUT_MS: i64 = 5000;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum WorkPhase {
    NotWorking,
    Rendering,
    Committing,
}

/// Outcome of one call into a root's render pass.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum RootStatus {
    /// Committed, or nothing was pending at this expiration time.
    Done,
    /// Stopped between two units of work; resume later.
    Yielded,
    /// The target already expired; render everything expired so far instead.
    RetryAt(ExpirationTime),
}

pub(crate) struct ReconcilerInner<H: HostConfig> {
    pub(crate) fibers: RefCell<FiberArena>,
    pub(crate) roots: RefCell<SlotMap<RootId, FiberRoot>>,
    pub(crate) host: RefCell<H>,
    pub(crate) scheduler: Scheduler,
    self_ref: Weak<ReconcilerInner<H>>,

    work_phase: Cell<WorkPhase>,
    work_in_progress_root: Cell<Option<RootId>>,
    work_in_progress: Cell<Option<FiberId>>,
    render_expiration_time: Cell<ExpirationTime>,
    current_event_time: Cell<ExpirationTime>,

    nested_update_count: Cell<usize>,
    root_with_nested_updates: Cell<Option<RootId>>,

    pending_passive_effects: RefCell<Vec<FiberId>>,
    passive_effects_callback: Cell<Option<CallbackId>>,

    sync_queue: RefCell<VecDeque<RootId>>,
    is_flushing_sync_queue: Cell<bool>,
    /// A fatal error raised while no caller could receive it directly.
    pending_error: RefCell<Option<FiberError>>,
}

impl<H: HostConfig + 'static> ReconcilerInner<H> {
    pub(crate) fn new(host: H, scheduler: Scheduler) -> Rc<Self> {
        Rc::new_cyclic(|self_ref| Self {
            fibers: RefCell::new(FiberArena::new()),
            roots: RefCell::new(SlotMap::with_key()),
            host: RefCell::new(host),
            scheduler,
            self_ref: self_ref.clone(),
            work_phase: Cell::new(WorkPhase::NotWorking),
            work_in_progress_root: Cell::new(None),
            work_in_progress: Cell::new(None),
            render_expiration_time: Cell::new(NO_WORK),
            current_event_time: Cell::new(NO_WORK),
            nested_update_count: Cell::new(0),
            root_with_nested_updates: Cell::new(None),
            pending_passive_effects: RefCell::new(Vec::new()),
            passive_effects_callback: Cell::new(None),
            sync_queue: RefCell::new(VecDeque::new()),
            is_flushing_sync_queue: Cell::new(false),
            pending_error: RefCell::new(None),
        })
    }

    pub(crate) fn update_target(&self) -> Weak<dyn UpdateTarget> {
        let target: Weak<dyn UpdateTarget> = self.self_ref.clone();
        target
    }

    pub(crate) fn work_phase(&self) -> WorkPhase {
        self.work_phase.get()
    }

    pub(crate) fn create_root(&self, container: crate::host::NodeId) -> RootId {
        let mut roots = self.roots.borrow_mut();
        let mut fibers = self.fibers.borrow_mut();
        roots.insert_with_key(|root| {
            let current = fibers.create_host_root_fiber(root);
            FiberRoot::new(container, current)
        })
    }

    pub(crate) fn request_current_time(&self) -> ExpirationTime {
        if self.work_phase.get() != WorkPhase::NotWorking {
            return ms_to_expiration_time(self.scheduler.now());
        }
        if self.current_event_time.get() != NO_WORK {
            // Updates within one event share a start time.
            return self.current_event_time.get();
        }
        let current_time = ms_to_expiration_time(self.scheduler.now());
        self.current_event_time.set(current_time);
        current_time
    }

    pub(crate) fn compute_expiration_for_fiber(&self, current_time: ExpirationTime) -> ExpirationTime {
        if self.work_phase.get() == WorkPhase::Rendering {
            return self.render_expiration_time.get();
        }
        let mut expiration_time = match self.scheduler.current_priority_level() {
            PriorityLevel::Immediate => SYNC,
            PriorityLevel::UserBlocking => compute_interactive_expiration(current_time),
            PriorityLevel::Normal | PriorityLevel::Low => compute_async_expiration(current_time),
            PriorityLevel::Idle => NEVER,
        };
        // Never land on the expiration time of the pass in progress.
        if self.work_in_progress_root.get().is_some()
            && expiration_time == self.render_expiration_time.get()
        {
            expiration_time -= 1;
        }
        expiration_time
    }

    fn check_for_nested_updates(&self) -> Result<(), FiberError> {
        if self.nested_update_count.get() > NESTED_UPDATE_LIMIT {
            self.nested_update_count.set(0);
            self.root_with_nested_updates.set(None);
            return Err(FiberError::NestedUpdateLimit);
        }
        Ok(())
    }

    /// Raises the expiration times on the path from `fiber` to its root,
    /// alternates included. Returns the root, or `None` if the fiber is not
    /// mounted anywhere.
    fn mark_update_time_from_fiber_to_root(
        &self,
        fiber: FiberId,
        expiration_time: ExpirationTime,
    ) -> Option<RootId> {
        let mut fibers = self.fibers.borrow_mut();
        let target = fibers.get_mut(fiber)?;
        if target.expiration_time < expiration_time {
            target.expiration_time = expiration_time;
        }
        let alternate = target.alternate;
        let mut parent = target.parent;
        let mut root = match (target.parent, target.tag, target.state_node) {
            (None, WorkTag::HostRoot, StateNode::Root(root)) => Some(root),
            _ => None,
        };
        if let Some(alternate) = alternate.and_then(|alternate| fibers.get_mut(alternate)) {
            if alternate.expiration_time < expiration_time {
                alternate.expiration_time = expiration_time;
            }
        }

        while let Some(node) = parent {
            let fiber = fibers.get_mut(node)?;
            if fiber.child_expiration_time < expiration_time {
                fiber.child_expiration_time = expiration_time;
            }
            let alternate = fiber.alternate;
            let next = fiber.parent;
            if let (None, WorkTag::HostRoot, StateNode::Root(id)) =
                (fiber.parent, fiber.tag, fiber.state_node)
            {
                root = Some(id);
            }
            if let Some(alternate) = alternate.and_then(|alternate| fibers.get_mut(alternate)) {
                if alternate.child_expiration_time < expiration_time {
                    alternate.child_expiration_time = expiration_time;
                }
            }
            parent = next;
        }

        let root = root?;
        drop(fibers);
        self.roots.borrow_mut().get_mut(root)?.mark_pending_time(expiration_time);
        Some(root)
    }

    pub(crate) fn schedule_update_on_fiber(
        &self,
        fiber: FiberId,
        expiration_time: ExpirationTime,
    ) -> Result<(), FiberError> {
        self.check_for_nested_updates()?;
        let Some(root) = self.mark_update_time_from_fiber_to_root(fiber, expiration_time) else {
            log::error!("update on a fiber that is not mounted in any root was dropped");
            return Ok(());
        };
        let priority_level = self.scheduler.current_priority_level();
        self.schedule_callback_for_root(root, priority_level, expiration_time);
        if expiration_time == SYNC && self.work_phase.get() == WorkPhase::NotWorking {
            self.flush_sync_queue()?;
        }
        Ok(())
    }

    /// Makes sure a task for `root` at `expiration_time` or more urgent is
    /// queued. Sync work goes to the sync queue instead of the scheduler.
    fn schedule_callback_for_root(
        &self,
        root: RootId,
        priority_level: PriorityLevel,
        expiration_time: ExpirationTime,
    ) {
        let stale_callback = {
            let mut roots = self.roots.borrow_mut();
            let Some(fiber_root) = roots.get_mut(root) else {
                return;
            };
            if fiber_root.callback_expiration_time >= expiration_time {
                return;
            }
            fiber_root.callback_expiration_time = expiration_time;
            fiber_root.callback_node.take()
        };
        if let Some(stale_callback) = stale_callback {
            self.scheduler.cancel_callback(stale_callback);
        }

        if expiration_time == SYNC {
            let mut queue = self.sync_queue.borrow_mut();
            if !queue.contains(&root) {
                queue.push_back(root);
            }
            return;
        }

        let timeout = (expiration_time != NEVER).then(|| {
            let remaining =
                expiration_time_to_ms(expiration_time) as i64 - self.scheduler.now() as i64;
            remaining.min(MAX_CALLBACK_TIMEOUT_MS)
        });
        let weak = self.self_ref.clone();
        let target = Cell::new(expiration_time);
        let callback_node = self.scheduler.schedule_callback(
            priority_level,
            Box::new(move |did_timeout| match weak.upgrade() {
                Some(inner) => inner.run_root_callback(root, &target, did_timeout),
                None => TaskResult::Done,
            }),
            timeout,
        );
        if let Some(fiber_root) = self.roots.borrow_mut().get_mut(root) {
            fiber_root.callback_node = Some(callback_node);
        }
    }

    /// Body of a scheduled root task. `target` carries the expiration time
    /// across continuations.
    fn run_root_callback(
        &self,
        root: RootId,
        target: &Cell<ExpirationTime>,
        did_timeout: bool,
    ) -> TaskResult {
        self.current_event_time.set(NO_WORK);
        let callback_node = self.roots.borrow().get(root).and_then(|root| root.callback_node);

        let result = loop {
            match self.render_root(root, target.get(), did_timeout) {
                Ok(RootStatus::RetryAt(expiration_time)) => target.set(expiration_time),
                other => break other,
            }
        };

        let result = match result {
            Ok(RootStatus::Yielded) => return TaskResult::Continue,
            Ok(_) => self.flush_sync_queue(),
            Err(err) => Err(err),
        };
        if let Err(err) = result {
            self.report_error(Some(root), err);
        }
        if let Some(err) = self.take_pending_error() {
            self.report_error(Some(root), err);
        }

        let mut roots = self.roots.borrow_mut();
        if let Some(fiber_root) = roots.get_mut(root) {
            if fiber_root.callback_node == callback_node {
                fiber_root.callback_node = None;
                fiber_root.callback_expiration_time = NO_WORK;
            }
        }
        TaskResult::Done
    }

    fn report_error(&self, root: Option<RootId>, err: FiberError) {
        log::error!("render aborted: {err}");
        let mut roots = self.roots.borrow_mut();
        match root.and_then(|root| roots.get_mut(root)) {
            Some(fiber_root) => fiber_root.errors.push(err),
            None => log::warn!("no root to record the error on"),
        }
    }

    /// Runs every root in the sync queue at `SYNC`, at immediate priority.
    pub(crate) fn flush_sync_queue(&self) -> Result<(), FiberError> {
        if self.is_flushing_sync_queue.replace(true) {
            return Ok(());
        }
        self.current_event_time.set(NO_WORK);
        let result = self.scheduler.run_with_priority(PriorityLevel::Immediate, || loop {
            let next = self.sync_queue.borrow_mut().pop_front();
            let Some(root) = next else {
                break Ok(());
            };
            let mut result = self.perform_sync_work_on_root(root);
            if let Some(err) = self.pending_error.borrow_mut().take() {
                result = result.and(Err(err));
            }
            if let Err(err) = result {
                self.sync_queue.borrow_mut().clear();
                break Err(err);
            }
        });
        self.is_flushing_sync_queue.set(false);
        result
    }

    fn perform_sync_work_on_root(&self, root: RootId) -> Result<(), FiberError> {
        {
            let mut roots = self.roots.borrow_mut();
            let fiber_root = roots.get_mut(root).ok_or(FiberError::UnknownRoot)?;
            if fiber_root.callback_expiration_time == SYNC {
                fiber_root.callback_expiration_time = NO_WORK;
                fiber_root.callback_node = None;
            }
        }
        match self.render_root(root, SYNC, true)? {
            RootStatus::Done => Ok(()),
            status => {
                log::error!("sync pass ended as {status:?}");
                Ok(())
            }
        }
    }

    fn render_root(
        &self,
        root: RootId,
        expiration_time: ExpirationTime,
        is_sync: bool,
    ) -> Result<RootStatus, FiberError> {
        let first_pending_time = self
            .roots
            .borrow()
            .get(root)
            .ok_or(FiberError::UnknownRoot)?
            .first_pending_time;
        if first_pending_time < expiration_time {
            return Ok(RootStatus::Done);
        }

        self.flush_passive_effects();

        if self.work_in_progress_root.get() != Some(root)
            || self.render_expiration_time.get() != expiration_time
        {
            self.prepare_fresh_stack(root, expiration_time);
        }

        if self.work_in_progress.get().is_some() {
            let previous_phase = self.work_phase.replace(WorkPhase::Rendering);
            if is_sync && expiration_time != SYNC {
                let current_time = self.request_current_time();
                if current_time < expiration_time {
                    self.work_phase.set(previous_phase);
                    return Ok(RootStatus::RetryAt(current_time));
                }
            }
            let result = if is_sync {
                self.work_loop_sync()
            } else {
                self.work_loop()
            };
            self.work_phase.set(previous_phase);
            if let Err(err) = result {
                self.abandon_pass();
                return Err(err);
            }
            if self.work_in_progress.get().is_some() {
                return Ok(RootStatus::Yielded);
            }
        }

        let finished_work = {
            let current = self.roots.borrow()[root].current;
            self.fibers.borrow()[current].alternate
        };
        self.roots.borrow_mut()[root].finished_work = finished_work;
        self.work_in_progress_root.set(None);
        self.commit_root(root, expiration_time);
        Ok(RootStatus::Done)
    }

    fn prepare_fresh_stack(&self, root: RootId, expiration_time: ExpirationTime) {
        log::trace!("fresh pass on {root:?} at {expiration_time}");
        let current = {
            let mut roots = self.roots.borrow_mut();
            let fiber_root = &mut roots[root];
            fiber_root.finished_work = None;
            fiber_root.current
        };
        let mut fibers = self.fibers.borrow_mut();
        fibers.discard_fresh();
        let work_in_progress = fibers.create_work_in_progress(current, FiberProps::None);
        self.work_in_progress_root.set(Some(root));
        self.work_in_progress.set(Some(work_in_progress));
        self.render_expiration_time.set(expiration_time);
    }

    fn abandon_pass(&self) {
        self.fibers.borrow_mut().discard_fresh();
        self.work_in_progress_root.set(None);
        self.work_in_progress.set(None);
        self.render_expiration_time.set(NO_WORK);
    }

    fn work_loop_sync(&self) -> Result<(), FiberError> {
        while let Some(unit) = self.work_in_progress.get() {
            self.work_in_progress.set(self.perform_unit_of_work(unit)?);
        }
        Ok(())
    }

    fn work_loop(&self) -> Result<(), FiberError> {
        while let Some(unit) = self.work_in_progress.get() {
            if self.scheduler.should_yield() {
                break;
            }
            self.work_in_progress.set(self.perform_unit_of_work(unit)?);
        }
        Ok(())
    }

    fn perform_unit_of_work(&self, unit: FiberId) -> Result<Option<FiberId>, FiberError> {
        let current = self.fibers.borrow()[unit].alternate;
        let next = begin_work(self, current, unit, self.render_expiration_time.get())?;
        {
            let mut fibers = self.fibers.borrow_mut();
            let fiber = &mut fibers[unit];
            fiber.memoized_props = fiber.pending_props.clone();
        }
        match next {
            Some(next) => Ok(Some(next)),
            None => self.complete_unit_of_work(unit),
        }
    }

    /// Completes `unit` and its ancestors until one has a sibling to begin.
    fn complete_unit_of_work(&self, unit: FiberId) -> Result<Option<FiberId>, FiberError> {
        let render_expiration_time = self.render_expiration_time.get();
        let mut work_in_progress = unit;
        loop {
            let (current, return_fiber, sibling) = {
                let fibers = self.fibers.borrow();
                let fiber = &fibers[work_in_progress];
                (fiber.alternate, fiber.parent, fiber.sibling)
            };
            if let Some(next) =
                complete_work(self, current, work_in_progress, render_expiration_time)?
            {
                return Ok(Some(next));
            }

            let mut fibers = self.fibers.borrow_mut();
            reset_child_expiration_time(&mut fibers, work_in_progress, render_expiration_time);
            if let Some(parent) = return_fiber {
                append_effects_to_parent(&mut fibers, parent, work_in_progress);
            }
            if let Some(sibling) = sibling {
                return Ok(Some(sibling));
            }
            match return_fiber {
                Some(parent) => work_in_progress = parent,
                None => return Ok(None),
            }
        }
    }

    fn commit_root(&self, root: RootId, expiration_time: ExpirationTime) {
        self.flush_passive_effects();
        let Some(finished_work) = self.roots.borrow_mut()[root].finished_work.take() else {
            return;
        };

        let effects = {
            let mut roots = self.roots.borrow_mut();
            let mut fibers = self.fibers.borrow_mut();
            let fiber_root = &mut roots[root];
            fiber_root.callback_node = None;
            fiber_root.callback_expiration_time = NO_WORK;

            let finished = &fibers[finished_work];
            let remaining = finished.expiration_time.max(finished.child_expiration_time);
            fiber_root.mark_committed(expiration_time, remaining);

            if fibers[finished_work].effect_tag.has_side_effects() {
                append_to_own_effect_list(&mut fibers, finished_work);
            }
            collect_effect_list(&mut fibers, finished_work)
        };
        log::debug!("committing {} effects on {root:?}", effects.len());

        let previous_phase = self.work_phase.replace(WorkPhase::Committing);

        let mut deletions = Vec::new();
        for &effect in &effects {
            let effect_tag = self.fibers.borrow()[effect].effect_tag;
            if effect_tag.contains(EffectTag::CONTENT_RESET) {
                commit_reset_text_content(self, effect);
            }
            let primary = effect_tag & (EffectTag::PLACEMENT | EffectTag::UPDATE | EffectTag::DELETION);
            if primary == EffectTag::PLACEMENT {
                commit_placement(self, effect);
                self.fibers.borrow_mut()[effect]
                    .effect_tag
                    .remove(EffectTag::PLACEMENT);
            } else if primary == EffectTag::PLACEMENT_AND_UPDATE {
                commit_placement(self, effect);
                self.fibers.borrow_mut()[effect]
                    .effect_tag
                    .remove(EffectTag::PLACEMENT);
                commit_work(self, effect);
            } else if primary == EffectTag::UPDATE {
                commit_work(self, effect);
            } else if primary.contains(EffectTag::DELETION) {
                commit_deletion(self, effect);
                deletions.push(effect);
            }
        }

        self.roots.borrow_mut()[root].current = finished_work;

        let mut passive = Vec::new();
        for &effect in &effects {
            let effect_tag = self.fibers.borrow()[effect].effect_tag;
            if effect_tag.contains(EffectTag::DELETION) {
                continue;
            }
            if effect_tag.intersects(EffectTag::UPDATE | EffectTag::CALLBACK) {
                commit_lifecycles(self, effect);
            }
            if effect_tag.contains(EffectTag::PASSIVE) {
                passive.push(effect);
            }
        }

        self.work_phase.set(previous_phase);
        {
            let mut fibers = self.fibers.borrow_mut();
            fibers.keep_fresh();
            for deleted in deletions {
                fibers.release_subtree(deleted);
            }
        }

        if !passive.is_empty() {
            self.schedule_passive_effects(passive);
        }

        let remaining = self.roots.borrow()[root].first_pending_time;
        if remaining != NO_WORK {
            let current_time = self.request_current_time();
            let priority_level = infer_priority_from_expiration_time(current_time, remaining);
            self.schedule_callback_for_root(root, priority_level, remaining);
        }

        if remaining == SYNC {
            if self.root_with_nested_updates.get() == Some(root) {
                self.nested_update_count.set(self.nested_update_count.get() + 1);
            } else {
                self.nested_update_count.set(0);
                self.root_with_nested_updates.set(Some(root));
            }
        } else {
            self.nested_update_count.set(0);
        }
    }

    fn schedule_passive_effects(&self, effects: Vec<FiberId>) {
        self.pending_passive_effects.borrow_mut().extend(effects);
        if self.passive_effects_callback.get().is_some() {
            return;
        }
        let weak = self.self_ref.clone();
        let callback = self.scheduler.schedule_callback(
            PriorityLevel::Normal,
            Box::new(move |_| {
                if let Some(inner) = weak.upgrade() {
                    inner.passive_effects_callback.set(None);
                    inner.flush_passive_effects();
                    if inner.work_phase.get() == WorkPhase::NotWorking {
                        if let Err(err) = inner.flush_sync_queue() {
                            inner.report_error(None, err);
                        }
                    }
                }
                TaskResult::Done
            }),
            None,
        );
        self.passive_effects_callback.set(Some(callback));
    }

    /// Runs pending passive effects now. Returns whether there were any.
    pub(crate) fn flush_passive_effects(&self) -> bool {
        let effects = std::mem::take(&mut *self.pending_passive_effects.borrow_mut());
        if effects.is_empty() {
            return false;
        }
        if let Some(callback) = self.passive_effects_callback.take() {
            self.scheduler.cancel_callback(callback);
        }
        let queues: Vec<_> = {
            let fibers = self.fibers.borrow();
            effects
                .iter()
                .filter_map(|&fiber| fibers.get(fiber).map(|fiber| fiber.update_queue.clone()))
                .collect()
        };
        let previous_phase = self.work_phase.replace(WorkPhase::Committing);
        for queue in &queues {
            commit_passive_hook_effects(queue);
        }
        self.work_phase.set(previous_phase);
        true
    }

    fn take_pending_error(&self) -> Option<FiberError> {
        self.pending_error.borrow_mut().take()
    }

    fn root_of(&self, fiber: FiberId) -> Option<RootId> {
        let fibers = self.fibers.borrow();
        let mut node = fiber;
        loop {
            let current = fibers.get(node)?;
            match current.parent {
                Some(parent) => node = parent,
                None => {
                    return match current.state_node {
                        StateNode::Root(root) => Some(root),
                        _ => None,
                    }
                }
            }
        }
    }
}

impl<H: HostConfig + 'static> UpdateTarget for ReconcilerInner<H> {
    fn dispatch_action(&self, fiber: FiberId, queue: &Rc<RefCell<HookQueue>>, action: AnyValue) {
        let current_time = self.request_current_time();
        let expiration_time = self.compute_expiration_for_fiber(current_time);
        let seq = queue.borrow_mut().push(expiration_time, action);

        let is_idle = {
            let fibers = self.fibers.borrow();
            let Some(target) = fibers.get(fiber) else {
                log::warn!("state update on a released fiber ignored");
                return;
            };
            target.expiration_time == NO_WORK
                && target
                    .alternate
                    .and_then(|alternate| fibers.get(alternate))
                    .map_or(true, |alternate| alternate.expiration_time == NO_WORK)
        };
        // Nothing else is queued on this fiber, so the result can be
        // computed now; an unchanged state needs no render at all.
        if is_idle && try_eager_state(queue, seq) {
            return;
        }

        if let Err(err) = self.schedule_update_on_fiber(fiber, expiration_time) {
            log::error!("state update failed: {err}");
            let root = self.root_of(fiber);
            if self.work_phase.get() == WorkPhase::NotWorking && !self.is_flushing_sync_queue.get() {
                self.report_error(root, err);
            } else {
                *self.pending_error.borrow_mut() = Some(err);
            }
        }
    }
}

/// Recomputes `child_expiration_time` of a completed fiber from its children.
fn reset_child_expiration_time(
    fibers: &mut FiberArena,
    completed_work: FiberId,
    render_expiration_time: ExpirationTime,
) {
    // A subtree still hidden keeps its `NEVER` marker until the idle pass.
    // Once shown, the marker copied from the current fiber is stale.
    if render_expiration_time != NEVER
        && fibers[completed_work].child_expiration_time == NEVER
        && is_hidden(fibers, completed_work)
    {
        return;
    }
    let mut new_child_expiration_time = NO_WORK;
    let mut child = fibers[completed_work].child;
    while let Some(current) = child {
        let fiber = &fibers[current];
        new_child_expiration_time = new_child_expiration_time
            .max(fiber.expiration_time)
            .max(fiber.child_expiration_time);
        child = fiber.sibling;
    }
    fibers[completed_work].child_expiration_time = new_child_expiration_time;
}

/// Splices the effect list of `completed` onto its parent's, followed by
/// `completed` itself if it has side effects of its own.
fn append_effects_to_parent(fibers: &mut FiberArena, parent: FiberId, completed: FiberId) {
    let (first_effect, last_effect, effect_tag) = {
        let fiber = &fibers[completed];
        (fiber.first_effect, fiber.last_effect, fiber.effect_tag)
    };
    if fibers[parent].first_effect.is_none() {
        fibers[parent].first_effect = first_effect;
    }
    if let Some(last_effect) = last_effect {
        if let Some(parent_last) = fibers[parent].last_effect {
            fibers[parent_last].next_effect = first_effect;
        }
        fibers[parent].last_effect = Some(last_effect);
    }
    if effect_tag.has_side_effects() {
        match fibers[parent].last_effect {
            Some(parent_last) => fibers[parent_last].next_effect = Some(completed),
            None => fibers[parent].first_effect = Some(completed),
        }
        fibers[parent].last_effect = Some(completed);
    }
}

fn append_to_own_effect_list(fibers: &mut FiberArena, fiber: FiberId) {
    match fibers[fiber].last_effect {
        Some(last) => fibers[last].next_effect = Some(fiber),
        None => fibers[fiber].first_effect = Some(fiber),
    }
    fibers[fiber].last_effect = Some(fiber);
}

/// Walks the effect list from `fiber.first_effect`, unlinking it as it goes.
fn collect_effect_list(fibers: &mut FiberArena, fiber: FiberId) -> Vec<FiberId> {
    let mut effects = Vec::new();
    let mut next = fibers[fiber].first_effect.take();
    fibers[fiber].last_effect = None;
    while let Some(effect) = next {
        effects.push(effect);
        next = fibers[effect].next_effect.take();
        if effect == fiber {
            break;
        }
    }
    effects
}

#[cfg(test)]
#[path = "tests/work_loop_tests.rs"]
mod tests;
