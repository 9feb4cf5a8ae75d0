//! Public entry point: containers, top-level updates and inspection.

use std::fmt;
use std::rc::Rc;

use crate::element::Child;
use crate::error::FiberError;
use crate::expiration_time::ExpirationTime;
use crate::fiber::{FiberArena, FiberId};
use crate::fiber_root::{RootId, RootState};
use crate::hooks::HookKind;
use crate::host::{HostConfig, NodeId};
use crate::platform::HostClock;
use crate::scheduler::{PriorityLevel, Scheduler};
use crate::update_queue::{enqueue_update, Update, UpdatePayload};
use crate::work_loop::{ReconcilerInner, WorkPhase};

/// Owns the fiber trees of any number of roots rendered into one host.
pub struct Reconciler<H: HostConfig + 'static> {
    inner: Rc<ReconcilerInner<H>>,
}

impl<H: HostConfig + 'static> Reconciler<H> {
    pub fn new(host: H, clock: Rc<dyn HostClock>) -> Self {
        Self::with_scheduler(host, Scheduler::new(clock))
    }

    /// Shares `scheduler` with other users of the same task queue.
    pub fn with_scheduler(host: H, scheduler: Scheduler) -> Self {
        Self {
            inner: ReconcilerInner::new(host, scheduler),
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    /// Registers `container` as a root. Nothing renders until the first
    /// [`Reconciler::update_container`].
    pub fn create_container(&self, container: NodeId) -> RootId {
        self.inner.create_root(container)
    }

    /// Schedules `element` as the new content of `root` at the current
    /// priority and returns the expiration time it was scheduled at.
    ///
    /// At immediate priority the render and commit happen before this
    /// returns, and fatal errors from them are returned here.
    pub fn update_container(
        &self,
        element: impl Into<Child>,
        root: RootId,
    ) -> Result<ExpirationTime, FiberError> {
        self.schedule_root_update(element.into(), root, None)
    }

    /// Like [`Reconciler::update_container`], calling `on_done` once the
    /// update is committed.
    pub fn update_container_with_callback(
        &self,
        element: impl Into<Child>,
        root: RootId,
        on_done: impl Fn() + 'static,
    ) -> Result<ExpirationTime, FiberError> {
        self.schedule_root_update(element.into(), root, Some(Rc::new(on_done)))
    }

    /// Renders and commits `element` synchronously.
    pub fn update_container_sync(
        &self,
        element: impl Into<Child>,
        root: RootId,
    ) -> Result<ExpirationTime, FiberError> {
        let element = element.into();
        self.inner
            .scheduler
            .run_with_priority(PriorityLevel::Immediate, || {
                self.schedule_root_update(element, root, None)
            })
    }

    fn schedule_root_update(
        &self,
        element: Child,
        root: RootId,
        callback: Option<Rc<dyn Fn()>>,
    ) -> Result<ExpirationTime, FiberError> {
        let current = self
            .inner
            .roots
            .borrow()
            .get(root)
            .ok_or(FiberError::UnknownRoot)?
            .current;
        let current_time = self.inner.request_current_time();
        let expiration_time = self.inner.compute_expiration_for_fiber(current_time);

        let mut update = Update::new(expiration_time, UpdatePayload::Value(RootState { element }));
        update.callback = callback;

        self.inner.flush_passive_effects();
        enqueue_update(&mut self.inner.fibers.borrow_mut(), current, update);
        self.inner.schedule_update_on_fiber(current, expiration_time)?;
        Ok(expiration_time)
    }

    /// Runs `f` at immediate priority and flushes the synchronous work it
    /// scheduled, such as state updates dispatched inside it.
    pub fn flush_sync<R>(&self, f: impl FnOnce() -> R) -> Result<R, FiberError> {
        let result = self
            .inner
            .scheduler
            .run_with_priority(PriorityLevel::Immediate, f);
        self.inner.flush_sync_queue()?;
        Ok(result)
    }

    /// Runs passive effects that are waiting for their scheduled task.
    /// Returns whether there were any.
    pub fn flush_passive_effects(&self) -> Result<bool, FiberError> {
        let flushed = self.inner.flush_passive_effects();
        self.inner.flush_sync_queue()?;
        Ok(flushed)
    }

    /// Fatal errors from passes that ran without a caller to return them to.
    pub fn take_errors(&self, root: RootId) -> Vec<FiberError> {
        self.inner
            .roots
            .borrow_mut()
            .get_mut(root)
            .map(|root| std::mem::take(&mut root.errors))
            .unwrap_or_default()
    }

    pub fn is_working(&self) -> bool {
        self.inner.work_phase() != WorkPhase::NotWorking
    }

    pub fn with_host<R>(&self, f: impl FnOnce(&H) -> R) -> R {
        f(&self.inner.host.borrow())
    }

    pub fn with_host_mut<R>(&self, f: impl FnOnce(&mut H) -> R) -> R {
        f(&mut self.inner.host.borrow_mut())
    }

    pub fn with_fibers<R>(&self, f: impl FnOnce(&FiberArena) -> R) -> R {
        f(&self.inner.fibers.borrow())
    }

    /// The committed host root fiber of `root`.
    pub fn current_root_fiber(&self, root: RootId) -> Option<FiberId> {
        self.inner.roots.borrow().get(root).map(|root| root.current)
    }

    pub fn container(&self, root: RootId) -> Option<NodeId> {
        self.inner.roots.borrow().get(root).map(|root| root.container)
    }

    /// Expiration time of the most urgent work still pending on `root`.
    pub fn pending_expiration_time(&self, root: RootId) -> Option<ExpirationTime> {
        self.inner
            .roots
            .borrow()
            .get(root)
            .map(|root| root.first_pending_time)
    }

    /// The committed children of `fiber`.
    pub fn children(&self, fiber: FiberId) -> Vec<FiberId> {
        self.inner.fibers.borrow().children(fiber)
    }

    /// Kinds of the hooks `fiber` called in its last render, in call order.
    pub fn hook_kinds(&self, fiber: FiberId) -> Vec<HookKind> {
        self.inner
            .fibers
            .borrow()
            .get(fiber)
            .and_then(|fiber| fiber.hooks().map(|hooks| hooks.iter().map(|hook| hook.kind()).collect()))
            .unwrap_or_default()
    }

    /// The host node owned by `fiber`, if it is a host fiber.
    pub fn host_node(&self, fiber: FiberId) -> Option<NodeId> {
        self.inner
            .fibers
            .borrow()
            .get(fiber)
            .and_then(|fiber| fiber.state_node.host())
    }
}

impl<H: HostConfig + 'static> fmt::Debug for Reconciler<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("roots", &self.inner.roots.borrow().len())
            .field("fibers", &self.inner.fibers.borrow().len())
            .field("scheduler", &self.inner.scheduler)
            .finish()
    }
}
