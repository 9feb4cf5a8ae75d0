use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::collections::map::HashMap;
use crate::error::FiberError;
use crate::expiration_time::{ExpirationTime, NO_WORK};
use crate::fiber::{EffectTag, FiberId};
use crate::hooks::{AnyValue, Effect, Hook, UpdateTarget};

/// Which hook implementations a render uses.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Dispatcher {
    /// First render: every hook call allocates a slot.
    OnMount,
    /// Later renders and replays: hook calls walk the previous chain.
    OnUpdate,
}

/// Everything one render-or-replay cycle of a function component needs.
pub(crate) struct RenderContext {
    pub(crate) fiber: FiberId,
    pub(crate) alternate: Option<FiberId>,
    pub(crate) render_expiration_time: ExpirationTime,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) current_hooks: Option<Rc<[Hook]>>,
    pub(crate) work_in_progress_hooks: Vec<Hook>,
    pub(crate) cursor: usize,
    pub(crate) effects: Vec<Rc<Effect>>,
    pub(crate) remaining_expiration_time: ExpirationTime,
    pub(crate) side_effect_tag: EffectTag,
    pub(crate) did_receive_update: bool,
    pub(crate) did_schedule_render_phase_update: bool,
    /// Actions dispatched to this component while it rendered, per queue.
    pub(crate) render_phase_updates: HashMap<usize, Vec<AnyValue>>,
    pub(crate) re_render_count: usize,
    pub(crate) target: Weak<dyn UpdateTarget>,
}

impl RenderContext {
    pub(crate) fn new(
        fiber: FiberId,
        alternate: Option<FiberId>,
        current_hooks: Option<Rc<[Hook]>>,
        render_expiration_time: ExpirationTime,
        target: Weak<dyn UpdateTarget>,
    ) -> Self {
        let dispatcher = if current_hooks.is_some() {
            Dispatcher::OnUpdate
        } else {
            Dispatcher::OnMount
        };
        Self {
            fiber,
            alternate,
            render_expiration_time,
            dispatcher,
            current_hooks,
            work_in_progress_hooks: Vec::new(),
            cursor: 0,
            effects: Vec::new(),
            remaining_expiration_time: NO_WORK,
            side_effect_tag: EffectTag::empty(),
            did_receive_update: false,
            did_schedule_render_phase_update: false,
            render_phase_updates: HashMap::default(),
            re_render_count: 0,
            target,
        }
    }

    pub(crate) fn is_rendering(&self, fiber: FiberId) -> bool {
        self.fiber == fiber || self.alternate == Some(fiber)
    }

    /// Resets the cursors for another pass over the same hooks.
    pub(crate) fn prepare_replay(&mut self) {
        self.did_schedule_render_phase_update = false;
        self.re_render_count += 1;
        self.cursor = 0;
        self.effects.clear();
        self.dispatcher = Dispatcher::OnUpdate;
    }
}

thread_local! {
    static RENDER_STACK: RefCell<Vec<Rc<RefCell<RenderContext>>>> = const { RefCell::new(Vec::new()) };
}

/// Pops the render stack on drop.
#[must_use = "RenderScopeGuard pops the render stack on drop"]
pub(crate) struct RenderScopeGuard;

impl Drop for RenderScopeGuard {
    fn drop(&mut self) {
        RENDER_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Makes `context` the active render for the lifetime of the guard.
pub(crate) fn enter(context: Rc<RefCell<RenderContext>>) -> RenderScopeGuard {
    RENDER_STACK.with(|stack| stack.borrow_mut().push(context));
    RenderScopeGuard
}

fn active() -> Option<Rc<RefCell<RenderContext>>> {
    RENDER_STACK.with(|stack| stack.borrow().last().cloned())
}

/// Runs `f` against the active render.
pub(crate) fn with_render_context<R>(
    hook: &'static str,
    f: impl FnOnce(&mut RenderContext) -> R,
) -> Result<R, FiberError> {
    let context = active().ok_or(FiberError::InvalidHookCall { hook })?;
    let mut context = context.borrow_mut();
    Ok(f(&mut context))
}

/// Like [`with_render_context`] but yields `None` outside a render.
pub(crate) fn try_with_render_context<R>(f: impl FnOnce(&mut RenderContext) -> R) -> Option<R> {
    let context = active()?;
    let mut context = context.borrow_mut();
    Some(f(&mut context))
}
