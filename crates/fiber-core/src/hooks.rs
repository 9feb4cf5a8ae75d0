//! Hooks: persistent, call-order keyed state for function components.
//!
//! A component's hooks form a chain indexed by call order. The first render
//! allocates the chain; later renders walk the committed chain and clone
//! each slot into the work-in-progress chain. State updates dispatched while
//! the component itself is rendering are buffered and the render is replayed,
//! at most [`RE_RENDER_LIMIT`] times.

use std::any::Any;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::marker::PhantomData;
use std::rc::{Rc, Weak};

use bitflags::bitflags;
use smallvec::SmallVec;

use crate::element::{Child, Component, Props};
use crate::error::FiberError;
use crate::expiration_time::{ExpirationTime, NO_WORK};
use crate::fiber::{EffectTag, FiberArena, FiberId, FiberUpdateQueue};
use crate::render_context::{
    self, try_with_render_context, with_render_context, Dispatcher, RenderContext,
};

/// Replays allowed for render-phase updates before rendering fails.
pub const RE_RENDER_LIMIT: usize = 25;

pub(crate) type AnyValue = Rc<dyn Any>;
type ErasedReducer = Rc<dyn Fn(&AnyValue, &AnyValue) -> AnyValue>;
type ErasedEq = fn(&AnyValue, &AnyValue) -> bool;

/// Teardown returned by an effect.
pub type Destroy = Box<dyn FnOnce()>;
type Create = Box<dyn FnOnce() -> Option<Destroy>>;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum HookKind {
    State,
    Reducer,
    Effect,
    LayoutEffect,
    Memo,
    Callback,
}

bitflags! {
    /// When an effect tears down and sets up during commit.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct HookEffectTag: u8 {
        const UNMOUNT_MUTATION = 1 << 2;
        const MOUNT_MUTATION = 1 << 3;
        const UNMOUNT_LAYOUT = 1 << 4;
        const MOUNT_LAYOUT = 1 << 5;
        const MOUNT_PASSIVE = 1 << 6;
        const UNMOUNT_PASSIVE = 1 << 7;
    }
}

/// One dependency value. Compared with `PartialEq`.
#[derive(Clone)]
pub struct Dep(Rc<dyn DepValue>);

trait DepValue {
    fn as_any(&self) -> &dyn Any;
    fn dep_eq(&self, other: &dyn Any) -> bool;
}

impl<T: PartialEq + 'static> DepValue for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dep_eq(&self, other: &dyn Any) -> bool {
        other.downcast_ref::<T>().is_some_and(|other| self == other)
    }
}

impl Dep {
    pub fn new<T: PartialEq + 'static>(value: T) -> Self {
        Dep(Rc::new(value))
    }

    pub fn same(&self, other: &Dep) -> bool {
        self.0.dep_eq(other.0.as_any())
    }
}

impl fmt::Debug for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Dep")
    }
}

pub type Deps = SmallVec<[Dep; 4]>;

/// Builds `Some(Deps)` for the effect and memo hooks: `deps![]`, `deps![a, b]`.
#[macro_export]
macro_rules! deps {
    () => {
        ::core::option::Option::Some($crate::Deps::new())
    };
    ($($value:expr),+ $(,)?) => {
        ::core::option::Option::Some(
            [$($crate::Dep::new($value)),+]
                .into_iter()
                .collect::<$crate::Deps>(),
        )
    };
}

fn are_hook_inputs_equal(next: &Deps, previous: Option<&Deps>) -> bool {
    let Some(previous) = previous else {
        return false;
    };
    next.len() == previous.len() && next.iter().zip(previous).all(|(a, b)| a.same(b))
}

pub struct Effect {
    pub(crate) tag: HookEffectTag,
    create: RefCell<Option<Create>>,
    /// Shared with the effect this one replaced so the old teardown runs.
    destroy: Rc<RefCell<Option<Destroy>>>,
    deps: Option<Deps>,
}

impl Effect {
    pub fn tag(&self) -> HookEffectTag {
        self.tag
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("tag", &self.tag)
            .field("has_destroy", &self.destroy.borrow().is_some())
            .finish()
    }
}

#[derive(Clone)]
enum HookState {
    Value(AnyValue),
    Effect(Rc<Effect>),
    Memo(AnyValue, Option<Deps>),
}

#[derive(Clone)]
pub struct Hook {
    kind: HookKind,
    memoized_state: HookState,
    base_state: Option<AnyValue>,
    /// Sequence number of the last update folded into `base_state`.
    base_update: Option<u64>,
    queue: Option<Rc<RefCell<HookQueue>>>,
}

impl Hook {
    pub fn kind(&self) -> HookKind {
        self.kind
    }

    /// The stored value if this is a state or reducer hook holding a `T`.
    pub fn state<T: 'static>(&self) -> Option<&T> {
        match &self.memoized_state {
            HookState::Value(value) => (**value).downcast_ref::<T>(),
            _ => None,
        }
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("kind", &self.kind)
            .field("base_update", &self.base_update)
            .finish()
    }
}

struct HookUpdate {
    seq: u64,
    expiration_time: ExpirationTime,
    action: AnyValue,
    eager_reducer: Option<ErasedReducer>,
    eager_state: Option<AnyValue>,
}

/// Pending actions of one state or reducer hook, shared by both alternates.
pub(crate) struct HookQueue {
    updates: VecDeque<HookUpdate>,
    next_seq: u64,
    last_rendered_reducer: Option<ErasedReducer>,
    last_rendered_state: Option<AnyValue>,
    state_eq: ErasedEq,
    dispatch: Option<AnyValue>,
}

impl HookQueue {
    fn last_seq(&self) -> Option<u64> {
        self.next_seq.checked_sub(1)
    }

    pub(crate) fn push(&mut self, expiration_time: ExpirationTime, action: AnyValue) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.updates.push_back(HookUpdate {
            seq,
            expiration_time,
            action,
            eager_reducer: None,
            eager_state: None,
        });
        seq
    }

    fn prune_through(&mut self, seq: Option<u64>) {
        let Some(seq) = seq else {
            return;
        };
        while self.updates.front().is_some_and(|update| update.seq <= seq) {
            self.updates.pop_front();
        }
    }

    fn key(queue: &Rc<RefCell<HookQueue>>) -> usize {
        Rc::as_ptr(queue) as *const () as usize
    }
}

/// Receives state updates dispatched outside of a render.
pub(crate) trait UpdateTarget {
    fn dispatch_action(&self, fiber: FiberId, queue: &Rc<RefCell<HookQueue>>, action: AnyValue);
}

struct DispatchInner {
    fiber: FiberId,
    queue: Weak<RefCell<HookQueue>>,
    target: Weak<dyn UpdateTarget>,
}

/// Sends actions to a state or reducer hook. Stable across renders.
pub struct Dispatch<A> {
    inner: Rc<DispatchInner>,
    _action: PhantomData<fn(A)>,
}

impl<A: 'static> Dispatch<A> {
    pub fn dispatch(&self, action: A) {
        let Some(queue) = self.inner.queue.upgrade() else {
            log::warn!("state update on an unmounted component ignored");
            return;
        };
        let action: AnyValue = Rc::new(action);
        let Some(action) = buffer_render_phase_update(self.inner.fiber, &queue, action) else {
            return;
        };
        match self.inner.target.upgrade() {
            Some(target) => target.dispatch_action(self.inner.fiber, &queue, action),
            None => log::warn!("state update after the reconciler was dropped ignored"),
        }
    }

    pub fn fiber(&self) -> FiberId {
        self.inner.fiber
    }
}

impl<A> Clone for Dispatch<A> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _action: PhantomData,
        }
    }
}

impl<A> PartialEq for Dispatch<A> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<A> fmt::Debug for Dispatch<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Dispatch").field(&self.inner.fiber).finish()
    }
}

/// Action accepted by [`use_state`] setters.
pub enum StateAction<S> {
    Set(S),
    Update(Box<dyn Fn(&S) -> S>),
}

pub type SetState<S> = Dispatch<StateAction<S>>;

impl<S: 'static> Dispatch<StateAction<S>> {
    pub fn set(&self, value: S) {
        self.dispatch(StateAction::Set(value));
    }

    pub fn update(&self, f: impl Fn(&S) -> S + 'static) {
        self.dispatch(StateAction::Update(Box::new(f)));
    }
}

fn erased_eq<S: PartialEq + 'static>(a: &AnyValue, b: &AnyValue) -> bool {
    match ((**a).downcast_ref::<S>(), (**b).downcast_ref::<S>()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn downcast<S: Clone + 'static>(value: &AnyValue) -> S {
    (**value)
        .downcast_ref::<S>()
        .cloned()
        .expect("hook state type changed between renders")
}

/// Buffers `action` if `fiber` is the component currently rendering.
/// Hands the action back otherwise.
fn buffer_render_phase_update(
    fiber: FiberId,
    queue: &Rc<RefCell<HookQueue>>,
    action: AnyValue,
) -> Option<AnyValue> {
    let mut action = Some(action);
    try_with_render_context(|context| {
        if context.is_rendering(fiber) {
            context.did_schedule_render_phase_update = true;
            if let Some(action) = action.take() {
                context
                    .render_phase_updates
                    .entry(HookQueue::key(queue))
                    .or_default()
                    .push(action);
            }
        }
    });
    action
}

/// Eagerly reduces the update `seq` against the last rendered state.
/// Returns `true` when the result equals that state, meaning no render is
/// needed.
pub(crate) fn try_eager_state(queue: &Rc<RefCell<HookQueue>>, seq: u64) -> bool {
    let (reducer, state, action, state_eq) = {
        let queue = queue.borrow();
        let (Some(reducer), Some(state)) = (
            queue.last_rendered_reducer.clone(),
            queue.last_rendered_state.clone(),
        ) else {
            return false;
        };
        let Some(update) = queue.updates.iter().find(|update| update.seq == seq) else {
            return false;
        };
        (reducer, state, update.action.clone(), queue.state_eq)
    };
    let eager_state = reducer(&state, &action);
    let unchanged = state_eq(&eager_state, &state);
    let mut queue = queue.borrow_mut();
    if let Some(update) = queue.updates.iter_mut().find(|update| update.seq == seq) {
        update.eager_reducer = Some(reducer);
        update.eager_state = Some(eager_state);
    }
    unchanged
}

/// Result of rendering one function component.
pub(crate) struct RenderOutput {
    pub(crate) children: Child,
    pub(crate) hooks: Rc<[Hook]>,
    pub(crate) effects: Rc<[Rc<Effect>]>,
    pub(crate) side_effect_tag: EffectTag,
    pub(crate) remaining_expiration_time: ExpirationTime,
    pub(crate) did_receive_update: bool,
}

/// Renders `component`, replaying while it schedules updates on itself.
pub(crate) fn render_with_hooks(
    context: RenderContext,
    component: &Component,
    props: &Props,
) -> Result<RenderOutput, FiberError> {
    let context = Rc::new(RefCell::new(context));
    let children = {
        let _guard = render_context::enter(context.clone());
        let mut children = component.render(props);
        loop {
            let replay = {
                let mut context = context.borrow_mut();
                if !context.did_schedule_render_phase_update {
                    false
                } else if context.re_render_count >= RE_RENDER_LIMIT {
                    return Err(FiberError::TooManyReRenders {
                        component: component.name().to_owned(),
                    });
                } else {
                    context.prepare_replay();
                    true
                }
            };
            if !replay {
                break;
            }
            children = component.render(props);
        }
        children
    };

    let mut context = context.borrow_mut();
    Ok(RenderOutput {
        children,
        hooks: std::mem::take(&mut context.work_in_progress_hooks).into(),
        effects: std::mem::take(&mut context.effects).into(),
        side_effect_tag: context.side_effect_tag,
        remaining_expiration_time: context.remaining_expiration_time,
        did_receive_update: context.did_receive_update,
    })
}

/// Reuses the committed hooks when a component bails out.
pub(crate) fn bailout_hooks(
    fibers: &mut FiberArena,
    current: FiberId,
    work_in_progress: FiberId,
    expiration_time: ExpirationTime,
) {
    let update_queue = fibers[current].update_queue.clone();
    let fiber = &mut fibers[work_in_progress];
    fiber.update_queue = update_queue;
    fiber.effect_tag.remove(EffectTag::PASSIVE | EffectTag::UPDATE);
    let current = &mut fibers[current];
    if current.expiration_time <= expiration_time {
        current.expiration_time = NO_WORK;
    }
}

/// Runs teardowns tagged `unmount_tag`, then setups tagged `mount_tag`.
pub(crate) fn commit_hook_effect_list(
    queue: &FiberUpdateQueue,
    unmount_tag: HookEffectTag,
    mount_tag: HookEffectTag,
) {
    let FiberUpdateQueue::Effects(effects) = queue else {
        return;
    };
    for effect in effects.iter() {
        if effect.tag.intersects(unmount_tag) {
            let destroy = effect.destroy.borrow_mut().take();
            if let Some(destroy) = destroy {
                destroy();
            }
        }
        if effect.tag.intersects(mount_tag) {
            let create = effect.create.borrow_mut().take();
            if let Some(create) = create {
                let destroy = create();
                *effect.destroy.borrow_mut() = destroy;
            }
        }
    }
}

/// Runs every pending teardown of a component being removed.
pub(crate) fn commit_unmount_effects(queue: &FiberUpdateQueue) {
    let FiberUpdateQueue::Effects(effects) = queue else {
        return;
    };
    for effect in effects.iter() {
        let destroy = effect.destroy.borrow_mut().take();
        if let Some(destroy) = destroy {
            destroy();
        }
    }
}

fn mount_hook(context: &mut RenderContext, hook: Hook) {
    context.work_in_progress_hooks.push(hook);
    context.cursor += 1;
}

/// Returns the slot at the cursor for an update render, cloning it from the
/// committed chain unless an earlier replay already did. Also returns the
/// committed slot.
fn next_update_hook(context: &mut RenderContext) -> (usize, Option<Hook>) {
    let index = context.cursor;
    context.cursor += 1;
    let current = context
        .current_hooks
        .as_ref()
        .and_then(|hooks| hooks.get(index))
        .cloned();
    if index >= context.work_in_progress_hooks.len() {
        let hook = current
            .clone()
            .expect("rendered more hooks than during the previous render");
        context.work_in_progress_hooks.push(hook);
    }
    (index, current)
}

fn mount_reducer(
    kind: HookKind,
    reducer: ErasedReducer,
    initial_state: AnyValue,
    state_eq: ErasedEq,
    make_dispatch: impl FnOnce(Rc<DispatchInner>) -> AnyValue,
) -> Result<(AnyValue, AnyValue), FiberError> {
    with_render_context("use_reducer", |context| {
        let queue = Rc::new(RefCell::new(HookQueue {
            updates: VecDeque::new(),
            next_seq: 0,
            last_rendered_reducer: Some(reducer),
            last_rendered_state: Some(initial_state.clone()),
            state_eq,
            dispatch: None,
        }));
        let dispatch = make_dispatch(Rc::new(DispatchInner {
            fiber: context.fiber,
            queue: Rc::downgrade(&queue),
            target: context.target.clone(),
        }));
        queue.borrow_mut().dispatch = Some(dispatch.clone());
        mount_hook(
            context,
            Hook {
                kind,
                memoized_state: HookState::Value(initial_state.clone()),
                base_state: Some(initial_state.clone()),
                base_update: None,
                queue: Some(queue),
            },
        );
        (initial_state, dispatch)
    })
}

/// Folds pending actions into the hook's state. `reducer` of `None` keeps the
/// reducer the queue was created with.
fn update_reducer(
    reducer: Option<ErasedReducer>,
) -> Result<(AnyValue, AnyValue), FiberError> {
    let (index, hook, render_expiration_time, replayed_actions) =
        with_render_context("use_reducer", |context| {
            let (index, _) = next_update_hook(context);
            let hook = context.work_in_progress_hooks[index].clone();
            let replayed_actions = if context.re_render_count > 0 {
                hook.queue
                    .as_ref()
                    .and_then(|queue| context.render_phase_updates.remove(&HookQueue::key(queue)))
                    .or(Some(Vec::new()))
            } else {
                None
            };
            (index, hook, context.render_expiration_time, replayed_actions)
        })?;

    let queue = hook
        .queue
        .clone()
        .expect("state hook without an update queue");
    let (reducer, state_eq, dispatch) = {
        let mut queue = queue.borrow_mut();
        if let Some(reducer) = reducer {
            queue.last_rendered_reducer = Some(reducer);
        }
        (
            queue
                .last_rendered_reducer
                .clone()
                .expect("state hook without a reducer"),
            queue.state_eq,
            queue.dispatch.clone().expect("state hook without a dispatcher"),
        )
    };
    let HookState::Value(memoized) = &hook.memoized_state else {
        panic!("hook order changed between renders");
    };
    let memoized = memoized.clone();

    if let Some(actions) = replayed_actions {
        let mut new_state = memoized.clone();
        for action in &actions {
            new_state = reducer(&new_state, action);
        }
        let last_seq = queue.borrow().last_seq();
        queue.borrow_mut().last_rendered_state = Some(new_state.clone());
        with_render_context("use_reducer", |context| {
            if !state_eq(&new_state, &memoized) {
                context.did_receive_update = true;
            }
            let hook = &mut context.work_in_progress_hooks[index];
            hook.memoized_state = HookState::Value(new_state.clone());
            if hook.base_update == last_seq {
                hook.base_state = Some(new_state.clone());
            }
        })?;
        return Ok((new_state, dispatch));
    }

    let pending: Vec<(u64, ExpirationTime, AnyValue, Option<ErasedReducer>, Option<AnyValue>)> = {
        let mut queue = queue.borrow_mut();
        queue.prune_through(hook.base_update);
        queue
            .updates
            .iter()
            .filter(|update| hook.base_update.map_or(true, |base| update.seq > base))
            .map(|update| {
                (
                    update.seq,
                    update.expiration_time,
                    update.action.clone(),
                    update.eager_reducer.clone(),
                    update.eager_state.clone(),
                )
            })
            .collect()
    };

    let mut new_state = hook.base_state.clone().unwrap_or_else(|| memoized.clone());
    let mut previous_seq = hook.base_update;
    let mut new_base: Option<(Option<u64>, AnyValue)> = None;
    let mut remaining_expiration_time = NO_WORK;
    for (seq, expiration_time, action, eager_reducer, eager_state) in pending {
        if expiration_time < render_expiration_time {
            if new_base.is_none() {
                new_base = Some((previous_seq, new_state.clone()));
            }
            remaining_expiration_time = remaining_expiration_time.max(expiration_time);
        } else {
            new_state = match (eager_reducer, eager_state) {
                (Some(eager_reducer), Some(eager_state)) if Rc::ptr_eq(&eager_reducer, &reducer) => {
                    eager_state
                }
                _ => reducer(&new_state, &action),
            };
        }
        previous_seq = Some(seq);
    }
    let (base_update, base_state) = new_base.unwrap_or((previous_seq, new_state.clone()));
    queue.borrow_mut().last_rendered_state = Some(new_state.clone());

    with_render_context("use_reducer", |context| {
        if !state_eq(&new_state, &memoized) {
            context.did_receive_update = true;
        }
        context.remaining_expiration_time = context
            .remaining_expiration_time
            .max(remaining_expiration_time);
        let hook = &mut context.work_in_progress_hooks[index];
        hook.memoized_state = HookState::Value(new_state.clone());
        hook.base_update = base_update;
        hook.base_state = Some(base_state);
    })?;
    Ok((new_state, dispatch))
}

fn dispatcher(hook: &'static str) -> Result<Dispatcher, FiberError> {
    with_render_context(hook, |context| context.dispatcher)
}

fn reducer_hook<S, A>(
    kind: HookKind,
    hook: &'static str,
    reducer: Option<ErasedReducer>,
    initial_state: impl FnOnce() -> S,
) -> Result<(S, Dispatch<A>), FiberError>
where
    S: Clone + PartialEq + 'static,
    A: 'static,
{
    let (state, dispatch) = match dispatcher(hook)? {
        Dispatcher::OnMount => {
            let reducer = reducer.expect("mounting a state hook needs a reducer");
            let initial_state: AnyValue = Rc::new(initial_state());
            mount_reducer(kind, reducer, initial_state, erased_eq::<S>, |inner| {
                Rc::new(Dispatch::<A> {
                    inner,
                    _action: PhantomData,
                }) as AnyValue
            })?
        }
        Dispatcher::OnUpdate => update_reducer(reducer)?,
    };
    let dispatch = (*dispatch)
        .downcast_ref::<Dispatch<A>>()
        .cloned()
        .expect("hook action type changed between renders");
    Ok((downcast::<S>(&state), dispatch))
}

/// Fallible form of [`use_reducer`].
pub fn try_use_reducer<S, A>(
    reducer: impl Fn(&S, A) -> S + 'static,
    initial_state: S,
) -> Result<(S, Dispatch<A>), FiberError>
where
    S: Clone + PartialEq + 'static,
    A: Clone + 'static,
{
    let reducer: ErasedReducer = Rc::new(move |state: &AnyValue, action: &AnyValue| {
        let state = (**state)
            .downcast_ref::<S>()
            .expect("hook state type changed between renders");
        let action = (**action)
            .downcast_ref::<A>()
            .cloned()
            .expect("hook action type changed between renders");
        Rc::new(reducer(state, action)) as AnyValue
    });
    reducer_hook(HookKind::Reducer, "use_reducer", Some(reducer), || initial_state)
}

/// State folded from dispatched actions by `reducer`.
///
/// # Panics
/// Panics when called outside a function component render.
pub fn use_reducer<S, A>(
    reducer: impl Fn(&S, A) -> S + 'static,
    initial_state: S,
) -> (S, Dispatch<A>)
where
    S: Clone + PartialEq + 'static,
    A: Clone + 'static,
{
    try_use_reducer(reducer, initial_state).unwrap_or_else(|err| panic!("{err}"))
}

fn basic_state_reducer<S: Clone + 'static>() -> ErasedReducer {
    Rc::new(|state: &AnyValue, action: &AnyValue| {
        let action = (**action)
            .downcast_ref::<StateAction<S>>()
            .expect("hook action type changed between renders");
        match action {
            StateAction::Set(value) => Rc::new(value.clone()) as AnyValue,
            StateAction::Update(update) => {
                let state = (**state)
                    .downcast_ref::<S>()
                    .expect("hook state type changed between renders");
                Rc::new(update(state)) as AnyValue
            }
        }
    })
}

/// Fallible form of [`use_state`].
pub fn try_use_state<S>(initial_state: impl FnOnce() -> S) -> Result<(S, SetState<S>), FiberError>
where
    S: Clone + PartialEq + 'static,
{
    let reducer = match dispatcher("use_state")? {
        Dispatcher::OnMount => Some(basic_state_reducer::<S>()),
        Dispatcher::OnUpdate => None,
    };
    reducer_hook(HookKind::State, "use_state", reducer, initial_state)
}

/// A state value and a setter that schedules a render when it changes.
///
/// # Panics
/// Panics when called outside a function component render.
pub fn use_state<S>(initial_state: impl FnOnce() -> S) -> (S, SetState<S>)
where
    S: Clone + PartialEq + 'static,
{
    try_use_state(initial_state).unwrap_or_else(|err| panic!("{err}"))
}

fn effect_hook(
    hook: &'static str,
    kind: HookKind,
    fiber_effect_tag: EffectTag,
    hook_effect_tag: HookEffectTag,
    create: Create,
    deps: Option<Deps>,
) -> Result<(), FiberError> {
    with_render_context(hook, |context| match context.dispatcher {
        Dispatcher::OnMount => {
            context.side_effect_tag.insert(fiber_effect_tag);
            let effect = Rc::new(Effect {
                tag: hook_effect_tag,
                create: RefCell::new(Some(create)),
                destroy: Rc::new(RefCell::new(None)),
                deps,
            });
            context.effects.push(effect.clone());
            mount_hook(
                context,
                Hook {
                    kind,
                    memoized_state: HookState::Effect(effect),
                    base_state: None,
                    base_update: None,
                    queue: None,
                },
            );
        }
        Dispatcher::OnUpdate => {
            let (index, current) = next_update_hook(context);
            let previous = current.and_then(|hook| match hook.memoized_state {
                HookState::Effect(effect) => Some(effect),
                _ => None,
            });
            let destroy = previous
                .as_ref()
                .map(|effect| effect.destroy.clone())
                .unwrap_or_default();
            let unchanged = previous.as_ref().is_some_and(|previous| {
                deps.as_ref()
                    .is_some_and(|deps| are_hook_inputs_equal(deps, previous.deps.as_ref()))
            });
            let tag = if unchanged {
                HookEffectTag::empty()
            } else {
                context.side_effect_tag.insert(fiber_effect_tag);
                hook_effect_tag
            };
            let effect = Rc::new(Effect {
                tag,
                create: RefCell::new(Some(create)),
                destroy,
                deps,
            });
            context.effects.push(effect.clone());
            context.work_in_progress_hooks[index].memoized_state = HookState::Effect(effect);
        }
    })
}

/// Runs `create` after the commit is painted, tearing the previous run down
/// first. With `deps` the effect only re-runs when a dependency changed.
///
/// # Panics
/// Panics when called outside a function component render.
pub fn use_effect(create: impl FnOnce() -> Option<Destroy> + 'static, deps: Option<Deps>) {
    effect_hook(
        "use_effect",
        HookKind::Effect,
        EffectTag::UPDATE | EffectTag::PASSIVE,
        HookEffectTag::UNMOUNT_PASSIVE | HookEffectTag::MOUNT_PASSIVE,
        Box::new(create),
        deps,
    )
    .unwrap_or_else(|err| panic!("{err}"))
}

/// Like [`use_effect`] but runs synchronously during commit, right after the
/// host tree was mutated.
///
/// # Panics
/// Panics when called outside a function component render.
pub fn use_layout_effect(create: impl FnOnce() -> Option<Destroy> + 'static, deps: Option<Deps>) {
    effect_hook(
        "use_layout_effect",
        HookKind::LayoutEffect,
        EffectTag::UPDATE,
        HookEffectTag::UNMOUNT_MUTATION | HookEffectTag::MOUNT_LAYOUT,
        Box::new(create),
        deps,
    )
    .unwrap_or_else(|err| panic!("{err}"))
}

fn memo_hook<T: Clone + 'static>(
    hook: &'static str,
    kind: HookKind,
    compute: impl FnOnce() -> T,
    deps: Option<Deps>,
) -> Result<T, FiberError> {
    let cached = with_render_context(hook, |context| match context.dispatcher {
        Dispatcher::OnMount => {
            context.cursor += 1;
            (None, None)
        }
        Dispatcher::OnUpdate => {
            let (index, _) = next_update_hook(context);
            let HookState::Memo(value, previous_deps) =
                &context.work_in_progress_hooks[index].memoized_state
            else {
                panic!("hook order changed between renders");
            };
            let unchanged = deps
                .as_ref()
                .is_some_and(|deps| are_hook_inputs_equal(deps, previous_deps.as_ref()));
            (Some(index), unchanged.then(|| value.clone()))
        }
    })?;

    if let (_, Some(value)) = cached {
        return Ok(downcast::<T>(&value));
    }
    let value = compute();
    let stored: AnyValue = Rc::new(value.clone());
    with_render_context(hook, |context| {
        let state = HookState::Memo(stored, deps);
        match cached.0 {
            Some(index) => context.work_in_progress_hooks[index].memoized_state = state,
            None => context.work_in_progress_hooks.push(Hook {
                kind,
                memoized_state: state,
                base_state: None,
                base_update: None,
                queue: None,
            }),
        }
    })?;
    Ok(value)
}

/// Caches `compute()` until a dependency changes. `None` deps recompute on
/// every render.
///
/// # Panics
/// Panics when called outside a function component render.
pub fn use_memo<T: Clone + 'static>(compute: impl FnOnce() -> T, deps: Option<Deps>) -> T {
    memo_hook("use_memo", HookKind::Memo, compute, deps).unwrap_or_else(|err| panic!("{err}"))
}

/// Returns the first `callback` seen since the dependencies last changed.
///
/// # Panics
/// Panics when called outside a function component render.
pub fn use_callback<F: Clone + 'static>(callback: F, deps: Option<Deps>) -> F {
    memo_hook("use_callback", HookKind::Callback, || callback, deps)
        .unwrap_or_else(|err| panic!("{err}"))
}

/// The fiber of the component currently rendering.
pub fn current_fiber() -> Result<FiberId, FiberError> {
    with_render_context("current_fiber", |context| context.fiber)
}

#[cfg(test)]
#[path = "tests/hooks_tests.rs"]
mod tests;
