//! Begin phase: recompute one fiber top-down and return its first child.

use crate::child_fiber::{clone_child_fibers, MOUNT_CHILD_FIBERS, RECONCILE_CHILD_FIBERS};
use crate::element::{Child, ElementType};
use crate::error::FiberError;
use crate::expiration_time::{ExpirationTime, NEVER, NO_WORK};
use crate::fiber::{EffectTag, FiberArena, FiberId, FiberProps, FiberUpdateQueue, MemoizedState, WorkTag};
use crate::hooks::{bailout_hooks, render_with_hooks};
use crate::host::HostConfig;
use crate::render_context::RenderContext;
use crate::update_queue::process_update_queue;
use crate::work_loop::ReconcilerInner;

fn reconcile_children(
    fibers: &mut FiberArena,
    current: Option<FiberId>,
    work_in_progress: FiberId,
    next_children: &Child,
    render_expiration_time: ExpirationTime,
) {
    let child = match current {
        None => MOUNT_CHILD_FIBERS.reconcile_child_fibers(
            fibers,
            work_in_progress,
            None,
            next_children,
            render_expiration_time,
        ),
        Some(current) => {
            let current_child = fibers[current].child;
            RECONCILE_CHILD_FIBERS.reconcile_child_fibers(
                fibers,
                work_in_progress,
                current_child,
                next_children,
                render_expiration_time,
            )
        }
    };
    fibers[work_in_progress].child = child;
}

/// Skips `work_in_progress`. Descends into cloned children only if work at
/// this priority is pending somewhere below.
fn bailout_on_already_finished_work(
    fibers: &mut FiberArena,
    work_in_progress: FiberId,
    render_expiration_time: ExpirationTime,
) -> Option<FiberId> {
    if fibers[work_in_progress].child_expiration_time < render_expiration_time {
        return None;
    }
    clone_child_fibers(fibers, work_in_progress);
    fibers[work_in_progress].child
}

/// Whether `fiber` is a host element whose subtree is marked hidden.
pub(crate) fn is_hidden(fibers: &FiberArena, fiber: FiberId) -> bool {
    fibers[fiber].tag == WorkTag::HostComponent
        && fibers[fiber]
            .pending_props
            .element()
            .is_some_and(|props| props.hidden)
}

fn defer_hidden_subtree(fibers: &mut FiberArena, work_in_progress: FiberId) {
    let fiber = &mut fibers[work_in_progress];
    fiber.expiration_time = NEVER;
    fiber.child_expiration_time = NEVER;
}

pub(crate) fn begin_work<H: HostConfig + 'static>(
    inner: &ReconcilerInner<H>,
    current: Option<FiberId>,
    work_in_progress: FiberId,
    render_expiration_time: ExpirationTime,
) -> Result<Option<FiberId>, FiberError> {
    let mut did_receive_update = false;
    {
        let mut fibers = inner.fibers.borrow_mut();
        if let Some(current) = current {
            let props_changed = !fibers[current]
                .memoized_props
                .same(&fibers[work_in_progress].pending_props);
            if props_changed {
                did_receive_update = true;
            } else if fibers[work_in_progress].expiration_time < render_expiration_time {
                if render_expiration_time != NEVER && is_hidden(&fibers, work_in_progress)
                {
                    defer_hidden_subtree(&mut fibers, work_in_progress);
                    return Ok(None);
                }
                return Ok(bailout_on_already_finished_work(
                    &mut fibers,
                    work_in_progress,
                    render_expiration_time,
                ));
            }
        }
        fibers[work_in_progress].expiration_time = NO_WORK;
    }

    let tag = inner.fibers.borrow()[work_in_progress].tag;
    match tag {
        WorkTag::FunctionComponent => update_function_component(
            inner,
            current,
            work_in_progress,
            render_expiration_time,
            did_receive_update,
        ),
        WorkTag::HostRoot => Ok(update_host_root(
            &mut inner.fibers.borrow_mut(),
            current,
            work_in_progress,
            render_expiration_time,
        )),
        WorkTag::HostComponent => Ok(update_host_component(
            inner,
            current,
            work_in_progress,
            render_expiration_time,
        )),
        WorkTag::HostText => Ok(None),
        WorkTag::Fragment => {
            let mut fibers = inner.fibers.borrow_mut();
            let children = match &fibers[work_in_progress].pending_props {
                FiberProps::Children(children) => children.clone(),
                _ => Child::Empty,
            };
            reconcile_children(
                &mut fibers,
                current,
                work_in_progress,
                &children,
                render_expiration_time,
            );
            Ok(fibers[work_in_progress].child)
        }
    }
}

fn update_function_component<H: HostConfig + 'static>(
    inner: &ReconcilerInner<H>,
    current: Option<FiberId>,
    work_in_progress: FiberId,
    render_expiration_time: ExpirationTime,
    did_receive_update: bool,
) -> Result<Option<FiberId>, FiberError> {
    let (component, props, current_hooks) = {
        let fibers = inner.fibers.borrow();
        let fiber = &fibers[work_in_progress];
        let Some(ElementType::Component(component)) = fiber.element_type.clone() else {
            unreachable!("function component fiber without a component type");
        };
        let props = fiber.pending_props.element().cloned().unwrap_or_default();
        let current_hooks = current.and_then(|current| fibers[current].hooks().cloned());
        (component, props, current_hooks)
    };

    // No arena borrow is held while user code runs.
    let context = RenderContext::new(
        work_in_progress,
        current,
        current_hooks,
        render_expiration_time,
        inner.update_target(),
    );
    let output = render_with_hooks(context, &component, &props)?;

    let mut fibers = inner.fibers.borrow_mut();
    {
        let fiber = &mut fibers[work_in_progress];
        fiber.memoized_state = MemoizedState::Hooks(output.hooks);
        fiber.update_queue = FiberUpdateQueue::Effects(output.effects);
        fiber.effect_tag.insert(output.side_effect_tag);
        fiber.expiration_time = output.remaining_expiration_time;
    }

    if let Some(current) = current {
        if !did_receive_update && !output.did_receive_update {
            bailout_hooks(&mut fibers, current, work_in_progress, render_expiration_time);
            return Ok(bailout_on_already_finished_work(
                &mut fibers,
                work_in_progress,
                render_expiration_time,
            ));
        }
    }

    fibers[work_in_progress]
        .effect_tag
        .insert(EffectTag::PERFORMED_WORK);
    reconcile_children(
        &mut fibers,
        current,
        work_in_progress,
        &output.children,
        render_expiration_time,
    );
    Ok(fibers[work_in_progress].child)
}

fn root_element(fibers: &FiberArena, fiber: FiberId) -> Child {
    match &fibers[fiber].memoized_state {
        MemoizedState::Root(state) => state.element.clone(),
        _ => Child::Empty,
    }
}

fn update_host_root(
    fibers: &mut FiberArena,
    current: Option<FiberId>,
    work_in_progress: FiberId,
    render_expiration_time: ExpirationTime,
) -> Option<FiberId> {
    let previous_children = root_element(fibers, work_in_progress);
    let has_force_update = process_update_queue(fibers, work_in_progress, render_expiration_time);
    let next_children = root_element(fibers, work_in_progress);
    if next_children.same(&previous_children) && !has_force_update {
        return bailout_on_already_finished_work(fibers, work_in_progress, render_expiration_time);
    }
    reconcile_children(
        fibers,
        current,
        work_in_progress,
        &next_children,
        render_expiration_time,
    );
    fibers[work_in_progress].child
}

fn update_host_component<H: HostConfig>(
    inner: &ReconcilerInner<H>,
    current: Option<FiberId>,
    work_in_progress: FiberId,
    render_expiration_time: ExpirationTime,
) -> Option<FiberId> {
    let mut fibers = inner.fibers.borrow_mut();
    let host = inner.host.borrow();

    let Some(props) = fibers[work_in_progress].pending_props.element().cloned() else {
        log::warn!("host component without element props");
        return None;
    };
    let element_type = fibers[work_in_progress]
        .host_type()
        .map(str::to_owned)
        .unwrap_or_default();

    let is_direct_text_child = host.is_text_only_container(&element_type, &props);
    let next_children = if is_direct_text_child {
        Child::Empty
    } else {
        props.children.clone()
    };

    if !is_direct_text_child {
        let previous = current.and_then(|current| fibers[current].memoized_props.element().cloned());
        if let Some(previous) = previous {
            if host.is_text_only_container(&element_type, &previous) {
                fibers[work_in_progress]
                    .effect_tag
                    .insert(EffectTag::CONTENT_RESET);
            }
        }
    }

    if render_expiration_time != NEVER && props.hidden {
        defer_hidden_subtree(&mut fibers, work_in_progress);
        return None;
    }

    reconcile_children(
        &mut fibers,
        current,
        work_in_progress,
        &next_children,
        render_expiration_time,
    );
    fibers[work_in_progress].child
}
