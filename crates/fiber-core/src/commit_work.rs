//! Commit phase: apply a finished effect list to the host.
//!
//! Effects run in three passes over the list: mutations, then layout
//! effects and update callbacks once the finished tree is current, then
//! passive effects some time later. User code (effects, teardowns,
//! callbacks) only ever runs with no arena borrow held, since it may
//! dispatch new updates.

use slotmap::SlotMap;

use crate::fiber::{EffectTag, FiberArena, FiberId, FiberUpdateQueue, StateNode, WorkTag};
use crate::fiber_root::{FiberRoot, RootId};
use crate::hooks::{commit_hook_effect_list, commit_unmount_effects, HookEffectTag};
use crate::host::{HostConfig, NodeId};
use crate::update_queue::commit_update_queue;
use crate::work_loop::ReconcilerInner;

fn is_host_parent(tag: WorkTag) -> bool {
    matches!(tag, WorkTag::HostComponent | WorkTag::HostRoot)
}

fn is_host_node(tag: WorkTag) -> bool {
    matches!(tag, WorkTag::HostComponent | WorkTag::HostText)
}

/// The nearest host ancestor of `fiber` and the node children attach to.
fn host_parent(
    fibers: &FiberArena,
    roots: &SlotMap<RootId, FiberRoot>,
    fiber: FiberId,
) -> Option<(FiberId, NodeId)> {
    let mut parent = fibers[fiber].parent;
    while let Some(candidate) = parent {
        let parent_fiber = &fibers[candidate];
        match (parent_fiber.tag, parent_fiber.state_node) {
            (WorkTag::HostComponent, StateNode::Host(instance)) => {
                return Some((candidate, instance));
            }
            (WorkTag::HostRoot, StateNode::Root(root)) => {
                return roots.get(root).map(|root| (candidate, root.container));
            }
            _ => parent = parent_fiber.parent,
        }
    }
    None
}

/// The first host node after `fiber` that is already in place, to insert
/// before.
fn host_sibling(fibers: &mut FiberArena, fiber: FiberId) -> Option<NodeId> {
    let mut node = fiber;
    'siblings: loop {
        while fibers[node].sibling.is_none() {
            match fibers[node].parent {
                Some(parent) if !is_host_parent(fibers[parent].tag) => node = parent,
                _ => return None,
            }
        }
        let parent = fibers[node].parent;
        let sibling = fibers[node].sibling?;
        fibers[sibling].parent = parent;
        node = sibling;

        while !is_host_node(fibers[node].tag) {
            // A node about to be placed cannot be an anchor, nor can anything
            // below it.
            if fibers[node].effect_tag.contains(EffectTag::PLACEMENT) {
                continue 'siblings;
            }
            let Some(child) = fibers[node].child else {
                continue 'siblings;
            };
            fibers[child].parent = Some(node);
            node = child;
        }

        if !fibers[node].effect_tag.contains(EffectTag::PLACEMENT) {
            if let Some(instance) = fibers[node].state_node.host() {
                return Some(instance);
            }
        }
    }
}

pub(crate) fn commit_placement<H: HostConfig>(inner: &ReconcilerInner<H>, finished_work: FiberId) {
    let mut fibers = inner.fibers.borrow_mut();
    let roots = inner.roots.borrow();
    let Some((parent_fiber, parent)) = host_parent(&fibers, &roots, finished_work) else {
        log::error!("placed fiber has no host parent");
        return;
    };
    let mut host = inner.host.borrow_mut();
    if fibers[parent_fiber]
        .effect_tag
        .contains(EffectTag::CONTENT_RESET)
    {
        host.reset_text_content(parent);
        fibers[parent_fiber]
            .effect_tag
            .remove(EffectTag::CONTENT_RESET);
    }

    let before = host_sibling(&mut fibers, finished_work);
    let mut node = finished_work;
    loop {
        let fiber = &fibers[node];
        match (is_host_node(fiber.tag), fiber.state_node.host(), fiber.child) {
            (true, Some(instance), _) => match before {
                Some(before) => host.insert_before(parent, instance, before),
                None => host.append_child(parent, instance),
            },
            (false, _, Some(child)) => {
                fibers[child].parent = Some(node);
                node = child;
                continue;
            }
            _ => {}
        }
        if node == finished_work {
            return;
        }
        while fibers[node].sibling.is_none() {
            match fibers[node].parent {
                Some(parent) if parent != finished_work => node = parent,
                _ => return,
            }
        }
        let parent = fibers[node].parent;
        let Some(sibling) = fibers[node].sibling else {
            return;
        };
        fibers[sibling].parent = parent;
        node = sibling;
    }
}

/// Applies an update to a committed fiber.
pub(crate) fn commit_work<H: HostConfig>(inner: &ReconcilerInner<H>, finished_work: FiberId) {
    let tag = inner.fibers.borrow()[finished_work].tag;
    match tag {
        WorkTag::FunctionComponent => {
            let queue = inner.fibers.borrow()[finished_work].update_queue.clone();
            commit_hook_effect_list(
                &queue,
                HookEffectTag::UNMOUNT_MUTATION,
                HookEffectTag::MOUNT_MUTATION,
            );
        }
        WorkTag::HostComponent => {
            let fibers = inner.fibers.borrow();
            let fiber = &fibers[finished_work];
            let (Some(instance), Some(current)) = (fiber.state_node.host(), fiber.alternate) else {
                return;
            };
            let (Some(old_props), Some(new_props)) = (
                fibers[current].memoized_props.element(),
                fiber.memoized_props.element(),
            ) else {
                return;
            };
            let element_type = fiber.host_type().unwrap_or_default();
            inner
                .host
                .borrow_mut()
                .commit_update(instance, element_type, old_props, new_props);
        }
        WorkTag::HostText => {
            let fibers = inner.fibers.borrow();
            let fiber = &fibers[finished_work];
            let (Some(instance), Some(new_text)) =
                (fiber.state_node.host(), fiber.memoized_props.text())
            else {
                return;
            };
            let old_text = fiber
                .alternate
                .and_then(|current| fibers[current].memoized_props.text().cloned())
                .unwrap_or_else(|| new_text.clone());
            inner
                .host
                .borrow_mut()
                .commit_text_update(instance, &old_text, new_text);
        }
        WorkTag::HostRoot | WorkTag::Fragment => {}
    }
}

pub(crate) fn commit_reset_text_content<H: HostConfig>(
    inner: &ReconcilerInner<H>,
    finished_work: FiberId,
) {
    let instance = inner.fibers.borrow()[finished_work].state_node.host();
    if let Some(instance) = instance {
        inner.host.borrow_mut().reset_text_content(instance);
    }
}

/// Removes the host nodes of a deleted subtree and runs every teardown in it.
pub(crate) fn commit_deletion<H: HostConfig>(inner: &ReconcilerInner<H>, current: FiberId) {
    let (parent, host_nodes, effect_queues) = {
        let fibers = inner.fibers.borrow();
        let roots = inner.roots.borrow();
        let parent = host_parent(&fibers, &roots, current).map(|(_, node)| node);

        let mut host_nodes = Vec::new();
        let mut effect_queues = Vec::new();
        let mut stack = vec![(current, false)];
        while let Some((node, inside_host)) = stack.pop() {
            let fiber = &fibers[node];
            match fiber.tag {
                WorkTag::FunctionComponent => effect_queues.push(fiber.update_queue.clone()),
                tag if is_host_node(tag) && !inside_host => {
                    if let Some(instance) = fiber.state_node.host() {
                        host_nodes.push(instance);
                    }
                }
                _ => {}
            }
            let inside_host = inside_host || is_host_node(fiber.tag);
            for child in fibers.children(node).into_iter().rev() {
                stack.push((child, inside_host));
            }
        }
        (parent, host_nodes, effect_queues)
    };

    for queue in &effect_queues {
        commit_unmount_effects(queue);
    }

    let Some(parent) = parent else {
        log::error!("deleted fiber has no host parent");
        return;
    };
    let mut host = inner.host.borrow_mut();
    for node in host_nodes {
        host.remove_child(parent, node);
    }
}

/// Layout pass work for one committed fiber.
pub(crate) fn commit_lifecycles<H: HostConfig>(inner: &ReconcilerInner<H>, finished_work: FiberId) {
    let (tag, queue) = {
        let fibers = inner.fibers.borrow();
        let fiber = &fibers[finished_work];
        (fiber.tag, fiber.update_queue.clone())
    };
    match tag {
        WorkTag::FunctionComponent => {
            commit_hook_effect_list(
                &queue,
                HookEffectTag::UNMOUNT_LAYOUT,
                HookEffectTag::MOUNT_LAYOUT,
            );
        }
        WorkTag::HostRoot => {
            if let FiberUpdateQueue::Root(queue) = queue {
                commit_update_queue(&queue);
            }
        }
        WorkTag::HostComponent => {
            let fibers = inner.fibers.borrow();
            let fiber = &fibers[finished_work];
            if fiber.alternate.is_some() || !fiber.effect_tag.contains(EffectTag::UPDATE) {
                return;
            }
            let (Some(instance), Some(props)) =
                (fiber.state_node.host(), fiber.memoized_props.element())
            else {
                return;
            };
            let element_type = fiber.host_type().unwrap_or_default();
            inner
                .host
                .borrow_mut()
                .commit_mount(instance, element_type, props);
        }
        WorkTag::HostText | WorkTag::Fragment => {}
    }
}

/// Tears down and re-runs the passive effects of one committed fiber.
pub(crate) fn commit_passive_hook_effects(queue: &FiberUpdateQueue) {
    commit_hook_effect_list(queue, HookEffectTag::UNMOUNT_PASSIVE, HookEffectTag::empty());
    commit_hook_effect_list(queue, HookEffectTag::empty(), HookEffectTag::MOUNT_PASSIVE);
}
