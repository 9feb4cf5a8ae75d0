//! Complete phase: materialize host instances bottom-up.

use crate::error::FiberError;
use crate::expiration_time::ExpirationTime;
use crate::fiber::{EffectTag, FiberArena, FiberId, StateNode, WorkTag};
use crate::host::{HostConfig, NodeId};
use crate::work_loop::ReconcilerInner;

/// Appends the top-level host nodes under `work_in_progress` to `parent`.
fn append_all_children<H: HostConfig>(
    fibers: &mut FiberArena,
    host: &mut H,
    parent: NodeId,
    work_in_progress: FiberId,
) {
    let mut node = fibers[work_in_progress].child;
    while let Some(current) = node {
        let fiber = &fibers[current];
        match (fiber.tag, fiber.state_node) {
            (WorkTag::HostComponent | WorkTag::HostText, StateNode::Host(instance)) => {
                host.append_child(parent, instance);
            }
            _ => {
                if let Some(child) = fiber.child {
                    fibers[child].parent = Some(current);
                    node = Some(child);
                    continue;
                }
            }
        }

        let mut cursor = current;
        loop {
            if cursor == work_in_progress {
                return;
            }
            if let Some(sibling) = fibers[cursor].sibling {
                let parent_fiber = fibers[cursor].parent;
                fibers[sibling].parent = parent_fiber;
                node = Some(sibling);
                break;
            }
            match fibers[cursor].parent {
                Some(parent_fiber) if parent_fiber != work_in_progress => cursor = parent_fiber,
                _ => return,
            }
        }
    }
}

pub(crate) fn complete_work<H: HostConfig>(
    inner: &ReconcilerInner<H>,
    current: Option<FiberId>,
    work_in_progress: FiberId,
    _render_expiration_time: ExpirationTime,
) -> Result<Option<FiberId>, FiberError> {
    let mut fibers = inner.fibers.borrow_mut();
    let tag = fibers[work_in_progress].tag;
    match tag {
        WorkTag::FunctionComponent | WorkTag::Fragment | WorkTag::HostRoot => {}
        WorkTag::HostComponent => {
            let Some(new_props) = fibers[work_in_progress].pending_props.element().cloned() else {
                return Ok(None);
            };
            let element_type = fibers[work_in_progress]
                .host_type()
                .map(str::to_owned)
                .unwrap_or_default();
            let existing = fibers[work_in_progress].state_node.host();
            match (current, existing) {
                (Some(current), Some(_)) => {
                    let unchanged = fibers[current]
                        .memoized_props
                        .element()
                        .is_some_and(|old_props| std::rc::Rc::ptr_eq(old_props, &new_props));
                    if !unchanged {
                        fibers[work_in_progress].effect_tag.insert(EffectTag::UPDATE);
                    }
                }
                _ => {
                    let mut host = inner.host.borrow_mut();
                    let instance =
                        host.create_instance(&element_type, &new_props, work_in_progress);
                    append_all_children(&mut fibers, &mut *host, instance, work_in_progress);
                    if host.finalize_initial_properties(instance, &element_type, &new_props) {
                        fibers[work_in_progress].effect_tag.insert(EffectTag::UPDATE);
                    }
                    fibers[work_in_progress].state_node = StateNode::Host(instance);
                }
            }
        }
        WorkTag::HostText => {
            let Some(new_text) = fibers[work_in_progress].pending_props.text().cloned() else {
                return Ok(None);
            };
            let existing = fibers[work_in_progress].state_node.host();
            match (current, existing) {
                (Some(current), Some(_)) => {
                    let changed = fibers[current]
                        .memoized_props
                        .text()
                        .map_or(true, |old_text| **old_text != *new_text);
                    if changed {
                        fibers[work_in_progress].effect_tag.insert(EffectTag::UPDATE);
                    }
                }
                _ => {
                    let instance = inner
                        .host
                        .borrow_mut()
                        .create_text_instance(&new_text, work_in_progress);
                    fibers[work_in_progress].state_node = StateNode::Host(instance);
                }
            }
        }
    }
    Ok(None)
}
