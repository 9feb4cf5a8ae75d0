//! Child reconciliation: diffing a new child description against the
//! previous child fibers of one parent.

use std::rc::Rc;

use crate::collections::map::{self, HashMap};
use crate::element::{Child, Element, ElementType, Key};
use crate::expiration_time::ExpirationTime;
use crate::fiber::{EffectTag, FiberArena, FiberId, FiberProps, WorkTag};

/// Identity of an old child while matching a list: its key, or its index
/// when unkeyed.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum ChildKey {
    Explicit(Key),
    Index(usize),
}

impl ChildKey {
    fn of(key: Option<&Key>, index: usize) -> Self {
        match key {
            Some(key) => ChildKey::Explicit(key.clone()),
            None => ChildKey::Index(index),
        }
    }
}

/// Reconciles children, recording placements and deletions only when
/// `track_side_effects` is set.
#[derive(Copy, Clone, Debug)]
pub struct ChildReconciler {
    track_side_effects: bool,
}

/// Used when the parent is new: the whole subtree is inserted at once.
pub const MOUNT_CHILD_FIBERS: ChildReconciler = ChildReconciler {
    track_side_effects: false,
};

pub const RECONCILE_CHILD_FIBERS: ChildReconciler = ChildReconciler {
    track_side_effects: true,
};

fn element_props(element: &Element) -> FiberProps {
    match element.element_type {
        ElementType::Fragment => FiberProps::Children(element.props.children.clone()),
        _ => FiberProps::Element(element.props.clone()),
    }
}

impl ChildReconciler {
    pub fn tracks_side_effects(&self) -> bool {
        self.track_side_effects
    }

    /// Reconciles `new_child` against the children starting at
    /// `current_first_child` and returns the first new child fiber.
    pub fn reconcile_child_fibers(
        &self,
        fibers: &mut FiberArena,
        return_fiber: FiberId,
        current_first_child: Option<FiberId>,
        new_child: &Child,
        expiration_time: ExpirationTime,
    ) -> Option<FiberId> {
        // An unkeyed fragment at the top is treated as its children.
        let new_child = match new_child {
            Child::Element(element)
                if element.element_type == ElementType::Fragment && element.key.is_none() =>
            {
                &element.props.children
            }
            other => other,
        };

        match new_child {
            Child::Element(element) => {
                let fiber = self.reconcile_single_element(
                    fibers,
                    return_fiber,
                    current_first_child,
                    element,
                    expiration_time,
                );
                Some(self.place_single_child(fibers, fiber))
            }
            Child::Text(text) => {
                let fiber = self.reconcile_single_text_node(
                    fibers,
                    return_fiber,
                    current_first_child,
                    text.clone(),
                    expiration_time,
                );
                Some(self.place_single_child(fibers, fiber))
            }
            Child::List(children) => self.reconcile_children_array(
                fibers,
                return_fiber,
                current_first_child,
                children,
                expiration_time,
            ),
            Child::Unsupported(description) => {
                log::warn!("unsupported child {description:?} rendered as empty");
                self.delete_remaining_children(fibers, return_fiber, current_first_child);
                None
            }
            Child::Empty => {
                self.delete_remaining_children(fibers, return_fiber, current_first_child);
                None
            }
        }
    }

    /// Appends `child` to the parent's effect list as a deletion.
    fn delete_child(&self, fibers: &mut FiberArena, return_fiber: FiberId, child: FiberId) {
        if !self.track_side_effects {
            return;
        }
        match fibers[return_fiber].last_effect {
            Some(last) => fibers[last].next_effect = Some(child),
            None => fibers[return_fiber].first_effect = Some(child),
        }
        fibers[return_fiber].last_effect = Some(child);
        let fiber = &mut fibers[child];
        fiber.next_effect = None;
        fiber.effect_tag = EffectTag::DELETION;
    }

    fn delete_remaining_children(
        &self,
        fibers: &mut FiberArena,
        return_fiber: FiberId,
        current_first_child: Option<FiberId>,
    ) {
        if !self.track_side_effects {
            return;
        }
        let mut child = current_first_child;
        while let Some(current) = child {
            child = fibers[current].sibling;
            self.delete_child(fibers, return_fiber, current);
        }
    }

    fn map_remaining_children(
        fibers: &FiberArena,
        current_first_child: Option<FiberId>,
        capacity: usize,
    ) -> HashMap<ChildKey, FiberId> {
        let mut existing = map::with_capacity(capacity);
        let mut child = current_first_child;
        while let Some(current) = child {
            let fiber = &fibers[current];
            existing.insert(ChildKey::of(fiber.key.as_ref(), fiber.index), current);
            child = fiber.sibling;
        }
        existing
    }

    /// The work-in-progress clone of `fiber`, detached from its siblings.
    fn use_fiber(
        fibers: &mut FiberArena,
        return_fiber: FiberId,
        fiber: FiberId,
        pending_props: FiberProps,
    ) -> FiberId {
        let clone = fibers.create_work_in_progress(fiber, pending_props);
        let clone_fiber = &mut fibers[clone];
        clone_fiber.index = 0;
        clone_fiber.sibling = None;
        clone_fiber.parent = Some(return_fiber);
        clone
    }

    fn adopt(fibers: &mut FiberArena, return_fiber: FiberId, fiber: FiberId) -> FiberId {
        fibers[fiber].parent = Some(return_fiber);
        fiber
    }

    /// Records the new position of `new_fiber` and tags it for placement if
    /// it moved behind `last_placed_index`. Returns the new high-water mark.
    fn place_child(
        &self,
        fibers: &mut FiberArena,
        new_fiber: FiberId,
        last_placed_index: usize,
        new_index: usize,
    ) -> usize {
        fibers[new_fiber].index = new_index;
        if !self.track_side_effects {
            return last_placed_index;
        }
        match fibers[new_fiber].alternate {
            Some(current) => {
                let old_index = fibers[current].index;
                if old_index < last_placed_index {
                    fibers[new_fiber].effect_tag.insert(EffectTag::PLACEMENT);
                    last_placed_index
                } else {
                    old_index
                }
            }
            None => {
                fibers[new_fiber].effect_tag.insert(EffectTag::PLACEMENT);
                last_placed_index
            }
        }
    }

    fn place_single_child(&self, fibers: &mut FiberArena, new_fiber: FiberId) -> FiberId {
        if self.track_side_effects && fibers[new_fiber].alternate.is_none() {
            fibers[new_fiber].effect_tag.insert(EffectTag::PLACEMENT);
        }
        new_fiber
    }

    fn update_text_node(
        fibers: &mut FiberArena,
        return_fiber: FiberId,
        current: Option<FiberId>,
        text: Rc<str>,
        expiration_time: ExpirationTime,
    ) -> FiberId {
        match current {
            Some(current) if fibers[current].tag == WorkTag::HostText => {
                Self::use_fiber(fibers, return_fiber, current, FiberProps::Text(text))
            }
            _ => {
                let created = fibers.create_fiber_from_text(text, expiration_time);
                Self::adopt(fibers, return_fiber, created)
            }
        }
    }

    fn update_element(
        fibers: &mut FiberArena,
        return_fiber: FiberId,
        current: Option<FiberId>,
        element: &Element,
        expiration_time: ExpirationTime,
    ) -> FiberId {
        match current {
            Some(current)
                if fibers[current].element_type.as_ref() == Some(&element.element_type) =>
            {
                Self::use_fiber(fibers, return_fiber, current, element_props(element))
            }
            _ => {
                let created = fibers.create_fiber_from_element(element, expiration_time);
                Self::adopt(fibers, return_fiber, created)
            }
        }
    }

    fn update_fragment(
        fibers: &mut FiberArena,
        return_fiber: FiberId,
        current: Option<FiberId>,
        children: Child,
        expiration_time: ExpirationTime,
        key: Option<Key>,
    ) -> FiberId {
        match current {
            Some(current) if fibers[current].tag == WorkTag::Fragment => {
                Self::use_fiber(fibers, return_fiber, current, FiberProps::Children(children))
            }
            _ => {
                let created = fibers.create_fiber_from_fragment(children, expiration_time, key);
                Self::adopt(fibers, return_fiber, created)
            }
        }
    }

    fn create_child(
        fibers: &mut FiberArena,
        return_fiber: FiberId,
        new_child: &Child,
        expiration_time: ExpirationTime,
    ) -> Option<FiberId> {
        let created = match new_child {
            Child::Text(text) => fibers.create_fiber_from_text(text.clone(), expiration_time),
            Child::Element(element) => fibers.create_fiber_from_element(element, expiration_time),
            Child::List(_) => {
                fibers.create_fiber_from_fragment(new_child.clone(), expiration_time, None)
            }
            Child::Unsupported(description) => {
                log::warn!("unsupported child {description:?} rendered as empty");
                return None;
            }
            Child::Empty => return None,
        };
        Some(Self::adopt(fibers, return_fiber, created))
    }

    /// Tries to reuse `old_fiber` for `new_child` at the same position.
    /// `None` means the slot does not match.
    fn update_slot(
        fibers: &mut FiberArena,
        return_fiber: FiberId,
        old_fiber: Option<FiberId>,
        new_child: &Child,
        expiration_time: ExpirationTime,
    ) -> Option<FiberId> {
        let key = old_fiber.and_then(|old| fibers[old].key.clone());
        match new_child {
            // Text nodes are never keyed.
            Child::Text(text) if key.is_none() => Some(Self::update_text_node(
                fibers,
                return_fiber,
                old_fiber,
                text.clone(),
                expiration_time,
            )),
            Child::Element(element) if element.key == key => {
                if element.element_type == ElementType::Fragment {
                    Some(Self::update_fragment(
                        fibers,
                        return_fiber,
                        old_fiber,
                        element.props.children.clone(),
                        expiration_time,
                        key,
                    ))
                } else {
                    Some(Self::update_element(
                        fibers,
                        return_fiber,
                        old_fiber,
                        element,
                        expiration_time,
                    ))
                }
            }
            Child::List(_) if key.is_none() => Some(Self::update_fragment(
                fibers,
                return_fiber,
                old_fiber,
                new_child.clone(),
                expiration_time,
                None,
            )),
            Child::Unsupported(description) => {
                log::warn!("unsupported child {description:?} rendered as empty");
                None
            }
            _ => None,
        }
    }

    fn update_from_map(
        fibers: &mut FiberArena,
        existing: &HashMap<ChildKey, FiberId>,
        return_fiber: FiberId,
        new_index: usize,
        new_child: &Child,
        expiration_time: ExpirationTime,
    ) -> Option<FiberId> {
        match new_child {
            Child::Text(text) => {
                let matched = existing.get(&ChildKey::Index(new_index)).copied();
                Some(Self::update_text_node(
                    fibers,
                    return_fiber,
                    matched,
                    text.clone(),
                    expiration_time,
                ))
            }
            Child::Element(element) => {
                let matched = existing
                    .get(&ChildKey::of(element.key.as_ref(), new_index))
                    .copied();
                if element.element_type == ElementType::Fragment {
                    Some(Self::update_fragment(
                        fibers,
                        return_fiber,
                        matched,
                        element.props.children.clone(),
                        expiration_time,
                        element.key.clone(),
                    ))
                } else {
                    Some(Self::update_element(
                        fibers,
                        return_fiber,
                        matched,
                        element,
                        expiration_time,
                    ))
                }
            }
            Child::List(_) => {
                let matched = existing.get(&ChildKey::Index(new_index)).copied();
                Some(Self::update_fragment(
                    fibers,
                    return_fiber,
                    matched,
                    new_child.clone(),
                    expiration_time,
                    None,
                ))
            }
            Child::Unsupported(description) => {
                log::warn!("unsupported child {description:?} rendered as empty");
                None
            }
            Child::Empty => None,
        }
    }

    fn link_sibling(
        fibers: &mut FiberArena,
        new_fiber: FiberId,
        previous_new_fiber: &mut Option<FiberId>,
        resulting_first_child: &mut Option<FiberId>,
    ) {
        match *previous_new_fiber {
            Some(previous) => fibers[previous].sibling = Some(new_fiber),
            None => *resulting_first_child = Some(new_fiber),
        }
        *previous_new_fiber = Some(new_fiber);
    }

    /// Diffs a list in three passes: an aligned scan while slots match, a
    /// tail append once the old children run out, and a keyed lookup for
    /// everything else.
    fn reconcile_children_array(
        &self,
        fibers: &mut FiberArena,
        return_fiber: FiberId,
        current_first_child: Option<FiberId>,
        new_children: &[Child],
        expiration_time: ExpirationTime,
    ) -> Option<FiberId> {
        let mut resulting_first_child = None;
        let mut previous_new_fiber = None;

        let mut old_fiber = current_first_child;
        let mut last_placed_index = 0;
        let mut new_index = 0;

        while let Some(old) = old_fiber {
            if new_index >= new_children.len() {
                break;
            }
            // A gap in the old indices: the old fiber belongs further right.
            let (slot_fiber, next_old_fiber) = if fibers[old].index > new_index {
                (None, Some(old))
            } else {
                (Some(old), fibers[old].sibling)
            };
            let Some(new_fiber) = Self::update_slot(
                fibers,
                return_fiber,
                slot_fiber,
                &new_children[new_index],
                expiration_time,
            ) else {
                if slot_fiber.is_none() {
                    old_fiber = next_old_fiber;
                }
                break;
            };
            if self.track_side_effects {
                if let Some(slot_fiber) = slot_fiber {
                    if fibers[new_fiber].alternate.is_none() {
                        self.delete_child(fibers, return_fiber, slot_fiber);
                    }
                }
            }
            last_placed_index = self.place_child(fibers, new_fiber, last_placed_index, new_index);
            Self::link_sibling(
                fibers,
                new_fiber,
                &mut previous_new_fiber,
                &mut resulting_first_child,
            );
            old_fiber = next_old_fiber;
            new_index += 1;
        }

        if new_index == new_children.len() {
            self.delete_remaining_children(fibers, return_fiber, old_fiber);
            return resulting_first_child;
        }

        if old_fiber.is_none() {
            for (index, new_child) in new_children.iter().enumerate().skip(new_index) {
                let Some(new_fiber) =
                    Self::create_child(fibers, return_fiber, new_child, expiration_time)
                else {
                    continue;
                };
                last_placed_index = self.place_child(fibers, new_fiber, last_placed_index, index);
                Self::link_sibling(
                    fibers,
                    new_fiber,
                    &mut previous_new_fiber,
                    &mut resulting_first_child,
                );
            }
            return resulting_first_child;
        }

        let mut existing =
            Self::map_remaining_children(fibers, old_fiber, new_children.len() - new_index);
        for (index, new_child) in new_children.iter().enumerate().skip(new_index) {
            let Some(new_fiber) = Self::update_from_map(
                fibers,
                &existing,
                return_fiber,
                index,
                new_child,
                expiration_time,
            ) else {
                continue;
            };
            if self.track_side_effects && fibers[new_fiber].alternate.is_some() {
                let fiber = &fibers[new_fiber];
                existing.remove(&ChildKey::of(fiber.key.as_ref(), index));
            }
            last_placed_index = self.place_child(fibers, new_fiber, last_placed_index, index);
            Self::link_sibling(
                fibers,
                new_fiber,
                &mut previous_new_fiber,
                &mut resulting_first_child,
            );
        }

        if self.track_side_effects {
            let mut leftovers: Vec<FiberId> = existing.into_values().collect();
            leftovers.sort_by_key(|fiber| fibers[*fiber].index);
            for child in leftovers {
                self.delete_child(fibers, return_fiber, child);
            }
        }

        resulting_first_child
    }

    fn reconcile_single_text_node(
        &self,
        fibers: &mut FiberArena,
        return_fiber: FiberId,
        current_first_child: Option<FiberId>,
        text: Rc<str>,
        expiration_time: ExpirationTime,
    ) -> FiberId {
        if let Some(current) = current_first_child {
            if fibers[current].tag == WorkTag::HostText {
                let sibling = fibers[current].sibling;
                self.delete_remaining_children(fibers, return_fiber, sibling);
                return Self::use_fiber(fibers, return_fiber, current, FiberProps::Text(text));
            }
        }
        self.delete_remaining_children(fibers, return_fiber, current_first_child);
        let created = fibers.create_fiber_from_text(text, expiration_time);
        Self::adopt(fibers, return_fiber, created)
    }

    fn reconcile_single_element(
        &self,
        fibers: &mut FiberArena,
        return_fiber: FiberId,
        current_first_child: Option<FiberId>,
        element: &Element,
        expiration_time: ExpirationTime,
    ) -> FiberId {
        let mut child = current_first_child;
        while let Some(current) = child {
            if fibers[current].key == element.key {
                if fibers[current].element_type.as_ref() == Some(&element.element_type) {
                    let sibling = fibers[current].sibling;
                    self.delete_remaining_children(fibers, return_fiber, sibling);
                    return Self::use_fiber(fibers, return_fiber, current, element_props(element));
                }
                self.delete_remaining_children(fibers, return_fiber, Some(current));
                break;
            }
            self.delete_child(fibers, return_fiber, current);
            child = fibers[current].sibling;
        }

        let created = fibers.create_fiber_from_element(element, expiration_time);
        Self::adopt(fibers, return_fiber, created)
    }
}

/// Gives `work_in_progress` fresh clones of its current children, unchanged.
pub(crate) fn clone_child_fibers(fibers: &mut FiberArena, work_in_progress: FiberId) {
    let Some(current_child) = fibers[work_in_progress].child else {
        return;
    };
    let props = fibers[current_child].pending_props.clone();
    let mut new_child = fibers.create_work_in_progress(current_child, props);
    fibers[work_in_progress].child = Some(new_child);
    fibers[new_child].parent = Some(work_in_progress);

    let mut current_sibling = fibers[current_child].sibling;
    while let Some(current) = current_sibling {
        let props = fibers[current].pending_props.clone();
        let next = fibers.create_work_in_progress(current, props);
        fibers[new_child].sibling = Some(next);
        fibers[next].parent = Some(work_in_progress);
        new_child = next;
        current_sibling = fibers[current].sibling;
    }
    fibers[new_child].sibling = None;
}

#[cfg(test)]
#[path = "tests/child_fiber_tests.rs"]
mod tests;
