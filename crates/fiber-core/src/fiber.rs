//! Fibers: one tree position, double buffered.
//!
//! Every rendered position has a `current` fiber and at most one
//! work-in-progress alternate. Both live in the same [`FiberArena`] and refer
//! to each other, and to parents, children and siblings, by [`FiberId`].

use std::cell::RefCell;
use std::fmt;
use std::ops::{Index, IndexMut};
use std::rc::Rc;

use bitflags::bitflags;
use slotmap::{new_key_type, SlotMap};

use crate::element::{Child, Element, ElementType, Key, Props};
use crate::expiration_time::{ExpirationTime, NO_WORK};
use crate::fiber_root::{RootId, RootState};
use crate::hooks::{Effect, Hook};
use crate::host::NodeId;
use crate::update_queue::UpdateQueue;

new_key_type! {
    pub struct FiberId;
}

/// The closed set of fiber kinds. Begin and complete work match on it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum WorkTag {
    FunctionComponent,
    HostRoot,
    HostComponent,
    HostText,
    Fragment,
}

bitflags! {
    /// Side effects recorded on a fiber during render and applied at commit.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EffectTag: u16 {
        const PERFORMED_WORK = 1 << 0;
        const PLACEMENT = 1 << 1;
        const UPDATE = 1 << 2;
        const PLACEMENT_AND_UPDATE = Self::PLACEMENT.bits() | Self::UPDATE.bits();
        const DELETION = 1 << 3;
        const CONTENT_RESET = 1 << 4;
        const CALLBACK = 1 << 5;
        const DID_CAPTURE = 1 << 6;
        const PASSIVE = 1 << 9;
        const INCOMPLETE = 1 << 10;
        const SHOULD_CAPTURE = 1 << 11;
    }
}

impl EffectTag {
    /// Anything beyond `PERFORMED_WORK` puts the fiber on its parent's effect list.
    pub fn has_side_effects(self) -> bool {
        self.bits() > EffectTag::PERFORMED_WORK.bits()
    }
}

/// What a fiber's `state_node` points at.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum StateNode {
    #[default]
    None,
    Host(NodeId),
    Root(RootId),
}

impl StateNode {
    pub fn host(self) -> Option<NodeId> {
        match self {
            StateNode::Host(node) => Some(node),
            _ => None,
        }
    }
}

/// Input a fiber renders from.
#[derive(Clone, Debug, Default)]
pub enum FiberProps {
    #[default]
    None,
    Element(Rc<Props>),
    Text(Rc<str>),
    /// Fragment content.
    Children(Child),
}

impl FiberProps {
    pub fn same(&self, other: &FiberProps) -> bool {
        match (self, other) {
            (FiberProps::None, FiberProps::None) => true,
            (FiberProps::Element(a), FiberProps::Element(b)) => Rc::ptr_eq(a, b),
            (FiberProps::Text(a), FiberProps::Text(b)) => Rc::ptr_eq(a, b),
            (FiberProps::Children(a), FiberProps::Children(b)) => a.same(b),
            _ => false,
        }
    }

    pub fn element(&self) -> Option<&Rc<Props>> {
        match self {
            FiberProps::Element(props) => Some(props),
            _ => None,
        }
    }

    pub fn text(&self) -> Option<&Rc<str>> {
        match self {
            FiberProps::Text(text) => Some(text),
            _ => None,
        }
    }
}

#[derive(Clone, Default)]
pub enum MemoizedState {
    #[default]
    None,
    Root(RootState),
    Hooks(Rc<[Hook]>),
}

#[derive(Clone, Default)]
pub enum FiberUpdateQueue {
    #[default]
    None,
    Root(Rc<RefCell<UpdateQueue<RootState>>>),
    /// Effects pushed by the last render of a function component.
    Effects(Rc<[Rc<Effect>]>),
}

pub struct Fiber {
    pub tag: WorkTag,
    pub key: Option<Key>,
    pub element_type: Option<ElementType>,
    pub state_node: StateNode,

    pub parent: Option<FiberId>,
    pub child: Option<FiberId>,
    pub sibling: Option<FiberId>,
    pub index: usize,

    pub pending_props: FiberProps,
    pub memoized_props: FiberProps,
    pub update_queue: FiberUpdateQueue,
    pub memoized_state: MemoizedState,

    pub effect_tag: EffectTag,
    pub next_effect: Option<FiberId>,
    pub first_effect: Option<FiberId>,
    pub last_effect: Option<FiberId>,

    pub expiration_time: ExpirationTime,
    pub child_expiration_time: ExpirationTime,

    pub alternate: Option<FiberId>,
}

impl Fiber {
    pub fn new(tag: WorkTag, pending_props: FiberProps, key: Option<Key>) -> Self {
        Self {
            tag,
            key,
            element_type: None,
            state_node: StateNode::None,
            parent: None,
            child: None,
            sibling: None,
            index: 0,
            pending_props,
            memoized_props: FiberProps::None,
            update_queue: FiberUpdateQueue::None,
            memoized_state: MemoizedState::None,
            effect_tag: EffectTag::empty(),
            next_effect: None,
            first_effect: None,
            last_effect: None,
            expiration_time: NO_WORK,
            child_expiration_time: NO_WORK,
            alternate: None,
        }
    }

    pub fn host_type(&self) -> Option<&str> {
        match &self.element_type {
            Some(ElementType::Host(tag)) => Some(tag),
            _ => None,
        }
    }

    pub fn hooks(&self) -> Option<&Rc<[Hook]>> {
        match &self.memoized_state {
            MemoizedState::Hooks(hooks) => Some(hooks),
            _ => None,
        }
    }
}

impl fmt::Debug for Fiber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fiber")
            .field("tag", &self.tag)
            .field("key", &self.key)
            .field("state_node", &self.state_node)
            .field("index", &self.index)
            .field("effect_tag", &self.effect_tag)
            .field("expiration_time", &self.expiration_time)
            .field("child_expiration_time", &self.child_expiration_time)
            .finish()
    }
}

/// Storage for every fiber of every root.
#[derive(Default)]
pub struct FiberArena {
    fibers: SlotMap<FiberId, Fiber>,
    /// Fibers created from scratch by the pass in progress.
    fresh: Vec<FiberId>,
}

impl FiberArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: FiberId) -> Option<&Fiber> {
        self.fibers.get(id)
    }

    pub fn get_mut(&mut self, id: FiberId) -> Option<&mut Fiber> {
        self.fibers.get_mut(id)
    }

    pub fn contains(&self, id: FiberId) -> bool {
        self.fibers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.fibers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fibers.is_empty()
    }

    /// Direct children of `id`, in sibling order.
    pub fn children(&self, id: FiberId) -> Vec<FiberId> {
        let mut children = Vec::new();
        let mut cursor = self.fibers.get(id).and_then(|fiber| fiber.child);
        while let Some(child) = cursor {
            children.push(child);
            cursor = self.fibers.get(child).and_then(|fiber| fiber.sibling);
        }
        children
    }

    pub(crate) fn allocate(&mut self, fiber: Fiber) -> FiberId {
        let id = self.fibers.insert(fiber);
        self.fresh.push(id);
        id
    }

    pub(crate) fn create_host_root_fiber(&mut self, root: RootId) -> FiberId {
        let mut fiber = Fiber::new(WorkTag::HostRoot, FiberProps::None, None);
        fiber.state_node = StateNode::Root(root);
        self.fibers.insert(fiber)
    }

    /// Returns the alternate of `current`, reset for a new pass with
    /// `pending_props`, allocating it on first use.
    pub(crate) fn create_work_in_progress(
        &mut self,
        current: FiberId,
        pending_props: FiberProps,
    ) -> FiberId {
        let work_in_progress = match self.fibers[current].alternate {
            Some(alternate) => {
                let fiber = &mut self.fibers[alternate];
                fiber.pending_props = pending_props;
                fiber.effect_tag = EffectTag::empty();
                fiber.next_effect = None;
                fiber.first_effect = None;
                fiber.last_effect = None;
                alternate
            }
            None => {
                let source = &self.fibers[current];
                let mut fiber = Fiber::new(source.tag, pending_props, source.key.clone());
                fiber.element_type = source.element_type.clone();
                fiber.state_node = source.state_node;
                fiber.alternate = Some(current);
                let alternate = self.fibers.insert(fiber);
                self.fibers[current].alternate = Some(alternate);
                alternate
            }
        };

        let source = &self.fibers[current];
        let child_expiration_time = source.child_expiration_time;
        let expiration_time = source.expiration_time;
        let child = source.child;
        let sibling = source.sibling;
        let index = source.index;
        let memoized_props = source.memoized_props.clone();
        let memoized_state = source.memoized_state.clone();
        let update_queue = source.update_queue.clone();

        let fiber = &mut self.fibers[work_in_progress];
        fiber.child_expiration_time = child_expiration_time;
        fiber.expiration_time = expiration_time;
        fiber.child = child;
        fiber.sibling = sibling;
        fiber.index = index;
        fiber.memoized_props = memoized_props;
        fiber.memoized_state = memoized_state;
        fiber.update_queue = update_queue;
        work_in_progress
    }

    pub(crate) fn create_fiber_from_element(
        &mut self,
        element: &Element,
        expiration_time: ExpirationTime,
    ) -> FiberId {
        let (tag, pending_props) = match &element.element_type {
            ElementType::Host(_) => (
                WorkTag::HostComponent,
                FiberProps::Element(element.props.clone()),
            ),
            ElementType::Component(_) => (
                WorkTag::FunctionComponent,
                FiberProps::Element(element.props.clone()),
            ),
            ElementType::Fragment => (
                WorkTag::Fragment,
                FiberProps::Children(element.props.children.clone()),
            ),
        };
        let mut fiber = Fiber::new(tag, pending_props, element.key.clone());
        fiber.element_type = Some(element.element_type.clone());
        fiber.expiration_time = expiration_time;
        self.allocate(fiber)
    }

    pub(crate) fn create_fiber_from_text(
        &mut self,
        text: Rc<str>,
        expiration_time: ExpirationTime,
    ) -> FiberId {
        let mut fiber = Fiber::new(WorkTag::HostText, FiberProps::Text(text), None);
        fiber.expiration_time = expiration_time;
        self.allocate(fiber)
    }

    pub(crate) fn create_fiber_from_fragment(
        &mut self,
        children: Child,
        expiration_time: ExpirationTime,
        key: Option<Key>,
    ) -> FiberId {
        let mut fiber = Fiber::new(WorkTag::Fragment, FiberProps::Children(children), key);
        fiber.element_type = Some(ElementType::Fragment);
        fiber.expiration_time = expiration_time;
        self.allocate(fiber)
    }

    /// Frees the fibers created by an abandoned pass.
    pub(crate) fn discard_fresh(&mut self) {
        for id in std::mem::take(&mut self.fresh) {
            if let Some(fiber) = self.fibers.remove(id) {
                if let Some(alternate) = fiber.alternate {
                    if let Some(other) = self.fibers.get_mut(alternate) {
                        other.alternate = None;
                    }
                }
            }
        }
    }

    /// The pass committed; its fresh fibers are now part of the current tree.
    pub(crate) fn keep_fresh(&mut self) {
        self.fresh.clear();
    }

    /// Frees `id`, its descendants and their alternates.
    pub(crate) fn release_subtree(&mut self, id: FiberId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(fiber) = self.fibers.remove(current) else {
                continue;
            };
            let mut child = fiber.child;
            while let Some(next) = child {
                stack.push(next);
                child = self.fibers.get(next).and_then(|fiber| fiber.sibling);
            }
            if let Some(alternate) = fiber.alternate {
                self.fibers.remove(alternate);
            }
        }
    }
}

impl Index<FiberId> for FiberArena {
    type Output = Fiber;

    fn index(&self, id: FiberId) -> &Fiber {
        self.fibers.get(id).expect("fiber was released")
    }
}

impl IndexMut<FiberId> for FiberArena {
    fn index_mut(&mut self, id: FiberId) -> &mut Fiber {
        self.fibers.get_mut(id).expect("fiber was released")
    }
}

#[cfg(test)]
#[path = "tests/fiber_tests.rs"]
mod tests;
