use super::*;
use crate::element::Component;
use crate::expiration_time::SYNC;

fn root_id() -> RootId {
    let mut roots: SlotMap<RootId, ()> = SlotMap::with_key();
    roots.insert(())
}

fn host(tag: &str) -> Element {
    Element::host(tag, Props::new())
}

#[test]
fn only_performed_work_is_not_a_side_effect() {
    assert!(!EffectTag::empty().has_side_effects());
    assert!(!EffectTag::PERFORMED_WORK.has_side_effects());
    assert!(EffectTag::PLACEMENT.has_side_effects());
    assert!((EffectTag::PERFORMED_WORK | EffectTag::UPDATE).has_side_effects());
    assert_eq!(
        EffectTag::PLACEMENT_AND_UPDATE,
        EffectTag::PLACEMENT | EffectTag::UPDATE
    );
}

#[test]
fn host_root_points_at_its_root() {
    let mut fibers = FiberArena::new();
    let root = root_id();
    let fiber = fibers.create_host_root_fiber(root);
    assert_eq!(fibers[fiber].tag, WorkTag::HostRoot);
    assert_eq!(fibers[fiber].state_node, StateNode::Root(root));
    assert!(fibers[fiber].parent.is_none());
}

#[test]
fn work_in_progress_is_allocated_once_and_reused() {
    let mut fibers = FiberArena::new();
    let current = fibers.create_host_root_fiber(root_id());
    fibers[current].expiration_time = SYNC;

    let first = fibers.create_work_in_progress(current, FiberProps::None);
    assert_eq!(fibers[first].alternate, Some(current));
    assert_eq!(fibers[current].alternate, Some(first));
    assert_eq!(fibers[first].expiration_time, SYNC);
    assert_eq!(fibers.len(), 2);

    fibers[first].effect_tag = EffectTag::UPDATE;
    fibers[first].first_effect = Some(current);
    let second = fibers.create_work_in_progress(current, FiberProps::None);
    assert_eq!(first, second);
    assert_eq!(fibers.len(), 2);
    assert!(fibers[second].effect_tag.is_empty());
    assert!(fibers[second].first_effect.is_none());
}

#[test]
fn work_in_progress_copies_tree_links() {
    let mut fibers = FiberArena::new();
    let parent = fibers.create_host_root_fiber(root_id());
    let child = fibers.create_fiber_from_element(&host("div"), SYNC);
    let sibling = fibers.create_fiber_from_text(Rc::from("hi"), SYNC);
    fibers[parent].child = Some(child);
    fibers[child].parent = Some(parent);
    fibers[child].sibling = Some(sibling);
    fibers[child].index = 0;
    fibers[sibling].index = 1;

    let clone = fibers.create_work_in_progress(sibling, FiberProps::Text(Rc::from("bye")));
    assert_eq!(fibers[clone].index, 1);
    assert_eq!(fibers[clone].tag, WorkTag::HostText);
    assert_eq!(fibers[clone].pending_props.text().map(|t| &**t), Some("bye"));
    assert_eq!(fibers.children(parent), vec![child, sibling]);
}

#[test]
fn fibers_created_from_descriptions() {
    let mut fibers = FiberArena::new();
    let component = Component::new("Counter", |_| Child::Empty);
    let element = Element::component(&component, Props::new()).with_key("k");
    let function = fibers.create_fiber_from_element(&element, SYNC);
    assert_eq!(fibers[function].tag, WorkTag::FunctionComponent);
    assert_eq!(fibers[function].key.as_deref(), Some("k"));
    assert_eq!(fibers[function].expiration_time, SYNC);

    let div = fibers.create_fiber_from_element(&host("div"), SYNC);
    assert_eq!(fibers[div].tag, WorkTag::HostComponent);
    assert_eq!(fibers[div].host_type(), Some("div"));

    let fragment = fibers.create_fiber_from_element(&Element::fragment("x"), SYNC);
    assert_eq!(fibers[fragment].tag, WorkTag::Fragment);
    assert!(matches!(
        fibers[fragment].pending_props,
        FiberProps::Children(Child::Text(_))
    ));
}

#[test]
fn props_identity_is_by_allocation() {
    let props = Rc::new(Props::new());
    let a = FiberProps::Element(props.clone());
    let b = FiberProps::Element(props);
    let c = FiberProps::Element(Rc::new(Props::new()));
    assert!(a.same(&b));
    assert!(!a.same(&c));
    assert!(FiberProps::None.same(&FiberProps::None));
    assert!(!FiberProps::Text(Rc::from("a")).same(&FiberProps::Text(Rc::from("a"))));
}

#[test]
fn discarding_fresh_fibers_keeps_committed_ones() {
    let mut fibers = FiberArena::new();
    let current = fibers.create_host_root_fiber(root_id());
    let committed = fibers.create_fiber_from_element(&host("div"), SYNC);
    fibers.keep_fresh();

    let abandoned = fibers.create_fiber_from_element(&host("span"), SYNC);
    fibers.discard_fresh();

    assert!(fibers.contains(current));
    assert!(fibers.contains(committed));
    assert!(!fibers.contains(abandoned));
    assert!(fibers.get(abandoned).is_none());
}

#[test]
fn releasing_a_subtree_frees_alternates_too() {
    let mut fibers = FiberArena::new();
    let root = fibers.create_host_root_fiber(root_id());
    let parent = fibers.create_fiber_from_element(&host("div"), SYNC);
    let child = fibers.create_fiber_from_text(Rc::from("a"), SYNC);
    fibers[root].child = Some(parent);
    fibers[parent].parent = Some(root);
    fibers[parent].child = Some(child);
    fibers[child].parent = Some(parent);
    fibers.keep_fresh();
    let parent_alternate = fibers.create_work_in_progress(parent, FiberProps::None);

    fibers.release_subtree(parent);
    assert!(!fibers.contains(parent));
    assert!(!fibers.contains(parent_alternate));
    assert!(!fibers.contains(child));
    assert!(fibers.contains(root));
    assert_eq!(fibers.len(), 1);
}
