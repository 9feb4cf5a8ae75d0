use super::*;
use crate::element::Child;
use crate::expiration_time::SYNC;
use crate::fiber_root::RootId;
use slotmap::SlotMap;
use std::cell::Cell;

const HIGH: ExpirationTime = 100;
const LOW: ExpirationTime = 50;

#[derive(Clone, Debug, Default, PartialEq)]
struct Letters(Vec<&'static str>);

impl MergeState for Letters {
    fn merge(&self, partial: &Self) -> Self {
        let mut merged = self.0.clone();
        merged.extend(partial.0.iter().copied());
        Letters(merged)
    }
}

fn push(expiration_time: ExpirationTime, letter: &'static str) -> Update<Letters> {
    Update::new(expiration_time, UpdatePayload::Value(Letters(vec![letter])))
}

fn process(queue: &mut UpdateQueue<Letters>, render: ExpirationTime) -> ProcessedState<Letters> {
    let mut effect_tag = EffectTag::empty();
    queue.process(&FiberProps::None, render, &mut effect_tag)
}

#[test]
fn skipped_updates_are_rebased_in_insertion_order() {
    let mut queue = UpdateQueue::new(Letters::default());
    queue.enqueue(push(HIGH, "a"));
    queue.enqueue(push(LOW, "b"));
    queue.enqueue(push(HIGH, "c"));

    let first = process(&mut queue, HIGH);
    assert_eq!(first.state, Letters(vec!["a", "c"]));
    assert_eq!(first.remaining_expiration_time, LOW);
    assert_eq!(queue.base_state(), &Letters(vec!["a"]));

    let second = process(&mut queue, LOW);
    assert_eq!(second.state, Letters(vec!["a", "b", "c"]));
    assert_eq!(second.remaining_expiration_time, NO_WORK);
    assert_eq!(queue.pending_len(), 0);
}

#[test]
fn forked_queues_share_one_log() {
    let current = UpdateQueue::new(Letters::default());
    let mut work_in_progress = current.fork();
    assert!(current.shares_log_with(&work_in_progress));

    current.enqueue(push(SYNC, "a"));
    assert_eq!(current.pending_len(), 1);
    assert_eq!(work_in_progress.pending_len(), 1);

    let processed = process(&mut work_in_progress, SYNC);
    assert_eq!(processed.state, Letters(vec!["a"]));
    assert_eq!(work_in_progress.pending_len(), 0);
    assert_eq!(current.pending_len(), 1);
}

#[test]
fn each_update_applies_once_per_queue() {
    let mut current = UpdateQueue::new(Letters::default());
    let mut work_in_progress = current.fork();
    current.enqueue(push(SYNC, "x"));

    assert_eq!(process(&mut current, SYNC).state, Letters(vec!["x"]));
    assert_eq!(process(&mut work_in_progress, SYNC).state, Letters(vec!["x"]));
    assert_eq!(process(&mut current, SYNC).state, Letters(vec!["x"]));
    assert_eq!(process(&mut work_in_progress, SYNC).state, Letters(vec!["x"]));
}

#[test]
fn skipped_updates_give_the_same_result_on_every_replay() {
    let mut current = UpdateQueue::new(Letters::default());
    let mut work_in_progress = current.fork();
    current.enqueue(push(SYNC, "1"));
    current.enqueue(push(LOW, "2"));
    current.enqueue(push(SYNC, "3"));

    let from_current = process(&mut current, SYNC);
    let from_work_in_progress = process(&mut work_in_progress, SYNC);
    assert_eq!(from_current.state, Letters(vec!["1", "3"]));
    assert_eq!(from_work_in_progress.state, from_current.state);
    assert_eq!(from_current.remaining_expiration_time, LOW);
    assert_eq!(from_work_in_progress.remaining_expiration_time, LOW);

    // Replaying at the same priority applies nothing twice.
    let again = process(&mut work_in_progress, SYNC);
    assert_eq!(again.state, from_current.state);
    assert_eq!(again.remaining_expiration_time, LOW);

    // The skipped update stays queued, so the lower priority pass still sees it.
    assert_eq!(current.base_state(), &Letters(vec!["1"]));
    assert_eq!(work_in_progress.pending_len(), 2);
    let later = process(&mut work_in_progress, LOW);
    assert_eq!(later.state, Letters(vec!["1", "2", "3"]));
    assert_eq!(later.remaining_expiration_time, NO_WORK);
}

#[test]
fn update_tags_change_how_payloads_apply() {
    let mut queue = UpdateQueue::new(Letters(vec!["base"]));
    queue.enqueue(push(SYNC, "merged"));
    queue.enqueue(
        Update::new(SYNC, UpdatePayload::Value(Letters(vec!["replaced"])))
            .with_tag(UpdateTag::ReplaceState),
    );
    queue.enqueue(
        Update::new(
            SYNC,
            UpdatePayload::Compute(Rc::new(|previous: &Letters, _: &FiberProps| {
                Letters(vec![previous.0[0], "computed"])
            })),
        )
        .with_tag(UpdateTag::ReplaceState),
    );

    let processed = process(&mut queue, SYNC);
    assert_eq!(processed.state, Letters(vec!["replaced", "computed"]));
    assert!(!processed.has_force_update);

    queue.enqueue(Update::new(SYNC, UpdatePayload::None).with_tag(UpdateTag::ForceUpdate));
    let forced = process(&mut queue, SYNC);
    assert!(forced.has_force_update);
    assert_eq!(forced.state, processed.state);
}

#[test]
fn capture_updates_mark_the_fiber() {
    let mut queue = UpdateQueue::new(Letters(vec!["broken"]));
    queue.enqueue(
        Update::new(SYNC, UpdatePayload::Value(Letters(vec!["fallback"])))
            .with_tag(UpdateTag::CaptureUpdate),
    );
    let mut effect_tag = EffectTag::SHOULD_CAPTURE;
    let processed = queue.process(&FiberProps::None, SYNC, &mut effect_tag);
    assert_eq!(processed.state, Letters(vec!["fallback"]));
    assert!(effect_tag.contains(EffectTag::DID_CAPTURE));
    assert!(!effect_tag.contains(EffectTag::SHOULD_CAPTURE));
}

#[test]
fn callbacks_become_effects() {
    let mut queue = UpdateQueue::new(Letters::default());
    queue.enqueue(push(SYNC, "a").with_callback(|| {}));
    queue.enqueue(push(SYNC, "b"));

    let mut effect_tag = EffectTag::empty();
    queue.process(&FiberProps::None, SYNC, &mut effect_tag);
    assert!(effect_tag.contains(EffectTag::CALLBACK));
    assert!(queue.has_effects());
    assert_eq!(queue.take_effects().len(), 1);
    assert!(!queue.has_effects());
}

fn root_id() -> RootId {
    let mut roots: SlotMap<RootId, ()> = SlotMap::with_key();
    roots.insert(())
}

fn root_update(text: &str) -> Update<RootState> {
    Update::new(
        SYNC,
        UpdatePayload::Value(RootState {
            element: Child::text(text),
        }),
    )
}

fn queue_of(fibers: &FiberArena, fiber: FiberId) -> RootQueue {
    root_queue(fibers, fiber).expect("fiber has a root queue")
}

#[test]
fn root_updates_reach_both_alternates() {
    let mut fibers = FiberArena::new();
    let current = fibers.create_host_root_fiber(root_id());
    enqueue_update(&mut fibers, current, root_update("a"));
    let work_in_progress = fibers.create_work_in_progress(current, FiberProps::None);

    process_update_queue(&mut fibers, work_in_progress, SYNC);
    match &fibers[work_in_progress].memoized_state {
        MemoizedState::Root(state) => assert_eq!(state.element.as_text(), Some("a")),
        _ => panic!("root fiber lost its state"),
    }

    let current_queue = queue_of(&fibers, current);
    let work_queue = queue_of(&fibers, work_in_progress);
    assert!(!Rc::ptr_eq(&current_queue, &work_queue));
    assert!(current_queue.borrow().shares_log_with(&work_queue.borrow()));
    assert_eq!(current_queue.borrow().pending_len(), 1);
    assert_eq!(work_queue.borrow().pending_len(), 0);

    enqueue_update(&mut fibers, current, root_update("b"));
    assert_eq!(current_queue.borrow().pending_len(), 2);
    assert_eq!(work_queue.borrow().pending_len(), 1);
}

#[test]
fn enqueue_creates_queues_for_both_alternates() {
    let mut fibers = FiberArena::new();
    let current = fibers.create_host_root_fiber(root_id());
    let work_in_progress = fibers.create_work_in_progress(current, FiberProps::None);
    assert!(root_queue(&fibers, current).is_none());

    enqueue_update(&mut fibers, work_in_progress, root_update("a"));
    let first = queue_of(&fibers, work_in_progress);
    let second = queue_of(&fibers, current);
    assert!(first.borrow().shares_log_with(&second.borrow()));
    assert_eq!(first.borrow().pending_len(), 1);
    assert_eq!(second.borrow().pending_len(), 1);
}

#[test]
fn committed_callbacks_fire_once() {
    let mut fibers = FiberArena::new();
    let current = fibers.create_host_root_fiber(root_id());
    let calls = Rc::new(Cell::new(0));
    let counter = calls.clone();
    enqueue_update(
        &mut fibers,
        current,
        root_update("a").with_callback(move || counter.set(counter.get() + 1)),
    );
    let work_in_progress = fibers.create_work_in_progress(current, FiberProps::None);
    process_update_queue(&mut fibers, work_in_progress, SYNC);
    assert!(fibers[work_in_progress]
        .effect_tag
        .contains(EffectTag::CALLBACK));

    let queue = queue_of(&fibers, work_in_progress);
    commit_update_queue(&queue);
    commit_update_queue(&queue);
    assert_eq!(calls.get(), 1);
}
