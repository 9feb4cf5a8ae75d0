use super::*;
use fiber_core::{Element, MemoryHost, PriorityLevel, Props, TaskResult};

fn recording_callback(slot: &Rc<Cell<Option<bool>>>) -> HostCallback {
    let slot = slot.clone();
    Box::new(move |did_timeout| slot.set(Some(did_timeout)))
}

#[test]
fn frame_time_adapts_to_faster_displays() {
    let clock = StdClock::new();
    assert_eq!(clock.frame_time(), DEFAULT_FRAME_TIME_MS);

    clock.begin_frame(1000);
    assert_eq!(clock.frame_deadline(), 1033);
    clock.begin_frame(1008);
    assert_eq!(clock.frame_time(), DEFAULT_FRAME_TIME_MS);
    clock.begin_frame(1016);
    assert_eq!(clock.frame_time(), MIN_FRAME_TIME_MS);
    assert_eq!(clock.frame_deadline(), 1024);
}

#[test]
fn forced_frame_rate_stays_locked() {
    let clock = StdClock::new();
    clock.force_frame_rate(60);
    assert_eq!(clock.frame_time(), 16);
    for start in [1000, 1008, 1016, 1024] {
        clock.begin_frame(start);
    }
    assert_eq!(clock.frame_time(), 16);

    clock.force_frame_rate(MAX_FRAME_RATE + 1);
    assert_eq!(clock.frame_time(), 16);

    clock.force_frame_rate(0);
    assert_eq!(clock.frame_time(), DEFAULT_FRAME_TIME_MS);
}

#[test]
fn callbacks_wait_for_a_frame_with_idle_time() {
    let clock = StdClock::new();
    let ran = Rc::new(Cell::new(None));
    clock.request_host_callback(recording_callback(&ran), i64::MAX);
    assert!(clock.take_frame_request());
    assert!(!clock.take_frame_request());

    clock.end_frame();
    assert!(clock.should_yield_now());
    assert!(!clock.run_idle_callback());
    assert!(clock.has_pending_callback());
    assert!(clock.take_frame_request());
    assert_eq!(ran.get(), None);

    assert!(clock.run_frame());
    assert_eq!(ran.get(), Some(false));
    assert!(!clock.has_pending_callback());
}

#[test]
fn expired_callbacks_run_without_idle_time() {
    let clock = StdClock::new();
    let ran = Rc::new(Cell::new(None));
    clock.request_host_callback(recording_callback(&ran), -1);
    clock.end_frame();
    assert!(clock.run_idle_callback());
    assert_eq!(ran.get(), Some(true));
}

#[test]
fn cancelled_callbacks_never_run() {
    let clock = StdClock::new();
    let ran = Rc::new(Cell::new(None));
    clock.request_host_callback(recording_callback(&ran), i64::MAX);
    clock.cancel_host_callback();
    assert!(!clock.has_pending_callback());
    assert!(!clock.run_frame());
    assert_eq!(ran.get(), None);
}

#[test]
fn frame_waker_is_called_until_cleared() {
    let clock = StdClock::new();
    let wakes = Rc::new(Cell::new(0));
    let counter = wakes.clone();
    clock.set_frame_waker(move || counter.set(counter.get() + 1));

    clock.request_host_callback(Box::new(|_| {}), i64::MAX);
    assert_eq!(wakes.get(), 1);

    clock.clear_frame_waker();
    clock.request_host_callback(Box::new(|_| {}), i64::MAX);
    assert_eq!(wakes.get(), 1);
}

#[test]
fn runtime_frames_drive_the_scheduler() {
    let runtime = StdRuntime::new();
    let runs = Rc::new(Cell::new(0));
    let counter = runs.clone();
    runtime.scheduler().schedule_callback(
        PriorityLevel::Normal,
        Box::new(move |_| {
            counter.set(counter.get() + 1);
            TaskResult::Done
        }),
        None,
    );
    assert!(runtime.take_frame_request());

    assert_eq!(runtime.run_until_idle(10), 1);
    assert_eq!(runs.get(), 1);
    assert!(!runtime.clock().has_pending_callback());
}

#[test]
fn reconcilers_share_the_runtime_scheduler() {
    let runtime = StdRuntime::new();
    let mut first_host = MemoryHost::new();
    let first_container = first_host.create_container();
    let first = runtime.reconciler(first_host);
    let first_root = first.create_container(first_container);

    let mut second_host = MemoryHost::new();
    let second_container = second_host.create_container();
    let second = runtime.reconciler(second_host);
    let second_root = second.create_container(second_container);

    first
        .update_container(Element::host("p", Props::with_children("hello")), first_root)
        .unwrap();
    second
        .update_container(Element::host("p", Props::with_children("world")), second_root)
        .unwrap();
    assert_eq!(runtime.scheduler().len(), 2);

    runtime.run_until_idle(10);
    assert_eq!(
        first.with_host(|host| host.text_content(first_container)),
        "hello"
    );
    assert_eq!(
        second.with_host(|host| host.text_content(second_container)),
        "world"
    );
    assert!(runtime.scheduler().is_empty());
}
