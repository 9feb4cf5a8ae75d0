use super::*;
use crate::platform::ManualClock;
use std::cell::Cell;

fn setup() -> (Rc<ManualClock>, Scheduler) {
    let clock = ManualClock::new();
    let scheduler = Scheduler::new(clock.clone());
    (clock, scheduler)
}

fn recording_task(log: &Rc<RefCell<Vec<&'static str>>>, name: &'static str) -> Task {
    let log = log.clone();
    Box::new(move |_| {
        log.borrow_mut().push(name);
        TaskResult::Done
    })
}

#[test]
fn tasks_run_in_deadline_order() {
    let (clock, scheduler) = setup();
    let log = Rc::new(RefCell::new(Vec::new()));
    scheduler.schedule_callback(PriorityLevel::Normal, recording_task(&log, "normal"), None);
    scheduler.schedule_callback(
        PriorityLevel::UserBlocking,
        recording_task(&log, "user-blocking"),
        None,
    );
    scheduler.schedule_callback(PriorityLevel::Idle, recording_task(&log, "idle"), None);
    assert_eq!(scheduler.len(), 3);

    assert!(clock.run_host_callback());
    assert_eq!(*log.borrow(), vec!["user-blocking", "normal", "idle"]);
    assert!(scheduler.is_empty());
    assert!(!clock.has_pending_callback());
}

#[test]
fn equal_deadlines_run_first_in_first_out() {
    let (clock, scheduler) = setup();
    let log = Rc::new(RefCell::new(Vec::new()));
    scheduler.schedule_callback(PriorityLevel::Normal, recording_task(&log, "a"), None);
    scheduler.schedule_callback(PriorityLevel::Normal, recording_task(&log, "b"), None);
    scheduler.schedule_callback(PriorityLevel::Normal, recording_task(&log, "c"), None);

    clock.run_until_idle(10);
    assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
}

#[test]
fn explicit_timeout_overrides_priority() {
    let (clock, scheduler) = setup();
    let log = Rc::new(RefCell::new(Vec::new()));
    scheduler.schedule_callback(PriorityLevel::UserBlocking, recording_task(&log, "ub"), None);
    scheduler.schedule_callback(PriorityLevel::Idle, recording_task(&log, "soon"), Some(10));
    assert_eq!(clock.pending_timeout(), Some(10));

    clock.run_until_idle(10);
    assert_eq!(*log.borrow(), vec!["soon", "ub"]);
}

#[test]
fn new_head_requests_an_earlier_host_callback() {
    let (clock, scheduler) = setup();
    scheduler.schedule_callback(PriorityLevel::Normal, Box::new(|_| TaskResult::Done), None);
    assert_eq!(clock.pending_timeout(), Some(5000));
    scheduler.schedule_callback(
        PriorityLevel::UserBlocking,
        Box::new(|_| TaskResult::Done),
        None,
    );
    assert_eq!(clock.pending_timeout(), Some(250));
    scheduler.schedule_callback(PriorityLevel::Low, Box::new(|_| TaskResult::Done), None);
    assert_eq!(clock.pending_timeout(), Some(250));
}

#[test]
fn cancelled_tasks_never_run() {
    let (clock, scheduler) = setup();
    let log = Rc::new(RefCell::new(Vec::new()));
    let first = scheduler.schedule_callback(PriorityLevel::Normal, recording_task(&log, "a"), None);
    scheduler.schedule_callback(PriorityLevel::Normal, recording_task(&log, "b"), None);

    scheduler.cancel_callback(first);
    assert!(!scheduler.is_scheduled(first));
    assert_eq!(scheduler.len(), 1);
    // Unknown or already cancelled handles are ignored.
    scheduler.cancel_callback(first);

    clock.run_until_idle(10);
    assert_eq!(*log.borrow(), vec!["b"]);
}

#[test]
fn continuation_resumes_after_yield() {
    let (clock, scheduler) = setup();
    let runs = Rc::new(Cell::new(0));
    let counter = runs.clone();
    let id = scheduler.schedule_callback(
        PriorityLevel::Normal,
        Box::new(move |_| {
            counter.set(counter.get() + 1);
            if counter.get() < 3 {
                TaskResult::Continue
            } else {
                TaskResult::Done
            }
        }),
        None,
    );

    clock.set_should_yield(true);
    assert!(clock.run_host_callback());
    assert_eq!(runs.get(), 1);
    assert!(scheduler.is_scheduled(id));
    assert!(clock.has_pending_callback());

    assert!(clock.run_host_callback());
    assert_eq!(runs.get(), 2);

    assert!(clock.run_host_callback());
    assert_eq!(runs.get(), 3);
    assert!(!scheduler.is_scheduled(id));
    assert!(!clock.has_pending_callback());
}

#[test]
fn timed_out_flush_runs_only_expired_tasks() {
    let (clock, scheduler) = setup();
    let log = Rc::new(RefCell::new(Vec::new()));
    let timed_out = Rc::new(Cell::new(false));
    let flag = timed_out.clone();
    let immediate_log = log.clone();
    scheduler.schedule_callback(
        PriorityLevel::Immediate,
        Box::new(move |did_timeout| {
            flag.set(did_timeout);
            immediate_log.borrow_mut().push("immediate");
            TaskResult::Done
        }),
        None,
    );
    scheduler.schedule_callback(PriorityLevel::Normal, recording_task(&log, "normal"), None);

    assert_eq!(clock.pending_timeout(), Some(-1));
    assert!(clock.run_host_callback());
    assert!(timed_out.get());
    assert_eq!(*log.borrow(), vec!["immediate"]);
    assert_eq!(clock.pending_timeout(), Some(5000));

    clock.run_host_callback();
    assert_eq!(*log.borrow(), vec!["immediate", "normal"]);
}

#[test]
fn should_yield_when_more_urgent_work_arrives() {
    let (clock, scheduler) = setup();
    let observed = Rc::new(Cell::new(None));
    let seen = observed.clone();
    let handle = scheduler.clone();
    scheduler.schedule_callback(
        PriorityLevel::Normal,
        Box::new(move |_| {
            let before = handle.should_yield();
            handle.schedule_callback(
                PriorityLevel::UserBlocking,
                Box::new(|_| TaskResult::Done),
                None,
            );
            seen.set(Some((before, handle.should_yield())));
            TaskResult::Done
        }),
        None,
    );

    clock.run_until_idle(10);
    assert_eq!(observed.get(), Some((false, true)));
}

#[test]
fn timed_out_tasks_never_yield() {
    let (clock, scheduler) = setup();
    let observed = Rc::new(Cell::new(None));
    let seen = observed.clone();
    let handle = scheduler.clone();
    scheduler.schedule_callback(
        PriorityLevel::Immediate,
        Box::new(move |_| {
            seen.set(Some(handle.should_yield()));
            TaskResult::Done
        }),
        None,
    );

    clock.set_should_yield(true);
    clock.run_host_callback();
    assert_eq!(observed.get(), Some(false));
}

#[test]
fn cancelling_a_running_task_drops_its_continuation() {
    let (clock, scheduler) = setup();
    let own_id: Rc<Cell<Option<CallbackId>>> = Rc::new(Cell::new(None));
    let id_slot = own_id.clone();
    let handle = scheduler.clone();
    let id = scheduler.schedule_callback(
        PriorityLevel::Normal,
        Box::new(move |_| {
            if let Some(id) = id_slot.get() {
                handle.cancel_callback(id);
            }
            TaskResult::Continue
        }),
        None,
    );
    own_id.set(Some(id));

    clock.run_until_idle(10);
    assert!(!scheduler.is_scheduled(id));
    assert!(scheduler.is_empty());
}

#[test]
fn priority_helpers_scope_the_current_level() {
    let (_clock, scheduler) = setup();
    assert_eq!(scheduler.current_priority_level(), PriorityLevel::Normal);

    let inner = scheduler.run_with_priority(PriorityLevel::Immediate, || {
        let next = scheduler.next(|| scheduler.current_priority_level());
        (scheduler.current_priority_level(), next)
    });
    assert_eq!(inner, (PriorityLevel::Immediate, PriorityLevel::Normal));
    assert_eq!(scheduler.current_priority_level(), PriorityLevel::Normal);

    let idle_next = scheduler.run_with_priority(PriorityLevel::Idle, || {
        scheduler.next(|| scheduler.current_priority_level())
    });
    assert_eq!(idle_next, PriorityLevel::Idle);
}

#[test]
fn wrapped_callback_keeps_its_priority() {
    let (_clock, scheduler) = setup();
    let mut wrapped = scheduler.run_with_priority(PriorityLevel::UserBlocking, || {
        let handle = scheduler.clone();
        scheduler.wrap_callback(move || handle.current_priority_level())
    });
    assert_eq!(wrapped(), PriorityLevel::UserBlocking);
    assert_eq!(scheduler.current_priority_level(), PriorityLevel::Normal);
}
