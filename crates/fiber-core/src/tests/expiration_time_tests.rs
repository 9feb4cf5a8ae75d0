use super::*;

#[test]
fn sentinels_are_ordered_by_urgency() {
    assert!(SYNC > ms_to_expiration_time(0));
    assert!(ms_to_expiration_time(0) > NEVER);
    assert!(NEVER > NO_WORK);
}

#[test]
fn later_timestamps_are_less_urgent() {
    let early = ms_to_expiration_time(100);
    let late = ms_to_expiration_time(1_000);
    assert!(late < early);
    assert_eq!(ms_to_expiration_time(0), SYNC - 1);
    assert_eq!(ms_to_expiration_time(100), SYNC - 1 - 10);
}

#[test]
fn sub_unit_timestamps_share_an_expiration_time() {
    assert_eq!(ms_to_expiration_time(40), ms_to_expiration_time(49));
    assert_ne!(ms_to_expiration_time(49), ms_to_expiration_time(50));
}

#[test]
fn milliseconds_convert_back() {
    assert_eq!(expiration_time_to_ms(ms_to_expiration_time(100)), 100);
    assert_eq!(expiration_time_to_ms(ms_to_expiration_time(12_340)), 12_340);
}

#[test]
fn huge_timestamps_saturate_above_never() {
    assert_eq!(ms_to_expiration_time(u64::MAX), NEVER + 1);
}

#[test]
fn async_updates_in_one_bucket_coalesce() {
    let first = compute_async_expiration(ms_to_expiration_time(0));
    let second = compute_async_expiration(ms_to_expiration_time(100));
    let third = compute_async_expiration(ms_to_expiration_time(240));
    assert_eq!(first, second);
    assert_eq!(second, third);

    let next_bucket = compute_async_expiration(ms_to_expiration_time(250));
    assert!(next_bucket < first);
}

#[test]
fn async_deadline_is_rounded_up() {
    let expiration = compute_async_expiration(ms_to_expiration_time(0));
    assert_eq!(expiration_time_to_ms(expiration), 5_250);
}

#[test]
fn interactive_work_expires_sooner_than_async_work() {
    let now = ms_to_expiration_time(1_000);
    let interactive = compute_interactive_expiration(now);
    let default = compute_async_expiration(now);
    assert!(interactive > default);
    assert!(interactive < now);
    assert_eq!(expiration_time_to_ms(interactive) - 1_000, 200);
}

#[test]
fn priority_inferred_from_remaining_time() {
    let now = ms_to_expiration_time(0);
    assert_eq!(
        infer_priority_from_expiration_time(now, SYNC),
        PriorityLevel::Immediate
    );
    assert_eq!(
        infer_priority_from_expiration_time(now, NEVER),
        PriorityLevel::Idle
    );
    assert_eq!(
        infer_priority_from_expiration_time(now, compute_interactive_expiration(now)),
        PriorityLevel::UserBlocking
    );
    assert_eq!(
        infer_priority_from_expiration_time(now, compute_async_expiration(now)),
        PriorityLevel::Normal
    );
    assert_eq!(
        infer_priority_from_expiration_time(now, ms_to_expiration_time(60_000)),
        PriorityLevel::Idle
    );
}

#[test]
fn expired_work_is_immediate() {
    let later = ms_to_expiration_time(1_000);
    let deadline = ms_to_expiration_time(0);
    assert_eq!(
        infer_priority_from_expiration_time(later, deadline),
        PriorityLevel::Immediate
    );
}
