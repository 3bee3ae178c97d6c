//! End-to-end tests for the delay scheduler and deadline hand-off.

mod common;

use common::*;
use converge::time::{
    delayed_executor, fail_after, is_timer_thread, DelayScheduler, TIMER_THREAD_NAME,
};
use converge::{Executor, Handle, Outcome};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[test]
fn slow_continuation_does_not_delay_other_timeouts() {
    init_test_logging();
    test_phase!("timer hand-off");

    let first: Handle<u8> = Handle::pending();
    let blocked = first.or_timeout(Duration::from_millis(20));
    let (started_tx, started_rx) = mpsc::channel();
    blocked.on_settle(move |_| {
        started_tx.send(()).expect("send");
        // Would stall every later timer if it ran on the timer thread.
        std::thread::sleep(Duration::from_millis(500));
    });

    let second: Handle<u8> = Handle::pending();
    let start = Instant::now();
    let guarded = second.or_timeout(Duration::from_millis(80));

    started_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("first timeout fired");
    let outcome = guarded.wait();
    let elapsed = start.elapsed();

    assert!(outcome.failure().expect("timed out").is_timeout());
    assert!(elapsed >= Duration::from_millis(80));
    assert!(elapsed < Duration::from_millis(400), "second timeout fired late: {elapsed:?}");
    test_complete!("slow_continuation_does_not_delay_other_timeouts");
}

#[test]
fn timeout_continuations_run_off_the_timer_thread() {
    init_test_logging();
    let (tx, rx) = mpsc::channel();
    let source: Handle<u8> = Handle::pending();
    source
        .or_timeout(Duration::from_millis(10))
        .on_settle(move |_| {
            let name = std::thread::current().name().map(str::to_owned);
            tx.send((is_timer_thread(), name)).expect("send");
        });

    let (on_timer, name) = rx.recv_timeout(Duration::from_secs(5)).expect("settled");
    assert!(!on_timer);
    assert_ne!(name.as_deref(), Some(TIMER_THREAD_NAME));
}

#[test]
fn complete_on_timeout_leaves_source_pending() {
    let source: Handle<&'static str> = Handle::pending();
    let guarded = source.complete_on_timeout("late default", Duration::from_millis(10));
    assert!(matches!(guarded.wait(), Outcome::Ok("late default")));
    assert!(!source.is_settled());
    assert!(source.complete("real"));
    assert_eq!(guarded.probe(), Some("late default"));
}

#[test]
fn settled_handles_release_their_timers() {
    let target: Handle<u8> = Handle::pending();
    let task = fail_after(&target, Duration::from_secs(120)).expect("full handle");
    assert!(!task.is_done());
    target.complete(1);
    assert!(task.is_done());
    assert!(!task.cancel(), "already released");

    let minimal_err = fail_after(&target.minimal(), Duration::from_secs(1)).expect_err("minimal");
    assert!(minimal_err.is_validation());
}

#[test]
fn delayed_executor_runs_tasks_later_on_target() {
    let target = inline();
    let executor = delayed_executor(Duration::from_millis(30), Arc::clone(&target));
    let (tx, rx) = mpsc::channel();
    let start = Instant::now();
    executor
        .execute(Box::new(move || tx.send(start.elapsed()).expect("send")))
        .expect("accepted");
    let waited = rx.recv_timeout(Duration::from_secs(5)).expect("ran");
    assert!(waited >= Duration::from_millis(30));
}

#[test]
fn private_scheduler_cancellation_is_observable() {
    let scheduler = DelayScheduler::new("private-delayer");
    let tasks: Vec<_> = (0..10)
        .map(|_| scheduler.schedule(Duration::from_secs(60), || {}))
        .collect();
    assert_eq!(scheduler.pending_count(), 10);
    for task in &tasks[..4] {
        assert!(task.cancel());
    }
    assert_eq!(scheduler.pending_count(), 6);
    assert!(tasks[..4].iter().all(|t| t.is_done()));
    assert!(tasks[4..].iter().all(|t| !t.is_done()));
}
