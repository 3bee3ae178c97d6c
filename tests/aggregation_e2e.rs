//! End-to-end tests for the aggregation policies.
//!
//! Inputs settle on real threads in shuffled order; results must keep input
//! order and surface the inputs' own failures.

mod common;

use common::*;
use converge::combinator::{
    all_of, all_of_fail_fast, any_of, any_success_of, most_success_of, most_success_of_on,
};
use converge::{Error, ErrorKind, Handle, Outcome};
use proptest::prelude::*;
use std::time::{Duration, Instant};

fn settle_later<T: Clone + Send + 'static>(handle: &Handle<T>, after: Duration, outcome: Outcome<T>) {
    let handle = handle.clone();
    std::thread::spawn(move || {
        std::thread::sleep(after);
        handle.settle(outcome);
    });
}

#[test]
fn all_of_keeps_order_across_threads() {
    init_test_logging();
    test_phase!("all_of ordering");

    let inputs: Vec<Handle<usize>> = (0..8).map(|_| Handle::pending()).collect();
    let result = all_of(&inputs);
    for (i, input) in inputs.iter().enumerate() {
        // Later indices finish first.
        settle_later(input, Duration::from_millis(5 * (8 - i as u64)), Outcome::Ok(i));
    }

    let values = result
        .wait_timeout(Duration::from_secs(5))
        .into_result()
        .expect("all succeeded");
    assert_eq!(values, (0..8).collect::<Vec<_>>());
    test_complete!("all_of_keeps_order_across_threads");
}

proptest! {
    #![proptest_config(test_proptest_config(64))]

    #[test]
    fn all_of_result_matches_inputs(values in proptest::collection::vec(any::<i64>(), 0..24),
                                    seed in any::<u64>()) {
        let inputs: Vec<Handle<i64>> = values.iter().map(|_| Handle::pending()).collect();
        let result = all_of(&inputs);

        // Settle in a seed-dependent order.
        let mut order: Vec<usize> = (0..inputs.len()).collect();
        let mut state = seed | 1;
        for i in (1..order.len()).rev() {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            order.swap(i, (state % (i as u64 + 1)) as usize);
        }
        for &i in &order {
            inputs[i].complete(values[i]);
        }

        prop_assert_eq!(result.probe(), Some(values));
    }
}

#[test]
fn all_of_surfaces_the_input_failure() {
    init_test_logging();
    let cause = Error::user("all_of input failed");
    let a: Handle<u8> = Handle::pending();
    let b: Handle<u8> = Handle::pending();
    let result = all_of(&[a.clone(), b.clone()]);

    settle_later(&a, Duration::from_millis(5), Outcome::Err(cause.clone()));
    settle_later(&b, Duration::from_millis(30), Outcome::Ok(1));

    match result.wait_timeout(Duration::from_secs(5)) {
        Outcome::Err(e) => assert!(e.same_failure(&cause)),
        other => panic!("expected input failure, got {other:?}"),
    }
    assert!(b.is_settled(), "all_of waits for every input");
}

#[test]
fn fail_fast_ignores_never_settling_input() {
    init_test_logging();
    test_phase!("fail fast");

    let cause = Error::user("fail fast trigger");
    let never: Handle<u8> = Handle::pending();
    let failing: Handle<u8> = Handle::pending();
    let result = all_of_fail_fast(&[never.clone(), failing.clone()]);

    let start = Instant::now();
    settle_later(&failing, Duration::from_millis(5), Outcome::Err(cause.clone()));
    match result.wait_timeout(Duration::from_secs(5)) {
        Outcome::Err(e) => assert!(e.same_failure(&cause)),
        other => panic!("expected fast failure, got {other:?}"),
    }
    assert!(start.elapsed() < Duration::from_secs(1));
    assert!(!never.is_settled(), "stragglers are not cancelled");
}

#[test]
fn any_success_picks_the_success() {
    init_test_logging();
    let first: Handle<&'static str> = Handle::failed(Error::user("any_success left"));
    let winner: Handle<&'static str> = Handle::pending();
    let last: Handle<&'static str> = Handle::pending();
    let result = any_success_of(&[first, winner.clone(), last.clone()]);

    settle_later(&last, Duration::from_millis(5), Outcome::Err(Error::user("any_success right")));
    settle_later(&winner, Duration::from_millis(20), Outcome::Ok("value"));

    assert!(matches!(
        result.wait_timeout(Duration::from_secs(5)),
        Outcome::Ok("value")
    ));
}

#[test]
fn any_success_all_fail_surfaces_a_failure() {
    init_test_logging();
    let causes = [Error::user("all fail one"), Error::user("all fail two")];
    let inputs: Vec<Handle<u8>> = causes.iter().map(|c| Handle::failed(c.clone())).collect();
    let result = any_success_of(&inputs);

    let failure = match result.outcome() {
        Some(Outcome::Err(e)) => e,
        other => panic!("expected failure, got {other:?}"),
    };
    assert!(causes.iter().any(|c| c.same_failure(&failure)));
}

#[test]
fn any_success_without_inputs_fails_immediately() {
    let result = any_success_of::<u8>(&[]);
    let cause = result
        .outcome()
        .and_then(|o| o.failure())
        .expect("settled at once");
    assert_eq!(cause.kind(), ErrorKind::NoInputs);
}

#[test]
fn most_success_substitutes_fallback_at_deadline() {
    init_test_logging();
    test_phase!("most success");

    let timeout = Duration::from_millis(200);
    let slow: Handle<i32> = Handle::pending();
    let fast = Handle::completed(7);
    settle_later(&slow, timeout * 2, Outcome::Ok(99));

    let start = Instant::now();
    let result = most_success_of(&[slow.clone(), fast], -1, timeout);
    let values = result
        .wait_timeout(Duration::from_secs(5))
        .into_result()
        .expect("most_success never fails");
    let elapsed = start.elapsed();

    assert_eq!(values, vec![-1, 7]);
    assert!(elapsed >= timeout, "settled early: {elapsed:?}");
    assert!(elapsed < timeout * 2, "settled late: {elapsed:?}");
}

#[test]
fn most_success_settles_early_when_all_done() {
    let a = Handle::completed(1);
    let b = Handle::completed(2);
    let start = Instant::now();
    let result = most_success_of_on(&[a, b], 0, Duration::from_secs(30), inline());
    assert_eq!(result.probe(), Some(vec![1, 2]));
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[test]
fn single_settled_input_is_defensively_copied() {
    init_test_logging();
    let settled = Handle::completed(5_u8);
    let pending: Handle<u8> = Handle::pending();

    for input in [settled, pending] {
        let one = std::slice::from_ref(&input);
        let results: Vec<Box<dyn Fn() -> bool>> = vec![
            Box::new({
                let h = all_of(one);
                move || h.cancel()
            }),
            Box::new({
                let h = all_of_fail_fast(one);
                move || h.cancel()
            }),
            Box::new({
                let h = any_of(one);
                move || h.cancel()
            }),
            Box::new({
                let h = any_success_of(one);
                move || h.cancel()
            }),
            Box::new({
                let h = most_success_of_on(one, 0, Duration::from_secs(30), inline());
                move || h.cancel()
            }),
        ];
        for cancel in &results {
            cancel();
        }
        assert!(!input.is_cancelled());
    }
}

#[test]
fn minimal_inputs_work_everywhere() {
    let a: Handle<u8> = Handle::pending();
    let b: Handle<u8> = Handle::pending();
    let views = [a.minimal(), b.minimal()];

    let all = all_of(&views);
    let fast = all_of_fail_fast(&views);
    let any = any_of(&views);
    let success = any_success_of(&views);
    let most = most_success_of_on(&views, 0, Duration::from_secs(30), inline());

    a.complete(1);
    b.complete(2);

    assert_eq!(all.probe(), Some(vec![1, 2]));
    assert_eq!(fast.probe(), Some(vec![1, 2]));
    assert_eq!(any.probe(), Some(1));
    assert_eq!(success.probe(), Some(1));
    assert_eq!(most.probe(), Some(vec![1, 2]));
}
