//! Shared helpers for the recorder integration tests

#![allow(dead_code)] // not every test file uses every helper

pub mod builders;

use std::time::{Duration, Instant};

/// Poll `f` until it holds or two seconds pass
pub fn wait_until(mut f: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !f() {
        assert!(Instant::now() < deadline, "condition not met in time");
        std::thread::sleep(Duration::from_millis(5));
    }
}

/// Assert `actual` is within `tolerance` of `expected`
pub fn assert_duration_near(actual: Duration, expected: Duration, tolerance: Duration) {
    let diff = if actual > expected {
        actual - expected
    } else {
        expected - actual
    };
    assert!(
        diff <= tolerance,
        "Expected {:?} to be within {:?} of {:?}",
        actual,
        tolerance,
        expected
    );
}
