//! Helpers shared by the integration tests.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing_subscriber::EnvFilter;
use waitables::Counter;

/// Routes `tracing` output to the test harness, filtered by `RUST_LOG`.
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Adds `delta` to `counter` on another thread after `delay`, returning the new value.
#[allow(dead_code)]
pub fn add_later(counter: &Arc<Counter>, delta: i32, delay: Duration) -> thread::JoinHandle<u32> {
    let counter = counter.clone();
    thread::spawn(move || {
        thread::sleep(delay);
        counter.add(delta)
    })
}

/// Asserts that `f` finished well before a blocking wait could have timed out.
#[allow(dead_code)]
pub fn assert_quick<T>(f: impl FnOnce() -> T) -> T {
    let start = Instant::now();
    let result = f();
    assert!(
        start.elapsed() < Duration::from_secs(1),
        "took {:?}, expected no blocking",
        start.elapsed()
    );
    result
}
