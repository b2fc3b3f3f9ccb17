//! End-to-end scenario 3 ("rate-limit storm"): ten consecutive responses
//! each carrying `retry-after: 1` should cost the caller roughly ten real
//! seconds of waiting, no more and no less, and throughput should recover
//! once the storm ends.

use std::time::{Duration, Instant};

use streamvault_controller::{AdaptiveController, ControllerConfig};

#[tokio::test(flavor = "multi_thread")]
async fn ten_retry_after_responses_cost_roughly_ten_seconds_and_recommended_concurrency_recovers() {
    let controller = AdaptiveController::new(ControllerConfig::default());

    let start = Instant::now();
    for _ in 0..10 {
        controller.slot().await;
        controller.on_response(
            vec![("retry-after".to_string(), "1".to_string())],
            Duration::from_millis(20),
            false,
        );
    }
    // One more slot() pays off the last retry-after wait.
    controller.slot().await;
    let elapsed = start.elapsed();

    assert!(
        elapsed >= Duration::from_secs(10),
        "storm should cost at least 10s of waiting, took {elapsed:?}"
    );
    assert!(
        elapsed <= Duration::from_secs(12),
        "storm should not overshoot much past 10s, took {elapsed:?}"
    );

    // A clean response with no retry-after lets the caller proceed
    // immediately and the controller never collapses below its floor.
    controller.on_response(Vec::new(), Duration::from_millis(20), false);
    let recovery_start = Instant::now();
    controller.slot().await;
    assert!(recovery_start.elapsed() < Duration::from_millis(100));
    assert!(controller.stats().recommended_concurrency >= 1);
}
