use syncring::{DriftController, RecoveredClock};

#[test]
fn test_worked_rate_example() {
    let mut clock = RecoveredClock::new();
    clock.observe(Some(4_000), 1_000);
    // Time passes; a second observation arrives at system 12000.
    clock.observe(Some(5_000), 12_000);
    assert_eq!(clock.now(12_000), 1_000);
}

#[test]
fn test_monotonic_under_adversarial_observations() {
    let mut clock = RecoveredClock::new();
    // Alternate overshooting and undershooting device times while
    // querying in between; the output must never decrease.
    let observations: &[(i64, i64)] = &[
        (1_000, 1_000),
        (9_000, 2_000),  // device racing ahead
        (9_100, 4_000),  // almost stalled
        (9_050, 5_000),  // regressed device time
        (20_000, 6_000), // huge jump forward
        (20_500, 9_000),
    ];
    let mut high_water = i64::MIN;
    for &(device, system) in observations {
        clock.observe(Some(device), system);
        for step in 0..5 {
            let now = clock.now(system + step * 100);
            assert!(
                now >= high_water,
                "clock went backwards: {now} < {high_water} after ({device}, {system})"
            );
            high_water = now;
        }
    }
}

#[test]
fn test_freeze_resume_continuity() {
    let mut clock = RecoveredClock::new();
    clock.observe(Some(100_000), 0);
    clock.observe(Some(101_000), 1_000);
    let before = clock.now(2_500);
    clock.freeze();
    // Queries while frozen hold the pre-freeze timestamp...
    assert_eq!(clock.now(10_000), before);
    assert_eq!(clock.now(60_000), before);
    // ...and the first observation after the freeze resumes exactly
    // there, wherever the device timeline went meanwhile.
    clock.observe(Some(500_000), 60_000);
    assert_eq!(clock.now(60_000), before);
}

#[test]
fn test_repeated_freeze_resume_accumulates_no_error() {
    let mut clock = RecoveredClock::new();
    clock.observe(Some(0), 0);
    let mut system = 0;
    let mut last = 0;
    for cycle in 0..10 {
        system += 1_000;
        let now = clock.now(system);
        assert!(now >= last, "cycle {cycle} regressed");
        last = now;
        clock.freeze();
        system += 5_000;
        assert_eq!(clock.now(system), last, "frozen output drifted");
        clock.observe(Some(system * 3), system);
        assert_eq!(clock.now(system), last, "resume jumped");
    }
}

#[test]
fn test_reported_drift_feeds_rate_correction() {
    // The loop an orchestrator runs: in-band retrieval deltas go
    // through the PI filter; the sign of the correction follows the
    // sign of the sustained error.
    let mut controller = DriftController::new(0.001, 0.01);
    let mut correction = controller.update(250.0, 0.0);
    for _ in 0..50 {
        correction = controller.update(250.0, 0.02);
    }
    assert!(
        correction > 0.0,
        "sustained positive skew must speed the resampler up"
    );
    let proportional_only = 250.0 * 0.01;
    assert!(
        correction > proportional_only,
        "integral term grows past the proportional response"
    );

    controller.reset();
    let mut correction = 0.0;
    for _ in 0..50 {
        correction = controller.update(-250.0, 0.02);
    }
    assert!(correction < 0.0, "negative skew pulls the rate down");
}
