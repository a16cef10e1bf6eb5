//! Ramp delay timing on single-line writes

use std::sync::Arc;
use std::time::{Duration, Instant};

use dio_aggregator::{AggregatorRegistry, ForwarderFeatures, RampTiming};
use dio_core::LineDevice;
use dio_driver_mock::{MockChipConfig, MockLineProvider};

const FALLING: Duration = Duration::from_micros(200);

fn registry(may_block: bool) -> (Arc<MockLineProvider>, AggregatorRegistry) {
    let p = Arc::new(
        MockLineProvider::from_configs([MockChipConfig::new("relays", 4)
            .may_block(may_block)
            .with_active_low([1])])
        .unwrap(),
    );
    let registry = AggregatorRegistry::new(p.clone());
    (p, registry)
}

fn timed(f: impl FnOnce()) -> Duration {
    let start = Instant::now();
    f();
    start.elapsed()
}

#[test]
fn rising_zero_falling_200us() {
    for may_block in [false, true] {
        let (_p, registry) = registry(may_block);
        let id = registry
            .create_with("relays 0", ForwarderFeatures::DELAY)
            .unwrap();
        let device = registry.device(id).unwrap();
        device.xlate_delay(&[0, 0, 200]).unwrap();
        device.set_direction_output(0, false).unwrap();

        let rising = timed(|| device.set(0, true).unwrap());
        assert!(rising < FALLING, "rising took {:?}", rising);

        let falling = timed(|| device.set(0, false).unwrap());
        assert!(falling >= FALLING, "falling took {:?}", falling);
    }
}

#[test]
fn active_low_line_swaps_edges() {
    let (p, registry) = registry(false);
    let id = registry
        .create_with("relays 1", ForwarderFeatures::DELAY)
        .unwrap();
    let device = registry.device(id).unwrap();
    device
        .configure_ramp(0, RampTiming::new(0, 200))
        .unwrap();
    device.set_direction_output(0, false).unwrap();
    assert_eq!(p.chip("relays").unwrap().level(1), Some(true));

    // Logical 1 on an active-low line pulls the pin down: a falling edge.
    let elapsed = timed(|| device.set(0, true).unwrap());
    assert!(elapsed >= FALLING, "took {:?}", elapsed);

    let elapsed = timed(|| device.set(0, false).unwrap());
    assert!(elapsed < FALLING, "took {:?}", elapsed);
}

#[test]
fn batched_set_does_not_wait() {
    let (_p, registry) = registry(true);
    let id = registry
        .create_with("relays 0-1", ForwarderFeatures::DELAY)
        .unwrap();
    let device = registry.device(id).unwrap();
    device
        .configure_ramp(0, RampTiming::new(50_000, 50_000))
        .unwrap();

    let mask = dio_core::LineMask::full(2);
    let bits = dio_core::LineMask::from_bools(&[true, false]);
    let elapsed = timed(|| device.set_multiple(&mask, &bits).unwrap());
    assert!(elapsed < Duration::from_millis(50), "took {:?}", elapsed);
}

#[test]
fn ramps_update_while_in_use() {
    let (_p, registry) = registry(false);
    let id = registry
        .create_with("relays 2", ForwarderFeatures::DELAY)
        .unwrap();
    let device = registry.device(id).unwrap();

    let writer = {
        let device = device.clone();
        std::thread::spawn(move || {
            for us in 0..100u32 {
                device.xlate_delay(&[0, us % 3, us % 5]).unwrap();
            }
        })
    };
    for i in 0..100 {
        device.set(0, i % 2 == 0).unwrap();
    }
    writer.join().unwrap();
    assert_eq!(device.ramp_timing(0), Some(RampTiming::new(99 % 3, 99 % 5)));
}
