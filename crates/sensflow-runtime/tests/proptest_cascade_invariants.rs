//! Property-based invariants of value propagation.
//!
//! 1. A listener sees exactly the sequence of values set upstream, repeats
//!    included.
//! 2. The moving average always equals the naive mean of the last N scaled
//!    inputs.
//! 3. Resizing the window keeps the newest samples.
//! 4. A join emits once per notification after both sides have been seen,
//!    never before.

use std::cell::RefCell;
use std::rc::Rc;

use proptest::prelude::*;
use sensflow_runtime::{Emits, Join2, ManualInput, MovingAverage, Pipeline, RingWindow, Sink};

fn sample_strategy() -> impl Strategy<Value = f64> {
    (-1000i32..=1000).prop_map(|v| f64::from(v) / 4.0)
}

fn naive_mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

proptest! {
    #[test]
    fn listener_sees_exact_sequence(values in proptest::collection::vec(-5i64..=5, 0..64)) {
        let pipeline = Pipeline::builder().build();
        let source = ManualInput::<i64>::new(&pipeline, "source");
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        source.connect_to(Sink::new(&pipeline, "sink", move |v: &i64| log.borrow_mut().push(*v)));

        for v in &values {
            source.emit(*v);
        }
        prop_assert_eq!(&*seen.borrow(), &values);
        prop_assert_eq!(source.output().emit_count(), values.len() as u64);
    }

    #[test]
    fn moving_average_matches_naive_mean(
        size in 1usize..=16,
        multiplier in prop_oneof![Just(1.0), Just(0.5), Just(2.0)],
        values in proptest::collection::vec(sample_strategy(), 1..48),
    ) {
        let pipeline = Pipeline::builder().build();
        let source = ManualInput::<f64>::new(&pipeline, "source");
        let avg = source.connect_to(MovingAverage::new(&pipeline, size, multiplier, None));

        let mut scaled = Vec::new();
        for v in &values {
            source.emit(*v);
            scaled.push(v * multiplier);
            let start = scaled.len().saturating_sub(size);
            let expected = naive_mean(&scaled[start..]);
            let got = avg.current().unwrap_or(f64::NAN);
            prop_assert!((got - expected).abs() < 1e-9, "got {got}, expected {expected}");
        }
        prop_assert_eq!(avg.output().emit_count(), values.len() as u64);
    }

    #[test]
    fn resize_keeps_newest(
        values in proptest::collection::vec(sample_strategy(), 0..40),
        from in 1usize..=20,
        to in 1usize..=20,
    ) {
        let mut window = RingWindow::new(from);
        for v in &values {
            window.push(*v);
        }
        let resized = window.resized(to);
        let held: Vec<f64> = window.iter().collect();
        let keep = held.len().min(to);
        let expected: Vec<f64> = held[held.len() - keep..].to_vec();
        prop_assert_eq!(resized.iter().collect::<Vec<_>>(), expected);
        prop_assert_eq!(resized.capacity(), to);
    }

    #[test]
    fn join_emits_only_after_both_sides(events in proptest::collection::vec(any::<bool>(), 0..40)) {
        let pipeline = Pipeline::builder().build();
        let left = ManualInput::<i32>::new(&pipeline, "left");
        let right = ManualInput::<i32>::new(&pipeline, "right");
        let join = Join2::new(&pipeline, "sum", |a: &i32, b: &i32| a + b);
        left.connect_to(join.left());
        right.connect_to(join.right());

        let (mut seen_left, mut seen_right, mut expected) = (false, false, 0u64);
        for (i, is_left) in events.iter().enumerate() {
            if *is_left {
                left.emit(i as i32);
                seen_left = true;
            } else {
                right.emit(i as i32);
                seen_right = true;
            }
            if seen_left && seen_right {
                expected += 1;
            }
        }
        prop_assert_eq!(join.output().emit_count(), expected);
    }
}
