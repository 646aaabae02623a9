use packer_core::{
    Candidate, DimensionOptimizer, ObjectDimensions, OptimizedDimensions, OptimizerParams,
    WrapFormula, fitness, wrap_size,
};
use proptest::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;

fn object() -> ObjectDimensions {
    ObjectDimensions::new(10.0, 8.0, 5.0).unwrap()
}

proptest! {
    #[test]
    fn fitness_is_zero_iff_every_axis_fits(
        l in 0.1f64..50.0, w in 0.1f64..50.0, h in 0.1f64..50.0,
        cl in 0.0f64..60.0, cw in 0.0f64..60.0, ch in 0.0f64..60.0,
        margin in 0.0f64..2.0,
    ) {
        let obj = ObjectDimensions::new(l, w, h).unwrap();
        let c = Candidate::from_axes([cl, cw, ch]);
        let f = fitness(&c, &obj, margin);
        let fits = cl <= l + margin && cw <= w + margin && ch <= h + margin;
        prop_assert!(f >= 0.0);
        prop_assert_eq!(f == 0.0, fits);
    }

    #[test]
    fn reported_best_is_the_lowest_generation_best(seed in any::<u64>(), rate in 0.0f64..=1.0) {
        let opt = DimensionOptimizer::new(OptimizerParams {
            generations: 20,
            mutation_rate: rate,
            mutation_sigma: 0.5,
            seed: Some(seed),
            ..OptimizerParams::default()
        })
        .unwrap();
        let run = opt.optimize(&object()).unwrap();
        prop_assert_eq!(run.trace.len(), 21);
        prop_assert_eq!(run.generation_best.len(), 21);

        let mut lowest = f64::INFINITY;
        for (g, (&running, &own)) in run.trace.iter().zip(&run.generation_best).enumerate() {
            lowest = lowest.min(own);
            prop_assert_eq!(running, lowest, "generation {}", g);
        }
        prop_assert_eq!(run.best_fitness, lowest);

        let best = Candidate::from_axes([run.best.length, run.best.width, run.best.height]);
        prop_assert!((fitness(&best, &object(), 0.5) - run.best_fitness).abs() < 1e-12);
    }

    #[test]
    fn wrap_size_is_pure(l in 0.0f64..40.0, w in 0.0f64..40.0, h in 0.0f64..40.0) {
        let d = OptimizedDimensions { length: l, width: w, height: h };
        for f in [WrapFormula::HalfPerimeter, WrapFormula::FullPerimeter] {
            prop_assert_eq!(wrap_size(&d, f), wrap_size(&d, f));
        }
        let half = wrap_size(&d, WrapFormula::HalfPerimeter);
        let full = wrap_size(&d, WrapFormula::FullPerimeter);
        prop_assert!((full.length - 2.0 * half.length).abs() < 1e-9);
        prop_assert!((full.width - 2.0 * half.width).abs() < 1e-9);
    }
}

#[test]
fn end_to_end_settles_near_object_plus_margin() {
    let opt = DimensionOptimizer::new(OptimizerParams::default()).unwrap();
    let mut rng = StdRng::seed_from_u64(42);
    let run = opt.optimize_with(&object(), &mut rng).unwrap();

    let best = run.best;
    for (got, want) in [(best.length, 10.5), (best.width, 8.5), (best.height, 5.5)] {
        // One axis can only overshoot by as much as the initial best fitness.
        assert!(got < want + 0.3, "{got} vs {want}");
        assert!(got >= want - 1.0, "{got} vs {want}");
    }
    assert!(run.best_fitness <= run.trace[0]);

    let wrap = wrap_size(&best, WrapFormula::HalfPerimeter);
    assert!((wrap.length - 14.0).abs() < 1.5, "{wrap:?}");
    assert!((wrap.width - 19.0).abs() < 1.5, "{wrap:?}");
}

#[test]
fn zero_mutation_converges_to_pool_mean() {
    let opt = DimensionOptimizer::new(OptimizerParams {
        mutation_rate: 0.0,
        seed: Some(3),
        ..OptimizerParams::default()
    })
    .unwrap();
    let run = opt.optimize(&object()).unwrap();
    // Without mutation children stay inside the initial band.
    assert!(run.best.length >= 10.5 && run.best.length < 10.6);
    assert!(run.best.width >= 8.5 && run.best.width < 8.6);
    assert!(run.best.height >= 5.5 && run.best.height < 5.6);
}

#[test]
fn without_mutation_no_child_beats_the_initial_best() {
    let opt = DimensionOptimizer::new(OptimizerParams {
        mutation_rate: 0.0,
        seed: Some(11),
        ..OptimizerParams::default()
    })
    .unwrap();
    let run = opt.optimize(&object()).unwrap();

    // Every candidate sits above its target, so a child scores the mean of
    // its two distinct parents and the population contracts.
    for pair in run.generation_best.windows(2) {
        assert!(pair[1] >= pair[0] - 1e-9, "generation best dropped: {pair:?}");
    }
    for &running in &run.trace {
        assert!((running - run.trace[0]).abs() < 1e-9);
    }
    assert!((run.best_fitness - run.generation_best[0]).abs() < 1e-9);
}

#[test]
fn degenerate_object_is_rejected() {
    assert!(ObjectDimensions::new(0.0, 1.0, 1.0).is_err());
    assert!(ObjectDimensions::new(1.0, f64::NAN, 1.0).is_err());
    assert!(ObjectDimensions::new(1.0, 1.0, -3.0).is_err());
}
