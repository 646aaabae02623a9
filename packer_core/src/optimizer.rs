//! Small evolutionary search for the tightest candidate box that still clears
//! the object by a margin on every axis.
//!
//! The population starts just above `object + margin` and is refined by
//! truncation selection, mean crossover and Gaussian mutation. Mean crossover
//! alone pulls the population toward the breeding pool's centre, so the best
//! of a later generation can be worse than an earlier one; the search keeps
//! the best candidate ever evaluated and reports that.

use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use tracing::{debug, trace};

use crate::error::{PackerError, Result};
use crate::types::{Candidate, ObjectDimensions, OptimizedDimensions};

/// Width of the uniform jitter added to each axis of the initial population.
const INIT_SPREAD_CM: f64 = 0.1;

#[derive(Debug, Clone)]
pub struct OptimizerParams {
    pub population_size: usize,
    pub generations: usize,
    pub margin_cm: f64,
    pub mutation_rate: f64,
    pub mutation_sigma: f64,
    pub breeding_pool: usize,
    pub seed: Option<u64>,
}

impl Default for OptimizerParams {
    fn default() -> Self {
        Self {
            population_size: 10,
            generations: 50,
            margin_cm: 0.5,
            mutation_rate: 0.1,
            mutation_sigma: 0.1,
            breeding_pool: 5,
            seed: None,
        }
    }
}

impl OptimizerParams {
    pub fn validate(&self) -> Result<()> {
        let bad = |msg: String| Err(eyre::Report::new(PackerError::Precondition(msg)));
        if self.population_size < 2 {
            return bad(format!(
                "population_size must be at least 2, got {}",
                self.population_size
            ));
        }
        if self.generations == 0 {
            return bad("generations must be at least 1".into());
        }
        if self.breeding_pool < 2 {
            return bad(format!(
                "breeding_pool must be at least 2, got {}",
                self.breeding_pool
            ));
        }
        if !(0.0..=1.0).contains(&self.mutation_rate) {
            return bad(format!(
                "mutation_rate must be within [0, 1], got {}",
                self.mutation_rate
            ));
        }
        if !(self.margin_cm.is_finite() && self.margin_cm >= 0.0) {
            return bad(format!(
                "margin must be finite and >= 0, got {}",
                self.margin_cm
            ));
        }
        if !(self.mutation_sigma.is_finite() && self.mutation_sigma >= 0.0) {
            return bad(format!(
                "mutation_sigma must be finite and >= 0, got {}",
                self.mutation_sigma
            ));
        }
        Ok(())
    }
}

/// Total overshoot of `c` past `object + margin`, summed over the axes.
/// Zero exactly when no axis exceeds its target.
pub fn fitness(c: &Candidate, object: &ObjectDimensions, margin_cm: f64) -> f64 {
    c.axes()
        .iter()
        .zip(object.axes())
        .map(|(&v, o)| (v - (o + margin_cm)).max(0.0))
        .sum()
}

/// Result of one search.
///
/// `best` is the lowest-fitness candidate over the whole run, not only the
/// final population. The earliest one wins a tie.
#[derive(Debug, Clone)]
pub struct Optimization {
    pub best: OptimizedDimensions,
    pub best_fitness: f64,
    /// Best fitness so far: the initial population, then one entry per generation.
    pub trace: Vec<f64>,
    /// Best fitness within each population, laid out like `trace`.
    pub generation_best: Vec<f64>,
}

pub struct DimensionOptimizer {
    params: OptimizerParams,
}

impl DimensionOptimizer {
    pub fn new(params: OptimizerParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &OptimizerParams {
        &self.params
    }

    pub fn optimize(&self, object: &ObjectDimensions) -> Result<Optimization> {
        let mut rng = match self.params.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        self.optimize_with(object, &mut rng)
    }

    pub fn optimize_with<R: Rng + ?Sized>(
        &self,
        object: &ObjectDimensions,
        rng: &mut R,
    ) -> Result<Optimization> {
        let p = &self.params;
        let noise = Normal::new(0.0, p.mutation_sigma)
            .map_err(|e| eyre::Report::new(PackerError::Precondition(e.to_string())))?;
        let targets = object.axes().map(|o| o + p.margin_cm);

        let mut population: Vec<Candidate> = (0..p.population_size)
            .map(|_| Candidate::from_axes(targets.map(|t| t + rng.gen_range(0.0..INIT_SPREAD_CM))))
            .collect();

        let mut scored = score(&population, object, p.margin_cm);
        let (mut best, mut best_fitness) = scored[0];
        let mut trace = Vec::with_capacity(p.generations + 1);
        let mut generation_best = Vec::with_capacity(p.generations + 1);
        trace.push(best_fitness);
        generation_best.push(best_fitness);

        let pool_len = p.breeding_pool.min(p.population_size);
        for generation in 0..p.generations {
            let pool: Vec<Candidate> = scored.iter().take(pool_len).map(|&(c, _)| c).collect();
            population = (0..p.population_size)
                .map(|_| {
                    let parents = index::sample(rng, pool_len, 2);
                    let (a, b) = (pool[parents.index(0)].axes(), pool[parents.index(1)].axes());
                    let mut child = [0.0; 3];
                    for i in 0..3 {
                        child[i] = (a[i] + b[i]) / 2.0;
                        if rng.gen_bool(p.mutation_rate) {
                            child[i] = (child[i] + noise.sample(rng)).max(0.0);
                        }
                    }
                    Candidate::from_axes(child)
                })
                .collect();

            scored = score(&population, object, p.margin_cm);
            let (gen_best, gen_fitness) = scored[0];
            if gen_fitness < best_fitness {
                best = gen_best;
                best_fitness = gen_fitness;
            }
            trace!(generation, gen_fitness, best_fitness, "generation scored");
            trace.push(best_fitness);
            generation_best.push(gen_fitness);
        }

        debug!(
            length = best.length,
            width = best.width,
            height = best.height,
            best_fitness,
            "optimization finished"
        );
        Ok(Optimization {
            best: best.into(),
            best_fitness,
            trace,
            generation_best,
        })
    }
}

/// Population paired with fitness, stably sorted best first.
fn score(population: &[Candidate], object: &ObjectDimensions, margin: f64) -> Vec<(Candidate, f64)> {
    let mut scored: Vec<(Candidate, f64)> = population
        .iter()
        .map(|c| (*c, fitness(c, object, margin)))
        .collect();
    scored.sort_by(|a, b| a.1.total_cmp(&b.1));
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object() -> ObjectDimensions {
        ObjectDimensions::new(10.0, 8.0, 5.0).unwrap()
    }

    #[test]
    fn fitness_counts_only_overshoot() {
        let c = Candidate::from_axes([11.0, 8.0, 5.5]);
        assert!((fitness(&c, &object(), 0.5) - 0.5).abs() < 1e-12);
        let under = Candidate::from_axes([1.0, 1.0, 1.0]);
        assert_eq!(fitness(&under, &object(), 0.5), 0.0);
    }

    #[test]
    fn rejects_bad_params() {
        for params in [
            OptimizerParams {
                population_size: 1,
                ..Default::default()
            },
            OptimizerParams {
                generations: 0,
                ..Default::default()
            },
            OptimizerParams {
                mutation_rate: 1.5,
                ..Default::default()
            },
            OptimizerParams {
                margin_cm: f64::NAN,
                ..Default::default()
            },
            OptimizerParams {
                mutation_sigma: -0.1,
                ..Default::default()
            },
        ] {
            let err = DimensionOptimizer::new(params).err().unwrap();
            assert!(matches!(
                err.downcast_ref::<PackerError>(),
                Some(PackerError::Precondition(_))
            ));
        }
    }

    #[test]
    fn seeded_runs_repeat() {
        let params = OptimizerParams {
            seed: Some(7),
            ..Default::default()
        };
        let opt = DimensionOptimizer::new(params).unwrap();
        let a = opt.optimize(&object()).unwrap();
        let b = opt.optimize(&object()).unwrap();
        assert_eq!(a.best, b.best);
        assert_eq!(a.trace, b.trace);
        assert_eq!(a.trace.len(), 51);
        assert_eq!(a.generation_best.len(), 51);
    }
}
