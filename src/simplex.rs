//! Nelder-Mead downhill simplex minimizer.
//!
//! A derivative-free direct search for scalar objectives. Every trial point
//! goes through an optional [`ParameterValidator`] before it is evaluated,
//! which is how the bounded fitter keeps the simplex inside its box.

use crate::error::{Result, SaimError};
use ndarray::Array1;
use std::cmp::Ordering;

/// Reflection coefficient.
const ALPHA: f64 = 1.0;
/// Expansion coefficient.
const GAMMA: f64 = 2.0;
/// Contraction coefficient.
const RHO: f64 = 0.5;
/// Shrink coefficient.
const SIGMA: f64 = 0.5;

/// A scalar function to minimize.
pub trait Objective {
    /// Evaluate the objective at `params`.
    fn value(&self, params: &Array1<f64>) -> Result<f64>;
}

impl<F> Objective for F
where
    F: Fn(&Array1<f64>) -> Result<f64>,
{
    fn value(&self, params: &Array1<f64>) -> Result<f64> {
        self(params)
    }
}

/// Maps a trial point onto the admissible region before evaluation.
pub trait ParameterValidator {
    fn validate(&self, params: &Array1<f64>) -> Array1<f64>;
}

/// Outcome of a simplex minimization.
#[derive(Debug, Clone)]
pub struct SimplexResult {
    /// Best vertex found
    pub params: Array1<f64>,

    /// Objective value at `params`
    pub value: f64,

    /// Total objective evaluations, restarts included
    pub evaluations: usize,
}

/// Nelder-Mead simplex optimizer.
#[derive(Debug, Clone)]
pub struct NelderMead {
    /// Evaluation budget across all restarts. Default: 20000
    pub max_evaluations: usize,

    /// Relative tolerance on the spread of objective values. Default: 1e-10
    pub ftol: f64,

    /// Absolute tolerance on the spread of objective values. Default: 1e-12
    pub ftol_abs: f64,

    /// Relative tolerance on the simplex diameter. Default: 1e-8
    pub xtol: f64,

    /// Number of times the simplex is rebuilt around the best vertex after convergence. Default: 1
    pub restarts: usize,

    /// Minimum edge length of the initial simplex. Default: 10
    pub min_step: f64,

    /// Initial edge length relative to the start value. Default: 0.1
    pub relative_step: f64,
}

impl Default for NelderMead {
    fn default() -> Self {
        Self {
            max_evaluations: 20_000,
            ftol: 1e-10,
            ftol_abs: 1e-12,
            xtol: 1e-8,
            restarts: 1,
            min_step: 10.0,
            relative_step: 0.1,
        }
    }
}

#[derive(Debug, Clone)]
struct Vertex {
    point: Array1<f64>,
    value: f64,
}

struct Evaluator<'a, O: ?Sized> {
    objective: &'a O,
    validator: Option<&'a dyn ParameterValidator>,
    evaluations: usize,
    max_evaluations: usize,
}

impl<O: Objective + ?Sized> Evaluator<'_, O> {
    fn vertex(&mut self, point: Array1<f64>) -> Result<Vertex> {
        if self.evaluations >= self.max_evaluations {
            return Err(SaimError::IterationLimitExceeded {
                iterations: self.evaluations,
            });
        }
        let point = match self.validator {
            Some(validator) => validator.validate(&point),
            None => point,
        };
        let value = self.objective.value(&point)?;
        self.evaluations += 1;
        // Non-finite values rank last
        let value = if value.is_nan() { f64::INFINITY } else { value };
        Ok(Vertex { point, value })
    }
}

fn by_value(a: &Vertex, b: &Vertex) -> Ordering {
    a.value.total_cmp(&b.value)
}

impl NelderMead {
    /// Create a new optimizer with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the evaluation budget.
    pub fn with_max_evaluations(mut self, max_evaluations: usize) -> Self {
        self.max_evaluations = max_evaluations;
        self
    }

    /// Set the number of restarts.
    pub fn with_restarts(mut self, restarts: usize) -> Self {
        self.restarts = restarts;
        self
    }

    /// Minimize `objective` starting from `initial`.
    ///
    /// # Arguments
    ///
    /// * `objective` - The function to minimize
    /// * `initial` - Starting point; also the first simplex vertex
    /// * `validator` - Optional projection applied to every trial point
    ///
    /// # Returns
    ///
    /// * The best vertex, or [`SaimError::IterationLimitExceeded`] when the
    ///   evaluation budget runs out before convergence
    pub fn minimize<O: Objective + ?Sized>(
        &self,
        objective: &O,
        initial: Array1<f64>,
        validator: Option<&dyn ParameterValidator>,
    ) -> Result<SimplexResult> {
        if initial.is_empty() {
            return Err(SaimError::InvalidInput(
                "Simplex needs at least one parameter".to_string(),
            ));
        }

        let mut evaluator = Evaluator {
            objective,
            validator,
            evaluations: 0,
            max_evaluations: self.max_evaluations,
        };

        let mut best = self.run(&mut evaluator, initial)?;
        for _ in 0..self.restarts {
            best = self.run(&mut evaluator, best.point)?;
        }

        Ok(SimplexResult {
            params: best.point,
            value: best.value,
            evaluations: evaluator.evaluations,
        })
    }

    fn initial_simplex<O: Objective + ?Sized>(
        &self,
        evaluator: &mut Evaluator<'_, O>,
        start: Array1<f64>,
    ) -> Result<Vec<Vertex>> {
        let origin = evaluator.vertex(start)?;
        let n = origin.point.len();
        let mut simplex = Vec::with_capacity(n + 1);
        simplex.push(origin.clone());

        for i in 0..n {
            let start = origin.point[i];
            let step = (self.relative_step * start.abs()).max(self.min_step);
            let mut point = origin.point.clone();
            point[i] = start + step;
            // Step inwards when the upward edge would be clamped flat
            if let Some(validator) = evaluator.validator {
                if validator.validate(&point)[i] == start {
                    point[i] = start - step;
                }
            }
            simplex.push(evaluator.vertex(point)?);
        }
        Ok(simplex)
    }

    /// Done when the objective is flat across the simplex or the simplex has collapsed.
    fn converged(&self, simplex: &[Vertex]) -> bool {
        let best = &simplex[0];
        let worst = &simplex[simplex.len() - 1];

        let spread = (worst.value - best.value).abs();
        if spread <= self.ftol * best.value.abs() + self.ftol_abs {
            return true;
        }

        simplex[1..].iter().all(|vertex| {
            vertex
                .point
                .iter()
                .zip(best.point.iter())
                .all(|(a, b)| (a - b).abs() <= self.xtol * b.abs().max(1.0))
        })
    }

    fn run<O: Objective + ?Sized>(
        &self,
        evaluator: &mut Evaluator<'_, O>,
        start: Array1<f64>,
    ) -> Result<Vertex> {
        let mut simplex = self.initial_simplex(evaluator, start)?;
        let n = simplex.len() - 1;

        loop {
            simplex.sort_by(by_value);
            if self.converged(&simplex) {
                return Ok(simplex.swap_remove(0));
            }

            let worst = simplex[n].clone();
            let mut centroid = Array1::<f64>::zeros(worst.point.len());
            for vertex in &simplex[..n] {
                centroid += &vertex.point;
            }
            centroid /= n as f64;

            let reflected =
                evaluator.vertex(&centroid + &((&centroid - &worst.point) * ALPHA))?;

            if reflected.value < simplex[0].value {
                let expanded =
                    evaluator.vertex(&centroid + &((&reflected.point - &centroid) * GAMMA))?;
                simplex[n] = if expanded.value < reflected.value {
                    expanded
                } else {
                    reflected
                };
                continue;
            }

            if reflected.value < simplex[n - 1].value {
                simplex[n] = reflected;
                continue;
            }

            let contracted = if reflected.value < worst.value {
                let outside =
                    evaluator.vertex(&centroid + &((&reflected.point - &centroid) * RHO))?;
                (outside.value <= reflected.value).then_some(outside)
            } else {
                let inside = evaluator.vertex(&centroid + &((&worst.point - &centroid) * RHO))?;
                (inside.value < worst.value).then_some(inside)
            };

            match contracted {
                Some(vertex) => simplex[n] = vertex,
                None => {
                    let best = simplex[0].point.clone();
                    for vertex in simplex.iter_mut().skip(1) {
                        let point = &best + &((&vertex.point - &best) * SIGMA);
                        *vertex = evaluator.vertex(point)?;
                    }
                }
            }
        }
    }
}
