//! Scalar root-finding and fixed-point solvers used to invert cash flow totals.
//!
//! Three solvers are provided:
//!
//! * [`secant`]: the classic two-point secant method. Running out of iterations is not an error;
//!   the best estimate is returned with [`Status::MaxIters`] and the caller decides what to do.
//! * [`aitken_secant`]: secant steps with Aitken delta-squared acceleration. This is the primary
//!   solver for break-even calculations and fails with [`TeaError::NumericalFailure`] on a
//!   singular step or when its iteration budget runs out.
//! * [`wegstein`]: a fixed-point iteration damped with Wegstein's method, used to close the loan
//!   amortisation equation.
//!
//! [`solve_with_fallback`] chains the first two: accelerated secant from a warm start and, only
//! if that fails numerically, plain secant from fixed seeds.
use crate::error::{TeaError, TeaResult};
use log::{debug, warn};

/// Offset between the warm-start guess and the second point handed to the accelerated solver
pub const WARM_START_OFFSET: f64 = 1e-6;

/// Fallback seeds for solving rates (e.g. the IRR)
pub const RATE_FALLBACK_SEEDS: [f64; 2] = [0.15, 0.15001];

/// Fallback seeds for solving prices or sales
pub const PRICE_FALLBACK_SEEDS: [f64; 2] = [0.0, 1e-6];

/// Tolerances and iteration limit for the solvers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverConfig {
    /// Absolute tolerance on the change in `x` between iterations
    pub xtol: f64,
    /// Absolute tolerance on the residual `f(x)`
    pub ytol: f64,
    /// Maximum number of iterations
    pub max_iters: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            xtol: 1e-6,
            ytol: 5e-8,
            max_iters: 200,
        }
    }
}

/// How a solver run finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// A tolerance was met
    Converged,
    /// The iteration limit was reached first
    MaxIters,
}

/// The result of a [`secant`] run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Solution {
    /// The final estimate of the root
    pub x: f64,
    /// Whether the estimate met a tolerance
    pub status: Status,
    /// Number of iterations performed
    pub iters: usize,
}

/// Evaluate `f`, rejecting non-finite residuals
fn evaluate<F: FnMut(f64) -> f64>(f: &mut F, x: f64) -> TeaResult<f64> {
    let y = f(x);
    if y.is_finite() {
        Ok(y)
    } else {
        Err(TeaError::numerical(format!(
            "non-finite residual {y} at x = {x}"
        )))
    }
}

/// A single secant update through `(x0, y0)` and `(x1, y1)`
fn secant_step(x0: f64, y0: f64, x1: f64, y1: f64) -> TeaResult<f64> {
    let dy = y1 - y0;
    if dy == 0.0 {
        return Err(TeaError::numerical(format!(
            "zero secant slope between x = {x0} and x = {x1}"
        )));
    }

    let x2 = x1 - y1 * (x1 - x0) / dy;
    if x2.is_finite() {
        Ok(x2)
    } else {
        Err(TeaError::numerical(format!(
            "secant step from x = {x1} is not finite"
        )))
    }
}

/// Find a root of `f` with the secant method, starting from `x0` and `x1`.
///
/// Exhausting the iteration budget is reported through [`Solution::status`], not as an error.
pub fn secant<F: FnMut(f64) -> f64>(
    mut f: F,
    x0: f64,
    x1: f64,
    config: &SolverConfig,
) -> TeaResult<Solution> {
    let (mut x0, mut x1) = (x0, x1);
    let mut y0 = evaluate(&mut f, x0)?;
    if y0.abs() <= config.ytol {
        return Ok(Solution {
            x: x0,
            status: Status::Converged,
            iters: 0,
        });
    }

    for iter in 1..=config.max_iters {
        let y1 = evaluate(&mut f, x1)?;
        if y1.abs() <= config.ytol {
            return Ok(Solution {
                x: x1,
                status: Status::Converged,
                iters: iter,
            });
        }

        let x2 = secant_step(x0, y0, x1, y1)?;
        (x0, y0, x1) = (x1, y1, x2);
        if (x1 - x0).abs() < config.xtol {
            return Ok(Solution {
                x: x1,
                status: Status::Converged,
                iters: iter,
            });
        }
    }

    Ok(Solution {
        x: x1,
        status: Status::MaxIters,
        iters: config.max_iters,
    })
}

/// Find a root of `f` with secant steps accelerated by Aitken's delta-squared process.
///
/// Each iteration takes two secant steps and extrapolates the three resulting iterates. Fails if a
/// secant step is singular, a residual is not finite or the iteration budget is exhausted.
pub fn aitken_secant<F: FnMut(f64) -> f64>(
    mut f: F,
    x0: f64,
    x1: f64,
    config: &SolverConfig,
) -> TeaResult<f64> {
    let (mut x0, mut x1) = (x0, x1);
    let mut y0 = evaluate(&mut f, x0)?;
    if y0.abs() <= config.ytol {
        return Ok(x0);
    }
    let mut y1 = evaluate(&mut f, x1)?;

    for _ in 0..config.max_iters {
        if y1.abs() <= config.ytol {
            return Ok(x1);
        }

        let x2 = secant_step(x0, y0, x1, y1)?;
        let y2 = evaluate(&mut f, x2)?;
        if y2.abs() <= config.ytol || (x2 - x1).abs() < config.xtol {
            return Ok(x2);
        }

        let x3 = secant_step(x1, y1, x2, y2)?;
        let denom = x3 - 2.0 * x2 + x1;
        let accelerated = x3 - (x3 - x2).powi(2) / denom;
        let x_next = if denom != 0.0 && accelerated.is_finite() {
            accelerated
        } else {
            x3
        };
        let y_next = evaluate(&mut f, x_next)?;
        if (x_next - x2).abs() < config.xtol {
            return Ok(x_next);
        }

        (x0, y0, x1, y1) = (x2, y2, x_next, y_next);
    }

    Err(TeaError::numerical(format!(
        "accelerated secant did not converge within {} iterations",
        config.max_iters
    )))
}

/// Find a fixed point `x = g(x)` by damped iteration, starting from `x0`.
///
/// The damping factor is updated every step from the secant slope of `g` (Wegstein's method),
/// which closes a linear fixed-point problem in a single step.
pub fn wegstein<G: FnMut(f64) -> f64>(mut g: G, x0: f64, config: &SolverConfig) -> TeaResult<f64> {
    let mut x0 = x0;
    let mut g0 = evaluate(&mut g, x0)?;
    let mut x1 = g0;

    for _ in 0..config.max_iters {
        let g1 = evaluate(&mut g, x1)?;
        if (g1 - x1).abs() < config.xtol {
            return Ok(g1);
        }

        let dx = x1 - x0;
        if dx == 0.0 {
            return Ok(x1);
        }
        let slope = (g1 - g0) / dx;
        if (slope - 1.0).abs() < f64::EPSILON {
            return Err(TeaError::numerical(format!(
                "fixed-point slope of unity at x = {x1}"
            )));
        }
        let q = slope / (slope - 1.0);
        (x0, g0, x1) = (x1, g1, q * x1 + (1.0 - q) * g1);
    }

    Err(TeaError::numerical(format!(
        "fixed-point iteration did not converge within {} iterations",
        config.max_iters
    )))
}

/// Solve `f(x) = 0`, trying the accelerated secant method from a warm start first.
///
/// The accelerated solver starts from `guess` and `guess + WARM_START_OFFSET`. If it fails
/// numerically, plain secant is run from `fallback_seeds`; a fallback estimate which runs out of
/// iterations is still returned (with a warning). Only a numerical failure of the fallback itself
/// is propagated.
pub fn solve_with_fallback<F: FnMut(f64) -> f64>(
    mut f: F,
    guess: f64,
    fallback_seeds: [f64; 2],
    config: &SolverConfig,
) -> TeaResult<f64> {
    match aitken_secant(&mut f, guess, guess + WARM_START_OFFSET, config) {
        Ok(x) => Ok(x),
        Err(err) if err.is_numerical() => {
            debug!(
                "Accelerated secant from {guess} failed ({err}); retrying secant from {} and {}",
                fallback_seeds[0], fallback_seeds[1]
            );
            let solution = secant(&mut f, fallback_seeds[0], fallback_seeds[1], config)?;
            if solution.status == Status::MaxIters {
                warn!(
                    "Secant did not converge within {} iterations; using best estimate {}",
                    solution.iters, solution.x
                );
            }
            Ok(solution.x)
        }
        Err(err) => Err(err),
    }
}
