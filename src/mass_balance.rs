//! Adjusting inlet flows so that outlet flows or compositions are met.
//!
//! Flows are given per chemical as vectors of equal length. Only the chemicals listed in the
//! balance's `index` take part in the linear equations.
use crate::error::{TeaError, TeaResult};
use itertools::Itertools;
use log::debug;
use nalgebra::{DMatrix, DVector};
use std::str::FromStr;
use strum::{EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

/// Tolerance on the sum of squared relative changes between composition iterations
const COMPOSITION_TOLERANCE: f64 = 1e-4;

/// Maximum number of iterations for the composition balance
const MAX_COMPOSITION_ITERS: usize = 200;

/// Singular values below this are treated as zero in least-squares solves
const SVD_EPSILON: f64 = 1e-12;

/// What a [`MassBalance`] is required to match
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum BalanceType {
    /// Match the outlet flow rates
    Flow,
    /// Match the outlet molar composition
    Composition,
}

impl BalanceType {
    /// Look up a balance type by name ("flow" or "composition")
    pub fn from_name(name: &str) -> TeaResult<Self> {
        Self::from_str(name).map_err(|_| {
            TeaError::InvalidArgument(format!(
                "balance type must be one of the following: {} (not '{name}')",
                Self::iter()
                    .map(|balance| format!("'{}'", <&str>::from(balance)))
                    .join(", ")
            ))
        })
    }
}

/// Scales variable inlet streams to satisfy a mass balance
#[derive(Debug, Clone, PartialEq)]
pub struct MassBalance {
    /// Chemicals used in the balance equations
    pub index: Vec<usize>,
    /// What to balance
    pub balance: BalanceType,
    /// Whether an exact solution is needed (otherwise least squares is used)
    pub is_exact: bool,
}

fn sum_flows(streams: &[DVector<f64>], len: usize) -> DVector<f64> {
    streams
        .iter()
        .fold(DVector::zeros(len), |total, stream| total + stream)
}

impl MassBalance {
    /// Create a mass balance on the given chemicals
    pub fn new(index: Vec<usize>, balance: BalanceType, is_exact: bool) -> Self {
        Self {
            index,
            balance,
            is_exact,
        }
    }

    /// Scale each variable inlet so the balance is satisfied.
    ///
    /// # Arguments
    ///
    /// * `variable_inlets` - Streams whose flows are scaled; updated in place
    /// * `constant_inlets` - Streams entering with fixed flows
    /// * `constant_outlets` - Streams leaving with fixed flows
    ///
    /// # Returns
    ///
    /// The factor applied to each variable inlet.
    pub fn run(
        &self,
        variable_inlets: &mut [DVector<f64>],
        constant_inlets: &[DVector<f64>],
        constant_outlets: &[DVector<f64>],
    ) -> TeaResult<DVector<f64>> {
        let n_chemicals = self.check_dimensions(variable_inlets, constant_inlets, constant_outlets)?;

        let a = DMatrix::from_fn(self.index.len(), variable_inlets.len(), |i, j| {
            variable_inlets[j][self.index[i]]
        });
        let outlet = sum_flows(constant_outlets, n_chemicals);
        let constant = sum_flows(constant_inlets, n_chemicals);

        let factors = match self.balance {
            BalanceType::Flow => {
                let b = self.select(&outlet) - self.select(&constant);
                self.solve(a, b)?
            }
            BalanceType::Composition => {
                self.solve_composition(&a, variable_inlets, &outlet, &constant)?
            }
        };

        for (stream, &factor) in variable_inlets.iter_mut().zip(factors.iter()) {
            *stream *= factor;
        }

        Ok(factors)
    }

    fn check_dimensions(
        &self,
        variable_inlets: &[DVector<f64>],
        constant_inlets: &[DVector<f64>],
        constant_outlets: &[DVector<f64>],
    ) -> TeaResult<usize> {
        let Some(first) = variable_inlets.first() else {
            return Err(TeaError::InvalidArgument(
                "mass balance needs at least one variable inlet".into(),
            ));
        };
        let n_chemicals = first.len();
        let mut all_streams = variable_inlets
            .iter()
            .chain(constant_inlets)
            .chain(constant_outlets);
        if let Some(stream) = all_streams.find(|s| s.len() != n_chemicals) {
            return Err(TeaError::InvalidArgument(format!(
                "all streams must have flows for {n_chemicals} chemicals (found {})",
                stream.len()
            )));
        }
        if let Some(&bad) = self.index.iter().find(|&&i| i >= n_chemicals) {
            return Err(TeaError::InvalidArgument(format!(
                "chemical index {bad} out of range for {n_chemicals} chemicals"
            )));
        }
        if self.is_exact && self.index.len() != variable_inlets.len() {
            return Err(TeaError::InvalidArgument(format!(
                "an exact balance needs as many chemicals as variable inlets ({} vs {})",
                self.index.len(),
                variable_inlets.len()
            )));
        }

        Ok(n_chemicals)
    }

    /// The flows of the balanced chemicals only
    fn select(&self, flows: &DVector<f64>) -> DVector<f64> {
        DVector::from_iterator(self.index.len(), self.index.iter().map(|&i| flows[i]))
    }

    fn solve(&self, a: DMatrix<f64>, b: DVector<f64>) -> TeaResult<DVector<f64>> {
        if self.is_exact {
            a.lu()
                .solve(&b)
                .ok_or_else(|| TeaError::numerical("mass balance equations are singular"))
        } else {
            a.svd(true, true)
                .solve(&b, SVD_EPSILON)
                .map_err(|err| TeaError::numerical(format!("least-squares solve failed: {err}")))
        }
    }

    fn solve_composition(
        &self,
        a: &DMatrix<f64>,
        variable_inlets: &[DVector<f64>],
        outlet: &DVector<f64>,
        constant: &DVector<f64>,
    ) -> TeaResult<DVector<f64>> {
        // Without any outlet flow there is no composition to normalise by
        let total_out = outlet.sum();
        let composition = if total_out == 0.0 {
            outlet.clone()
        } else {
            outlet / total_out
        };
        let f = self.select(&composition);
        let offset = &f * constant.sum() - self.select(constant);
        let variable_totals: Vec<f64> = variable_inlets.iter().map(|s| s.sum()).collect();

        let mut x_guess = DVector::from_element(variable_inlets.len(), 1.0);
        for iter in 1..=MAX_COMPOSITION_ITERS {
            let total_in: f64 = variable_totals
                .iter()
                .zip(x_guess.iter())
                .map(|(total, factor)| total * factor)
                .sum();
            let b = &f * total_in + &offset;
            let x_new = self.solve(a.clone(), b)?;

            if let Some(i) = x_new.iter().position(|&x| x == 0.0) {
                return Err(TeaError::numerical(format!(
                    "factor for variable inlet {i} is zero, so the composition balance \
                    cannot check convergence"
                )));
            }
            let change: f64 = x_new
                .iter()
                .zip(x_guess.iter())
                .map(|(new, old)| ((new - old) / new).powi(2))
                .sum();
            if change <= COMPOSITION_TOLERANCE {
                debug!("Composition balance converged after {iter} iterations");
                return Ok(x_new);
            }
            x_guess = x_new;
        }

        Err(TeaError::numerical(format!(
            "composition balance did not converge within {MAX_COMPOSITION_ITERS} iterations"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    fn flows(values: &[f64]) -> DVector<f64> {
        DVector::from_column_slice(values)
    }

    #[rstest]
    #[case("flow", BalanceType::Flow)]
    #[case("composition", BalanceType::Composition)]
    fn test_balance_type_from_name(#[case] name: &str, #[case] expected: BalanceType) {
        assert_eq!(BalanceType::from_name(name).unwrap(), expected);
    }

    #[test]
    fn test_balance_type_unknown() {
        assert_eq!(
            BalanceType::from_name("energy").unwrap_err(),
            TeaError::InvalidArgument(
                "balance type must be one of the following: 'flow', 'composition' (not 'energy')"
                    .into()
            )
        );
    }

    #[test]
    fn test_flow_balance() {
        // Water and ethanol feeds scaled to meet a 500/500 target, with a constant recycle
        let mut vary = vec![flows(&[40.0, 0.0]), flows(&[30.0, 190.0])];
        let constant = [flows(&[10.0, 10.0])];
        let outlet = [flows(&[500.0, 500.0])];
        let balance = MassBalance::new(vec![0, 1], BalanceType::Flow, true);

        let factors = balance.run(&mut vary, &constant, &outlet).unwrap();
        assert_eq!(factors.len(), 2);

        let total = &vary[0] + &vary[1] + &constant[0];
        assert_approx_eq!(f64, total[0], 500.0, epsilon = 1e-9);
        assert_approx_eq!(f64, total[1], 500.0, epsilon = 1e-9);
    }

    #[test]
    fn test_flow_balance_least_squares() {
        let mut vary = vec![flows(&[1.0, 1.0])];
        let outlet = [flows(&[2.0, 4.0])];
        let balance = MassBalance::new(vec![0, 1], BalanceType::Flow, false);

        let factors = balance.run(&mut vary, &[], &outlet).unwrap();
        assert_approx_eq!(f64, factors[0], 3.0, epsilon = 1e-9);
    }

    #[test]
    fn test_flow_balance_singular() {
        let mut vary = vec![flows(&[1.0, 1.0]), flows(&[2.0, 2.0])];
        let outlet = [flows(&[1.0, 3.0])];
        let balance = MassBalance::new(vec![0, 1], BalanceType::Flow, true);
        assert!(balance.run(&mut vary, &[], &outlet).unwrap_err().is_numerical());
    }

    #[test]
    fn test_composition_balance() {
        let mut vary = vec![flows(&[1.0, 0.0, 0.0]), flows(&[0.0, 1.0, 0.0])];
        let constant = [flows(&[0.0, 0.0, 2.0])];
        let outlet = [flows(&[2.0, 1.0, 1.0])];
        let balance = MassBalance::new(vec![0, 1], BalanceType::Composition, true);

        let factors = balance.run(&mut vary, &constant, &outlet).unwrap();
        assert_approx_eq!(f64, factors[0], 4.0, epsilon = 0.2);
        assert_approx_eq!(f64, factors[1], 2.0, epsilon = 0.1);
        assert_approx_eq!(f64, vary[0][0], factors[0]);
    }

    #[test]
    fn test_composition_balance_zero_factor() {
        let mut vary = vec![flows(&[1.0, 0.0, 0.0]), flows(&[0.0, 1.0, 0.0])];
        let outlet = [flows(&[0.0, 1.0, 1.0])];
        let balance = MassBalance::new(vec![0, 1], BalanceType::Composition, true);

        let err = balance.run(&mut vary, &[], &outlet).unwrap_err();
        assert!(err.is_numerical(), "{err}");
        // Streams are left untouched on failure
        assert_eq!(vary[0], flows(&[1.0, 0.0, 0.0]));
    }

    #[test]
    fn test_composition_balance_no_outflow() {
        // With no outlet flow, the raw (zero) flows are used as the target composition, so the
        // variable inlets must cancel out the constant ones
        let mut vary = vec![flows(&[1.0, 0.0]), flows(&[0.0, 1.0])];
        let constant = [flows(&[1.0, 1.0])];
        let outlet = [flows(&[0.0, 0.0])];
        let balance = MassBalance::new(vec![0, 1], BalanceType::Composition, true);

        let factors = balance.run(&mut vary, &constant, &outlet).unwrap();
        assert_approx_eq!(f64, factors[0], -1.0, epsilon = 1e-9);
        assert_approx_eq!(f64, factors[1], -1.0, epsilon = 1e-9);
    }

    #[rstest]
    #[case(vec![0, 5], true)]
    #[case(vec![0], true)]
    fn test_invalid_dimensions(#[case] index: Vec<usize>, #[case] is_exact: bool) {
        let mut vary = vec![flows(&[1.0, 0.0]), flows(&[0.0, 1.0])];
        let outlet = [flows(&[1.0, 1.0])];
        let balance = MassBalance::new(index, BalanceType::Flow, is_exact);
        assert!(matches!(
            balance.run(&mut vary, &[], &outlet),
            Err(TeaError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_mismatched_stream_lengths() {
        let mut vary = vec![flows(&[1.0, 0.0])];
        let outlet = [flows(&[1.0, 1.0, 1.0])];
        let balance = MassBalance::new(vec![0], BalanceType::Flow, true);
        assert!(matches!(
            balance.run(&mut vary, &[], &outlet),
            Err(TeaError::InvalidArgument(_))
        ));
    }
}
