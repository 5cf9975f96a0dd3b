//! Cost-accounting rules linking capital and fixed operating costs.
//!
//! A venture's accounting policy is given as three rules:
//!
//! * direct permanent investment (DPI) to total depreciable capital (TDC)
//! * TDC to fixed capital investment (FCI)
//! * FCI to fixed operating cost (FOC)
//!
//! Rules are collected with [`CostAccounting`] and checked with [`CostAccounting::complete`]
//! before a TEA can be built.
use crate::error::{TeaError, TeaResult};
use crate::units::{Dimensionless, Money, MoneyPerYear, Year};
use serde::Deserialize;
use std::fmt;
use std::rc::Rc;

/// Rule mapping one capital total onto another
pub type CapitalRule = Rc<dyn Fn(Money) -> Money>;

/// Rule mapping fixed capital investment onto a yearly cost
pub type OperatingRule = Rc<dyn Fn(Money) -> MoneyPerYear>;

/// Ratios for a simple factored accounting policy
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct CostFactors {
    /// Total depreciable capital per unit of direct permanent investment
    pub tdc_over_dpi: Dimensionless,
    /// Fixed capital investment per unit of total depreciable capital
    pub fci_over_tdc: Dimensionless,
    /// Fixed operating cost per year per unit of fixed capital investment
    pub foc_over_fci: Dimensionless,
}

/// A possibly incomplete set of cost-accounting rules
#[derive(Clone, Default)]
pub struct CostAccounting {
    tdc: Option<CapitalRule>,
    fci: Option<CapitalRule>,
    foc: Option<OperatingRule>,
}

/// A complete set of cost-accounting rules
#[derive(Clone)]
pub struct CostHooks {
    tdc: CapitalRule,
    fci: CapitalRule,
    foc: OperatingRule,
}

impl CostAccounting {
    /// Create an empty set of rules
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the rule for total depreciable capital given direct permanent investment
    pub fn with_tdc(mut self, rule: impl Fn(Money) -> Money + 'static) -> Self {
        self.tdc = Some(Rc::new(rule));
        self
    }

    /// Set the rule for fixed capital investment given total depreciable capital
    pub fn with_fci(mut self, rule: impl Fn(Money) -> Money + 'static) -> Self {
        self.fci = Some(Rc::new(rule));
        self
    }

    /// Set the rule for fixed operating cost given fixed capital investment
    pub fn with_foc(mut self, rule: impl Fn(Money) -> MoneyPerYear + 'static) -> Self {
        self.foc = Some(Rc::new(rule));
        self
    }

    /// Rules which scale each quantity by a constant factor
    pub fn from_factors(factors: CostFactors) -> Self {
        Self::new()
            .with_tdc(move |dpi| dpi * factors.tdc_over_dpi)
            .with_fci(move |tdc| tdc * factors.fci_over_tdc)
            .with_foc(move |fci| fci * factors.foc_over_fci / Year(1.0))
    }

    /// Check that all three rules are present
    pub fn complete(self) -> TeaResult<CostHooks> {
        match (self.tdc, self.fci, self.foc) {
            (Some(tdc), Some(fci), Some(foc)) => Ok(CostHooks { tdc, fci, foc }),
            (tdc, fci, foc) => {
                let missing: Vec<&str> = [
                    (tdc.is_none(), "TDC"),
                    (fci.is_none(), "FCI"),
                    (foc.is_none(), "FOC"),
                ]
                .into_iter()
                .filter_map(|(is_missing, name)| is_missing.then_some(name))
                .collect();
                Err(TeaError::InvalidConfiguration(format!(
                    "missing cost-accounting rules for {}",
                    missing.join(", ")
                )))
            }
        }
    }
}

impl CostHooks {
    /// Total depreciable capital given direct permanent investment
    pub fn tdc(&self, dpi: Money) -> Money {
        (self.tdc)(dpi)
    }

    /// Fixed capital investment given total depreciable capital
    pub fn fci(&self, tdc: Money) -> Money {
        (self.fci)(tdc)
    }

    /// Fixed operating cost given fixed capital investment
    pub fn foc(&self, fci: Money) -> MoneyPerYear {
        (self.foc)(fci)
    }
}

impl fmt::Debug for CostHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CostHooks { .. }")
    }
}
