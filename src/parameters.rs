//! Defines the `VentureParameters` struct, which holds the financial settings of a venture.
use crate::depreciation::DepreciationSchedule;
use crate::error::{TeaError, TeaResult};
use crate::input::deserialise_proportion;
use crate::units::{Dimensionless, HoursPerYear};
use log::warn;
use serde::de::{Deserialize, Deserializer};

/// Hours in an operating day
const HOURS_PER_DAY: f64 = 24.0;

/// Tolerance on the sum of the construction schedule fractions
const SCHEDULE_SUM_TOLERANCE: f64 = 1e-6;

/// Read a depreciation schedule by name
fn deserialise_depreciation<'de, D>(deserialiser: D) -> Result<DepreciationSchedule, D::Error>
where
    D: Deserializer<'de>,
{
    let name = String::deserialize(deserialiser)?;
    DepreciationSchedule::from_name(&name).map_err(serde::de::Error::custom)
}

/// Loan financing of part of the capital investment
#[derive(Debug, Clone, Copy, PartialEq, serde::Deserialize)]
pub struct Financing {
    /// Yearly interest on the loan (fraction)
    pub interest: Dimensionless,
    /// Number of years over which the loan is paid back
    pub years: u32,
    /// Fraction of capital spending which is financed
    #[serde(deserialize_with = "deserialise_proportion")]
    pub fraction: Dimensionless,
}

/// Financial parameters of a single venture.
///
/// Values read from file are checked by [`VentureParameters::validate`], which must also be called
/// after constructing or modifying the struct in code (a TEA does so on construction).
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct VentureParameters {
    /// Internal rate of return used as the discount rate (fraction)
    pub irr: Dimensionless,
    /// Start and end year of the venture, e.g. `(2018, 2038)`
    pub duration: (u32, u32),
    /// Depreciation schedule applied to total depreciable capital
    #[serde(deserialize_with = "deserialise_depreciation")]
    pub depreciation: DepreciationSchedule,
    /// Combined federal and state income tax rate (fraction)
    #[serde(deserialize_with = "deserialise_proportion")]
    pub income_tax: Dimensionless,
    /// Number of operating days per year
    pub operating_days: f64,
    /// Lang factor for getting fixed capital investment from total purchase cost.
    ///
    /// If absent, installation costs are used instead.
    #[serde(default)]
    pub lang_factor: Option<f64>,
    /// Fraction of fixed capital spent in each construction year
    pub construction_schedule: Vec<f64>,
    /// Startup time in months
    pub startup_months: f64,
    /// Fraction of fixed operating costs incurred during startup
    #[serde(deserialize_with = "deserialise_proportion")]
    pub startup_foc_frac: Dimensionless,
    /// Fraction of variable operating costs incurred during startup
    #[serde(deserialize_with = "deserialise_proportion")]
    pub startup_voc_frac: Dimensionless,
    /// Fraction of sales achieved during startup
    #[serde(deserialize_with = "deserialise_proportion")]
    pub startup_sales_frac: Dimensionless,
    /// Working capital as a fraction of fixed capital investment
    pub wc_over_fci: Dimensionless,
    /// Loan financing, if any
    #[serde(default)]
    pub financing: Option<Financing>,
}

fn check_fraction(name: &str, value: f64) -> TeaResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(TeaError::InvalidConfiguration(format!(
            "{name} must be between 0 and 1 (not {value})"
        )))
    }
}

fn check_duration(duration: (u32, u32)) -> TeaResult<()> {
    if duration.1 <= duration.0 {
        return Err(TeaError::InvalidConfiguration(format!(
            "duration must end after it starts (not {}-{})",
            duration.0, duration.1
        )));
    }

    Ok(())
}

fn check_construction_schedule(schedule: &[f64]) -> TeaResult<()> {
    if schedule.is_empty() {
        return Err(TeaError::InvalidConfiguration(
            "construction_schedule must cover at least one year".into(),
        ));
    }
    for &fraction in schedule {
        check_fraction("construction_schedule entries", fraction)?;
    }

    let total: f64 = schedule.iter().sum();
    if (total - 1.0).abs() > SCHEDULE_SUM_TOLERANCE {
        return Err(TeaError::InvalidConfiguration(format!(
            "construction_schedule must sum to 1 (not {total})"
        )));
    }

    Ok(())
}

fn check_startup_months(months: f64) -> TeaResult<()> {
    if !(0.0..=12.0).contains(&months) {
        return Err(TeaError::InvalidConfiguration(format!(
            "startup time must be less than a year (not {months} months)"
        )));
    }

    Ok(())
}

fn check_financing(financing: &Financing, operating_years: usize) -> TeaResult<()> {
    let interest = financing.interest.value();
    if !interest.is_finite() || interest < 0.0 {
        return Err(TeaError::InvalidConfiguration(format!(
            "financing interest must be a finite, non-negative number (not {interest})"
        )));
    }
    if financing.years == 0 {
        return Err(TeaError::InvalidConfiguration(
            "financing years cannot be zero".into(),
        ));
    }
    check_fraction("financing fraction", financing.fraction.value())?;

    if financing.years as usize > operating_years {
        warn!(
            "Loan term ({} years) is longer than the operating life ({operating_years} years); \
            payments after the final year are ignored",
            financing.years
        );
    }

    Ok(())
}

impl VentureParameters {
    /// Validate the parameters
    pub fn validate(&self) -> TeaResult<()> {
        let irr = self.irr.value();
        if !irr.is_finite() || irr <= -1.0 {
            return Err(TeaError::InvalidConfiguration(format!(
                "irr must be a finite number greater than -1 (not {irr})"
            )));
        }

        check_duration(self.duration)?;
        check_fraction("income_tax", self.income_tax.value())?;

        if !(self.operating_days > 0.0 && self.operating_days <= 366.0) {
            return Err(TeaError::InvalidConfiguration(format!(
                "operating_days must be between 0 and 366 (not {})",
                self.operating_days
            )));
        }

        if let Some(lang_factor) = self.lang_factor {
            if !(lang_factor.is_finite() && lang_factor > 0.0) {
                return Err(TeaError::InvalidConfiguration(format!(
                    "lang_factor must be a finite number greater than zero (not {lang_factor})"
                )));
            }
        }

        check_construction_schedule(&self.construction_schedule)?;
        check_startup_months(self.startup_months)?;
        check_fraction("startup_foc_frac", self.startup_foc_frac.value())?;
        check_fraction("startup_voc_frac", self.startup_voc_frac.value())?;
        check_fraction("startup_sales_frac", self.startup_sales_frac.value())?;

        let wc = self.wc_over_fci.value();
        if !wc.is_finite() || wc < 0.0 {
            return Err(TeaError::InvalidConfiguration(format!(
                "wc_over_fci must be a finite, non-negative number (not {wc})"
            )));
        }

        if let Some(financing) = &self.financing {
            check_financing(financing, self.operating_years())?;
        }

        Ok(())
    }

    /// Number of construction years before operation starts
    pub fn construction_years(&self) -> usize {
        self.construction_schedule.len()
    }

    /// Number of operating years
    pub fn operating_years(&self) -> usize {
        self.duration.1.saturating_sub(self.duration.0) as usize
    }

    /// Startup time as a fraction of a year
    pub fn startup_time(&self) -> f64 {
        self.startup_months / 12.0
    }

    /// Operating hours per year, used to annualise hourly costs
    pub fn annual_factor(&self) -> HoursPerYear {
        HoursPerYear(self.operating_days * HOURS_PER_DAY)
    }

    /// Weight applied to a full-rate amount in the first operating year, given the fraction of
    /// it incurred during startup
    pub fn startup_weight(&self, startup_frac: Dimensionless) -> f64 {
        let w0 = self.startup_time();
        w0 * startup_frac.value() + (1.0 - w0)
    }
}
