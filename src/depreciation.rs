//! Registry of standard depreciation schedules.
use crate::error::{TeaError, TeaResult};
use itertools::Itertools;
use std::str::FromStr;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

const MACRS5: [f64; 6] = [0.2000, 0.3200, 0.1920, 0.1152, 0.1152, 0.0576];

const MACRS7: [f64; 8] = [
    0.1429, 0.2449, 0.1749, 0.1249, 0.0893, 0.0892, 0.0893, 0.0446,
];

const MACRS10: [f64; 11] = [
    0.1000, 0.1800, 0.1440, 0.1152, 0.0922, 0.0737, 0.0655, 0.0655, 0.0656, 0.0655, 0.0328,
];

const MACRS15: [f64; 16] = [
    0.0500, 0.0950, 0.0855, 0.0770, 0.0693, 0.0623, 0.0590, 0.0590, 0.0591, 0.0590, 0.0591,
    0.0590, 0.0591, 0.0590, 0.0591, 0.0295,
];

const MACRS20: [f64; 21] = [
    0.03750, 0.07219, 0.06677, 0.06177, 0.05713, 0.05285, 0.04888, 0.04522, 0.04462, 0.04461,
    0.04462, 0.04461, 0.04462, 0.04461, 0.04462, 0.04461, 0.04462, 0.04461, 0.04462, 0.04461,
    0.02231,
];

/// A depreciation schedule (Modified Accelerated Cost Recovery System).
///
/// Each schedule gives the fraction of total depreciable capital written off in each year after
/// the start of operation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumString, IntoStaticStr, Display,
)]
pub enum DepreciationSchedule {
    /// 5-year recovery period
    #[strum(serialize = "MACRS5")]
    Macrs5,
    /// 7-year recovery period
    #[strum(serialize = "MACRS7")]
    Macrs7,
    /// 10-year recovery period
    #[strum(serialize = "MACRS10")]
    Macrs10,
    /// 15-year recovery period
    #[strum(serialize = "MACRS15")]
    Macrs15,
    /// 20-year recovery period
    #[strum(serialize = "MACRS20")]
    Macrs20,
}

impl DepreciationSchedule {
    /// Look up a schedule by name (e.g. "MACRS7").
    pub fn from_name(name: &str) -> TeaResult<Self> {
        Self::from_str(name).map_err(|_| {
            TeaError::InvalidConfiguration(format!(
                "depreciation must be one of {} (not '{name}')",
                Self::iter().map(|s| format!("'{s}'")).join(", ")
            ))
        })
    }

    /// The name of the schedule
    pub fn name(self) -> &'static str {
        self.into()
    }

    /// Annual depreciation fractions, starting from the first year of operation
    pub fn fractions(self) -> &'static [f64] {
        match self {
            Self::Macrs5 => &MACRS5,
            Self::Macrs7 => &MACRS7,
            Self::Macrs10 => &MACRS10,
            Self::Macrs15 => &MACRS15,
            Self::Macrs20 => &MACRS20,
        }
    }

    /// Number of years over which capital is depreciated
    pub fn years(self) -> usize {
        self.fractions().len()
    }
}
