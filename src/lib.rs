//! Techno-economic analysis (TEA) of chemical and bioprocess plants.
//!
//! A [`tea::Tea`] combines a [`system::System`] of costed units and priced streams with
//! [`parameters::VentureParameters`] and [`accounting::CostAccounting`] rules to build a
//! discounted cash flow analysis. Several TEAs can be analysed as one investment with
//! [`combined::CombinedTea`].
#![warn(missing_docs)]
pub mod accounting;
pub mod cashflow;
pub mod cli;
pub mod combined;
pub mod depreciation;
pub mod error;
pub mod id;
pub mod input;
pub mod log;
pub mod mass_balance;
pub mod parameters;
pub mod settings;
pub mod solver;
pub mod system;
pub mod tea;
pub mod units;
pub mod venture;

#[cfg(test)]
mod fixture;
