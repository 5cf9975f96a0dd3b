//! Techno-economic analysis of several ventures sharing one discount rate.
use crate::cashflow::{CashFlowRow, CashFlowTable};
use crate::error::{TeaError, TeaResult};
use crate::solver::{PRICE_FALLBACK_SEEDS, RATE_FALLBACK_SEEDS, SolverConfig, solve_with_fallback};
use crate::tea::{Tea, TeaSummary, check_has_flow, first_year_weight, price_direction};
use crate::units::{Dimensionless, Money, MoneyPerAmount, MoneyPerYear, Year};
use itertools::Itertools;
use log::debug;
use std::fmt;

/// A set of TEAs analysed as one venture
pub struct CombinedTea {
    teas: Vec<Tea>,
    irr: Dimensionless,
    irr_guess: f64,
    sales_guess: f64,
    solver: SolverConfig,
}

impl CombinedTea {
    /// Combine TEAs under a shared internal rate of return.
    ///
    /// Cash flows are summed year by year, so every member must have the same number of
    /// construction and operating years.
    pub fn new(teas: Vec<Tea>, irr: Dimensionless) -> TeaResult<Self> {
        let Some(first) = teas.first() else {
            return Err(TeaError::InvalidConfiguration(
                "a combined TEA needs at least one member".into(),
            ));
        };

        let expected = (
            first.parameters().construction_years(),
            first.parameters().operating_years(),
        );
        for tea in &teas[1..] {
            let years = (
                tea.parameters().construction_years(),
                tea.parameters().operating_years(),
            );
            if years != expected {
                return Err(TeaError::InvalidConfiguration(format!(
                    "TEA for '{}' has {} construction and {} operating years, but TEA for '{}' \
                    has {} and {}",
                    tea.system().id,
                    years.0,
                    years.1,
                    first.system().id,
                    expected.0,
                    expected.1
                )));
            }
        }

        Ok(Self {
            teas,
            irr,
            irr_guess: irr.value(),
            sales_guess: 0.0,
            solver: SolverConfig::default(),
        })
    }

    /// The member TEAs
    pub fn members(&self) -> &[Tea] {
        &self.teas
    }

    /// A member TEA, for changes to its system
    pub fn member_mut(&mut self, index: usize) -> TeaResult<&mut Tea> {
        let len = self.teas.len();
        self.teas
            .get_mut(index)
            .ok_or_else(|| unknown_member(index, len))
    }

    /// The shared internal rate of return, used as the discount rate
    pub fn irr(&self) -> Dimensionless {
        self.irr
    }

    fn sum<T: std::iter::Sum<T>>(&self, f: impl Fn(&Tea) -> T) -> T {
        self.teas.iter().map(f).sum()
    }

    /// Total utility cost
    pub fn utility_cost(&self) -> MoneyPerYear {
        self.sum(Tea::utility_cost)
    }

    /// Total purchase cost
    pub fn purchase_cost(&self) -> Money {
        self.sum(Tea::purchase_cost)
    }

    /// Total installation cost
    pub fn installation_cost(&self) -> Money {
        self.sum(Tea::installation_cost)
    }

    /// Direct permanent investment
    pub fn dpi(&self) -> Money {
        self.sum(Tea::dpi)
    }

    /// Total depreciable capital
    pub fn tdc(&self) -> Money {
        self.sum(Tea::tdc)
    }

    /// Fixed capital investment
    pub fn fci(&self) -> Money {
        self.sum(Tea::fci)
    }

    /// Total capital investment
    pub fn tci(&self) -> Money {
        self.sum(Tea::tci)
    }

    /// Fixed operating cost
    pub fn foc(&self) -> MoneyPerYear {
        self.sum(Tea::foc)
    }

    /// Variable operating cost
    pub fn voc(&self) -> MoneyPerYear {
        self.material_cost() + self.utility_cost()
    }

    /// Annual operating cost, excluding depreciation
    pub fn aoc(&self) -> MoneyPerYear {
        self.foc() + self.voc()
    }

    /// Working capital
    pub fn working_capital(&self) -> Money {
        self.sum(Tea::working_capital)
    }

    /// Cost of priced feed streams
    pub fn material_cost(&self) -> MoneyPerYear {
        self.sum(Tea::material_cost)
    }

    /// Sum of the members' even depreciation
    pub fn annual_depreciation(&self) -> MoneyPerYear {
        self.sum(Tea::annual_depreciation)
    }

    /// Revenue from priced product streams
    pub fn sales(&self) -> MoneyPerYear {
        self.sum(Tea::sales)
    }

    /// Net earnings after tax, without accounting for depreciation
    pub fn net_earnings(&self) -> MoneyPerYear {
        self.sum(Tea::net_earnings)
    }

    /// Sum of the members' returns on investment
    pub fn roi(&self) -> Dimensionless {
        self.sum(Tea::roi)
    }

    /// Payback period of the combined venture, without accounting for depreciation
    pub fn pbp(&self) -> Year {
        self.fci() / self.net_earnings()
    }

    fn member_cashflows(&self) -> TeaResult<Vec<CashFlowTable>> {
        self.teas.iter().map(Tea::cashflow).collect()
    }

    /// The members' cash flow tables summed year by year
    pub fn cashflow(&self) -> TeaResult<CashFlowTable> {
        let mut tables = self.member_cashflows()?.into_iter();
        let mut total = tables
            .next()
            .ok_or_else(|| TeaError::InvalidConfiguration("no member TEAs".into()))?;
        for table in tables {
            total.accumulate(&table)?;
        }

        Ok(total)
    }

    /// Combined cash flow rows, discounted at the shared IRR
    pub fn cashflow_table(&self) -> TeaResult<Vec<CashFlowRow>> {
        Ok(self.cashflow()?.rows(self.irr))
    }

    /// Net present value at the shared IRR
    pub fn npv(&self) -> TeaResult<Money> {
        Ok(self.cashflow()?.npv(self.irr))
    }

    /// Find the single IRR at which the members' NPVs sum to zero
    pub fn solve_irr(&mut self) -> TeaResult<Dimensionless> {
        let tables = self.member_cashflows()?;
        let irr = solve_with_fallback(
            |rate| {
                tables
                    .iter()
                    .map(|table| table.npv(Dimensionless(rate)))
                    .sum::<Money>()
                    .value()
            },
            self.irr_guess,
            RATE_FALLBACK_SEEDS,
            &self.solver,
        )?;
        debug!("Solved combined IRR of {irr:.6}");
        self.irr_guess = irr;

        Ok(Dimensionless(irr))
    }

    /// Find the price of a stream in one member at which the combined NPV is zero.
    ///
    /// The price change only affects the cash flow of the member at `member`; the other members'
    /// cash flows are held fixed.
    pub fn solve_price(&mut self, stream_id: &str, member: usize) -> TeaResult<MoneyPerAmount> {
        let owner = self
            .teas
            .get(member)
            .ok_or_else(|| unknown_member(member, self.teas.len()))?;
        let stream = owner.system().stream(stream_id)?.clone();
        let direction = price_direction(&stream)?;
        check_has_flow(&stream)?;

        let parameters = owner.parameters();
        let to_annual = parameters.annual_factor().value() * (1.0 - parameters.income_tax.value());
        let weight = first_year_weight(parameters, &stream);

        let mut tables = self.member_cashflows()?;
        let owner_table = tables.remove(member);
        let irr = self.irr;
        let others: Money = tables.iter().map(|table| table.npv(irr)).sum();

        // Solve for the extra sales value per hour of the owning member
        let sales = solve_with_fallback(
            |sales| {
                let extra = Money(sales * to_annual);
                (others + owner_table.npv_with_sales(extra, weight, irr)).value()
            },
            self.sales_guess,
            PRICE_FALLBACK_SEEDS,
            &self.solver,
        )?;
        self.sales_guess = sales;

        let price = stream.price + MoneyPerAmount(direction * sales / stream.flow.value());
        debug!(
            "Solved combined price of {} for stream '{stream_id}' of member {member}",
            price.value()
        );

        Ok(price)
    }

    /// NPV, ROI and payback period
    pub fn summary(&self) -> TeaResult<TeaSummary> {
        Ok(TeaSummary {
            name: self.names(),
            npv: self.npv()?,
            irr: self.irr,
            roi: self.roi(),
            pbp: self.pbp(),
        })
    }

    fn names(&self) -> String {
        self.teas.iter().map(|tea| &tea.system().id).join(", ")
    }
}

fn unknown_member(index: usize, len: usize) -> TeaError {
    TeaError::InvalidArgument(format!(
        "no member TEA at index {index} (combined TEA has {len} members)"
    ))
}

impl fmt::Debug for CombinedTea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<CombinedTea: {}>", self.names())
    }
}
