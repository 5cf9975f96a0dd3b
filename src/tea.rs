//! Techno-economic analysis of a single venture.
//!
//! All aggregate quantities are recomputed from the current state of the system on every call;
//! nothing is cached, so results always reflect the latest stream flows and unit costs.
use crate::accounting::{CostAccounting, CostHooks};
use crate::cashflow::{CashFlowInputs, CashFlowRow, CashFlowTable};
use crate::error::{TeaError, TeaResult};
use crate::parameters::VentureParameters;
use crate::solver::{PRICE_FALLBACK_SEEDS, RATE_FALLBACK_SEEDS, SolverConfig, solve_with_fallback};
use crate::system::{Stream, StreamRole, System};
use crate::units::{Dimensionless, Money, MoneyPerAmount, MoneyPerHour, MoneyPerYear, Year};
use log::debug;
use std::fmt;

/// Headline results of an analysis
#[derive(Debug, Clone, PartialEq)]
pub struct TeaSummary {
    /// Name of the analysed system(s)
    pub name: String,
    /// Net present value at the venture's IRR
    pub npv: Money,
    /// The venture's IRR
    pub irr: Dimensionless,
    /// Return on investment per year
    pub roi: Dimensionless,
    /// Payback period
    pub pbp: Year,
}

impl fmt::Display for TeaSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.name)?;
        writeln!(
            f,
            " NPV: {:.3e} USD at {:.1}% IRR",
            self.npv.value(),
            self.irr.value() * 100.0
        )?;
        writeln!(f, " ROI: {:.3} 1/yr", self.roi.value())?;
        write!(f, " PBP: {:.3} yr", self.pbp.value())
    }
}

/// Sign applied to a solved price adjustment, based on the stream's role
pub(crate) fn price_direction(stream: &Stream) -> TeaResult<f64> {
    match stream.role {
        StreamRole::Feed => Ok(-1.0),
        StreamRole::Product => Ok(1.0),
        StreamRole::Internal => Err(TeaError::InvalidArgument(format!(
            "stream must be either a feed or a product (not '{}')",
            stream.id
        ))),
    }
}

/// Share of a yearly price change felt in the first operating year.
///
/// Feeds are blended like variable operating cost during startup, products like sales.
pub(crate) fn first_year_weight(parameters: &VentureParameters, stream: &Stream) -> Dimensionless {
    let startup_frac = match stream.role {
        StreamRole::Feed => parameters.startup_voc_frac,
        StreamRole::Product | StreamRole::Internal => parameters.startup_sales_frac,
    };
    Dimensionless(parameters.startup_weight(startup_frac))
}

/// Check that a stream has a flow to put a price on
pub(crate) fn check_has_flow(stream: &Stream) -> TeaResult<()> {
    if stream.flow.value() == 0.0 {
        return Err(TeaError::InvalidArgument(format!(
            "stream '{}' has no flow, so its price cannot be solved",
            stream.id
        )));
    }

    Ok(())
}

/// A techno-economic analysis of one system
pub struct Tea {
    parameters: VentureParameters,
    system: System,
    hooks: CostHooks,
    irr_guess: f64,
    sales_guess: f64,
    solver: SolverConfig,
}

impl Tea {
    /// Create a TEA for a system.
    ///
    /// # Arguments
    ///
    /// * `system` - The system to analyse
    /// * `parameters` - Financial parameters of the venture
    /// * `accounting` - Cost-accounting rules; all three must be present
    pub fn new(
        system: System,
        parameters: VentureParameters,
        accounting: CostAccounting,
    ) -> TeaResult<Self> {
        parameters.validate()?;
        let hooks = accounting.complete()?;
        let irr_guess = parameters.irr.value();

        Ok(Self {
            parameters,
            system,
            hooks,
            irr_guess,
            sales_guess: 0.0,
            solver: SolverConfig::default(),
        })
    }

    /// Create a TEA for `system` with the same settings as `other`
    pub fn like(system: System, other: &Tea) -> Self {
        Self {
            parameters: other.parameters.clone(),
            system,
            hooks: other.hooks.clone(),
            irr_guess: other.irr_guess,
            sales_guess: other.sales_guess,
            solver: other.solver,
        }
    }

    /// The venture parameters
    pub fn parameters(&self) -> &VentureParameters {
        &self.parameters
    }

    /// Replace the venture parameters, checking them first
    pub fn set_parameters(&mut self, parameters: VentureParameters) -> TeaResult<()> {
        parameters.validate()?;
        self.parameters = parameters;

        Ok(())
    }

    /// The analysed system
    pub fn system(&self) -> &System {
        &self.system
    }

    /// The analysed system, for re-simulation or changes to streams
    pub fn system_mut(&mut self) -> &mut System {
        &mut self.system
    }

    /// The venture's target IRR, used as the discount rate
    pub fn irr(&self) -> Dimensionless {
        self.parameters.irr
    }

    /// Sum an hourly rate over a year of operation
    fn annualise(&self, rate: MoneyPerHour) -> MoneyPerYear {
        rate * self.parameters.annual_factor()
    }

    /// Total utility cost
    pub fn utility_cost(&self) -> MoneyPerYear {
        let hourly = self.system.units().iter().map(|u| u.utility_cost()).sum();
        self.annualise(hourly)
    }

    /// Total purchase cost
    pub fn purchase_cost(&self) -> Money {
        self.system.units().iter().map(|u| u.purchase_cost()).sum()
    }

    /// Total installation cost
    pub fn installation_cost(&self) -> Money {
        self.system.units().iter().map(|u| u.installation_cost()).sum()
    }

    /// Direct permanent investment
    pub fn dpi(&self) -> Money {
        match self.parameters.lang_factor {
            Some(lang_factor) => self.purchase_cost() * Dimensionless(lang_factor),
            None => self.installation_cost(),
        }
    }

    /// Total depreciable capital
    pub fn tdc(&self) -> Money {
        self.hooks.tdc(self.dpi())
    }

    /// Fixed capital investment
    pub fn fci(&self) -> Money {
        self.hooks.fci(self.tdc())
    }

    /// Total capital investment
    pub fn tci(&self) -> Money {
        (Dimensionless(1.0) + self.parameters.wc_over_fci) * self.fci()
    }

    /// Fixed operating cost
    pub fn foc(&self) -> MoneyPerYear {
        self.hooks.foc(self.fci())
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
        self.parameters.wc_over_fci * self.fci()
    }

    /// Cost of priced feed streams
    pub fn material_cost(&self) -> MoneyPerYear {
        let hourly = self
            .system
            .feeds()
            .filter(|s| s.is_priced())
            .map(Stream::cost)
            .sum();
        self.annualise(hourly)
    }

    /// FCI spread evenly over the operating years
    pub fn annual_depreciation(&self) -> MoneyPerYear {
        self.fci() / Year(self.parameters.operating_years() as f64)
    }

    /// Revenue from priced product streams
    pub fn sales(&self) -> MoneyPerYear {
        let hourly = self
            .system
            .products()
            .filter(|s| s.is_priced())
            .map(Stream::cost)
            .sum();
        self.annualise(hourly)
    }

    /// Net earnings after tax, without accounting for depreciation
    pub fn net_earnings(&self) -> MoneyPerYear {
        (Dimensionless(1.0) - self.parameters.income_tax) * (self.sales() - self.aoc())
    }

    /// Return on investment per year, without accounting for depreciation
    pub fn roi(&self) -> Dimensionless {
        self.net_earnings() / self.tci()
    }

    /// Payback period, without accounting for depreciation
    pub fn pbp(&self) -> Year {
        self.fci() / self.net_earnings()
    }

    /// The totals the cash flow is built from
    pub fn cashflow_inputs(&self) -> CashFlowInputs {
        let tdc = self.tdc();
        let fci = self.hooks.fci(tdc);
        CashFlowInputs {
            tdc,
            fci,
            foc: self.hooks.foc(fci),
            voc: self.voc(),
            sales: self.sales(),
        }
    }

    /// The cash flow table for the venture
    pub fn cashflow(&self) -> TeaResult<CashFlowTable> {
        CashFlowTable::build(&self.parameters, &self.cashflow_inputs())
    }

    /// Cash flow rows, discounted at the venture's IRR
    pub fn cashflow_table(&self) -> TeaResult<Vec<CashFlowRow>> {
        Ok(self.cashflow()?.rows(self.irr()))
    }

    /// Net present value at the venture's IRR
    pub fn npv(&self) -> TeaResult<Money> {
        Ok(self.cashflow()?.npv(self.irr()))
    }

    /// Factor converting a price change on `stream` into a yearly after-tax cash change
    fn price_to_cost(&self, stream: &Stream) -> f64 {
        stream.flow.value()
            * self.parameters.annual_factor().value()
            * (1.0 - self.parameters.income_tax.value())
    }

    /// Find the IRR at which the NPV is zero.
    ///
    /// The previous solution is used as the starting guess.
    pub fn solve_irr(&mut self) -> TeaResult<Dimensionless> {
        let table = self.cashflow()?;
        let irr = solve_with_fallback(
            |rate| table.npv(Dimensionless(rate)).value(),
            self.irr_guess,
            RATE_FALLBACK_SEEDS,
            &self.solver,
        )?;
        debug!("Solved IRR of {irr:.6} for system '{}'", self.system.id);
        self.irr_guess = irr;

        Ok(Dimensionless(irr))
    }

    /// Find the price of a feed or product stream at which the NPV is zero.
    ///
    /// The stream's own price is not changed.
    pub fn solve_price(&mut self, stream_id: &str) -> TeaResult<MoneyPerAmount> {
        let stream = self.system.stream(stream_id)?.clone();
        let direction = price_direction(&stream)?;
        check_has_flow(&stream)?;

        let table = self.cashflow()?;
        let weight = first_year_weight(&self.parameters, &stream);
        let irr = self.irr();
        let sales = solve_with_fallback(
            |sales| table.npv_with_sales(Money(sales), weight, irr).value(),
            self.sales_guess,
            PRICE_FALLBACK_SEEDS,
            &self.solver,
        )?;
        self.sales_guess = sales;

        let price = stream.price + MoneyPerAmount(direction * sales / self.price_to_cost(&stream));
        debug!("Solved price of {} for stream '{stream_id}'", price.value());

        Ok(price)
    }

    /// Split the annual operating cost between products by market value
    pub fn production_cost(&self, products: &[&str]) -> TeaResult<Vec<MoneyPerYear>> {
        let market_values: Vec<MoneyPerHour> = products
            .iter()
            .map(|id| Ok(self.system.stream(id)?.cost()))
            .collect::<TeaResult<_>>()?;
        let total: MoneyPerHour = market_values.iter().copied().sum();
        if total.value() == 0.0 {
            return Err(TeaError::InvalidArgument(
                "products have no market value to allocate costs by".into(),
            ));
        }

        let aoc = self.aoc();
        Ok(market_values
            .into_iter()
            .map(|value| (value / total) * aoc)
            .collect())
    }

    /// NPV, ROI and payback period
    pub fn summary(&self) -> TeaResult<TeaSummary> {
        Ok(TeaSummary {
            name: self.system.id.to_string(),
            npv: self.npv()?,
            irr: self.irr(),
            roi: self.roi(),
            pbp: self.pbp(),
        })
    }
}

impl fmt::Debug for Tea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Tea: {}>", self.system.id)
    }
}
