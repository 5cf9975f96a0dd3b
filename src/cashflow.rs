//! The cash flow engine: year-by-year capital, operating and loan flows for a venture.
//!
//! Tables are indexed from the first construction year (offset `-start`) to the last operating
//! year (offset `years - 1`), where `start` is the number of construction years.
use crate::error::{TeaError, TeaResult};
use crate::parameters::VentureParameters;
use crate::solver::{SolverConfig, wegstein};
use crate::units::{Dimensionless, Money, MoneyPerYear, Year};
use itertools::izip;
use log::debug;

/// Capital and annual totals from which a cash flow table is built
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CashFlowInputs {
    /// Total depreciable capital
    pub tdc: Money,
    /// Fixed capital investment
    pub fci: Money,
    /// Fixed operating cost
    pub foc: MoneyPerYear,
    /// Variable operating cost
    pub voc: MoneyPerYear,
    /// Sales revenue
    pub sales: MoneyPerYear,
}

/// A single year of a [`CashFlowTable`] with derived columns
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CashFlowRow {
    /// Offset from the start of operation (negative during construction)
    pub year: i32,
    /// Depreciation
    pub depreciation: Money,
    /// Fixed capital spend
    pub fixed_capital: Money,
    /// Working capital spend (negative when recovered)
    pub working_capital: Money,
    /// Loan principal drawn
    pub loan: Money,
    /// Loan payment
    pub loan_payment: Money,
    /// Operating cost excluding depreciation
    pub operating_cost: Money,
    /// Sales
    pub sales: Money,
    /// Net earnings after tax
    pub net_earnings: Money,
    /// Cash flow
    pub cash_flow: Money,
    /// Cash flow discounted to the start of operation
    pub discounted_cash_flow: Money,
    /// Running total of the (undiscounted) cash flow
    pub cumulative_cash_flow: Money,
}

/// Year-indexed cash flow series for a venture
#[derive(Debug, Clone, PartialEq)]
pub struct CashFlowTable {
    /// Number of construction years before operation starts
    pub start: usize,
    /// Depreciation
    pub depreciation: Vec<Money>,
    /// Fixed capital spend
    pub fixed_capital: Vec<Money>,
    /// Working capital spend, recovered in the final year
    pub working_capital: Vec<Money>,
    /// Loan principal drawn
    pub loan: Vec<Money>,
    /// Loan payments
    pub loan_payment: Vec<Money>,
    /// Operating cost excluding depreciation
    pub operating_cost: Vec<Money>,
    /// Sales
    pub sales: Vec<Money>,
    /// Net earnings after tax
    pub net_earnings: Vec<Money>,
    /// Cash flow
    pub cash_flow: Vec<Money>,
}

/// The amount accrued over one year at the given rate
fn annual_amount(rate: MoneyPerYear) -> Money {
    rate * Year(1.0)
}

/// Blend startup and full-rate values for the first year of operation
fn startup_blend(full: Money, startup_time: f64, startup_frac: Dimensionless) -> Money {
    let w0 = Dimensionless(startup_time);
    let w1 = Dimensionless(1.0 - startup_time);
    w0 * startup_frac * full + w1 * full
}

/// Principal owed at the start of operation, with each year's draw accruing interest.
pub fn initial_loan_principal(loan: &[Money], interest: Dimensionless) -> Money {
    let growth = Dimensionless(1.0) + interest;
    loan.iter()
        .fold(Money(0.0), |principal, &draw| draw + principal * growth)
}

/// Principal left after paying `payment` every year for `years` years.
pub fn final_loan_principal(
    payment: Money,
    principal: Money,
    interest: Dimensionless,
    years: u32,
) -> Money {
    (0..years).fold(principal, |principal, _| {
        principal + principal * interest - payment
    })
}

/// Find the constant yearly payment which pays off the loan in exactly `years` years.
pub fn solve_loan_payment(loan: &[Money], interest: Dimensionless, years: u32) -> TeaResult<Money> {
    if years == 0 {
        return Err(TeaError::InvalidArgument(
            "loan must be paid back over at least one year".into(),
        ));
    }

    let principal = initial_loan_principal(loan, interest);
    let n = f64::from(years);
    let total: Money = loan.iter().copied().sum();
    let guess = total / Dimensionless(n) * (Dimensionless(1.0) + interest);

    // Any remaining principal is spread over the payments
    let payment = wegstein(
        |payment| {
            let remaining = final_loan_principal(Money(payment), principal, interest, years);
            payment + remaining.value() / n
        },
        guess.value(),
        &SolverConfig::default(),
    )?;
    debug!("Solved loan payment of {payment:.2} over {years} years");

    Ok(Money(payment))
}

/// Discount a cash flow series starting `start` years before operation.
pub fn net_present_value(cash_flow: &[Money], start: usize, rate: Dimensionless) -> Money {
    let growth = Dimensionless(1.0) + rate;
    cash_flow
        .iter()
        .enumerate()
        .map(|(i, &cf)| cf / growth.powi(i as i32 - start as i32))
        .sum()
}

impl CashFlowTable {
    /// Build the cash flow table for a venture.
    ///
    /// # Arguments
    ///
    /// * `parameters` - Validated venture parameters
    /// * `inputs` - Capital and annual totals
    pub fn build(parameters: &VentureParameters, inputs: &CashFlowInputs) -> TeaResult<Self> {
        let start = parameters.construction_years();
        let years = parameters.operating_years();
        if start == 0 || years == 0 {
            return Err(TeaError::InvalidConfiguration(
                "a venture needs at least one construction year and one operating year".into(),
            ));
        }
        let len = start + years;
        let zeros = || vec![Money(0.0); len];

        let mut fixed_capital = zeros();
        for (spend, &fraction) in fixed_capital
            .iter_mut()
            .zip(&parameters.construction_schedule)
        {
            *spend = inputs.fci * Dimensionless(fraction);
        }

        // Schedules longer than the operating life are truncated
        let mut depreciation = zeros();
        for (amount, &fraction) in depreciation[start..]
            .iter_mut()
            .zip(parameters.depreciation.fractions())
        {
            *amount = inputs.tdc * Dimensionless(fraction);
        }

        let wc = inputs.fci * parameters.wc_over_fci;
        let mut working_capital = zeros();
        working_capital[start - 1] = wc;
        working_capital[len - 1] = -wc;

        let foc = annual_amount(inputs.foc);
        let voc = annual_amount(inputs.voc);
        let sales_full = annual_amount(inputs.sales);
        let w0 = parameters.startup_time();

        let mut operating_cost = zeros();
        let mut sales = zeros();
        operating_cost[start] = startup_blend(voc, w0, parameters.startup_voc_frac)
            + startup_blend(foc, w0, parameters.startup_foc_frac);
        sales[start] = startup_blend(sales_full, w0, parameters.startup_sales_frac);
        operating_cost[start + 1..].fill(voc + foc);
        sales[start + 1..].fill(sales_full);

        let after_tax = Dimensionless(1.0) - parameters.income_tax;
        let net_earnings: Vec<Money> = izip!(&sales, &operating_cost, &depreciation)
            .map(|(&s, &c, &d)| (s - c - d) * after_tax)
            .collect();

        let mut loan = zeros();
        let mut loan_payment = zeros();
        if let Some(financing) = &parameters.financing {
            for (draw, &capital, &working) in
                izip!(&mut loan[..start], &fixed_capital, &working_capital)
            {
                *draw = financing.fraction * (capital + working);
            }
            let payment = solve_loan_payment(&loan[..start], financing.interest, financing.years)?;
            let end = (start + financing.years as usize).min(len);
            loan_payment[start..end].fill(payment);
        }

        let cash_flow = (0..len)
            .map(|i| {
                net_earnings[i] + depreciation[i] + loan[i]
                    - fixed_capital[i]
                    - working_capital[i]
                    - loan_payment[i]
            })
            .collect();

        Ok(Self {
            start,
            depreciation,
            fixed_capital,
            working_capital,
            loan,
            loan_payment,
            operating_cost,
            sales,
            net_earnings,
            cash_flow,
        })
    }

    /// Number of years covered by the table
    pub fn len(&self) -> usize {
        self.cash_flow.len()
    }

    /// Whether the table covers no years
    pub fn is_empty(&self) -> bool {
        self.cash_flow.is_empty()
    }

    /// Year offsets from the start of operation, one per row
    pub fn year_offsets(&self) -> impl Iterator<Item = i32> + use<> {
        let start = self.start as i32;
        (0..self.len() as i32).map(move |i| i - start)
    }

    /// Net present value of the cash flow at the given discount rate
    pub fn npv(&self, rate: Dimensionless) -> Money {
        net_present_value(&self.cash_flow, self.start, rate)
    }

    /// Net present value with an extra amount of after-tax cash each operating year.
    ///
    /// Only `first_year_weight` of the extra amount is added in the first year of operation.
    pub fn npv_with_sales(
        &self,
        extra: Money,
        first_year_weight: Dimensionless,
        rate: Dimensionless,
    ) -> Money {
        let mut cash_flow = self.cash_flow.clone();
        cash_flow[self.start] += first_year_weight * extra;
        for cf in &mut cash_flow[self.start + 1..] {
            *cf += extra;
        }

        net_present_value(&cash_flow, self.start, rate)
    }

    /// Add another table's series to this one, element by element
    pub fn accumulate(&mut self, other: &Self) -> TeaResult<()> {
        if self.start != other.start || self.len() != other.len() {
            return Err(TeaError::InvalidConfiguration(format!(
                "cannot combine cash flows with different year indexing \
                ({} construction and {} operating years vs {} and {})",
                self.start,
                self.len() - self.start,
                other.start,
                other.len() - other.start
            )));
        }

        let pairs = [
            (&mut self.depreciation, &other.depreciation),
            (&mut self.fixed_capital, &other.fixed_capital),
            (&mut self.working_capital, &other.working_capital),
            (&mut self.loan, &other.loan),
            (&mut self.loan_payment, &other.loan_payment),
            (&mut self.operating_cost, &other.operating_cost),
            (&mut self.sales, &other.sales),
            (&mut self.net_earnings, &other.net_earnings),
            (&mut self.cash_flow, &other.cash_flow),
        ];
        for (series, other_series) in pairs {
            for (value, &other_value) in series.iter_mut().zip(other_series) {
                *value += other_value;
            }
        }

        Ok(())
    }

    /// One row per year, with discounted and cumulative cash flow at the given rate
    pub fn rows(&self, rate: Dimensionless) -> Vec<CashFlowRow> {
        let growth = Dimensionless(1.0) + rate;
        let mut cumulative = Money(0.0);
        self.year_offsets()
            .enumerate()
            .map(|(i, year)| {
                let cash_flow = self.cash_flow[i];
                cumulative += cash_flow;
                CashFlowRow {
                    year,
                    depreciation: self.depreciation[i],
                    fixed_capital: self.fixed_capital[i],
                    working_capital: self.working_capital[i],
                    loan: self.loan[i],
                    loan_payment: self.loan_payment[i],
                    operating_cost: self.operating_cost[i],
                    sales: self.sales[i],
                    net_earnings: self.net_earnings[i],
                    cash_flow,
                    discounted_cash_flow: cash_flow / growth.powi(year),
                    cumulative_cash_flow: cumulative,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{cashflow_inputs, parameters};
    use crate::parameters::Financing;
    use float_cmp::assert_approx_eq;
    use rstest::{fixture, rstest};

    #[fixture]
    fn table(parameters: VentureParameters, cashflow_inputs: CashFlowInputs) -> CashFlowTable {
        CashFlowTable::build(&parameters, &cashflow_inputs).unwrap()
    }

    #[fixture]
    fn financed(mut parameters: VentureParameters) -> VentureParameters {
        parameters.financing = Some(Financing {
            interest: Dimensionless(0.08),
            years: 5,
            fraction: Dimensionless(0.4),
        });
        parameters
    }

    #[rstest]
    fn test_build_scenario(table: CashFlowTable) {
        assert_eq!(table.len(), 12);
        assert_eq!(table.start, 2);
        assert_eq!(table.year_offsets().collect::<Vec<_>>(), (-2..10).collect::<Vec<_>>());

        assert_approx_eq!(Money, table.cash_flow[0], Money(-4e6), epsilon = 1e-6);
        assert_approx_eq!(Money, table.cash_flow[1], Money(-6.5e6), epsilon = 1e-6);

        // First operating year: (5M - 3M - 1.429M) * 0.65 + 1.429M
        assert_approx_eq!(Money, table.cash_flow[2], Money(1_800_150.0), epsilon = 1e-6);

        // No depreciation left in the final year, but working capital is recovered
        assert_eq!(table.depreciation[11], Money(0.0));
        assert_approx_eq!(Money, table.working_capital[11], Money(-5e5));
        assert_approx_eq!(Money, table.cash_flow[11], Money(1.8e6), epsilon = 1e-6);
    }

    #[rstest]
    fn test_series_lengths(table: CashFlowTable) {
        for series in [
            &table.depreciation,
            &table.fixed_capital,
            &table.working_capital,
            &table.loan,
            &table.loan_payment,
            &table.operating_cost,
            &table.sales,
            &table.net_earnings,
        ] {
            assert_eq!(series.len(), table.len());
        }
    }

    #[rstest]
    #[case(vec![1.0], (2020, 2021))]
    #[case(vec![0.2, 0.3, 0.5], (2000, 2030))]
    #[case(vec![0.5, 0.5], (2020, 2025))]
    fn test_working_capital_recovered(
        mut parameters: VentureParameters,
        cashflow_inputs: CashFlowInputs,
        #[case] schedule: Vec<f64>,
        #[case] duration: (u32, u32),
    ) {
        parameters.construction_schedule = schedule;
        parameters.duration = duration;
        let table = CashFlowTable::build(&parameters, &cashflow_inputs).unwrap();
        assert_eq!(
            table.len(),
            parameters.construction_years() + parameters.operating_years()
        );
        let total: Money = table.working_capital.iter().copied().sum();
        assert_eq!(total, Money(0.0));
    }

    #[rstest]
    fn test_depreciation_truncated(
        mut parameters: VentureParameters,
        cashflow_inputs: CashFlowInputs,
    ) {
        parameters.duration = (2020, 2024);
        let table = CashFlowTable::build(&parameters, &cashflow_inputs).unwrap();
        assert_eq!(table.len(), 6);
        assert_approx_eq!(Money, table.depreciation[2], Money(1.429e6), epsilon = 1e-6);
        assert_approx_eq!(Money, table.depreciation[5], Money(1.249e6), epsilon = 1e-6);
    }

    #[rstest]
    fn test_startup_blending(mut parameters: VentureParameters, cashflow_inputs: CashFlowInputs) {
        // No startup period means full rates straight away
        let table = CashFlowTable::build(&parameters, &cashflow_inputs).unwrap();
        assert_eq!(table.sales[2], Money(5e6));
        assert_eq!(table.operating_cost[2], Money(3e6));

        parameters.startup_months = 6.0;
        parameters.startup_foc_frac = Dimensionless(1.0);
        parameters.startup_voc_frac = Dimensionless(0.5);
        parameters.startup_sales_frac = Dimensionless(0.5);
        let table = CashFlowTable::build(&parameters, &cashflow_inputs).unwrap();
        assert_approx_eq!(Money, table.sales[2], Money(3.75e6));
        assert_approx_eq!(Money, table.operating_cost[2], Money(1.5e6 + 1e6));
        assert_eq!(table.sales[3], Money(5e6));
        assert_eq!(table.operating_cost[3], Money(3e6));
    }

    #[rstest]
    fn test_no_financing(table: CashFlowTable) {
        assert!(table.loan.iter().all(|&x| x == Money(0.0)));
        assert!(table.loan_payment.iter().all(|&x| x == Money(0.0)));
    }

    #[rstest]
    fn test_financing(financed: VentureParameters, cashflow_inputs: CashFlowInputs) {
        let table = CashFlowTable::build(&financed, &cashflow_inputs).unwrap();
        assert_approx_eq!(Money, table.loan[0], Money(1.6e6), epsilon = 1e-6);
        assert_approx_eq!(Money, table.loan[1], Money(2.6e6), epsilon = 1e-6);
        assert!(table.loan[2..].iter().all(|&x| x == Money(0.0)));

        let payment = table.loan_payment[2];
        assert!(payment > Money(0.0));
        assert!(table.loan_payment[2..7].iter().all(|&x| x == payment));
        assert!(table.loan_payment[7..].iter().all(|&x| x == Money(0.0)));
    }

    #[rstest]
    fn test_financing_longer_than_operation(
        mut financed: VentureParameters,
        cashflow_inputs: CashFlowInputs,
    ) {
        financed.duration = (2020, 2023);
        let table = CashFlowTable::build(&financed, &cashflow_inputs).unwrap();
        assert_eq!(table.len(), 5);
        assert!(table.loan_payment[2..].iter().all(|&x| x > Money(0.0)));
    }

    #[rstest]
    #[case(&[1e6], 0.05, 1)]
    #[case(&[1.6e6, 2.6e6], 0.08, 5)]
    #[case(&[3e6, 3e6, 1e6], 0.1, 20)]
    #[case(&[2e6, 2e6], 0.0, 10)]
    fn test_loan_amortisation_closes(
        #[case] loan: &[f64],
        #[case] interest: f64,
        #[case] years: u32,
    ) {
        let loan: Vec<Money> = loan.iter().copied().map(Money).collect();
        let interest = Dimensionless(interest);
        let payment = solve_loan_payment(&loan, interest, years).unwrap();
        let principal = initial_loan_principal(&loan, interest);
        let remaining = final_loan_principal(payment, principal, interest, years);
        assert!(remaining.abs() < Money(1e-3), "{remaining}");
    }

    #[test]
    fn test_initial_loan_principal() {
        let principal =
            initial_loan_principal(&[Money(100.0), Money(200.0)], Dimensionless(0.1));
        assert_approx_eq!(Money, principal, Money(310.0));
    }

    #[test]
    fn test_solve_loan_payment_zero_years() {
        assert!(matches!(
            solve_loan_payment(&[Money(1.0)], Dimensionless(0.1), 0),
            Err(TeaError::InvalidArgument(_))
        ));
    }

    #[rstest]
    fn test_npv_decreasing_in_rate(table: CashFlowTable) {
        let npvs: Vec<Money> = [0.0, 0.05, 0.1, 0.15, 0.2, 0.3]
            .into_iter()
            .map(|rate| table.npv(Dimensionless(rate)))
            .collect();
        for pair in npvs.windows(2) {
            assert!(pair[1] < pair[0]);
        }
    }

    #[test]
    fn test_net_present_value_offsets() {
        let cash_flow = [Money(-110.0), Money(121.0)];
        let npv = net_present_value(&cash_flow, 1, Dimensionless(0.1));
        assert_approx_eq!(Money, npv, Money(0.0), epsilon = 1e-9);
    }

    #[rstest]
    fn test_npv_with_sales(table: CashFlowTable) {
        let rate = Dimensionless(0.1);
        assert_eq!(
            table.npv_with_sales(Money(0.0), Dimensionless(1.0), rate),
            table.npv(rate)
        );

        // Extra cash in every operating year, at half weight in the first
        let extra = Money(1e5);
        let expected = table.npv(rate)
            + (0..10)
                .map(|year| {
                    let weight = if year == 0 { 0.5 } else { 1.0 };
                    extra * Dimensionless(weight) / Dimensionless(1.1).powi(year)
                })
                .sum::<Money>();
        assert_approx_eq!(
            Money,
            table.npv_with_sales(extra, Dimensionless(0.5), rate),
            expected,
            epsilon = 1e-6
        );
    }

    #[rstest]
    fn test_accumulate(table: CashFlowTable) {
        let mut combined = table.clone();
        combined.accumulate(&table).unwrap();
        assert_approx_eq!(Money, combined.cash_flow[0], Money(-8e6), epsilon = 1e-6);
        assert_eq!(combined.sales[5], Money(1e7));
    }

    #[rstest]
    fn test_accumulate_misaligned(
        table: CashFlowTable,
        mut parameters: VentureParameters,
        cashflow_inputs: CashFlowInputs,
    ) {
        parameters.duration = (2020, 2025);
        let other = CashFlowTable::build(&parameters, &cashflow_inputs).unwrap();
        let mut combined = table.clone();
        assert!(matches!(
            combined.accumulate(&other),
            Err(TeaError::InvalidConfiguration(_))
        ));
        assert_eq!(combined, table);
    }

    #[rstest]
    fn test_rows(table: CashFlowTable) {
        let rows = table.rows(Dimensionless(0.1));
        assert_eq!(rows.len(), 12);
        assert_eq!(rows[0].year, -2);
        assert_eq!(rows[11].year, 9);

        assert_approx_eq!(
            Money,
            rows[0].discounted_cash_flow,
            Money(-4e6 * 1.21),
            epsilon = 1e-6
        );
        assert_approx_eq!(Money, rows[1].cumulative_cash_flow, Money(-10.5e6), epsilon = 1e-6);

        let total: Money = table.cash_flow.iter().copied().sum();
        assert_approx_eq!(Money, rows[11].cumulative_cash_flow, total, epsilon = 1e-6);
        let discounted: Money = rows.iter().map(|row| row.discounted_cash_flow).sum();
        assert_approx_eq!(
            Money,
            discounted,
            table.npv(Dimensionless(0.1)),
            epsilon = 1e-6
        );
    }
}
