//! Fixtures for tests

use crate::accounting::CostAccounting;
use crate::cashflow::CashFlowInputs;
use crate::depreciation::DepreciationSchedule;
use crate::parameters::VentureParameters;
use crate::system::{FixedCostUnit, Stream, StreamRole, System};
use crate::tea::Tea;
use crate::units::{Dimensionless, FlowRate, Money, MoneyPerAmount, MoneyPerHour, MoneyPerYear};
use rstest::fixture;

/// Assert that an error with the given message occurs
macro_rules! assert_error {
    ($result:expr, $msg:expr) => {
        assert_eq!(
            $result.unwrap_err().chain().next().unwrap().to_string(),
            $msg
        );
    };
}
pub(crate) use assert_error;

/// Operating hours per year for the fixture parameters (350 days)
const HOURS: f64 = 8400.0;

#[fixture]
pub fn parameters() -> VentureParameters {
    VentureParameters {
        irr: Dimensionless(0.1),
        duration: (2020, 2030),
        depreciation: DepreciationSchedule::Macrs7,
        income_tax: Dimensionless(0.35),
        operating_days: 350.0,
        lang_factor: None,
        construction_schedule: vec![0.4, 0.6],
        startup_months: 0.0,
        startup_foc_frac: Dimensionless(1.0),
        startup_voc_frac: Dimensionless(0.75),
        startup_sales_frac: Dimensionless(0.5),
        wc_over_fci: Dimensionless(0.05),
        financing: None,
    }
}

#[fixture]
pub fn cashflow_inputs() -> CashFlowInputs {
    CashFlowInputs {
        tdc: Money(1e7),
        fci: Money(1e7),
        foc: MoneyPerYear(1e6),
        voc: MoneyPerYear(2e6),
        sales: MoneyPerYear(5e6),
    }
}

#[fixture]
pub fn product() -> Stream {
    Stream {
        id: "product".into(),
        price: MoneyPerAmount(0.5),
        flow: FlowRate(5e6 / HOURS / 0.5),
        role: StreamRole::Product,
    }
}

#[fixture]
pub fn unit() -> FixedCostUnit {
    FixedCostUnit {
        id: "R101".into(),
        purchase_cost: Money(4e6),
        installation_cost: Money(1e7),
        utility_cost: MoneyPerHour(2e6 / HOURS),
    }
}

#[fixture]
pub fn system(unit: FixedCostUnit, product: Stream) -> System {
    let mut system = System::new("plant");
    system.add_unit(Box::new(unit));
    system.add_stream(product).unwrap();
    system
}

#[fixture]
pub fn accounting() -> CostAccounting {
    CostAccounting::new()
        .with_tdc(|dpi| dpi)
        .with_fci(|tdc| tdc)
        .with_foc(|_| MoneyPerYear(1e6))
}

#[fixture]
pub fn tea(system: System, parameters: VentureParameters, accounting: CostAccounting) -> Tea {
    Tea::new(system, parameters, accounting).unwrap()
}
