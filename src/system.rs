//! The process system analysed by a TEA: costed units and priced streams.
//!
//! Unit-operation simulation happens elsewhere. A TEA only needs the small interface given by
//! [`CostedUnit`] and [`Stream`], and re-reads it on every query, so a system may be
//! re-simulated (by mutating its streams) between calls.
use crate::error::{TeaError, TeaResult};
use crate::id::{SystemID, StreamID, UnitID, define_id_getter};
use crate::units::{FlowRate, Money, MoneyPerAmount, MoneyPerHour};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_string_enum::DeserializeLabeledStringEnum;

/// A process unit with costs
pub trait CostedUnit {
    /// Key used to order units deterministically
    fn id(&self) -> &UnitID;

    /// Purchase cost of the equipment
    fn purchase_cost(&self) -> Money;

    /// Installed cost of the equipment
    fn installation_cost(&self) -> Money;

    /// Utility cost per operating hour
    fn utility_cost(&self) -> MoneyPerHour;
}

/// A unit whose costs are given directly rather than computed
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FixedCostUnit {
    /// Unique identifier for the unit
    pub id: UnitID,
    /// Purchase cost of the equipment
    pub purchase_cost: Money,
    /// Installed cost of the equipment
    pub installation_cost: Money,
    /// Utility cost per operating hour
    #[serde(default)]
    pub utility_cost: MoneyPerHour,
}
define_id_getter! {FixedCostUnit, UnitID}

impl CostedUnit for FixedCostUnit {
    fn id(&self) -> &UnitID {
        &self.id
    }

    fn purchase_cost(&self) -> Money {
        self.purchase_cost
    }

    fn installation_cost(&self) -> Money {
        self.installation_cost
    }

    fn utility_cost(&self) -> MoneyPerHour {
        self.utility_cost
    }
}

/// Whether a stream enters or leaves the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, DeserializeLabeledStringEnum)]
pub enum StreamRole {
    /// Consumed by the system
    #[string = "feed"]
    Feed,
    /// Produced by the system
    #[string = "product"]
    Product,
    /// Neither enters nor leaves the system
    #[string = "internal"]
    Internal,
}

/// A material stream with a price
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Stream {
    /// Unique identifier for the stream
    pub id: StreamID,
    /// Price per unit amount (zero if not priced)
    #[serde(default)]
    pub price: MoneyPerAmount,
    /// Net flow in amount per hour
    pub flow: FlowRate,
    /// Whether the stream is a feed or a product
    pub role: StreamRole,
}
define_id_getter! {Stream, StreamID}

impl Stream {
    /// Net cost (or value) of the stream per hour
    pub fn cost(&self) -> MoneyPerHour {
        self.price * self.flow
    }

    /// Whether the stream has a non-zero price
    pub fn is_priced(&self) -> bool {
        self.price.value() != 0.0
    }
}

/// A collection of costed units and the streams connecting them
pub struct System {
    /// Identifier for the system
    pub id: SystemID,
    units: Vec<Box<dyn CostedUnit>>,
    streams: IndexMap<StreamID, Stream>,
}

impl System {
    /// Create an empty system
    pub fn new(id: &str) -> Self {
        Self {
            id: id.into(),
            units: Vec::new(),
            streams: IndexMap::new(),
        }
    }

    /// Add a unit, keeping units ordered by ID
    pub fn add_unit(&mut self, unit: Box<dyn CostedUnit>) {
        let pos = self
            .units
            .partition_point(|existing| existing.id() <= unit.id());
        self.units.insert(pos, unit);
    }

    /// Add a stream, failing if one with the same ID is already present
    pub fn add_stream(&mut self, stream: Stream) -> TeaResult<()> {
        if self.streams.contains_key(&stream.id) {
            return Err(TeaError::InvalidArgument(format!(
                "stream '{}' is already part of system '{}'",
                stream.id, self.id
            )));
        }
        self.streams.insert(stream.id.clone(), stream);

        Ok(())
    }

    /// Units in ID order
    pub fn units(&self) -> &[Box<dyn CostedUnit>] {
        &self.units
    }

    /// All streams, in the order they were added
    pub fn streams(&self) -> impl Iterator<Item = &Stream> {
        self.streams.values()
    }

    /// Streams consumed by the system
    pub fn feeds(&self) -> impl Iterator<Item = &Stream> {
        self.streams().filter(|s| s.role == StreamRole::Feed)
    }

    /// Streams produced by the system
    pub fn products(&self) -> impl Iterator<Item = &Stream> {
        self.streams().filter(|s| s.role == StreamRole::Product)
    }

    /// Look up a stream by ID
    pub fn stream(&self, id: &str) -> TeaResult<&Stream> {
        self.streams.get(id).ok_or_else(|| self.unknown_stream(id))
    }

    /// Look up a stream by ID for modification
    pub fn stream_mut(&mut self, id: &str) -> TeaResult<&mut Stream> {
        let err = self.unknown_stream(id);
        self.streams.get_mut(id).ok_or(err)
    }

    fn unknown_stream(&self, id: &str) -> TeaError {
        TeaError::InvalidArgument(format!(
            "stream '{id}' is not part of system '{}'",
            self.id
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{product, system};
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    fn unit(id: &str) -> Box<dyn CostedUnit> {
        Box::new(FixedCostUnit {
            id: id.into(),
            purchase_cost: Money(1.0),
            installation_cost: Money(2.0),
            utility_cost: MoneyPerHour(0.0),
        })
    }

    #[test]
    fn test_units_are_ordered() {
        let mut system = System::new("sys");
        for id in ["T301", "F101", "M201", "F102"] {
            system.add_unit(unit(id));
        }
        let ids: Vec<_> = system.units().iter().map(|u| u.id().to_string()).collect();
        assert_eq!(ids, ["F101", "F102", "M201", "T301"]);
    }

    #[rstest]
    fn test_add_stream_duplicate(mut system: System, product: Stream) {
        assert_eq!(
            system.add_stream(product).unwrap_err(),
            TeaError::InvalidArgument("stream 'product' is already part of system 'plant'".into())
        );
    }

    #[rstest]
    fn test_stream_lookup(mut system: System) {
        assert_approx_eq!(
            MoneyPerHour,
            system.stream("product").unwrap().cost(),
            MoneyPerHour(5e6 / 8400.0)
        );
        system.stream_mut("product").unwrap().price = MoneyPerAmount(0.0);
        assert!(!system.stream("product").unwrap().is_priced());
        assert!(matches!(
            system.stream("missing"),
            Err(TeaError::InvalidArgument(_))
        ));
    }

    #[rstest]
    fn test_feeds_and_products(system: System) {
        assert_eq!(system.feeds().count(), 0);
        assert_eq!(system.products().count(), 1);
    }

    #[test]
    fn test_deserialise_stream_role() {
        let stream: Stream = toml::from_str(
            r#"
            id = "water"
            flow = 10.0
            role = "feed"
            "#,
        )
        .unwrap();
        assert_eq!(stream.role, StreamRole::Feed);
        assert_eq!(stream.price, MoneyPerAmount(0.0));
        assert!(toml::from_str::<Stream>("id = \"x\"\nflow = 1.0\nrole = \"sink\"").is_err());
    }
}
