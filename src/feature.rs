use crate::catalog::{FeatureCatalog, FeatureId};
use crate::validator::UserInput;

/// Mean pack temperature of the reference dataset, in °C.
pub const REFERENCE_TEMPERATURE: f64 = 26.0;
pub const MIN_CHARGE_VOLTAGE_FLOOR: f64 = 3.0;
pub const DEFAULT_VOLTAGE: f64 = 3.7;
pub const DEFAULT_CONSTANT_CURRENT_TIME: f64 = 6000.0;
pub const SECONDS_PER_CYCLE: f64 = 10000.0;

/// Model input values, ordered as the catalog they were built from.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    values: Vec<f64>,
}

impl FeatureVector {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.values.get(index).copied()
    }

    /// Index of the first value that is NaN or infinite.
    pub fn first_non_finite(&self) -> Option<usize> {
        self.values.iter().position(|v| !v.is_finite())
    }
}

/// Catalog-shaped scratch space. Reads and writes of features the catalog
/// does not list are no-ops.
struct WorkingSet<'a> {
    catalog: &'a FeatureCatalog,
    values: Vec<f64>,
}

impl<'a> WorkingSet<'a> {
    fn new(catalog: &'a FeatureCatalog) -> Self {
        Self {
            catalog,
            values: catalog.fallbacks().to_vec(),
        }
    }

    fn get(&self, id: FeatureId) -> Option<f64> {
        self.catalog.position(id).map(|i| self.values[i])
    }

    fn set(&mut self, id: FeatureId, value: f64) {
        if let Some(i) = self.catalog.position(id) {
            self.values[i] = value;
        }
    }

    fn into_vector(self) -> FeatureVector {
        FeatureVector::new(self.values)
    }
}

/// Expands the five measurements into the full model input. Features the
/// measurements say nothing about keep their catalog fallback.
pub fn build_features(input: &UserInput, catalog: &FeatureCatalog) -> FeatureVector {
    let mut work = WorkingSet::new(catalog);

    let voltage = input.voltage();
    let cycles = input.charging_cycles();

    work.set(FeatureId::ExpTemperature, input.battery_temperature());
    work.set(FeatureId::ExpVoltage, voltage);
    work.set(FeatureId::MaxDischargeVoltage, voltage);
    work.set(
        FeatureId::MinChargeVoltage,
        (voltage - 0.5).max(MIN_CHARGE_VOLTAGE_FLOOR),
    );
    work.set(FeatureId::ExpCurrent, input.current());
    work.set(FeatureId::CycleIndex, cycles);
    work.set(FeatureId::CycleSquared, cycles.powi(2));

    // Derived features read what the direct overrides above wrote.
    if let (Some(max), Some(min)) = (
        work.get(FeatureId::MaxDischargeVoltage),
        work.get(FeatureId::MinChargeVoltage),
    ) {
        work.set(FeatureId::VoltageDrop, max - min);
    }

    // Current does not enter the estimate: energy density is voltage × time.
    let voltage_value = work
        .get(FeatureId::ExpVoltage)
        .or_else(|| work.get(FeatureId::MaxDischargeVoltage))
        .unwrap_or(DEFAULT_VOLTAGE);
    let time_value = work
        .get(FeatureId::TimeConstantCurrent)
        .unwrap_or(DEFAULT_CONSTANT_CURRENT_TIME);
    work.set(FeatureId::EnergyDensity, voltage_value * time_value);

    if let Some(temperature) = work.get(FeatureId::ExpTemperature) {
        work.set(
            FeatureId::TempDeviation,
            temperature - REFERENCE_TEMPERATURE,
        );
    }

    let soc = input.state_of_charge() / 100.0;
    work.set(FeatureId::TimeAtHighVoltage, 5000.0 + soc * 1000.0);
    work.set(FeatureId::ExpTime, cycles * SECONDS_PER_CYCLE);

    work.into_vector()
}
