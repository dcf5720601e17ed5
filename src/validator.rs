use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Measurements for a single prediction request. Only constructed once every
/// field is present, numeric and in range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UserInput {
    battery_temperature: f64,
    voltage: f64,
    current: f64,
    charging_cycles: f64,
    state_of_charge: f64,
}

impl UserInput {
    /// Range-checks raw values, reporting every violation at once.
    pub fn new(
        battery_temperature: f64,
        voltage: f64,
        current: f64,
        charging_cycles: f64,
        state_of_charge: f64,
    ) -> Result<Self, ValidationError> {
        let values = [
            battery_temperature,
            voltage,
            current,
            charging_cycles,
            state_of_charge,
        ];
        let mut invalid_types = Vec::new();
        for (spec, value) in REQUIRED_FIELDS.iter().zip(values) {
            if !value.is_finite() {
                invalid_types.push(spec.name);
            }
        }
        if !invalid_types.is_empty() {
            return Err(ValidationError::InvalidType {
                fields: invalid_types,
            });
        }

        let violations: Vec<RangeViolation> = REQUIRED_FIELDS
            .iter()
            .zip(values)
            .filter(|(spec, value)| !spec.contains(*value))
            .map(|(spec, _)| RangeViolation {
                field: spec.name,
                min: spec.min,
                max: spec.max,
                unit: spec.unit,
            })
            .collect();
        if !violations.is_empty() {
            return Err(ValidationError::InvalidRange { violations });
        }

        Ok(Self {
            battery_temperature,
            voltage,
            current,
            charging_cycles,
            state_of_charge,
        })
    }

    pub fn battery_temperature(&self) -> f64 {
        self.battery_temperature
    }

    pub fn voltage(&self) -> f64 {
        self.voltage
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn charging_cycles(&self) -> f64 {
        self.charging_cycles
    }

    pub fn state_of_charge(&self) -> f64 {
        self.state_of_charge
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub min: f64,
    pub max: f64,
    pub unit: &'static str,
}

impl FieldSpec {
    fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

pub const REQUIRED_FIELDS: [FieldSpec; 5] = [
    FieldSpec {
        name: "battery_temperature",
        min: -20.0,
        max: 60.0,
        unit: "°C",
    },
    FieldSpec {
        name: "voltage",
        min: 2.5,
        max: 4.5,
        unit: "V",
    },
    FieldSpec {
        name: "current",
        min: 0.0,
        max: 10.0,
        unit: "A",
    },
    FieldSpec {
        name: "charging_cycles",
        min: 0.0,
        max: 10000.0,
        unit: "",
    },
    FieldSpec {
        name: "state_of_charge",
        min: 0.0,
        max: 100.0,
        unit: "",
    },
];

#[derive(Debug, Clone, PartialEq)]
pub struct RangeViolation {
    pub field: &'static str,
    pub min: f64,
    pub max: f64,
    pub unit: &'static str,
}

impl std::fmt::Display for RangeViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} must be between {} and {}{}",
            self.field, self.min, self.max, self.unit
        )
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("JSON body must be an object")]
    NotAnObject,

    #[error("Missing required fields: {}", .fields.join(", "))]
    MissingFields { fields: Vec<&'static str> },

    #[error("Invalid data type: {} must be a number", .fields.join(", "))]
    InvalidType { fields: Vec<&'static str> },

    #[error("{}", join_violations(.violations))]
    InvalidRange { violations: Vec<RangeViolation> },
}

fn join_violations(violations: &[RangeViolation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Checks a decoded request body. Presence is checked before types, and types
/// before ranges; each stage reports every offending field.
pub fn validate(body: &Value) -> Result<UserInput, ValidationError> {
    let object = body.as_object().ok_or(ValidationError::NotAnObject)?;

    let missing: Vec<&'static str> = REQUIRED_FIELDS
        .iter()
        .filter(|spec| !object.contains_key(spec.name))
        .map(|spec| spec.name)
        .collect();
    if !missing.is_empty() {
        return Err(ValidationError::MissingFields { fields: missing });
    }

    let mut values = [0.0; REQUIRED_FIELDS.len()];
    let mut invalid_types = Vec::new();
    for (slot, spec) in values.iter_mut().zip(REQUIRED_FIELDS.iter()) {
        match numeric_field(object, spec.name) {
            Some(value) => *slot = value,
            None => invalid_types.push(spec.name),
        }
    }
    if !invalid_types.is_empty() {
        return Err(ValidationError::InvalidType {
            fields: invalid_types,
        });
    }

    let [temperature, voltage, current, cycles, soc] = values;
    UserInput::new(temperature, voltage, current, cycles, soc)
}

fn numeric_field(object: &Map<String, Value>, name: &str) -> Option<f64> {
    let value = match object.get(name)? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    value.is_finite().then_some(value)
}
