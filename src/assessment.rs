use std::fmt;

use crate::validator::UserInput;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthBand {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl HealthBand {
    pub fn from_percentage(health: f64) -> Self {
        if health >= 80.0 {
            HealthBand::Excellent
        } else if health >= 60.0 {
            HealthBand::Good
        } else if health >= 40.0 {
            HealthBand::Fair
        } else {
            HealthBand::Poor
        }
    }
}

impl fmt::Display for HealthBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            HealthBand::Excellent => "Excellent",
            HealthBand::Good => "Good",
            HealthBand::Fair => "Fair",
            HealthBand::Poor => "Poor",
        };
        f.write_str(label)
    }
}

/// Maintenance hints derived from the measurements and the predicted health.
pub fn recommendations(input: &UserInput, health: f64) -> Vec<&'static str> {
    let mut hints = Vec::new();

    let temperature = input.battery_temperature();
    if temperature > 45.0 {
        hints.push("High temperature detected! Keep battery cool to extend lifespan.");
    } else if temperature < 0.0 {
        hints.push("Low temperature detected! Battery performance may be reduced.");
    }

    let voltage = input.voltage();
    if voltage < 3.2 {
        hints.push("Low voltage detected! Battery may need charging.");
    } else if voltage > 4.3 {
        hints.push("High voltage detected! Monitor battery carefully.");
    }

    if input.current() > 5.0 {
        hints.push("High current draw detected! This may accelerate degradation.");
    }
    if input.charging_cycles() > 1000.0 {
        hints.push("High cycle count! Consider battery replacement soon.");
    }

    match HealthBand::from_percentage(health) {
        HealthBand::Poor => hints.push("Battery health is critically low! Consider replacement."),
        HealthBand::Fair => hints.push("Battery health is declining. Monitor closely."),
        HealthBand::Excellent => {
            hints.push("Battery health is excellent! Continue proper maintenance.")
        }
        HealthBand::Good => {}
    }

    hints
}

/// Fixed-width text gauge, e.g. `[#######-------------]  35.0%`.
pub fn health_bar(health: f64, width: usize) -> String {
    let health = health.clamp(0.0, 100.0);
    let filled = ((health / 100.0) * width as f64).round() as usize;
    format!(
        "[{}{}] {:5.1}%",
        "#".repeat(filled),
        "-".repeat(width - filled),
        health
    )
}
