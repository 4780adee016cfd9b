//! Time-based attenuation of importance scores.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a raw score decays with message age.
///
/// Every mode yields a factor in `[0, 1]` that is non-increasing in age.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DecayMode {
    /// No attenuation.
    None,
    /// `max(0, 1 - age / window_hours)`.
    Linear { window_hours: f64 },
    /// `exp(-age * rate)`.
    Exponential { rate: f64 },
    /// `max(0, 1 - ln(1 + age) * rate)`.
    Logarithmic { rate: f64 },
}

impl Default for DecayMode {
    fn default() -> Self {
        Self::Exponential { rate: 0.01 }
    }
}

impl DecayMode {
    /// Decay factor for a message `age_hours` old. Negative ages count as zero.
    #[must_use]
    pub fn factor(&self, age_hours: f64) -> f64 {
        let age = if age_hours.is_finite() {
            age_hours.max(0.0)
        } else {
            f64::MAX
        };
        let factor = match *self {
            Self::None => 1.0,
            Self::Linear { window_hours } => 1.0 - age / window_hours,
            Self::Exponential { rate } => (-age * rate).exp(),
            Self::Logarithmic { rate } => 1.0 - age.ln_1p() * rate,
        };
        factor.clamp(0.0, 1.0)
    }

    /// Check parameters. Returns a description of the first problem found.
    ///
    /// # Errors
    ///
    /// Returns an error message for negative or non-finite rates and
    /// non-positive windows.
    pub fn validate(&self) -> Result<(), String> {
        match *self {
            Self::None => Ok(()),
            Self::Linear { window_hours } => {
                if window_hours.is_finite() && window_hours > 0.0 {
                    Ok(())
                } else {
                    Err(format!(
                        "linear decay window must be positive, got {window_hours}"
                    ))
                }
            }
            Self::Exponential { rate } | Self::Logarithmic { rate } => {
                if rate.is_finite() && rate >= 0.0 {
                    Ok(())
                } else {
                    Err(format!("decay rate must be non-negative, got {rate}"))
                }
            }
        }
    }
}

/// Which instant ages are measured against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceTime {
    /// Newest timestamp seen in the file. Keeps scores reproducible.
    #[default]
    LatestSeen,
    /// Wall clock at scoring time.
    Now,
}

impl ReferenceTime {
    /// Resolve to an instant, given the newest timestamp seen so far.
    #[must_use]
    pub fn resolve(self, latest_seen: Option<DateTime<Utc>>) -> DateTime<Utc> {
        match self {
            Self::LatestSeen => latest_seen.unwrap_or_else(Utc::now),
            Self::Now => Utc::now(),
        }
    }
}

/// Age in fractional hours, zero when `timestamp` is after `reference`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn age_hours(timestamp: DateTime<Utc>, reference: DateTime<Utc>) -> f64 {
    let millis = (reference - timestamp).num_milliseconds().max(0);
    millis as f64 / 3_600_000.0
}
