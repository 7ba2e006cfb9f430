use serde::{Deserialize, Serialize};

/// Noise epsilon for CPU usage, in percentage points.
pub const CPU_EPSILON: f64 = 2.0;
/// Noise epsilon for pending transactions in the pool.
pub const TX_POOL_EPSILON: f64 = 25.0;
/// Noise epsilon for the gas-used ratio.
pub const GAS_EPSILON: f64 = 0.03;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Rising,
    Falling,
    #[default]
    Stable,
}

/// Two-point slope sign: compare the first and last of time-ordered `values`.
pub fn classify_trend(values: &[f64], epsilon: f64) -> Trend {
    let (Some(first), Some(last)) = (values.first(), values.last()) else {
        return Trend::Stable;
    };
    if values.len() < 2 {
        return Trend::Stable;
    }
    let delta = last - first;
    if delta > epsilon {
        Trend::Rising
    } else if delta < -epsilon {
        Trend::Falling
    } else {
        Trend::Stable
    }
}
