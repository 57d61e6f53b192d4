use serde::{Deserialize, Serialize};

use crate::error::{Result, TdpctlError};

/// Policy range for requested power values, in watts
pub const MAX_ALLOWED_WATTS: u32 = 200;
pub const MIN_ALLOWED_WATTS: u32 = 0;

/// Policy range for requested time windows, in seconds
pub const MAX_ALLOWED_SECONDS: u32 = 60;
pub const MIN_ALLOWED_SECONDS: u32 = 1;

/// One decoded power limit half (PL1 or PL2)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Limit {
    pub enabled: bool,
    /// Watts
    pub power: f64,
    pub clamping: bool,
    /// Seconds; always one of the 128 representable time window quanta
    pub time: f64,
}

/// The decoded state of a power limit register
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerLimit {
    /// When locked, hardware ignores writes until the next reset
    pub locked: bool,
    pub pl1: Limit,
    pub pl2: Limit,
}

/// Requested PL1 changes; absent fields keep their hardware value
///
/// `enabled` is deliberately missing: PL1 enablement is not exposed for
/// writing in this register layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pl1Update {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clamping: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<u32>,
}

/// Requested PL2 changes; absent fields keep their hardware value
///
/// `time` is deliberately missing: the PL2 time window is not exposed for
/// writing in this register layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pl2Update {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clamping: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

/// A partial power limit change request
///
/// Every field is independently optional; the empty update is a no-op.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerLimitUpdate {
    #[serde(default)]
    pub pl1: Pl1Update,
    #[serde(default)]
    pub pl2: Pl2Update,
}

fn check_watts(field: &str, watts: u32) -> Result<()> {
    if !(MIN_ALLOWED_WATTS..=MAX_ALLOWED_WATTS).contains(&watts) {
        return Err(TdpctlError::Validation(format!(
            "{field} out of range: [{MIN_ALLOWED_WATTS}, {MAX_ALLOWED_WATTS}]"
        )));
    }
    Ok(())
}

fn check_seconds(field: &str, seconds: u32) -> Result<()> {
    if !(MIN_ALLOWED_SECONDS..=MAX_ALLOWED_SECONDS).contains(&seconds) {
        return Err(TdpctlError::Validation(format!(
            "{field} out of range: [{MIN_ALLOWED_SECONDS}, {MAX_ALLOWED_SECONDS}]"
        )));
    }
    Ok(())
}

impl PowerLimitUpdate {
    /// True when no field is present
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Enforce the policy ranges before any hardware access
    pub fn validate(&self) -> Result<()> {
        if let Some(w) = self.pl1.power {
            check_watts("pl1.power", w)?;
        }
        if let Some(w) = self.pl2.power {
            check_watts("pl2.power", w)?;
        }
        if let Some(s) = self.pl1.time {
            check_seconds("pl1.time", s)?;
        }
        Ok(())
    }

    /// Overlay `other` on top of this update, field by field
    ///
    /// Present fields of `other` win; absent fields keep the current value.
    pub fn merge(&mut self, other: &PowerLimitUpdate) {
        if let Some(w) = other.pl1.power {
            self.pl1.power = Some(w);
        }
        if let Some(c) = other.pl1.clamping {
            self.pl1.clamping = Some(c);
        }
        if let Some(t) = other.pl1.time {
            self.pl1.time = Some(t);
        }
        if let Some(w) = other.pl2.power {
            self.pl2.power = Some(w);
        }
        if let Some(c) = other.pl2.clamping {
            self.pl2.clamping = Some(c);
        }
        if let Some(e) = other.pl2.enabled {
            self.pl2.enabled = Some(e);
        }
    }

    /// Compact single-line form for logging
    pub fn summary(&self) -> String {
        fn opt<T: std::fmt::Display>(v: Option<T>) -> String {
            v.map_or_else(|| "-".to_string(), |v| v.to_string())
        }
        format!(
            "pl1.power={} pl1.clamping={} pl1.time={} pl2.power={} pl2.clamping={} pl2.enabled={}",
            opt(self.pl1.power),
            opt(self.pl1.clamping),
            opt(self.pl1.time),
            opt(self.pl2.power),
            opt(self.pl2.clamping),
            opt(self.pl2.enabled),
        )
    }
}
