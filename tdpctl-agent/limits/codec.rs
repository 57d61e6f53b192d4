//! Conversion between raw register values and structured power limits
//!
//! Everything here is pure: a raw 64-bit value plus the unit scale in, a
//! structured value or a new raw value out. The unit scale must come from a
//! fresh read of the unit register; nothing here caches it.

use tdpctl_raw::{mask, PackagePowerLimit, PowerUnit, RegisterLayout, TimeWindow};

use crate::limits::types::{Limit, PowerLimit, PowerLimitUpdate};

/// Decode a raw register value into watts and seconds
pub fn decode(raw: u64, units: &PowerUnit) -> PowerLimit {
    let layout = PackagePowerLimit::from_raw_value(raw);
    let power_unit = units.power_unit();
    let time_unit = units.time_unit();

    PowerLimit {
        locked: layout.lock,
        pl1: Limit {
            enabled: layout.enable_1,
            power: layout.power_limit_1 as f64 * power_unit,
            clamping: layout.clamp_1,
            time: TimeWindow::from_field(layout.time_window_1).seconds(time_unit),
        },
        pl2: Limit {
            enabled: layout.enable_2,
            power: layout.power_limit_2 as f64 * power_unit,
            clamping: layout.clamp_2,
            time: TimeWindow::from_field(layout.time_window_2).seconds(time_unit),
        },
    }
}

/// Encode watts into the 15-bit power field
///
/// Range enforcement happens at the request boundary; this only quantizes.
fn encode_power(watts: f64, units: &PowerUnit) -> u64 {
    ((watts / units.power_unit()).round() as u64) & 0x7FFF
}

/// Encode seconds into the 7-bit time window field
fn encode_time(seconds: f64, units: &PowerUnit) -> u64 {
    TimeWindow::nearest_seconds(seconds, units.time_unit()).to_field() as u64
}

/// Apply a partial update to a raw register value
///
/// Each present field clears its mask and ORs in the new encoding; absent
/// fields (and reserved bits) pass through untouched. The empty update
/// returns `raw` unchanged.
pub fn apply_update(raw: u64, units: &PowerUnit, update: &PowerLimitUpdate) -> u64 {
    let mut value = raw;

    if let Some(watts) = update.pl1.power {
        value = (value & !mask::PL1_POWER) | encode_power(watts as f64, units);
    }
    if let Some(clamping) = update.pl1.clamping {
        value = (value & !mask::PL1_CLAMP) | (if clamping { mask::PL1_CLAMP } else { 0 });
    }
    if let Some(seconds) = update.pl1.time {
        value = (value & !mask::PL1_TIME_WINDOW) | (encode_time(seconds as f64, units) << 17);
    }
    if let Some(watts) = update.pl2.power {
        value = (value & !mask::PL2_POWER) | (encode_power(watts as f64, units) << 32);
    }
    if let Some(clamping) = update.pl2.clamping {
        value = (value & !mask::PL2_CLAMP) | (if clamping { mask::PL2_CLAMP } else { 0 });
    }
    if let Some(enabled) = update.pl2.enabled {
        value = (value & !mask::PL2_ENABLE) | (if enabled { mask::PL2_ENABLE } else { 0 });
    }

    value
}

/// Write order for a register split across two 32-bit halves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePlan {
    /// Nothing changed; issue no writes at all
    Skip,
    /// Write the PL1 (low) half, then the PL2 (high) half
    LowFirst,
    /// Write the PL2 (high) half, then the PL1 (low) half
    HighFirst,
}

/// Pick a safe order for a dual-half store
///
/// Hardware must never observe PL1 above the concurrently effective PL2
/// ceiling. Raising PL1 past the old PL2 means the new ceiling has to land
/// first; in every other case the low half goes first so a lowered floor is
/// in place before the ceiling moves.
pub fn plan_dual_write(old_raw: u64, new_raw: u64, units: &PowerUnit) -> WritePlan {
    if new_raw == old_raw {
        return WritePlan::Skip;
    }

    let old = decode(old_raw, units);
    let new = decode(new_raw, units);

    if new.pl1.power > old.pl2.power {
        WritePlan::HighFirst
    } else {
        WritePlan::LowFirst
    }
}
