//! Package power limit ("TDP") register definitions
//!
//! The package power limit lives in a 64-bit register with two symmetric
//! halves: PL1 (long duration) in the low 32 bits and PL2 (short duration)
//! in the high 32 bits, plus a lock bit. The same layout is exposed through
//! MSR 0x610 and through a memory-mapped copy below MCHBAR.
//!
//! ## Register Format (MSR_PKG_POWER_LIMIT / MMIO copy)
//!
//! | Bits   | Field          | Description                        |
//! |--------|----------------|------------------------------------|
//! | 0-14   | power_limit_1  | PL1 power, in power units          |
//! | 15     | enable_1       | PL1 enabled                        |
//! | 16     | clamp_1        | PL1 clamping                       |
//! | 17-23  | time_window_1  | PL1 time window (Y/Z encoded)      |
//! | 24-31  | reserved       |                                    |
//! | 32-46  | power_limit_2  | PL2 power, in power units          |
//! | 47     | enable_2       | PL2 enabled                        |
//! | 48     | clamp_2        | PL2 clamping                       |
//! | 49-55  | time_window_2  | PL2 time window (Y/Z encoded)      |
//! | 56-62  | reserved       |                                    |
//! | 63     | lock           | Writes ignored until reset         |

use crate::register::RegisterLayout;

/// MSR addresses
pub mod msr {
    /// RAPL Power Unit MSR - defines power, energy and time units
    pub const MSR_RAPL_POWER_UNIT: u32 = 0x606;

    /// Package Power Limit MSR
    pub const MSR_PKG_POWER_LIMIT: u32 = 0x610;
}

/// MMIO copy of the package power limit, located through PCI config space
pub mod mmio {
    /// PCI config offset of MCHBAR on bus 0, device 0, function 0
    pub const MCHBAR_PCI_OFFSET: u32 = 0x48;

    /// Offset of the power limit register pair below MCHBAR
    pub const PKG_POWER_LIMIT_OFFSET: u32 = 0x59A0;
}

/// Per-field masks over the raw 64-bit value
///
/// Read-modify-write updates clear the field's mask and OR in the new
/// encoding, leaving reserved bits exactly as the hardware reported them.
pub mod mask {
    pub const PL1_POWER: u64 = 0x7FFF;
    pub const PL1_ENABLE: u64 = 1 << 15;
    pub const PL1_CLAMP: u64 = 1 << 16;
    pub const PL1_TIME_WINDOW: u64 = 0x7F << 17;
    pub const PL2_POWER: u64 = 0x7FFF << 32;
    pub const PL2_ENABLE: u64 = 1 << 47;
    pub const PL2_CLAMP: u64 = 1 << 48;
    pub const PL2_TIME_WINDOW: u64 = 0x7F << 49;
    pub const LOCK: u64 = 1 << 63;
}

/// RAPL Power Unit register layout
///
/// Stores negative power-of-two exponents: a field value of `n` means the
/// corresponding unit is `0.5^n` of the base unit (watts, joules, seconds).
/// The energy exponent is part of the register but unused by the power
/// limit paths.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PowerUnit {
    /// Power unit exponent, bits [3:0]
    pub power_exp: u8,

    /// Energy unit exponent, bits [12:8]
    pub energy_exp: u8,

    /// Time unit exponent, bits [19:16]
    pub time_exp: u8,
}

impl RegisterLayout for PowerUnit {
    fn to_raw_value(&self) -> u64 {
        (self.power_exp as u64 & 0x0F)
            | ((self.energy_exp as u64 & 0x1F) << 8)
            | ((self.time_exp as u64 & 0x0F) << 16)
    }

    fn from_raw_value(value: u64) -> Self {
        Self {
            power_exp: (value & 0x0F) as u8,
            energy_exp: ((value >> 8) & 0x1F) as u8,
            time_exp: ((value >> 16) & 0x0F) as u8,
        }
    }

    fn validate(&self) -> Result<(), &'static str> {
        if self.power_exp > 15 {
            return Err("power unit exponent must be <= 15 (4 bits)");
        }
        if self.energy_exp > 31 {
            return Err("energy unit exponent must be <= 31 (5 bits)");
        }
        if self.time_exp > 15 {
            return Err("time unit exponent must be <= 15 (4 bits)");
        }
        Ok(())
    }
}

impl PowerUnit {
    /// Watts per power field LSB
    pub fn power_unit(&self) -> f64 {
        0.5f64.powi(self.power_exp as i32)
    }

    /// Joules per energy counter LSB
    pub fn energy_unit(&self) -> f64 {
        0.5f64.powi(self.energy_exp as i32)
    }

    /// Seconds per time window unit
    pub fn time_unit(&self) -> f64 {
        0.5f64.powi(self.time_exp as i32)
    }
}

/// Package Power Limit register layout
///
/// Field values are raw: power in power units, time windows Y/Z encoded.
/// See [`crate::window::TimeWindow`] for the time window encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PackagePowerLimit {
    /// PL1 power limit in power units, bits [14:0]
    pub power_limit_1: u16,

    /// PL1 enabled, bit 15
    pub enable_1: bool,

    /// PL1 clamping, bit 16
    pub clamp_1: bool,

    /// PL1 time window field, bits [23:17]
    pub time_window_1: u8,

    /// PL2 power limit in power units, bits [46:32]
    pub power_limit_2: u16,

    /// PL2 enabled, bit 47
    pub enable_2: bool,

    /// PL2 clamping, bit 48
    pub clamp_2: bool,

    /// PL2 time window field, bits [55:49]
    pub time_window_2: u8,

    /// Register locked, bit 63; writes are silently dropped by hardware
    pub lock: bool,
}

impl RegisterLayout for PackagePowerLimit {
    fn to_raw_value(&self) -> u64 {
        (self.power_limit_1 as u64 & 0x7FFF)
            | (if self.enable_1 { mask::PL1_ENABLE } else { 0 })
            | (if self.clamp_1 { mask::PL1_CLAMP } else { 0 })
            | ((self.time_window_1 as u64 & 0x7F) << 17)
            | ((self.power_limit_2 as u64 & 0x7FFF) << 32)
            | (if self.enable_2 { mask::PL2_ENABLE } else { 0 })
            | (if self.clamp_2 { mask::PL2_CLAMP } else { 0 })
            | ((self.time_window_2 as u64 & 0x7F) << 49)
            | (if self.lock { mask::LOCK } else { 0 })
    }

    fn from_raw_value(value: u64) -> Self {
        Self {
            power_limit_1: (value & 0x7FFF) as u16,
            enable_1: (value & mask::PL1_ENABLE) != 0,
            clamp_1: (value & mask::PL1_CLAMP) != 0,
            time_window_1: ((value >> 17) & 0x7F) as u8,
            power_limit_2: ((value >> 32) & 0x7FFF) as u16,
            enable_2: (value & mask::PL2_ENABLE) != 0,
            clamp_2: (value & mask::PL2_CLAMP) != 0,
            time_window_2: ((value >> 49) & 0x7F) as u8,
            lock: (value & mask::LOCK) != 0,
        }
    }

    fn validate(&self) -> Result<(), &'static str> {
        if self.power_limit_1 > 0x7FFF {
            return Err("PL1 power must be <= 0x7FFF (15 bits)");
        }
        if self.time_window_1 > 0x7F {
            return Err("PL1 time window must be <= 0x7F (7 bits)");
        }
        if self.power_limit_2 > 0x7FFF {
            return Err("PL2 power must be <= 0x7FFF (15 bits)");
        }
        if self.time_window_2 > 0x7F {
            return Err("PL2 time window must be <= 0x7F (7 bits)");
        }
        Ok(())
    }
}

impl PackagePowerLimit {
    /// Split into the independently writable (low, high) 32-bit halves
    pub fn split_halves(raw: u64) -> (u32, u32) {
        (raw as u32, (raw >> 32) as u32)
    }

    /// Join the (low, high) 32-bit halves back into the 64-bit value
    pub fn join_halves(low: u32, high: u32) -> u64 {
        ((high as u64) << 32) | low as u64
    }
}
