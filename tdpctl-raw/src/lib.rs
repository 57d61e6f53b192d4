//! # tdpctl-raw
//!
//! Register layouts for Intel package power limit ("TDP") control.
//!
//! This crate holds the pure bitfield side of the problem: the RAPL unit
//! register, the 64-bit package power limit register shared between its MSR
//! and MMIO copies, and the non-linear time window quantization. There is no
//! I/O here; reading and writing the registers is the agent's job.
//!
//! ## References
//!
//! - Intel® 64 and IA-32 Architectures Software Developer's Manual, Volume 3B
//! - Section 14.9: Platform Specific Power Management Support
//!
//! ## Usage
//!
//! ```
//! use tdpctl_raw::{PackagePowerLimit, PowerUnit, RegisterLayout};
//!
//! let units = PowerUnit::from_raw_value(0x000A_0E03);
//! let limit = PackagePowerLimit::from_raw_value(0x0042_8328_0042_8320);
//! let watts = limit.power_limit_1 as f64 * units.power_unit();
//! # let _ = watts;
//! ```

pub mod rapl;
pub mod register;
pub mod window;

// Re-export for convenience
pub use rapl::{mask, mmio, msr, PackagePowerLimit, PowerUnit};
pub use register::RegisterLayout;
pub use window::TimeWindow;
