//! CPU power limit (TDP) control
//!
//! Reads and rewrites the package power limit register on Intel (MSR 0x610
//! plus its MMIO copy, both reached through an external privileged helper)
//! and delegates to `ryzenadj` on AMD. Ships as a one-shot CLI and as a
//! reconciliation daemon with a small HTTP API.

pub mod common;
pub mod daemon;
pub mod error;
pub mod limits;
pub mod platform;
pub mod render;

pub use error::{Result, TdpctlError};
pub use limits::{PowerLimit, PowerLimitUpdate};
pub use platform::{Platform, RegisterSpace, SpaceSelection};
