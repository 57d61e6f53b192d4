//! Vendor-specific control paths behind one capability surface
//!
//! A `Platform` exposes exactly two operations: read the current power limit
//! and apply a partial update. Callers hold one instance for the process
//! lifetime; vendor dispatch is a tagged enum, picked once at startup.

pub mod amd;
pub mod intel;

pub use amd::AmdPlatform;
pub use intel::IntelPlatform;

use crate::common::arch::CpuVendor;
use crate::error::{Result, TdpctlError};
use crate::limits::types::{PowerLimit, PowerLimitUpdate};

/// Which copy of the register an Intel operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterSpace {
    Msr,
    Mmio,
}

impl RegisterSpace {
    /// Parse the HTTP `mode` query value
    pub fn from_mode(mode: &str) -> Option<Self> {
        match mode {
            "msr" => Some(RegisterSpace::Msr),
            "mmio" => Some(RegisterSpace::Mmio),
            _ => None,
        }
    }
}

/// Register spaces an update is applied to
///
/// With no explicit `--msr`/`--mmio` selection, updates go to both copies
/// while reads default to the MSR copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpaceSelection {
    Msr,
    Mmio,
    Both,
}

pub enum Platform {
    Intel(IntelPlatform),
    Amd(AmdPlatform),
    #[cfg(test)]
    Stub(stub::StubPlatform),
}

impl Platform {
    /// Build the platform for the given vendor from environment settings
    pub fn from_environment(vendor: CpuVendor) -> Result<Self> {
        match vendor {
            CpuVendor::Intel => Ok(Platform::Intel(IntelPlatform::from_env())),
            CpuVendor::Amd => Ok(Platform::Amd(AmdPlatform::from_env())),
            CpuVendor::Unknown => Err(TdpctlError::Unsupported(
                "unsupported cpu vendor; use --force-intel or --force-amd".to_string(),
            )),
        }
    }

    pub fn is_intel(&self) -> bool {
        matches!(self, Platform::Intel(_))
    }

    /// Read the current power limit through the vendor's default accessor
    pub fn power_limit(&self) -> Result<PowerLimit> {
        match self {
            Platform::Intel(intel) => intel.msr_power_limit(),
            Platform::Amd(amd) => amd.power_limit(),
            #[cfg(test)]
            Platform::Stub(stub) => stub.power_limit(),
        }
    }

    /// Read through a specific register space (Intel only)
    pub fn power_limit_via(&self, space: RegisterSpace) -> Result<PowerLimit> {
        match self {
            Platform::Intel(intel) => match space {
                RegisterSpace::Msr => intel.msr_power_limit(),
                RegisterSpace::Mmio => intel.mmio_power_limit(),
            },
            _ => Err(TdpctlError::Unsupported(
                "register space selection is only available on the intel platform".to_string(),
            )),
        }
    }

    /// Apply an update through the vendor's default accessor(s)
    pub fn update_power_limit(&self, update: &PowerLimitUpdate) -> Result<()> {
        self.update_power_limit_via(update, SpaceSelection::Both)
    }

    /// Apply an update to the selected register space(s)
    ///
    /// The policy range check runs before any hardware access.
    pub fn update_power_limit_via(
        &self,
        update: &PowerLimitUpdate,
        selection: SpaceSelection,
    ) -> Result<()> {
        update.validate()?;

        match self {
            Platform::Intel(intel) => {
                if matches!(selection, SpaceSelection::Msr | SpaceSelection::Both) {
                    intel.update_msr_power_limit(update)?;
                }
                if matches!(selection, SpaceSelection::Mmio | SpaceSelection::Both) {
                    intel.update_mmio_power_limit(update)?;
                }
                Ok(())
            }
            Platform::Amd(amd) => match selection {
                SpaceSelection::Both => amd.update_power_limit(update),
                _ => Err(TdpctlError::Unsupported(
                    "register space selection is only available on the intel platform".to_string(),
                )),
            },
            #[cfg(test)]
            Platform::Stub(stub) => stub.update_power_limit(update),
        }
    }
}
