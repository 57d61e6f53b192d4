//! Intel control path: MSR and MMIO copies of the package power limit
//!
//! Both accessors resolve the unit scale from MSR 0x606 at the start of
//! every operation; exponents are not assumed stable across calls. Updates
//! are read-modify-write against a fresh read, never against cached state.

use tdpctl_raw::{mmio, msr, PackagePowerLimit, PowerUnit, RegisterLayout};

use crate::common::rwtool::RwTool;
use crate::error::Result;
use crate::limits::codec::{apply_update, decode, plan_dual_write, WritePlan};
use crate::limits::types::{PowerLimit, PowerLimitUpdate};

pub struct IntelPlatform {
    tool: RwTool,
}

impl IntelPlatform {
    pub fn new(tool: RwTool) -> Self {
        Self { tool }
    }

    pub fn from_env() -> Self {
        Self::new(RwTool::from_env())
    }

    /// Read the unit scale; called once per get/update, never cached
    fn units(&self) -> Result<PowerUnit> {
        let raw = self.tool.read_msr(msr::MSR_RAPL_POWER_UNIT)?;
        let units = PowerUnit::from_raw_value(raw);
        tracing::debug!(
            "units: power = 1/2^{}, time = 1/2^{}",
            units.power_exp,
            units.time_exp
        );
        Ok(units)
    }

    /// Base address of the MMIO register pair, discovered through MCHBAR
    fn mmio_base(&self) -> Result<u32> {
        let mchbar = self.tool.read_pci32(0, 0, 0, mmio::MCHBAR_PCI_OFFSET)?;
        let mchbar = mchbar - mchbar % 4; // align to 4
        Ok(mchbar + mmio::PKG_POWER_LIMIT_OFFSET)
    }

    /// Read the MMIO copy as two consecutive mapped dwords
    fn read_mmio_raw(&self, base: u32) -> Result<u64> {
        let low = self.tool.read_mem32(base)?;
        let high = self.tool.read_mem32(base + 4)?;
        Ok(PackagePowerLimit::join_halves(low, high))
    }

    pub fn msr_power_limit(&self) -> Result<PowerLimit> {
        let units = self.units()?;
        let raw = self.tool.read_msr(msr::MSR_PKG_POWER_LIMIT)?;
        Ok(decode(raw, &units))
    }

    pub fn mmio_power_limit(&self) -> Result<PowerLimit> {
        let units = self.units()?;
        let base = self.mmio_base()?;
        let raw = self.read_mmio_raw(base)?;
        Ok(decode(raw, &units))
    }

    /// Read-modify-write of the MSR copy
    ///
    /// A single 64-bit store, so there is no ordering concern; an update
    /// that leaves the value unchanged issues no write.
    pub fn update_msr_power_limit(&self, update: &PowerLimitUpdate) -> Result<()> {
        let units = self.units()?;
        let raw = self.tool.read_msr(msr::MSR_PKG_POWER_LIMIT)?;
        let new = apply_update(raw, &units, update);

        if new == raw {
            tracing::debug!("msr power limit already at {raw:#018x}, nothing to write");
            return Ok(());
        }

        tracing::info!("msr power limit: {raw:#018x} -> {new:#018x}");
        self.tool.write_msr(msr::MSR_PKG_POWER_LIMIT, new)
    }

    /// Read-modify-write of the MMIO copy
    ///
    /// The two 32-bit halves are written separately, in the order that keeps
    /// PL1 at or below the effective PL2 ceiling at every point in between.
    pub fn update_mmio_power_limit(&self, update: &PowerLimitUpdate) -> Result<()> {
        let units = self.units()?;
        let base = self.mmio_base()?;
        let raw = self.read_mmio_raw(base)?;
        let new = apply_update(raw, &units, update);

        let (low, high) = PackagePowerLimit::split_halves(new);
        match plan_dual_write(raw, new, &units) {
            WritePlan::Skip => {
                tracing::debug!("mmio power limit already at {raw:#018x}, nothing to write");
            }
            WritePlan::LowFirst => {
                tracing::info!("mmio power limit: {raw:#018x} -> {new:#018x} (low half first)");
                self.tool.write_mem32(base, low)?;
                self.tool.write_mem32(base + 4, high)?;
            }
            WritePlan::HighFirst => {
                tracing::info!("mmio power limit: {raw:#018x} -> {new:#018x} (high half first)");
                self.tool.write_mem32(base + 4, high)?;
                self.tool.write_mem32(base, low)?;
            }
        }
        Ok(())
    }
}
