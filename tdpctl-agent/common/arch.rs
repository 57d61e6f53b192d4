// CPU vendor detection, used to pick the Intel or AMD control path

use once_cell::sync::Lazy;

use crate::common::cpuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuVendor {
    Intel,
    Amd,
    Unknown,
}

impl CpuVendor {
    pub fn name(&self) -> &'static str {
        match self {
            CpuVendor::Intel => "Intel",
            CpuVendor::Amd => "AMD",
            CpuVendor::Unknown => "Unknown",
        }
    }
}

pub static CPU_VENDOR: Lazy<CpuVendor> = Lazy::new(detect_vendor);

fn detect_vendor() -> CpuVendor {
    let vendor = cpuid::vendor_string();
    tracing::debug!("CPUID vendor string: {vendor:?}");

    match vendor.as_str() {
        "GenuineIntel" => CpuVendor::Intel,
        "AuthenticAMD" => CpuVendor::Amd,
        _ => {
            tracing::warn!("Unrecognized CPU vendor {vendor:?}");
            CpuVendor::Unknown
        }
    }
}
