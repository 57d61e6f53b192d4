pub mod arch;
pub mod cpuid;
pub mod rwtool;

pub use arch::{CpuVendor, CPU_VENDOR};
pub use rwtool::{HelperCommand, RwTool};
