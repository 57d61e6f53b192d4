pub mod codec;
pub mod types;

pub use codec::{apply_update, decode, plan_dual_write, WritePlan};
pub use types::{Limit, PowerLimit, PowerLimitUpdate};
