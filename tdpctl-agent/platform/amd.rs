//! AMD control path, delegated to the `ryzenadj` vendor tool
//!
//! No register layout is specified for AMD; this path only satisfies the
//! vendor-agnostic platform contract by translating watt requests into the
//! tool's milliwatt limit flags. Retrieval is not implemented.

use std::path::PathBuf;
use std::time::Duration;

use crate::common::rwtool::run_to_completion;
use crate::error::{Result, TdpctlError};
use crate::limits::types::{PowerLimit, PowerLimitUpdate};

/// Environment variable overriding the ryzenadj executable path
pub const RYZENADJ_PATH_ENV: &str = "TDPCTL_RYZENADJ_PATH";

/// There is no well-known install location; an empty default forces the
/// environment variable to be set before the first spawn can succeed.
pub const DEFAULT_RYZENADJ_PATH: &str = "";

const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct AmdPlatform {
    program: PathBuf,
}

impl AmdPlatform {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn from_env() -> Self {
        let program =
            std::env::var(RYZENADJ_PATH_ENV).unwrap_or_else(|_| DEFAULT_RYZENADJ_PATH.to_string());
        Self::new(program)
    }

    pub fn power_limit(&self) -> Result<PowerLimit> {
        Err(TdpctlError::Unsupported(
            "retrieving the power limit is not implemented on the amd platform".to_string(),
        ))
    }

    pub fn update_power_limit(&self, update: &PowerLimitUpdate) -> Result<()> {
        let args = ryzenadj_args(update);
        if args.is_empty() {
            tracing::debug!("no fields ryzenadj can apply, nothing to do");
            return Ok(());
        }

        let output = run_to_completion(&self.program, &args, WAIT_TIMEOUT)?;
        tracing::debug!("ryzenadj output: {}", output.trim_end());
        Ok(())
    }
}

/// Translate the update into ryzenadj flags (watts to milliwatts)
///
/// PL1 maps to the sustained and slow limits, PL2 to the fast limit. The
/// clamping/enable bits have no ryzenadj counterpart and are skipped with a
/// warning.
fn ryzenadj_args(update: &PowerLimitUpdate) -> Vec<String> {
    let mut args = Vec::new();

    if let Some(watts) = update.pl1.power {
        let mw = watts * 1000;
        args.push(format!("--stapm-limit={mw}"));
        args.push(format!("--slow-limit={mw}"));
    }
    if let Some(watts) = update.pl2.power {
        args.push(format!("--fast-limit={}", watts * 1000));
    }

    if update.pl1.clamping.is_some() || update.pl2.clamping.is_some() {
        tracing::warn!("clamping flags have no amd equivalent, skipping");
    }
    if update.pl1.time.is_some() {
        tracing::warn!("pl1 time window has no amd equivalent, skipping");
    }
    if update.pl2.enabled.is_some() {
        tracing::warn!("pl2 enable flag has no amd equivalent, skipping");
    }

    args
}
