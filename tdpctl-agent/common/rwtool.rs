//! RW-Everything access port
//!
//! All register traffic goes through a privileged external helper: one
//! process spawn per primitive operation, a single command line in, a fixed
//! textual reply out. This module is the only place that deals with process
//! timing and reply formats; callers see "returns an integer or fails".

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crate::error::{Result, TdpctlError};

/// Environment variable overriding the helper executable path
pub const RW_PATH_ENV: &str = "TDPCTL_RW_EVERYTHING_PATH";

/// Helper path used when the environment does not override it
pub const DEFAULT_RW_PATH: &str = r"C:\Program Files\RW-Everything\RW.exe";

const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(5);
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// One primitive operation against the helper
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelperCommand {
    ReadMsr {
        addr: u32,
    },
    WriteMsr {
        addr: u32,
        high: u32,
        low: u32,
    },
    ReadPci32 {
        bus: u8,
        device: u8,
        function: u8,
        offset: u32,
    },
    ReadMem32 {
        addr: u32,
    },
    WriteMem32 {
        addr: u32,
        value: u32,
    },
}

/// Format a register address or offset: `0x` plus at least 3 uppercase hex digits
fn format_loc(loc: u32) -> String {
    format!("0x{loc:03X}")
}

/// Format a bus/device/function component: `0x` plus at least 2 uppercase hex digits
fn format_bdf(n: u8) -> String {
    format!("0x{n:02X}")
}

impl HelperCommand {
    /// The space-joined command line fed to the helper
    pub fn command_line(&self) -> String {
        match *self {
            HelperCommand::ReadMsr { addr } => format!("RDMSR {}", format_loc(addr)),
            HelperCommand::WriteMsr { addr, high, low } => {
                format!("WRMSR {} 0x{high:X} 0x{low:X}", format_loc(addr))
            }
            HelperCommand::ReadPci32 {
                bus,
                device,
                function,
                offset,
            } => format!(
                "RPCI32 {} {} {} {}",
                format_bdf(bus),
                format_bdf(device),
                format_bdf(function),
                format_loc(offset)
            ),
            HelperCommand::ReadMem32 { addr } => format!("R32 {}", format_loc(addr)),
            HelperCommand::WriteMem32 { addr, value } => {
                format!("W32 {} 0x{value:X}", format_loc(addr))
            }
        }
    }

    /// Parse the helper's reply into the primitive's result value
    ///
    /// Reads return the register content; writes return 0 once the reply
    /// carries the expected acknowledgement prefix.
    pub fn parse_reply(&self, output: &str) -> Result<u64> {
        let parsed = match *self {
            HelperCommand::ReadMsr { addr } => parse_read_msr(&format_loc(addr), output),
            HelperCommand::WriteMsr { addr, .. } => output
                .starts_with(&format!("Write MSR {}", format_loc(addr)))
                .then_some(0),
            HelperCommand::ReadPci32 {
                bus,
                device,
                function,
                offset,
            } => {
                let prefix = format!(
                    "Read PCI Bus/Dev/Fun/Offset {}/{}/{}/{} = ",
                    format_bdf(bus),
                    format_bdf(device),
                    format_bdf(function),
                    format_loc(offset)
                );
                parse_single_value(&prefix, output)
            }
            HelperCommand::ReadMem32 { addr } => {
                let prefix = format!("Read Memory Address {} = ", format_loc(addr));
                parse_single_value(&prefix, output)
            }
            HelperCommand::WriteMem32 { addr, .. } => output
                .starts_with(&format!("Write Memory Address {}", format_loc(addr)))
                .then_some(0),
        };

        parsed.ok_or_else(|| TdpctlError::Protocol {
            command: self.command_line(),
            output: output.to_string(),
        })
    }
}

/// Parse a `0x`-prefixed hex value
fn parse_hex(s: &str) -> Option<u64> {
    let digits = s.strip_prefix("0x")?;
    u64::from_str_radix(digits, 16).ok()
}

/// Parse `Read MSR <loc>: High 32bit(EDX) = 0x..., Low 32bit(EAX) = 0x...`
fn parse_read_msr(location: &str, output: &str) -> Option<u64> {
    let high_prefix = format!("Read MSR {location}: High 32bit(EDX) = ");
    let rest = output.strip_prefix(high_prefix.as_str())?;

    let (high_str, rest) = rest.split_once(',')?;
    let high = parse_hex(high_str)?;

    let rest = rest.strip_prefix(" Low 32bit(EAX) = ")?;
    let low_str = rest.lines().next().unwrap_or(rest).trim();
    let low = parse_hex(low_str)?;

    Some((high << 32) | low)
}

/// Parse a `<prefix>0x...` single-value reply
fn parse_single_value(prefix: &str, output: &str) -> Option<u64> {
    let rest = output.strip_prefix(prefix)?;
    let value_str = rest.lines().next().unwrap_or(rest).trim();
    parse_hex(value_str)
}

/// Handle on the helper executable
pub struct RwTool {
    program: PathBuf,
    timeout: Duration,
}

impl RwTool {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }

    /// Resolve the helper path from the environment, falling back to the default
    pub fn from_env() -> Self {
        let program = std::env::var(RW_PATH_ENV).unwrap_or_else(|_| DEFAULT_RW_PATH.to_string());
        Self::new(program)
    }

    /// Override the exit wait bound (tests use a short one)
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn read_msr(&self, addr: u32) -> Result<u64> {
        self.execute(&HelperCommand::ReadMsr { addr })
    }

    pub fn write_msr(&self, addr: u32, value: u64) -> Result<()> {
        self.execute(&HelperCommand::WriteMsr {
            addr,
            high: (value >> 32) as u32,
            low: value as u32,
        })
        .map(|_| ())
    }

    pub fn read_pci32(&self, bus: u8, device: u8, function: u8, offset: u32) -> Result<u32> {
        self.execute(&HelperCommand::ReadPci32 {
            bus,
            device,
            function,
            offset,
        })
        .map(|v| v as u32)
    }

    pub fn read_mem32(&self, addr: u32) -> Result<u32> {
        self.execute(&HelperCommand::ReadMem32 { addr })
            .map(|v| v as u32)
    }

    pub fn write_mem32(&self, addr: u32, value: u32) -> Result<()> {
        self.execute(&HelperCommand::WriteMem32 { addr, value })
            .map(|_| ())
    }

    /// Run one primitive: spawn, bounded wait, parse
    pub fn execute(&self, command: &HelperCommand) -> Result<u64> {
        let line = command.command_line();
        let output = self.run_helper(&line)?;
        tracing::debug!("helper output for `{line}`: {}", output.trim_end());
        let value = command.parse_reply(&output)?;
        Ok(value)
    }

    /// Spawn the helper with one command and collect its stdout
    fn run_helper(&self, line: &str) -> Result<String> {
        let args = vec![
            "/Min".to_string(),
            "/Nologo".to_string(),
            "/Stdout".to_string(),
            format!("/Command={line}"),
        ];
        run_to_completion(&self.program, &args, self.timeout)
    }
}

/// Spawn a process, bound the wait, and collect its stdout
///
/// The child and its stdout pipe are released on every exit path: on timeout
/// or a failed wait the child is killed and reaped before returning.
pub(crate) fn run_to_completion(
    program: &Path,
    args: &[String],
    timeout: Duration,
) -> Result<String> {
    let command_line = std::iter::once(program.display().to_string())
        .chain(args.iter().cloned())
        .collect::<Vec<_>>()
        .join(" ");
    tracing::debug!("execute: {command_line}");

    let execution_error = |reason: String| TdpctlError::Execution {
        command: command_line.clone(),
        reason,
    };

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| execution_error(format!("spawn failed: {e}")))?;

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(execution_error("timeout".to_string()));
                }
                std::thread::sleep(WAIT_POLL_INTERVAL);
            }
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(execution_error(format!("wait failed: {e}")));
            }
        }
    };

    let mut output = String::new();
    if let Some(mut stdout) = child.stdout.take() {
        stdout
            .read_to_string(&mut output)
            .map_err(|e| execution_error(format!("failed to retrieve output: {e}")))?;
    }

    if !status.success() {
        return Err(execution_error(format!(
            "exit code: {}, output: {output}",
            status
                .code()
                .map_or_else(|| "none".to_string(), |c| c.to_string())
        )));
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_formatting() {
        assert_eq!(
            HelperCommand::ReadMsr { addr: 0x610 }.command_line(),
            "RDMSR 0x610"
        );
        assert_eq!(
            HelperCommand::ReadMsr { addr: 0x48 }.command_line(),
            "RDMSR 0x048"
        );
        assert_eq!(
            HelperCommand::WriteMsr {
                addr: 0x610,
                high: 0xDF,
                low: 0x42_8320
            }
            .command_line(),
            "WRMSR 0x610 0xDF 0x428320"
        );
        assert_eq!(
            HelperCommand::ReadPci32 {
                bus: 0,
                device: 0,
                function: 0,
                offset: 0x48
            }
            .command_line(),
            "RPCI32 0x00 0x00 0x00 0x048"
        );
        assert_eq!(
            HelperCommand::ReadMem32 { addr: 0xFED1_59A0 }.command_line(),
            "R32 0xFED159A0"
        );
        assert_eq!(
            HelperCommand::WriteMem32 {
                addr: 0xFED1_59A4,
                value: 0x42_8328
            }
            .command_line(),
            "W32 0xFED159A4 0x428328"
        );
    }

    #[test]
    fn test_parse_read_msr_reply() {
        let cmd = HelperCommand::ReadMsr { addr: 0x610 };
        let reply = "Read MSR 0x610: High 32bit(EDX) = 0x428328, Low 32bit(EAX) = 0x428320\r\n";
        assert_eq!(cmd.parse_reply(reply).unwrap(), 0x0042_8328_0042_8320);
    }

    #[test]
    fn test_parse_read_msr_missing_prefix() {
        let cmd = HelperCommand::ReadMsr { addr: 0x610 };
        let err = cmd.parse_reply("RW-Everything needs elevation\n").unwrap_err();
        assert!(matches!(err, TdpctlError::Protocol { .. }), "got {err:?}");
    }

    #[test]
    fn test_parse_read_msr_bad_hex() {
        let cmd = HelperCommand::ReadMsr { addr: 0x610 };
        let reply = "Read MSR 0x610: High 32bit(EDX) = 0xZZ, Low 32bit(EAX) = 0x0\n";
        assert!(cmd.parse_reply(reply).is_err());
        let reply = "Read MSR 0x610: High 32bit(EDX) = 0x0, Low 32bit(EAX) = 428320\n";
        assert!(cmd.parse_reply(reply).is_err());
    }

    #[test]
    fn test_parse_read_pci32_reply() {
        let cmd = HelperCommand::ReadPci32 {
            bus: 0,
            device: 0,
            function: 0,
            offset: 0x48,
        };
        let reply = "Read PCI Bus/Dev/Fun/Offset 0x00/0x00/0x00/0x048 = 0xFED10001\n";
        assert_eq!(cmd.parse_reply(reply).unwrap(), 0xFED1_0001);
    }

    #[test]
    fn test_parse_read_mem32_reply() {
        let cmd = HelperCommand::ReadMem32 { addr: 0xFED1_59A0 };
        let reply = "Read Memory Address 0xFED159A0 = 0x428320\r\n";
        assert_eq!(cmd.parse_reply(reply).unwrap(), 0x42_8320);
    }

    #[test]
    fn test_parse_write_acknowledgements() {
        let cmd = HelperCommand::WriteMsr {
            addr: 0x610,
            high: 0,
            low: 0,
        };
        assert!(cmd.parse_reply("Write MSR 0x610\n").is_ok());
        assert!(cmd.parse_reply("Access denied\n").is_err());

        let cmd = HelperCommand::WriteMem32 {
            addr: 0xFED1_59A0,
            value: 0,
        };
        assert!(cmd.parse_reply("Write Memory Address 0xFED159A0 = 0x0\n").is_ok());
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use std::io::Write;
        use std::os::unix::fs::PermissionsExt;
        use std::path::Path;

        fn fake_helper(name: &str, body: &str) -> PathBuf {
            let path = std::env::temp_dir().join(format!("tdpctl-fake-{name}-{}", std::process::id()));
            write_script(&path, body);
            path
        }

        fn write_script(path: &Path, body: &str) {
            let mut file = std::fs::File::create(path).unwrap();
            writeln!(file, "#!/bin/sh\n{body}").unwrap();
            let mut perms = file.metadata().unwrap().permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(path, perms).unwrap();
        }

        #[test]
        fn test_successful_round_trip() {
            let script = fake_helper(
                "ok",
                r#"echo "Read MSR 0x610: High 32bit(EDX) = 0xDF, Low 32bit(EAX) = 0x428320""#,
            );
            let tool = RwTool::new(&script);
            let value = tool.read_msr(0x610).unwrap();
            assert_eq!(value, 0x0000_00DF_0042_8320);
            std::fs::remove_file(script).unwrap();
        }

        #[test]
        fn test_nonzero_exit_is_execution_error() {
            let script = fake_helper("fail", "echo nope\nexit 3");
            let tool = RwTool::new(&script);
            let err = tool.read_msr(0x610).unwrap_err();
            match err {
                TdpctlError::Execution { reason, .. } => {
                    assert!(reason.contains("exit code: 3"), "reason: {reason}")
                }
                other => panic!("expected Execution, got {other:?}"),
            }
            std::fs::remove_file(script).unwrap();
        }

        #[test]
        fn test_hung_helper_times_out() {
            let script = fake_helper("hang", "sleep 10");
            let tool = RwTool::new(&script).with_timeout(Duration::from_millis(100));
            let err = tool.read_msr(0x610).unwrap_err();
            match err {
                TdpctlError::Execution { reason, .. } => {
                    assert!(reason.contains("timeout"), "reason: {reason}")
                }
                other => panic!("expected Execution, got {other:?}"),
            }
            std::fs::remove_file(script).unwrap();
        }

        #[test]
        fn test_missing_helper_is_execution_error() {
            let tool = RwTool::new("/nonexistent/tdpctl-helper");
            assert!(matches!(
                tool.read_msr(0x610),
                Err(TdpctlError::Execution { .. })
            ));
        }
    }
}
