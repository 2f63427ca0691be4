//! OS process control
//!
//! Windows is the production platform (`taskkill`, `tasklist`, `icacls`);
//! the Unix branches exist so the harness can be developed and tested against
//! the mock application.

use std::path::Path;

use crate::common::{Error, Result};

/// `taskkill` exit code when no process matched
#[cfg(windows)]
const TASKKILL_NOT_FOUND: i32 = 128;

/// `pkill` exit code when no process matched
#[cfg(not(windows))]
const PKILL_NOT_FOUND: i32 = 1;

/// A program invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Run the command and capture its output
    pub async fn output(&self) -> Result<std::process::Output> {
        tokio::process::Command::new(&self.program)
            .args(&self.args)
            .stdin(std::process::Stdio::null())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::ToolNotFound(self.program.clone())
                } else {
                    Error::tool_failed(&self.program, e.to_string())
                }
            })
    }
}

/// Command that force-kills every process with the given image name
pub fn kill_by_name_command(name: &str) -> ToolCommand {
    if cfg!(windows) {
        ToolCommand::new("taskkill", &["/F", "/T", "/IM", name])
    } else {
        ToolCommand::new("pkill", &["-9", "-x", name])
    }
}

/// Command that force-kills a process and its children
pub fn kill_tree_command(pid: u32) -> ToolCommand {
    let pid = pid.to_string();
    if cfg!(windows) {
        ToolCommand::new("taskkill", &["/F", "/T", "/PID", &pid])
    } else {
        ToolCommand::new("kill", &["-9", &pid])
    }
}

/// Command that lists a single process as CSV (Windows only)
pub fn tasklist_command(pid: u32) -> ToolCommand {
    let filter = format!("PID eq {}", pid);
    ToolCommand::new("tasklist", &["/FI", &filter, "/FO", "CSV", "/NH"])
}

/// Command granting everyone full control over a directory tree
///
/// Uses the well-known SID for "Everyone" so it works on localized Windows.
pub fn grant_access_command(path: &Path) -> Option<ToolCommand> {
    if cfg!(windows) {
        let path = path.display().to_string();
        Some(ToolCommand::new(
            "icacls",
            &[&path, "/grant", "*S-1-1-0:(OI)(CI)F", "/T", "/C", "/Q"],
        ))
    } else {
        None
    }
}

fn not_found_code(code: Option<i32>) -> bool {
    #[cfg(windows)]
    {
        code == Some(TASKKILL_NOT_FOUND)
    }
    #[cfg(not(windows))]
    {
        code == Some(PKILL_NOT_FOUND)
    }
}

/// Kill all instances of `name`; returns whether anything was killed
pub async fn kill_by_name(name: &str) -> Result<bool> {
    let cmd = kill_by_name_command(name);
    let output = cmd.output().await?;
    if output.status.success() {
        tracing::info!("Killed running instances of {}", name);
        return Ok(true);
    }
    if not_found_code(output.status.code()) {
        tracing::debug!("No running instances of {}", name);
        return Ok(false);
    }
    Err(Error::tool_failed(
        &cmd.program,
        String::from_utf8_lossy(&output.stderr).trim().to_string(),
    ))
}

/// Kill a process and its children
pub async fn kill_tree(pid: u32) -> Result<()> {
    let cmd = kill_tree_command(pid);
    let output = cmd.output().await?;
    if !output.status.success() && is_alive(pid).await {
        return Err(Error::tool_failed(
            &cmd.program,
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }
    Ok(())
}

/// Check whether a process exists
#[cfg(unix)]
pub async fn is_alive(pid: u32) -> bool {
    // Signal 0 tests process existence without side effects
    unsafe { libc::kill(pid as i32, 0) == 0 }
}

#[cfg(not(unix))]
pub async fn is_alive(pid: u32) -> bool {
    match tasklist_command(pid).output().await {
        Ok(output) => String::from_utf8_lossy(&output.stdout)
            .lines()
            .any(|line| tasklist_pid(line) == Some(pid)),
        Err(_) => false,
    }
}

/// Grant full access to a directory tree (no-op outside Windows)
pub async fn grant_full_access(path: &Path) -> Result<()> {
    let Some(cmd) = grant_access_command(path) else {
        return Ok(());
    };
    let output = cmd.output().await?;
    if !output.status.success() {
        return Err(Error::tool_failed(
            &cmd.program,
            String::from_utf8_lossy(&output.stdout).trim().to_string(),
        ));
    }
    Ok(())
}

fn csv_fields(line: &str) -> Vec<&str> {
    let trimmed = line.trim();
    let inner = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed);
    inner.split("\",\"").collect()
}

/// PID column of a `tasklist /FO CSV` row
pub fn tasklist_pid(line: &str) -> Option<u32> {
    csv_fields(line).get(1)?.trim().parse().ok()
}

/// Memory column of a `tasklist /FO CSV` row, in KiB
///
/// The column is localized (`1,234,567 K`, `1.234.567 K`), so only the
/// digits are kept.
pub fn tasklist_memory_kib(line: &str) -> Option<u64> {
    let fields = csv_fields(line);
    let memory = fields.get(4)?;
    let digits: String = memory.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tasklist_parsing() {
        let line = "\"kit.exe\",\"4242\",\"Console\",\"1\",\"1,234,567 K\"";
        assert_eq!(tasklist_pid(line), Some(4242));
        assert_eq!(tasklist_memory_kib(line), Some(1_234_567));

        let german = "\"kit.exe\",\"7\",\"Console\",\"1\",\"12.345 K\"";
        assert_eq!(tasklist_memory_kib(german), Some(12_345));

        assert_eq!(tasklist_pid("INFO: No tasks are running which match the specified criteria."), None);
    }

    #[test]
    fn test_command_construction() {
        let kill = kill_tree_command(99);
        assert!(kill.args.contains(&"99".to_string()));

        let by_name = kill_by_name_command("kit.exe");
        assert_eq!(by_name.args.last().map(String::as_str), Some("kit.exe"));

        let list = tasklist_command(12);
        assert_eq!(list.program, "tasklist");
        assert!(list.args.contains(&"PID eq 12".to_string()));

        #[cfg(windows)]
        assert!(grant_access_command(Path::new("C:/apps")).is_some());
        #[cfg(not(windows))]
        assert!(grant_access_command(Path::new("/opt/apps")).is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_is_alive_and_kill_tree() {
        let mut child = tokio::process::Command::new("sleep")
            .arg("30")
            .spawn()
            .unwrap();
        let pid = child.id().unwrap();
        assert!(is_alive(pid).await);

        kill_tree(pid).await.unwrap();
        let status = child.wait().await.unwrap();
        assert!(!status.success());
    }

    #[tokio::test]
    async fn test_grant_full_access_is_noop_off_windows() {
        if cfg!(windows) {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        grant_full_access(dir.path()).await.unwrap();
    }
}
