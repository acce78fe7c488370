//! WSL environment detection
//!
//! Inside WSL2 `localhost` resolves to the Linux VM, not to the Windows host
//! where Neo4j Desktop usually listens. The probe answers two questions:
//! are we nested, and what address reaches the host. Both are best-effort:
//! unreadable files, a missing `ip` binary or a hung subprocess all degrade
//! to "not nested" / "no address" and are only logged at debug level.

use async_trait::async_trait;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Hard limit for the route-discovery subprocess
pub const ROUTE_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Source of environment facts used by the address resolver
#[async_trait]
pub trait EnvironmentProbe: Send + Sync {
    /// Whether the process runs inside a nested Linux-on-Windows layer
    async fn is_nested(&self) -> bool;

    /// Address of the Windows host as seen from inside the layer
    async fn host_address(&self) -> Option<String>;
}

/// Probe backed by the real kernel descriptor, resolver config and `ip route`
#[derive(Debug, Clone)]
pub struct SystemProbe {
    version_path: PathBuf,
    resolv_conf_path: PathBuf,
    route_program: String,
    route_args: Vec<String>,
    route_timeout: Duration,
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self {
            version_path: PathBuf::from("/proc/version"),
            resolv_conf_path: PathBuf::from("/etc/resolv.conf"),
            route_program: "ip".to_string(),
            route_args: vec!["route".into(), "show".into(), "default".into()],
            route_timeout: ROUTE_COMMAND_TIMEOUT,
        }
    }
}

impl SystemProbe {
    /// Probe the standard system locations
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the kernel version descriptor from another path
    pub fn with_version_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.version_path = path.into();
        self
    }

    /// Read resolver configuration from another path
    pub fn with_resolv_conf_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.resolv_conf_path = path.into();
        self
    }

    /// Replace the route-discovery command
    pub fn with_route_command(mut self, program: impl Into<String>, args: &[&str]) -> Self {
        self.route_program = program.into();
        self.route_args = args.iter().map(|a| a.to_string()).collect();
        self
    }

    /// Replace the route-discovery timeout
    pub fn with_route_timeout(mut self, timeout: Duration) -> Self {
        self.route_timeout = timeout;
        self
    }

    async fn nameserver_address(&self) -> Option<String> {
        match tokio::fs::read_to_string(&self.resolv_conf_path).await {
            Ok(contents) => parse_nameserver(&contents),
            Err(e) => {
                debug!(
                    "Could not read {}: {}",
                    self.resolv_conf_path.display(),
                    e
                );
                None
            }
        }
    }

    async fn gateway_address(&self) -> Option<String> {
        let mut command = Command::new(&self.route_program);
        command
            .args(&self.route_args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.route_timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                debug!("Route command '{}' failed to run: {}", self.route_program, e);
                return None;
            }
            Err(_) => {
                debug!(
                    "Route command '{}' timed out after {:?}",
                    self.route_program, self.route_timeout
                );
                return None;
            }
        };

        if !output.status.success() {
            debug!(
                "Route command '{}' exited with {}",
                self.route_program, output.status
            );
            return None;
        }

        parse_default_gateway(&String::from_utf8_lossy(&output.stdout))
    }
}

#[async_trait]
impl EnvironmentProbe for SystemProbe {
    async fn is_nested(&self) -> bool {
        match tokio::fs::read_to_string(&self.version_path).await {
            Ok(contents) => is_wsl_kernel(&contents),
            Err(e) => {
                debug!("Could not read {}: {}", self.version_path.display(), e);
                false
            }
        }
    }

    async fn host_address(&self) -> Option<String> {
        if let Some(address) = self.nameserver_address().await {
            debug!("Host address from resolver config: {}", address);
            return Some(address);
        }

        let address = self.gateway_address().await;
        if let Some(address) = &address {
            debug!("Host address from default route: {}", address);
        }
        address
    }
}

/// Probe with fixed answers
#[derive(Debug, Clone, Default)]
pub struct StaticProbe {
    nested: bool,
    host: Option<String>,
}

impl StaticProbe {
    /// A probe reporting a plain, non-nested environment
    pub fn native() -> Self {
        Self::default()
    }

    /// A probe reporting WSL with the given host address
    pub fn nested(host: Option<&str>) -> Self {
        Self {
            nested: true,
            host: host.map(str::to_string),
        }
    }
}

#[async_trait]
impl EnvironmentProbe for StaticProbe {
    async fn is_nested(&self) -> bool {
        self.nested
    }

    async fn host_address(&self) -> Option<String> {
        self.host.clone()
    }
}

/// Whether a kernel version string carries a WSL fingerprint
pub fn is_wsl_kernel(version: &str) -> bool {
    let version = version.to_lowercase();
    version.contains("microsoft") || version.contains("wsl")
}

/// First plausible `nameserver` entry of a resolver configuration
pub fn parse_nameserver(contents: &str) -> Option<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with("nameserver"))
        .find_map(|line| line.split_whitespace().nth(1).and_then(plausible_address))
}

/// Gateway of the first `default via <addr>` line of `ip route` output
pub fn parse_default_gateway(output: &str) -> Option<String> {
    output
        .lines()
        .filter(|line| line.contains("default via"))
        .find_map(|line| line.split_whitespace().nth(2).and_then(plausible_address))
}

/// IPv4 only; the host is spliced into URIs as plain text
fn plausible_address(token: &str) -> Option<String> {
    token.parse::<Ipv4Addr>().ok().map(|addr| addr.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn file_with(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_wsl_kernel_fingerprints() {
        assert!(is_wsl_kernel(
            "Linux version 5.15.153.1-microsoft-standard-WSL2 (root@941d701f84f1)"
        ));
        assert!(is_wsl_kernel("Linux version 4.4.0-19041-Microsoft"));
        assert!(!is_wsl_kernel("Linux version 6.5.0-35-generic (buildd@lcy02-amd64-079)"));
    }

    #[test]
    fn test_parse_nameserver() {
        let conf = "# This file was automatically generated by WSL.\n\
                    # [network]\n\
                    nameserver 172.19.0.1\n\
                    nameserver 8.8.8.8\n";
        assert_eq!(parse_nameserver(conf), Some("172.19.0.1".to_string()));
        assert_eq!(parse_nameserver("search lan\n"), None);
        assert_eq!(parse_nameserver("nameserver\n"), None);
        assert_eq!(parse_nameserver("nameserver not-an-ip\n"), None);
    }

    #[test]
    fn test_parse_default_gateway() {
        let output = "default via 172.19.0.1 dev eth0 proto kernel\n\
                      172.19.0.0/20 dev eth0 proto kernel scope link src 172.19.5.2\n";
        assert_eq!(
            parse_default_gateway(output),
            Some("172.19.0.1".to_string())
        );
        assert_eq!(parse_default_gateway(""), None);
        assert_eq!(parse_default_gateway("default via\n"), None);
    }

    #[test]
    fn test_ipv6_entries_are_skipped() {
        assert_eq!(parse_nameserver("nameserver fe80::1%eth0\n"), None);
        assert_eq!(parse_nameserver("nameserver ::1\n"), None);
        assert_eq!(
            parse_nameserver("nameserver fe80::1%eth0\nnameserver 172.28.80.1\n"),
            Some("172.28.80.1".to_string())
        );
        assert_eq!(
            parse_default_gateway("default via fe80::1 dev eth0\ndefault via 172.19.0.1 dev eth0\n"),
            Some("172.19.0.1".to_string())
        );
    }

    #[tokio::test]
    async fn test_system_probe_reads_files() {
        let version = file_with("Linux version 5.15.90.1-microsoft-standard-WSL2\n");
        let resolv = file_with("nameserver 172.28.80.1\n");

        let probe = SystemProbe::new()
            .with_version_path(version.path())
            .with_resolv_conf_path(resolv.path());

        assert!(probe.is_nested().await);
        assert_eq!(probe.host_address().await, Some("172.28.80.1".to_string()));
    }

    #[tokio::test]
    async fn test_system_probe_missing_files_degrade() {
        let probe = SystemProbe::new()
            .with_version_path("/nonexistent/proc/version")
            .with_resolv_conf_path("/nonexistent/resolv.conf")
            .with_route_command("/nonexistent/bin/ip", &["route"]);

        assert!(!probe.is_nested().await);
        assert_eq!(probe.host_address().await, None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_route_fallback_parses_command_output() {
        let probe = SystemProbe::new()
            .with_resolv_conf_path("/nonexistent/resolv.conf")
            .with_route_command("echo", &["default via 10.0.0.1 dev eth0"]);

        assert_eq!(probe.host_address().await, Some("10.0.0.1".to_string()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_route_command_timeout_is_absence() {
        let probe = SystemProbe::new()
            .with_resolv_conf_path("/nonexistent/resolv.conf")
            .with_route_command("sleep", &["10"])
            .with_route_timeout(Duration::from_millis(100));

        let started = std::time::Instant::now();
        assert_eq!(probe.host_address().await, None);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_static_probe() {
        assert!(!StaticProbe::native().is_nested().await);
        let probe = StaticProbe::nested(Some("172.19.0.1"));
        assert!(probe.is_nested().await);
        assert_eq!(probe.host_address().await.as_deref(), Some("172.19.0.1"));
    }
}
