//! Startup configuration (§6 External interfaces).
//!
//! No config file or CLI flag parser: the two environment variables below
//! are the entire surface, read once at process start.

const DEFAULT_SERVER: &str = "http://127.0.0.1:8080";

#[derive(Debug, Clone)]
pub struct Config {
    /// Ingest server base URL. Endpoints are appended by `sender`/`main`.
    pub server: String,
    /// Hostname reported in every envelope; defaults to the OS hostname.
    pub hostname: String,
}

impl Config {
    pub fn from_env() -> Self {
        let server = std::env::var("SPECTRA_SERVER").unwrap_or_else(|_| DEFAULT_SERVER.to_string());
        let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| os_hostname());
        Self { server, hostname }
    }
}

#[cfg(target_os = "linux")]
fn os_hostname() -> String {
    std::fs::read_to_string("/proc/sys/kernel/hostname")
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|_| "unknown".into())
}

#[cfg(target_os = "freebsd")]
fn os_hostname() -> String {
    std::process::Command::new("hostname")
        .output()
        .ok()
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
        .unwrap_or_else(|| "unknown".into())
}

#[cfg(windows)]
fn os_hostname() -> String {
    std::env::var("COMPUTERNAME").unwrap_or_else(|_| "unknown".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_server_is_localhost() {
        assert_eq!(DEFAULT_SERVER, "http://127.0.0.1:8080");
    }

    #[test]
    fn os_hostname_is_never_empty() {
        assert!(!os_hostname().is_empty());
    }
}
