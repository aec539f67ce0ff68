//! Listening-socket discovery
//!
//! Reads the `ss -tlnp` socket table and keeps loopback listeners owned by
//! the monitored process.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tokio::process::Command;

use crate::core::error::ProbeError;
use crate::core::types::{parse_port, PortSet};

fn loopback_listener() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?:127\.0\.0\.1|\[::1\]|\[::ffff:127\.0\.0\.1\]):(\d+)\s")
            .expect("loopback listener pattern is valid")
    })
}

/// Extract loopback ports owned by `process_name` from `ss -tlnp` output.
///
/// `ss` prints owners as `users:(("name",pid=..,fd=..))`; requiring the
/// leading quote keeps `language_server` from matching e.g. `my_language_server`.
pub fn parse_listening_ports(output: &str, process_name: &str) -> PortSet {
    let owner = format!("\"{}", process_name);
    output
        .lines()
        .filter(|line| line.contains(&owner))
        .filter_map(|line| loopback_listener().captures(line))
        .filter_map(|caps| caps.get(1).and_then(|m| parse_port(m.as_str())))
        .collect()
}

/// Query the socket table for ports bound by `process_name`
pub async fn query_listening_ports(
    process_name: &str,
    timeout: Duration,
) -> Result<PortSet, ProbeError> {
    let output = tokio::time::timeout(timeout, Command::new("ss").arg("-tlnp").output())
        .await
        .map_err(|_| ProbeError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        })?
        .map_err(|e| ProbeError::SocketQueryFailed {
            reason: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(ProbeError::SocketQueryFailed {
            reason: format!(
                "ss exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }

    Ok(parse_listening_ports(
        &String::from_utf8_lossy(&output.stdout),
        process_name,
    ))
}
