//! Loopback port values

use std::collections::BTreeSet;

/// A TCP port bound on the loopback interface, always in `1..=65535`
pub type Port = u16;

/// Unordered set of bound ports; kept sorted only so logs read consistently
pub type PortSet = BTreeSet<Port>;

/// Parse a decimal port number, rejecting 0 and out-of-range values
pub fn parse_port(text: &str) -> Option<Port> {
    match text.trim().parse::<u32>() {
        Ok(n) if (1..=u16::MAX as u32).contains(&n) => Some(n as Port),
        _ => None,
    }
}

/// Render a port set for log lines, e.g. `[100, 101]` or `none`
pub fn format_ports(ports: &PortSet) -> String {
    if ports.is_empty() {
        return "none".to_string();
    }
    let joined: Vec<String> = ports.iter().map(|p| p.to_string()).collect();
    format!("[{}]", joined.join(", "))
}
