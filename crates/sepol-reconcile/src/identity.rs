use std::fmt;

use crate::{PortRange, Protocol};

/// Protocol + port a port-policy request resolves to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PortTarget {
    pub protocol: Protocol,
    pub port: PortRange,
}

/// Neither the name nor the explicit fields describe a valid target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvalidPortTarget {
    pub name: String,
    pub protocol: Option<String>,
    pub port: Option<String>,
}

impl fmt::Display for InvalidPortTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invalid name \"{}\" format and protocol and port not provided or invalid: \"{}\" \"{}\".",
            self.name,
            self.protocol.as_deref().unwrap_or("None"),
            self.port.as_deref().unwrap_or("None"),
        )
    }
}

impl std::error::Error for InvalidPortTarget {}

fn parse_pair(protocol: &str, port: &str) -> Option<PortTarget> {
    Some(PortTarget {
        protocol: protocol.parse().ok()?,
        port: port.parse().ok()?,
    })
}

/// Resolve the protocol/port of a port-policy request.
///
/// Explicit `protocol` and `port` win when both are supplied; otherwise the
/// name is split as `protocol/port` (port may be a `low-high` range).
pub fn resolve_port_target(
    name: &str,
    protocol: Option<&str>,
    port: Option<&str>,
) -> Result<PortTarget, InvalidPortTarget> {
    let resolved = match (protocol, port) {
        (Some(proto), Some(p)) => parse_pair(proto, p),
        _ => name
            .split_once('/')
            .and_then(|(proto, p)| parse_pair(proto, p)),
    };

    resolved.ok_or_else(|| InvalidPortTarget {
        name: name.to_string(),
        protocol: protocol.map(str::to_string),
        port: port.map(str::to_string),
    })
}
