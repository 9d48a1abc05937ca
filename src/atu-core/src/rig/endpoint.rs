// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::fmt;

/// Default rigctld TCP port.
pub const DEFAULT_RIGCTLD_PORT: u16 = 4532;

/// Address of a rig daemon.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RigEndpoint {
    pub host: String,
    pub port: u16,
}

impl RigEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn connect_addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Parse `host`, `host:port`, `[v6]` or `[v6]:port`, optionally prefixed
    /// with `tcp://`. The port defaults to 4532.
    pub fn parse(value: &str) -> Result<Self, String> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err("rig address is empty".into());
        }
        let addr = trimmed.strip_prefix("tcp://").unwrap_or(trimmed);

        if let Some(rest) = addr.strip_prefix('[') {
            let closing = rest
                .find(']')
                .ok_or("invalid rig address: missing closing ']' for IPv6 host")?;
            let host = &rest[..closing];
            if host.is_empty() {
                return Err("invalid rig address: host is empty".into());
            }
            let port = match &rest[closing + 1..] {
                "" => DEFAULT_RIGCTLD_PORT,
                remainder => match remainder.strip_prefix(':') {
                    Some(port) => parse_port(port)?,
                    None => return Err("invalid rig address: expected ':<port>' after ']'".into()),
                },
            };
            return Ok(Self::new(host, port));
        }

        match addr.matches(':').count() {
            0 => Ok(Self::new(addr, DEFAULT_RIGCTLD_PORT)),
            1 => {
                let (host, port) = addr
                    .split_once(':')
                    .ok_or("invalid rig address: expected host:port")?;
                if host.is_empty() {
                    return Err("invalid rig address: host is empty".into());
                }
                Ok(Self::new(host, parse_port(port)?))
            }
            _ => Err("invalid rig address: IPv6 host must be bracketed like [::1]:4532".into()),
        }
    }
}

impl Default for RigEndpoint {
    fn default() -> Self {
        Self::new("127.0.0.1", DEFAULT_RIGCTLD_PORT)
    }
}

impl fmt::Display for RigEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.connect_addr())
    }
}

fn parse_port(port: &str) -> Result<u16, String> {
    match port.parse::<u16>() {
        Ok(0) => Err("invalid rig port: 0".into()),
        Ok(port) => Ok(port),
        Err(_) => Err(format!("invalid rig port: '{port}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_only_uses_rigctld_port() {
        assert_eq!(
            RigEndpoint::parse("radio.local").expect("must parse"),
            RigEndpoint::new("radio.local", 4532)
        );
    }

    #[test]
    fn explicit_port_and_scheme() {
        let endpoint = RigEndpoint::parse("tcp://127.0.0.1:4533").expect("must parse");
        assert_eq!(endpoint, RigEndpoint::new("127.0.0.1", 4533));
        assert_eq!(endpoint.connect_addr(), "127.0.0.1:4533");
    }

    #[test]
    fn bracketed_ipv6() {
        let endpoint = RigEndpoint::parse("[::1]:7000").expect("must parse");
        assert_eq!(endpoint, RigEndpoint::new("::1", 7000));
        assert_eq!(endpoint.connect_addr(), "[::1]:7000");
    }

    #[test]
    fn rejects_bad_input() {
        assert!(RigEndpoint::parse("").is_err());
        assert!(RigEndpoint::parse("::1:4532").is_err());
        assert!(RigEndpoint::parse("host:0").is_err());
        assert!(RigEndpoint::parse("host:port").is_err());
        assert!(RigEndpoint::parse("[::1]x").is_err());
    }
}
