//! Settings that are compiled when they are set.
//!
//! `etag`, `query parser` and `trust proxy` accept a handful of JSON shapes;
//! each is turned into a typed value at `set` time so a bad value fails early
//! and dispatch never has to re-parse it.

use {
    crate::{Error, Result},
    base64::{Engine, engine::general_purpose::STANDARD},
    serde_json::Value,
    sha2::{Digest, Sha256},
    std::{net::IpAddr, sync::Arc},
};

/// Renders a setting value the way it was most likely written.
fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ===========================================================================
// ETag
// ===========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EtagMode {
    Disabled,
    #[default]
    Weak,
    Strong,
}

impl EtagMode {
    pub fn compile(value: &Value) -> Result<Self> {
        match value {
            Value::Bool(true) => Ok(Self::Weak),
            Value::Bool(false) => Ok(Self::Disabled),
            Value::String(s) if s == "weak" => Ok(Self::Weak),
            Value::String(s) if s == "strong" => Ok(Self::Strong),
            other => Err(Error::config(format!(
                "unknown value for etag function: {}",
                display(other)
            ))),
        }
    }

    /// Entity tag for `body`: `"<len hex>-<hash>"`, prefixed with `W/` when weak.
    pub fn generate(&self, body: &[u8]) -> Option<String> {
        let prefix = match self {
            Self::Disabled => return None,
            Self::Weak => "W/",
            Self::Strong => "",
        };
        let digest = STANDARD.encode(Sha256::digest(body));
        Some(format!(
            "{prefix}\"{:x}-{}\"",
            body.len(),
            &digest[..27]
        ))
    }
}

// ===========================================================================
// Query parser
// ===========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryParser {
    /// Always yields an empty object.
    Disabled,
    /// Flat `key=value` pairs; repeated keys become arrays.
    Simple,
    /// Bracket notation (`a[b]=c`, `list[]=1`) building nested objects.
    #[default]
    Extended,
}

impl QueryParser {
    pub fn compile(value: &Value) -> Result<Self> {
        match value {
            Value::Bool(true) => Ok(Self::Simple),
            Value::Bool(false) => Ok(Self::Disabled),
            Value::String(s) if s == "simple" => Ok(Self::Simple),
            Value::String(s) if s == "extended" => Ok(Self::Extended),
            other => Err(Error::config(format!(
                "unknown value for query parser function: {}",
                display(other)
            ))),
        }
    }
}

// ===========================================================================
// Trust proxy
// ===========================================================================

/// An address range such as `10.0.0.0/8` or a single address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cidr {
    network: IpAddr,
    prefix: u8,
}

impl Cidr {
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = || Error::config(format!("invalid IP address: {s}"));
        let (addr, prefix) = match s.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (s, None),
        };
        let network = addr.parse::<IpAddr>().map_err(|_| invalid())?.to_canonical();
        let max = if network.is_ipv4() { 32 } else { 128 };
        let prefix = match prefix {
            Some(p) => p.parse::<u8>().ok().filter(|p| *p <= max).ok_or_else(invalid)?,
            None => max,
        };
        Ok(Self { network, prefix })
    }

    pub fn contains(&self, addr: &IpAddr) -> bool {
        match (self.network, addr.to_canonical()) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = u32::MAX.checked_shl(32 - u32::from(self.prefix)).unwrap_or(0);
                u32::from(net) & mask == u32::from(ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = u128::MAX.checked_shl(128 - u32::from(self.prefix)).unwrap_or(0);
                u128::from(net) & mask == u128::from(ip) & mask
            }
            _ => false,
        }
    }
}

fn preset(name: &str) -> Option<&'static [&'static str]> {
    match name {
        "loopback" => Some(&["127.0.0.1/8", "::1/128"]),
        "linklocal" => Some(&["169.254.0.0/16", "fe80::/10"]),
        "uniquelocal" => Some(&["10.0.0.0/8", "172.16.0.0/12", "192.168.0.0/16", "fc00::/7"]),
        _ => None,
    }
}

/// Which hops of a forwarded chain are trusted proxies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustProxy {
    /// Every hop is trusted.
    All,
    /// The first `n` hops (counting from the socket peer) are trusted.
    Hops(usize),
    /// Hops inside one of these ranges are trusted. Empty trusts nothing.
    Addresses(Arc<[Cidr]>),
}

impl Default for TrustProxy {
    fn default() -> Self {
        Self::Addresses(Arc::from(Vec::new()))
    }
}

impl TrustProxy {
    pub fn compile(value: &Value) -> Result<Self> {
        match value {
            Value::Bool(true) => Ok(Self::All),
            Value::Bool(false) | Value::Null => Ok(Self::default()),
            Value::Number(n) => n
                .as_u64()
                .and_then(|n| usize::try_from(n).ok())
                .map(Self::Hops)
                .ok_or_else(|| Error::config(format!("invalid hop count for trust proxy: {n}"))),
            Value::String(s) => Self::from_list(s.split(',').map(str::trim)),
            Value::Array(items) => {
                let names = items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => Ok(s.trim().to_string()),
                        other => Err(Error::config(format!("invalid IP address: {other}"))),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Self::from_list(names.iter().map(String::as_str))
            }
            Value::Object(_) => Err(Error::config(format!(
                "unknown value for trust proxy: {value}"
            ))),
        }
    }

    fn from_list<'a>(names: impl Iterator<Item = &'a str>) -> Result<Self> {
        let mut ranges = Vec::new();
        for name in names.filter(|n| !n.is_empty()) {
            match preset(name) {
                Some(list) => {
                    for cidr in list {
                        ranges.push(Cidr::parse(cidr)?);
                    }
                }
                None => ranges.push(Cidr::parse(name)?),
            }
        }
        Ok(Self::Addresses(ranges.into()))
    }

    /// Whether the hop at `index` (0 = socket peer) with address `addr` is trusted.
    pub fn trusts(&self, addr: &str, index: usize) -> bool {
        match self {
            Self::All => true,
            Self::Hops(n) => index < *n,
            Self::Addresses(ranges) => addr
                .parse::<IpAddr>()
                .is_ok_and(|ip| ranges.iter().any(|range| range.contains(&ip))),
        }
    }
}
