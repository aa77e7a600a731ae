//! Server configuration.
//!
//! Recognized options: listen address, transport (stream-oriented TCP
//! only), maximum section size and the context pool's idle cap. Configs can
//! be built in code or loaded from JSON:
//!
//! ```
//! use framewire::config::{ServerConfig, Transport};
//!
//! let config = ServerConfig::from_json_str(r#"{"addr": "8080", "transport": "tcp4"}"#).unwrap();
//! assert_eq!(config.transport, Transport::Tcp4);
//! assert_eq!(config.listen_addr(), "0.0.0.0:8080");
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{FramewireError, Result};
use crate::handler::DEFAULT_POOL_MAX_IDLE;
use crate::protocol::{ABSOLUTE_MAX_SECTION_SIZE, DEFAULT_MAX_SECTION_SIZE};

/// Default listen address.
pub const DEFAULT_ADDR: &str = "0.0.0.0:7000";

/// Stream transports the engine can listen on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Transport {
    /// IPv4 or IPv6.
    #[default]
    Tcp,
    /// IPv4 only.
    Tcp4,
    /// IPv6 only.
    Tcp6,
}

impl Transport {
    /// Network name as written in configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Tcp => "tcp",
            Transport::Tcp4 => "tcp4",
            Transport::Tcp6 => "tcp6",
        }
    }

    /// Whether an address of this family may be used.
    pub fn accepts(&self, addr: &std::net::SocketAddr) -> bool {
        match self {
            Transport::Tcp => true,
            Transport::Tcp4 => addr.is_ipv4(),
            Transport::Tcp6 => addr.is_ipv6(),
        }
    }
}

impl FromStr for Transport {
    type Err = FramewireError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Transport::Tcp),
            "tcp4" => Ok(Transport::Tcp4),
            "tcp6" => Ok(Transport::Tcp6),
            _ => Err(FramewireError::UnsupportedTransport(s.to_string())),
        }
    }
}

impl TryFrom<String> for Transport {
    type Error = FramewireError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Transport> for String {
    fn from(t: Transport) -> Self {
        t.as_str().to_string()
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// `host:port`, or a bare port to listen on every interface.
    pub addr: String,
    /// Transport network.
    pub transport: Transport,
    /// Largest header or body section accepted from a peer.
    pub max_section_size: u64,
    /// Idle request contexts kept for reuse.
    pub pool_max_idle: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            transport: Transport::Tcp,
            max_section_size: DEFAULT_MAX_SECTION_SIZE,
            pool_max_idle: DEFAULT_POOL_MAX_IDLE,
        }
    }
}

impl ServerConfig {
    /// Parse and validate a JSON config.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.addr.trim().is_empty() {
            return Err(FramewireError::InvalidConfig(
                "listen address is empty".to_string(),
            ));
        }
        if self.max_section_size == 0 || self.max_section_size > ABSOLUTE_MAX_SECTION_SIZE {
            return Err(FramewireError::InvalidConfig(format!(
                "max_section_size {} out of range 1..={}",
                self.max_section_size, ABSOLUTE_MAX_SECTION_SIZE
            )));
        }
        Ok(())
    }

    /// Address to bind. A bare port listens on every interface of the
    /// configured family.
    pub fn listen_addr(&self) -> String {
        let addr = self.addr.trim();
        if !addr.is_empty() && addr.bytes().all(|b| b.is_ascii_digit()) {
            return match self.transport {
                Transport::Tcp6 => format!("[::]:{addr}"),
                Transport::Tcp | Transport::Tcp4 => format!("0.0.0.0:{addr}"),
            };
        }
        addr.to_string()
    }
}
