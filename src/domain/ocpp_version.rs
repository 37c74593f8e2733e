//! OCPP protocol version
//!
//! The smart charging block behaves slightly differently between OCPP 2.0.1
//! and 2.1: several validation rules (rate limiting, external-constraints id
//! threshold, operation modes, dynamic profiles) only apply to 2.1.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Supported OCPP protocol versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OcppProtocolVersion {
    /// OCPP 2.0.1
    V201,
    /// OCPP 2.1
    V21,
}

impl OcppProtocolVersion {
    /// Human-readable version string.
    pub fn version_string(&self) -> &'static str {
        match self {
            Self::V201 => "2.0.1",
            Self::V21 => "2.1",
        }
    }
}

impl fmt::Display for OcppProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OCPP {}", self.version_string())
    }
}
