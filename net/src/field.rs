// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Typed header values and the coercions applied when a concrete packet is
//! lifted back into a user packet.

use crate::headers::NativeField;
use crate::mac::Mac;
use std::fmt::Display;
use std::net::{IpAddr, Ipv4Addr};

/// A scalar header value.
#[derive(
    Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub enum FieldValue {
    Int(u64),
    Mac(Mac),
    Ip(IpAddr),
    Str(String),
    Bytes(Vec<u8>),
}

/// Errors raised when a value cannot be coerced to the type a native
/// header requires.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FieldError {
    #[error("'{value}' is not a valid mac address for header {field}")]
    InvalidMac { field: NativeField, value: String },

    #[error("'{value}' is not a valid ip address for header {field}")]
    InvalidIp { field: NativeField, value: String },
}

impl FieldValue {
    /// Truthiness, as used when extracting extended values: zero integers,
    /// empty strings and empty byte strings are falsy.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            FieldValue::Int(v) => *v != 0,
            FieldValue::Str(s) => !s.is_empty(),
            FieldValue::Bytes(b) => !b.is_empty(),
            FieldValue::Mac(_) | FieldValue::Ip(_) => true,
        }
    }

    /// The value as an unsigned integer, when it is one.
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Coerce a value to the representation a native header expects:
    /// `srcmac`/`dstmac` become [`Mac`] and `srcip`/`dstip` become
    /// [`IpAddr`]. Every other header keeps the value as delivered.
    pub fn coerce_for(field: NativeField, value: FieldValue) -> Result<FieldValue, FieldError> {
        match field {
            NativeField::SrcMac | NativeField::DstMac => match value {
                FieldValue::Mac(_) => Ok(value),
                FieldValue::Int(v) => Ok(FieldValue::Mac(Mac::from_u64(v))),
                FieldValue::Str(s) => Mac::try_from(s.as_str())
                    .map(FieldValue::Mac)
                    .map_err(|_| FieldError::InvalidMac { field, value: s }),
                other => Err(FieldError::InvalidMac {
                    field,
                    value: other.to_string(),
                }),
            },
            NativeField::SrcIp | NativeField::DstIp => match value {
                FieldValue::Ip(_) => Ok(value),
                FieldValue::Int(v) => {
                    u32::try_from(v)
                        .map(|v| FieldValue::Ip(IpAddr::V4(Ipv4Addr::from(v))))
                        .map_err(|_| FieldError::InvalidIp {
                            field,
                            value: v.to_string(),
                        })
                }
                FieldValue::Str(s) => s
                    .parse::<IpAddr>()
                    .map(FieldValue::Ip)
                    .map_err(|_| FieldError::InvalidIp { field, value: s }),
                other => Err(FieldError::InvalidIp {
                    field,
                    value: other.to_string(),
                }),
            },
            _ => Ok(value),
        }
    }
}

impl Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Int(v) => v.fmt(f),
            FieldValue::Mac(mac) => mac.fmt(f),
            FieldValue::Ip(ip) => ip.fmt(f),
            FieldValue::Str(s) => s.fmt(f),
            FieldValue::Bytes(b) => write!(f, "{} bytes", b.len()),
        }
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        FieldValue::Int(u64::from(value))
    }
}

impl From<u16> for FieldValue {
    fn from(value: u16) -> Self {
        FieldValue::Int(u64::from(value))
    }
}

impl From<Mac> for FieldValue {
    fn from(value: Mac) -> Self {
        FieldValue::Mac(value)
    }
}

impl From<IpAddr> for FieldValue {
    fn from(value: IpAddr) -> Self {
        FieldValue::Ip(value)
    }
}

impl From<Ipv4Addr> for FieldValue {
    fn from(value: Ipv4Addr) -> Self {
        FieldValue::Ip(IpAddr::V4(value))
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Str(value.to_string())
    }
}
