// src/models/did.rs
//! Identity registry data model.
//!
//! An identity is an Ethereum address. Its owner starts out equal to the
//! identity and changes through ownership-transfer transactions. Delegates and
//! attributes are additive records that lapse when their validity expires.

use ethers::types::Address;
use serde::{Deserialize, Serialize};

/// Validity applied to delegates and attributes when none is given, in seconds.
pub const DEFAULT_VALIDITY_SECS: u64 = 86_400;

/// Capability granted to a delegate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DelegateType {
    /// Key allowed to sign off-chain on behalf of the identity
    VeriKey,
    /// Key allowed to authenticate as the identity
    SigAuth,
    Other(String),
}

impl DelegateType {
    pub fn as_str(&self) -> &str {
        match self {
            DelegateType::VeriKey => "veriKey",
            DelegateType::SigAuth => "sigAuth",
            DelegateType::Other(name) => name,
        }
    }
}

impl From<String> for DelegateType {
    fn from(name: String) -> Self {
        match name.as_str() {
            "veriKey" => DelegateType::VeriKey,
            "sigAuth" => DelegateType::SigAuth,
            _ => DelegateType::Other(name),
        }
    }
}

impl From<DelegateType> for String {
    fn from(delegate_type: DelegateType) -> Self {
        delegate_type.as_str().to_string()
    }
}

/// A time-bounded secondary authority for an identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegate {
    pub address: Address,
    pub delegate_type: DelegateType,
    /// Seconds from inclusion until the delegate lapses
    #[serde(default = "default_validity")]
    pub expires_in: u64,
}

/// Attribute payload before registry encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Raw bytes, stored as-is
    Bytes(Vec<u8>),
    /// Text interpreted according to the key's DID document section
    Text(String),
}

impl From<&str> for AttributeValue {
    fn from(text: &str) -> Self {
        AttributeValue::Text(text.to_string())
    }
}

/// A namespaced key/value entry such as `did/svc/HubService`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub key: String,
    pub value: AttributeValue,
    #[serde(default = "default_validity")]
    pub expires_in: u64,
}

impl Attribute {
    pub fn new(key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            expires_in: DEFAULT_VALIDITY_SECS,
        }
    }

    /// Service endpoint attribute stored under `did/svc/<name>`.
    pub fn service_endpoint(name: &str, url: &str) -> Self {
        Self::new(format!("did/svc/{}", name), url)
    }
}

fn default_validity() -> u64 {
    DEFAULT_VALIDITY_SECS
}
