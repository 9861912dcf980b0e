// src/utils/formatting.rs
//! Conversions between human-readable DID values and the registry's encodings.
//!
//! Attribute keys follow the grammar `did/<section>/<name>[/<sub>][/<encoding>]`
//! and are stored on-chain as a fixed 32-byte value. Attribute values are stored
//! as a byte string whose encoding depends on the key's section:
//! - `pub` / `auth`: the value is hex (default) or base64, per the encoding segment
//! - `svc`: the value is UTF-8 text
//!
//! Keys outside the grammar are stored as hex when they already look like hex,
//! and as UTF-8 otherwise.

use crate::error::{DidError, Result};
use crate::models::did::AttributeValue;
use ethers::types::{Address, Bytes};
use ethers::utils::hex;
use once_cell::sync::Lazy;
use regex::Regex;

/// Width of the registry's attribute-name and delegate-type fields.
pub const FIXED_WIDTH: usize = 32;

const DID_PREFIX: &str = "did:ethr:";

static ATTRIBUTE_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^did/(\w+)/(\w+)(?:/(\w+))?(?:/(\w+))?$").expect("Invalid regex")
});

static HEX_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^0x[0-9a-fA-F]*$").expect("Invalid regex"));

/// DID document section an attribute belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    /// Public keys
    Pub,
    /// Authentication keys
    Auth,
    /// Service endpoints
    Svc,
}

impl std::str::FromStr for Section {
    type Err = DidError;

    fn from_str(section: &str) -> Result<Self> {
        match section {
            "pub" => Ok(Section::Pub),
            "auth" => Ok(Section::Auth),
            "svc" => Ok(Section::Svc),
            other => Err(DidError::UnknownSection {
                section: other.to_string(),
            }),
        }
    }
}

/// Value encoding named by the final key segment of `pub`/`auth` keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueEncoding {
    /// `0x`-prefixed hex passed through unchanged
    Default,
    /// Bare hex without the `0x` prefix
    Hex,
    Base64,
}

impl ValueEncoding {
    fn parse(segment: &str) -> Option<Self> {
        match segment {
            "hex" => Some(ValueEncoding::Hex),
            "base64" => Some(ValueEncoding::Base64),
            _ => None,
        }
    }
}

/// A parsed `did/<section>/<name>[/<sub>][/<encoding>]` key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeKey {
    pub section: Section,
    pub name: String,
    pub sub: Option<String>,
    pub encoding: ValueEncoding,
}

impl AttributeKey {
    /// Parses `key`, returning `Ok(None)` for keys outside the DID grammar.
    ///
    /// With a single trailing segment after the name, the segment is taken as
    /// the encoding when it names one (`hex`, `base64`) and as the sub-type
    /// otherwise, so `did/pub/Secp256k1/veriKey` and `did/pub/name/hex` both
    /// parse as expected.
    pub fn parse(key: &str) -> Result<Option<Self>> {
        let Some(captures) = ATTRIBUTE_KEY.captures(key) else {
            return Ok(None);
        };

        let section = captures[1].parse::<Section>()?;
        let name = captures[2].to_string();
        let third = captures.get(3).map(|m| m.as_str());
        let fourth = captures.get(4).map(|m| m.as_str());

        let (sub, encoding) = match (third, fourth) {
            (Some(sub), Some(encoding)) => (
                Some(sub.to_string()),
                ValueEncoding::parse(encoding).unwrap_or(ValueEncoding::Default),
            ),
            (Some(segment), None) => match ValueEncoding::parse(segment) {
                Some(encoding) => (None, encoding),
                None => (Some(segment.to_string()), ValueEncoding::Default),
            },
            _ => (None, ValueEncoding::Default),
        };

        Ok(Some(Self {
            section,
            name,
            sub,
            encoding,
        }))
    }
}

/// Truncates the UTF-8 bytes of `key` to 32 bytes and right-pads with zeros.
///
/// Keys longer than 32 bytes lose their tail.
pub fn key_to_fixed_width(key: &str) -> [u8; FIXED_WIDTH] {
    let mut fixed = [0u8; FIXED_WIDTH];
    let bytes = key.as_bytes();
    let len = bytes.len().min(FIXED_WIDTH);
    fixed[..len].copy_from_slice(&bytes[..len]);
    fixed
}

/// Reads a fixed-width registry name back into text, dropping trailing NULs.
pub fn bytes32_to_string(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches('\0')
        .to_string()
}

/// Encodes an attribute value into the byte string stored by the registry.
pub fn attribute_to_bytes(key: &str, value: &AttributeValue) -> Result<Bytes> {
    let text = match value {
        AttributeValue::Bytes(raw) => return Ok(Bytes::from(raw.clone())),
        AttributeValue::Text(text) => text,
    };

    match AttributeKey::parse(key)? {
        Some(parsed) => match parsed.section {
            Section::Pub | Section::Auth => match parsed.encoding {
                ValueEncoding::Base64 => base64::decode(text)
                    .map(Bytes::from)
                    .map_err(|_| DidError::InvalidBase64 {
                        value: text.clone(),
                    }),
                ValueEncoding::Hex | ValueEncoding::Default => decode_hex(text),
            },
            Section::Svc => Ok(Bytes::from(text.as_bytes().to_vec())),
        },
        None if HEX_VALUE.is_match(text) => decode_hex(text),
        None => Ok(Bytes::from(text.as_bytes().to_vec())),
    }
}

/// Decodes a registry value (as `0x`-prefixed hex) back into its original form.
///
/// Inverse of [`attribute_to_bytes`] for keys in the DID grammar; values under
/// other keys are returned unchanged. Hex output is always lowercase, so a
/// value written with uppercase digits comes back lowercased.
pub fn bytes_to_attribute(key: &str, value: &str) -> Result<String> {
    let Some(parsed) = AttributeKey::parse(key)? else {
        return Ok(value.to_string());
    };

    if !HEX_VALUE.is_match(value) {
        return Err(DidError::InvalidHex {
            value: value.to_string(),
        });
    }
    let bytes = decode_hex(value)?;

    Ok(match parsed.section {
        Section::Pub | Section::Auth => match parsed.encoding {
            ValueEncoding::Hex => hex::encode(&bytes),
            ValueEncoding::Base64 => base64::encode(&bytes),
            ValueEncoding::Default => to_hex(&bytes),
        },
        Section::Svc => String::from_utf8_lossy(&bytes).into_owned(),
    })
}

/// Decodes an attribute as the registry reports it, e.g. in `DIDAttributeChanged`.
///
/// `name` is the 32-byte name as `0x`-prefixed hex, or an already readable key.
/// Returns the readable key and the value in its original form.
pub fn decode_registry_attribute(name: &str, value: &str) -> Result<(String, String)> {
    let key = match name.strip_prefix("0x") {
        Some(digits) if digits.len() == FIXED_WIDTH * 2 && HEX_VALUE.is_match(name) => {
            bytes32_to_string(&decode_hex(name)?)
        }
        _ => name.to_string(),
    };
    let value = bytes_to_attribute(&key, value)?;
    Ok((key, value))
}

/// Formats bytes as lowercase `0x`-prefixed hex.
pub fn to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

fn decode_hex(value: &str) -> Result<Bytes> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    hex::decode(digits)
        .map(Bytes::from)
        .map_err(|_| DidError::InvalidHex {
            value: value.to_string(),
        })
}

/// Formats an address as an `ethr` DID.
pub fn did_method(address: Address) -> String {
    format!("{}{:#x}", DID_PREFIX, address)
}

/// Extracts the identity address from `did:ethr:[<network>:]<address>` or a bare address.
pub fn address_from_did(did: &str) -> Result<Address> {
    let address = match did.strip_prefix(DID_PREFIX) {
        Some(rest) => rest.rsplit(':').next().unwrap_or(rest),
        None if did.starts_with("did:") => return Err(DidError::InvalidDid(did.to_string())),
        None => did,
    };
    address
        .parse::<Address>()
        .map_err(|_| DidError::InvalidDid(did.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_width_pads_short_keys() {
        let fixed = key_to_fixed_width("did/svc/Hub");
        assert_eq!(fixed.len(), 32);
        assert_eq!(&fixed[..11], b"did/svc/Hub");
        assert!(fixed[11..].iter().all(|b| *b == 0));
        assert_eq!(bytes32_to_string(&fixed), "did/svc/Hub");
    }

    #[test]
    fn fixed_width_truncates_long_keys() {
        let key = "did/pub/Secp256k1/veriKey/hex/with/a/very/long/tail";
        let fixed = key_to_fixed_width(key);
        assert_eq!(fixed.len(), 32);
        assert_eq!(&fixed[..], &key.as_bytes()[..32]);
        assert_eq!(key_to_fixed_width("").len(), 32);
    }

    #[test]
    fn parses_sub_type_and_encoding() {
        let parsed = AttributeKey::parse("did/pub/Secp256k1/veriKey/base64")
            .unwrap()
            .unwrap();
        assert_eq!(parsed.section, Section::Pub);
        assert_eq!(parsed.name, "Secp256k1");
        assert_eq!(parsed.sub.as_deref(), Some("veriKey"));
        assert_eq!(parsed.encoding, ValueEncoding::Base64);

        let parsed = AttributeKey::parse("did/auth/Ed25519/hex").unwrap().unwrap();
        assert_eq!(parsed.sub, None);
        assert_eq!(parsed.encoding, ValueEncoding::Hex);

        assert_eq!(AttributeKey::parse("not/a/did/key").unwrap(), None);
    }

    #[test]
    fn unknown_section_is_rejected() {
        let err = attribute_to_bytes("did/foo/bar", &"0x01".into()).unwrap_err();
        assert!(matches!(err, DidError::UnknownSection { section } if section == "foo"));

        let err = bytes_to_attribute("did/foo/bar", "0x01").unwrap_err();
        assert!(matches!(err, DidError::UnknownSection { .. }));
    }

    #[test]
    fn raw_bytes_are_stored_directly() {
        let bytes = attribute_to_bytes("did/svc/Hub", &AttributeValue::Bytes(vec![1, 2, 3])).unwrap();
        assert_eq!(bytes.to_vec(), vec![1, 2, 3]);
    }

    #[test]
    fn service_values_are_utf8() {
        let bytes = attribute_to_bytes("did/svc/HubService", &"https://hub.example".into()).unwrap();
        assert_eq!(bytes.to_vec(), b"https://hub.example".to_vec());
    }

    #[test]
    fn base64_public_keys_are_decoded() {
        let bytes = attribute_to_bytes("did/pub/Ed25519/veriKey/base64", &"AQID".into()).unwrap();
        assert_eq!(bytes.to_vec(), vec![1, 2, 3]);
        assert_eq!(
            bytes_to_attribute("did/pub/Ed25519/veriKey/base64", "0x010203").unwrap(),
            "AQID"
        );
    }

    #[test]
    fn unmatched_keys_fall_back_to_hex_or_utf8() {
        assert_eq!(attribute_to_bytes("custom", &"0xbeef".into()).unwrap().to_vec(), vec![0xbe, 0xef]);
        assert_eq!(attribute_to_bytes("custom", &"plain".into()).unwrap().to_vec(), b"plain".to_vec());
        assert_eq!(bytes_to_attribute("custom", "anything").unwrap(), "anything");
    }

    #[test]
    fn malformed_hex_is_rejected() {
        let err = bytes_to_attribute("did/svc/Hub", "hub.example").unwrap_err();
        assert!(matches!(err, DidError::InvalidHex { .. }));

        let err = attribute_to_bytes("did/pub/Secp256k1/veriKey", &"0xzz".into()).unwrap_err();
        assert!(matches!(err, DidError::InvalidHex { .. }));
    }

    #[test]
    fn hex_public_keys_round_trip() {
        for key in ["did/pub/name/hex", "did/auth/name/hex"] {
            for value in ["", "02b97c30de767f084ce3080168ee293053ba33b235d7116a3263d29f1450936b71"] {
                let stored = attribute_to_bytes(key, &value.into()).unwrap();
                assert_eq!(bytes_to_attribute(key, &to_hex(&stored)).unwrap(), value);
            }

            let stored = attribute_to_bytes(key, &"ABCDEF".into()).unwrap();
            assert_eq!(bytes_to_attribute(key, &to_hex(&stored)).unwrap(), "abcdef");
        }

        let key = "did/pub/Secp256k1/veriKey";
        let value = "0x04fdd57adec3d438ea237fe46b33ee1e016eda6b585c3e27ea66686c2ea5358479";
        let stored = attribute_to_bytes(key, &value.into()).unwrap();
        assert_eq!(bytes_to_attribute(key, &to_hex(&stored)).unwrap(), value);
    }

    #[test]
    fn uppercase_default_hex_comes_back_lowercase() {
        let key = "did/pub/Secp256k1/veriKey";
        let stored = attribute_to_bytes(key, &"0xABCDEF".into()).unwrap();
        assert_eq!(bytes_to_attribute(key, &to_hex(&stored)).unwrap(), "0xabcdef");
    }

    #[test]
    fn registry_names_are_decoded_before_values() {
        let name = to_hex(&key_to_fixed_width("did/svc/HubService"));
        let value = to_hex(b"https://hub.example");

        let (key, decoded) = decode_registry_attribute(&name, &value).unwrap();
        assert_eq!(key, "did/svc/HubService");
        assert_eq!(decoded, "https://hub.example");

        let (key, decoded) = decode_registry_attribute("did/pub/Ed25519/veriKey/base64", "0x010203").unwrap();
        assert_eq!(key, "did/pub/Ed25519/veriKey/base64");
        assert_eq!(decoded, "AQID");
    }

    #[test]
    fn service_values_round_trip() {
        for value in ["https://hub.example/did", "", "ünïcødé ✓"] {
            let stored = attribute_to_bytes("did/svc/name", &value.into()).unwrap();
            assert_eq!(bytes_to_attribute("did/svc/name", &to_hex(&stored)).unwrap(), value);
        }
    }

    #[test]
    fn did_strings_map_to_addresses() {
        let address: Address = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266".parse().unwrap();
        let did = did_method(address);
        assert_eq!(did, "did:ethr:0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266");
        assert_eq!(address_from_did(&did).unwrap(), address);
        assert_eq!(
            address_from_did("did:ethr:goerli:0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266").unwrap(),
            address
        );
        assert_eq!(address_from_did("0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266").unwrap(), address);
        assert!(matches!(address_from_did("did:web:example.com"), Err(DidError::InvalidDid(_))));
    }
}
