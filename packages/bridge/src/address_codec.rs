//! Native (bech32) address validation and normalization.
//!
//! Recipients arrive as free-form strings written by depositors on the source chain.
//! Two spellings are accepted:
//! - bech32 with the ledger prefix, e.g. `b52168ketml7jed9gl7t2quelfkktr0zuuescapgde`
//! - the prefix followed by the raw address as hex, e.g.
//!   `b52d1ed95effe965a547fcb50399fa6d658de2e7330`
//!
//! Both normalize to the bech32 form. The payload must be 20 (account) or 32
//! (module/contract) bytes. Since a 20-byte bech32 body is 39 characters and its hex
//! body is 40, a corrupted bech32 address can never be mistaken for a hex one.

use bech32::{FromBase32, ToBase32, Variant};

use crate::error::BridgeError;

/// Default bech32 prefix of ledger accounts
pub const DEFAULT_ADDRESS_PREFIX: &str = "b52";

/// Decode a bech32 address, checking prefix, checksum and payload length.
pub fn decode_bech32(addr: &str, prefix: &str) -> Result<Vec<u8>, String> {
    let (hrp, data, variant) =
        bech32::decode(addr).map_err(|e| format!("invalid bech32 address: {}", e))?;

    if hrp != prefix {
        return Err(format!(
            "invalid address prefix: expected {}, got {}",
            prefix, hrp
        ));
    }
    if variant != Variant::Bech32 {
        return Err("invalid address encoding: bech32m is not accepted".to_string());
    }

    let bytes = Vec::<u8>::from_base32(&data).map_err(|e| format!("invalid base32 data: {}", e))?;
    check_payload_len(bytes.len())?;
    Ok(bytes)
}

/// Encode raw address bytes as bech32 with the given prefix.
pub fn encode_bech32(bytes: &[u8], prefix: &str) -> Result<String, String> {
    check_payload_len(bytes.len())?;
    bech32::encode(prefix, bytes.to_base32(), Variant::Bech32)
        .map_err(|e| format!("failed to encode bech32: {}", e))
}

fn check_payload_len(len: usize) -> Result<(), String> {
    if len != 20 && len != 32 {
        return Err(format!(
            "invalid address length: expected 20 or 32 bytes, got {}",
            len
        ));
    }
    Ok(())
}

/// Validate a deposit recipient and return its canonical bech32 form.
///
/// Fails with [`BridgeError::InvalidDeposit`] when the string is neither valid
/// bech32 with `prefix` nor `prefix` followed by a hex-encoded address.
pub fn normalize_recipient(recipient: &str, prefix: &str) -> Result<String, BridgeError> {
    let bech32_err = match decode_bech32(recipient, prefix) {
        Ok(_) => return Ok(recipient.to_string()),
        Err(e) => e,
    };

    let lowered = recipient.to_ascii_lowercase();
    let hex_body = lowered
        .strip_prefix(prefix)
        .filter(|body| !body.is_empty() && body.bytes().all(|b| b.is_ascii_hexdigit()));

    match hex_body {
        Some(body) => {
            let bytes = hex::decode(body).map_err(|e| {
                BridgeError::invalid_deposit(format!("invalid hex recipient {}: {}", recipient, e))
            })?;
            encode_bech32(&bytes, prefix).map_err(|e| {
                BridgeError::invalid_deposit(format!("invalid hex recipient {}: {}", recipient, e))
            })
        }
        None => Err(BridgeError::invalid_deposit(format!(
            "invalid recipient {}: {}",
            recipient, bech32_err
        ))),
    }
}

/// Validate a transaction signer address (no hex fallback).
pub fn validate_signer(addr: &str, prefix: &str) -> Result<(), BridgeError> {
    decode_bech32(addr, prefix)
        .map(|_| ())
        .map_err(|reason| BridgeError::InvalidRequest {
            reason: format!("invalid creator address {}: {}", addr, reason),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = "b52168ketml7jed9gl7t2quelfkktr0zuuescapgde";
    const VALID_HEX: &str = "b52d1ed95effe965a547fcb50399fa6d658de2e7330";
    const BAD_CHECKSUM: &str = "b52168ketml7jed9gl7t2quelfkktr0zuuescapgdf";

    #[test]
    fn test_decode_valid() {
        let bytes = decode_bech32(VALID, "b52").unwrap();
        assert_eq!(hex::encode(&bytes), "d1ed95effe965a547fcb50399fa6d658de2e7330");
    }

    #[test]
    fn test_encode_round_trip() {
        let bytes = decode_bech32(VALID, "b52").unwrap();
        assert_eq!(encode_bech32(&bytes, "b52").unwrap(), VALID);
    }

    #[test]
    fn test_known_encodings() {
        let seq: Vec<u8> = (0u8..20).collect();
        assert_eq!(
            encode_bech32(&seq, "b52").unwrap(),
            "b521qqqsyqcyq5rqwzqfpg9scrgwpugpzysnnl40pf"
        );
        assert_eq!(
            encode_bech32(&[0xaa; 20], "b52").unwrap(),
            "b52142424242424242424242424242424242dhlptv"
        );
    }

    #[test]
    fn test_wrong_prefix_rejected() {
        let bytes = decode_bech32(VALID, "b52").unwrap();
        let other = encode_bech32(&bytes, "cosmos").unwrap();
        assert!(decode_bech32(&other, "b52").is_err());
        assert!(matches!(
            normalize_recipient(&other, "b52").unwrap_err(),
            BridgeError::InvalidDeposit { .. }
        ));
    }

    #[test]
    fn test_normalize_keeps_bech32() {
        assert_eq!(normalize_recipient(VALID, "b52").unwrap(), VALID);
    }

    #[test]
    fn test_normalize_hex_recipient() {
        assert_eq!(normalize_recipient(VALID_HEX, "b52").unwrap(), VALID);
        assert_eq!(
            normalize_recipient(&VALID_HEX.to_uppercase(), "b52").unwrap(),
            VALID
        );
    }

    #[test]
    fn test_bad_checksum_rejected() {
        assert!(decode_bech32(BAD_CHECKSUM, "b52").is_err());
        assert!(matches!(
            normalize_recipient(BAD_CHECKSUM, "b52").unwrap_err(),
            BridgeError::InvalidDeposit { .. }
        ));
    }

    #[test]
    fn test_hex_wrong_length_rejected() {
        for recipient in ["b52abcd", "b52d1ed95effe965a547fcb50399fa6d658de2e73", "b52"] {
            assert!(
                normalize_recipient(recipient, "b52").is_err(),
                "{} accepted",
                recipient
            );
        }
    }

    #[test]
    fn test_garbage_rejected() {
        for recipient in ["", "hello", "0xd1ed95effe965a547fcb50399fa6d658de2e7330"] {
            assert!(normalize_recipient(recipient, "b52").is_err());
        }
    }

    #[test]
    fn test_validate_signer() {
        assert!(validate_signer(VALID, "b52").is_ok());
        assert!(matches!(
            validate_signer(VALID_HEX, "b52").unwrap_err(),
            BridgeError::InvalidRequest { .. }
        ));
    }
}
