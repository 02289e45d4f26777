//! ABI decoding of deposit event data, deposit calldata and `deposits(uint256)` return data.
//!
//! All functions are pure and bounds-checked; they never panic on short or hostile input.
//!
//! # Event data (64 bytes)
//! - Bytes 0-31:  amount (uint256, big-endian)
//! - Bytes 32-63: deposit index (uint256, big-endian)
//!
//! # `depositUnderlying(uint256 amount, string receiver)` calldata
//! - Bytes 0-3:    selector
//! - Bytes 4-35:   amount
//! - Bytes 36-67:  offset of the string head (always 0x40)
//! - Bytes 68-99:  string length
//! - Bytes 100-..: string bytes, right-padded to a word boundary
//!
//! # `deposits(uint256)` return data, `(string account, uint256 amount)`
//! - Bytes 0-31:  offset of the string head
//! - Bytes 32-63: amount
//! - At offset:   string length word followed by the string bytes

use crate::error::BridgeError;

/// ABI word size
pub const WORD: usize = 32;

/// Exact length of `Deposited` event data
pub const EVENT_DATA_LEN: usize = 2 * WORD;

const SELECTOR_LEN: usize = 4;
const CALLDATA_LENGTH_OFFSET: usize = SELECTOR_LEN + 2 * WORD;
const CALLDATA_STRING_OFFSET: usize = CALLDATA_LENGTH_OFFSET + WORD;

/// Borrow the 32-byte word starting at `offset`, if the buffer is long enough.
fn word_at(data: &[u8], offset: usize) -> Option<&[u8]> {
    let end = offset.checked_add(WORD)?;
    data.get(offset..end)
}

/// Interpret a big-endian uint256 word as u64; `None` if the value does not fit.
pub fn word_to_u64(word: &[u8]) -> Option<u64> {
    if word.len() != WORD || word[..WORD - 8].iter().any(|b| *b != 0) {
        return None;
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&word[WORD - 8..]);
    Some(u64::from_be_bytes(buf))
}

/// Encode a u64 as a left-padded uint256 word.
pub fn u64_to_word(value: u64) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[WORD - 8..].copy_from_slice(&value.to_be_bytes());
    word
}

/// Decode `(amount, deposit_index)` from `Deposited` event data.
pub fn decode_event_data(data: &[u8]) -> Result<(u64, u64), BridgeError> {
    if data.len() != EVENT_DATA_LEN {
        return Err(BridgeError::MalformedEventData {
            reason: format!(
                "expected {} bytes, got {}",
                EVENT_DATA_LEN,
                data.len()
            ),
        });
    }

    let amount = word_to_u64(&data[..WORD]).ok_or_else(|| BridgeError::MalformedEventData {
        reason: "amount does not fit in u64".to_string(),
    })?;
    let deposit_index =
        word_to_u64(&data[WORD..]).ok_or_else(|| BridgeError::MalformedEventData {
            reason: "deposit index does not fit in u64".to_string(),
        })?;

    Ok((amount, deposit_index))
}

/// Encode `Deposited` event data; inverse of [`decode_event_data`].
pub fn encode_event_data(amount: u64, deposit_index: u64) -> Vec<u8> {
    let mut data = Vec::with_capacity(EVENT_DATA_LEN);
    data.extend_from_slice(&u64_to_word(amount));
    data.extend_from_slice(&u64_to_word(deposit_index));
    data
}

/// Extract the recipient string from `depositUnderlying(uint256,string)` calldata.
pub fn decode_recipient_from_calldata(calldata: &[u8]) -> Result<String, BridgeError> {
    let length_word =
        word_at(calldata, CALLDATA_LENGTH_OFFSET).ok_or_else(|| BridgeError::MalformedCalldata {
            reason: format!(
                "calldata too short for recipient length: {} bytes",
                calldata.len()
            ),
        })?;

    let remaining = calldata.len() - CALLDATA_STRING_OFFSET;
    let length = word_to_u64(length_word)
        .and_then(|len| usize::try_from(len).ok())
        .filter(|len| *len <= remaining)
        .ok_or_else(|| BridgeError::MalformedCalldata {
            reason: format!(
                "declared recipient length exceeds remaining {} bytes",
                remaining
            ),
        })?;

    if length == 0 {
        return Err(BridgeError::MalformedCalldata {
            reason: "empty recipient string".to_string(),
        });
    }

    let bytes = &calldata[CALLDATA_STRING_OFFSET..CALLDATA_STRING_OFFSET + length];
    String::from_utf8(bytes.to_vec()).map_err(|e| BridgeError::MalformedCalldata {
        reason: format!("recipient is not valid UTF-8: {}", e),
    })
}

/// Decode the `(string account, uint256 amount)` tuple returned by `deposits(uint256)`.
///
/// An empty `account` is returned as-is; a missing deposit reads back as the zero tuple.
pub fn decode_deposit_tuple(data: &[u8]) -> Result<(String, u64), BridgeError> {
    let invalid = |reason: String| BridgeError::InvalidResponse { reason };

    let offset_word = word_at(data, 0)
        .ok_or_else(|| invalid(format!("return data too short: {} bytes", data.len())))?;
    let amount_word = word_at(data, WORD)
        .ok_or_else(|| invalid(format!("return data too short: {} bytes", data.len())))?;

    let amount = word_to_u64(amount_word)
        .ok_or_else(|| invalid("deposit amount does not fit in u64".to_string()))?;

    let offset = word_to_u64(offset_word)
        .and_then(|o| usize::try_from(o).ok())
        .ok_or_else(|| invalid("string offset out of range".to_string()))?;
    let length_word = word_at(data, offset)
        .ok_or_else(|| invalid(format!("string offset {} out of bounds", offset)))?;

    let start = offset + WORD;
    let length = word_to_u64(length_word)
        .and_then(|len| usize::try_from(len).ok())
        .filter(|len| start.checked_add(*len).is_some_and(|end| end <= data.len()))
        .ok_or_else(|| invalid("string length exceeds return data".to_string()))?;

    let account = String::from_utf8(data[start..start + length].to_vec())
        .map_err(|e| invalid(format!("account is not valid UTF-8: {}", e)))?;

    Ok((account, amount))
}

/// ABI-encode a dynamic string tail: length word followed by the right-padded bytes.
fn encode_string_tail(value: &str) -> Vec<u8> {
    let bytes = value.as_bytes();
    let padded = bytes.len().div_ceil(WORD) * WORD;
    let mut out = Vec::with_capacity(WORD + padded);
    out.extend_from_slice(&u64_to_word(bytes.len() as u64));
    out.extend_from_slice(bytes);
    out.resize(WORD + padded, 0);
    out
}

/// Encode the return data of `deposits(uint256)`; inverse of [`decode_deposit_tuple`].
pub fn encode_deposit_tuple(account: &str, amount: u64) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&u64_to_word(2 * WORD as u64));
    out.extend_from_slice(&u64_to_word(amount));
    out.extend_from_slice(&encode_string_tail(account));
    out
}

/// Encode `depositUnderlying(uint256,string)` calldata with the given selector.
pub fn encode_deposit_calldata(selector: [u8; 4], amount: u64, recipient: &str) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&selector);
    out.extend_from_slice(&u64_to_word(amount));
    out.extend_from_slice(&u64_to_word(2 * WORD as u64));
    out.extend_from_slice(&encode_string_tail(recipient));
    out
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    const RECIPIENT: &str = "b52168ketml7jed9gl7t2quelfkktr0zuuescapgde";
    const SELECTOR: [u8; 4] = [0xe6, 0x0e, 0x79, 0xe5];

    #[test]
    fn test_event_data_round_trip_boundaries() {
        for (amount, index) in [(0, 0), (u64::MAX, 0), (0, u64::MAX), (u64::MAX, u64::MAX)] {
            assert_eq!(
                decode_event_data(&encode_event_data(amount, index)).unwrap(),
                (amount, index)
            );
        }
    }

    proptest! {
        #[test]
        fn prop_event_data_round_trip(amount in any::<u64>(), index in any::<u64>()) {
            let data = encode_event_data(amount, index);
            prop_assert_eq!(data.len(), EVENT_DATA_LEN);
            prop_assert_eq!(decode_event_data(&data).unwrap(), (amount, index));
        }

        #[test]
        fn prop_recipient_round_trip(amount in any::<u64>(), recipient in "[a-z0-9]{1,90}") {
            let calldata = encode_deposit_calldata(SELECTOR, amount, &recipient);
            prop_assert_eq!(calldata.len() % WORD, SELECTOR_LEN);
            prop_assert_eq!(decode_recipient_from_calldata(&calldata).unwrap(), recipient);
        }

        #[test]
        fn prop_deposit_tuple_round_trip(account in "\\PC{0,80}", amount in any::<u64>()) {
            let data = encode_deposit_tuple(&account, amount);
            prop_assert_eq!(decode_deposit_tuple(&data).unwrap(), (account, amount));
        }
    }

    #[test]
    fn test_event_data_wrong_length() {
        for len in [0usize, 32, 63, 65, 96] {
            let err = decode_event_data(&vec![0u8; len]).unwrap_err();
            assert!(matches!(err, BridgeError::MalformedEventData { .. }));
        }
    }

    #[test]
    fn test_event_data_amount_overflow() {
        let mut data = encode_event_data(1, 1);
        data[0] = 1;
        assert!(matches!(
            decode_event_data(&data).unwrap_err(),
            BridgeError::MalformedEventData { .. }
        ));
    }

    #[test]
    fn test_recipient_from_calldata() {
        let calldata = encode_deposit_calldata(SELECTOR, 10_000, RECIPIENT);
        assert_eq!(calldata.len() % WORD, SELECTOR_LEN);
        assert_eq!(decode_recipient_from_calldata(&calldata).unwrap(), RECIPIENT);
    }

    #[test]
    fn test_recipient_length_exceeds_buffer() {
        let mut calldata = encode_deposit_calldata(SELECTOR, 10_000, RECIPIENT);
        calldata[CALLDATA_LENGTH_OFFSET..CALLDATA_STRING_OFFSET]
            .copy_from_slice(&u64_to_word(1_000));
        let err = decode_recipient_from_calldata(&calldata).unwrap_err();
        assert!(matches!(err, BridgeError::MalformedCalldata { .. }));
    }

    #[test]
    fn test_recipient_huge_length_word() {
        let mut calldata = encode_deposit_calldata(SELECTOR, 1, RECIPIENT);
        calldata[CALLDATA_LENGTH_OFFSET] = 0xff;
        assert!(matches!(
            decode_recipient_from_calldata(&calldata).unwrap_err(),
            BridgeError::MalformedCalldata { .. }
        ));
    }

    #[test]
    fn test_recipient_short_calldata() {
        for len in [0usize, 4, 68, 99] {
            let err = decode_recipient_from_calldata(&vec![0u8; len]).unwrap_err();
            assert!(matches!(err, BridgeError::MalformedCalldata { .. }));
        }
    }

    #[test]
    fn test_recipient_invalid_utf8() {
        let mut calldata = encode_deposit_calldata(SELECTOR, 1, "abcd");
        calldata[CALLDATA_STRING_OFFSET] = 0xff;
        assert!(matches!(
            decode_recipient_from_calldata(&calldata).unwrap_err(),
            BridgeError::MalformedCalldata { .. }
        ));
    }

    #[test]
    fn test_recipient_empty() {
        let calldata = encode_deposit_calldata(SELECTOR, 1, "");
        assert!(matches!(
            decode_recipient_from_calldata(&calldata).unwrap_err(),
            BridgeError::MalformedCalldata { .. }
        ));
    }

    #[test]
    fn test_deposit_tuple() {
        let data = encode_deposit_tuple(RECIPIENT, 10_000);
        assert_eq!(
            decode_deposit_tuple(&data).unwrap(),
            (RECIPIENT.to_string(), 10_000)
        );
    }

    #[test]
    fn test_deposit_tuple_missing_deposit_is_empty() {
        let data = encode_deposit_tuple("", 0);
        assert_eq!(decode_deposit_tuple(&data).unwrap(), (String::new(), 0));
    }

    #[test]
    fn test_deposit_tuple_truncated() {
        let data = encode_deposit_tuple(RECIPIENT, 10_000);
        for len in [0usize, 31, 63, 64, 95, 100] {
            let err = decode_deposit_tuple(&data[..len]).unwrap_err();
            assert!(
                matches!(err, BridgeError::InvalidResponse { .. }),
                "len {} gave {:?}",
                len,
                err
            );
        }
    }

    #[test]
    fn test_deposit_tuple_bad_offset() {
        let mut data = encode_deposit_tuple(RECIPIENT, 10_000);
        data[..WORD].copy_from_slice(&u64_to_word(4_096));
        assert!(matches!(
            decode_deposit_tuple(&data).unwrap_err(),
            BridgeError::InvalidResponse { .. }
        ));
    }
}
