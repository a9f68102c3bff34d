//! Base64url codec
//!
//! URL-safe alphabet (`-` and `_` in place of `+` and `/`) with padding
//! stripped on encode and reconstructed on decode. Decoding reports failure
//! as `None` rather than an error type: the verify path feeds it untrusted
//! input and only needs to know whether the segment was well-formed.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

/// Upper bound on the encoded length of `input_len` bytes.
#[inline]
pub fn max_encoded_len(input_len: usize) -> usize {
    base64::encoded_len(input_len, false).unwrap_or(usize::MAX)
}

/// Upper bound on the decoded length of `encoded_len` characters.
///
/// A scratch buffer of this size is always large enough for
/// [`decode_into`].
#[inline]
pub fn max_decoded_len(encoded_len: usize) -> usize {
    base64::decoded_len_estimate(encoded_len)
}

/// Encode into a caller-supplied buffer, returning the bytes written.
///
/// Returns `None` when `out` is shorter than [`max_encoded_len`].
pub fn encode_into(input: &[u8], out: &mut [u8]) -> Option<usize> {
    URL_SAFE_NO_PAD.encode_slice(input, out).ok()
}

/// Append the encoding of `input` to `out`.
pub fn encode_to_string(input: &[u8], out: &mut String) {
    URL_SAFE_NO_PAD.encode_string(input, out);
}

/// Encode into a new string
pub fn encode(input: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(input)
}

/// Decode into a caller-supplied buffer, returning the bytes written.
///
/// Returns `None` on characters outside the alphabet, an impossible length
/// (a single trailing character), non-canonical trailing bits, padding, or
/// when `out` is too small to hold the result.
pub fn decode_into(input: &[u8], out: &mut [u8]) -> Option<usize> {
    URL_SAFE_NO_PAD.decode_slice(input, out).ok()
}

/// Decode into a new buffer
pub fn decode(input: &[u8]) -> Option<Vec<u8>> {
    let mut out = vec![0u8; max_decoded_len(input.len())];
    let written = decode_into(input, &mut out)?;
    out.truncate(written);
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_uses_url_alphabet_without_padding() {
        // 0xfb 0xff encodes to "+/8=" in the standard alphabet
        assert_eq!(encode(&[0xfb, 0xff]), "-_8");
        assert_eq!(encode(b"f"), "Zg");
        assert_eq!(encode(b"fo"), "Zm8");
        assert_eq!(encode(b"foo"), "Zm9v");
        assert_eq!(encode(b""), "");
    }

    #[test]
    fn test_decode_reconstructs_trailing_group() {
        assert_eq!(decode(b"Zg").unwrap(), b"f");
        assert_eq!(decode(b"Zm8").unwrap(), b"fo");
        assert_eq!(decode(b"Zm9v").unwrap(), b"foo");
        assert_eq!(decode(b"Zm9vYg").unwrap(), b"foob");
        assert_eq!(decode(b"-_8").unwrap(), vec![0xfb, 0xff]);
    }

    #[test]
    fn test_decode_rejects_malformed_input() {
        // Standard alphabet characters
        assert!(decode(b"+/8").is_none());
        // Padding is not part of the wire format
        assert!(decode(b"Zg==").is_none());
        // One leftover character can never encode a byte
        assert!(decode(b"Zm9vY").is_none());
        assert!(decode(b"Z").is_none());
        // Non-ASCII
        assert!(decode("Zm9v\u{e9}".as_bytes()).is_none());
    }

    #[test]
    fn test_scratch_buffers() {
        let input = b"header.payload";
        let mut encoded = [0u8; 64];
        assert!(max_encoded_len(input.len()) <= encoded.len());
        let n = encode_into(input, &mut encoded).unwrap();

        let mut decoded = [0u8; 64];
        let m = decode_into(&encoded[..n], &mut decoded).unwrap();
        assert_eq!(&decoded[..m], input);
    }

    #[test]
    fn test_scratch_buffer_too_small() {
        let mut tiny = [0u8; 2];
        assert!(encode_into(b"foo", &mut tiny).is_none());
        assert!(decode_into(b"Zm9vYmFy", &mut tiny).is_none());
    }

    #[test]
    fn test_encode_to_string_appends() {
        let mut s = String::from("x.");
        encode_to_string(b"foo", &mut s);
        assert_eq!(s, "x.Zm9v");
    }
}
