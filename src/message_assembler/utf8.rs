//! Incremental UTF-8 validation across payload chunks.

/// Validates text split at arbitrary byte boundaries.
///
/// A code point cut by a chunk boundary is carried over (at most three
/// bytes) and checked once the next chunk arrives.
#[derive(Clone, Debug, Default)]
pub(crate) struct Utf8Validator {
    carry: Vec<u8>,
}

impl Utf8Validator {
    /// Check the next chunk. Returns `false` once the text is known to be
    /// invalid.
    pub(crate) fn feed(&mut self, chunk: &[u8]) -> bool {
        let joined;
        let bytes = if self.carry.is_empty() {
            chunk
        } else {
            self.carry.extend_from_slice(chunk);
            joined = std::mem::take(&mut self.carry);
            &joined[..]
        };
        match std::str::from_utf8(bytes) {
            Ok(_) => true,
            Err(err) if err.error_len().is_none() => {
                self.carry = bytes[err.valid_up_to()..].to_vec();
                true
            }
            Err(_) => false,
        }
    }

    /// Whether the text ended on a code point boundary.
    pub(crate) fn is_complete(&self) -> bool { self.carry.is_empty() }
}
