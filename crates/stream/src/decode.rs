/// Streamed byte-to-text decoder.
///
/// A network read can end in the middle of a multi-byte UTF-8 sequence; the
/// incomplete tail is carried over and completed by the next chunk instead
/// of being dropped. Genuinely invalid bytes decode to the replacement
/// character so one bad byte cannot stall the stream.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    carry: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes the next byte chunk, holding back a partial trailing code point.
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.carry.extend_from_slice(bytes);
        let buffer = std::mem::take(&mut self.carry);

        let mut decoded = String::with_capacity(buffer.len());
        let mut offset = 0;
        while offset < buffer.len() {
            match std::str::from_utf8(&buffer[offset..]) {
                Ok(valid) => {
                    decoded.push_str(valid);
                    offset = buffer.len();
                }
                Err(error) => {
                    let valid_to = offset + error.valid_up_to();
                    if let Ok(valid) = std::str::from_utf8(&buffer[offset..valid_to]) {
                        decoded.push_str(valid);
                    }
                    match error.error_len() {
                        Some(invalid_len) => {
                            decoded.push(char::REPLACEMENT_CHARACTER);
                            offset = valid_to + invalid_len;
                        }
                        None => {
                            // Incomplete sequence at the chunk boundary; keep
                            // it for the next read.
                            self.carry = buffer[valid_to..].to_vec();
                            return decoded;
                        }
                    }
                }
            }
        }
        decoded
    }

    /// Bytes currently held back as an incomplete sequence.
    pub fn pending(&self) -> &[u8] {
        &self.carry
    }
}
