//! Incremental UTF-8 decoding for response bodies that arrive in chunks.
//!
//! Multi-byte sequences split across chunk boundaries are carried over to the
//! next chunk. Invalid sequences decode to U+FFFD and decoding keeps going, so
//! a hostile body can never stall the reader.

const BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Accumulates a UTF-8 body chunk by chunk.
#[derive(Debug, Default)]
pub struct Utf8Stream {
    text: String,
    // Incomplete trailing sequence from the previous chunk (at most 3 bytes).
    carry: Vec<u8>,
    started: bool,
}

impl Utf8Stream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            text: String::with_capacity(bytes),
            carry: Vec::new(),
            started: false,
        }
    }

    /// Number of decoded bytes so far (excluding the pending carry).
    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.carry.is_empty()
    }

    pub fn push(&mut self, mut bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }

        if !self.started {
            // A leading byte-order mark can itself be split across chunks.
            let mut probe = std::mem::take(&mut self.carry);
            let take = BOM.len().saturating_sub(probe.len()).min(bytes.len());
            probe.extend_from_slice(&bytes[..take]);
            if probe.len() < BOM.len() && BOM.starts_with(&probe) {
                self.carry = probe;
                return;
            }
            self.started = true;
            bytes = &bytes[take..];
            if probe.as_slice() != BOM {
                self.decode(&probe);
            }
        }

        while !self.carry.is_empty() && !bytes.is_empty() {
            let expected = sequence_len(self.carry[0]);
            if expected == 0 {
                self.text.push('\u{FFFD}');
                self.carry.clear();
                break;
            }
            let needed = expected.saturating_sub(self.carry.len());
            if bytes.len() < needed {
                self.carry.extend_from_slice(bytes);
                return;
            }
            let mut scratch = std::mem::take(&mut self.carry);
            scratch.extend_from_slice(&bytes[..needed]);
            bytes = &bytes[needed..];
            self.decode(&scratch);
        }

        if !bytes.is_empty() {
            self.decode(bytes);
        }
    }

    /// Flush the carry (lossily) and hand back the decoded text.
    pub fn finish(mut self) -> String {
        if !self.carry.is_empty() {
            if !self.started && BOM.starts_with(&self.carry) && self.carry.len() < BOM.len() {
                // A body that is only a partial BOM is still garbage, not empty.
                self.text.push('\u{FFFD}');
            } else {
                self.text.push_str(&String::from_utf8_lossy(&self.carry));
            }
        }
        self.text
    }

    fn decode(&mut self, mut bytes: &[u8]) {
        while !bytes.is_empty() {
            match std::str::from_utf8(bytes) {
                Ok(s) => {
                    self.text.push_str(s);
                    return;
                }
                Err(err) => {
                    let (valid, rest) = bytes.split_at(err.valid_up_to());
                    self.text.push_str(&String::from_utf8_lossy(valid));
                    match err.error_len() {
                        Some(len) => {
                            self.text.push('\u{FFFD}');
                            bytes = &rest[len..];
                        }
                        None => {
                            self.carry.extend_from_slice(rest);
                            return;
                        }
                    }
                }
            }
        }
    }
}

fn sequence_len(first: u8) -> usize {
    match first {
        0x00..=0x7F => 1,
        0xC2..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF4 => 4,
        _ => 0,
    }
}

/// Decode a complete body in one go.
pub fn decode_body(bytes: &[u8]) -> String {
    let mut stream = Utf8Stream::with_capacity(bytes.len());
    stream.push(bytes);
    stream.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multibyte_split_across_chunks() {
        let mut stream = Utf8Stream::new();
        stream.push(b"a");
        stream.push(&[0xC3]);
        assert_eq!(stream.len(), 1);
        stream.push(&[0x97, b'b']);
        assert_eq!(stream.finish(), "a\u{d7}b");
    }

    #[test]
    fn four_byte_sequence_in_three_chunks() {
        let mut stream = Utf8Stream::new();
        stream.push(b"x");
        stream.push(&[0xF0]);
        stream.push(&[0x9F, 0x98]);
        stream.push(&[0x80, b'!']);
        assert_eq!(stream.finish(), "x\u{1F600}!");
    }

    #[test]
    fn leading_bom_is_stripped_even_when_split() {
        let mut stream = Utf8Stream::new();
        stream.push(&[0xEF]);
        stream.push(&[0xBB, 0xBF, b'<', b'a']);
        assert_eq!(stream.finish(), "<a");
    }

    #[test]
    fn invalid_bytes_make_progress() {
        assert_eq!(decode_body(&[b'<', 0xFF, b'>']), "<\u{FFFD}>");
    }

    #[test]
    fn truncated_suffix_is_flushed_lossily() {
        let mut stream = Utf8Stream::new();
        stream.push(b"ok");
        stream.push(&[0xE2, 0x82]);
        assert_eq!(stream.finish(), "ok\u{FFFD}");
    }

    #[test]
    fn empty_body_stays_empty() {
        let stream = Utf8Stream::new();
        assert!(stream.is_empty());
        assert_eq!(stream.finish(), "");
    }
}
