//! Character reference decoding for markup text and attribute values.
//!
//! Contract:
//! - Named references decoded: `&amp;`, `&lt;`, `&gt;`, `&quot;`, `&apos;`, `&nbsp;`.
//! - Numeric references decode only when well-formed and `;`-terminated, decimal
//!   (`&#169;`) or hex (`&#xA9;`), and only to valid Unicode scalar values.
//! - Anything else (unknown names, missing `;`, overlong digit runs) is copied
//!   through unchanged.
use memchr::memchr;
use std::borrow::Cow;

const NAMED: &[(&[u8], char)] = &[
    (b"amp;", '&'),
    (b"lt;", '<'),
    (b"gt;", '>'),
    (b"quot;", '"'),
    (b"apos;", '\''),
    (b"nbsp;", '\u{00A0}'),
];

// 0x10FFFF / 1114111
const MAX_HEX_DIGITS: usize = 6;
const MAX_DEC_DIGITS: usize = 7;

pub(crate) fn decode_entities(s: &str) -> Cow<'_, str> {
    let bytes = s.as_bytes();
    let Some(first) = memchr(b'&', bytes) else {
        return Cow::Borrowed(s);
    };

    let mut out = String::with_capacity(s.len());
    out.push_str(&s[..first]);
    let mut i = first;

    while i < bytes.len() {
        let Some(rel) = memchr(b'&', &bytes[i..]) else {
            out.push_str(&s[i..]);
            break;
        };
        out.push_str(&s[i..i + rel]);
        i += rel;

        match decode_one(&bytes[i + 1..]) {
            Some((ch, consumed)) => {
                out.push(ch);
                i += 1 + consumed;
            }
            None => {
                out.push('&');
                i += 1;
            }
        }
    }

    Cow::Owned(out)
}

/// Decode the reference following an `&`. Returns the char and the number of
/// bytes consumed after the ampersand.
fn decode_one(rest: &[u8]) -> Option<(char, usize)> {
    if let Some(&(name, ch)) = NAMED.iter().find(|(name, _)| rest.starts_with(name)) {
        return Some((ch, name.len()));
    }

    let digits = rest.strip_prefix(b"#")?;
    let (radix, digits, prefix_len, max) = match digits.first() {
        Some(b'x' | b'X') => (16, &digits[1..], 2, MAX_HEX_DIGITS),
        _ => (10, digits, 1, MAX_DEC_DIGITS),
    };

    let end = digits.iter().position(|b| *b == b';')?;
    if end == 0 || end > max {
        return None;
    }
    let raw = std::str::from_utf8(&digits[..end]).ok()?;
    let value = u32::from_str_radix(raw, radix).ok()?;
    let ch = char::from_u32(value)?;
    Some((ch, prefix_len + end + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_borrowed() {
        assert!(matches!(decode_entities("no refs here"), Cow::Borrowed(_)));
    }

    #[test]
    fn named_and_numeric_references() {
        assert_eq!(decode_entities("a &amp; b &lt;c&gt;"), "a & b <c>");
        assert_eq!(decode_entities("&#169;&#xA9;&#XA9;"), "\u{a9}\u{a9}\u{a9}");
        assert_eq!(decode_entities("&quot;x&apos;"), "\"x'");
    }

    #[test]
    fn malformed_references_pass_through() {
        assert_eq!(decode_entities("&unknown; & &#; &#12"), "&unknown; & &#; &#12");
        assert_eq!(decode_entities("&#xD800;"), "&#xD800;");
        assert_eq!(decode_entities("&#12345678;"), "&#12345678;");
    }

    #[test]
    fn multibyte_text_around_references() {
        assert_eq!(decode_entities("caf\u{e9} &amp; th\u{e9}"), "caf\u{e9} & th\u{e9}");
    }
}
