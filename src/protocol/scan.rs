//! Lenient scanning of JSON text without building a value model.
//!
//! Provider payloads are only ever probed for a handful of string fields, so
//! everything here answers one question: "what is the next string value for
//! key K at or after offset O?". Missing keys, non-string values and
//! unterminated strings produce `None`, never an error.

use std::str::Chars;

/// A string value located by [`find_string_value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Found<'a> {
    /// Value between the quotes, still escaped.
    pub raw: &'a str,
    /// Offset just past the closing quote.
    pub end: usize,
}

impl Found<'_> {
    pub fn unescaped(&self) -> String {
        unescape(self.raw)
    }
}

/// Find the first scalar string value for `key` at or after byte offset `from`.
///
/// Occurrences of the key that are not followed by `:` and a string (a value
/// that happens to equal the key, an object, `null`, ...) are skipped.
pub fn find_string_value<'a>(text: &'a str, key: &str, from: usize) -> Option<Found<'a>> {
    let needle = format!("\"{key}\"");
    let bytes = text.as_bytes();
    let mut pos = from;

    loop {
        let rel = text.get(pos..)?.find(&needle)?;
        let key_end = pos + rel + needle.len();

        let colon = skip_ws(bytes, key_end);
        if bytes.get(colon) != Some(&b':') {
            pos = key_end;
            continue;
        }
        let open = skip_ws(bytes, colon + 1);
        if bytes.get(open) != Some(&b'"') {
            pos = key_end;
            continue;
        }

        let end = string_end(bytes, open)?;
        return Some(Found {
            raw: &text[open + 1..end - 1],
            end,
        });
    }
}

/// Iterate over every string value for `key`, in order of appearance.
///
/// Each step resumes past the previous value, so the scan always moves forward
/// and stops at the first unterminated value.
pub fn string_values<'a, 'k>(text: &'a str, key: &'k str) -> impl Iterator<Item = Found<'a>> + 'k
where
    'a: 'k,
{
    let mut pos = 0;
    std::iter::from_fn(move || {
        let found = find_string_value(text, key, pos)?;
        pos = found.end;
        Some(found)
    })
}

/// Text after the opening quote of the first string value for `key`, when that
/// value has started but not been terminated yet.
pub fn unterminated_string_value<'a>(text: &'a str, key: &str) -> Option<&'a str> {
    let needle = format!("\"{key}\"");
    let bytes = text.as_bytes();
    let key_end = text.find(&needle)? + needle.len();
    let colon = skip_ws(bytes, key_end);
    if bytes.get(colon) != Some(&b':') {
        return None;
    }
    let open = skip_ws(bytes, colon + 1);
    if bytes.get(open) != Some(&b'"') || string_end(bytes, open).is_some() {
        return None;
    }
    Some(&text[open + 1..])
}

/// Byte-level substring test, used on buffers that may end mid UTF-8 sequence.
pub fn contains_bytes(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() {
        return true;
    }
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Decode JSON string escapes in a single left-to-right pass.
///
/// Unknown escapes are kept verbatim. A lone or malformed `\u` sequence
/// becomes U+FFFD.
pub fn unescape(raw: &str) -> String {
    if !raw.contains('\\') {
        return raw.to_string();
    }

    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some('/') => out.push('/'),
            Some('b') => out.push('\u{8}'),
            Some('f') => out.push('\u{c}'),
            Some('u') => out.push(decode_unicode_escape(&mut chars)),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn decode_unicode_escape(chars: &mut Chars<'_>) -> char {
    let Some(hi) = read_hex4(chars) else {
        return char::REPLACEMENT_CHARACTER;
    };

    if (0xD800..0xDC00).contains(&hi) {
        let mut look = chars.clone();
        if look.next() == Some('\\') && look.next() == Some('u') {
            if let Some(lo) = read_hex4(&mut look) {
                if (0xDC00..0xE000).contains(&lo) {
                    *chars = look;
                    let cp = 0x10000 + ((hi - 0xD800) << 10) + (lo - 0xDC00);
                    return char::from_u32(cp).unwrap_or(char::REPLACEMENT_CHARACTER);
                }
            }
        }
        return char::REPLACEMENT_CHARACTER;
    }

    char::from_u32(hi).unwrap_or(char::REPLACEMENT_CHARACTER)
}

fn read_hex4(chars: &mut Chars<'_>) -> Option<u32> {
    let mut look = chars.clone();
    let mut value = 0u32;
    for _ in 0..4 {
        let digit = look.next()?.to_digit(16)?;
        value = value * 16 + digit;
    }
    *chars = look;
    Some(value)
}

fn skip_ws(bytes: &[u8], mut i: usize) -> usize {
    while let Some(&(b' ' | b'\n' | b'\r' | b'\t')) = bytes.get(i) {
        i += 1;
    }
    i
}

/// Offset just past the closing quote of the string opening at `open`.
fn string_end(bytes: &[u8], open: usize) -> Option<usize> {
    let mut i = open + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return Some(i + 1),
            _ => i += 1,
        }
    }
    None
}
