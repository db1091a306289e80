//! The client's 8-bit text encoding
//!
//! Windows-1252 with the client's own table for 0x80..=0x9F. Bytes the table
//! leaves undefined decode as `?`, and characters without a mapping encode as
//! `?`. Byte 0 is reserved as the string terminator.

/// Replacement byte for unmappable characters
pub const REPLACEMENT: u8 = b'?';

/// Characters for bytes 0x80..=0x9F. `'\0'` marks an undefined byte.
const HIGH_TABLE: [char; 32] = [
    '\u{20AC}', '\0', '\u{201A}', '\u{0192}', '\u{201E}', '\u{2026}', '\u{2020}', '\u{2021}',
    '\u{02C6}', '\u{2030}', '\u{0160}', '\u{2039}', '\u{0152}', '\0', '\u{017D}', '\0',
    '\0', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}', '\u{2022}', '\u{2013}', '\u{2014}',
    '\u{02DC}', '\u{2122}', '\u{0161}', '\u{203A}', '\u{0153}', '\0', '\u{017E}', '\u{0178}',
];

/// Encode one character
pub fn encode_char(c: char) -> u8 {
    let code = c as u32;
    if (1..0x80).contains(&code) || (0xA0..=0xFF).contains(&code) {
        return code as u8;
    }
    HIGH_TABLE
        .iter()
        .position(|&mapped| mapped != '\0' && mapped == c)
        .map(|i| 0x80 + i as u8)
        .unwrap_or(REPLACEMENT)
}

/// Decode one byte
pub fn decode_byte(b: u8) -> char {
    match b {
        0 => REPLACEMENT as char,
        0x80..=0x9F => match HIGH_TABLE[(b - 0x80) as usize] {
            '\0' => REPLACEMENT as char,
            c => c,
        },
        _ => b as char,
    }
}

/// Encode a string, appending to `out`
pub fn encode_into(s: &str, out: &mut Vec<u8>) {
    out.extend(s.chars().map(encode_char));
}

/// Decode a byte run into a string
pub fn decode(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| decode_byte(b)).collect()
}
