//! Canonical hex/ASCII dump
//!
//! Sixteen bytes per line: an 8-digit hex offset, the bytes in hex split into
//! two groups of eight, then the printable ASCII rendering between pipes.
//!
//! ```text
//! 00000000  47 45 54 20 2f 0d 0a 0d  0a                       |GET /....|
//! ```

use std::fmt::Write;

const BYTES_PER_LINE: usize = 16;

/// Render `data` as a multi-line hex dump. Empty input renders as an empty string.
pub fn hex_dump(data: &[u8]) -> String {
    let lines = data.len().div_ceil(BYTES_PER_LINE);
    let mut out = String::with_capacity(lines * 79);

    for (index, line) in data.chunks(BYTES_PER_LINE).enumerate() {
        let _ = write!(out, "{:08x}  ", index * BYTES_PER_LINE);

        for slot in 0..BYTES_PER_LINE {
            match line.get(slot) {
                Some(byte) => {
                    let _ = write!(out, "{:02x} ", byte);
                }
                None => out.push_str("   "),
            }
            if slot == 7 {
                out.push(' ');
            }
        }

        out.push_str(" |");
        out.extend(line.iter().map(|&b| printable(b)));
        out.push_str("|\n");
    }

    out
}

fn printable(byte: u8) -> char {
    if (32..=126).contains(&byte) {
        byte as char
    } else {
        '.'
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input() {
        assert_eq!(hex_dump(&[]), "");
    }

    #[test]
    fn test_full_and_partial_lines() {
        let dump = hex_dump(b"Go is an open source programming language.");
        let expected = "\
00000000  47 6f 20 69 73 20 61 6e  20 6f 70 65 6e 20 73 6f  |Go is an open so|
00000010  75 72 63 65 20 70 72 6f  67 72 61 6d 6d 69 6e 67  |urce programming|
00000020  20 6c 61 6e 67 75 61 67  65 2e                    | language.|
";
        assert_eq!(dump, expected);
    }

    #[test]
    fn test_non_printable_bytes() {
        let dump = hex_dump(b"GET /\r\n\r\n");
        assert_eq!(
            dump,
            "00000000  47 45 54 20 2f 0d 0a 0d  0a                       |GET /....|\n"
        );
    }

    #[test]
    fn test_exact_line_has_no_trailing_partial() {
        let dump = hex_dump(&[0xffu8; 16]);
        assert_eq!(dump.lines().count(), 1);
        assert!(dump.ends_with("ff ff  |................|\n"));
    }
}
