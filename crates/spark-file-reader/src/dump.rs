//! 十六进制转储格式化。

use core::fmt::Write as _;

/// 每行展示的字节数。
pub const BYTES_PER_LINE: usize = 16;

/// 把字节格式化为“偏移 + 十六进制 + 可打印字符”的多行文本。
pub fn hex_dump(base_offset: u64, bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 4 + 16);
    for (index, line) in bytes.chunks(BYTES_PER_LINE).enumerate() {
        let offset = base_offset + (index * BYTES_PER_LINE) as u64;
        let encoded = hex::encode(line);
        let mut grouped = String::with_capacity(BYTES_PER_LINE * 3);
        for (position, pair) in encoded.as_bytes().chunks(2).enumerate() {
            if position > 0 {
                grouped.push(' ');
            }
            grouped.push_str(core::str::from_utf8(pair).unwrap_or("??"));
        }
        let printable: String = line
            .iter()
            .map(|&byte| {
                if byte.is_ascii_graphic() || byte == b' ' {
                    byte as char
                } else {
                    '.'
                }
            })
            .collect();
        let _ = writeln!(
            out,
            "{offset:08x}  {grouped:<width$}  |{printable}|",
            width = BYTES_PER_LINE * 3 - 1
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_offset_hex_and_ascii_columns() {
        let dump = hex_dump(0x10, b"Hi\x00");
        assert_eq!(dump.lines().count(), 1);
        assert!(dump.starts_with("00000010  48 69 00"));
        assert!(dump.trim_end().ends_with("|Hi.|"));
    }

    #[test]
    fn wraps_every_sixteen_bytes() {
        let bytes: Vec<u8> = (0u8..40).collect();
        let dump = hex_dump(0, &bytes);
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("00000010  10 11"));
        assert!(lines[2].starts_with("00000020  20 21"));
    }
}
