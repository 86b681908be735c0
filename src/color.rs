use std::num::ParseIntError;
use std::str::FromStr;

/// Prompt OS-icon color when the operator does not pick one.
pub const DEFAULT_OS_ICON_COLOR: ColorId = ColorId(38);

/// An xterm 256-color palette index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorId(pub u8);

#[derive(Debug)]
pub enum ColorError {
    InvalidFormat,
    OutOfRange(i64),
    ParseError(ParseIntError),
}

impl std::fmt::Display for ColorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColorError::InvalidFormat => {
                write!(f, "Invalid color id (expected a number from 0 to 255)")
            }
            ColorError::OutOfRange(n) => write!(f, "Color id {} is out of range (0-255)", n),
            ColorError::ParseError(e) => write!(f, "Failed to parse color id: {}", e),
        }
    }
}

impl std::error::Error for ColorError {}

impl From<ParseIntError> for ColorError {
    fn from(e: ParseIntError) -> Self {
        ColorError::ParseError(e)
    }
}

impl FromStr for ColorId {
    type Err = ColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit() || b == b'-') {
            return Err(ColorError::InvalidFormat);
        }
        let n: i64 = s.parse()?;
        u8::try_from(n).map(ColorId).map_err(|_| ColorError::OutOfRange(n))
    }
}

impl std::fmt::Display for ColorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// All 256 palette entries as colored swatches: the 16 system colors in rows
/// of eight, then the cube and grayscale ramp in rows of six.
pub fn palette_table() -> String {
    let mut out = String::new();
    for i in 0..=255u16 {
        out.push_str(&format!("\x1b[48;5;{i}m  \x1b[0m\x1b[38;5;{i}m{i:>4}\x1b[0m "));
        let row_end = if i < 16 { i % 8 == 7 } else { (i - 16) % 6 == 5 };
        if row_end {
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ids() {
        let cases = [
            ("0", Some(0)),
            ("38", Some(38)),
            (" 255 ", Some(255)),
            ("256", None),
            ("-1", None),
            ("", None),
            ("red", None),
            ("3.5", None),
        ];
        for (input, expected) in cases {
            assert_eq!(input.parse::<ColorId>().ok().map(|c| c.0), expected, "{input:?}");
        }
    }

    #[test]
    fn out_of_range_names_the_value() {
        let err = "300".parse::<ColorId>().unwrap_err();
        assert_eq!(err.to_string(), "Color id 300 is out of range (0-255)");
    }

    #[test]
    fn palette_lists_every_id() {
        let table = palette_table();
        assert!(table.contains("\x1b[48;5;0m"));
        assert!(table.contains("\x1b[48;5;255m"));
        // 2 rows of system colors, then 240 / 6 rows.
        assert_eq!(table.lines().count(), 2 + 40);
    }
}
