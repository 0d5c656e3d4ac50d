//! String ⇄ code point array marshaling.
//!
//! Scripting layers exchange strings with the runtime as arrays of Unicode
//! scalar values. The marshaling runs through a process-wide UTF-32
//! translator (4-byte little-endian units), initialized once on first use and
//! registered like any other encoding.

use std::sync::{Arc, OnceLock};

use crate::{registry, ConversionEngine, Error, Result, Translator};

const UTF32_NAME: &str = "UTF-32";

fn utf32() -> &'static Arc<Translator> {
    static UTF32: OnceLock<Arc<Translator>> = OnceLock::new();
    UTF32.get_or_init(|| {
        registry()
            .get(UTF32_NAME)
            .expect("UTF-32 is built into the default codec service")
    })
}

/// Expand text into its Unicode scalar values.
///
/// ```rust
/// assert_eq!(charbridge::codepoints::str_to_codepoints("hé"), [0x68, 0xE9]);
/// ```
pub fn str_to_codepoints(text: &str) -> Vec<u32> {
    let converted = ConversionEngine::new().translate_str(Some(utf32().outgoing()), text);
    converted
        .as_bytes()
        .chunks_exact(4)
        .map(|unit| u32::from_le_bytes([unit[0], unit[1], unit[2], unit[3]]))
        .collect()
}

/// Build text from an array of Unicode scalar values.
///
/// Surrogates and values above U+10FFFF are rejected with
/// [`Error::InvalidCodepoint`].
pub fn codepoints_to_str(codepoints: &[u32]) -> Result<String> {
    if let Some(position) = codepoints.iter().position(|&v| char::from_u32(v).is_none()) {
        return Err(Error::InvalidCodepoint {
            value: codepoints[position],
            position,
        });
    }
    let mut units = Vec::with_capacity(codepoints.len() * 4);
    for value in codepoints {
        units.extend_from_slice(&value.to_le_bytes());
    }
    let converted = ConversionEngine::new().translate(Some(utf32().incoming()), &units);
    Ok(String::from_utf8_lossy(converted.as_bytes()).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_expands_to_scalar_values() {
        assert_eq!(str_to_codepoints("abc"), [0x61, 0x62, 0x63]);
        assert_eq!(str_to_codepoints(""), []);
    }

    #[test]
    fn test_multibyte_characters_are_single_values() {
        assert_eq!(str_to_codepoints("é中\u{1F30D}"), [0xE9, 0x4E2D, 0x1F30D]);
    }

    #[test]
    fn test_round_trip() {
        let text = "mixed ascii, accents é, CJK 中, astral \u{1F30D}";
        let values = str_to_codepoints(text);
        assert_eq!(codepoints_to_str(&values).unwrap(), text);
    }

    #[test]
    fn test_invalid_scalar_values_are_rejected_with_position() {
        let err = codepoints_to_str(&[0x41, 0xD800, 0x42]).unwrap_err();
        assert_eq!(
            err,
            Error::InvalidCodepoint {
                value: 0xD800,
                position: 1
            }
        );
        let err = codepoints_to_str(&[0x110000]).unwrap_err();
        assert_eq!(
            err,
            Error::InvalidCodepoint {
                value: 0x110000,
                position: 0
            }
        );
    }

    #[test]
    fn test_marshaling_registers_the_utf32_singleton_once() {
        str_to_codepoints("x");
        str_to_codepoints("y");
        let names = registry().names();
        assert_eq!(
            names.iter().filter(|n| n.as_str() == UTF32_NAME).count(),
            1
        );
    }
}
