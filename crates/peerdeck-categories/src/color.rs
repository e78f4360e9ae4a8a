//! Color translation between hex `#RRGGBB` and the packed 24-bit BGR
//! integers ed2k clients use. Both directions are pure and total over their
//! domains and round-trip exactly.

use crate::error::CategoryError;

/// Convert `#RRGGBB` into the packed BGR integer.
///
/// # Errors
///
/// Returns [`CategoryError::InvalidColor`] for anything that is not a
/// seven-character `#`-prefixed hex triple.
pub fn hex_color_to_amule(hex: &str) -> Result<u32, CategoryError> {
    let digits = hex
        .strip_prefix('#')
        .filter(|rest| rest.len() == 6 && rest.chars().all(|c| c.is_ascii_hexdigit()))
        .ok_or_else(|| CategoryError::InvalidColor(hex.to_string()))?;

    let r = u32::from_str_radix(&digits[0..2], 16).expect("validated hex");
    let g = u32::from_str_radix(&digits[2..4], 16).expect("validated hex");
    let b = u32::from_str_radix(&digits[4..6], 16).expect("validated hex");
    Ok((b << 16) | (g << 8) | r)
}

/// Convert a packed BGR integer into `#RRGGBB` (lowercase hex).
#[must_use]
pub fn amule_color_to_hex(packed: u32) -> String {
    let b = (packed >> 16) & 0xff;
    let g = (packed >> 8) & 0xff;
    let r = packed & 0xff;
    format!("#{r:02x}{g:02x}{b:02x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_values_translate() {
        assert_eq!(hex_color_to_amule("#ff0000").unwrap(), 0x0000ff);
        assert_eq!(hex_color_to_amule("#0000ff").unwrap(), 0xff0000);
        assert_eq!(amule_color_to_hex(0x0000ff), "#ff0000");
    }

    #[test]
    fn round_trips_both_directions() {
        for packed in [0_u32, 0x0000ff, 0x00ff00, 0xff0000, 0x123456, 0xffffff] {
            assert_eq!(hex_color_to_amule(&amule_color_to_hex(packed)).unwrap(), packed);
        }
        for hex in ["#000000", "#abcdef", "#ffffff", "#102030"] {
            assert_eq!(
                amule_color_to_hex(hex_color_to_amule(hex).unwrap()),
                *hex
            );
        }
    }

    #[test]
    fn case_is_normalized() {
        let packed = hex_color_to_amule("#ABCDEF").unwrap();
        assert_eq!(amule_color_to_hex(packed), "#abcdef");
    }

    #[test]
    fn malformed_colors_are_rejected() {
        for bad in ["abcdef", "#abcde", "#abcdefg", "#zzzzzz", ""] {
            assert!(hex_color_to_amule(bad).is_err(), "'{bad}' should fail");
        }
    }
}
