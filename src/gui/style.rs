use iced::Color;

const FALLBACK: Color = Color { r: 0.62, g: 0.62, b: 0.62, a: 1.0 };

/// Convert a "#RRGGBB" palette entry to an iced color.
pub fn hex_color(hex: &str) -> Color {
    let digits = match hex.strip_prefix('#') {
        Some(digits) if digits.len() == 6 => digits,
        _ => return FALLBACK,
    };

    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&digits[range], 16);
    match (channel(0..2), channel(2..4), channel(4..6)) {
        (Ok(r), Ok(g), Ok(b)) => Color::from_rgb8(r, g, b),
        _ => FALLBACK,
    }
}
