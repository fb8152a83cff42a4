//! RGB color value type and blending primitives.
//!
//! Colors live as three 0–255 channels; the `#RRGGBB` hex form exists only at
//! the serde/Display boundary. "No color" is modeled as `Option<Rgb>` — blends
//! treat a missing side as transparent and return the other side unchanged.

use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Golden-ratio conjugate, used as the hue increment base in [`jitter`].
const PHI: f64 = 0.618_033_988_75;

/// An opaque RGB color with 8-bit channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#RRGGBB` (leading `#` optional, case-insensitive).
    pub fn from_hex(s: &str) -> Option<Self> {
        let h = s.trim().trim_start_matches('#');
        if h.len() != 6 || !h.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let r = u8::from_str_radix(&h[0..2], 16).ok()?;
        let g = u8::from_str_radix(&h[2..4], 16).ok()?;
        let b = u8::from_str_radix(&h[4..6], 16).ok()?;
        Some(Self { r, g, b })
    }

    /// Canonical uppercase hex form.
    pub fn to_hex(self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }

    #[inline]
    fn channels(self) -> [f64; 3] {
        [self.r as f64, self.g as f64, self.b as f64]
    }

    fn from_channels(ch: [f64; 3]) -> Self {
        let clamp = |v: f64| v.clamp(0.0, 255.0) as u8;
        Self { r: clamp(ch[0]), g: clamp(ch[1]), b: clamp(ch[2]) }
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

impl Serialize for Rgb {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

struct RgbVisitor;

impl Visitor<'_> for RgbVisitor {
    type Value = Rgb;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a '#RRGGBB' hex color string")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Rgb, E> {
        Rgb::from_hex(v).ok_or_else(|| E::custom(format!("invalid hex color '{v}'")))
    }
}

impl<'de> Deserialize<'de> for Rgb {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Rgb, D::Error> {
        deserializer.deserialize_str(RgbVisitor)
    }
}

/// Linear per-channel interpolation at weight `a` (0 = all `c1`, 1 = all `c2`).
/// A missing side returns the other side unchanged; two missing sides stay
/// missing. Channels truncate toward zero, matching the reference outputs.
pub fn mix_two(c1: Option<Rgb>, c2: Option<Rgb>, a: f64) -> Option<Rgb> {
    match (c1, c2) {
        (None, None) => None,
        (Some(c), None) | (None, Some(c)) => Some(c),
        (Some(c1), Some(c2)) => {
            let x = c1.channels();
            let y = c2.channels();
            let lerp = |i: usize| ((1.0 - a) * x[i] + a * y[i]).floor();
            Some(Rgb::from_channels([lerp(0), lerp(1), lerp(2)]))
        }
    }
}

/// Area-weighted mean per channel over `(color, weight)` pairs, rounded to the
/// nearest integer. Pairs with non-positive weight are ignored; returns `None`
/// when nothing contributes.
pub fn mix_weighted(pairs: &[(Rgb, f64)]) -> Option<Rgb> {
    let mut sum = [0.0f64; 3];
    let mut total = 0.0f64;
    for &(c, w) in pairs {
        if !(w > 0.0) {
            continue;
        }
        let ch = c.channels();
        for i in 0..3 {
            sum[i] += ch[i] * w;
        }
        total += w;
    }
    if total <= 0.0 {
        return None;
    }
    Some(Rgb::from_channels([
        (sum[0] / total).round(),
        (sum[1] / total).round(),
        (sum[2] / total).round(),
    ]))
}

/// Small reproducible hue/lightness perturbation, keyed by the rank `k`.
///
/// Hue advances by `(k + 1) · φ · dh` (mod 1) so consecutive ranks land far
/// apart on the hue circle; lightness moves by `±dl` with the sign alternating
/// with `k`. Saturation is untouched.
pub fn jitter(c: Rgb, k: usize, dh: f64, dl: f64) -> Rgb {
    let (h, l, s) = rgb_to_hls(c);
    let h = (h + (k as f64 + 1.0) * PHI * dh).rem_euclid(1.0);
    let sign = if k % 2 == 0 { 1.0 } else { -1.0 };
    let l = (l + sign * dl).clamp(0.0, 1.0);
    hls_to_rgb(h, l, s)
}

/// RGB (0–255) → HLS (each 0–1).
fn rgb_to_hls(c: Rgb) -> (f64, f64, f64) {
    let r = c.r as f64 / 255.0;
    let g = c.g as f64 / 255.0;
    let b = c.b as f64 / 255.0;
    let maxc = r.max(g).max(b);
    let minc = r.min(g).min(b);
    let l = (minc + maxc) / 2.0;
    if maxc == minc {
        return (0.0, l, 0.0);
    }
    let delta = maxc - minc;
    let s = if l <= 0.5 { delta / (maxc + minc) } else { delta / (2.0 - maxc - minc) };
    let rc = (maxc - r) / delta;
    let gc = (maxc - g) / delta;
    let bc = (maxc - b) / delta;
    let h = if r == maxc {
        bc - gc
    } else if g == maxc {
        2.0 + rc - bc
    } else {
        4.0 + gc - rc
    };
    ((h / 6.0).rem_euclid(1.0), l, s)
}

/// HLS (each 0–1) → RGB (0–255).
fn hls_to_rgb(h: f64, l: f64, s: f64) -> Rgb {
    if s == 0.0 {
        let v = (l * 255.0).clamp(0.0, 255.0) as u8;
        return Rgb::new(v, v, v);
    }
    let m2 = if l <= 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let m1 = 2.0 * l - m2;
    let v = |hue: f64| -> f64 {
        let hue = hue.rem_euclid(1.0);
        if hue < 1.0 / 6.0 {
            m1 + (m2 - m1) * hue * 6.0
        } else if hue < 0.5 {
            m2
        } else if hue < 2.0 / 3.0 {
            m1 + (m2 - m1) * (2.0 / 3.0 - hue) * 6.0
        } else {
            m1
        }
    };
    Rgb::from_channels([
        v(h + 1.0 / 3.0) * 255.0,
        v(h) * 255.0,
        v(h - 1.0 / 3.0) * 255.0,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trip() {
        let c = Rgb::from_hex("#cd5c5c").unwrap();
        assert_eq!(c, Rgb::new(0xCD, 0x5C, 0x5C));
        assert_eq!(c.to_hex(), "#CD5C5C");
        assert_eq!(Rgb::from_hex("CD5C5C"), Some(c));
        assert_eq!(Rgb::from_hex("#cd5c"), None);
        assert_eq!(Rgb::from_hex("not a color"), None);
    }

    #[test]
    fn mix_two_endpoint_weights_are_identity() {
        let a = Rgb::new(10, 200, 30);
        let b = Rgb::new(250, 0, 130);
        assert_eq!(mix_two(Some(a), Some(b), 0.0), Some(a));
        assert_eq!(mix_two(Some(a), Some(b), 1.0), Some(b));
    }

    #[test]
    fn mix_two_missing_side_returns_other() {
        let a = Rgb::new(1, 2, 3);
        assert_eq!(mix_two(Some(a), None, 0.5), Some(a));
        assert_eq!(mix_two(None, Some(a), 0.5), Some(a));
        assert_eq!(mix_two(None, None, 0.5), None);
    }

    #[test]
    fn mix_weighted_is_scale_invariant() {
        let pairs = [
            (Rgb::new(255, 0, 0), 2.0),
            (Rgb::new(0, 255, 0), 1.0),
            (Rgb::new(0, 0, 255), 3.0),
        ];
        let scaled: Vec<(Rgb, f64)> = pairs.iter().map(|&(c, w)| (c, w * 7.5)).collect();
        assert_eq!(mix_weighted(&pairs), mix_weighted(&scaled));
    }

    #[test]
    fn mix_weighted_ignores_nonpositive_weights() {
        let c = Rgb::new(40, 80, 120);
        let pairs = [(Rgb::new(255, 255, 255), 0.0), (c, 5.0), (Rgb::new(0, 0, 0), -1.0)];
        assert_eq!(mix_weighted(&pairs), Some(c));
        assert_eq!(mix_weighted(&[(c, 0.0)]), None);
    }

    #[test]
    fn jitter_separates_ranks() {
        let base = Rgb::from_hex("#DDDDDD").unwrap();
        let a = jitter(base, 0, 0.05, 0.02);
        let b = jitter(base, 1, 0.05, 0.02);
        assert_ne!(a, base);
        assert_ne!(a, b);
        // Perturbation stays small: each channel moves by less than 32/255.
        let near = |x: Rgb, y: Rgb| {
            (x.r as i32 - y.r as i32).abs() < 32
                && (x.g as i32 - y.g as i32).abs() < 32
                && (x.b as i32 - y.b as i32).abs() < 32
        };
        assert!(near(a, base) && near(b, base));
    }

    #[test]
    fn jitter_is_reproducible() {
        let base = Rgb::new(120, 60, 200);
        assert_eq!(jitter(base, 2, 0.05, 0.015), jitter(base, 2, 0.05, 0.015));
    }

    #[test]
    fn hls_round_trip_on_saturated_color() {
        let c = Rgb::new(51, 204, 204);
        let (h, l, s) = rgb_to_hls(c);
        let back = hls_to_rgb(h, l, s);
        assert!((back.r as i32 - c.r as i32).abs() <= 1);
        assert!((back.g as i32 - c.g as i32).abs() <= 1);
        assert!((back.b as i32 - c.b as i32).abs() <= 1);
    }
}
