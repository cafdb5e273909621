//! Deterministic hint colors and convergence-driven blending.

/// Base color used when a hint carries none.
pub const DEFAULT_BASE: &str = "#6366f1";
/// Dull target the blend moves toward as convergence drops (slate-800).
const DULL: Rgb = Rgb(30, 41, 59);
/// Golden-angle step keeps consecutive ids far apart on the hue wheel.
const HUE_STEP: f64 = 137.508;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
  pub fn parse_hex(s: &str) -> Option<Self> {
    let hex = s.strip_prefix('#')?;
    if hex.len() != 6 || !hex.is_ascii() {
      return None;
    }
    let ch = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some(Rgb(ch(0)?, ch(2)?, ch(4)?))
  }

  pub fn to_hex(self) -> String {
    format!("#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
  }
}

fn channel(v: f64) -> u8 {
  (v.round()).clamp(0.0, 255.0) as u8
}

/// HSL (degrees, percent, percent) to `#rrggbb`.
pub fn hsl_to_hex(h: f64, s: f64, l: f64) -> String {
  let l = l / 100.0;
  let a = s * l.min(1.0 - l) / 100.0;
  let f = |n: f64| {
    let k = (n + h / 30.0) % 12.0;
    let c = l - a * (k - 3.0).min(9.0 - k).min(1.0).max(-1.0);
    channel(255.0 * c)
  };
  Rgb(f(0.0), f(8.0), f(4.0)).to_hex()
}

/// Stable pastel color for a hint id.
pub fn color_from_id(id: i64) -> String {
  let hue = (id as f64 * HUE_STEP).rem_euclid(360.0);
  hsl_to_hex(hue, 75.0, 60.0)
}

/// Blend `base` toward a dull slate by `1 - convergence`.
/// Full convergence keeps the base color; non-finite convergence returns it untouched.
pub fn color_with_convergence(base: Option<&str>, convergence: f64) -> String {
  let base = base.unwrap_or(DEFAULT_BASE);
  if !convergence.is_finite() {
    return base.to_string();
  }
  let Some(Rgb(r, g, b)) = Rgb::parse_hex(base) else {
    return base.to_string();
  };
  let amount = convergence.clamp(0.0, 1.0);
  let mix = |c: u8, t: u8| channel(c as f64 * amount + t as f64 * (1.0 - amount));
  Rgb(mix(r, DULL.0), mix(g, DULL.1), mix(b, DULL.2)).to_hex()
}
