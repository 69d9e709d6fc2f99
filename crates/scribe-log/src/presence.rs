//! User ids and cursor colors.

use rand::distributions::Alphanumeric;
use rand::Rng;

const USER_ID_LEN: usize = 12;

/// A random id for a session that did not bring its own.
pub fn generate_user_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(USER_ID_LEN)
        .map(char::from)
        .collect()
}

/// A stable pastel color derived from the user id, as `#rrggbb`.
pub fn color_for_user(user_id: &str) -> String {
    let mut a: u32 = 1;
    for unit in user_id.encode_utf16() {
        a = 17 * (a + unit as u32) % 360;
    }
    hsl_to_hex(a as f64 / 360.0, 1.0, 0.75)
}

fn hsl_to_hex(h: f64, s: f64, l: f64) -> String {
    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    let channel = |t: f64| {
        let v = hue_to_rgb(p, q, t);
        (v * 255.0).round().clamp(0.0, 255.0) as u8
    };
    let (r, g, b) = (channel(h + 1.0 / 3.0), channel(h), channel(h - 1.0 / 3.0));
    format!("#{r:02x}{g:02x}{b:02x}")
}

fn hue_to_rgb(p: f64, q: f64, t: f64) -> f64 {
    let t = t.rem_euclid(1.0);
    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 0.5 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * (2.0 / 3.0 - t) * 6.0
    } else {
        p
    }
}
