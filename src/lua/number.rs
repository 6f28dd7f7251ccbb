//! Numeric helpers shared by the operators and conversions
//!
//! Integer arithmetic wraps on overflow. Floor division and modulo round
//! towards negative infinity for both integers and floats.

use std::cmp::Ordering;

/// Floor division of integers. `b` must not be zero.
pub fn int_floor_div(a: i64, b: i64) -> i64 {
    if b == -1 {
        return a.wrapping_neg();
    }
    let q = a / b;
    if a % b != 0 && (a ^ b) < 0 {
        q - 1
    } else {
        q
    }
}

/// Floor modulo of integers. `b` must not be zero.
pub fn int_floor_mod(a: i64, b: i64) -> i64 {
    let r = a.wrapping_rem(b);
    if r != 0 && (r ^ b) < 0 {
        r + b
    } else {
        r
    }
}

pub fn float_floor_div(a: f64, b: f64) -> f64 {
    (a / b).floor()
}

pub fn float_floor_mod(a: f64, b: f64) -> f64 {
    let m = a % b;
    if (m > 0.0 && b < 0.0) || (m < 0.0 && b > 0.0) {
        m + b
    } else {
        m
    }
}

/// Logical left shift; negative counts shift right
pub fn shift_left(a: i64, n: i64) -> i64 {
    if n < 0 {
        shift_right(a, n.wrapping_neg())
    } else if n >= 64 {
        0
    } else {
        ((a as u64) << n) as i64
    }
}

/// Logical right shift; negative counts shift left
pub fn shift_right(a: i64, n: i64) -> i64 {
    if n < 0 {
        // i64::MIN negates to itself and must still shift everything out
        if n == i64::MIN {
            return 0;
        }
        shift_left(a, -n)
    } else if n >= 64 {
        0
    } else {
        ((a as u64) >> n) as i64
    }
}

/// Exact ordering of an integer against a float; none when `f` is NaN
pub fn cmp_int_float(i: i64, f: f64) -> Option<Ordering> {
    if f.is_nan() {
        return None;
    }
    if f >= 9_223_372_036_854_775_808.0 {
        return Some(Ordering::Less);
    }
    if f < -9_223_372_036_854_775_808.0 {
        return Some(Ordering::Greater);
    }
    let floor = f.floor();
    Some(match i.cmp(&(floor as i64)) {
        // i == floor(f) <= f
        Ordering::Equal if floor < f => Ordering::Less,
        other => other,
    })
}

/// Exact integer value of a float, if it has one in range
pub fn float_to_integer(f: f64) -> Option<i64> {
    // 2^63 is exactly representable; i64::MAX is not
    if f.fract() == 0.0 && f >= -9_223_372_036_854_775_808.0 && f < 9_223_372_036_854_775_808.0 {
        Some(f as i64)
    } else {
        None
    }
}

/// Parse an integer literal (decimal or hexadecimal). Hex wraps around.
pub fn parse_integer(s: &str) -> Option<i64> {
    let s = s.trim();
    let (neg, digits) = match s.as_bytes().first()? {
        b'-' => (true, &s[1..]),
        b'+' => (false, &s[1..]),
        _ => (false, s),
    };

    if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        if hex.is_empty() {
            return None;
        }
        let mut n: i64 = 0;
        for c in hex.chars() {
            n = n.wrapping_mul(16).wrapping_add(c.to_digit(16)? as i64);
        }
        return Some(if neg { n.wrapping_neg() } else { n });
    }

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    // Decimal overflow falls back to a float
    let n: i64 = digits.parse::<u64>().ok().and_then(|u| {
        if neg && u == 1u64 << 63 {
            Some(i64::MIN)
        } else {
            i64::try_from(u).ok().map(|v| if neg { -v } else { v })
        }
    })?;
    Some(n)
}

/// Parse a float literal, including hexadecimal floats. `inf` and `nan`
/// spellings are rejected.
pub fn parse_float(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() || s.contains(['n', 'N']) {
        return None;
    }
    let (neg, body) = match s.as_bytes()[0] {
        b'-' => (true, &s[1..]),
        b'+' => (false, &s[1..]),
        _ => (false, s),
    };
    let value = if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        parse_hex_float(hex)?
    } else {
        if body.starts_with(['+', '-']) {
            return None;
        }
        body.parse::<f64>().ok()?
    };
    Some(if neg { -value } else { value })
}

fn parse_hex_float(s: &str) -> Option<f64> {
    let (mantissa, exponent) = match s.find(['p', 'P']) {
        Some(pos) => (&s[..pos], s[pos + 1..].parse::<i32>().ok()?),
        None => (s, 0),
    };
    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }

    let mut value = 0.0f64;
    for c in int_part.chars() {
        value = value * 16.0 + c.to_digit(16)? as f64;
    }
    let mut scale = 1.0 / 16.0;
    for c in frac_part.chars() {
        value += c.to_digit(16)? as f64 * scale;
        scale /= 16.0;
    }
    Some(value * 2f64.powi(exponent))
}

/// Parse an integer in the given base (2..=36), as `tonumber(s, base)` does
pub fn parse_integer_base(s: &str, base: u32) -> Option<i64> {
    let s = s.trim();
    let (neg, digits) = match s.as_bytes().first()? {
        b'-' => (true, &s[1..]),
        _ => (false, s),
    };
    if digits.is_empty() {
        return None;
    }
    let mut n: i64 = 0;
    for c in digits.chars() {
        n = n.wrapping_mul(base as i64).wrapping_add(c.to_digit(base)? as i64);
    }
    Some(if neg { n.wrapping_neg() } else { n })
}

/// Format a float the way `%.14g` does, keeping a `.0` on integral values
pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        return if f.is_sign_negative() { "-nan" } else { "nan" }.to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_string();
    }

    let sci = format!("{:.13e}", f);
    let (mantissa, exp) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (sci.as_str(), 0),
    };

    let mut s = if !(-4..14).contains(&exp) {
        format!("{}e{}{:02}", trim_fraction(mantissa), if exp < 0 { '-' } else { '+' }, exp.abs())
    } else {
        let precision = (13 - exp) as usize;
        trim_fraction(&format!("{:.*}", precision, f)).to_string()
    };

    if !s.contains(['.', 'e']) {
        s.push_str(".0");
    }
    s
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}
