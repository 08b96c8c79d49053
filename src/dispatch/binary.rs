//! Numeric-to-binary parameter encoding.
//!
//! A float in [-1, 1] is sent as one sign boolean plus `bits` magnitude booleans.
//! The magnitude is `round(|value| * (2^bits - 1))`. Parameters go out sign first,
//! then least significant bit first:
//!
//! ```text
//! <name>Negative, <name>1, <name>2, <name>4, ... <name>2^(bits-1)
//! ```

pub const MAX_BITS: u8 = 16;

const SIGN_SUFFIX: &str = "Negative";

/// Sign and magnitude of an encoded value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryValue {
    pub negative: bool,
    pub magnitude: u32,
}

fn max_magnitude(bits: u8) -> u32 {
    (1u32 << bits) - 1
}

pub fn encode(value: f32, bits: u8) -> BinaryValue {
    let bits = bits.clamp(1, MAX_BITS);
    let clamped = if value.is_finite() {
        value.clamp(-1.0, 1.0)
    } else {
        0.0
    };
    BinaryValue {
        negative: clamped < 0.0,
        magnitude: (clamped.abs() * max_magnitude(bits) as f32).round() as u32,
    }
}

pub fn decode(encoded: BinaryValue, bits: u8) -> f32 {
    let bits = bits.clamp(1, MAX_BITS);
    let value = encoded.magnitude.min(max_magnitude(bits)) as f32 / max_magnitude(bits) as f32;
    if encoded.negative {
        -value
    } else {
        value
    }
}

/// The wire parameters for `value` under `name`, in transmission order.
pub fn bit_parameters(name: &str, value: f32, bits: u8) -> Vec<(String, bool)> {
    let bits = bits.clamp(1, MAX_BITS);
    let encoded = encode(value, bits);

    let mut params = Vec::with_capacity(bits as usize + 1);
    params.push((format!("{}{}", name, SIGN_SUFFIX), encoded.negative));
    for bit in 0..bits {
        params.push((
            format!("{}{}", name, 1u32 << bit),
            encoded.magnitude >> bit & 1 == 1,
        ));
    }
    params
}

/// Inverse of [`bit_parameters`]: sign flag then magnitude bits, LSB first.
pub fn decode_bits(negative: bool, bits_lsb_first: &[bool]) -> f32 {
    let width = bits_lsb_first.len().clamp(1, MAX_BITS as usize) as u8;
    let magnitude = bits_lsb_first
        .iter()
        .take(width as usize)
        .enumerate()
        .filter(|(_, set)| **set)
        .fold(0u32, |acc, (i, _)| acc | 1 << i);
    decode(
        BinaryValue {
            negative,
            magnitude,
        },
        width,
    )
}

/// Maps [-1, 1] onto [0, 1].
pub fn unsigned_remap(value: f32) -> f32 {
    (value + 1.0) / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_extremes() {
        assert_eq!(
            encode(1.0, 4),
            BinaryValue {
                negative: false,
                magnitude: 15
            }
        );
        assert_eq!(
            encode(-1.0, 4),
            BinaryValue {
                negative: true,
                magnitude: 15
            }
        );
        assert_eq!(
            encode(0.0, 4),
            BinaryValue {
                negative: false,
                magnitude: 0
            }
        );
    }

    #[test]
    fn parameters_are_sign_then_lsb_first() {
        // 0.6 * 7 = 4.2 -> 4 = 0b100
        let params = bit_parameters("Stick", -0.6, 3);
        assert_eq!(
            params,
            vec![
                ("StickNegative".to_string(), true),
                ("Stick1".to_string(), false),
                ("Stick2".to_string(), false),
                ("Stick4".to_string(), true),
            ]
        );
    }

    #[test]
    fn decoding_the_wire_bits_reconstructs_within_one_step() {
        for bits in [1u8, 2, 3, 4, 6, 8] {
            let step = 1.0 / max_magnitude(bits) as f32;
            for i in -20..=20 {
                let value = i as f32 / 20.0;
                let params = bit_parameters("P", value, bits);
                let negative = params[0].1;
                let magnitude: Vec<bool> = params[1..].iter().map(|(_, b)| *b).collect();
                let decoded = decode_bits(negative, &magnitude);
                assert!(
                    (decoded - value).abs() <= step + f32::EPSILON,
                    "bits={} value={} decoded={}",
                    bits,
                    value,
                    decoded
                );
            }
        }
    }

    #[test]
    fn out_of_range_values_saturate() {
        assert_eq!(encode(3.0, 2).magnitude, 3);
        assert_eq!(encode(f32::NAN, 2).magnitude, 0);
    }

    #[test]
    fn remaps_signed_to_unsigned() {
        assert_eq!(unsigned_remap(-1.0), 0.0);
        assert_eq!(unsigned_remap(0.0), 0.5);
        assert_eq!(unsigned_remap(1.0), 1.0);
    }
}
