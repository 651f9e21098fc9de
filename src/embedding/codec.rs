// SPDX-License-Identifier: MIT OR Apache-2.0

//! Text form of embedding vectors.
//!
//! Vectors are exchanged with the candidate store and with transports as
//! comma-separated decimals with six fractional digits.

use crate::errors::{Error, Result};

/// Fractional digits written per component.
pub const VECTOR_PRECISION: usize = 6;

/// Formats a vector as `x0,x1,...` with [`VECTOR_PRECISION`] digits.
pub fn format_vector(vector: &[f32]) -> String {
    vector
        .iter()
        .map(|value| format!("{:.*}", VECTOR_PRECISION, value))
        .collect::<Vec<_>>()
        .join(",")
}

/// Parses the comma-separated form. An empty (or blank) string is the empty vector.
pub fn parse_vector(text: &str) -> Result<Vec<f32>> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(Vec::new());
    }

    text.split(',')
        .enumerate()
        .map(|(i, raw)| {
            let raw = raw.trim();
            let value = raw.parse::<f32>().map_err(|_| {
                Error::VectorFormat(format!("component {} is not a number: '{}'", i, raw))
            })?;
            if !value.is_finite() {
                return Err(Error::VectorFormat(format!(
                    "component {} is not finite: '{}'",
                    i, raw
                )));
            }
            Ok(value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_precision() {
        assert_eq!(format_vector(&[0.0, 1.5, -0.25]), "0.000000,1.500000,-0.250000");
        assert_eq!(format_vector(&[1.0 / 3.0]), "0.333333");
        assert_eq!(format_vector(&[]), "");
    }

    #[test]
    fn test_parse() {
        assert_eq!(parse_vector("1.0, 2.5,-3").unwrap(), vec![1.0, 2.5, -3.0]);
        assert!(parse_vector("").unwrap().is_empty());
        assert!(parse_vector("   ").unwrap().is_empty());
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse_vector("1.0,,2.0"), Err(Error::VectorFormat(_))));
        assert!(matches!(parse_vector("1.0,abc"), Err(Error::VectorFormat(_))));
        assert!(matches!(parse_vector("NaN"), Err(Error::VectorFormat(_))));
    }

    #[test]
    fn test_formatted_text_parses_back_within_precision() {
        let original = [0.123_456_78_f32, -9.87654, 42.0];
        let parsed = parse_vector(&format_vector(&original)).unwrap();
        for (a, b) in original.iter().zip(parsed.iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }
}
