//! Display aspect ratio naming.
//!
//! Pixel dimensions are matched against a table of common industry ratios
//! within a relative tolerance. Anything that does not match is reported as
//! the exact ratio reduced by the greatest common divisor.

use serde::{Deserialize, Serialize};

use crate::AnalysisError;

/// Relative tolerance used by the default table
pub const DEFAULT_TOLERANCE: f64 = 0.01;

/// A ratio with its conventional name (`"18:9"` names 2:1)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedAspectRatio {
    pub name: String,
    pub ratio: f64,
}

impl NamedAspectRatio {
    pub fn new(name: &str, width: f64, height: f64) -> Self {
        Self {
            name: name.to_string(),
            ratio: width / height,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AspectRatioTable {
    pub entries: Vec<NamedAspectRatio>,
    /// Maximum relative deviation accepted for a named match
    pub tolerance: f64,
}

impl Default for AspectRatioTable {
    fn default() -> Self {
        Self {
            entries: vec![
                NamedAspectRatio::new("1:1", 1.0, 1.0),
                NamedAspectRatio::new("5:4", 5.0, 4.0),
                NamedAspectRatio::new("4:3", 4.0, 3.0),
                NamedAspectRatio::new("3:2", 3.0, 2.0),
                NamedAspectRatio::new("16:10", 16.0, 10.0),
                NamedAspectRatio::new("16:9", 16.0, 9.0),
                NamedAspectRatio::new("18:9", 18.0, 9.0),
                NamedAspectRatio::new("21:9", 21.0, 9.0),
                NamedAspectRatio::new("32:9", 32.0, 9.0),
            ],
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl AspectRatioTable {
    pub fn new(entries: Vec<NamedAspectRatio>, tolerance: f64) -> Self {
        Self { entries, tolerance }
    }

    /// Name the display aspect ratio of `width` x `height`.
    pub fn display_aspect_ratio(&self, width: f64, height: f64) -> Result<String, AnalysisError> {
        let (w, h) = validate_dimensions(width, height)?;
        let ratio = width / height;

        let closest = self
            .entries
            .iter()
            .map(|entry| (entry, (ratio - entry.ratio).abs() / entry.ratio))
            .filter(|(_, deviation)| *deviation <= self.tolerance)
            .min_by(|a, b| a.1.total_cmp(&b.1));

        if let Some((entry, _)) = closest {
            return Ok(entry.name.clone());
        }

        let divisor = gcd(w, h);
        Ok(format!("{}:{}", w / divisor, h / divisor))
    }
}

/// Name the display aspect ratio using the default table.
pub fn calculate_display_aspect_ratio(width: f64, height: f64) -> Result<String, AnalysisError> {
    AspectRatioTable::default().display_aspect_ratio(width, height)
}

fn validate_dimensions(width: f64, height: f64) -> Result<(u64, u64), AnalysisError> {
    let valid = |v: f64| v.is_finite() && v > 0.0 && v.fract() == 0.0 && v <= u64::MAX as f64;
    if valid(width) && valid(height) {
        Ok((width as u64, height as u64))
    } else {
        Err(AnalysisError::InvalidDimensions { width, height })
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}
