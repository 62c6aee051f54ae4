//! Body mass index check shown next to an evaluation.
//!
//! Inputs are free-form form fields; anything that does not yield a positive
//! finite index is treated as "no value" rather than an error.

use std::fmt::{Display, Formatter};

/// Index at or below which the patient is flagged as underweight.
pub const UNDERWEIGHT_THRESHOLD: f64 = 18.5;

/// Body mass index rounded to one decimal place.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bmi(f64);

impl Bmi {
    /// Computes `weight / height_m²` from height in centimetres and weight in
    /// kilograms.
    ///
    /// Returns `None` when either input is zero or not a number, or when the
    /// result is not a positive finite value.
    pub fn compute(height_cm: f64, weight_kg: f64) -> Option<Self> {
        if height_cm == 0.0 || weight_kg == 0.0 || height_cm.is_nan() || weight_kg.is_nan() {
            return None;
        }
        let height_m = height_cm / 100.0;
        if height_m <= 0.0 {
            return None;
        }
        let value = weight_kg / (height_m * height_m);
        if !value.is_finite() || value <= 0.0 {
            return None;
        }
        Some(Self((value * 10.0).round() / 10.0))
    }

    /// Parses both form fields and computes the index; blank or non-numeric
    /// text yields `None`.
    pub fn from_text(height_cm: &str, weight_kg: &str) -> Option<Self> {
        let height = parse_field(height_cm)?;
        let weight = parse_field(weight_kg)?;
        Self::compute(height, weight)
    }

    pub fn value(self) -> f64 {
        self.0
    }

    pub fn is_underweight(self) -> bool {
        self.0 <= UNDERWEIGHT_THRESHOLD
    }
}

impl Display for Bmi {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.1}", self.0)
    }
}

fn parse_field(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok()
}
