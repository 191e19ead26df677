//! Risk score scale handling.
//!
//! Backend revisions disagree on the scale: the contract model and the
//! dashboard thresholds use a 0..1 fraction, some endpoints report 0..10.
//! Inside Contrax a [`RiskScore`] is always a fraction. The wire scale is an
//! explicit [`RiskScale`] setting and conversion happens once, at the edge.
//! Values outside the configured scale are rejected, never reinterpreted.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum RiskError {
    #[error("risk score {value} is outside the {scale} scale")]
    OutOfRange { value: f64, scale: RiskScale },

    #[error("risk score is not a number")]
    NotANumber,

    #[error("unknown risk scale: {0} (expected `fraction` or `decile`)")]
    UnknownScale(String),
}

/// Scale the backend reports risk scores in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RiskScale {
    /// 0.0..=1.0
    #[default]
    Fraction,
    /// 0.0..=10.0
    Decile,
}

impl RiskScale {
    fn max(&self) -> f64 {
        match self {
            Self::Fraction => 1.0,
            Self::Decile => 10.0,
        }
    }

    /// Convert a wire value into the canonical fraction.
    pub fn normalize(&self, raw: f64) -> Result<RiskScore, RiskError> {
        if raw.is_nan() {
            return Err(RiskError::NotANumber);
        }
        let max = self.max();
        if !(0.0..=max).contains(&raw) {
            return Err(RiskError::OutOfRange {
                value: raw,
                scale: *self,
            });
        }
        Ok(RiskScore(raw / max))
    }

    /// Convert an optional wire value, treating absence as "not scored yet".
    pub fn normalize_opt(&self, raw: Option<f64>) -> Result<Option<RiskScore>, RiskError> {
        raw.map(|r| self.normalize(r)).transpose()
    }
}

impl fmt::Display for RiskScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fraction => "fraction",
            Self::Decile => "decile",
        })
    }
}

impl FromStr for RiskScale {
    type Err = RiskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fraction" | "0-1" => Ok(Self::Fraction),
            "decile" | "0-10" => Ok(Self::Decile),
            other => Err(RiskError::UnknownScale(other.to_string())),
        }
    }
}

/// Canonical risk score in 0.0..=1.0.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct RiskScore(f64);

impl RiskScore {
    pub fn value(&self) -> f64 {
        self.0
    }

    /// Same thresholds as the backend's dashboard buckets.
    pub fn level(&self) -> RiskLevel {
        if self.0 < 0.3 {
            RiskLevel::Low
        } else if self.0 < 0.7 {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        }
    }

    pub fn percent(&self) -> u32 {
        (self.0 * 100.0).round() as u32
    }
}

impl fmt::Display for RiskScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.percent())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fraction_passes_through() {
        let score = RiskScale::Fraction.normalize(0.42).unwrap();
        assert_eq!(score.value(), 0.42);
        assert_eq!(score.level(), RiskLevel::Medium);
        assert_eq!(score.to_string(), "42%");
    }

    #[test]
    fn decile_is_divided() {
        let score = RiskScale::Decile.normalize(8.5).unwrap();
        assert!((score.value() - 0.85).abs() < 1e-9);
        assert_eq!(score.level(), RiskLevel::High);
    }

    #[test]
    fn out_of_scale_is_rejected_not_guessed() {
        assert_eq!(
            RiskScale::Fraction.normalize(7.0),
            Err(RiskError::OutOfRange {
                value: 7.0,
                scale: RiskScale::Fraction
            })
        );
        assert!(RiskScale::Decile.normalize(-0.1).is_err());
        assert_eq!(
            RiskScale::Fraction.normalize(f64::NAN),
            Err(RiskError::NotANumber)
        );
    }

    #[test]
    fn level_boundaries() {
        let f = RiskScale::Fraction;
        assert_eq!(f.normalize(0.0).unwrap().level(), RiskLevel::Low);
        assert_eq!(f.normalize(0.3).unwrap().level(), RiskLevel::Medium);
        assert_eq!(f.normalize(0.7).unwrap().level(), RiskLevel::High);
        assert_eq!(f.normalize(1.0).unwrap().level(), RiskLevel::High);
    }

    #[test]
    fn optional_scores() {
        assert_eq!(RiskScale::Fraction.normalize_opt(None), Ok(None));
        assert!(RiskScale::Fraction.normalize_opt(Some(2.0)).is_err());
    }

    #[test]
    fn scale_from_str() {
        assert_eq!("decile".parse::<RiskScale>(), Ok(RiskScale::Decile));
        assert_eq!("0-1".parse::<RiskScale>(), Ok(RiskScale::Fraction));
        assert!("percent".parse::<RiskScale>().is_err());
    }
}
