//! Shared primitive types used across the planner.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Stable identifier of a plan line (uuid v4, assigned on append).
pub type LineId = String;

/// Reserved identifier adapters use when rendering the totals record inline.
pub const TOTALS_LINE_ID: &str = "totals";

/// The fixed set of currencies the planner converts between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Gbp,
    Eur,
    Usd,
}

impl Currency {
    pub const ALL: [Currency; 3] = [Currency::Gbp, Currency::Eur, Currency::Usd];

    pub fn code(&self) -> &'static str {
        match self {
            Self::Gbp => "GBP",
            Self::Eur => "EUR",
            Self::Usd => "USD",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Gbp => "£",
            Self::Eur => "€",
            Self::Usd => "$",
        }
    }

    /// Parse a stored row currency. Blank or unknown codes are EUR.
    pub fn parse_native(raw: Option<&str>) -> Self {
        raw.and_then(|s| s.parse().ok()).unwrap_or(Currency::Eur)
    }

    /// Parse a display currency selection. Blank or unknown codes are GBP.
    pub fn parse_display(raw: Option<&str>) -> Self {
        raw.and_then(|s| s.parse().ok()).unwrap_or(Currency::Gbp)
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GBP" => Ok(Self::Gbp),
            "EUR" => Ok(Self::Eur),
            "USD" => Ok(Self::Usd),
            other => Err(format!("unsupported currency: {other:?}")),
        }
    }
}

/// Normalize a fraction that may have been entered as a percentage.
///
/// Values above 1 are read as percentages (`15` means `0.15`). This cannot
/// tell `1.5` (meant as 1.5%) apart from `1.5` meant as 150%; the heuristic
/// is kept as-is.
pub fn normalize_fraction(value: f64) -> f64 {
    if !value.is_finite() {
        0.0
    } else if value > 1.0 {
        value / 100.0
    } else {
        value
    }
}

/// Parse a fee-like cell: number text, optionally suffixed with `%`.
/// Unparseable input yields 0.
pub fn parse_fraction(raw: &str) -> f64 {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_suffix('%').unwrap_or(trimmed).trim();
    trimmed.parse::<f64>().map(normalize_fraction).unwrap_or(0.0)
}
