//! The planner's diagnostic event log.
//!
//! Every state-changing engine action records one event. Lookup misses
//! are recorded too, so a silent fallback can be traced after the fact.

use crate::types::{Currency, LineId};
use serde::{Deserialize, Serialize};

/// Variants are only ever appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlanEvent {
    RecalcCompleted {
        line_count:       usize,
        display_currency: Currency,
        fx_date:          String,
        blended_margin:   f64,
    },
    LineAppended {
        line_id: LineId,
        dsp:     String,
        dsp_fee: f64,
    },
    LineRemoved {
        line_id: LineId,
    },
    LinesCleared {
        removed: usize,
    },
    RateCardMiss {
        line_id: LineId,
        key:     String,
    },
    TradingDealMiss {
        buying_point: String,
    },
    FxRefreshed {
        fx_date: String,
        eur_gbp: f64,
        eur_usd: f64,
        gbp_usd: f64,
    },
}

impl PlanEvent {
    /// Stable name stored in the event_type column.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::RecalcCompleted { .. } => "recalc_completed",
            Self::LineAppended { .. }    => "line_appended",
            Self::LineRemoved { .. }     => "line_removed",
            Self::LinesCleared { .. }    => "lines_cleared",
            Self::RateCardMiss { .. }    => "rate_card_miss",
            Self::TradingDealMiss { .. } => "trading_deal_miss",
            Self::FxRefreshed { .. }     => "fx_refreshed",
        }
    }
}

/// The event log entry as persisted to SQLite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id:          Option<i64>,
    pub event_type:  String,
    pub payload:     String, // JSON-serialized PlanEvent
    pub recorded_at: String, // RFC 3339
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A message for the user-facing notification sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    pub severity: Severity,
    pub message:  String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self { severity: Severity::Info, message: message.into() }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self { severity: Severity::Warning, message: message.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { severity: Severity::Error, message: message.into() }
    }
}
