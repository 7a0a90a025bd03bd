use crate::{engine::NewLine, types::LineId};
use serde::{Deserialize, Serialize};

/// All planner actions a front end can issue.
/// Variants are only ever appended. Never remove or reorder them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum PlanCommand {
    // ── Plan lines ─────────────────────────────────
    AppendLine(NewLine),
    RemoveLine {
        line_id: LineId,
    },
    ClearLines,

    // ── Globals ────────────────────────────────────
    SetGlobal {
        name:  String,
        value: String,
    },

    // ── Passes ─────────────────────────────────────
    Recalculate,
    PrewarmFx,

    // ── Read-only ──────────────────────────────────
    GetState,
    ListDsps,
    ListBuyingPoints,
}

impl PlanCommand {
    /// Whether the plan should be recalculated after this command succeeds.
    pub fn recalculates(&self) -> bool {
        matches!(
            self,
            Self::AppendLine(_)
                | Self::RemoveLine { .. }
                | Self::SetGlobal { .. }
                | Self::Recalculate
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_line_reads_flat_json() {
        let cmd: PlanCommand = serde_json::from_str(
            r#"{"cmd":"append_line","country":"UK","channel":"Display",
                "publisher":"Acme","format":"Banner","delivery_share":0.25,"dsp":"DV360"}"#,
        )
        .unwrap();
        match &cmd {
            PlanCommand::AppendLine(line) => {
                assert_eq!(line.publisher, "Acme");
                assert_eq!(line.delivery_share, 0.25);
                assert_eq!(line.dsp, "DV360");
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert!(cmd.recalculates());
    }

    #[test]
    fn unit_commands_parse() {
        let cmd: PlanCommand = serde_json::from_str(r#"{"cmd":"clear_lines"}"#).unwrap();
        assert_eq!(cmd, PlanCommand::ClearLines);
        assert!(!cmd.recalculates());
    }
}
