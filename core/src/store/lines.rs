use super::PlanStore;
use crate::{
    error::PlanResult,
    line::LineItem,
    reference::LineIdentity,
    types::Currency,
};
use rusqlite::params;

/// A line as submitted for storage. Currency and buy CPM start blank and
/// are filled in by the next recalculation.
#[derive(Debug, Clone)]
pub struct NewLineRow<'a> {
    pub line_id:        &'a str,
    pub identity:       &'a LineIdentity,
    pub delivery_share: f64,
    pub dsp_fee_rate:   f64,
}

impl PlanStore {
    // ── Plan lines ─────────────────────────────────────────────

    /// All lines in plan order.
    pub fn lines(&self) -> PlanResult<Vec<LineItem>> {
        let mut stmt = self.conn.prepare(
            "SELECT line_id, position, country, channel, publisher, format,
                    delivery_share, currency, buy_cpm, dsp_fee
             FROM plan_line ORDER BY position ASC, line_id ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(LineItem {
                line_id:  row.get(0)?,
                position: row.get(1)?,
                identity: LineIdentity {
                    country:   row.get(2)?,
                    channel:   row.get(3)?,
                    publisher: row.get(4)?,
                    format:    row.get(5)?,
                },
                delivery_share:        row.get(6)?,
                currency:              Currency::parse_native(row.get::<_, Option<String>>(7)?.as_deref()),
                buy_cost_per_thousand: row.get::<_, Option<f64>>(8)?.unwrap_or(0.0),
                dsp_fee_rate:          row.get(9)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn line_count(&self) -> PlanResult<i64> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM plan_line", [], |row| row.get(0))?;
        Ok(n)
    }

    /// Σ stored delivery share across all lines.
    pub fn total_delivery_share(&self) -> PlanResult<f64> {
        let total: f64 = self.conn.query_row(
            "SELECT COALESCE(SUM(delivery_share), 0.0) FROM plan_line",
            [],
            |row| row.get(0),
        )?;
        Ok(total)
    }

    /// Append a line after the current last position. Returns its position.
    pub fn append_line(&self, line: &NewLineRow<'_>) -> PlanResult<i64> {
        let position: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(position), 0) + 1 FROM plan_line",
            [],
            |row| row.get(0),
        )?;
        self.conn.execute(
            "INSERT INTO plan_line (line_id, position, country, channel, publisher, format,
                                    delivery_share, currency, buy_cpm, dsp_fee)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, NULL, ?8)",
            params![
                line.line_id,
                position,
                line.identity.country,
                line.identity.channel,
                line.identity.publisher,
                line.identity.format,
                line.delivery_share,
                line.dsp_fee_rate,
            ],
        )?;
        Ok(position)
    }

    /// Delete a line and its outputs. Returns false if no such line.
    pub fn delete_line(&self, line_id: &str) -> PlanResult<bool> {
        let tx = self.conn.unchecked_transaction()?;
        let removed = tx.execute("DELETE FROM plan_line WHERE line_id = ?1", params![line_id])?;
        tx.execute("DELETE FROM line_output WHERE line_id = ?1", params![line_id])?;
        tx.commit()?;
        Ok(removed > 0)
    }

    /// Delete every line, output row and the totals record.
    /// Returns the number of lines removed.
    pub fn clear_lines(&self) -> PlanResult<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let removed = tx.execute("DELETE FROM plan_line", [])?;
        tx.execute("DELETE FROM line_output", [])?;
        tx.execute("DELETE FROM plan_totals", [])?;
        tx.commit()?;
        Ok(removed)
    }
}
