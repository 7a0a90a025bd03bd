use super::PlanStore;
use crate::{
    error::PlanResult,
    fx::{date_key, BaseRates, ExchangeRateTable},
};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, OptionalExtension};

impl PlanStore {
    // ── FX snapshot ────────────────────────────────────────────

    /// The persisted table for `date`, if one was fetched that day.
    pub fn load_fx_snapshot(&self, date: NaiveDate) -> PlanResult<Option<ExchangeRateTable>> {
        let base = self
            .conn
            .query_row(
                "SELECT eur_gbp, eur_usd, gbp_usd FROM fx_snapshot WHERE date_key = ?1",
                params![date_key(date)],
                |row| {
                    Ok(BaseRates {
                        eur_gbp: row.get(0)?,
                        eur_usd: row.get(1)?,
                        gbp_usd: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(base.map(|b| ExchangeRateTable::from_base_rates(date, b)))
    }

    /// Persist the day's table, replacing any earlier fetch for that day.
    pub fn save_fx_snapshot(&self, table: &ExchangeRateTable, fetched_at: DateTime<Utc>) -> PlanResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO fx_snapshot (date_key, eur_gbp, eur_usd, gbp_usd, fetched_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                table.date_key(),
                table.base.eur_gbp,
                table.base.eur_usd,
                table.base.gbp_usd,
                fetched_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}
