use crate::{fx::FixedFxSource, types::Currency};
use serde::{Deserialize, Serialize};

/// Default lifetime of cached reference tables (10 minutes).
pub const DEFAULT_REFERENCE_CACHE_TTL_SECS: i64 = 600;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FxConfig {
    /// Rates served by the configured FX source. A missing pair makes that
    /// fetch fail and fall back to 1.
    #[serde(default)]
    pub eur_gbp: Option<f64>,
    #[serde(default)]
    pub eur_usd: Option<f64>,
    #[serde(default)]
    pub gbp_usd: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct PlannerConfigFile {
    #[serde(default = "default_ttl")]
    reference_cache_ttl_secs: i64,
    #[serde(default)]
    default_display_currency: Option<String>,
    fx: FxConfig,
}

fn default_ttl() -> i64 {
    DEFAULT_REFERENCE_CACHE_TTL_SECS
}

#[derive(Debug, Clone)]
pub struct PlannerConfig {
    pub reference_cache_ttl_secs: i64,
    /// Written to a new plan when no display currency has been chosen.
    pub default_display_currency: Currency,
    pub fx:                       FxConfig,
}

impl PlannerConfig {
    /// Load from the data/ directory.
    /// In tests, use PlannerConfig::default_test().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let path = format!("{data_dir}/config/planner.json");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let file: PlannerConfigFile = serde_json::from_str(&content)?;

        if file.reference_cache_ttl_secs <= 0 {
            anyhow::bail!(
                "{path}: reference_cache_ttl_secs must be positive, got {}",
                file.reference_cache_ttl_secs
            );
        }

        Ok(Self {
            reference_cache_ttl_secs: file.reference_cache_ttl_secs,
            default_display_currency: Currency::parse_display(
                file.default_display_currency.as_deref(),
            ),
            fx: file.fx,
        })
    }

    /// Config with hardcoded defaults for use in unit tests.
    pub fn default_test() -> Self {
        Self {
            reference_cache_ttl_secs: DEFAULT_REFERENCE_CACHE_TTL_SECS,
            default_display_currency: Currency::Gbp,
            fx: FxConfig {
                eur_gbp: Some(0.85),
                eur_usd: Some(1.10),
                gbp_usd: Some(1.25),
            },
        }
    }

    pub fn reference_cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.reference_cache_ttl_secs)
    }

    /// FX source serving the configured pairs only.
    pub fn fx_source(&self) -> FixedFxSource {
        let pairs = [
            (Currency::Eur, Currency::Gbp, self.fx.eur_gbp),
            (Currency::Eur, Currency::Usd, self.fx.eur_usd),
            (Currency::Gbp, Currency::Usd, self.fx.gbp_usd),
        ];
        pairs
            .into_iter()
            .fold(FixedFxSource::new(), |source, (from, to, rate)| match rate {
                Some(rate) => source.with_rate(from, to, rate),
                None => source,
            })
    }
}
