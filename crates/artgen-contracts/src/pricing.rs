use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dimensions::ResolutionTier;
use crate::models::ModelIdentity;

const DEFAULT_COSTS_JSON: &str = include_str!("../resources/default_costs.json");

/// Credits charged for one image of a model. `tiers` is only read for tiered models.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostRow {
    #[serde(default)]
    pub per_image: Option<u64>,
    #[serde(default)]
    pub tiers: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CostTable {
    rows: BTreeMap<String, CostRow>,
}

impl Default for CostTable {
    fn default() -> Self {
        let mut table = Self {
            rows: BTreeMap::new(),
        };
        merge_cost_rows(&mut table.rows, DEFAULT_COSTS_JSON);
        table
    }
}

impl CostTable {
    /// Built-in table with an override file merged field by field on top.
    pub fn with_overrides(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading cost overrides {}", path.display()))?;
        serde_json::from_str::<Value>(&raw)
            .with_context(|| format!("parsing cost overrides {}", path.display()))?;
        let mut table = Self::default();
        merge_cost_rows(&mut table.rows, &raw);
        Ok(table)
    }

    pub fn row(&self, model: ModelIdentity) -> Option<&CostRow> {
        self.rows.get(model.or_default().key())
    }

    pub fn per_image_cost(&self, model: ModelIdentity, tier: Option<ResolutionTier>) -> u64 {
        let model = model.or_default();
        let Some(row) = self.row(model) else {
            tracing::warn!(model = %model, "no cost row for model; charging 0");
            return 0;
        };
        if model == ModelIdentity::GeminiPro {
            let tier = tier.unwrap_or_default();
            if let Some(cost) = row.tiers.get(tier.key()) {
                return *cost;
            }
        }
        row.per_image.unwrap_or(0)
    }

    pub fn total_cost(&self, model: ModelIdentity, tier: Option<ResolutionTier>, count: u32) -> u64 {
        self.per_image_cost(model, tier) * u64::from(count)
    }
}

fn merge_cost_rows(rows: &mut BTreeMap<String, CostRow>, raw: &str) {
    let Ok(payload) = serde_json::from_str::<Value>(raw) else {
        return;
    };
    let Some(table) = payload.as_object() else {
        return;
    };
    for (model_key, row_value) in table {
        let Some(row) = row_value.as_object() else {
            continue;
        };
        let key = model_key
            .parse::<ModelIdentity>()
            .map(|model| model.key().to_string())
            .unwrap_or_else(|_| model_key.to_string());
        let entry = rows.entry(key).or_default();
        if let Some(cost) = row.get("per_image").and_then(Value::as_u64) {
            entry.per_image = Some(cost);
        }
        if let Some(tiers) = row.get("tiers").and_then(Value::as_object) {
            for (tier, cost) in tiers {
                if let Some(cost) = cost.as_u64() {
                    entry.tiers.insert(tier.to_ascii_lowercase(), cost);
                }
            }
        }
    }
}
