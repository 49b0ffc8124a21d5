use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Indirect-cost percentages a project applies on top of direct cost.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndirectParameters {
    pub overhead_pct: f64,
    pub profit_pct: f64,
    pub contingency_pct: f64,
}

impl Default for IndirectParameters {
    fn default() -> Self {
        Self {
            overhead_pct: 0.10,
            profit_pct: 0.15,
            contingency_pct: 0.05,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub client: String,
    #[serde(default)]
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    /// Explicit project value. When absent the value is the sum of BoQ
    /// item totals.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_strategy: Option<String>,
    #[serde(default)]
    pub indirects: IndirectParameters,
    #[serde(default = "default_profit_margin")]
    pub profit_margin: f64,
    #[serde(default = "default_local_content_target")]
    pub local_content_target: f64,
}

fn default_profit_margin() -> f64 {
    0.10
}

fn default_local_content_target() -> f64 {
    0.0
}

impl Project {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            client: String::new(),
            location: String::new(),
            start_date: None,
            end_date: None,
            value: None,
            selected_strategy: None,
            indirects: IndirectParameters::default(),
            profit_margin: default_profit_margin(),
            local_content_target: default_local_content_target(),
        }
    }
}
