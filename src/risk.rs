use crate::error::{EngineError, EngineResult};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Probability {
    Rare,
    Possible,
    Likely,
    AlmostCertain,
}

impl Probability {
    pub fn value(&self) -> u8 {
        match self {
            Probability::Rare => 1,
            Probability::Possible => 2,
            Probability::Likely => 3,
            Probability::AlmostCertain => 4,
        }
    }

    pub fn from_str(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "rare" | "1" => Some(Probability::Rare),
            "possible" | "2" => Some(Probability::Possible),
            "likely" | "3" => Some(Probability::Likely),
            "almost_certain" | "4" => Some(Probability::AlmostCertain),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Impact {
    Low,
    Medium,
    High,
    Critical,
}

impl Impact {
    pub fn value(&self) -> u8 {
        match self {
            Impact::Low => 1,
            Impact::Medium => 2,
            Impact::High => 3,
            Impact::Critical => 4,
        }
    }

    pub fn from_str(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "low" | "1" => Some(Impact::Low),
            "medium" | "2" => Some(Impact::Medium),
            "high" | "3" => Some(Impact::High),
            "critical" | "4" => Some(Impact::Critical),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStrategy {
    Avoid,
    Mitigate,
    Transfer,
    Accept,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskBucket {
    Low,
    Medium,
    High,
}

impl RiskBucket {
    /// score >= 9 high, 4..9 medium, else low.
    pub fn from_score(score: u8) -> Self {
        if score >= 9 {
            RiskBucket::High
        } else if score >= 4 {
            RiskBucket::Medium
        } else {
            RiskBucket::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskBucket::Low => "low",
            RiskBucket::Medium => "medium",
            RiskBucket::High => "high",
        }
    }
}

impl fmt::Display for RiskBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Risk {
    pub id: String,
    #[serde(default)]
    pub category: String,
    pub description: String,
    pub probability: Probability,
    pub impact: Impact,
    pub response_strategy: ResponseStrategy,
    #[serde(default)]
    pub action_plan: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<NaiveDate>,
}

impl Risk {
    pub fn score(&self) -> u8 {
        self.probability.value() * self.impact.value()
    }

    pub fn bucket(&self) -> RiskBucket {
        RiskBucket::from_score(self.score())
    }
}

/// Risks in insertion order; equal scores keep that order in reports.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskRegister {
    risks: Vec<Risk>,
}

impl RiskRegister {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.risks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.risks.is_empty()
    }

    pub fn risks(&self) -> &[Risk] {
        &self.risks
    }

    pub fn add(&mut self, risk: Risk) -> EngineResult<()> {
        if risk.id.trim().is_empty() {
            return Err(EngineError::validation_field("risk id must not be empty", "id"));
        }
        if self.risks.iter().any(|existing| existing.id == risk.id) {
            return Err(EngineError::DuplicateId { id: risk.id });
        }
        self.risks.push(risk);
        Ok(())
    }

    pub fn update<F>(&mut self, id: &str, mutate: F) -> EngineResult<()>
    where
        F: FnOnce(&mut Risk),
    {
        let Some(risk) = self.risks.iter_mut().find(|risk| risk.id == id) else {
            return Err(EngineError::UnknownResource { id: id.to_string() });
        };
        mutate(risk);
        if risk.id != id {
            return Err(EngineError::validation_field(
                "risk id cannot be changed by update",
                "id",
            ));
        }
        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> EngineResult<Risk> {
        let Some(idx) = self.risks.iter().position(|risk| risk.id == id) else {
            return Err(EngineError::UnknownResource { id: id.to_string() });
        };
        Ok(self.risks.remove(idx))
    }

    pub fn get(&self, id: &str) -> EngineResult<&Risk> {
        self.risks
            .iter()
            .find(|risk| risk.id == id)
            .ok_or_else(|| EngineError::UnknownResource { id: id.to_string() })
    }

    /// 4x4 count grid indexed by (probability - 1, impact - 1).
    pub fn matrix(&self) -> [[u32; 4]; 4] {
        let mut grid = [[0u32; 4]; 4];
        for risk in &self.risks {
            let row = (risk.probability.value() - 1) as usize;
            let col = (risk.impact.value() - 1) as usize;
            grid[row][col] += 1;
        }
        grid
    }

    /// High-bucket risks at or above `min_score`, highest score first;
    /// insertion order breaks ties.
    pub fn response_plan(&self, min_score: u8) -> Vec<&Risk> {
        let mut plan: Vec<&Risk> = self
            .risks
            .iter()
            .filter(|risk| risk.bucket() == RiskBucket::High && risk.score() >= min_score)
            .collect();
        plan.sort_by(|a, b| b.score().cmp(&a.score()));
        plan
    }
}
