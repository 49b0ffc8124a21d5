use crate::analysis::UnitPriceAnalysis;
use crate::boq::BoqItem;
use crate::catalog::{Catalogs, ResourceClass};
use crate::error::{EngineError, EngineResult, ErrorBody};
use crate::local_content::{self, LocalContentReport};
use crate::project::Project;
use crate::rounding::{round2, round4};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyName {
    Standard,
    Balanced,
    Unbalanced,
    ProfitOriented,
    Bundling,
    LocalContent,
}

impl StrategyName {
    pub const ALL: [StrategyName; 6] = [
        StrategyName::Standard,
        StrategyName::Balanced,
        StrategyName::Unbalanced,
        StrategyName::ProfitOriented,
        StrategyName::Bundling,
        StrategyName::LocalContent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyName::Standard => "standard",
            StrategyName::Balanced => "balanced",
            StrategyName::Unbalanced => "unbalanced",
            StrategyName::ProfitOriented => "profit_oriented",
            StrategyName::Bundling => "bundling",
            StrategyName::LocalContent => "local_content",
        }
    }

    pub fn from_str(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "standard" => Some(StrategyName::Standard),
            "balanced" => Some(StrategyName::Balanced),
            "unbalanced" => Some(StrategyName::Unbalanced),
            "profit_oriented" | "profit-oriented" => Some(StrategyName::ProfitOriented),
            "bundling" => Some(StrategyName::Bundling),
            "local_content" | "local-content" => Some(StrategyName::LocalContent),
            _ => None,
        }
    }
}

impl fmt::Display for StrategyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A strategy invocation with its parameters. Absent optional parameters
/// fall back to the project's defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum StrategyRequest {
    Standard {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        profit_margin: Option<f64>,
    },
    Balanced {
        #[serde(default = "default_overhead_margin")]
        overhead_margin: f64,
        #[serde(default = "default_balanced_profit")]
        profit_margin: f64,
    },
    Unbalanced {
        /// Caller-provided flags aligned with BoQ order: `true` marks an
        /// item whose margin is front-loaded.
        early_items: Vec<bool>,
        #[serde(default = "default_uplift")]
        uplift_pct: f64,
    },
    ProfitOriented {
        target_margin: f64,
    },
    Bundling {
        /// item id -> bundle key; items without a key pass through.
        keys: HashMap<String, String>,
        /// bundle key -> representative quantity; defaults to the sum of
        /// child quantities.
        #[serde(default)]
        representative_quantities: HashMap<String, f64>,
    },
    LocalContent,
}

fn default_overhead_margin() -> f64 {
    0.15
}

fn default_balanced_profit() -> f64 {
    0.10
}

fn default_uplift() -> f64 {
    0.10
}

impl StrategyRequest {
    pub fn name(&self) -> StrategyName {
        match self {
            StrategyRequest::Standard { .. } => StrategyName::Standard,
            StrategyRequest::Balanced { .. } => StrategyName::Balanced,
            StrategyRequest::Unbalanced { .. } => StrategyName::Unbalanced,
            StrategyRequest::ProfitOriented { .. } => StrategyName::ProfitOriented,
            StrategyRequest::Bundling { .. } => StrategyName::Bundling,
            StrategyRequest::LocalContent => StrategyName::LocalContent,
        }
    }
}

/// Everything a strategy reads. Strategies never mutate their inputs.
#[derive(Debug, Clone, Copy)]
pub struct PricingInput<'a> {
    pub project: &'a Project,
    pub items: &'a [BoqItem],
    pub analyses: &'a HashMap<String, UnitPriceAnalysis>,
    pub catalogs: &'a Catalogs,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemPricing {
    pub item_id: String,
    pub cost: f64,
    pub price: f64,
    pub profit: f64,
    /// profit / price; 0 for a zero price.
    pub profit_percentage: f64,
}

impl ItemPricing {
    fn new(item_id: impl Into<String>, cost: f64, price: f64) -> Self {
        let cost = round2(cost);
        let price = round2(price);
        let profit = round2(price - cost);
        Self {
            item_id: item_id.into(),
            cost,
            price,
            profit,
            profit_percentage: if price > 0.0 {
                round4(profit / price)
            } else {
                0.0
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Substitution {
    pub item_id: String,
    pub class: ResourceClass,
    pub from_resource: String,
    pub to_resource: String,
    pub old_unit_price: f64,
    pub new_unit_price: f64,
}

/// Reversible record of which BoQ items each virtual bundle absorbed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BundleMap {
    pub bundles: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyOutcome {
    pub strategy: StrategyName,
    pub items: Vec<ItemPricing>,
    pub total_cost: f64,
    pub total_price: f64,
    pub profit: f64,
    /// profit / total cost.
    pub profit_margin: f64,
    /// profit / total price.
    pub profit_percentage: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_content_percentage: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub substitutions: Vec<Substitution>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundles: Option<BundleMap>,
}

impl StrategyOutcome {
    fn from_items(strategy: StrategyName, items: Vec<ItemPricing>) -> Self {
        let total_cost = round2(items.iter().map(|item| item.cost).sum());
        let total_price = round2(items.iter().map(|item| item.price).sum());
        let profit = round2(total_price - total_cost);
        Self {
            strategy,
            items,
            total_cost,
            total_price,
            profit,
            profit_margin: if total_cost > 0.0 {
                round4(profit / total_cost)
            } else {
                0.0
            },
            profit_percentage: if total_price > 0.0 {
                round4(profit / total_price)
            } else {
                0.0
            },
            local_content_percentage: None,
            substitutions: Vec::new(),
            bundles: None,
        }
    }

    pub fn to_cli_summary(&self) -> String {
        let mut parts = vec![
            format!("strategy={}", self.strategy),
            format!("items={}", self.items.len()),
            format!("cost={:.2}", self.total_cost),
            format!("price={:.2}", self.total_price),
            format!("profit={:.2}", self.profit),
            format!("margin={:.2}%", self.profit_margin * 100.0),
        ];
        if let Some(local) = self.local_content_percentage {
            parts.push(format!("local={:.2}%", local * 100.0));
        }
        if !self.substitutions.is_empty() {
            parts.push(format!("substitutions={}", self.substitutions.len()));
        }
        parts.join(", ")
    }
}

/// Cost basis of one item: its analysis total cost scaled by quantity, or
/// the priced total when no analysis exists. Stale analyses refuse.
fn item_cost(item: &BoqItem, analyses: &HashMap<String, UnitPriceAnalysis>) -> EngineResult<f64> {
    match analyses.get(&item.id) {
        Some(analysis) => Ok(analysis.current_total_cost()? * item.quantity),
        None => Ok(item.total_price),
    }
}

/// Direct-cost basis (class amounts only, indirects excluded).
fn item_direct_cost(
    item: &BoqItem,
    analyses: &HashMap<String, UnitPriceAnalysis>,
) -> EngineResult<f64> {
    match analyses.get(&item.id) {
        Some(analysis) => {
            analysis.current_total_cost()?;
            Ok(analysis.direct_cost * item.quantity)
        }
        None => Ok(item.total_price),
    }
}

pub fn apply(input: PricingInput<'_>, request: &StrategyRequest) -> EngineResult<StrategyOutcome> {
    // An empty BoQ yields an empty roll-up for every strategy.
    if input.items.is_empty() {
        return Ok(StrategyOutcome::from_items(request.name(), Vec::new()));
    }
    match request {
        StrategyRequest::Standard { profit_margin } => {
            apply_standard(input, profit_margin.unwrap_or(input.project.profit_margin))
        }
        StrategyRequest::Balanced {
            overhead_margin,
            profit_margin,
        } => apply_balanced(input, *overhead_margin, *profit_margin),
        StrategyRequest::Unbalanced {
            early_items,
            uplift_pct,
        } => apply_unbalanced(input, early_items, *uplift_pct),
        StrategyRequest::ProfitOriented { target_margin } => {
            apply_profit_oriented(input, *target_margin)
        }
        StrategyRequest::Bundling {
            keys,
            representative_quantities,
        } => apply_bundling(input, keys, representative_quantities),
        StrategyRequest::LocalContent => apply_local_content(input),
    }
}

fn apply_standard(input: PricingInput<'_>, profit_margin: f64) -> EngineResult<StrategyOutcome> {
    if !profit_margin.is_finite() || profit_margin < -1.0 {
        return Err(EngineError::validation_field(
            format!("profit margin {profit_margin} is invalid"),
            "profit_margin",
        ));
    }
    let mut items = Vec::with_capacity(input.items.len());
    for item in input.items {
        let cost = item_cost(item, input.analyses)?;
        items.push(ItemPricing::new(&item.id, cost, cost * (1.0 + profit_margin)));
    }
    Ok(StrategyOutcome::from_items(StrategyName::Standard, items))
}

fn apply_balanced(
    input: PricingInput<'_>,
    overhead_margin: f64,
    profit_margin: f64,
) -> EngineResult<StrategyOutcome> {
    for (name, value) in [("overhead_margin", overhead_margin), ("profit_margin", profit_margin)] {
        if !value.is_finite() || value < 0.0 {
            return Err(EngineError::validation_field(
                format!("{name} {value} is invalid"),
                name,
            ));
        }
    }
    let mut items = Vec::with_capacity(input.items.len());
    for item in input.items {
        let cost = item_cost(item, input.analyses)?;
        let direct = item_direct_cost(item, input.analyses)?;
        // Margin overhead first, then profit, both on the direct basis.
        let price = direct * (1.0 + overhead_margin) * (1.0 + profit_margin);
        items.push(ItemPricing::new(&item.id, cost, price));
    }
    Ok(StrategyOutcome::from_items(StrategyName::Balanced, items))
}

fn apply_unbalanced(
    input: PricingInput<'_>,
    early_items: &[bool],
    uplift_pct: f64,
) -> EngineResult<StrategyOutcome> {
    if early_items.len() != input.items.len() {
        return Err(EngineError::validation_field(
            format!(
                "early flags cover {} items, BoQ has {}",
                early_items.len(),
                input.items.len()
            ),
            "early_items",
        ));
    }
    if !uplift_pct.is_finite() || uplift_pct <= 0.0 {
        return Err(EngineError::validation_field(
            format!("uplift {uplift_pct} is invalid"),
            "uplift_pct",
        ));
    }
    if !early_items.iter().any(|&flag| flag) {
        return Err(EngineError::UnbalancedInfeasible {
            reason: "no items flagged as early".into(),
        });
    }
    if early_items.iter().all(|&flag| flag) {
        return Err(EngineError::UnbalancedInfeasible {
            reason: "no later items left to absorb the uplift".into(),
        });
    }

    let base_total: f64 = input.items.iter().map(|item| item.total_price).sum();
    let uplift: f64 = input
        .items
        .iter()
        .zip(early_items)
        .filter(|&(_, &early)| early)
        .map(|(item, _)| item.total_price * uplift_pct)
        .sum();
    let late_total: f64 = input
        .items
        .iter()
        .zip(early_items)
        .filter(|&(_, &early)| !early)
        .map(|(item, _)| item.total_price)
        .sum();
    if late_total <= 0.0 || uplift >= late_total {
        return Err(EngineError::UnbalancedInfeasible {
            reason: format!(
                "later items total {late_total:.2} cannot absorb an uplift of {uplift:.2}"
            ),
        });
    }
    let reduction = uplift / late_total;

    let mut items = Vec::with_capacity(input.items.len());
    for (item, &early) in input.items.iter().zip(early_items) {
        let cost = item_cost(item, input.analyses)?;
        let price = if early {
            item.total_price * (1.0 + uplift_pct)
        } else {
            item.total_price * (1.0 - reduction)
        };
        items.push(ItemPricing::new(&item.id, cost, price));
    }
    let outcome = StrategyOutcome::from_items(StrategyName::Unbalanced, items);

    // Redistribution must preserve the project price to within 0.5%.
    if base_total > 0.0 {
        let drift = (outcome.total_price - base_total).abs() / base_total;
        if drift > 0.005 {
            return Err(EngineError::UnbalancedInfeasible {
                reason: format!(
                    "redistribution drifted project total by {:.2}%",
                    drift * 100.0
                ),
            });
        }
    }
    Ok(outcome)
}

fn apply_profit_oriented(
    input: PricingInput<'_>,
    target_margin: f64,
) -> EngineResult<StrategyOutcome> {
    if !target_margin.is_finite() || target_margin < 0.0 {
        return Err(EngineError::validation_field(
            format!("target margin {target_margin} is invalid"),
            "target_margin",
        ));
    }

    let mut costs = Vec::with_capacity(input.items.len());
    let mut per_unit_direct = Vec::with_capacity(input.items.len());
    for item in input.items {
        costs.push(item_cost(item, input.analyses)?);
        let direct = match input.analyses.get(&item.id) {
            Some(analysis) => analysis.direct_cost,
            None => item.unit_price,
        };
        per_unit_direct.push(direct);
    }

    let mut sorted = per_unit_direct.clone();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let median = if sorted.is_empty() {
        0.0
    } else if sorted.len() % 2 == 1 {
        sorted[sorted.len() / 2]
    } else {
        (sorted[sorted.len() / 2 - 1] + sorted[sorted.len() / 2]) / 2.0
    };

    // Low-value items (per-unit direct cost below the median) carry no
    // profit; the pool lands on the rest weighted by quantity.
    let weights: Vec<f64> = input
        .items
        .iter()
        .zip(&per_unit_direct)
        .map(|(item, &direct)| if direct < median { 0.0 } else { item.quantity })
        .collect();
    let weight_sum: f64 = weights.iter().sum();
    let total_cost: f64 = costs.iter().sum();
    let pool = total_cost * target_margin;

    let mut items = Vec::with_capacity(input.items.len());
    for ((item, cost), weight) in input.items.iter().zip(&costs).zip(&weights) {
        let price = if weight_sum > 0.0 {
            cost + pool * (weight / weight_sum)
        } else if total_cost > 0.0 {
            // Degenerate case: spread the target margin by cost share.
            cost * (1.0 + target_margin)
        } else {
            *cost
        };
        items.push(ItemPricing::new(&item.id, *cost, price));
    }
    Ok(StrategyOutcome::from_items(StrategyName::ProfitOriented, items))
}

fn apply_bundling(
    input: PricingInput<'_>,
    keys: &HashMap<String, String>,
    representative_quantities: &HashMap<String, f64>,
) -> EngineResult<StrategyOutcome> {
    let mut bundle_order: Vec<String> = Vec::new();
    let mut bundles: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut bundle_cost: HashMap<String, f64> = HashMap::new();
    let mut bundle_price: HashMap<String, f64> = HashMap::new();
    let mut items = Vec::new();

    for item in input.items {
        let cost = item_cost(item, input.analyses)?;
        match keys.get(&item.id) {
            Some(key) => {
                if !bundles.contains_key(key) {
                    bundle_order.push(key.clone());
                }
                bundles.entry(key.clone()).or_default().push(item.id.clone());
                *bundle_cost.entry(key.clone()).or_default() += cost;
                *bundle_price.entry(key.clone()).or_default() += item.total_price;
            }
            None => items.push(ItemPricing::new(&item.id, cost, item.total_price)),
        }
    }

    for key in bundle_order {
        let children = &bundles[&key];
        let rep_qty = representative_quantities.get(&key).copied().unwrap_or_else(|| {
            input
                .items
                .iter()
                .filter(|item| children.contains(&item.id))
                .map(|item| item.quantity)
                .sum()
        });
        if rep_qty <= 0.0 {
            return Err(EngineError::validation_field(
                format!("bundle '{key}' has non-positive representative quantity"),
                "representative_quantities",
            ));
        }
        // The virtual item keeps the children's aggregate price; the
        // representative quantity only sets its displayed unit price.
        items.push(ItemPricing::new(&key, bundle_cost[&key], bundle_price[&key]));
    }

    let mut outcome = StrategyOutcome::from_items(StrategyName::Bundling, items);
    outcome.bundles = Some(BundleMap { bundles });
    Ok(outcome)
}

fn apply_local_content(input: PricingInput<'_>) -> EngineResult<StrategyOutcome> {
    let target = input.project.local_content_target;

    // Work on a private copy of the analyses; inputs stay untouched.
    let mut working: Vec<(f64, UnitPriceAnalysis)> = Vec::new();
    for item in input.items {
        if let Some(analysis) = input.analyses.get(&item.id) {
            analysis.current_total_cost()?;
            working.push((item.quantity, analysis.clone()));
        }
    }

    let mut substitutions = Vec::new();
    loop {
        let refs: Vec<(f64, &UnitPriceAnalysis)> =
            working.iter().map(|(qty, analysis)| (*qty, analysis)).collect();
        let report = local_content::evaluate(&refs, input.catalogs, target);
        if report.percentage >= target {
            break;
        }
        drop(refs);

        // Largest non-local component with a local alternative goes first.
        let mut best: Option<(usize, ResourceClass, usize, f64)> = None;
        for (analysis_idx, (quantity, analysis)) in working.iter().enumerate() {
            for class in ResourceClass::ALL {
                for (line_idx, line) in analysis.class(class).components.iter().enumerate() {
                    let Some(resource_id) = line.resource_ref.as_deref() else {
                        continue;
                    };
                    let Some(resource) = input.catalogs.find(resource_id) else {
                        continue;
                    };
                    if resource.is_local {
                        continue;
                    }
                    if local_content::nearest_local_substitute(resource, line.unit, input.catalogs)
                        .is_none()
                    {
                        continue;
                    }
                    let gain = line.total * quantity;
                    match best {
                        Some((_, _, _, best_gain)) if best_gain >= gain => {}
                        _ => best = Some((analysis_idx, class, line_idx, gain)),
                    }
                }
            }
        }
        let Some((analysis_idx, class, line_idx, _)) = best else {
            break; // no substitutions left
        };

        let (_, analysis) = &mut working[analysis_idx];
        let line = &analysis.class(class).components[line_idx];
        let from_id = line.resource_ref.clone().expect("checked above");
        let unit = line.unit;
        let original = input.catalogs.get(&from_id)?;
        let substitute = local_content::nearest_local_substitute(original, unit, input.catalogs)
            .expect("checked above");
        let new_price = substitute
            .unit_price_for(unit, &input.catalogs.time_config)?
            .unwrap_or(line.unit_price);

        let item_id = analysis.item_id.clone();
        let old_price = line.unit_price;
        let to_id = substitute.id.clone();
        {
            let bucket = analysis.class_mut(class);
            let line = &mut bucket.components[line_idx];
            line.resource_ref = Some(to_id.clone());
            line.unit_price = new_price;
            line.total = round2(line.quantity * new_price);
        }
        analysis.recompute_totals();
        substitutions.push(Substitution {
            item_id,
            class,
            from_resource: from_id,
            to_resource: to_id,
            old_unit_price: old_price,
            new_unit_price: new_price,
        });
    }

    let refs: Vec<(f64, &UnitPriceAnalysis)> =
        working.iter().map(|(qty, analysis)| (*qty, analysis)).collect();
    let report: LocalContentReport = local_content::evaluate(&refs, input.catalogs, target);

    let by_item: HashMap<&str, &UnitPriceAnalysis> = working
        .iter()
        .map(|(_, analysis)| (analysis.item_id.as_str(), analysis))
        .collect();
    let margin = input.project.profit_margin;
    let mut items = Vec::with_capacity(input.items.len());
    for item in input.items {
        let cost = match by_item.get(item.id.as_str()) {
            Some(analysis) => analysis.total_cost * item.quantity,
            None => item.total_price,
        };
        items.push(ItemPricing::new(&item.id, cost, cost * (1.0 + margin)));
    }

    let mut outcome = StrategyOutcome::from_items(StrategyName::LocalContent, items);
    outcome.local_content_percentage = Some(report.percentage);
    outcome.substitutions = substitutions;
    Ok(outcome)
}

/// Default request used by the comparison endpoint for each strategy.
pub fn default_request(name: StrategyName, input: &PricingInput<'_>) -> StrategyRequest {
    match name {
        StrategyName::Standard => StrategyRequest::Standard { profit_margin: None },
        StrategyName::Balanced => StrategyRequest::Balanced {
            overhead_margin: default_overhead_margin(),
            profit_margin: default_balanced_profit(),
        },
        StrategyName::Unbalanced => {
            // Without caller flags the first half of the BoQ counts as early.
            let midpoint = input.items.len().div_ceil(2);
            StrategyRequest::Unbalanced {
                early_items: (0..input.items.len()).map(|idx| idx < midpoint).collect(),
                uplift_pct: default_uplift(),
            }
        }
        StrategyName::ProfitOriented => StrategyRequest::ProfitOriented {
            target_margin: input.project.profit_margin,
        },
        StrategyName::Bundling => {
            // Items sharing a category bundle together by default.
            let mut keys = HashMap::new();
            let mut seen: HashMap<&str, usize> = HashMap::new();
            for item in input.items {
                if let Some(category) = item.category.as_deref() {
                    *seen.entry(category).or_default() += 1;
                }
            }
            for item in input.items {
                if let Some(category) = item.category.as_deref() {
                    if seen[category] > 1 {
                        keys.insert(item.id.clone(), category.to_string());
                    }
                }
            }
            StrategyRequest::Bundling {
                keys,
                representative_quantities: HashMap::new(),
            }
        }
        StrategyName::LocalContent => StrategyRequest::LocalContent,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonEntry {
    pub strategy: StrategyName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<StrategyOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

/// Apply all six strategies to the same snapshot and return an aligned
/// table. Strategies that cannot run (e.g. unbalanced on a one-item BoQ)
/// report their error instead of poisoning the whole comparison.
pub fn compare(input: PricingInput<'_>) -> Vec<ComparisonEntry> {
    StrategyName::ALL
        .par_iter()
        .map(|name| {
            let request = default_request(*name, &input);
            match apply(input, &request) {
                Ok(outcome) => ComparisonEntry {
                    strategy: *name,
                    outcome: Some(outcome),
                    error: None,
                },
                Err(err) => ComparisonEntry {
                    strategy: *name,
                    outcome: None,
                    error: Some(err.to_body()),
                },
            }
        })
        .collect()
}
