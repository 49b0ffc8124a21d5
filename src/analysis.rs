use crate::boq::BoqItem;
use crate::catalog::{Catalogs, ResourceClass};
use crate::error::{EngineError, EngineResult};
use crate::rounding::{round2, round4};
use crate::units::Unit;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// How an analysis reconciles the item's unit price with its components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileMode {
    /// The item's unit price is authoritative; class amounts derive from it.
    TopDown,
    /// The unit price is derived from component lines plus indirects.
    BottomUp,
}

/// The three indirect-cost buckets applied on top of direct cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndirectKind {
    Overhead,
    Profit,
    Contingency,
}

impl IndirectKind {
    pub const ALL: [IndirectKind; 3] = [
        IndirectKind::Overhead,
        IndirectKind::Profit,
        IndirectKind::Contingency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IndirectKind::Overhead => "overhead",
            IndirectKind::Profit => "profit",
            IndirectKind::Contingency => "contingency",
        }
    }
}

/// One costed component inside a class bucket. Catalog-backed lines carry a
/// `resource_ref`; free-form lines carry only a description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentLine {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub quantity: f64,
    pub unit: Unit,
    pub unit_price: f64,
    pub total: f64,
}

/// Component input as the caller supplies it: the unit price may be left
/// blank for catalog-backed lines, in which case it is resolved from the
/// resource's declared price or rate tiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub quantity: f64,
    pub unit: Unit,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<f64>,
}

/// Per-class input: a percentage lump, explicit component lines, or neither
/// (zero-weight class).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<ComponentInput>,
}

impl ClassSpec {
    pub fn lump(percentage: f64) -> Self {
        Self {
            percentage: Some(percentage),
            components: Vec::new(),
        }
    }

    pub fn lines(components: Vec<ComponentInput>) -> Self {
        Self {
            percentage: None,
            components,
        }
    }
}

/// Full decomposition request for one BoQ item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecompositionSpec {
    pub mode: ReconcileMode,
    #[serde(default)]
    pub materials: ClassSpec,
    #[serde(default)]
    pub equipment: ClassSpec,
    #[serde(default)]
    pub labor: ClassSpec,
    #[serde(default)]
    pub subcontractors: ClassSpec,
    pub overhead_pct: f64,
    pub profit_pct: f64,
    pub contingency_pct: f64,
    /// When set, class percentages outside the 0.01 tolerance are scaled to
    /// sum to 1 instead of failing.
    #[serde(default)]
    pub auto_normalize: bool,
}

impl DecompositionSpec {
    pub fn class(&self, class: ResourceClass) -> &ClassSpec {
        match class {
            ResourceClass::Materials => &self.materials,
            ResourceClass::Equipment => &self.equipment,
            ResourceClass::Labor => &self.labor,
            ResourceClass::Subcontractors => &self.subcontractors,
        }
    }

    fn indirect_pct(&self, kind: IndirectKind) -> f64 {
        match kind {
            IndirectKind::Overhead => self.overhead_pct,
            IndirectKind::Profit => self.profit_pct,
            IndirectKind::Contingency => self.contingency_pct,
        }
    }
}

/// One resource-class bucket of a finished analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassBucket {
    pub percentage: f64,
    pub amount: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<ComponentLine>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct IndirectBucket {
    pub percentage: f64,
    pub amount: f64,
}

/// Decomposed unit price of one BoQ item. Amounts are per unit of the item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitPriceAnalysis {
    pub item_id: String,
    pub mode: ReconcileMode,
    pub materials: ClassBucket,
    pub equipment: ClassBucket,
    pub labor: ClassBucket,
    pub subcontractors: ClassBucket,
    pub overhead: IndirectBucket,
    pub profit: IndirectBucket,
    pub contingency: IndirectBucket,
    pub direct_cost: f64,
    pub total_cost: f64,
    /// Unit price the analysis reconciled against (top-down) or derived
    /// (bottom-up).
    pub unit_price: f64,
    pub analyzed_at: NaiveDateTime,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    /// Set when a catalog mutation invalidated a referenced resource;
    /// totals are refused until the analysis is recomputed.
    #[serde(default)]
    pub dirty: bool,
}

impl UnitPriceAnalysis {
    pub fn class(&self, class: ResourceClass) -> &ClassBucket {
        match class {
            ResourceClass::Materials => &self.materials,
            ResourceClass::Equipment => &self.equipment,
            ResourceClass::Labor => &self.labor,
            ResourceClass::Subcontractors => &self.subcontractors,
        }
    }

    pub fn class_mut(&mut self, class: ResourceClass) -> &mut ClassBucket {
        match class {
            ResourceClass::Materials => &mut self.materials,
            ResourceClass::Equipment => &mut self.equipment,
            ResourceClass::Labor => &mut self.labor,
            ResourceClass::Subcontractors => &mut self.subcontractors,
        }
    }

    pub fn indirect(&self, kind: IndirectKind) -> &IndirectBucket {
        match kind {
            IndirectKind::Overhead => &self.overhead,
            IndirectKind::Profit => &self.profit,
            IndirectKind::Contingency => &self.contingency,
        }
    }

    /// Total cost, refusing to answer while the analysis is stale.
    pub fn current_total_cost(&self) -> EngineResult<f64> {
        if self.dirty {
            return Err(EngineError::validation(format!(
                "analysis for item '{}' references mutated catalog entries; recompute before reading totals",
                self.item_id
            )));
        }
        Ok(self.total_cost)
    }

    pub fn references_resource(&self, resource_id: &str) -> bool {
        ResourceClass::ALL.iter().any(|class| {
            self.class(*class)
                .components
                .iter()
                .any(|line| line.resource_ref.as_deref() == Some(resource_id))
        })
    }

    /// Recompute direct and total cost from the (rounded) bucket amounts.
    /// Used after substitutions mutate component lines.
    pub fn recompute_totals(&mut self) {
        for class in ResourceClass::ALL {
            let bucket = self.class_mut(class);
            if !bucket.components.is_empty() {
                let sum: f64 = bucket.components.iter().map(|line| line.total).sum();
                bucket.amount = round2(sum);
            }
        }
        let direct: f64 = ResourceClass::ALL
            .iter()
            .map(|class| self.class(*class).amount)
            .sum();
        self.direct_cost = round2(direct);
        for kind in IndirectKind::ALL {
            let pct = self.indirect(kind).percentage;
            let amount = round2(self.direct_cost * pct);
            match kind {
                IndirectKind::Overhead => self.overhead.amount = amount,
                IndirectKind::Profit => self.profit.amount = amount,
                IndirectKind::Contingency => self.contingency.amount = amount,
            }
        }
        self.total_cost = round2(
            self.direct_cost + self.overhead.amount + self.profit.amount + self.contingency.amount,
        );
        if self.direct_cost > 0.0 {
            for class in ResourceClass::ALL {
                let amount = self.class(class).amount;
                self.class_mut(class).percentage = round4(amount / self.direct_cost);
            }
        }
    }
}

const PERCENTAGE_TOLERANCE: f64 = 0.01;
const RECONCILE_TOLERANCE: f64 = 0.01;
const INDIRECT_WARNING_THRESHOLD: f64 = 0.5;

/// Analyze one BoQ item against a decomposition spec.
///
/// Top-down treats `item.unit_price` as the direct-cost basis and splits it
/// across the four classes; bottom-up derives the unit price from component
/// lines and indirect percentages. A zero unit price with component lines
/// forces bottom-up.
pub fn analyze(
    item: &BoqItem,
    spec: &DecompositionSpec,
    catalogs: &Catalogs,
    analyzed_at: NaiveDateTime,
) -> EngineResult<UnitPriceAnalysis> {
    validate_spec(spec)?;

    let mut warnings = Vec::new();
    for kind in IndirectKind::ALL {
        let pct = spec.indirect_pct(kind);
        if pct >= INDIRECT_WARNING_THRESHOLD {
            warnings.push(format!(
                "{} percentage {:.0}% is unusually high",
                kind.as_str(),
                pct * 100.0
            ));
        }
    }

    let has_lines = ResourceClass::ALL
        .iter()
        .any(|class| !spec.class(*class).components.is_empty());
    let mode = if spec.mode == ReconcileMode::BottomUp || (item.unit_price == 0.0 && has_lines) {
        ReconcileMode::BottomUp
    } else {
        ReconcileMode::TopDown
    };

    // Resolve component lines first; they are shared by both modes.
    let mut resolved: Vec<(ResourceClass, Vec<ComponentLine>)> = Vec::with_capacity(4);
    for class in ResourceClass::ALL {
        let lines = resolve_components(class, &spec.class(class).components, catalogs)?;
        resolved.push((class, lines));
    }

    let analysis = match mode {
        ReconcileMode::TopDown => analyze_top_down(item, spec, resolved, warnings, analyzed_at)?,
        ReconcileMode::BottomUp => analyze_bottom_up(item, spec, resolved, warnings, analyzed_at)?,
    };
    Ok(analysis)
}

fn validate_spec(spec: &DecompositionSpec) -> EngineResult<()> {
    for kind in IndirectKind::ALL {
        let pct = spec.indirect_pct(kind);
        if !pct.is_finite() || pct < 0.0 {
            return Err(EngineError::validation_field(
                format!("{} percentage {} is invalid", kind.as_str(), pct),
                kind.as_str(),
            ));
        }
    }
    for class in ResourceClass::ALL {
        let class_spec = spec.class(class);
        if let Some(pct) = class_spec.percentage {
            if !pct.is_finite() || pct < 0.0 {
                return Err(EngineError::validation_field(
                    format!("{class} percentage {pct} is invalid"),
                    class.as_str(),
                ));
            }
        }
        for component in &class_spec.components {
            if !component.quantity.is_finite() || component.quantity < 0.0 {
                return Err(EngineError::validation_field(
                    format!("component quantity {} is invalid", component.quantity),
                    "quantity",
                ));
            }
            if let Some(price) = component.unit_price {
                if !price.is_finite() || price < 0.0 {
                    return Err(EngineError::validation_field(
                        format!("component unit price {price} is invalid"),
                        "unit_price",
                    ));
                }
            }
            if component.resource_ref.is_none() && component.unit_price.is_none() {
                return Err(EngineError::validation_field(
                    "free-form component requires an explicit unit price",
                    "unit_price",
                ));
            }
        }
    }
    Ok(())
}

fn resolve_components(
    class: ResourceClass,
    inputs: &[ComponentInput],
    catalogs: &Catalogs,
) -> EngineResult<Vec<ComponentLine>> {
    let mut lines = Vec::with_capacity(inputs.len());
    for input in inputs {
        let unit_price = match &input.resource_ref {
            Some(resource_id) => {
                let resource = catalogs.get(resource_id)?;
                if resource.class() != class {
                    return Err(EngineError::validation_field(
                        format!(
                            "resource '{resource_id}' is {}, listed under {class}",
                            resource.class()
                        ),
                        "resource_ref",
                    ));
                }
                match resource.unit_price_for(input.unit, &catalogs.time_config)? {
                    Some(price) => input.unit_price.unwrap_or(price),
                    // Subcontractor entries price per agreement; the caller
                    // must supply the rate.
                    None => input.unit_price.ok_or_else(|| {
                        EngineError::validation_field(
                            format!(
                                "subcontractor component '{resource_id}' requires an explicit unit price"
                            ),
                            "unit_price",
                        )
                    })?,
                }
            }
            None => input.unit_price.expect("validated above"),
        };
        lines.push(ComponentLine {
            resource_ref: input.resource_ref.clone(),
            description: input.description.clone(),
            quantity: input.quantity,
            unit: input.unit,
            unit_price,
            total: round2(input.quantity * unit_price),
        });
    }
    Ok(lines)
}

fn lines_amount(lines: &[ComponentLine]) -> f64 {
    round2(lines.iter().map(|line| line.total).sum())
}

fn analyze_top_down(
    item: &BoqItem,
    spec: &DecompositionSpec,
    resolved: Vec<(ResourceClass, Vec<ComponentLine>)>,
    warnings: Vec<String>,
    analyzed_at: NaiveDateTime,
) -> EngineResult<UnitPriceAnalysis> {
    let unit_price = item.unit_price;

    // Derived percentages from component lines, declared percentages for
    // the lump classes.
    let mut derived_pct_sum = 0.0;
    let mut declared_pct_sum = 0.0;
    let mut all_have_lines = true;
    for (class, lines) in &resolved {
        if lines.is_empty() {
            all_have_lines = false;
            declared_pct_sum += spec.class(*class).percentage.unwrap_or(0.0);
        } else if unit_price > 0.0 {
            derived_pct_sum += lines_amount(lines) / unit_price;
        }
    }

    // With exhaustive lines the percentage invariant is subsumed by the
    // price-consistency check further down; normalization only concerns
    // declared lumps.
    let pct_total = derived_pct_sum + declared_pct_sum;
    let mut lump_scale = 1.0;
    if !all_have_lines {
        if (pct_total - 1.0).abs() > PERCENTAGE_TOLERANCE {
            if !spec.auto_normalize {
                return Err(EngineError::InvalidDecomposition {
                    percentage_total: pct_total,
                });
            }
            if declared_pct_sum > 0.0 {
                lump_scale = (1.0 - derived_pct_sum) / declared_pct_sum;
            }
            if lump_scale < 0.0 {
                return Err(EngineError::InvalidDecomposition {
                    percentage_total: pct_total,
                });
            }
        } else if declared_pct_sum > 0.0 {
            // Within tolerance: scale lumps so the four classes sum to
            // exactly 1.
            lump_scale = (1.0 - derived_pct_sum) / declared_pct_sum;
        }
    }

    let mut analysis = empty_analysis(item, ReconcileMode::TopDown, spec, warnings, analyzed_at);
    for (class, lines) in resolved {
        let bucket = analysis.class_mut(class);
        if lines.is_empty() {
            let pct = spec.class(class).percentage.unwrap_or(0.0) * lump_scale;
            bucket.percentage = round4(pct);
            bucket.amount = round2(unit_price * pct);
        } else {
            let amount = lines_amount(&lines);
            bucket.amount = amount;
            bucket.percentage = if unit_price > 0.0 {
                round4(amount / unit_price)
            } else {
                0.0
            };
            bucket.components = lines;
        }
    }

    let direct: f64 = ResourceClass::ALL
        .iter()
        .map(|class| analysis.class(*class).amount)
        .sum();
    analysis.direct_cost = round2(direct);

    // With exhaustive component lines, the fixed unit price and the derived
    // direct cost must agree within 1%.
    if all_have_lines && unit_price > 0.0 {
        let divergence = (analysis.direct_cost - unit_price).abs() / unit_price;
        if divergence > RECONCILE_TOLERANCE {
            return Err(EngineError::DecompositionInconsistent {
                declared: unit_price,
                derived: analysis.direct_cost,
            });
        }
    }

    apply_indirects(&mut analysis, spec);
    analysis.unit_price = unit_price;
    Ok(analysis)
}

fn analyze_bottom_up(
    item: &BoqItem,
    spec: &DecompositionSpec,
    resolved: Vec<(ResourceClass, Vec<ComponentLine>)>,
    warnings: Vec<String>,
    analyzed_at: NaiveDateTime,
) -> EngineResult<UnitPriceAnalysis> {
    // Lump classes in bottom-up mode take their share of the derived
    // direct cost: direct = line_sum / (1 - lump_pct_sum).
    let mut line_sum = 0.0;
    let mut lump_pct_sum = 0.0;
    for (class, lines) in &resolved {
        if lines.is_empty() {
            lump_pct_sum += spec.class(*class).percentage.unwrap_or(0.0);
        } else {
            line_sum += lines_amount(lines);
        }
    }
    if lump_pct_sum >= 1.0 {
        return Err(EngineError::InvalidDecomposition {
            percentage_total: lump_pct_sum,
        });
    }

    let direct = if line_sum > 0.0 {
        line_sum / (1.0 - lump_pct_sum)
    } else {
        0.0
    };

    let mut analysis = empty_analysis(item, ReconcileMode::BottomUp, spec, warnings, analyzed_at);
    for (class, lines) in resolved {
        let bucket = analysis.class_mut(class);
        if lines.is_empty() {
            let pct = spec.class(class).percentage.unwrap_or(0.0);
            bucket.amount = round2(direct * pct);
        } else {
            bucket.amount = lines_amount(&lines);
            bucket.components = lines;
        }
    }

    let direct_rounded: f64 = ResourceClass::ALL
        .iter()
        .map(|class| analysis.class(*class).amount)
        .sum();
    analysis.direct_cost = round2(direct_rounded);
    for class in ResourceClass::ALL {
        let amount = analysis.class(class).amount;
        analysis.class_mut(class).percentage = if analysis.direct_cost > 0.0 {
            round4(amount / analysis.direct_cost)
        } else {
            0.0
        };
    }

    apply_indirects(&mut analysis, spec);
    analysis.unit_price = analysis.total_cost;
    Ok(analysis)
}

fn empty_analysis(
    item: &BoqItem,
    mode: ReconcileMode,
    spec: &DecompositionSpec,
    warnings: Vec<String>,
    analyzed_at: NaiveDateTime,
) -> UnitPriceAnalysis {
    UnitPriceAnalysis {
        item_id: item.id.clone(),
        mode,
        materials: ClassBucket::default(),
        equipment: ClassBucket::default(),
        labor: ClassBucket::default(),
        subcontractors: ClassBucket::default(),
        overhead: IndirectBucket {
            percentage: spec.overhead_pct,
            amount: 0.0,
        },
        profit: IndirectBucket {
            percentage: spec.profit_pct,
            amount: 0.0,
        },
        contingency: IndirectBucket {
            percentage: spec.contingency_pct,
            amount: 0.0,
        },
        direct_cost: 0.0,
        total_cost: 0.0,
        unit_price: 0.0,
        analyzed_at,
        warnings,
        dirty: false,
    }
}

fn apply_indirects(analysis: &mut UnitPriceAnalysis, spec: &DecompositionSpec) {
    analysis.overhead.amount = round2(analysis.direct_cost * spec.overhead_pct);
    analysis.profit.amount = round2(analysis.direct_cost * spec.profit_pct);
    analysis.contingency.amount = round2(analysis.direct_cost * spec.contingency_pct);
    // Sums run over the rounded amounts so displayed totals match the
    // displayed components exactly.
    analysis.total_cost = round2(
        analysis.direct_cost
            + analysis.overhead.amount
            + analysis.profit.amount
            + analysis.contingency.amount,
    );
}
