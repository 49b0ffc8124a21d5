use crate::analysis::UnitPriceAnalysis;
use crate::catalog::{Catalogs, Resource, ResourceClass, ResourceKind};
use crate::rounding::{round2, round4};
use crate::units::Unit;
use serde::{Deserialize, Serialize};

/// Local vs total cost of one resource class across a set of analyses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassContent {
    pub class: Option<ResourceClass>,
    pub local_cost: f64,
    pub total_cost: f64,
    /// local / total, 0 when the class carries no cost.
    pub percentage: f64,
    /// Share of this class in the project's direct cost.
    pub weight: f64,
}

/// One suggested lever to close the local-content gap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub class: ResourceClass,
    /// class weight x (1 - class local share); bigger means more room.
    pub leverage: f64,
    pub current_local_share: f64,
    /// Smallest local share for this class that closes the gap with the
    /// other classes unchanged; `None` when the class alone cannot close it.
    pub required_local_share: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalContentReport {
    pub classes: Vec<ClassContent>,
    pub local_cost: f64,
    pub total_cost: f64,
    pub percentage: f64,
    pub target: f64,
    /// target - percentage, clamped at 0 when the target is met.
    pub gap: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recommendations: Vec<Recommendation>,
}

fn component_is_local(resource_ref: Option<&str>, catalogs: &Catalogs) -> bool {
    // Free-form components have no provenance; they count as non-local.
    resource_ref
        .and_then(|id| catalogs.find(id))
        .map(|resource| resource.is_local)
        .unwrap_or(false)
}

/// Evaluate local content over a set of analyses, weighting each analysis
/// by its item quantity so the report reflects project money, not unit
/// prices. `is_local` flags are dereferenced through the catalogs at read
/// time.
pub fn evaluate(
    analyses: &[(f64, &UnitPriceAnalysis)],
    catalogs: &Catalogs,
    target: f64,
) -> LocalContentReport {
    let mut classes: Vec<ClassContent> = ResourceClass::ALL
        .iter()
        .map(|class| ClassContent {
            class: Some(*class),
            ..ClassContent::default()
        })
        .collect();

    for (quantity, analysis) in analyses {
        for (idx, class) in ResourceClass::ALL.iter().enumerate() {
            let bucket = analysis.class(*class);
            let entry = &mut classes[idx];
            if bucket.components.is_empty() {
                // Lump buckets carry no provenance: cost counts, local does not.
                entry.total_cost += bucket.amount * quantity;
            } else {
                for line in &bucket.components {
                    entry.total_cost += line.total * quantity;
                    if component_is_local(line.resource_ref.as_deref(), catalogs) {
                        entry.local_cost += line.total * quantity;
                    }
                }
            }
        }
    }

    let total_cost: f64 = classes.iter().map(|entry| entry.total_cost).sum();
    let local_cost: f64 = classes.iter().map(|entry| entry.local_cost).sum();
    for entry in &mut classes {
        entry.percentage = if entry.total_cost > 0.0 {
            round4(entry.local_cost / entry.total_cost)
        } else {
            0.0
        };
        entry.weight = if total_cost > 0.0 {
            round4(entry.total_cost / total_cost)
        } else {
            0.0
        };
        entry.local_cost = round2(entry.local_cost);
        entry.total_cost = round2(entry.total_cost);
    }

    let percentage = if total_cost > 0.0 {
        round4(local_cost / total_cost)
    } else {
        0.0
    };
    let gap = (target - percentage).max(0.0);

    let mut recommendations = Vec::new();
    if gap > 0.0 {
        for entry in &classes {
            let class = entry.class.expect("class set above");
            if entry.weight <= 0.0 {
                continue;
            }
            let leverage = round4(entry.weight * (1.0 - entry.percentage));
            // Raise this class until the project total reaches the target,
            // holding the other classes fixed.
            let required = entry.percentage + gap / entry.weight;
            let required_local_share = if required <= 1.0 {
                Some(round4(required))
            } else {
                None
            };
            recommendations.push(Recommendation {
                class,
                leverage,
                current_local_share: entry.percentage,
                required_local_share,
            });
        }
        recommendations.sort_by(|a, b| {
            b.leverage
                .partial_cmp(&a.leverage)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }

    LocalContentReport {
        classes,
        local_cost: round2(local_cost),
        total_cost: round2(total_cost),
        percentage,
        target,
        gap: round4(gap),
        recommendations,
    }
}

/// A local substitute for a non-local component: same class, category,
/// subcategory, and (for materials) declared unit. Cheapest candidate wins.
pub fn nearest_local_substitute<'a>(
    original: &Resource,
    unit: Unit,
    catalogs: &'a Catalogs,
) -> Option<&'a Resource> {
    let catalog = catalogs.catalog(original.class());
    let mut best: Option<(&Resource, f64)> = None;
    for candidate in catalog.iter() {
        if !candidate.is_local || candidate.id == original.id {
            continue;
        }
        if !candidate.category.eq_ignore_ascii_case(&original.category)
            || !candidate
                .subcategory
                .eq_ignore_ascii_case(&original.subcategory)
        {
            continue;
        }
        if let ResourceKind::Material(detail) = &candidate.kind {
            if detail.unit != unit {
                continue;
            }
        }
        let Ok(Some(price)) = candidate.unit_price_for(unit, &catalogs.time_config) else {
            continue;
        };
        match best {
            Some((_, best_price)) if best_price <= price => {}
            _ => best = Some((candidate, price)),
        }
    }
    best.map(|(resource, _)| resource)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{ClassBucket, ComponentLine, IndirectBucket, ReconcileMode};

    fn analysis_with_components(local_total: f64, foreign_total: f64) -> UnitPriceAnalysis {
        let components = vec![
            ComponentLine {
                resource_ref: Some("LOCAL".into()),
                description: None,
                quantity: 1.0,
                unit: Unit::Ton,
                unit_price: local_total,
                total: local_total,
            },
            ComponentLine {
                resource_ref: Some("FOREIGN".into()),
                description: None,
                quantity: 1.0,
                unit: Unit::Ton,
                unit_price: foreign_total,
                total: foreign_total,
            },
        ];
        UnitPriceAnalysis {
            item_id: "I-1".into(),
            mode: ReconcileMode::BottomUp,
            materials: ClassBucket {
                percentage: 1.0,
                amount: local_total + foreign_total,
                components,
            },
            equipment: ClassBucket::default(),
            labor: ClassBucket::default(),
            subcontractors: ClassBucket::default(),
            overhead: IndirectBucket::default(),
            profit: IndirectBucket::default(),
            contingency: IndirectBucket::default(),
            direct_cost: local_total + foreign_total,
            total_cost: local_total + foreign_total,
            unit_price: local_total + foreign_total,
            analyzed_at: chrono::NaiveDate::from_ymd_opt(2026, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            warnings: Vec::new(),
            dirty: false,
        }
    }

    fn catalogs_with_locality() -> Catalogs {
        use crate::catalog::{MaterialDetail, Resource, ResourceKind};
        let mut catalogs = Catalogs::new();
        for (id, is_local) in [("LOCAL", true), ("FOREIGN", false)] {
            catalogs
                .materials
                .add(Resource {
                    id: id.into(),
                    name: id.into(),
                    category: "aggregates".into(),
                    subcategory: "sand".into(),
                    is_local,
                    description: String::new(),
                    kind: ResourceKind::Material(MaterialDetail {
                        unit: Unit::Ton,
                        price: 10.0,
                        supplier: String::new(),
                        origin: String::new(),
                        lead_time_days: 0,
                        min_order: 0.0,
                    }),
                    extra: Default::default(),
                })
                .unwrap();
        }
        catalogs
    }

    #[test]
    fn percentage_reflects_local_share() {
        let analysis = analysis_with_components(60_000.0, 40_000.0);
        let catalogs = catalogs_with_locality();
        let report = evaluate(&[(1.0, &analysis)], &catalogs, 0.40);
        assert_eq!(report.percentage, 0.6);
        assert_eq!(report.gap, 0.0);
        assert!(report.recommendations.is_empty());
    }

    #[test]
    fn gap_produces_ranked_recommendations() {
        let analysis = analysis_with_components(10_000.0, 90_000.0);
        let catalogs = catalogs_with_locality();
        let report = evaluate(&[(1.0, &analysis)], &catalogs, 0.50);
        assert!(report.gap > 0.0);
        let top = &report.recommendations[0];
        assert_eq!(top.class, ResourceClass::Materials);
        assert_eq!(top.required_local_share, Some(0.5));
    }
}
