use crate::error::{EngineError, EngineResult};
use crate::units::{TimeConversionConfig, TimeUnit, Unit};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The four resource classes a unit price decomposes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceClass {
    Materials,
    Equipment,
    Labor,
    Subcontractors,
}

impl ResourceClass {
    pub const ALL: [ResourceClass; 4] = [
        ResourceClass::Materials,
        ResourceClass::Equipment,
        ResourceClass::Labor,
        ResourceClass::Subcontractors,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceClass::Materials => "materials",
            ResourceClass::Equipment => "equipment",
            ResourceClass::Labor => "labor",
            ResourceClass::Subcontractors => "subcontractors",
        }
    }

    pub fn from_str(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "materials" | "material" => Some(ResourceClass::Materials),
            "equipment" => Some(ResourceClass::Equipment),
            "labor" | "labour" => Some(ResourceClass::Labor),
            "subcontractors" | "subcontractor" | "subs" => Some(ResourceClass::Subcontractors),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rates per time tier. `None` marks a tier the supplier does not offer.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RateSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hourly: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekly: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monthly: Option<f64>,
}

impl RateSet {
    pub fn new(hourly: f64, daily: f64, weekly: f64, monthly: f64) -> Self {
        Self {
            hourly: Some(hourly),
            daily: Some(daily),
            weekly: Some(weekly),
            monthly: Some(monthly),
        }
    }

    pub fn rate_for(&self, tier: TimeUnit) -> Option<f64> {
        match tier {
            TimeUnit::Hour => self.hourly,
            TimeUnit::Day => self.daily,
            TimeUnit::Week => self.weekly,
            TimeUnit::Month => self.monthly,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hourly.is_none()
            && self.daily.is_none()
            && self.weekly.is_none()
            && self.monthly.is_none()
    }

    /// Rate for `tier`, deriving it from the nearest priced tier through the
    /// time-conversion table when the tier itself is unavailable.
    pub fn rate_for_or_converted(
        &self,
        tier: TimeUnit,
        config: &TimeConversionConfig,
    ) -> Option<f64> {
        if let Some(rate) = self.rate_for(tier) {
            return Some(rate);
        }
        for source in [TimeUnit::Hour, TimeUnit::Day, TimeUnit::Week, TimeUnit::Month] {
            if let Some(rate) = self.rate_for(source) {
                return Some(config.convert_rate(rate, source, tier));
            }
        }
        None
    }

    fn validate(&self, id: &str) -> EngineResult<()> {
        for (tier, rate) in [
            ("hourly", self.hourly),
            ("daily", self.daily),
            ("weekly", self.weekly),
            ("monthly", self.monthly),
        ] {
            if let Some(rate) = rate {
                if !rate.is_finite() || rate < 0.0 {
                    return Err(EngineError::validation_field(
                        format!("resource '{id}' has invalid {tier} rate {rate}"),
                        format!("rates.{tier}"),
                    ));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialDetail {
    pub unit: Unit,
    pub price: f64,
    #[serde(default)]
    pub supplier: String,
    #[serde(default)]
    pub origin: String,
    #[serde(default)]
    pub lead_time_days: u32,
    #[serde(default)]
    pub min_order: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquipmentDetail {
    pub rates: RateSet,
    #[serde(default)]
    pub fuel_consumption: f64,
    #[serde(default)]
    pub maintenance_period_days: u32,
    #[serde(default)]
    pub maintenance_cost: f64,
    #[serde(default)]
    pub operator_required: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabourDetail {
    pub rates: RateSet,
    #[serde(default)]
    pub nationality: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skills: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub certifications: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubcontractorDetail {
    /// Tier 1 is the highest capability, 5 the lowest.
    pub classification: u8,
    #[serde(default)]
    pub experience_years: u32,
    /// Rating in [1, 5].
    pub rating: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub specialties: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_project_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_project_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
}

/// Specialization tail of a catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResourceKind {
    Material(MaterialDetail),
    Equipment(EquipmentDetail),
    Labour(LabourDetail),
    Subcontractor(SubcontractorDetail),
}

impl ResourceKind {
    pub fn class(&self) -> ResourceClass {
        match self {
            ResourceKind::Material(_) => ResourceClass::Materials,
            ResourceKind::Equipment(_) => ResourceClass::Equipment,
            ResourceKind::Labour(_) => ResourceClass::Labor,
            ResourceKind::Subcontractor(_) => ResourceClass::Subcontractors,
        }
    }
}

/// A catalog entry: shared fields plus the class-specific tail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub subcategory: String,
    #[serde(default)]
    pub is_local: bool,
    #[serde(default)]
    pub description: String,
    pub kind: ResourceKind,
    /// Columns from imports the engine does not interpret, preserved verbatim.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl Resource {
    pub fn class(&self) -> ResourceClass {
        self.kind.class()
    }

    /// The unit a component line must use for this resource: the declared
    /// unit for materials, a time unit for rated resources, none for
    /// subcontractors (priced per lump or per item unit).
    pub fn declared_unit(&self) -> Option<Unit> {
        match &self.kind {
            ResourceKind::Material(detail) => Some(detail.unit),
            _ => None,
        }
    }

    /// Unit price for a component measured in `unit`, converting rate tiers
    /// where needed. Subcontractor entries carry no intrinsic unit price.
    pub fn unit_price_for(
        &self,
        unit: Unit,
        config: &TimeConversionConfig,
    ) -> EngineResult<Option<f64>> {
        match &self.kind {
            ResourceKind::Material(detail) => {
                if unit != detail.unit {
                    return Err(EngineError::UnitMismatch {
                        resource_id: self.id.clone(),
                        declared: detail.unit,
                        provided: unit,
                    });
                }
                Ok(Some(detail.price))
            }
            ResourceKind::Equipment(detail) => {
                rated_unit_price(&self.id, &detail.rates, unit, config).map(Some)
            }
            ResourceKind::Labour(detail) => {
                rated_unit_price(&self.id, &detail.rates, unit, config).map(Some)
            }
            ResourceKind::Subcontractor(_) => Ok(None),
        }
    }

    fn validate(&self) -> EngineResult<()> {
        if self.id.trim().is_empty() {
            return Err(EngineError::validation_field("id must not be empty", "id"));
        }
        match &self.kind {
            ResourceKind::Material(detail) => {
                if !detail.price.is_finite() || detail.price < 0.0 {
                    return Err(EngineError::validation_field(
                        format!("material '{}' has invalid price {}", self.id, detail.price),
                        "price",
                    ));
                }
                if detail.min_order < 0.0 {
                    return Err(EngineError::validation_field(
                        format!("material '{}' has negative min_order", self.id),
                        "min_order",
                    ));
                }
            }
            ResourceKind::Equipment(detail) => detail.rates.validate(&self.id)?,
            ResourceKind::Labour(detail) => detail.rates.validate(&self.id)?,
            ResourceKind::Subcontractor(detail) => {
                if !(1..=5).contains(&detail.classification) {
                    return Err(EngineError::validation_field(
                        format!(
                            "subcontractor '{}' classification {} outside 1..=5",
                            self.id, detail.classification
                        ),
                        "classification",
                    ));
                }
                if !detail.rating.is_finite() || !(1.0..=5.0).contains(&detail.rating) {
                    return Err(EngineError::validation_field(
                        format!(
                            "subcontractor '{}' rating {} outside [1, 5]",
                            self.id, detail.rating
                        ),
                        "rating",
                    ));
                }
            }
        }
        Ok(())
    }
}

fn rated_unit_price(
    id: &str,
    rates: &RateSet,
    unit: Unit,
    config: &TimeConversionConfig,
) -> EngineResult<f64> {
    let Some(tier) = unit.time_unit() else {
        return Err(EngineError::validation_field(
            format!("resource '{id}' is rated per time unit, component uses '{unit}'"),
            "unit",
        ));
    };
    rates.rate_for_or_converted(tier, config).ok_or_else(|| {
        EngineError::validation_field(
            format!("resource '{id}' has no priced rate tier"),
            "rates",
        )
    })
}

/// Filters for catalog listing. All present fields must match.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_local: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<u8>,
}

impl CatalogFilter {
    fn matches(&self, resource: &Resource) -> bool {
        if let Some(category) = &self.category {
            if !resource.category.eq_ignore_ascii_case(category) {
                return false;
            }
        }
        if let Some(subcategory) = &self.subcategory {
            if !resource.subcategory.eq_ignore_ascii_case(subcategory) {
                return false;
            }
        }
        if let Some(is_local) = self.is_local {
            if resource.is_local != is_local {
                return false;
            }
        }
        if let Some(origin) = &self.origin {
            let resource_origin = match &resource.kind {
                ResourceKind::Material(detail) => detail.origin.as_str(),
                _ => "",
            };
            if !resource_origin.eq_ignore_ascii_case(origin) {
                return false;
            }
        }
        if let Some(min_rating) = self.min_rating {
            match &resource.kind {
                ResourceKind::Subcontractor(detail) if detail.rating >= min_rating => {}
                _ => return false,
            }
        }
        if let Some(classification) = self.classification {
            match &resource.kind {
                ResourceKind::Subcontractor(detail)
                    if detail.classification == classification => {}
                _ => return false,
            }
        }
        true
    }
}

/// One repository of resources of a single class, keyed by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    class: ResourceClass,
    entries: BTreeMap<String, Resource>,
}

impl Catalog {
    pub fn new(class: ResourceClass) -> Self {
        Self {
            class,
            entries: BTreeMap::new(),
        }
    }

    pub fn class(&self) -> ResourceClass {
        self.class
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn check_class(&self, resource: &Resource) -> EngineResult<()> {
        if resource.class() != self.class {
            return Err(EngineError::validation_field(
                format!(
                    "resource '{}' is a {} entry, catalog holds {}",
                    resource.id,
                    resource.class(),
                    self.class
                ),
                "kind",
            ));
        }
        Ok(())
    }

    pub fn add(&mut self, resource: Resource) -> EngineResult<()> {
        self.check_class(&resource)?;
        resource.validate()?;
        if self.entries.contains_key(&resource.id) {
            return Err(EngineError::DuplicateId {
                id: resource.id.clone(),
            });
        }
        self.entries.insert(resource.id.clone(), resource);
        Ok(())
    }

    /// Mutate an existing entry in place; the mutated entry is re-validated
    /// and its id must not change.
    pub fn update<F>(&mut self, id: &str, mutate: F) -> EngineResult<()>
    where
        F: FnOnce(&mut Resource),
    {
        let Some(existing) = self.entries.get(id) else {
            return Err(EngineError::UnknownResource { id: id.to_string() });
        };
        let mut updated = existing.clone();
        mutate(&mut updated);
        if updated.id != id {
            return Err(EngineError::validation_field(
                "resource id cannot be changed by update",
                "id",
            ));
        }
        self.check_class(&updated)?;
        updated.validate()?;
        self.entries.insert(id.to_string(), updated);
        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> EngineResult<Resource> {
        self.entries
            .remove(id)
            .ok_or_else(|| EngineError::UnknownResource { id: id.to_string() })
    }

    pub fn get(&self, id: &str) -> EngineResult<&Resource> {
        self.entries
            .get(id)
            .ok_or_else(|| EngineError::UnknownResource { id: id.to_string() })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn list(&self, filter: &CatalogFilter) -> Vec<&Resource> {
        self.entries
            .values()
            .filter(|resource| filter.matches(resource))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.entries.values()
    }

    /// Idempotent import: later rows overwrite earlier rows with the same id.
    pub fn import<I>(&mut self, rows: I) -> EngineResult<usize>
    where
        I: IntoIterator<Item = Resource>,
    {
        let mut count = 0;
        for resource in rows {
            self.check_class(&resource)?;
            resource.validate()?;
            self.entries.insert(resource.id.clone(), resource);
            count += 1;
        }
        Ok(count)
    }
}

/// The four catalogs together, plus the time-conversion table rated
/// resources price against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalogs {
    pub materials: Catalog,
    pub equipment: Catalog,
    pub labour: Catalog,
    pub subcontractors: Catalog,
    #[serde(default)]
    pub time_config: TimeConversionConfig,
}

impl Default for Catalogs {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalogs {
    pub fn new() -> Self {
        Self {
            materials: Catalog::new(ResourceClass::Materials),
            equipment: Catalog::new(ResourceClass::Equipment),
            labour: Catalog::new(ResourceClass::Labor),
            subcontractors: Catalog::new(ResourceClass::Subcontractors),
            time_config: TimeConversionConfig::default(),
        }
    }

    pub fn catalog(&self, class: ResourceClass) -> &Catalog {
        match class {
            ResourceClass::Materials => &self.materials,
            ResourceClass::Equipment => &self.equipment,
            ResourceClass::Labor => &self.labour,
            ResourceClass::Subcontractors => &self.subcontractors,
        }
    }

    pub fn catalog_mut(&mut self, class: ResourceClass) -> &mut Catalog {
        match class {
            ResourceClass::Materials => &mut self.materials,
            ResourceClass::Equipment => &mut self.equipment,
            ResourceClass::Labor => &mut self.labour,
            ResourceClass::Subcontractors => &mut self.subcontractors,
        }
    }

    /// Look a resource up across all four catalogs.
    pub fn find(&self, id: &str) -> Option<&Resource> {
        ResourceClass::ALL
            .iter()
            .find_map(|class| self.catalog(*class).entries.get(id))
    }

    pub fn get(&self, id: &str) -> EngineResult<&Resource> {
        self.find(id)
            .ok_or_else(|| EngineError::UnknownResource { id: id.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn material(id: &str) -> Resource {
        Resource {
            id: id.into(),
            name: format!("Material {id}"),
            category: "concrete".into(),
            subcategory: "ready-mix".into(),
            is_local: true,
            description: String::new(),
            kind: ResourceKind::Material(MaterialDetail {
                unit: Unit::CubicMeter,
                price: 120.0,
                supplier: "Acme".into(),
                origin: "domestic".into(),
                lead_time_days: 3,
                min_order: 5.0,
            }),
            extra: BTreeMap::new(),
        }
    }

    #[test]
    fn add_rejects_duplicate_ids() {
        let mut catalog = Catalog::new(ResourceClass::Materials);
        catalog.add(material("M-1")).unwrap();
        let err = catalog.add(material("M-1")).unwrap_err();
        assert_eq!(err.kind(), "DuplicateId");
    }

    #[test]
    fn wrong_class_is_rejected() {
        let mut catalog = Catalog::new(ResourceClass::Equipment);
        let err = catalog.add(material("M-1")).unwrap_err();
        assert_eq!(err.kind(), "ValidationError");
    }

    #[test]
    fn import_upserts_by_id() {
        let mut catalog = Catalog::new(ResourceClass::Materials);
        let mut replacement = material("M-1");
        if let ResourceKind::Material(detail) = &mut replacement.kind {
            detail.price = 150.0;
        }
        catalog
            .import(vec![material("M-1"), replacement])
            .unwrap();
        assert_eq!(catalog.len(), 1);
        let stored = catalog.get("M-1").unwrap();
        match &stored.kind {
            ResourceKind::Material(detail) => assert_eq!(detail.price, 150.0),
            _ => unreachable!(),
        }
    }

    #[test]
    fn rate_tier_fallback_converts_through_hours() {
        let rates = RateSet {
            hourly: Some(50.0),
            ..RateSet::default()
        };
        let config = TimeConversionConfig::default();
        assert_eq!(rates.rate_for_or_converted(TimeUnit::Day, &config), Some(400.0));
        assert_eq!(
            rates.rate_for_or_converted(TimeUnit::Month, &config),
            Some(8800.0)
        );
    }
}
