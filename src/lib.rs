pub mod allocation;
pub mod analysis;
pub mod boq;
pub mod catalog;
pub mod error;
#[cfg(feature = "http_api")]
pub mod http_api;
pub(crate) mod item_validation;
pub mod local_content;
pub mod persistence;
pub mod price_history;
pub mod project;
pub mod risk;
pub mod rounding;
pub mod state;
pub mod strategy;
pub mod units;

pub use allocation::{
    Allocation, AllocationMethod, CoverageRow, Department, DepartmentCategory, ItemDistribution,
    ItemShare, distribute_to_items,
};
pub use analysis::{
    ClassBucket, ClassSpec, ComponentInput, ComponentLine, DecompositionSpec, IndirectBucket,
    IndirectKind, ReconcileMode, UnitPriceAnalysis,
};
pub use boq::{BillOfQuantities, BoqItem};
pub use catalog::{
    Catalog, CatalogFilter, Catalogs, EquipmentDetail, LabourDetail, MaterialDetail, RateSet,
    Resource, ResourceClass, ResourceKind, SubcontractorDetail,
};
pub use error::{EngineError, EngineResult, ErrorBody};
pub use local_content::{LocalContentReport, Recommendation};
#[cfg(feature = "sqlite")]
pub use persistence::sqlite::SqliteStateStore;
pub use persistence::{
    PersistenceError, StateSnapshot, StateStore, load_boq_from_csv, load_catalog_from_csv,
    load_state_from_json, save_boq_to_csv, save_catalog_to_csv, save_state_to_json,
};
pub use price_history::{
    AnalysisStatus, PriceHistoryReport, PriceHistoryStore, PriceSample, TrendConfig,
    TrendDirection, VolatilityBucket,
};
pub use project::{IndirectParameters, Project};
pub use risk::{Impact, Probability, ResponseStrategy, Risk, RiskBucket, RiskRegister};
pub use rounding::round2;
pub use state::EngineState;
pub use strategy::{
    ComparisonEntry, ItemPricing, PricingInput, StrategyName, StrategyOutcome, StrategyRequest,
};
pub use units::{TimeConversionConfig, TimeUnit, Unit};
