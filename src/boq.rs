use crate::error::{EngineError, EngineResult};
use crate::item_validation::{self, ItemValidationError};
use crate::rounding::round2;
use crate::units::Unit;
use polars::prelude::PlSmallStr;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// One line of a Bill of Quantities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoqItem {
    pub id: String,
    pub code: String,
    pub description: String,
    pub unit: Unit,
    pub quantity: f64,
    pub unit_price: f64,
    /// Derived: `round2(quantity * unit_price)`. Never set directly.
    pub total_price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl BoqItem {
    pub fn new(
        id: impl Into<String>,
        code: impl Into<String>,
        description: impl Into<String>,
        unit: Unit,
        quantity: f64,
        unit_price: f64,
    ) -> Self {
        let mut item = Self {
            id: id.into(),
            code: code.into(),
            description: description.into(),
            unit,
            quantity,
            unit_price,
            total_price: 0.0,
            category: None,
        };
        item.recompute_total();
        item
    }

    pub fn recompute_total(&mut self) {
        self.total_price = round2(self.quantity * self.unit_price);
    }

    pub fn to_dataframe_row(&self) -> PolarsResult<DataFrame> {
        let mut columns: Vec<Column> = Vec::with_capacity(8);

        let id_data: [&str; 1] = [self.id.as_str()];
        columns.push(Series::new(PlSmallStr::from_static("id"), id_data).into_column());

        let code_data: [&str; 1] = [self.code.as_str()];
        columns.push(Series::new(PlSmallStr::from_static("code"), code_data).into_column());

        let description_data: [&str; 1] = [self.description.as_str()];
        columns.push(
            Series::new(PlSmallStr::from_static("description"), description_data).into_column(),
        );

        let unit_data: [&str; 1] = [self.unit.as_str()];
        columns.push(Series::new(PlSmallStr::from_static("unit"), unit_data).into_column());

        let quantity_data: [f64; 1] = [self.quantity];
        columns.push(Series::new(PlSmallStr::from_static("quantity"), quantity_data).into_column());

        let unit_price_data: [f64; 1] = [self.unit_price];
        columns.push(
            Series::new(PlSmallStr::from_static("unit_price"), unit_price_data).into_column(),
        );

        let total_price_data: [f64; 1] = [self.total_price];
        columns.push(
            Series::new(PlSmallStr::from_static("total_price"), total_price_data).into_column(),
        );

        let category_data: [Option<&str>; 1] = [self.category.as_deref()];
        columns.push(Series::new(PlSmallStr::from_static("category"), category_data).into_column());

        DataFrame::new(columns)
    }

    pub fn from_dataframe_row(df: &DataFrame, row_idx: usize) -> PolarsResult<Self> {
        let id = df
            .column("id")?
            .str()?
            .get(row_idx)
            .ok_or_else(|| PolarsError::ComputeError("BoQ row missing id".into()))?
            .to_string();

        let unit_str = df.column("unit")?.str()?.get(row_idx).unwrap_or("piece");
        let unit = Unit::from_str(unit_str).ok_or_else(|| {
            PolarsError::ComputeError(format!("unknown unit '{unit_str}' in BoQ row").into())
        })?;

        Ok(Self {
            id,
            code: df
                .column("code")?
                .str()?
                .get(row_idx)
                .unwrap_or("")
                .to_string(),
            description: df
                .column("description")?
                .str()?
                .get(row_idx)
                .unwrap_or("")
                .to_string(),
            unit,
            quantity: df.column("quantity")?.f64()?.get(row_idx).unwrap_or(0.0),
            unit_price: df.column("unit_price")?.f64()?.get(row_idx).unwrap_or(0.0),
            total_price: df
                .column("total_price")?
                .f64()?
                .get(row_idx)
                .unwrap_or(0.0),
            category: df
                .column("category")?
                .str()?
                .get(row_idx)
                .map(ToOwned::to_owned),
        })
    }
}

/// The ordered BoQ of one project, held as a DataFrame so hosts can hand
/// the table straight to reporting code.
#[derive(Debug, Clone)]
pub struct BillOfQuantities {
    df: DataFrame,
}

impl Default for BillOfQuantities {
    fn default() -> Self {
        Self::new()
    }
}

impl BillOfQuantities {
    pub fn new() -> Self {
        let schema = Self::default_schema();
        Self {
            df: DataFrame::empty_with_schema(&schema),
        }
    }

    fn default_schema() -> Schema {
        Schema::from_iter(vec![
            Field::new("id".into(), DataType::String),
            Field::new("code".into(), DataType::String),
            Field::new("description".into(), DataType::String),
            Field::new("unit".into(), DataType::String),
            Field::new("quantity".into(), DataType::Float64),
            Field::new("unit_price".into(), DataType::Float64),
            Field::new("total_price".into(), DataType::Float64),
            Field::new("category".into(), DataType::String),
        ])
    }

    pub fn dataframe(&self) -> &DataFrame {
        &self.df
    }

    pub fn len(&self) -> usize {
        self.df.height()
    }

    pub fn is_empty(&self) -> bool {
        self.df.height() == 0
    }

    fn validation_error(err: ItemValidationError) -> EngineError {
        EngineError::validation(err.to_string())
    }

    fn dataframe_error(err: PolarsError) -> EngineError {
        EngineError::validation(format!("BoQ table error: {err}"))
    }

    fn row_index(&self, item_id: &str) -> EngineResult<Option<usize>> {
        if self.df.height() == 0 {
            return Ok(None);
        }
        let id_col = self.df.column("id").map_err(Self::dataframe_error)?;
        let ids = id_col.str().map_err(Self::dataframe_error)?;
        for (idx, id_opt) in ids.into_iter().enumerate() {
            if id_opt == Some(item_id) {
                return Ok(Some(idx));
            }
        }
        Ok(None)
    }

    fn update_string_column(
        &mut self,
        column_name: &str,
        item_id: &str,
        new_value: &str,
    ) -> Result<(), PolarsError> {
        let id_col = self.df.column("id")?;
        let target_col = self.df.column(column_name)?;

        let new_series = target_col
            .str()?
            .into_iter()
            .zip(id_col.str()?.into_iter())
            .map(|(val, id)| {
                if id == Some(item_id) {
                    Some(new_value)
                } else {
                    val
                }
            })
            .collect::<StringChunked>()
            .into_series()
            .with_name(column_name.into());

        self.df.replace(column_name, new_series)?;
        Ok(())
    }

    fn update_float_column(
        &mut self,
        column_name: &str,
        item_id: &str,
        new_value: f64,
    ) -> Result<(), PolarsError> {
        let id_col = self.df.column("id")?;
        let target_col = self.df.column(column_name)?;

        let new_series = target_col
            .f64()?
            .into_iter()
            .zip(id_col.str()?.into_iter())
            .map(|(val, id)| {
                if id == Some(item_id) {
                    Some(new_value)
                } else {
                    val
                }
            })
            .collect::<Float64Chunked>()
            .into_series()
            .with_name(column_name.into());

        self.df.replace(column_name, new_series)?;
        Ok(())
    }

    pub fn find_item(&self, item_id: &str) -> EngineResult<Option<BoqItem>> {
        match self.row_index(item_id)? {
            Some(idx) => BoqItem::from_dataframe_row(&self.df, idx)
                .map(Some)
                .map_err(Self::dataframe_error),
            None => Ok(None),
        }
    }

    pub fn get_item(&self, item_id: &str) -> EngineResult<BoqItem> {
        self.find_item(item_id)?
            .ok_or_else(|| EngineError::UnknownResource {
                id: item_id.to_string(),
            })
    }

    pub fn items(&self) -> EngineResult<Vec<BoqItem>> {
        let mut items = Vec::with_capacity(self.df.height());
        for idx in 0..self.df.height() {
            items.push(BoqItem::from_dataframe_row(&self.df, idx).map_err(Self::dataframe_error)?);
        }
        Ok(items)
    }

    pub fn list_items(&self, category: Option<&str>) -> EngineResult<Vec<BoqItem>> {
        let items = self.items()?;
        match category {
            Some(category) => Ok(items
                .into_iter()
                .filter(|item| {
                    item.category
                        .as_deref()
                        .is_some_and(|c| c.eq_ignore_ascii_case(category))
                })
                .collect()),
            None => Ok(items),
        }
    }

    /// Insert or replace an item. The derived total is always recomputed
    /// from quantity and unit price before the row lands in the table.
    pub fn upsert_item(&mut self, mut item: BoqItem) -> EngineResult<()> {
        item.recompute_total();
        item_validation::validate_item(&item).map_err(Self::validation_error)?;

        if self.row_index(&item.id)?.is_some() {
            self.update_string_column("code", &item.id, &item.code)
                .map_err(Self::dataframe_error)?;
            self.update_string_column("description", &item.id, &item.description)
                .map_err(Self::dataframe_error)?;
            self.update_string_column("unit", &item.id, item.unit.as_str())
                .map_err(Self::dataframe_error)?;
            self.update_float_column("quantity", &item.id, item.quantity)
                .map_err(Self::dataframe_error)?;
            self.update_float_column("unit_price", &item.id, item.unit_price)
                .map_err(Self::dataframe_error)?;
            self.update_float_column("total_price", &item.id, item.total_price)
                .map_err(Self::dataframe_error)?;
            if let Some(category) = &item.category {
                self.update_string_column("category", &item.id, category)
                    .map_err(Self::dataframe_error)?;
            }
            return Ok(());
        }

        let new_row = item.to_dataframe_row().map_err(Self::dataframe_error)?;
        self.df = self.df.vstack(&new_row).map_err(Self::dataframe_error)?;
        Ok(())
    }

    pub fn set_quantity(&mut self, item_id: &str, quantity: f64) -> EngineResult<()> {
        let mut item = self.get_item(item_id)?;
        item.quantity = quantity;
        self.upsert_item(item)
    }

    pub fn set_unit_price(&mut self, item_id: &str, unit_price: f64) -> EngineResult<()> {
        let mut item = self.get_item(item_id)?;
        item.unit_price = unit_price;
        self.upsert_item(item)
    }

    pub fn delete_item(&mut self, item_id: &str) -> EngineResult<bool> {
        if self.row_index(item_id)?.is_none() {
            return Ok(false);
        }
        let snapshot = self.items()?;
        self.df = DataFrame::empty_with_schema(&Self::default_schema());
        for item in snapshot {
            if item.id == item_id {
                continue;
            }
            self.upsert_item(item)?;
        }
        Ok(true)
    }

    /// Sum of the already-rounded row totals, so the roll-up matches what a
    /// reader adds up from the displayed table.
    pub fn total_value(&self) -> EngineResult<f64> {
        let mut total = 0.0;
        for item in self.items()? {
            total += item.total_price;
        }
        Ok(round2(total))
    }

    /// Bulk import replaces nothing: rows upsert in order, later rows win.
    pub fn bulk_import<I>(&mut self, items: I) -> EngineResult<usize>
    where
        I: IntoIterator<Item = BoqItem>,
    {
        let mut count = 0;
        for item in items {
            self.upsert_item(item)?;
            count += 1;
        }
        Ok(count)
    }

    pub fn from_items(items: Vec<BoqItem>) -> EngineResult<Self> {
        item_validation::validate_item_collection(&items).map_err(Self::validation_error)?;
        let mut boq = Self::new();
        for item in items {
            boq.upsert_item(item)?;
        }
        Ok(boq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schema_contains_expected_columns() {
        let schema = BillOfQuantities::default_schema();
        for name in [
            "id",
            "code",
            "description",
            "unit",
            "quantity",
            "unit_price",
            "total_price",
            "category",
        ] {
            assert!(schema.contains(name.into()), "missing column {name}");
        }
    }

    #[test]
    fn upsert_inserts_and_updates() {
        let mut boq = BillOfQuantities::new();
        boq.upsert_item(BoqItem::new("A-001", "A-001", "Excavation", Unit::CubicMeter, 10.0, 5.0))
            .unwrap();
        assert_eq!(boq.len(), 1);

        boq.upsert_item(BoqItem::new("A-001", "A-001", "Excavation", Unit::CubicMeter, 12.0, 5.0))
            .unwrap();
        assert_eq!(boq.len(), 1);
        let item = boq.get_item("A-001").unwrap();
        assert_eq!(item.quantity, 12.0);
        assert_eq!(item.total_price, 60.0);
    }

    #[test]
    fn mutating_quantity_recomputes_total() {
        let mut boq = BillOfQuantities::new();
        boq.upsert_item(BoqItem::new("B-1", "B-1", "Formwork", Unit::SquareMeter, 3.0, 7.5))
            .unwrap();
        boq.set_quantity("B-1", 4.0).unwrap();
        assert_eq!(boq.get_item("B-1").unwrap().total_price, 30.0);
        boq.set_unit_price("B-1", 8.0).unwrap();
        assert_eq!(boq.get_item("B-1").unwrap().total_price, 32.0);
    }

    #[test]
    fn negative_quantity_is_rejected() {
        let mut boq = BillOfQuantities::new();
        let err = boq
            .upsert_item(BoqItem::new("C-1", "C-1", "Rebar", Unit::Ton, -1.0, 10.0))
            .unwrap_err();
        assert_eq!(err.kind(), "ValidationError");
    }
}
