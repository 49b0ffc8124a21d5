use crate::boq::BoqItem;
use crate::rounding::round2;
use std::collections::HashSet;
use std::fmt;

const EPSILON: f64 = 1e-6;

#[derive(Debug, Clone)]
pub struct ItemValidationError {
    message: String,
}

impl ItemValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for ItemValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ItemValidationError {}

pub fn validate_item(item: &BoqItem) -> Result<(), ItemValidationError> {
    if item.id.trim().is_empty() {
        return Err(ItemValidationError::new("BoQ item requires a non-empty id"));
    }
    if !item.quantity.is_finite() || item.quantity < 0.0 {
        return Err(ItemValidationError::new(format!(
            "item {} has invalid quantity {}",
            item.id, item.quantity
        )));
    }
    if !item.unit_price.is_finite() || item.unit_price < 0.0 {
        return Err(ItemValidationError::new(format!(
            "item {} has invalid unit price {}",
            item.id, item.unit_price
        )));
    }
    let expected_total = round2(item.quantity * item.unit_price);
    if (item.total_price - expected_total).abs() > 0.005 + EPSILON {
        return Err(ItemValidationError::new(format!(
            "item {} total {} does not match quantity x unit price {}",
            item.id, item.total_price, expected_total
        )));
    }
    Ok(())
}

pub fn validate_item_collection(items: &[BoqItem]) -> Result<(), ItemValidationError> {
    let mut seen_ids = HashSet::with_capacity(items.len());
    for item in items {
        if !seen_ids.insert(item.id.as_str()) {
            return Err(ItemValidationError::new(format!(
                "duplicate BoQ item id {}",
                item.id
            )));
        }
        validate_item(item)?;
    }
    Ok(())
}
