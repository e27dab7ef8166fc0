//! Business rows as stored in the backend tables.

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

fn one() -> f64 {
    1.0
}

/// One sale (`sales`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleRecord {
    pub id: String,
    pub item_name: String,
    #[serde(default = "one")]
    pub quantity: f64,
    /// Total charged for the line, in rupees.
    pub amount: f64,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One stock item (`inventory`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: String,
    pub item_name: String,
    #[serde(default)]
    pub category: Option<String>,
    pub quantity: f64,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub cost_price: f64,
    #[serde(default)]
    pub selling_price: f64,
    #[serde(default)]
    pub low_stock_threshold: Option<f64>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl InventoryItem {
    pub const DEFAULT_LOW_STOCK_THRESHOLD: f64 = 10.0;

    pub fn threshold(&self) -> f64 {
        self.low_stock_threshold
            .unwrap_or(Self::DEFAULT_LOW_STOCK_THRESHOLD)
    }

    pub fn is_low_stock(&self) -> bool {
        self.quantity <= self.threshold()
    }

    pub fn is_out_of_stock(&self) -> bool {
        self.quantity <= 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    Income,
    Expense,
}

/// One ledger line (`finance_entries`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinanceEntry {
    pub id: String,
    pub entry_type: EntryType,
    #[serde(default)]
    pub category: Option<String>,
    pub amount: f64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub entry_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

/// One stored AI insight (`ai_insights`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightRecord {
    pub id: String,
    pub content: String,
    pub generated_at: DateTime<Utc>,
    #[serde(default)]
    pub model: Option<String>,
}

/// Decode raw rows, skipping (and logging) any that do not fit `T`.
pub fn decode_rows<T: DeserializeOwned>(table: &str, rows: Vec<Value>) -> Vec<T> {
    rows.into_iter()
        .filter_map(|row| {
            let id = row.get("id").and_then(Value::as_str).map(str::to_string);
            match serde_json::from_value(row) {
                Ok(decoded) => Some(decoded),
                Err(e) => {
                    warn!(table, id = ?id, error = %e, "Skipping malformed row");
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn malformed_rows_are_skipped() {
        let rows = vec![
            json!({ "id": "s1", "item_name": "Tea", "amount": 20.0, "created_at": "2026-03-01T10:00:00Z" }),
            json!({ "id": "s2", "item_name": "Sugar" }),
        ];
        let sales: Vec<SaleRecord> = decode_rows("sales", rows);
        assert_eq!(sales.len(), 1);
        assert_eq!(sales[0].quantity, 1.0);
        assert_eq!(sales[0].payment_method, None);
    }

    #[test]
    fn inventory_threshold_defaults_to_ten() {
        let item: InventoryItem = serde_json::from_value(json!({
            "id": "i1", "item_name": "Rice", "quantity": 10.0
        }))
        .unwrap();
        assert_eq!(item.threshold(), 10.0);
        assert!(item.is_low_stock());
        assert!(!item.is_out_of_stock());
    }

    #[test]
    fn finance_entry_types_are_lowercase() {
        let entry: FinanceEntry = serde_json::from_value(json!({
            "id": "f1",
            "entry_type": "expense",
            "amount": 500.0,
            "entry_date": "2026-03-01",
            "created_at": "2026-03-01T10:00:00+05:30"
        }))
        .unwrap();
        assert_eq!(entry.entry_type, EntryType::Expense);
        assert_eq!(entry.entry_date, NaiveDate::from_ymd_opt(2026, 3, 1));
    }
}
