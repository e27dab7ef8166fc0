//! Derived figures shown on each panel.

use crate::models::{EntryType, FinanceEntry, InsightRecord, InventoryItem, SaleRecord};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

const TOP_ITEMS: usize = 5;
const UNCATEGORISED: &str = "Uncategorised";
const UNKNOWN_PAYMENT: &str = "unknown";

/// Round a rupee amount to paise.
pub fn round_paise(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn category_of(category: &Option<String>) -> String {
    match category.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => UNCATEGORISED.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemRevenue {
    pub item_name: String,
    pub revenue: f64,
    pub quantity: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SalesSummary {
    pub total_revenue: f64,
    pub sale_count: usize,
    pub average_ticket: f64,
    pub today_revenue: f64,
    pub today_count: usize,
    pub by_payment_method: BTreeMap<String, f64>,
    /// Best sellers by revenue, highest first.
    pub top_items: Vec<ItemRevenue>,
}

impl SalesSummary {
    pub fn from_rows(rows: &[SaleRecord], now: DateTime<Utc>) -> Self {
        let today = now.date_naive();
        let mut summary = SalesSummary {
            sale_count: rows.len(),
            ..Default::default()
        };
        let mut items: HashMap<&str, ItemRevenue> = HashMap::new();

        for sale in rows {
            summary.total_revenue += sale.amount;
            if sale.created_at.date_naive() == today {
                summary.today_revenue += sale.amount;
                summary.today_count += 1;
            }

            let method = sale
                .payment_method
                .as_deref()
                .map(str::to_lowercase)
                .unwrap_or_else(|| UNKNOWN_PAYMENT.to_string());
            *summary.by_payment_method.entry(method).or_default() += sale.amount;

            let item = items
                .entry(sale.item_name.as_str())
                .or_insert_with(|| ItemRevenue {
                    item_name: sale.item_name.clone(),
                    revenue: 0.0,
                    quantity: 0.0,
                });
            item.revenue += sale.amount;
            item.quantity += sale.quantity;
        }

        if summary.sale_count > 0 {
            summary.average_ticket = round_paise(summary.total_revenue / summary.sale_count as f64);
        }
        summary.total_revenue = round_paise(summary.total_revenue);
        summary.today_revenue = round_paise(summary.today_revenue);
        for amount in summary.by_payment_method.values_mut() {
            *amount = round_paise(*amount);
        }

        let mut top: Vec<ItemRevenue> = items.into_values().collect();
        top.sort_by(|a, b| {
            b.revenue
                .total_cmp(&a.revenue)
                .then_with(|| a.item_name.cmp(&b.item_name))
        });
        top.truncate(TOP_ITEMS);
        for item in &mut top {
            item.revenue = round_paise(item.revenue);
        }
        summary.top_items = top;
        summary
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LowStockItem {
    pub item_name: String,
    pub quantity: f64,
    pub threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryUnits {
    pub category: String,
    pub units: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InventorySummary {
    pub item_count: usize,
    pub total_units: f64,
    /// Stock valued at cost price.
    pub stock_value: f64,
    /// Stock valued at selling price.
    pub potential_revenue: f64,
    /// Items at or below their threshold, emptiest first.
    pub low_stock: Vec<LowStockItem>,
    pub out_of_stock_count: usize,
    pub units_by_category: Vec<CategoryUnits>,
}

impl InventorySummary {
    pub fn from_rows(rows: &[InventoryItem]) -> Self {
        let mut summary = InventorySummary {
            item_count: rows.len(),
            ..Default::default()
        };
        let mut categories: BTreeMap<String, f64> = BTreeMap::new();

        for item in rows {
            summary.total_units += item.quantity;
            summary.stock_value += item.quantity * item.cost_price;
            summary.potential_revenue += item.quantity * item.selling_price;
            if item.is_out_of_stock() {
                summary.out_of_stock_count += 1;
            }
            if item.is_low_stock() {
                summary.low_stock.push(LowStockItem {
                    item_name: item.item_name.clone(),
                    quantity: item.quantity,
                    threshold: item.threshold(),
                });
            }
            *categories.entry(category_of(&item.category)).or_default() += item.quantity;
        }

        summary.stock_value = round_paise(summary.stock_value);
        summary.potential_revenue = round_paise(summary.potential_revenue);
        summary.low_stock.sort_by(|a, b| {
            a.quantity
                .total_cmp(&b.quantity)
                .then_with(|| a.item_name.cmp(&b.item_name))
        });
        summary.units_by_category = categories
            .into_iter()
            .map(|(category, units)| CategoryUnits { category, units })
            .collect();
        summary
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FinanceSummary {
    pub total_income: f64,
    pub total_expense: f64,
    pub net_profit: f64,
    pub expense_by_category: BTreeMap<String, f64>,
    /// Net profit as a percentage of income; `None` without income.
    pub profit_margin: Option<f64>,
}

impl FinanceSummary {
    pub fn from_rows(rows: &[FinanceEntry]) -> Self {
        let mut summary = FinanceSummary::default();
        for entry in rows {
            match entry.entry_type {
                EntryType::Income => summary.total_income += entry.amount,
                EntryType::Expense => {
                    summary.total_expense += entry.amount;
                    *summary
                        .expense_by_category
                        .entry(category_of(&entry.category))
                        .or_default() += entry.amount;
                }
            }
        }

        summary.total_income = round_paise(summary.total_income);
        summary.total_expense = round_paise(summary.total_expense);
        summary.net_profit = round_paise(summary.total_income - summary.total_expense);
        for amount in summary.expense_by_category.values_mut() {
            *amount = round_paise(*amount);
        }
        if summary.total_income > 0.0 {
            summary.profit_margin =
                Some(round_paise(summary.net_profit / summary.total_income * 100.0));
        }
        summary
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InsightsSummary {
    pub latest: Option<InsightRecord>,
    pub count: usize,
}

impl InsightsSummary {
    pub fn from_rows(rows: &[InsightRecord]) -> Self {
        InsightsSummary {
            latest: rows.iter().max_by_key(|insight| insight.generated_at).cloned(),
            count: rows.len(),
        }
    }
}
