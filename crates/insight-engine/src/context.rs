//! Business data condensed into a prompt-sized text block.

use crate::error::EngineResult;
use business_panels::{
    decode_rows, FinancePanel, FinanceSummary, InventoryPanel, InventorySummary, PanelKind,
    SalesPanel, SalesSummary,
};
use chrono::{DateTime, Utc};
use saathi_backend::{OwnerId, RowStore};
use std::fmt::Write;

/// A slice of the business the context can cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusinessArea {
    Sales,
    Inventory,
    Finance,
}

impl BusinessArea {
    pub const ALL: [BusinessArea; 3] = [
        BusinessArea::Sales,
        BusinessArea::Inventory,
        BusinessArea::Finance,
    ];
}

/// Aggregates for the requested areas.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BusinessContext {
    pub sales: Option<SalesSummary>,
    pub inventory: Option<InventorySummary>,
    pub finance: Option<FinanceSummary>,
    /// Lookback window the sales and finance figures cover; `None` is all time.
    pub period_days: Option<i64>,
}

async fn load<K: PanelKind>(
    store: &dyn RowStore,
    owner_id: &OwnerId,
    since: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> EngineResult<K::Summary> {
    let mut query = K::query(owner_id);
    if let Some(since) = since {
        query = query.since("created_at", since);
    }
    let rows: Vec<K::Row> = decode_rows(K::TABLE, store.select(query).await?);
    Ok(K::summarize(&rows, now))
}

impl BusinessContext {
    /// Fetch and summarize each area in `areas`.
    ///
    /// Sales and finance rows are limited to those created at or after
    /// `since`; inventory is always the current stock.
    pub async fn gather(
        store: &dyn RowStore,
        owner_id: &OwnerId,
        areas: &[BusinessArea],
        since: Option<DateTime<Utc>>,
    ) -> EngineResult<Self> {
        let now = Utc::now();
        let mut context = BusinessContext {
            period_days: since.map(|since| (now - since).num_days().max(1)),
            ..Default::default()
        };

        for area in areas {
            match area {
                BusinessArea::Sales if context.sales.is_none() => {
                    context.sales = Some(load::<SalesPanel>(store, owner_id, since, now).await?);
                }
                BusinessArea::Inventory if context.inventory.is_none() => {
                    context.inventory =
                        Some(load::<InventoryPanel>(store, owner_id, None, now).await?);
                }
                BusinessArea::Finance if context.finance.is_none() => {
                    context.finance =
                        Some(load::<FinancePanel>(store, owner_id, since, now).await?);
                }
                _ => {}
            }
        }

        tracing::debug!(
            owner_id = %owner_id,
            areas = areas.len(),
            period_days = ?context.period_days,
            "Business context gathered"
        );
        Ok(context)
    }

    pub fn is_empty(&self) -> bool {
        self.sales.is_none() && self.inventory.is_none() && self.finance.is_none()
    }

    /// Plain-text rendering for the completion prompt.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let period = match self.period_days {
            Some(days) => format!("last {days} days"),
            None => "all time".to_string(),
        };

        if let Some(sales) = &self.sales {
            let _ = writeln!(out, "## Sales ({period})");
            let _ = writeln!(
                out,
                "Total revenue: ₹{:.2} from {} sales (average ₹{:.2})",
                sales.total_revenue, sales.sale_count, sales.average_ticket
            );
            let _ = writeln!(
                out,
                "Today: ₹{:.2} from {} sales",
                sales.today_revenue, sales.today_count
            );
            if !sales.by_payment_method.is_empty() {
                let methods: Vec<String> = sales
                    .by_payment_method
                    .iter()
                    .map(|(method, amount)| format!("{method} ₹{amount:.2}"))
                    .collect();
                let _ = writeln!(out, "Payment methods: {}", methods.join(", "));
            }
            for item in &sales.top_items {
                let _ = writeln!(
                    out,
                    "- {}: ₹{:.2} ({} units)",
                    item.item_name, item.revenue, item.quantity
                );
            }
            out.push('\n');
        }

        if let Some(inventory) = &self.inventory {
            let _ = writeln!(out, "## Inventory (current)");
            let _ = writeln!(
                out,
                "{} items, {} units, stock value ₹{:.2}, potential revenue ₹{:.2}",
                inventory.item_count,
                inventory.total_units,
                inventory.stock_value,
                inventory.potential_revenue
            );
            let _ = writeln!(out, "Out of stock: {}", inventory.out_of_stock_count);
            if !inventory.low_stock.is_empty() {
                let _ = writeln!(out, "Low stock:");
                for item in &inventory.low_stock {
                    let _ = writeln!(
                        out,
                        "- {}: {} left (threshold {})",
                        item.item_name, item.quantity, item.threshold
                    );
                }
            }
            out.push('\n');
        }

        if let Some(finance) = &self.finance {
            let _ = writeln!(out, "## Finance ({period})");
            let _ = writeln!(
                out,
                "Income ₹{:.2}, expenses ₹{:.2}, net profit ₹{:.2}",
                finance.total_income, finance.total_expense, finance.net_profit
            );
            match finance.profit_margin {
                Some(margin) => {
                    let _ = writeln!(out, "Profit margin: {margin:.2}%");
                }
                None => {
                    let _ = writeln!(out, "Profit margin: n/a (no income recorded)");
                }
            }
            for (category, amount) in &finance.expense_by_category {
                let _ = writeln!(out, "- {category}: ₹{amount:.2}");
            }
        }

        out.trim_end().to_string()
    }
}
