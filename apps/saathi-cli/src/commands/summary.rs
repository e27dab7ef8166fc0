//! One-shot panel summaries.

use super::AppContext;
use crate::output::{self, rupees, OutputFormat};
use anyhow::Result;
use business_panels::{
    FinancePanel, FinanceSummary, InsightsPanel, InsightsSummary, InventoryPanel,
    InventorySummary, Panel, PanelKind, RefreshOutcome, SalesPanel, SalesSummary,
};
use saathi_backend::{OwnerId, RowStore};
use std::sync::Arc;

/// Text rendering of a panel summary.
pub(crate) trait Headline {
    /// One line for the live stream.
    fn headline(&self) -> String;

    /// Labelled rows for `saathi summary`.
    fn rows(&self) -> Vec<(&'static str, String)>;
}

impl Headline for SalesSummary {
    fn headline(&self) -> String {
        format!(
            "{} today from {} sales, {} total",
            rupees(self.today_revenue),
            self.today_count,
            rupees(self.total_revenue)
        )
    }

    fn rows(&self) -> Vec<(&'static str, String)> {
        let mut rows = vec![
            ("Today", format!("{} ({} sales)", rupees(self.today_revenue), self.today_count)),
            ("Total revenue", rupees(self.total_revenue)),
            ("Sales", self.sale_count.to_string()),
            ("Average ticket", rupees(self.average_ticket)),
        ];
        for (method, amount) in &self.by_payment_method {
            rows.push(("Payment", format!("{} {}", method, rupees(*amount))));
        }
        for item in &self.top_items {
            rows.push(("Top item", format!("{} {}", item.item_name, rupees(item.revenue))));
        }
        rows
    }
}

impl Headline for InventorySummary {
    fn headline(&self) -> String {
        format!(
            "{} items, {} low, {} out of stock",
            self.item_count,
            self.low_stock.len(),
            self.out_of_stock_count
        )
    }

    fn rows(&self) -> Vec<(&'static str, String)> {
        let mut rows = vec![
            ("Items", self.item_count.to_string()),
            ("Units", self.total_units.to_string()),
            ("Stock value", rupees(self.stock_value)),
            ("Potential revenue", rupees(self.potential_revenue)),
            ("Out of stock", self.out_of_stock_count.to_string()),
        ];
        for item in &self.low_stock {
            rows.push((
                "Low stock",
                format!("{} ({} left)", item.item_name, item.quantity),
            ));
        }
        rows
    }
}

impl Headline for FinanceSummary {
    fn headline(&self) -> String {
        format!(
            "income {}, expenses {}, net {}",
            rupees(self.total_income),
            rupees(self.total_expense),
            rupees(self.net_profit)
        )
    }

    fn rows(&self) -> Vec<(&'static str, String)> {
        let mut rows = vec![
            ("Income", rupees(self.total_income)),
            ("Expenses", rupees(self.total_expense)),
            ("Net profit", rupees(self.net_profit)),
            (
                "Margin",
                self.profit_margin
                    .map(|margin| format!("{:.2}%", margin))
                    .unwrap_or_else(|| "-".to_string()),
            ),
        ];
        for (category, amount) in &self.expense_by_category {
            rows.push(("Expense", format!("{} {}", category, rupees(*amount))));
        }
        rows
    }
}

impl Headline for InsightsSummary {
    fn headline(&self) -> String {
        match &self.latest {
            Some(latest) => format!(
                "{} stored, latest {}",
                self.count,
                latest.generated_at.format("%d %b %H:%M")
            ),
            None => "no insights yet".to_string(),
        }
    }

    fn rows(&self) -> Vec<(&'static str, String)> {
        let mut rows = vec![("Stored", self.count.to_string())];
        if let Some(latest) = &self.latest {
            rows.push(("Generated", latest.generated_at.to_rfc3339()));
            for line in latest.content.lines().filter(|line| !line.trim().is_empty()) {
                rows.push(("", line.to_string()));
            }
        }
        rows
    }
}

async fn load<K: PanelKind>(owner_id: &OwnerId, store: &Arc<dyn RowStore>) -> Result<K::Summary> {
    let panel = Panel::<K>::new(owner_id.clone(), store.clone());
    match panel.refresh().await? {
        RefreshOutcome::Applied(snapshot) => Ok(snapshot.summary),
        RefreshOutcome::Superseded => Ok(panel.summary()),
    }
}

fn print_panel<S: Headline>(name: &str, summary: &S) {
    output::print_heading(name);
    for (label, value) in summary.rows() {
        output::print_row(label, &value);
    }
}

/// Fetch every panel once and print the summaries.
pub async fn summary(format: &OutputFormat) -> Result<()> {
    let ctx = AppContext::load()?;
    let owner_id = ctx.owner().await?;
    let store: Arc<dyn RowStore> = Arc::new(ctx.client.clone());

    let (sales, inventory, finance, insights) = tokio::try_join!(
        load::<SalesPanel>(&owner_id, &store),
        load::<InventoryPanel>(&owner_id, &store),
        load::<FinancePanel>(&owner_id, &store),
        load::<InsightsPanel>(&owner_id, &store),
    )?;

    match format {
        OutputFormat::Text => {
            print_panel(SalesPanel::NAME, &sales);
            print_panel(InventoryPanel::NAME, &inventory);
            print_panel(FinancePanel::NAME, &finance);
            print_panel(InsightsPanel::NAME, &insights);
        }
        OutputFormat::Json => output::print_json(&serde_json::json!({
            "sales": sales,
            "inventory": inventory,
            "finance": finance,
            "insights": insights,
        })),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use business_panels::LowStockItem;

    #[test]
    fn inventory_headline_counts_alerts() {
        let summary = InventorySummary {
            item_count: 12,
            low_stock: vec![LowStockItem {
                item_name: "Atta".to_string(),
                quantity: 2.0,
                threshold: 10.0,
            }],
            out_of_stock_count: 1,
            ..Default::default()
        };
        assert_eq!(summary.headline(), "12 items, 1 low, 1 out of stock");
        assert!(summary
            .rows()
            .contains(&("Low stock", "Atta (2 left)".to_string())));
    }

    #[test]
    fn finance_without_income_has_no_margin() {
        let summary = FinanceSummary {
            total_expense: 500.0,
            net_profit: -500.0,
            ..Default::default()
        };
        assert!(summary.rows().contains(&("Margin", "-".to_string())));
        assert_eq!(
            summary.headline(),
            "income ₹0.00, expenses ₹500.00, net -₹500.00"
        );
    }
}
