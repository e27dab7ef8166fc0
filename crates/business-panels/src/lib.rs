//! Panel data fetchers for the shop dashboard.
//!
//! A panel owns a local cache of one table's rows for the signed-in owner and
//! the aggregates derived from them. [`LivePanel`] wires a panel to its own
//! [`live_sync::ThrottledSubscription`] so every throttled change notification
//! refetches the full row set.
//!
//! Also home to the client-side bill arithmetic (GST split, discounts).

mod aggregates;
mod billing;
mod error;
mod live;
mod models;
mod panel;

pub use aggregates::{
    round_paise, CategoryUnits, FinanceSummary, InsightsSummary, InventorySummary, ItemRevenue,
    LowStockItem, SalesSummary,
};
pub use billing::{compute_bill, BillLine, BillTotals, Discount, GST_SLABS};
pub use error::{PanelError, PanelResult};
pub use live::{LivePanel, LiveSettings, PanelEvent};
pub use models::{decode_rows, EntryType, FinanceEntry, InsightRecord, InventoryItem, SaleRecord};
pub use panel::{
    FinancePanel, InsightsPanel, InventoryPanel, Panel, PanelKind, PanelSnapshot, RefreshOutcome,
    SalesPanel,
};
