//! Live dashboard: every panel on its own throttled subscription.

use super::insights::orchestrator;
use super::session::SessionKeeper;
use super::summary::Headline;
use super::AppContext;
use crate::output::{self, OutputFormat};
use crate::PanelChoice;
use anyhow::Result;
use business_panels::{
    FinancePanel, InsightsPanel, InventoryPanel, LivePanel, LiveSettings, PanelEvent, PanelKind,
    SalesPanel,
};
use insight_engine::{InsightOutcome, InsightRefreshOrchestrator};
use live_sync::{IdlePolicy, Notification, SubscriptionStatus, VisibilitySignal};
use saathi_backend::{ChangeFeed, OwnerId, RowStore};
use std::sync::Arc;
use std::time::Duration;
use supabase_gateway::{RealtimeClient, RealtimeConfig};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Flags of `saathi watch`.
#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub panels: Vec<PanelChoice>,
    pub no_idle: bool,
    pub throttle_ms: Option<u64>,
}

impl WatchOptions {
    fn wants(&self, choice: PanelChoice) -> bool {
        self.panels.is_empty() || self.panels.contains(&choice)
    }
}

fn reason_name(reason: Notification) -> &'static str {
    match reason {
        Notification::Leading => "leading",
        Notification::Trailing => "trailing",
        Notification::Resumed => "resumed",
    }
}

/// Everything one mounted panel needs to be torn down.
struct Mounted<K: PanelKind> {
    panel: LivePanel<K>,
    tasks: Vec<JoinHandle<()>>,
}

impl<K: PanelKind> Mounted<K> {
    async fn unmount(self) {
        self.panel.unmount().await;
        for task in self.tasks {
            task.abort();
        }
    }
}

struct Shared<'a> {
    owner_id: &'a OwnerId,
    store: Arc<dyn RowStore>,
    feed: Arc<dyn ChangeFeed>,
    visibility: &'a VisibilitySignal,
    idle: IdlePolicy,
    format: OutputFormat,
    /// Nudges the insight worker after a business panel refresh.
    insight_trigger: Option<mpsc::UnboundedSender<()>>,
}

async fn mount<K>(shared: &Shared<'_>, throttle: Duration) -> Mounted<K>
where
    K: PanelKind,
    K::Summary: Headline,
{
    let settings = LiveSettings {
        throttle: Some(throttle),
        idle: shared.idle,
    };
    let panel = LivePanel::<K>::mount(
        shared.owner_id.clone(),
        shared.store.clone(),
        shared.feed.clone(),
        shared.visibility,
        settings,
    )
    .await;

    print_refresh::<K>(shared.format, "initial", &panel.summary());

    // Insights refreshing must not trigger another insight.
    let trigger = if K::TABLE == InsightsPanel::TABLE {
        None
    } else {
        shared.insight_trigger.clone()
    };
    let tasks = vec![
        tokio::spawn(print_events::<K>(panel.events(), shared.format, trigger)),
        tokio::spawn(print_badge(K::NAME, panel.status(), shared.format)),
    ];
    Mounted { panel, tasks }
}

fn print_refresh<K>(format: OutputFormat, reason: &str, summary: &K::Summary)
where
    K: PanelKind,
    K::Summary: Headline,
{
    match format {
        OutputFormat::Text => println!("[{}] {}: {}", K::NAME, reason, summary.headline()),
        OutputFormat::Json => output::print_json(&serde_json::json!({
            "event": "refreshed",
            "panel": K::TABLE,
            "reason": reason,
            "summary": summary,
        })),
    }
}

async fn print_events<K>(
    mut events: broadcast::Receiver<PanelEvent<K::Summary>>,
    format: OutputFormat,
    insight_trigger: Option<mpsc::UnboundedSender<()>>,
) where
    K: PanelKind,
    K::Summary: Headline,
{
    loop {
        match events.recv().await {
            Ok(PanelEvent::Refreshed { reason, summary, .. }) => {
                print_refresh::<K>(format, reason_name(reason), &summary);
                if let Some(trigger) = &insight_trigger {
                    let _ = trigger.send(());
                }
            }
            Ok(PanelEvent::RefreshFailed { message, .. }) => match format {
                OutputFormat::Text => println!("[{}] refresh failed: {}", K::NAME, message),
                OutputFormat::Json => output::print_json(&serde_json::json!({
                    "event": "refresh_failed",
                    "panel": K::TABLE,
                    "message": message,
                })),
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(panel = K::NAME, skipped, "Printer lagged behind panel events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Print the live badge whenever it flips.
async fn print_badge(
    name: &'static str,
    mut status: tokio::sync::watch::Receiver<SubscriptionStatus>,
    format: OutputFormat,
) {
    loop {
        let live = status.borrow_and_update().is_subscribed();
        match format {
            OutputFormat::Text => {
                println!("[{}] {}", name, if live { "● live" } else { "○ offline" })
            }
            OutputFormat::Json => output::print_json(&serde_json::json!({
                "event": "status",
                "panel": name,
                "live": live,
            })),
        }
        if status.changed().await.is_err() {
            break;
        }
    }
}

/// Refresh insights after business data changes, one run at a time.
async fn insight_worker(
    orchestrator: InsightRefreshOrchestrator,
    owner_id: OwnerId,
    mut triggers: mpsc::UnboundedReceiver<()>,
    format: OutputFormat,
) {
    while triggers.recv().await.is_some() {
        // A burst of refreshes collapses into one run.
        while triggers.try_recv().is_ok() {}

        match orchestrator.refresh(&owner_id, false).await {
            Ok(InsightOutcome::Generated(insight)) => match format {
                OutputFormat::Text => {
                    println!("[Insights] new insight:");
                    println!("{}", insight.content);
                }
                OutputFormat::Json => output::print_json(&serde_json::json!({
                    "event": "insight",
                    "insight": insight,
                })),
            },
            Ok(InsightOutcome::Cached(_)) | Ok(InsightOutcome::InFlight) => {}
            Err(e) => {
                warn!(error = %e, "Background insight refresh failed");
                if format == OutputFormat::Text {
                    println!("[Insights] {}", e.user_message());
                }
            }
        }
    }
}

/// Mount the selected panels and stream their refreshes until `quit` or Ctrl-C.
pub async fn watch(options: WatchOptions, format: &OutputFormat) -> Result<()> {
    let ctx = AppContext::load()?;
    let session = ctx.authenticated().await?;
    let owner_id = OwnerId::new(session.user_id.clone());

    let realtime = Arc::new(RealtimeClient::new(RealtimeConfig::from_project_url(
        &ctx.config.supabase_url,
        &ctx.config.supabase_publishable_key,
    )?));
    realtime.set_access_token(Some(session.access_token.clone()));
    let keeper = tokio::spawn(
        SessionKeeper::new(ctx.client.clone(), realtime.clone(), ctx.sessions.clone())
            .run(session.clone()),
    );

    let pacing = ctx.config.live_sync;
    let idle = match pacing.idle_threshold() {
        Some(threshold) if !options.no_idle => IdlePolicy::TearDownAfter(threshold),
        _ => IdlePolicy::Disabled,
    };
    let throttle = options
        .throttle_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| pacing.throttle());
    let expensive_throttle = options
        .throttle_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| pacing.expensive_throttle());

    let (insight_trigger, worker) = match orchestrator(&ctx) {
        Ok(orchestrator) => {
            let (tx, rx) = mpsc::unbounded_channel();
            let worker = tokio::spawn(insight_worker(orchestrator, owner_id.clone(), rx, *format));
            (Some(tx), Some(worker))
        }
        Err(e) => {
            info!(error = %e, "Insight refresh disabled");
            (None, None)
        }
    };

    let visibility = VisibilitySignal::new();
    let shared = Shared {
        owner_id: &owner_id,
        store: Arc::new(ctx.client.clone()),
        feed: realtime.clone(),
        visibility: &visibility,
        idle,
        format: *format,
        insight_trigger,
    };

    let sales = if options.wants(PanelChoice::Sales) {
        Some(mount::<SalesPanel>(&shared, throttle).await)
    } else {
        None
    };
    let inventory = if options.wants(PanelChoice::Inventory) {
        Some(mount::<InventoryPanel>(&shared, expensive_throttle).await)
    } else {
        None
    };
    let finance = if options.wants(PanelChoice::Finance) {
        Some(mount::<FinancePanel>(&shared, throttle).await)
    } else {
        None
    };
    let insights = if options.wants(PanelChoice::Insights) {
        Some(mount::<InsightsPanel>(&shared, throttle).await)
    } else {
        None
    };
    // Panels hold their own trigger clones; the worker stops once they unmount.
    drop(shared);

    if *format == OutputFormat::Text {
        println!("Watching. Type 'hide', 'show' or 'quit' (Ctrl-C also stops).");
    }
    info!(owner_id = %owner_id, idle = ?idle, "Watch started");

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match line.trim().to_ascii_lowercase().as_str() {
                    "hide" => {
                        visibility.hide();
                        info!("Host hidden");
                    }
                    "show" => {
                        visibility.show();
                        info!("Host visible");
                    }
                    "quit" | "exit" | "q" => break,
                    "" => {}
                    other => output::print_error(
                        &format!("unknown input '{}', expected hide, show or quit", other),
                        format,
                    ),
                },
                Ok(None) => stdin_open = false,
                Err(e) => {
                    warn!(error = %e, "Reading stdin failed");
                    stdin_open = false;
                }
            },
        }
    }

    if let Some(panel) = sales {
        panel.unmount().await;
    }
    if let Some(panel) = inventory {
        panel.unmount().await;
    }
    if let Some(panel) = finance {
        panel.unmount().await;
    }
    if let Some(panel) = insights {
        panel.unmount().await;
    }
    if let Some(worker) = worker {
        worker.abort();
    }
    keeper.abort();
    realtime.disconnect().await;

    info!("Watch stopped");
    output::print_success("Stopped watching", format);
    Ok(())
}
