//! AI insight command.

use super::{engine_failure, AppContext};
use crate::output::{self, OutputFormat};
use anyhow::Result;
use insight_engine::{EngineError, InsightOutcome, InsightRefreshOrchestrator, InsightSettings};
use saathi_config_and_utils::Config;
use std::sync::Arc;

pub(crate) fn insight_settings(config: &Config) -> InsightSettings {
    InsightSettings {
        min_refresh_interval: config.insights.min_refresh_interval(),
        lookback_days: config.insights.lookback_days,
    }
}

/// Orchestrator over the signed-in client; fails without a completion API key.
pub(crate) fn orchestrator(ctx: &AppContext) -> Result<InsightRefreshOrchestrator, EngineError> {
    Ok(InsightRefreshOrchestrator::new(
        Arc::new(ctx.client.clone()),
        Arc::new(ctx.completion()?),
        insight_settings(&ctx.config),
    ))
}

/// Generate (or reuse) an insight and print it.
pub async fn insights(force: bool, format: &OutputFormat) -> Result<()> {
    let ctx = AppContext::load()?;
    let owner_id = ctx.owner().await?;
    let orchestrator = orchestrator(&ctx).map_err(engine_failure)?;

    let outcome = orchestrator
        .refresh(&owner_id, force)
        .await
        .map_err(engine_failure)?;

    let (insight, fresh) = match outcome {
        InsightOutcome::Generated(insight) => (insight, true),
        InsightOutcome::Cached(insight) => (insight, false),
        InsightOutcome::InFlight => {
            output::print_success("An insight is already being generated", format);
            return Ok(());
        }
    };

    match format {
        OutputFormat::Text => {
            let label = if fresh { "New insight" } else { "Latest insight" };
            output::print_heading(&format!(
                "{} ({})",
                label,
                insight.generated_at.format("%d %b %Y %H:%M UTC")
            ));
            println!("{}", insight.content);
            if !fresh {
                println!("\nUse --force to generate a new one now.");
            }
        }
        OutputFormat::Json => output::print_json(&serde_json::json!({
            "fresh": fresh,
            "insight": insight,
        })),
    }
    Ok(())
}
