//! Assistant command.

use super::{engine_failure, AppContext};
use crate::output::{self, OutputFormat};
use anyhow::Result;
use insight_engine::ConversationalQueryHandler;
use std::sync::Arc;

/// Ask one question and print the reply.
pub async fn ask(message: &str, format: &OutputFormat) -> Result<()> {
    let ctx = AppContext::load()?;
    let owner_id = ctx.owner().await?;
    let completion = ctx.completion().map_err(engine_failure)?;
    let handler = ConversationalQueryHandler::new(Arc::new(ctx.client.clone()), Arc::new(completion));

    let answer = handler
        .answer(&owner_id, message, &[])
        .await
        .map_err(engine_failure)?;

    match format {
        OutputFormat::Text => println!("{}", answer.reply),
        OutputFormat::Json => output::print_json(&answer),
    }
    Ok(())
}
