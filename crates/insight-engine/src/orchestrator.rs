//! Insight Refresh Orchestrator.

use crate::client::{CompletionRequest, CompletionService};
use crate::context::{BusinessArea, BusinessContext};
use crate::error::{EngineError, EngineResult};
use business_panels::{decode_rows, InsightRecord, InsightsPanel, PanelKind};
use chrono::Utc;
use saathi_backend::{OwnerId, RowStore, OWNER_COLUMN};
use serde_json::json;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

const SYSTEM_PROMPT: &str = include_str!("prompts/insights_system.txt");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsightSettings {
    /// A stored insight younger than this is reused unless forced.
    pub min_refresh_interval: Duration,
    /// Sales and finance rows older than this many days are ignored.
    pub lookback_days: u32,
}

impl Default for InsightSettings {
    fn default() -> Self {
        Self {
            min_refresh_interval: Duration::from_secs(15 * 60),
            lookback_days: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InsightOutcome {
    /// Freshly generated and stored.
    Generated(InsightRecord),
    /// The latest stored insight is recent enough.
    Cached(InsightRecord),
    /// Another refresh for this owner is already running.
    InFlight,
}

/// Marks an owner as refreshing until dropped.
struct InFlightGuard {
    owners: Arc<Mutex<HashSet<OwnerId>>>,
    owner_id: OwnerId,
}

impl InFlightGuard {
    fn acquire(owners: &Arc<Mutex<HashSet<OwnerId>>>, owner_id: &OwnerId) -> Option<Self> {
        let inserted = owners
            .lock()
            .expect("lock poisoned")
            .insert(owner_id.clone());
        inserted.then(|| Self {
            owners: owners.clone(),
            owner_id: owner_id.clone(),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.owners
            .lock()
            .expect("lock poisoned")
            .remove(&self.owner_id);
    }
}

/// Generates and stores AI insights from the owner's recent data.
pub struct InsightRefreshOrchestrator {
    store: Arc<dyn RowStore>,
    completion: Arc<dyn CompletionService>,
    settings: InsightSettings,
    in_flight: Arc<Mutex<HashSet<OwnerId>>>,
}

impl InsightRefreshOrchestrator {
    pub fn new(
        store: Arc<dyn RowStore>,
        completion: Arc<dyn CompletionService>,
        settings: InsightSettings,
    ) -> Self {
        Self {
            store,
            completion,
            settings,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn settings(&self) -> InsightSettings {
        self.settings
    }

    /// Most recent stored insight for `owner_id`.
    pub async fn latest(&self, owner_id: &OwnerId) -> EngineResult<Option<InsightRecord>> {
        let rows = self
            .store
            .select(InsightsPanel::query(owner_id).limit(1))
            .await?;
        let insights: Vec<InsightRecord> = decode_rows(InsightsPanel::TABLE, rows);
        Ok(insights.into_iter().next())
    }

    /// Latest insight when it is younger than the minimum refresh interval.
    async fn fresh_insight(&self, owner_id: &OwnerId) -> EngineResult<Option<InsightRecord>> {
        let Some(latest) = self.latest(owner_id).await? else {
            return Ok(None);
        };
        let fresh = (Utc::now() - latest.generated_at)
            .to_std()
            .map_or(true, |age| age < self.settings.min_refresh_interval);
        if !fresh {
            return Ok(None);
        }
        debug!(owner_id = %owner_id, generated_at = %latest.generated_at, "Reusing recent insight");
        Ok(Some(latest))
    }

    /// Produce an insight for `owner_id`, reusing a recent one unless `force`.
    pub async fn refresh(&self, owner_id: &OwnerId, force: bool) -> EngineResult<InsightOutcome> {
        if owner_id.is_empty() {
            return Err(EngineError::MissingOwner);
        }

        if !force {
            if let Some(latest) = self.fresh_insight(owner_id).await? {
                return Ok(InsightOutcome::Cached(latest));
            }
        }

        let Some(_guard) = InFlightGuard::acquire(&self.in_flight, owner_id) else {
            debug!(owner_id = %owner_id, "Insight refresh already running");
            return Ok(InsightOutcome::InFlight);
        };

        // A run that finished between the check and the guard has stored one.
        if !force {
            if let Some(latest) = self.fresh_insight(owner_id).await? {
                return Ok(InsightOutcome::Cached(latest));
            }
        }

        let since = Utc::now() - chrono::Duration::days(i64::from(self.settings.lookback_days));
        let context =
            BusinessContext::gather(self.store.as_ref(), owner_id, &BusinessArea::ALL, Some(since))
                .await?;

        let request = CompletionRequest::new(
            SYSTEM_PROMPT,
            format!(
                "Here is my shop's data. Give me insights.\n\n{}",
                context.render()
            ),
        );
        let content = self.completion.complete(request).await?;

        let stored = self
            .store
            .insert(
                InsightsPanel::TABLE,
                json!({
                    OWNER_COLUMN: owner_id.as_str(),
                    "content": content,
                    "generated_at": Utc::now().to_rfc3339(),
                    "model": self.completion.model(),
                }),
            )
            .await?;
        let insight: InsightRecord = serde_json::from_value(stored)?;

        info!(
            owner_id = %owner_id,
            insight_id = %insight.id,
            model = self.completion.model(),
            forced = force,
            "Insight generated"
        );
        Ok(InsightOutcome::Generated(insight))
    }
}

impl std::fmt::Debug for InsightRefreshOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InsightRefreshOrchestrator")
            .field("settings", &self.settings)
            .field("model", &self.completion.model())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_releases_owner_on_drop() {
        let owners = Arc::new(Mutex::new(HashSet::new()));
        let owner = OwnerId::new("u1");

        let guard = InFlightGuard::acquire(&owners, &owner);
        assert!(guard.is_some());
        assert!(InFlightGuard::acquire(&owners, &owner).is_none());
        assert!(InFlightGuard::acquire(&owners, &OwnerId::new("u2")).is_some());

        drop(guard);
        assert!(InFlightGuard::acquire(&owners, &owner).is_some());
    }

    #[test]
    fn default_settings() {
        let settings = InsightSettings::default();
        assert_eq!(settings.min_refresh_interval, Duration::from_secs(900));
        assert_eq!(settings.lookback_days, 30);
    }
}
