//! Conversational Query Handler.

use crate::client::{ChatTurn, CompletionRequest, CompletionService};
use crate::context::{BusinessArea, BusinessContext};
use crate::error::{EngineError, EngineResult};
use saathi_backend::{OwnerId, RowStore};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

const SYSTEM_PROMPT: &str = include_str!("prompts/chat_system.txt");

/// Earlier turns forwarded with each question.
const MAX_HISTORY: usize = 10;

/// What a question is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Sales,
    Inventory,
    Finance,
    Marketing,
    General,
}

impl Intent {
    /// Data the answer needs.
    pub fn areas(&self) -> &'static [BusinessArea] {
        match self {
            Intent::Sales => &[BusinessArea::Sales],
            Intent::Inventory => &[BusinessArea::Inventory],
            Intent::Finance => &[BusinessArea::Finance],
            Intent::Marketing => &[BusinessArea::Sales, BusinessArea::Inventory],
            Intent::General => &[],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Sales => "sales",
            Intent::Inventory => "inventory",
            Intent::Finance => "finance",
            Intent::Marketing => "marketing",
            Intent::General => "general",
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// (intent, latin words, devanagari fragments). Earlier rows win ties.
const KEYWORDS: &[(Intent, &[&str], &[&str])] = &[
    (
        Intent::Sales,
        &[
            "sale", "sales", "sold", "sell", "selling", "revenue", "bikri", "bikree", "becha",
            "bechi", "bika", "bikta", "kamai", "order", "orders",
        ],
        &["बिक्री", "बेच", "बिका", "कमाई"],
    ),
    (
        Intent::Inventory,
        &[
            "stock", "inventory", "maal", "saman", "samaan", "khatam", "item", "items", "restock",
            "godown",
        ],
        &["स्टॉक", "माल", "सामान", "खत्म"],
    ),
    (
        Intent::Finance,
        &[
            "profit", "loss", "expense", "expenses", "income", "kharcha", "kharch", "munafa",
            "fayda", "nuksaan", "nuksan", "margin", "gst", "tax", "hisaab", "hisab",
        ],
        &["मुनाफा", "मुनाफ़ा", "खर्च", "नुकसान", "आमदनी", "हिसाब"],
    ),
    (
        Intent::Marketing,
        &[
            "marketing", "offer", "offers", "discount", "customer", "customers", "promote",
            "promotion", "advertise", "grahak", "prachar", "whatsapp", "festival", "diwali",
        ],
        &["ग्राहक", "प्रचार", "ऑफर", "छूट"],
    ),
];

/// Classify a free-text question.
///
/// Latin-script keywords must match a whole word; Devanagari keywords match
/// anywhere in the message. The intent with the most hits wins.
pub fn classify_intent(message: &str) -> Intent {
    let lowered = message.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|word| !word.is_empty())
        .collect();

    let mut best = (Intent::General, 0usize);
    for (intent, latin, devanagari) in KEYWORDS {
        let hits = words.iter().filter(|word| latin.contains(*word)).count()
            + devanagari
                .iter()
                .filter(|fragment| lowered.contains(*fragment))
                .count();
        if hits > best.1 {
            best = (*intent, hits);
        }
    }
    best.0
}

/// A reply to one question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatAnswer {
    pub intent: Intent,
    pub reply: String,
}

/// Answers the owner's questions with their own data as context.
pub struct ConversationalQueryHandler {
    store: Arc<dyn RowStore>,
    completion: Arc<dyn CompletionService>,
}

impl ConversationalQueryHandler {
    pub fn new(store: Arc<dyn RowStore>, completion: Arc<dyn CompletionService>) -> Self {
        Self { store, completion }
    }

    /// Classify `message`, attach the data it needs, and ask the Completion
    /// Service. `history` is the conversation so far, oldest first.
    pub async fn answer(
        &self,
        owner_id: &OwnerId,
        message: &str,
        history: &[ChatTurn],
    ) -> EngineResult<ChatAnswer> {
        let message = message.trim();
        if message.is_empty() {
            return Err(EngineError::EmptyMessage);
        }

        let intent = classify_intent(message);
        let areas = intent.areas();
        if !areas.is_empty() && owner_id.is_empty() {
            return Err(EngineError::MissingOwner);
        }
        debug!(intent = %intent, "Question classified");

        let context = BusinessContext::gather(self.store.as_ref(), owner_id, areas, None).await?;
        let user = if context.is_empty() {
            message.to_string()
        } else {
            format!(
                "Business data:\n{}\n\nQuestion: {message}",
                context.render()
            )
        };

        let recent = history.len().saturating_sub(MAX_HISTORY);
        let request =
            CompletionRequest::new(SYSTEM_PROMPT, user).with_history(history[recent..].to_vec());
        let reply = self.completion.complete(request).await?;

        info!(intent = %intent, history = history.len(), "Question answered");
        Ok(ChatAnswer { intent, reply })
    }
}

impl std::fmt::Debug for ConversationalQueryHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationalQueryHandler")
            .field("model", &self.completion.model())
            .finish_non_exhaustive()
    }
}
