//! Trigger actions: text patterns that pre-empt normal dispatch.

use regex::Regex;
use tracing::warn;

pub const FAREWELL: &str = "Ok... See you later.";

/// A pattern and the fixed reply sent when a message matches it.
#[derive(Debug, Clone)]
pub struct TriggerAction {
    pub name: String,
    pattern: Regex,
    pub reply: String,
}

impl TriggerAction {
    pub fn new(name: &str, pattern: &str, reply: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            name: name.to_string(),
            pattern: Regex::new(pattern)?,
            reply: reply.to_string(),
        })
    }

    pub fn matches(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }
}

/// Ordered trigger list; the first match wins.
#[derive(Debug, Clone, Default)]
pub struct Triggers {
    actions: Vec<TriggerAction>,
}

impl Triggers {
    /// Build from `(name, pattern, reply)` triples, skipping invalid patterns.
    pub fn from_specs(specs: &[(&str, &str, &str)]) -> Self {
        let actions = specs
            .iter()
            .filter_map(|(name, pattern, reply)| match TriggerAction::new(name, pattern, reply) {
                Ok(action) => Some(action),
                Err(e) => {
                    warn!("Skipping invalid trigger '{}' ({}): {}", name, pattern, e);
                    None
                }
            })
            .collect();
        Self { actions }
    }

    /// The `bye` trigger: any message starting with "bye", in any case.
    pub fn standard() -> Self {
        Self::from_specs(&[("bye", r"(?i)^bye", FAREWELL)])
    }

    pub fn find(&self, text: &str) -> Option<&TriggerAction> {
        self.actions.iter().find(|a| a.matches(text))
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}
