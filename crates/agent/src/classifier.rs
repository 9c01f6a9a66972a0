use std::time::Duration;

use tracing::debug;

use farebot_core::{Intent, Phase};

use crate::llm::LlmClient;

/// Determines which workflow phase a user turn is addressing.
///
/// Deterministic keyword heuristics run first; only when they say nothing
/// does the classifier ask the model, and then only as a forced choice
/// among the known intent labels. Every failure mode - timeout, transport
/// error, off-script answer - degrades to [`Intent::Unknown`], which routes
/// to a clarification instead of a backend call. Classification never
/// returns an error.
#[derive(Clone, Copy, Debug, Default)]
pub struct IntentClassifier;

impl IntentClassifier {
    pub fn new() -> Self {
        Self
    }

    pub async fn classify<L>(
        &self,
        llm: &L,
        phase: Phase,
        utterance: &str,
        llm_timeout: Duration,
    ) -> Intent
    where
        L: LlmClient + ?Sized,
    {
        if let Some(intent) = heuristic_intent(phase, utterance) {
            debug!(?phase, ?intent, "intent resolved by heuristics");
            return intent;
        }

        match constrained_model_choice(llm, phase, utterance, llm_timeout).await {
            Some(intent) => intent,
            None => {
                debug!(?phase, "intent classification degraded to UNKNOWN");
                Intent::Unknown
            }
        }
    }
}

fn heuristic_intent(phase: Phase, utterance: &str) -> Option<Intent> {
    let normalized = utterance.to_ascii_lowercase();
    let has = |needle: &str| contains_word(&normalized, needle);

    if has("cancel") || has("abort") || has("nevermind") || normalized.contains("never mind") {
        return Some(Intent::Cancel);
    }

    let mentions_search = has("search") || has("flights") || has("flight") || has("fly");
    let mentions_route = normalized.contains("from ") && normalized.contains(" to ");
    let mentions_booking = has("book") || has("reserve");
    let mentions_pick =
        has("option") || has("choose") || has("select") || has("pick") || has("cheapest") || has("take");

    match phase {
        Phase::Init => {
            if mentions_search || mentions_route {
                return Some(Intent::Search);
            }
            if mentions_booking {
                // Booking language before any search still means "start a
                // search" when a route is present.
                return mentions_route.then_some(Intent::Search);
            }
        }
        Phase::CandidatesPresented => {
            if mentions_pick || mentions_booking {
                return Some(Intent::Select);
            }
            if mentions_search || mentions_route {
                return Some(Intent::Search);
            }
        }
        Phase::FlightSelected => {
            if has("confirm") || has("yes") || normalized.contains("go ahead") {
                return Some(Intent::Confirm);
            }
            if mentions_pick {
                return Some(Intent::Select);
            }
            if mentions_search || mentions_route {
                return Some(Intent::Search);
            }
            if has("no") || normalized.contains("don't") || normalized.contains("do not") {
                return Some(Intent::Cancel);
            }
        }
        Phase::Booked => {
            if mentions_search || mentions_route {
                return Some(Intent::Search);
            }
            if has("confirm") || mentions_booking {
                return Some(Intent::Confirm);
            }
        }
    }

    None
}

fn contains_word(text: &str, word: &str) -> bool {
    text.split(|ch: char| !ch.is_ascii_alphanumeric()).any(|token| token == word)
}

async fn constrained_model_choice<L>(
    llm: &L,
    phase: Phase,
    utterance: &str,
    llm_timeout: Duration,
) -> Option<Intent>
where
    L: LlmClient + ?Sized,
{
    let prompt = format!(
        "You route turns of a flight booking conversation.\n\
         Current phase: {phase:?}.\n\
         Classify the user message as exactly one of: {labels}.\n\
         Respond with ONLY the label.\n\n\
         User message:\n\"{utterance}\"",
        labels = Intent::LABELS.join(", "),
    );

    let answer = tokio::time::timeout(llm_timeout, llm.complete(&prompt)).await.ok()?.ok()?;
    // The model may only pick from the enumerated labels; anything else is
    // treated as no answer.
    Intent::from_label(answer.trim())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use anyhow::{bail, Result};
    use async_trait::async_trait;

    use super::IntentClassifier;
    use crate::llm::LlmClient;
    use farebot_core::{Intent, Phase};

    struct ScriptedLlm(&'static str);

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct FailingLlm;

    #[async_trait]
    impl LlmClient for FailingLlm {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            bail!("model unavailable")
        }
    }

    fn timeout() -> Duration {
        Duration::from_millis(50)
    }

    #[tokio::test]
    async fn search_is_detected_without_the_model() {
        let classifier = IntentClassifier::new();
        let intent = classifier
            .classify(&FailingLlm, Phase::Init, "flights from Boston to Denver on March 5", timeout())
            .await;
        assert_eq!(intent, Intent::Search);
    }

    #[tokio::test]
    async fn book_language_maps_to_select_when_candidates_are_up() {
        let classifier = IntentClassifier::new();
        let intent = classifier
            .classify(&FailingLlm, Phase::CandidatesPresented, "book option 2", timeout())
            .await;
        assert_eq!(intent, Intent::Select);
    }

    #[tokio::test]
    async fn confirm_is_detected_after_selection() {
        let classifier = IntentClassifier::new();
        let intent = classifier
            .classify(&FailingLlm, Phase::FlightSelected, "yes, confirm it", timeout())
            .await;
        assert_eq!(intent, Intent::Confirm);
    }

    #[tokio::test]
    async fn cancel_wins_in_any_phase() {
        let classifier = IntentClassifier::new();
        for phase in [Phase::Init, Phase::CandidatesPresented, Phase::FlightSelected, Phase::Booked]
        {
            let intent = classifier.classify(&FailingLlm, phase, "cancel that", timeout()).await;
            assert_eq!(intent, Intent::Cancel, "phase {phase:?}");
        }
    }

    #[tokio::test]
    async fn ambiguous_text_defers_to_the_model() {
        let classifier = IntentClassifier::new();
        let intent = classifier
            .classify(&ScriptedLlm("SELECT"), Phase::CandidatesPresented, "the morning one", timeout())
            .await;
        assert_eq!(intent, Intent::Select);
    }

    #[tokio::test]
    async fn model_cannot_invent_new_intents() {
        let classifier = IntentClassifier::new();
        let intent = classifier
            .classify(&ScriptedLlm("UPGRADE_SEAT"), Phase::CandidatesPresented, "hmm", timeout())
            .await;
        assert_eq!(intent, Intent::Unknown);
    }

    #[tokio::test]
    async fn model_failure_degrades_to_unknown() {
        let classifier = IntentClassifier::new();
        let intent =
            classifier.classify(&FailingLlm, Phase::Init, "what's the weather", timeout()).await;
        assert_eq!(intent, Intent::Unknown);
    }
}
