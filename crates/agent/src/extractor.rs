use std::time::Duration;

use chrono::{Datelike, NaiveDate};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use farebot_core::domain::iata;
use farebot_tools::{
    ArgumentMap, DispatchError, RegistryError, SchemaViolations, ToolRegistry, SEARCH_FLIGHTS,
};

use crate::llm::LlmClient;

#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The model's answer could not be decomposed into an argument mapping.
    #[error("model output could not be parsed into tool arguments: {0}")]
    Parse(String),
    /// The candidate mapping failed schema validation after the re-prompt
    /// budget was spent.
    #[error(transparent)]
    Schema(#[from] SchemaViolations),
    /// The model call itself failed or timed out.
    #[error("language model call failed: {0}")]
    Llm(String),
    /// Extraction was requested for a tool the registry does not know.
    #[error(transparent)]
    UnknownTool(#[from] RegistryError),
}

/// Turns an utterance into a validated argument mapping for a target tool.
///
/// The model is an unreliable text-to-structure function here: its output
/// is parsed defensively and always re-validated by the registry. One
/// re-prompt (configurable, hard-capped) is allowed per turn, with the
/// violated fields enumerated so a single corrected answer can fix them
/// all. After the budget, a deterministic parser gets one chance before
/// the error surfaces. Extraction never touches the backend.
#[derive(Clone, Copy, Debug)]
pub struct ParameterExtractor {
    retry_budget: u32,
    llm_timeout: Duration,
}

impl ParameterExtractor {
    pub fn new(retry_budget: u32, llm_timeout: Duration) -> Self {
        Self { retry_budget, llm_timeout }
    }

    /// Extracts `search_flights` arguments from a user turn.
    pub async fn extract_search<L>(
        &self,
        llm: &L,
        registry: &ToolRegistry,
        utterance: &str,
        context: Option<&str>,
        today: NaiveDate,
    ) -> Result<ArgumentMap, ExtractionError>
    where
        L: LlmClient + ?Sized,
    {
        let spec = registry.spec(SEARCH_FLIGHTS)?;
        let attempts = 1 + self.retry_budget;
        let mut feedback: Option<String> = None;
        let mut last_error: Option<ExtractionError> = None;

        for attempt in 1..=attempts {
            let prompt = search_prompt(&spec.prompt_summary(), utterance, context, today, feedback.as_deref());

            let completion =
                match tokio::time::timeout(self.llm_timeout, llm.complete(&prompt)).await {
                    Ok(Ok(text)) => text,
                    Ok(Err(error)) => {
                        last_error = Some(ExtractionError::Llm(error.to_string()));
                        break;
                    }
                    Err(_) => {
                        last_error = Some(ExtractionError::Llm("timed out".to_string()));
                        break;
                    }
                };

            match parse_candidate(&completion) {
                Ok(candidate) => match registry.validate(SEARCH_FLIGHTS, &candidate) {
                    Ok(normalized) => {
                        debug!(attempt, "extraction validated");
                        return Ok(normalized);
                    }
                    Err(DispatchError::Schema(violations)) => {
                        feedback = Some(violation_feedback(&violations));
                        last_error = Some(ExtractionError::Schema(violations));
                    }
                    Err(DispatchError::Registry(error)) => return Err(error.into()),
                    Err(DispatchError::Backend(error)) => {
                        // validate() performs no backend call; this arm is
                        // unreachable but kept total.
                        return Err(ExtractionError::Llm(error.to_string()));
                    }
                },
                Err(reason) => {
                    feedback = Some(
                        "your previous answer was not a single flat JSON object".to_string(),
                    );
                    last_error = Some(ExtractionError::Parse(reason));
                }
            }

            warn!(attempt, attempts, "extraction attempt failed");
        }

        if let Some(arguments) = fallback_search_args(utterance, today) {
            if let Ok(normalized) = registry.validate(SEARCH_FLIGHTS, &arguments) {
                debug!("extraction recovered by deterministic fallback");
                return Ok(normalized);
            }
        }

        Err(last_error.unwrap_or_else(|| ExtractionError::Parse("empty extraction".to_string())))
    }
}

fn search_prompt(
    schema_summary: &str,
    utterance: &str,
    context: Option<&str>,
    today: NaiveDate,
    feedback: Option<&str>,
) -> String {
    let mut prompt = format!(
        "Extract flight search parameters from the user message.\n\
         Today is {today}.\n\
         Convert city names to IATA codes (Mumbai=BOM, Delhi=DEL, Bengaluru=BLR, \
         Kolkata=CCU, Ranchi=IXR, London=LHR, New York=JFK, Boston=BOS, Denver=DEN).\n\n\
         {schema_summary}\n\n\
         Answer with ONLY one flat JSON object holding those fields.\n"
    );
    if let Some(context) = context {
        prompt.push_str(&format!("\nConversation so far: {context}\n"));
    }
    if let Some(feedback) = feedback {
        prompt.push_str(&format!("\nCorrection needed: {feedback}\n"));
    }
    prompt.push_str(&format!("\nUser message:\n\"{utterance}\"\n"));
    prompt
}

fn violation_feedback(violations: &SchemaViolations) -> String {
    let fields = violations
        .violations
        .iter()
        .map(|violation| format!("`{}`: {}", violation.field, violation.reason))
        .collect::<Vec<_>>()
        .join("; ");
    format!("fix these fields and answer again with the full object: {fields}")
}

/// Parses a model completion into a flat argument mapping.
///
/// Tolerates code fences and prose around the object; rejects anything
/// that is not exactly one JSON object once located.
fn parse_candidate(completion: &str) -> Result<ArgumentMap, String> {
    let start = completion.find('{').ok_or("no JSON object in model output")?;
    let end = completion.rfind('}').ok_or("no closing brace in model output")?;
    if end <= start {
        return Err("braces out of order in model output".to_string());
    }

    let value: Value = serde_json::from_str(&completion[start..=end])
        .map_err(|error| format!("undecodable JSON: {error}"))?;
    match value {
        Value::Object(map) => Ok(map),
        other => Err(format!("expected a JSON object, got {other}")),
    }
}

/// Deterministic extraction of `from <city> to <city> on <date>` phrasings,
/// used when the model output is unusable.
fn fallback_search_args(utterance: &str, today: NaiveDate) -> Option<ArgumentMap> {
    let (origin, destination) = iata::route_from_text(utterance);
    let origin = origin?;
    let destination = destination?;
    let depart_date = date_from_text(utterance, today)?;

    let mut arguments = ArgumentMap::new();
    arguments.insert("origin".to_string(), Value::String(origin.as_str().to_string()));
    arguments.insert("destination".to_string(), Value::String(destination.as_str().to_string()));
    arguments
        .insert("depart_date".to_string(), Value::String(depart_date.format("%Y-%m-%d").to_string()));
    Some(arguments)
}

/// Finds `5 March` / `March 5` style day-month mentions; the year rolls
/// forward when the date has already passed this year.
fn date_from_text(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    let tokens: Vec<String> = text
        .split(|ch: char| !ch.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_ascii_lowercase())
        .collect();

    for window in tokens.windows(2) {
        let [first, second] = window else { continue };
        let candidate = parse_day(first)
            .zip(parse_month(second))
            .or_else(|| parse_day(second).zip(parse_month(first)));
        if let Some((day, month)) = candidate {
            let year = today.year();
            if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
                return Some(if date < today {
                    NaiveDate::from_ymd_opt(year + 1, month, day)?
                } else {
                    date
                });
            }
        }
    }

    // Also accept a literal ISO date anywhere in the text.
    for token in text.split_whitespace() {
        if let Ok(date) = NaiveDate::parse_from_str(token.trim_matches(|ch: char| !ch.is_ascii_alphanumeric() && ch != '-'), "%Y-%m-%d") {
            return Some(date);
        }
    }

    None
}

fn parse_day(token: &str) -> Option<u32> {
    let trimmed = token
        .strip_suffix("st")
        .or_else(|| token.strip_suffix("nd"))
        .or_else(|| token.strip_suffix("rd"))
        .or_else(|| token.strip_suffix("th"))
        .unwrap_or(token);
    let day: u32 = trimmed.parse().ok()?;
    (1..=31).contains(&day).then_some(day)
}

fn parse_month(token: &str) -> Option<u32> {
    const MONTHS: &[&str] = &[
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ];
    MONTHS
        .iter()
        .position(|prefix| token.starts_with(prefix))
        .map(|index| index as u32 + 1)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::NaiveDate;

    use super::{date_from_text, parse_candidate, ExtractionError, ParameterExtractor};
    use crate::llm::LlmClient;
    use farebot_tools::{register_reservation_tools, ToolRegistry};

    struct ScriptedLlm {
        answers: Vec<&'static str>,
        calls: AtomicUsize,
    }

    impl ScriptedLlm {
        fn new(answers: Vec<&'static str>) -> Self {
            Self { answers, calls: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            let index = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.answers.get(index).copied().unwrap_or("???").to_string())
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        register_reservation_tools(&mut registry).expect("registers");
        registry
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 10).expect("date")
    }

    fn extractor() -> ParameterExtractor {
        ParameterExtractor::new(1, Duration::from_millis(50))
    }

    #[tokio::test]
    async fn well_formed_answer_validates_first_try() {
        let llm = ScriptedLlm::new(vec![
            r#"{"origin": "BOS", "destination": "DEN", "depart_date": "2026-03-05"}"#,
        ]);
        let registry = registry();

        let arguments = extractor()
            .extract_search(&llm, &registry, "flights from Boston to Denver on March 5", None, today())
            .await
            .expect("extracts");

        assert_eq!(arguments["origin"], "BOS");
        assert_eq!(arguments["destination"], "DEN");
        assert_eq!(arguments["depart_date"], "2026-03-05");
        assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fenced_answer_is_tolerated() {
        let llm = ScriptedLlm::new(vec![
            "Sure! ```json\n{\"origin\": \"bom\", \"destination\": \"del\", \"depart_date\": \"2026-02-01\"}\n```",
        ]);
        let registry = registry();

        let arguments = extractor()
            .extract_search(&llm, &registry, "mumbai to delhi feb 1", None, today())
            .await
            .expect("extracts");

        assert_eq!(arguments["origin"], "BOM");
    }

    #[tokio::test]
    async fn schema_violations_trigger_one_reprompt_then_succeed() {
        let llm = ScriptedLlm::new(vec![
            r#"{"origin": "Boston", "destination": "DEN", "depart_date": "soon"}"#,
            r#"{"origin": "BOS", "destination": "DEN", "depart_date": "2026-03-05"}"#,
        ]);
        let registry = registry();

        let arguments = extractor()
            .extract_search(&llm, &registry, "get me to denver", None, today())
            .await
            .expect("extracts on retry");

        assert_eq!(arguments["origin"], "BOS");
        assert_eq!(llm.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn malformed_output_twice_surfaces_parse_error() {
        let llm = ScriptedLlm::new(vec!["no structure here", "still nothing"]);
        let registry = registry();

        let error = extractor()
            .extract_search(&llm, &registry, "please help with something", None, today())
            .await
            .expect_err("surfaces");

        assert!(matches!(error, ExtractionError::Parse(_)));
        // The retry budget is a hard ceiling.
        assert_eq!(llm.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn deterministic_fallback_recovers_plain_phrasing() {
        let llm = ScriptedLlm::new(vec!["gibberish", "more gibberish"]);
        let registry = registry();

        let arguments = extractor()
            .extract_search(
                &llm,
                &registry,
                "flights from Boston to Denver on March 5",
                None,
                today(),
            )
            .await
            .expect("fallback extracts");

        assert_eq!(arguments["origin"], "BOS");
        assert_eq!(arguments["destination"], "DEN");
        assert_eq!(arguments["depart_date"], "2026-03-05");
    }

    #[test]
    fn candidate_parsing_rejects_non_objects() {
        assert!(parse_candidate("[1, 2, 3]").is_err());
        assert!(parse_candidate("just words").is_err());
        assert!(parse_candidate("{\"a\": 1}").is_ok());
    }

    #[test]
    fn dates_roll_forward_when_already_past() {
        let today = NaiveDate::from_ymd_opt(2026, 6, 1).expect("date");
        let date = date_from_text("5 march please", today).expect("parses");
        assert_eq!(date, NaiveDate::from_ymd_opt(2027, 3, 5).expect("date"));
    }

    #[test]
    fn month_day_order_is_supported() {
        let date = date_from_text("on March 5", today()).expect("parses");
        assert_eq!(date, NaiveDate::from_ymd_opt(2026, 3, 5).expect("date"));
    }

    #[test]
    fn ordinal_days_are_supported() {
        let date = date_from_text("on the 3rd aug", today()).expect("parses");
        assert_eq!(date, NaiveDate::from_ymd_opt(2026, 8, 3).expect("date"));
    }
}
