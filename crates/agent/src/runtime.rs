use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use farebot_core::{
    resolve_selection, BookingConfirmation, BookingFlow, ConversationId, ConversationState,
    FlightOffer, IataCode, Intent, InvalidIataCode, OfferId, Passenger, Phase, SearchCriteria,
    SelectionRef, WorkflowError, WorkflowEvent,
};
use farebot_tools::{
    ArgumentMap, BackendGateway, DispatchError, ToolRegistry, BOOK_FLIGHT_ONEWAY,
    GET_BOOKING_BY_REFERENCE, SEARCH_FLIGHTS,
};

use crate::classifier::IntentClassifier;
use crate::extractor::{ExtractionError, ParameterExtractor};
use crate::llm::LlmClient;
use crate::reply::{self, AgentReply};
use crate::store::ConversationStore;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error("backend payload could not be decoded: {0}")]
    MalformedPayload(String),
}

#[derive(Clone, Copy, Debug)]
pub struct RuntimeOptions {
    pub llm_timeout: Duration,
    pub extraction_retries: u32,
    /// Reference date for relative date parsing; `None` means the current
    /// UTC date. Fixed in tests.
    pub today: Option<NaiveDate>,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self { llm_timeout: Duration::from_secs(15), extraction_retries: 1, today: None }
    }
}

/// Orchestrates one conversation turn end to end.
///
/// Routing is intent -> workflow phase -> at most one backend dispatch. The
/// state machine decides what is allowed; the registry decides what is
/// well-formed; this type only sequences them and renders replies. The
/// model never picks a flight and never triggers a booking on its own:
/// selection and passenger capture are deterministic parses, and a confirm
/// with an unresolved prior booking reconciles against the backend instead
/// of re-submitting.
pub struct AgentRuntime {
    llm: Arc<dyn LlmClient>,
    gateway: Arc<dyn BackendGateway>,
    registry: Arc<ToolRegistry>,
    store: ConversationStore,
    classifier: IntentClassifier,
    extractor: ParameterExtractor,
    flow: BookingFlow,
    options: RuntimeOptions,
}

impl AgentRuntime {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        gateway: Arc<dyn BackendGateway>,
        registry: Arc<ToolRegistry>,
        options: RuntimeOptions,
    ) -> Self {
        Self {
            llm,
            gateway,
            registry,
            store: ConversationStore::new(),
            classifier: IntentClassifier::new(),
            extractor: ParameterExtractor::new(options.extraction_retries, options.llm_timeout),
            flow: BookingFlow,
            options,
        }
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub async fn handle_turn(
        &self,
        conversation_id: ConversationId,
        utterance: &str,
    ) -> Result<AgentReply, AgentError> {
        let handle = self.store.get_or_create(conversation_id);
        let mut state = handle.lock().await;

        let intent = self
            .classifier
            .classify(self.llm.as_ref(), state.phase, utterance, self.options.llm_timeout)
            .await;
        info!(%conversation_id, phase = ?state.phase, ?intent, "handling turn");

        match intent {
            Intent::Search => self.run_search(&mut state, utterance).await,
            Intent::Select => self.run_select(&mut state, utterance),
            Intent::Confirm => self.run_confirm(&mut state).await,
            Intent::Cancel => self.run_cancel(&mut state),
            Intent::Unknown => self.run_unknown(&mut state, utterance),
        }
    }

    async fn run_search(
        &self,
        state: &mut ConversationState,
        utterance: &str,
    ) -> Result<AgentReply, AgentError> {
        // An unresolved booking outcome blocks a new cycle; the engine
        // enforces the same rule, this check just avoids the extraction and
        // search dispatch that would precede its rejection.
        if state.ambiguous_booking {
            return Ok(AgentReply::new(reply::pending_booking_text(), state.phase));
        }

        let context = state.criteria.as_ref().map(|criteria| criteria.route_label());
        let today = self.options.today.unwrap_or_else(|| Utc::now().date_naive());

        let arguments = match self
            .extractor
            .extract_search(
                self.llm.as_ref(),
                &self.registry,
                utterance,
                context.as_deref(),
                today,
            )
            .await
        {
            Ok(arguments) => arguments,
            // A dead or timed-out model degrades to a clarification, not an
            // error turn.
            Err(ExtractionError::Llm(detail)) => {
                warn!(%detail, "extraction degraded to clarification");
                return Ok(AgentReply::new(reply::llm_unavailable_text(), state.phase));
            }
            Err(error) => return Err(error.into()),
        };

        let payload = match self
            .registry
            .dispatch(SEARCH_FLIGHTS, &arguments, self.gateway.as_ref())
            .await
        {
            Ok(payload) => payload,
            Err(DispatchError::Backend(failure)) => {
                warn!(%failure, "flight search failed");
                return Ok(AgentReply::new(
                    format!("The flight search didn't go through ({failure}). Please try again."),
                    state.phase,
                ));
            }
            Err(other) => return Err(other.into()),
        };

        let offers = offers_from_payload(&payload)?;
        let criteria = criteria_from_arguments(&arguments)?;

        if offers.is_empty() {
            return Ok(AgentReply::new(
                "No flights found for that route and date. Try another date or route.",
                state.phase,
            ));
        }

        self.flow.apply(state, WorkflowEvent::SearchSucceeded { criteria, offers })?;
        Ok(AgentReply::new(reply::render_candidates(state), state.phase))
    }

    fn run_select(
        &self,
        state: &mut ConversationState,
        utterance: &str,
    ) -> Result<AgentReply, AgentError> {
        if !matches!(state.phase, Phase::CandidatesPresented | Phase::FlightSelected) {
            return Ok(AgentReply::new(reply::clarification_text(state.phase), state.phase));
        }

        let Some(selection) = parse_selection(state, utterance) else {
            return Ok(AgentReply::new(reply::clarification_text(state.phase), state.phase));
        };

        // Selection must resolve to exactly one stored offer; anything else
        // is a disambiguation prompt with zero tool calls.
        let offer = match resolve_selection(state, &selection) {
            Ok(offer) => offer,
            Err(error) => {
                return Ok(AgentReply::new(error.to_string(), state.phase));
            }
        };

        self.flow.apply(state, WorkflowEvent::SelectionResolved { offer })?;
        let selected = state.selected.as_ref().ok_or_else(|| {
            AgentError::MalformedPayload("selection applied without a stored offer".to_string())
        })?;
        Ok(AgentReply::new(reply::render_selection(selected), state.phase))
    }

    async fn run_confirm(&self, state: &mut ConversationState) -> Result<AgentReply, AgentError> {
        match state.phase {
            Phase::Booked => {
                // Re-confirming a booked conversation answers from state.
                let confirmation = state.booking.clone().ok_or_else(|| {
                    AgentError::MalformedPayload("booked phase without a confirmation".to_string())
                })?;
                Ok(AgentReply::new(reply::render_already_booked(&confirmation), state.phase))
            }
            Phase::FlightSelected => self.run_booking(state).await,
            phase => Ok(AgentReply::new(reply::clarification_text(phase), phase)),
        }
    }

    async fn run_booking(&self, state: &mut ConversationState) -> Result<AgentReply, AgentError> {
        let Some(selected) = state.selected.clone() else {
            return Ok(AgentReply::new(reply::clarification_text(state.phase), state.phase));
        };
        let Some(passenger) = state.passenger.clone() else {
            return Ok(AgentReply::new(
                "I need the passenger first. Give the details as \
                 \"First Last YYYY-MM-DD CLASS\", then say confirm.",
                state.phase,
            ));
        };

        if state.ambiguous_booking {
            match self.reconcile(state).await? {
                Reconciliation::Found(confirmation) => {
                    self.flow.apply(state, WorkflowEvent::BookingSucceeded { confirmation })?;
                    let confirmation = state.booking.as_ref().ok_or_else(|| {
                        AgentError::MalformedPayload("booking applied without storage".to_string())
                    })?;
                    return Ok(AgentReply::new(
                        format!(
                            "Good news: that booking had already gone through. {}",
                            reply::render_confirmation(confirmation),
                        ),
                        state.phase,
                    ));
                }
                Reconciliation::NotFound => {
                    info!("no prior booking found, proceeding with a fresh attempt");
                }
                Reconciliation::Unavailable => {
                    return Ok(AgentReply::new(reply::ambiguous_booking_text(), state.phase));
                }
            }
        }

        let arguments = booking_arguments(state, &selected, &passenger);
        match self.registry.dispatch(BOOK_FLIGHT_ONEWAY, &arguments, self.gateway.as_ref()).await {
            Ok(payload) => match booking_reference(&payload) {
                Some(booking_reference) => {
                    let confirmation = BookingConfirmation {
                        booking_reference,
                        offer_id: selected.offer_id.clone(),
                    };
                    self.flow.apply(state, WorkflowEvent::BookingSucceeded { confirmation })?;
                    let confirmation = state.booking.as_ref().ok_or_else(|| {
                        AgentError::MalformedPayload("booking applied without storage".to_string())
                    })?;
                    Ok(AgentReply::new(reply::render_confirmation(confirmation), state.phase))
                }
                None => {
                    // The backend said yes but the reference is missing; the
                    // outcome is unknown, same as a timeout.
                    warn!("booking response carried no reference");
                    self.flow.apply(state, WorkflowEvent::BookingAmbiguous)?;
                    Ok(AgentReply::new(reply::ambiguous_booking_text(), state.phase))
                }
            },
            Err(DispatchError::Backend(failure)) => {
                use farebot_tools::BackendFailure;
                match failure {
                    BackendFailure::Declined(reason) => {
                        warn!(%reason, "booking declined");
                        self.flow.apply(state, WorkflowEvent::BookingDeclined)?;
                        Ok(AgentReply::new(reply::declined_booking_text(), state.phase))
                    }
                    BackendFailure::Ambiguous(reason) | BackendFailure::Transient(reason) => {
                        warn!(%reason, "booking outcome unknown");
                        self.flow.apply(state, WorkflowEvent::BookingAmbiguous)?;
                        Ok(AgentReply::new(reply::ambiguous_booking_text(), state.phase))
                    }
                }
            }
            Err(other) => Err(other.into()),
        }
    }

    /// Looks the conversation's idempotency reference up on the backend to
    /// resolve an earlier unknown booking outcome.
    async fn reconcile(&self, state: &ConversationState) -> Result<Reconciliation, AgentError> {
        let mut arguments = ArgumentMap::new();
        arguments
            .insert("reference".to_string(), Value::String(state.idempotency_reference()));

        match self
            .registry
            .dispatch(GET_BOOKING_BY_REFERENCE, &arguments, self.gateway.as_ref())
            .await
        {
            Ok(payload) => match booking_reference(&payload) {
                Some(booking_reference) => {
                    let offer_id = payload_offer_id(&payload)
                        .or_else(|| state.selected.as_ref().map(|offer| offer.offer_id.clone()))
                        .unwrap_or_else(|| OfferId(String::new()));
                    Ok(Reconciliation::Found(BookingConfirmation { booking_reference, offer_id }))
                }
                None => Ok(Reconciliation::NotFound),
            },
            Err(DispatchError::Backend(failure)) => {
                use farebot_tools::BackendFailure;
                match failure {
                    // Not-found surfaces as a decline on the read path.
                    BackendFailure::Declined(_) => Ok(Reconciliation::NotFound),
                    BackendFailure::Ambiguous(_) | BackendFailure::Transient(_) => {
                        warn!("reconciliation lookup unavailable");
                        Ok(Reconciliation::Unavailable)
                    }
                }
            }
            Err(other) => Err(other.into()),
        }
    }

    fn run_cancel(&self, state: &mut ConversationState) -> Result<AgentReply, AgentError> {
        self.flow.apply(state, WorkflowEvent::CancelRequested)?;
        Ok(AgentReply::new(reply::cancelled_text(), state.phase))
    }

    fn run_unknown(
        &self,
        state: &mut ConversationState,
        utterance: &str,
    ) -> Result<AgentReply, AgentError> {
        if state.phase == Phase::FlightSelected {
            if let Some(passenger) = parse_passenger(utterance) {
                let name = passenger.display_name();
                self.flow.apply(state, WorkflowEvent::PassengerProvided { passenger })?;
                return Ok(AgentReply::new(
                    format!("Passenger {name} noted. Say confirm to book."),
                    state.phase,
                ));
            }
        }
        Ok(AgentReply::new(reply::clarification_text(state.phase), state.phase))
    }
}

enum Reconciliation {
    Found(BookingConfirmation),
    NotFound,
    Unavailable,
}

/// Deterministic reading of a selection turn: "cheapest", a literal offer
/// id, or a 1-based option number. No model involvement.
fn parse_selection(state: &ConversationState, utterance: &str) -> Option<SelectionRef> {
    let normalized = utterance.to_ascii_lowercase();
    if normalized.contains("cheapest") {
        return Some(SelectionRef::Cheapest);
    }

    for token in utterance.split_whitespace() {
        let token = token.trim_matches(|ch: char| !ch.is_ascii_alphanumeric() && ch != '-');
        if let Some(offer) =
            state.candidates.iter().find(|offer| offer.offer_id.0.eq_ignore_ascii_case(token))
        {
            return Some(SelectionRef::Offer(offer.offer_id.clone()));
        }
    }

    for token in normalized.split(|ch: char| !ch.is_ascii_alphanumeric()) {
        if let Ok(position) = token.parse::<usize>() {
            if position >= 1 {
                return Some(SelectionRef::Index(position - 1));
            }
        }
    }

    None
}

/// Passenger capture accepts the cabin class as optional; a three-token
/// line defaults to economy.
fn parse_passenger(utterance: &str) -> Option<Passenger> {
    let line = utterance.trim();
    Passenger::parse_details(line)
        .or_else(|| Passenger::parse_details(&format!("{line} ECONOMY")))
}

fn booking_arguments(
    state: &ConversationState,
    selected: &FlightOffer,
    passenger: &Passenger,
) -> ArgumentMap {
    let mut arguments = ArgumentMap::new();
    arguments.insert("offer_id".to_string(), Value::String(selected.offer_id.0.clone()));
    arguments.insert(
        "depart_date".to_string(),
        Value::String(selected.depart_date.format("%Y-%m-%d").to_string()),
    );
    arguments.insert("first_name".to_string(), Value::String(passenger.first_name.clone()));
    arguments.insert("last_name".to_string(), Value::String(passenger.last_name.clone()));
    arguments
        .insert("dob".to_string(), Value::String(passenger.dob.format("%Y-%m-%d").to_string()));
    arguments.insert(
        "traveller_class".to_string(),
        Value::String(passenger.traveller_class.as_str().to_string()),
    );
    arguments.insert("reference".to_string(), Value::String(state.idempotency_reference()));
    arguments
}

/// Rebuilds typed criteria from a validated (normalized) argument mapping.
fn criteria_from_arguments(arguments: &ArgumentMap) -> Result<SearchCriteria, AgentError> {
    let field = |name: &str| {
        arguments
            .get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| AgentError::MalformedPayload(format!("missing `{name}` after validation")))
    };

    let origin: IataCode = field("origin")?
        .parse()
        .map_err(|error: InvalidIataCode| AgentError::MalformedPayload(error.to_string()))?;
    let destination: IataCode = field("destination")?
        .parse()
        .map_err(|error: InvalidIataCode| AgentError::MalformedPayload(error.to_string()))?;
    let depart_date = NaiveDate::parse_from_str(field("depart_date")?, "%Y-%m-%d")
        .map_err(|error| AgentError::MalformedPayload(error.to_string()))?;

    let mut criteria = SearchCriteria::new(origin, destination, depart_date);
    if let Some(cabin) = arguments.get("cabin").and_then(Value::as_str) {
        criteria.cabin = cabin
            .parse()
            .map_err(|error: String| AgentError::MalformedPayload(error))?;
    }
    if let Some(adults) = arguments.get("adults").and_then(Value::as_i64) {
        criteria.adults = u8::try_from(adults)
            .map_err(|_| AgentError::MalformedPayload(format!("adults out of range: {adults}")))?;
    }
    Ok(criteria)
}

/// Search results arrive as `{"data": [...]}` or a bare array.
fn offers_from_payload(payload: &Value) -> Result<Vec<FlightOffer>, AgentError> {
    let body = payload.get("data").or_else(|| payload.get("offers")).unwrap_or(payload);
    serde_json::from_value(body.clone())
        .map_err(|error| AgentError::MalformedPayload(format!("search results: {error}")))
}

fn booking_reference(payload: &Value) -> Option<String> {
    let body = payload.get("data").unwrap_or(payload);
    body.get("bookingReference").and_then(Value::as_str).map(str::to_string)
}

fn payload_offer_id(payload: &Value) -> Option<OfferId> {
    let body = payload.get("data").unwrap_or(payload);
    body.get("offerId").and_then(Value::as_str).map(|id| OfferId(id.to_string()))
}
