use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::booking::{BookingConfirmation, Passenger};
use crate::domain::flight::{FlightOffer, OfferId};
use crate::domain::search::SearchCriteria;

/// Discrete booking progress of one conversation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Init,
    CandidatesPresented,
    FlightSelected,
    Booked,
}

/// Per-turn routing decision. Derived fresh every turn, never persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Intent {
    Search,
    Select,
    Confirm,
    Cancel,
    Unknown,
}

impl Intent {
    pub const LABELS: &'static [&'static str] =
        &["SEARCH", "SELECT", "CONFIRM", "CANCEL", "UNKNOWN"];

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_uppercase().as_str() {
            "SEARCH" => Some(Self::Search),
            "SELECT" => Some(Self::Select),
            "CONFIRM" => Some(Self::Confirm),
            "CANCEL" => Some(Self::Cancel),
            "UNKNOWN" => Some(Self::Unknown),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub Uuid);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// How a user turn references one of the presented candidates.
///
/// Resolution is deterministic: an explicit index into the presented list,
/// the cheapest offer, or a literal offer id. Natural-language attribute
/// matching is intentionally not attempted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SelectionRef {
    /// Zero-based position in the presented (price-ranked) list.
    Index(usize),
    Cheapest,
    Offer(OfferId),
}

/// All mutable state of one booking conversation.
///
/// Owned exclusively by the workflow engine; mutated only through
/// [`crate::workflow::engine::BookingFlow::apply`]. One instance per
/// conversation id, no sharing across conversations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversationState {
    pub conversation_id: ConversationId,
    pub phase: Phase,
    pub criteria: Option<SearchCriteria>,
    /// Candidate offers exactly as returned by the backend, in backend order.
    pub candidates: Vec<FlightOffer>,
    pub selected: Option<FlightOffer>,
    pub passenger: Option<Passenger>,
    pub booking: Option<BookingConfirmation>,
    /// Set after a booking attempt with an unknown outcome; cleared once the
    /// outcome is resolved. While set, a new confirm must reconcile against
    /// the backend before booking again.
    pub ambiguous_booking: bool,
}

impl ConversationState {
    pub fn new(conversation_id: ConversationId) -> Self {
        Self {
            conversation_id,
            phase: Phase::Init,
            criteria: None,
            candidates: Vec::new(),
            selected: None,
            passenger: None,
            booking: None,
            ambiguous_booking: false,
        }
    }

    /// Stable booking idempotency key for this conversation.
    pub fn idempotency_reference(&self) -> String {
        format!("conv-{}", self.conversation_id)
    }

    pub fn contains_offer(&self, offer_id: &OfferId) -> bool {
        self.candidates.iter().any(|offer| &offer.offer_id == offer_id)
    }

    /// Clears everything except the conversation identity.
    pub fn reset(&mut self) {
        let conversation_id = self.conversation_id;
        *self = Self::new(conversation_id);
    }
}
