use std::fmt::Write as _;

use farebot_core::{
    presented_offers, BookingConfirmation, ConversationState, FlightOffer, Phase,
};

/// What one turn sends back to the user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgentReply {
    pub text: String,
    /// Phase after the turn, for callers that surface progress.
    pub phase: Phase,
}

impl AgentReply {
    pub fn new(text: impl Into<String>, phase: Phase) -> Self {
        Self { text: text.into(), phase }
    }
}

/// Renders the price-ranked candidate list shown after a search.
pub(crate) fn render_candidates(state: &ConversationState) -> String {
    let presented = presented_offers(state);
    let route = state
        .criteria
        .as_ref()
        .map(|criteria| criteria.route_label())
        .unwrap_or_else(|| "your search".to_string());

    let mut text = format!(
        "Found {} option{} for {}:\n",
        presented.len(),
        if presented.len() == 1 { "" } else { "s" },
        route,
    );
    for (position, offer) in presented.iter().enumerate() {
        let _ = writeln!(text, "  {}. {}", position + 1, render_offer(offer));
    }
    text.push_str("Pick one by number, say \"cheapest\", or search again.");
    text
}

pub(crate) fn render_offer(offer: &FlightOffer) -> String {
    format!(
        "{} {} -> {} on {} at {} - {} {} ({})",
        offer.offer_id,
        offer.origin,
        offer.destination,
        offer.depart_date,
        offer.depart_time.format("%H:%M"),
        offer.price,
        offer.currency,
        offer.cabin,
    )
}

pub(crate) fn render_selection(offer: &FlightOffer) -> String {
    format!(
        "Selected {}. Please give the passenger details as \
         \"First Last YYYY-MM-DD CLASS\" (class optional), then say confirm.",
        render_offer(offer),
    )
}

pub(crate) fn render_confirmation(confirmation: &BookingConfirmation) -> String {
    format!(
        "Booked! Your reference is {} (offer {}).",
        confirmation.booking_reference, confirmation.offer_id,
    )
}

pub(crate) fn render_already_booked(confirmation: &BookingConfirmation) -> String {
    format!(
        "This trip is already booked under reference {}. \
         Start a new search if you need another flight.",
        confirmation.booking_reference,
    )
}

pub(crate) fn ambiguous_booking_text() -> String {
    "I couldn't tell whether that booking went through; nothing was resubmitted. \
     Say confirm again and I'll check before booking."
        .to_string()
}

pub(crate) fn pending_booking_text() -> String {
    "There's a booking attempt whose outcome I couldn't confirm yet. \
     Say confirm so I can check it first, or cancel to drop it."
        .to_string()
}

pub(crate) fn llm_unavailable_text() -> String {
    "I couldn't reach the language model to read that. Try again in a moment, \
     or phrase it plainly, e.g. \"flights from Boston to Denver on March 5\"."
        .to_string()
}

pub(crate) fn declined_booking_text() -> String {
    "The backend declined that booking. Your selection was kept; \
     you can pick a different option or search again."
        .to_string()
}

pub(crate) fn clarification_text(phase: Phase) -> String {
    match phase {
        Phase::Init => {
            "Tell me where you want to fly, e.g. \"flights from Boston to Denver on March 5\"."
        }
        Phase::CandidatesPresented => {
            "Pick one of the listed options by number, say \"cheapest\", or search again."
        }
        Phase::FlightSelected => {
            "Give the passenger details as \"First Last YYYY-MM-DD CLASS\", say confirm, or cancel."
        }
        Phase::Booked => "You're booked. Start a new search if you need another flight.",
    }
    .to_string()
}

pub(crate) fn cancelled_text() -> String {
    "Okay, I've cleared everything. Tell me when you want to search again.".to_string()
}
