//! Farebot core - deterministic domain model for conversational flight booking
//!
//! Everything in this crate is deterministic and synchronous: flight and
//! booking types, the per-conversation workflow state machine, and the
//! application configuration contract. The language model and the
//! reservation backend live behind seams in the `farebot-agent` and
//! `farebot-tools` crates; nothing here depends on either.

pub mod config;
pub mod domain;
pub mod workflow;

pub use domain::booking::{BookingConfirmation, BookingRequest, Passenger};
pub use domain::flight::{CabinClass, FlightOffer, IataCode, InvalidIataCode, OfferId};
pub use domain::search::SearchCriteria;
pub use workflow::engine::{
    cheapest_offer, presented_offers, resolve_selection, BookingFlow, SelectionError,
    TransitionOutcome, WorkflowError, WorkflowEvent, PRESENTED_LIMIT,
};
pub use workflow::states::{ConversationId, ConversationState, Intent, Phase, SelectionRef};
