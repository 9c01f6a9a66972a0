use thiserror::Error;

use crate::domain::booking::{BookingConfirmation, Passenger};
use crate::domain::flight::{FlightOffer, OfferId};
use crate::domain::search::SearchCriteria;
use crate::workflow::states::{ConversationState, Phase, SelectionRef};

/// How many candidates a conversation presents per search.
pub const PRESENTED_LIMIT: usize = 7;

/// Events the runtime feeds into the state machine after the corresponding
/// side effect (if any) has completed. The engine itself never dispatches.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkflowEvent {
    SearchSucceeded { criteria: SearchCriteria, offers: Vec<FlightOffer> },
    SelectionResolved { offer: FlightOffer },
    PassengerProvided { passenger: Passenger },
    BookingSucceeded { confirmation: BookingConfirmation },
    BookingDeclined,
    BookingAmbiguous,
    CancelRequested,
}

impl WorkflowEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::SearchSucceeded { .. } => "SearchSucceeded",
            Self::SelectionResolved { .. } => "SelectionResolved",
            Self::PassengerProvided { .. } => "PassengerProvided",
            Self::BookingSucceeded { .. } => "BookingSucceeded",
            Self::BookingDeclined => "BookingDeclined",
            Self::BookingAmbiguous => "BookingAmbiguous",
            Self::CancelRequested => "CancelRequested",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("event {event} is not valid in phase {phase:?}")]
    InvalidTransition { phase: Phase, event: &'static str },
    #[error("offer `{0}` is not among this conversation's candidates")]
    SelectionOutsideCandidates(OfferId),
    #[error("a booking already exists for this conversation")]
    AlreadyBooked,
    #[error("a booking attempt with an unknown outcome is pending resolution")]
    UnresolvedBooking,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitionOutcome {
    pub from: Phase,
    pub to: Phase,
}

/// The one-way booking state machine.
///
/// Pure transitions over [`ConversationState`]: every mutation of a
/// conversation goes through [`BookingFlow::apply`], and invalid
/// (phase, event) pairs are rejected rather than ignored.
#[derive(Clone, Copy, Debug, Default)]
pub struct BookingFlow;

impl BookingFlow {
    pub fn initial_phase(&self) -> Phase {
        Phase::Init
    }

    pub fn apply(
        &self,
        state: &mut ConversationState,
        event: WorkflowEvent,
    ) -> Result<TransitionOutcome, WorkflowError> {
        let from = state.phase;
        let to = match (from, event) {
            // A search starts a fresh cycle with all prior accumulation
            // cleared. An unresolved booking outcome must not be discarded
            // that way: it first has to be reconciled (or the conversation
            // cancelled outright).
            (_, WorkflowEvent::SearchSucceeded { .. }) if state.ambiguous_booking => {
                return Err(WorkflowError::UnresolvedBooking);
            }
            (_, WorkflowEvent::SearchSucceeded { criteria, offers }) => {
                state.reset();
                state.criteria = Some(criteria);
                state.candidates = offers;
                Phase::CandidatesPresented
            }
            (
                Phase::CandidatesPresented | Phase::FlightSelected,
                WorkflowEvent::SelectionResolved { offer },
            ) => {
                if !state.contains_offer(&offer.offer_id) {
                    return Err(WorkflowError::SelectionOutsideCandidates(offer.offer_id));
                }
                state.selected = Some(offer);
                state.ambiguous_booking = false;
                Phase::FlightSelected
            }
            (Phase::FlightSelected, WorkflowEvent::PassengerProvided { passenger }) => {
                state.passenger = Some(passenger);
                Phase::FlightSelected
            }
            (Phase::FlightSelected, WorkflowEvent::BookingSucceeded { confirmation }) => {
                if state.booking.is_some() {
                    return Err(WorkflowError::AlreadyBooked);
                }
                state.booking = Some(confirmation);
                state.ambiguous_booking = false;
                Phase::Booked
            }
            (Phase::FlightSelected, WorkflowEvent::BookingDeclined) => {
                state.selected = None;
                state.ambiguous_booking = false;
                Phase::CandidatesPresented
            }
            (Phase::FlightSelected, WorkflowEvent::BookingAmbiguous) => {
                state.ambiguous_booking = true;
                Phase::FlightSelected
            }
            (_, WorkflowEvent::CancelRequested) => {
                state.reset();
                Phase::Init
            }
            (phase, event) => {
                return Err(WorkflowError::InvalidTransition { phase, event: event.name() });
            }
        };

        state.phase = to;
        Ok(TransitionOutcome { from, to })
    }
}

/// Minimum-price offer, ties broken by earliest departure time, then by
/// position in the stored (backend) order.
pub fn cheapest_offer(offers: &[FlightOffer]) -> Option<&FlightOffer> {
    offers
        .iter()
        .enumerate()
        .min_by(|(left_idx, left), (right_idx, right)| {
            left.price
                .cmp(&right.price)
                .then(left.depart_time.cmp(&right.depart_time))
                .then(left_idx.cmp(right_idx))
        })
        .map(|(_, offer)| offer)
}

/// The candidate list in the order it is presented to the user: price-ranked
/// with the cheapest-offer tie rules, capped at [`PRESENTED_LIMIT`].
///
/// The stored candidate list itself stays in backend order; only this view
/// is ranked. `SelectionRef::Index` positions refer to this view.
pub fn presented_offers(state: &ConversationState) -> Vec<&FlightOffer> {
    let mut ranked: Vec<(usize, &FlightOffer)> = state.candidates.iter().enumerate().collect();
    ranked.sort_by(|(left_idx, left), (right_idx, right)| {
        left.price
            .cmp(&right.price)
            .then(left.depart_time.cmp(&right.depart_time))
            .then(left_idx.cmp(right_idx))
    });
    ranked.into_iter().take(PRESENTED_LIMIT).map(|(_, offer)| offer).collect()
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("no candidate flights are available to select from")]
    NoCandidates,
    #[error("option {position} is out of range (1..={available})")]
    IndexOutOfRange { position: usize, available: usize },
    #[error("offer `{0}` does not match any presented candidate")]
    UnknownOffer(OfferId),
}

/// Resolves a selection reference against the conversation's candidates.
///
/// Must resolve to exactly one stored offer; anything else is an error the
/// runtime turns into a disambiguation prompt without any tool call.
pub fn resolve_selection(
    state: &ConversationState,
    selection: &SelectionRef,
) -> Result<FlightOffer, SelectionError> {
    if state.candidates.is_empty() {
        return Err(SelectionError::NoCandidates);
    }

    match selection {
        SelectionRef::Index(index) => {
            let presented = presented_offers(state);
            presented.get(*index).copied().cloned().ok_or(SelectionError::IndexOutOfRange {
                position: index + 1,
                available: presented.len(),
            })
        }
        SelectionRef::Cheapest => {
            cheapest_offer(&state.candidates).cloned().ok_or(SelectionError::NoCandidates)
        }
        SelectionRef::Offer(offer_id) => state
            .candidates
            .iter()
            .find(|offer| &offer.offer_id == offer_id)
            .cloned()
            .ok_or_else(|| SelectionError::UnknownOffer(offer_id.clone())),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime};
    use rust_decimal::Decimal;

    use super::{
        cheapest_offer, presented_offers, resolve_selection, BookingFlow, SelectionError,
        WorkflowError, WorkflowEvent,
    };
    use crate::domain::booking::{BookingConfirmation, Passenger};
    use crate::domain::flight::{CabinClass, FlightOffer, IataCode, OfferId};
    use crate::domain::search::SearchCriteria;
    use crate::workflow::states::{ConversationId, ConversationState, Phase, SelectionRef};

    fn offer(id: &str, price: i64, depart: &str) -> FlightOffer {
        FlightOffer {
            offer_id: OfferId(id.to_string()),
            origin: IataCode::new("BOS").expect("origin"),
            destination: IataCode::new("DEN").expect("destination"),
            depart_date: NaiveDate::from_ymd_opt(2026, 3, 5).expect("date"),
            depart_time: NaiveTime::parse_from_str(depart, "%H:%M").expect("time"),
            price: Decimal::new(price, 0),
            currency: "USD".to_string(),
            cabin: CabinClass::Economy,
        }
    }

    fn criteria() -> SearchCriteria {
        SearchCriteria::new(
            IataCode::new("BOS").expect("origin"),
            IataCode::new("DEN").expect("destination"),
            NaiveDate::from_ymd_opt(2026, 3, 5).expect("date"),
        )
    }

    fn searched_state(offers: Vec<FlightOffer>) -> ConversationState {
        let mut state = ConversationState::new(ConversationId::new());
        BookingFlow
            .apply(&mut state, WorkflowEvent::SearchSucceeded { criteria: criteria(), offers })
            .expect("search transition");
        state
    }

    fn passenger() -> Passenger {
        Passenger::parse_details("Asha Verma 1992-07-14 ECONOMY").expect("passenger")
    }

    #[test]
    fn search_stores_candidates_verbatim() {
        let offers = vec![offer("A", 200, "09:00"), offer("B", 120, "07:00")];
        let state = searched_state(offers.clone());

        assert_eq!(state.phase, Phase::CandidatesPresented);
        assert_eq!(state.candidates, offers);
    }

    #[test]
    fn cheapest_breaks_price_tie_by_earlier_departure() {
        let offers = vec![offer("A", 120, "08:00"), offer("B", 120, "07:00")];
        let winner = cheapest_offer(&offers).expect("winner");
        assert_eq!(winner.offer_id.0, "B");
    }

    #[test]
    fn cheapest_breaks_full_tie_by_list_order() {
        let offers = vec![offer("A", 120, "08:00"), offer("B", 120, "08:00")];
        let winner = cheapest_offer(&offers).expect("winner");
        assert_eq!(winner.offer_id.0, "A");
    }

    #[test]
    fn cheapest_is_deterministic_across_calls() {
        let offers =
            vec![offer("A", 150, "06:00"), offer("B", 120, "08:00"), offer("C", 120, "07:30")];
        let first = cheapest_offer(&offers).expect("winner").offer_id.clone();
        for _ in 0..10 {
            assert_eq!(cheapest_offer(&offers).expect("winner").offer_id, first);
        }
    }

    #[test]
    fn presented_view_is_price_ranked_and_capped() {
        let offers: Vec<FlightOffer> =
            (0..10).map(|n| offer(&format!("O{n}"), 300 - i64::from(n) * 10, "08:00")).collect();
        let state = searched_state(offers);

        let presented = presented_offers(&state);
        assert_eq!(presented.len(), super::PRESENTED_LIMIT);
        assert_eq!(presented[0].offer_id.0, "O9");
        assert!(presented.windows(2).all(|pair| pair[0].price <= pair[1].price));
        // Stored order is untouched by presentation.
        assert_eq!(state.candidates[0].offer_id.0, "O0");
    }

    #[test]
    fn selection_by_index_uses_presented_order() {
        let state = searched_state(vec![offer("A", 200, "09:00"), offer("B", 120, "07:00")]);
        let selected = resolve_selection(&state, &SelectionRef::Index(0)).expect("resolves");
        assert_eq!(selected.offer_id.0, "B");
    }

    #[test]
    fn selection_out_of_range_is_rejected() {
        let state = searched_state(vec![offer("A", 200, "09:00")]);
        let error = resolve_selection(&state, &SelectionRef::Index(5)).expect_err("rejects");
        assert_eq!(error, SelectionError::IndexOutOfRange { position: 6, available: 1 });
    }

    #[test]
    fn selection_by_unknown_offer_id_is_rejected() {
        let state = searched_state(vec![offer("A", 200, "09:00")]);
        let error = resolve_selection(&state, &SelectionRef::Offer(OfferId("Z".to_string())))
            .expect_err("rejects");
        assert!(matches!(error, SelectionError::UnknownOffer(_)));
    }

    #[test]
    fn selecting_foreign_offer_violates_candidate_invariant() {
        let mut state = searched_state(vec![offer("A", 200, "09:00")]);
        let error = BookingFlow
            .apply(
                &mut state,
                WorkflowEvent::SelectionResolved { offer: offer("OTHER", 90, "06:00") },
            )
            .expect_err("rejects");
        assert!(matches!(error, WorkflowError::SelectionOutsideCandidates(_)));
        assert_eq!(state.phase, Phase::CandidatesPresented);
    }

    #[test]
    fn happy_path_reaches_booked() {
        let flow = BookingFlow;
        let mut state = searched_state(vec![offer("A", 200, "09:00"), offer("B", 120, "07:00")]);

        let selected = resolve_selection(&state, &SelectionRef::Cheapest).expect("resolves");
        flow.apply(&mut state, WorkflowEvent::SelectionResolved { offer: selected })
            .expect("select");
        flow.apply(&mut state, WorkflowEvent::PassengerProvided { passenger: passenger() })
            .expect("passenger");
        let outcome = flow
            .apply(
                &mut state,
                WorkflowEvent::BookingSucceeded {
                    confirmation: BookingConfirmation {
                        booking_reference: "BOOK123".to_string(),
                        offer_id: OfferId("B".to_string()),
                    },
                },
            )
            .expect("book");

        assert_eq!(outcome.to, Phase::Booked);
        assert_eq!(
            state.booking.as_ref().expect("stored").booking_reference,
            "BOOK123".to_string()
        );
    }

    #[test]
    fn second_booking_on_same_conversation_is_rejected() {
        let flow = BookingFlow;
        let mut state = searched_state(vec![offer("A", 200, "09:00")]);
        let selected = resolve_selection(&state, &SelectionRef::Cheapest).expect("resolves");
        flow.apply(&mut state, WorkflowEvent::SelectionResolved { offer: selected })
            .expect("select");
        let confirmation = BookingConfirmation {
            booking_reference: "BOOK123".to_string(),
            offer_id: OfferId("A".to_string()),
        };
        flow.apply(
            &mut state,
            WorkflowEvent::BookingSucceeded { confirmation: confirmation.clone() },
        )
        .expect("book");

        // Phase is terminal for booking events; a duplicate success cannot
        // even be recorded.
        let error = flow
            .apply(&mut state, WorkflowEvent::BookingSucceeded { confirmation })
            .expect_err("rejects");
        assert!(matches!(error, WorkflowError::InvalidTransition { phase: Phase::Booked, .. }));
    }

    #[test]
    fn ambiguous_booking_keeps_flight_selected_and_flags_state() {
        let flow = BookingFlow;
        let mut state = searched_state(vec![offer("A", 200, "09:00")]);
        let selected = resolve_selection(&state, &SelectionRef::Cheapest).expect("resolves");
        flow.apply(&mut state, WorkflowEvent::SelectionResolved { offer: selected })
            .expect("select");

        let outcome = flow.apply(&mut state, WorkflowEvent::BookingAmbiguous).expect("ambiguous");
        assert_eq!(outcome.to, Phase::FlightSelected);
        assert!(state.ambiguous_booking);
        assert!(state.selected.is_some());
    }

    #[test]
    fn search_is_rejected_while_booking_outcome_is_unresolved() {
        let flow = BookingFlow;
        let mut state = searched_state(vec![offer("A", 200, "09:00")]);
        let selected = resolve_selection(&state, &SelectionRef::Cheapest).expect("resolves");
        flow.apply(&mut state, WorkflowEvent::SelectionResolved { offer: selected })
            .expect("select");
        flow.apply(&mut state, WorkflowEvent::BookingAmbiguous).expect("ambiguous");

        let error = flow
            .apply(
                &mut state,
                WorkflowEvent::SearchSucceeded {
                    criteria: criteria(),
                    offers: vec![offer("NEW", 90, "10:00")],
                },
            )
            .expect_err("rejects");

        assert_eq!(error, WorkflowError::UnresolvedBooking);
        // The unresolved attempt is preserved for reconciliation.
        assert!(state.ambiguous_booking);
        assert_eq!(state.phase, Phase::FlightSelected);
        assert!(state.selected.is_some());
    }

    #[test]
    fn declined_booking_regresses_to_candidates() {
        let flow = BookingFlow;
        let mut state = searched_state(vec![offer("A", 200, "09:00")]);
        let selected = resolve_selection(&state, &SelectionRef::Cheapest).expect("resolves");
        flow.apply(&mut state, WorkflowEvent::SelectionResolved { offer: selected })
            .expect("select");

        let outcome = flow.apply(&mut state, WorkflowEvent::BookingDeclined).expect("declined");
        assert_eq!(outcome.to, Phase::CandidatesPresented);
        assert!(state.selected.is_none());
        assert!(!state.candidates.is_empty());
    }

    #[test]
    fn cancel_clears_state_from_any_phase() {
        let flow = BookingFlow;
        let mut state = searched_state(vec![offer("A", 200, "09:00")]);
        let selected = resolve_selection(&state, &SelectionRef::Cheapest).expect("resolves");
        flow.apply(&mut state, WorkflowEvent::SelectionResolved { offer: selected })
            .expect("select");

        flow.apply(&mut state, WorkflowEvent::CancelRequested).expect("cancel");
        assert_eq!(state.phase, Phase::Init);
        assert!(state.candidates.is_empty());
        assert!(state.selected.is_none());
        assert!(state.criteria.is_none());
    }

    #[test]
    fn search_from_booked_starts_a_new_cycle() {
        let flow = BookingFlow;
        let mut state = searched_state(vec![offer("A", 200, "09:00")]);
        let selected = resolve_selection(&state, &SelectionRef::Cheapest).expect("resolves");
        flow.apply(&mut state, WorkflowEvent::SelectionResolved { offer: selected })
            .expect("select");
        flow.apply(
            &mut state,
            WorkflowEvent::BookingSucceeded {
                confirmation: BookingConfirmation {
                    booking_reference: "BOOK123".to_string(),
                    offer_id: OfferId("A".to_string()),
                },
            },
        )
        .expect("book");

        let outcome = flow
            .apply(
                &mut state,
                WorkflowEvent::SearchSucceeded {
                    criteria: criteria(),
                    offers: vec![offer("NEW", 90, "10:00")],
                },
            )
            .expect("new search");

        assert_eq!(outcome.from, Phase::Booked);
        assert_eq!(outcome.to, Phase::CandidatesPresented);
        assert!(state.booking.is_none());
        assert_eq!(state.candidates[0].offer_id.0, "NEW");
    }

    #[test]
    fn selection_in_init_phase_is_invalid() {
        let flow = BookingFlow;
        let mut state = ConversationState::new(ConversationId::new());
        let error = flow
            .apply(&mut state, WorkflowEvent::SelectionResolved { offer: offer("A", 1, "01:00") })
            .expect_err("rejects");
        assert!(matches!(
            error,
            WorkflowError::InvalidTransition { phase: Phase::Init, event: "SelectionResolved" }
        ));
    }
}
