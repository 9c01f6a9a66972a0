//! Farebot tool layer - the seam between the agent and the reservation backend
//!
//! Tools are named backend operations with declared argument schemas. The
//! registry is the single gate in front of the backend: arguments are
//! validated (and re-validated on dispatch) against the tool's schema, so no
//! call that fails validation can ever reach the wire, no matter what the
//! language model produced upstream.
//!
//! # Layers
//!
//! - [`schema`] - `ToolSpec`/`FieldSpec` declarations and coercing validation
//! - [`registry`] - `register` / `validate` / `dispatch`, the only dispatch path
//! - [`gateway`] - one validated `ToolCall` to one backend HTTP call, with
//!   the retry policy split by tool idempotency
//! - [`catalog`] - the fixed reservation tool set
//!
//! # Safety rule
//!
//! Booking calls are never retried automatically. A timeout or lost
//! connection during a booking surfaces as [`gateway::BackendFailure::Ambiguous`]
//! and stays ambiguous until the workflow reconciles it explicitly.

pub mod catalog;
pub mod gateway;
pub mod registry;
pub mod schema;

pub use catalog::{
    register_reservation_tools, reservation_toolset, BOOK_FLIGHT_ONEWAY, GET_BOOKINGS_BY_USER,
    GET_BOOKING_BY_REFERENCE, PING, SEARCH_FLIGHTS,
};
pub use gateway::{
    BackendFailure, BackendGateway, BackendTransport, HttpTransport, ReservationGateway,
    RetryPolicy, ToolCall, TransportError,
};
pub use registry::{DispatchError, RegistryError, ToolRegistry};
pub use schema::{ArgumentMap, FieldKind, FieldSpec, FieldViolation, SchemaViolations, ToolSpec};
