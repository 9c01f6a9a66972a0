use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use farebot_core::{BookingRequest, CabinClass, OfferId, Passenger};

use crate::catalog::{
    BOOK_FLIGHT_ONEWAY, GET_BOOKINGS_BY_USER, GET_BOOKING_BY_REFERENCE, PING, SEARCH_FLIGHTS,
};
use crate::schema::ToolSpec;

/// A validated, normalized tool invocation. The fields are private and the
/// constructor is crate-visible, so nothing outside this crate can build
/// one; every call a gateway sees went through schema validation first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolCall {
    tool: String,
    arguments: crate::schema::ArgumentMap,
}

impl ToolCall {
    pub(crate) fn new(tool: String, arguments: crate::schema::ArgumentMap) -> Self {
        Self { tool, arguments }
    }

    pub fn tool(&self) -> &str {
        &self.tool
    }

    pub fn arguments(&self) -> &crate::schema::ArgumentMap {
        &self.arguments
    }

    fn text(&self, field: &str) -> Option<&str> {
        self.arguments.get(field).and_then(Value::as_str)
    }

    fn integer(&self, field: &str) -> Option<i64> {
        self.arguments.get(field).and_then(Value::as_i64)
    }
}

/// Terminal failure of one backend call, after policy has been applied.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BackendFailure {
    /// The backend explicitly rejected the request. Deterministic: the
    /// operation did not happen.
    #[error("backend declined the request: {0}")]
    Declined(String),
    /// The outcome is unknown (timeout, lost connection mid-call). Never
    /// resolved by retrying; requires reconciliation.
    #[error("backend outcome is unknown: {0}")]
    Ambiguous(String),
    /// A transient fault on an idempotent call, surfaced after the retry
    /// budget ran out.
    #[error("backend unavailable: {0}")]
    Transient(String),
}

/// A single raw HTTP exchange, below retry policy.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("backend answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("backend answered with an undecodable body: {0}")]
    Decode(String),
}

#[async_trait]
pub trait BackendTransport: Send + Sync {
    async fn post(&self, path: &str, payload: &Value) -> Result<Value, TransportError>;
    async fn get(&self, path: &str) -> Result<Value, TransportError>;
}

/// Maps one validated [`ToolCall`] to one backend operation.
#[async_trait]
pub trait BackendGateway: Send + Sync {
    async fn call(&self, spec: &ToolSpec, call: &ToolCall) -> Result<Value, BackendFailure>;
}

#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Total attempts for idempotent calls (first try included).
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, base_backoff: Duration::from_millis(250) }
    }
}

impl RetryPolicy {
    fn backoff_for(&self, attempt: u32) -> Duration {
        // attempt is 1-based; 250ms, 500ms, 1s, ...
        self.base_backoff * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Gateway to the reservation backend.
///
/// Idempotency policy: tools marked `read_only` are retried on transient
/// faults with exponential backoff; booking calls get exactly one attempt,
/// and any unclear outcome is reported as [`BackendFailure::Ambiguous`].
/// Duplicate-booking prevention wins over automatic recovery.
pub struct ReservationGateway<T> {
    transport: T,
    policy: RetryPolicy,
    user_id: i64,
}

impl<T> ReservationGateway<T>
where
    T: BackendTransport,
{
    pub fn new(transport: T, policy: RetryPolicy, user_id: i64) -> Self {
        Self { transport, policy, user_id }
    }

    async fn call_once(&self, call: &ToolCall) -> Result<Value, TransportError> {
        match call.tool.as_str() {
            SEARCH_FLIGHTS => {
                let payload = json!({
                    "origin": call.text("origin"),
                    "destination": call.text("destination"),
                    "departDate": call.text("depart_date"),
                    "tripType": "ONEWAY",
                    "adults": call.integer("adults").unwrap_or(1),
                    "cabin": call.text("cabin").unwrap_or("ECONOMY"),
                });
                self.transport.post("/flights/search", &payload).await
            }
            BOOK_FLIGHT_ONEWAY => {
                let request = self.booking_request(call)?;
                let payload = serde_json::to_value(request)
                    .map_err(|error| TransportError::Decode(error.to_string()))?;
                self.transport.post("/bookings/oneway", &payload).await
            }
            GET_BOOKING_BY_REFERENCE => {
                let reference = call.text("reference").unwrap_or_default();
                self.transport.get(&format!("/bookings/reference/{reference}")).await
            }
            GET_BOOKINGS_BY_USER => {
                let user_id = call.integer("user_id").unwrap_or(self.user_id);
                self.transport.get(&format!("/bookings/user/{user_id}")).await
            }
            PING => self.transport.get("/health").await,
            other => Err(TransportError::Connection(format!("no backend route for tool `{other}`"))),
        }
    }

    /// Rebuilds the nested backend booking payload from the flat argument
    /// map. Arguments are already schema-normalized, so shape failures here
    /// are treated as decode faults, not user errors.
    fn booking_request(&self, call: &ToolCall) -> Result<BookingRequest, TransportError> {
        let depart_date = parse_date(call.text("depart_date"))?;
        let dob = parse_date(call.text("dob"))?;
        let traveller_class = call
            .text("traveller_class")
            .map(str::parse::<CabinClass>)
            .transpose()
            .map_err(TransportError::Decode)?
            .unwrap_or_default();

        let passenger = Passenger {
            first_name: required_text(call, "first_name")?,
            last_name: required_text(call, "last_name")?,
            dob,
            traveller_class,
        };

        Ok(BookingRequest::one_way(
            self.user_id,
            OfferId(required_text(call, "offer_id")?),
            depart_date,
            required_text(call, "reference")?,
            passenger,
        ))
    }
}

fn required_text(call: &ToolCall, field: &str) -> Result<String, TransportError> {
    call.text(field)
        .map(str::to_string)
        .ok_or_else(|| TransportError::Decode(format!("normalized call lost field `{field}`")))
}

fn parse_date(value: Option<&str>) -> Result<NaiveDate, TransportError> {
    let raw = value.ok_or_else(|| TransportError::Decode("missing date field".to_string()))?;
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| TransportError::Decode(format!("`{raw}` is not a normalized date")))
}

#[async_trait]
impl<T> BackendGateway for ReservationGateway<T>
where
    T: BackendTransport,
{
    async fn call(&self, spec: &ToolSpec, call: &ToolCall) -> Result<Value, BackendFailure> {
        if spec.read_only {
            self.call_with_retries(call).await
        } else {
            self.call_write(call).await
        }
    }
}

impl<T> ReservationGateway<T>
where
    T: BackendTransport,
{
    async fn call_with_retries(&self, call: &ToolCall) -> Result<Value, BackendFailure> {
        let mut last_fault = String::new();

        for attempt in 1..=self.policy.max_attempts {
            match self.call_once(call).await {
                Ok(payload) => return check_payload(payload),
                Err(TransportError::Status { status, body }) if status < 500 => {
                    return Err(BackendFailure::Declined(format!("{status}: {body}")));
                }
                Err(error) => {
                    warn!(
                        tool = %call.tool,
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        %error,
                        "transient fault on idempotent tool call"
                    );
                    last_fault = error.to_string();
                    if attempt < self.policy.max_attempts {
                        tokio::time::sleep(self.policy.backoff_for(attempt)).await;
                    }
                }
            }
        }

        Err(BackendFailure::Transient(format!(
            "{} attempts exhausted, last fault: {last_fault}",
            self.policy.max_attempts
        )))
    }

    async fn call_write(&self, call: &ToolCall) -> Result<Value, BackendFailure> {
        debug!(tool = %call.tool, "single-attempt write call");
        match self.call_once(call).await {
            Ok(payload) => check_payload(payload),
            Err(TransportError::Status { status, body }) if status < 500 => {
                Err(BackendFailure::Declined(format!("{status}: {body}")))
            }
            Err(error) => Err(BackendFailure::Ambiguous(error.to_string())),
        }
    }
}

/// The backend reports some rejections as `{"error": "..."}` bodies with a
/// success status. Those are deterministic declines, not payloads.
fn check_payload(payload: Value) -> Result<Value, BackendFailure> {
    if let Some(message) = payload.get("error").and_then(Value::as_str) {
        return Err(BackendFailure::Declined(message.to_string()));
    }
    Ok(payload)
}

/// Production transport over reqwest.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string() })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn decode(response: reqwest::Response) -> Result<Value, TransportError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| TransportError::Connection(error.to_string()))?;

        if !status.is_success() {
            return Err(TransportError::Status { status: status.as_u16(), body });
        }

        serde_json::from_str(&body).map_err(|error| TransportError::Decode(error.to_string()))
    }

    fn map_send_error(error: reqwest::Error) -> TransportError {
        if error.is_timeout() {
            TransportError::Timeout
        } else {
            TransportError::Connection(error.to_string())
        }
    }
}

#[async_trait]
impl BackendTransport for HttpTransport {
    async fn post(&self, path: &str, payload: &Value) -> Result<Value, TransportError> {
        let response = self
            .client
            .post(self.url(path))
            .json(payload)
            .send()
            .await
            .map_err(Self::map_send_error)?;
        Self::decode(response).await
    }

    async fn get(&self, path: &str) -> Result<Value, TransportError> {
        let response =
            self.client.get(self.url(path)).send().await.map_err(Self::map_send_error)?;
        Self::decode(response).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::{
        BackendFailure, BackendGateway, BackendTransport, ReservationGateway, RetryPolicy,
        ToolCall, TransportError,
    };
    use crate::catalog::reservation_toolset;
    use crate::schema::{ArgumentMap, ToolSpec};

    struct ScriptedTransport {
        posts: AtomicUsize,
        gets: AtomicUsize,
        script: Mutex<Vec<Result<Value, TransportError>>>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Result<Value, TransportError>>) -> Self {
            Self { posts: AtomicUsize::new(0), gets: AtomicUsize::new(0), script: Mutex::new(script) }
        }

        fn next(&self) -> Result<Value, TransportError> {
            let mut script = self.script.lock().expect("script lock");
            if script.is_empty() {
                Err(TransportError::Connection("script exhausted".to_string()))
            } else {
                script.remove(0)
            }
        }

        fn total_calls(&self) -> usize {
            self.posts.load(Ordering::SeqCst) + self.gets.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl BackendTransport for ScriptedTransport {
        async fn post(&self, _path: &str, _payload: &Value) -> Result<Value, TransportError> {
            self.posts.fetch_add(1, Ordering::SeqCst);
            self.next()
        }

        async fn get(&self, _path: &str) -> Result<Value, TransportError> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            self.next()
        }
    }

    fn spec(name: &str) -> ToolSpec {
        reservation_toolset().into_iter().find(|spec| spec.name == name).expect("known tool")
    }

    fn search_call() -> ToolCall {
        let arguments: ArgumentMap = json!({
            "origin": "BOS",
            "destination": "DEN",
            "depart_date": "2026-03-05"
        })
        .as_object()
        .expect("object")
        .clone();
        ToolCall::new("search_flights".to_string(), arguments)
    }

    fn book_call() -> ToolCall {
        let arguments: ArgumentMap = json!({
            "offer_id": "OF-1",
            "depart_date": "2026-03-05",
            "first_name": "Asha",
            "last_name": "Verma",
            "dob": "1992-07-14",
            "traveller_class": "ECONOMY",
            "reference": "conv-1"
        })
        .as_object()
        .expect("object")
        .clone();
        ToolCall::new("book_flight_oneway".to_string(), arguments)
    }

    fn gateway(transport: ScriptedTransport) -> ReservationGateway<ScriptedTransport> {
        ReservationGateway::new(
            transport,
            RetryPolicy { max_attempts: 3, base_backoff: Duration::from_millis(1) },
            1,
        )
    }

    #[tokio::test]
    async fn search_retries_transient_faults_and_succeeds() {
        let transport = ScriptedTransport::new(vec![
            Err(TransportError::Timeout),
            Err(TransportError::Connection("reset".to_string())),
            Ok(json!({ "data": [] })),
        ]);
        let gateway = gateway(transport);

        let payload =
            gateway.call(&spec("search_flights"), &search_call()).await.expect("succeeds");
        assert_eq!(payload["data"], json!([]));
        assert_eq!(gateway.transport.total_calls(), 3);
    }

    #[tokio::test]
    async fn search_surfaces_transient_after_budget() {
        let transport = ScriptedTransport::new(vec![
            Err(TransportError::Timeout),
            Err(TransportError::Timeout),
            Err(TransportError::Timeout),
        ]);
        let gateway = gateway(transport);

        let error =
            gateway.call(&spec("search_flights"), &search_call()).await.expect_err("fails");
        assert!(matches!(error, BackendFailure::Transient(_)));
        assert_eq!(gateway.transport.total_calls(), 3);
    }

    #[tokio::test]
    async fn search_does_not_retry_a_decline() {
        let transport = ScriptedTransport::new(vec![Err(TransportError::Status {
            status: 422,
            body: "no such route".to_string(),
        })]);
        let gateway = gateway(transport);

        let error =
            gateway.call(&spec("search_flights"), &search_call()).await.expect_err("fails");
        assert!(matches!(error, BackendFailure::Declined(_)));
        assert_eq!(gateway.transport.total_calls(), 1);
    }

    #[tokio::test]
    async fn booking_timeout_is_ambiguous_and_never_retried() {
        let transport = ScriptedTransport::new(vec![
            Err(TransportError::Timeout),
            Ok(json!({ "bookingReference": "MUST-NOT-HAPPEN" })),
        ]);
        let gateway = gateway(transport);

        let error =
            gateway.call(&spec("book_flight_oneway"), &book_call()).await.expect_err("fails");
        assert!(matches!(error, BackendFailure::Ambiguous(_)));
        assert_eq!(gateway.transport.total_calls(), 1);
    }

    #[tokio::test]
    async fn booking_rejection_is_a_deterministic_decline() {
        let transport = ScriptedTransport::new(vec![Err(TransportError::Status {
            status: 409,
            body: "offer no longer available".to_string(),
        })]);
        let gateway = gateway(transport);

        let error =
            gateway.call(&spec("book_flight_oneway"), &book_call()).await.expect_err("fails");
        assert!(matches!(error, BackendFailure::Declined(message) if message.contains("409")));
    }

    #[tokio::test]
    async fn error_body_with_success_status_is_declined() {
        let transport =
            ScriptedTransport::new(vec![Ok(json!({ "error": "flight not bookable" }))]);
        let gateway = gateway(transport);

        let error =
            gateway.call(&spec("book_flight_oneway"), &book_call()).await.expect_err("fails");
        assert_eq!(error, BackendFailure::Declined("flight not bookable".to_string()));
    }

    #[tokio::test]
    async fn booking_success_returns_payload() {
        let transport =
            ScriptedTransport::new(vec![Ok(json!({ "bookingReference": "BOOK123" }))]);
        let gateway = gateway(transport);

        let payload =
            gateway.call(&spec("book_flight_oneway"), &book_call()).await.expect("succeeds");
        assert_eq!(payload["bookingReference"], "BOOK123");
    }
}
