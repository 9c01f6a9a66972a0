use std::collections::BTreeMap;

use thiserror::Error;
use tracing::debug;

use crate::gateway::{BackendFailure, BackendGateway, ToolCall};
use crate::schema::{ArgumentMap, SchemaViolations, ToolSpec};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("tool `{0}` is already registered")]
    DuplicateTool(String),
    #[error("no tool is registered under `{0}`")]
    UnknownTool(String),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Schema(#[from] SchemaViolations),
    #[error(transparent)]
    Backend(#[from] BackendFailure),
}

/// The fixed set of backend-callable operations.
///
/// Populated once at startup and immutable afterwards, so it is safe to
/// share across conversations for reads. [`ToolRegistry::dispatch`] is the
/// only path to the gateway and re-validates unconditionally - callers that
/// validated earlier get no shortcut.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, ToolSpec>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, spec: ToolSpec) -> Result<(), RegistryError> {
        if self.tools.contains_key(spec.name) {
            return Err(RegistryError::DuplicateTool(spec.name.to_string()));
        }
        self.tools.insert(spec.name.to_string(), spec);
        Ok(())
    }

    pub fn spec(&self, tool_name: &str) -> Result<&ToolSpec, RegistryError> {
        self.tools.get(tool_name).ok_or_else(|| RegistryError::UnknownTool(tool_name.to_string()))
    }

    pub fn specs(&self) -> impl Iterator<Item = &ToolSpec> {
        self.tools.values()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Validates arguments against the named tool's schema, returning the
    /// normalized mapping on success.
    pub fn validate(
        &self,
        tool_name: &str,
        arguments: &ArgumentMap,
    ) -> Result<ArgumentMap, DispatchError> {
        let spec = self.spec(tool_name)?;
        Ok(spec.validate(arguments)?)
    }

    /// Dispatches a tool call to the backend through the gateway.
    ///
    /// Validation happens here regardless of what the caller did before;
    /// an argument mapping that fails the schema never reaches the gateway.
    pub async fn dispatch<G>(
        &self,
        tool_name: &str,
        arguments: &ArgumentMap,
        gateway: &G,
    ) -> Result<serde_json::Value, DispatchError>
    where
        G: BackendGateway + ?Sized,
    {
        let spec = self.spec(tool_name)?;
        let normalized = spec.validate(arguments)?;
        debug!(tool = tool_name, read_only = spec.read_only, "dispatching validated tool call");

        let call = ToolCall::new(tool_name.to_string(), normalized);
        Ok(gateway.call(spec, &call).await?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::{DispatchError, RegistryError, ToolRegistry};
    use crate::gateway::{BackendFailure, BackendGateway, ToolCall};
    use crate::schema::{ArgumentMap, FieldKind, FieldSpec, ToolSpec};

    fn search_spec() -> ToolSpec {
        ToolSpec {
            name: "search_flights",
            description: "Search one-way flights",
            fields: vec![
                FieldSpec::required("origin", FieldKind::IataCode, "origin airport"),
                FieldSpec::required("destination", FieldKind::IataCode, "destination airport"),
                FieldSpec::required("depart_date", FieldKind::Date, "departure date"),
            ],
            read_only: true,
        }
    }

    fn args(value: Value) -> ArgumentMap {
        value.as_object().expect("object").clone()
    }

    #[derive(Default)]
    struct CountingGateway {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl BackendGateway for CountingGateway {
        async fn call(&self, _spec: &ToolSpec, call: &ToolCall) -> Result<Value, BackendFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!({ "echo": call.arguments() }))
        }
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = ToolRegistry::new();
        registry.register(search_spec()).expect("first registration");
        let error = registry.register(search_spec()).expect_err("duplicate");
        assert_eq!(error, RegistryError::DuplicateTool("search_flights".to_string()));
    }

    #[test]
    fn unknown_tool_is_rejected() {
        let registry = ToolRegistry::new();
        let error = registry.validate("nope", &ArgumentMap::new()).expect_err("unknown");
        assert!(matches!(
            error,
            DispatchError::Registry(RegistryError::UnknownTool(name)) if name == "nope"
        ));
    }

    #[tokio::test]
    async fn invalid_arguments_never_reach_the_gateway() {
        let mut registry = ToolRegistry::new();
        registry.register(search_spec()).expect("registration");
        let gateway = CountingGateway::default();

        let error = registry
            .dispatch("search_flights", &args(json!({ "origin": "BOS" })), &gateway)
            .await
            .expect_err("schema failure");

        assert!(matches!(error, DispatchError::Schema(_)));
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn dispatch_forwards_normalized_arguments() {
        let mut registry = ToolRegistry::new();
        registry.register(search_spec()).expect("registration");
        let gateway = CountingGateway::default();

        let payload = registry
            .dispatch(
                "search_flights",
                &args(json!({
                    "origin": "bos",
                    "destination": "den",
                    "depart_date": "2026-03-05"
                })),
                &gateway,
            )
            .await
            .expect("dispatches");

        assert_eq!(gateway.calls.load(Ordering::SeqCst), 1);
        assert_eq!(payload["echo"]["origin"], "BOS");
    }
}
