//! Capability traits — the abstraction over agent tools.
//!
//! Capabilities are what give the agent the ability to act in the world.
//! Their business logic lives outside this core; here we define the seam the
//! decode loop calls through, plus a registry implementation for hosting
//! capabilities in-process.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::CapabilityError;

/// A capability definition sent to the LLM so it knows what it can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityDefinition {
    /// The capability name
    pub name: String,

    /// Description of what the capability does
    pub description: String,

    /// JSON Schema describing the capability's parameters
    pub parameters: serde_json::Value,
}

/// A single hosted capability.
#[async_trait]
pub trait Capability: Send + Sync {
    /// The unique name of this capability (e.g., "lookup", "send_receipt").
    fn name(&self) -> &str;

    /// A description of what this capability does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this capability's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute with the given arguments, returning the outcome payload.
    async fn execute(
        &self,
        arguments: serde_json::Value,
    ) -> std::result::Result<serde_json::Value, CapabilityError>;

    /// Convert this capability into a definition for the provider request.
    fn to_definition(&self) -> CapabilityDefinition {
        CapabilityDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// The seam the decode loop executes tool invocations through.
///
/// A failure here is converted by the decoder into a `ToolOutcome` with
/// `succeeded = false` — it never aborts the decode loop.
#[async_trait]
pub trait CapabilityExecutor: Send + Sync {
    /// Execute the named capability with the given arguments.
    async fn execute(
        &self,
        name: &str,
        arguments: &serde_json::Value,
    ) -> std::result::Result<serde_json::Value, CapabilityError>;

    /// Definitions of every capability this executor can run.
    fn definitions(&self) -> Vec<CapabilityDefinition>;
}

/// A registry of hosted capabilities, dispatching by name.
pub struct CapabilityRegistry {
    capabilities: HashMap<String, Box<dyn Capability>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self {
            capabilities: HashMap::new(),
        }
    }

    /// Register a capability. Replaces any existing one with the same name.
    pub fn register(&mut self, capability: Box<dyn Capability>) {
        let name = capability.name().to_string();
        self.capabilities.insert(name, capability);
    }

    /// Get a capability by name.
    pub fn get(&self, name: &str) -> Option<&dyn Capability> {
        self.capabilities.get(name).map(|c| c.as_ref())
    }

    /// List all registered capability names.
    pub fn names(&self) -> Vec<&str> {
        self.capabilities.keys().map(|s| s.as_str()).collect()
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CapabilityExecutor for CapabilityRegistry {
    async fn execute(
        &self,
        name: &str,
        arguments: &serde_json::Value,
    ) -> std::result::Result<serde_json::Value, CapabilityError> {
        let capability = self
            .capabilities
            .get(name)
            .ok_or_else(|| CapabilityError::NotFound(name.to_string()))?;
        capability.execute(arguments.clone()).await
    }

    fn definitions(&self) -> Vec<CapabilityDefinition> {
        self.capabilities.values().map(|c| c.to_definition()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A simple test capability for unit tests.
    struct EchoCapability;

    #[async_trait]
    impl Capability for EchoCapability {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" }
                },
                "required": ["text"]
            })
        }
        async fn execute(
            &self,
            arguments: serde_json::Value,
        ) -> std::result::Result<serde_json::Value, CapabilityError> {
            Ok(serde_json::json!({ "echo": arguments["text"] }))
        }
    }

    #[test]
    fn registry_register_and_lookup() {
        let mut registry = CapabilityRegistry::new();
        registry.register(Box::new(EchoCapability));
        assert!(registry.get("echo").is_some());
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn registry_definitions() {
        let mut registry = CapabilityRegistry::new();
        registry.register(Box::new(EchoCapability));
        let defs = registry.definitions();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "echo");
    }

    #[tokio::test]
    async fn registry_execute_capability() {
        let mut registry = CapabilityRegistry::new();
        registry.register(Box::new(EchoCapability));

        let result = registry
            .execute("echo", &serde_json::json!({"text": "hello world"}))
            .await
            .unwrap();
        assert_eq!(result["echo"], "hello world");
    }

    #[tokio::test]
    async fn registry_execute_missing_capability() {
        let registry = CapabilityRegistry::new();
        let err = registry
            .execute("nonexistent", &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::NotFound(_)));
    }
}
