//! Consumed interfaces for node configuration: a JSON-schema
//! validator invoked from `setup`, and a secret resolver invoked before a
//! node's context is constructed. Both are external collaborators — the
//! engine only needs the seam.

use serde_json::Value;

/// Outcome of validating a node's `config` against its `config_schema`.
#[derive(Debug, Clone, Default)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// Consumed interface: `validate(schema, config) -> {valid, errors}`.
pub trait ConfigValidator: Send + Sync {
    fn validate(&self, schema: Option<&Value>, config: &Value) -> ValidationOutcome;
}

/// A validator that accepts anything — stands in for the real JSON-schema
/// engine, which is out of scope for the core.
#[derive(Debug, Default)]
pub struct NoopConfigValidator;

impl ConfigValidator for NoopConfigValidator {
    fn validate(&self, _schema: Option<&Value>, _config: &Value) -> ValidationOutcome {
        ValidationOutcome { valid: true, errors: Vec::new() }
    }
}

/// Consumed interface: expands string-template secret references inside a
/// node's `config` before it becomes part of the node's execution context.
pub trait SecretResolver: Send + Sync {
    fn resolve(&self, config: &Value) -> Value;
}

/// A resolver with nothing to substitute — stands in for the real secret
/// store, which is out of scope for the core.
#[derive(Debug, Default)]
pub struct NoopSecretResolver;

impl SecretResolver for NoopSecretResolver {
    fn resolve(&self, config: &Value) -> Value {
        config.clone()
    }
}
