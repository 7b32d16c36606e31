//! Lifecycle hooks.
//!
//! Hooks observe and rewrite the mapping of a batch at four points:
//!
//! ```text
//! ENTER_RULE ─▶ ( ENTER_LINE ─▶ map fields ─▶ EXIT_LINE )* ─▶ EXIT_RULE
//! ```
//!
//! Each point folds one [`HookContext`] through every registered hook in
//! registration order: the context a hook returns is the context the next
//! hook receives. The first failure aborts the fold.
//!
//! Hooks are compiled in and selected by the `plugins` list of the
//! configuration file (see [`PluginConfig`]).

pub mod logger;
pub mod operations;

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{HookError, HookExecutionError};
use crate::models::Rule;

pub use logger::LoggerHook;
pub use operations::{Operation, OperationsHook};

// =============================================================================
// Hook Points
// =============================================================================

/// Lifecycle point a hook is invoked at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    EnterRule,
    EnterLine,
    ExitLine,
    ExitRule,
}

impl HookPoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookPoint::EnterRule => "ENTER_RULE",
            HookPoint::EnterLine => "ENTER_LINE",
            HookPoint::ExitLine => "EXIT_LINE",
            HookPoint::ExitRule => "EXIT_RULE",
        }
    }
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Hook Context
// =============================================================================

/// Data threaded through the hooks of one lifecycle invocation.
///
/// Which fields are populated depends on the point:
///
/// | Point        | Populated                                       |
/// |--------------|-------------------------------------------------|
/// | `ENTER_RULE` | `rule_id`, `rule_type`                          |
/// | `ENTER_LINE` | + `index`, `line`, `headers`                    |
/// | field level  | + `field`, `value`                              |
/// | `EXIT_LINE`  | + `mapped`                                      |
/// | `EXIT_RULE`  | `documents`, `processed_rows`                   |
///
/// `extra` carries free-form keys between hooks. The engine hands the
/// `extra` map of a row's `ENTER_LINE` context on to its `EXIT_LINE` context.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HookContext {
    pub rule_id: String,
    pub rule_type: Option<String>,
    pub index: Option<usize>,
    pub line: Vec<String>,
    pub headers: Vec<String>,
    pub field: Option<String>,
    pub value: Option<Value>,
    pub mapped: Option<Map<String, Value>>,
    pub documents: Vec<Value>,
    pub processed_rows: Option<usize>,
    pub extra: Map<String, Value>,
}

impl HookContext {
    /// Context for a rule.
    pub fn for_rule(rule: &Rule) -> Self {
        Self {
            rule_id: rule.id.clone(),
            rule_type: rule.kind.clone(),
            ..Self::default()
        }
    }

    pub fn with_line(mut self, index: usize, line: Vec<String>, headers: Vec<String>) -> Self {
        self.index = Some(index);
        self.line = line;
        self.headers = headers;
        self
    }

    pub fn with_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_field(mut self, field: impl Into<String>, value: Value) -> Self {
        self.field = Some(field.into());
        self.value = Some(value);
        self
    }

    pub fn with_mapped(mut self, mapped: Map<String, Value>) -> Self {
        self.mapped = Some(mapped);
        self
    }

    pub fn with_documents(mut self, documents: Vec<Value>) -> Self {
        self.processed_rows = Some(documents.len());
        self.documents = documents;
        self
    }

    pub fn with_extra(mut self, extra: Map<String, Value>) -> Self {
        self.extra = extra;
        self
    }
}

// =============================================================================
// Hook Trait
// =============================================================================

/// A lifecycle hook. Every entry point defaults to passing the context through.
pub trait Hook: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    fn on_enter_rule(&self, ctx: HookContext) -> Result<HookContext, HookError> {
        Ok(ctx)
    }

    fn on_enter_line(&self, ctx: HookContext) -> Result<HookContext, HookError> {
        Ok(ctx)
    }

    fn on_exit_line(&self, ctx: HookContext) -> Result<HookContext, HookError> {
        Ok(ctx)
    }

    fn on_exit_rule(&self, ctx: HookContext) -> Result<HookContext, HookError> {
        Ok(ctx)
    }

    /// Dispatch to the entry point for `point`.
    fn call(&self, point: HookPoint, ctx: HookContext) -> Result<HookContext, HookError> {
        match point {
            HookPoint::EnterRule => self.on_enter_rule(ctx),
            HookPoint::EnterLine => self.on_enter_line(ctx),
            HookPoint::ExitLine => self.on_exit_line(ctx),
            HookPoint::ExitRule => self.on_exit_rule(ctx),
        }
    }
}

// =============================================================================
// Plugin Configuration
// =============================================================================

/// A compiled-in hook selected from configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PluginConfig {
    /// Logs every lifecycle point and records timing data.
    Logger {
        #[serde(default)]
        name: Option<String>,
    },

    /// Applies value operations to field values at `ENTER_LINE`.
    Operations {
        name: String,
        /// Only touch these fields; empty means every field.
        #[serde(default)]
        fields: Vec<String>,
        operations: Vec<Operation>,
    },
}

impl PluginConfig {
    pub fn name(&self) -> &str {
        match self {
            PluginConfig::Logger { name } => name.as_deref().unwrap_or(logger::DEFAULT_NAME),
            PluginConfig::Operations { name, .. } => name,
        }
    }

    /// Build the hook this entry describes.
    pub fn build(&self) -> Result<Box<dyn Hook>, HookError> {
        match self {
            PluginConfig::Logger { .. } => Ok(Box::new(LoggerHook::named(self.name()))),
            PluginConfig::Operations {
                name,
                fields,
                operations,
            } => Ok(Box::new(OperationsHook::new(
                name.clone(),
                fields.clone(),
                operations.clone(),
            )?)),
        }
    }
}

// =============================================================================
// Pipeline
// =============================================================================

/// Ordered chain of hooks.
#[derive(Default)]
pub struct HookPipeline {
    hooks: Vec<Box<dyn Hook>>,
}

impl HookPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a pipeline from configuration, preserving its order.
    pub fn from_config(plugins: &[PluginConfig]) -> Result<Self, (String, HookError)> {
        let mut pipeline = Self::new();
        for plugin in plugins {
            let hook = plugin.build().map_err(|e| (plugin.name().to_string(), e))?;
            pipeline.register(hook);
        }
        Ok(pipeline)
    }

    /// Append a hook; it runs after every hook registered before it.
    pub fn register(&mut self, hook: Box<dyn Hook>) {
        self.hooks.push(hook);
    }

    pub fn with_hook(mut self, hook: impl Hook + 'static) -> Self {
        self.register(Box::new(hook));
        self
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Hook names in invocation order.
    pub fn names(&self) -> Vec<&str> {
        self.hooks.iter().map(|h| h.name()).collect()
    }

    /// Fold `ctx` through every hook's entry point for `point`.
    pub fn execute(
        &self,
        point: HookPoint,
        ctx: HookContext,
    ) -> Result<HookContext, HookExecutionError> {
        self.hooks.iter().try_fold(ctx, |ctx, hook| {
            hook.call(point, ctx).map_err(|source| HookExecutionError {
                hook: hook.name().to_string(),
                point,
                source,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Appends its tag to `extra.trace` at ENTER_LINE.
    struct Tagger(&'static str);

    impl Hook for Tagger {
        fn name(&self) -> &str {
            self.0
        }

        fn on_enter_line(&self, mut ctx: HookContext) -> Result<HookContext, HookError> {
            let trace = ctx
                .extra
                .get("trace")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            ctx.extra
                .insert("trace".into(), json!(format!("{}{}", trace, self.0)));
            Ok(ctx)
        }
    }

    struct Failing;

    impl Hook for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn on_enter_rule(&self, _ctx: HookContext) -> Result<HookContext, HookError> {
            Err(HookError::Failed("rejected".into()))
        }
    }

    struct Counter(Arc<AtomicUsize>);

    impl Hook for Counter {
        fn name(&self) -> &str {
            "counter"
        }

        fn on_enter_rule(&self, ctx: HookContext) -> Result<HookContext, HookError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(ctx)
        }
    }

    #[test]
    fn test_hooks_run_in_registration_order() {
        let pipeline = HookPipeline::new().with_hook(Tagger("A")).with_hook(Tagger("B"));

        let ctx = pipeline
            .execute(HookPoint::EnterLine, HookContext::default())
            .unwrap();
        assert_eq!(ctx.extra["trace"], "AB");
        assert_eq!(pipeline.names(), vec!["A", "B"]);
    }

    #[test]
    fn test_first_failure_short_circuits() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = HookPipeline::new()
            .with_hook(Failing)
            .with_hook(Counter(Arc::clone(&calls)));

        let err = pipeline
            .execute(HookPoint::EnterRule, HookContext::default())
            .unwrap_err();
        assert_eq!(err.hook, "failing");
        assert_eq!(err.point, HookPoint::EnterRule);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_default_entry_points_pass_through() {
        let pipeline = HookPipeline::new().with_hook(Failing);
        let ctx = HookContext::default().with_field("name", json!("x"));
        let out = pipeline.execute(HookPoint::ExitRule, ctx.clone()).unwrap();
        assert_eq!(out, ctx);
    }

    #[test]
    fn test_empty_pipeline_returns_context() {
        let pipeline = HookPipeline::new();
        assert!(pipeline.is_empty());
        let ctx = HookContext::default().with_documents(vec![json!({}), json!({})]);
        let out = pipeline.execute(HookPoint::ExitRule, ctx).unwrap();
        assert_eq!(out.processed_rows, Some(2));
    }

    #[test]
    fn test_from_config_preserves_order() {
        let plugins: Vec<PluginConfig> = serde_json::from_value(json!([
            { "type": "operations", "name": "clean", "operations": [{ "type": "trim" }] },
            { "type": "logger" }
        ]))
        .unwrap();

        let pipeline = HookPipeline::from_config(&plugins).unwrap();
        assert_eq!(pipeline.names(), vec!["clean", "logger"]);
    }

    #[test]
    fn test_from_config_rejects_bad_operation() {
        let plugins: Vec<PluginConfig> = serde_json::from_value(json!([
            { "type": "operations", "name": "bad", "operations": [{ "type": "replace", "pattern": "(" }] }
        ]))
        .unwrap();

        let (name, err) = HookPipeline::from_config(&plugins).err().unwrap();
        assert_eq!(name, "bad");
        assert!(matches!(err, HookError::InvalidConfig(_)));
    }
}
