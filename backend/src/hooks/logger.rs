//! Logging hook.
//!
//! Logs every lifecycle point and records timing data:
//!
//! - `ENTER_RULE` stamps `extra.timestamp` (unix seconds)
//! - `ENTER_LINE` stamps `extra.line_start_time` (unix millis)
//! - `EXIT_LINE` adds `processing_duration_ms` to the mapped document
//! - `EXIT_RULE` sets `extra.total_processed`

use chrono::Utc;
use serde_json::{json, Value};

use super::{Hook, HookContext};
use crate::api::logs::{log_info, log_info_indent, log_success};
use crate::error::HookError;

pub const DEFAULT_NAME: &str = "logger";

pub struct LoggerHook {
    name: String,
}

impl LoggerHook {
    pub fn new() -> Self {
        Self::named(DEFAULT_NAME)
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for LoggerHook {
    fn default() -> Self {
        Self::new()
    }
}

impl Hook for LoggerHook {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_enter_rule(&self, mut ctx: HookContext) -> Result<HookContext, HookError> {
        log_info(format!("Starting rule processing: {}", ctx.rule_id));
        ctx.extra
            .insert("timestamp".into(), json!(Utc::now().timestamp()));
        Ok(ctx)
    }

    fn on_enter_line(&self, mut ctx: HookContext) -> Result<HookContext, HookError> {
        match (&ctx.field, ctx.index) {
            (Some(field), _) => log_info_indent(format!("Processing field {}", field), 1),
            (None, Some(index)) => log_info(format!("Processing line {}", index)),
            (None, None) => log_info("Processing line"),
        }
        ctx.extra
            .insert("line_start_time".into(), json!(Utc::now().timestamp_millis()));
        Ok(ctx)
    }

    fn on_exit_line(&self, mut ctx: HookContext) -> Result<HookContext, HookError> {
        log_info("Finished processing line");
        let start = ctx.extra.get("line_start_time").and_then(Value::as_i64);
        if let (Some(mapped), Some(start)) = (ctx.mapped.as_mut(), start) {
            let elapsed = Utc::now().timestamp_millis() - start;
            mapped.insert("processing_duration_ms".into(), json!(elapsed.max(0)));
        }
        Ok(ctx)
    }

    fn on_exit_rule(&self, mut ctx: HookContext) -> Result<HookContext, HookError> {
        log_success(format!(
            "Finished rule processing: {} ({} documents)",
            ctx.rule_id,
            ctx.documents.len()
        ));
        ctx.extra
            .insert("total_processed".into(), json!(ctx.documents.len()));
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    #[test]
    fn test_line_timing_reaches_document() {
        let hook = LoggerHook::new();

        let entered = hook
            .on_enter_line(HookContext::default().with_line(0, vec![], vec![]))
            .unwrap();
        assert!(entered.extra.contains_key("line_start_time"));

        let exit = HookContext::default()
            .with_extra(entered.extra)
            .with_mapped(Map::new());
        let out = hook.on_exit_line(exit).unwrap();
        let mapped = out.mapped.unwrap();
        assert!(mapped["processing_duration_ms"].as_i64().unwrap() >= 0);
    }

    #[test]
    fn test_exit_rule_counts_documents() {
        let hook = LoggerHook::new();
        let ctx = HookContext::default().with_documents(vec![json!({}), json!({}), json!({})]);
        let out = hook.on_exit_rule(ctx).unwrap();
        assert_eq!(out.extra["total_processed"], 3);
    }

    #[test]
    fn test_exit_line_without_start_time_is_untouched() {
        let hook = LoggerHook::new();
        let ctx = HookContext::default().with_mapped(Map::new());
        let out = hook.on_exit_line(ctx).unwrap();
        assert!(out.mapped.unwrap().is_empty());
    }
}
