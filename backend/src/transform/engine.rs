//! Rule-driven row mapping.
//!
//! [`MappingEngine`] turns split rows into JSON documents following a rule's
//! line specification. Every row is wrapped by the `ENTER_LINE`/`EXIT_LINE`
//! hooks and the whole batch by `ENTER_RULE`/`EXIT_RULE`. Fields that list
//! handlers are routed through the [`ProcessSupervisor`].
//!
//! Field values flow as follows:
//!
//! ```text
//! cell ─▶ field hooks ─▶ handlers (last reply wins) ─▶ nested / to / insert_into
//! ```

use std::sync::Arc;

use serde_json::{Map, Value};

use super::document;
use crate::api::logs::log_warning;
use crate::error::{MappingError, MappingResult};
use crate::hooks::{HookContext, HookPipeline, HookPoint};
use crate::models::{Mapping, Rule};
use crate::supervisor::ProcessSupervisor;

/// Result of mapping a batch of rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    /// One document per row, as returned by the `EXIT_RULE` hooks.
    pub documents: Vec<Value>,
    /// Number of rows that went through the engine.
    pub processed_rows: usize,
    /// `extra` map left by the `EXIT_RULE` hooks.
    pub extra: Map<String, Value>,
}

/// Maps rows to documents.
#[derive(Clone)]
pub struct MappingEngine {
    supervisor: Arc<ProcessSupervisor>,
    hooks: Arc<HookPipeline>,
}

impl MappingEngine {
    pub fn new(supervisor: Arc<ProcessSupervisor>, hooks: Arc<HookPipeline>) -> Self {
        Self { supervisor, hooks }
    }

    /// Map every row of a batch.
    ///
    /// Any failure aborts the batch; no partial result is returned.
    pub async fn map_rows(
        &self,
        rows: &[Vec<String>],
        headers: &[String],
        rule: &Rule,
    ) -> MappingResult<Batch> {
        if rule.each_line.len() > 1 {
            log_warning(format!(
                "Rule {} declares {} line specs, only the first is used",
                rule.id,
                rule.each_line.len()
            ));
        }

        let entered = self
            .hooks
            .execute(HookPoint::EnterRule, HookContext::for_rule(rule))?;

        let mut documents = Vec::with_capacity(rows.len());
        for (index, row) in rows.iter().enumerate() {
            let mapped = self.map_line(row, headers, rule, index).await?;
            documents.push(Value::Object(mapped));
        }

        let exit = HookContext::for_rule(rule)
            .with_extra(entered.extra)
            .with_documents(documents);
        let exited = self.hooks.execute(HookPoint::ExitRule, exit)?;

        Ok(Batch {
            documents: exited.documents,
            processed_rows: rows.len(),
            extra: exited.extra,
        })
    }

    /// Map a single row into a document.
    pub async fn map_line(
        &self,
        line: &[String],
        headers: &[String],
        rule: &Rule,
        index: usize,
    ) -> MappingResult<Map<String, Value>> {
        let spec = rule
            .line_spec()
            .ok_or_else(|| MappingError::NoLineSpec(rule.id.clone()))?;
        let headers: Vec<String> = headers.iter().map(|h| h.trim().to_string()).collect();

        if let Some(missing) = spec
            .map
            .iter()
            .find(|m| m.required && !headers.contains(&m.name))
        {
            return Err(MappingError::MissingRequiredHeader(missing.name.clone()));
        }

        let entered = self.hooks.execute(
            HookPoint::EnterLine,
            HookContext::for_rule(rule).with_line(index, line.to_vec(), headers.clone()),
        )?;
        let HookContext { line, extra, .. } = entered;

        let mut mapped = Map::new();
        for mapping in &spec.map {
            self.apply_mapping(mapping, &line, &headers, rule, index, &mut mapped)
                .await?;
        }

        let exit = HookContext::for_rule(rule)
            .with_line(index, line, headers)
            .with_extra(extra)
            .with_mapped(mapped.clone());
        let exited = self.hooks.execute(HookPoint::ExitLine, exit)?;

        Ok(exited.mapped.unwrap_or(mapped))
    }

    async fn apply_mapping(
        &self,
        mapping: &Mapping,
        line: &[String],
        headers: &[String],
        rule: &Rule,
        index: usize,
        mapped: &mut Map<String, Value>,
    ) -> MappingResult<()> {
        let column = headers.iter().position(|h| *h == mapping.name);
        let Some(cell) = column.and_then(|i| line.get(i)) else {
            if mapping.required {
                return Err(MappingError::MissingRequiredField(mapping.name.clone()));
            }
            if let Some(fill) = &mapping.fill {
                mapped.insert(mapping.target_key().to_string(), fill.resolve(index));
            }
            return Ok(());
        };

        let value = self.run_field_hooks(mapping, rule, index, Value::String(cell.clone()));
        let value = self.run_field_handlers(mapping, value).await;

        match (mapping.nested_path(), mapping.insert_target()) {
            (Some(path), _) => document::assign_nested(mapped, path, value.clone())?,
            (None, None) => {
                mapped.insert(mapping.target_key().to_string(), value.clone());
            }
            (None, Some(_)) => {}
        }

        if let Some(target) = mapping.insert_target() {
            document::append_to(mapped, target, value)?;
        }
        Ok(())
    }

    /// Run `ENTER_LINE` once per plugin name listed on the field.
    fn run_field_hooks(&self, mapping: &Mapping, rule: &Rule, index: usize, mut value: Value) -> Value {
        for plugin in &mapping.plugins {
            let ctx = HookContext::for_rule(rule)
                .with_index(index)
                .with_field(mapping.name.clone(), value.clone());

            match self.hooks.execute(HookPoint::EnterLine, ctx) {
                Ok(out) => {
                    if let Some(v) = out.value {
                        value = v;
                    }
                }
                Err(e) => log_warning(format!(
                    "Plugin {} failed on field {}: {}",
                    plugin, mapping.name, e
                )),
            }
        }
        value
    }

    /// Send the value to every handler. Handlers are not chained: each gets
    /// the same input and the last successful reply wins.
    async fn run_field_handlers(&self, mapping: &Mapping, value: Value) -> Value {
        let mut reply = None;
        for handler in &mapping.handlers {
            match self.supervisor.exec(handler, &value).await {
                Ok(out) => reply = Some(Value::String(out)),
                Err(e) => log_warning(format!(
                    "Handler {} failed on field {}: {}",
                    handler, mapping.name, e
                )),
            }
        }
        reply.unwrap_or(value)
    }
}
