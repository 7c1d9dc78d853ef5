// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow translation: node/edge graph → ordered, rendered execution
//! steps.

use crate::graph::{NodeDef, NodeType, WorkflowDefinition};
use crate::template::{render_json, render_str, Context, TemplateError};
use crate::validate::{validate_graph, GraphIndex, ValidationIssue};
use base64::Engine as _;
use oc_core::step::{
    HttpAuth, HttpMethod, NotifyChannel, RemoteShell, SendOn, StepPayload, TransferDirection,
};
use oc_core::{Clock, ExecutionStep, RetryPolicy, Target, TargetId};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("invalid workflow definition: {0}")]
    Definition(String),
    #[error("workflow validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
    #[error("workflow contains no usable nodes")]
    AllNodesUnknown,
    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// Resolves a rendered hostname to a registered target (the asset
/// registry, or a cached snapshot of it).
pub trait TargetResolver {
    fn resolve(&self, host: &str) -> Option<Target>;
}

/// Resolver that knows no targets; every hostname stays unresolved.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullResolver;

impl TargetResolver for NullResolver {
    fn resolve(&self, _host: &str) -> Option<Target> {
        None
    }
}

impl TargetResolver for BTreeMap<String, Target> {
    fn resolve(&self, host: &str) -> Option<Target> {
        self.get(host).cloned()
    }
}

/// Translation output: ordered steps plus non-fatal findings — a
/// report, not exception control flow.
#[derive(Debug, Clone, Default)]
pub struct TranslationReport {
    pub steps: Vec<ExecutionStep>,
    pub warnings: Vec<String>,
}

/// Holds the pieces that stay fixed across nodes of one translation.
pub struct Translator<'a, R: TargetResolver> {
    resolver: &'a R,
    ctx: Context,
    warnings: Vec<String>,
}

/// Translate a workflow definition document with the given run parameters.
///
/// The clock only feeds the `system.*` template namespace; supplying a
/// fixed clock makes translation fully deterministic.
pub fn translate(
    definition_json: &Value,
    parameters: &HashMap<String, Value>,
    clock: &impl Clock,
    resolver: &impl TargetResolver,
) -> Result<TranslationReport, TranslateError> {
    let definition = WorkflowDefinition::from_value(definition_json)
        .map_err(|e| TranslateError::Definition(e.to_string()))?;

    // Parse node types; unknown types are skipped with a warning unless
    // every node is unknown.
    let mut known: BTreeMap<String, NodeType> = BTreeMap::new();
    let mut warnings = Vec::new();
    for node in &definition.nodes {
        match node.parsed_type() {
            Some(node_type) => {
                known.insert(node.id.clone(), node_type);
            }
            None => warnings.push(
                ValidationIssue::UnknownNodeType {
                    node: node.id.clone(),
                    node_type: node.node_type.clone(),
                }
                .message(),
            ),
        }
    }
    if known.is_empty() && !definition.nodes.is_empty() {
        return Err(TranslateError::AllNodesUnknown);
    }
    if definition.nodes.is_empty() {
        // An empty graph is a valid workflow that succeeds trivially.
        return Ok(TranslationReport { steps: Vec::new(), warnings });
    }

    let issues = validate_graph(&definition, &known);
    let mut fatal = Vec::new();
    for issue in issues {
        if issue.is_fatal() {
            fatal.push(issue.message());
        } else {
            warnings.push(issue.message());
        }
    }
    if !fatal.is_empty() {
        return Err(TranslateError::Validation(fatal));
    }

    let ctx = build_context(&definition, parameters, clock);
    let index = GraphIndex::build(&definition, &known);
    let order = execution_order(&index);

    let mut translator = Translator { resolver, ctx, warnings };
    let mut steps = Vec::new();
    for node_id in order {
        let node = match definition.node(&node_id) {
            Some(node) => node,
            None => continue,
        };
        let node_type = match known.get(&node_id) {
            Some(t) => *t,
            None => continue,
        };
        if let Some(step) = translator.materialize(node, node_type, steps.len() as u32)? {
            steps.push(step);
        }
    }

    tracing::debug!(steps = steps.len(), warnings = translator.warnings.len(), "translated workflow");
    Ok(TranslationReport { steps, warnings: translator.warnings })
}

/// Build the render context: declared defaults under caller parameters,
/// plus the `system` namespace.
fn build_context(
    definition: &WorkflowDefinition,
    parameters: &HashMap<String, Value>,
    clock: &impl Clock,
) -> Context {
    let mut ctx = Context::new();
    for (name, decl) in &definition.parameters {
        if let Some(default) = &decl.default {
            ctx.insert(name.clone(), default.clone());
        }
    }
    for (name, value) in parameters {
        ctx.insert(name.clone(), value.clone());
    }
    let epoch_ms = clock.epoch_ms();
    ctx.insert(
        "system",
        serde_json::json!({
            "timestamp": oc_core::format_epoch_ms(epoch_ms),
            "epoch_ms": epoch_ms,
        }),
    );
    ctx
}

/// Deterministic topological order: DFS from each start node (sorted by
/// id), emitting a node only after its dependencies, skipping flow
/// anchors. Ties break by node id.
fn execution_order(index: &GraphIndex) -> Vec<String> {
    let reachable = index.reachable_from_start();
    let mut emitted = Vec::new();
    let mut visited = BTreeSet::new();
    // Reachable set is already ordered (BTreeSet); visiting in that order
    // with deps-first recursion gives a stable topological order.
    for node_id in &reachable {
        visit(node_id, index, &reachable, &mut visited, &mut emitted);
    }
    emitted
}

fn visit(
    node_id: &str,
    index: &GraphIndex,
    reachable: &BTreeSet<String>,
    visited: &mut BTreeSet<String>,
    emitted: &mut Vec<String>,
) {
    if !visited.insert(node_id.to_string()) {
        return;
    }
    if let Some(deps) = index.predecessors.get(node_id) {
        for dep in deps {
            // Only follow dependencies that will actually execute; a
            // bounded cycle's back-edge lands on an already-visited node.
            if reachable.contains(dep) {
                visit(dep, index, reachable, visited, emitted);
            }
        }
    }
    let is_anchor = index.types.get(node_id).is_some_and(|t| t.is_flow_anchor());
    if !is_anchor {
        emitted.push(node_id.to_string());
    }
}

impl<R: TargetResolver> Translator<'_, R> {
    fn materialize(
        &mut self,
        node: &NodeDef,
        node_type: NodeType,
        index: u32,
    ) -> Result<Option<ExecutionStep>, TranslateError> {
        let built = match node_type {
            NodeType::Start | NodeType::End | NodeType::Join => None,
            NodeType::ActionCommand => Some(self.command_node(node)?),
            NodeType::ActionScript => Some(self.script_node(node)?),
            NodeType::ActionHttp => Some(self.http_node(node)?),
            NodeType::ActionFileTransfer => Some(self.file_transfer_node(node)?),
            NodeType::ActionDatabase => Some(self.database_node(node)?),
            NodeType::ActionNotification => Some(self.notification_node(node)?),
            NodeType::ConditionIf => Some(self.if_node(node)?),
            NodeType::ConditionWhile => Some(self.while_node(node)?),
            NodeType::ConditionForEach => Some(self.for_each_node(node)?),
            NodeType::Decision => Some(self.decision_node(node)?),
            NodeType::Parallel => Some(self.parallel_node(node)?),
            NodeType::DataTransform => Some(self.data_transform_node(node, "json")?),
            NodeType::DataAggregate => Some(self.data_transform_node(node, "aggregate")?),
            NodeType::DataValidate => Some(self.data_validate_node(node)?),
        };

        let Some((payload, target_host, default_timeout)) = built else {
            return Ok(None);
        };

        let (target_id, target_host) = self.resolve_target(&node.id, target_host);
        let tag = payload.type_tag();
        let mut retry = RetryPolicy::default_for(tag);
        if let Some(max) = node.data_u64("max_retries") {
            retry.max_retries = max as u32;
        }
        if let Some(delay) = node.data_u64("retry_delay_secs") {
            retry.base_delay_secs = delay;
        }

        Ok(Some(ExecutionStep {
            node_id: node.id.clone(),
            index,
            payload,
            target_id,
            target_host,
            credential_hint: node.data_str("credential").map(str::to_string),
            timeout_secs: node.data_u64("timeout").unwrap_or(default_timeout),
            retry,
            continue_on_failure: node.data_bool("continue_on_failure").unwrap_or(false),
        }))
    }

    fn resolve_target(
        &mut self,
        node_id: &str,
        host: Option<String>,
    ) -> (Option<TargetId>, Option<String>) {
        let Some(host) = host.filter(|h| !h.is_empty()) else {
            return (None, None);
        };
        match self.resolver.resolve(&host) {
            Some(target) => (Some(target.id), Some(host)),
            None => {
                // Unresolved hostname stays on the step for diagnostics.
                self.warnings.push(format!("node {}: unresolved target {:?}", node_id, host));
                (None, Some(host))
            }
        }
    }

    fn render(&self, node: &NodeDef, key: &str) -> Result<String, TemplateError> {
        let raw = node.data_str(key).unwrap_or("");
        render_str(raw, &self.ctx, &format!("{}.{}", node.id, key))
    }

    fn render_opt(&self, node: &NodeDef, key: &str) -> Result<Option<String>, TemplateError> {
        match node.data_str(key) {
            None => Ok(None),
            Some(raw) => {
                Ok(Some(render_str(raw, &self.ctx, &format!("{}.{}", node.id, key))?))
            }
        }
    }

    fn command_node(
        &mut self,
        node: &NodeDef,
    ) -> Result<(StepPayload, Option<String>, u64), TranslateError> {
        let target = self.render_opt(node, "target")?;
        let connection = node.data_str("connection_type").unwrap_or("ssh");

        if connection == "winrm" {
            let use_tls = node.data_bool("use_ssl").unwrap_or(false);
            // A templated command catalog entry instead of a raw command.
            if let Some(command_type) = node.data_str("command_type") {
                let parameters = match node.data.get("command_parameters") {
                    Some(Value::Object(map)) => {
                        match render_json(&Value::Object(map.clone()), &self.ctx, &node.id)? {
                            Value::Object(rendered) => rendered,
                            _ => serde_json::Map::new(),
                        }
                    }
                    _ => serde_json::Map::new(),
                };
                return Ok((
                    StepPayload::WindowsCommand {
                        command_type: command_type.to_string(),
                        parameters,
                        use_tls,
                    },
                    target,
                    120,
                ));
            }
            let command = self.render(node, "command")?;
            let shell = match node.data_str("shell") {
                Some("cmd") => RemoteShell::Cmd,
                _ => RemoteShell::Powershell,
            };
            return Ok((StepPayload::WinrmExec { command, shell, use_tls }, target, 60));
        }

        let command = self.render(node, "command")?;
        let shell = match node.data_str("shell") {
            Some("bash") => RemoteShell::Bash,
            _ => RemoteShell::Sh,
        };
        let mut environment = BTreeMap::new();
        if let Some(Value::Object(env)) = node.data.get("environment_variables") {
            for (key, value) in env {
                let rendered = render_str(
                    value.as_str().unwrap_or_default(),
                    &self.ctx,
                    &format!("{}.environment_variables.{}", node.id, key),
                )?;
                environment.insert(key.clone(), rendered);
            }
        }
        Ok((
            StepPayload::SshExec {
                command,
                shell,
                working_directory: node.data_str("working_directory").map(str::to_string),
                environment,
            },
            target,
            60,
        ))
    }

    fn script_node(
        &mut self,
        node: &NodeDef,
    ) -> Result<(StepPayload, Option<String>, u64), TranslateError> {
        let target = self.render_opt(node, "target")?;
        let body = self.render(node, "script")?;
        let mut args = Vec::new();
        if let Some(Value::Array(items)) = node.data.get("arguments") {
            for (i, item) in items.iter().enumerate() {
                args.push(render_str(
                    item.as_str().unwrap_or_default(),
                    &self.ctx,
                    &format!("{}.arguments[{}]", node.id, i),
                )?);
            }
        }
        Ok((
            StepPayload::Script {
                body,
                interpreter: node.data_str("interpreter").unwrap_or("/bin/bash").to_string(),
                args,
                working_directory: node.data_str("working_directory").map(str::to_string),
            },
            target,
            300,
        ))
    }

    fn http_node(
        &mut self,
        node: &NodeDef,
    ) -> Result<(StepPayload, Option<String>, u64), TranslateError> {
        let url = self.render(node, "url")?;

        // Signed webhook variant of the HTTP node.
        if node.data_bool("webhook").unwrap_or(false) {
            let payload = match node.data.get("payload") {
                Some(value) => render_json(value, &self.ctx, &format!("{}.payload", node.id))?,
                None => Value::Object(serde_json::Map::new()),
            };
            return Ok((
                StepPayload::Webhook {
                    url,
                    payload,
                    headers: self.header_map(node)?,
                    secret: node.data_str("secret").map(str::to_string),
                    retry_count: node.data_u64("retry_count").unwrap_or(0) as u32,
                    retry_delay_secs: node.data_u64("retry_delay_sec").unwrap_or(1),
                },
                None,
                30,
            ));
        }

        let method = match node.data_str("method").unwrap_or("GET").to_ascii_uppercase().as_str() {
            "POST" => HttpMethod::Post,
            "PUT" => HttpMethod::Put,
            "DELETE" => HttpMethod::Delete,
            "PATCH" => HttpMethod::Patch,
            _ => HttpMethod::Get,
        };
        let body = match node.data.get("body") {
            None | Some(Value::Null) => None,
            Some(value) => Some(render_json(value, &self.ctx, &format!("{}.body", node.id))?),
        };
        let auth = match node.data.get("auth") {
            Some(Value::Object(auth)) => self.http_auth(node, auth)?,
            _ => None,
        };
        let expected_status = match node.data.get("expected_status_codes") {
            Some(Value::Array(items)) => {
                let codes: Vec<u16> =
                    items.iter().filter_map(Value::as_u64).map(|c| c as u16).collect();
                if codes.is_empty() {
                    vec![200, 201, 202, 204]
                } else {
                    codes
                }
            }
            _ => vec![200, 201, 202, 204],
        };
        Ok((
            StepPayload::Http {
                method,
                url,
                headers: self.header_map(node)?,
                body,
                auth,
                verify_ssl: node.data_bool("verify_ssl").unwrap_or(true),
                follow_redirects: node.data_bool("follow_redirects").unwrap_or(true),
                expected_status,
            },
            None,
            30,
        ))
    }

    fn header_map(&self, node: &NodeDef) -> Result<BTreeMap<String, String>, TemplateError> {
        let mut headers = BTreeMap::new();
        if let Some(Value::Object(map)) = node.data.get("headers") {
            for (key, value) in map {
                let rendered = render_str(
                    value.as_str().unwrap_or_default(),
                    &self.ctx,
                    &format!("{}.headers.{}", node.id, key),
                )?;
                headers.insert(key.clone(), rendered);
            }
        }
        Ok(headers)
    }

    fn http_auth(
        &self,
        node: &NodeDef,
        auth: &serde_json::Map<String, Value>,
    ) -> Result<Option<HttpAuth>, TemplateError> {
        let render = |key: &str| -> Result<String, TemplateError> {
            render_str(
                auth.get(key).and_then(Value::as_str).unwrap_or_default(),
                &self.ctx,
                &format!("{}.auth.{}", node.id, key),
            )
        };
        match auth.get("type").and_then(Value::as_str) {
            Some("basic") => Ok(Some(HttpAuth::Basic {
                username: render("username")?,
                password: render("password")?,
            })),
            Some("bearer") => Ok(Some(HttpAuth::Bearer { token: render("token")? })),
            _ => Ok(None),
        }
    }

    fn file_transfer_node(
        &mut self,
        node: &NodeDef,
    ) -> Result<(StepPayload, Option<String>, u64), TranslateError> {
        let target = self.render_opt(node, "target")?;
        let source = self.render(node, "source_path")?;
        let dest = self.render(node, "dest_path")?;
        let direction = match node.data_str("direction") {
            Some("download") => TransferDirection::Download,
            _ => TransferDirection::Upload,
        };
        let overwrite = node.data_bool("overwrite").unwrap_or(true);
        let mode = node
            .data_str("transfer_mode")
            .or_else(|| node.data_str("connection_type"))
            .unwrap_or("sftp");

        let payload = match mode {
            "scp" | "ssh" => {
                StepPayload::SshCopy { source_path: source, dest_path: dest, direction, overwrite }
            }
            "sync" => StepPayload::SftpSync {
                source_dir: source,
                dest_dir: dest,
                direction,
                recursive: node.data_bool("recursive").unwrap_or(true),
                preserve_permissions: node.data_bool("preserve_permissions").unwrap_or(true),
                preserve_times: node.data_bool("preserve_times").unwrap_or(false),
                include: string_list(node, "include"),
                exclude: string_list(node, "exclude"),
            },
            "winrm" => {
                let content = self.render(node, "content")?;
                StepPayload::WinrmCopy {
                    dest_path: dest,
                    content_b64: base64::engine::general_purpose::STANDARD.encode(content),
                    use_tls: node.data_bool("use_ssl").unwrap_or(false),
                }
            }
            _ => match direction {
                TransferDirection::Upload => StepPayload::SftpUpload {
                    source_path: source,
                    dest_path: dest,
                    overwrite,
                    preserve_permissions: node.data_bool("preserve_permissions").unwrap_or(true),
                },
                TransferDirection::Download => StepPayload::SftpDownload {
                    remote_path: source,
                    local_path: dest,
                    overwrite,
                },
            },
        };
        Ok((payload, target, 300))
    }

    fn database_node(
        &mut self,
        node: &NodeDef,
    ) -> Result<(StepPayload, Option<String>, u64), TranslateError> {
        Ok((
            StepPayload::Database {
                connection_string: self.render(node, "connection_string")?,
                query: self.render(node, "query")?,
                fetch_results: node.data_bool("fetch_results").unwrap_or(true),
            },
            None,
            60,
        ))
    }

    fn notification_node(
        &mut self,
        node: &NodeDef,
    ) -> Result<(StepPayload, Option<String>, u64), TranslateError> {
        let inner = self.notify_payload(node, &node.data)?;
        // Conditional notifications wrap the rendered config; the
        // condition itself is evaluated against the job context at
        // execution time, after the run outcome is known.
        let payload = match node.data_str("condition") {
            Some(condition) if node.data_str("notification_type") == Some("conditional") => {
                StepPayload::NotifyConditional {
                    condition: condition.to_string(),
                    inner: Box::new(inner),
                }
            }
            _ => inner,
        };
        Ok((payload, None, 30))
    }

    fn notify_payload(
        &self,
        node: &NodeDef,
        data: &serde_json::Map<String, Value>,
    ) -> Result<StepPayload, TranslateError> {
        // Conditional configs nest the actual notification under
        // `notification`; plain configs keep fields at the top level.
        let data = match data.get("notification") {
            Some(Value::Object(nested)) => nested,
            _ => data,
        };
        let channel = match data.get("notification_type").and_then(Value::as_str) {
            Some("slack") => NotifyChannel::Slack,
            Some("teams") => NotifyChannel::Teams,
            Some("webhook") => NotifyChannel::Webhook,
            _ => NotifyChannel::Email,
        };
        let mut recipients = Vec::new();
        if let Some(Value::Array(items)) = data.get("recipients") {
            for (i, item) in items.iter().enumerate() {
                recipients.push(render_str(
                    item.as_str().unwrap_or_default(),
                    &self.ctx,
                    &format!("{}.recipients[{}]", node.id, i),
                )?);
            }
        }
        let send_on = match data.get("send_on").and_then(Value::as_str) {
            Some("success") => SendOn::Success,
            Some("failure") => SendOn::Failure,
            _ => SendOn::Always,
        };
        // Subject and body render at execution time against the full job
        // context; they pass through here untouched.
        Ok(StepPayload::Notify {
            channel,
            recipients,
            subject: data.get("subject").and_then(Value::as_str).map(str::to_string),
            body: data
                .get("message")
                .or_else(|| data.get("body"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            priority: data
                .get("priority")
                .and_then(Value::as_str)
                .unwrap_or("normal")
                .to_string(),
            send_on,
            dedupe_key: data.get("dedupe_key").and_then(Value::as_str).map(str::to_string),
        })
    }

    fn if_node(
        &mut self,
        node: &NodeDef,
    ) -> Result<(StepPayload, Option<String>, u64), TranslateError> {
        Ok((
            StepPayload::Condition {
                expression: self.render(node, "condition")?,
                true_branch: node.data_str("true_branch").map(str::to_string),
                false_branch: node.data_str("false_branch").map(str::to_string),
            },
            None,
            5,
        ))
    }

    fn while_node(
        &mut self,
        node: &NodeDef,
    ) -> Result<(StepPayload, Option<String>, u64), TranslateError> {
        let max_iterations = node.data_u64("max_iterations").unwrap_or(100) as u32;
        Ok((
            StepPayload::WhileLoop {
                expression: self.render(node, "condition")?,
                max_iterations,
                body: node.data_str("loop_body").map(str::to_string),
            },
            None,
            u64::from(max_iterations) * 10,
        ))
    }

    fn for_each_node(
        &mut self,
        node: &NodeDef,
    ) -> Result<(StepPayload, Option<String>, u64), TranslateError> {
        let items = match node.data.get("items") {
            Some(Value::String(template)) => Value::String(render_str(
                template,
                &self.ctx,
                &format!("{}.items", node.id),
            )?),
            Some(other) => render_json(other, &self.ctx, &format!("{}.items", node.id))?,
            None => Value::Array(Vec::new()),
        };
        let per_item = node.data_u64("timeout_per_item").unwrap_or(60);
        let timeout = match &items {
            Value::Array(list) => (list.len() as u64).max(1) * per_item,
            _ => 300,
        };
        Ok((
            StepPayload::ForEachLoop {
                items,
                item_variable: node.data_str("item_variable").unwrap_or("item").to_string(),
                body: node.data_str("loop_body").map(str::to_string),
            },
            None,
            timeout,
        ))
    }

    fn decision_node(
        &mut self,
        node: &NodeDef,
    ) -> Result<(StepPayload, Option<String>, u64), TranslateError> {
        Ok((
            StepPayload::Decision {
                branches: string_list(node, "branches"),
                default_branch: node.data_str("default_branch").map(str::to_string),
            },
            None,
            5,
        ))
    }

    fn parallel_node(
        &mut self,
        node: &NodeDef,
    ) -> Result<(StepPayload, Option<String>, u64), TranslateError> {
        Ok((
            StepPayload::Parallel {
                branches: string_list(node, "parallel_branches"),
                wait_for_all: node.data_bool("wait_for_all").unwrap_or(true),
                max_concurrent: node.data_u64("max_concurrent").unwrap_or(5) as u32,
            },
            None,
            300,
        ))
    }

    fn data_transform_node(
        &mut self,
        node: &NodeDef,
        default_type: &str,
    ) -> Result<(StepPayload, Option<String>, u64), TranslateError> {
        Ok((
            StepPayload::DataTransform {
                input_data: node.data.get("input_data").cloned(),
                transformation_type: node
                    .data_str("transformation_type")
                    .unwrap_or(default_type)
                    .to_string(),
                script: node.data_str("transformation_script").unwrap_or_default().to_string(),
                output_format: node.data_str("output_format").unwrap_or("json").to_string(),
            },
            None,
            30,
        ))
    }

    fn data_validate_node(
        &mut self,
        node: &NodeDef,
    ) -> Result<(StepPayload, Option<String>, u64), TranslateError> {
        let rules = node
            .data
            .get("validation_rules")
            .or_else(|| node.data.get("validation_schema"))
            .cloned()
            .unwrap_or(Value::Array(Vec::new()));
        Ok((
            StepPayload::DataValidate {
                input_data: node.data.get("input_data").cloned(),
                rules,
                fail_on_error: node.data_bool("fail_on_error").unwrap_or(true),
            },
            None,
            30,
        ))
    }
}

fn string_list(node: &NodeDef, key: &str) -> Vec<String> {
    match node.data.get(key) {
        Some(Value::Array(items)) => {
            items.iter().filter_map(Value::as_str).map(str::to_string).collect()
        }
        _ => Vec::new(),
    }
}

#[cfg(test)]
#[path = "translate_tests.rs"]
mod tests;
