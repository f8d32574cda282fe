//! In-memory backend.
//!
//! Behaves like the gateway service closely enough to drive the reconciler
//! end to end: it assigns identifiers, fills server-side defaults, injects
//! system tags, and can be scripted to fail, stall, or serve reads that do
//! not show defaults yet.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use indexmap::IndexMap;
use tokio::sync::Mutex;
use tracing::debug;

use crate::backend::{
    ApiBackend, ApiOutput, BackendResult, CreateApiInput, DeleteApiInput, GetApiInput,
    ImportApiInput, ReimportApiInput, UpdateApiInput,
};
use crate::error::BackendError;
use crate::types::Verb;

/// Default route selection expression for new APIs.
pub const DEFAULT_ROUTE_SELECTION_EXPRESSION: &str = "$request.method $request.path";
/// Default API key selection expression for new APIs.
pub const DEFAULT_API_KEY_SELECTION_EXPRESSION: &str = "$request.header.x-api-key";

const PROTOCOL_TYPES: [&str; 2] = ["HTTP", "WEBSOCKET"];

#[derive(Debug, Default)]
struct State {
    apis: IndexMap<String, ApiOutput>,
    next_id: u64,
    failures: Vec<(Verb, BackendError)>,
    stalled: HashSet<Verb>,
    calls: Vec<Verb>,
    system_tags: IndexMap<String, String>,
    hidden_default_reads: u32,
}

impl State {
    fn allocate_id(&mut self) -> String {
        self.next_id = self.next_id.saturating_add(1);
        format!("{:010x}", self.next_id)
    }

    fn get(&self, api_id: &str) -> BackendResult<&ApiOutput> {
        self.apis
            .get(api_id)
            .ok_or_else(|| {
                BackendError::not_found(format!("Unable to find Api with id '{api_id}'"))
            })
    }
}

/// Fields parsed from an import document.
struct Document {
    title: String,
    version: Option<String>,
}

/// Pull `title:` and `version:` out of an OpenAPI document.
fn parse_document(body: Option<&str>) -> BackendResult<Document> {
    let body = body
        .filter(|b| !b.trim().is_empty())
        .ok_or_else(|| BackendError::new("BadRequestException", "Invalid OpenAPI definition"))?;
    let field = |name: &str| {
        body.lines()
            .filter_map(|line| line.trim().strip_prefix(name))
            .find_map(|rest| rest.strip_prefix(':'))
            .map(|value| value.trim().trim_matches('"').to_string())
    };
    Ok(Document {
        title: field("title").unwrap_or_else(|| "imported-api".to_string()),
        version: field("version"),
    })
}

fn import_warnings(
    basepath: Option<&str>,
    fail_on_warnings: Option<bool>,
) -> BackendResult<Vec<String>> {
    let warnings: Vec<String> = basepath
        .filter(|path| !path.starts_with('/'))
        .map(|path| format!("Basepath '{path}' does not start with '/' and was ignored"))
        .into_iter()
        .collect();
    if fail_on_warnings == Some(true) && !warnings.is_empty() {
        return Err(BackendError::new(
            "BadRequestException",
            format!("Warnings found during import: {}", warnings.join("; ")),
        ));
    }
    Ok(warnings)
}

/// Tag keys only the backend itself may write.
const RESERVED_TAG_PREFIX: &str = "aws:";

fn reject_reserved_tags<'a>(mut keys: impl Iterator<Item = &'a String>) -> BackendResult<()> {
    match keys.find(|key| key.starts_with(RESERVED_TAG_PREFIX)) {
        Some(key) => Err(BackendError::new(
            "BadRequestException",
            format!("Tag key '{key}' uses the reserved prefix '{RESERVED_TAG_PREFIX}'"),
        )),
        None => Ok(()),
    }
}

fn endpoint(api_id: &str) -> String {
    format!("https://{api_id}.execute-api.local")
}

/// In-memory implementation of [`ApiBackend`].
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    state: Mutex<State>,
}

impl InMemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tags the service adds to every API it creates.
    #[must_use]
    pub fn with_system_tags<K, V>(mut self, tags: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.state
            .get_mut()
            .system_tags
            .extend(tags.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Fail the next call of `verb` with `error`.
    pub async fn fail_next(&self, verb: Verb, error: BackendError) {
        self.state.lock().await.failures.push((verb, error));
    }

    /// Make every call of `verb` hang until cancelled.
    pub async fn stall(&self, verb: Verb) {
        self.state.lock().await.stalled.insert(verb);
    }

    /// Serve the next `reads` reads without server-side defaults.
    pub async fn hide_defaults_for_reads(&self, reads: u32) {
        self.state.lock().await.hidden_default_reads = reads;
    }

    /// Verbs called so far, in order.
    pub async fn calls(&self) -> Vec<Verb> {
        self.state.lock().await.calls.clone()
    }

    /// Stored state of one API.
    pub async fn api(&self, api_id: &str) -> Option<ApiOutput> {
        self.state.lock().await.apis.get(api_id).cloned()
    }

    /// Number of stored APIs.
    pub async fn len(&self) -> usize {
        self.state.lock().await.apis.len()
    }

    /// Record the call and apply any scripted behaviour.
    async fn enter(&self, verb: Verb) -> BackendResult<()> {
        let stalled = {
            let mut state = self.state.lock().await;
            state.calls.push(verb);
            if let Some(pos) = state.failures.iter().position(|(v, _)| *v == verb) {
                let (_, error) = state.failures.remove(pos);
                debug!(%verb, %error, "Returning scripted failure");
                return Err(error);
            }
            state.stalled.contains(&verb)
        };
        if stalled {
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}

#[async_trait]
impl ApiBackend for InMemoryBackend {
    async fn create(&self, input: CreateApiInput) -> BackendResult<ApiOutput> {
        self.enter(Verb::CreateApi).await?;
        let attrs = input.attributes;
        if attrs.name.as_deref().is_none_or(str::is_empty) {
            return Err(BackendError::new("BadRequestException", "Name is required"));
        }
        let protocol = input.protocol_type.unwrap_or_default();
        if !PROTOCOL_TYPES.contains(&protocol.as_str()) {
            return Err(BackendError::new(
                "BadRequestException",
                format!("Invalid protocol type '{protocol}'"),
            ));
        }
        reject_reserved_tags(input.tags.keys())?;

        let mut state = self.state.lock().await;
        let api_id = state.allocate_id();
        let mut tags = input.tags;
        for (key, value) in &state.system_tags {
            tags.entry(key.clone()).or_insert_with(|| value.clone());
        }
        let output = ApiOutput {
            api_endpoint: Some(endpoint(&api_id)),
            api_gateway_managed: Some(false),
            api_id: Some(api_id.clone()),
            api_key_selection_expression: attrs
                .api_key_selection_expression
                .or_else(|| Some(DEFAULT_API_KEY_SELECTION_EXPRESSION.to_string())),
            cors_configuration: attrs.cors_configuration,
            created_date: Some(Utc::now()),
            description: attrs.description,
            disable_execute_api_endpoint: attrs.disable_execute_api_endpoint.or(Some(false)),
            disable_schema_validation: attrs.disable_schema_validation,
            import_info: None,
            name: attrs.name,
            protocol_type: Some(protocol),
            route_selection_expression: attrs
                .route_selection_expression
                .or_else(|| Some(DEFAULT_ROUTE_SELECTION_EXPRESSION.to_string())),
            tags: Some(tags),
            version: attrs.version,
            warnings: None,
        };
        state.apis.insert(api_id, output.clone());
        Ok(output)
    }

    async fn read(&self, input: GetApiInput) -> BackendResult<ApiOutput> {
        self.enter(Verb::GetApi).await?;
        let mut state = self.state.lock().await;
        let mut output = state.get(&input.api_id)?.clone();
        if state.hidden_default_reads > 0 {
            state.hidden_default_reads = state.hidden_default_reads.saturating_sub(1);
            output.api_key_selection_expression = None;
            output.route_selection_expression = None;
            output.disable_execute_api_endpoint = None;
        }
        Ok(output)
    }

    async fn update(&self, input: UpdateApiInput) -> BackendResult<ApiOutput> {
        self.enter(Verb::UpdateApi).await?;
        let api_id = input
            .api_id
            .ok_or_else(|| BackendError::not_found("ApiId is required"))?;
        if let Some(tags) = &input.tags {
            reject_reserved_tags(tags.keys())?;
        }
        let mut state = self.state.lock().await;
        let mut output = state.get(&api_id)?.clone();
        let attrs = input.attributes;

        if attrs.api_key_selection_expression.is_some() {
            output.api_key_selection_expression = attrs.api_key_selection_expression;
        }
        if attrs.cors_configuration.is_some() {
            output.cors_configuration = attrs.cors_configuration;
        }
        if attrs.description.is_some() {
            output.description = attrs.description;
        }
        if attrs.disable_execute_api_endpoint.is_some() {
            output.disable_execute_api_endpoint = attrs.disable_execute_api_endpoint;
        }
        if attrs.disable_schema_validation.is_some() {
            output.disable_schema_validation = attrs.disable_schema_validation;
        }
        if attrs.name.is_some() {
            output.name = attrs.name;
        }
        if attrs.route_selection_expression.is_some() {
            output.route_selection_expression = attrs.route_selection_expression;
        }
        if attrs.version.is_some() {
            output.version = attrs.version;
        }
        if let Some(desired) = input.tags {
            let mut tags: IndexMap<String, String> = output
                .tags
                .take()
                .unwrap_or_default()
                .into_iter()
                .filter(|(key, _)| state.system_tags.contains_key(key))
                .collect();
            tags.extend(desired);
            output.tags = Some(tags);
        }

        state.apis.insert(api_id, output.clone());
        Ok(output)
    }

    async fn delete(&self, input: DeleteApiInput) -> BackendResult<()> {
        self.enter(Verb::DeleteApi).await?;
        let mut state = self.state.lock().await;
        state.get(&input.api_id)?;
        state.apis.shift_remove(&input.api_id);
        Ok(())
    }

    async fn import(&self, input: ImportApiInput) -> BackendResult<ApiOutput> {
        self.enter(Verb::ImportApi).await?;
        let document = parse_document(input.body.as_deref())?;
        let warnings = import_warnings(input.basepath.as_deref(), input.fail_on_warnings)?;

        let mut state = self.state.lock().await;
        let api_id = state.allocate_id();
        let output = ApiOutput {
            api_endpoint: Some(endpoint(&api_id)),
            api_gateway_managed: Some(false),
            api_id: Some(api_id.clone()),
            api_key_selection_expression: Some(DEFAULT_API_KEY_SELECTION_EXPRESSION.to_string()),
            created_date: Some(Utc::now()),
            disable_execute_api_endpoint: Some(false),
            import_info: Some(Vec::new()),
            name: Some(document.title),
            protocol_type: Some("HTTP".to_string()),
            route_selection_expression: Some(DEFAULT_ROUTE_SELECTION_EXPRESSION.to_string()),
            tags: Some(state.system_tags.clone()),
            version: document.version,
            warnings: Some(warnings),
            ..ApiOutput::default()
        };
        state.apis.insert(api_id, output.clone());
        Ok(output)
    }

    async fn reimport(&self, input: ReimportApiInput) -> BackendResult<ApiOutput> {
        self.enter(Verb::ReimportApi).await?;
        let document = parse_document(input.body.as_deref())?;
        let warnings = import_warnings(input.basepath.as_deref(), input.fail_on_warnings)?;

        let mut state = self.state.lock().await;
        let mut output = state.get(&input.api_id)?.clone();
        output.name = Some(document.title);
        output.version = document.version;
        output.import_info = Some(Vec::new());
        output.warnings = Some(warnings);
        state.apis.insert(input.api_id, output.clone());
        Ok(output)
    }
}
