//! JSON-RPC Server Implementation
//!
//! Handles protocol requests and routes tool calls to the backend.

use super::protocol::*;
use super::tools::get_all_tools;
use super::transport::{AsyncLineTransport, AsyncStdioTransport};
use crate::backend::Backend;
use crate::error::{Result, ServerError};
use crate::jobs::{JobParams, DEFAULT_PRESET};
use chrono::{Datelike, Utc};
use clockchain_graph::{
    ContentRef, Edge, EdgeInput, EdgeType, GraphError, GraphStore, Layer, NodeInput, NodeUpdate,
    SearchConfig, Visibility,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncWrite};

const PROTOCOL_VERSION: &str = "2024-11-05";
const SERVER_NAME: &str = "clockchain";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

fn to_json<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| ServerError::from(GraphError::from(e)))
}

fn parse_args<T: serde::de::DeserializeOwned>(args: &Value) -> Result<T> {
    serde_json::from_value(args.clone())
        .map_err(|e| ServerError::invalid_input(format!("Invalid arguments: {}", e)))
}

fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ServerError::invalid_input(format!("Missing '{}' parameter", key)))
}

fn optional_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str()).filter(|s| !s.is_empty())
}

fn optional_u8(args: &Value, key: &str) -> Result<Option<u8>> {
    match args.get(key).and_then(|v| v.as_u64()) {
        Some(n) => u8::try_from(n)
            .map(Some)
            .map_err(|_| ServerError::invalid_input(format!("'{}' out of range", key))),
        None => Ok(None),
    }
}

/// Refuse writes that would merge into a node the caller cannot see
fn ensure_writable(store: &GraphStore, id: &str, caller: Option<&str>) -> Result<()> {
    match store.get_node(id) {
        Ok(existing) if !existing.is_visible_to(caller) => Err(GraphError::not_found(id).into()),
        Ok(_) => Ok(()),
        Err(e) if e.is_not_found() => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// One entry of a bulk generation batch
#[derive(Debug, Deserialize)]
struct BulkQuery {
    query: String,
    #[serde(default)]
    preset: Option<String>,
    #[serde(default)]
    visibility: Option<Visibility>,
}

fn visibility_arg(args: &Value) -> Result<Option<Visibility>> {
    optional_str(args, "visibility")
        .map(|v| v.parse::<Visibility>())
        .transpose()
        .map_err(ServerError::from)
}

/// Tool-call server
pub struct McpServer {
    backend: Arc<Backend>,
    initialized: bool,
}

impl McpServer {
    pub fn new(backend: Arc<Backend>) -> Self {
        Self {
            backend,
            initialized: false,
        }
    }

    /// Serve over stdin/stdout until the client disconnects
    pub async fn run(&mut self) -> std::io::Result<()> {
        let mut transport = AsyncStdioTransport::stdio();
        self.serve(&mut transport).await
    }

    pub async fn serve<R, W>(&mut self, transport: &mut AsyncLineTransport<R, W>) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        tracing::info!("JSON-RPC server starting...");

        loop {
            match transport.read_request().await {
                Ok(Some(request)) => {
                    if let Some(response) = self.handle_request(request).await {
                        transport.write_response(&response).await?;
                    }
                }
                Ok(None) => {
                    tracing::info!("Client disconnected");
                    break;
                }
                Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                    let response = JsonRpcResponse::error(
                        None,
                        JsonRpcError::parse_error(format!("Parse error: {}", e)),
                    );
                    transport.write_response(&response).await?;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }

    /// Handle one request; notifications get no response
    pub async fn handle_request(&mut self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        tracing::debug!("Handling request: {}", request.method);

        if request.jsonrpc != "2.0" {
            return Some(JsonRpcResponse::error(
                request.id,
                JsonRpcError::invalid_request("jsonrpc must be \"2.0\""),
            ));
        }

        let is_notification = request.id.is_none();
        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.id, request.params),
            "initialized" | "notifications/initialized" | "notifications/cancelled" => {
                JsonRpcResponse::success(request.id, Value::Null)
            }
            "ping" => JsonRpcResponse::from_serialize(request.id, &PingResult {}),
            "tools/list" => self.handle_tools_list(request.id),
            "tools/call" => self.handle_tools_call(request.id, request.params).await,
            _ => JsonRpcResponse::error(request.id, JsonRpcError::method_not_found(&request.method)),
        };

        if is_notification {
            None
        } else {
            Some(response)
        }
    }

    fn handle_initialize(&mut self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let params: InitializeParams = params
            .map(|p| serde_json::from_value(p).unwrap_or_default())
            .unwrap_or_default();
        if let Some(client) = &params.client_info {
            tracing::info!("Client connected: {} {:?}", client.name, client.version);
        }

        self.initialized = true;

        let result = InitializeResult::tools_only(PROTOCOL_VERSION, SERVER_NAME, SERVER_VERSION);
        JsonRpcResponse::from_serialize(id, &result)
    }

    fn handle_tools_list(&self, id: Option<Value>) -> JsonRpcResponse {
        let result = ToolsListResult {
            tools: get_all_tools(),
        };
        JsonRpcResponse::from_serialize(id, &result)
    }

    async fn handle_tools_call(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let params: ToolCallParams = match params {
            Some(p) => match serde_json::from_value(p) {
                Ok(p) => p,
                Err(e) => {
                    return JsonRpcResponse::error(
                        id,
                        JsonRpcError::invalid_params(format!("Invalid params: {}", e)),
                    );
                }
            },
            None => {
                return JsonRpcResponse::error(id, JsonRpcError::invalid_params("Missing params"));
            }
        };

        let result = self
            .execute_tool(&params.name, params.arguments)
            .await
            .and_then(|result| {
                let reply = ToolCallResult::json(&result).map_err(GraphError::from)?;
                to_json(&reply)
            });

        match result {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(e) => {
                tracing::debug!("Tool {} failed: {}", params.name, e);
                JsonRpcResponse::error(id, e.into())
            }
        }
    }

    /// Execute a tool by name
    async fn execute_tool(&self, name: &str, args: Option<Value>) -> Result<Value> {
        let args = args.unwrap_or(Value::Object(serde_json::Map::new()));
        let store = self.backend.store();

        match name {
            "clockchain_create_node" => {
                let caller = optional_str(&args, "caller");
                let mut input: NodeInput = parse_args(&args)?;
                if input.attrs.created_by.is_none() {
                    input.attrs.created_by = caller.map(str::to_string);
                }
                let draft = input.into_draft()?;
                ensure_writable(store, &draft.id()?, caller)?;
                let outcome = store.add_node(draft)?;
                let node = store.get_node(&outcome.id)?;
                Ok(serde_json::json!({ "outcome": to_json(&outcome)?, "node": to_json(&node)? }))
            }

            "clockchain_update_node" => {
                let path = required_str(&args, "path")?;
                let caller = optional_str(&args, "caller");
                let existing = store.get_node(path)?;
                if !existing.is_visible_to(caller) {
                    return Err(GraphError::not_found(path).into());
                }
                let update: NodeUpdate = parse_args(&args)?;
                if update.is_empty() {
                    return Err(ServerError::invalid_input("No fields to update"));
                }
                to_json(&store.update_node(path, update)?)
            }

            "clockchain_get_node" => {
                let path = required_str(&args, "path")?;
                let node = store.get_node(path)?;
                // Drafts look absent to everyone but their creator
                if !node.is_visible_to(optional_str(&args, "caller")) {
                    return Err(GraphError::not_found(path).into());
                }
                to_json(&node)
            }

            "clockchain_publish" => {
                let path = required_str(&args, "path")?;
                let node = match visibility_arg(&args)?.unwrap_or(Visibility::Public) {
                    Visibility::Public => store.publish(path)?,
                    Visibility::Draft => store.update_node(
                        path,
                        NodeUpdate {
                            visibility: Some(Visibility::Draft),
                            ..Default::default()
                        },
                    )?,
                };
                Ok(serde_json::json!({ "path": node.id, "visibility": node.visibility }))
            }

            "clockchain_add_edge" => {
                let input: EdgeInput = parse_args(&args)?;
                let kind: EdgeType = input.kind.parse()?;
                let mut edge = Edge::new(input.source, input.target, kind);
                if let Some(weight) = input.weight {
                    edge = edge.with_weight(weight);
                }
                if let Some(theme) = input.theme {
                    edge = edge.with_theme(theme);
                }
                let created = store.add_edge(edge.clone())?;
                Ok(serde_json::json!({ "created": created, "edge": to_json(&edge)? }))
            }

            "clockchain_neighbors" => {
                let path = required_str(&args, "path")?;
                to_json(&store.neighbors(path)?)
            }

            "clockchain_browse" => {
                let prefix = optional_str(&args, "prefix").unwrap_or("/");
                to_json(&store.browse(prefix)?)
            }

            "clockchain_search" => {
                let query = required_str(&args, "query")?;
                let limit = args
                    .get("limit")
                    .and_then(|v| v.as_u64())
                    .map(|v| v as usize)
                    .unwrap_or(20);
                let config = SearchConfig::default().with_limit(limit);
                to_json(&store.search(query, &config))
            }

            "clockchain_today" => {
                let now = Utc::now();
                let month = optional_u8(&args, "month")?.unwrap_or(now.month() as u8);
                let day = optional_u8(&args, "day")?.unwrap_or(now.day() as u8);
                let summaries: Vec<_> = store
                    .today_in_history(month, day)
                    .iter()
                    .map(|n| n.summary())
                    .collect();
                to_json(&summaries)
            }

            "clockchain_random" => match store.random_public() {
                Some(node) => to_json(&node),
                None => Err(GraphError::not_found("no public moments available").into()),
            },

            "clockchain_stats" => {
                let mut stats = to_json(&store.stats())?;
                if let (Some(expander), Some(obj)) =
                    (self.backend.expander_opt(), stats.as_object_mut())
                {
                    obj.insert(
                        "expansion".to_string(),
                        serde_json::json!({
                            "phase": expander.phase(),
                            "last_run": expander.last_run(),
                        }),
                    );
                }
                Ok(stats)
            }

            "clockchain_generate" => {
                let jobs = self.backend.jobs()?;
                let mut params = JobParams::new(required_str(&args, "query")?)
                    .with_preset(optional_str(&args, "preset").unwrap_or(DEFAULT_PRESET));
                if let Some(visibility) = visibility_arg(&args)? {
                    params = params.with_visibility(visibility);
                }
                if let Some(caller) = optional_str(&args, "caller") {
                    params = params.requested_by(caller);
                }
                let job_id = jobs.submit_moderated(None, params).await?;
                Ok(serde_json::json!({ "job_id": job_id, "status": "queued" }))
            }

            "clockchain_submit_job" => {
                let jobs = self.backend.jobs()?;
                let path = required_str(&args, "path")?;
                let caller = optional_str(&args, "caller");
                let node = store.get_node(path)?;
                if !node.is_visible_to(caller) {
                    return Err(GraphError::not_found(path).into());
                }
                let query = optional_str(&args, "query")
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{} ({})", node.name, node.year));
                let mut params = JobParams::new(query)
                    .with_preset(optional_str(&args, "preset").unwrap_or(DEFAULT_PRESET))
                    .with_visibility(node.visibility);
                if let Some(caller) = caller {
                    params = params.requested_by(caller);
                }
                let job_id = jobs.submit_moderated(Some(path), params).await?;
                Ok(serde_json::json!({ "job_id": job_id, "status": "queued" }))
            }

            "clockchain_bulk_generate" => {
                self.backend.check_admin(optional_str(&args, "admin_key"))?;
                let jobs = self.backend.jobs()?;
                let queries: Vec<BulkQuery> = match args.get("queries") {
                    Some(v) => parse_args(v)?,
                    None => return Err(ServerError::invalid_input("Missing 'queries' parameter")),
                };
                if queries.is_empty() {
                    return Err(ServerError::invalid_input("'queries' must not be empty"));
                }

                let mut results = Vec::with_capacity(queries.len());
                for entry in queries {
                    let mut params = JobParams::new(entry.query.clone())
                        .with_preset(entry.preset.as_deref().unwrap_or(DEFAULT_PRESET));
                    if let Some(visibility) = entry.visibility {
                        params = params.with_visibility(visibility);
                    }
                    // Each query stands alone; one rejection does not sink the batch
                    match jobs.submit_moderated(None, params).await {
                        Ok(job_id) => results.push(serde_json::json!({
                            "query": entry.query,
                            "job_id": job_id,
                            "status": "queued",
                        })),
                        Err(e) => {
                            tracing::info!("Bulk query '{}' not submitted: {}", entry.query, e);
                            results.push(serde_json::json!({
                                "query": entry.query,
                                "error": e.to_string(),
                            }))
                        }
                    }
                }
                Ok(Value::Array(results))
            }

            "clockchain_index_moment" => {
                let caller = optional_str(&args, "caller");
                let render_id = required_str(&args, "render_id")?;
                let mut input: NodeInput = parse_args(&args)?;
                input.attrs.content = Some(ContentRef {
                    render_id: render_id.to_string(),
                    slug: optional_str(&args, "render_slug").unwrap_or_default().to_string(),
                    share_url: optional_str(&args, "share_url").unwrap_or_default().to_string(),
                });
                input.attrs.layer = Some(Layer::Rendered);
                if input.attrs.created_by.is_none() {
                    input.attrs.created_by = Some(caller.unwrap_or("system").to_string());
                }

                let draft = input.into_draft()?;
                ensure_writable(store, &draft.id()?, caller)?;
                let outcome = store.add_node(draft)?;
                Ok(serde_json::json!({
                    "path": outcome.id,
                    "status": "indexed",
                    "created": outcome.created,
                }))
            }

            "clockchain_get_job" => {
                let job_id = required_str(&args, "job_id")?;
                to_json(&self.backend.jobs()?.get(job_id)?)
            }

            "clockchain_expand" => {
                let outcome = self.backend.expander()?.run_once().await;
                to_json(&outcome)
            }

            _ => Err(ServerError::invalid_input(format!("Unknown tool: {}", name))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExpansionConfig, JobConfig};
    use crate::error::NOT_FOUND_CODE;
    use crate::expander::GraphExpander;
    use crate::jobs::tests::FakeRenderer;
    use crate::jobs::JobManager;
    use crate::error::FORBIDDEN_CODE;
    use crate::providers::{
        Candidate, Moderation, ModerationProvider, ProviderError, ProviderResult,
        SuggestionProvider, Verdict,
    };
    use async_trait::async_trait;
    use clockchain_graph::Node;
    use std::time::Duration;
    use tempfile::TempDir;

    const APOLLO: &str = "/1969/july/20/2056/united-states/florida/cape-canaveral/apollo-11";

    struct DownSuggestions;

    #[async_trait]
    impl SuggestionProvider for DownSuggestions {
        async fn suggest(&self, _node: &Node) -> ProviderResult<Vec<Candidate>> {
            Err(ProviderError::Timeout)
        }
    }

    /// Rejects any query mentioning "massacre"
    struct KeywordModeration;

    #[async_trait]
    impl ModerationProvider for KeywordModeration {
        async fn classify(&self, query: &str) -> ProviderResult<Moderation> {
            let verdict = if query.contains("massacre") {
                Verdict::Reject
            } else {
                Verdict::Approve
            };
            Ok(Moderation {
                verdict,
                reason: "keyword".into(),
            })
        }
    }

    fn server() -> (TempDir, McpServer) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(GraphStore::open(dir.path()).unwrap());
        let jobs = Arc::new(
            JobManager::new(
                store.clone(),
                Arc::new(FakeRenderer::ok()),
                JobConfig::default(),
            )
            .with_moderation(Arc::new(KeywordModeration)),
        );
        let expander = Arc::new(GraphExpander::new(
            store.clone(),
            Arc::new(DownSuggestions),
            ExpansionConfig::default(),
            Duration::from_secs(1),
        ));
        let backend = Backend::new(store)
            .with_jobs(jobs)
            .with_expander(expander)
            .with_admin_key("admin-secret");
        (dir, McpServer::new(Arc::new(backend)))
    }

    fn request(id: i64, method: &str, params: Value) -> JsonRpcRequest {
        serde_json::from_value(serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        }))
        .unwrap()
    }

    async fn call(server: &mut McpServer, tool: &str, args: Value) -> JsonRpcResponse {
        server
            .handle_request(request(
                1,
                "tools/call",
                serde_json::json!({"name": tool, "arguments": args}),
            ))
            .await
            .unwrap()
    }

    /// Parsed JSON payload of a successful tool call
    fn payload(response: &JsonRpcResponse) -> Value {
        let result = response.result.as_ref().expect("tool call succeeded");
        let text = result["content"][0]["text"].as_str().unwrap();
        serde_json::from_str(text).unwrap()
    }

    fn error_code(response: &JsonRpcResponse) -> i32 {
        response.error.as_ref().expect("tool call failed").code
    }

    async fn create_draft(server: &mut McpServer) {
        let response = call(
            server,
            "clockchain_create_node",
            serde_json::json!({
                "path": APOLLO,
                "name": "Apollo 11 Moon Landing",
                "tags": ["space"],
                "caller": "user-1",
            }),
        )
        .await;
        assert!(response.error.is_none());
    }

    #[tokio::test]
    async fn test_initialize_and_tools_list() {
        let (_dir, mut server) = server();
        let response = server
            .handle_request(request(1, "initialize", serde_json::json!({})))
            .await
            .unwrap();
        let result = response.result.unwrap();
        assert_eq!(result["serverInfo"]["name"], "clockchain");
        assert!(server.initialized);

        let response = server
            .handle_request(request(2, "tools/list", Value::Null))
            .await
            .unwrap();
        assert_eq!(response.result.unwrap()["tools"].as_array().unwrap().len(), 17);
    }

    #[tokio::test]
    async fn test_notification_gets_no_response() {
        let (_dir, mut server) = server();
        let notification: JsonRpcRequest = serde_json::from_value(serde_json::json!({
            "jsonrpc": "2.0",
            "method": "notifications/initialized",
        }))
        .unwrap();
        assert!(server.handle_request(notification).await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let (_dir, mut server) = server();
        let response = server
            .handle_request(request(1, "resources/list", Value::Null))
            .await
            .unwrap();
        assert_eq!(error_code(&response), -32601);
    }

    #[tokio::test]
    async fn test_draft_visible_only_to_creator() {
        let (_dir, mut server) = server();
        create_draft(&mut server).await;

        let anonymous = call(&mut server, "clockchain_get_node", serde_json::json!({"path": APOLLO})).await;
        assert_eq!(error_code(&anonymous), NOT_FOUND_CODE);

        let other = call(
            &mut server,
            "clockchain_get_node",
            serde_json::json!({"path": APOLLO, "caller": "user-2"}),
        )
        .await;
        assert_eq!(error_code(&other), NOT_FOUND_CODE);

        let owner = call(
            &mut server,
            "clockchain_get_node",
            serde_json::json!({"path": APOLLO, "caller": "user-1"}),
        )
        .await;
        assert_eq!(payload(&owner)["name"], "Apollo 11 Moon Landing");

        call(&mut server, "clockchain_publish", serde_json::json!({"path": APOLLO})).await;
        let anonymous = call(&mut server, "clockchain_get_node", serde_json::json!({"path": APOLLO})).await;
        assert_eq!(payload(&anonymous)["visibility"], "public");
    }

    #[tokio::test]
    async fn test_create_cannot_merge_into_someone_elses_draft() {
        let (_dir, mut server) = server();
        create_draft(&mut server).await;

        for caller in [Some("user-2"), None] {
            let mut args = serde_json::json!({
                "path": APOLLO,
                "name": "Hijacked",
                "tags": ["stolen"],
            });
            if let Some(caller) = caller {
                args["caller"] = caller.into();
            }
            let response = call(&mut server, "clockchain_create_node", args).await;
            assert_eq!(error_code(&response), NOT_FOUND_CODE);
            assert!(response.result.is_none());
        }

        let owner = call(
            &mut server,
            "clockchain_get_node",
            serde_json::json!({"path": APOLLO, "caller": "user-1"}),
        )
        .await;
        let node = payload(&owner);
        assert_eq!(node["name"], "Apollo 11 Moon Landing");
        assert_eq!(node["tags"], serde_json::json!(["space"]));

        // The creator can still merge into their own draft
        let merged = call(
            &mut server,
            "clockchain_create_node",
            serde_json::json!({"path": APOLLO, "era": "space-age", "caller": "user-1"}),
        )
        .await;
        assert_eq!(payload(&merged)["outcome"]["created"], false);
    }

    #[tokio::test]
    async fn test_publish_can_return_to_draft() {
        let (_dir, mut server) = server();
        create_draft(&mut server).await;

        let published = call(&mut server, "clockchain_publish", serde_json::json!({"path": APOLLO})).await;
        assert_eq!(payload(&published)["visibility"], "public");

        let hidden = call(
            &mut server,
            "clockchain_publish",
            serde_json::json!({"path": APOLLO, "visibility": "draft"}),
        )
        .await;
        assert_eq!(payload(&hidden)["visibility"], "draft");

        let anonymous = call(&mut server, "clockchain_get_node", serde_json::json!({"path": APOLLO})).await;
        assert_eq!(error_code(&anonymous), NOT_FOUND_CODE);

        let bogus = call(
            &mut server,
            "clockchain_publish",
            serde_json::json!({"path": APOLLO, "visibility": "secret"}),
        )
        .await;
        assert_eq!(error_code(&bogus), -32602);
    }

    #[tokio::test]
    async fn test_bulk_generate_is_admin_gated_and_screens_each_query() {
        let (_dir, mut server) = server();
        let queries = serde_json::json!([
            {"query": "Fall of Constantinople (1453)"},
            {"query": "Glencoe massacre (1692)"},
            {"query": "Moon landing (1969)", "preset": "hd", "visibility": "public"},
        ]);

        let denied = call(
            &mut server,
            "clockchain_bulk_generate",
            serde_json::json!({"queries": queries, "admin_key": "guess"}),
        )
        .await;
        assert_eq!(error_code(&denied), FORBIDDEN_CODE);

        let accepted = call(
            &mut server,
            "clockchain_bulk_generate",
            serde_json::json!({"queries": queries, "admin_key": "admin-secret"}),
        )
        .await;
        let results = payload(&accepted);
        let results = results.as_array().unwrap();
        assert_eq!(results.len(), 3);
        assert!(results[0]["job_id"].is_string());
        assert!(results[1]["job_id"].is_null());
        assert!(results[1]["error"].as_str().unwrap().contains("moderation"));

        let job_id = results[2]["job_id"].as_str().unwrap();
        let polled = call(&mut server, "clockchain_get_job", serde_json::json!({"job_id": job_id})).await;
        let job = payload(&polled);
        assert_eq!(job["params"]["preset"], "hd");
        assert_eq!(job["params"]["visibility"], "public");

        let empty = call(
            &mut server,
            "clockchain_bulk_generate",
            serde_json::json!({"queries": [], "admin_key": "admin-secret"}),
        )
        .await;
        assert_eq!(error_code(&empty), -32602);
    }

    #[tokio::test]
    async fn test_index_moment_registers_rendered_node() {
        let (_dir, mut server) = server();
        let indexed = call(
            &mut server,
            "clockchain_index_moment",
            serde_json::json!({
                "path": APOLLO,
                "name": "Apollo 11 Moon Landing",
                "render_id": "tp-42",
                "share_url": "https://example.org/m/tp-42",
                "visibility": "public",
            }),
        )
        .await;
        let body = payload(&indexed);
        assert_eq!(body["status"], "indexed");
        assert_eq!(body["created"], true);

        let fetched = call(&mut server, "clockchain_get_node", serde_json::json!({"path": APOLLO})).await;
        let node = payload(&fetched);
        assert_eq!(node["layer"], 2);
        assert_eq!(node["content"]["render_id"], "tp-42");
        assert_eq!(node["created_by"], "system");

        let missing = call(
            &mut server,
            "clockchain_index_moment",
            serde_json::json!({"path": APOLLO, "name": "No render"}),
        )
        .await;
        assert_eq!(error_code(&missing), -32602);
    }

    #[tokio::test]
    async fn test_error_classes_map_to_codes() {
        let (_dir, mut server) = server();

        let invalid = call(
            &mut server,
            "clockchain_create_node",
            serde_json::json!({"path": "/1969/July/20", "name": "Bad"}),
        )
        .await;
        assert_eq!(error_code(&invalid), -32602);

        let missing = call(&mut server, "clockchain_get_job", serde_json::json!({"job_id": "nope"})).await;
        assert_eq!(error_code(&missing), NOT_FOUND_CODE);

        create_draft(&mut server).await;
        let down = call(&mut server, "clockchain_expand", serde_json::json!({})).await;
        // Provider failures abandon the cycle rather than failing the call
        assert_eq!(payload(&down)["outcome"], "abandoned");

        let bad_edge = call(
            &mut server,
            "clockchain_add_edge",
            serde_json::json!({"source": APOLLO, "target": "/1/january/1/1200/a/b/c/d", "type": "causes"}),
        )
        .await;
        assert_eq!(error_code(&bad_edge), -32602);
    }

    #[tokio::test]
    async fn test_search_browse_and_stats() {
        let (_dir, mut server) = server();
        create_draft(&mut server).await;
        call(&mut server, "clockchain_publish", serde_json::json!({"path": APOLLO})).await;

        let hits = call(&mut server, "clockchain_search", serde_json::json!({"query": "moon"})).await;
        assert_eq!(payload(&hits)[0]["path"], APOLLO);

        let browse = call(&mut server, "clockchain_browse", serde_json::json!({"prefix": "/1969"})).await;
        assert_eq!(payload(&browse)[0]["segment"], "july");

        let stats = call(&mut server, "clockchain_stats", serde_json::json!({})).await;
        let stats = payload(&stats);
        assert_eq!(stats["total_nodes"], 1);
        assert_eq!(stats["expansion"]["phase"], "idle");

        let today = call(
            &mut server,
            "clockchain_today",
            serde_json::json!({"month": 7, "day": 20}),
        )
        .await;
        assert_eq!(payload(&today).as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_submit_and_poll_job() {
        let (_dir, mut server) = server();
        create_draft(&mut server).await;

        let submitted = call(
            &mut server,
            "clockchain_submit_job",
            serde_json::json!({"path": APOLLO, "caller": "user-1"}),
        )
        .await;
        let job_id = payload(&submitted)["job_id"].as_str().unwrap().to_string();

        let mut status = String::new();
        for _ in 0..200 {
            let polled = call(&mut server, "clockchain_get_job", serde_json::json!({"job_id": job_id})).await;
            let job = payload(&polled);
            assert_eq!(job["params"]["query"], "Apollo 11 Moon Landing (1969)");
            status = job["status"].as_str().unwrap().to_string();
            if status == "succeeded" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(status, "succeeded");
    }

    #[tokio::test]
    async fn test_serve_over_line_transport() {
        let (_dir, mut server) = server();
        let input = b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\ngarbage\n{\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\"}\n";
        let mut transport = AsyncLineTransport::new(&input[..], Vec::new());

        server.serve(&mut transport).await.unwrap();

        let out = String::from_utf8(transport.into_writer()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"result\""));
        assert!(lines[1].contains("-32700"));
    }
}
