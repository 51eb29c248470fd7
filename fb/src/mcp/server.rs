//! McpServer - newline-delimited JSON-RPC over a byte stream
//!
//! The read loop never waits on the host: each `tools/call` runs in its own
//! task and queues on the dispatcher, and every response goes through one
//! writer task so lines never interleave on stdout.

use eyre::{Context, Result};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{Mutex, mpsc};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use super::messages::{
    JSONRPC_VERSION, JsonRpcError, JsonRpcRequest, JsonRpcResponse, PROTOCOL_VERSION, SERVER_NAME, SERVER_VERSION,
    codes, text_content,
};
use crate::catalog::ToolCatalog;
use crate::dispatch::ToolInvoker;

type InFlight = Arc<Mutex<HashMap<String, AbortHandle>>>;

/// MCP server in front of a [`ToolInvoker`]
#[derive(Clone)]
pub struct McpServer {
    invoker: Arc<dyn ToolInvoker>,
    catalog: Arc<ToolCatalog>,
    in_flight: InFlight,
}

impl McpServer {
    pub fn new(invoker: Arc<dyn ToolInvoker>, catalog: Arc<ToolCatalog>) -> Self {
        Self {
            invoker,
            catalog,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Serve on the process's stdin/stdout until stdin closes
    pub async fn serve_stdio(&self) -> Result<()> {
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Serve until `reader` reaches EOF and every started call has answered
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        info!("MCP server started");
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let writer_task = tokio::spawn(write_loop(writer, out_rx));

        let mut lines = BufReader::new(reader).lines();
        while let Some(line) = lines.next_line().await.context("Failed to read from input")? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let request: JsonRpcRequest = match serde_json::from_str(line) {
                Ok(req) => req,
                Err(e) => {
                    warn!(error = %e, "Skipping unparseable message");
                    continue;
                }
            };
            self.handle(request, &out_tx).await;
        }

        info!("Input closed, waiting for in-flight calls");
        drop(out_tx);
        writer_task.await.context("Response writer panicked")??;
        info!("MCP server stopped");
        Ok(())
    }

    async fn handle(&self, request: JsonRpcRequest, out: &mpsc::UnboundedSender<JsonRpcResponse>) {
        debug!(method = %request.method, id = ?request.id, "McpServer::handle: called");

        if request.jsonrpc.as_deref().is_some_and(|v| v != JSONRPC_VERSION) {
            if let Some(id) = request.id {
                let error = JsonRpcError::new(codes::INVALID_REQUEST, "Unsupported jsonrpc version");
                let _ = out.send(JsonRpcResponse::failure(id, error));
            }
            return;
        }

        let reply = |result: Value| {
            if let Some(id) = request.id.clone() {
                let _ = out.send(JsonRpcResponse::success(id, result));
            }
        };

        let method = request.method.clone();
        match method.as_str() {
            "initialize" => reply(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": { "name": SERVER_NAME, "version": SERVER_VERSION },
            })),

            "notifications/initialized" => {}

            "ping" => reply(json!({})),

            "tools/list" => reply(json!({ "tools": self.catalog.descriptors() })),

            "tools/call" => self.start_call(request, out.clone()).await,

            "notifications/cancelled" => self.cancel(&request.params).await,

            method => {
                if let Some(id) = request.id {
                    debug!(%method, "McpServer::handle: unknown method");
                    let _ = out.send(JsonRpcResponse::failure(id, JsonRpcError::method_not_found(method)));
                }
            }
        }
    }

    async fn start_call(&self, request: JsonRpcRequest, out: mpsc::UnboundedSender<JsonRpcResponse>) {
        let Some(id) = request.id else {
            warn!("Ignoring tools/call sent as a notification");
            return;
        };

        let Some(name) = request.params.get("name").and_then(Value::as_str).map(str::to_string) else {
            let _ = out.send(JsonRpcResponse::failure(id, JsonRpcError::invalid_params("tools/call requires a tool name")));
            return;
        };
        if !self.catalog.contains(&name) {
            let error = JsonRpcError::invalid_params(format!("Unknown tool: {}", name));
            let _ = out.send(JsonRpcResponse::failure(id, error));
            return;
        }

        let mut args = match request.params.get("arguments") {
            None | Some(Value::Null) => json!({}),
            Some(v @ Value::Object(_)) => v.clone(),
            Some(_) => {
                let error = JsonRpcError::invalid_params("tools/call arguments must be an object");
                let _ = out.send(JsonRpcResponse::failure(id, error));
                return;
            }
        };
        self.catalog.normalize_arguments(&name, &mut args);

        let key = request_key(&id);
        info!(tool = %name, request = %key, "Tool call received");

        let invoker = self.invoker.clone();
        let in_flight = self.in_flight.clone();
        let task_key = key.clone();

        // hold the lock across spawn + insert so the task cannot deregister first
        let mut calls = self.in_flight.lock().await;
        let task = tokio::spawn(async move {
            let response = match invoker.invoke(&name, args).await {
                Ok(result) => JsonRpcResponse::success(id, text_content(result.render_text())),
                Err(e) => JsonRpcResponse::failure(id, JsonRpcError::from_dispatch(&name, &e)),
            };
            let _ = out.send(response);
            in_flight.lock().await.remove(&task_key);
        });
        calls.insert(key, task.abort_handle());
    }

    async fn cancel(&self, params: &Value) {
        let Some(request_id) = params.get("requestId") else {
            return;
        };
        let key = request_key(request_id);
        match self.in_flight.lock().await.remove(&key) {
            Some(handle) => {
                info!(request = %key, "Cancelling tool call");
                handle.abort();
            }
            None => debug!(request = %key, "McpServer::cancel: no such call in flight"),
        }
    }

    /// Number of tool calls still running
    pub async fn in_flight(&self) -> usize {
        self.in_flight.lock().await.len()
    }
}

/// JSON-RPC ids may be numbers or strings; key on the serialized form
fn request_key(id: &Value) -> String {
    id.to_string()
}

async fn write_loop<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<JsonRpcResponse>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    debug!("write_loop: called");
    while let Some(response) = rx.recv().await {
        let mut line = serde_json::to_string(&response).context("Failed to serialize response")?;
        line.push('\n');
        writer.write_all(line.as_bytes()).await.context("Failed to write response")?;
        writer.flush().await.context("Failed to flush response")?;
    }
    debug!("write_loop: exited");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{DispatchError, DispatchResponse, DispatchResult};
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

    /// Answers from the tool name alone
    struct ScriptedInvoker;

    #[async_trait]
    impl ToolInvoker for ScriptedInvoker {
        async fn invoke(&self, name: &str, args: Value) -> DispatchResponse {
            match name {
                "hide_body" => Ok(DispatchResult::new(name, Value::Null)),
                "get_body_center" => Ok(DispatchResult::new(name, json!({"args": args}))),
                "create_box" => Err(DispatchError::RemoteExecution {
                    message: "boom".to_string(),
                    traceback: None,
                }),
                _ => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(DispatchResult::new(name, Value::Null))
                }
            }
        }
    }

    struct Client {
        input: DuplexStream,
        output: tokio::io::Lines<BufReader<DuplexStream>>,
    }

    impl Client {
        async fn send(&mut self, msg: Value) {
            let mut line = msg.to_string();
            line.push('\n');
            self.input.write_all(line.as_bytes()).await.unwrap();
        }

        async fn recv(&mut self) -> Value {
            let line = tokio::time::timeout(Duration::from_secs(5), self.output.next_line())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            serde_json::from_str(&line).unwrap()
        }
    }

    fn start() -> (McpServer, Client) {
        let catalog = Arc::new(ToolCatalog::embedded().unwrap());
        let server = McpServer::new(Arc::new(ScriptedInvoker), catalog);
        let (client_in, server_in) = tokio::io::duplex(64 * 1024);
        let (server_out, client_out) = tokio::io::duplex(64 * 1024);

        let running = server.clone();
        tokio::spawn(async move { running.serve(server_in, server_out).await });

        let client = Client {
            input: client_in,
            output: BufReader::new(client_out).lines(),
        };
        (server, client)
    }

    #[tokio::test]
    async fn test_initialize_and_ping() {
        let (_server, mut client) = start();

        client
            .send(json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}))
            .await;
        let resp = client.recv().await;
        assert_eq!(resp["id"], json!(1));
        assert_eq!(resp["result"]["protocolVersion"], json!(PROTOCOL_VERSION));
        assert!(resp["result"]["capabilities"]["tools"].is_object());

        client.send(json!({"jsonrpc": "2.0", "method": "notifications/initialized"})).await;
        client.send(json!({"jsonrpc": "2.0", "id": 2, "method": "ping"})).await;
        let resp = client.recv().await;
        assert_eq!(resp["id"], json!(2));
        assert_eq!(resp["result"], json!({}));
    }

    #[tokio::test]
    async fn test_tools_list() {
        let (_server, mut client) = start();
        client.send(json!({"jsonrpc": "2.0", "id": "a", "method": "tools/list"})).await;

        let resp = client.recv().await;
        let tools = resp["result"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 37);
        assert!(tools.iter().any(|t| t["name"] == "execute_macro"));
        assert!(tools.iter().all(|t| t["inputSchema"].is_object()));
    }

    #[tokio::test]
    async fn test_tools_call_success_text() {
        let (_server, mut client) = start();
        client
            .send(json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call",
                "params": {"name": "hide_body", "arguments": {"body_name": "b"}}}))
            .await;

        let resp = client.recv().await;
        assert_eq!(
            resp["result"]["content"][0],
            json!({"type": "text", "text": "Fusion 360 command 'hide_body' executed successfully."})
        );
    }

    #[tokio::test]
    async fn test_tools_call_renders_result_block() {
        let (_server, mut client) = start();
        client
            .send(json!({"jsonrpc": "2.0", "id": 4, "method": "tools/call",
                "params": {"name": "get_body_center", "arguments": {"body_name": "b"}}}))
            .await;

        let resp = client.recv().await;
        let text = resp["result"]["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("**Result:**"));
        assert!(text.contains("\"body_name\": \"b\""));
    }

    #[tokio::test]
    async fn test_tools_call_remote_error() {
        let (_server, mut client) = start();
        client
            .send(json!({"jsonrpc": "2.0", "id": 5, "method": "tools/call", "params": {"name": "create_box"}}))
            .await;

        let resp = client.recv().await;
        assert_eq!(resp["error"]["code"], json!(codes::INTERNAL_ERROR));
        assert_eq!(
            resp["error"]["message"],
            json!("Fusion 360 Error for 'create_box': boom\n\nTraceback:\nN/A")
        );
        assert_eq!(resp["error"]["data"]["kind"], json!("remote_execution_error"));
    }

    #[tokio::test]
    async fn test_tools_call_unknown_tool() {
        let (_server, mut client) = start();
        client
            .send(json!({"jsonrpc": "2.0", "id": 6, "method": "tools/call", "params": {"name": "make_coffee"}}))
            .await;

        let resp = client.recv().await;
        assert_eq!(resp["error"]["code"], json!(codes::INVALID_PARAMS));
    }

    #[tokio::test]
    async fn test_unknown_method_and_garbage() {
        let (_server, mut client) = start();
        client.input.write_all(b"this is not json\n").await.unwrap();
        client.send(json!({"jsonrpc": "2.0", "method": "notifications/whatever"})).await;
        client.send(json!({"jsonrpc": "2.0", "id": 7, "method": "resources/list"})).await;

        let resp = client.recv().await;
        assert_eq!(resp["id"], json!(7));
        assert_eq!(resp["error"]["code"], json!(codes::METHOD_NOT_FOUND));
    }

    #[tokio::test]
    async fn test_slow_call_does_not_block_reads_and_can_be_cancelled() {
        let (server, mut client) = start();
        client
            .send(json!({"jsonrpc": "2.0", "id": 8, "method": "tools/call", "params": {"name": "select_all_bodies"}}))
            .await;
        client.send(json!({"jsonrpc": "2.0", "id": 9, "method": "ping"})).await;

        let resp = client.recv().await;
        assert_eq!(resp["id"], json!(9));
        assert_eq!(server.in_flight().await, 1);

        client
            .send(json!({"jsonrpc": "2.0", "method": "notifications/cancelled", "params": {"requestId": 8}}))
            .await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(server.in_flight().await, 0);
    }
}
