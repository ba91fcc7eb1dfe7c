//! The per-server LSP runtime.
//!
//! See the module-level documentation in [`super`] for the architecture.
//! [`LspHandle`] is the cheap-to-clone synchronous side used by the editor
//! and by buffer-event listeners; the tokio task spawned by
//! [`LspRuntime::spawn`] owns the child process and all pipe I/O.

use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use lsp_types::ServerCapabilities;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::config::LspServerConfig;
use crate::model::buffer::{Buffer, BufferId};
use crate::model::event::TextRange;
use crate::services::lsp::jsonrpc::{self, Incoming, Notification, Request, Response, ResponseError};
use crate::services::lsp::transport::{self, FrameScanner};

#[derive(Debug, Error)]
pub enum LspError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode or decode a message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("server closed the stream")]
    StreamClosed,
    #[error("language server is shut down")]
    Shut,
    #[error("invalid uri: {0}")]
    InvalidUri(String),
    #[error("server error {code}: {message}")]
    Server { code: i64, message: String },
}

/// Where a response should be delivered once it arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyTarget {
    Editor,
    Buffer(BufferId),
}

/// A message surfaced to the main loop by the reader task.
#[derive(Debug)]
pub enum Inbound {
    /// The `initialize` handshake completed.
    Initialized {
        capabilities: Box<ServerCapabilities>,
    },
    Response {
        method: String,
        target: ReplyTarget,
        result: Result<Value, ResponseError>,
    },
    Notification {
        method: String,
        params: Value,
    },
    /// The server exited or its stream broke.
    Exited,
}

#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub id: i64,
    pub method: String,
    pub target: ReplyTarget,
}

/// Slot-reusing pending-request table: a new request takes the first free
/// slot or appends; lookup is linear by id (the table stays small).
#[derive(Debug, Default)]
pub struct RequestTable {
    slots: Vec<Option<PendingRequest>>,
}

impl RequestTable {
    pub fn insert(&mut self, request: PendingRequest) {
        if let Some(slot) = self.slots.iter_mut().find(|slot| slot.is_none()) {
            *slot = Some(request);
        } else {
            self.slots.push(Some(request));
        }
    }

    pub fn take(&mut self, id: i64) -> Option<PendingRequest> {
        self.slots
            .iter_mut()
            .find(|slot| slot.as_ref().map_or(false, |r| r.id == id))
            .and_then(Option::take)
    }

    pub fn pending(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn capacity_slots(&self) -> usize {
        self.slots.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialised,
    Starting,
    Ready,
    Shut,
}

/// The one-shot initialization barrier plus the capabilities cache.
#[derive(Debug)]
struct InitState {
    phase: Mutex<Phase>,
    cond: Condvar,
    capabilities: Mutex<Option<ServerCapabilities>>,
}

impl InitState {
    fn new() -> Self {
        Self {
            phase: Mutex::new(Phase::Uninitialised),
            cond: Condvar::new(),
            capabilities: Mutex::new(None),
        }
    }

    fn phase(&self) -> Phase {
        *self.phase.lock().expect("init state poisoned")
    }

    fn set_ready(&self, capabilities: ServerCapabilities) {
        *self.capabilities.lock().expect("init state poisoned") = Some(capabilities);
        *self.phase.lock().expect("init state poisoned") = Phase::Ready;
        self.cond.notify_all();
    }

    fn shut(&self) {
        *self.phase.lock().expect("init state poisoned") = Phase::Shut;
        self.cond.notify_all();
    }
}

struct HandleInner {
    server: String,
    state: InitState,
    requests: Mutex<RequestTable>,
    outgoing: UnboundedSender<Vec<u8>>,
    next_id: AtomicI64,
    root_uri: String,
    initialization_options: Option<Value>,
}

/// The synchronous side of a language-server connection. Clones share the
/// connection; buffer-event listeners hold one.
#[derive(Clone)]
pub struct LspHandle {
    inner: Arc<HandleInner>,
}

fn parse_uri(s: &str) -> Result<lsp_types::Uri, LspError> {
    s.parse()
        .map_err(|_| LspError::InvalidUri(s.to_string()))
}

fn frame_of<T: Serialize>(message: &T) -> Vec<u8> {
    let value = serde_json::to_value(message).unwrap_or(Value::Null);
    transport::encode_frame(&value)
}

impl LspHandle {
    pub fn server(&self) -> &str {
        &self.inner.server
    }

    pub fn phase(&self) -> Phase {
        self.inner.state.phase()
    }

    pub fn capabilities(&self) -> Option<ServerCapabilities> {
        self.inner
            .state
            .capabilities
            .lock()
            .expect("init state poisoned")
            .clone()
    }

    pub fn pending_requests(&self) -> usize {
        self.inner.requests.lock().expect("request table poisoned").pending()
    }

    /// Block until the server finished the `initialize` handshake.
    ///
    /// Idempotent: exactly one `initialize` request is ever sent per runtime
    /// lifetime. The caller that finds the runtime `Uninitialised` sends it;
    /// concurrent callers wait on the barrier and wake together when the
    /// response arrives.
    pub fn ensure_initialized(&self) -> Result<(), LspError> {
        let mut phase = self.inner.state.phase.lock().expect("init state poisoned");
        loop {
            match *phase {
                Phase::Ready => return Ok(()),
                Phase::Shut => return Err(LspError::Shut),
                Phase::Starting => {
                    phase = self
                        .inner
                        .state
                        .cond
                        .wait(phase)
                        .expect("init state poisoned");
                }
                Phase::Uninitialised => {
                    *phase = Phase::Starting;
                    drop(phase);
                    tracing::info!(server = %self.inner.server, "initializing language server");
                    if let Err(err) =
                        self.send_request_raw("initialize", self.initialize_params(), ReplyTarget::Editor)
                    {
                        self.inner.state.shut();
                        return Err(err);
                    }
                    phase = self.inner.state.phase.lock().expect("init state poisoned");
                }
            }
        }
    }

    // root_uri is deprecated in the protocol but still what servers key on.
    #[allow(deprecated)]
    fn initialize_params(&self) -> Value {
        let capabilities = lsp_types::ClientCapabilities {
            text_document: Some(lsp_types::TextDocumentClientCapabilities {
                synchronization: Some(lsp_types::TextDocumentSyncClientCapabilities {
                    did_save: Some(true),
                    will_save: Some(false),
                    will_save_wait_until: Some(false),
                    ..Default::default()
                }),
                semantic_tokens: Some(lsp_types::SemanticTokensClientCapabilities {
                    requests: lsp_types::SemanticTokensClientCapabilitiesRequests {
                        range: None,
                        full: Some(lsp_types::SemanticTokensFullOptions::Bool(true)),
                    },
                    token_types: vec![
                        lsp_types::SemanticTokenType::COMMENT,
                        lsp_types::SemanticTokenType::KEYWORD,
                        lsp_types::SemanticTokenType::VARIABLE,
                        lsp_types::SemanticTokenType::TYPE,
                        lsp_types::SemanticTokenType::FUNCTION,
                    ],
                    formats: vec![lsp_types::TokenFormat::RELATIVE],
                    multiline_token_support: Some(true),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        };
        let params = lsp_types::InitializeParams {
            process_id: Some(std::process::id()),
            root_uri: parse_uri(&self.inner.root_uri).ok(),
            initialization_options: self.inner.initialization_options.clone(),
            capabilities,
            client_info: Some(lsp_types::ClientInfo {
                name: "eddy".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
            ..Default::default()
        };
        serde_json::to_value(params).unwrap_or(Value::Null)
    }

    fn send_request_raw(
        &self,
        method: &str,
        params: Value,
        target: ReplyTarget,
    ) -> Result<i64, LspError> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .requests
            .lock()
            .expect("request table poisoned")
            .insert(PendingRequest {
                id,
                method: method.to_string(),
                target,
            });
        let request = Request::new(id, method, Some(params));
        tracing::debug!(server = %self.inner.server, %method, id, "==> request");
        self.inner
            .outgoing
            .send(frame_of(&request))
            .map_err(|_| LspError::StreamClosed)?;
        Ok(id)
    }

    fn send_notification_raw(&self, method: &str, params: Value) -> Result<(), LspError> {
        let notification = Notification::new(method, Some(params));
        tracing::debug!(server = %self.inner.server, %method, "==| notification");
        self.inner
            .outgoing
            .send(frame_of(&notification))
            .map_err(|_| LspError::StreamClosed)
    }

    /// Send a request; blocks on `ensure_initialized` first.
    pub fn request(
        &self,
        method: &str,
        params: Value,
        target: ReplyTarget,
    ) -> Result<i64, LspError> {
        self.ensure_initialized()?;
        self.send_request_raw(method, params, target)
    }

    /// Send a notification; blocks on `ensure_initialized` first.
    pub fn notify(&self, method: &str, params: Value) -> Result<(), LspError> {
        self.ensure_initialized()?;
        self.send_notification_raw(method, params)
    }

    /// Best-effort `shutdown`/`exit`; the runtime accepts no further
    /// traffic.
    pub fn shutdown(&self) {
        let already_shut = self.phase() == Phase::Shut;
        self.inner.state.shut();
        if !already_shut {
            let _ = self.send_request_raw("shutdown", Value::Null, ReplyTarget::Editor);
            let _ = self.send_notification_raw("exit", Value::Null);
        }
    }

    // ===== Document synchronization =====

    pub fn did_open(&self, buffer: &Buffer, language_id: &str) -> Result<(), LspError> {
        let Some(uri) = buffer.uri() else {
            return Ok(());
        };
        let params = lsp_types::DidOpenTextDocumentParams {
            text_document: lsp_types::TextDocumentItem {
                uri: parse_uri(uri)?,
                language_id: language_id.to_string(),
                version: 0,
                text: buffer.to_display_string(),
            },
        };
        self.notify("textDocument/didOpen", serde_json::to_value(params)?)
    }

    /// A single range-based content change carrying the buffer's current
    /// version.
    pub fn did_change(
        &self,
        buffer: &Buffer,
        range: TextRange,
        text: &str,
    ) -> Result<(), LspError> {
        let Some(uri) = buffer.uri() else {
            return Ok(());
        };
        let params = lsp_types::DidChangeTextDocumentParams {
            text_document: lsp_types::VersionedTextDocumentIdentifier {
                uri: parse_uri(uri)?,
                version: buffer.version().min(i32::MAX as u64) as i32,
            },
            content_changes: vec![lsp_types::TextDocumentContentChangeEvent {
                range: Some(lsp_types::Range::new(
                    lsp_types::Position::new(range.start.line as u32, range.start.column as u32),
                    lsp_types::Position::new(range.end.line as u32, range.end.column as u32),
                )),
                range_length: None,
                text: text.to_string(),
            }],
        };
        self.notify("textDocument/didChange", serde_json::to_value(params)?)
    }

    pub fn did_save(&self, buffer: &Buffer) -> Result<(), LspError> {
        let Some(uri) = buffer.uri() else {
            return Ok(());
        };
        let params = lsp_types::DidSaveTextDocumentParams {
            text_document: lsp_types::TextDocumentIdentifier {
                uri: parse_uri(uri)?,
            },
            text: Some(buffer.to_display_string()),
        };
        self.notify("textDocument/didSave", serde_json::to_value(params)?)
    }

    pub fn did_close(&self, buffer: &Buffer) -> Result<(), LspError> {
        let Some(uri) = buffer.uri() else {
            return Ok(());
        };
        let params = lsp_types::DidCloseTextDocumentParams {
            text_document: lsp_types::TextDocumentIdentifier {
                uri: parse_uri(uri)?,
            },
        };
        self.notify("textDocument/didClose", serde_json::to_value(params)?)
    }

    /// Request the full semantic-token set; the response is routed to the
    /// buffer's handler.
    pub fn semantic_tokens_full(&self, buffer: &Buffer) -> Result<Option<i64>, LspError> {
        let Some(uri) = buffer.uri() else {
            return Ok(None);
        };
        let params = lsp_types::SemanticTokensParams {
            work_done_progress_params: Default::default(),
            partial_result_params: Default::default(),
            text_document: lsp_types::TextDocumentIdentifier {
                uri: parse_uri(uri)?,
            },
        };
        self.request(
            "textDocument/semanticTokens/full",
            serde_json::to_value(params)?,
            ReplyTarget::Buffer(buffer.id()),
        )
        .map(Some)
    }

    pub fn completion(&self, buffer: &Buffer, line: usize, character: usize) -> Result<Option<i64>, LspError> {
        let Some(uri) = buffer.uri() else {
            return Ok(None);
        };
        let params = json!({
            "textDocument": {"uri": uri},
            "position": {"line": line, "character": character},
        });
        self.request("textDocument/completion", params, ReplyTarget::Editor)
            .map(Some)
    }

    pub fn formatting(&self, buffer: &Buffer) -> Result<Option<i64>, LspError> {
        let Some(uri) = buffer.uri() else {
            return Ok(None);
        };
        let params = json!({
            "textDocument": {"uri": uri},
            "options": {"tabSize": 4, "insertSpaces": true},
        });
        self.request(
            "textDocument/formatting",
            params,
            ReplyTarget::Buffer(buffer.id()),
        )
        .map(Some)
    }

    pub fn range_formatting(
        &self,
        buffer: &Buffer,
        range: TextRange,
    ) -> Result<Option<i64>, LspError> {
        let Some(uri) = buffer.uri() else {
            return Ok(None);
        };
        let params = json!({
            "textDocument": {"uri": uri},
            "range": {
                "start": {"line": range.start.line, "character": range.start.column},
                "end": {"line": range.end.line, "character": range.end.column},
            },
            "options": {"tabSize": 4, "insertSpaces": true},
        });
        self.request(
            "textDocument/rangeFormatting",
            params,
            ReplyTarget::Buffer(buffer.id()),
        )
        .map(Some)
    }
}

/// One language-server connection: the handle plus the submission queue the
/// main loop drains.
pub struct LspRuntime {
    handle: LspHandle,
    incoming: Receiver<Inbound>,
}

impl LspRuntime {
    /// Spawn the server process and its I/O task. The child's stderr goes to
    /// `stderr_log`.
    pub fn spawn(
        runtime: &tokio::runtime::Handle,
        config: &LspServerConfig,
        server: &str,
        root_uri: String,
        stderr_log: &Path,
    ) -> Result<LspRuntime, LspError> {
        let stderr = std::fs::File::create(stderr_log)?;
        let _guard = runtime.enter();
        let mut child = tokio::process::Command::new(&config.command)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true)
            .spawn()?;
        let stdin = child.stdin.take().ok_or(LspError::StreamClosed)?;
        let stdout = child.stdout.take().ok_or(LspError::StreamClosed)?;
        let (out_tx, out_rx) = unbounded_channel();
        let (in_tx, in_rx) = std::sync::mpsc::channel();
        let handle = LspHandle {
            inner: Arc::new(HandleInner {
                server: server.to_string(),
                state: InitState::new(),
                requests: Mutex::new(RequestTable::default()),
                outgoing: out_tx,
                next_id: AtomicI64::new(1),
                root_uri,
                initialization_options: config.initialization_options.clone(),
            }),
        };
        tracing::info!(server, command = %config.command, "spawned language server");
        let _task = runtime.spawn(run_server_task(child, stdin, stdout, out_rx, in_tx, handle.clone()));
        Ok(LspRuntime { handle, incoming: in_rx })
    }

    pub fn handle(&self) -> &LspHandle {
        &self.handle
    }

    pub fn poll(&self) -> Option<Inbound> {
        self.incoming.try_recv().ok()
    }

    pub fn wait(&self, timeout: Duration) -> Option<Inbound> {
        self.incoming.recv_timeout(timeout).ok()
    }

    pub fn shutdown(&self) {
        self.handle.shutdown();
    }
}

/// Dropping the runtime tears the server down the same way an explicit
/// `shutdown` does; the phase guard makes a second teardown a no-op.
impl Drop for LspRuntime {
    fn drop(&mut self) {
        self.handle.shutdown();
    }
}

/// The reader/writer task: one contiguous write per outgoing frame, incoming
/// bytes through the scanner, complete frames dispatched onto the submission
/// queue. Never touches buffer state.
async fn run_server_task(
    mut child: tokio::process::Child,
    mut stdin: tokio::process::ChildStdin,
    mut stdout: tokio::process::ChildStdout,
    mut out_rx: UnboundedReceiver<Vec<u8>>,
    in_tx: Sender<Inbound>,
    handle: LspHandle,
) {
    let server = handle.server().to_string();
    let mut scanner = FrameScanner::new();
    let mut read_buf = vec![0u8; 16 * 1024];
    loop {
        tokio::select! {
            frame = out_rx.recv() => match frame {
                Some(bytes) => {
                    if let Err(err) = stdin.write_all(&bytes).await {
                        tracing::warn!(server = %server, %err, "write to language server failed");
                        break;
                    }
                    let _ = stdin.flush().await;
                }
                None => break,
            },
            read = stdout.read(&mut read_buf) => match read {
                Ok(0) => {
                    tracing::info!(server = %server, "language server closed its stream");
                    break;
                }
                Ok(n) => {
                    scanner.extend(&read_buf[..n]);
                    while let Some(body) = scanner.next_frame() {
                        dispatch(&body, &handle, &in_tx);
                    }
                }
                Err(err) => {
                    tracing::warn!(server = %server, %err, "read from language server failed");
                    break;
                }
            },
        }
    }
    handle.inner.state.shut();
    let _ = in_tx.send(Inbound::Exited);
    let _ = child.kill().await;
}

fn dispatch(bytes: &[u8], handle: &LspHandle, in_tx: &Sender<Inbound>) {
    let server = handle.server();
    let value: Value = match serde_json::from_slice(bytes) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(
                server,
                %err,
                raw = %String::from_utf8_lossy(bytes),
                "dropping undecodable frame"
            );
            return;
        }
    };
    match jsonrpc::classify(&value) {
        Some(Incoming::Response(response)) => {
            let pending = handle
                .inner
                .requests
                .lock()
                .expect("request table poisoned")
                .take(response.id);
            let Some(pending) = pending else {
                tracing::warn!(server, id = response.id, "no request matching response id");
                return;
            };
            tracing::debug!(server, id = response.id, method = %pending.method, "<== response");
            if pending.method == "initialize" {
                handle_initialize_response(response, handle, in_tx);
                return;
            }
            let result = match (response.result, response.error) {
                (_, Some(error)) => Err(error),
                (result, None) => Ok(result.unwrap_or(Value::Null)),
            };
            let _ = in_tx.send(Inbound::Response {
                method: pending.method,
                target: pending.target,
                result,
            });
        }
        Some(Incoming::Notification { method, params }) => {
            tracing::debug!(server, %method, "|== notification");
            let _ = in_tx.send(Inbound::Notification { method, params });
        }
        Some(Incoming::Request { id, method }) => {
            // None of the reverse requests are supported; answer null so the
            // server does not stall.
            tracing::debug!(server, %method, "server request answered with null");
            let reply = json!({"jsonrpc": "2.0", "id": id, "result": null});
            let _ = handle.inner.outgoing.send(transport::encode_frame(&reply));
        }
        None => {
            tracing::warn!(server, "unclassifiable frame dropped");
        }
    }
}

fn handle_initialize_response(response: Response, handle: &LspHandle, in_tx: &Sender<Inbound>) {
    let server = handle.server();
    if let Some(error) = response.error {
        tracing::error!(server, code = error.code, message = %error.message, "initialize failed");
        handle.inner.state.shut();
        let _ = in_tx.send(Inbound::Exited);
        return;
    }
    let result: lsp_types::InitializeResult =
        match serde_json::from_value(response.result.unwrap_or(Value::Null)) {
            Ok(result) => result,
            Err(err) => {
                tracing::error!(server, %err, "could not decode the initialize result");
                handle.inner.state.shut();
                let _ = in_tx.send(Inbound::Exited);
                return;
            }
        };
    if let Some(info) = &result.server_info {
        tracing::info!(
            server,
            name = %info.name,
            version = info.version.as_deref().unwrap_or("?"),
            "language server identified itself"
        );
    }
    let initialized = Notification::new("initialized", Some(json!({})));
    let _ = handle.inner.outgoing.send(frame_of(&initialized));
    handle.inner.state.set_ready(result.capabilities.clone());
    let _ = in_tx.send(Inbound::Initialized {
        capabilities: Box::new(result.capabilities),
    });
}
