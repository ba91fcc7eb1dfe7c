//! The editor context.
//!
//! [`EditorContext`] is the explicit root object threaded through all
//! operations: it owns the buffers, the per-language modes (which own their
//! language-server runtimes), the theme, and the tokio runtime the server
//! tasks run on. It also drains the language servers' submission queues on
//! the main loop and routes responses and notifications to their targets.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Context;
use serde_json::Value;

use crate::config::Config;
use crate::model::buffer::{Buffer, BufferId};
use crate::services::lsp::client::{Inbound, LspHandle, ReplyTarget};
use crate::services::lsp::{diagnostics, semantic_tokens};
use crate::app::mode::Mode;
use crate::theme::Theme;

pub struct EditorContext {
    pub theme: Theme,
    config: Config,
    project_root: PathBuf,
    root_uri: String,
    log_dir: PathBuf,
    buffers: Vec<Option<Buffer>>,
    modes: Vec<Mode>,
    runtime: tokio::runtime::Runtime,
    pub status_message: Option<String>,
    /// Items from the most recent completion response, for the shell to
    /// consume.
    pub completions: Vec<Value>,
}

fn legend_token_types(capabilities: &lsp_types::ServerCapabilities) -> Vec<String> {
    use lsp_types::SemanticTokensServerCapabilities;
    let legend = match &capabilities.semantic_tokens_provider {
        Some(SemanticTokensServerCapabilities::SemanticTokensOptions(options)) => &options.legend,
        Some(SemanticTokensServerCapabilities::SemanticTokensRegistrationOptions(options)) => {
            &options.semantic_tokens_options.legend
        }
        None => return Vec::new(),
    };
    legend
        .token_types
        .iter()
        .map(|token_type| token_type.as_str().to_string())
        .collect()
}

impl EditorContext {
    pub fn new(project_root: impl Into<PathBuf>, config: Config) -> anyhow::Result<EditorContext> {
        let project_root = project_root.into();
        let project_root = project_root
            .canonicalize()
            .unwrap_or(project_root);
        let root_uri = url::Url::from_file_path(&project_root)
            .map(|url| url.to_string())
            .unwrap_or_else(|_| format!("file://{}", project_root.display()));
        let log_dir = project_root.join(crate::config::SETTINGS_DIR);
        std::fs::create_dir_all(&log_dir)
            .with_context(|| format!("creating {}", log_dir.display()))?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .context("starting the async runtime")?;
        let theme = Theme::load(&config.theme);
        let modes = vec![Mode::c(&config)];
        Ok(EditorContext {
            theme,
            config,
            project_root,
            root_uri,
            log_dir,
            buffers: Vec::new(),
            modes,
            runtime,
            status_message: None,
            completions: Vec::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn root_uri(&self) -> &str {
        &self.root_uri
    }

    pub fn set_status(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(%message, "status");
        self.status_message = Some(message);
    }

    fn free_slot(&mut self) -> BufferId {
        match self.buffers.iter().position(Option::is_none) {
            Some(id) => id,
            None => {
                self.buffers.push(None);
                self.buffers.len() - 1
            }
        }
    }

    /// Open `name` (project-relative or absolute). Re-opening a file returns
    /// the buffer that already holds it. The new buffer gets its mode
    /// attached by extension, is indexed, and - when a language server is
    /// configured - announced via `didOpen`.
    pub fn open(&mut self, name: &str) -> anyhow::Result<BufferId> {
        if let Some(existing) = self.buffer_by_name(name) {
            return Ok(existing);
        }
        let id = self.free_slot();
        let mut buffer = Buffer::open(id, name, self.project_root.to_string_lossy().into_owned())?;
        self.attach_mode(&mut buffer, name);
        buffer.build_indices(&self.theme);
        self.buffers[id] = Some(buffer);
        Ok(id)
    }

    /// An empty, unnamed scratch buffer (no mode, no LSP).
    pub fn new_buffer(&mut self) -> BufferId {
        let id = self.free_slot();
        self.buffers[id] = Some(Buffer::new(id, self.project_root.to_string_lossy().into_owned()));
        id
    }

    fn attach_mode(&mut self, buffer: &mut Buffer, name: &str) {
        let Some(mode_ix) = self.modes.iter().position(|mode| mode.matches(name)) else {
            return;
        };
        let runtime = self.runtime.handle().clone();
        let root_uri = self.root_uri.clone();
        let log_dir = self.log_dir.clone();
        self.modes[mode_ix].attach(buffer, &runtime, &root_uri, &log_dir);
    }

    pub fn buffer(&self, id: BufferId) -> Option<&Buffer> {
        self.buffers.get(id).and_then(Option::as_ref)
    }

    pub fn buffer_mut(&mut self, id: BufferId) -> Option<&mut Buffer> {
        self.buffers.get_mut(id).and_then(Option::as_mut)
    }

    pub fn buffers(&self) -> impl Iterator<Item = &Buffer> {
        self.buffers.iter().filter_map(Option::as_ref)
    }

    pub fn buffer_by_name(&self, name: &str) -> Option<BufferId> {
        self.buffers()
            .find(|buffer| buffer.name() == Some(name))
            .map(Buffer::id)
    }

    fn buffer_by_uri(&self, uri: &str) -> Option<BufferId> {
        self.buffers()
            .find(|buffer| buffer.uri() == Some(uri))
            .map(Buffer::id)
    }

    /// Rebuild the line/token index of a buffer on demand.
    pub fn build_indices(&mut self, id: BufferId) {
        let theme = &self.theme;
        if let Some(buffer) = self.buffers.get_mut(id).and_then(Option::as_mut) {
            buffer.build_indices(theme);
        }
    }

    /// Close the buffer (the event fires first so its mode can flush) and
    /// free the slot.
    pub fn close_buffer(&mut self, id: BufferId) {
        if let Some(mut buffer) = self.buffers.get_mut(id).and_then(Option::take) {
            buffer.close();
        }
    }

    fn lsp_handle_for(&self, id: BufferId) -> Option<LspHandle> {
        let name = self.buffer(id)?.name()?;
        self.modes
            .iter()
            .find(|mode| mode.matches(name))
            .and_then(Mode::lsp_handle)
    }

    pub fn request_completion(&mut self, id: BufferId, line: usize, character: usize) {
        let Some(handle) = self.lsp_handle_for(id) else {
            return;
        };
        let Some(buffer) = self.buffer(id) else {
            return;
        };
        if let Err(err) = handle.completion(buffer, line, character) {
            self.set_status(format!("completion request failed: {err}"));
        }
    }

    pub fn format_buffer(&mut self, id: BufferId) {
        let Some(handle) = self.lsp_handle_for(id) else {
            return;
        };
        let Some(buffer) = self.buffer(id) else {
            return;
        };
        if let Err(err) = handle.formatting(buffer) {
            self.set_status(format!("formatting request failed: {err}"));
        }
    }

    /// Drain every language server's submission queue, dispatching responses
    /// and notifications. Returns the number of messages handled.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        loop {
            let mut progressed = false;
            for mode_ix in 0..self.modes.len() {
                let inbound = self.modes[mode_ix]
                    .runtime()
                    .and_then(|runtime| runtime.poll());
                if let Some(inbound) = inbound {
                    self.handle_inbound(inbound);
                    handled += 1;
                    progressed = true;
                }
            }
            if !progressed {
                return handled;
            }
        }
    }

    /// Pump the submission queues until `duration` elapses. The CLI driver
    /// and the tests use this in place of a frame loop.
    pub fn pump_for(&mut self, duration: Duration) -> usize {
        let deadline = Instant::now() + duration;
        let mut handled = 0;
        while Instant::now() < deadline {
            let n = self.process_pending();
            handled += n;
            if n == 0 {
                std::thread::sleep(Duration::from_millis(10));
            }
        }
        handled
    }

    fn handle_inbound(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::Initialized { capabilities } => {
                let token_types = legend_token_types(&capabilities);
                tracing::info!(legend = token_types.len(), "aligning semantic token legend");
                self.theme.align_semantic_legend(&token_types);
            }
            Inbound::Response {
                method,
                target,
                result,
            } => match result {
                Ok(value) => self.handle_response(&method, target, value),
                Err(error) => {
                    tracing::warn!(%method, code = error.code, message = %error.message, "server returned an error");
                    self.set_status(format!("{method}: {}", error.message));
                }
            },
            Inbound::Notification { method, params } => self.handle_notification(&method, params),
            Inbound::Exited => {
                self.set_status("language server exited");
            }
        }
    }

    fn handle_response(&mut self, method: &str, target: ReplyTarget, value: Value) {
        match method {
            "textDocument/semanticTokens/full" => {
                let ReplyTarget::Buffer(id) = target else {
                    return;
                };
                let theme = &self.theme;
                match self.buffers.get_mut(id).and_then(Option::as_mut) {
                    Some(buffer) => semantic_tokens::apply_response(buffer, theme, &value),
                    None => tracing::debug!(id, "semantic tokens for a closed buffer dropped"),
                }
            }
            "textDocument/formatting" | "textDocument/rangeFormatting" => {
                let ReplyTarget::Buffer(id) = target else {
                    return;
                };
                self.apply_formatting_edits(id, &value);
            }
            "textDocument/completion" => {
                self.completions = match value {
                    Value::Array(items) => items,
                    Value::Object(mut object) => match object.remove("items") {
                        Some(Value::Array(items)) => items,
                        _ => Vec::new(),
                    },
                    _ => Vec::new(),
                };
                self.set_status(format!("{} completions", self.completions.len()));
            }
            _ => {
                tracing::debug!(%method, "unhandled response dropped");
            }
        }
    }

    /// Apply a formatting response: text edits, applied bottom-up so earlier
    /// offsets stay valid, each through the ordinary edit path (and thus the
    /// undo log).
    fn apply_formatting_edits(&mut self, id: BufferId, value: &Value) {
        let mut edits: Vec<lsp_types::TextEdit> = match serde_json::from_value(value.clone()) {
            Ok(edits) => edits,
            Err(_) => {
                tracing::debug!("formatting response carried no edits");
                return;
            }
        };
        edits.sort_by_key(|edit| (edit.range.start.line, edit.range.start.character));
        let Some(buffer) = self.buffers.get_mut(id).and_then(Option::as_mut) else {
            return;
        };
        let mut applied = 0usize;
        for edit in edits.iter().rev() {
            let start = buffer.byte_offset_for(
                edit.range.start.line as usize,
                edit.range.start.character as usize,
            );
            let end = buffer.byte_offset_for(
                edit.range.end.line as usize,
                edit.range.end.character as usize,
            );
            let (Some(start), Some(end)) = (start, end) else {
                continue;
            };
            let count = end.saturating_sub(start);
            if edit.new_text.is_empty() {
                buffer.delete(start, count);
            } else if count == 0 {
                buffer.insert(&edit.new_text, start);
            } else {
                buffer.replace(start, count, &edit.new_text);
            }
            applied += 1;
        }
        self.set_status(format!("applied {applied} formatting edits"));
    }

    fn handle_notification(&mut self, method: &str, params: Value) {
        match method {
            "textDocument/publishDiagnostics" => {
                let Some(published) = diagnostics::decode_publish_params(&params) else {
                    tracing::warn!("dropping malformed publishDiagnostics");
                    return;
                };
                let Some(id) = self.buffer_by_uri(&published.uri) else {
                    tracing::debug!(uri = %published.uri, "diagnostics for an unknown buffer");
                    return;
                };
                let count = published.diagnostics.len();
                let theme = &self.theme;
                if let Some(buffer) = self.buffers.get_mut(id).and_then(Option::as_mut) {
                    buffer.set_diagnostics(published.diagnostics);
                    buffer.build_indices(theme);
                }
                tracing::debug!(uri = %published.uri, count, "diagnostics updated");
            }
            "window/showMessage" => {
                if let Some(message) = params.get("message").and_then(Value::as_str) {
                    self.set_status(message.to_string());
                }
            }
            "window/logMessage" => {
                if let Some(message) = params.get("message").and_then(Value::as_str) {
                    tracing::info!(server_log = %message);
                }
            }
            _ => {
                tracing::debug!(%method, "unhandled notification dropped");
            }
        }
    }

    /// Close all buffers and shut the language servers down.
    pub fn shutdown(&mut self) {
        let ids: Vec<BufferId> = self.buffers().map(Buffer::id).collect();
        for id in ids {
            self.close_buffer(id);
        }
        for mode in &self.modes {
            if let Some(runtime) = mode.runtime() {
                runtime.shutdown();
            }
        }
    }
}

/// A dropped context tears down like an explicitly shut one: buffers close
/// (flushing `didClose` through their listeners) and every language server
/// gets its `shutdown`/`exit` pair. After an explicit `shutdown()` this is a
/// no-op - the slots are empty and the runtimes are already `Shut`.
impl Drop for EditorContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}
