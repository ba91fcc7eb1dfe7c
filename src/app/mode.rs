//! Per-language modes.
//!
//! A mode binds a language descriptor, a file-extension filter and a
//! language-server configuration. Attaching a mode to a buffer sets the
//! buffer's language for indexing, opens the document on the server, and
//! subscribes a listener that translates buffer events into LSP traffic:
//! edits become `didChange`, `Indexed` triggers a semantic-token request,
//! `Save` and `Close` become `didSave`/`didClose`.

use std::path::Path;

use crate::config::{Config, LspServerConfig};
use crate::model::buffer::Buffer;
use crate::model::event::EventKind;
use crate::services::lsp::client::{LspHandle, LspRuntime};
use crate::syntax::c::C_LANGUAGE;
use crate::syntax::language::Language;

pub struct Mode {
    language: &'static Language,
    language_id: String,
    extensions: Vec<&'static str>,
    lsp_config: Option<LspServerConfig>,
    lsp: Option<LspRuntime>,
}

impl Mode {
    pub fn c(config: &Config) -> Mode {
        Mode {
            language: &C_LANGUAGE,
            language_id: "c".to_string(),
            extensions: vec!["c", "h"],
            lsp_config: config.lsp_for("c").cloned(),
            lsp: None,
        }
    }

    pub fn language(&self) -> &'static Language {
        self.language
    }

    pub fn language_id(&self) -> &str {
        &self.language_id
    }

    /// Whether this mode handles `name`, by file extension.
    pub fn matches(&self, name: &str) -> bool {
        Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map_or(false, |ext| self.extensions.contains(&ext))
    }

    pub fn runtime(&self) -> Option<&LspRuntime> {
        self.lsp.as_ref()
    }

    pub fn lsp_handle(&self) -> Option<LspHandle> {
        self.lsp.as_ref().map(|runtime| runtime.handle().clone())
    }

    /// Spawn the mode's language server on first use. Returns `None` when no
    /// server is configured or the spawn failed (the failure disables the
    /// server for the session).
    pub fn ensure_lsp(
        &mut self,
        runtime: &tokio::runtime::Handle,
        root_uri: &str,
        log_dir: &Path,
    ) -> Option<&LspRuntime> {
        if self.lsp.is_none() {
            let config = self.lsp_config.as_ref()?;
            let stderr_log = log_dir.join(format!("{}-lsp.log", self.language_id));
            match LspRuntime::spawn(
                runtime,
                config,
                &self.language_id,
                root_uri.to_string(),
                &stderr_log,
            ) {
                Ok(lsp) => self.lsp = Some(lsp),
                Err(err) => {
                    tracing::error!(
                        language = %self.language_id,
                        command = %config.command,
                        %err,
                        "failed to spawn language server"
                    );
                    self.lsp_config = None;
                    return None;
                }
            }
        }
        self.lsp.as_ref()
    }

    /// Attach this mode to a buffer: set the language, open the document on
    /// the server and subscribe the event-translation listener.
    pub fn attach(
        &mut self,
        buffer: &mut Buffer,
        runtime: &tokio::runtime::Handle,
        root_uri: &str,
        log_dir: &Path,
    ) {
        buffer.set_language(self.language);
        let Some(lsp) = self.ensure_lsp(runtime, root_uri, log_dir) else {
            return;
        };
        let handle = lsp.handle().clone();
        if let Err(err) = handle.did_open(buffer, &self.language_id) {
            tracing::warn!(language = %self.language_id, %err, "didOpen failed");
        }
        let language_id = self.language_id.clone();
        buffer.add_listener(Box::new(move |buffer, event| {
            let outcome = match event.kind {
                EventKind::Insert { text } => {
                    handle.did_change(buffer, event.range, &buffer.resolve_str(text))
                }
                EventKind::Delete { .. } => handle.did_change(buffer, event.range, ""),
                EventKind::Replace { replacement, .. } => {
                    handle.did_change(buffer, event.range, &buffer.resolve_str(replacement))
                }
                EventKind::Indexed => handle.semantic_tokens_full(buffer).map(|_| ()),
                EventKind::Save { .. } => handle.did_save(buffer),
                EventKind::Close => handle.did_close(buffer),
            };
            if let Err(err) = outcome {
                tracing::warn!(language = %language_id, %err, "buffer event not forwarded");
            }
        }));
    }
}
