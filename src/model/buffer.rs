//! The buffer engine.
//!
//! A [`Buffer`] owns a document's text, its undo log (an event stack plus an
//! append-only payload arena), its line/token index, its diagnostics, and a
//! list of event listeners. Every mutation flows through an event: edits are
//! clamped, captured into the arena, applied, pushed onto the undo stack and
//! broadcast to the listeners in registration order. Undo applies the
//! inverse of the event before the pointer; redo re-applies the event at the
//! pointer.
//!
//! Versioning uses a single monotonic counter: `version` bumps on every
//! applied edit (and on diagnostics replacement), `saved_version` marks the
//! version written to disk, `indexed_version` the version the line/token
//! index was built from.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use lsp_types::Diagnostic;

use crate::model::event::{BufferEvent, EventKind, Position, StringRef, UndoArena};
use crate::model::index::{self, DisplayToken, LineIndex};
use crate::model::text::Text;
use crate::syntax::language::Language;
use crate::theme::Theme;

pub type BufferId = usize;

/// Invoked for every applied event, in registration order. Listeners must be
/// total: they see the buffer after the event and may not fail.
pub type Listener = Box<dyn FnMut(&Buffer, &BufferEvent)>;

pub struct Buffer {
    id: BufferId,
    name: Option<String>,
    uri: Option<String>,
    project_root: String,
    text: Text,
    arena: UndoArena,
    undo_stack: Vec<BufferEvent>,
    undo_pointer: usize,
    listeners: Vec<Listener>,
    pub lines: Vec<LineIndex>,
    pub tokens: Vec<DisplayToken>,
    pub diagnostics: Vec<Diagnostic>,
    version: u64,
    saved_version: u64,
    indexed_version: u64,
    language: Option<&'static Language>,
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

impl Buffer {
    /// An empty, unnamed buffer.
    pub fn new(id: BufferId, project_root: impl Into<String>) -> Buffer {
        Buffer {
            id,
            name: None,
            uri: None,
            project_root: project_root.into(),
            text: Text::new(),
            arena: UndoArena::new(),
            undo_stack: Vec::new(),
            undo_pointer: 0,
            listeners: Vec::new(),
            lines: Vec::new(),
            tokens: Vec::new(),
            diagnostics: Vec::new(),
            version: 0,
            saved_version: 0,
            indexed_version: 0,
            language: None,
        }
    }

    /// Load `name` (project-relative, or absolute) into a new buffer.
    pub fn open(
        id: BufferId,
        name: impl Into<String>,
        project_root: impl Into<String>,
    ) -> anyhow::Result<Buffer> {
        let mut buffer = Buffer::new(id, project_root);
        let name = name.into();
        let path = buffer.resolve_path(&name);
        let bytes =
            fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
        buffer.text = Text::from_bytes(bytes);
        buffer.set_name(name);
        Ok(buffer)
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn saved_version(&self) -> u64 {
        self.saved_version
    }

    pub fn indexed_version(&self) -> u64 {
        self.indexed_version
    }

    pub fn is_modified(&self) -> bool {
        self.saved_version != self.version
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        self.text.as_bytes()
    }

    pub fn to_display_string(&self) -> String {
        String::from_utf8_lossy(self.text.as_bytes()).into_owned()
    }

    pub fn language(&self) -> Option<&'static Language> {
        self.language
    }

    pub fn set_language(&mut self, language: &'static Language) {
        self.language = Some(language);
    }

    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn undo_pointer(&self) -> usize {
        self.undo_pointer
    }

    /// Resolve an arena reference carried by an event payload.
    pub fn resolve(&self, r: StringRef) -> &[u8] {
        self.arena.resolve(r)
    }

    pub fn resolve_str(&self, r: StringRef) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(self.arena.resolve(r))
    }

    pub fn add_listener(&mut self, listener: Listener) {
        self.listeners.push(listener);
    }

    fn set_name(&mut self, name: String) {
        self.uri = Some(if name.starts_with('/') {
            format!("file://{name}")
        } else {
            format!("file://{}/{}", self.project_root, name)
        });
        self.name = Some(name);
    }

    fn resolve_path(&self, name: &str) -> PathBuf {
        let path = Path::new(name);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new(&self.project_root).join(path)
        }
    }

    // ===== Coordinates =====

    /// The line containing `offset`; offsets past the end map to the last
    /// line.
    pub fn line_for_offset(&self, offset: usize) -> usize {
        if self.lines.is_empty() {
            return 0;
        }
        let after = self.lines.partition_point(|line| line.start <= offset);
        after.saturating_sub(1)
    }

    pub fn offset_to_position(&self, offset: usize) -> Position {
        if self.lines.is_empty() {
            return Position::new(0, offset);
        }
        let line = self.line_for_offset(offset);
        Position::new(line, offset - self.lines[line].start)
    }

    pub fn position_to_offset(&self, position: Position) -> usize {
        self.lines
            .get(position.line)
            .map(|line| line.start + position.column)
            .unwrap_or(position.column)
    }

    /// Byte offset for an LSP `(line, character)` pair; the character is
    /// capped to the line length per the protocol. `None` when the line does
    /// not exist.
    pub fn byte_offset_for(&self, line: usize, character: usize) -> Option<usize> {
        let line = self.lines.get(line)?;
        Some(line.start + character.min(line.length))
    }

    // ===== Events =====

    fn broadcast(&mut self, event: &BufferEvent) {
        let mut listeners = std::mem::take(&mut self.listeners);
        for listener in listeners.iter_mut() {
            listener(self, event);
        }
        self.listeners = listeners;
    }

    /// Apply an edit event: stamp its range from the pre-edit line index,
    /// mutate the text, bump the version and broadcast. Non-edit events are
    /// handled by their own entry points.
    fn apply(&mut self, mut event: BufferEvent) {
        match event.kind {
            EventKind::Insert { text } => {
                if text.is_empty() {
                    return;
                }
                event.range.start = self.offset_to_position(event.position);
                event.range.end = event.range.start;
                self.text
                    .insert(event.position, self.arena.resolve(text));
                self.version += 1;
            }
            EventKind::Delete { count, .. } => {
                if count == 0 {
                    return;
                }
                let count = count.min(self.text.len().saturating_sub(event.position));
                event.range.start = self.offset_to_position(event.position);
                event.range.end = self.offset_to_position(event.position + count);
                self.text.remove(event.position, count);
                self.version += 1;
            }
            EventKind::Replace {
                overwritten,
                replacement,
            } => {
                if replacement.is_empty() {
                    return;
                }
                let count = overwritten
                    .length
                    .min(self.text.len().saturating_sub(event.position));
                event.range.start = self.offset_to_position(event.position);
                event.range.end = self.offset_to_position(event.position + count);
                self.text.remove(event.position, count);
                self.text
                    .insert(event.position, self.arena.resolve(replacement));
                self.version += 1;
            }
            EventKind::Save { .. } | EventKind::Close | EventKind::Indexed => return,
        }
        assert!(
            self.undo_pointer <= self.undo_stack.len(),
            "undo pointer ran past the undo stack"
        );
        self.broadcast(&event);
    }

    /// Record and apply a user edit: clamp it to the text, capture the bytes
    /// it destroys into the arena, apply, and push it onto the undo stack.
    /// No-op edits are rejected before anything is recorded.
    fn edit(&mut self, mut event: BufferEvent) {
        match &mut event.kind {
            EventKind::Insert { text } => {
                if text.is_empty() {
                    return;
                }
                event.position = self.text.clamp_offset(event.position);
            }
            EventKind::Delete { count, deleted } => {
                event.position = self.text.clamp_offset(event.position);
                *count = (*count).min(self.text.len() - event.position);
                if *count == 0 {
                    return;
                }
                *deleted = self
                    .arena
                    .store(self.text.slice(event.position, *count));
            }
            EventKind::Replace {
                overwritten,
                replacement,
            } => {
                if replacement.is_empty() {
                    return;
                }
                event.position = self.text.clamp_offset(event.position);
                let count = overwritten
                    .length
                    .min(self.text.len() - event.position);
                if count == 0 {
                    return;
                }
                *overwritten = self
                    .arena
                    .store(self.text.slice(event.position, count));
            }
            _ => {}
        }
        self.apply(event);
        self.undo_stack.push(event);
        self.undo_pointer = self.undo_stack.len();
    }

    pub fn insert(&mut self, text: &str, position: usize) {
        let text = self.arena.store(text.as_bytes());
        self.edit(BufferEvent::new(position, EventKind::Insert { text }));
    }

    pub fn delete(&mut self, at: usize, count: usize) {
        self.edit(BufferEvent::new(
            at,
            EventKind::Delete {
                count,
                deleted: StringRef::EMPTY,
            },
        ));
    }

    pub fn replace(&mut self, at: usize, count: usize, replacement: &str) {
        let replacement = self.arena.store(replacement.as_bytes());
        self.edit(BufferEvent::new(
            at,
            EventKind::Replace {
                overwritten: StringRef {
                    offset: 0,
                    length: count,
                },
                replacement,
            },
        ));
    }

    /// Join `top_line` with the line below it by replacing the newline with
    /// a space.
    pub fn merge_lines(&mut self, top_line: usize) {
        if self.lines.is_empty() || top_line + 1 >= self.lines.len() {
            return;
        }
        let line = self.lines[top_line];
        self.replace(line.end(), 1, " ");
    }

    pub fn undo(&mut self) {
        if self.undo_pointer == 0 {
            return;
        }
        self.undo_pointer -= 1;
        if let Some(inverse) = self.undo_stack[self.undo_pointer].inverted() {
            self.apply(inverse);
        }
    }

    pub fn redo(&mut self) {
        if self.undo_pointer >= self.undo_stack.len() {
            return;
        }
        let event = self.undo_stack[self.undo_pointer];
        self.undo_pointer += 1;
        self.apply(event);
    }

    pub fn save(&mut self) -> anyhow::Result<()> {
        self.save_event(StringRef::EMPTY)
    }

    pub fn save_as(&mut self, name: &str) -> anyhow::Result<()> {
        let file_name = self.arena.store(name.as_bytes());
        self.save_event(file_name)
    }

    fn save_event(&mut self, file_name: StringRef) -> anyhow::Result<()> {
        assert!(
            self.saved_version <= self.version,
            "saved_version ran ahead of version"
        );
        let new_name = if file_name.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(self.arena.resolve(file_name)).into_owned())
        };
        if new_name.is_none() && self.saved_version == self.version {
            return Ok(());
        }
        if let Some(name) = new_name {
            self.set_name(name);
        }
        let Some(name) = self.name.clone() else {
            return Ok(());
        };
        let path = self.resolve_path(&name);
        fs::write(&path, self.text.as_bytes())
            .with_context(|| format!("writing {}", path.display()))?;
        self.saved_version = self.version;
        let event = BufferEvent::new(0, EventKind::Save { file_name });
        self.broadcast(&event);
        Ok(())
    }

    /// Broadcast `Close` first so listeners can flush, then tear down the
    /// buffer's contents. Arena references die with the buffer.
    pub fn close(&mut self) {
        let event = BufferEvent::new(0, EventKind::Close);
        self.broadcast(&event);
        self.text = Text::new();
        self.arena.clear();
        self.undo_stack.clear();
        self.undo_pointer = 0;
        self.lines.clear();
        self.tokens.clear();
        self.diagnostics.clear();
        self.listeners.clear();
        self.name = None;
        self.uri = None;
        self.version = 0;
        self.saved_version = 0;
        self.indexed_version = 0;
    }

    // ===== Indexing =====

    /// Re-lex and rebuild the line/token index if the buffer has changed
    /// since the last build, then broadcast `Indexed`. Without an attached
    /// language the text is indexed as a single whole-file line and no event
    /// fires.
    pub fn build_indices(&mut self, theme: &Theme) {
        assert!(
            self.indexed_version <= self.version,
            "indexed_version ran ahead of version"
        );
        if self.indexed_version == self.version && !self.lines.is_empty() {
            tracing::trace!(
                name = self.name.as_deref().unwrap_or("<unnamed>"),
                version = self.version,
                "index is clean"
            );
            return;
        }
        self.lines.clear();
        self.tokens.clear();
        let whole_file = LineIndex {
            start: 0,
            length: self.text.len(),
            ..LineIndex::default()
        };
        let Some(language) = self.language else {
            self.lines.push(whole_file);
            self.indexed_version = self.version;
            return;
        };
        let Some(source) = self.text.as_str() else {
            tracing::warn!(
                name = self.name.as_deref().unwrap_or("<unnamed>"),
                "buffer is not valid UTF-8, skipping index build"
            );
            self.lines.push(whole_file);
            self.indexed_version = self.version;
            return;
        };
        let name = self.name.as_deref().unwrap_or("<unnamed>");
        let (lines, tokens) =
            index::build(source, name, language, &self.diagnostics, theme);
        tracing::trace!(
            name,
            lines = lines.len(),
            tokens = tokens.len(),
            version = self.version,
            "rebuilt indices"
        );
        self.lines = lines;
        self.tokens = tokens;
        self.indexed_version = self.version;
        let event = BufferEvent::new(0, EventKind::Indexed);
        self.broadcast(&event);
    }

    /// Replace the diagnostics wholesale (sorted by start position) and bump
    /// the version so the next index build attaches the per-line runs.
    pub fn set_diagnostics(&mut self, mut diagnostics: Vec<Diagnostic>) {
        diagnostics.sort_by_key(|d| (d.range.start.line, d.range.start.character));
        self.diagnostics = diagnostics;
        self.version += 1;
    }

    // ===== Word boundaries =====

    /// Left edge of the run of word bytes (alphanumeric or `_`) containing
    /// `index`, or of the non-word run when `index` sits on one.
    pub fn word_boundary_left(&self, index: usize) -> usize {
        let bytes = self.text.as_bytes();
        if bytes.is_empty() {
            return 0;
        }
        let index = index.min(bytes.len() - 1);
        let word = is_word_byte(bytes[index]);
        let mut ix = index;
        while ix > 0 && is_word_byte(bytes[ix - 1]) == word {
            ix -= 1;
        }
        ix
    }

    /// Right edge of the run containing `index` (exclusive).
    pub fn word_boundary_right(&self, index: usize) -> usize {
        let bytes = self.text.as_bytes();
        if index >= bytes.len() {
            return bytes.len();
        }
        let word = is_word_byte(bytes[index]);
        let mut ix = index;
        while ix < bytes.len() && is_word_byte(bytes[ix]) == word {
            ix += 1;
        }
        ix
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("len", &self.text.len())
            .field("version", &self.version)
            .field("saved_version", &self.saved_version)
            .field("indexed_version", &self.indexed_version)
            .field("lines", &self.lines.len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
