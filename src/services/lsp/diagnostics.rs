//! `textDocument/publishDiagnostics` handling.

use lsp_types::Diagnostic;
use serde_json::Value;

use crate::model::buffer::Buffer;

#[derive(Debug)]
pub struct PublishedDiagnostics {
    pub uri: String,
    pub diagnostics: Vec<Diagnostic>,
}

/// Decode the notification params. Malformed payloads yield `None` and are
/// dropped by the caller.
pub fn decode_publish_params(params: &Value) -> Option<PublishedDiagnostics> {
    let uri = params.get("uri")?.as_str()?.to_string();
    let diagnostics = params
        .get("diagnostics")
        .cloned()
        .unwrap_or_else(|| Value::Array(Vec::new()));
    let diagnostics: Vec<Diagnostic> = serde_json::from_value(diagnostics).ok()?;
    Some(PublishedDiagnostics { uri, diagnostics })
}

/// Byte range of a diagnostic in the buffer's text. `None` when the
/// diagnostic points outside the line index.
pub fn diagnostic_byte_range(
    buffer: &Buffer,
    diagnostic: &Diagnostic,
) -> Option<std::ops::Range<usize>> {
    let start = buffer.byte_offset_for(
        diagnostic.range.start.line as usize,
        diagnostic.range.start.character as usize,
    )?;
    let end = buffer.byte_offset_for(
        diagnostic.range.end.line as usize,
        diagnostic.range.end.character as usize,
    )?;
    Some(start..end)
}
