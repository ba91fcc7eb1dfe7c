//! Semantic-token response processing.
//!
//! The server reports tokens as a packed `data` array of five-tuples
//! `[Δline, Δstart, length, type_index, modifier_mask]`. The handler walks
//! the array reconstructing absolute positions and overwrites the colour of
//! the display token found at each position. A token that cannot be located
//! means the index and the server disagree about the document; the handler
//! logs once and stops - the next index rebuild reconciles.

use serde_json::Value;

use crate::model::buffer::Buffer;
use crate::theme::Theme;

pub fn apply_response(buffer: &mut Buffer, theme: &Theme, result: &Value) {
    if result.is_null() {
        tracing::debug!("empty semantic tokens response");
        return;
    }
    let Some(data) = result.get("data").and_then(Value::as_array) else {
        tracing::debug!("could not decode semantic tokens response");
        return;
    };
    let values: Vec<u64> = data.iter().filter_map(Value::as_u64).collect();
    if values.len() != data.len() || values.len() % 5 != 0 {
        tracing::warn!(len = data.len(), "malformed semantic token data");
        return;
    }
    if buffer.lines.is_empty() {
        return;
    }
    let mut lineno = 0usize;
    let mut line = buffer.lines[0];
    let mut offset = 0usize;
    let mut token_ix = 0usize;
    for chunk in values.chunks_exact(5) {
        let delta_line = chunk[0] as usize;
        let delta_start = chunk[1] as usize;
        let length = chunk[2] as usize;
        let type_index = chunk[3] as usize;
        if delta_line > 0 {
            lineno += delta_line;
            if lineno >= buffer.lines.len() {
                // Data past the end of the index is ignored.
                break;
            }
            line = buffer.lines[lineno];
            offset = 0;
            token_ix = 0;
        }
        offset += delta_start;
        let Some(colour) = theme.semantic_colour(type_index) else {
            continue;
        };
        while token_ix < line.num_tokens {
            let Some(token) = buffer.tokens.get_mut(line.first_token + token_ix) else {
                tracing::warn!("line token run exceeds the token list");
                return;
            };
            if token.offset == line.start + offset && token.length == length {
                token.colour = colour;
                break;
            }
            token_ix += 1;
        }
        if token_ix == line.num_tokens {
            tracing::info!("semantic tokens out of sync with the display tokens");
            break;
        }
    }
}
