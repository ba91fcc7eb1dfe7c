//! The line and display-token index.
//!
//! Rebuilt from scratch whenever a buffer's `indexed_version` falls behind
//! its `version`: the buffer's text is run through the language's lexer with
//! whitespace and comments significant, one [`LineIndex`] per line is
//! emitted, and every non-whitespace token becomes a [`DisplayToken`]
//! coloured from the theme. Diagnostics (pre-sorted by start position)
//! attach to their line as a contiguous run.

use lsp_types::Diagnostic;

use crate::syntax::language::Language;
use crate::syntax::lexer::Lexer;
use crate::syntax::token::TokenKind;
use crate::theme::{Rgba, Theme};

/// Per-line record: where the line lives in the text and which ranges of the
/// token and diagnostic lists belong to it. `length` excludes the trailing
/// newline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineIndex {
    pub start: usize,
    pub length: usize,
    pub first_token: usize,
    pub num_tokens: usize,
    pub first_diagnostic: usize,
    pub num_diagnostics: usize,
}

impl LineIndex {
    pub fn end(&self) -> usize {
        self.start + self.length
    }
}

/// A coloured, positioned span derived from a lexer token for rendering.
/// Tokens of a line are contiguous in the token list and sorted by offset;
/// whitespace is implied by the gaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayToken {
    pub offset: usize,
    pub length: usize,
    pub line: usize,
    pub colour: Rgba,
}

/// Lex `source` and produce the line and token indices.
pub fn build(
    source: &str,
    name: &str,
    language: &'static Language,
    diagnostics: &[Diagnostic],
    theme: &Theme,
) -> (Vec<LineIndex>, Vec<DisplayToken>) {
    let mut lexer = Lexer::for_language(language);
    lexer.whitespace_significant = true;
    lexer.include_comments = true;
    lexer.push_source(source, name);

    let mut lines: Vec<LineIndex> = Vec::new();
    let mut tokens: Vec<DisplayToken> = Vec::new();
    let mut lineno = 0usize;
    let mut dix = 0usize;

    let mut current = LineIndex::default();
    attach_diagnostics(&mut current, diagnostics, &mut dix, lineno);

    loop {
        let token = lexer.lex();
        match token.kind {
            TokenKind::EndOfLine | TokenKind::EndOfFile => {
                current.length = token.location.index - current.start;
                lines.push(current);
                if token.kind == TokenKind::EndOfFile {
                    break;
                }
                lineno += 1;
                current = LineIndex {
                    start: token.location.index + 1,
                    ..LineIndex::default()
                };
                attach_diagnostics(&mut current, diagnostics, &mut dix, lineno);
            }
            TokenKind::Whitespace => {}
            _ => {
                let colour = theme
                    .token_colour(&token.kind)
                    .unwrap_or(theme.editor_fg);
                if current.num_tokens == 0 {
                    current.first_token = tokens.len();
                }
                current.num_tokens += 1;
                tokens.push(DisplayToken {
                    offset: token.location.index,
                    length: token.text.len(),
                    line: lineno,
                    colour,
                });
            }
        }
    }
    (lines, tokens)
}

fn attach_diagnostics(
    line: &mut LineIndex,
    diagnostics: &[Diagnostic],
    dix: &mut usize,
    lineno: usize,
) {
    if *dix < diagnostics.len() {
        line.first_diagnostic = *dix;
        while *dix < diagnostics.len()
            && diagnostics[*dix].range.start.line as usize == lineno
        {
            line.num_diagnostics += 1;
            *dix += 1;
        }
    }
}
