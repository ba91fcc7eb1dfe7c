//! The C language: keyword table, preprocessor directives, and the
//! directive scanning state machines for `#include` and the macro-name
//! directives.

use crate::syntax::language::{DirectiveHandler, Keyword, Language};
use crate::syntax::lexer::Lexer;
use crate::syntax::token::{Token, TokenKind};

macro_rules! keywords {
    ($($code:literal => $text:literal),* $(,)?) => {
        &[$(Keyword { text: $text, code: $code }),*]
    };
}

static C_KEYWORDS: &[Keyword] = keywords![
    0 => "auto",
    1 => "break",
    2 => "case",
    3 => "char",
    4 => "const",
    5 => "continue",
    6 => "default",
    7 => "do",
    8 => "double",
    9 => "else",
    10 => "enum",
    11 => "extern",
    12 => "float",
    13 => "for",
    14 => "goto",
    15 => "if",
    16 => "inline",
    17 => "int",
    18 => "long",
    19 => "register",
    20 => "restrict",
    21 => "return",
    22 => "short",
    23 => "signed",
    24 => "sizeof",
    25 => "static",
    26 => "struct",
    27 => "switch",
    28 => "typedef",
    29 => "union",
    30 => "unsigned",
    31 => "void",
    32 => "volatile",
    33 => "while",
    34 => "_Bool",
    35 => "_Complex",
    36 => "_Generic",
    37 => "_Static_assert",
    38 => "_Thread_local",
];

pub const DIRECTIVE_ELSE: usize = 0;
pub const DIRECTIVE_ELIF: usize = 1;
pub const DIRECTIVE_ELIFDEF: usize = 2;
pub const DIRECTIVE_ELIFNDEF: usize = 3;
pub const DIRECTIVE_ENDIF: usize = 4;
pub const DIRECTIVE_ERROR: usize = 5;
pub const DIRECTIVE_DEFINE: usize = 6;
pub const DIRECTIVE_IFDEF: usize = 7;
pub const DIRECTIVE_IFNDEF: usize = 8;
pub const DIRECTIVE_IF: usize = 9;
pub const DIRECTIVE_INCLUDE: usize = 10;

static C_DIRECTIVES: &[&str] = &[
    "else", "elif", "elifdef", "elifndef", "endif", "error", "define", "ifdef", "ifndef", "if",
    "include",
];

pub static C_LANGUAGE: Language = Language {
    name: "C",
    keywords: C_KEYWORDS,
    directives: C_DIRECTIVES,
    preprocessor_trigger: Some('#'),
    make_directive_handler: || Box::new(CDirectiveHandler::new()),
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DirectiveState {
    Init,
    IncludeQuote,
    MacroName,
}

/// Scans the operands of C preprocessor directives. `#include` takes a
/// quoted or angle-bracketed path; `#define` and the `ifdef` family take a
/// macro name. Everything else falls back to ordinary token scanning.
pub struct CDirectiveHandler {
    state: DirectiveState,
}

impl CDirectiveHandler {
    pub fn new() -> Self {
        Self {
            state: DirectiveState::Init,
        }
    }

    fn step_include(&mut self, lexer: &mut Lexer<'_>) -> Option<usize> {
        let rest = lexer.rest();
        let bytes = rest.as_bytes();
        if self.state == DirectiveState::Init {
            let mut ix = 0;
            while matches!(bytes.get(ix), Some(b' ') | Some(b'\t')) {
                ix += 1;
            }
            self.state = DirectiveState::IncludeQuote;
            if ix > 0 {
                lexer.set_pending(Token::new(TokenKind::Whitespace, &rest[..ix]));
                return Some(DIRECTIVE_INCLUDE);
            }
        }
        self.state = DirectiveState::Init;
        let close = match bytes.first() {
            Some(b'<') => b'>',
            Some(b'"') => b'"',
            _ => return None,
        };
        let mut ix = 1;
        while ix < bytes.len() && bytes[ix] != close && bytes[ix] != b'\n' {
            ix += 1;
        }
        if ix < bytes.len() && bytes[ix] == close {
            ix += 1;
        }
        lexer.set_pending(Token::new(TokenKind::DirectiveArg, &rest[..ix]));
        None
    }

    fn step_macro_name(&mut self, lexer: &mut Lexer<'_>, directive: usize) -> Option<usize> {
        let rest = lexer.rest();
        let bytes = rest.as_bytes();
        if self.state == DirectiveState::Init {
            let mut ix = 0;
            while matches!(bytes.get(ix), Some(b' ') | Some(b'\t')) {
                ix += 1;
            }
            self.state = DirectiveState::MacroName;
            if ix > 0 {
                lexer.set_pending(Token::new(TokenKind::Whitespace, &rest[..ix]));
                return Some(directive);
            }
        }
        self.state = DirectiveState::Init;
        let mut token = lexer.raw_scan();
        if token.kind == TokenKind::Identifier {
            token.kind = TokenKind::DirectiveArg;
        }
        lexer.set_pending(token);
        None
    }
}

impl Default for CDirectiveHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectiveHandler for CDirectiveHandler {
    fn step(&mut self, lexer: &mut Lexer<'_>, directive: usize) -> Option<usize> {
        match directive {
            DIRECTIVE_INCLUDE => self.step_include(lexer),
            DIRECTIVE_DEFINE
            | DIRECTIVE_IFDEF
            | DIRECTIVE_IFNDEF
            | DIRECTIVE_ELIFDEF
            | DIRECTIVE_ELIFNDEF => self.step_macro_name(lexer, directive),
            _ => {
                self.state = DirectiveState::Init;
                None
            }
        }
    }
}
