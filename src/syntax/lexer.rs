//! Language-parameterised tokenizer.
//!
//! The lexer scans a stack of sources (LIFO, for `#include`-style nesting)
//! with a one-token lookahead. `peek` returns the pending token without
//! consuming it, `lex` consumes, and `next` skips whitespace and comments
//! unless the corresponding significance flags are set. Block comments that
//! span lines are scanned one line at a time so the indexing pass sees an
//! `EndOfLine` token between the pieces.

use thiserror::Error;

use crate::syntax::language::{DirectiveHandler, Language};
use crate::syntax::token::{CommentKind, Location, NumberKind, Token, TokenKind};

#[derive(Debug, Error)]
#[error("{file}:{line}:{column}: {message}")]
pub struct LexerError {
    pub file: String,
    pub line: usize,
    pub column: usize,
    pub message: String,
}

#[derive(Debug)]
struct Source<'a> {
    rest: &'a str,
    name: String,
    location: Location,
}

pub struct Lexer<'a> {
    language: Option<&'static Language>,
    sources: Vec<Source<'a>>,
    current: Option<Token<'a>>,
    pub whitespace_significant: bool,
    pub include_comments: bool,
    in_comment: bool,
    active_directive: Option<usize>,
    directive_handler: Option<Box<dyn DirectiveHandler>>,
}

impl<'a> Lexer<'a> {
    pub fn new() -> Self {
        Self {
            language: None,
            sources: Vec::new(),
            current: None,
            whitespace_significant: false,
            include_comments: false,
            in_comment: false,
            active_directive: None,
            directive_handler: None,
        }
    }

    pub fn for_language(language: &'static Language) -> Self {
        let mut lexer = Self::new();
        lexer.directive_handler = Some((language.make_directive_handler)());
        lexer.language = Some(language);
        lexer
    }

    pub fn language(&self) -> Option<&'static Language> {
        self.language
    }

    /// Remaining text of the innermost source. The returned slice borrows
    /// the source, not the lexer, so callers may keep it across mutations.
    pub fn rest(&self) -> &'a str {
        self.sources.last().map(|src| src.rest).unwrap_or("")
    }

    pub fn source_name(&self) -> &str {
        self.sources.last().map(|src| src.name.as_str()).unwrap_or("")
    }

    pub fn location(&self) -> Location {
        self.sources
            .last()
            .map(|src| src.location)
            .unwrap_or_default()
    }

    pub fn push_source(&mut self, text: &'a str, name: impl Into<String>) {
        self.sources.push(Source {
            rest: text,
            name: name.into(),
            location: Location::default(),
        });
        self.current = None;
    }

    pub fn pop_source(&mut self) {
        self.sources.pop();
        self.current = None;
    }

    /// Install `token` as the pending lookahead, stamped with the current
    /// source location. Directive handlers use this to replace the token the
    /// scanner would otherwise produce.
    pub fn set_pending(&mut self, mut token: Token<'a>) -> Token<'a> {
        if let Some(src) = self.sources.last() {
            token.location = src.location;
        }
        self.current = Some(token);
        token
    }

    /// The current token, without consuming it.
    pub fn peek(&mut self) -> Token<'a> {
        if let Some(token) = self.current {
            return token;
        }
        if let Some(directive) = self.active_directive {
            if let Some(mut handler) = self.directive_handler.take() {
                self.active_directive = handler.step(self, directive);
                self.directive_handler = Some(handler);
            } else {
                self.active_directive = None;
            }
            if let Some(token) = self.current {
                return token;
            }
        }
        let token = self.raw_scan();
        self.set_pending(token)
    }

    /// Consume and return the current token, advancing the source location.
    pub fn lex(&mut self) -> Token<'a> {
        let token = match self.current.take() {
            Some(token) => token,
            None => {
                let token = self.next();
                self.current = None;
                token
            }
        };
        if let Some(src) = self.sources.last_mut() {
            src.location.index += token.text.len();
            src.rest = &src.rest[token.text.len()..];
            if matches!(token.kind, TokenKind::EndOfLine) {
                src.location.line += 1;
                src.location.column = 0;
            } else {
                src.location.column += token.text.len();
            }
        }
        token
    }

    /// The next significant token, honouring the whitespace/comment flags.
    /// Pops exhausted sources; once the stack is empty the end-of-file token
    /// of the outermost source (with its final location) is returned.
    pub fn next(&mut self) -> Token<'a> {
        let mut token = Token::new(TokenKind::EndOfFile, "");
        while !self.sources.is_empty() {
            token = self.peek();
            while !token.is_eof() {
                let significant = match token.kind {
                    TokenKind::Whitespace | TokenKind::EndOfLine => self.whitespace_significant,
                    TokenKind::Comment { .. } => self.include_comments,
                    _ => true,
                };
                if significant {
                    return token;
                }
                self.lex();
                token = self.peek();
            }
            self.pop_source();
        }
        token
    }

    pub fn next_matches(&mut self, kind: TokenKind) -> bool {
        self.next().kind.matches(&kind)
    }

    pub fn next_matches_symbol(&mut self, symbol: char) -> bool {
        self.next().is_symbol(symbol)
    }

    /// Consume the next token if it matches `kind`, else fail with a located
    /// error. The offending token is left pending.
    pub fn expect(
        &mut self,
        kind: TokenKind,
        message: impl Into<String>,
    ) -> Result<Token<'a>, LexerError> {
        let token = self.next();
        if token.kind.matches(&kind) {
            Ok(self.lex())
        } else {
            Err(self.error_at(token.location, message))
        }
    }

    pub fn expect_symbol(
        &mut self,
        symbol: char,
        message: impl Into<String>,
    ) -> Result<Token<'a>, LexerError> {
        let token = self.next();
        if token.is_symbol(symbol) {
            Ok(self.lex())
        } else {
            Err(self.error_at(token.location, message))
        }
    }

    pub fn expect_identifier(
        &mut self,
        message: impl Into<String>,
    ) -> Result<Token<'a>, LexerError> {
        self.expect(TokenKind::Identifier, message)
    }

    fn error_at(&self, location: Location, message: impl Into<String>) -> LexerError {
        LexerError {
            file: self.source_name().to_string(),
            line: location.line,
            column: location.column,
            message: message.into(),
        }
    }

    /// Scan one raw token from the head of the current source. Exposed to
    /// directive handlers; everything else goes through `peek`.
    pub fn raw_scan(&mut self) -> Token<'a> {
        let rest = self.rest();
        if rest.is_empty() {
            return Token::new(TokenKind::EndOfFile, rest);
        }
        let bytes = rest.as_bytes();
        if self.in_comment {
            if bytes[0] == b'\n' {
                return Token::new(TokenKind::EndOfLine, &rest[..1]);
            }
            return self.scan_block_comment(rest, 0);
        }
        match bytes[0] {
            b'\'' | b'"' | b'`' => return Self::scan_quoted_string(rest),
            b'/' => match bytes.get(1) {
                Some(b'/') => {
                    let mut ix = 2;
                    while ix < bytes.len() && bytes[ix] != b'\n' {
                        ix += 1;
                    }
                    return Token::new(
                        TokenKind::Comment {
                            kind: CommentKind::Line,
                            terminated: true,
                        },
                        &rest[..ix],
                    );
                }
                Some(b'*') => return self.scan_block_comment(rest, 2),
                _ => {}
            },
            _ => {}
        }
        if bytes[0] == b'\n' {
            return Token::new(TokenKind::EndOfLine, &rest[..1]);
        }
        if bytes[0].is_ascii_whitespace() {
            let mut ix = 0;
            while ix < bytes.len() && bytes[ix].is_ascii_whitespace() && bytes[ix] != b'\n' {
                ix += 1;
            }
            return Token::new(TokenKind::Whitespace, &rest[..ix]);
        }
        if bytes[0].is_ascii_digit() {
            return Self::scan_number(rest);
        }
        if bytes[0].is_ascii_alphabetic() || bytes[0] == b'_' {
            let mut ix = 0;
            while ix < bytes.len() && (bytes[ix].is_ascii_alphanumeric() || bytes[ix] == b'_') {
                ix += 1;
            }
            if let Some(language) = self.language {
                for kw in language.keywords {
                    if kw.is_identifier_like() && kw.text.len() == ix && rest.starts_with(kw.text)
                    {
                        return Token::new(TokenKind::Keyword { code: kw.code }, &rest[..ix]);
                    }
                }
            }
            return Token::new(TokenKind::Identifier, &rest[..ix]);
        }
        if let Some(language) = self.language {
            let mut matched: Option<&'static str> = None;
            let mut matched_code = 0;
            for kw in language.keywords {
                if rest.starts_with(kw.text)
                    && matched.map_or(true, |m| kw.text.len() > m.len())
                {
                    matched = Some(kw.text);
                    matched_code = kw.code;
                }
            }
            if let Some(text) = matched {
                return Token::new(
                    TokenKind::Keyword { code: matched_code },
                    &rest[..text.len()],
                );
            }
        }
        let ch = rest.chars().next().expect("rest is non-empty");
        if self.active_directive.is_none()
            && self
                .language
                .map_or(false, |language| language.preprocessor_trigger == Some(ch))
        {
            if let Some(token) = self.scan_directive(rest) {
                return token;
            }
        }
        Token::new(TokenKind::Symbol { ch }, &rest[..ch.len_utf8()])
    }

    /// Scan the tail of a block comment starting at `start`. A newline
    /// pauses the scan so the token stream stays line-oriented; the next
    /// pass resumes with `in_comment` set.
    fn scan_block_comment(&mut self, rest: &'a str, start: usize) -> Token<'a> {
        let bytes = rest.as_bytes();
        let mut ix = start;
        loop {
            match bytes.get(ix) {
                None => {
                    return Token::new(
                        TokenKind::Comment {
                            kind: CommentKind::Block,
                            terminated: false,
                        },
                        &rest[..ix],
                    );
                }
                Some(b'\n') => {
                    self.in_comment = true;
                    return Token::new(
                        TokenKind::Comment {
                            kind: CommentKind::Block,
                            terminated: true,
                        },
                        &rest[..ix],
                    );
                }
                Some(b'/') if ix >= 1 && bytes[ix - 1] == b'*' => {
                    self.in_comment = false;
                    return Token::new(
                        TokenKind::Comment {
                            kind: CommentKind::Block,
                            terminated: true,
                        },
                        &rest[..=ix],
                    );
                }
                Some(_) => ix += 1,
            }
        }
    }

    fn scan_quoted_string(rest: &'a str) -> Token<'a> {
        let bytes = rest.as_bytes();
        let quote = bytes[0];
        let mut ix = 1;
        while ix < bytes.len() && bytes[ix] != quote {
            if bytes[ix] == b'\\' {
                ix += 1;
            }
            if ix < bytes.len() {
                ix += 1;
            }
        }
        let terminated = ix < bytes.len();
        let end = if terminated { ix + 1 } else { ix };
        Token::new(
            TokenKind::QuotedString {
                quote: quote as char,
                terminated,
                triple: false,
            },
            &rest[..end],
        )
    }

    fn scan_number(rest: &'a str) -> Token<'a> {
        let bytes = rest.as_bytes();
        let mut kind = NumberKind::Integer;
        let mut ix = 0;
        let mut predicate: fn(u8) -> bool = |b| b.is_ascii_digit();
        if bytes[0] == b'0' && bytes.len() > 1 {
            match bytes[1] {
                b'x' | b'X' => {
                    if bytes.get(2).map_or(true, |b| !b.is_ascii_hexdigit()) {
                        return Token::new(TokenKind::Number { kind }, &rest[..1]);
                    }
                    kind = NumberKind::Hex;
                    predicate = |b| b.is_ascii_hexdigit();
                    ix = 2;
                }
                b'b' | b'B' => {
                    if bytes.get(2).map_or(true, |b| !b.is_ascii_hexdigit()) {
                        return Token::new(TokenKind::Number { kind }, &rest[..1]);
                    }
                    kind = NumberKind::Binary;
                    predicate = |b| b == b'0' || b == b'1';
                    ix = 2;
                }
                _ => {}
            }
        }
        loop {
            match bytes.get(ix) {
                Some(b'.') => {
                    // A second '.' means a range expression, not a decimal.
                    if kind != NumberKind::Integer || bytes.get(ix + 1) == Some(&b'.') {
                        break;
                    }
                    kind = NumberKind::Decimal;
                    ix += 1;
                }
                Some(&b) if predicate(b) => ix += 1,
                _ => break,
            }
        }
        Token::new(TokenKind::Number { kind }, &rest[..ix])
    }

    /// Recognise a directive after its trigger symbol: skip whitespace, take
    /// the alphabetic directive name, and match it against the language's
    /// table. A match activates the language's directive handler.
    fn scan_directive(&mut self, rest: &'a str) -> Option<Token<'a>> {
        let language = self.language?;
        if language.directives.is_empty() {
            return None;
        }
        let bytes = rest.as_bytes();
        let mut start = 1;
        while start < bytes.len() && bytes[start].is_ascii_whitespace() {
            start += 1;
        }
        let mut end = start;
        while end < bytes.len() && bytes[end].is_ascii_alphabetic() {
            end += 1;
        }
        if end == start {
            return None;
        }
        let name = &rest[start..end];
        let index = language.directives.iter().position(|d| *d == name)?;
        self.active_directive = Some(index);
        Some(Token::new(TokenKind::Directive { index }, &rest[..end]))
    }
}

impl<'a> Default for Lexer<'a> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::language::{Keyword, NoDirectives};

    static TEST_KEYWORDS: &[Keyword] = &[
        Keyword {
            text: "if",
            code: 1,
        },
        Keyword {
            text: "integer",
            code: 2,
        },
        Keyword {
            text: "..",
            code: 3,
        },
        Keyword {
            text: "..<",
            code: 4,
        },
        Keyword {
            text: "+",
            code: 5,
        },
        Keyword {
            text: "+=",
            code: 6,
        },
    ];

    static TEST_LANGUAGE: Language = Language {
        name: "test",
        keywords: TEST_KEYWORDS,
        directives: &[],
        preprocessor_trigger: None,
        make_directive_handler: || Box::new(NoDirectives),
    };

    fn scan_all(input: &str) -> Vec<Token<'_>> {
        let mut lexer = Lexer::for_language(&TEST_LANGUAGE);
        lexer.whitespace_significant = true;
        lexer.include_comments = true;
        lexer.push_source(input, "test");
        let mut tokens = Vec::new();
        loop {
            let token = lexer.lex();
            if token.is_eof() {
                break;
            }
            tokens.push(token);
        }
        tokens
    }

    #[test]
    fn token_texts_concatenate_to_the_input() {
        let input = "if (x == 0x1f) {\n    s = \"hi\\\"there\"; /* note\n  more */ y += 1.5;\n}\n";
        let tokens = scan_all(input);
        let joined: String = tokens.iter().map(|t| t.text).collect();
        assert_eq!(joined, input);
    }

    #[test]
    fn keywords_do_not_match_inside_identifiers() {
        let tokens = scan_all("integer_x integer ifx if");
        let kinds: Vec<&TokenKind> = tokens
            .iter()
            .filter(|t| !matches!(t.kind, TokenKind::Whitespace))
            .map(|t| &t.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                &TokenKind::Identifier,
                &TokenKind::Keyword { code: 2 },
                &TokenKind::Identifier,
                &TokenKind::Keyword { code: 1 },
            ]
        );
    }

    #[test]
    fn operator_keywords_match_longest_prefix() {
        let tokens = scan_all("a ..< b .. c += d + e");
        let codes: Vec<u32> = tokens
            .iter()
            .filter_map(|t| match t.kind {
                TokenKind::Keyword { code } => Some(code),
                _ => None,
            })
            .collect();
        assert_eq!(codes, vec![4, 3, 6, 5]);
    }

    #[test]
    fn range_expression_lexes_as_number_operator_number() {
        let tokens = scan_all("1..10");
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].text, "1");
        assert!(matches!(
            tokens[0].kind,
            TokenKind::Number {
                kind: NumberKind::Integer
            }
        ));
        assert_eq!(tokens[1].kind, TokenKind::Keyword { code: 3 });
        assert_eq!(tokens[2].text, "10");
    }

    #[test]
    fn number_forms() {
        let tokens = scan_all("0x1F 0b101 3.25 42 0x");
        let texts_and_kinds: Vec<(&str, TokenKind)> = tokens
            .iter()
            .filter(|t| !matches!(t.kind, TokenKind::Whitespace))
            .map(|t| (t.text, t.kind))
            .collect();
        assert_eq!(
            texts_and_kinds[0],
            (
                "0x1F",
                TokenKind::Number {
                    kind: NumberKind::Hex
                }
            )
        );
        assert_eq!(
            texts_and_kinds[1],
            (
                "0b101",
                TokenKind::Number {
                    kind: NumberKind::Binary
                }
            )
        );
        assert_eq!(
            texts_and_kinds[2],
            (
                "3.25",
                TokenKind::Number {
                    kind: NumberKind::Decimal
                }
            )
        );
        assert_eq!(
            texts_and_kinds[3],
            (
                "42",
                TokenKind::Number {
                    kind: NumberKind::Integer
                }
            )
        );
        // "0x" with no hex digit lexes as "0" followed by the identifier "x"
        assert_eq!(
            texts_and_kinds[4],
            (
                "0",
                TokenKind::Number {
                    kind: NumberKind::Integer
                }
            )
        );
        assert_eq!(texts_and_kinds[5], ("x", TokenKind::Identifier));
    }

    #[test]
    fn unterminated_string_spans_to_eof() {
        let tokens = scan_all("x = \"abc");
        let last = tokens.last().unwrap();
        assert_eq!(last.text, "\"abc");
        assert!(matches!(
            last.kind,
            TokenKind::QuotedString {
                terminated: false,
                ..
            }
        ));
    }

    #[test]
    fn escaped_quote_does_not_terminate() {
        let tokens = scan_all(r#""a\"b" x"#);
        assert_eq!(tokens[0].text, r#""a\"b""#);
        assert!(matches!(
            tokens[0].kind,
            TokenKind::QuotedString {
                terminated: true,
                ..
            }
        ));
    }

    #[test]
    fn block_comment_pauses_at_newlines() {
        let tokens = scan_all("/* one\ntwo */x");
        assert_eq!(tokens[0].text, "/* one");
        assert!(matches!(
            tokens[0].kind,
            TokenKind::Comment {
                kind: CommentKind::Block,
                ..
            }
        ));
        assert_eq!(tokens[1].kind, TokenKind::EndOfLine);
        assert_eq!(tokens[2].text, "two */");
        assert_eq!(tokens[3].text, "x");
    }

    #[test]
    fn unterminated_block_comment_reports_it() {
        let tokens = scan_all("/* dangling");
        assert_eq!(tokens[0].text, "/* dangling");
        assert!(matches!(
            tokens[0].kind,
            TokenKind::Comment {
                terminated: false,
                ..
            }
        ));
    }

    #[test]
    fn line_comment_excludes_the_newline() {
        let tokens = scan_all("x // trailing\ny");
        assert_eq!(tokens[2].text, "// trailing");
        assert_eq!(tokens[3].kind, TokenKind::EndOfLine);
    }

    #[test]
    fn next_skips_whitespace_and_comments_by_default() {
        let mut lexer = Lexer::for_language(&TEST_LANGUAGE);
        lexer.push_source("  // comment\n  foo", "test");
        let token = lexer.next();
        assert_eq!(token.kind, TokenKind::Identifier);
        assert_eq!(token.text, "foo");
    }

    #[test]
    fn peek_does_not_consume() {
        let mut lexer = Lexer::for_language(&TEST_LANGUAGE);
        lexer.whitespace_significant = true;
        lexer.push_source("ab cd", "test");
        assert_eq!(lexer.peek().text, "ab");
        assert_eq!(lexer.peek().text, "ab");
        assert_eq!(lexer.lex().text, "ab");
        assert_eq!(lexer.peek().text, " ");
    }

    #[test]
    fn source_stack_is_lifo() {
        let mut lexer = Lexer::for_language(&TEST_LANGUAGE);
        lexer.push_source("outer", "outer");
        lexer.push_source("inner", "inner");
        assert_eq!(lexer.next().text, "inner");
        lexer.lex();
        assert_eq!(lexer.next().text, "outer");
        lexer.lex();
        assert!(lexer.next().is_eof());
    }

    #[test]
    fn locations_track_lines_and_columns() {
        let mut lexer = Lexer::for_language(&TEST_LANGUAGE);
        lexer.whitespace_significant = true;
        lexer.push_source("ab\ncd", "test");
        let ab = lexer.lex();
        assert_eq!((ab.location.line, ab.location.column), (0, 0));
        let eol = lexer.lex();
        assert_eq!(eol.kind, TokenKind::EndOfLine);
        let cd = lexer.lex();
        assert_eq!((cd.location.line, cd.location.column), (1, 0));
        assert_eq!(cd.location.index, 3);
    }

    #[test]
    fn expect_reports_a_located_error_and_does_not_consume() {
        let mut lexer = Lexer::for_language(&TEST_LANGUAGE);
        lexer.push_source("foo", "main.test");
        let err = lexer
            .expect_symbol('(', "expected '(' after function name")
            .unwrap_err();
        assert_eq!(err.file, "main.test");
        assert!(err.to_string().contains("expected '('"));
        assert_eq!(lexer.next().text, "foo");
    }
}
