//! Colour themes and the semantic-token legend mapping.
//!
//! A theme supplies the colour for every display token the index build
//! produces, plus a table of semantic token colours keyed by LSP semantic
//! token type name and a TextMate-style scope list used as a fallback. When
//! a language server announces its `tokenTypes` legend, the legend indices
//! are aligned with the theme: by semantic type name first, by scope second,
//! otherwise left unmapped.

use serde::{Deserialize, Serialize};

use crate::syntax::token::TokenKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 0xff }
    }
}

/// Colours for the lexer-derived token kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntaxColours {
    pub keyword: Rgba,
    pub identifier: Rgba,
    pub number: Rgba,
    pub string: Rgba,
    pub comment: Rgba,
    pub operator: Rgba,
    pub directive: Rgba,
    pub directive_arg: Rgba,
}

/// A semantic token colour, keyed by LSP semantic token type name
/// ("keyword", "function", ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticTokenColour {
    pub token_type: String,
    pub colour: Rgba,
}

/// A TextMate-style scope colour ("entity.name.function", ...). Matched by
/// longest scope prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeColour {
    pub scope: String,
    pub colour: Rgba,
}

/// One resolved legend entry: the server's `tokenTypes` index and the theme
/// colour it maps to.
#[derive(Debug, Clone, Copy)]
struct SemanticMapping {
    legend_index: usize,
    colour: Rgba,
}

/// Fallback scopes for semantic token types the theme has no direct colour
/// for.
const SEMANTIC_SCOPE_FALLBACK: &[(&str, &str)] = &[
    ("type", "entity.name.type"),
    ("class", "entity.name.type"),
    ("enum", "entity.name.type"),
    ("interface", "entity.name.type"),
    ("struct", "entity.name.type"),
    ("typeParameter", "entity.name.type"),
    ("parameter", "variable.parameter"),
    ("variable", "variable.other"),
    ("property", "variable.other.member"),
    ("enumMember", "constant.other"),
    ("function", "entity.name.function"),
    ("method", "entity.name.function"),
    ("macro", "entity.name.function.macro"),
    ("keyword", "keyword"),
    ("modifier", "storage.modifier"),
    ("comment", "comment"),
    ("string", "string"),
    ("number", "constant.numeric"),
    ("regexp", "string.regexp"),
    ("operator", "keyword.operator"),
    ("namespace", "entity.name.namespace"),
];

#[derive(Debug, Clone)]
pub struct Theme {
    pub name: String,
    pub editor_fg: Rgba,
    pub editor_bg: Rgba,
    pub syntax: SyntaxColours,
    pub semantic_colours: Vec<SemanticTokenColour>,
    pub scope_colours: Vec<ScopeColour>,
    semantic_mappings: Vec<SemanticMapping>,
}

impl Theme {
    /// Load a built-in theme by name. Unknown names fall back to the dark
    /// theme.
    pub fn load(name: &str) -> Theme {
        match name {
            "light" => Theme::light(),
            _ => Theme::dark(),
        }
    }

    pub fn dark() -> Theme {
        Theme {
            name: "dark".to_string(),
            editor_fg: Rgba::rgb(0xd4, 0xd4, 0xd4),
            editor_bg: Rgba::rgb(0x1e, 0x1e, 0x1e),
            syntax: SyntaxColours {
                keyword: Rgba::rgb(0x56, 0x9c, 0xd6),
                identifier: Rgba::rgb(0x9c, 0xdc, 0xfe),
                number: Rgba::rgb(0xb5, 0xce, 0xa8),
                string: Rgba::rgb(0xce, 0x91, 0x78),
                comment: Rgba::rgb(0x6a, 0x99, 0x55),
                operator: Rgba::rgb(0xd4, 0xd4, 0xd4),
                directive: Rgba::rgb(0xc5, 0x86, 0xc0),
                directive_arg: Rgba::rgb(0xce, 0x91, 0x78),
            },
            semantic_colours: vec![
                SemanticTokenColour {
                    token_type: "keyword".to_string(),
                    colour: Rgba::rgb(0x56, 0x9c, 0xd6),
                },
                SemanticTokenColour {
                    token_type: "comment".to_string(),
                    colour: Rgba::rgb(0x6a, 0x99, 0x55),
                },
                SemanticTokenColour {
                    token_type: "variable".to_string(),
                    colour: Rgba::rgb(0x9c, 0xdc, 0xfe),
                },
                SemanticTokenColour {
                    token_type: "type".to_string(),
                    colour: Rgba::rgb(0x4e, 0xc9, 0xb0),
                },
                SemanticTokenColour {
                    token_type: "function".to_string(),
                    colour: Rgba::rgb(0xdc, 0xdc, 0xaa),
                },
            ],
            scope_colours: vec![
                ScopeColour {
                    scope: "entity.name.function".to_string(),
                    colour: Rgba::rgb(0xdc, 0xdc, 0xaa),
                },
                ScopeColour {
                    scope: "entity.name.type".to_string(),
                    colour: Rgba::rgb(0x4e, 0xc9, 0xb0),
                },
                ScopeColour {
                    scope: "variable.parameter".to_string(),
                    colour: Rgba::rgb(0x9c, 0xdc, 0xfe),
                },
                ScopeColour {
                    scope: "constant.numeric".to_string(),
                    colour: Rgba::rgb(0xb5, 0xce, 0xa8),
                },
                ScopeColour {
                    scope: "string".to_string(),
                    colour: Rgba::rgb(0xce, 0x91, 0x78),
                },
                ScopeColour {
                    scope: "keyword.operator".to_string(),
                    colour: Rgba::rgb(0xd4, 0xd4, 0xd4),
                },
            ],
            semantic_mappings: Vec::new(),
        }
    }

    pub fn light() -> Theme {
        let mut theme = Theme::dark();
        theme.name = "light".to_string();
        theme.editor_fg = Rgba::rgb(0x1e, 0x1e, 0x1e);
        theme.editor_bg = Rgba::rgb(0xff, 0xff, 0xff);
        theme.syntax.keyword = Rgba::rgb(0x00, 0x00, 0xff);
        theme.syntax.identifier = Rgba::rgb(0x00, 0x10, 0x80);
        theme.syntax.number = Rgba::rgb(0x09, 0x86, 0x58);
        theme.syntax.string = Rgba::rgb(0xa3, 0x15, 0x15);
        theme.syntax.comment = Rgba::rgb(0x00, 0x80, 0x00);
        theme
    }

    /// The display colour for a lexer token kind; `None` means the editor
    /// default foreground.
    pub fn token_colour(&self, kind: &TokenKind) -> Option<Rgba> {
        match kind {
            TokenKind::Keyword { .. } => Some(self.syntax.keyword),
            TokenKind::Identifier => Some(self.syntax.identifier),
            TokenKind::Number { .. } => Some(self.syntax.number),
            TokenKind::QuotedString { .. } => Some(self.syntax.string),
            TokenKind::Comment { .. } => Some(self.syntax.comment),
            TokenKind::Symbol { .. } => Some(self.syntax.operator),
            TokenKind::Directive { .. } => Some(self.syntax.directive),
            TokenKind::DirectiveArg => Some(self.syntax.directive_arg),
            _ => None,
        }
    }

    /// Rebuild the legend mapping from a server's `tokenTypes` list.
    pub fn align_semantic_legend(&mut self, token_types: &[String]) {
        self.semantic_mappings.clear();
        for (legend_index, token_type) in token_types.iter().enumerate() {
            self.map_semantic_type(legend_index, token_type);
        }
    }

    /// Map one legend entry: direct semantic colour by name, scope fallback,
    /// else unmapped.
    pub fn map_semantic_type(&mut self, legend_index: usize, token_type: &str) {
        if let Some(colour) = self
            .semantic_colours
            .iter()
            .find(|c| c.token_type == token_type)
            .map(|c| c.colour)
        {
            tracing::trace!(legend_index, token_type, "mapped semantic type directly");
            self.semantic_mappings.push(SemanticMapping {
                legend_index,
                colour,
            });
            return;
        }
        if let Some(scope) = SEMANTIC_SCOPE_FALLBACK
            .iter()
            .find(|(ty, _)| *ty == token_type)
            .map(|(_, scope)| *scope)
        {
            if let Some(colour) = self.colour_for_scope(scope) {
                tracing::trace!(legend_index, token_type, scope, "mapped semantic type via scope");
                self.semantic_mappings.push(SemanticMapping {
                    legend_index,
                    colour,
                });
                return;
            }
        }
        tracing::trace!(legend_index, token_type, "semantic type not mapped");
    }

    /// Longest-prefix lookup in the scope list.
    pub fn colour_for_scope(&self, scope: &str) -> Option<Rgba> {
        self.scope_colours
            .iter()
            .filter(|sc| scope.starts_with(sc.scope.as_str()))
            .max_by_key(|sc| sc.scope.len())
            .map(|sc| sc.colour)
    }

    pub fn semantic_colour(&self, legend_index: usize) -> Option<Rgba> {
        self.semantic_mappings
            .iter()
            .find(|m| m.legend_index == legend_index)
            .map(|m| m.colour)
    }
}

impl Default for Theme {
    fn default() -> Self {
        Theme::dark()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::token::NumberKind;

    #[test]
    fn token_colours_cover_the_display_kinds() {
        let theme = Theme::dark();
        assert_eq!(
            theme.token_colour(&TokenKind::Keyword { code: 0 }),
            Some(theme.syntax.keyword)
        );
        assert_eq!(
            theme.token_colour(&TokenKind::Number {
                kind: NumberKind::Hex
            }),
            Some(theme.syntax.number)
        );
        assert_eq!(theme.token_colour(&TokenKind::Whitespace), None);
        assert_eq!(theme.token_colour(&TokenKind::EndOfLine), None);
    }

    #[test]
    fn legend_maps_by_name_then_scope() {
        let mut theme = Theme::dark();
        theme.align_semantic_legend(&[
            "keyword".to_string(),   // direct
            "method".to_string(),    // via entity.name.function scope
            "decorator".to_string(), // unmapped
        ]);
        assert_eq!(theme.semantic_colour(0), Some(theme.syntax.keyword));
        assert_eq!(
            theme.semantic_colour(1),
            Some(Rgba::rgb(0xdc, 0xdc, 0xaa))
        );
        assert_eq!(theme.semantic_colour(2), None);
    }

    #[test]
    fn realignment_replaces_previous_mappings() {
        let mut theme = Theme::dark();
        theme.align_semantic_legend(&["keyword".to_string()]);
        theme.align_semantic_legend(&["comment".to_string()]);
        assert_eq!(theme.semantic_colour(0), Some(theme.syntax.comment));
    }

    #[test]
    fn scope_lookup_prefers_the_longest_prefix() {
        let mut theme = Theme::dark();
        theme.scope_colours.push(ScopeColour {
            scope: "entity.name".to_string(),
            colour: Rgba::rgb(1, 2, 3),
        });
        // "entity.name.function.macro" prefers the longer prefix.
        assert_eq!(
            theme.colour_for_scope("entity.name.function.macro"),
            Some(Rgba::rgb(0xdc, 0xdc, 0xaa))
        );
        assert_eq!(
            theme.colour_for_scope("entity.name.tag"),
            Some(Rgba::rgb(1, 2, 3))
        );
    }
}
