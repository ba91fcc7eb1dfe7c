// Editor core library - exposes the buffer engine, the lexer framework and
// the LSP client for use by frontends and by the integration tests.

pub mod app;
pub mod config;
pub mod model;
pub mod services;
pub mod syntax;
pub mod theme;

pub use app::editor::EditorContext;
pub use model::buffer::Buffer;
pub use services::lsp::client::LspError;
pub use syntax::lexer::LexerError;
