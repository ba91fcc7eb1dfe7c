pub mod lsp;
pub mod tracing_setup;
