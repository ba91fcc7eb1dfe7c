//! LSP (Language Server Protocol) client.
//!
//! One [`client::LspRuntime`] runs per language server. The synchronous
//! editor side talks to it through a cheap-to-clone [`client::LspHandle`];
//! the server side is a tokio task that owns the child process and performs
//! all pipe I/O.
//!
//! ```text
//! main loop (EditorContext)                 tokio task (one per server)
//! ┌──────────────────────────┐   frames    ┌─────────────────────────────┐
//! │ LspHandle                │ ──────────▶ │ write loop: one contiguous  │
//! │  - ensure_initialized()  │  unbounded  │ write per frame to stdin    │
//! │  - did_open/did_change/… │   channel   │                             │
//! │  - requests + req table  │             │ read loop: bytes → scanner  │
//! │                          │ ◀────────── │ → frames → dispatch         │
//! │ process_pending() drains │  submission │  - responses matched by id  │
//! │ the submission queue     │    queue    │  - initialize special-cased │
//! └──────────────────────────┘             └─────────────────────────────┘
//! ```
//!
//! The `initialize` handshake is a one-shot barrier: the first caller moves
//! the runtime from `Uninitialised` to `Starting` and sends the one
//! `initialize` request of the runtime's lifetime; everyone else blocks on a
//! condition variable until the reply flips the state to `Ready`, caches the
//! server capabilities and emits the `initialized` notification. Responses
//! are demultiplexed by id through a slot-reusing pending-request table;
//! replies whose target is gone are dropped with a log line. All buffer and
//! index mutation happens on the main loop - the reader task only parses
//! frames and enqueues them.

pub mod client;
pub mod diagnostics;
pub mod jsonrpc;
pub mod semantic_tokens;
pub mod transport;
