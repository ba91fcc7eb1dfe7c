//! End-to-end tests against the fake language server: the initialize
//! barrier, document-sync ordering, semantic-token recolouring and
//! diagnostics publication.

mod common;

use std::time::Duration;

use common::{fake_lsp_project, logged_methods, wait_until};
use eddy::theme::Rgba;

const TIMEOUT: Duration = Duration::from_secs(10);

/// The fake server recolours the first three-byte token of line 0 with
/// legend index 4 ("function").
const FUNCTION_COLOUR: Rgba = Rgba::rgb(0xdc, 0xdc, 0xaa);

#[test]
fn initialize_once_then_document_sync_and_semantic_tokens() {
    let (_dir, mut ctx, method_log) = fake_lsp_project("int x;\nint y;\n");
    let id = ctx.open("main.c").expect("open main.c");

    let recoloured = wait_until(&mut ctx, TIMEOUT, |ctx| {
        ctx.buffer(id)
            .and_then(|buffer| buffer.tokens.first())
            .map_or(false, |token| token.colour == FUNCTION_COLOUR)
    });
    let methods = logged_methods(&method_log);
    assert!(
        recoloured,
        "semantic tokens never recoloured the buffer; methods seen: {methods:?}"
    );

    let initialize_count = methods.iter().filter(|m| *m == "initialize").count();
    assert_eq!(initialize_count, 1, "methods seen: {methods:?}");

    let position = |name: &str| methods.iter().position(|m| m == name);
    let initialize = position("initialize").expect("initialize sent");
    let initialized = position("initialized").expect("initialized sent");
    let did_open = position("textDocument/didOpen").expect("didOpen sent");
    let semantic = position("textDocument/semanticTokens/full").expect("semantic tokens requested");
    assert!(initialize < initialized, "methods seen: {methods:?}");
    assert!(initialized < did_open, "methods seen: {methods:?}");
    assert!(did_open < semantic, "methods seen: {methods:?}");

    ctx.shutdown();
}

#[test]
fn published_diagnostics_land_on_the_buffer_and_its_lines() {
    let (_dir, mut ctx, _log) = fake_lsp_project("int x;\nint y;\n");
    let id = ctx.open("main.c").expect("open main.c");

    let published = wait_until(&mut ctx, TIMEOUT, |ctx| {
        ctx.buffer(id)
            .map_or(false, |buffer| !buffer.diagnostics.is_empty())
    });
    assert!(published, "diagnostics never arrived");

    let buffer = ctx.buffer(id).expect("buffer");
    assert_eq!(buffer.diagnostics[0].message, "fake warning");
    // The re-index after publication attaches the per-line run.
    assert_eq!(buffer.lines[0].num_diagnostics, 1);
    assert_eq!(buffer.lines[0].first_diagnostic, 0);
    assert_eq!(buffer.lines[1].num_diagnostics, 0);

    ctx.shutdown();
}

#[test]
fn did_change_versions_strictly_increase() {
    let (_dir, mut ctx, method_log) = fake_lsp_project("int x;\n");
    let id = ctx.open("main.c").expect("open main.c");

    for text in ["a", "b", "c"] {
        ctx.buffer_mut(id).expect("buffer").insert(text, 0);
    }

    let logged = wait_until(&mut ctx, TIMEOUT, |_| {
        logged_methods(&method_log)
            .iter()
            .filter(|m| m.starts_with("textDocument/didChange"))
            .count()
            >= 3
    });
    assert!(logged, "didChange notifications never arrived");

    let versions: Vec<i64> = logged_methods(&method_log)
        .iter()
        .filter_map(|line| line.strip_prefix("textDocument/didChange "))
        .map(|version| version.parse().expect("version in the log"))
        .collect();
    assert!(versions.len() >= 3);
    assert!(
        versions.windows(2).all(|w| w[0] < w[1]),
        "versions not strictly increasing: {versions:?}"
    );

    ctx.shutdown();
}

#[test]
fn save_and_close_reach_the_server() {
    let (_dir, mut ctx, method_log) = fake_lsp_project("int x;\n");
    let id = ctx.open("main.c").expect("open main.c");

    ctx.buffer_mut(id).expect("buffer").insert("y", 0);
    ctx.buffer_mut(id).expect("buffer").save().expect("save");
    ctx.close_buffer(id);

    let seen = wait_until(&mut ctx, TIMEOUT, |_| {
        let methods = logged_methods(&method_log);
        methods.iter().any(|m| m == "textDocument/didSave")
            && methods.iter().any(|m| m == "textDocument/didClose")
    });
    assert!(seen, "didSave/didClose never arrived: {:?}", logged_methods(&method_log));

    let methods = logged_methods(&method_log);
    let save = methods.iter().position(|m| m == "textDocument/didSave").unwrap();
    let close = methods.iter().position(|m| m == "textDocument/didClose").unwrap();
    assert!(save < close);

    ctx.shutdown();
}

#[test]
fn concurrent_initialise_sends_exactly_one_initialize() {
    let dir = tempfile::tempdir().expect("tempdir");
    let method_log = dir.path().join("methods.log");
    let config = common::config_with_fake_lsp(&method_log);
    let server_config = config.lsp_for("c").expect("fake server configured").clone();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("tokio runtime");
    let lsp = eddy::services::lsp::client::LspRuntime::spawn(
        runtime.handle(),
        &server_config,
        "c",
        "file:///tmp".to_string(),
        &dir.path().join("stderr.log"),
    )
    .expect("spawn fake server");

    let mut workers = Vec::new();
    for _ in 0..4 {
        let handle = lsp.handle().clone();
        workers.push(std::thread::spawn(move || {
            handle.ensure_initialized().expect("initialization succeeds");
            handle.capabilities().is_some()
        }));
    }
    for worker in workers {
        assert!(worker.join().expect("worker thread"));
    }

    assert_eq!(
        lsp.handle().phase(),
        eddy::services::lsp::client::Phase::Ready
    );
    let initialize_count = logged_methods(&method_log)
        .iter()
        .filter(|m| *m == "initialize")
        .count();
    assert_eq!(initialize_count, 1);

    lsp.shutdown();
}

#[test]
fn formatting_edits_are_applied_through_the_undo_log() {
    let (_dir, mut ctx, _log) = fake_lsp_project("int  x;\n");
    let id = ctx.open("main.c").expect("open main.c");
    ctx.format_buffer(id);

    let formatted = wait_until(&mut ctx, TIMEOUT, |ctx| {
        ctx.buffer(id).map_or(false, |buffer| buffer.bytes() == b"int x;\n")
    });
    assert!(formatted, "formatting edit never applied");

    // The edit went through the ordinary edit path, so it is undoable.
    ctx.buffer_mut(id).expect("buffer").undo();
    assert_eq!(ctx.buffer(id).expect("buffer").bytes(), b"int  x;\n");

    ctx.shutdown();
}
