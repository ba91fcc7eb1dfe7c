//! Shared helpers for the end-to-end tests: a project scaffold wired to the
//! fake language server, and polling utilities.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use eddy::config::{Config, LspServerConfig};
use eddy::EditorContext;

pub fn fake_lsp_path() -> &'static str {
    env!("CARGO_BIN_EXE_fake_lsp")
}

pub fn config_with_fake_lsp(method_log: &Path) -> Config {
    let mut config = Config::default();
    config.lsp.insert(
        "c".to_string(),
        LspServerConfig {
            command: fake_lsp_path().to_string(),
            args: vec![method_log.to_string_lossy().into_owned()],
            enabled: true,
            initialization_options: None,
        },
    );
    config
}

/// A temp project containing `main.c` and an editor context talking to the
/// fake server. Returns the tempdir guard, the context and the method log
/// path.
pub fn fake_lsp_project(source: &str) -> (tempfile::TempDir, EditorContext, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let method_log = dir.path().join("lsp-methods.log");
    std::fs::write(dir.path().join("main.c"), source).expect("write main.c");
    let config = config_with_fake_lsp(&method_log);
    let ctx = EditorContext::new(dir.path(), config).expect("editor context");
    (dir, ctx, method_log)
}

/// Pump the context until the predicate holds or the timeout elapses.
pub fn wait_until(
    ctx: &mut EditorContext,
    timeout: Duration,
    mut predicate: impl FnMut(&EditorContext) -> bool,
) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        ctx.process_pending();
        if predicate(ctx) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

pub fn logged_methods(method_log: &Path) -> Vec<String> {
    std::fs::read_to_string(method_log)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}
