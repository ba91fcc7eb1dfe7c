use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use eddy::config::Config;
use eddy::services::tracing_setup;
use eddy::EditorContext;

/// Headless driver for the eddy editor core: opens the given files, runs the
/// indexing pipeline and the configured language servers, and reports what
/// came back.
#[derive(Debug, Parser)]
#[command(name = "eddy", version, about)]
struct Cli {
    /// Log file (defaults to <project>/.eddy/eddy.log)
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Theme name (overrides the project settings)
    #[arg(long)]
    theme: Option<String>,

    /// How long to keep pumping language-server traffic, in milliseconds
    #[arg(long, default_value_t = 2000)]
    wait_ms: u64,

    /// Project directory (when the first path is a directory) followed by
    /// the files to open
    paths: Vec<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (project_root, files) = match cli.paths.split_first() {
        Some((first, rest)) if first.is_dir() => (first.clone(), rest.to_vec()),
        _ => (std::env::current_dir()?, cli.paths.clone()),
    };
    let project_root = project_root
        .canonicalize()
        .with_context(|| format!("resolving {}", project_root.display()))?;

    let settings_dir = project_root.join(eddy::config::SETTINGS_DIR);
    std::fs::create_dir_all(&settings_dir)
        .with_context(|| format!("creating {}", settings_dir.display()))?;
    let log_file = cli
        .log_file
        .unwrap_or_else(|| settings_dir.join("eddy.log"));
    tracing_setup::init_global(&log_file);

    let mut config = Config::load(&project_root)?;
    if let Some(theme) = cli.theme {
        config.theme = theme;
    }
    let mut ctx = EditorContext::new(&project_root, config)?;

    for file in &files {
        let name = buffer_name(file, &ctx)?;
        match ctx.open(&name) {
            Ok(id) => {
                if let Some(buffer) = ctx.buffer(id) {
                    tracing::info!(name = %name, lines = buffer.lines.len(), "opened");
                }
            }
            Err(err) => eprintln!("eddy: cannot open {name}: {err:#}"),
        }
    }

    ctx.pump_for(Duration::from_millis(cli.wait_ms));

    for buffer in ctx.buffers() {
        println!(
            "{}: {} lines, {} tokens, {} diagnostics{}",
            buffer.name().unwrap_or("<unnamed>"),
            buffer.lines.len(),
            buffer.tokens.len(),
            buffer.diagnostics.len(),
            if buffer.is_modified() { " (modified)" } else { "" },
        );
    }
    if let Some(message) = &ctx.status_message {
        println!("status: {message}");
    }

    ctx.shutdown();
    ctx.pump_for(Duration::from_millis(100));
    Ok(())
}

/// Project-relative name for a path on the command line, falling back to the
/// absolute path for files outside the project.
fn buffer_name(file: &PathBuf, ctx: &EditorContext) -> anyhow::Result<String> {
    let absolute = if file.is_absolute() {
        file.clone()
    } else {
        std::env::current_dir()?.join(file)
    };
    let name = match absolute.strip_prefix(ctx.project_root()) {
        Ok(relative) => relative.to_string_lossy().into_owned(),
        Err(_) => absolute.to_string_lossy().into_owned(),
    };
    Ok(name)
}
