//! A scriptable stdio language server for the integration tests.
//!
//! Speaks real `Content-Length` framing. Answers `initialize` with a
//! semantic-tokens legend, `textDocument/semanticTokens/full` with a fixed
//! token set, publishes one diagnostic on `didOpen`, and appends every
//! received method to the log file given as the first argument (`didChange`
//! lines also carry the document version).

use std::io::{Read, Write};

use serde_json::{json, Value};

use eddy::services::lsp::transport::{encode_frame, FrameScanner};

fn main() {
    let log_path = std::env::args().nth(1);
    let mut log = log_path.map(|path| {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .expect("fake_lsp: cannot open the method log")
    });

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut input = stdin.lock();
    let mut output = stdout.lock();
    let mut scanner = FrameScanner::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = input.read(&mut buf).unwrap_or(0);
        if n == 0 {
            break;
        }
        scanner.extend(&buf[..n]);
        while let Some(body) = scanner.next_frame() {
            if let Ok(message) = serde_json::from_slice::<Value>(&body) {
                handle(&message, &mut output, log.as_mut());
            }
        }
    }
}

fn log_method(log: Option<&mut std::fs::File>, line: &str) {
    if let Some(log) = log {
        let _ = writeln!(log, "{line}");
        let _ = log.flush();
    }
}

fn respond(output: &mut impl Write, id: &Value, result: Value) {
    let reply = json!({"jsonrpc": "2.0", "id": id, "result": result});
    let _ = output.write_all(&encode_frame(&reply));
    let _ = output.flush();
}

fn notify(output: &mut impl Write, method: &str, params: Value) {
    let message = json!({"jsonrpc": "2.0", "method": method, "params": params});
    let _ = output.write_all(&encode_frame(&message));
    let _ = output.flush();
}

fn handle(message: &Value, output: &mut impl Write, log: Option<&mut std::fs::File>) {
    let Some(method) = message.get("method").and_then(Value::as_str) else {
        return;
    };
    let params = message.get("params").cloned().unwrap_or(Value::Null);
    if method == "textDocument/didChange" {
        let version = params["textDocument"]["version"].as_i64().unwrap_or(-1);
        log_method(log, &format!("{method} {version}"));
    } else {
        log_method(log, method);
    }

    let id = message.get("id");
    match (method, id) {
        ("initialize", Some(id)) => {
            respond(
                output,
                id,
                json!({
                    "capabilities": {
                        "textDocumentSync": 2,
                        "semanticTokensProvider": {
                            "legend": {
                                "tokenTypes": ["comment", "keyword", "variable", "type", "function"],
                                "tokenModifiers": []
                            },
                            "full": true
                        }
                    },
                    "serverInfo": {"name": "fake-lsp", "version": "1.0"}
                }),
            );
        }
        ("textDocument/semanticTokens/full", Some(id)) => {
            // Recolour the first three-byte token of line 0 as a "function".
            respond(output, id, json!({"resultId": "1", "data": [0, 0, 3, 4, 0]}));
        }
        ("textDocument/formatting", Some(id)) => {
            // Collapse the double space in "int  x;" down to one.
            respond(
                output,
                id,
                json!([{
                    "range": {
                        "start": {"line": 0, "character": 3},
                        "end": {"line": 0, "character": 4}
                    },
                    "newText": ""
                }]),
            );
        }
        ("shutdown", Some(id)) => {
            respond(output, id, Value::Null);
        }
        ("exit", _) => {
            std::process::exit(0);
        }
        ("textDocument/didOpen", None) => {
            let uri = params["textDocument"]["uri"].clone();
            notify(
                output,
                "textDocument/publishDiagnostics",
                json!({
                    "uri": uri,
                    "diagnostics": [{
                        "range": {
                            "start": {"line": 0, "character": 0},
                            "end": {"line": 0, "character": 3}
                        },
                        "severity": 2,
                        "message": "fake warning"
                    }]
                }),
            );
        }
        (_, Some(id)) => {
            respond(output, id, Value::Null);
        }
        _ => {}
    }
}
