//! Stdout reporting for the one-shot commands

use std::io::{self, Write};

use serde_json::{json, Value};

use super::errors::CliResult;

/// Print `{"command": .., "status": "ok", "data": ..}` as indented JSON
pub fn write_response(command: &str, data: Value) -> CliResult<()> {
    let report = json!({
        "command": command,
        "status": "ok",
        "data": data,
    });

    let mut out = io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, &report)?;
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}
