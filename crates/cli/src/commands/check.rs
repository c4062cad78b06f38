use std::fs;
use std::path::PathBuf;
use std::process;

use kwdsl_core::{parse_recovering, DEFAULT_MAX_ERRORS};

use crate::{report_error, OutputFormat};

pub(crate) fn cmd_check(files: &[PathBuf], ast: bool, output: OutputFormat, quiet: bool) {
    let mut reports = Vec::new();
    let mut failed = false;

    for file in files {
        let source = match fs::read_to_string(file) {
            Ok(s) => s,
            Err(e) => {
                let msg = format!("error reading file '{}': {}", file.display(), e);
                report_error(&msg, output, quiet);
                process::exit(1);
            }
        };
        let parsed = parse_recovering(&source, DEFAULT_MAX_ERRORS);
        failed |= !parsed.errors.is_empty();

        match output {
            OutputFormat::Json => {
                let mut report = serde_json::json!({
                    "file": file.display().to_string(),
                    "valid": parsed.errors.is_empty(),
                    "errors": parsed.errors.iter().map(|e| e.to_json_value()).collect::<Vec<_>>(),
                });
                if ast {
                    report["ast"] = serde_json::to_value(&parsed.program)
                        .unwrap_or(serde_json::Value::Null);
                }
                reports.push(report);
            }
            OutputFormat::Text => {
                if parsed.errors.is_empty() {
                    if !quiet {
                        println!("{}: OK", file.display());
                    }
                    if ast {
                        let pretty = serde_json::to_string_pretty(&parsed.program)
                            .unwrap_or_else(|e| format!("serialization error: {}", e));
                        println!("{}", pretty);
                    }
                } else {
                    for err in &parsed.errors {
                        eprintln!("{}:{}: {}", file.display(), err.line, err.message);
                    }
                }
            }
        }
    }

    if output == OutputFormat::Json {
        let json = serde_json::to_string_pretty(&reports)
            .unwrap_or_else(|e| format!("{{\"error\": \"serialization: {}\"}}", e));
        println!("{}", json);
    }
    if failed {
        process::exit(1);
    }
}
