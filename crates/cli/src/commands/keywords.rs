use kwdsl_eval::KeywordRegistry;

use crate::OutputFormat;

pub(crate) fn cmd_keywords(output: OutputFormat) {
    let registry = KeywordRegistry::with_builtins();
    match output {
        OutputFormat::Text => print!("{}", registry.generate_docs()),
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&registry.specs())
                .unwrap_or_else(|e| format!("{{\"error\": \"serialization: {}\"}}", e));
            println!("{}", json);
        }
    }
}
