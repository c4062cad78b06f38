use kwdsl_storage::GlobalStore;

use super::open_store;
use crate::{fail, GlobalsCommands, OutputFormat};

pub(crate) fn cmd_globals(command: GlobalsCommands, output: OutputFormat, quiet: bool) {
    let store = open_store(output, quiet);
    let outcome = match command {
        GlobalsCommands::List => store.snapshot().map(|vars| {
            print_json(&serde_json::to_value(vars).unwrap_or_default());
        }),
        GlobalsCommands::Get { name } => match store.get(&name) {
            Ok(Some(value)) => {
                print_json(&value);
                Ok(())
            }
            Ok(None) => fail(&format!("global variable '{}' not set", name), output, quiet),
            Err(e) => Err(e),
        },
        GlobalsCommands::Set { name, value } => {
            let value = serde_json::from_str(&value).unwrap_or(serde_json::Value::String(value));
            store.set(&name, value)
        }
        GlobalsCommands::Delete { name } => match store.delete(&name) {
            Ok(true) => Ok(()),
            Ok(false) => fail(&format!("global variable '{}' not set", name), output, quiet),
            Err(e) => Err(e),
        },
        GlobalsCommands::Clear => store.clear(),
    };

    if let Err(e) = outcome {
        fail(&format!("global store error: {}", e), output, quiet);
    }
}

fn print_json(value: &serde_json::Value) {
    let pretty = serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!("serialization error: {}", e));
    println!("{}", pretty);
}
