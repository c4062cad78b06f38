//! `kwdsl run`: execute programs file by file, with once-per-directory
//! `setup.dsl` / `teardown.dsl`.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use kwdsl_eval::{ConfigVars, ExecError, Executor, ExecutorOptions, KeywordRegistry};
use kwdsl_remote::{RemoteKeywordManager, API_KEY_ENV};
use kwdsl_storage::{FileStore, OnceMarker};
use serde::Serialize;

use super::{as_dyn, open_store};
use crate::{fail, OutputFormat};

const SETUP_FILE: &str = "setup.dsl";
const TEARDOWN_FILE: &str = "teardown.dsl";

pub(crate) struct RunOptions<'a> {
    pub paths: &'a [PathBuf],
    pub vars: &'a [PathBuf],
    pub keep_variables: bool,
    pub session: Option<&'a str>,
    pub output: OutputFormat,
    pub quiet: bool,
}

#[derive(Debug, Serialize)]
struct FileOutcome {
    file: String,
    passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl FileOutcome {
    fn new(file: &Path, result: Result<(), ExecError>) -> Self {
        match result {
            Ok(()) => FileOutcome {
                file: file.display().to_string(),
                passed: true,
                line: None,
                error: None,
            },
            Err(e) => FileOutcome {
                file: file.display().to_string(),
                passed: false,
                line: e.line(),
                error: Some(e.to_string()),
            },
        }
    }
}

/// Test files grouped by directory, in path order.
#[derive(Debug, Default, PartialEq)]
struct Plan {
    dirs: BTreeMap<PathBuf, Vec<PathBuf>>,
}

impl Plan {
    fn collect(paths: &[PathBuf]) -> Result<Self, String> {
        let mut plan = Plan::default();
        for path in paths {
            if path.is_dir() {
                let entries = fs::read_dir(path)
                    .map_err(|e| format!("cannot read directory '{}': {}", path.display(), e))?;
                let mut files: Vec<PathBuf> = entries
                    .filter_map(|entry| entry.ok().map(|e| e.path()))
                    .filter(|p| p.is_file() && is_test_file(p))
                    .collect();
                files.sort();
                plan.dirs.entry(path.clone()).or_default().extend(files);
            } else if path.is_file() {
                let dir = path
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| PathBuf::from("."));
                plan.dirs.entry(dir).or_default().push(path.clone());
            } else {
                return Err(format!("no such file or directory: '{}'", path.display()));
            }
        }
        Ok(plan)
    }
}

fn is_test_file(path: &Path) -> bool {
    let is_dsl = path.extension().is_some_and(|ext| ext == "dsl");
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    is_dsl && name != SETUP_FILE && name != TEARDOWN_FILE
}

/// Load and merge `--vars` files. `.toml` files are TOML, anything else JSON.
fn load_config(files: &[PathBuf]) -> Result<ConfigVars, String> {
    let mut config = ConfigVars::new();
    for file in files {
        let text = fs::read_to_string(file)
            .map_err(|e| format!("error reading file '{}': {}", file.display(), e))?;
        let json: serde_json::Value = if file.extension().is_some_and(|ext| ext == "toml") {
            toml::from_str(&text)
                .map_err(|e| format!("error parsing TOML in '{}': {}", file.display(), e))?
        } else {
            serde_json::from_str(&text)
                .map_err(|e| format!("error parsing JSON in '{}': {}", file.display(), e))?
        };
        let layer =
            ConfigVars::from_json(json).map_err(|e| format!("'{}': {}", file.display(), e))?;
        config.merge(layer);
    }
    Ok(config)
}

struct Runner {
    store: Arc<FileStore>,
    config: ConfigVars,
    options: ExecutorOptions,
    api_key: Option<String>,
}

impl Runner {
    fn run_file(&self, file: &Path, dir: &Path) -> Result<(), ExecError> {
        let content = fs::read_to_string(file).map_err(|e| ExecError::Import {
            path: file.display().to_string(),
            message: e.to_string(),
        })?;
        let registry = Arc::new(KeywordRegistry::with_builtins());
        let mut executor = Executor::new(registry, as_dyn(&self.store))
            .with_config(self.config.clone())
            .with_options(self.options.clone().with_base_dir(dir))
            .with_remote_connector(Arc::new(RemoteKeywordManager::with_api_key(
                self.api_key.clone(),
            )));
        let id = file.display().to_string();
        executor.execute_from_content(&content, Some(&id), BTreeMap::new())?;
        Ok(())
    }

    /// Run `dir/<name>` through the marker if the file exists.
    fn run_hook_file(
        &self,
        marker: &OnceMarker,
        dir: &Path,
        name: &str,
    ) -> Result<(), ExecError> {
        let file = dir.join(name);
        if !file.is_file() {
            return Ok(());
        }
        let phase = name.trim_end_matches(".dsl");
        let ran = marker.run_once(dir, phase, || self.run_file(&file, dir))?;
        if ran {
            tracing::info!(dir = %dir.display(), phase, "directory hook executed");
        }
        Ok(())
    }
}

pub(crate) fn cmd_run(opts: RunOptions<'_>) {
    let RunOptions {
        paths,
        vars,
        keep_variables,
        session,
        output,
        quiet,
    } = opts;

    let plan = Plan::collect(paths).unwrap_or_else(|e| fail(&e, output, quiet));
    let config = load_config(vars).unwrap_or_else(|e| fail(&e, output, quiet));

    let store = open_store(output, quiet);
    let session_dir = match session {
        Some(id) => store.dir().join(format!("session-{}", id)),
        None => store.dir().join(format!("session-{}", process::id())),
    };
    let marker = OnceMarker::new(session_dir);

    let mut options = ExecutorOptions::from_env();
    options.keep_variables |= keep_variables;
    let runner = Runner {
        store,
        config,
        options,
        api_key: std::env::var(API_KEY_ENV).ok(),
    };

    let mut outcomes = Vec::new();
    let mut hook_dirs = BTreeSet::new();
    for (dir, files) in &plan.dirs {
        if let Err(e) = runner.run_hook_file(&marker, dir, SETUP_FILE) {
            let message = format!("setup failed: {}", e);
            for file in files {
                let outcome = FileOutcome {
                    file: file.display().to_string(),
                    passed: false,
                    line: None,
                    error: Some(message.clone()),
                };
                if output == OutputFormat::Text && !quiet {
                    print_outcome(&outcome);
                }
                outcomes.push(outcome);
            }
            continue;
        }
        hook_dirs.insert(dir.clone());
        for file in files {
            let outcome = FileOutcome::new(file, runner.run_file(file, dir));
            if output == OutputFormat::Text && !quiet {
                print_outcome(&outcome);
            }
            outcomes.push(outcome);
        }
    }

    for dir in &hook_dirs {
        if let Err(e) = runner.run_hook_file(&marker, dir, TEARDOWN_FILE) {
            tracing::warn!(dir = %dir.display(), error = %e, "directory teardown failed");
        }
    }
    // a session chosen by the caller is shared with other workers
    if session.is_none() {
        if let Err(e) = marker.reset() {
            tracing::warn!(error = %e, "cannot remove session markers");
        }
    }

    let failed = outcomes.iter().filter(|o| !o.passed).count();
    match output {
        OutputFormat::Json => {
            let report = serde_json::json!({
                "passed": outcomes.len() - failed,
                "failed": failed,
                "files": outcomes,
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&report)
                    .unwrap_or_else(|e| format!("{{\"error\": \"serialization: {}\"}}", e))
            );
        }
        OutputFormat::Text => {
            if !quiet {
                println!();
                println!("{} passed, {} failed", outcomes.len() - failed, failed);
            }
        }
    }

    if failed > 0 {
        process::exit(1);
    }
}

fn print_outcome(outcome: &FileOutcome) {
    if outcome.passed {
        println!("PASS {}", outcome.file);
    } else {
        println!(
            "FAIL {}: {}",
            outcome.file,
            outcome.error.as_deref().unwrap_or("")
        );
    }
}
