//! Blocking client for the remote keyword protocol and the executor-side
//! connector that turns a remote catalog into local `alias|name` keywords.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use kwdsl_eval::{
    ExecError, Invocation, KeywordRegistry, KeywordSource, KeywordSpec, RemoteConnector, Value,
};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::RemoteError;
use crate::protocol::{
    methods, AuthRequest, Empty, GetVariableRequest, NameRequest, RunKeywordRequest,
    RunKeywordResponse, SetVariableRequest, Status, SyncVariablesRequest, VariableResponse,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

pub struct RemoteClient {
    base_url: String,
    api_key: Option<String>,
    agent: ureq::Agent,
}

impl RemoteClient {
    pub fn new(url: &str, api_key: Option<String>) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(REQUEST_TIMEOUT))
            .build();
        RemoteClient {
            base_url: url.trim_end_matches('/').to_owned(),
            api_key,
            agent: config.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.base_url
    }

    fn call<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        method: &str,
        body: &Req,
    ) -> Result<Resp, RemoteError> {
        let url = format!("{}/rpc/{}", self.base_url, method);
        let response = self
            .agent
            .post(&url)
            .header("content-type", "application/json")
            .send_json(body)
            .map_err(|e| RemoteError::Transport {
                url: url.clone(),
                message: e.to_string(),
            })?;
        response
            .into_body()
            .read_json::<Resp>()
            .map_err(|e| RemoteError::Protocol {
                url,
                message: e.to_string(),
            })
    }

    pub fn health(&self) -> Result<serde_json::Value, RemoteError> {
        let url = format!("{}/health", self.base_url);
        let response = self.agent.get(&url).call().map_err(|e| RemoteError::Transport {
            url: url.clone(),
            message: e.to_string(),
        })?;
        response
            .into_body()
            .read_json()
            .map_err(|e| RemoteError::Protocol {
                url,
                message: e.to_string(),
            })
    }

    pub fn authenticate(&self) -> Result<bool, RemoteError> {
        self.call(methods::AUTHENTICATE, &self.auth())
    }

    pub fn keyword_names(&self) -> Result<Vec<String>, RemoteError> {
        self.call(methods::GET_KEYWORD_NAMES, &Empty {})
    }

    pub fn keyword_arguments(&self, name: &str) -> Result<Vec<String>, RemoteError> {
        self.call(
            methods::GET_KEYWORD_ARGUMENTS,
            &NameRequest {
                name: name.to_owned(),
            },
        )
    }

    pub fn keyword_documentation(&self, name: &str) -> Result<String, RemoteError> {
        self.call(
            methods::GET_KEYWORD_DOCUMENTATION,
            &NameRequest {
                name: name.to_owned(),
            },
        )
    }

    pub fn run_keyword(
        &self,
        name: &str,
        args: BTreeMap<String, serde_json::Value>,
    ) -> Result<RunKeywordResponse, RemoteError> {
        self.call(
            methods::RUN_KEYWORD,
            &RunKeywordRequest {
                name: name.to_owned(),
                args,
                api_key: self.api_key.clone(),
            },
        )
    }

    pub fn sync_variables(
        &self,
        variables: BTreeMap<String, serde_json::Value>,
    ) -> Result<VariableResponse, RemoteError> {
        self.call(
            methods::SYNC_VARIABLES_FROM_CLIENT,
            &SyncVariablesRequest {
                variables,
                api_key: self.api_key.clone(),
            },
        )
    }

    pub fn variables(&self) -> Result<VariableResponse, RemoteError> {
        self.call(methods::GET_VARIABLES_FOR_CLIENT, &self.auth())
    }

    pub fn set_shared_variable(
        &self,
        name: &str,
        value: serde_json::Value,
    ) -> Result<VariableResponse, RemoteError> {
        self.call(
            methods::SET_SHARED_VARIABLE,
            &SetVariableRequest {
                name: name.to_owned(),
                value,
                api_key: self.api_key.clone(),
            },
        )
    }

    pub fn shared_variable(&self, name: &str) -> Result<VariableResponse, RemoteError> {
        self.call(
            methods::GET_SHARED_VARIABLE,
            &GetVariableRequest {
                name: name.to_owned(),
                api_key: self.api_key.clone(),
            },
        )
    }

    pub fn list_shared_variables(&self) -> Result<VariableResponse, RemoteError> {
        self.call(methods::LIST_SHARED_VARIABLES, &self.auth())
    }

    fn auth(&self) -> AuthRequest {
        AuthRequest {
            api_key: self.api_key.clone(),
        }
    }
}

// ──────────────────────────────────────────────
// Executor integration
// ──────────────────────────────────────────────

/// Connects `@remote` imports: one client per alias, each remote keyword
/// registered locally as `alias|name`.
#[derive(Default)]
pub struct RemoteKeywordManager {
    api_key: Option<String>,
    clients: Mutex<BTreeMap<String, Arc<RemoteClient>>>,
}

impl RemoteKeywordManager {
    pub fn new() -> Self {
        RemoteKeywordManager::default()
    }

    pub fn with_api_key(api_key: Option<String>) -> Self {
        RemoteKeywordManager {
            api_key: api_key.filter(|k| !k.is_empty()),
            clients: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn client(&self, alias: &str) -> Option<Arc<RemoteClient>> {
        let clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        clients.get(alias).cloned()
    }

    pub fn aliases(&self) -> Vec<String> {
        let clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        clients.keys().cloned().collect()
    }
}

impl RemoteConnector for RemoteKeywordManager {
    fn connect(
        &self,
        url: &str,
        alias: &str,
        sync_vars: &BTreeMap<String, Value>,
        registry: &KeywordRegistry,
    ) -> Result<usize, ExecError> {
        let client = Arc::new(RemoteClient::new(url, self.api_key.clone()));
        if !client.authenticate()? {
            return Err(RemoteError::Unauthorized {
                url: client.url().to_owned(),
            }
            .into());
        }

        let names = client.keyword_names()?;
        for name in &names {
            let params = client.keyword_arguments(name)?;
            let doc = client.keyword_documentation(name)?;
            // identity mapping: the server translates display names
            let mut spec = KeywordSpec::new(format!("{}|{}", alias, name))
                .category("remote")
                .doc(&doc)
                .source(KeywordSource::Remote {
                    alias: alias.to_owned(),
                    url: client.url().to_owned(),
                });
            for p in &params {
                spec = spec.param(p, p, "");
            }

            let remote = client.clone();
            let remote_name = name.clone();
            registry.register(spec, move |inv| invoke_remote(&remote, &remote_name, inv));
        }

        if !sync_vars.is_empty() {
            let variables = sync_vars
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect();
            let reply = client.sync_variables(variables)?;
            if !reply.is_success() {
                tracing::warn!(
                    alias,
                    error = reply.error.as_deref().unwrap_or(""),
                    "variable sync rejected"
                );
            }
        }

        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        clients.insert(alias.to_owned(), client);
        Ok(names.len())
    }
}

fn invoke_remote(
    client: &RemoteClient,
    name: &str,
    inv: &mut Invocation<'_>,
) -> Result<Value, ExecError> {
    let args = inv
        .args
        .values()
        .iter()
        .map(|(k, v)| (k.clone(), v.to_json()))
        .collect();
    tracing::debug!(keyword = name, url = client.url(), "remote call");
    let response = client.run_keyword(name, args)?;
    match response.status {
        Status::Pass => Ok(response.value.map(Value::from).unwrap_or_default()),
        Status::Fail => Err(ExecError::Remote {
            keyword: inv.keyword.clone(),
            message: response.error.unwrap_or_default(),
            traceback: response.traceback,
        }),
    }
}
