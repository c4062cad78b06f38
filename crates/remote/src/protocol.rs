//! Wire types for the remote keyword protocol.
//!
//! Every method is `POST /rpc/<method>` with a JSON body. Keyword execution
//! answers with a [`RunKeywordResponse`]; shared-variable methods answer
//! with a [`VariableResponse`]. Authentication failures are reported in the
//! response body, never as HTTP errors.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// Default port of the remote keyword server.
pub const DEFAULT_PORT: u16 = 8270;

/// Environment variable holding the server's shared secret.
pub const API_KEY_ENV: &str = "KWDSL_API_KEY";

pub mod methods {
    pub const GET_KEYWORD_NAMES: &str = "get_keyword_names";
    pub const GET_KEYWORD_ARGUMENTS: &str = "get_keyword_arguments";
    pub const GET_KEYWORD_DOCUMENTATION: &str = "get_keyword_documentation";
    pub const RUN_KEYWORD: &str = "run_keyword";
    pub const AUTHENTICATE: &str = "authenticate";
    pub const SYNC_VARIABLES_FROM_CLIENT: &str = "sync_variables_from_client";
    pub const GET_VARIABLES_FOR_CLIENT: &str = "get_variables_for_client";
    pub const SET_SHARED_VARIABLE: &str = "set_shared_variable";
    pub const GET_SHARED_VARIABLE: &str = "get_shared_variable";
    pub const LIST_SHARED_VARIABLES: &str = "list_shared_variables";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Pass,
    Fail,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Empty {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NameRequest {
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunKeywordRequest {
    pub name: String,
    /// Arguments by display name.
    #[serde(default)]
    pub args: BTreeMap<String, Json>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunKeywordResponse {
    pub status: Status,
    /// The result envelope on PASS.
    #[serde(rename = "return", default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Json>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub traceback: Vec<String>,
}

impl RunKeywordResponse {
    pub fn pass(value: Json) -> Self {
        RunKeywordResponse {
            status: Status::Pass,
            value: Some(value),
            error: None,
            traceback: Vec::new(),
        }
    }

    pub fn fail(error: impl Into<String>, traceback: Vec<String>) -> Self {
        RunKeywordResponse {
            status: Status::Fail,
            value: None,
            error: Some(error.into()),
            traceback,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncVariablesRequest {
    pub variables: BTreeMap<String, Json>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetVariableRequest {
    pub name: String,
    pub value: Json,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetVariableRequest {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableStatus {
    Success,
    Error,
}

/// Reply to every shared-variable method. Only the fields relevant to the
/// method are present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableResponse {
    pub status: VariableStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Full variable map (`get_variables_for_client`) or name list
    /// (`list_shared_variables`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Json>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Json>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

impl VariableResponse {
    pub fn success() -> Self {
        VariableResponse {
            status: VariableStatus::Success,
            message: None,
            error: None,
            variables: None,
            value: None,
            count: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        VariableResponse {
            status: VariableStatus::Error,
            error: Some(message.into()),
            ..VariableResponse::success()
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == VariableStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn run_keyword_response_uses_return_on_the_wire() {
        let pass = RunKeywordResponse::pass(json!({"result": 1}));
        assert_eq!(
            serde_json::to_value(&pass).unwrap(),
            json!({"status": "PASS", "return": {"result": 1}})
        );

        let fail: RunKeywordResponse = serde_json::from_value(json!({
            "status": "FAIL",
            "error": "boom",
            "traceback": ["a", "b"]
        }))
        .unwrap();
        assert_eq!(fail, RunKeywordResponse::fail("boom", vec!["a".into(), "b".into()]));
    }

    #[test]
    fn optional_request_fields_default() {
        let req: RunKeywordRequest = serde_json::from_value(json!({"name": "k"})).unwrap();
        assert!(req.args.is_empty());
        assert!(req.api_key.is_none());
    }
}
