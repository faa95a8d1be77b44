//! JSON request handlers.
//!
//! Capability endpoints take a fully formed Config as the request body.
//! Engine errors become a `code = 1` result with a single ERROR message,
//! wrapped in the endpoint's response shape.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::core::EngineError;
use crate::domain::{
    Archives, Backups, Config, PluginInfoResult, PluginResult, PluginType, Status,
};

use super::AppState;

/// HTTP status for an engine error
pub fn status_for(err: &EngineError) -> StatusCode {
    match err {
        EngineError::ConfigNotFound { .. } | EngineError::PluginNotFound { .. } => {
            StatusCode::NOT_FOUND
        }
        EngineError::ConfigParse { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::DuplicateWorkflow(_) => StatusCode::CONFLICT,
        EngineError::PluginLoad { .. }
        | EngineError::PluginExecution { .. }
        | EngineError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reply<T: Serialize>(status: StatusCode, body: T) -> Response {
    (status, Json(body)).into_response()
}

/// Respond with the engine outcome, wrapping errors with `wrap`
fn respond<T, F>(outcome: Result<T, EngineError>, wrap: F) -> Response
where
    T: Serialize,
    F: FnOnce(PluginResult) -> T,
{
    match outcome {
        Ok(body) => reply(StatusCode::OK, body),
        Err(err) => {
            tracing::warn!(error = %err, "Request rejected");
            reply(status_for(&err), wrap(err.to_result()))
        }
    }
}

fn bad_request<T: Serialize>(text: String, wrap: impl FnOnce(PluginResult) -> T) -> Response {
    reply(StatusCode::BAD_REQUEST, wrap(PluginResult::failure(text)))
}

fn read_config(body: Result<Json<Config>, JsonRejection>) -> Result<Config, String> {
    body.map(|Json(config)| config)
        .map_err(|rejection| format!("Couldn't read config! {}", rejection.body_text()))
}

fn plain(result: PluginResult) -> PluginResult {
    result
}

pub async fn status(State(state): State<AppState>) -> Json<Status> {
    Json(state.engine.status())
}

macro_rules! result_endpoint {
    ($name:ident) => {
        pub async fn $name(
            State(state): State<AppState>,
            body: Result<Json<Config>, JsonRejection>,
        ) -> Response {
            match read_config(body) {
                Ok(config) => respond(state.engine.$name(&config).await, plain),
                Err(text) => bad_request(text, plain),
            }
        }
    };
}

result_endpoint!(backup);
result_endpoint!(restore);
result_endpoint!(backup_delete);
result_endpoint!(archive);
result_endpoint!(archive_delete);

pub async fn backup_list(
    State(state): State<AppState>,
    body: Result<Json<Config>, JsonRejection>,
) -> Response {
    match read_config(body) {
        Ok(config) => respond(state.engine.backup_list(&config).await, Backups::from_result),
        Err(text) => bad_request(text, Backups::from_result),
    }
}

pub async fn archive_list(
    State(state): State<AppState>,
    body: Result<Json<Config>, JsonRejection>,
) -> Response {
    match read_config(body) {
        Ok(config) => respond(state.engine.archive_list(&config).await, Archives::from_result),
        Err(text) => bad_request(text, Archives::from_result),
    }
}

pub async fn plugin_info(
    State(state): State<AppState>,
    Path((name, plugin_type)): Path<(String, String)>,
) -> Response {
    let plugin_type = match plugin_type.parse::<PluginType>() {
        Ok(t) => t,
        Err(text) => return bad_request(text, PluginInfoResult::from_result),
    };
    respond(
        state.engine.plugin_info(&name, plugin_type).await,
        PluginInfoResult::from_result,
    )
}

/// Plugin names, or an error result
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum PluginListResponse {
    Names(Vec<String>),
    Failed(PluginResult),
}

pub async fn plugin_list(
    State(state): State<AppState>,
    Path(plugin_type): Path<String>,
) -> Response {
    let plugin_type = match plugin_type.parse::<PluginType>() {
        Ok(t) => t,
        Err(text) => return bad_request(text, PluginListResponse::Failed),
    };
    respond(
        state.engine.plugin_list(plugin_type).map(PluginListResponse::Names),
        PluginListResponse::Failed,
    )
}

/// Optional caller-chosen workflow id
#[derive(Debug, Default, Deserialize)]
pub struct WorkflowQuery {
    pub id: Option<String>,
}

pub async fn start_backup_workflow(
    State(state): State<AppState>,
    Path((profile, config, policy)): Path<(String, String, String)>,
    Query(query): Query<WorkflowQuery>,
) -> Response {
    let outcome = state
        .engine
        .start_backup_workflow(&profile, &config, &policy, query.id)
        .await;
    respond(outcome, plain)
}

pub async fn start_restore_workflow(
    State(state): State<AppState>,
    Path((profile, config, policy, workflow_id)): Path<(String, String, String, String)>,
    Query(query): Query<WorkflowQuery>,
) -> Response {
    let outcome = state
        .engine
        .start_restore_workflow(&profile, &config, &policy, &workflow_id, query.id)
        .await;
    respond(outcome, plain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::WorkflowIdentity;

    #[test]
    fn test_status_mapping() {
        let not_found = EngineError::PluginNotFound {
            name: "x".to_string(),
            plugin_type: PluginType::App,
        };
        assert_eq!(status_for(&not_found), StatusCode::NOT_FOUND);

        let duplicate = EngineError::DuplicateWorkflow(WorkflowIdentity::new("p", "c", "1"));
        assert_eq!(status_for(&duplicate), StatusCode::CONFLICT);

        let parse = EngineError::ConfigParse {
            path: "/x".into(),
            reason: "bad".to_string(),
        };
        assert_eq!(status_for(&parse), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_plugin_list_response_shapes() {
        let names = PluginListResponse::Names(vec!["a".to_string()]);
        assert_eq!(serde_json::to_value(&names).unwrap(), serde_json::json!(["a"]));

        let failed = PluginListResponse::Failed(PluginResult::failure("boom"));
        assert_eq!(serde_json::to_value(&failed).unwrap()["code"], 1);
    }
}
