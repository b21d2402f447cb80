//! HTTP catalog client.
//!
//! Talks to a Panoptes-style JSON API. The transport is deliberately thin:
//! no business logic lives here, only request building, response parsing and
//! error-kind classification. Rate limits and 5xx responses become
//! [`Error::TransientRemote`]; validation failures become
//! [`Error::RejectedOperation`].

use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use serde_json::{Map, Value, json};
use std::time::Duration;

use crate::config::ApiConfig;
use crate::models::{
    RemoteClassification, RemoteGroupId, RemoteItemId, RemoteWorkflowId,
};
use crate::{Error, Result};

use super::{CatalogClient, FINGERPRINT_METADATA_KEY, RemoteGroup, RemoteItem, Scope};

/// Request timeout for catalog calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A [`CatalogClient`] backed by the platform's HTTP API.
pub struct HttpCatalog {
    base_url: String,
    username: String,
    password: String,
    client: Client,
}

impl HttpCatalog {
    /// Creates a client from API configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when credentials are missing or the
    /// HTTP client cannot be constructed.
    pub fn new(api: &ApiConfig) -> Result<Self> {
        if api.username.is_empty() || api.password.is_empty() {
            return Err(Error::Configuration(
                "catalog credentials are empty".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Configuration(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            base_url: api.base_url.trim_end_matches('/').to_string(),
            username: api.username.clone(),
            password: api.password.clone(),
            client,
        })
    }

    fn get(&self, operation: &str, path: &str, query: &[(&str, String)]) -> Result<Value> {
        let response = self
            .client
            .get(format!("{}{path}", self.base_url))
            .basic_auth(&self.username, Some(&self.password))
            .query(query)
            .send()
            .map_err(|e| transport_error(operation, &e))?;
        parse_response(operation, response)
    }

    fn post(&self, operation: &str, path: &str, body: &Value) -> Result<Value> {
        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .basic_auth(&self.username, Some(&self.password))
            .json(body)
            .send()
            .map_err(|e| transport_error(operation, &e))?;
        parse_response(operation, response)
    }

    fn delete(&self, operation: &str, path: &str) -> Result<()> {
        let response = self
            .client
            .delete(format!("{}{path}", self.base_url))
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .map_err(|e| transport_error(operation, &e))?;
        parse_response(operation, response).map(|_| ())
    }

    fn put(&self, operation: &str, path: &str, body: &Value) -> Result<Value> {
        let response = self
            .client
            .put(format!("{}{path}", self.base_url))
            .basic_auth(&self.username, Some(&self.password))
            .json(body)
            .send()
            .map_err(|e| transport_error(operation, &e))?;
        parse_response(operation, response)
    }

    fn scope_query(scope: Scope) -> (&'static str, String) {
        match scope {
            Scope::Project(id) => ("project_id", id.to_string()),
            Scope::Group(id) => ("subject_set_id", id.to_string()),
            Scope::Workflow(id) => ("workflow_id", id.to_string()),
        }
    }
}

/// Maps a transport-level failure to an error kind. Everything that never
/// reached the platform is retryable.
fn transport_error(operation: &str, err: &reqwest::Error) -> Error {
    Error::TransientRemote {
        operation: operation.to_string(),
        cause: err.to_string(),
    }
}

/// Parses a response body, classifying HTTP failures by status code.
fn parse_response(operation: &str, response: Response) -> Result<Value> {
    let status = response.status();
    if status.is_success() {
        if status == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }
        return response.json().map_err(|e| Error::TransientRemote {
            operation: operation.to_string(),
            cause: format!("malformed response body: {e}"),
        });
    }

    let cause = response
        .text()
        .unwrap_or_else(|_| format!("HTTP {status}"));

    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Err(Error::TransientRemote {
            operation: operation.to_string(),
            cause,
        })
    } else {
        Err(Error::RejectedOperation {
            operation: operation.to_string(),
            cause,
        })
    }
}

fn parse_id(operation: &str, value: &Value) -> Result<i64> {
    // Panoptes serializes IDs as strings
    match value {
        Value::String(s) => s.parse().map_err(|_| malformed(operation, value)),
        Value::Number(n) => n.as_i64().ok_or_else(|| malformed(operation, value)),
        _ => Err(malformed(operation, value)),
    }
}

fn malformed(operation: &str, value: &Value) -> Error {
    Error::TransientRemote {
        operation: operation.to_string(),
        cause: format!("unexpected id value: {value}"),
    }
}

fn parse_item(operation: &str, value: &Value) -> Result<RemoteItem> {
    let id = parse_id(operation, value.get("id").unwrap_or(&Value::Null))?;
    let metadata = value
        .get("metadata")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    let fingerprint = metadata
        .get(FINGERPRINT_METADATA_KEY)
        .and_then(Value::as_str)
        .map(ToString::to_string);
    let group_ids = value
        .pointer("/links/subject_sets")
        .and_then(Value::as_array)
        .map(|ids| {
            ids.iter()
                .filter_map(|v| parse_id(operation, v).ok())
                .collect()
        })
        .unwrap_or_default();
    let retired = value
        .get("retired")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    Ok(RemoteItem {
        id,
        fingerprint,
        group_ids,
        retired,
        metadata,
    })
}

fn parse_group(operation: &str, value: &Value) -> Result<RemoteGroup> {
    let id = parse_id(operation, value.get("id").unwrap_or(&Value::Null))?;
    let name = value
        .get("display_name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let workflow_ids = value
        .pointer("/links/workflows")
        .and_then(Value::as_array)
        .map(|ids| {
            ids.iter()
                .filter_map(|v| parse_id(operation, v).ok())
                .collect()
        })
        .unwrap_or_default();
    Ok(RemoteGroup {
        id,
        name,
        workflow_ids,
    })
}

/// Reads the next page number from a listing response, guarding against a
/// server that echoes the current page forever.
fn next_page(body: &Value, page: u32) -> Option<u32> {
    match body.pointer("/meta/next_page").and_then(Value::as_u64) {
        Some(next) if next > u64::from(page) => Some(u32::try_from(next).unwrap_or(u32::MAX)),
        _ => None,
    }
}

fn collect_array<'a>(operation: &str, body: &'a Value, key: &str) -> Result<&'a Vec<Value>> {
    body.get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| Error::TransientRemote {
            operation: operation.to_string(),
            cause: format!("response missing '{key}' array"),
        })
}

impl CatalogClient for HttpCatalog {
    fn find_item(&self, fingerprint: &str) -> Result<Option<RemoteItem>> {
        const OP: &str = "find_item";
        let body = self.get(
            OP,
            "/subjects",
            &[(
                "metadata.fingerprint",
                fingerprint.to_string(),
            )],
        )?;
        let subjects = collect_array(OP, &body, "subjects")?;
        subjects
            .first()
            .map(|v| parse_item(OP, v))
            .transpose()
    }

    fn create_item(&self, metadata: &Map<String, Value>, location: &str) -> Result<RemoteItem> {
        const OP: &str = "create_item";
        let body = json!({
            "subjects": {
                "metadata": metadata,
                "locations": [{ "image/png": location }],
            }
        });
        let response = self.post(OP, "/subjects", &body)?;
        let subjects = collect_array(OP, &response, "subjects")?;
        let created = subjects.first().ok_or_else(|| Error::TransientRemote {
            operation: OP.to_string(),
            cause: "empty create response".to_string(),
        })?;
        parse_item(OP, created)
    }

    fn list_items(&self, scope: Scope) -> Result<Vec<RemoteItem>> {
        const OP: &str = "list_items";
        let (key, value) = Self::scope_query(scope);
        let mut items = Vec::new();
        let mut page = 1u32;
        loop {
            let body = self.get(
                OP,
                "/subjects",
                &[(key, value.clone()), ("page", page.to_string())],
            )?;
            for subject in collect_array(OP, &body, "subjects")? {
                items.push(parse_item(OP, subject)?);
            }
            match next_page(&body, page) {
                Some(next) => page = next,
                None => break,
            }
        }
        Ok(items)
    }

    fn create_group(&self, name: &str) -> Result<RemoteGroup> {
        const OP: &str = "create_group";
        let body = json!({
            "subject_sets": { "display_name": name }
        });
        let response = self.post(OP, "/subject_sets", &body)?;
        let sets = collect_array(OP, &response, "subject_sets")?;
        let created = sets.first().ok_or_else(|| Error::TransientRemote {
            operation: OP.to_string(),
            cause: "empty create response".to_string(),
        })?;
        parse_group(OP, created)
    }

    fn find_group(&self, name: &str, scope: Scope) -> Result<Option<RemoteGroup>> {
        const OP: &str = "find_group";
        let (key, value) = Self::scope_query(scope);
        let body = self.get(
            OP,
            "/subject_sets",
            &[(key, value), ("display_name", name.to_string())],
        )?;
        let sets = collect_array(OP, &body, "subject_sets")?;
        sets.iter()
            .map(|v| parse_group(OP, v))
            .find(|g| g.as_ref().is_ok_and(|g| g.name == name))
            .transpose()
    }

    fn list_groups(&self, scope: Scope) -> Result<Vec<RemoteGroup>> {
        const OP: &str = "list_groups";
        let (key, value) = Self::scope_query(scope);
        let mut groups = Vec::new();
        let mut page = 1u32;
        loop {
            let body = self.get(
                OP,
                "/subject_sets",
                &[(key, value.clone()), ("page", page.to_string())],
            )?;
            for set in collect_array(OP, &body, "subject_sets")? {
                groups.push(parse_group(OP, set)?);
            }
            match next_page(&body, page) {
                Some(next) => page = next,
                None => break,
            }
        }
        Ok(groups)
    }

    fn add_items_to_group(&self, group: RemoteGroupId, items: &[RemoteItemId]) -> Result<()> {
        const OP: &str = "add_items_to_group";
        let body = json!({ "subjects": items });
        self.post(OP, &format!("/subject_sets/{group}/links/subjects"), &body)
            .map(|_| ())
    }

    fn remove_items_from_group(&self, group: RemoteGroupId, items: &[RemoteItemId]) -> Result<()> {
        const OP: &str = "remove_items_from_group";
        let ids = items
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        self.delete(OP, &format!("/subject_sets/{group}/links/subjects/{ids}"))
    }

    fn link_group_to_workflow(
        &self,
        workflow: RemoteWorkflowId,
        group: RemoteGroupId,
    ) -> Result<()> {
        const OP: &str = "link_group_to_workflow";
        let body = json!({ "subject_sets": [group] });
        match self.post(OP, &format!("/workflows/{workflow}/links/subject_sets"), &body) {
            Ok(_) => Ok(()),
            // linking an already-linked group is reported as a validation
            // error by the platform; treat it as success
            Err(Error::RejectedOperation { .. }) => {
                tracing::debug!(group, workflow, "group already linked to workflow");
                Ok(())
            },
            Err(e) => Err(e),
        }
    }

    fn unlink_groups_from_workflow(
        &self,
        workflow: RemoteWorkflowId,
        groups: &[RemoteGroupId],
    ) -> Result<()> {
        const OP: &str = "unlink_groups_from_workflow";
        let ids = groups
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        self.delete(
            OP,
            &format!("/workflows/{workflow}/links/subject_sets/{ids}"),
        )
    }

    fn set_group_weights(
        &self,
        workflow: RemoteWorkflowId,
        weights: &[(RemoteGroupId, f64)],
    ) -> Result<()> {
        const OP: &str = "set_group_weights";
        let weight_map: Map<String, Value> = weights
            .iter()
            .map(|(group, weight)| (group.to_string(), json!(weight)))
            .collect();
        let body = json!({
            "workflows": {
                "configuration": { "subject_set_weights": weight_map }
            }
        });
        self.put(OP, &format!("/workflows/{workflow}"), &body)
            .map(|_| ())
    }

    fn list_classifications(
        &self,
        workflow: RemoteWorkflowId,
        reducer_key: &str,
    ) -> Result<Vec<RemoteClassification>> {
        const OP: &str = "list_classifications";
        let body = self.get(
            OP,
            "/reductions",
            &[
                ("workflow_id", workflow.to_string()),
                ("reducer_key", reducer_key.to_string()),
            ],
        )?;
        let mut classifications = Vec::new();
        for reduction in collect_array(OP, &body, "reductions")? {
            let id = parse_id(OP, reduction.get("id").unwrap_or(&Value::Null))?;
            let remote_item_id =
                parse_id(OP, reduction.get("subject_id").unwrap_or(&Value::Null))?;
            // reducers occasionally emit junk consensus values; skip them
            let Some(answer_index) = reduction.pointer("/data/most_likely").and_then(Value::as_i64)
            else {
                tracing::debug!(id, "reduction has a bad consensus value, skipping");
                continue;
            };
            classifications.push(RemoteClassification {
                id,
                remote_item_id,
                reducer_key: reducer_key.to_string(),
                answer_index,
            });
        }
        Ok(classifications)
    }

    fn item_retired(&self, workflow: RemoteWorkflowId, item: RemoteItemId) -> Result<bool> {
        const OP: &str = "item_retired";
        let body = self.get(
            OP,
            "/subject_workflow_statuses",
            &[
                ("workflow_id", workflow.to_string()),
                ("subject_id", item.to_string()),
            ],
        )?;
        let statuses = collect_array(OP, &body, "subject_workflow_statuses")?;
        // an item with no status row is simply not in the workflow yet
        Ok(statuses
            .first()
            .and_then(|s| s.get("retired_at"))
            .is_some_and(|v| !v.is_null()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_item_with_string_ids() {
        let value = json!({
            "id": "4021",
            "metadata": { "fingerprint": "abc" },
            "links": { "subject_sets": ["7", "9"] },
        });
        let item = parse_item("test", &value).unwrap();
        assert_eq!(item.id, 4021);
        assert_eq!(item.fingerprint.as_deref(), Some("abc"));
        assert_eq!(item.group_ids, vec![7, 9]);
        assert!(!item.retired);
    }

    #[test]
    fn test_parse_group() {
        let value = json!({
            "id": 55,
            "display_name": "WF4 Stamp Priority #1",
            "links": { "workflows": ["4"] },
        });
        let group = parse_group("test", &value).unwrap();
        assert_eq!(group.id, 55);
        assert_eq!(group.workflow_ids, vec![4]);
    }

    #[test]
    fn test_missing_id_is_error() {
        assert!(parse_item("test", &json!({ "metadata": {} })).is_err());
    }

    #[test]
    fn test_next_page_advances_and_terminates() {
        assert_eq!(next_page(&json!({ "meta": { "next_page": 2 } }), 1), Some(2));
        assert_eq!(next_page(&json!({ "meta": { "next_page": null } }), 1), None);
        assert_eq!(next_page(&json!({}), 1), None);
        // a server echoing the current page must not loop us forever
        assert_eq!(next_page(&json!({ "meta": { "next_page": 3 } }), 3), None);
        assert_eq!(next_page(&json!({ "meta": { "next_page": 2 } }), 5), None);
    }

    #[test]
    fn test_empty_credentials_rejected() {
        let api = ApiConfig {
            base_url: "https://catalog.example".to_string(),
            username: String::new(),
            password: String::new(),
        };
        assert!(matches!(
            HttpCatalog::new(&api),
            Err(Error::Configuration(_))
        ));
    }
}
