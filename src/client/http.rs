use async_trait::async_trait;
use reqwest::{
    Method, RequestBuilder,
    header::{AUTHORIZATION, HeaderValue, InvalidHeaderValue},
};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value as JsonValue;
use tracing::{debug, trace};

use crate::{
    EngineAuth, EngineConfig, ProvisionError, Result,
    client::{CredentialHandle, EngineClient, WorkflowHandle, workflow_body},
    model::WorkflowTemplate,
};

const API_PREFIX: &str = "/api/v1";
const API_KEY_HEADER: &str = "X-N8N-API-KEY";
const PAGE_LIMIT: &str = "100";
/// Upper bound on list pages walked for a single lookup.
const MAX_PAGES: usize = 50;

#[derive(Deserialize)]
struct Page<T> {
    data: Vec<T>,
    #[serde(rename = "nextCursor", default)]
    next_cursor: Option<String>,
}

/// JSON-over-HTTP client for an n8n-compatible engine.
#[derive(Debug, Clone)]
pub struct HttpEngineClient {
    base_url: String,
    api_key: HeaderValue,
    auth: EngineAuth,
    client: reqwest::Client,
}

impl HttpEngineClient {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout()).build().map_err(|err| ProvisionError::Config(err.to_string()))?;

        let key = match config.auth {
            EngineAuth::ApiKey => config.api_key.clone(),
            EngineAuth::Bearer => format!("Bearer {}", config.api_key),
        };
        let mut api_key: HeaderValue = key.parse().map_err(|err: InvalidHeaderValue| ProvisionError::Config(err.to_string()))?;
        api_key.set_sensitive(true);

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            auth: config.auth,
            client,
        })
    }

    fn request(
        &self,
        method: Method,
        path: &str,
    ) -> RequestBuilder {
        let url = format!("{}{}{}", self.base_url, API_PREFIX, path);
        trace!("engine: {} {}", method, url);
        let request = self.client.request(method, url);
        match self.auth {
            EngineAuth::ApiKey => request.header(API_KEY_HEADER, self.api_key.clone()),
            EngineAuth::Bearer => request.header(AUTHORIZATION, self.api_key.clone()),
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T> {
        let res = request.send().await?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(ProvisionError::Engine {
                status: Some(status.as_u16()),
                message: engine_message(&body),
            });
        }
        let value = res.json::<T>().await.map_err(|err| ProvisionError::Convert(format!("unexpected engine response: {}", err)))?;
        Ok(value)
    }

    /// Walks a cursor-paginated list until `pick` finds an item.
    async fn find_in_pages<T, F>(
        &self,
        path: &str,
        extra_query: &[(&str, &str)],
        pick: F,
    ) -> Result<Option<T>>
    where
        T: DeserializeOwned,
        F: Fn(&T) -> bool,
    {
        let mut cursor: Option<String> = None;
        for _ in 0..MAX_PAGES {
            let mut query: Vec<(&str, &str)> = vec![("limit", PAGE_LIMIT)];
            query.extend_from_slice(extra_query);
            if let Some(cursor) = cursor.as_deref() {
                query.push(("cursor", cursor));
            }

            let page: Page<T> = self.send(self.request(Method::GET, path).query(&query)).await?;
            if let Some(found) = page.data.into_iter().find(|item| pick(item)) {
                return Ok(Some(found));
            }
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => return Ok(None),
            }
        }
        debug!("engine: gave up on {} after {} pages", path, MAX_PAGES);
        Ok(None)
    }
}

/// Pulls the `message` out of an engine error body when there is one.
fn engine_message(body: &str) -> String {
    serde_json::from_str::<JsonValue>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(|m| m.to_string()))
        .unwrap_or_else(|| body.to_string())
}

#[async_trait]
impl EngineClient for HttpEngineClient {
    async fn find_credential(
        &self,
        name: &str,
    ) -> Result<Option<CredentialHandle>> {
        self.find_in_pages::<CredentialHandle, _>("/credentials", &[], |c| c.name == name).await
    }

    async fn create_credential(
        &self,
        body: &JsonValue,
    ) -> Result<CredentialHandle> {
        self.send(self.request(Method::POST, "/credentials").json(body)).await
    }

    async fn find_workflow(
        &self,
        name: &str,
    ) -> Result<Option<WorkflowHandle>> {
        self.find_in_pages::<WorkflowHandle, _>("/workflows", &[("name", name)], |w| w.name == name).await
    }

    async fn create_workflow(
        &self,
        doc: &WorkflowTemplate,
    ) -> Result<WorkflowHandle> {
        self.send(self.request(Method::POST, "/workflows").json(&workflow_body(doc))).await
    }

    async fn update_workflow(
        &self,
        id: &str,
        doc: &WorkflowTemplate,
    ) -> Result<WorkflowHandle> {
        self.send(self.request(Method::PUT, &format!("/workflows/{}", id)).json(&workflow_body(doc))).await
    }

    async fn activate_workflow(
        &self,
        id: &str,
    ) -> Result<()> {
        let _: JsonValue = self.send(self.request(Method::POST, &format!("/workflows/{}/activate", id))).await?;
        Ok(())
    }

    async fn deactivate_workflow(
        &self,
        id: &str,
    ) -> Result<()> {
        let _: JsonValue = self.send(self.request(Method::POST, &format!("/workflows/{}/deactivate", id))).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use mockito::{Matcher, Server};
    use serde_json::json;

    use super::*;

    fn config(base_url: String) -> EngineConfig {
        EngineConfig {
            base_url,
            api_key: "test-key".to_string(),
            auth: EngineAuth::ApiKey,
            timeout_ms: 5_000,
        }
    }

    fn template() -> WorkflowTemplate {
        WorkflowTemplate::from_value(json!({ "name": "Mail assistant (u1)", "nodes": [], "connections": {}, "active": false })).unwrap()
    }

    #[tokio::test]
    async fn test_find_credential_walks_pages() {
        let mut server = Server::new_async().await;
        let first = server
            .mock("GET", "/api/v1/credentials")
            .match_query(Matcher::Exact("limit=100".to_string()))
            .match_header("X-N8N-API-KEY", "test-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"data":[{"id":"1","name":"Other","type":"smtp"}],"nextCursor":"abc"}"#)
            .create_async()
            .await;
        let second = server
            .mock("GET", "/api/v1/credentials")
            .match_query(Matcher::Exact("limit=100&cursor=abc".to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"data":[{"id":"2","name":"SMTP (u1)","type":"smtp"}],"nextCursor":null}"#)
            .create_async()
            .await;

        let client = HttpEngineClient::new(&config(server.url())).unwrap();
        let found = client.find_credential("SMTP (u1)").await.unwrap().unwrap();
        assert_eq!(found.id, "2");
        assert_eq!(found.credential_type, "smtp");
        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn test_find_credential_not_found() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/v1/credentials")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"data":[]}"#)
            .create_async()
            .await;

        let client = HttpEngineClient::new(&config(server.url())).unwrap();
        assert!(client.find_credential("IMAP (u1)").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_credential_error_carries_status() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/credentials")
            .match_body(Matcher::PartialJson(json!({ "type": "smtp" })))
            .with_status(400)
            .with_body(r#"{"message":"request.body.data is not valid"}"#)
            .create_async()
            .await;

        let client = HttpEngineClient::new(&config(server.url())).unwrap();
        let err = client.create_credential(&json!({ "name": "SMTP (u1)", "type": "smtp", "data": {} })).await.unwrap_err();
        assert_eq!(
            err,
            ProvisionError::Engine {
                status: Some(400),
                message: "request.body.data is not valid".to_string(),
            }
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_bearer_auth_header() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/workflows/wf1/activate")
            .match_header("authorization", "Bearer test-key")
            .with_status(200)
            .with_body(r#"{"id":"wf1","name":"w","active":true}"#)
            .create_async()
            .await;

        let mut config = config(server.url());
        config.auth = EngineAuth::Bearer;
        let client = HttpEngineClient::new(&config).unwrap();
        client.activate_workflow("wf1").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_create_or_update_updates_existing_workflow() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/v1/workflows")
            .match_query(Matcher::UrlEncoded("name".to_string(), "Mail assistant (u1)".to_string()))
            .with_status(200)
            .with_body(r#"{"data":[{"id":"wf9","name":"Mail assistant (u1)","active":true}]}"#)
            .create_async()
            .await;
        let update = server
            .mock("PUT", "/api/v1/workflows/wf9")
            .match_body(Matcher::Json(json!({ "name": "Mail assistant (u1)", "nodes": [], "connections": {}, "settings": {} })))
            .with_status(200)
            .with_body(r#"{"id":"wf9","name":"Mail assistant (u1)","active":true}"#)
            .create_async()
            .await;

        let client = HttpEngineClient::new(&config(server.url())).unwrap();
        let outcome = client.create_or_update_workflow(&template()).await.unwrap();
        assert!(!outcome.created);
        assert_eq!(outcome.workflow.id, "wf9");
        update.assert_async().await;
    }

    #[tokio::test]
    async fn test_create_or_update_creates_missing_workflow() {
        let mut server = Server::new_async().await;
        server.mock("GET", "/api/v1/workflows").match_query(Matcher::Any).with_status(200).with_body(r#"{"data":[]}"#).create_async().await;
        let create = server
            .mock("POST", "/api/v1/workflows")
            .with_status(200)
            .with_body(r#"{"id":"wf10","name":"Mail assistant (u1)","active":false}"#)
            .create_async()
            .await;

        let client = HttpEngineClient::new(&config(server.url())).unwrap();
        let outcome = client.create_or_update_workflow(&template()).await.unwrap();
        assert!(outcome.created);
        assert_eq!(outcome.workflow.id, "wf10");
        create.assert_async().await;
    }

    #[test]
    fn test_engine_message() {
        assert_eq!(engine_message(r#"{"message":"boom"}"#), "boom");
        assert_eq!(engine_message("plain failure"), "plain failure");
    }
}
