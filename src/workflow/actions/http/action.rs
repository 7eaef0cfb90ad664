use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, InvalidHeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::{
    HookflowError, Result,
    runtime::Context,
    workflow::{
        actions::{Action, parse_config},
        node::{NodeId, NodeType},
    },
};

use super::models::*;

const STATUS_CODE_KEY: &str = "status_code";
const BODY_KEY: &str = "body";
const HEADERS_KEY: &str = "headers";

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HttpAction {
    url: String,
    #[serde(default)]
    method: HttpRequestMethod,
    #[serde(default)]
    auth: AuthorizationConfig,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default, alias = "query")]
    params: HashMap<String, String>,
    /// strings are sent as text, anything else as JSON
    #[serde(default)]
    body: Option<Value>,
    /// request timeout in milliseconds, engine default when absent
    #[serde(default)]
    timeout: Option<u64>,
    /// treat non-2xx responses as node failures
    #[serde(default = "default_fail_on_status", alias = "failOnStatus")]
    fail_on_status: bool,
}

fn default_fail_on_status() -> bool {
    true
}

impl HttpAction {
    /// Apply authorization headers based on auth config
    fn apply_auth_headers(
        &self,
        ctx: &Context,
        headers: &mut HeaderMap,
    ) -> Result<()> {
        if self.auth.auth_type == AuthorizationType::NoAuth {
            return Ok(());
        }
        let api_key = self
            .auth
            .api_key
            .as_ref()
            .map(|k| ctx.render_string(k))
            .ok_or_else(|| HookflowError::Action("api_key is required for authorization".to_string()))?;

        let header_name = self.auth.header.as_deref().unwrap_or("Authorization");
        let header_key: HeaderName = header_name.parse().map_err(|err: reqwest::header::InvalidHeaderName| HookflowError::Action(err.to_string()))?;

        let header_value = match self.auth.auth_type {
            AuthorizationType::Bearer => format!("Bearer {}", api_key),
            AuthorizationType::Basic => {
                let encoded = if api_key.contains(':') { STANDARD.encode(api_key.as_bytes()) } else { api_key };
                format!("Basic {}", encoded)
            }
            AuthorizationType::Custom | AuthorizationType::NoAuth => api_key,
        };

        headers.insert(
            header_key,
            header_value.parse().map_err(|err: InvalidHeaderValue| HookflowError::Action(err.to_string()))?,
        );
        Ok(())
    }

    fn build_request(
        &self,
        ctx: &Context,
    ) -> Result<(String, reqwest::RequestBuilder)> {
        let resolved_url = ctx.render_string(&self.url);

        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static("accept"), HeaderValue::from_static("*/*"));
        self.apply_auth_headers(ctx, &mut headers)?;

        for (key, value) in &self.headers {
            headers.insert(
                key.parse::<HeaderName>().map_err(|err| HookflowError::Action(err.to_string()))?,
                ctx.render_string(value).parse().map_err(|err: InvalidHeaderValue| HookflowError::Action(err.to_string()))?,
            );
        }

        let query = self.params.iter().map(|(k, v)| (k.clone(), ctx.render_string(v))).collect::<Vec<_>>();

        let method = self
            .method
            .as_ref()
            .parse::<reqwest::Method>()
            .map_err(|_| HookflowError::Action(format!("invalid method '{:?}'", self.method)))?;
        let mut request = ctx.executor().http().request(method, &resolved_url).headers(headers).query(&query);

        match self.body.as_ref().map(|b| ctx.render(b)) {
            None | Some(Value::Null) => {}
            Some(Value::String(text)) => request = request.body(text),
            Some(json) => request = request.json(&json),
        }

        let timeout = self.timeout.unwrap_or(ctx.executor().config().engine.http_timeout_ms);
        request = request.timeout(Duration::from_millis(timeout));

        Ok((resolved_url, request))
    }
}

#[async_trait]
impl Action for HttpAction {
    fn create(params: Value) -> Result<Self> {
        parse_config(params, &Self::schema())
    }

    fn schema() -> Value {
        serde_json::json!({
            "type": "object",
            "required": ["url"],
            "properties": {
                "url": {
                    "type": "string",
                    "description": "Request URL, supports templates like {{trigger.id}}"
                },
                "method": {
                    "type": "string",
                    "enum": ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS",
                             "get", "post", "put", "patch", "delete", "head", "options"]
                },
                "auth": {
                    "type": "object",
                    "properties": {
                        "auth_type": {"type": "string", "enum": ["no_auth", "none", "bearer", "basic", "custom"]},
                        "type": {"type": "string", "enum": ["no_auth", "none", "bearer", "basic", "custom"]},
                        "api_key": {"type": ["string", "null"]},
                        "token": {"type": ["string", "null"]},
                        "header": {"type": ["string", "null"]}
                    }
                },
                "headers": {
                    "type": "object",
                    "additionalProperties": {"type": "string"},
                    "description": "HTTP headers, values support templates"
                },
                "params": {
                    "type": "object",
                    "additionalProperties": {"type": "string"},
                    "description": "Query parameters, values support templates"
                },
                "body": {
                    "description": "Request body, templates are rendered recursively"
                },
                "timeout": {
                    "type": "integer",
                    "minimum": 0,
                    "description": "Request timeout in milliseconds"
                }
            }
        })
    }

    fn action_type(&self) -> NodeType {
        NodeType::Http
    }

    async fn run(
        &self,
        ctx: &Context,
        nid: &NodeId,
    ) -> Result<Value> {
        let (url, request) = self.build_request(ctx)?;
        debug!(node = %nid, method = self.method.as_ref(), url = %url, "sending http request");

        let res = request.send().await.map_err(|err| {
            if err.is_timeout() {
                HookflowError::Timeout(format!("HTTP request to {} timed out", url))
            } else {
                HookflowError::Action(format!("HTTP request to {} failed: {}", url, err))
            }
        })?;

        let status = res.status();
        let headers_map: HashMap<String, String> = res.headers().iter().map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string())).collect();
        let is_json = headers_map.get("content-type").map(|c| c.contains("json")).unwrap_or(false);

        let text = res.text().await.map_err(|err| HookflowError::Action(format!("HTTP response from {} unreadable: {}", url, err)))?;
        let body = if is_json { serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text)) } else { Value::String(text) };

        if self.fail_on_status && !status.is_success() {
            return Err(HookflowError::Action(format!("HTTP {} from {}: {}", status.as_u16(), url, body)));
        }

        let mut outputs = serde_json::Map::new();
        outputs.insert(STATUS_CODE_KEY.to_string(), status.as_u16().into());
        outputs.insert(HEADERS_KEY.to_string(), serde_json::to_value(headers_map)?);
        outputs.insert(BODY_KEY.to_string(), body);
        Ok(Value::Object(outputs))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    use super::*;
    use crate::{
        Config,
        runtime::executor_testing::{context, executor},
    };

    /// Serves one canned response and hands back the raw request it received.
    async fn serve_once(response: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let mut request = Vec::new();
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request).to_string();
                if let Some(head_end) = text.find("\r\n\r\n") {
                    let length = text[..head_end]
                        .lines()
                        .find_map(|l| l.to_ascii_lowercase().strip_prefix("content-length:").map(|v| v.trim().parse::<usize>().unwrap_or(0)))
                        .unwrap_or(0);
                    if request.len() >= head_end + 4 + length {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&request).to_string()
        });
        (format!("http://{}", addr), handle)
    }

    #[test]
    fn test_create_defaults() {
        let action = HttpAction::create(json!({"url": "https://example.com/{{trigger.id}}"})).unwrap();
        assert_eq!(action.method, HttpRequestMethod::GET);
        assert_eq!(action.auth.auth_type, AuthorizationType::NoAuth);
        assert!(action.fail_on_status);
        assert!(action.timeout.is_none());
    }

    #[test]
    fn test_create_with_auth() {
        let action = HttpAction::create(json!({
            "url": "https://example.com",
            "method": "post",
            "auth": {"type": "bearer", "token": "{{variables.token}}"},
            "params": {"page": "1"},
            "body": {"name": "{{trigger.name}}"},
            "timeout": 500
        }))
        .unwrap();
        assert_eq!(action.method, HttpRequestMethod::POST);
        assert_eq!(action.auth.auth_type, AuthorizationType::Bearer);
        assert_eq!(action.auth.api_key.as_deref(), Some("{{variables.token}}"));
        assert_eq!(action.timeout, Some(500));
    }

    #[test]
    fn test_create_requires_url() {
        assert!(HttpAction::create(json!({"method": "GET"})).is_err());
        assert!(HttpAction::create(json!({"url": "x", "method": "FETCH"})).is_err());
    }

    #[tokio::test]
    async fn test_json_response_and_rendered_request() {
        let (base, server) = serve_once("HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 11\r\nconnection: close\r\n\r\n{\"ok\":true}").await;
        let executor = executor(Config::default(), &[]);
        let ctx = context(&executor, json!({"id": 7, "name": "ada"}));

        let action = HttpAction::create(json!({
            "url": format!("{}/users/{{{{trigger.id}}}}", base),
            "method": "POST",
            "auth": {"type": "bearer", "token": "secret"},
            "headers": {"x-user": "{{trigger.name}}"},
            "body": {"name": "{{trigger.name}}"}
        }))
        .unwrap();
        let output = action.run(&ctx, &"call".to_string()).await.unwrap();
        assert_eq!(output[STATUS_CODE_KEY], json!(200));
        assert_eq!(output[BODY_KEY], json!({"ok": true}));
        assert_eq!(output[HEADERS_KEY]["content-type"], json!("application/json"));

        let request = server.await.unwrap();
        let lower = request.to_ascii_lowercase();
        assert!(request.starts_with("POST /users/7 HTTP/1.1"));
        assert!(lower.contains("authorization: bearer secret"));
        assert!(lower.contains("x-user: ada"));
        assert!(request.ends_with("{\"name\":\"ada\"}"));
    }

    #[tokio::test]
    async fn test_error_status() {
        let response = "HTTP/1.1 404 Not Found\r\ncontent-type: text/plain\r\ncontent-length: 7\r\nconnection: close\r\n\r\nmissing";
        let executor = executor(Config::default(), &[]);
        let ctx = context(&executor, json!({}));

        let (base, _server) = serve_once(response).await;
        let err = HttpAction::create(json!({"url": base})).unwrap().run(&ctx, &"call".to_string()).await.unwrap_err();
        assert!(matches!(err, HookflowError::Action(_)));
        assert!(err.to_string().contains("HTTP 404"));

        let (base, _server) = serve_once(response).await;
        let output = HttpAction::create(json!({"url": base, "fail_on_status": false})).unwrap().run(&ctx, &"call".to_string()).await.unwrap();
        assert_eq!(output[STATUS_CODE_KEY], json!(404));
        assert_eq!(output[BODY_KEY], json!("missing"));
    }
}
