use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationType {
    #[default]
    #[serde(alias = "none")]
    NoAuth,
    Bearer,
    Basic,
    /// raw value in a custom header
    Custom,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpRequestMethod {
    #[default]
    #[serde(alias = "get")]
    GET,
    #[serde(alias = "post")]
    POST,
    #[serde(alias = "put")]
    PUT,
    #[serde(alias = "patch")]
    PATCH,
    #[serde(alias = "delete")]
    DELETE,
    #[serde(alias = "head")]
    HEAD,
    #[serde(alias = "options")]
    OPTIONS,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthorizationConfig {
    #[serde(default, alias = "type")]
    pub auth_type: AuthorizationType,
    /// token, `user:password` pair or raw header value; may be a template
    #[serde(default, alias = "token")]
    pub api_key: Option<String>,
    /// header name, defaults to `Authorization`
    #[serde(default)]
    pub header: Option<String>,
}
