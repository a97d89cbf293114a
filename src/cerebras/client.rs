use std::{
    fmt::{Debug, Display},
    str::FromStr,
};

use reqwest::{
    blocking::Client,
    header::{HeaderValue, CONTENT_TYPE},
    NoProxy, StatusCode,
};
use tracing::{debug, trace};

use crate::config::SessionConfig;

use super::chat::Chat;

#[derive(Debug, PartialEq, Clone, Eq)]
pub struct CerebrasClientOption {
    url: String,
    proxy: Option<String>,
    no_proxy: Option<String>,
    ca_path: Option<String>,
}
impl Default for CerebrasClientOption {
    fn default() -> Self {
        Self {
            url: CerebrasClient::URL.to_string(),
            proxy: None,
            no_proxy: None,
            ca_path: None,
        }
    }
}
impl CerebrasClientOption {
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        Self {
            url: CerebrasClient::URL.to_string(),
            proxy: proxy_from(&lookup),
            no_proxy: no_proxy_from(&lookup),
            ca_path: root_ca_from(&lookup),
        }
    }
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }
    pub fn with_ca_path(mut self, ca_path: impl Into<String>) -> Self {
        self.ca_path = Some(ca_path.into());
        self
    }
    pub fn url(&self) -> &str {
        &self.url
    }
    pub fn proxy(&self) -> Option<&str> {
        self.proxy.as_deref()
    }
    pub fn no_proxy(&self) -> Option<&str> {
        self.no_proxy.as_deref()
    }
    pub fn ca_path(&self) -> Option<&str> {
        self.ca_path.as_deref()
    }
}

fn root_ca_from<F: Fn(&str) -> Option<String>>(lookup: &F) -> Option<String> {
    ["CA_BUNDLE", "ca_bundle"]
        .into_iter()
        .find_map(|name| lookup(name).filter(|v| !v.is_empty()))
}

fn no_proxy_from<F: Fn(&str) -> Option<String>>(lookup: &F) -> Option<String> {
    ["NO_PROXY", "no_proxy"]
        .into_iter()
        .find_map(|name| lookup(name).filter(|v| !v.is_empty()))
}

fn proxy_from<F: Fn(&str) -> Option<String>>(lookup: &F) -> Option<String> {
    ["HTTPS_PROXY", "https_proxy", "HTTP_PROXY", "http_proxy"]
        .into_iter()
        .find_map(|name| lookup(name).filter(|v| !v.is_empty()))
}

/// Blocking client for the Cerebras chat completions endpoint.
///
/// One request per call, no retries. Timeouts are whatever `reqwest`
/// applies by default.
pub struct CerebrasClient {
    key: CerebrasKey,
    model: CerebrasModel,
    params: SamplingParams,
    url: String,
    http: Client,
}
impl CerebrasClient {
    pub const URL: &'static str = "https://api.cerebras.ai/v1/chat/completions";
    const USER_AGENT: &'static str =
        concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

    pub fn new(config: &SessionConfig) -> Result<Self> {
        let option = &config.option;
        let mut builder = Client::builder().http1_only().user_agent(Self::USER_AGENT);
        builder = match option.proxy() {
            Some(proxy) => builder.proxy(
                reqwest::Proxy::all(proxy)
                    .map_err(|e| {
                        CerebrasClientError::new(
                            format!("invalid proxy url: {}", e),
                            CerebrasClientErrorKind::InvalidUrl(proxy.to_string()),
                        )
                    })?
                    .no_proxy(option.no_proxy().and_then(NoProxy::from_string)),
            ),
            None => builder.no_proxy(),
        };
        if let Some(ca) = option.ca_path() {
            let pem = std::fs::read(ca).map_err(|e| {
                CerebrasClientError::new(
                    format!("failed to read ca bundle: {}", e),
                    CerebrasClientErrorKind::NotFoundCAFile(ca.to_string()),
                )
            })?;
            let cert = reqwest::Certificate::from_pem(&pem).map_err(|e| {
                CerebrasClientError::new(
                    format!("invalid ca bundle: {}", e),
                    CerebrasClientErrorKind::InvalidCAFile(ca.to_string()),
                )
            })?;
            builder = builder.add_root_certificate(cert);
        }
        let http = builder.build().map_err(|e| {
            CerebrasClientError::new(
                "failed to build http client".to_string(),
                CerebrasClientErrorKind::ClientBuildError(e.to_string()),
            )
        })?;
        Ok(Self {
            key: config.key.clone(),
            model: config.model,
            params: config.params,
            url: option.url().to_string(),
            http,
        })
    }
    pub fn complete(&self, messages: &[Message]) -> Result<ChatCompletion> {
        let request = ChatRequest::new(self.model, messages, self.params);
        debug!(model = %self.model, turns = messages.len(), "chat completion request");
        trace!(body = ?request, "chat completion request body");

        let response = self
            .http
            .post(&self.url)
            .bearer_auth(self.key.key())
            .header(CONTENT_TYPE, "application/json")
            .json(&request)
            .send()
            .map_err(|e| {
                CerebrasClientError::new(
                    format!("failed to send request to {}", self.url),
                    CerebrasClientErrorKind::RequestError(e.to_string()),
                )
            })?;
        let status = response.status();
        let text = response.text().map_err(|e| {
            CerebrasClientError::new(
                "failed to read response body".to_string(),
                CerebrasClientErrorKind::ReadResponseError(e.to_string()),
            )
        })?;
        if !status.is_success() {
            return Err(Self::status_error(status, text));
        }
        ChatCompletion::from_json(&text)
    }
    fn status_error(status: StatusCode, body: String) -> CerebrasClientError {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CerebrasClientError::new(
                format!("{} was rejected by the remote service", API_KEY_ENV),
                CerebrasClientErrorKind::Unauthorized(status.as_u16()),
            ),
            StatusCode::TOO_MANY_REQUESTS => CerebrasClientError::new(
                "too many requests".to_string(),
                CerebrasClientErrorKind::RateLimited,
            ),
            _ => CerebrasClientError::new(
                format!("request failed with status {}", status),
                CerebrasClientErrorKind::ResponseError {
                    status: status.as_u16(),
                    body,
                },
            ),
        }
    }
}

impl Chat for CerebrasClient {
    fn chat(&mut self, messages: &[Message]) -> Result<String> {
        let completion = self.complete(messages)?;
        if let Some(usage) = completion.usage() {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                total_tokens = usage.total_tokens,
                "token usage"
            );
        }
        completion.into_content()
    }
}

pub const API_KEY_ENV: &str = "CEREBRAS_API_KEY";

#[derive(Clone, PartialEq, Eq)]
pub struct CerebrasKey(String);

impl CerebrasKey {
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Result<Self> {
        match lookup(API_KEY_ENV) {
            Some(key) if !key.trim().is_empty() => Self::validate(key),
            _ => Err(CerebrasClientError::new(
                format!("{} is not set", API_KEY_ENV),
                CerebrasClientErrorKind::NotFoundEnvAPIKey,
            )),
        }
    }
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }
    fn validate(key: String) -> Result<Self> {
        match HeaderValue::from_str(&format!("Bearer {}", key)) {
            Ok(_) => Ok(Self(key)),
            Err(_) => Err(CerebrasClientError::new(
                format!("{} contains characters not allowed in a header", API_KEY_ENV),
                CerebrasClientErrorKind::InvalidAPIKey,
            )),
        }
    }
    fn key(&self) -> &str {
        self.0.as_str()
    }
}
impl Debug for CerebrasKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", "x".repeat(self.0.len()))
    }
}
impl Display for CerebrasKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", "x".repeat(self.0.len()))
    }
}

/// Optional sampling knobs. Unset fields are left out of the request body
/// so the service defaults apply.
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize)]
pub struct SamplingParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ChatRequest<'a> {
    model: CerebrasModel,
    messages: &'a [Message],
    stream: bool,
    #[serde(flatten)]
    params: SamplingParams,
}
impl<'a> ChatRequest<'a> {
    pub fn new(model: CerebrasModel, messages: &'a [Message], params: SamplingParams) -> Self {
        Self {
            model,
            messages,
            stream: false,
            params,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct Message {
    role: Role,
    content: String,
}
impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
    pub fn role(&self) -> Role {
        self.role
    }
    pub fn content(&self) -> &str {
        &self.content
    }
}

#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CerebrasModel {
    #[default]
    Llama3Dot1_8b,
    Llama3Dot1_70b,
    Llama3Dot3_70b,
}
impl CerebrasModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Llama3Dot1_8b => "llama3.1-8b",
            Self::Llama3Dot1_70b => "llama3.1-70b",
            Self::Llama3Dot3_70b => "llama-3.3-70b",
        }
    }
}
impl serde::Serialize for CerebrasModel {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}
impl Display for CerebrasModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
impl FromStr for CerebrasModel {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "llama3.1-8b" | "8b" => Ok(Self::Llama3Dot1_8b),
            "llama3.1-70b" | "70b" => Ok(Self::Llama3Dot1_70b),
            "llama-3.3-70b" | "3.3-70b" => Ok(Self::Llama3Dot3_70b),
            _ => Err(format!("{} is not supported", s)),
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ChatCompletion {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ChatCompletionChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}
impl ChatCompletion {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            CerebrasClientError::new(
                format!("failed to parse chat completion: {}", json),
                CerebrasClientErrorKind::ResponseDeserializeError(e.to_string()),
            )
        })
    }
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }
    pub fn usage(&self) -> Option<&Usage> {
        self.usage.as_ref()
    }
    /// Content of the first choice.
    pub fn into_content(self) -> Result<String> {
        let choice = self.choices.into_iter().next().ok_or_else(|| {
            CerebrasClientError::new(
                "completion contained no choices".to_string(),
                CerebrasClientErrorKind::EmptyChoices,
            )
        })?;
        let index = choice.index;
        choice.message.and_then(|m| m.content).ok_or_else(|| {
            CerebrasClientError::new(
                format!("choice {} has no message content", index),
                CerebrasClientErrorKind::MissingContent,
            )
        })
    }
}
#[derive(Debug, Clone, serde::Deserialize)]
struct ChatCompletionChoice {
    #[serde(default)]
    index: usize,
    #[serde(default)]
    message: Option<ChatCompletionMessage>,
}
#[derive(Debug, Clone, serde::Deserialize)]
struct ChatCompletionMessage {
    #[serde(default)]
    content: Option<String>,
}
#[derive(Debug, Clone, Copy, Default, serde::Deserialize, PartialEq, Eq)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// Coarse classification used by the session loop to decide whether a turn
/// can be retried by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCategory {
    Configuration,
    Network,
    RemoteService,
    MalformedResponse,
}
impl Display for FailureCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let category = match self {
            Self::Configuration => "configuration error",
            Self::Network => "network error",
            Self::RemoteService => "remote service error",
            Self::MalformedResponse => "malformed response",
        };
        write!(f, "{}", category)
    }
}

#[derive(Debug, PartialEq, Eq, Clone, thiserror::Error)]
#[error("{message} ({kind})")]
pub struct CerebrasClientError {
    message: String,
    pub kind: CerebrasClientErrorKind,
}
impl CerebrasClientError {
    pub fn new(message: String, kind: CerebrasClientErrorKind) -> Self {
        Self { message, kind }
    }
    pub fn category(&self) -> FailureCategory {
        self.kind.category()
    }
    pub fn is_fatal(&self) -> bool {
        self.category() == FailureCategory::Configuration
    }
}

#[derive(Debug, PartialEq, Eq, Clone, thiserror::Error)]
pub enum CerebrasClientErrorKind {
    #[error("Not found CEREBRAS_API_KEY in env")]
    NotFoundEnvAPIKey,
    #[error("Invalid CEREBRAS_API_KEY")]
    InvalidAPIKey,
    #[error("API key rejected. Status is : {0}")]
    Unauthorized(u16),
    #[error("Invalid Url. Url is : {0}")]
    InvalidUrl(String),
    #[error("Not found CA File. File is : {0}")]
    NotFoundCAFile(String),
    #[error("Invalid CA File. File is : {0}")]
    InvalidCAFile(String),
    #[error("Not build http client. Error is : {0}")]
    ClientBuildError(String),
    #[error("Request Error to {0}")]
    RequestError(String),
    #[error("Not Read Response. Error is : {0}")]
    ReadResponseError(String),
    #[error("Rate limited")]
    RateLimited,
    #[error("Response Error. Status is : {status}, body is : {body}")]
    ResponseError { status: u16, body: String },
    #[error("Not Deserialize response. Serde Error is : {0}")]
    ResponseDeserializeError(String),
    #[error("Response has no choices")]
    EmptyChoices,
    #[error("Response has no message content")]
    MissingContent,
}
impl CerebrasClientErrorKind {
    pub fn category(&self) -> FailureCategory {
        match self {
            Self::NotFoundEnvAPIKey
            | Self::InvalidAPIKey
            | Self::Unauthorized(_)
            | Self::InvalidUrl(_)
            | Self::NotFoundCAFile(_)
            | Self::InvalidCAFile(_)
            | Self::ClientBuildError(_) => FailureCategory::Configuration,
            Self::RequestError(_) | Self::ReadResponseError(_) => FailureCategory::Network,
            Self::RateLimited | Self::ResponseError { .. } => FailureCategory::RemoteService,
            Self::ResponseDeserializeError(_) | Self::EmptyChoices | Self::MissingContent => {
                FailureCategory::MalformedResponse
            }
        }
    }
}
pub type Result<T> = std::result::Result<T, CerebrasClientError>;
