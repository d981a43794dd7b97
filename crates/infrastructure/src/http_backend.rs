//! 通过 REST 接口访问远程聊天服务

use application::{ApplicationError, ChatBackend};
use async_trait::async_trait;
use domain::{ChatMessage, DisplayName, DomainError, MessageBody};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
struct SessionRequest<'a> {
    username: &'a str,
}

/// 登记显示名称后服务端签发的会话凭据
#[derive(Debug, Clone, Deserialize)]
pub struct SessionGrant {
    pub token: String,
    pub username: DisplayName,
}

#[derive(Debug, Serialize)]
struct CreateMessageRequest<'a> {
    body: &'a str,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Clone)]
pub struct HttpChatBackend {
    client: Client,
    base_url: String,
    token: String,
}

impl HttpChatBackend {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    /// 以显示名称换取访问令牌
    pub async fn create_session(
        base_url: &str,
        username: &str,
    ) -> Result<SessionGrant, ApplicationError> {
        let url = format!("{}/api/v1/session", base_url.trim_end_matches('/'));
        let response = Client::new()
            .post(url)
            .json(&SessionRequest { username })
            .send()
            .await
            .map_err(request_failed)?;
        decode(response).await
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

#[async_trait]
impl ChatBackend for HttpChatBackend {
    async fn create_message(
        &self,
        _username: &DisplayName,
        body: &MessageBody,
    ) -> Result<ChatMessage, ApplicationError> {
        // 作者以令牌中的名称为准
        let response = self
            .client
            .post(self.url("/api/v1/messages"))
            .bearer_auth(&self.token)
            .json(&CreateMessageRequest {
                body: body.as_str(),
            })
            .send()
            .await
            .map_err(request_failed)?;
        decode(response).await
    }

    async fn list_recent_messages(
        &self,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, ApplicationError> {
        let response = self
            .client
            .get(self.url("/api/v1/messages"))
            .bearer_auth(&self.token)
            .query(&[("limit", limit)])
            .send()
            .await
            .map_err(request_failed)?;
        decode(response).await
    }
}

fn request_failed(err: reqwest::Error) -> ApplicationError {
    tracing::warn!(error = %err, "聊天服务请求失败");
    ApplicationError::infrastructure(format!("request failed: {err}"))
}

async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, ApplicationError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|err| ApplicationError::infrastructure(format!("invalid response: {err}")));
    }

    let message = response
        .json::<ErrorBody>()
        .await
        .map(|body| body.message)
        .unwrap_or_else(|_| status.to_string());

    Err(match status {
        StatusCode::BAD_REQUEST => {
            ApplicationError::Validation(DomainError::invalid_argument("request", message))
        }
        StatusCode::UNAUTHORIZED => ApplicationError::Unauthenticated,
        _ => ApplicationError::infrastructure(format!("{status}: {message}")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn message_json(id: i64, username: &str, body: &str) -> serde_json::Value {
        json!({
            "id": id,
            "username": username,
            "body": body,
            "created_at": "2025-01-01T00:00:00Z",
        })
    }

    #[tokio::test]
    async fn create_session_returns_grant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/session"))
            .and(body_json(json!({ "username": "alice" })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "token": "t-1", "username": "alice" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let grant = HttpChatBackend::create_session(&server.uri(), "alice")
            .await
            .unwrap();
        assert_eq!(grant.token, "t-1");
        assert_eq!(grant.username.as_str(), "alice");
    }

    #[tokio::test]
    async fn create_message_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/messages"))
            .and(header("authorization", "Bearer t-1"))
            .and(body_json(json!({ "body": "hi" })))
            .respond_with(ResponseTemplate::new(201).set_body_json(message_json(7, "alice", "hi")))
            .expect(1)
            .mount(&server)
            .await;

        let backend = HttpChatBackend::new(server.uri(), "t-1");
        let name = DisplayName::parse("alice").unwrap();
        let body = MessageBody::parse("hi").unwrap();
        let message = backend.create_message(&name, &body).await.unwrap();

        assert_eq!(message.id.value(), 7);
        assert_eq!(message.body.as_str(), "hi");
    }

    #[tokio::test]
    async fn list_recent_passes_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/messages"))
            .and(query_param("limit", "50"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                message_json(1, "bob", "first"),
                message_json(2, "carol", "second"),
            ])))
            .mount(&server)
            .await;

        let backend = HttpChatBackend::new(server.uri(), "t-1");
        let messages = backend.list_recent_messages(50).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].username.as_str(), "carol");
    }

    #[tokio::test]
    async fn status_codes_map_to_application_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/messages"))
            .respond_with(ResponseTemplate::new(400).set_body_json(
                json!({ "code": "INVALID_ARGUMENT", "message": "body: cannot be empty" }),
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/messages"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let backend = HttpChatBackend::new(server.uri(), "expired");
        let name = DisplayName::parse("alice").unwrap();
        let body = MessageBody::parse("x").unwrap();

        let err = backend.create_message(&name, &body).await.unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("cannot be empty"));

        let err = backend.list_recent_messages(10).await.unwrap_err();
        assert!(matches!(err, ApplicationError::Unauthenticated));
    }

    #[tokio::test]
    async fn server_error_is_infrastructure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/messages"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let backend = HttpChatBackend::new(server.uri(), "t-1");
        let err = backend.list_recent_messages(10).await.unwrap_err();
        assert!(matches!(err, ApplicationError::Infrastructure(_)));
    }
}
