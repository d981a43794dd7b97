//! JWT 认证模块
//!
//! 令牌只携带显示名称，登记名称即视为登录。

use axum::http::HeaderMap;
use config::JwtConfig;
use domain::DisplayName;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// JWT Claims 结构
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub name: String,
    pub exp: i64, // 过期时间 (Unix timestamp)
}

/// JWT Token 服务
#[derive(Clone)]
pub struct JwtService {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtService {
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_ref());
        let decoding_key = DecodingKey::from_secret(config.secret.as_ref());

        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    /// 为显示名称签发令牌
    pub fn generate_token(&self, name: &DisplayName) -> Result<String, ApiError> {
        let exp = chrono::Utc::now() + chrono::Duration::hours(self.config.expiration_hours);

        let claims = Claims {
            name: name.as_str().to_string(),
            exp: exp.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(|err| {
            ApiError::internal_server_error(format!("Token generation failed: {}", err))
        })
    }

    /// 验证令牌并取出其中的显示名称
    pub fn verify_token(&self, token: &str) -> Result<DisplayName, ApiError> {
        let claims = decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map(|token_data| token_data.claims)
            .map_err(|err| ApiError::unauthorized(format!("Invalid token: {}", err)))?;

        DisplayName::parse(claims.name)
            .map_err(|_| ApiError::unauthorized("Invalid token: bad display name"))
    }

    /// 从 `Authorization: Bearer` 头中提取身份
    pub fn extract_name_from_headers(&self, headers: &HeaderMap) -> Result<DisplayName, ApiError> {
        let auth_header = headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|header| header.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized("Missing authorization header"))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::unauthorized("Invalid authorization header format"))?;

        self.verify_token(token)
    }
}

/// 登记名称的响应
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub username: DisplayName,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header::AUTHORIZATION, HeaderValue};

    fn service() -> JwtService {
        JwtService::new(JwtConfig {
            secret: "test-secret-key-with-at-least-32-characters".to_string(),
            expiration_hours: 1,
        })
    }

    #[test]
    fn token_round_trips_display_name() {
        let jwt = service();
        let name = DisplayName::parse("alice").unwrap();
        let token = jwt.generate_token(&name).unwrap();
        assert_eq!(jwt.verify_token(&token).unwrap(), name);
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let other = JwtService::new(JwtConfig {
            secret: "another-secret-key-with-at-least-32-chars".to_string(),
            expiration_hours: 1,
        });
        let token = other
            .generate_token(&DisplayName::parse("mallory").unwrap())
            .unwrap();
        assert!(service().verify_token(&token).is_err());
    }

    #[test]
    fn header_requires_bearer_prefix() {
        let jwt = service();
        let token = jwt
            .generate_token(&DisplayName::parse("bob").unwrap())
            .unwrap();

        let mut headers = HeaderMap::new();
        assert!(jwt.extract_name_from_headers(&headers).is_err());

        headers.insert(AUTHORIZATION, HeaderValue::from_str(&token).unwrap());
        assert!(jwt.extract_name_from_headers(&headers).is_err());

        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        assert_eq!(
            jwt.extract_name_from_headers(&headers).unwrap().as_str(),
            "bob"
        );
    }
}
