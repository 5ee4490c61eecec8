//! JWT 认证模块
//!
//! 登录时签发 token，实时通道 announce 时用 `TokenCredentialStore` 校验。

use std::sync::Arc;

use application::{AuthError, CredentialStore, Credentials};
use async_trait::async_trait;
use config::JwtConfig;
use domain::Identity;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::ApiError;

/// JWT Claims 结构
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// 用户名
    pub sub: String,
    pub iat: i64,
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

    /// 生成 JWT token
    pub fn generate_token(&self, username: &Identity) -> Result<String, ApiError> {
        let now = OffsetDateTime::now_utc();
        let exp = now + time::Duration::hours(self.config.expiration_hours);

        let claims = Claims {
            sub: username.as_str().to_owned(),
            iat: now.unix_timestamp(),
            exp: exp.unix_timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(|err| {
            tracing::error!(error = %err, "token generation failed");
            ApiError::internal_server_error("token generation failed")
        })
    }

    fn decode_claims(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map(|token_data| token_data.claims)
    }
}

/// 要求 announce 携带登录时签发的 token，且 token 的 subject 与用户名一致
#[derive(Clone)]
pub struct TokenCredentialStore {
    jwt: Arc<JwtService>,
}

impl TokenCredentialStore {
    pub fn new(jwt: Arc<JwtService>) -> Self {
        Self { jwt }
    }
}

#[async_trait]
impl CredentialStore for TokenCredentialStore {
    async fn authenticate(&self, credentials: &Credentials) -> Result<Identity, AuthError> {
        let identity = Identity::parse(credentials.username.as_str())?;
        let token = credentials.token.as_deref().ok_or(AuthError::MissingToken)?;

        let claims = self
            .jwt
            .decode_claims(token)
            .map_err(|err| AuthError::InvalidToken(err.to_string()))?;
        if claims.sub != identity.as_str() {
            return Err(AuthError::IdentityMismatch(identity.to_string()));
        }

        Ok(identity)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub username: Identity,
    pub token: String,
}
