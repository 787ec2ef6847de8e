use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;

use crate::api::{AuthToken, UserId, ACCESS_TOKEN_KEY};

/// Key/value storage the bearer token lives in, owned by whoever handles login
pub trait TokenStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn access_token(&self) -> Option<AuthToken> {
        self.get(ACCESS_TOKEN_KEY)
            .filter(|t| !t.trim().is_empty())
            .map(AuthToken)
    }
}

impl<T: TokenStore + ?Sized> TokenStore for Arc<T> {
    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }
}

#[derive(Debug, Default)]
pub struct MemoryTokenStore(RwLock<HashMap<String, String>>);

impl MemoryTokenStore {
    pub fn new() -> MemoryTokenStore {
        MemoryTokenStore::default()
    }

    pub fn with_access_token(token: AuthToken) -> MemoryTokenStore {
        let res = MemoryTokenStore::new();
        res.set(ACCESS_TOKEN_KEY, token.0);
        res
    }

    pub fn set(&self, key: &str, value: String) {
        self.0.write().insert(String::from(key), value);
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        self.0.write().remove(key)
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, key: &str) -> Option<String> {
        self.0.read().get(key).cloned()
    }
}

/// Who the acting user is, as far as the client can tell without asking the server
pub trait Identity: Send + Sync {
    fn current_user_id(&self) -> Option<UserId>;

    fn current_username(&self) -> Option<String> {
        None
    }
}

/// Identity of nobody, for read-only consumers
pub struct Anonymous;

impl Identity for Anonymous {
    fn current_user_id(&self) -> Option<UserId> {
        None
    }
}

/// Reads the identity out of the claims of the JWT currently in the token store
pub struct TokenIdentity<T> {
    tokens: T,
}

impl<T: TokenStore> TokenIdentity<T> {
    pub fn new(tokens: T) -> TokenIdentity<T> {
        TokenIdentity { tokens }
    }

    fn claims(&self) -> Option<Claims> {
        token_claims(self.tokens.access_token()?.as_str())
    }
}

impl<T: TokenStore> Identity for TokenIdentity<T> {
    fn current_user_id(&self) -> Option<UserId> {
        let claims = self.claims()?;
        claims.sub.or(claims.user_id).map(UserId)
    }

    fn current_username(&self) -> Option<String> {
        self.claims()?.username
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Deserialize)]
pub struct Claims {
    pub sub: Option<String>,
    pub user_id: Option<String>,
    pub username: Option<String>,
}

/// Decodes the payload segment of a JWT, without checking its signature
pub fn token_claims(token: &str) -> Option<Claims> {
    let payload = token.split('.').nth(1)?;
    let mut payload = String::from(payload);
    while payload.len() % 4 != 0 {
        payload.push('=');
    }
    let bytes = match base64::decode_config(&payload, base64::URL_SAFE) {
        Ok(b) => b,
        Err(err) => {
            tracing::debug!(?err, "access token payload is not base64url");
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(claims) => Some(claims),
        Err(err) => {
            tracing::debug!(?err, "access token payload is not a claims object");
            None
        }
    }
}
