use actix_web::dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header::Header;
use actix_web::{web, Error, FromRequest, HttpMessage, HttpRequest};
use actix_web_httpauth::headers::authorization::{Authorization, Bearer};
use futures_util::future::{ready, LocalBoxFuture, Ready};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header as JwtHeader, Validation};
use serde::{Deserialize, Serialize};
use std::rc::Rc;
use std::sync::Arc;

use crate::models::{Id, User};
use crate::routes::AppState;

/// Cookie carrying the token for browser form flows.
pub const TOKEN_COOKIE: &str = "access_token";
pub const TOKEN_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id
    pub username: String,
    pub exp: usize,
    pub roles: Vec<Role>,
}

/// HS256 signing material shared by the login routes and [`Identify`].
#[derive(Clone)]
pub struct JwtKeys {
    secret: Arc<Vec<u8>>,
}

impl JwtKeys {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self { secret: Arc::new(secret.as_ref().to_vec()) }
    }

    pub fn issue(&self, user: &User) -> Result<String, jsonwebtoken::errors::Error> {
        let exp = (chrono::Utc::now() + chrono::Duration::hours(TOKEN_TTL_HOURS)).timestamp() as usize;
        let claims = Claims {
            sub: user.id.to_string(),
            username: user.username.clone(),
            exp,
            roles: roles_for(user),
        };
        encode(&JwtHeader::default(), &claims, &EncodingKey::from_secret(&self.secret))
    }

    pub fn decode(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        let data = decode::<Claims>(token, &DecodingKey::from_secret(&self.secret), &validation)?;
        Ok(data.claims)
    }
}

pub fn roles_for(user: &User) -> Vec<Role> {
    if user.is_admin { vec![Role::User, Role::Admin] } else { vec![Role::User] }
}

/// Authenticated user resolved for the current request.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub id: Id,
    pub username: String,
    pub roles: Vec<Role>,
}

impl Identity {
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

impl From<&User> for Identity {
    fn from(user: &User) -> Self {
        Self { id: user.id, username: user.username.clone(), roles: roles_for(user) }
    }
}

/// Who is calling: set once per request by [`Identify`], anonymous when it is
/// absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Caller(pub Option<Identity>);

impl Caller {
    pub fn identity(&self) -> Option<&Identity> { self.0.as_ref() }
}

impl FromRequest for Caller {
    type Error = Error;
    type Future = Ready<Result<Self, Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(Ok(req.extensions().get::<Caller>().cloned().unwrap_or_default()))
    }
}

/// Admin-style guard for handlers returning `Result<_, ApiError>`.
#[macro_export]
macro_rules! require_role {
    ($identity:expr, $role:expr) => {
        if !$identity.has_role($role) {
            return Err($crate::error::ApiError::Forbidden);
        }
    };
}

fn bearer_or_cookie(req: &ServiceRequest) -> Option<String> {
    if let Ok(auth) = Authorization::<Bearer>::parse(req) {
        return Some(auth.into_scheme().token().to_string());
    }
    req.cookie(TOKEN_COOKIE).map(|c| c.value().to_string())
}

/// Middleware resolving the caller from the request token. Bad, expired or
/// orphaned tokens leave the caller anonymous rather than failing the request.
#[derive(Clone, Default)]
pub struct Identify;

impl<S, B> Transform<S, ServiceRequest> for Identify
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = IdentifyMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(IdentifyMiddleware { service: Rc::new(service) }))
    }
}

pub struct IdentifyMiddleware<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for IdentifyMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let svc = self.service.clone();
        Box::pin(async move {
            let caller = match (bearer_or_cookie(&req), req.app_data::<web::Data<AppState>>().cloned()) {
                (Some(token), Some(state)) => resolve(&state, &token).await,
                _ => Caller::default(),
            };
            req.extensions_mut().insert(caller);
            svc.call(req).await
        })
    }
}

async fn resolve(state: &AppState, token: &str) -> Caller {
    let claims = match state.keys.decode(token) {
        Ok(c) => c,
        Err(e) => {
            log::debug!("rejected token: {e}");
            return Caller::default();
        }
    };
    let Ok(id) = claims.sub.parse::<Id>() else { return Caller::default() };
    match state.repo.get_user(id).await {
        Ok(user) => Caller(Some(Identity::from(&user))),
        Err(e) => {
            log::debug!("token subject {id} not usable: {e}");
            Caller::default()
        }
    }
}

pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    use argon2::password_hash::{PasswordHasher, SaltString};
    use rand::RngCore;

    let mut salt_bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt_bytes);
    let salt = SaltString::encode_b64(&salt_bytes)?;
    Ok(argon2::Argon2::default().hash_password(password.as_bytes(), &salt)?.to_string())
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    use argon2::password_hash::{PasswordHash, PasswordVerifier};

    match PasswordHash::new(hash) {
        Ok(parsed) => argon2::Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_roundtrip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
        assert!(!verify_password("correct horse", "not-a-phc-string"));
    }
}
