use actix_web::{http::header::AUTHORIZATION, HttpRequest};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};

use crate::{error_code::ErrorCode, repo::OwnerId};

pub(crate) const ISSUER: &str = "tubely-access";

#[derive(Debug, thiserror::Error)]
pub(crate) enum AuthError {
    #[error("Missing bearer token")]
    MissingToken,

    #[error("Authorization header is not a bearer token")]
    MalformedHeader,

    #[error("Invalid bearer token")]
    InvalidToken(#[source] jsonwebtoken::errors::Error),

    #[error("Token subject is not a user id")]
    InvalidSubject(#[source] uuid::Error),
}

impl AuthError {
    pub(crate) const fn error_code(&self) -> ErrorCode {
        match self {
            Self::MissingToken | Self::MalformedHeader => ErrorCode::MISSING_TOKEN,
            Self::InvalidToken(_) | Self::InvalidSubject(_) => ErrorCode::INVALID_TOKEN,
        }
    }
}

#[derive(Debug, serde::Deserialize, serde::Serialize)]
struct Claims {
    iss: String,
    sub: String,
    iat: i64,
    exp: i64,
}

/// Validates HS256 bearer tokens issued for tubely
pub(crate) struct JwtAuth {
    key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for JwtAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtAuth").finish()
    }
}

impl JwtAuth {
    pub(crate) fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[ISSUER]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        JwtAuth {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub(crate) fn validate_token(&self, token: &str) -> Result<OwnerId, AuthError> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.key, &self.validation)
            .map_err(AuthError::InvalidToken)?;

        data.claims.sub.parse().map_err(AuthError::InvalidSubject)
    }

    /// Pull the bearer token from `req` and validate it
    pub(crate) fn authenticate(&self, req: &HttpRequest) -> Result<OwnerId, AuthError> {
        self.validate_token(bearer_token(req)?)
    }

    /// Validate a raw `Authorization` header value captured before the request body is read
    pub(crate) fn authenticate_header(&self, header: Option<&str>) -> Result<OwnerId, AuthError> {
        self.validate_token(parse_bearer(header)?)
    }
}

pub(crate) fn bearer_token(req: &HttpRequest) -> Result<&str, AuthError> {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .map(|value| value.to_str().map_err(|_| AuthError::MalformedHeader))
        .transpose()?;

    parse_bearer(header)
}

pub(crate) fn parse_bearer(header: Option<&str>) -> Result<&str, AuthError> {
    let value = header.ok_or(AuthError::MissingToken)?;

    let token = value
        .strip_prefix("Bearer ")
        .ok_or(AuthError::MalformedHeader)?
        .trim();

    if token.is_empty() {
        return Err(AuthError::MissingToken);
    }

    Ok(token)
}

#[cfg(test)]
pub(crate) fn make_token(secret: &str, owner: OwnerId, expires_in: i64) -> String {
    let now = time::OffsetDateTime::now_utc().unix_timestamp();

    make_token_with(secret, ISSUER, &owner.to_string(), now + expires_in)
}

#[cfg(test)]
fn make_token_with(secret: &str, issuer: &str, sub: &str, exp: i64) -> String {
    let claims = Claims {
        iss: issuer.to_string(),
        sub: sub.to_string(),
        iat: time::OffsetDateTime::now_utc().unix_timestamp(),
        exp,
    };

    jsonwebtoken::encode(
        &jsonwebtoken::Header::new(Algorithm::HS256),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("Encoded token")
}

#[cfg(test)]
mod tests {
    use super::{
        bearer_token, make_token, make_token_with, parse_bearer, AuthError, JwtAuth, ISSUER,
    };
    use crate::{error_code::ErrorCode, repo::OwnerId};
    use actix_web::test::TestRequest;

    fn owner() -> OwnerId {
        OwnerId::from_uuid(uuid::Uuid::new_v4())
    }

    fn now() -> i64 {
        time::OffsetDateTime::now_utc().unix_timestamp()
    }

    #[test]
    fn valid_token() {
        let owner = owner();
        let auth = JwtAuth::new("secret");

        let token = make_token("secret", owner, 3600);

        assert_eq!(auth.validate_token(&token).expect("Valid token"), owner);
    }

    #[test]
    fn wrong_secret() {
        let auth = JwtAuth::new("secret");

        let token = make_token("other-secret", owner(), 3600);
        let err = auth.validate_token(&token).expect_err("Wrong secret");

        assert!(matches!(err, AuthError::InvalidToken(_)));
        assert_eq!(err.error_code(), ErrorCode::INVALID_TOKEN);
    }

    #[test]
    fn wrong_issuer() {
        let auth = JwtAuth::new("secret");

        let token = make_token_with("secret", "someone-else", &owner().to_string(), now() + 3600);

        assert!(auth.validate_token(&token).is_err());
    }

    #[test]
    fn expired() {
        let auth = JwtAuth::new("secret");

        let token = make_token_with("secret", ISSUER, &owner().to_string(), now() - 3600);

        assert!(matches!(
            auth.validate_token(&token),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn subject_must_be_uuid() {
        let auth = JwtAuth::new("secret");

        let token = make_token_with("secret", ISSUER, "admin", now() + 3600);

        assert!(matches!(
            auth.validate_token(&token),
            Err(AuthError::InvalidSubject(_))
        ));
    }

    #[test]
    fn garbage_token() {
        let auth = JwtAuth::new("secret");

        assert!(auth.validate_token("not.a.jwt").is_err());
    }

    #[test]
    fn extract_bearer() {
        let req = TestRequest::default()
            .insert_header(("Authorization", "Bearer abc.def.ghi"))
            .to_http_request();

        assert_eq!(bearer_token(&req).expect("Has token"), "abc.def.ghi");
    }

    #[test]
    fn missing_header() {
        let req = TestRequest::default().to_http_request();

        let err = bearer_token(&req).expect_err("No header");

        assert!(matches!(err, AuthError::MissingToken));
        assert_eq!(err.error_code(), ErrorCode::MISSING_TOKEN);
    }

    #[test]
    fn basic_auth_is_not_bearer() {
        let req = TestRequest::default()
            .insert_header(("Authorization", "Basic dXNlcjpwYXNz"))
            .to_http_request();

        assert!(matches!(
            bearer_token(&req),
            Err(AuthError::MalformedHeader)
        ));
    }

    #[test]
    fn empty_bearer_is_missing() {
        assert!(matches!(
            parse_bearer(Some("Bearer   ")),
            Err(AuthError::MissingToken)
        ));
        assert!(matches!(parse_bearer(None), Err(AuthError::MissingToken)));
    }

    #[test]
    fn authenticate_request() {
        let owner = owner();
        let auth = JwtAuth::new("secret");
        let token = make_token("secret", owner, 60);

        let req = TestRequest::default()
            .insert_header(("Authorization", format!("Bearer {token}")))
            .to_http_request();

        assert_eq!(auth.authenticate(&req).expect("Authenticated"), owner);
    }
}
