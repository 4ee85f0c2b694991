use std::sync::Arc;

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::db::{is_write_conflict, CreateUser, User, UserRepository};
use crate::error::{AppError, AppResult};
use crate::AppState;

#[cfg(not(test))]
const PASSWORD_HASH_COST: u32 = bcrypt::DEFAULT_COST;
#[cfg(test)]
const PASSWORD_HASH_COST: u32 = 4;

const MIN_PASSWORD_LEN: usize = 6;
const MAX_NAME_LEN: usize = 100;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub iat: usize,
}

pub struct AuthService;

impl AuthService {
    /// Create a signed JWT for a user id
    pub fn create_jwt(state: &Arc<AppState>, user_id: &str) -> AppResult<String> {
        let now = Utc::now();
        let exp = now + Duration::hours(state.config.jwt.expiration_hours);
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now.timestamp() as usize,
            exp: exp.timestamp() as usize,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(state.config.jwt.secret.as_bytes()),
        )?;
        Ok(token)
    }

    /// Decode and validate a JWT, returning the claims
    pub fn decode_jwt(state: &Arc<AppState>, token: &str) -> AppResult<Claims> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(state.config.jwt.secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(token_data.claims)
    }

    /// Get user from JWT token
    pub async fn get_user_from_token(state: &Arc<AppState>, token: &str) -> AppResult<User> {
        let claims = Self::decode_jwt(state, token)?;
        let user = UserRepository::find_by_id(&state.db, &claims.sub)
            .await?
            .ok_or(AppError::Unauthorized)?;
        Ok(user)
    }

    /// Normalize and validate signup input. Returns the lower-cased email.
    pub fn validate_signup(name: &str, email: &str, password: &str) -> AppResult<String> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("Name cannot be empty".to_string()));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(AppError::Validation(format!(
                "Name cannot exceed {} characters",
                MAX_NAME_LEN
            )));
        }

        let email = email.trim().to_lowercase();
        let valid_email = match email.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && domain.contains('.')
                    && !domain.starts_with('.')
                    && !domain.ends_with('.')
                    && !domain.contains('@')
            }
            None => false,
        };
        if !valid_email {
            return Err(AppError::Validation("Invalid email address".to_string()));
        }

        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AppError::Validation(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        Ok(email)
    }

    /// Register a new user with an email/password login.
    pub async fn register(
        state: &Arc<AppState>,
        name: &str,
        email: &str,
        password: &str,
    ) -> AppResult<User> {
        let email = Self::validate_signup(name, email, password)?;

        if UserRepository::find_by_email(&state.db, &email)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict("Email already registered".to_string()));
        }

        let password_hash = bcrypt::hash(password, PASSWORD_HASH_COST)?;
        let user = UserRepository::create(
            &state.db,
            &CreateUser {
                name: name.trim().to_string(),
                email,
                password_hash,
            },
        )
        .await
        .map_err(|e| match e {
            AppError::Database(ref db_err) if is_write_conflict(db_err) => {
                AppError::Conflict("Email already registered".to_string())
            }
            other => other,
        })?;

        tracing::info!("Registered user {}", user.id);
        Ok(user)
    }

    /// Check credentials and issue a token. Unknown emails and wrong
    /// passwords are indistinguishable to the caller.
    pub async fn login(state: &Arc<AppState>, email: &str, password: &str) -> AppResult<String> {
        let user = UserRepository::find_by_email(&state.db, email)
            .await?
            .ok_or_else(|| {
                tracing::debug!("Login attempt for unknown email");
                AppError::Unauthorized
            })?;

        if !bcrypt::verify(password, &user.password_hash)? {
            tracing::debug!("Wrong password for user {}", user.id);
            return Err(AppError::Unauthorized);
        }

        Self::create_jwt(state, &user.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_state;

    #[test]
    fn signup_validation() {
        assert_eq!(
            AuthService::validate_signup("Ada", " Ada@Example.com ", "secret1").unwrap(),
            "ada@example.com"
        );
        assert!(matches!(
            AuthService::validate_signup("  ", "ada@example.com", "secret1"),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            AuthService::validate_signup("Ada", "not-an-email", "secret1"),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            AuthService::validate_signup("Ada", "ada@localhost", "secret1"),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            AuthService::validate_signup("Ada", "ada@example.com", "short"),
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn register_then_login_round_trip() {
        let state = test_state().await;
        let user = AuthService::register(&state, "Ada", "ada@example.com", "secret1")
            .await
            .unwrap();
        assert_ne!(user.password_hash, "secret1");

        let token = AuthService::login(&state, "ada@example.com", "secret1")
            .await
            .unwrap();
        let resolved = AuthService::get_user_from_token(&state, &token).await.unwrap();
        assert_eq!(resolved.id, user.id);
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let state = test_state().await;
        AuthService::register(&state, "Ada", "ada@example.com", "secret1")
            .await
            .unwrap();
        let err = AuthService::register(&state, "Ada2", "ADA@example.com", "secret2")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn wrong_password_is_unauthorized() {
        let state = test_state().await;
        AuthService::register(&state, "Ada", "ada@example.com", "secret1")
            .await
            .unwrap();

        let err = AuthService::login(&state, "ada@example.com", "wrong-password")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized));

        let err = AuthService::login(&state, "nobody@example.com", "secret1")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized));
    }

    #[tokio::test]
    async fn tampered_token_is_rejected() {
        let state = test_state().await;
        let user = AuthService::register(&state, "Ada", "ada@example.com", "secret1")
            .await
            .unwrap();
        let token = AuthService::create_jwt(&state, &user.id).unwrap();

        let err = AuthService::get_user_from_token(&state, &format!("{}x", token))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Jwt(_)));
    }
}
