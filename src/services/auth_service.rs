use crate::entities::{TokenPurpose, user_entity as users};
use crate::error::{AppError, AppResult};
use crate::external::EmailService;
use crate::models::{
    AuthResponse, LoginRequest, RegisterRequest, RequestPasswordResetRequest,
    SubmitPasswordResetRequest, UserResponse,
};
use crate::services::{RedeemOutcome, TokenService};
use crate::utils::{JwtService, hash_password, validate_email, validate_password, verify_password};
use chrono::Utc;
use sea_orm::entity::prelude::*;
use sea_orm::{DatabaseConnection, Set};

#[derive(Clone)]
pub struct AuthService {
    pool: DatabaseConnection,
    jwt_service: JwtService,
    token_service: TokenService,
    email_service: EmailService,
}

impl AuthService {
    pub fn new(
        pool: DatabaseConnection,
        jwt_service: JwtService,
        token_service: TokenService,
        email_service: EmailService,
    ) -> Self {
        Self {
            pool,
            jwt_service,
            token_service,
            email_service,
        }
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<users::Model>> {
        let user = users::Entity::find()
            .filter(users::Column::Email.eq(email))
            .one(&self.pool)
            .await?;
        Ok(user)
    }

    fn issue_tokens(&self, user: users::Model) -> AppResult<AuthResponse> {
        let access_token = self.jwt_service.generate_access_token(user.id, &user.email)?;
        let refresh_token = self.jwt_service.generate_refresh_token(user.id, &user.email)?;
        Ok(AuthResponse {
            user: UserResponse::from(user),
            access_token,
            refresh_token,
            expires_in: self.jwt_service.get_access_token_expires_in(),
        })
    }

    pub async fn register(&self, req: RegisterRequest) -> AppResult<AuthResponse> {
        validate_email(&req.email)?;
        validate_password(&req.password)?;

        if self.find_by_email(&req.email).await?.is_some() {
            return Err(AppError::ValidationError(
                "Email already registered".to_string(),
            ));
        }

        let user = users::ActiveModel {
            email: Set(req.email),
            password_hash: Set(hash_password(&req.password)?),
            display_name: Set(req.display_name),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&self.pool)
        .await?;

        log::info!("Registered user {} ({})", user.id, user.email);
        self.issue_tokens(user)
    }

    pub async fn login(&self, req: LoginRequest) -> AppResult<AuthResponse> {
        let user = self
            .find_by_email(&req.email)
            .await?
            .ok_or_else(|| AppError::AuthError("Invalid email or password".to_string()))?;

        if !verify_password(&req.password, &user.password_hash)? {
            return Err(AppError::AuthError("Invalid email or password".to_string()));
        }

        self.issue_tokens(user)
    }

    pub async fn refresh(&self, refresh_token: &str) -> AppResult<AuthResponse> {
        let claims = self.jwt_service.verify_refresh_token(refresh_token)?;
        let user_id: i64 = claims
            .sub
            .parse()
            .map_err(|_| AppError::AuthError("Invalid token subject".to_string()))?;

        let user = users::Entity::find_by_id(user_id)
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::AuthError("User no longer exists".to_string()))?;

        self.issue_tokens(user)
    }

    /// Issue a reset token bound to the email and hand it to the mail
    /// collaborator. Unknown addresses get the same answer as known ones, so
    /// the endpoint cannot be used to probe for accounts. A delivery failure
    /// rolls the token back; nothing redeemable is left behind.
    pub async fn request_password_reset(
        &self,
        req: RequestPasswordResetRequest,
    ) -> AppResult<()> {
        validate_email(&req.email)?;

        let Some(user) = self.find_by_email(&req.email).await? else {
            log::debug!("Password reset requested for unknown address");
            return Ok(());
        };

        let token = self
            .token_service
            .issue(TokenPurpose::PasswordReset, &user.email, None)
            .await?;

        if let Err(e) = self
            .email_service
            .send_password_reset(&user.email, &token.token)
            .await
        {
            self.token_service.discard(&token.token).await?;
            return Err(e);
        }

        Ok(())
    }

    /// Redeem the reset token, then update the credential. Unlike payment
    /// confirmation, a replayed reset token is an error: the used token must
    /// never authorize a second password change.
    pub async fn submit_password_reset(
        &self,
        req: SubmitPasswordResetRequest,
    ) -> AppResult<()> {
        validate_email(&req.email)?;
        validate_password(&req.new_password)?;

        let outcome = self
            .token_service
            .redeem(&req.token, TokenPurpose::PasswordReset, &req.email)
            .await?;

        let token = match outcome {
            RedeemOutcome::Applied(token) => token,
            RedeemOutcome::AlreadyUsed(_) => return Err(AppError::TokenAlreadyUsed),
        };

        let user = self
            .find_by_email(&req.email)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        let mut active: users::ActiveModel = user.into();
        active.password_hash = Set(hash_password(&req.new_password)?);
        active.update(&self.pool).await?;

        log::info!("Password reset completed via token {}", token.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmailConfig;
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn auth_service(db: DatabaseConnection) -> AuthService {
        AuthService::new(
            db.clone(),
            JwtService::new("test-secret", 3600, 86400),
            TokenService::new(db.clone()),
            EmailService::new(EmailConfig {
                api_key: "key".to_string(),
                base_url: "https://api.mail.example.com".to_string(),
                from_address: "no-reply@test".to_string(),
            }),
        )
    }

    #[tokio::test]
    async fn test_reset_request_for_unknown_email_succeeds_quietly() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<users::Model>::new()])
            .into_connection();

        // No token issued, no email sent, same outward answer.
        auth_service(db)
            .request_password_reset(RequestPasswordResetRequest {
                email: "ghost@example.com".to_string(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_reset_request_rejects_malformed_email() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();

        let err = auth_service(db)
            .request_password_reset(RequestPasswordResetRequest {
                email: "not-an-email".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_reset_submit_rejects_weak_password() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();

        let err = auth_service(db)
            .submit_password_reset(SubmitPasswordResetRequest {
                email: "jane@example.com".to_string(),
                token: "tok".to_string(),
                new_password: "short".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }
}
