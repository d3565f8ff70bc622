use crate::auth::jwt::verify_token;
use crate::config::Config;
use crate::error::AppError;
use crate::model::role::Role;
use crate::models::{Claims, TokenType};
use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload, web::Data};
use futures::future::{Ready, ready};

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: u64,
    pub username: String,
    pub role: Role,

    /// Present only if this user is linked to an employee record
    pub employee_id: Option<String>,
}

impl AuthUser {
    pub fn from_claims(claims: Claims) -> Result<Self, AppError> {
        if claims.token_type != TokenType::Access {
            return Err(AppError::Unauthorized("Access token required".into()));
        }

        let role = Role::from_repr(claims.role)
            .ok_or_else(|| AppError::Unauthorized("Invalid role".into()))?;

        Ok(AuthUser {
            user_id: claims.user_id,
            username: claims.sub,
            role,
            employee_id: claims.employee_id,
        })
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.role == Role::Admin {
            Ok(())
        } else {
            Err(AppError::Forbidden("Admin only".into()))
        }
    }

    pub fn require_hr_or_admin(&self) -> Result<(), AppError> {
        if self.role.can_manage() {
            Ok(())
        } else {
            Err(AppError::Forbidden("HR/Admin only".into()))
        }
    }
}

/// Bearer token of a request, if any.
pub fn bearer_token(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

impl FromRequest for AuthUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        // Set by auth_middleware on protected scopes
        if let Some(user) = req.extensions().get::<AuthUser>() {
            return ready(Ok(user.clone()));
        }

        let Some(token) = bearer_token(req) else {
            return ready(Err(AppError::Unauthorized("Missing token".into())));
        };

        let Some(config) = req.app_data::<Data<Config>>() else {
            return ready(Err(AppError::Internal(anyhow::anyhow!("Config missing"))));
        };

        ready(
            verify_token(token, &config.jwt_secret)
                .map_err(|_| AppError::Unauthorized("Invalid token".into()))
                .and_then(AuthUser::from_claims),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::{generate_access_token, generate_refresh_token};

    fn user(role: Role) -> AuthUser {
        AuthUser {
            user_id: 1,
            username: "u".into(),
            role,
            employee_id: None,
        }
    }

    #[test]
    fn role_checks() {
        assert!(user(Role::Admin).require_admin().is_ok());
        assert!(user(Role::Hr).require_admin().is_err());
        assert!(user(Role::Hr).require_hr_or_admin().is_ok());
        assert!(user(Role::Employee).require_hr_or_admin().is_err());
    }

    #[test]
    fn refresh_tokens_cannot_authenticate_requests() {
        let (token, _) = generate_refresh_token(1, "a".into(), 1, None, "s", 60).unwrap();
        let claims = verify_token(&token, "s").unwrap();
        assert!(AuthUser::from_claims(claims).is_err());

        let token = generate_access_token(1, "a".into(), 2, None, "s", 60).unwrap();
        let auth = AuthUser::from_claims(verify_token(&token, "s").unwrap()).unwrap();
        assert_eq!(auth.role, Role::Hr);
    }

    #[actix_web::test]
    async fn extracts_user_from_bearer_header() {
        use actix_web::test::TestRequest;

        let token = generate_access_token(9, "admin".into(), 1, None, "s", 60).unwrap();
        let config = Config {
            jwt_secret: "s".into(),
            ..Config::for_tests()
        };
        let req = TestRequest::default()
            .insert_header(("Authorization", format!("Bearer {token}")))
            .app_data(Data::new(config))
            .to_http_request();

        let auth = AuthUser::extract(&req).await.unwrap();
        assert_eq!(auth.user_id, 9);
        assert_eq!(auth.role, Role::Admin);

        let anonymous = TestRequest::default().to_http_request();
        assert!(AuthUser::extract(&anonymous).await.is_err());
    }
}
