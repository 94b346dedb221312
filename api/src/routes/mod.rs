pub mod login;
pub mod raid;

use actix_identity::Identity;
use actix_web::{
    HttpResponse, Responder, ResponseError, body::BoxBody,
    dev::HttpServiceFactory, get, web,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::AdminPolicy;
use crate::store::{self, StoreError};

pub fn api_services() -> impl HttpServiceFactory {
    web::scope("/api")
        .service(health_check)
        .service(login::login)
        .service(login::login_check)
        .service(login::user_profile)
        .service(login::logout)
        .service(login::create_account)
        .service(login::ranking)
        .service(login::group_ranking)
        .service(raid::create_raid)
        .service(raid::get_raid)
        .service(raid::list_raids)
        .service(raid::update_raid)
        .service(raid::delete_raid)
        .service(raid::attack_raid)
        .service(raid::get_participation)
        .service(raid::list_participants)
        .service(raid::distribute_rewards)
}

#[get("/health_check")]
pub async fn health_check() -> impl Responder {
    HttpResponse::Ok().body("healthy")
}

#[derive(Debug, thiserror::Error)]
pub enum APIError {
    #[error("Authentication failed")]
    AuthError(#[source] anyhow::Error),
    #[error("Forbidden")]
    Forbidden(#[source] anyhow::Error),
    #[error("Bad request")]
    BadRequest(#[source] anyhow::Error),
    #[error("Not found")]
    NotFound(#[source] anyhow::Error),
    #[error("Something went wrong")]
    UnexpectedError(#[from] anyhow::Error),
}

impl ResponseError for APIError {
    fn error_response(&self) -> HttpResponse<BoxBody> {
        match self {
            Self::AuthError(e) => {
                HttpResponse::Unauthorized().body(format!("{self}: {e}"))
            }
            Self::Forbidden(e) => {
                HttpResponse::Forbidden().body(format!("{self}: {e}"))
            }
            Self::BadRequest(e) => {
                HttpResponse::BadRequest().body(format!("{self}: {e}"))
            }
            Self::NotFound(e) => {
                HttpResponse::NotFound().body(format!("{self}: {e}"))
            }
            Self::UnexpectedError(_) => {
                HttpResponse::InternalServerError().body(self.to_string())
            }
        }
    }
}

impl From<StoreError> for APIError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Database(_)
            | StoreError::UnexpectedError(_)
            | StoreError::DistributionPartialFailure { .. } => {
                APIError::UnexpectedError(e.into())
            }
            StoreError::UserNotFound => APIError::NotFound(e.into()),
            StoreError::RaidNotFound => APIError::NotFound(e.into()),
            _ => APIError::BadRequest(e.into()),
        }
    }
}

fn get_user_id(user: &Identity) -> Result<payloads::UserId, APIError> {
    let id_str = user.id().map_err(|e| {
        APIError::AuthError(
            anyhow::Error::from(e).context("Invalid login session"),
        )
    })?;
    // special case: since this is used in so many routes, the user_id is
    // recorded here, but attaches to the span for the api route itself
    tracing::Span::current()
        .record("user_id", tracing::field::display(&id_str));
    Ok(payloads::UserId(
        Uuid::parse_str(&id_str).map_err(anyhow::Error::from)?,
    ))
}

/// Resolve the session to a user, failing with 403 unless they are an
/// administrator.
async fn get_admin(
    user: &Identity,
    admins: &AdminPolicy,
    pool: &PgPool,
) -> Result<store::User, APIError> {
    let user_id = get_user_id(user)?;
    let user = store::read_user(pool, &user_id).await.map_err(|e| match e {
        StoreError::UserNotFound => APIError::AuthError(
            anyhow::Error::from(e).context("Session user no longer exists"),
        ),
        e => e.into(),
    })?;
    if !admins.is_admin(&user) {
        return Err(APIError::Forbidden(anyhow::anyhow!(
            "Administrator access required"
        )));
    }
    Ok(user)
}
