use actix_identity::Identity;
use actix_web::{HttpMessage, HttpRequest, HttpResponse, get, post, web};
use sqlx::PgPool;

use crate::AdminPolicy;
use crate::password::{
    AuthError, Credentials, NewUserDetails, create_user, validate_credentials,
};
use crate::store;
use crate::time::TimeSource;

use super::{APIError, get_user_id};

#[tracing::instrument(
    skip(credentials, pool),
    fields(handle=tracing::field::Empty, user_id=tracing::field::Empty)
    ret,
)]
#[post("/login")]
pub async fn login(
    request: HttpRequest,
    credentials: web::Json<Credentials>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, APIError> {
    tracing::Span::current()
        .record("handle", tracing::field::display(&credentials.handle));
    match validate_credentials(credentials.0, &pool).await {
        Ok(user_id) => {
            tracing::Span::current()
                .record("user_id", tracing::field::display(&user_id));
            Identity::login(&request.extensions(), user_id.to_string())
                .map_err(|e| APIError::UnexpectedError(e.into()))?;
            Ok(HttpResponse::Ok().finish())
        }
        Err(e) => {
            let e = match e {
                AuthError::InvalidCredentials(_) => {
                    APIError::AuthError(e.into())
                }
                AuthError::UnexpectedError(_) => {
                    APIError::UnexpectedError(e.into())
                }
            };
            Err(e)
        }
    }
}

#[tracing::instrument(skip(user))]
#[post("/login_check")]
pub async fn login_check(user: Identity) -> Result<HttpResponse, APIError> {
    get_user_id(&user)?;
    Ok(HttpResponse::Ok().finish())
}

#[tracing::instrument(skip(user))]
#[post("/logout")]
pub async fn logout(user: Identity) -> Result<HttpResponse, APIError> {
    let _ = get_user_id(&user); // to instrument the user_id, if exists
    user.logout();
    Ok(HttpResponse::Ok().finish())
}

/// Register a judge handle and log the new user in.
#[tracing::instrument(skip(request, new_user_details, pool, time_source))]
#[post("/create_account")]
pub async fn create_account(
    request: HttpRequest,
    new_user_details: web::Json<NewUserDetails>,
    pool: web::Data<PgPool>,
    time_source: web::Data<TimeSource>,
) -> Result<HttpResponse, APIError> {
    if !new_user_details.has_password() {
        return Err(APIError::BadRequest(anyhow::anyhow!(
            "Password must not be empty"
        )));
    }
    let user = create_user(new_user_details.0, &pool, &time_source).await?;
    Identity::login(&request.extensions(), user.id.to_string())
        .map_err(|e| APIError::UnexpectedError(e.into()))?;
    Ok(HttpResponse::Ok().finish())
}

#[tracing::instrument(skip(user, pool, admins))]
#[get("/user_profile")]
pub async fn user_profile(
    user: Identity,
    pool: web::Data<PgPool>,
    admins: web::Data<AdminPolicy>,
) -> Result<HttpResponse, APIError> {
    let user_id = get_user_id(&user)?;
    let user_data = store::read_user(&pool, &user_id).await?;

    let profile = payloads::responses::UserProfile {
        user: user_data.identity(),
        group: user_data.group(),
        total_point: user_data.total_point,
        is_admin: admins.is_admin(&user_data),
    };

    Ok(HttpResponse::Ok().json(profile))
}

#[tracing::instrument(skip(pool))]
#[get("/ranking")]
pub async fn ranking(
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, APIError> {
    let ranking = store::get_ranking(&pool).await?;
    Ok(HttpResponse::Ok().json(ranking))
}

#[tracing::instrument(skip(pool))]
#[post("/group_ranking")]
pub async fn group_ranking(
    filter: web::Json<payloads::requests::GroupRanking>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, APIError> {
    let entries =
        store::get_group_ranking(&pool, filter.campus.as_deref()).await?;
    Ok(HttpResponse::Ok().json(entries))
}
