use actix_identity::Identity;
use actix_web::{
    HttpResponse, ResponseError, body::BoxBody, http::StatusCode, post, web,
};
use payloads::responses::{
    self, AttackRejection, AttackRejectionCode, DistributionResult,
};
use payloads::{RaidId, requests};
use sqlx::PgPool;

use crate::attack::{self, AttackError};
use crate::routes::{APIError, get_admin, get_user_id};
use crate::solved_ac::SolveChecker;
use crate::store::{self, StoreError};
use crate::{AdminPolicy, time::TimeSource};

#[tracing::instrument(skip(user, pool, time_source, admins), ret)]
#[post("/create_raid")]
pub async fn create_raid(
    user: Identity,
    details: web::Json<requests::CreateRaid>,
    pool: web::Data<PgPool>,
    time_source: web::Data<TimeSource>,
    admins: web::Data<AdminPolicy>,
) -> Result<HttpResponse, APIError> {
    get_admin(&user, &admins, &pool).await?;
    let raid_id = store::create_raid(&details, &pool, &time_source).await?;
    Ok(HttpResponse::Ok().json(raid_id))
}

#[tracing::instrument(skip(pool), ret)]
#[post("/get_raid")]
pub async fn get_raid(
    raid_id: web::Json<RaidId>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, APIError> {
    let detail = store::get_raid_detail(&raid_id, &pool).await?;
    Ok(HttpResponse::Ok().json(detail))
}

#[tracing::instrument(skip(pool))]
#[post("/list_raids")]
pub async fn list_raids(
    filter: web::Json<requests::ListRaids>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, APIError> {
    let raids = store::list_raids(&filter, &pool).await?;
    Ok(HttpResponse::Ok().json(raids))
}

#[tracing::instrument(skip(user, pool, time_source, admins), ret)]
#[post("/update_raid")]
pub async fn update_raid(
    user: Identity,
    patch: web::Json<requests::UpdateRaid>,
    pool: web::Data<PgPool>,
    time_source: web::Data<TimeSource>,
    admins: web::Data<AdminPolicy>,
) -> Result<HttpResponse, APIError> {
    get_admin(&user, &admins, &pool).await?;
    let raid = store::update_raid(&patch, &pool, &time_source).await?;
    Ok(HttpResponse::Ok().json(responses::Raid::from(raid)))
}

#[tracing::instrument(skip(user, pool, admins), ret)]
#[post("/delete_raid")]
pub async fn delete_raid(
    user: Identity,
    raid_id: web::Json<RaidId>,
    pool: web::Data<PgPool>,
    admins: web::Data<AdminPolicy>,
) -> Result<HttpResponse, APIError> {
    get_admin(&user, &admins, &pool).await?;
    store::delete_raid(&raid_id, &pool).await?;
    Ok(HttpResponse::Ok().finish())
}

#[tracing::instrument(
    skip(user, pool, time_source, checker),
    fields(user_id=tracing::field::Empty),
    ret
)]
#[post("/attack_raid")]
pub async fn attack_raid(
    user: Option<Identity>,
    raid_id: web::Json<RaidId>,
    pool: web::Data<PgPool>,
    time_source: web::Data<TimeSource>,
    checker: web::Data<SolveChecker>,
) -> Result<HttpResponse, AttackError> {
    let user_id = user.as_ref().and_then(|user| get_user_id(user).ok());
    let attacker = match user_id {
        Some(user_id) => match store::read_user(&pool, &user_id).await {
            Ok(attacker) => Some(attacker),
            // stale session for a user that no longer exists
            Err(StoreError::UserNotFound) => None,
            Err(e) => return Err(AttackError::SettlementFailed(e)),
        },
        None => None,
    };
    let outcome = attack::attack(
        &raid_id,
        attacker.as_ref(),
        &pool,
        &time_source,
        &checker,
    )
    .await?;
    Ok(HttpResponse::Ok().json(outcome))
}

impl AttackError {
    fn code(&self) -> AttackRejectionCode {
        match self {
            Self::Unauthenticated => AttackRejectionCode::NotLoggedIn,
            Self::NotFound => AttackRejectionCode::RaidNotFound,
            Self::NotActive => AttackRejectionCode::RaidNotActive,
            Self::WindowClosed => AttackRejectionCode::RaidTimeInvalid,
            Self::AlreadySolved => AttackRejectionCode::AlreadySolved,
            Self::OnCooldown { .. } => AttackRejectionCode::Cooldown,
            Self::CheckerUnavailable(_) => {
                AttackRejectionCode::CheckerUnavailable
            }
            Self::SettlementFailed(_) => AttackRejectionCode::SettlementFailed,
        }
    }
}

impl ResponseError for AttackError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::NotActive | Self::WindowClosed => StatusCode::BAD_REQUEST,
            Self::AlreadySolved => StatusCode::CONFLICT,
            Self::OnCooldown { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::CheckerUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::SettlementFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse<BoxBody> {
        let remaining_seconds = match self {
            Self::OnCooldown { remaining_seconds } => Some(*remaining_seconds),
            _ => None,
        };
        HttpResponse::build(self.status_code()).json(AttackRejection {
            code: self.code(),
            message: self.to_string(),
            remaining_seconds,
        })
    }
}

#[tracing::instrument(skip(user, pool), ret)]
#[post("/get_participation")]
pub async fn get_participation(
    user: Identity,
    raid_id: web::Json<RaidId>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, APIError> {
    let user_id = get_user_id(&user)?;
    store::get_raid(&raid_id, &**pool).await?;
    let participation = store::get_participation(&raid_id, &user_id, &**pool)
        .await?
        .map(responses::Participation::from);
    Ok(HttpResponse::Ok().json(participation))
}

#[tracing::instrument(skip(pool))]
#[post("/list_participants")]
pub async fn list_participants(
    raid_id: web::Json<RaidId>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, APIError> {
    let participants = store::list_participants(&raid_id, &pool).await?;
    Ok(HttpResponse::Ok().json(participants))
}

/// Pay any outstanding bonus for a cleared raid. Safe to repeat.
#[tracing::instrument(skip(user, pool, time_source, admins), ret)]
#[post("/distribute_rewards")]
pub async fn distribute_rewards(
    user: Identity,
    raid_id: web::Json<RaidId>,
    pool: web::Data<PgPool>,
    time_source: web::Data<TimeSource>,
    admins: web::Data<AdminPolicy>,
) -> Result<HttpResponse, APIError> {
    get_admin(&user, &admins, &pool).await?;
    let awarded =
        store::distribute_rewards(&raid_id, &pool, &time_source).await?;
    Ok(HttpResponse::Ok().json(DistributionResult { awarded }))
}
