use actix_web::{HttpResponse, get, post, web};
use payloads::BalanceId;
use payloads::requests::CreateBalanceRequest;
use sqlx::PgPool;

use crate::store;
use crate::time::TimeSource;

use super::APIError;

#[tracing::instrument(skip(pool, time_source), ret)]
#[post("/balances")]
pub async fn create_balance(
    req: web::Json<CreateBalanceRequest>,
    time_source: web::Data<TimeSource>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, APIError> {
    let row = store::balance::create_balance(
        &req.ledger_id,
        req.indicator.as_deref(),
        &req.currency,
        req.precision,
        &time_source,
        &pool,
    )
    .await?;
    Ok(HttpResponse::Created().json(payloads::responses::BalanceResponse::from(row)))
}

#[tracing::instrument(skip(pool), ret)]
#[get("/balances/{id}")]
pub async fn get_balance(
    id: web::Path<BalanceId>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, APIError> {
    let row = store::balance::get_balance(&id, &pool).await?;
    Ok(HttpResponse::Ok().json(payloads::responses::BalanceResponse::from(row)))
}
