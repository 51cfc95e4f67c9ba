use actix_web::{HttpResponse, get, post, web};
use payloads::LedgerId;
use payloads::requests::CreateLedgerRequest;
use sqlx::PgPool;

use crate::store;
use crate::time::TimeSource;

use super::APIError;

#[tracing::instrument(skip(pool, time_source), ret)]
#[post("/ledgers")]
pub async fn create_ledger(
    req: web::Json<CreateLedgerRequest>,
    time_source: web::Data<TimeSource>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, APIError> {
    let row = store::ledger::create_ledger(&req.name, &time_source, &pool).await?;
    Ok(HttpResponse::Created().json(payloads::responses::LedgerResponse::from(row)))
}

#[tracing::instrument(skip(pool), ret)]
#[get("/ledgers/{id}")]
pub async fn get_ledger(
    id: web::Path<LedgerId>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, APIError> {
    let row = store::ledger::get_ledger(&id, &pool).await?;
    Ok(HttpResponse::Ok().json(payloads::responses::LedgerResponse::from(row)))
}
