use actix_web::{HttpResponse, delete, get, post, put, web};
use payloads::MonitorId;
use payloads::requests::{CreateMonitorRequest, UpdateMonitorRequest};
use sqlx::PgPool;

use crate::store;
use crate::time::TimeSource;

use super::APIError;

#[tracing::instrument(skip(pool, time_source), ret)]
#[post("/balance-monitors")]
pub async fn create_monitor(
    req: web::Json<CreateMonitorRequest>,
    time_source: web::Data<TimeSource>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, APIError> {
    let row = store::monitor::create_monitor(
        &req.balance_id,
        req.field,
        req.operator,
        req.threshold,
        req.description.as_deref(),
        req.call_back_url.as_deref(),
        &time_source,
        &pool,
    )
    .await?;
    Ok(HttpResponse::Created().json(payloads::responses::MonitorResponse::from(row)))
}

#[tracing::instrument(skip(pool), ret)]
#[get("/balance-monitors/{id}")]
pub async fn get_monitor(
    id: web::Path<MonitorId>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, APIError> {
    let row = store::monitor::get_monitor(&id, &pool).await?;
    Ok(HttpResponse::Ok().json(payloads::responses::MonitorResponse::from(row)))
}

#[tracing::instrument(skip(pool), ret)]
#[get("/balances/{id}/monitors")]
pub async fn list_monitors(
    id: web::Path<payloads::BalanceId>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, APIError> {
    let rows = store::monitor::list_monitors_for_balance(&id, &pool).await?;
    let responses: Vec<_> = rows
        .into_iter()
        .map(payloads::responses::MonitorResponse::from)
        .collect();
    Ok(HttpResponse::Ok().json(responses))
}

#[tracing::instrument(skip(pool), ret)]
#[put("/balance-monitors/{id}")]
pub async fn update_monitor(
    id: web::Path<MonitorId>,
    req: web::Json<UpdateMonitorRequest>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, APIError> {
    let req = req.into_inner();
    let row = store::monitor::update_monitor(
        &id,
        req.operator,
        req.threshold,
        Some(req.description.as_deref()),
        req.call_back_url.as_deref(),
        &pool,
    )
    .await?;
    Ok(HttpResponse::Ok().json(payloads::responses::MonitorResponse::from(row)))
}

#[tracing::instrument(skip(pool), ret)]
#[delete("/balance-monitors/{id}")]
pub async fn delete_monitor(
    id: web::Path<MonitorId>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, APIError> {
    store::monitor::delete_monitor(&id, &pool).await?;
    Ok(HttpResponse::Ok().json(payloads::responses::SuccessMessage {
        message: "deleted".to_string(),
    }))
}
