use actix_web::{HttpResponse, get, post, web};
use payloads::TransactionId;
use payloads::requests::{
    InflightAction, QueueTransactionRequest, RefundTransactionRequest, UpdateInflightRequest,
    validate_reference,
};
use sqlx::PgPool;

use crate::orchestrator::Orchestrator;

use super::APIError;

#[tracing::instrument(skip(orchestrator, req), ret)]
#[post("/transactions")]
pub async fn queue_transaction(
    req: web::Json<QueueTransactionRequest>,
    orchestrator: web::Data<Orchestrator>,
) -> Result<HttpResponse, APIError> {
    let req = req.into_inner();
    if let Some(msg) = validate_reference(&req.reference).error_message() {
        return Err(APIError::BadRequest(anyhow::anyhow!(msg)));
    }

    let row = orchestrator
        .queue_transaction(payloads::general_ledger_id(), req)
        .await?;
    Ok(HttpResponse::Created().json(payloads::responses::TransactionResponse::from(row)))
}

#[tracing::instrument(skip(pool), ret)]
#[get("/transactions/{id}")]
pub async fn get_transaction(
    id: web::Path<TransactionId>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, APIError> {
    let row = crate::store::transaction::get_transaction(&id, &pool).await?;
    Ok(HttpResponse::Ok().json(payloads::responses::TransactionResponse::from(row)))
}

/// `POST /api/transactions/{id}/inflight` — body `{status: "commit" |
/// "void", amount?}`, settling or cancelling an INFLIGHT transaction.
#[tracing::instrument(skip(orchestrator, req), ret)]
#[post("/transactions/{id}/inflight")]
pub async fn commit_inflight(
    id: web::Path<TransactionId>,
    req: web::Json<UpdateInflightRequest>,
    orchestrator: web::Data<Orchestrator>,
) -> Result<HttpResponse, APIError> {
    let row = match req.status {
        InflightAction::Commit => {
            orchestrator
                .commit_inflight(id.into_inner(), req.amount.unwrap_or(0.0))
                .await?
        }
        InflightAction::Void => orchestrator.void_inflight(id.into_inner()).await?,
    };
    Ok(HttpResponse::Ok().json(payloads::responses::TransactionResponse::from(row)))
}

#[tracing::instrument(skip(orchestrator, req), ret)]
#[post("/transactions/{id}/refund")]
pub async fn refund_transaction(
    id: web::Path<TransactionId>,
    req: web::Json<RefundTransactionRequest>,
    orchestrator: web::Data<Orchestrator>,
) -> Result<HttpResponse, APIError> {
    let row = orchestrator
        .refund_transaction(id.into_inner(), req.into_inner().reference)
        .await?;
    Ok(HttpResponse::Created().json(payloads::responses::TransactionResponse::from(row)))
}
