pub mod balances;
pub mod ledgers;
pub mod monitors;
pub mod transactions;

use actix_web::{
    HttpResponse, Responder, ResponseError, body::BoxBody,
    dev::HttpServiceFactory, get, web,
};

use crate::orchestrator::LedgerError;
use crate::store::StoreError;

pub fn api_services() -> impl HttpServiceFactory {
    web::scope("/api")
        .service(health_check)
        .service(ledgers::create_ledger)
        .service(ledgers::get_ledger)
        .service(balances::create_balance)
        .service(balances::get_balance)
        .service(transactions::queue_transaction)
        .service(transactions::get_transaction)
        .service(transactions::commit_inflight)
        .service(transactions::refund_transaction)
        .service(monitors::create_monitor)
        .service(monitors::get_monitor)
        .service(monitors::list_monitors)
        .service(monitors::update_monitor)
        .service(monitors::delete_monitor)
}

#[get("/health_check")]
pub async fn health_check() -> impl Responder {
    HttpResponse::Ok().body("healthy")
}

#[derive(Debug, thiserror::Error)]
pub enum APIError {
    #[error("Bad request")]
    BadRequest(#[source] anyhow::Error),
    #[error("Not found")]
    NotFound(#[source] anyhow::Error),
    #[error("Conflict")]
    Conflict(#[source] anyhow::Error),
    #[error("Something went wrong")]
    UnexpectedError(#[from] anyhow::Error),
}

impl ResponseError for APIError {
    fn error_response(&self) -> HttpResponse<BoxBody> {
        match self {
            Self::BadRequest(e) => {
                HttpResponse::BadRequest().body(format!("{self}: {e}"))
            }
            Self::NotFound(e) => {
                HttpResponse::NotFound().body(format!("{self}: {e}"))
            }
            Self::Conflict(e) => {
                HttpResponse::Conflict().body(format!("{self}: {e}"))
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
            StoreError::LedgerNotFound
            | StoreError::BalanceNotFound
            | StoreError::TransactionNotFound
            | StoreError::MonitorNotFound => APIError::NotFound(e.into()),
            StoreError::DuplicateReference { .. } => APIError::Conflict(e.into()),
            StoreError::VersionConflict { .. } => APIError::Conflict(e.into()),
            StoreError::Database(_) => APIError::UnexpectedError(e.into()),
        }
    }
}

impl From<LedgerError> for APIError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::LedgerNotFound
            | LedgerError::BalanceNotFound
            | LedgerError::TransactionNotFound
            | LedgerError::MonitorNotFound => APIError::NotFound(e.into()),
            LedgerError::DuplicateReference { .. }
            | LedgerError::AlreadyCommitted { .. }
            | LedgerError::AlreadyVoided { .. } => APIError::Conflict(e.into()),
            LedgerError::InvalidState { .. } | LedgerError::InvalidAmount { .. } => {
                APIError::BadRequest(e.into())
            }
            LedgerError::InsufficientFunds | LedgerError::CurrencyMismatch => {
                APIError::BadRequest(e.into())
            }
            LedgerError::Lock(crate::lock::LockError::Contended { .. }) => {
                APIError::Conflict(e.into())
            }
            LedgerError::Lock(_) | LedgerError::Queue(_) => {
                APIError::UnexpectedError(e.into())
            }
            LedgerError::Store(store_err) => store_err.into(),
        }
    }
}
