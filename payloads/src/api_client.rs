use crate::{BalanceId, LedgerId, MonitorId, TransactionId, requests, responses};
use reqwest::StatusCode;
use serde::Serialize;

type ReqwestResult = Result<reqwest::Response, reqwest::Error>;

/// An HTTP client for the ledger API, used by integration tests and
/// anything else that would rather speak JSON over the wire than link
/// against the orchestrator directly.
pub struct APIClient {
    pub address: String,
    pub inner_client: reqwest::Client,
}

impl APIClient {
    fn format_url(&self, path: &str) -> String {
        format!("{}/api/{path}", &self.address)
    }

    async fn post(&self, path: &str, body: &impl Serialize) -> ReqwestResult {
        self.inner_client.post(self.format_url(path)).json(body).send().await
    }

    async fn get(&self, path: &str) -> ReqwestResult {
        self.inner_client.get(self.format_url(path)).send().await
    }

    async fn put(&self, path: &str, body: &impl Serialize) -> ReqwestResult {
        self.inner_client.put(self.format_url(path)).json(body).send().await
    }

    async fn delete(&self, path: &str) -> ReqwestResult {
        self.inner_client.delete(self.format_url(path)).send().await
    }
}

impl APIClient {
    pub async fn health_check(&self) -> Result<(), ClientError> {
        let response = self.get("health_check").await?;
        ok_empty(response).await
    }

    pub async fn create_ledger(
        &self,
        req: &requests::CreateLedgerRequest,
    ) -> Result<responses::LedgerResponse, ClientError> {
        let response = self.post("ledgers", req).await?;
        ok_body(response).await
    }

    pub async fn get_ledger(
        &self,
        id: &LedgerId,
    ) -> Result<responses::LedgerResponse, ClientError> {
        let response = self.get(&format!("ledgers/{id}")).await?;
        ok_body(response).await
    }

    pub async fn create_balance(
        &self,
        req: &requests::CreateBalanceRequest,
    ) -> Result<responses::BalanceResponse, ClientError> {
        let response = self.post("balances", req).await?;
        ok_body(response).await
    }

    pub async fn get_balance(
        &self,
        id: &BalanceId,
    ) -> Result<responses::BalanceResponse, ClientError> {
        let response = self.get(&format!("balances/{id}")).await?;
        ok_body(response).await
    }

    pub async fn queue_transaction(
        &self,
        req: &requests::QueueTransactionRequest,
    ) -> Result<responses::TransactionResponse, ClientError> {
        let response = self.post("transactions", req).await?;
        ok_body(response).await
    }

    pub async fn get_transaction(
        &self,
        id: &TransactionId,
    ) -> Result<responses::TransactionResponse, ClientError> {
        let response = self.get(&format!("transactions/{id}")).await?;
        ok_body(response).await
    }

    pub async fn settle_inflight(
        &self,
        id: &TransactionId,
        req: &requests::UpdateInflightRequest,
    ) -> Result<responses::TransactionResponse, ClientError> {
        let response = self.post(&format!("transactions/{id}/inflight"), req).await?;
        ok_body(response).await
    }

    pub async fn refund_transaction(
        &self,
        id: &TransactionId,
        req: &requests::RefundTransactionRequest,
    ) -> Result<responses::TransactionResponse, ClientError> {
        let response = self.post(&format!("transactions/{id}/refund"), req).await?;
        ok_body(response).await
    }

    pub async fn create_monitor(
        &self,
        req: &requests::CreateMonitorRequest,
    ) -> Result<responses::MonitorResponse, ClientError> {
        let response = self.post("balance-monitors", req).await?;
        ok_body(response).await
    }

    pub async fn get_monitor(
        &self,
        id: &MonitorId,
    ) -> Result<responses::MonitorResponse, ClientError> {
        let response = self.get(&format!("balance-monitors/{id}")).await?;
        ok_body(response).await
    }

    pub async fn list_monitors(
        &self,
        balance_id: &BalanceId,
    ) -> Result<Vec<responses::MonitorResponse>, ClientError> {
        let response = self.get(&format!("balances/{balance_id}/monitors")).await?;
        ok_body(response).await
    }

    pub async fn update_monitor(
        &self,
        id: &MonitorId,
        req: &requests::UpdateMonitorRequest,
    ) -> Result<responses::MonitorResponse, ClientError> {
        let response = self.put(&format!("balance-monitors/{id}"), req).await?;
        ok_body(response).await
    }

    pub async fn delete_monitor(
        &self,
        id: &MonitorId,
    ) -> Result<responses::SuccessMessage, ClientError> {
        let response = self.delete(&format!("balance-monitors/{id}")).await?;
        ok_body(response).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("{1}")]
    APIError(StatusCode, String),
    #[error("Network error. Please check your connection.")]
    Network(#[from] reqwest::Error),
}

async fn ok_body<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ClientError> {
    if !response.status().is_success() {
        return Err(ClientError::APIError(
            response.status(),
            response.text().await?,
        ));
    }
    Ok(response.json::<T>().await?)
}

async fn ok_empty(response: reqwest::Response) -> Result<(), ClientError> {
    if !response.status().is_success() {
        return Err(ClientError::APIError(
            response.status(),
            response.text().await?,
        ));
    }
    Ok(())
}
