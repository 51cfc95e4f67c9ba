use test_helpers::spawn_app;

#[tokio::test]
async fn create_and_fetch_ledger() -> anyhow::Result<()> {
    let app = spawn_app().await;

    let created = app
        .client
        .create_ledger(&payloads::requests::CreateLedgerRequest {
            name: "treasury".to_string(),
        })
        .await?;
    assert_eq!(created.name, "treasury");

    let fetched = app.client.get_ledger(&created.id).await?;
    assert_eq!(fetched.id, created.id);
    assert_eq!(fetched.name, "treasury");

    Ok(())
}

#[tokio::test]
async fn create_ledger_returns_201() -> anyhow::Result<()> {
    let app = spawn_app().await;

    let url = format!("{}/api/ledgers", app.client.address);
    let response = reqwest::Client::new()
        .post(&url)
        .json(&payloads::requests::CreateLedgerRequest {
            name: "treasury".to_string(),
        })
        .send()
        .await?;

    assert_eq!(response.status(), reqwest::StatusCode::CREATED);
    Ok(())
}

#[tokio::test]
async fn create_balance_starts_at_zero() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let ledger_id = app.create_ledger("treasury").await?;

    let balance = app
        .client
        .create_balance(&payloads::requests::CreateBalanceRequest {
            ledger_id,
            indicator: None,
            currency: "usd".to_string(),
            precision: 2,
        })
        .await?;

    assert_eq!(balance.balance, 0);
    assert_eq!(balance.credit_balance, 0);
    assert_eq!(balance.debit_balance, 0);
    assert_eq!(balance.inflight_balance, 0);
    assert_eq!(balance.version, 1);

    Ok(())
}

#[tokio::test]
async fn create_balance_returns_201() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let ledger_id = app.create_ledger("treasury").await?;

    let url = format!("{}/api/balances", app.client.address);
    let response = reqwest::Client::new()
        .post(&url)
        .json(&payloads::requests::CreateBalanceRequest {
            ledger_id,
            indicator: None,
            currency: "usd".to_string(),
            precision: 2,
        })
        .send()
        .await?;

    assert_eq!(response.status(), reqwest::StatusCode::CREATED);
    Ok(())
}

#[tokio::test]
async fn get_unknown_balance_returns_not_found() -> anyhow::Result<()> {
    let app = spawn_app().await;

    let result = app.client.get_balance(&payloads::BalanceId::new()).await;

    test_helpers::assert_status_code(result, reqwest::StatusCode::NOT_FOUND);
    Ok(())
}
