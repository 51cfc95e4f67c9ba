use payloads::{TransactionStatus, requests};
use test_helpers::spawn_app;

#[tokio::test]
async fn simple_transfer_settles_both_balances() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let ledger_id = app.create_ledger("treasury").await?;
    let source = app.create_balance(ledger_id, "usd", 2).await?;
    let destination = app.create_balance(ledger_id, "usd", 2).await?;

    let txn = app
        .queue_transfer("simple-transfer", source, destination, 25.0, 2, "usd", true)
        .await?;
    let settled = app.wait_for_terminal(txn).await?;

    assert_eq!(settled.status, TransactionStatus::Applied);
    assert_eq!(settled.precise_amount, 2500);

    let src_row = app.client.get_balance(&source).await?;
    let dst_row = app.client.get_balance(&destination).await?;
    assert_eq!(src_row.balance, -2500);
    assert_eq!(dst_row.balance, 2500);

    Ok(())
}

#[tokio::test]
async fn overdraft_without_allowance_is_rejected() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let ledger_id = app.create_ledger("treasury").await?;
    let source = app.create_balance(ledger_id, "usd", 2).await?;
    let destination = app.create_balance(ledger_id, "usd", 2).await?;

    let txn = app
        .queue_transfer("overdraft-blocked", source, destination, 10.0, 2, "usd", false)
        .await?;
    let settled = app.wait_for_terminal(txn).await?;

    assert_eq!(settled.status, TransactionStatus::Rejected);

    let src_row = app.client.get_balance(&source).await?;
    assert_eq!(src_row.balance, 0, "a rejected transaction must not move money");

    Ok(())
}

#[tokio::test]
async fn rate_conversion_applies_to_destination_credit() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let ledger_id = app.create_ledger("treasury").await?;
    let source = app.create_balance(ledger_id, "usd", 2).await?;
    let destination = app.create_balance(ledger_id, "eur", 2).await?;

    let req = requests::QueueTransactionRequest {
        reference: "rate-conversion".to_string(),
        source: payloads::BalanceRef::Id(source),
        destination: payloads::BalanceRef::Id(destination),
        amount: 100.0,
        precision: 2,
        currency: "usd".to_string(),
        rate: 0.9,
        description: None,
        inflight: false,
        scheduled_for: None,
        distributions: vec![],
        allow_overdraft: true,
    };
    let queued = app.client.queue_transaction(&req).await?;
    let settled = app.wait_for_terminal(queued.id).await?;

    assert_eq!(settled.status, TransactionStatus::Applied);

    let src_row = app.client.get_balance(&source).await?;
    let dst_row = app.client.get_balance(&destination).await?;
    assert_eq!(src_row.balance, -10000);
    assert_eq!(dst_row.balance, 9000);

    Ok(())
}

#[tokio::test]
async fn inflight_transaction_can_be_partially_committed() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let ledger_id = app.create_ledger("treasury").await?;
    let source = app.create_balance(ledger_id, "usd", 2).await?;
    let destination = app.create_balance(ledger_id, "usd", 2).await?;

    let req = requests::QueueTransactionRequest {
        reference: "inflight-partial".to_string(),
        source: payloads::BalanceRef::Id(source),
        destination: payloads::BalanceRef::Id(destination),
        amount: 50.0,
        precision: 2,
        currency: "usd".to_string(),
        rate: 1.0,
        description: None,
        inflight: true,
        scheduled_for: None,
        distributions: vec![],
        allow_overdraft: true,
    };
    let parent = app.client.queue_transaction(&req).await?;
    let parent = app.wait_for_terminal(parent.id).await?;
    assert_eq!(parent.status, TransactionStatus::Inflight);

    let src_row = app.client.get_balance(&source).await?;
    assert_eq!(src_row.inflight_debit_balance, 5000);
    assert_eq!(src_row.balance, 0, "inflight never touches cleared balance");

    let child = app
        .client
        .settle_inflight(
            &parent.id,
            &requests::UpdateInflightRequest {
                status: requests::InflightAction::Commit,
                amount: Some(30.0),
            },
        )
        .await?;
    assert_eq!(child.precise_amount, 3000);

    let src_row = app.client.get_balance(&source).await?;
    let dst_row = app.client.get_balance(&destination).await?;
    assert_eq!(src_row.balance, -3000);
    assert_eq!(dst_row.balance, 3000);
    assert_eq!(src_row.inflight_debit_balance, 2000);

    let reread_parent = app.client.get_transaction(&parent.id).await?;
    assert_eq!(
        reread_parent.status,
        TransactionStatus::Inflight,
        "the parent row stays INFLIGHT forever; children carry the settlement"
    );

    Ok(())
}

#[tokio::test]
async fn inflight_transaction_can_be_voided() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let ledger_id = app.create_ledger("treasury").await?;
    let source = app.create_balance(ledger_id, "usd", 2).await?;
    let destination = app.create_balance(ledger_id, "usd", 2).await?;

    let req = requests::QueueTransactionRequest {
        reference: "inflight-void".to_string(),
        source: payloads::BalanceRef::Id(source),
        destination: payloads::BalanceRef::Id(destination),
        amount: 40.0,
        precision: 2,
        currency: "usd".to_string(),
        rate: 1.0,
        description: None,
        inflight: true,
        scheduled_for: None,
        distributions: vec![],
        allow_overdraft: true,
    };
    let parent = app.client.queue_transaction(&req).await?;
    let parent = app.wait_for_terminal(parent.id).await?;

    app.client
        .settle_inflight(
            &parent.id,
            &requests::UpdateInflightRequest {
                status: requests::InflightAction::Void,
                amount: None,
            },
        )
        .await?;

    let src_row = app.client.get_balance(&source).await?;
    let dst_row = app.client.get_balance(&destination).await?;
    assert_eq!(src_row.inflight_debit_balance, 0);
    assert_eq!(dst_row.inflight_credit_balance, 0);
    assert_eq!(src_row.balance, 0, "a void never moves cleared balance");
    assert_eq!(dst_row.balance, 0);

    Ok(())
}

#[tokio::test]
async fn duplicate_reference_is_rejected_synchronously() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let ledger_id = app.create_ledger("treasury").await?;
    let source = app.create_balance(ledger_id, "usd", 2).await?;
    let destination = app.create_balance(ledger_id, "usd", 2).await?;

    app.queue_transfer("duplicate-ref", source, destination, 5.0, 2, "usd", true)
        .await?;

    let req = requests::QueueTransactionRequest {
        reference: "duplicate-ref".to_string(),
        source: payloads::BalanceRef::Id(source),
        destination: payloads::BalanceRef::Id(destination),
        amount: 5.0,
        precision: 2,
        currency: "usd".to_string(),
        rate: 1.0,
        description: None,
        inflight: false,
        scheduled_for: None,
        distributions: vec![],
        allow_overdraft: true,
    };
    let result = app.client.queue_transaction(&req).await;

    test_helpers::assert_status_code(result, reqwest::StatusCode::CONFLICT);
    Ok(())
}

#[tokio::test]
async fn refund_reverses_source_and_destination() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let ledger_id = app.create_ledger("treasury").await?;
    let source = app.create_balance(ledger_id, "usd", 2).await?;
    let destination = app.create_balance(ledger_id, "eur", 2).await?;

    let req = requests::QueueTransactionRequest {
        reference: "refund-original".to_string(),
        source: payloads::BalanceRef::Id(source),
        destination: payloads::BalanceRef::Id(destination),
        amount: 15.0,
        precision: 2,
        currency: "usd".to_string(),
        rate: 0.9,
        description: None,
        inflight: false,
        scheduled_for: None,
        distributions: vec![],
        allow_overdraft: true,
    };
    let queued = app.client.queue_transaction(&req).await?;
    let original = app.wait_for_terminal(queued.id).await?;

    let refund = app
        .client
        .refund_transaction(
            &original.id,
            &requests::RefundTransactionRequest { reference: None },
        )
        .await?;
    app.wait_for_terminal(refund.id).await?;

    assert_eq!(
        refund.parent_transaction,
        Some(original.id),
        "a refund must link back to the transaction it reverses"
    );
    assert_eq!(
        refund.rate, original.rate,
        "a refund must carry the original rate, not its inverse"
    );

    let src_row = app.client.get_balance(&source).await?;
    let dst_row = app.client.get_balance(&destination).await?;
    assert_eq!(src_row.balance, 0, "refund nets the source back to zero");
    assert_eq!(dst_row.balance, 0, "refund nets the destination back to zero");

    Ok(())
}
