use payloads::{MonitorField, MonitorOperator, requests};
use test_helpers::spawn_app;

#[tokio::test]
async fn create_list_update_and_delete_monitor() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let ledger_id = app.create_ledger("treasury").await?;
    let balance_id = app.create_balance(ledger_id, "usd", 2).await?;

    let created = app
        .client
        .create_monitor(&requests::CreateMonitorRequest {
            balance_id,
            field: MonitorField::Balance,
            operator: MonitorOperator::LessThan,
            threshold: -10_000,
            description: Some("overdraft alert".to_string()),
            call_back_url: Some("https://example.com/hook".to_string()),
        })
        .await?;
    assert_eq!(created.threshold, -10_000);

    let listed = app.client.list_monitors(&balance_id).await?;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, created.id);

    let updated = app
        .client
        .update_monitor(
            &created.id,
            &requests::UpdateMonitorRequest {
                operator: Some(MonitorOperator::LessOrEqual),
                threshold: Some(-20_000),
                description: None,
                call_back_url: None,
            },
        )
        .await?;
    assert_eq!(updated.operator, MonitorOperator::LessOrEqual);
    assert_eq!(updated.threshold, -20_000);

    app.client.delete_monitor(&created.id).await?;
    let result = app.client.get_monitor(&created.id).await;
    test_helpers::assert_status_code(result, reqwest::StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn monitor_operator_evaluates_against_threshold() {
    assert!(MonitorOperator::GreaterThan.evaluate(5, 3));
    assert!(!MonitorOperator::GreaterThan.evaluate(3, 3));
    assert!(MonitorOperator::LessOrEqual.evaluate(3, 3));
    assert!(MonitorOperator::NotEqual.evaluate(1, 2));
}
