mod common;

use anyhow::Result;
use common::{ACTOR, StandardContracts, deposit, insurance_payment, rp, test_service};
use titipan::application::{AppError, DepositRequest, EntryFilter};
use titipan::domain::{EntryEventKind, FundCategory, FundError};

#[tokio::test]
async fn test_event_log_keeps_every_settlement_reference() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardContracts::create_basic(&service).await?;
    let entry = service
        .create_entry(
            DepositRequest::new("KR-001", FundCategory::Insurance, rp(1_000_000))
                .with_note("premium"),
            ACTOR,
        )
        .await?;

    service
        .settle_entry(entry.id, &insurance_payment(rp(600_000), "BKT-1"), ACTOR)
        .await?;
    service
        .settle_entry(entry.id, &insurance_payment(rp(400_000), "BKT-2"), "finance-2")
        .await?;

    // The entry keeps only the latest proof of payment
    let stored = service.get_entry(entry.id).await?;
    assert_eq!(stored.references.proof_of_payment(), Some("BKT-2"));

    let events = service.get_entry_events(entry.id).await?;
    assert_eq!(events.len(), 3);

    assert_eq!(events[0].kind, EntryEventKind::Deposited);
    assert_eq!(events[0].amount, Some(rp(1_000_000)));
    assert_eq!(events[0].reason.as_deref(), Some("premium"));

    assert_eq!(events[1].kind, EntryEventKind::Settled);
    assert_eq!(events[1].amount, Some(rp(600_000)));
    assert_eq!(events[1].references.proof_of_payment.as_deref(), Some("BKT-1"));
    assert_eq!(events[1].actor, ACTOR);

    assert_eq!(events[2].amount, Some(rp(400_000)));
    assert_eq!(events[2].references.proof_of_payment.as_deref(), Some("BKT-2"));
    assert_eq!(events[2].actor, "finance-2");

    assert!(events.windows(2).all(|w| w[0].sequence < w[1].sequence));
    Ok(())
}

#[tokio::test]
async fn test_failed_operation_records_no_event() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardContracts::create_basic(&service).await?;
    let entry = deposit(&service, "KR-001", FundCategory::Insurance, rp(500_000)).await?;

    let result = service
        .settle_entry(entry.id, &insurance_payment(rp(600_000), "BKT-1"), ACTOR)
        .await;
    assert!(result.is_err());

    assert_eq!(service.get_entry_events(entry.id).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_delete_hides_entry_but_keeps_events() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardContracts::create_basic(&service).await?;
    let kept = deposit(&service, "KR-001", FundCategory::Notary, rp(1_500_000)).await?;
    let mistake = deposit(&service, "KR-001", FundCategory::Insurance, rp(9_000_000)).await?;

    let deleted = service
        .delete_entry(mistake.id, "typed into the wrong contract", ACTOR)
        .await?;
    assert_eq!(deleted.id, mistake.id);

    assert!(matches!(
        service.get_entry(mistake.id).await,
        Err(AppError::EntryNotFound(_))
    ));
    assert_eq!(service.get_balance("KR-001").await?, rp(1_500_000));

    let history = service.get_history("KR-001").await?.entries;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, kept.id);

    let listed = service
        .list_entries(&EntryFilter {
            page: 1,
            per_page: 20,
            ..Default::default()
        })
        .await?;
    assert_eq!(listed.total, 1);

    let events = service.get_entry_events(mistake.id).await?;
    let last = events.last().unwrap();
    assert_eq!(last.kind, EntryEventKind::Deleted);
    assert_eq!(last.reason.as_deref(), Some("typed into the wrong contract"));

    // Deleted entries cannot be changed or deleted again
    let settle = service
        .settle_entry(mistake.id, &insurance_payment(rp(1), "BKT"), ACTOR)
        .await;
    assert!(matches!(settle, Err(AppError::EntryNotFound(_))));
    let again = service.delete_entry(mistake.id, "again", ACTOR).await;
    assert!(matches!(again, Err(AppError::EntryNotFound(_))));

    assert!(service.check_integrity().await?.is_healthy());
    Ok(())
}

#[tokio::test]
async fn test_delete_requires_reason() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardContracts::create_basic(&service).await?;
    let entry = deposit(&service, "KR-001", FundCategory::Notary, rp(1_500_000)).await?;

    let result = service.delete_entry(entry.id, " ", ACTOR).await;
    assert!(matches!(
        result,
        Err(AppError::Fund(FundError::MissingReference("deletion reason")))
    ));
    assert!(service.get_entry(entry.id).await.is_ok());
    Ok(())
}
