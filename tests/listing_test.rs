mod common;

use anyhow::Result;
use common::{ACTOR, StandardContracts, deposit, insurance_payment, rp, test_service};
use titipan::application::{AppError, DepositRequest, EntryFilter, LedgerService};
use titipan::domain::{FundCategory, FundStatus};

fn filter() -> EntryFilter {
    EntryFilter {
        page: 1,
        per_page: 20,
        ..Default::default()
    }
}

async fn seed(service: &LedgerService) -> Result<()> {
    StandardContracts::create_basic(service).await?;

    let insurance = deposit(service, "KR-001", FundCategory::Insurance, rp(1_000_000)).await?;
    service
        .settle_entry(insurance.id, &insurance_payment(rp(300_000), "BKT-77"), ACTOR)
        .await?;
    deposit(service, "KR-001", FundCategory::Notary, rp(1_500_000)).await?;
    deposit(service, "KR-002", FundCategory::Notary, rp(900_000)).await?;
    service
        .create_entry(
            DepositRequest::new("KR-002", FundCategory::Installment, rp(4_500_000))
                .with_note("100% hold_back"),
            ACTOR,
        )
        .await?;
    Ok(())
}

#[tokio::test]
async fn test_list_newest_first() -> Result<()> {
    let (service, _temp) = test_service().await?;
    seed(&service).await?;

    let page = service.list_entries(&filter()).await?;
    assert_eq!(page.total, 4);
    let sequences: Vec<_> = page.items.iter().map(|e| e.sequence).collect();
    assert_eq!(sequences, vec![4, 3, 2, 1]);
    Ok(())
}

#[tokio::test]
async fn test_list_filters() -> Result<()> {
    let (service, _temp) = test_service().await?;
    seed(&service).await?;

    let by_contract = service
        .list_entries(&EntryFilter {
            contract: Some("KR-002".into()),
            ..filter()
        })
        .await?;
    assert_eq!(by_contract.total, 2);

    let notary = service
        .list_entries(&EntryFilter {
            category: Some(FundCategory::Notary),
            ..filter()
        })
        .await?;
    assert_eq!(notary.total, 2);
    assert!(notary.items.iter().all(|e| e.category == FundCategory::Notary));

    let partial = service
        .list_entries(&EntryFilter {
            status: Some(FundStatus::PartiallySettled),
            ..filter()
        })
        .await?;
    assert_eq!(partial.total, 1);
    assert_eq!(partial.items[0].paid_amount, rp(300_000));

    let combined = service
        .list_entries(&EntryFilter {
            contract: Some("KR-001".into()),
            category: Some(FundCategory::Notary),
            status: Some(FundStatus::Unpaid),
            ..filter()
        })
        .await?;
    assert_eq!(combined.total, 1);

    let unknown = service
        .list_entries(&EntryFilter {
            contract: Some("KR-404".into()),
            ..filter()
        })
        .await;
    assert!(matches!(unknown, Err(AppError::ContractNotFound(_))));
    Ok(())
}

#[tokio::test]
async fn test_list_search() -> Result<()> {
    let (service, _temp) = test_service().await?;
    seed(&service).await?;

    let search = |text: &str| EntryFilter {
        search: Some(text.to_string()),
        ..filter()
    };

    // Debtor name
    assert_eq!(service.list_entries(&search("aminah")).await?.total, 2);
    // Proof-of-payment number
    let by_proof = service.list_entries(&search("BKT-77")).await?;
    assert_eq!(by_proof.total, 1);
    assert_eq!(by_proof.items[0].category, FundCategory::Insurance);
    // Creator
    assert_eq!(service.list_entries(&search(ACTOR)).await?.total, 4);
    // Wildcards are matched literally
    assert_eq!(service.list_entries(&search("100%")).await?.total, 1);
    assert_eq!(service.list_entries(&search("_")).await?.total, 1);
    assert_eq!(service.list_entries(&search("nothing-like-this")).await?.total, 0);
    // Blank search is ignored
    assert_eq!(service.list_entries(&search("   ")).await?.total, 4);
    Ok(())
}

#[tokio::test]
async fn test_list_pagination() -> Result<()> {
    let (service, _temp) = test_service().await?;
    seed(&service).await?;

    let first = service
        .list_entries(&EntryFilter {
            per_page: 3,
            ..filter()
        })
        .await?;
    assert_eq!(first.items.len(), 3);
    assert_eq!(first.total_pages(), 2);
    assert!(first.has_next());

    let second = service
        .list_entries(&EntryFilter {
            page: 2,
            per_page: 3,
            ..filter()
        })
        .await?;
    assert_eq!(second.items.len(), 1);
    assert_eq!(second.items[0].sequence, 1);
    assert!(!second.has_next());

    let zero = service
        .list_entries(&EntryFilter {
            page: 0,
            per_page: 3,
            ..filter()
        })
        .await?;
    assert_eq!(zero.page, 1);

    let beyond = service
        .list_entries(&EntryFilter {
            page: 9,
            ..filter()
        })
        .await?;
    assert!(beyond.items.is_empty());
    assert_eq!(beyond.total, 4);

    let invalid = service
        .list_entries(&EntryFilter {
            per_page: 0,
            ..filter()
        })
        .await;
    assert!(matches!(invalid, Err(AppError::InvalidInput(_))));
    Ok(())
}
