/// Query cache tests
///
/// De-duplication, staleness, invalidation, retries and garbage collection,
/// driven through the read hooks against a scripted transport.
/// Run with: cargo test --test query_cache_tests
mod common;

use common::*;
use finsync::cache::{CacheKey, EntryStatus, KeyFilter, NotReady, RetryPolicy};
use finsync::core::ApiError;
use finsync::FinanceClient;
use futures::future::join_all;
use serde_json::json;
use std::time::Duration;

const ACCOUNTS: &str = "GET /account";

#[tokio::test]
async fn test_concurrent_reads_share_one_request() {
    let mock = MockTransport::new();
    let gate = mock.gate(ACCOUNTS);
    let client = client(&mock);
    let queries = client.queries();

    let (results, _) = tokio::join!(
        join_all((0..5).map(|_| queries.accounts())),
        async {
            mock.wait_for_calls(ACCOUNTS, 1).await;
            assert!(queries.peek_accounts().unwrap_err().is_pending());
            gate.ok(json!([account(1, "HDFC")]));
        }
    );

    assert_eq!(mock.calls(ACCOUNTS), 1);
    let first = results[0].as_ref().unwrap();
    assert_eq!(first.len(), 1);
    for result in &results {
        assert_eq!(result.as_ref().unwrap(), first);
    }
}

#[tokio::test]
async fn test_concurrent_reads_share_one_error() {
    let mock = MockTransport::new();
    let gate = mock.gate(ACCOUNTS);
    let client = client(&mock);
    let queries = client.queries();

    let (results, _) = tokio::join!(
        join_all((0..3).map(|_| queries.accounts())),
        async {
            mock.wait_for_calls(ACCOUNTS, 1).await;
            gate.fail(503, "maintenance");
        }
    );

    assert_eq!(mock.calls(ACCOUNTS), 1);
    for result in results {
        let err = result.unwrap_err();
        assert_eq!(err.status(), Some(503));
        assert!(matches!(err, ApiError::Server { .. }));
    }

    let info = client.cache().info(&CacheKey::accounts()).unwrap();
    assert_eq!(info.status, EntryStatus::Error);
    assert!(matches!(
        queries.peek_accounts(),
        Err(NotReady::Failed(ApiError::Server { .. }))
    ));
}

#[tokio::test]
async fn test_fresh_entry_is_served_from_cache() {
    let mock = MockTransport::new();
    mock.ok(ACCOUNTS, json!([account(1, "HDFC")]));
    let client = client(&mock);

    client.queries().accounts().await.unwrap();
    client.queries().accounts().await.unwrap();

    assert_eq!(mock.calls(ACCOUNTS), 1);
    assert_eq!(client.queries().peek_accounts().unwrap().len(), 1);
}

#[tokio::test]
async fn test_zero_stale_time_always_refetches() {
    let mock = MockTransport::new();
    mock.ok(ACCOUNTS, json!([account(1, "HDFC")]));
    let client =
        FinanceClient::with_transport(test_config().stale_time(Duration::ZERO), mock.clone())
            .unwrap();

    client.queries().accounts().await.unwrap();
    client.queries().accounts().await.unwrap();

    assert_eq!(mock.calls(ACCOUNTS), 2);
}

#[tokio::test]
async fn test_invalidate_forces_refetch_on_next_read() {
    let mock = MockTransport::new();
    mock.ok(ACCOUNTS, json!([account(1, "HDFC")]));
    mock.ok(ACCOUNTS, json!([account(1, "HDFC"), account(2, "SBI")]));
    let client = client(&mock);

    assert_eq!(client.queries().accounts().await.unwrap().len(), 1);

    let marked = client
        .cache()
        .invalidate(&KeyFilter::Prefix(CacheKey::resource("account")));
    assert_eq!(marked, 1);
    assert!(client.cache().info(&CacheKey::accounts()).unwrap().is_stale);

    // Stale data stays visible until the refetch lands.
    assert_eq!(client.queries().peek_accounts().unwrap().len(), 1);
    assert_eq!(client.queries().accounts().await.unwrap().len(), 2);
    assert_eq!(mock.calls(ACCOUNTS), 2);
}

#[tokio::test]
async fn test_set_data_is_visible_immediately() {
    let mock = MockTransport::new();
    let client = client(&mock);

    client
        .cache()
        .set_data(&CacheKey::accounts(), json!([account(9, "Cash")]));

    let accounts = client.queries().accounts().await.unwrap();
    assert_eq!(accounts[0].id, 9);
    assert_eq!(mock.calls(ACCOUNTS), 0);
    assert_eq!(client.queries().find_account(9).unwrap().name, "Cash");
}

#[tokio::test]
async fn test_refetch_active_only_refreshes_subscribed_entries() {
    let mock = MockTransport::new();
    mock.ok(ACCOUNTS, json!([account(1, "HDFC")]));
    mock.ok(ACCOUNTS, json!([account(1, "HDFC Bank")]));
    mock.ok("GET /category", json!([category(1, "Food")]));
    let client = client(&mock);
    let queries = client.queries();

    let _subscription = queries.subscribe(&CacheKey::accounts());
    queries.accounts().await.unwrap();
    queries.categories().await.unwrap();

    client.cache().invalidate(&KeyFilter::All);
    let refetched = client.cache().refetch_active(&KeyFilter::All).await;

    assert_eq!(refetched, 1);
    assert_eq!(queries.peek_accounts().unwrap()[0].name, "HDFC Bank");
    assert_eq!(mock.calls("GET /category"), 1);
}

#[tokio::test]
async fn test_subscription_sees_updates() {
    let mock = MockTransport::new();
    let client = client(&mock);
    let mut subscription = client.queries().subscribe(&CacheKey::accounts());

    client
        .cache()
        .set_data(&CacheKey::accounts(), json!([account(1, "HDFC")]));

    let event = subscription.changed().await.unwrap();
    assert!(event.affects(&CacheKey::accounts()));
}

#[tokio::test]
async fn test_retry_recovers_from_network_error() {
    let mock = MockTransport::new();
    mock.no_response(ACCOUNTS);
    mock.ok(ACCOUNTS, json!([account(1, "HDFC")]));
    let client = FinanceClient::with_transport(
        test_config().retry(RetryPolicy::immediate(3)),
        mock.clone(),
    )
    .unwrap();

    let accounts = client.queries().accounts().await.unwrap();
    assert_eq!(accounts.len(), 1);
    assert_eq!(mock.calls(ACCOUNTS), 2);
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let mock = MockTransport::new();
    mock.fail("GET /account/7", 404, "no such account");
    let client = FinanceClient::with_transport(
        test_config().retry(RetryPolicy::immediate(3)),
        mock.clone(),
    )
    .unwrap();

    let err = client.queries().account(7).await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound { .. }));
    assert_eq!(mock.calls("GET /account/7"), 1);
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let mock = MockTransport::new();
    mock.fail(ACCOUNTS, 500, "boom");
    let client = FinanceClient::with_transport(
        test_config().retry(RetryPolicy::immediate(3)),
        mock.clone(),
    )
    .unwrap();

    assert!(client.queries().accounts().await.is_err());
    assert_eq!(mock.calls(ACCOUNTS), 4);
}

#[tokio::test]
async fn test_garbage_collection_skips_subscribed_entries() {
    let mock = MockTransport::new();
    mock.ok(ACCOUNTS, json!([account(1, "HDFC")]));
    mock.ok("GET /category", json!([category(1, "Food")]));
    let client = FinanceClient::with_transport(test_config().gc_time(Duration::ZERO), mock.clone())
        .unwrap();
    let queries = client.queries();

    let subscription = queries.subscribe(&CacheKey::categories());
    queries.accounts().await.unwrap();
    queries.categories().await.unwrap();

    assert_eq!(client.cache().collect_garbage(), 1);
    assert!(client.cache().get_data(&CacheKey::accounts()).is_none());
    assert!(client.cache().get_data(&CacheKey::categories()).is_some());

    drop(subscription);
    assert_eq!(client.cache().collect_garbage(), 1);
    assert!(client.cache().is_empty());
}

#[tokio::test]
async fn test_capacity_evicts_least_recently_used() {
    let mock = MockTransport::new();
    for id in 1..=3 {
        mock.ok(&format!("GET /account/{}", id), account(id, "A"));
    }
    let client = FinanceClient::with_transport(test_config().max_entries(2), mock.clone())
        .unwrap();

    for id in 1..=3 {
        client.queries().account(id).await.unwrap();
    }

    assert_eq!(client.cache().len(), 2);
    assert!(client.cache().get_data(&CacheKey::account(1)).is_none());
    assert!(client.cache().get_data(&CacheKey::account(3)).is_some());
}

#[tokio::test]
async fn test_derived_lookups_need_no_network() {
    let mock = MockTransport::new();
    mock.ok("GET /category", json!([category(1, "Food"), category(2, "Rent"), category(3, "Fun")]));
    mock.ok(
        TRANSACTIONS_PAGE_1,
        page(vec![transaction(5, 100.0, &[3, 1]), transaction(6, 20.0, &[])], 1),
    );
    let client = client(&mock);
    let queries = client.queries();
    queries.categories().await.unwrap();
    queries
        .transactions(&Default::default())
        .await
        .unwrap();
    let calls = mock.requests().len();

    let found = queries.find_transaction(5).unwrap();
    let names: Vec<String> = queries
        .categories_of(&found)
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(names, vec!["Fun", "Food"]);
    assert!(queries.find_transaction(99).is_none());
    assert!(queries.find_category(42).is_none());
    assert_eq!(mock.requests().len(), calls);
}
