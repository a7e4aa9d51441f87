/// Remote client tests
///
/// Request shapes, headers, envelope decoding and the error taxonomy of the
/// typed REST client.
/// Run with: cargo test --test remote_client_tests
mod common;

use common::*;
use chrono::NaiveDate;
use finsync::api::{
    ApiResponse, ImportKind, Method, MultipartField, REQUEST_ID_HEADER, RequestBody,
    StatementFile,
};
use finsync::core::{
    ApiError, Condition, NewAccount, SortField, SortOrder, TransactionQuery,
};
use serde_json::json;

#[tokio::test]
async fn test_list_decodes_envelope() {
    let mock = MockTransport::new();
    mock.ok("GET /account", json!([account(1, "HDFC"), account(2, "SBI")]));
    let client = client(&mock);

    let accounts = client.api().list_accounts().await.unwrap();

    assert_eq!(accounts.len(), 2);
    assert_eq!(accounts[1].name, "SBI");
    assert_eq!(accounts[0].currency, "INR");
}

#[tokio::test]
async fn test_status_taxonomy() {
    let mock = MockTransport::new();
    let cases = [
        (400, "bad"),
        (403, "nope"),
        (404, "missing"),
        (409, "conflict"),
        (422, "unprocessable"),
        (500, "boom"),
        (503, "down"),
    ];
    for (status, message) in cases {
        mock.fail(&format!("GET /category/{}", status), status, message);
    }
    let client = client(&mock);

    for (status, message) in cases {
        let err = client.api().get_category(status as i64).await.unwrap_err();
        assert_eq!(err.status(), Some(status));
        assert_eq!(err.message(), message);
        assert_eq!(err.resource(), "category");
        let expected = match status {
            400 => matches!(err, ApiError::Validation { .. }),
            403 => matches!(err, ApiError::Forbidden { .. }),
            404 => matches!(err, ApiError::NotFound { .. }),
            409 => matches!(err, ApiError::Conflict { .. }),
            500 | 503 => matches!(err, ApiError::Server { .. }),
            _ => matches!(err, ApiError::Http { .. }),
        };
        assert!(expected, "unexpected variant for {}: {:?}", status, err);
    }
}

#[tokio::test]
async fn test_network_failure_has_no_status() {
    let mock = MockTransport::new();
    mock.no_response("GET /rule");
    let client = client(&mock);

    let err = client.api().list_rules().await.unwrap_err();

    assert!(matches!(err, ApiError::Network { .. }));
    assert_eq!(err.resource(), "rule");
    assert_eq!(err.status(), None);
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_malformed_body_is_decode_error() {
    let mock = MockTransport::new();
    mock.respond("GET /account", ApiResponse::new(200, "<html>oops</html>"));
    let client = client(&mock);

    let err = client.api().list_accounts().await.unwrap_err();
    assert!(matches!(err, ApiError::Decode { .. }));
}

#[tokio::test]
async fn test_bearer_header_only_on_mutations() {
    let mock = MockTransport::new();
    mock.ok("GET /account", json!([]));
    mock.ok("POST /account", account(3, "Cash"));
    let client = client(&mock);
    client.session().set_token("secret");

    client.api().list_accounts().await.unwrap();
    client
        .api()
        .create_account(&NewAccount {
            name: "Cash".to_string(),
            bank_type: "wallet".to_string(),
            currency: "INR".to_string(),
            balance: 0.0,
        })
        .await
        .unwrap();

    let requests = mock.requests();
    assert_eq!(requests[0].method, Method::Get);
    assert!(requests[0].header_value("Authorization").is_none());
    assert_eq!(requests[1].header_value("Authorization"), Some("Bearer secret"));

    let first_id = requests[0].header_value(REQUEST_ID_HEADER).unwrap();
    let second_id = requests[1].header_value(REQUEST_ID_HEADER).unwrap();
    assert_ne!(first_id, second_id);
}

#[tokio::test]
async fn test_transaction_query_string() {
    let query = TransactionQuery::default()
        .page(3)
        .page_size(50)
        .sort(SortField::Amount, SortOrder::Desc)
        .account(2)
        .uncategorized(true)
        .dates_between(NaiveDate::from_ymd_opt(2024, 1, 1), None)
        .search("  rent ");
    let route = "GET /transaction?page=3&page_size=50&sort_by=amount&sort_order=desc\
                 &account_id=2&uncategorized=true&date_from=2024-01-01&search=rent";
    let mock = MockTransport::new();
    mock.ok(
        route,
        json!({ "items": [transaction(9, 1.0, &[])], "total": 101, "page": 3, "page_size": 50 }),
    );
    let client = client(&mock);

    let page = client.api().list_transactions(&query).await.unwrap();

    assert_eq!(mock.calls(route), 1);
    assert_eq!(page.items[0].id, 9);
    assert_eq!(page.total_pages(), 3);
    assert!(!page.has_next());
}

#[tokio::test]
async fn test_rule_conditions_are_replaced_wholesale() {
    let mock = MockTransport::new();
    let conditions = vec![Condition {
        condition_type: "description".to_string(),
        condition_operator: "contains".to_string(),
        condition_value: "UBER".to_string(),
    }];
    mock.ok("PUT /rule/4/conditions", json!(conditions));
    let client = client(&mock);

    let saved = client
        .api()
        .replace_rule_conditions(4, &conditions)
        .await
        .unwrap();

    assert_eq!(saved, conditions);
    let sent = mock.requests_to("PUT /rule/4/conditions");
    assert_eq!(
        sent[0].body,
        RequestBody::Json(json!({ "conditions": conditions }))
    );
}

#[tokio::test]
async fn test_statement_upload_is_multipart() {
    let mock = MockTransport::new();
    mock.ok(
        "POST /statement",
        json!({ "id": 8, "account_id": 1, "file_name": "march.csv" }),
    );
    let client = client(&mock);
    let file = StatementFile::new("march.csv", b"date,amount\n2024-03-01,10".to_vec());

    let statement = client
        .api()
        .upload_statement(1, &file, ImportKind::Generic)
        .await
        .unwrap();
    assert_eq!(statement.id, 8);

    let sent = mock.requests_to("POST /statement");
    let RequestBody::Multipart(fields) = &sent[0].body else {
        panic!("expected multipart body, got {:?}", sent[0].body);
    };
    assert_eq!(
        fields[0],
        MultipartField::Text {
            name: "account_id".to_string(),
            value: "1".to_string()
        }
    );
    assert!(matches!(
        &fields[1],
        MultipartField::File { name, file_name, content_type, .. }
            if name == "file" && file_name == "march.csv" && content_type == "text/csv"
    ));
}

#[tokio::test]
async fn test_invalid_statement_never_leaves_the_client() {
    let mock = MockTransport::new();
    let client = client(&mock);

    let too_big = StatementFile::new("big.csv", vec![b'x'; 256 * 1024 + 1]);
    let err = client
        .api()
        .upload_statement(1, &too_big, ImportKind::Generic)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidInput { .. }));

    let text = StatementFile::new("export.txt", b"x".to_vec());
    assert!(client
        .api()
        .upload_statement(1, &text, ImportKind::Generic)
        .await
        .is_err());

    assert!(mock.requests().is_empty());
}
