//! Retry behavior of the REST client against a stub exchange.

mod common;

use reqwest::Method;
use xeggex_market_data::{MarketDataError, RestClient};

#[tokio::test]
async fn failing_call_attempts_retry_budget_plus_one() {
    let stub = common::stub_exchange(|_| (500, r#"{"message": "down"}"#.to_string())).await;
    let rest = RestClient::new()
        .with_base_url(stub.base_url())
        .with_max_retries(1);

    let err = rest.call(Method::GET, "orderbook", None).await.unwrap_err();
    match err {
        MarketDataError::Api { status, payload } => {
            assert_eq!(status, Some(500));
            assert_eq!(payload["message"], "down");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(stub.hit_count(), 2);
}

#[tokio::test]
async fn error_body_is_passed_through_without_retrying() {
    let stub = common::stub_exchange(|_| {
        (400, r#"{"error": {"message": "bad param"}}"#.to_string())
    })
    .await;
    let rest = RestClient::new()
        .with_base_url(stub.base_url())
        .with_max_retries(3);

    let payload = rest.call(Method::GET, "orderbook", None).await.unwrap();
    assert_eq!(payload["error"]["message"], "bad param");
    assert_eq!(stub.hit_count(), 1);
}

#[tokio::test]
async fn successful_call_returns_parsed_body() {
    let stub = common::stub_exchange(|path| {
        assert!(path.contains("depth=150"));
        assert!(path.contains("ticker_id"));
        (200, r#"{"bids": [], "asks": [], "timestamp": 1}"#.to_string())
    })
    .await;
    let rest = RestClient::new()
        .with_base_url(stub.base_url())
        .with_max_retries(0);

    let params = [("depth", "150".to_string()), ("ticker_id", "BTC/USDT".to_string())];
    let payload = rest
        .call(Method::GET, "orderbook", Some(&params))
        .await
        .unwrap();
    assert_eq!(payload["timestamp"], 1);
    assert_eq!(stub.hit_count(), 1);
}
