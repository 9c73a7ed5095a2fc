use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use cvi_client::{
    BackoffPolicy, CancellationToken, ClientError, ConversationApi, ConversationLauncher,
    ConversationProperties, CreateConversationRequest, GatewayClient, LaunchRequest,
    ProviderError, ReqwestConversationApi, RetryController, RetryOutcome,
};
use serde_json::{Value, json};

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn fast_policy() -> BackoffPolicy {
    BackoffPolicy {
        base: Duration::from_millis(5),
        max: Duration::from_millis(20),
        jitter_ratio: 0.1,
    }
}

#[tokio::test]
async fn provider_call_sends_api_key_and_body() {
    let seen: Arc<tokio::sync::Mutex<Option<(String, Value)>>> = Arc::default();
    let router = Router::new()
        .route(
            "/v2/conversations",
            post(
                |State(seen): State<Arc<tokio::sync::Mutex<Option<(String, Value)>>>>,
                 headers: HeaderMap,
                 Json(body): Json<Value>| async move {
                    let key = headers
                        .get("x-api-key")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    *seen.lock().await = Some((key, body));
                    Json(json!({
                        "conversation_id": "c123",
                        "conversation_url": "https://tavus.daily.co/c123",
                        "status": "active"
                    }))
                },
            ),
        )
        .with_state(seen.clone());
    let base = serve(router).await;

    let api = ReqwestConversationApi::new(reqwest::Client::new(), &format!("{base}/v2"), "key-1")
        .unwrap();
    let created = api
        .create_conversation(&CreateConversationRequest {
            persona_id: "p1".into(),
            replica_id: "r1".into(),
            document_tags: Some(vec!["pricing".into()]),
            memory_stores: None,
            callback_url: "http://localhost:3000/api/tavus/webhook".into(),
            properties: ConversationProperties::default(),
        })
        .await
        .unwrap();
    assert_eq!(created.conversation_id, "c123");

    let (key, body) = seen.lock().await.clone().unwrap();
    assert_eq!(key, "key-1");
    assert_eq!(body["persona_id"], "p1");
    assert_eq!(body["document_tags"], json!(["pricing"]));
    assert_eq!(body["properties"]["language"], "multilingual");
}

#[tokio::test]
async fn provider_errors_keep_status_and_retry_after() {
    let router = Router::new().route(
        "/conversations",
        post(|| async {
            (
                StatusCode::TOO_MANY_REQUESTS,
                [("retry-after", "9")],
                "slow down",
            )
        }),
    );
    let base = serve(router).await;
    let api = ReqwestConversationApi::new(reqwest::Client::new(), &base, "key").unwrap();
    let err = api
        .create_conversation(&CreateConversationRequest {
            persona_id: "p".into(),
            replica_id: "r".into(),
            document_tags: None,
            memory_stores: None,
            callback_url: "http://cb".into(),
            properties: ConversationProperties::default(),
        })
        .await
        .unwrap_err();
    match err {
        ProviderError::Remote {
            status,
            retry_after,
            message,
        } => {
            assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
            assert_eq!(retry_after, Some(Duration::from_secs(9)));
            assert_eq!(message, "slow down");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn launcher_retries_gateway_failures_until_success() {
    let hits = Arc::new(AtomicU32::new(0));
    let router = Router::new()
        .route(
            "/api/tavus/create-conversation",
            post(|State(hits): State<Arc<AtomicU32>>| async move {
                if hits.fetch_add(1, Ordering::SeqCst) < 2 {
                    return (
                        StatusCode::SERVICE_UNAVAILABLE,
                        Json(json!({"error": "provider busy"})),
                    )
                        .into_response();
                }
                Json(json!({
                    "conversationId": "c9",
                    "conversationUrl": "https://tavus.daily.co/c9"
                }))
                .into_response()
            }),
        )
        .with_state(hits.clone());
    let base = serve(router).await;

    let launcher = ConversationLauncher::new(
        GatewayClient::new(reqwest::Client::new(), &base).unwrap(),
        RetryController::new(fast_policy(), 3),
    );
    match launcher.open(LaunchRequest::default()).await {
        RetryOutcome::Success { value, attempts } => {
            assert_eq!(value.conversation_id, "c9");
            assert_eq!(attempts, 3);
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn launcher_surfaces_rate_limit_and_stops_on_client_errors() {
    let router = Router::new().route(
        "/api/tavus/create-conversation",
        post(|Json(body): Json<Value>| async move {
            let response: Response = if body["vertical"] == "unknown" {
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({"error": "Invalid vertical configuration"})),
                )
                    .into_response()
            } else {
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    [("retry-after", "42")],
                    Json(json!({"error": "Too many requests", "retryAfter": 42, "remaining": 0})),
                )
                    .into_response()
            };
            response
        }),
    );
    let base = serve(router).await;
    let launcher = ConversationLauncher::new(
        GatewayClient::new(reqwest::Client::new(), &base).unwrap(),
        RetryController::new(fast_policy(), 1),
    );

    match launcher.open(LaunchRequest::default()).await {
        RetryOutcome::Failed {
            error: ClientError::RateLimited { retry_after_secs, .. },
            attempts,
            retryable,
        } => {
            assert_eq!(retry_after_secs, 42);
            assert_eq!(attempts, 2);
            assert!(retryable);
        }
        other => panic!("unexpected outcome {other:?}"),
    }

    let outcome = launcher
        .open(LaunchRequest {
            vertical: Some("unknown".into()),
            ..LaunchRequest::default()
        })
        .await;
    match outcome {
        RetryOutcome::Failed {
            error, attempts, ..
        } => {
            assert_eq!(attempts, 1);
            assert!(error.user_message().contains("contact support"));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[tokio::test]
async fn launcher_stopped_before_open_sends_nothing() {
    let hits = Arc::new(AtomicU32::new(0));
    let router = Router::new()
        .route(
            "/api/tavus/create-conversation",
            post(|State(hits): State<Arc<AtomicU32>>| async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Json(json!({"conversationId": "c1", "conversationUrl": "https://x/c1"}))
            }),
        )
        .with_state(hits.clone());
    let base = serve(router).await;
    let launcher = ConversationLauncher::new(
        GatewayClient::new(reqwest::Client::new(), &base).unwrap(),
        RetryController::new(fast_policy(), 3),
    );

    let stop = CancellationToken::new();
    stop.cancel();
    let outcome = launcher.open_until(LaunchRequest::default(), &stop).await;
    assert!(outcome.is_cancelled());
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    let outcome = launcher.open(LaunchRequest::default()).await;
    assert!(outcome.is_success());
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}
