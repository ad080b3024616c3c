//! End-to-end HTTP tests driven through the full stack (`inngest-sdk`
//! handler -> engine -> comm handler router): replay/discovery, opportunistic
//! early execution, ID collision rewriting, non-retriable rejection, and
//! middleware reentrancy, matching the testable properties this workspace
//! is built around.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use inngest_core::InngestConfig;
use inngest_runtime::middleware::{BoxFut, Middleware};
use inngest_runtime::CommHandler;
use inngest_sdk::{parallel, FunctionBuilder, Inngest, StepError};
use tower::ServiceExt;

fn dev_config() -> InngestConfig {
    let mut config = InngestConfig::default();
    config.is_dev = true;
    config
}

async fn run_request(
    handler: CommHandler,
    body: serde_json::Value,
    requested_step: Option<&str>,
) -> (StatusCode, serde_json::Value) {
    let uri = match requested_step {
        Some(step_id) => format!("/?fnId=under-test&stepId={step_id}"),
        None => "/?fnId=under-test".to_string(),
    };
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = handler.router().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let parsed = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, parsed)
}

fn empty_request_body() -> serde_json::Value {
    serde_json::json!({
        "ctx": {"runId": "run-1", "attempt": 0},
        "event": {"name": "test/event", "data": {}},
        "events": [],
        "steps": {},
    })
}

fn retried_request_body() -> serde_json::Value {
    let mut body = empty_request_body();
    body["ctx"]["attempt"] = serde_json::json!(1);
    body
}

fn memoized_data_request_body(hashed_id: &str, data: serde_json::Value) -> serde_json::Value {
    let mut body = empty_request_body();
    body["steps"] = serde_json::json!({ hashed_id: {"type": "data", "data": data} });
    body
}

fn memoized_error_request_body(hashed_id: &str, name: &str, message: &str) -> serde_json::Value {
    let mut body = empty_request_body();
    body["steps"] = serde_json::json!({
        hashed_id: {"type": "error", "error": {"name": name, "message": message}}
    });
    body
}

#[tokio::test]
async fn single_unopted_step_is_reported_not_executed_on_first_invocation() {
    let client = Inngest::with_config("test-app", dev_config()).register(
        FunctionBuilder::new("under-test").trigger_event("test/event").handle(|_ctx, tools| async move {
            let value = tools.run("a", || async { Ok::<_, StepError>(42) }).await?;
            Ok(serde_json::json!({ "result": value }))
        }),
    );
    let handler = client.comm_handler("https://app.example.com");

    let (status, body) = run_request(handler, empty_request_body(), None).await;

    assert_eq!(status, StatusCode::PARTIAL_CONTENT);
    let ops = body.as_array().expect("a plain discovery report is an array of planned ops");
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0]["id"], inngest_core::hash_step_id("a"));
    assert_eq!(ops[0]["op"], "StepPlanned");
    assert!(ops[0].get("data").is_none(), "the first invocation is a bare discovery report, not an execution");
}

#[tokio::test]
async fn single_unopted_step_executes_immediately_on_a_retried_attempt() {
    let client = Inngest::with_config("test-app", dev_config()).register(
        FunctionBuilder::new("under-test").trigger_event("test/event").handle(|_ctx, tools| async move {
            let value = tools.run("a", || async { Ok::<_, StepError>(42) }).await?;
            Ok(serde_json::json!({ "result": value }))
        }),
    );
    let handler = client.comm_handler("https://app.example.com");

    let (status, body) = run_request(handler, retried_request_body(), None).await;

    assert_eq!(status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(body["id"], inngest_core::hash_step_id("a"));
    assert_eq!(body["op"], "StepRun");
    assert_eq!(body["data"], 42);
}

#[tokio::test]
async fn memoized_step_lets_handler_complete() {
    let client = Inngest::with_config("test-app", dev_config()).register(
        FunctionBuilder::new("under-test").trigger_event("test/event").handle(|_ctx, tools| async move {
            let value = tools.run("a", || async { Ok::<_, StepError>(42) }).await?;
            Ok(serde_json::json!({ "result": value }))
        }),
    );
    let handler = client.comm_handler("https://app.example.com");
    let hashed = inngest_core::hash_step_id("a");

    let (status, body) = run_request(handler, memoized_data_request_body(&hashed, serde_json::json!(42)), None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"], 42);
}

#[tokio::test]
async fn concurrent_steps_are_reported_together_and_requested_id_picks_one() {
    let client = Inngest::with_config("test-app", dev_config()).register(
        FunctionBuilder::new("under-test").trigger_event("test/event").handle(|_ctx, tools| async move {
            let (t_a, t_b) = (tools.clone(), tools.clone());
            let results: Vec<i64> = parallel(
                &tools,
                vec![
                    Box::pin(async move { t_a.run("a", || async { Ok::<_, StepError>(1) }).await.unwrap() }) as BoxFut<i64>,
                    Box::pin(async move { t_b.run("b", || async { Ok::<_, StepError>(2) }).await.unwrap() }) as BoxFut<i64>,
                ],
            )
            .await;
            Ok(serde_json::json!({ "sum": results.iter().sum::<i64>() }))
        }),
    );
    let handler = client.comm_handler("https://app.example.com");

    let (status, body) = run_request(handler.clone(), empty_request_body(), None).await;
    assert_eq!(status, StatusCode::PARTIAL_CONTENT);
    let ops = body.as_array().expect("parallel fan-out reports every discovered step at once");
    let hashed_a = inngest_core::hash_step_id("a");
    let hashed_b = inngest_core::hash_step_id("b");
    let ids: Vec<&str> = ops.iter().map(|op| op["id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec![hashed_a.as_str(), hashed_b.as_str()], "discovery order matches declaration order");

    let (status, body) = run_request(handler, empty_request_body(), Some(&hashed_b)).await;
    assert_eq!(status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(body["id"], hashed_b);
    assert_eq!(body["op"], "StepRun");
    assert_eq!(body["data"], 2);
}

#[tokio::test]
async fn colliding_user_ids_rewrite_the_hashed_id_but_not_the_display_name() {
    let client = Inngest::with_config("test-app", dev_config()).register(
        FunctionBuilder::new("under-test").trigger_event("test/event").handle(|_ctx, tools| async move {
            let (t_a, t_b) = (tools.clone(), tools.clone());
            let _: Vec<i64> = parallel(
                &tools,
                vec![
                    Box::pin(async move { t_a.run("x", || async { Ok::<_, StepError>(1) }).await.unwrap() }) as BoxFut<i64>,
                    Box::pin(async move { t_b.run("x", || async { Ok::<_, StepError>(2) }).await.unwrap() }) as BoxFut<i64>,
                ],
            )
            .await;
            Ok(serde_json::json!(null))
        }),
    );
    let handler = client.comm_handler("https://app.example.com");

    let (status, body) = run_request(handler, empty_request_body(), None).await;
    assert_eq!(status, StatusCode::PARTIAL_CONTENT);
    let ops = body.as_array().unwrap();
    assert_eq!(ops.len(), 2);
    assert_eq!(ops[0]["id"], inngest_core::hash_step_id("x"));
    assert_eq!(ops[0]["name"], "x");
    assert_eq!(ops[1]["id"], inngest_core::hash_step_id("x:1"));
    assert_eq!(ops[1]["name"], "x", "display name stays stable across the collision rewrite");
}

#[tokio::test]
async fn non_retriable_error_is_reported_then_replayed_as_a_rejection() {
    let client = Inngest::with_config("test-app", dev_config()).register(
        FunctionBuilder::new("under-test").trigger_event("test/event").handle(|_ctx, tools| async move {
            let _: i64 = tools.run("a", || async { Err(StepError::non_retriable("no")) }).await?;
            Ok(serde_json::json!(null))
        }),
    );
    let handler = client.comm_handler("https://app.example.com");
    let hashed = inngest_core::hash_step_id("a");

    // a retried attempt (not the very first invocation) is needed to exercise
    // early execution here; the first invocation of a single un-opted step is
    // always a bare discovery report, never an execution.
    let (status, body) = run_request(handler.clone(), retried_request_body(), None).await;
    assert_eq!(status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(body["op"], "StepRun");
    assert_eq!(body["error"]["name"], "NonRetriableError");
    assert_eq!(body["error"]["message"], "no");

    let (status, _body) =
        run_request(handler, memoized_error_request_body(&hashed, "NonRetriableError", "no"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "a memoized NonRetriableError rejects the run rather than retrying it");
}

/// Records every `wrapStep` call it sees, proving discovery order and that
/// a middleware never ends up wrapping its own injected steps.
struct Recorder {
    seen: Arc<std::sync::Mutex<Vec<String>>>,
    calls: AtomicUsize,
}

impl Middleware for Recorder {
    fn wrap_step(
        &self,
        info: inngest_core::StepInfo,
        next: BoxFut<inngest_core::StepOutcome>,
    ) -> BoxFut<inngest_core::StepOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(info.options.id.clone());
        next
    }
}

#[tokio::test]
async fn middleware_wrap_step_sees_every_discovered_step_exactly_once() {
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let middleware = Arc::new(Recorder {
        seen: seen.clone(),
        calls: AtomicUsize::new(0),
    });

    let client = Inngest::with_config("test-app", dev_config())
        .middleware(middleware.clone())
        .register(FunctionBuilder::new("under-test").trigger_event("test/event").handle(|_ctx, tools| async move {
            let _: i64 = tools.run("main", || async { Ok(1) }).await?;
            Ok(serde_json::json!(null))
        }));
    let handler = client.comm_handler("https://app.example.com");

    let (status, _body) = run_request(handler, empty_request_body(), None).await;
    assert_eq!(status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(*seen.lock().unwrap(), vec!["main".to_string()]);
    assert_eq!(middleware.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn introspect_reports_registered_function_count() {
    let client = Inngest::with_config("test-app", dev_config()).register(
        FunctionBuilder::new("under-test")
            .trigger_event("test/event")
            .handle(|_ctx, _tools| async { Ok(serde_json::json!(null)) }),
    );
    let handler = client.comm_handler("https://app.example.com");

    let request = Request::builder().method("GET").uri("/").body(Body::empty()).unwrap();
    let response = handler.router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["function_count"], 1);
    assert_eq!(body["mode"], "dev");
}
