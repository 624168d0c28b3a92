// tests/notify_telegram.rs
// TelegramNotifier against a local fake Bot API (real sockets, loopback only).

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use axum::{extract::State, http::StatusCode, routing::post, Json, Router};

use job_radar::config::TelegramConfig;
use job_radar::error::DeliveryError;
use job_radar::notify::{Notifier, TelegramNotifier};
use job_radar::posting::AdmittedPosting;

const TOKEN: &str = "test-token";

#[derive(Default)]
struct Fake {
    /// Texts accepted so far.
    texts: Vec<String>,
    /// Status codes to answer with before accepting (popped front first).
    script: Vec<u16>,
    calls: usize,
}

type Shared = Arc<Mutex<Fake>>;

async fn send_message(State(fake): State<Shared>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let mut f = fake.lock().unwrap();
    f.calls += 1;
    if !f.script.is_empty() {
        let code = f.script.remove(0);
        let status = StatusCode::from_u16(code).unwrap();
        if code == 200 {
            return (status, Json(json!({ "ok": false, "description": "chat not found" })));
        }
        return (status, Json(json!({ "ok": false, "description": "scripted failure" })));
    }
    f.texts.push(body["text"].as_str().unwrap_or_default().to_string());
    (StatusCode::OK, Json(json!({ "ok": true, "result": {} })))
}

async fn spawn_fake(script: Vec<u16>) -> (TelegramNotifier, Shared) {
    let fake: Shared = Arc::new(Mutex::new(Fake {
        script,
        ..Fake::default()
    }));
    let app = Router::new()
        .route(&format!("/bot{TOKEN}/sendMessage"), post(send_message))
        .with_state(fake.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let notifier = TelegramNotifier::new(&TelegramConfig {
        bot_token: TOKEN.into(),
        chat_id: "42".into(),
        api_base: format!("http://{addr}"),
    })
    .with_timeout(5)
    .with_retries(3)
    .with_pacing(Duration::from_millis(1));
    (notifier, fake)
}

fn posting(n: u32) -> AdmittedPosting {
    AdmittedPosting {
        title: format!("Junior DevOps {n}"),
        company: "Acme".into(),
        location: "Tel Aviv".into(),
        url: format!("https://jobs.test/{n}"),
        description: "AWS and Docker".into(),
        source: "indeed".into(),
        posted_at: None,
    }
}

#[tokio::test]
async fn batch_sends_header_then_each_posting() {
    let (notifier, fake) = spawn_fake(vec![]).await;

    notifier.deliver(&[posting(1), posting(2)]).await.expect("deliver");

    let f = fake.lock().unwrap();
    assert_eq!(f.texts.len(), 3);
    assert_eq!(f.texts[0], "🚀 *Found 2 new job(s) today!*");
    assert!(f.texts[1].starts_with("*1/2 - Junior DevOps 1*"));
    assert!(f.texts[2].contains("[View Job](https://jobs.test/2)"));
}

#[tokio::test]
async fn empty_batch_sends_none_found() {
    let (notifier, fake) = spawn_fake(vec![]).await;
    notifier.deliver(&[]).await.expect("deliver");
    let f = fake.lock().unwrap();
    assert_eq!(f.texts.len(), 1);
    assert!(f.texts[0].contains("No new jobs found today"));
}

#[tokio::test]
async fn rate_limit_is_retried() {
    let (notifier, fake) = spawn_fake(vec![429]).await;
    notifier.notify_text("hello").await.expect("retried after 429");
    let f = fake.lock().unwrap();
    assert_eq!(f.calls, 2);
    assert_eq!(f.texts, vec!["hello".to_string()]);
}

#[tokio::test]
async fn client_error_fails_without_retry() {
    let (notifier, fake) = spawn_fake(vec![400]).await;
    let err = notifier.notify_text("hello").await.unwrap_err();
    assert!(matches!(err, DeliveryError::Status { status: 400, .. }), "{err}");
    assert_eq!(fake.lock().unwrap().calls, 1);
}

#[tokio::test]
async fn ok_false_reply_is_a_rejection() {
    let (notifier, _fake) = spawn_fake(vec![200]).await;
    let err = notifier.notify_text("hello").await.unwrap_err();
    assert!(matches!(err, DeliveryError::Rejected { .. }), "{err}");
}
