use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tokio::sync::Notify;
use tower::ServiceExt;

use visual_deconstructor::{
    pipeline::Pipeline,
    prompts::PromptSet,
    session::SessionRegistry,
    synth::{CaptionSynthesizer, SynthesisError},
    upload::UploadedImage,
    vision::{VisionDescriber, VisionError},
    web::{router, AppState},
};

const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
const BOUNDARY: &str = "vd-session-boundary";

struct StaticVision;

#[async_trait]
impl VisionDescriber for StaticVision {
    async fn describe(&self, _image: &UploadedImage) -> Result<String, VisionError> {
        Ok("铬色反光".to_string())
    }
}

/// Holds every synthesis until the test releases it.
#[derive(Default)]
struct GatedChat {
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl CaptionSynthesizer for GatedChat {
    async fn synthesize(
        &self,
        _system_prompt: &str,
        _user_message: &str,
    ) -> Result<String, SynthesisError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok("慢慢来的低频。".to_string())
    }
}

fn gated_app(chat: Arc<GatedChat>) -> Router {
    let pipeline = Pipeline::new(
        Arc::new(StaticVision),
        chat,
        Arc::new(PromptSet::default()),
    );
    let state = AppState::new(
        pipeline,
        SessionRegistry::new(Duration::from_secs(600)),
        1024 * 1024,
    );
    router(Arc::new(state))
}

fn upload(cookie: Option<&str>) -> Request<Body> {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"a.png\"\r\nContent-Type: image/png\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(PNG);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    let mut builder = Request::post("/api/image").header(
        header::CONTENT_TYPE,
        format!("multipart/form-data; boundary={BOUNDARY}"),
    );
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body)).unwrap()
}

fn generate(cookie: &str) -> Request<Body> {
    Request::post("/api/generate")
        .header(header::COOKIE, cookie)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({"mode": "Blogger", "weather": "Snow", "mood": "Aloof"}).to_string(),
        ))
        .unwrap()
}

fn action(method: &str, uri: &str, cookie: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn open_session(app: &Router) -> String {
    let response = app.clone().oneshot(upload(None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn clear_waits_for_running_generation() {
    let chat = Arc::new(GatedChat::default());
    let app = gated_app(chat.clone());
    let cookie = open_session(&app).await;

    let generating = tokio::spawn(app.clone().oneshot(generate(&cookie)));
    chat.entered.notified().await;

    let clearing = tokio::spawn(app.clone().oneshot(action("POST", "/api/history/clear", &cookie)));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!clearing.is_finished(), "clear ran while generation held the session");

    chat.release.notify_one();

    let generated = json_body(generating.await.unwrap().unwrap()).await;
    assert_eq!(generated["caption"], "慢慢来的低频。");
    assert_eq!(generated["history"].as_array().unwrap().len(), 1);

    let cleared = clearing.await.unwrap().unwrap();
    assert_eq!(cleared.status(), StatusCode::OK);

    let history = json_body(
        app.clone()
            .oneshot(action("GET", "/api/history", &cookie))
            .await
            .unwrap(),
    )
    .await;
    assert!(history["history"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn other_sessions_are_not_blocked() {
    let chat = Arc::new(GatedChat::default());
    let app = gated_app(chat.clone());
    let busy = open_session(&app).await;

    let generating = tokio::spawn(app.clone().oneshot(generate(&busy)));
    chat.entered.notified().await;

    let idle = tokio::time::timeout(Duration::from_secs(5), open_session(&app))
        .await
        .expect("upload in another session stalled");
    let cleared = tokio::time::timeout(
        Duration::from_secs(5),
        app.clone()
            .oneshot(action("POST", "/api/history/clear", &idle)),
    )
    .await
    .expect("clear in another session stalled")
    .unwrap();
    assert_eq!(cleared.status(), StatusCode::OK);
    assert!(!generating.is_finished());

    chat.release.notify_one();
    let generated = generating.await.unwrap().unwrap();
    assert_eq!(generated.status(), StatusCode::OK);
}
