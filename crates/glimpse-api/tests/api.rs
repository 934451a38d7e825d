use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use glimpse_api::media::MediaStore;
use glimpse_api::router;
use glimpse_api::state::AppStateInner;
use glimpse_core::{StoryConfig, StoryEngine};
use glimpse_db::Database;

const SECRET: &str = "test-secret";

struct TestApp {
    app: Router,
    engine: StoryEngine,
    _media_dir: tempfile::TempDir,
}

impl TestApp {
    async fn new(config: StoryConfig) -> Self {
        let media_dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Database::open_in_memory().unwrap());
        let engine = StoryEngine::new(db, config);
        let media = MediaStore::new(media_dir.path().to_path_buf()).await.unwrap();
        let state = Arc::new(AppStateInner::new(engine.clone(), media, SECRET.into()));
        Self {
            app: router(state),
            engine,
            _media_dir: media_dir,
        }
    }

    async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let resp = self.app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    async fn call(&self, method: &str, uri: &str, token: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token));
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        self.send(builder.body(body).unwrap()).await
    }

    /// Register a user, returning (id, token).
    async fn register(&self, username: &str) -> (i64, String) {
        let req = Request::builder()
            .method("POST")
            .uri("/auth/register")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({ "username": username, "password": "correct horse" }).to_string(),
            ))
            .unwrap();
        let (status, body) = self.send(req).await;
        assert_eq!(status, StatusCode::CREATED);
        (
            body["user_id"].as_i64().unwrap(),
            body["token"].as_str().unwrap().to_string(),
        )
    }

    async fn upload(&self, token: &str, mime: &str, bytes: &[u8], query: &str) -> (StatusCode, Value) {
        let req = Request::builder()
            .method("POST")
            .uri(format!("/stories{}", query))
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(header::CONTENT_TYPE, mime)
            .body(Body::from(bytes.to_vec()))
            .unwrap();
        self.send(req).await
    }
}

#[tokio::test]
async fn routes_require_a_valid_token() {
    let t = TestApp::new(StoryConfig::default()).await;
    let req = Request::builder().uri("/stories").body(Body::empty()).unwrap();
    let (status, body) = t.send(req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");

    let (status, _) = t.call("GET", "/stories", "not-a-jwt", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn register_login_and_duplicate_usernames() {
    let t = TestApp::new(StoryConfig::default()).await;
    let (id, _) = t.register("alice").await;

    let login = Request::builder()
        .method("POST")
        .uri("/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "username": "alice", "password": "correct horse" }).to_string(),
        ))
        .unwrap();
    let (status, body) = t.send(login).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"].as_i64(), Some(id));

    let dup = Request::builder()
        .method("POST")
        .uri("/auth/register")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "username": "alice", "password": "another pass" }).to_string(),
        ))
        .unwrap();
    assert_eq!(t.send(dup).await.0, StatusCode::CONFLICT);

    let bad = Request::builder()
        .method("POST")
        .uri("/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "username": "alice", "password": "wrong pass" }).to_string(),
        ))
        .unwrap();
    assert_eq!(t.send(bad).await.0, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn upload_feed_detail_and_media() {
    let t = TestApp::new(StoryConfig::default()).await;
    let (alice, alice_token) = t.register("alice").await;
    let (bob, bob_token) = t.register("bob").await;
    let (_, carol_token) = t.register("carol").await;

    let (status, _) = t
        .call("POST", &format!("/friends/{}", alice), &bob_token, None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, created) = t
        .upload(&alice_token, "image/png", b"\x89PNG fake", "?privacy=friends")
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let story_id = created["story_id"].as_i64().unwrap();

    // Bob sees one bucket with one unseen item.
    let (status, feed) = t.call("GET", "/stories", &bob_token, None).await;
    assert_eq!(status, StatusCode::OK);
    let buckets = feed["stories"].as_array().unwrap();
    assert_eq!(buckets.len(), 1);
    assert_eq!(buckets[0]["author"]["id"].as_i64(), Some(alice));
    assert_eq!(buckets[0]["has_unseen"], true);

    // Carol is not connected to Alice.
    let (status, feed) = t.call("GET", "/stories", &carol_token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(feed["stories"].as_array().unwrap().is_empty());
    let (status, _) = t
        .call("GET", &format!("/stories/{}", story_id), &carol_token, None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, detail) = t
        .call("GET", &format!("/stories/{}", story_id), &bob_token, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["can_manage"], false);
    assert!(detail.get("analytics").is_none());
    let item_id = detail["items"][0]["item_id"].as_i64().unwrap();
    let src = detail["items"][0]["src"].as_str().unwrap().to_string();

    let media_req = Request::builder()
        .uri(&src)
        .header(header::AUTHORIZATION, format!("Bearer {}", bob_token))
        .body(Body::empty())
        .unwrap();
    let resp = t.app.clone().oneshot(media_req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/png");
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"\x89PNG fake");

    // Seen clears the unseen flag on Bob's next feed.
    let (status, _) = t
        .call("POST", &format!("/stories/items/{}/seen", item_id), &bob_token, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, feed) = t.call("GET", "/stories", &bob_token, None).await;
    assert_eq!(feed["stories"][0]["has_unseen"], false);

    let (status, viewers) = t
        .call("GET", &format!("/stories/{}/viewers", story_id), &alice_token, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(viewers["viewers"][0]["user_id"].as_i64(), Some(bob));
    let (status, _) = t
        .call("GET", &format!("/stories/{}/viewers", story_id), &bob_token, None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn malformed_numbers_fall_back_to_defaults() {
    let t = TestApp::new(StoryConfig::default()).await;
    let (_, alice_token) = t.register("alice").await;
    let (_, bob_token) = t.register("bob").await;
    let (_, carol_token) = t.register("carol").await;

    let (_, created) = t
        .upload(&alice_token, "image/png", b"\x89PNG a", "?privacy=public")
        .await;
    let story_id = created["story_id"].as_i64().unwrap();
    t.upload(&bob_token, "image/png", b"\x89PNG b", "?privacy=public")
        .await;

    // Non-numeric reads as 0, which clamps to a single bucket.
    let (status, feed) = t
        .call("GET", "/stories?limit=abc&scope=all", &carol_token, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(feed["stories"].as_array().unwrap().len(), 1);

    let (status, feed) = t
        .call("GET", "/stories?limit=5junk&scope=everyone", &carol_token, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(feed["stories"].as_array().unwrap().len(), 2);

    let (status, _) = t
        .call(
            "GET",
            &format!("/stories/{}/viewers?limit=oops", story_id),
            &alice_token,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, archive) = t
        .call("GET", "/stories/archive?limit=x&page=-4", &alice_token, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(archive["page"].as_i64(), Some(1));
}

#[tokio::test]
async fn invalid_uploads_are_rejected() {
    let t = TestApp::new(StoryConfig {
        max_upload_mb: 1,
        ..Default::default()
    })
    .await;
    let (_, token) = t.register("alice").await;

    let (status, body) = t.upload(&token, "application/pdf", b"%PDF", "").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, _) = t.upload(&token, "image/png", b"", "").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let too_big = vec![0u8; 1024 * 1024 + 1];
    let (status, _) = t.upload(&token, "image/png", &too_big, "").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn hide_list_overrides_public() {
    let t = TestApp::new(StoryConfig::default()).await;
    let (_, alice_token) = t.register("alice").await;
    let (bob, bob_token) = t.register("bob").await;

    let (_, created) = t.upload(&alice_token, "image/jpeg", b"jpg", "").await;
    let story_id = created["story_id"].as_i64().unwrap();

    let (_, feed) = t.call("GET", "/stories", &bob_token, None).await;
    assert_eq!(feed["stories"].as_array().unwrap().len(), 1);

    let (status, _) = t
        .call("POST", &format!("/stories/{}/hide/{}", story_id, bob), &alice_token, None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, feed) = t.call("GET", "/stories", &bob_token, None).await;
    assert!(feed["stories"].as_array().unwrap().is_empty());
    let (status, _) = t
        .call("GET", &format!("/stories/{}", story_id), &bob_token, None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, hidden) = t
        .call("GET", &format!("/stories/{}/hide", story_id), &alice_token, None)
        .await;
    assert_eq!(hidden["count"], 1);
}

#[tokio::test]
async fn reactions_are_rate_limited() {
    let t = TestApp::new(StoryConfig {
        rate_limit_reactions: 2,
        ..Default::default()
    })
    .await;
    let (_, alice_token) = t.register("alice").await;
    let (_, bob_token) = t.register("bob").await;
    let (_, created) = t.upload(&alice_token, "image/png", b"png", "").await;
    let uri = format!("/stories/{}/reactions", created["story_id"].as_i64().unwrap());

    for reaction in ["🔥", "like"] {
        let (status, _) = t
            .call("POST", &uri, &bob_token, Some(json!({ "reaction": reaction })))
            .await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, body) = t
        .call("POST", &uri, &bob_token, Some(json!({ "reaction": "🔥" })))
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "Rate limit exceeded");

    // One reaction per user: the second replaced the first.
    let (_, listed) = t.call("GET", &uri, &alice_token, None).await;
    assert_eq!(listed["total"], 1);
    assert_eq!(listed["reactions"][0]["reaction"], "like");
}

#[tokio::test]
async fn reports_auto_hide_and_moderators_review() {
    let t = TestApp::new(StoryConfig {
        auto_hide_threshold: 2,
        ..Default::default()
    })
    .await;
    let (_, alice_token) = t.register("alice").await;
    let (_, bob_token) = t.register("bob").await;
    let (carol, carol_token) = t.register("carol").await;
    let (_, created) = t.upload(&alice_token, "image/png", b"png", "").await;
    let story_id = created["story_id"].as_i64().unwrap();
    let uri = format!("/stories/{}/report", story_id);

    let (status, body) = t
        .call("POST", &uri, &bob_token, Some(json!({ "reason": "spam" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["auto_hidden"], false);

    let (status, _) = t
        .call("POST", &uri, &alice_token, Some(json!({ "reason": "spam" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = t
        .call("POST", &uri, &carol_token, Some(json!({ "reason": "violence" })))
        .await;
    assert_eq!(body["auto_hidden"], true);

    // Pulled stories read as absent.
    let (status, _) = t
        .call("GET", &format!("/stories/{}", story_id), &bob_token, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = t.call("GET", "/stories/reports", &bob_token, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    t.engine.db().set_moderator(carol, true).unwrap();
    let (status, reports) = t.call("GET", "/stories/reports", &carol_token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reports["stats"]["actioned_count"], 2);
    assert!(reports["reports"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn poll_stickers_take_votes() {
    let t = TestApp::new(StoryConfig::default()).await;
    let (_, alice_token) = t.register("alice").await;
    let (_, bob_token) = t.register("bob").await;

    let (_, created) = t
        .upload(&alice_token, "image/png", b"\x89PNG poll", "?privacy=public")
        .await;
    let story_id = created["story_id"].as_i64().unwrap();
    let item_id = created["item_id"].as_i64().unwrap();

    let poll = json!({
        "type": "poll",
        "data": { "question": "Tea or coffee?", "options": ["tea", "coffee"] },
        "position_x": 20.0,
        "position_y": 80.0
    });
    let uri = format!("/stories/{}/items/{}/stickers", story_id, item_id);
    let (status, _) = t.call("POST", &uri, &bob_token, Some(poll.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, added) = t.call("POST", &uri, &alice_token, Some(poll)).await;
    assert_eq!(status, StatusCode::CREATED);
    let sticker_id = added["sticker_id"].as_i64().unwrap();

    let vote_uri = format!("/stickers/{}/vote", sticker_id);
    let (status, _) = t
        .call("POST", &vote_uri, &bob_token, Some(json!({ "option_index": 1 })))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = t
        .call("POST", &vote_uri, &bob_token, Some(json!({ "option_index": 7 })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, detail) = t
        .call("GET", &format!("/stories/{}", story_id), &bob_token, None)
        .await;
    let sticker = &detail["items"][0]["stickers"][0];
    assert_eq!(sticker["type"], "poll");
    assert_eq!(sticker["votes"], json!([0, 1]));
    assert_eq!(sticker["user_vote"].as_i64(), Some(1));
    assert_eq!(sticker["position"]["x"].as_f64(), Some(20.0));

    let (_, compact) = t
        .call("GET", &format!("/stories/{}?compact=1", story_id), &bob_token, None)
        .await;
    assert!(compact["items"][0].get("stickers").is_none());

    let sticker_uri = format!("/stickers/{}", sticker_id);
    let (status, _) = t.call("DELETE", &sticker_uri, &bob_token, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = t.call("DELETE", &sticker_uri, &alice_token, None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = t
        .call("POST", &vote_uri, &bob_token, Some(json!({ "option_index": 0 })))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
