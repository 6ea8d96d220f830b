use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;
use axum_test::TestServer;
use menubot::preferences::{MemoryPreferenceStore, PreferenceStore, Preferences};
use menubot::web_server::{build_router, AppState};
use menubot::{ChatConfig, GenerationError, Generator, Locale, MenuItem, MenuStore};
use serde_json::json;

struct Silent;

#[async_trait]
impl Generator for Silent {
    async fn generate(&self, _prompt: &str, _locale: Locale) -> Result<String, GenerationError> {
        Ok(String::new())
    }
}

fn server_with(prefs: Arc<MemoryPreferenceStore>) -> TestServer {
    let state = AppState::new(
        concat!(env!("CARGO_MANIFEST_DIR"), "/templates"),
        Arc::new(MenuStore::bundled().unwrap()),
        Arc::new(Silent),
        prefs,
        ChatConfig::default(),
    );
    let app = build_router(state, concat!(env!("CARGO_MANIFEST_DIR"), "/static"));
    TestServer::new(app).unwrap()
}

#[tokio::test]
async fn test_index_renders_in_saved_locale() {
    let prefs = Arc::new(MemoryPreferenceStore::new(Preferences {
        dark_mode: Some(true),
        locale: Some(Locale::En),
    }));
    let server = server_with(prefs);

    let response = server.get("/").await;
    response.assert_status_ok();
    let html = response.text();
    assert!(html.contains("<html lang=\"en\" data-theme=\"dark\">"));
    assert!(html.contains("Menu Assistant"));
    assert!(html.contains("maxlength=\"100\""));
}

#[tokio::test]
async fn test_index_defaults_to_indonesian_and_system_theme() {
    let server = server_with(Arc::new(MemoryPreferenceStore::default()));

    let html = server.get("/").await.text();
    assert!(html.contains("<html lang=\"id\" data-theme=\"auto\">"));
    assert!(html.contains("Tulis pesanmu..."));
}

#[tokio::test]
async fn test_menu_endpoint_lists_bundled_items() {
    let server = server_with(Arc::new(MemoryPreferenceStore::default()));

    let response = server.get("/api/menu").await;
    response.assert_status_ok();
    let items: Vec<MenuItem> = response.json();
    assert_eq!(items, MenuStore::bundled().unwrap().items().to_vec());
}

#[tokio::test]
async fn test_preferences_round_trip() {
    let prefs = Arc::new(MemoryPreferenceStore::default());
    let server = server_with(prefs.clone());

    let response = server
        .put("/api/preferences")
        .json(&json!({"dark_mode": false, "locale": "en"}))
        .await;
    response.assert_status_ok();

    let saved = prefs.load().unwrap();
    assert_eq!(saved.dark_mode, Some(false));
    assert_eq!(saved.locale, Some(Locale::En));

    let loaded: Preferences = server.get("/api/preferences").await.json();
    assert_eq!(loaded, saved);
}

#[tokio::test]
async fn test_unsupported_locale_preference_fails_closed() {
    let prefs = Arc::new(MemoryPreferenceStore::default());
    let server = server_with(prefs.clone());

    server
        .put("/api/preferences")
        .json(&json!({"locale": "tlh"}))
        .await
        .assert_status_ok();
    assert_eq!(prefs.load().unwrap().locale, Some(Locale::Id));
}

#[tokio::test]
async fn test_static_assets_and_health() {
    let server = server_with(Arc::new(MemoryPreferenceStore::default()));

    server.get("/static/chat.js").await.assert_status_ok();
    server
        .get("/static/missing.js")
        .await
        .assert_status(StatusCode::NOT_FOUND);
    assert_eq!(server.get("/health").await.text(), "ok");
}
