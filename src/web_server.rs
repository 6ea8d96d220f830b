use std::{convert::Infallible, net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    serve, Json, Router,
};
use futures::future::BoxFuture;
use minijinja::{path_loader, Environment};
use minijinja_autoreload::AutoReloader;
use serde::{Deserialize, Serialize};
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{debug, error, info, warn};

use crate::chat::{Conversation, PendingTurn};
use crate::config::ChatConfig;
use crate::error::GenerationError;
use crate::gemini::Generator;
use crate::locale::Locale;
use crate::menu::{MenuItem, MenuStore};
use crate::message::ChatMessage;
use crate::preferences::{remember_locale, PreferenceStore, Preferences};

/// Events sent by the browser over the chat WebSocket.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    Submit { text: String },
    Reset,
    SetLocale { locale: Locale },
}

/// Events pushed to the browser.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Full transcript, sent once when the socket opens.
    Transcript { locale: Locale, messages: Vec<ChatMessage> },
    Message { message: ChatMessage },
    /// A rejected submission or protocol problem. No state changed.
    Notice { kind: String, text: String },
    Pending { value: bool },
    /// Transcript wiped by a reset or a language switch.
    Cleared { locale: Locale },
}

/// The generation call of the turn currently in flight. Dropping it cancels
/// the request.
pub type ReplyFuture = BoxFuture<'static, (PendingTurn, Result<String, GenerationError>)>;

/// One browser tab's chat: a [`Conversation`] plus the collaborators it
/// needs. Socket I/O stays outside so the event handling is testable.
pub struct ChatSession {
    conversation: Conversation,
    generator: Arc<dyn Generator>,
    preferences: Arc<dyn PreferenceStore>,
}

impl ChatSession {
    pub fn new(
        conversation: Conversation,
        generator: Arc<dyn Generator>,
        preferences: Arc<dyn PreferenceStore>,
    ) -> Self {
        Self {
            conversation,
            generator,
            preferences,
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Opening events: the (empty) transcript followed by the seed question.
    pub fn start(&mut self, in_flight: &mut Option<ReplyFuture>) -> Vec<ServerEvent> {
        let mut events = vec![ServerEvent::Transcript {
            locale: self.conversation.locale(),
            messages: self.conversation.messages().to_vec(),
        }];
        events.extend(self.seed(in_flight));
        events
    }

    pub fn handle(&mut self, event: ClientEvent, in_flight: &mut Option<ReplyFuture>) -> Vec<ServerEvent> {
        match event {
            ClientEvent::Submit { text } => match self.conversation.begin_turn(&text) {
                Ok(turn) => self.launch(turn, in_flight),
                Err(rejection) => {
                    debug!(kind = rejection.kind(), "Submission rejected");
                    vec![ServerEvent::Notice {
                        kind: rejection.kind().to_string(),
                        text: rejection.notice(self.conversation.locale()),
                    }]
                }
            },
            ClientEvent::Reset => {
                *in_flight = None;
                self.conversation.clear();
                let mut events = vec![ServerEvent::Cleared {
                    locale: self.conversation.locale(),
                }];
                events.extend(self.seed(in_flight));
                events
            }
            ClientEvent::SetLocale { locale } => {
                *in_flight = None;
                self.conversation.set_locale(locale);
                remember_locale(self.preferences.as_ref(), locale);
                let mut events = vec![ServerEvent::Cleared { locale }];
                events.extend(self.seed(in_flight));
                events
            }
        }
    }

    /// Record the outcome of the in-flight turn.
    pub fn complete(&mut self, turn: PendingTurn, outcome: Result<String, GenerationError>) -> Vec<ServerEvent> {
        match self.conversation.finish_turn(turn, outcome) {
            Some(reply) => vec![
                ServerEvent::Message { message: reply.clone() },
                ServerEvent::Pending { value: false },
            ],
            None => Vec::new(),
        }
    }

    fn seed(&mut self, in_flight: &mut Option<ReplyFuture>) -> Vec<ServerEvent> {
        match self.conversation.begin_seed() {
            Ok(turn) => self.launch(turn, in_flight),
            Err(rejection) => {
                error!("Seed question rejected: {}", rejection);
                Vec::new()
            }
        }
    }

    fn launch(&mut self, turn: PendingTurn, in_flight: &mut Option<ReplyFuture>) -> Vec<ServerEvent> {
        let mut events = Vec::with_capacity(2);
        if let Some(user) = self.conversation.messages().last() {
            events.push(ServerEvent::Message { message: user.clone() });
        }
        events.push(ServerEvent::Pending { value: true });

        let generator = self.generator.clone();
        *in_flight = Some(Box::pin(async move {
            let outcome = generator.generate(&turn.prompt, turn.locale).await;
            (turn, outcome)
        }));
        events
    }

}

// Shared application state
#[derive(Clone)]
pub struct AppState {
    templates: Arc<AutoReloader>,
    menu: Arc<MenuStore>,
    generator: Arc<dyn Generator>,
    preferences: Arc<dyn PreferenceStore>,
    chat_config: ChatConfig,
}

impl AppState {
    pub fn new(
        templates_dir: impl Into<PathBuf>,
        menu: Arc<MenuStore>,
        generator: Arc<dyn Generator>,
        preferences: Arc<dyn PreferenceStore>,
        chat_config: ChatConfig,
    ) -> Self {
        Self {
            templates: Arc::new(create_minijinja_env(templates_dir.into())),
            menu,
            generator,
            preferences,
            chat_config,
        }
    }

    fn load_preferences(&self) -> Preferences {
        self.preferences.load().unwrap_or_else(|e| {
            warn!("Failed to load preferences, using defaults: {}", e);
            Preferences::default()
        })
    }

    fn new_session(&self) -> ChatSession {
        let locale = self.load_preferences().locale_or_default();
        let conversation = Conversation::new(self.menu.clone(), self.chat_config.clone(), locale);
        ChatSession::new(conversation, self.generator.clone(), self.preferences.clone())
    }
}

// Minijinja Environment setup
fn create_minijinja_env(templates_dir: PathBuf) -> AutoReloader {
    AutoReloader::new(move |notifier| {
        let mut env = Environment::new();
        env.set_loader(path_loader(&templates_dir));
        notifier.watch_path(&templates_dir, true);
        Ok(env)
    })
}

fn render_index(state: &AppState) -> Result<String, minijinja::Error> {
    let prefs = state.load_preferences();
    let locale = prefs.locale_or_default();
    let strings = locale.strings();
    let env = state.templates.acquire_env()?;
    let tmpl = env.get_template("index.html")?;
    tmpl.render(minijinja::context! {
        title => strings.page_title,
        locale => locale.tag(),
        locales => Locale::ALL.iter().map(|l| l.tag()).collect::<Vec<_>>(),
        theme => prefs.theme(),
        placeholder => strings.input_placeholder,
        send_label => strings.send_label,
        reset_label => strings.reset_label,
        typing_label => strings.typing_label,
        max_input_chars => state.chat_config.max_input_chars,
    })
}

async fn index_handler(State(state): State<AppState>) -> Result<Html<String>, (StatusCode, Html<String>)> {
    render_index(&state).map(Html).map_err(|e| {
        error!("Failed to get or render template: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Html(format!("Internal Server Error: {}", e)),
        )
    })
}

async fn menu_handler(State(state): State<AppState>) -> Json<Vec<MenuItem>> {
    Json(state.menu.items().to_vec())
}

async fn get_preferences_handler(State(state): State<AppState>) -> Response {
    match state.preferences.load() {
        Ok(prefs) => Json(prefs).into_response(),
        Err(e) => {
            error!("Failed to load preferences: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn put_preferences_handler(State(state): State<AppState>, Json(prefs): Json<Preferences>) -> Response {
    match state.preferences.save(&prefs) {
        Ok(()) => Json(prefs).into_response(),
        Err(e) => {
            error!("Failed to save preferences: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn health_handler() -> &'static str {
    "ok"
}

// WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    info!("WebSocket connection upgrade requested");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn send_events(socket: &mut WebSocket, events: Vec<ServerEvent>) -> bool {
    for event in events {
        let json = match serde_json::to_string(&event) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize server event: {}", e);
                continue;
            }
        };
        if socket.send(Message::Text(json)).await.is_err() {
            warn!("WebSocket client disconnected or send error. Closing connection.");
            return false;
        }
    }
    true
}

async fn wait_for_reply(in_flight: &mut Option<ReplyFuture>) -> (PendingTurn, Result<String, GenerationError>) {
    match in_flight {
        Some(reply) => reply.await,
        None => std::future::pending().await,
    }
}

// Each connection is its own chat session, owned by this task alone.
async fn handle_socket(mut socket: WebSocket, state: AppState) {
    info!("New WebSocket connection established");
    let mut session = state.new_session();
    let mut in_flight: Option<ReplyFuture> = None;

    let events = session.start(&mut in_flight);
    if !send_events(&mut socket, events).await {
        return;
    }

    loop {
        let events = tokio::select! {
            (turn, outcome) = wait_for_reply(&mut in_flight) => {
                in_flight = None;
                session.complete(turn, outcome)
            }

            msg = socket.recv() => match msg {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientEvent>(&text) {
                    Ok(event) => {
                        debug!(?event, "Received client event");
                        session.handle(event, &mut in_flight)
                    }
                    Err(e) => {
                        warn!("Ignoring malformed client event: {}", e);
                        vec![ServerEvent::Notice {
                            kind: "invalid_event".to_string(),
                            text: e.to_string(),
                        }]
                    }
                },
                Some(Ok(Message::Binary(_))) => {
                    warn!("Received unexpected binary message from client");
                    Vec::new()
                }
                // Axum answers pings itself
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => Vec::new(),
                Some(Ok(Message::Close(_))) => {
                    info!("Client requested WebSocket close");
                    break;
                }
                Some(Err(e)) => {
                    warn!("WebSocket receive error: {}", e);
                    break;
                }
                None => {
                    info!("WebSocket client disconnected");
                    break;
                }
            },
        };
        if !send_events(&mut socket, events).await {
            break;
        }
    }
    info!(
        messages = session.conversation().messages().len(),
        "WebSocket connection closed"
    );
}

pub fn build_router(state: AppState, static_dir: impl Into<PathBuf>) -> Router {
    // Serve static files from the static directory
    let static_files_service = ServeDir::new(static_dir.into()).not_found_service(tower::service_fn(
        |_req: axum::extract::Request| async {
            Ok::<_, Infallible>((StatusCode::NOT_FOUND, "Not Found").into_response())
        },
    ));

    Router::new()
        .route("/", get(index_handler))
        .route("/ws", get(ws_handler))
        .route("/api/menu", get(menu_handler))
        .route(
            "/api/preferences",
            get(get_preferences_handler).put(put_preferences_handler),
        )
        .route("/health", get(health_handler))
        .nest_service("/static", static_files_service)
        .with_state(state)
        .layer(TraceLayer::new_for_http()) // Add request logging
}

pub async fn start_web_server(addr: SocketAddr, state: AppState, static_dir: impl Into<PathBuf>) -> Result<()> {
    let app = build_router(state, static_dir);

    info!("Web server listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context(format!("Failed to bind to address {}", addr))?;

    serve(listener, app.into_make_service())
        .await
        .context("Web server failed")?;

    Ok(())
}
