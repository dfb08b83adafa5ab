use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, Path, Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

mod area;
mod class;
mod config;
mod data;
mod db;
mod game;
mod item;
mod npc;
mod player;
mod protocol;
mod responder;
mod script;
mod shop;

use area::AreaMap;
use class::{CharacterClass, Realm};
use config::ServerConfig;
use data::ItemRegistry;
use db::{CharacterData, Database, NewCharacter};
use game::{GameRoom, RoomContent};
use player::Position;
use protocol::ClientMessage;
use script::ScriptRegistry;
use shop::ShopRegistry;

// ============================================================================
// App State
// ============================================================================

/// Game session data for a connected player
#[derive(Clone)]
struct GameSession {
    room_id: String,
    player_id: String,
    character_name: String,
    auth_token: String, // Token used for this session (for validation)
}

#[derive(Clone)]
struct AppState {
    rooms: Arc<DashMap<String, Arc<GameRoom>>>,
    // Session ID -> GameSession
    sessions: Arc<DashMap<String, GameSession>>,
    auth_sessions: AuthSessions,
    db: Arc<Database>,
    auth_rate_limiter: RateLimiter,
    matchmake_rate_limiter: RateLimiter,
    token_signer: SessionTokenSigner,
    content: RoomContent,
}

impl AppState {
    async fn new(settings: ServerConfig) -> Result<Self, String> {
        let db = Database::new(&settings.database_url)
            .await
            .map_err(|e| format!("Failed to initialize database: {}", e))?;

        let data_dir = settings.data_dir.clone();

        let mut items = ItemRegistry::new();
        items.load_from_directory(&data_dir)?;
        let items = Arc::new(items);

        let mut shops = ShopRegistry::new();
        shops.load_from_directory(&data_dir.join("shops"))?;
        let missing = shops.check_stock(&items);
        if missing > 0 {
            warn!("{} catalog entries name unknown items", missing);
        }

        let scripts = Arc::new(ScriptRegistry::new(&data_dir, items.clone())?);
        let areas = AreaMap::load_from_directory(&data_dir)?;
        let spawns = npc::load_spawns(&data_dir)?;
        info!(
            "Content ready: {} items, {} catalogs, {} NPC spawns",
            items.len(),
            shops.len(),
            spawns.len()
        );

        // Hot-reload script tables in development builds
        #[cfg(debug_assertions)]
        {
            match scripts.start_file_watcher() {
                Ok(mut rx) => {
                    tokio::spawn(async move {
                        while let Some(event) = rx.recv().await {
                            match event {
                                script::HotReloadEvent::Reloaded(path) => {
                                    info!("Script hot-reload: {}", path);
                                }
                                script::HotReloadEvent::Error(e) => {
                                    error!("Script hot-reload error: {}", e);
                                }
                            }
                        }
                    });
                    info!("Script hot-reload enabled");
                }
                Err(e) => {
                    warn!("Failed to start script hot-reload: {}", e);
                }
            }
        }

        Ok(Self {
            rooms: Arc::new(DashMap::new()),
            sessions: Arc::new(DashMap::new()),
            auth_sessions: Arc::new(DashMap::new()),
            db: Arc::new(db),
            // Auth: 10 attempts per 60 seconds per IP
            auth_rate_limiter: RateLimiter::new(10, 60),
            // Matchmaking: 20 attempts per 60 seconds per IP
            matchmake_rate_limiter: RateLimiter::new(20, 60),
            token_signer: SessionTokenSigner::new(),
            content: RoomContent {
                settings: Arc::new(settings),
                items,
                scripts,
                shops: Arc::new(shops),
                areas: Arc::new(areas),
                spawns: Arc::new(spawns),
            },
        })
    }

    fn get_or_create_room(&self, room_name: &str) -> Arc<GameRoom> {
        for room in self.rooms.iter() {
            if room.name == room_name {
                return room.clone();
            }
        }

        let room = Arc::new(GameRoom::new(room_name, self.content.clone(), Some(self.db.clone())));
        self.rooms.insert(room.id.clone(), room.clone());
        room
    }

    /// Where a new character of this realm first appears
    async fn start_position(&self, realm: Realm) -> Position {
        let book = self.content.scripts.current().await;
        let teleporter = &book.teleporter;
        teleporter
            .capitals_for(realm)
            .and_then(|capitals| capitals.first())
            .and_then(|capital| teleporter.destination(realm, capital))
            .map(|d| Position::new(d.region, d.x, d.y, d.z, d.heading))
            .unwrap_or_default()
    }
}

// ============================================================================
// HTTP Handlers - Authentication
// ============================================================================

/// Auth sessions: token -> (account_id, username)
type AuthSessions = Arc<DashMap<String, (i64, String)>>;

/// Rate limiter entry: (request_count, window_start_time)
type RateLimitEntry = (u32, std::time::Instant);

// ============================================================================
// Signed Session Tokens
// ============================================================================

type HmacSha256 = Hmac<Sha256>;

/// Session token validity duration
const SESSION_TOKEN_EXPIRY_SECS: u64 = 300;

fn unix_secs() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
}

/// Signs the tokens a client trades for a WebSocket upgrade
#[derive(Clone)]
struct SessionTokenSigner {
    /// Secret key for HMAC signing (generated at startup)
    secret: Vec<u8>,
}

impl SessionTokenSigner {
    fn new() -> Self {
        use rand::RngCore;
        let mut secret = vec![0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);
        Self { secret }
    }

    fn mac(&self, payload: &str) -> Option<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.secret).ok()?;
        mac.update(payload.as_bytes());
        Some(mac)
    }

    /// Format: base64(session_id:room_id:expiry:signature)
    fn create_token(&self, session_id: &str, room_id: &str) -> Option<String> {
        self.create_token_expiring(session_id, room_id, unix_secs() + SESSION_TOKEN_EXPIRY_SECS)
    }

    fn create_token_expiring(&self, session_id: &str, room_id: &str, expiry: u64) -> Option<String> {
        use base64::Engine;

        let payload = format!("{}:{}:{}", session_id, room_id, expiry);
        let signature = self.mac(&payload)?.finalize().into_bytes();

        let token_data = format!("{}:{}", payload, base64::engine::general_purpose::STANDARD.encode(signature));
        Some(base64::engine::general_purpose::URL_SAFE.encode(token_data))
    }

    /// Returns (session_id, room_id) for a valid, unexpired token
    fn validate_token(&self, token: &str) -> Option<(String, String)> {
        use base64::Engine;

        let token_data = base64::engine::general_purpose::URL_SAFE.decode(token).ok()?;
        let token_str = String::from_utf8(token_data).ok()?;

        let mut parts = token_str.splitn(4, ':');
        let session_id = parts.next()?;
        let room_id = parts.next()?;
        let expiry: u64 = parts.next()?.parse().ok()?;
        let signature_b64 = parts.next()?;

        let now = unix_secs();
        if now > expiry {
            warn!("Session token expired: {} > {}", now, expiry);
            return None;
        }

        let payload = format!("{}:{}:{}", session_id, room_id, expiry);
        let signature = base64::engine::general_purpose::STANDARD.decode(signature_b64).ok()?;
        if self.mac(&payload)?.verify_slice(&signature).is_err() {
            warn!("Session token signature invalid");
            return None;
        }

        Some((session_id.to_string(), room_id.to_string()))
    }
}

/// Simple IP-based rate limiter
#[derive(Clone)]
struct RateLimiter {
    /// IP -> (request_count, window_start)
    entries: Arc<DashMap<String, RateLimitEntry>>,
    max_requests: u32,
    window_duration: Duration,
}

impl RateLimiter {
    fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            max_requests,
            window_duration: Duration::from_secs(window_secs),
        }
    }

    /// Returns false once the caller is over the limit for the current window
    fn check(&self, ip: &str) -> bool {
        let now = std::time::Instant::now();

        let mut entry = self.entries.entry(ip.to_string()).or_insert((0, now));
        let (count, window_start) = entry.value_mut();

        if now.duration_since(*window_start) > self.window_duration {
            *count = 0;
            *window_start = now;
        }

        if *count >= self.max_requests {
            return false;
        }

        *count += 1;
        true
    }

    /// Failed logins count double
    fn record_failure(&self, ip: &str) {
        let now = std::time::Instant::now();
        let mut entry = self.entries.entry(ip.to_string()).or_insert((0, now));
        let (count, _) = entry.value_mut();
        *count = (*count).saturating_add(2);
    }
}

#[derive(Deserialize)]
struct AuthRequest {
    username: String,
    password: String,
}

#[derive(Serialize)]
struct AuthResponse {
    success: bool,
    token: Option<String>,
    username: Option<String>,
    error: Option<String>,
}

impl AuthResponse {
    fn ok(token: String, username: String) -> Json<Self> {
        Json(Self { success: true, token: Some(token), username: Some(username), error: None })
    }

    fn failed(error: impl Into<String>) -> Json<Self> {
        Json(Self { success: false, token: None, username: None, error: Some(error.into()) })
    }
}

async fn register_account(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(req): Json<AuthRequest>,
) -> impl IntoResponse {
    let client_ip = addr.ip().to_string();

    if !state.auth_rate_limiter.check(&client_ip) {
        warn!("Rate limit exceeded for registration from {}", client_ip);
        return AuthResponse::failed("Too many requests. Please try again later.");
    }

    if req.username.len() < 3 {
        return AuthResponse::failed("Username must be at least 3 characters");
    }
    if req.password.len() < 6 {
        return AuthResponse::failed("Password must be at least 6 characters");
    }

    match state.db.create_account(&req.username, &req.password).await {
        Ok(account_id) => {
            let token = Uuid::new_v4().to_string();
            state.auth_sessions.insert(token.clone(), (account_id, req.username.clone()));
            info!("Account registered: {} (id: {}) from {}", req.username, account_id, client_ip);
            AuthResponse::ok(token, req.username)
        }
        Err(e) => AuthResponse::failed(e),
    }
}

async fn login_account(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(req): Json<AuthRequest>,
) -> impl IntoResponse {
    let client_ip = addr.ip().to_string();

    if !state.auth_rate_limiter.check(&client_ip) {
        warn!("Rate limit exceeded for login from {}", client_ip);
        return AuthResponse::failed("Too many login attempts. Please try again later.");
    }

    match state.db.verify_account_password(&req.username, &req.password).await {
        Some(account) => {
            let token = Uuid::new_v4().to_string();
            state.auth_sessions.insert(token.clone(), (account.id, req.username.clone()));
            info!("Account logged in: {} (id: {}) from {}", req.username, account.id, client_ip);
            AuthResponse::ok(token, req.username)
        }
        None => {
            state.auth_rate_limiter.record_failure(&client_ip);
            warn!("Failed login attempt for '{}' from {}", req.username, client_ip);
            AuthResponse::failed("Invalid username or password")
        }
    }
}

async fn logout_account(State(state): State<AppState>, headers: axum::http::HeaderMap) -> impl IntoResponse {
    if let Some(token) = bearer_token(&headers) {
        state.auth_sessions.remove(token);
    }
    Json(serde_json::json!({ "success": true }))
}

fn bearer_token(headers: &axum::http::HeaderMap) -> Option<&str> {
    headers.get("Authorization")?.to_str().ok()?.strip_prefix("Bearer ")
}

fn extract_auth(headers: &axum::http::HeaderMap, sessions: &AuthSessions) -> Option<(i64, String)> {
    let token = bearer_token(headers)?;
    sessions.get(token).map(|r| r.value().clone())
}

// ============================================================================
// HTTP Handlers - Characters
// ============================================================================

const MAX_CHARACTERS_PER_ACCOUNT: i64 = 3;

/// Highest level a character may be created at
const MAX_START_LEVEL: u8 = 50;

#[derive(Serialize)]
struct CharacterInfo {
    id: i64,
    name: String,
    class: String,
    realm: String,
    race: String,
    level: i64,
    #[serde(rename = "mlLevel")]
    ml_level: i64,
    region: i64,
}

impl From<CharacterData> for CharacterInfo {
    fn from(c: CharacterData) -> Self {
        let class = u8::try_from(c.class_id)
            .ok()
            .and_then(CharacterClass::from_id)
            .map(|class| class.name().to_string())
            .unwrap_or_default();
        Self {
            id: c.id,
            name: c.name,
            class,
            realm: c.realm,
            race: c.race,
            level: c.level,
            ml_level: c.ml_level,
            region: c.region,
        }
    }
}

#[derive(Serialize)]
struct CharacterListResponse {
    success: bool,
    characters: Option<Vec<CharacterInfo>>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct CreateCharacterRequest {
    name: String,
    class: String,
    realm: String,
    race: String,
    level: Option<u8>,
}

#[derive(Serialize)]
struct CreateCharacterResponse {
    success: bool,
    character: Option<CharacterInfo>,
    error: Option<String>,
}

fn create_failed(status: StatusCode, error: impl Into<String>) -> (StatusCode, Json<CreateCharacterResponse>) {
    (
        status,
        Json(CreateCharacterResponse { success: false, character: None, error: Some(error.into()) }),
    )
}

#[derive(Serialize)]
struct DeleteCharacterResponse {
    success: bool,
    error: Option<String>,
}

/// GET /api/characters
async fn list_characters(State(state): State<AppState>, headers: axum::http::HeaderMap) -> impl IntoResponse {
    let Some((account_id, _username)) = extract_auth(&headers, &state.auth_sessions) else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(CharacterListResponse {
                success: false,
                characters: None,
                error: Some("Not authenticated".to_string()),
            }),
        );
    };

    match state.db.get_characters_for_account(account_id).await {
        Ok(chars) => (
            StatusCode::OK,
            Json(CharacterListResponse {
                success: true,
                characters: Some(chars.into_iter().map(CharacterInfo::from).collect()),
                error: None,
            }),
        ),
        Err(e) => {
            error!("Failed to list characters for account {}: {}", account_id, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(CharacterListResponse {
                    success: false,
                    characters: None,
                    error: Some("Failed to list characters".to_string()),
                }),
            )
        }
    }
}

/// POST /api/characters
async fn create_character(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    Json(req): Json<CreateCharacterRequest>,
) -> impl IntoResponse {
    let Some((account_id, _username)) = extract_auth(&headers, &state.auth_sessions) else {
        return create_failed(StatusCode::UNAUTHORIZED, "Not authenticated");
    };

    let name = req.name.trim();
    if name.len() < 2 {
        return create_failed(StatusCode::BAD_REQUEST, "Character name must be at least 2 characters");
    }
    if name.len() > 16 {
        return create_failed(StatusCode::BAD_REQUEST, "Character name must be at most 16 characters");
    }

    let Some(realm) = Realm::from_name(&req.realm).filter(|r| *r != Realm::None) else {
        return create_failed(StatusCode::BAD_REQUEST, format!("Unknown realm '{}'", req.realm));
    };
    let Some(class) = CharacterClass::from_name(&req.class) else {
        return create_failed(StatusCode::BAD_REQUEST, format!("Unknown class '{}'", req.class));
    };
    if class.realm() != realm {
        return create_failed(
            StatusCode::BAD_REQUEST,
            format!("{} is not a {} class", class.name(), realm.as_str()),
        );
    }
    let race = req.race.trim();
    if race.is_empty() {
        return create_failed(StatusCode::BAD_REQUEST, "Race is required");
    }
    let level = req.level.unwrap_or(1);
    if level == 0 || level > MAX_START_LEVEL {
        return create_failed(
            StatusCode::BAD_REQUEST,
            format!("Level must be between 1 and {}", MAX_START_LEVEL),
        );
    }

    match state.db.count_characters_for_account(account_id).await {
        Ok(count) if count >= MAX_CHARACTERS_PER_ACCOUNT => {
            return create_failed(
                StatusCode::BAD_REQUEST,
                format!("Character limit reached (max {})", MAX_CHARACTERS_PER_ACCOUNT),
            );
        }
        Err(e) => {
            error!("Failed to count characters: {}", e);
            return create_failed(StatusCode::INTERNAL_SERVER_ERROR, "Failed to check character count");
        }
        _ => {}
    }

    let new = NewCharacter {
        name,
        class,
        race,
        level,
        start: state.start_position(realm).await,
    };
    match state.db.create_character(account_id, &new).await {
        Ok(char_data) => {
            info!(
                "Created {} {} '{}' for account {}",
                realm.as_str(),
                class.name(),
                name,
                account_id
            );
            (
                StatusCode::CREATED,
                Json(CreateCharacterResponse {
                    success: true,
                    character: Some(CharacterInfo::from(char_data)),
                    error: None,
                }),
            )
        }
        Err(e) => {
            let status = if e.contains("already exists") {
                StatusCode::CONFLICT
            } else {
                StatusCode::BAD_REQUEST
            };
            create_failed(status, e)
        }
    }
}

/// DELETE /api/characters/:id
async fn delete_character(
    State(state): State<AppState>,
    Path(character_id): Path<i64>,
    headers: axum::http::HeaderMap,
) -> impl IntoResponse {
    let Some((account_id, _username)) = extract_auth(&headers, &state.auth_sessions) else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(DeleteCharacterResponse { success: false, error: Some("Not authenticated".to_string()) }),
        );
    };

    match state.db.delete_character(character_id, account_id).await {
        Ok(true) => {
            info!("Deleted character {} for account {}", character_id, account_id);
            (StatusCode::OK, Json(DeleteCharacterResponse { success: true, error: None }))
        }
        // Missing, or owned by another account
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(DeleteCharacterResponse { success: false, error: Some("Character not found".to_string()) }),
        ),
        Err(e) => {
            error!("Failed to delete character {}: {}", character_id, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(DeleteCharacterResponse {
                    success: false,
                    error: Some("Failed to delete character".to_string()),
                }),
            )
        }
    }
}

// ============================================================================
// HTTP Handlers - Matchmaking
// ============================================================================

#[derive(Deserialize)]
struct JoinOptions {
    #[serde(rename = "characterId")]
    character_id: i64,
}

#[derive(Serialize)]
struct MatchmakeResponse {
    room: RoomInfo,
    /// Signed session token for WebSocket upgrade (expires in 5 minutes)
    #[serde(rename = "sessionToken")]
    session_token: String,
}

#[derive(Serialize)]
struct RoomInfo {
    #[serde(rename = "roomId")]
    room_id: String,
    name: String,
    clients: usize,
}

fn json_error(status: StatusCode, error: &str) -> axum::response::Response {
    (status, Json(serde_json::json!({ "error": error }))).into_response()
}

async fn matchmake_join_or_create(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(room_name): Path<String>,
    headers: axum::http::HeaderMap,
    Json(options): Json<JoinOptions>,
) -> impl IntoResponse {
    let client_ip = addr.ip().to_string();

    if !state.matchmake_rate_limiter.check(&client_ip) {
        warn!("Rate limit exceeded for matchmaking from {}", client_ip);
        return json_error(StatusCode::TOO_MANY_REQUESTS, "Too many requests. Please try again later.");
    }

    let Some(auth_token) = bearer_token(&headers).map(str::to_string) else {
        warn!("Matchmaking rejected: missing or malformed Authorization header");
        return json_error(StatusCode::UNAUTHORIZED, "Authorization required. Please login first.");
    };

    let Some((account_id, _username)) = state.auth_sessions.get(&auth_token).map(|a| a.clone()) else {
        warn!("Matchmaking rejected: Invalid or expired token");
        return json_error(StatusCode::UNAUTHORIZED, "Invalid or expired token. Please login again.");
    };

    let character_id = options.character_id;
    let character_data = match state.db.get_character(character_id).await {
        Ok(Some(c)) if c.account_id == account_id => c,
        Ok(Some(_)) => {
            warn!(
                "Matchmaking rejected: Character {} does not belong to account {}",
                character_id, account_id
            );
            return json_error(StatusCode::FORBIDDEN, "Character does not belong to this account");
        }
        Ok(None) => {
            warn!("Matchmaking rejected: Character {} not found", character_id);
            return json_error(StatusCode::NOT_FOUND, "Character not found");
        }
        Err(e) => {
            error!("Failed to load character {}: {}", character_id, e);
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load character");
        }
    };

    let player_id = format!("char_{}", character_id);
    let character_name = character_data.name.clone();
    let player = match character_data.into_player(&player_id) {
        Ok(player) => player,
        Err(e) => {
            error!("Failed to load character {}: {}", character_id, e);
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load character");
        }
    };

    let room = state.get_or_create_room(&room_name);
    let room_id = room.id.clone();
    let session_id = Uuid::new_v4().to_string();

    let Some(session_token) = state.token_signer.create_token(&session_id, &room_id) else {
        error!("Failed to sign session token");
        return json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create session");
    };

    state.sessions.insert(
        session_id,
        GameSession {
            room_id: room_id.clone(),
            player_id,
            character_name: character_name.clone(),
            auth_token,
        },
    );
    room.reserve_player(player).await;

    info!("Matchmaking: room={}, character={} (id: {})", room_id, character_name, character_id);

    Json(MatchmakeResponse {
        room: RoomInfo {
            room_id,
            name: room_name,
            clients: room.player_count().await,
        },
        session_token,
    })
    .into_response()
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().timestamp_millis()
    }))
}

// ============================================================================
// WebSocket Handler
// ============================================================================

#[derive(Deserialize)]
struct WsQuery {
    #[serde(rename = "sessionToken")]
    session_token: String,
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(room_id): Path<String>,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let session_id = match state.token_signer.validate_token(&query.session_token) {
        Some((sid, rid)) if rid == room_id => sid,
        Some((_, rid)) => {
            warn!("WebSocket rejected: Token room_id mismatch ({} != {})", rid, room_id);
            return (StatusCode::FORBIDDEN, "Invalid session token: room mismatch").into_response();
        }
        None => {
            warn!("WebSocket rejected: Invalid or expired session token");
            return (StatusCode::UNAUTHORIZED, "Invalid or expired session token").into_response();
        }
    };

    match state.sessions.get(&session_id).map(|s| s.clone()) {
        Some(session) if session.room_id == room_id => {
            if !state.auth_sessions.contains_key(&session.auth_token) {
                warn!("WebSocket rejected: Auth token expired for session {}", session_id);
                return (StatusCode::UNAUTHORIZED, "Auth token expired. Please login again.").into_response();
            }
            ws.on_upgrade(move |socket| handle_socket(socket, state, session_id, session))
        }
        _ => {
            warn!("Invalid session: {} for room {}", session_id, room_id);
            (StatusCode::FORBIDDEN, "Invalid session").into_response()
        }
    }
}

async fn handle_socket(socket: WebSocket, state: AppState, session_id: String, session: GameSession) {
    let GameSession { room_id, player_id, character_name, auth_token } = session;
    let (mut sender, mut receiver) = socket.split();

    let Some(room) = state.rooms.get(&room_id).map(|r| r.clone()) else {
        error!("Room not found: {}", room_id);
        return;
    };

    info!("Character {} ({}) connected to room {}", character_name, player_id, room_id);

    let mut broadcast_rx = room.subscribe();

    for msg in room.welcome_messages(&player_id).await {
        match protocol::encode_server_message(&msg) {
            Ok(bytes) => {
                if sender.send(Message::Binary(bytes)).await.is_err() {
                    return;
                }
            }
            Err(e) => error!("Failed to encode {}: {}", msg.msg_type(), e),
        }
    }

    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(64);
    room.register_player_sender(&player_id, tx).await;

    let mut send_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                direct = rx.recv() => {
                    // Sender dropped: the room disconnected this player
                    let Some(bytes) = direct else { break };
                    if sender.send(Message::Binary(bytes)).await.is_err() {
                        break;
                    }
                }
                Ok(msg) = broadcast_rx.recv() => {
                    if let Ok(bytes) = protocol::encode_server_message(&msg) {
                        if sender.send(Message::Binary(bytes)).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }
        let _ = sender.close().await;
    });

    let room_clone = room.clone();
    let player_id_clone = player_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Binary(data) => {
                    if let Err(e) = handle_client_message(&room_clone, &player_id_clone, &data).await {
                        warn!("Error handling message from {}: {}", player_id_clone, e);
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!("Character {} disconnected from room {}", character_name, room_id);

    room.unregister_player_sender(&player_id).await;
    let auth_valid = state.auth_sessions.contains_key(&auth_token);
    state.sessions.remove(&session_id);

    if let Some(player) = room.remove_player(&player_id).await {
        if auth_valid {
            match state.db.save_character(&player).await {
                Ok(()) => info!("Saved character {} on disconnect", character_name),
                Err(e) => error!("Failed to save character {} on disconnect: {}", character_name, e),
            }
        } else {
            warn!("Skipping save for {} on disconnect: invalid auth", character_name);
        }
    }
}

async fn handle_client_message(room: &GameRoom, player_id: &str, data: &[u8]) -> Result<(), String> {
    match protocol::decode_client_message(data)? {
        ClientMessage::Move { region, x, y, z, heading } => {
            room.handle_move(player_id, region, x, y, z, heading).await;
        }
        ClientMessage::Interact { npc_id } => room.handle_interact(player_id, &npc_id).await,
        ClientMessage::Whisper { npc_id, text } => room.handle_whisper(player_id, &npc_id, &text).await,
        ClientMessage::GiveItem { npc_id, slot } => room.handle_give_item(player_id, &npc_id, slot).await,
        ClientMessage::Buy { npc_id, item_id, quantity } => {
            room.handle_buy(player_id, &npc_id, &item_id, quantity).await;
        }
        ClientMessage::Attack { npc_id } => room.handle_attack(player_id, &npc_id).await,
        ClientMessage::Pickup { ground_item_id } => room.handle_pickup(player_id, &ground_item_id).await,
        ClientMessage::SummonHelper => room.handle_summon_helper(player_id).await,
    }
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("customnpc_server=info".parse().expect("valid log directive")),
        )
        .init();

    let settings = ServerConfig::load().expect("Failed to load server config");
    let port = settings.port;
    let autosave_secs = settings.autosave_secs.max(1);
    let state = AppState::new(settings).await.expect("Failed to start server");

    // Spawn maintenance tick loop (1 Hz)
    let tick_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        loop {
            interval.tick().await;
            let rooms: Vec<Arc<GameRoom>> = tick_state.rooms.iter().map(|r| r.clone()).collect();
            for room in rooms {
                room.tick().await;
            }
        }
    });

    // Spawn auto-save loop
    let save_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(autosave_secs));
        loop {
            interval.tick().await;

            let rooms: Vec<Arc<GameRoom>> = save_state.rooms.iter().map(|r| r.clone()).collect();
            let mut saved_count = 0;
            for room in rooms {
                for player in room.all_player_snapshots().await {
                    match save_state.db.save_character(&player).await {
                        Ok(()) => saved_count += 1,
                        Err(e) => warn!("Auto-save failed for character {}: {}", player.name, e),
                    }
                }
            }

            if saved_count > 0 {
                info!("Auto-saved {} character(s) to database", saved_count);
            }
        }
    });

    let app = Router::new()
        .route("/health", get(health_check))
        // Authentication
        .route("/api/register", post(register_account))
        .route("/api/login", post(login_account))
        .route("/api/logout", post(logout_account))
        // Characters
        .route("/api/characters", get(list_characters).post(create_character))
        .route("/api/characters/:id", delete(delete_character))
        // Matchmaking
        .route("/matchmake/joinOrCreate/:room", post(matchmake_join_or_create))
        // WebSocket
        .route("/:room_id", get(ws_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::DELETE,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers([axum::http::header::CONTENT_TYPE, axum::http::header::AUTHORIZATION]),
        )
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Custom NPC server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.expect("Failed to bind listener");
    if let Err(e) = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await {
        error!("Server error: {}", e);
    }
}
