use std::{collections::HashMap, io::Write, sync::Arc, time::Duration};

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};
use zip::{write::SimpleFileOptions, CompressionMethod, ZipWriter};

/// Entries served by `/archive`.
pub const ARCHIVE_ENTRIES: &[(&str, &[u8])] = &[
    ("readme.txt", b"fixture archive"),
    ("data/values.csv", b"a,b\n1,2\n"),
];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
}

#[derive(Deserialize)]
pub struct CreateUser {
    pub name: String,
}

pub struct Store {
    users: RwLock<HashMap<i64, User>>,
    files: RwLock<HashMap<String, Vec<u8>>>,
}

pub type Db = Arc<Store>;

pub fn app() -> Router {
    let seed = User {
        id: 1,
        name: "Ana".to_string(),
    };
    let db: Db = Arc::new(Store {
        users: RwLock::new(HashMap::from([(seed.id, seed)])),
        files: RwLock::default(),
    });
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/{id}", get(get_user))
        .route("/redirect/{id}", get(redirect_to_user))
        .route("/status/{code}", get(status))
        .route("/empty", get(empty))
        .route("/invalid-utf8", get(invalid_utf8))
        .route("/delay/{ms}", get(delay))
        .route("/files/{name}", get(get_file).put(put_file))
        .route("/archive", get(archive))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn list_users(State(db): State<Db>) -> Json<Vec<User>> {
    let users = db.users.read().await;
    let mut all: Vec<User> = users.values().cloned().collect();
    all.sort_by_key(|u| u.id);
    Json(all)
}

async fn create_user(State(db): State<Db>, Json(input): Json<CreateUser>) -> (StatusCode, Json<User>) {
    let mut users = db.users.write().await;
    let id = users.keys().max().copied().unwrap_or(0) + 1;
    let user = User { id, name: input.name };
    users.insert(id, user.clone());
    (StatusCode::CREATED, Json(user))
}

async fn get_user(State(db): State<Db>, Path(id): Path<i64>) -> Result<Json<User>, StatusCode> {
    let users = db.users.read().await;
    users.get(&id).cloned().map(Json).ok_or(StatusCode::NOT_FOUND)
}

async fn redirect_to_user(Path(id): Path<i64>) -> impl IntoResponse {
    (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, format!("/users/{id}"))])
}

async fn status(Path(code): Path<u16>) -> Response {
    match StatusCode::from_u16(code) {
        Ok(status) => (status, format!("status {code}")).into_response(),
        Err(_) => StatusCode::BAD_REQUEST.into_response(),
    }
}

async fn empty() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn invalid_utf8() -> Vec<u8> {
    vec![0xff, 0xfe, 0xfd]
}

async fn delay(Path(ms): Path<u64>) -> &'static str {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    "done"
}

async fn get_file(State(db): State<Db>, Path(name): Path<String>) -> Result<Vec<u8>, StatusCode> {
    let files = db.files.read().await;
    files.get(&name).cloned().ok_or(StatusCode::NOT_FOUND)
}

async fn put_file(State(db): State<Db>, Path(name): Path<String>, body: Bytes) -> StatusCode {
    let mut files = db.files.write().await;
    match files.insert(name, body.to_vec()) {
        Some(_) => StatusCode::NO_CONTENT,
        None => StatusCode::CREATED,
    }
}

async fn archive() -> Response {
    match archive_bytes(ARCHIVE_ENTRIES) {
        Ok(bytes) => ([(header::CONTENT_TYPE, "application/zip")], bytes).into_response(),
        Err(e) => {
            tracing::error!("failed to build archive: {e}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Zip `entries` in memory without compression.
pub fn archive_bytes(entries: &[(&str, &[u8])]) -> zip::result::ZipResult<Vec<u8>> {
    let mut writer = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    for (name, data) in entries {
        writer.start_file(*name, options)?;
        writer.write_all(data)?;
    }
    Ok(writer.finish()?.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_serializes_to_fixture_json() {
        let user = User {
            id: 1,
            name: "Ana".to_string(),
        };
        let json = serde_json::to_string(&user).unwrap();
        assert_eq!(json, r#"{"id":1,"name":"Ana"}"#);
    }

    #[test]
    fn create_user_rejects_missing_name() {
        let result: Result<CreateUser, _> = serde_json::from_str(r#"{}"#);
        assert!(result.is_err());
    }

    #[test]
    fn archive_contains_every_entry() {
        let bytes = archive_bytes(ARCHIVE_ENTRIES).unwrap();
        let archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), ARCHIVE_ENTRIES.len());
    }
}
