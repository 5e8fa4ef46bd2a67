use base64::Engine as _;
use std::sync::Arc;
use tempfile::TempDir;
use tidal_session::auth::CredentialStore;
use tidal_session::storage::FileSettings;

#[allow(dead_code)]
pub fn temp_credential_store() -> (CredentialStore, TempDir) {
    let tmp = TempDir::new().expect("failed to create tempdir");
    let settings = FileSettings::open(tmp.path().join("settings.json"))
        .expect("failed to open settings file");
    (CredentialStore::new(Arc::new(settings)), tmp)
}

/// A token endpoint response body with all fields present.
#[allow(dead_code)]
pub fn token_body(access_token: &str, refresh_token: &str, expires_in: i64) -> serde_json::Value {
    serde_json::json!({
        "access_token": access_token,
        "refresh_token": refresh_token,
        "token_type": "Bearer",
        "expires_in": expires_in,
    })
}

/// A JSON:API user document as returned by `GET /users/me`.
#[allow(dead_code)]
pub fn profile_body(id: &str, username: &str) -> serde_json::Value {
    serde_json::json!({
        "data": {
            "id": id,
            "type": "users",
            "attributes": {
                "username": username,
                "email": format!("{username}@example.com"),
                "country": "NO",
            }
        }
    })
}

/// The `Authorization` header value for HTTP basic client authentication.
#[allow(dead_code)]
pub fn basic_auth_header(client_id: &str, client_secret: &str) -> String {
    let encoded = base64::engine::general_purpose::STANDARD
        .encode(format!("{client_id}:{client_secret}"));
    format!("Basic {encoded}")
}
