#![allow(dead_code)]

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

pub(crate) fn build_access_token(email: &str) -> String {
    let header = serde_json::json!({
        "alg": "none",
        "typ": "JWT",
    });
    let payload = serde_json::json!({
        "email": email,
    });
    let header = URL_SAFE_NO_PAD.encode(serde_json::to_string(&header).unwrap());
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_string(&payload).unwrap());
    format!("{header}.{payload}.")
}

pub(crate) fn stored_record(client_id: &str, email: &str, expires_at: &str) -> serde_json::Value {
    serde_json::json!({
        "email": email,
        "accessToken": format!("access-{client_id}"),
        "refreshToken": format!("refresh-{client_id}"),
        "expiresAt": expires_at,
        "region": "us-east-1",
        "clientId": client_id,
        "clientSecret": format!("secret-{client_id}"),
        "authMethod": "IdC",
        "provider": "BuilderId"
    })
}
