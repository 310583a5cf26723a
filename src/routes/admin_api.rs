use rocket::serde::json::Json;
use rocket::State;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::convertkit::client::mask_key;
use crate::db::DbPool;
use crate::models::settings::{Setting, SiteOptions};
use crate::security::auth::AdminToken;

// ── ConvertKit defaults ────────────────────────────────

#[get("/settings")]
pub fn settings_get(_admin: AdminToken, pool: &State<DbPool>) -> Json<Value> {
    let options = Setting::site_options(pool);
    Json(options_json(&options))
}

#[derive(Debug, Deserialize)]
pub struct SettingsUpdate {
    pub ck_api_key: Option<String>,
    pub ck_api_base: Option<String>,
    pub ck_debug: Option<bool>,
}

#[post("/settings", format = "json", data = "<body>")]
pub fn settings_save(
    _admin: AdminToken,
    pool: &State<DbPool>,
    body: Json<SettingsUpdate>,
) -> Json<Value> {
    let mut data: HashMap<String, String> = HashMap::new();

    if let Some(key) = &body.ck_api_key {
        data.insert("ck_api_key".into(), key.trim().to_string());
    }
    if let Some(base) = &body.ck_api_base {
        let base = base.trim();
        if !base.is_empty() && !(base.starts_with("https://") || base.starts_with("http://")) {
            return Json(json!({ "ok": false, "error": "API base must be an http(s) URL" }));
        }
        data.insert("ck_api_base".into(), base.to_string());
    }
    if let Some(debug) = body.ck_debug {
        data.insert("ck_debug".into(), debug.to_string());
    }

    if let Err(e) = Setting::set_many(pool, &data) {
        log::error!("[admin] Failed to save settings: {}", e);
        return Json(json!({ "ok": false, "error": "Could not save settings" }));
    }

    log::info!("[admin] Updated settings: {:?}", data.keys().collect::<Vec<_>>());
    let options = Setting::site_options(pool);
    Json(json!({ "ok": true, "settings": options_json(&options) }))
}

/// Site options as shown to admins. The API key is masked.
fn options_json(options: &SiteOptions) -> Value {
    let key_set = !options.default_api_key.is_empty();
    json!({
        "ck_api_key": if key_set { mask_key(&options.default_api_key) } else { String::new() },
        "ck_api_key_set": key_set,
        "ck_api_base": options.api_base,
        "ck_debug": options.debug,
    })
}

pub fn routes() -> Vec<rocket::Route> {
    routes![settings_get, settings_save]
}
