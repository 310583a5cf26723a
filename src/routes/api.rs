use rocket::serde::json::Json;
use rocket::State;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::db::DbPool;
use crate::forms::{ActionInfo, ActionRegistry, FormRecord, SubmissionResponse};
use crate::models::settings::Setting;

// ── Form submission ────────────────────────────────────

/// Run the actions a form asks for. The outcome is always a 200 carrying
/// `success` and the messages to show the submitter.
#[post("/forms/submit", format = "json", data = "<record>")]
pub async fn form_submit(
    pool: &State<DbPool>,
    registry: &State<Arc<ActionRegistry>>,
    record: Json<FormRecord>,
) -> Json<SubmissionResponse> {
    let options = Setting::site_options(pool);
    let registry = Arc::clone(registry.inner());
    let record = record.into_inner();

    // Actions make blocking HTTP calls
    let outcome =
        rocket::tokio::task::spawn_blocking(move || registry.process(&record, &options)).await;

    match outcome {
        Ok(resp) => Json(resp),
        Err(e) => {
            log::error!("[forms] Action worker failed: {}", e);
            Json(SubmissionResponse::failed("Something went wrong. Please try again."))
        }
    }
}

#[get("/forms/actions")]
pub fn form_actions(registry: &State<Arc<ActionRegistry>>) -> Json<Vec<ActionInfo>> {
    Json(registry.list())
}

#[get("/health")]
pub fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![form_submit, form_actions, health]
}
