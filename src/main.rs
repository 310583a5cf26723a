#[macro_use]
extern crate rocket;

use rocket::serde::json::Json;
use rocket::{Build, Rocket};
use serde_json::{json, Value};
use std::sync::Arc;

mod boot;
mod convertkit;
mod db;
mod forms;
mod models;
mod routes;
mod security;


use convertkit::client::ReqwestTransport;
use convertkit::CustomConvertKit;
use db::DbPool;
use forms::ActionRegistry;

#[catch(400)]
fn bad_request() -> Json<Value> {
    Json(json!({ "ok": false, "error": "Malformed request body" }))
}

#[catch(401)]
fn unauthorized() -> Json<Value> {
    Json(json!({ "ok": false, "error": "Unauthorized" }))
}

#[catch(404)]
fn not_found() -> Json<Value> {
    Json(json!({ "ok": false, "error": "Not found" }))
}

#[catch(422)]
fn unprocessable() -> Json<Value> {
    Json(json!({ "ok": false, "error": "Invalid request body" }))
}

#[catch(500)]
fn server_error() -> Json<Value> {
    Json(json!({ "ok": false, "error": "Internal server error" }))
}

/// Form actions available to submissions.
pub fn default_actions() -> ActionRegistry {
    let convertkit = CustomConvertKit::new(Box::new(ReqwestTransport));
    ActionRegistry::new().register(Box::new(convertkit))
}

pub fn app(pool: DbPool, registry: ActionRegistry) -> Rocket<Build> {
    rocket::build()
        .manage(pool)
        .manage(Arc::new(registry))
        .mount("/api", routes::api::routes())
        .mount("/admin/api", routes::admin_api::routes())
        .register(
            "/",
            catchers![bad_request, unauthorized, not_found, unprocessable, server_error],
        )
}

#[launch]
fn rocket() -> _ {
    env_logger::init();

    let db_path = db::db_path();

    // Boot check: verify/create the database directory
    boot::run(&db_path);

    let pool = db::init_pool(&db_path).expect("Failed to initialize database pool");
    db::run_migrations(&pool).expect("Failed to run database migrations");
    db::seed_defaults(&pool).expect("Failed to seed default settings");
    boot::apply_env(&pool).expect("Failed to apply environment settings");

    let registry = default_actions();
    for action in registry.list() {
        log::info!("[forms] Registered form action: {} ({})", action.name, action.label);
    }

    app(pool, registry)
}
