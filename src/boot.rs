use log::{error, info, warn};
use std::fs;
use std::path::Path;
use std::process;

use crate::db::DbPool;
use crate::models::settings::Setting;
use crate::security::auth;

/// Run all boot checks. Call this before Rocket launches.
/// Creates the database directory if missing and aborts when it
/// cannot be written.
pub fn run(db_path: &str) {
    info!("[boot] kitform boot check starting...");

    let mut warnings = 0u32;
    let mut errors = 0u32;

    // ── 1. Database directory ──────────────────────────
    let db_dir = Path::new(db_path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    if !db_dir.exists() {
        match fs::create_dir_all(db_dir) {
            Ok(_) => info!("[boot]   Created directory: {}", db_dir.display()),
            Err(e) => {
                error!("[boot]   FAILED to create directory {}: {}", db_dir.display(), e);
                errors += 1;
            }
        }
    }

    // ── 2. Database directory writable ──────────────────
    if db_dir.exists() {
        let test_file = db_dir.join(".write_test");
        match fs::write(&test_file, "test") {
            Ok(_) => {
                let _ = fs::remove_file(&test_file);
            }
            Err(e) => {
                error!("[boot]   Database directory not writable: {}", e);
                errors += 1;
            }
        }
    }

    // ── 3. Rocket.toml exists ───────────────────────────
    if !Path::new("Rocket.toml").exists() {
        warn!("[boot]   Rocket.toml not found, using default config");
        warnings += 1;
    }

    // ── Summary ─────────────────────────────────────────
    if errors > 0 {
        error!(
            "[boot] Boot check FAILED: {} error(s), {} warning(s). Aborting.",
            errors, warnings
        );
        process::exit(1);
    }

    if warnings > 0 {
        warn!("[boot] Boot check passed with {} warning(s).", warnings);
    } else {
        info!("[boot] Boot check passed.");
    }
}

/// Apply settings supplied through the environment after seeding.
/// `KITFORM_ADMIN_TOKEN` sets the admin token; only its hash is stored.
/// `KITFORM_API_KEY` sets the site-wide default ConvertKit key.
pub fn apply_env(pool: &DbPool) -> Result<(), String> {
    if let Some(token) = env_value("KITFORM_ADMIN_TOKEN") {
        Setting::set(pool, "admin_token_hash", &auth::hash_token(&token))?;
        info!("[boot] Admin token set from environment");
    }

    if let Some(key) = env_value("KITFORM_API_KEY") {
        Setting::set(pool, "ck_api_key", &key)?;
        info!("[boot] Default ConvertKit API key set from environment");
    }

    if Setting::get_bool(pool, "ck_debug") {
        warn!("[boot] ConvertKit debug logging is on, request payloads will be logged");
    }

    if Setting::get_or(pool, "admin_token_hash", "").is_empty() {
        warn!("[boot] No admin token configured, admin settings API is disabled");
    }

    Ok(())
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
