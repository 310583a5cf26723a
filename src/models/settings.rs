use rusqlite::params;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::convertkit::client::DEFAULT_API_BASE;
use crate::db::DbPool;

#[derive(Debug, Serialize, Deserialize)]
pub struct Setting {
    pub key: String,
    pub value: String,
}

impl Setting {
    pub fn get(pool: &DbPool, key: &str) -> Option<String> {
        let conn = pool.get().ok()?;
        conn.query_row(
            "SELECT value FROM settings WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .ok()
    }

    pub fn get_or(pool: &DbPool, key: &str, default: &str) -> String {
        Self::get(pool, key).unwrap_or_else(|| default.to_string())
    }

    pub fn get_bool(pool: &DbPool, key: &str) -> bool {
        Self::get(pool, key).map(|v| is_truthy(&v)).unwrap_or(false)
    }

    pub fn set(pool: &DbPool, key: &str, value: &str) -> Result<(), String> {
        let conn = pool.get().map_err(|e| e.to_string())?;
        conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = ?2",
            params![key, value],
        )
        .map_err(|e| e.to_string())?;
        Ok(())
    }

    pub fn set_many(pool: &DbPool, settings: &HashMap<String, String>) -> Result<(), String> {
        let mut conn = pool.get().map_err(|e| e.to_string())?;
        let tx = conn.transaction().map_err(|e| e.to_string())?;
        for (key, value) in settings {
            tx.execute(
                "INSERT INTO settings (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = ?2",
                params![key, value],
            )
            .map_err(|e| e.to_string())?;
        }
        tx.commit().map_err(|e| e.to_string())?;
        Ok(())
    }

    pub fn all(pool: &DbPool) -> HashMap<String, String> {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return HashMap::new(),
        };

        let mut stmt = match conn.prepare("SELECT key, value FROM settings") {
            Ok(s) => s,
            Err(_) => return HashMap::new(),
        };

        stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })
        .map(|rows| rows.filter_map(|r| r.ok()).collect())
        .unwrap_or_default()
    }

    pub fn site_options(pool: &DbPool) -> SiteOptions {
        SiteOptions::from_map(&Self::all(pool))
    }
}

/// Boolean settings are stored as `"true"` or `"1"`.
pub fn is_truthy(value: &str) -> bool {
    matches!(value.trim(), "true" | "1")
}

/// Site-wide values handed to every form action run.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteOptions {
    /// Used when a form does not carry its own API key.
    pub default_api_key: String,
    pub api_base: String,
    /// Log request URL, masked payload and response for every subscribe call.
    pub debug: bool,
}

impl Default for SiteOptions {
    fn default() -> Self {
        SiteOptions {
            default_api_key: String::new(),
            api_base: DEFAULT_API_BASE.to_string(),
            debug: false,
        }
    }
}

impl SiteOptions {
    pub fn from_map(settings: &HashMap<String, String>) -> Self {
        let api_base = settings
            .get("ck_api_base")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());

        SiteOptions {
            default_api_key: settings
                .get("ck_api_key")
                .map(|v| v.trim().to_string())
                .unwrap_or_default(),
            api_base,
            debug: settings.get("ck_debug").map(|v| is_truthy(v)).unwrap_or(false),
        }
    }
}
