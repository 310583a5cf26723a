use rocket::http::Status;
use rocket::request::{FromRequest, Outcome, Request};
use sha2::{Digest, Sha256};

use crate::db::DbPool;
use crate::models::settings::Setting;

pub const ADMIN_TOKEN_HEADER: &str = "X-Admin-Token";

// ── Admin token request guard ──

/// Guard: the `X-Admin-Token` header must hash to the stored
/// `admin_token_hash`. With no hash configured every request is refused.
pub struct AdminToken;

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AdminToken {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let pool = match request.rocket().state::<DbPool>() {
            Some(p) => p,
            None => return Outcome::Forward(Status::InternalServerError),
        };

        let expected = Setting::get_or(pool, "admin_token_hash", "");
        let given = request
            .headers()
            .get_one(ADMIN_TOKEN_HEADER)
            .map(|t| t.trim())
            .unwrap_or("");

        if expected.is_empty() || given.is_empty() {
            return Outcome::Forward(Status::Unauthorized);
        }

        if hash_token(given) == expected {
            Outcome::Success(AdminToken)
        } else {
            log::warn!("[auth] Rejected admin request with a wrong token");
            Outcome::Forward(Status::Unauthorized)
        }
    }
}

pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}
