use serde_json::{json, Value};
use std::time::Duration;

use super::payload::{SubscribeRequest, Subscription};
use super::SubscribeError;
use crate::models::settings::SiteOptions;

/// ConvertKit v3 API root. Override with the `ck_api_base` setting.
pub const DEFAULT_API_BASE: &str = "https://api.convertkit.com/v3";

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(12);

#[derive(Debug, Clone, PartialEq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..=299).contains(&self.status)
    }
}

/// Performs the JSON POST. `Err` means no response was received.
pub trait SubscribeTransport: Send + Sync {
    fn post_json(&self, url: &str, body: &Value, timeout: Duration) -> Result<HttpReply, String>;
}

/// Blocking reqwest client.
pub struct ReqwestTransport;

impl SubscribeTransport for ReqwestTransport {
    fn post_json(&self, url: &str, body: &Value, timeout: Duration) -> Result<HttpReply, String> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| format!("HTTP client error: {}", e))?;

        let resp = client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .map_err(|e| format!("ConvertKit request failed: {}", e))?;

        let status = resp.status().as_u16();
        let body = resp.text().unwrap_or_default();
        Ok(HttpReply { status, body })
    }
}

pub fn subscribe_url(base: &str, form_id: u64) -> String {
    format!("{}/forms/{}/subscribe", base.trim_end_matches('/'), form_id)
}

/// First four characters of a key followed by an ellipsis. Keys that
/// short are hidden entirely.
pub fn mask_key(key: &str) -> String {
    if key.chars().count() <= 4 {
        return "…".to_string();
    }
    let head: String = key.chars().take(4).collect();
    format!("{}…", head)
}

/// Payload as it may appear in logs.
pub fn masked_payload(payload: &Subscription) -> Value {
    let mut value = serde_json::to_value(payload).unwrap_or_else(|_| json!({}));
    if let Some(obj) = value.as_object_mut() {
        obj.insert("api_key".into(), Value::String(mask_key(&payload.api_key)));
    }
    value
}

/// Log lines describing an outgoing request in debug mode. The API key
/// only ever appears masked.
pub fn debug_request_lines(url: &str, payload: &Subscription) -> Vec<String> {
    vec![
        format!("[convertkit] POST {}", url),
        format!("[convertkit] payload: {}", masked_payload(payload)),
    ]
}

pub fn debug_reply_line(reply: &HttpReply) -> String {
    format!("[convertkit] response {}: {}", reply.status, reply.body)
}

/// Send one subscribe request. No retries.
pub fn subscribe(
    transport: &dyn SubscribeTransport,
    options: &SiteOptions,
    req: &SubscribeRequest,
) -> Result<(), SubscribeError> {
    let url = subscribe_url(&options.api_base, req.form_id);
    let body = serde_json::to_value(&req.payload)
        .map_err(|e| SubscribeError::Transport(format!("Could not encode payload: {}", e)))?;

    if options.debug {
        for line in debug_request_lines(&url, &req.payload) {
            log::info!("{}", line);
        }
    }

    let reply = match transport.post_json(&url, &body, REQUEST_TIMEOUT) {
        Ok(r) => r,
        Err(e) => {
            log::error!("[convertkit] transport error: {}", e);
            return Err(SubscribeError::Transport(e));
        }
    };

    if options.debug {
        log::info!("{}", debug_reply_line(&reply));
    }

    if !reply.is_success() {
        log::error!("[convertkit] HTTP {} response: {}", reply.status, reply.body);
        return Err(SubscribeError::Rejected {
            status: reply.status,
            body: reply.body,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convertkit::payload::CustomFields;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};

    /// Accept a single connection, capture the request and answer with `status`.
    fn one_shot_server(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                let n = stream.read(&mut chunk).unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf).to_string();
                if let Some(head_end) = text.find("\r\n\r\n") {
                    let length = text[..head_end]
                        .lines()
                        .find_map(|l| {
                            let lower = l.to_ascii_lowercase();
                            lower
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                        })
                        .unwrap_or(0);
                    if buf.len() >= head_end + 4 + length {
                        break;
                    }
                }
            }
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).unwrap();
            String::from_utf8_lossy(&buf).to_string()
        });

        (format!("http://{}", addr), handle)
    }

    fn request() -> SubscribeRequest {
        SubscribeRequest {
            form_id: 7,
            payload: Subscription {
                api_key: "secretkey".into(),
                email: "a@b.com".into(),
                first_name: Some("Jane".into()),
                fields: CustomFields::new(),
                tags: vec![],
            },
        }
    }

    fn options(base: &str) -> SiteOptions {
        SiteOptions {
            api_base: base.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_subscribe_url_joins_base() {
        assert_eq!(
            subscribe_url(DEFAULT_API_BASE, 7),
            "https://api.convertkit.com/v3/forms/7/subscribe"
        );
        assert_eq!(subscribe_url("http://x/v3//", 1), "http://x/v3/forms/1/subscribe");
    }

    #[test]
    fn test_mask_key() {
        assert_eq!(mask_key("abcdef123"), "abcd…");
        assert_eq!(mask_key("abc"), "…");
        assert_eq!(mask_key(""), "…");
    }

    #[test]
    fn test_masked_payload_hides_key() {
        let masked = masked_payload(&request().payload);
        assert_eq!(masked["api_key"], "secr…");
        assert!(!masked.to_string().contains("secretkey"));
        assert_eq!(masked["email"], "a@b.com");
    }

    #[test]
    fn test_debug_lines_never_carry_raw_key() {
        let mut req = request();
        req.payload.api_key = "abcdef123456".into();
        let url = subscribe_url(DEFAULT_API_BASE, req.form_id);

        let lines = debug_request_lines(&url, &req.payload);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("https://api.convertkit.com/v3/forms/7/subscribe"));
        assert!(lines[1].contains("abcd…"));
        assert!(lines[1].contains("a@b.com"));
        for line in &lines {
            assert!(!line.contains("abcdef123456"));
        }

        let reply = HttpReply {
            status: 422,
            body: r#"{"error":"bad"}"#.into(),
        };
        assert_eq!(
            debug_reply_line(&reply),
            r#"[convertkit] response 422: {"error":"bad"}"#
        );
    }

    #[test]
    fn test_debug_mode_still_subscribes() {
        let (base, server) = one_shot_server("200 OK", "{}");
        let opts = SiteOptions {
            debug: true,
            ..options(&base)
        };
        assert!(subscribe(&ReqwestTransport, &opts, &request()).is_ok());
        server.join().unwrap();
    }

    #[test]
    fn test_success_posts_json() {
        let (base, server) = one_shot_server("200 OK", r#"{"subscription":{}}"#);
        let result = subscribe(&ReqwestTransport, &options(&format!("{}/v3/", base)), &request());
        assert!(result.is_ok());

        let seen = server.join().unwrap();
        assert!(seen.starts_with("POST /v3/forms/7/subscribe"));
        assert!(seen.to_ascii_lowercase().contains("content-type: application/json"));
        assert!(seen.contains(r#""email":"a@b.com""#));
        assert!(seen.contains(r#""api_key":"secretkey""#));
    }

    #[test]
    fn test_non_2xx_is_rejected() {
        let (base, server) = one_shot_server("422 Unprocessable Entity", r#"{"error":"bad"}"#);
        let result = subscribe(&ReqwestTransport, &options(&base), &request());
        server.join().unwrap();

        match result {
            Err(SubscribeError::Rejected { status, body }) => {
                assert_eq!(status, 422);
                assert_eq!(body, r#"{"error":"bad"}"#);
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_unreachable_host_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let opts = options(&format!("http://{}", addr));
        let result = subscribe(&ReqwestTransport, &opts, &request());
        assert!(matches!(result, Err(SubscribeError::Transport(_))));
    }
}
