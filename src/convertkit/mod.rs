pub mod client;
pub mod payload;

use crate::forms::{ErrorSink, FormAction, FormRecord};
use crate::models::settings::SiteOptions;

use client::SubscribeTransport;
use payload::ActionSettings;

// ── Errors ────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum SubscribeError {
    MissingEmail,
    MissingApiKey,
    MissingFormId,
    /// No response was received.
    Transport(String),
    /// The API answered outside 2xx.
    Rejected { status: u16, body: String },
}

impl SubscribeError {
    /// Message shown to the person who filled in the form. Never carries
    /// internal details.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::MissingEmail => "Email is required for ConvertKit.",
            Self::MissingApiKey => "Missing API key.",
            Self::MissingFormId => "Missing ConvertKit form ID.",
            Self::Transport(_) => "Could not reach ConvertKit. Please try again later.",
            Self::Rejected { .. } => "ConvertKit returned an error. Please try again.",
        }
    }
}

impl std::fmt::Display for SubscribeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingEmail => write!(f, "submission has no email value"),
            Self::MissingApiKey => write!(f, "no API key on the form and no site default"),
            Self::MissingFormId => write!(f, "form settings carry no ConvertKit form id"),
            Self::Transport(e) => write!(f, "transport error: {}", e),
            Self::Rejected { status, body } => write!(f, "HTTP {}: {}", status, body),
        }
    }
}

// ── Action ────────────────────────────────────────────

/// Subscribes the submitter to a ConvertKit form, mapping other fields
/// onto ConvertKit custom fields.
pub struct CustomConvertKit {
    transport: Box<dyn SubscribeTransport>,
}

impl CustomConvertKit {
    pub fn new(transport: Box<dyn SubscribeTransport>) -> Self {
        CustomConvertKit { transport }
    }

    pub fn submit(&self, record: &FormRecord, options: &SiteOptions) -> Result<(), SubscribeError> {
        let settings = ActionSettings::from_form_settings(&record.form_settings);
        let req = payload::build(&record.fields, &settings, &options.default_api_key)?;
        client::subscribe(self.transport.as_ref(), options, &req)
    }
}

impl FormAction for CustomConvertKit {
    fn name(&self) -> &'static str {
        "custom_convertkit"
    }

    fn label(&self) -> &'static str {
        "Custom ConvertKit"
    }

    fn run(&self, record: &FormRecord, options: &SiteOptions, sink: &mut dyn ErrorSink) {
        match self.submit(record, options) {
            Ok(()) => {}
            Err(e @ (SubscribeError::Transport(_) | SubscribeError::Rejected { .. })) => {
                // already logged by the client
                sink.add_error_message(e.user_message());
            }
            Err(e) => {
                log::warn!("[convertkit] submission not sent: {}", e);
                sink.add_error_message(e.user_message());
            }
        }
    }
}
