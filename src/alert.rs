use regex::Regex;
use serde::Serialize;
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};

use crate::{EmergencyAlert, Position, RescuemapError, Result};

/// Chat-provider messaging capability
pub trait Messenger: Send + Sync {
    /// Link that hands `message` to the provider for `contact`; delivery is
    /// not confirmed
    fn send_message(&self, contact: &str, message: &str) -> Option<DeepLink>;
}

/// Telephone capability
pub trait Dialer: Send + Sync {
    fn dial(&self, number: &str) -> DeepLink;

    fn video_call(&self, number: &str) -> DeepLink;
}

/// Strip everything but digits, as chat deep links expect
pub fn phone_digits(number: &str) -> String {
    static NON_DIGIT: OnceLock<Regex> = OnceLock::new();
    NON_DIGIT
        .get_or_init(|| Regex::new(r"\D").expect("static pattern"))
        .replace_all(number, "")
        .into_owned()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeepLinkKind {
    Message,
    Call,
    VideoCall,
}

/// A link the client opens to perform a contact action
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeepLink {
    pub kind: DeepLinkKind,
    pub url: String,
}

/// Contact capabilities expressed as links for the browser to open.
///
/// The server cannot open windows itself; each action returns its link to
/// the caller, which hands it back in the response of the same request.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeepLinkBuilder;

impl Messenger for DeepLinkBuilder {
    fn send_message(&self, contact: &str, message: &str) -> Option<DeepLink> {
        let base = format!("https://wa.me/{}", phone_digits(contact));
        match reqwest::Url::parse_with_params(&base, &[("text", message)]) {
            Ok(url) => Some(DeepLink {
                kind: DeepLinkKind::Message,
                url: url.into(),
            }),
            Err(e) => {
                warn!("Cannot build message link for {}: {}", contact, e);
                None
            }
        }
    }
}

impl Dialer for DeepLinkBuilder {
    fn dial(&self, number: &str) -> DeepLink {
        DeepLink {
            kind: DeepLinkKind::Call,
            url: format!("tel:{}", number.trim()),
        }
    }

    fn video_call(&self, number: &str) -> DeepLink {
        DeepLink {
            kind: DeepLinkKind::VideoCall,
            url: format!("https://wa.me/{}?call&video=true", phone_digits(number)),
        }
    }
}

/// A dispatched alert and the links that carry it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertReceipt {
    pub alert: EmergencyAlert,
    /// One message link per contact, then the call to the first contact
    pub links: Vec<DeepLink>,
}

/// Broadcasts SOS messages and places the fallback call
#[derive(Clone)]
pub struct AlertDispatcher {
    messenger: Arc<dyn Messenger>,
    dialer: Arc<dyn Dialer>,
}

impl AlertDispatcher {
    pub fn new(messenger: Arc<dyn Messenger>, dialer: Arc<dyn Dialer>) -> Self {
        Self { messenger, dialer }
    }

    /// Message every contact in order, then call the first one.
    ///
    /// The call is placed regardless of how message dispatch went.
    pub fn send_alert(
        &self,
        position: Option<Position>,
        contacts: &[String],
    ) -> Result<AlertReceipt> {
        let position = position.ok_or(RescuemapError::PositionUnavailable)?;
        let first = contacts.first().ok_or(RescuemapError::NoContacts)?;

        let alert = EmergencyAlert::new(position, contacts);
        let mut links: Vec<DeepLink> = alert
            .contacts
            .iter()
            .filter_map(|contact| self.messenger.send_message(contact, &alert.message))
            .collect();
        info!("SOS activated, alerted {} contacts", alert.contacts.len());

        links.push(self.dialer.dial(first));
        Ok(AlertReceipt { alert, links })
    }
}
