//! Mappa gli errori upstream su un `ErrorKind` stabile e un messaggio leggibile.
//!
//! La catena delle cause (`Error::source`) viene percorsa dall'esterno verso
//! l'interno; il primo nodo riconosciuto decide la classificazione. I nodi già
//! visitati vengono saltati, quindi anche una catena ciclica termina.

use std::collections::{BTreeMap, HashSet};
use std::error::Error as StdError;
use std::io;

use serde::Serialize;

use crate::models::ErrorKind;
use crate::services::genai::ProviderError;

pub mod messages {
    pub const MISSING_API_KEY: &str = "Autenticazione fallita: API Key mancante";
    pub const INVALID_API_KEY: &str = "Autenticazione fallita: API Key non valida o senza permessi";
    pub const RATE_LIMITED: &str = "Troppe richieste: riprova più tardi";
    pub const NETWORK_UNREACHABLE: &str = "Rete non raggiungibile o connessione scaduta";
    pub const TLS_FAILURE: &str = "Handshake TLS scaduto o rete non raggiungibile";
    pub const CONNECTIVITY_OK: &str = "Connessione al provider riuscita";

    pub fn upstream(status: u16) -> String {
        format!("Errore del servizio upstream: HTTP {}", status)
    }

    pub fn unknown(err: &dyn std::fmt::Display) -> String {
        format!("Errore sconosciuto: {}", err)
    }
}

const TLS_MARKERS: &[&str] = &["_ssl.c", "handshake", "tls", "certificate"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub kind: ErrorKind,
    pub message: String,
}

impl Classification {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Iteratore sulla catena delle cause, a partire dall'errore stesso
pub struct Causes<'a> {
    next: Option<&'a (dyn StdError + 'static)>,
    seen: HashSet<usize>,
}

pub fn causes<'a>(err: &'a (dyn StdError + 'static)) -> Causes<'a> {
    Causes {
        next: Some(err),
        seen: HashSet::new(),
    }
}

impl<'a> Iterator for Causes<'a> {
    type Item = &'a (dyn StdError + 'static);

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        if !self.seen.insert(node_address(current)) {
            return None;
        }
        self.next = current.source();
        Some(current)
    }
}

fn node_address(err: &(dyn StdError + 'static)) -> usize {
    err as *const dyn StdError as *const () as usize
}

pub fn classify(err: &(dyn StdError + 'static)) -> Classification {
    causes(err)
        .find_map(classify_node)
        .unwrap_or_else(|| Classification::new(ErrorKind::UnknownError, messages::unknown(&err)))
}

/// Classificazione di un codice HTTP; `None` per i codici non gestiti
pub fn classify_status(status: u16) -> Option<Classification> {
    match status {
        401 | 403 => Some(Classification::new(
            ErrorKind::AuthFailed,
            messages::INVALID_API_KEY,
        )),
        429 => Some(Classification::new(
            ErrorKind::RateLimited,
            messages::RATE_LIMITED,
        )),
        s if s >= 500 => Some(Classification::new(
            ErrorKind::UpstreamError,
            messages::upstream(s),
        )),
        _ => None,
    }
}

fn classify_node(node: &(dyn StdError + 'static)) -> Option<Classification> {
    if let Some(ProviderError::MissingApiKey) = node.downcast_ref::<ProviderError>() {
        return Some(Classification::new(
            ErrorKind::AuthFailed,
            messages::MISSING_API_KEY,
        ));
    }

    if let Some(classification) = http_status(node).and_then(classify_status) {
        return Some(classification);
    }

    if is_transport_failure(node) {
        return Some(Classification::new(
            ErrorKind::NetworkUnreachable,
            messages::NETWORK_UNREACHABLE,
        ));
    }

    let text = node.to_string().to_lowercase();
    if TLS_MARKERS.iter().any(|marker| text.contains(marker)) {
        return Some(Classification::new(
            ErrorKind::NetworkUnreachable,
            messages::TLS_FAILURE,
        ));
    }

    None
}

fn http_status(node: &(dyn StdError + 'static)) -> Option<u16> {
    if let Some(ProviderError::Http { status, .. }) = node.downcast_ref::<ProviderError>() {
        return Some(*status);
    }
    node.downcast_ref::<reqwest::Error>()
        .and_then(|e| e.status())
        .map(|s| s.as_u16())
}

fn is_transport_failure(node: &(dyn StdError + 'static)) -> bool {
    if let Some(e) = node.downcast_ref::<reqwest::Error>() {
        return e.is_connect() || e.is_timeout();
    }
    if let Some(e) = node.downcast_ref::<io::Error>() {
        return matches!(
            e.kind(),
            io::ErrorKind::TimedOut
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionRefused
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::NotConnected
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::UnexpectedEof
        );
    }
    false
}

/// Dettagli diagnostici di un errore, destinati solo ai log
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ErrorContext {
    pub error_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub request_ids: BTreeMap<String, String>,
}

pub fn extract_error_context(err: &(dyn StdError + 'static)) -> ErrorContext {
    let mut context = ErrorContext {
        error_type: type_label(err),
        ..Default::default()
    };

    for node in causes(err) {
        if let Some(ProviderError::Http {
            status,
            code,
            status_text,
            message,
            details,
            request_ids,
        }) = node.downcast_ref::<ProviderError>()
        {
            if context.code.is_none() {
                context.code = code.map(|c| c.to_string());
            }
            if context.status.is_none() {
                context.status = status_text.clone();
            }
            if context.message.is_none() {
                context.message = Some(message.clone());
            }
            if context.details.is_none() {
                context.details = details.clone();
            }
            for (name, value) in request_ids {
                context
                    .request_ids
                    .entry(name.clone())
                    .or_insert_with(|| value.clone());
            }
            context.http_status = Some(*status);
        } else if let Some(e) = node.downcast_ref::<reqwest::Error>() {
            context.http_status = e.status().map(|s| s.as_u16());
        } else if let Some(e) = node.downcast_ref::<io::Error>() {
            if context.code.is_none() {
                context.code = Some(format!("{:?}", e.kind()));
            }
        }

        // il primo nodo con uno status HTTP chiude la ricerca
        if context.http_status.is_some() {
            break;
        }
    }

    context
}

fn type_label(err: &(dyn StdError + 'static)) -> String {
    if let Some(e) = err.downcast_ref::<ProviderError>() {
        return e.variant_name().to_string();
    }
    if err.is::<reqwest::Error>() {
        return "reqwest::Error".to_string();
    }
    if err.is::<io::Error>() {
        return "std::io::Error".to_string();
    }
    let debug = format!("{:?}", err);
    let label: String = debug
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == ':')
        .collect();
    if label.is_empty() {
        "unknown".to_string()
    } else {
        label
    }
}
