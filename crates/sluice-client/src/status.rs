//! Normalization of backend status payloads.
//!
//! The status schema belongs to the backend and drifts over time, so every
//! lookup here is optional: a missing or renamed field reads as "unknown"
//! or "not ready", never as an error.

use serde::Serialize;
use serde_json::Value;

/// Which serving path the backend reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Primary,
    Warming,
    Fallback,
    Unknown,
}

impl Provider {
    fn classify(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "primary" | "local" | "direct" | "native" => Self::Primary,
            "warming" | "warmup" | "loading" | "starting" => Self::Warming,
            "fallback" | "remote" | "backup" | "proxy" => Self::Fallback,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Warming => "warming",
            Self::Fallback => "fallback",
            Self::Unknown => "unknown",
        }
    }
}

/// Coarse backend state, used to pick the next polling cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PollPhase {
    Ready,
    Warming,
    Fallback,
    Starting,
    /// The last status request failed
    Connecting,
}

impl PollPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Warming => "warming",
            Self::Fallback => "fallback",
            Self::Starting => "starting",
            Self::Connecting => "connecting",
        }
    }
}

/// UI-facing snapshot of backend health, derived fresh on every tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub ready: bool,
    pub provider: Provider,
    pub model_present: bool,
    pub phase: PollPhase,
}

const READY_WORDS: &[&str] = &["ready", "ok", "healthy", "up"];
const PROVIDER_KEYS: &[&str] = &["provider", "path", "mode"];
const PATH_KEYS: &[&str] = &["kind", "mode", "provider", "name"];
const PROVIDER_OBJECT_KEYS: &[&str] = &["kind", "name"];

impl Summary {
    /// Neutral summary reported while the status endpoint is unreachable
    pub fn connecting() -> Self {
        Self {
            ready: false,
            provider: Provider::Unknown,
            model_present: false,
            phase: PollPhase::Connecting,
        }
    }

    /// Derive a summary from a raw status payload
    pub fn from_payload(payload: &Value) -> Self {
        let ready = readiness(payload);
        let provider = provider_label(payload)
            .map(Provider::classify)
            .unwrap_or(Provider::Unknown);
        let model_present = model_present(payload);

        let phase = if ready {
            PollPhase::Ready
        } else {
            match provider {
                Provider::Warming => PollPhase::Warming,
                Provider::Fallback => PollPhase::Fallback,
                Provider::Primary | Provider::Unknown => PollPhase::Starting,
            }
        };

        Self {
            ready,
            provider,
            model_present,
            phase,
        }
    }
}

fn readiness(payload: &Value) -> bool {
    if let Some(ready) = payload.get("ready").and_then(Value::as_bool) {
        return ready;
    }

    ["status", "state"]
        .iter()
        .filter_map(|key| payload.get(key).and_then(Value::as_str))
        .any(|word| READY_WORDS.iter().any(|r| word.eq_ignore_ascii_case(r)))
}

fn provider_label(payload: &Value) -> Option<&str> {
    if let Some(label) = PROVIDER_KEYS
        .iter()
        .find_map(|key| payload.get(key).and_then(Value::as_str))
    {
        return Some(label);
    }

    if let Some(path) = payload.get("path").filter(|v| v.is_object()) {
        if let Some(label) = first_str(path, PATH_KEYS) {
            return Some(label);
        }
    }

    payload
        .get("provider")
        .filter(|v| v.is_object())
        .and_then(|provider| first_str(provider, PROVIDER_OBJECT_KEYS))
}

fn model_present(payload: &Value) -> bool {
    let flagged = ["model_loaded", "model_ready"]
        .iter()
        .any(|key| payload.get(key).and_then(Value::as_bool) == Some(true));
    if flagged {
        return true;
    }

    let named = match payload.get("model") {
        Some(Value::String(name)) => !name.trim().is_empty(),
        Some(Value::Object(_)) => true,
        _ => false,
    };
    if named {
        return true;
    }

    let nested = ["path", "provider"].iter().any(|key| {
        payload
            .get(key)
            .and_then(|v| v.get("model"))
            .and_then(Value::as_str)
            .is_some_and(|name| !name.trim().is_empty())
    });
    if nested {
        return true;
    }

    payload
        .get("models")
        .and_then(Value::as_array)
        .is_some_and(|models| !models.is_empty())
}

fn first_str<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|key| value.get(key).and_then(Value::as_str))
}
