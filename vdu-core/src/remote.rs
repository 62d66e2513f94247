//! Remote display state and the config service that owns it.
//!
//! The device side is the source of truth for display parameters. The
//! client fetches the current state before every negotiation and posts
//! the adjusted state back once a resize has been decided. Responses
//! arrive as loosely-typed JSON, so every field is coerced through
//! [`RemoteDisplayState::normalize`] before use.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::error::VduError;

// ── RemoteDisplayState ───────────────────────────────────────────

/// Snapshot of the device-side display configuration.
///
/// Boolean-like fields are carried as `0`/`1` integers to match the
/// device wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDisplayState {
    pub width: u32,
    pub height: u32,
    pub density: u32,
    pub resolution_preset: i32,
    pub renderer: i32,
    pub is_headless: i32,
    pub is_responsive: i32,
    pub is_h264: i32,
    pub refresh_rate: i32,
    pub quality: i32,
    pub is_rear_display_enabled: i32,
    pub is_rear_display_prioritised: i32,
}

impl Default for RemoteDisplayState {
    fn default() -> Self {
        Self::normalize(&Value::Null)
    }
}

impl RemoteDisplayState {
    /// Coerces a loosely-typed JSON object into a well-formed state.
    ///
    /// Missing or unparseable fields fall back to the device defaults.
    /// Numeric strings and booleans are accepted anywhere an integer is
    /// expected. `width`/`height` are floored at 1.
    pub fn normalize(raw: &Value) -> Self {
        Self {
            width: to_int(raw.get("width"), 1024).max(1) as u32,
            height: to_int(raw.get("height"), 768).max(1) as u32,
            density: to_int(raw.get("density"), 200).max(0) as u32,
            resolution_preset: to_int(raw.get("resolutionPreset"), 0) as i32,
            renderer: to_int(raw.get("renderer"), 0) as i32,
            is_headless: to_int(raw.get("isHeadless"), 1) as i32,
            is_responsive: to_int(raw.get("isResponsive"), 1) as i32,
            is_h264: to_int(raw.get("isH264"), 0) as i32,
            refresh_rate: to_int(raw.get("refreshRate"), 30) as i32,
            quality: to_int(raw.get("quality"), 90) as i32,
            is_rear_display_enabled: to_int(raw.get("isRearDisplayEnabled"), 0) as i32,
            is_rear_display_prioritised: to_int(raw.get("isRearDisplayPrioritised"), 0) as i32,
        }
    }

    pub fn is_headless(&self) -> bool {
        self.is_headless == 1
    }

    pub fn is_responsive(&self) -> bool {
        self.is_responsive == 1
    }

    pub fn is_h264(&self) -> bool {
        self.is_h264 == 1
    }

    pub fn is_rear_display_enabled(&self) -> bool {
        self.is_rear_display_enabled == 1
    }

    pub fn is_rear_display_prioritised(&self) -> bool {
        self.is_rear_display_prioritised == 1
    }
}

/// Integer coercion with a fallback, mirroring the device's loose
/// numeric handling: floats truncate, numeric strings parse, booleans
/// map to 0/1, anything else takes the fallback.
fn to_int(value: Option<&Value>, fallback: i64) -> i64 {
    let Some(value) = value else {
        return fallback;
    };
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i
            } else if let Some(f) = n.as_f64() {
                if f.is_finite() { f.trunc() as i64 } else { fallback }
            } else {
                fallback
            }
        }
        Value::String(s) => match s.trim().parse::<f64>() {
            Ok(f) if f.is_finite() => f.trunc() as i64,
            _ => fallback,
        },
        Value::Bool(b) => {
            if *b {
                1
            } else {
                0
            }
        }
        _ => fallback,
    }
}

// ── ConfigService ────────────────────────────────────────────────

/// Round-trips display state with the device-side config service.
#[async_trait]
pub trait ConfigService: Send + Sync {
    /// Fetches and normalizes the current display state.
    async fn fetch_display_state(&self) -> Result<RemoteDisplayState, VduError>;

    /// Posts an adjusted display state back to the device.
    async fn post_display_state(&self, state: &RemoteDisplayState) -> Result<(), VduError>;
}

/// HTTP implementation of [`ConfigService`] backed by `reqwest`.
pub struct HttpConfigService {
    base_url: String,
    client: reqwest::Client,
}

impl HttpConfigService {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/displayState", self.base_url)
    }
}

#[async_trait]
impl ConfigService for HttpConfigService {
    async fn fetch_display_state(&self) -> Result<RemoteDisplayState, VduError> {
        let response = self.client.get(self.endpoint()).send().await?;
        if !response.status().is_success() {
            return Err(VduError::Api(format!(
                "HTTP {} for {}",
                response.status(),
                self.endpoint()
            )));
        }
        let raw: Value = response.json().await?;
        Ok(RemoteDisplayState::normalize(&raw))
    }

    async fn post_display_state(&self, state: &RemoteDisplayState) -> Result<(), VduError> {
        let response = self.client.post(self.endpoint()).json(state).send().await?;
        if !response.status().is_success() {
            return Err(VduError::Api(format!(
                "HTTP {} for {}",
                response.status(),
                self.endpoint()
            )));
        }
        Ok(())
    }
}
