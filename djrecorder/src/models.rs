//! Data models for the status endpoint
//!
//! The status endpoint returns a JSON document describing the station's
//! main stream: who is on air and what is playing. Only the fields the
//! recorder needs are deserialized; everything else is ignored.

use serde::{Deserialize, Serialize};

// ============================================================================
// Status
// ============================================================================

/// One observation of the station, produced on every poll tick
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// Whether a human DJ is on air
    pub live: bool,
    /// DJ identity as reported by the station
    pub dj: String,
    /// Title of the track currently playing
    pub now_playing: String,
}

impl Status {
    pub fn new(live: bool, dj: impl Into<String>, now_playing: impl Into<String>) -> Self {
        Self {
            live,
            dj: dj.into(),
            now_playing: now_playing.into(),
        }
    }

    /// A status with liveness derived from the DJ identity
    pub fn derived(dj: impl Into<String>, now_playing: impl Into<String>, idle_dj: &str) -> Self {
        let dj = dj.into();
        Self {
            live: is_live(&dj, idle_dj),
            dj,
            now_playing: now_playing.into(),
        }
    }

    /// Build a status from the endpoint response
    ///
    /// An explicit `live` flag wins, then `isafkstream` (inverted), and
    /// only when neither is present is liveness derived from the DJ name.
    pub fn from_response(response: StatusResponse, idle_dj: &str) -> Self {
        let main = response.main;
        let dj = main.dj.djname.unwrap_or_default();
        let now_playing = main.np.unwrap_or_default();

        let live = match (main.live, main.isafkstream) {
            (Some(live), _) => live,
            (None, Some(afk)) => !afk,
            (None, None) => is_live(&dj, idle_dj),
        };

        Self {
            live,
            dj,
            now_playing,
        }
    }
}

/// Liveness policy used when the endpoint carries no explicit flag
///
/// A DJ is live when the name is non-empty and is not the idle sentinel.
pub fn is_live(dj: &str, idle_dj: &str) -> bool {
    !dj.is_empty() && dj != idle_dj
}

// ============================================================================
// Endpoint Response Models
// ============================================================================

/// Response from the status endpoint
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub main: MainStatus,
}

/// Main stream section of the status response
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MainStatus {
    /// Now playing
    #[serde(default)]
    pub np: Option<String>,
    /// DJ currently on air
    #[serde(default)]
    pub dj: DjInfo,
    /// True while the automated (idle) DJ is streaming
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isafkstream: Option<bool>,
    /// Explicit liveness flag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live: Option<bool>,
}

/// DJ section of the status response
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DjInfo {
    #[serde(default, alias = "djName", alias = "DJName", alias = "dj_name")]
    pub djname: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDLE: &str = "Idle-Sentinel";

    #[test]
    fn test_liveness_policy() {
        assert!(!is_live("", IDLE));
        assert!(!is_live(IDLE, IDLE));
        assert!(is_live("SomeDJ", IDLE));

        assert!(!Status::derived("", "", IDLE).live);
        assert!(!Status::derived(IDLE, "x", IDLE).live);
        assert!(Status::derived("SomeDJ", "x", IDLE).live);
    }

    #[test]
    fn test_parse_derived_response() {
        let json = r#"{
            "main": {
                "np": "Artist - Song",
                "listeners": 120,
                "dj": { "id": 18, "djname": "SomeDJ", "djimage": "x.png" }
            }
        }"#;
        let response: StatusResponse = serde_json::from_str(json).unwrap();
        let status = Status::from_response(response, IDLE);

        assert_eq!(status, Status::new(true, "SomeDJ", "Artist - Song"));
    }

    #[test]
    fn test_parse_idle_response() {
        let json = r#"{"main": {"np": "Loop", "dj": {"djname": "Idle-Sentinel"}}}"#;
        let response: StatusResponse = serde_json::from_str(json).unwrap();
        assert!(!Status::from_response(response, IDLE).live);
    }

    #[test]
    fn test_explicit_flags_are_authoritative() {
        // isafkstream says the bot is streaming even though the name looks human
        let json = r#"{"main": {"np": "a", "isafkstream": true, "dj": {"djname": "SomeDJ"}}}"#;
        let response: StatusResponse = serde_json::from_str(json).unwrap();
        assert!(!Status::from_response(response, IDLE).live);

        // live wins over everything else
        let json = r#"{"main": {"np": "a", "live": true, "isafkstream": true, "dj": {"djName": ""}}}"#;
        let response: StatusResponse = serde_json::from_str(json).unwrap();
        let status = Status::from_response(response, IDLE);
        assert!(status.live);
        assert_eq!(status.dj, "");
    }

    #[test]
    fn test_missing_and_null_fields() {
        let response: StatusResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(Status::from_response(response, IDLE), Status::default());

        let json = r#"{"main": {"np": null, "dj": {"djname": null}}}"#;
        let response: StatusResponse = serde_json::from_str(json).unwrap();
        assert_eq!(Status::from_response(response, IDLE), Status::default());
    }
}
