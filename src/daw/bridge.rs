//! DAW scripting bridge client
//!
//! Talks to a small scripting bridge running inside the DAW over JSON RPC:
//! every [`ProjectHandle`] call is one `POST {bridge}/rpc` carrying a method
//! name and parameters. Renders are triggered through the DAW's own web
//! interface instead, whose request only returns once the render finished.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::daw::{ParamRef, ProjectHandle, TempoMarker, Track, TrackFlag, TrackId};
use crate::error::{MixdownError, Result};

/// Default address of the scripting bridge.
pub const DEFAULT_BRIDGE_URL: &str = "http://localhost:2307";
/// Default port of the DAW web interface.
pub const DEFAULT_WEB_PORT: u16 = 8080;

/// Web interface command id of "File: Render project, using the most recent render settings".
const RENDER_COMMAND_ID: u32 = 42230;

const CALL_TIMEOUT: Duration = Duration::from_secs(30);
/// Long songs and stems take a while.
const RENDER_TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);

/// Request to the scripting bridge
#[derive(Debug, Serialize)]
struct BridgeRequest<'a> {
    method: &'a str,
    params: serde_json::Value,
}

/// Response from the scripting bridge
#[derive(Debug, Deserialize)]
struct BridgeResponse {
    ok: bool,
    #[serde(default)]
    result: serde_json::Value,
    #[serde(default)]
    error: Option<String>,
}

impl BridgeResponse {
    fn into_result<T: DeserializeOwned>(self, method: &str) -> Result<T> {
        if !self.ok {
            return Err(MixdownError::Bridge {
                method: method.to_string(),
                message: self.error.unwrap_or_else(|| "unknown error".to_string()),
            });
        }
        serde_json::from_value(self.result).map_err(|e| MixdownError::Bridge {
            method: method.to_string(),
            message: format!("Invalid response from bridge: {e}"),
        })
    }
}

fn param_json(param: &ParamRef) -> serde_json::Value {
    json!({ "track": param.track, "fx": param.fx, "param": param.param })
}

/// The project currently open in a running DAW.
pub struct BridgeProject {
    client: reqwest::blocking::Client,
    render_client: reqwest::blocking::Client,
    bridge_url: String,
    render_url: String,
}

impl BridgeProject {
    /// Connect to the bridge and the web interface of a running DAW.
    pub fn connect(bridge_url: &str, web_port: u16) -> Result<Self> {
        let build = |timeout| {
            reqwest::blocking::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| MixdownError::DawUnreachable {
                    reason: e.to_string(),
                })
        };

        let project = Self {
            client: build(CALL_TIMEOUT)?,
            render_client: build(RENDER_TIMEOUT)?,
            bridge_url: bridge_url.trim_end_matches('/').to_string(),
            render_url: format!("http://localhost:{web_port}/_/{RENDER_COMMAND_ID}"),
        };

        let dir = project.project_dir()?;
        debug!("Connected to DAW, current project {}", dir.display());
        Ok(project)
    }

    fn call<T: DeserializeOwned>(&self, method: &str, params: serde_json::Value) -> Result<T> {
        let url = format!("{}/rpc", self.bridge_url);
        let request = BridgeRequest { method, params };

        let response = self.client.post(&url).json(&request).send().map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                MixdownError::DawUnreachable {
                    reason: format!("Cannot reach bridge at {}: {}", self.bridge_url, e),
                }
            } else {
                MixdownError::Bridge {
                    method: method.to_string(),
                    message: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(MixdownError::Bridge {
                method: method.to_string(),
                message: format!("Bridge returned {status}"),
            });
        }

        response
            .json::<BridgeResponse>()
            .map_err(|e| MixdownError::Bridge {
                method: method.to_string(),
                message: format!("Invalid response from bridge: {e}"),
            })?
            .into_result(method)
    }
}

impl ProjectHandle for BridgeProject {
    fn tracks(&self) -> Result<Vec<Track>> {
        self.call("tracks", json!({}))
    }

    fn master_track(&self) -> Result<Track> {
        self.call("master_track", json!({}))
    }

    fn project_dir(&self) -> Result<PathBuf> {
        self.call("project_dir", json!({}))
    }

    fn open_project(&self, file: &Path) -> Result<()> {
        self.call("open_project", json!({ "file": file }))
    }

    fn track_flag(&self, track: &TrackId, flag: TrackFlag) -> Result<bool> {
        self.call("track_flag", json!({ "track": track, "flag": flag }))
    }

    fn set_track_flag(&self, track: &TrackId, flag: TrackFlag, value: bool) -> Result<()> {
        self.call(
            "set_track_flag",
            json!({ "track": track, "flag": flag, "value": value }),
        )
    }

    fn fx_enabled(&self, track: &TrackId, fx: usize) -> Result<bool> {
        self.call("fx_enabled", json!({ "track": track, "fx": fx }))
    }

    fn set_fx_enabled(&self, track: &TrackId, fx: usize, enabled: bool) -> Result<()> {
        self.call(
            "set_fx_enabled",
            json!({ "track": track, "fx": fx, "enabled": enabled }),
        )
    }

    fn param_normalized(&self, param: &ParamRef) -> Result<f64> {
        self.call("param_normalized", param_json(param))
    }

    fn set_param_normalized(&self, param: &ParamRef, value: f64) -> Result<()> {
        let mut params = param_json(param);
        params["value"] = json!(value);
        self.call("set_param_normalized", params)
    }

    fn info_string(&self, key: &str) -> Result<String> {
        self.call("info_string", json!({ "key": key }))
    }

    fn set_info_string(&self, key: &str, value: &str) -> Result<()> {
        self.call("set_info_string", json!({ "key": key, "value": value }))
    }

    fn info_value(&self, key: &str) -> Result<f64> {
        self.call("info_value", json!({ "key": key }))
    }

    fn set_info_value(&self, key: &str, value: f64) -> Result<()> {
        self.call("set_info_value", json!({ "key": key, "value": value }))
    }

    fn int_config_var(&self, name: &str) -> Result<i64> {
        self.call("int_config_var", json!({ "name": name }))
    }

    fn set_int_config_var(&self, name: &str, value: i64) -> Result<()> {
        self.call("set_int_config_var", json!({ "name": name, "value": value }))
    }

    fn cursor_position(&self) -> Result<f64> {
        self.call("cursor_position", json!({}))
    }

    fn set_cursor_position(&self, position: f64) -> Result<()> {
        self.call("set_cursor_position", json!({ "position": position }))
    }

    fn tempo_markers(&self) -> Result<Vec<TempoMarker>> {
        self.call("tempo_markers", json!({}))
    }

    fn set_tempo_markers(&self, markers: &[TempoMarker]) -> Result<()> {
        self.call("set_tempo_markers", json!({ "markers": markers }))
    }

    fn notes(&self) -> Result<String> {
        self.call("notes", json!({}))
    }

    fn render(&self) -> Result<()> {
        info!("Triggering render via {}", self.render_url);
        let response = self
            .render_client
            .get(&self.render_url)
            .send()
            .map_err(|e| MixdownError::DawUnreachable {
                reason: format!("Cannot trigger render at {}: {}", self.render_url, e),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(MixdownError::Bridge {
                method: "render".to_string(),
                message: format!("Web interface returned {status}"),
            });
        }
        Ok(())
    }

    fn save(&self) -> Result<()> {
        self.call("save", json!({}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_request_shape() {
        let param = ParamRef {
            track: TrackId::new("{A1B2}"),
            fx: 3,
            param: 1,
        };
        let request = BridgeRequest {
            method: "param_normalized",
            params: param_json(&param),
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "method": "param_normalized",
                "params": { "track": "{A1B2}", "fx": 3, "param": 1 }
            })
        );
    }

    #[test]
    fn test_response_result() {
        let response: BridgeResponse =
            serde_json::from_str(r#"{"ok": true, "result": 0.5}"#).unwrap();
        let value: f64 = response.into_result("param_normalized").unwrap();
        assert_eq!(value, 0.5);

        let response: BridgeResponse = serde_json::from_str(r#"{"ok": true}"#).unwrap();
        let _: () = response.into_result("save").unwrap();
    }

    #[test]
    fn test_response_error() {
        let response: BridgeResponse =
            serde_json::from_str(r#"{"ok": false, "error": "no such track"}"#).unwrap();
        let err = response.into_result::<bool>("track_flag").unwrap_err();
        assert_eq!(err.error_code(), "BRIDGE_ERROR");
        assert!(err.to_string().contains("no such track"));
    }

    #[test]
    fn test_tracks_deserialize_with_defaults() {
        let response: BridgeResponse = serde_json::from_str(
            r#"{"ok": true, "result": [
                {"id": "1", "name": "Vocals", "items": [{"position": 1.0, "length": 2.0}]},
                {"id": "2", "name": "Harmony", "parent": "1", "muted": true}
            ]}"#,
        )
        .unwrap();
        let tracks: Vec<Track> = response.into_result("tracks").unwrap();
        assert_eq!(tracks[0].items[0].end(), 3.0);
        assert_eq!(tracks[1].parent, Some(TrackId::new("1")));
        assert!(tracks[1].muted);
    }

    #[test]
    fn test_connect_unreachable() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let err = BridgeProject::connect(&format!("http://127.0.0.1:{port}"), 8080)
            .err()
            .unwrap();
        assert_eq!(err.error_code(), "DAW_UNREACHABLE");
    }
}
