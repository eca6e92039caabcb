//! Live reload message protocol.
//!
//! JSON messages pushed to websocket clients:
//!
//! - `update`: a template was recompiled; clients reload that module
//! - `error`: a template failed to compile (display overlay, keep old module)
//! - `connected`: handshake greeting with the server version
//! - `reload`: full reload, e.g. after a registry changed shape

use serde::{Deserialize, Serialize};

use super::feed::BuildEvent;

/// Hot reload message sent over WebSocket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum HotReloadMessage {
    /// Recompiled template
    Update {
        id: String,
        /// Original source path
        orig: String,
        /// Compiled code path in the cache
        file: String,
        /// Exported component name
        name: String,
        code: String,
    },

    /// Compilation error
    Error { path: String, error: String },

    /// Connection established
    Connected {
        /// Server version for compatibility check
        version: String,
    },

    /// Full reload
    Reload {
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl HotReloadMessage {
    pub fn connected() -> Self {
        Self::Connected {
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn reload_with_reason(reason: impl Into<String>) -> Self {
        Self::Reload {
            reason: Some(reason.into()),
        }
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"type":"reload"}"#.to_string())
    }
}

impl From<&BuildEvent> for HotReloadMessage {
    fn from(event: &BuildEvent) -> Self {
        match event {
            BuildEvent::Changed(change) => Self::Update {
                id: change.id.to_string(),
                orig: change.orig.display().to_string(),
                file: change.file.display().to_string(),
                name: change.name.clone(),
                code: change.code.clone(),
            },
            BuildEvent::Failed { path, error, .. } => Self::Error {
                path: path.display().to_string(),
                error: error.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::LogicalId;
    use crate::reload::feed::ChangeEvent;
    use std::path::PathBuf;

    #[test]
    fn test_update_from_change_event() {
        let event = BuildEvent::Changed(ChangeEvent {
            id: LogicalId::from("page/home"),
            orig: PathBuf::from("/app/views/page/home.riot"),
            file: PathBuf::from("/app/.viewpack/views/page/home.riot.js"),
            name: "home".into(),
            code: "export default {}".into(),
        });

        let json = HotReloadMessage::from(&event).to_json();
        assert!(json.starts_with(r#"{"type":"update""#));
        assert!(json.contains(r#""id":"page/home""#));
        assert!(json.contains(r#""name":"home""#));
    }

    #[test]
    fn test_error_from_failed_event() {
        let event = BuildEvent::Failed {
            id: LogicalId::from("page/bad"),
            path: PathBuf::from("/app/views/page/bad.riot"),
            error: "unexpected token".into(),
        };

        let parsed: HotReloadMessage =
            serde_json::from_str(&HotReloadMessage::from(&event).to_json()).unwrap();
        assert_eq!(
            parsed,
            HotReloadMessage::Error {
                path: "/app/views/page/bad.riot".into(),
                error: "unexpected token".into(),
            }
        );
    }

    #[test]
    fn test_reload_message() {
        let json = HotReloadMessage::reload_with_reason("registry changed").to_json();
        assert!(json.contains(r#""type":"reload""#));
        assert!(json.contains(r#""reason":"registry changed""#));

        let bare = HotReloadMessage::Reload { reason: None }.to_json();
        assert_eq!(bare, r#"{"type":"reload"}"#);
    }

    #[test]
    fn test_connected_carries_version() {
        let json = HotReloadMessage::connected().to_json();
        assert!(json.contains(env!("CARGO_PKG_VERSION")));
    }
}
