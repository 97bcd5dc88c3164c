//! Which stream occupies the main stage.
//!
//! Pure function of the current streams and the user's selection; the room
//! re-runs it after every change.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::media::MediaTrackBundle;

/// What the user asked to look at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "peerId", rename_all = "lowercase")]
pub enum FocusSelection {
    #[default]
    None,
    Peer(String),
    Screen,
}

/// Which rule picked the focused stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "rule", content = "peerId", rename_all = "kebab-case")]
pub enum FocusRule {
    RemoteScreen(String),
    LocalScreen,
    RemoteCamera(String),
    LocalCamera,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Focus {
    pub rule: FocusRule,
    pub stream: Option<MediaTrackBundle>,
}

/// Streams received from one remote participant.
#[derive(Debug, Clone, Default)]
pub struct RemoteFeed {
    pub camera: Option<MediaTrackBundle>,
    pub screen: Option<MediaTrackBundle>,
}

pub struct FocusInputs<'a> {
    pub local_camera: Option<&'a MediaTrackBundle>,
    pub local_screen: Option<&'a MediaTrackBundle>,
    /// Ordered by peer id so ties resolve the same way everywhere.
    pub remotes: &'a BTreeMap<String, RemoteFeed>,
    pub selection: &'a FocusSelection,
}

/// Highest-priority available stream:
/// a remote screen, then the local screen, then the selected peer's camera,
/// then the local camera.
pub fn resolve(inputs: &FocusInputs<'_>) -> Focus {
    if let Some((peer_id, screen)) = remote_screen(inputs) {
        return Focus {
            rule: FocusRule::RemoteScreen(peer_id.to_string()),
            stream: Some(screen.clone()),
        };
    }

    if let Some(screen) = inputs.local_screen {
        if matches!(inputs.selection, FocusSelection::None | FocusSelection::Screen) {
            return Focus {
                rule: FocusRule::LocalScreen,
                stream: Some(screen.clone()),
            };
        }
    }

    if let FocusSelection::Peer(peer_id) = inputs.selection {
        if let Some(camera) = inputs.remotes.get(peer_id).and_then(|f| f.camera.as_ref()) {
            return Focus {
                rule: FocusRule::RemoteCamera(peer_id.clone()),
                stream: Some(camera.clone()),
            };
        }
    }

    Focus {
        rule: FocusRule::LocalCamera,
        stream: inputs.local_camera.cloned(),
    }
}

fn remote_screen<'a>(inputs: &FocusInputs<'a>) -> Option<(&'a str, &'a MediaTrackBundle)> {
    if let FocusSelection::Peer(selected) = inputs.selection {
        if let Some((id, feed)) = inputs.remotes.get_key_value(selected) {
            if let Some(screen) = &feed.screen {
                return Some((id.as_str(), screen));
            }
        }
    }
    inputs
        .remotes
        .iter()
        .find_map(|(id, feed)| feed.screen.as_ref().map(|s| (id.as_str(), s)))
}
