use serde::{Deserialize, Serialize};

/// STUN/TURN servers handed to the peer-connection primitive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IceConfig {
    pub servers: Vec<String>,
}

impl Default for IceConfig {
    fn default() -> Self {
        Self {
            servers: vec!["stun:stun.l.google.com:19302".into()],
        }
    }
}
