use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoaderConfig {
    /// Marker placed in front of origin URLs so the playback engine routes
    /// them to the loader instead of fetching them itself.
    #[serde(default = "default_url_prefix")]
    pub url_prefix: String,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            url_prefix: default_url_prefix(),
        }
    }
}

fn default_url_prefix() -> String {
    "AudioNet".to_string()
}
