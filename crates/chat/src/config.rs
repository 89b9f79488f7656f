use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use plotline_stream::{DEFAULT_TOP_K, QueryRequest, SseTransport, StreamResult};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api/query/stream";
pub const CONFIG_DIRECTORY_NAME: &str = "plotline";
pub const CONFIG_FILE_NAME: &str = "config.toml";
const ENV_PREFIX: &str = "PLOTLINE_";

/// Connection settings for the query stream endpoint.
///
/// Layered as defaults, then the config file, then `PLOTLINE_*` environment
/// variables; later layers win per field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    #[serde(default)]
    pub collection_name: Option<String>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            top_k: default_top_k(),
            collection_name: None,
        }
    }
}

impl StreamConfig {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(CONFIG_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".plotline"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(CONFIG_FILE_NAME)
    }

    pub fn load() -> Self {
        Self::load_from(&Self::default_config_path())
    }

    /// A missing file is not an error; a malformed one logs and falls back
    /// to defaults rather than refusing to start.
    pub fn load_from(path: &Path) -> Self {
        let figment = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX));

        match figment.extract::<Self>() {
            Ok(config) => config.normalized(),
            Err(error) => {
                tracing::warn!(
                    "failed to load stream config from {:?}: {}. using defaults",
                    path,
                    error
                );
                Self::default()
            }
        }
    }

    pub fn normalized(mut self) -> Self {
        self.base_url = if self.base_url.trim().is_empty() {
            default_base_url()
        } else {
            self.base_url.trim().to_string()
        };
        if self.top_k == 0 {
            self.top_k = default_top_k();
        }
        self.collection_name = self
            .collection_name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty());

        self
    }

    pub fn to_transport(&self) -> StreamResult<SseTransport> {
        SseTransport::new(self.base_url.clone())
    }

    /// Builds a stream request with this config's retrieval settings applied.
    pub fn make_request(
        &self,
        question: impl Into<String>,
        conversation_id: impl Into<String>,
    ) -> QueryRequest {
        let mut request = QueryRequest::new(question, conversation_id).with_top_k(self.top_k);
        if let Some(collection_name) = &self.collection_name {
            request = request.with_collection(collection_name.clone());
        }
        request
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_top_k() -> u32 {
    DEFAULT_TOP_K
}
