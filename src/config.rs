use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub listen_addr: String,
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
    #[serde(default = "default_fetch_timeout_seconds")]
    pub fetch_timeout_seconds: u64,
    #[serde(default = "default_max_request_bytes")]
    pub max_request_bytes: usize,
    #[serde(default = "default_allowed_origin")]
    pub allowed_origin: String,
}

fn default_max_concurrent_requests() -> usize {
    32
}

fn default_fetch_timeout_seconds() -> u64 {
    30
}

fn default_max_request_bytes() -> usize {
    64 * 1024
}

fn default_allowed_origin() -> String {
    "*".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen_addr: "127.0.0.1:4430".to_string(),
            max_concurrent_requests: default_max_concurrent_requests(),
            fetch_timeout_seconds: default_fetch_timeout_seconds(),
            max_request_bytes: default_max_request_bytes(),
            allowed_origin: default_allowed_origin(),
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_file(&self, path: &str) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
