use std::time::Duration;

use crate::errors::ServiceError;

/// Configuration for the Ollama client.
#[derive(Clone, Debug)]
pub struct OllamaClientConfig {
    /// Base URL of the Ollama server.
    pub host: String,
    /// Upper bound on establishing the connection. Generation itself is
    /// bounded by the stream's fragment timeout instead.
    pub connect_timeout: Duration,
    /// Sampling temperature sent with every request.
    pub temperature: f32,
}

impl Default for OllamaClientConfig {
    fn default() -> Self {
        Self::new("http://localhost:11434")
    }
}

impl OllamaClientConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            connect_timeout: Duration::from_secs(10),
            temperature: 0.7,
        }
    }

    /// Builds a config from `OLLAMA_HOST`, falling back to the local default.
    pub fn from_env() -> Result<Self, ServiceError> {
        match std::env::var("OLLAMA_HOST") {
            Ok(host) if !host.trim().is_empty() => Self::new(host.trim()).validated(),
            _ => Ok(Self::default()),
        }
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub(crate) fn validated(self) -> Result<Self, ServiceError> {
        let host = self.host.trim();
        if !(host.starts_with("http://") || host.starts_with("https://")) {
            return Err(ServiceError::Config(format!(
                "Ollama host must be an http(s) URL, got {host:?}"
            )));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ServiceError::Config(format!(
                "Ollama temperature must be within 0.0..=2.0, got {}",
                self.temperature
            )));
        }
        Ok(self)
    }

    pub(crate) fn generate_url(&self) -> String {
        format!("{}/api/generate", self.host.trim().trim_end_matches('/'))
    }
}
