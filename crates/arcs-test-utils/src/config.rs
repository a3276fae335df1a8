//! Configuration builders for tests.

use std::path::Path;

use arcs_config::AppConfig;

/// Fluent builder for [`AppConfig`] in tests.
///
/// Starts from the defaults, with the listener moved to loopback.
///
/// ```ignore
/// let config = TestConfigBuilder::new()
///     .manifests_path(dir.path())
///     .strict(true)
///     .header("Authorization", "Bearer test")
///     .build();
/// ```
pub struct TestConfigBuilder {
    config: AppConfig,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        let mut config = AppConfig::default();
        config.server.listen_addr = "127.0.0.1".to_string();
        Self { config }
    }

    pub fn listen_addr(mut self, addr: &str) -> Self {
        self.config.server.listen_addr = addr.to_string();
        self
    }

    pub fn listen_port(mut self, port: u16) -> Self {
        self.config.server.listen_port = port;
        self
    }

    pub fn manifests_path(mut self, path: impl AsRef<Path>) -> Self {
        self.config.manifests.path = path.as_ref().display().to_string();
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.config.manifests.strict = strict;
        self
    }

    pub fn user_agent(mut self, agent: &str) -> Self {
        self.config.fetch.user_agent = Some(agent.to_string());
        self
    }

    /// Add a static header sent with every http(s) fetch.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.config
            .fetch
            .headers
            .insert(name.to_string(), value.to_string());
        self
    }

    pub fn log_level(mut self, level: &str) -> Self {
        self.config.logging.level = level.to_string();
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_output_validates() {
        let config = TestConfigBuilder::new()
            .manifests_path("/tmp/manifests")
            .strict(true)
            .header("X-Scope", "tenant-a")
            .user_agent("arcs-test")
            .build();

        config.validate().unwrap();
        assert_eq!(config.server.listen_addr, "127.0.0.1");
        assert_eq!(config.manifests.path, "/tmp/manifests");
        assert!(config.manifests.strict);
        assert_eq!(config.fetch.headers["X-Scope"], "tenant-a");
    }
}
