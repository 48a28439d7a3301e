#![allow(dead_code)]

use std::path::Path;

use syncds::config::{ClientConfig, RawClientConfig, RawServerConfig, RawWatchRule, ServerConfig};

/// Builder for `ClientConfig` rooted at an existing directory.
pub struct ClientConfigBuilder {
    config: RawClientConfig,
}

impl ClientConfigBuilder {
    pub fn new(server: &str, base_dir: &Path) -> Self {
        Self {
            config: RawClientConfig {
                server: server.to_string(),
                base_dir: base_dir.to_path_buf(),
                interval_ms: 100,
                ..Default::default()
            },
        }
    }

    pub fn interval_ms(mut self, ms: u64) -> Self {
        self.config.interval_ms = ms;
        self
    }

    pub fn with_rule(mut self, rule: RawWatchRule) -> Self {
        self.config.watch.push(rule);
        self
    }

    pub fn build(self) -> ClientConfig {
        ClientConfig::try_from(self.config).expect("Failed to build valid client config")
    }
}

/// Builder for one `[[watch]]` table.
pub struct RuleBuilder {
    rule: RawWatchRule,
}

impl RuleBuilder {
    pub fn new(include: &[&str]) -> Self {
        Self {
            rule: RawWatchRule {
                include_paths: include.iter().map(|p| p.to_string()).collect(),
                ..Default::default()
            },
        }
    }

    pub fn include_file(mut self, re: &str) -> Self {
        self.rule.include_file_regexp = Some(re.to_string());
        self
    }

    pub fn exclude(mut self, re: &str) -> Self {
        self.rule.exclude_path_regexp = Some(re.to_string());
        self
    }

    pub fn deploy(mut self, cmd: &str) -> Self {
        self.rule.deploy_cmd = Some(cmd.to_string());
        self
    }

    pub fn deploy_on(mut self, re: &str) -> Self {
        self.rule.deploy_path_regexp = Some(re.to_string());
        self
    }

    pub fn kill_cmd(mut self, cmd: &str) -> Self {
        self.rule.deploy_kill_cmd = Some(cmd.to_string());
        self
    }

    pub fn build(self) -> RawWatchRule {
        self.rule
    }
}

/// Server config on an ephemeral port with a short deploy cool-down.
pub fn server_config(base_dir: &Path) -> ServerConfig {
    ServerConfig::try_from(RawServerConfig {
        listen: "127.0.0.1:0".to_string(),
        base_dir: base_dir.to_path_buf(),
        deploy_cooldown_ms: 50,
        fingerprint_cache_capacity: 16,
    })
    .expect("Failed to build valid server config")
}
