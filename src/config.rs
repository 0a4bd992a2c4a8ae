use anyhow::Result;
use figment::{providers::{Env, Format, Toml}, Figment};
use serde::Deserialize;
use std::net::SocketAddr;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

fn default_request_timeout_secs() -> u64 {
    300
}

/// Limits and model options applied to every optimisation run.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Runs against data sets with more demand points than this are refused.
    pub max_demand_points: usize,
    /// Deadline for a single solver call; 0 disables it.
    pub solve_timeout_secs: u64,
    /// Model flows as whole units. When false, flows are continuous.
    pub integer_flows: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_demand_points: 200,
            solve_timeout_secs: 60,
            integer_flows: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DbConfig {
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub format: LogFormat,
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            filter: "info,hyper=warn,tower_http=info,sqlx=warn".to_string(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Toml::file("config/default.toml"))
            .merge(Env::prefixed("FLP__").split("__"));
        Ok(figment.extract()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optimizer_section_defaults_to_reference_limits() {
        let cfg: Config = Figment::new()
            .merge(Toml::string(
                r#"
                [server]
                host = "127.0.0.1"
                port = 8080
                "#,
            ))
            .extract()
            .unwrap();

        assert_eq!(cfg.optimizer.max_demand_points, 200);
        assert_eq!(cfg.optimizer.solve_timeout_secs, 60);
        assert!(cfg.optimizer.integer_flows);
        assert_eq!(cfg.server.request_timeout_secs, 300);
        assert!(cfg.db.url.is_empty());
        assert_eq!(cfg.log.format, LogFormat::Json);
    }

    #[test]
    fn partial_optimizer_section_keeps_other_defaults() {
        let cfg: Config = Figment::new()
            .merge(Toml::string(
                r#"
                [server]
                host = "0.0.0.0"
                port = 9000

                [optimizer]
                max_demand_points = 50

                [log]
                format = "pretty"
                "#,
            ))
            .extract()
            .unwrap();

        assert_eq!(cfg.optimizer.max_demand_points, 50);
        assert!(cfg.optimizer.integer_flows);
        assert_eq!(cfg.server.socket_addr().unwrap().port(), 9000);
        assert_eq!(cfg.log.format, LogFormat::Pretty);
    }
}
