//! 统一配置中心
//!
//! 加载顺序：内置默认值 → `CHATROOM_CONFIG_FILE` 指向的 YAML 文件（可选）
//! → `CHATROOM_` 前缀的环境变量（层级用 `__` 分隔，例如
//! `CHATROOM_REALTIME__PRESENCE_DEBOUNCE_MS=1500`）。

use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};

const CONFIG_FILE_VAR: &str = "CHATROOM_CONFIG_FILE";
const ENV_PREFIX: &str = "CHATROOM_";

/// 全局应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: JwtConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
    #[serde(default)]
    pub client: ClientConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// JWT配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub expiration_hours: i64,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: "dev-secret-key-not-for-production-use-minimum-32-chars".to_string(),
            expiration_hours: 24,
        }
    }
}

/// 数据库配置；`url` 为空时使用内存存储
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 5,
        }
    }
}

/// 实时层的计时参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// 输入状态在最后一次信号后保持的时长
    pub typing_timeout_ms: u64,
    /// 输入状态清扫周期
    pub typing_sweep_interval_ms: u64,
    /// 加入/离开事件的防抖静默期
    pub presence_debounce_ms: u64,
    pub presence_toast_ms: u64,
    pub online_toast_ms: u64,
    pub default_toast_ms: u64,
    /// 距底部多少像素以内视为“在底部”
    pub scroll_threshold_px: u32,
    /// 会话启动时加载的历史消息条数
    pub history_limit: usize,
    /// 服务端总线每个连接的缓冲容量
    pub bus_capacity: usize,
    pub reconnect_delay_ms: u64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            typing_timeout_ms: 1000,
            typing_sweep_interval_ms: 1000,
            presence_debounce_ms: 2000,
            presence_toast_ms: 2000,
            online_toast_ms: 3000,
            default_toast_ms: 5000,
            scroll_threshold_px: 50,
            history_limit: 100,
            bus_capacity: 256,
            reconnect_delay_ms: 1000,
        }
    }
}

impl RealtimeConfig {
    pub fn typing_timeout(&self) -> Duration {
        Duration::from_millis(self.typing_timeout_ms)
    }

    pub fn typing_sweep_interval(&self) -> Duration {
        Duration::from_millis(self.typing_sweep_interval_ms)
    }

    pub fn presence_debounce(&self) -> Duration {
        Duration::from_millis(self.presence_debounce_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

/// 客户端使用的传输实现
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    #[default]
    Websocket,
    Local,
}

/// 客户端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub server_url: String,
    pub transport: TransportKind,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8080".to_string(),
            transport: TransportKind::Websocket,
        }
    }
}

impl ClientConfig {
    /// 由 HTTP 地址推导出 WebSocket 地址
    pub fn websocket_url(&self) -> String {
        let base = self.server_url.trim_end_matches('/');
        if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}/api/v1/ws")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}/api/v1/ws")
        } else {
            format!("{base}/api/v1/ws")
        }
    }
}

impl AppConfig {
    /// 按 默认值 → 文件 → 环境变量 的优先级加载
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(AppConfig::default()));
        if let Ok(path) = std::env::var(CONFIG_FILE_VAR) {
            figment = figment.merge(Yaml::file(path));
        }
        Self::from_figment(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: AppConfig = figment
            .extract()
            .map_err(|err| ConfigError::Extract(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidServerConfig(
                "port must be greater than 0".to_string(),
            ));
        }

        if self.auth.secret.len() < 32 {
            return Err(ConfigError::InvalidJwtSecret(
                "JWT secret must be at least 32 characters long".to_string(),
            ));
        }

        if let Some(url) = &self.database.url {
            if url.is_empty() {
                return Err(ConfigError::InvalidDatabaseConfig(
                    "database url cannot be empty".to_string(),
                ));
            }
            if self.database.max_connections == 0 {
                return Err(ConfigError::InvalidDatabaseConfig(
                    "max connections must be greater than 0".to_string(),
                ));
            }
        }

        let realtime = &self.realtime;
        let timers = [
            ("typing_timeout_ms", realtime.typing_timeout_ms),
            ("typing_sweep_interval_ms", realtime.typing_sweep_interval_ms),
            ("presence_debounce_ms", realtime.presence_debounce_ms),
            ("reconnect_delay_ms", realtime.reconnect_delay_ms),
        ];
        for (name, value) in timers {
            if value == 0 {
                return Err(ConfigError::InvalidRealtimeConfig(format!(
                    "{name} must be greater than 0"
                )));
            }
        }
        if realtime.history_limit == 0 || realtime.bus_capacity == 0 {
            return Err(ConfigError::InvalidRealtimeConfig(
                "history_limit and bus_capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to extract configuration: {0}")]
    Extract(String),
    #[error("Invalid JWT secret: {0}")]
    InvalidJwtSecret(String),
    #[error("Invalid database configuration: {0}")]
    InvalidDatabaseConfig(String),
    #[error("Invalid server configuration: {0}")]
    InvalidServerConfig(String),
    #[error("Invalid realtime configuration: {0}")]
    InvalidRealtimeConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.realtime.typing_timeout(), Duration::from_millis(1000));
        assert_eq!(config.realtime.presence_debounce(), Duration::from_millis(2000));
        assert_eq!(config.realtime.history_limit, 100);
        assert!(config.database.url.is_none());
    }

    #[test]
    fn env_overrides_nested_values() {
        Jail::expect_with(|jail| {
            jail.set_env("CHATROOM_REALTIME__PRESENCE_DEBOUNCE_MS", "1500");
            jail.set_env("CHATROOM_SERVER__PORT", "9090");
            jail.set_env("CHATROOM_CLIENT__TRANSPORT", "local");

            let config = AppConfig::load().expect("config loads");
            assert_eq!(config.realtime.presence_debounce_ms, 1500);
            assert_eq!(config.server.port, 9090);
            assert_eq!(config.client.transport, TransportKind::Local);
            Ok(())
        });
    }

    #[test]
    fn yaml_file_is_merged_below_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "chatroom.yaml",
                "server:\n  host: 0.0.0.0\n  port: 7000\nrealtime:\n  typing_timeout_ms: 800\n",
            )?;
            jail.set_env("CHATROOM_CONFIG_FILE", "chatroom.yaml");
            jail.set_env("CHATROOM_SERVER__PORT", "7001");

            let config = AppConfig::load().expect("config loads");
            assert_eq!(config.server.host, "0.0.0.0");
            assert_eq!(config.server.port, 7001);
            assert_eq!(config.realtime.typing_timeout_ms, 800);
            assert_eq!(config.realtime.typing_sweep_interval_ms, 1000);
            Ok(())
        });
    }

    #[test]
    fn zero_timer_is_rejected() {
        let mut config = AppConfig::default();
        config.realtime.presence_debounce_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("presence_debounce_ms"));
    }

    #[test]
    fn short_secret_is_rejected() {
        let mut config = AppConfig::default();
        config.auth.secret = "short".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidJwtSecret(_))
        ));
    }

    #[test]
    fn websocket_url_follows_scheme() {
        let mut client = ClientConfig::default();
        assert_eq!(client.websocket_url(), "ws://127.0.0.1:8080/api/v1/ws");
        client.server_url = "https://chat.example.com/".to_string();
        assert_eq!(client.websocket_url(), "wss://chat.example.com/api/v1/ws");
    }
}
