//! 统一配置管理
//!
//! 服务配置的"单一真理之源"：所有配置项的定义、默认值和校验都在这里。
//! 配置文件使用 TOML 格式。

use pedigree_nonce::NonceConfig;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};

/// 服务主配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PedigreeConfig {
    /// 服务实例名称
    ///
    /// 用于在日志中区分不同实例，如 pedigree-auth-01
    pub name: String,

    /// 运行环境标识
    ///
    /// - "dev": 开发环境
    /// - "prod": 生产环境
    /// - "test": 测试环境
    #[serde(default = "default_env")]
    pub env: String,

    /// HTTP 绑定配置
    #[serde(default)]
    pub bind: BindConfig,

    /// Nonce 服务配置（TTL 与清理间隔）
    #[serde(default)]
    pub nonce: NonceConfig,

    /// 可观测性配置
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// HTTP 绑定配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BindConfig {
    /// 监听 IP
    #[serde(default = "default_bind_ip")]
    pub ip: String,

    /// 监听端口，0 表示由系统分配
    #[serde(default = "default_bind_port")]
    pub port: u16,
}

/// 可观测性配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ObservabilityConfig {
    /// 过滤级别
    ///
    /// 支持 EnvFilter 语法（如 "info,hyper=warn"）。RUST_LOG 优先。
    #[serde(default = "default_filter_level")]
    pub filter_level: String,

    #[serde(default)]
    pub log: LogConfig,
}

/// 日志配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LogConfig {
    /// 日志输出目标
    ///
    /// - "console": 仅输出到控制台（默认）
    /// - "file": 输出到文件
    #[serde(default = "default_log_output")]
    pub output: String,

    /// 按天轮转（仅 output = "file" 时有效）
    #[serde(default)]
    pub rotate: bool,

    /// 日志文件目录（仅 output = "file" 时有效）
    #[serde(default = "default_log_path")]
    pub path: String,
}

fn default_env() -> String {
    "dev".to_string()
}

fn default_bind_ip() -> String {
    "0.0.0.0".to_string()
}

fn default_bind_port() -> u16 {
    8080
}

fn default_filter_level() -> String {
    "info".to_string()
}

fn default_log_output() -> String {
    "console".to_string()
}

fn default_log_path() -> String {
    "logs/".to_string()
}

impl Default for BindConfig {
    fn default() -> Self {
        Self {
            ip: default_bind_ip(),
            port: default_bind_port(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            filter_level: default_filter_level(),
            log: LogConfig::default(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            output: default_log_output(),
            rotate: false,
            path: default_log_path(),
        }
    }
}

impl Default for PedigreeConfig {
    fn default() -> Self {
        Self {
            name: "pedigree-default".to_string(),
            env: default_env(),
            bind: BindConfig::default(),
            nonce: NonceConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl PedigreeConfig {
    /// 从 TOML 文件加载配置
    pub fn from_file<P: AsRef<std::path::Path>>(
        path: P,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let path_ref = path.as_ref();

        if !path_ref.exists() {
            return Err(format!("Configuration file does not exist: {path_ref:?}").into());
        }

        if !path_ref.is_file() {
            return Err(format!("Path is not a valid file: {path_ref:?}").into());
        }

        let content = std::fs::read_to_string(path_ref)?;
        let config: PedigreeConfig = toml::from_str(&content)?;

        Ok(config)
    }

    /// 从 TOML 字符串加载配置
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// 将配置序列化为 TOML 字符串
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string(self)
    }

    /// 应用环境变量覆盖（nonce TTL / 清理间隔）
    pub fn apply_env_overrides(&mut self) -> Result<(), String> {
        self.nonce.apply_env_overrides()
    }

    /// 解析监听地址
    pub fn bind_addr(&self) -> Result<SocketAddr, String> {
        let ip: IpAddr = self
            .bind
            .ip
            .parse()
            .map_err(|e| format!("Invalid bind.ip {:?}: {e}", self.bind.ip))?;
        Ok(SocketAddr::new(ip, self.bind.port))
    }

    /// 验证配置有效性
    ///
    /// 以 "Warning:" 开头的条目不阻止启动
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.name.trim().is_empty() {
            errors.push("Instance name cannot be empty".to_string());
        }

        if !matches!(self.env.as_str(), "dev" | "prod" | "test") {
            errors.push(format!(
                "Invalid env {:?}. Must be one of: dev, prod, test",
                self.env
            ));
        }

        if let Err(e) = self.bind_addr() {
            errors.push(e);
        }

        if self.env == "prod" && self.bind.port == 0 {
            errors.push(
                "Warning: bind.port = 0 in prod picks a random port on every start".to_string(),
            );
        }

        if let Err(nonce_errors) = self.nonce.validate() {
            errors.extend(nonce_errors);
        }

        if !matches!(self.observability.log.output.as_str(), "console" | "file") {
            errors.push(format!(
                "Invalid observability.log.output {:?}. Must be \"console\" or \"file\"",
                self.observability.log.output
            ));
        }

        if self.observability.log.output == "file" && self.observability.log.path.trim().is_empty()
        {
            errors.push("observability.log.path cannot be empty when output = \"file\"".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// 返回可观测性配置引用
    pub fn observability_config(&self) -> &ObservabilityConfig {
        &self.observability
    }
}
