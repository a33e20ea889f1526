//! Pedigree 登录 nonce 服务主程序
//!
//! 加载配置、初始化日志，启动 nonce HTTP 服务与后台过期清理任务

mod cli;
mod error;
mod observability;

use clap::Parser;
use observability::init_observability;
use pedigree::{NonceService, PedigreeConfig};
use std::path::{Path, PathBuf};
use tokio::net::TcpListener;

use tracing::{error, info};

macro_rules! bootstrap_info {
    ($($arg:tt)*) => {
        println!($($arg)*);
    };
}

macro_rules! bootstrap_error {
    ($($arg:tt)*) => {
        eprintln!($($arg)*);
    };
}

use cli::{Cli, Commands};
use error::{Error, Result};

/// Application launcher utilities
struct ApplicationLauncher;

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Some(Commands::Test { config_file }) => {
            let config_path =
                ApplicationLauncher::find_config_file(config_file.as_ref().unwrap_or(&cli.config))?;
            ApplicationLauncher::test_config_file(&config_path)
        }
        None => {
            let config_path = ApplicationLauncher::find_config_file(&cli.config)?;

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;

            runtime.block_on(ApplicationLauncher::run_application(&config_path))
        }
    }
}

impl ApplicationLauncher {
    /// Find config file with fallback locations
    fn find_config_file(provided_path: &PathBuf) -> Result<PathBuf> {
        if provided_path != Path::new("config.toml") {
            if provided_path.exists() {
                bootstrap_info!("Using provided config file: {:?}", provided_path);
                return Ok(provided_path.clone());
            } else {
                bootstrap_error!("Provided config file not found: {:?}", provided_path);
                return Err(Error::custom(format!(
                    "Config file not found: {provided_path:?}"
                )));
            }
        }

        let fallback_paths = vec![
            // 1. Current working directory
            PathBuf::from("config.toml"),
            // 2. System config directory
            PathBuf::from("/etc/pedigree/config.toml"),
        ];

        bootstrap_info!("Searching for config file in default locations...");

        for path in &fallback_paths {
            if path.exists() {
                bootstrap_info!("Found config file: {:?}", path);
                return Ok(path.clone());
            } else {
                bootstrap_info!("Config not found at: {:?}", path);
            }
        }

        bootstrap_error!("No configuration file found!");
        bootstrap_error!("Please create a config file in one of these locations:");
        for (i, path) in fallback_paths.iter().enumerate() {
            bootstrap_error!("  {}. {:?}", i + 1, path);
        }
        bootstrap_error!("Or specify a custom path with: pedigree --config <path>");

        Err(Error::custom(
            "No configuration file found. Please create one or specify path with --config",
        ))
    }

    /// 加载配置并应用环境变量覆盖
    fn load_config(config_path: &Path) -> Result<PedigreeConfig> {
        let mut config = PedigreeConfig::from_file(config_path)
            .map_err(|e| Error::service_validation(format!("配置解析失败: {e}")))?;
        config
            .apply_env_overrides()
            .map_err(|e| Error::service_validation(format!("环境变量覆盖失败: {e}")))?;
        Ok(config)
    }

    /// 测试配置文件是否有效
    fn test_config_file(config_path: &Path) -> Result<()> {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .init();

        let config = match Self::load_config(config_path) {
            Ok(config) => {
                info!("✅ 配置文件解析成功: {:?}", config_path);
                config
            }
            Err(e) => {
                error!("❌ {}", e);
                return Err(e);
            }
        };

        match config.validate() {
            Ok(()) => {
                info!("✅ 配置验证通过");
                Ok(())
            }
            Err(errors) => {
                error!("❌ 配置验证发现问题:");
                for (i, err) in errors.iter().enumerate() {
                    if err.starts_with("Warning:") {
                        info!("  {}. ⚠️  {}", i + 1, err);
                    } else {
                        error!("  {}. ❌ {}", i + 1, err);
                    }
                }
                if errors.iter().any(|e| !e.starts_with("Warning:")) {
                    return Err(Error::service_validation("配置验证失败".to_string()));
                }
                Ok(())
            }
        }
    }

    /// 运行应用程序的主入口
    async fn run_application(config_path: &Path) -> Result<()> {
        bootstrap_info!("📄 加载配置文件: {:?}", config_path);

        let config = match Self::load_config(config_path) {
            Ok(config) => {
                bootstrap_info!("✅ 配置加载成功");
                config
            }
            Err(e) => {
                bootstrap_error!("❌ 配置加载失败: {}", e);
                return Err(e);
            }
        };

        if let Err(errors) = config.validate() {
            bootstrap_error!("❌ 配置验证发现问题:");
            let mut has_critical_errors = false;
            for (i, err) in errors.iter().enumerate() {
                if err.starts_with("Warning:") {
                    bootstrap_info!("  {}. ⚠️  {}", i + 1, err);
                } else {
                    bootstrap_error!("  {}. ❌ {}", i + 1, err);
                    has_critical_errors = true;
                }
            }
            if has_critical_errors {
                return Err(Error::custom("配置验证失败，请修复上述错误".to_string()));
            }
        }

        let _observability_guard = init_observability(&config)?;

        Self::run_service(config).await
    }

    /// 绑定监听端口并运行 nonce 服务直至收到关闭信号
    async fn run_service(config: PedigreeConfig) -> Result<()> {
        info!(
            "🚀 启动 nonce 服务 {} (env={}, ttl={}s, sweep={}s)",
            config.name,
            config.env,
            config.nonce.ttl_secs,
            config.nonce.sweep_interval_secs
        );

        let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(10);
        setup_ctrl_c_handler(shutdown_tx.clone()).await;

        let addr = config.bind_addr().map_err(Error::service_startup)?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::service_startup(format!("Failed to bind {addr}: {e}")))?;

        let service = NonceService::new(&config.nonce)?;
        service.serve(listener, shutdown_tx.subscribe()).await?;

        info!("✅ nonce 服务已停止");
        Ok(())
    }
}

async fn setup_ctrl_c_handler(shutdown_tx: tokio::sync::broadcast::Sender<()>) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("无法监听Ctrl-C信号: {}", e);
            return;
        }
        info!("收到Ctrl-C信号，开始优雅关闭...");
        let _ = shutdown_tx.send(());
    });
}
