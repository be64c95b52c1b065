//! 工时系统认证服务主入口

use std::sync::Arc;
use std::time::Duration;
use timesheet_service::{
    auth::PasswordHasher,
    config::{AppConfig, MailTransport},
    db,
    middleware::AppState,
    repository::{ResetTokenRepository, UserRepository},
    routes,
    services::{LogMailSender, MailSender, PasswordResetService, SmtpMailSender},
    telemetry,
};
use tokio::net::TcpListener;
use tokio::signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ===== CLI 参数处理 =====
    let args: Vec<String> = std::env::args().collect();

    if args.len() > 1 {
        match args[1].as_str() {
            "--version" => {
                println!("timesheet-service {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" => {
                print_help();
                return Ok(());
            }
            _ => {
                eprintln!("未知参数: {}", args[1]);
                print_help();
                std::process::exit(1);
            }
        }
    }

    // 加载 .env 文件（开发环境）
    if let Ok(env) = std::env::var("TIMESHEET_ENV") {
        dotenv::from_filename(format!(".env.{}", env)).ok();
    } else {
        dotenv::from_filename(".env.local").ok();
        dotenv::dotenv().ok();
    }

    // 1. 加载配置
    let config = AppConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        anyhow::anyhow!("Failed to load configuration: {}", e)
    })?;

    // 2. 初始化日志
    telemetry::init_telemetry(&config.logging);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Timesheet service starting...");

    // 3. 数据库连接池 + 迁移
    let db_pool = db::create_pool(&config.database).await?;
    db::run_migrations(&db_pool).await?;

    tracing::info!("Database initialized");

    // 4. 构建应用状态
    let credentials = Arc::new(UserRepository::new(db_pool.clone()));
    let reset_tokens = Arc::new(ResetTokenRepository::new(db_pool.clone()));
    let mailer: Arc<dyn MailSender> = match config.mail.transport {
        MailTransport::Smtp => Arc::new(SmtpMailSender::from_profiles(&config.mail.senders)?),
        MailTransport::Log => {
            tracing::warn!("Mail transport is 'log': reset emails are not delivered");
            Arc::new(LogMailSender::new(config.mail.senders.clone()))
        }
    };

    let app_state = Arc::new(AppState::new(
        config.clone(),
        credentials,
        reset_tokens,
        mailer,
        Arc::new(PasswordHasher::new()),
    )?);

    // 5. 过期重置令牌清理任务
    if config.reset.purge_interval_secs > 0 {
        spawn_purge_task(
            app_state.password_reset_service.clone(),
            Duration::from_secs(config.reset.purge_interval_secs),
        );
    }

    // 6. 构建路由
    let app = routes::create_router(app_state);

    // 7. 启动服务器
    let addr = &config.server.addr;
    let listener = TcpListener::bind(addr).await?;

    tracing::info!(addr = %addr, "Server listening");

    // 8. 优雅关闭
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(config.server.graceful_shutdown_timeout_secs))
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// 周期性删除已过期的重置令牌
fn spawn_purge_task(service: Arc<PasswordResetService>, period: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // 首次 tick 立即返回
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if let Err(e) = service.purge_expired().await {
                tracing::error!(error = %e, "Failed to purge expired reset tokens");
            }
        }
    });
}

/// 优雅关闭信号处理
async fn shutdown_signal(timeout_secs: u64) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Ctrl+C received, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Terminate signal received, starting graceful shutdown");
        },
    }

    // 超时后强制退出
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(timeout_secs)).await;
        tracing::warn!("Graceful shutdown timeout reached, forcing exit");
        std::process::exit(1);
    });
}

/// 打印帮助信息
fn print_help() {
    println!("timesheet-service {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("用法: timesheet-service [选项]");
    println!();
    println!("选项:");
    println!("  --version     打印版本信息并退出");
    println!("  --help        打印此帮助信息并退出");
    println!();
    println!("环境变量:");
    println!("  所有配置通过 TIMESHEET_ 前缀的环境变量完成");
    println!("  可用选项请参考 .env.example");
}
