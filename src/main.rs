//! realitybot - Entry Point
//!
//! Telegram administration bot for a VLESS+Reality VPN host.

use realitybot::Config;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("realitybot v{}", env!("CARGO_PKG_VERSION"));
        println!();
        println!("Usage: realitybot");
        println!();
        println!("Environment variables:");
        println!("  TELOXIDE_TOKEN                  Telegram bot token (required)");
        println!("  ADMIN_CHAT_ID                   Seed admin chat id");
        println!("  REALITYBOT_DB_PATH              SQLite path (admins + audit)");
        println!("  VLESS_MODULES_DIR               Management scripts directory");
        println!("  VLESS_USERS_FILE                VPN user database (JSON)");
        println!("  REALITYBOT_MAX_FAILED_ATTEMPTS  Lockout threshold (default 3)");
        println!("  REALITYBOT_LOCKOUT_SECS         Lockout window (default 300)");
        println!("  REALITYBOT_CONFIRM_TTL_SECS     Confirmation TTL (default 120)");
        println!("  REALITYBOT_SHELL_TIMEOUT_SECS   Script timeout (default 30)");
        return Ok(());
    }

    let log_level = std::env::var("RUST_LOG")
        .map(|s| match s.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        })
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("realitybot v{}", env!("CARGO_PKG_VERSION"));

    // Missing credentials are fatal before any dispatch occurs
    let config = Config::from_env()?;

    realitybot::telegram::run_bot(config).await
}
