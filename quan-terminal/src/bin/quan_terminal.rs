/// Quan Terminal headless driver
///
/// Reads line commands from stdin, drives the [`ScreenRouter`] and logs feed updates.
/// Configuration comes from `QUAN_*` environment variables, log level from `RUST_LOG`.
use std::error::Error;

use quan_terminal::{
    AppContext, ClientConfig, FeedUpdate, Screen, ScreenRouter, logging::init_logging,
    shared::types::BotConfig,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

const HELP: &str = "\
commands:
  login <user> <password>      register <user> <password>      logout
  setup <api_key> <api_secret> nav <dashboard|config|apikey>   symbol <SYMBOL>
  refresh  status  start  stop  add [mode] [symbol]  stop-bot <id>
  save-config  stop-all-bots  stop-all-coins  help  quit";

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    init_logging();

    let config = ClientConfig::from_env()?;
    let (context, mut feed_rx) = AppContext::connect(config)?;
    let mut router = ScreenRouter::new(context);
    router.start().await;
    report(&router);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                if !run_command(&mut router, line.trim()).await {
                    break;
                }
                report(&router);
            }
            Some(event) = feed_rx.recv() => {
                if let Some(update) = router.handle_feed_event(event) {
                    log_update(&update);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    router.teardown();
    Ok(())
}

/// Execute one command line, returning false when the driver should exit.
async fn run_command(router: &mut ScreenRouter, line: &str) -> bool {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let Some((&command, args)) = parts.split_first() else {
        return true;
    };

    let result = match (command, args) {
        ("quit" | "exit", _) => return false,
        ("help", _) => {
            println!("{HELP}");
            Ok(())
        }
        ("login", [user, password]) => router.login(user, password).await,
        ("register", [user, password]) => router.register(user, password).await,
        ("logout", _) => {
            router.logout();
            Ok(())
        }
        ("setup", [key, secret]) => router.setup_account(key, secret).await,
        ("nav", [target]) => match parse_screen(target) {
            Some(screen) => router.navigate(screen).await,
            None => {
                println!("unknown screen: {target}");
                Ok(())
            }
        },
        ("symbol", [symbol]) => router.change_symbol(symbol),
        ("refresh", _) => router.refresh_dashboard().await,
        ("status", _) => router.refresh_bot_status().await,
        ("start", _) => router.start_bots().await,
        ("stop", _) => router.stop_bots().await,
        ("add", rest) => {
            let mut config = router.bot_config().cloned().unwrap_or_default();
            if let Some(mode) = rest.first() {
                config.bot_mode = mode.to_string();
            }
            if let Some(symbol) = rest.get(1) {
                config.symbol = symbol.to_uppercase();
            }
            router.add_bot(&config).await
        }
        ("save-config", _) => {
            let config = router.bot_config().cloned().unwrap_or_else(BotConfig::default);
            router.save_bot_config(config).await
        }
        ("stop-bot", [bot_id]) => router.stop_bot(bot_id).await,
        ("stop-all-bots", _) => router.stop_all_bots().await,
        ("stop-all-coins", _) => router.stop_all_coins().await,
        _ => {
            println!("unrecognised command: {line}\n{HELP}");
            Ok(())
        }
    };

    if let Err(error) = result {
        warn!(%error, "Command rejected");
    }
    true
}

fn parse_screen(name: &str) -> Option<Screen> {
    match name.to_ascii_lowercase().as_str() {
        "dashboard" => Some(Screen::Dashboard),
        "config" => Some(Screen::Config),
        "apikey" | "api-key" => Some(Screen::ApiKey),
        "setup" => Some(Screen::SetupAccount),
        _ => None,
    }
}

fn report(router: &ScreenRouter) {
    println!("[{}] symbol={}", router.screen(), router.symbol());
    if let Some(status) = router.status() {
        println!("  {:?}: {}", status.level, status.text);
    }

    match router.screen() {
        Screen::Dashboard => {
            let dashboard = router.dashboard();
            if !dashboard.summary.is_empty() {
                println!("  {}", dashboard.summary);
            }
            for bot in &dashboard.bots {
                println!(
                    "  bot {} mode={} coins={}/{}",
                    bot.bot_id, bot.mode, bot.active_coins, bot.max_coins
                );
            }
            if let Some(status) = &dashboard.bot_status {
                println!(
                    "  running={} bots={} symbols={}",
                    status.running,
                    status.bot_count,
                    status.active_symbols.join(",")
                );
            }
        }
        Screen::Config => {
            if let Some(config) = router.bot_config() {
                println!("  {config:?}");
            }
        }
        Screen::Auth | Screen::SetupAccount | Screen::ApiKey => {}
    }
}

fn log_update(update: &FeedUpdate) {
    match update {
        FeedUpdate::Status { kind, state } => info!(%kind, %state, "Feed status"),
        FeedUpdate::Tick(view) => info!(
            symbol = %view.symbol,
            time = %view.time_label,
            price = %view.price,
            change = %view.change,
            side = %view.side,
            "Tick"
        ),
        FeedUpdate::Balance(view) => {
            info!(time = %view.time_label, balance = %view.balance, "Balance")
        }
        FeedUpdate::Error { kind, error } => warn!(%kind, %error, "Feed error"),
    }
}
