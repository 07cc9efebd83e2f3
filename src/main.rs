use std::collections::HashMap;
use std::io::{self, Write};

use clap::Parser;
use tracing::info;

use rewardbot::{Action, AppConfig, Event, Ledger, Session, Store, UserId};

#[derive(Parser)]
#[command(name = "rewardbot")]
#[command(about = "Reward bot ledger backend", long_about = None)]
struct Cli {
    /// Path to the bootstrap config file
    #[arg(long, default_value = "rewardbot.toml")]
    config: String,
}

/// Local driver standing in for the chat transport: one line per inbound
/// event, structured replies printed as-is. The library itself never touches
/// stdin or any network.
fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load_or_default(&cli.config);

    let store = Store::new(&config.data_file);
    let ledger = Ledger::open(store, &config.initial_admins);
    info!(data_file = %config.data_file, "Ledger ready");

    let mut sessions: HashMap<UserId, Session> = HashMap::new();

    println!("rewardbot demo console");
    println!("  <user> press <tag>   button press (e.g. alice press user:wallet)");
    println!("  <user> <text>        free-text message");
    println!("  exit                 quit\n");

    loop {
        print!("> ");
        io::stdout().flush().ok();
        let mut line = String::new();
        if io::stdin().read_line(&mut line).unwrap_or(0) == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }

        let Some((user, rest)) = line.split_once(' ') else {
            println!("Expected: <user> press <tag> | <user> <text>");
            continue;
        };
        let user: UserId = user.to_string();

        let event = match rest.strip_prefix("press ") {
            Some(tag) => match Action::parse(tag.trim()) {
                Some(action) => Event::Button(action),
                None => {
                    println!("Unknown action tag: {tag}");
                    continue;
                }
            },
            None => Event::Text(rest.to_string()),
        };

        let session = sessions
            .entry(user.clone())
            .or_insert_with(|| Session::new(user.clone(), config.items_per_page));
        let reply = session.handle(event, &ledger);
        println!("{reply:?}");
    }

    println!("Session ended. Exiting.");
}
