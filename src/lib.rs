pub mod access;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod session;
pub mod state;
pub mod store;

pub use config::AppConfig;
pub use engine::Ledger;
pub use error::LedgerError;
pub use event::{Action, Event, Prompt, Reply};
pub use session::{Session, SessionState};
pub use state::{Account, BotConfig, DomainState, EarnLink, RedeemCode, UserId, Withdrawal};
pub use store::Store;
