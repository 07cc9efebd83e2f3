//! Domain type definitions and the full persisted snapshot.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Stable opaque identity of an end user (chat identity as a string).
pub type UserId = String;

/// Withdrawal request identifier (UUID v4 string).
pub type WithdrawalId = String;

/// Per-user ledger record. Created lazily on first interaction.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Account {
    pub balance: Decimal,
    pub redeemed_codes: Vec<String>,
    pub pending_withdrawals: Vec<WithdrawalId>,
    pub withdrawal_history: Vec<WithdrawalId>,
}

impl Default for Account {
    fn default() -> Self {
        Self {
            balance: Decimal::ZERO,
            redeemed_codes: Vec::new(),
            pending_withdrawals: Vec::new(),
            withdrawal_history: Vec::new(),
        }
    }
}

/// A single-use-per-account credit token, keyed by its text in the snapshot.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RedeemCode {
    pub value: Decimal,
    /// Accounts that have consumed this code. Only ever grows.
    pub used_by: Vec<UserId>,
}

/// External earning opportunity shown to users. Read-only for the ledger.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EarnLink {
    pub title: String,
    pub url: String,
}

/// A pending cash-out request. The amount is debited at creation time;
/// completion happens outside this system, cancellation refunds it.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Withdrawal {
    pub id: WithdrawalId,
    pub user_id: UserId,
    pub amount: Decimal,
    /// Payment handle the funds should be sent to (e.g. a UPI id).
    pub upi: String,
    pub timestamp: DateTime<Utc>,
}

/// Operator-editable settings stored inside the snapshot.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct BotConfig {
    pub support_info: String,
    pub how_to_video: String,
    pub admins: Vec<UserId>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            support_info: "No support info set.".to_string(),
            how_to_video: "No how-to video set.".to_string(),
            admins: Vec::new(),
        }
    }
}

/// The entire persisted domain state. A snapshot is always fully formed;
/// the store never exposes a partially written one.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct DomainState {
    pub users: HashMap<UserId, Account>,
    pub codes: HashMap<String, RedeemCode>,
    pub links: Vec<EarnLink>,
    pub config: BotConfig,
    pub pending_withdrawals: HashMap<WithdrawalId, Withdrawal>,
}

impl DomainState {
    /// Get or lazily create the account for `user`.
    pub fn account_mut(&mut self, user: &UserId) -> &mut Account {
        self.users.entry(user.clone()).or_default()
    }

    pub fn account(&self, user: &UserId) -> Option<&Account> {
        self.users.get(user)
    }
}
