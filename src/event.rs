//! Transport-agnostic event and reply shapes.
//!
//! The external dispatcher hands the session machine either free text or a
//! button press carrying a namespaced action tag; the machine answers with a
//! structured [`Reply`] that the presentation layer renders.

use rust_decimal::Decimal;

use crate::error::LedgerError;
use crate::state::{EarnLink, UserId, Withdrawal, WithdrawalId};

/// One inbound event from the dispatcher.
#[derive(Debug, Clone)]
pub enum Event {
    Text(String),
    Button(Action),
}

/// Parsed button actions. Tags are namespaced `user:`/`admin:` strings.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Back,
    Wallet,
    Earn,
    StartRedeem,
    StartWithdraw,
    ListPending,
    ListCancellable,
    CancelWithdrawal(WithdrawalId),
    Support,
    HowTo,
    AdminMenu,
    AdminAddCode,
    AdminAddLink,
    AdminRemoveLink(usize),
    AdminViewUsers(usize),
    AdminViewWithdrawals(usize),
    AdminEditBalance,
    AdminRemoveUser,
    AdminBroadcast,
    AdminBroadcastConfirm,
    AdminSetSupport,
    AdminSetHowTo,
    AdminAddAdmin,
    AdminRemoveAdmin,
}

impl Action {
    /// Parse a callback tag. Unknown tags yield `None` and are ignored by
    /// the session machine.
    pub fn parse(tag: &str) -> Option<Action> {
        let action = match tag {
            "back" => Action::Back,
            "user:wallet" => Action::Wallet,
            "user:earn" => Action::Earn,
            "user:redeem" => Action::StartRedeem,
            "user:withdraw" => Action::StartWithdraw,
            "user:pending" => Action::ListPending,
            "user:cancel_list" => Action::ListCancellable,
            "user:support" => Action::Support,
            "user:howto" => Action::HowTo,
            "admin:menu" => Action::AdminMenu,
            "admin:add_code" => Action::AdminAddCode,
            "admin:add_link" => Action::AdminAddLink,
            "admin:edit_balance" => Action::AdminEditBalance,
            "admin:remove_user" => Action::AdminRemoveUser,
            "admin:broadcast" => Action::AdminBroadcast,
            "admin:broadcast_confirm" => Action::AdminBroadcastConfirm,
            "admin:set_support" => Action::AdminSetSupport,
            "admin:set_howto" => Action::AdminSetHowTo,
            "admin:add_admin" => Action::AdminAddAdmin,
            "admin:remove_admin" => Action::AdminRemoveAdmin,
            _ => {
                if let Some(id) = tag.strip_prefix("user:cancel:") {
                    Action::CancelWithdrawal(id.to_string())
                } else if let Some(idx) = tag.strip_prefix("admin:remove_link:") {
                    Action::AdminRemoveLink(idx.parse().ok()?)
                } else if let Some(page) = tag.strip_prefix("admin:users:") {
                    Action::AdminViewUsers(page.parse().ok()?)
                } else if let Some(page) = tag.strip_prefix("admin:withdrawals:") {
                    Action::AdminViewWithdrawals(page.parse().ok()?)
                } else {
                    return None;
                }
            }
        };
        Some(action)
    }
}

/// What the machine is asking the user for next.
#[derive(Debug, Clone, PartialEq)]
pub enum Prompt {
    RedeemCode,
    WithdrawAmount { balance: Decimal },
    WithdrawHandle,
    CodeText,
    CodeValue,
    LinkTitle,
    LinkUrl,
    BalanceTargetId,
    BalanceAmount,
    RemoveUserId,
    AddAdminId,
    RemoveAdminId,
    SupportInfo,
    HowToText,
    BroadcastText,
    BroadcastConfirm { text: String },
}

/// Structured outcome handed to the external notifier. Rendering and menu
/// layout are its concern, not ours.
#[derive(Debug, Clone)]
pub enum Reply {
    MainMenu,
    AdminMenu,
    Prompt(Prompt),
    Wallet {
        balance: Decimal,
    },
    EarnLinks(Vec<EarnLink>),
    PendingWithdrawals(Vec<Withdrawal>),
    SupportInfo(String),
    HowTo(String),
    Redeemed {
        value: Decimal,
        balance: Decimal,
    },
    WithdrawalCreated {
        id: WithdrawalId,
        amount: Decimal,
        balance: Decimal,
    },
    WithdrawalCancelled {
        amount: Decimal,
        balance: Decimal,
    },
    CodeCreated {
        code: String,
        value: Decimal,
    },
    LinkAdded {
        title: String,
    },
    LinkRemoved,
    BalanceSet {
        target: UserId,
        amount: Decimal,
    },
    UserRemoved {
        target: UserId,
    },
    AdminAdded {
        target: UserId,
    },
    AdminRemoved {
        target: UserId,
    },
    SupportInfoSet,
    HowToSet,
    /// Confirmed broadcast: the notifier delivers `text` to `recipients`.
    Broadcast {
        text: String,
        recipients: Vec<UserId>,
    },
    UserPage {
        page: usize,
        total: usize,
        entries: Vec<(UserId, Decimal)>,
    },
    WithdrawalPage {
        page: usize,
        total: usize,
        entries: Vec<Withdrawal>,
    },
    /// Recoverable problem; the user may retry in the current state.
    Invalid(String),
    Denied,
    Failed(LedgerError),
    Ignored,
}
