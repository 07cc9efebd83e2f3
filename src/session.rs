//! Per-conversation state machine driving the multi-step flows.
//!
//! A [`Session`] is private to one (identity, conversation) pair and lives
//! only in memory; a restart drops in-progress input without touching the
//! ledger. Every state accepts the universal Back action, and entering a flow
//! discards whatever scratch the previous flow left behind.

use rust_decimal::Decimal;
use tracing::debug;

use crate::engine::Ledger;
use crate::error::LedgerError;
use crate::event::{Action, Event, Prompt, Reply};
use crate::state::UserId;

/// Which input the session is waiting for, with the fields collected so far.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    AwaitingRedeemCode,
    AwaitingWithdrawAmount,
    AwaitingWithdrawHandle {
        amount: Decimal,
    },
    AwaitingCodeText,
    AwaitingCodeValue {
        code: String,
    },
    AwaitingLinkTitle,
    AwaitingLinkUrl {
        title: String,
    },
    AwaitingBalanceTarget,
    AwaitingBalanceAmount {
        target: UserId,
    },
    AwaitingRemoveUserId,
    AwaitingAddAdminId,
    AwaitingRemoveAdminId,
    AwaitingSupportInfo,
    AwaitingHowTo,
    AwaitingBroadcastText,
    ConfirmBroadcast {
        text: String,
    },
}

pub struct Session {
    user: UserId,
    state: SessionState,
    items_per_page: usize,
}

impl Session {
    pub fn new(user: UserId, items_per_page: usize) -> Self {
        Self {
            user,
            state: SessionState::Idle,
            items_per_page,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Feed one inbound event through the machine. Ledger calls happen only
    /// on final steps or one-shot button actions.
    pub fn handle(&mut self, event: Event, ledger: &Ledger) -> Reply {
        match event {
            Event::Button(action) => self.handle_action(action, ledger),
            Event::Text(text) => self.handle_text(text.trim(), ledger),
        }
    }

    fn handle_action(&mut self, action: Action, ledger: &Ledger) -> Reply {
        // Broadcast confirmation is the one button that depends on scratch.
        if action == Action::AdminBroadcastConfirm {
            return self.confirm_broadcast(ledger);
        }

        // Every other button abandons the current flow before acting.
        if self.state != SessionState::Idle {
            debug!(user = %self.user, state = ?self.state, "Discarding in-progress flow");
            self.state = SessionState::Idle;
        }

        match action {
            Action::Back => Reply::MainMenu,
            Action::Wallet => {
                if let Err(e) = ledger.touch_account(&self.user) {
                    return Reply::Failed(e);
                }
                Reply::Wallet {
                    balance: ledger.balance_of(&self.user),
                }
            }
            Action::Earn => Reply::EarnLinks(ledger.earn_links()),
            Action::StartRedeem => {
                self.state = SessionState::AwaitingRedeemCode;
                Reply::Prompt(Prompt::RedeemCode)
            }
            Action::StartWithdraw => {
                let balance = ledger.balance_of(&self.user);
                if balance <= Decimal::ZERO {
                    return Reply::Invalid("You have no balance to withdraw.".to_string());
                }
                self.state = SessionState::AwaitingWithdrawAmount;
                Reply::Prompt(Prompt::WithdrawAmount { balance })
            }
            Action::ListPending | Action::ListCancellable => {
                Reply::PendingWithdrawals(ledger.pending_withdrawals_of(&self.user))
            }
            Action::CancelWithdrawal(id) => {
                match ledger.cancel_withdrawal(&self.user, &id) {
                    Ok((amount, balance)) => Reply::WithdrawalCancelled { amount, balance },
                    Err(e) => Reply::Failed(e),
                }
            }
            Action::Support => Reply::SupportInfo(ledger.support_info()),
            Action::HowTo => Reply::HowTo(ledger.how_to()),
            Action::AdminBroadcastConfirm => unreachable!("handled above"),
            // Admin entry points are gated before any state change.
            admin_action => {
                if !ledger.is_admin_user(&self.user) {
                    return Reply::Denied;
                }
                self.handle_admin_action(admin_action, ledger)
            }
        }
    }

    fn handle_admin_action(&mut self, action: Action, ledger: &Ledger) -> Reply {
        match action {
            Action::AdminMenu => Reply::AdminMenu,
            Action::AdminAddCode => {
                self.state = SessionState::AwaitingCodeText;
                Reply::Prompt(Prompt::CodeText)
            }
            Action::AdminAddLink => {
                self.state = SessionState::AwaitingLinkTitle;
                Reply::Prompt(Prompt::LinkTitle)
            }
            Action::AdminRemoveLink(index) => match ledger.admin_remove_link(&self.user, index) {
                Ok(()) => Reply::LinkRemoved,
                Err(e) => Reply::Failed(e),
            },
            Action::AdminViewUsers(page) => {
                let (entries, total) = ledger.user_page(page, self.items_per_page);
                Reply::UserPage { page, total, entries }
            }
            Action::AdminViewWithdrawals(page) => {
                let (entries, total) = ledger.withdrawal_page(page, self.items_per_page);
                Reply::WithdrawalPage { page, total, entries }
            }
            Action::AdminEditBalance => {
                self.state = SessionState::AwaitingBalanceTarget;
                Reply::Prompt(Prompt::BalanceTargetId)
            }
            Action::AdminRemoveUser => {
                self.state = SessionState::AwaitingRemoveUserId;
                Reply::Prompt(Prompt::RemoveUserId)
            }
            Action::AdminBroadcast => {
                self.state = SessionState::AwaitingBroadcastText;
                Reply::Prompt(Prompt::BroadcastText)
            }
            Action::AdminSetSupport => {
                self.state = SessionState::AwaitingSupportInfo;
                Reply::Prompt(Prompt::SupportInfo)
            }
            Action::AdminSetHowTo => {
                self.state = SessionState::AwaitingHowTo;
                Reply::Prompt(Prompt::HowToText)
            }
            Action::AdminAddAdmin => {
                self.state = SessionState::AwaitingAddAdminId;
                Reply::Prompt(Prompt::AddAdminId)
            }
            Action::AdminRemoveAdmin => {
                self.state = SessionState::AwaitingRemoveAdminId;
                Reply::Prompt(Prompt::RemoveAdminId)
            }
            _ => Reply::Ignored,
        }
    }

    fn confirm_broadcast(&mut self, ledger: &Ledger) -> Reply {
        if !ledger.is_admin_user(&self.user) {
            self.state = SessionState::Idle;
            return Reply::Denied;
        }
        if let SessionState::ConfirmBroadcast { text } = self.state.clone() {
            self.state = SessionState::Idle;
            Reply::Broadcast {
                text,
                recipients: ledger.user_ids(),
            }
        } else {
            Reply::Ignored
        }
    }

    fn handle_text(&mut self, text: &str, ledger: &Ledger) -> Reply {
        match self.state.clone() {
            SessionState::Idle => Reply::Ignored,

            SessionState::AwaitingRedeemCode => match ledger.redeem_code(&self.user, text) {
                Ok((value, balance)) => {
                    self.state = SessionState::Idle;
                    Reply::Redeemed { value, balance }
                }
                // Bad code: stay in the flow so the user can retry or back out.
                Err(e @ (LedgerError::UnknownCode(_) | LedgerError::AlreadyRedeemed(_))) => {
                    Reply::Failed(e)
                }
                Err(e) => {
                    self.state = SessionState::Idle;
                    Reply::Failed(e)
                }
            },

            SessionState::AwaitingWithdrawAmount => {
                let amount = match text.parse::<Decimal>() {
                    Ok(a) => a,
                    Err(_) => return Reply::Invalid("Please enter a number.".to_string()),
                };
                if amount <= Decimal::ZERO {
                    return Reply::Invalid("Amount must be positive.".to_string());
                }
                let balance = ledger.balance_of(&self.user);
                if amount > balance {
                    return Reply::Invalid(format!(
                        "Insufficient balance. You can withdraw up to {balance}."
                    ));
                }
                self.state = SessionState::AwaitingWithdrawHandle { amount };
                Reply::Prompt(Prompt::WithdrawHandle)
            }

            SessionState::AwaitingWithdrawHandle { amount } => {
                // Balance may have changed since the amount step; the engine
                // re-validates. Either way this flow is over.
                self.state = SessionState::Idle;
                match ledger.create_withdrawal(&self.user, amount, text) {
                    Ok(withdrawal) => Reply::WithdrawalCreated {
                        id: withdrawal.id,
                        amount: withdrawal.amount,
                        balance: ledger.balance_of(&self.user),
                    },
                    Err(e) => Reply::Failed(e),
                }
            }

            SessionState::AwaitingCodeText => {
                if text.is_empty() {
                    return Reply::Invalid("Code text must not be empty.".to_string());
                }
                if ledger.code_exists(text) {
                    return Reply::Failed(LedgerError::DuplicateCode(text.to_string()));
                }
                self.state = SessionState::AwaitingCodeValue {
                    code: text.to_string(),
                };
                Reply::Prompt(Prompt::CodeValue)
            }

            SessionState::AwaitingCodeValue { code } => {
                let value = match text.parse::<Decimal>() {
                    Ok(v) => v,
                    Err(_) => return Reply::Invalid("Please enter a number.".to_string()),
                };
                match ledger.admin_add_code(&self.user, &code, value) {
                    Ok(()) => {
                        self.state = SessionState::Idle;
                        Reply::CodeCreated { code, value }
                    }
                    Err(e @ LedgerError::NonPositiveValue(_)) => Reply::Failed(e),
                    Err(e) => {
                        self.state = SessionState::Idle;
                        Reply::Failed(e)
                    }
                }
            }

            SessionState::AwaitingLinkTitle => {
                if text.is_empty() {
                    return Reply::Invalid("Title must not be empty.".to_string());
                }
                self.state = SessionState::AwaitingLinkUrl {
                    title: text.to_string(),
                };
                Reply::Prompt(Prompt::LinkUrl)
            }

            SessionState::AwaitingLinkUrl { title } => {
                self.state = SessionState::Idle;
                match ledger.admin_add_link(&self.user, &title, text) {
                    Ok(()) => Reply::LinkAdded { title },
                    Err(e) => Reply::Failed(e),
                }
            }

            SessionState::AwaitingBalanceTarget => {
                if text.is_empty() {
                    return Reply::Invalid("User id must not be empty.".to_string());
                }
                self.state = SessionState::AwaitingBalanceAmount {
                    target: text.to_string(),
                };
                Reply::Prompt(Prompt::BalanceAmount)
            }

            SessionState::AwaitingBalanceAmount { target } => {
                let amount = match text.parse::<Decimal>() {
                    Ok(a) => a,
                    Err(_) => return Reply::Invalid("Please enter a number.".to_string()),
                };
                match ledger.admin_set_balance(&self.user, &target, amount) {
                    Ok(()) => {
                        self.state = SessionState::Idle;
                        Reply::BalanceSet { target, amount }
                    }
                    Err(e @ LedgerError::NegativeBalance(_)) => Reply::Failed(e),
                    Err(e) => {
                        self.state = SessionState::Idle;
                        Reply::Failed(e)
                    }
                }
            }

            SessionState::AwaitingRemoveUserId => {
                match ledger.admin_remove_account(&self.user, &text.to_string()) {
                    Ok(()) => {
                        self.state = SessionState::Idle;
                        Reply::UserRemoved {
                            target: text.to_string(),
                        }
                    }
                    Err(e @ LedgerError::UserNotFound(_)) => Reply::Failed(e),
                    Err(e) => {
                        self.state = SessionState::Idle;
                        Reply::Failed(e)
                    }
                }
            }

            SessionState::AwaitingAddAdminId => {
                self.state = SessionState::Idle;
                match ledger.admin_add_admin(&self.user, &text.to_string()) {
                    Ok(()) => Reply::AdminAdded {
                        target: text.to_string(),
                    },
                    Err(e) => Reply::Failed(e),
                }
            }

            SessionState::AwaitingRemoveAdminId => {
                match ledger.admin_remove_admin(&self.user, &text.to_string()) {
                    Ok(()) => {
                        self.state = SessionState::Idle;
                        Reply::AdminRemoved {
                            target: text.to_string(),
                        }
                    }
                    Err(e @ LedgerError::LastAdminProtected) => Reply::Failed(e),
                    Err(e) => {
                        self.state = SessionState::Idle;
                        Reply::Failed(e)
                    }
                }
            }

            SessionState::AwaitingSupportInfo => {
                self.state = SessionState::Idle;
                match ledger.admin_set_support_info(&self.user, text) {
                    Ok(()) => Reply::SupportInfoSet,
                    Err(e) => Reply::Failed(e),
                }
            }

            SessionState::AwaitingHowTo => {
                self.state = SessionState::Idle;
                match ledger.admin_set_how_to(&self.user, text) {
                    Ok(()) => Reply::HowToSet,
                    Err(e) => Reply::Failed(e),
                }
            }

            SessionState::AwaitingBroadcastText => {
                if text.is_empty() {
                    return Reply::Invalid("Message must not be empty.".to_string());
                }
                self.state = SessionState::ConfirmBroadcast {
                    text: text.to_string(),
                };
                Reply::Prompt(Prompt::BroadcastConfirm {
                    text: text.to_string(),
                })
            }

            SessionState::ConfirmBroadcast { text: pending } => {
                // Waiting on the confirm button, not on more text.
                Reply::Prompt(Prompt::BroadcastConfirm { text: pending })
            }
        }
    }
}
