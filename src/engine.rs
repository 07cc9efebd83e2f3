//! The ledger engine: every balance-affecting operation lives here.
//!
//! All mutations run under one lock. Each operation clones the current state,
//! validates and mutates the clone, saves it, and only then commits it back
//! into the shared slot. A failed save therefore leaves the in-memory state
//! equal to the last durable snapshot.

use std::sync::Mutex;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use crate::access::is_admin;
use crate::error::LedgerError;
use crate::state::{DomainState, EarnLink, RedeemCode, UserId, Withdrawal, WithdrawalId};
use crate::store::Store;

pub struct Ledger {
    state: Mutex<DomainState>,
    store: Store,
}

impl Ledger {
    /// Load the last snapshot from `store`. `initial_admins` seeds the admin
    /// set only when the loaded snapshot has none.
    pub fn open(store: Store, initial_admins: &[UserId]) -> Self {
        let mut state = store.load();
        if state.config.admins.is_empty() {
            state.config.admins = initial_admins.to_vec();
        }
        Self {
            state: Mutex::new(state),
            store,
        }
    }

    /// Run one transactional mutation: validate + mutate a clone, persist it,
    /// commit it. Validation failure or a failed save leaves the shared state
    /// untouched.
    fn mutate<T>(
        &self,
        op: impl FnOnce(&mut DomainState) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        let mut guard = self.state.lock().unwrap();
        let mut next = guard.clone();
        let out = op(&mut next)?;
        self.store.save(&next)?;
        *guard = next;
        Ok(out)
    }

    /// Ensure an account exists for `user`, persisting only on first sight.
    pub fn touch_account(&self, user: &UserId) -> Result<(), LedgerError> {
        let mut guard = self.state.lock().unwrap();
        if guard.users.contains_key(user) {
            return Ok(());
        }
        let mut next = guard.clone();
        next.account_mut(user);
        self.store.save(&next)?;
        *guard = next;
        info!(%user, "Created account");
        Ok(())
    }

    /// Apply a redeem code. Returns the credited value and the new balance.
    pub fn redeem_code(
        &self,
        user: &UserId,
        code_text: &str,
    ) -> Result<(Decimal, Decimal), LedgerError> {
        self.mutate(|state| {
            let code = state
                .codes
                .get_mut(code_text)
                .ok_or_else(|| LedgerError::UnknownCode(code_text.to_string()))?;
            if code.used_by.contains(user) {
                return Err(LedgerError::AlreadyRedeemed(code_text.to_string()));
            }
            code.used_by.push(user.clone());
            let value = code.value;

            let account = state.account_mut(user);
            account.balance += value;
            account.redeemed_codes.push(code_text.to_string());
            info!(%user, code = code_text, %value, "Code redeemed");
            Ok((value, account.balance))
        })
    }

    /// Create a pending withdrawal. The amount is debited here, at creation;
    /// completion is an external process.
    pub fn create_withdrawal(
        &self,
        user: &UserId,
        amount: Decimal,
        upi: &str,
    ) -> Result<Withdrawal, LedgerError> {
        self.mutate(|state| {
            if amount <= Decimal::ZERO {
                return Err(LedgerError::NonPositiveAmount(amount));
            }
            let account = state.account_mut(user);
            if amount > account.balance {
                return Err(LedgerError::InsufficientBalance {
                    requested: amount,
                    available: account.balance,
                });
            }
            account.balance -= amount;

            let withdrawal = Withdrawal {
                id: Uuid::new_v4().to_string(),
                user_id: user.clone(),
                amount,
                upi: upi.to_string(),
                timestamp: Utc::now(),
            };
            account.pending_withdrawals.push(withdrawal.id.clone());
            account.withdrawal_history.push(withdrawal.id.clone());
            state
                .pending_withdrawals
                .insert(withdrawal.id.clone(), withdrawal.clone());
            info!(%user, id = %withdrawal.id, %amount, "Withdrawal requested");
            Ok(withdrawal)
        })
    }

    /// Cancel a pending withdrawal owned by `user`, refunding its amount.
    /// Returns the refunded amount and the new balance.
    pub fn cancel_withdrawal(
        &self,
        user: &UserId,
        withdrawal_id: &WithdrawalId,
    ) -> Result<(Decimal, Decimal), LedgerError> {
        self.mutate(|state| {
            let withdrawal = state
                .pending_withdrawals
                .get(withdrawal_id)
                .ok_or_else(|| LedgerError::WithdrawalNotFound(withdrawal_id.clone()))?;
            if withdrawal.user_id != *user {
                warn!(%user, id = %withdrawal_id, "Cancel attempt on foreign withdrawal");
                return Err(LedgerError::OwnershipMismatch(withdrawal_id.clone()));
            }
            let amount = withdrawal.amount;
            state.pending_withdrawals.remove(withdrawal_id);

            let account = state.account_mut(user);
            account.balance += amount;
            account.pending_withdrawals.retain(|id| id != withdrawal_id);
            info!(%user, id = %withdrawal_id, %amount, "Withdrawal cancelled");
            Ok((amount, account.balance))
        })
    }

    /// Overwrite a user's balance. Admin only.
    pub fn admin_set_balance(
        &self,
        requester: &UserId,
        target: &UserId,
        amount: Decimal,
    ) -> Result<(), LedgerError> {
        self.mutate(|state| {
            if !is_admin(state, requester) {
                return Err(LedgerError::AccessDenied);
            }
            if amount < Decimal::ZERO {
                return Err(LedgerError::NegativeBalance(amount));
            }
            state.account_mut(target).balance = amount;
            info!(%requester, %target, %amount, "Balance overridden");
            Ok(())
        })
    }

    /// Create a new redeem code with an empty used-by set. Admin only.
    pub fn admin_add_code(
        &self,
        requester: &UserId,
        code_text: &str,
        value: Decimal,
    ) -> Result<(), LedgerError> {
        self.mutate(|state| {
            if !is_admin(state, requester) {
                return Err(LedgerError::AccessDenied);
            }
            if state.codes.contains_key(code_text) {
                return Err(LedgerError::DuplicateCode(code_text.to_string()));
            }
            if value <= Decimal::ZERO {
                return Err(LedgerError::NonPositiveValue(value));
            }
            state.codes.insert(
                code_text.to_string(),
                RedeemCode {
                    value,
                    used_by: Vec::new(),
                },
            );
            info!(%requester, code = code_text, %value, "Code created");
            Ok(())
        })
    }

    pub fn admin_add_link(
        &self,
        requester: &UserId,
        title: &str,
        url: &str,
    ) -> Result<(), LedgerError> {
        self.mutate(|state| {
            if !is_admin(state, requester) {
                return Err(LedgerError::AccessDenied);
            }
            state.links.push(EarnLink {
                title: title.to_string(),
                url: url.to_string(),
            });
            info!(%requester, title, "Earn link added");
            Ok(())
        })
    }

    pub fn admin_remove_link(&self, requester: &UserId, index: usize) -> Result<(), LedgerError> {
        self.mutate(|state| {
            if !is_admin(state, requester) {
                return Err(LedgerError::AccessDenied);
            }
            if index >= state.links.len() {
                return Err(LedgerError::LinkNotFound(index));
            }
            let link = state.links.remove(index);
            info!(%requester, title = %link.title, "Earn link removed");
            Ok(())
        })
    }

    /// Delete an account and drop its pending withdrawals from the global
    /// index. The debited balance disappears with the account.
    pub fn admin_remove_account(
        &self,
        requester: &UserId,
        target: &UserId,
    ) -> Result<(), LedgerError> {
        self.mutate(|state| {
            if !is_admin(state, requester) {
                return Err(LedgerError::AccessDenied);
            }
            let account = state
                .users
                .remove(target)
                .ok_or_else(|| LedgerError::UserNotFound(target.clone()))?;
            for id in &account.pending_withdrawals {
                state.pending_withdrawals.remove(id);
            }
            info!(%requester, %target, "Account removed");
            Ok(())
        })
    }

    pub fn admin_add_admin(&self, requester: &UserId, target: &UserId) -> Result<(), LedgerError> {
        self.mutate(|state| {
            if !is_admin(state, requester) {
                return Err(LedgerError::AccessDenied);
            }
            if !state.config.admins.contains(target) {
                state.config.admins.push(target.clone());
            }
            info!(%requester, %target, "Admin added");
            Ok(())
        })
    }

    /// Remove an identity from the admin set. The set must stay non-empty.
    pub fn admin_remove_admin(
        &self,
        requester: &UserId,
        target: &UserId,
    ) -> Result<(), LedgerError> {
        self.mutate(|state| {
            if !is_admin(state, requester) {
                return Err(LedgerError::AccessDenied);
            }
            if state.config.admins.contains(target) && state.config.admins.len() == 1 {
                return Err(LedgerError::LastAdminProtected);
            }
            state.config.admins.retain(|a| a != target);
            info!(%requester, %target, "Admin removed");
            Ok(())
        })
    }

    pub fn admin_set_support_info(
        &self,
        requester: &UserId,
        text: &str,
    ) -> Result<(), LedgerError> {
        self.mutate(|state| {
            if !is_admin(state, requester) {
                return Err(LedgerError::AccessDenied);
            }
            state.config.support_info = text.to_string();
            Ok(())
        })
    }

    pub fn admin_set_how_to(&self, requester: &UserId, text: &str) -> Result<(), LedgerError> {
        self.mutate(|state| {
            if !is_admin(state, requester) {
                return Err(LedgerError::AccessDenied);
            }
            state.config.how_to_video = text.to_string();
            Ok(())
        })
    }

    // --- Read-side helpers (no persistence) ---

    pub fn is_admin_user(&self, user: &UserId) -> bool {
        is_admin(&self.state.lock().unwrap(), user)
    }

    pub fn balance_of(&self, user: &UserId) -> Decimal {
        self.state
            .lock()
            .unwrap()
            .account(user)
            .map(|a| a.balance)
            .unwrap_or(Decimal::ZERO)
    }

    /// Resolve a user's pending withdrawal ids against the global index,
    /// skipping ids that no longer exist there.
    pub fn pending_withdrawals_of(&self, user: &UserId) -> Vec<Withdrawal> {
        let state = self.state.lock().unwrap();
        state
            .account(user)
            .map(|account| {
                account
                    .pending_withdrawals
                    .iter()
                    .filter_map(|id| state.pending_withdrawals.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn code_exists(&self, code_text: &str) -> bool {
        self.state.lock().unwrap().codes.contains_key(code_text)
    }

    pub fn earn_links(&self) -> Vec<EarnLink> {
        self.state.lock().unwrap().links.clone()
    }

    pub fn support_info(&self) -> String {
        self.state.lock().unwrap().config.support_info.clone()
    }

    pub fn how_to(&self) -> String {
        self.state.lock().unwrap().config.how_to_video.clone()
    }

    /// All known user ids, sorted for stable paging and broadcast fan-out.
    pub fn user_ids(&self) -> Vec<UserId> {
        let state = self.state.lock().unwrap();
        let mut ids: Vec<UserId> = state.users.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// One page of (user id, balance) entries plus the total user count.
    pub fn user_page(&self, page: usize, per_page: usize) -> (Vec<(UserId, Decimal)>, usize) {
        let state = self.state.lock().unwrap();
        let mut ids: Vec<UserId> = state.users.keys().cloned().collect();
        ids.sort();
        let total = ids.len();
        let entries = ids
            .into_iter()
            .skip(page * per_page)
            .take(per_page)
            .map(|id| {
                let balance = state.users[&id].balance;
                (id, balance)
            })
            .collect();
        (entries, total)
    }

    /// One page of pending withdrawals (oldest first) plus the total count.
    pub fn withdrawal_page(&self, page: usize, per_page: usize) -> (Vec<Withdrawal>, usize) {
        let state = self.state.lock().unwrap();
        let mut all: Vec<Withdrawal> = state.pending_withdrawals.values().cloned().collect();
        all.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        let total = all.len();
        let entries = all.into_iter().skip(page * per_page).take(per_page).collect();
        (entries, total)
    }

    /// Clone of the full in-memory state.
    pub fn snapshot(&self) -> DomainState {
        self.state.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn test_ledger(admins: &[&str]) -> (Ledger, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("data.json"));
        let admins: Vec<UserId> = admins.iter().map(|a| a.to_string()).collect();
        (Ledger::open(store, &admins), dir)
    }

    fn uid(s: &str) -> UserId {
        s.to_string()
    }

    #[test]
    fn test_redeem_code_once_per_account() {
        let (ledger, _dir) = test_ledger(&["root"]);
        ledger.admin_add_code(&uid("root"), "WELCOME50", dec!(50)).unwrap();

        let (value, balance) = ledger.redeem_code(&uid("alice"), "WELCOME50").unwrap();
        assert_eq!(value, dec!(50));
        assert_eq!(balance, dec!(50));

        let err = ledger.redeem_code(&uid("alice"), "WELCOME50").unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyRedeemed(_)));
        assert_eq!(ledger.balance_of(&uid("alice")), dec!(50));
    }

    #[test]
    fn test_unknown_code() {
        let (ledger, _dir) = test_ledger(&["root"]);
        let err = ledger.redeem_code(&uid("alice"), "NOPE").unwrap_err();
        assert!(matches!(err, LedgerError::UnknownCode(_)));
    }

    #[test]
    fn test_two_accounts_redeem_same_code() {
        let (ledger, _dir) = test_ledger(&["root"]);
        ledger.admin_add_code(&uid("root"), "SHARED", dec!(25)).unwrap();

        ledger.redeem_code(&uid("alice"), "SHARED").unwrap();
        ledger.redeem_code(&uid("bob"), "SHARED").unwrap();

        assert_eq!(ledger.balance_of(&uid("alice")), dec!(25));
        assert_eq!(ledger.balance_of(&uid("bob")), dec!(25));

        let state = ledger.snapshot();
        let used_by = &state.codes["SHARED"].used_by;
        assert!(used_by.contains(&uid("alice")) && used_by.contains(&uid("bob")));
    }

    #[test]
    fn test_withdrawal_debit_refund_round_trip() {
        let (ledger, _dir) = test_ledger(&["root"]);
        ledger.admin_set_balance(&uid("root"), &uid("alice"), dec!(100)).unwrap();

        let withdrawal = ledger
            .create_withdrawal(&uid("alice"), dec!(30), "alice@okbank")
            .unwrap();
        assert_eq!(ledger.balance_of(&uid("alice")), dec!(70));
        assert_eq!(withdrawal.user_id, uid("alice"));

        let (refunded, balance) = ledger
            .cancel_withdrawal(&uid("alice"), &withdrawal.id)
            .unwrap();
        assert_eq!(refunded, dec!(30));
        assert_eq!(balance, dec!(100));

        let state = ledger.snapshot();
        assert!(!state.pending_withdrawals.contains_key(&withdrawal.id));
        assert!(state.users["alice"].pending_withdrawals.is_empty());
    }

    #[test]
    fn test_withdrawal_ownership() {
        let (ledger, _dir) = test_ledger(&["root"]);
        ledger.admin_set_balance(&uid("root"), &uid("alice"), dec!(100)).unwrap();
        ledger.admin_set_balance(&uid("root"), &uid("bob"), dec!(40)).unwrap();

        let withdrawal = ledger
            .create_withdrawal(&uid("alice"), dec!(20), "alice@okbank")
            .unwrap();

        let err = ledger.cancel_withdrawal(&uid("bob"), &withdrawal.id).unwrap_err();
        assert!(matches!(err, LedgerError::OwnershipMismatch(_)));
        assert_eq!(ledger.balance_of(&uid("alice")), dec!(80));
        assert_eq!(ledger.balance_of(&uid("bob")), dec!(40));
    }

    #[test]
    fn test_insufficient_balance() {
        let (ledger, _dir) = test_ledger(&["root"]);
        ledger.admin_set_balance(&uid("root"), &uid("alice"), dec!(10)).unwrap();

        let err = ledger
            .create_withdrawal(&uid("alice"), dec!(50), "alice@okbank")
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
        assert_eq!(ledger.balance_of(&uid("alice")), dec!(10));
    }

    #[test]
    fn test_non_positive_withdrawal() {
        let (ledger, _dir) = test_ledger(&["root"]);
        let err = ledger
            .create_withdrawal(&uid("alice"), dec!(0), "alice@okbank")
            .unwrap_err();
        assert!(matches!(err, LedgerError::NonPositiveAmount(_)));
    }

    #[test]
    fn test_admin_gate() {
        let (ledger, _dir) = test_ledger(&["root"]);
        let err = ledger
            .admin_add_code(&uid("mallory"), "FREE", dec!(100))
            .unwrap_err();
        assert!(matches!(err, LedgerError::AccessDenied));
        assert!(ledger.snapshot().codes.is_empty());
    }

    #[test]
    fn test_duplicate_code_rejected() {
        let (ledger, _dir) = test_ledger(&["root"]);
        ledger.admin_add_code(&uid("root"), "ONCE", dec!(5)).unwrap();
        let err = ledger.admin_add_code(&uid("root"), "ONCE", dec!(9)).unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateCode(_)));
        assert_eq!(ledger.snapshot().codes["ONCE"].value, dec!(5));
    }

    #[test]
    fn test_last_admin_protected() {
        let (ledger, _dir) = test_ledger(&["root"]);
        let err = ledger.admin_remove_admin(&uid("root"), &uid("root")).unwrap_err();
        assert!(matches!(err, LedgerError::LastAdminProtected));
        assert_eq!(ledger.snapshot().config.admins, vec![uid("root")]);

        ledger.admin_add_admin(&uid("root"), &uid("deputy")).unwrap();
        ledger.admin_remove_admin(&uid("root"), &uid("root")).unwrap();
        assert_eq!(ledger.snapshot().config.admins, vec![uid("deputy")]);
    }

    #[test]
    fn test_remove_account_cleans_pending_index() {
        let (ledger, _dir) = test_ledger(&["root"]);
        ledger.admin_set_balance(&uid("root"), &uid("alice"), dec!(100)).unwrap();
        let withdrawal = ledger
            .create_withdrawal(&uid("alice"), dec!(60), "alice@okbank")
            .unwrap();

        ledger.admin_remove_account(&uid("root"), &uid("alice")).unwrap();

        let state = ledger.snapshot();
        assert!(!state.users.contains_key("alice"));
        assert!(!state.pending_withdrawals.contains_key(&withdrawal.id));
    }

    #[test]
    fn test_failed_save_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("data.json"));
        let ledger = Ledger::open(store, &[uid("root")]);
        ledger.admin_set_balance(&uid("root"), &uid("alice"), dec!(100)).unwrap();

        // Point the store at an unwritable path: the mutation must not stick.
        let broken = Ledger {
            state: Mutex::new(ledger.snapshot()),
            store: Store::new("/nonexistent-dir/data.json"),
        };
        let err = broken
            .create_withdrawal(&uid("alice"), dec!(30), "alice@okbank")
            .unwrap_err();
        assert!(matches!(err, LedgerError::Storage(_)));
        assert_eq!(broken.balance_of(&uid("alice")), dec!(100));
        assert!(broken.snapshot().pending_withdrawals.is_empty());
    }

    /// Randomized operation sequences must preserve all ledger invariants.
    #[test]
    fn test_invariants_under_random_operations() {
        use rand::prelude::*;

        fn check_invariants(state: &DomainState) {
            for (user, account) in &state.users {
                assert!(account.balance >= Decimal::ZERO, "negative balance for {user}");
                let pending_sum: Decimal = account
                    .pending_withdrawals
                    .iter()
                    .map(|id| {
                        let w = state
                            .pending_withdrawals
                            .get(id)
                            .unwrap_or_else(|| panic!("dangling pending id {id}"));
                        assert_eq!(&w.user_id, user);
                        w.amount
                    })
                    .sum();
                assert!(pending_sum >= Decimal::ZERO);
            }
            for (id, withdrawal) in &state.pending_withdrawals {
                let account = state
                    .users
                    .get(&withdrawal.user_id)
                    .expect("withdrawal for missing user");
                assert!(account.pending_withdrawals.contains(id));
            }
            for code in state.codes.values() {
                let mut seen = code.used_by.clone();
                seen.sort();
                seen.dedup();
                assert_eq!(seen.len(), code.used_by.len(), "duplicate redemption");
            }
        }

        let mut rng = StdRng::seed_from_u64(7);
        let (ledger, _dir) = test_ledger(&["root"]);
        let users = ["alice", "bob", "carol"];
        for i in 0..300 {
            let user = uid(users[rng.gen_range(0..users.len())]);
            match rng.gen_range(0..6) {
                0 => {
                    let _ = ledger.admin_add_code(&uid("root"), &format!("C{}", i % 20), dec!(10));
                }
                1 => {
                    let _ = ledger.redeem_code(&user, &format!("C{}", rng.gen_range(0..20)));
                }
                2 => {
                    let amount = Decimal::from(rng.gen_range(1..40));
                    let _ = ledger.create_withdrawal(&user, amount, "pay@handle");
                }
                3 => {
                    let pending = ledger.pending_withdrawals_of(&user);
                    if let Some(w) = pending.choose(&mut rng) {
                        let _ = ledger.cancel_withdrawal(&user, &w.id);
                    }
                }
                4 => {
                    let amount = Decimal::from(rng.gen_range(0..100));
                    let _ = ledger.admin_set_balance(&uid("root"), &user, amount);
                }
                _ => {
                    let _ = ledger.admin_remove_account(&uid("root"), &user);
                }
            }
            check_invariants(&ledger.snapshot());
        }
    }
}
