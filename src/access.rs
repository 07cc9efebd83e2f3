//! Admin-set membership check. Pure predicate over the stored config; every
//! admin-only engine operation and flow entry point goes through this.

use crate::state::{DomainState, UserId};

pub fn is_admin(state: &DomainState, user: &UserId) -> bool {
    state.config.admins.iter().any(|a| a == user)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_admin() {
        let mut state = DomainState::default();
        state.config.admins.push("root".to_string());
        assert!(is_admin(&state, &"root".to_string()));
        assert!(!is_admin(&state, &"alice".to_string()));
    }
}
