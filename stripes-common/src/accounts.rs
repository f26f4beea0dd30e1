//! User account directory
//!
//! Account records live beside the shared document rather than inside it.
//! Approving and denying accounts goes through the gateway; sign-in
//! registration happens here.

use chrono::Utc;
use std::collections::BTreeMap;
use tracing::info;

use crate::auth::{AuthorizationPolicy, Identity};
use crate::model::{AccountStatus, UserAccount, UserId};

#[derive(Debug, Clone, Default)]
pub struct UserDirectory {
    accounts: BTreeMap<UserId, UserAccount>,
}

impl UserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_accounts(accounts: impl IntoIterator<Item = UserAccount>) -> Self {
        Self {
            accounts: accounts.into_iter().map(|a| (a.id.clone(), a)).collect(),
        }
    }

    /// Record a sign-in. First-time users are `approved` when privileged and
    /// `pending` otherwise; returning users keep their status.
    pub fn register_sign_in(
        &mut self,
        identity: &Identity,
        policy: &AuthorizationPolicy,
    ) -> &UserAccount {
        let account = self
            .accounts
            .entry(identity.uid.clone())
            .or_insert_with(|| {
                let status = if policy.is_privileged(&identity.email) {
                    AccountStatus::Approved
                } else {
                    AccountStatus::Pending
                };
                info!(user_id = %identity.uid, ?status, "Registered new account");
                UserAccount {
                    id: identity.uid.clone(),
                    email: identity.email.clone(),
                    display_name: identity.display_name.clone(),
                    status,
                    created_at: Utc::now(),
                }
            });
        account.email = identity.email.clone();
        if identity.display_name.is_some() {
            account.display_name = identity.display_name.clone();
        }
        account
    }

    pub fn get(&self, user_id: &str) -> Option<&UserAccount> {
        self.accounts.get(user_id)
    }

    pub fn accounts(&self) -> impl Iterator<Item = &UserAccount> {
        self.accounts.values()
    }

    pub fn with_status(&self, status: AccountStatus) -> impl Iterator<Item = &UserAccount> {
        self.accounts.values().filter(move |a| a.status == status)
    }

    /// Change an account's status; `false` when the account is unknown
    pub(crate) fn set_status(&mut self, user_id: &str, status: AccountStatus) -> bool {
        match self.accounts.get_mut(user_id) {
            Some(account) => {
                account.status = status;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(uid: &str, email: &str) -> Identity {
        Identity {
            uid: uid.into(),
            email: email.into(),
            display_name: Some("Someone".into()),
            photo_url: None,
        }
    }

    #[test]
    fn test_first_sign_in_status() {
        let policy = AuthorizationPolicy::new(["teacher@example.com"]);
        let mut dir = UserDirectory::new();
        assert_eq!(
            dir.register_sign_in(&identity("t", "teacher@example.com"), &policy).status,
            AccountStatus::Approved
        );
        assert_eq!(
            dir.register_sign_in(&identity("p", "pupil@example.com"), &policy).status,
            AccountStatus::Pending
        );
        assert_eq!(dir.with_status(AccountStatus::Pending).count(), 1);
    }

    #[test]
    fn test_returning_user_keeps_status() {
        let policy = AuthorizationPolicy::default();
        let mut dir = UserDirectory::new();
        dir.register_sign_in(&identity("p", "pupil@example.com"), &policy);
        assert!(dir.set_status("p", AccountStatus::Approved));
        let account = dir.register_sign_in(&identity("p", "new@example.com"), &policy);
        assert_eq!(account.status, AccountStatus::Approved);
        assert_eq!(account.email, "new@example.com");
        assert!(!dir.set_status("ghost", AccountStatus::Denied));
    }
}
