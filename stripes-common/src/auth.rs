//! Role resolution and the authorization table
//!
//! The only privilege rule is a configured set of admin email addresses.
//! Everyone else is classified by account status and whether a student
//! record is linked to their user id.
//!
//! # Pure Functions
//!
//! Nothing here touches shared state. The gateway consults [`Role::permits`]
//! before every mutation.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::{AccountStatus, SharedDocument, StudentId, UserAccount, UserId};

/// Signed-in identity as supplied by the external identity provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub uid: UserId,
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
}

/// Authorization category of the signed-in user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", content = "studentId", rename_all = "kebab-case")]
pub enum Role {
    Admin,
    /// Approved account linked to exactly this student record
    LinkedStudent(StudentId),
    ApprovedUnlinked,
    Pending,
    Denied,
}

impl Role {
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }

    /// True for roles that can have local edits to the shared document
    pub fn can_write(&self) -> bool {
        matches!(self, Role::Admin | Role::LinkedStudent(_))
    }

    /// Apply the authorization table. `target` is the student an operation
    /// acts on, when it acts on one.
    pub fn permits(&self, operation: Operation, target: Option<&str>) -> bool {
        match self {
            Role::Admin => true,
            Role::LinkedStudent(own) => {
                operation == Operation::ToggleProgress && target == Some(own.as_str())
            }
            Role::ApprovedUnlinked | Role::Pending | Role::Denied => false,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::LinkedStudent(id) => write!(f, "linked student {}", id),
            Role::ApprovedUnlinked => write!(f, "approved (unlinked) user"),
            Role::Pending => write!(f, "pending user"),
            Role::Denied => write!(f, "denied user"),
        }
    }
}

/// Every state-mutating operation the gateway exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    AddStudent,
    DeleteStudent,
    RenameStudent,
    AddSong,
    EditSong,
    DeleteSong,
    EditCurriculum,
    EditLesson,
    ToggleProgress,
    AdvanceLevel,
    LinkUser,
    ManageAccounts,
    SetSortPreference,
    Import,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::AddStudent => "add students",
            Operation::DeleteStudent => "delete students",
            Operation::RenameStudent => "rename students",
            Operation::AddSong => "add songs",
            Operation::EditSong => "edit songs",
            Operation::DeleteSong => "delete songs",
            Operation::EditCurriculum => "edit the curriculum",
            Operation::EditLesson => "edit lesson content",
            Operation::ToggleProgress => "toggle this progress item",
            Operation::AdvanceLevel => "advance student levels",
            Operation::LinkUser => "link users to students",
            Operation::ManageAccounts => "approve or deny accounts",
            Operation::SetSortPreference => "change the sort preference",
            Operation::Import => "import data",
        }
    }
}

/// Constructor-injected privilege configuration
#[derive(Debug, Clone, Default)]
pub struct AuthorizationPolicy {
    admin_emails: Vec<String>,
}

impl AuthorizationPolicy {
    /// Emails are compared case-insensitively
    pub fn new<I, S>(admin_emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            admin_emails: admin_emails
                .into_iter()
                .map(|e| e.as_ref().trim().to_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }

    pub fn is_privileged(&self, email: &str) -> bool {
        let email = email.trim().to_lowercase();
        self.admin_emails.iter().any(|e| *e == email)
    }

    /// Resolve the session role for an account against the current document
    pub fn resolve_role(&self, account: &UserAccount, document: &SharedDocument) -> Role {
        if self.is_privileged(&account.email) {
            return Role::Admin;
        }
        match account.status {
            AccountStatus::Denied => Role::Denied,
            AccountStatus::Pending => Role::Pending,
            AccountStatus::Approved => match document.student_linked_to(&account.id) {
                Some(student) => Role::LinkedStudent(student.id.clone()),
                None => Role::ApprovedUnlinked,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Student;
    use chrono::Utc;

    fn account(email: &str, status: AccountStatus) -> UserAccount {
        UserAccount {
            id: "u1".into(),
            email: email.into(),
            display_name: None,
            status,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_privileged_email_is_admin_regardless_of_status() {
        let policy = AuthorizationPolicy::new(["Teacher@Example.com"]);
        let doc = SharedDocument::default();
        let role = policy.resolve_role(&account("teacher@example.com ", AccountStatus::Pending), &doc);
        assert_eq!(role, Role::Admin);
    }

    #[test]
    fn test_status_roles() {
        let policy = AuthorizationPolicy::new(["teacher@example.com"]);
        let mut doc = SharedDocument::default();
        assert_eq!(
            policy.resolve_role(&account("a@b.c", AccountStatus::Pending), &doc),
            Role::Pending
        );
        assert_eq!(
            policy.resolve_role(&account("a@b.c", AccountStatus::Denied), &doc),
            Role::Denied
        );
        assert_eq!(
            policy.resolve_role(&account("a@b.c", AccountStatus::Approved), &doc),
            Role::ApprovedUnlinked
        );

        doc.students.push(Student {
            id: "s9".into(),
            name: "Kim".into(),
            current_level: "level1".into(),
            progress: Default::default(),
            linked_user_id: Some("u1".into()),
            date_added: Utc::now(),
        });
        assert_eq!(
            policy.resolve_role(&account("a@b.c", AccountStatus::Approved), &doc),
            Role::LinkedStudent("s9".into())
        );
    }

    #[test]
    fn test_permission_table() {
        let linked = Role::LinkedStudent("me".into());
        assert!(linked.permits(Operation::ToggleProgress, Some("me")));
        assert!(!linked.permits(Operation::ToggleProgress, Some("other")));
        assert!(!linked.permits(Operation::AddStudent, None));
        assert!(!linked.permits(Operation::AdvanceLevel, Some("me")));

        for role in [Role::ApprovedUnlinked, Role::Pending, Role::Denied] {
            assert!(!role.permits(Operation::ToggleProgress, Some("me")));
            assert!(!role.permits(Operation::AddSong, None));
        }
        assert!(Role::Admin.permits(Operation::Import, None));
    }
}
