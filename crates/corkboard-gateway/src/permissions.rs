//! Channel management decisions. Pure functions over a role lookup.

use anyhow::Result;
use uuid::Uuid;

use corkboard_db::RoleLookup;

pub const CHANNEL_SCOPE: &str = "channel";

/// Role suffixes that may manage folders.
pub const FOLDER_MANAGER_SUFFIXES: &[&str] = &["-owner", "-admin", "-member"];

/// Role suffixes that may delete someone else's note. Narrower than the
/// folder set: `-member` is not included.
pub const NOTE_DELETE_SUFFIXES: &[&str] = &["-owner", "-admin"];

/// Whether `user_id` may manage a resource in `channel_id` created by `creator_id`.
pub fn can_manage<R: RoleLookup + ?Sized>(
    roles: &R,
    user_id: Uuid,
    channel_id: Uuid,
    creator_id: Option<Uuid>,
) -> Result<bool> {
    has_authority(roles, user_id, channel_id, creator_id, FOLDER_MANAGER_SUFFIXES)
}

/// Whether `user_id` may delete a note in `channel_id` created by `creator_id`.
pub fn can_delete_note<R: RoleLookup + ?Sized>(
    roles: &R,
    user_id: Uuid,
    channel_id: Uuid,
    creator_id: Option<Uuid>,
) -> Result<bool> {
    has_authority(roles, user_id, channel_id, creator_id, NOTE_DELETE_SUFFIXES)
}

fn has_authority<R: RoleLookup + ?Sized>(
    roles: &R,
    user_id: Uuid,
    channel_id: Uuid,
    creator_id: Option<Uuid>,
    suffixes: &[&str],
) -> Result<bool> {
    if user_id.is_nil() || channel_id.is_nil() {
        return Ok(false);
    }

    // Creators always manage their own resources; no lookup needed.
    if creator_id.is_some_and(|creator| !creator.is_nil() && creator == user_id) {
        return Ok(true);
    }

    let role_ids = roles.list_role_ids(user_id, channel_id, CHANNEL_SCOPE)?;
    Ok(role_ids
        .iter()
        .any(|role| suffixes.iter().any(|suffix| role.ends_with(suffix))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedRoles {
        roles: Vec<&'static str>,
        calls: AtomicUsize,
    }

    impl FixedRoles {
        fn new(roles: &[&'static str]) -> Self {
            Self {
                roles: roles.to_vec(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl RoleLookup for FixedRoles {
        fn list_role_ids(&self, _: Uuid, _: Uuid, scope_kind: &str) -> Result<Vec<String>> {
            assert_eq!(scope_kind, CHANNEL_SCOPE);
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.roles.iter().map(|r| r.to_string()).collect())
        }
    }

    struct BrokenRoles;

    impl RoleLookup for BrokenRoles {
        fn list_role_ids(&self, _: Uuid, _: Uuid, _: &str) -> Result<Vec<String>> {
            Err(anyhow::anyhow!("role service unavailable"))
        }
    }

    #[test]
    fn empty_ids_deny_without_lookup() {
        let roles = FixedRoles::new(&["c-owner"]);
        let id = Uuid::new_v4();
        assert!(!can_manage(&roles, Uuid::nil(), id, None).unwrap());
        assert!(!can_manage(&roles, id, Uuid::nil(), Some(id)).unwrap());
        assert!(!can_manage(&BrokenRoles, Uuid::nil(), id, None).unwrap());
        assert_eq!(roles.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn creator_short_circuits_a_failing_lookup() {
        let user = Uuid::new_v4();
        let channel = Uuid::new_v4();
        assert!(can_manage(&BrokenRoles, user, channel, Some(user)).unwrap());
        assert!(can_delete_note(&BrokenRoles, user, channel, Some(user)).unwrap());
    }

    #[test]
    fn lookup_errors_propagate() {
        let res = can_manage(&BrokenRoles, Uuid::new_v4(), Uuid::new_v4(), Some(Uuid::new_v4()));
        assert!(res.is_err());
    }

    #[test]
    fn member_manages_folders_but_cannot_delete_notes() {
        let roles = FixedRoles::new(&["general-member"]);
        let (user, channel, creator) = (Uuid::new_v4(), Uuid::new_v4(), Some(Uuid::new_v4()));
        assert!(can_manage(&roles, user, channel, creator).unwrap());
        assert!(!can_delete_note(&roles, user, channel, creator).unwrap());
    }

    #[test]
    fn admin_and_owner_may_delete_notes() {
        let (user, channel, creator) = (Uuid::new_v4(), Uuid::new_v4(), Some(Uuid::new_v4()));
        for role in ["team-admin", "team-owner"] {
            let roles = FixedRoles::new(&[role]);
            assert!(can_delete_note(&roles, user, channel, creator).unwrap());
        }
    }

    #[test]
    fn suffix_must_terminate_the_role_id() {
        let roles = FixedRoles::new(&["owner-of-nothing", "admins"]);
        assert!(!can_manage(&roles, Uuid::new_v4(), Uuid::new_v4(), None).unwrap());
    }
}
