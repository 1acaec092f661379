//! Capability table: which role tier each mutating action requires.
//!
//! Reads need authentication only; they are household-scoped by the query
//! layer and never consult this table.

use std::fmt;

use crate::model::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    EditTasks,
    EditCategories,
    EditMembers,
    EditPets,
    RedeemRewards,
    InviteUsers,
    ManageRoles,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::EditTasks => "edit_tasks",
            Action::EditCategories => "edit_categories",
            Action::EditMembers => "edit_members",
            Action::EditPets => "edit_pets",
            Action::RedeemRewards => "redeem_rewards",
            Action::InviteUsers => "invite_users",
            Action::ManageRoles => "manage_roles",
        };
        f.write_str(name)
    }
}

/// The minimum role tier an action requires.
pub fn required_role(action: Action) -> Role {
    match action {
        Action::EditTasks
        | Action::EditCategories
        | Action::EditMembers
        | Action::EditPets
        | Action::RedeemRewards => Role::Adult,

        Action::InviteUsers | Action::ManageRoles => Role::Admin,
    }
}

impl Role {
    pub fn allows(self, action: Action) -> bool {
        self >= required_role(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adults_can_edit_but_not_invite() {
        assert!(Role::Adult.allows(Action::EditTasks));
        assert!(Role::Adult.allows(Action::RedeemRewards));
        assert!(!Role::Adult.allows(Action::InviteUsers));
        assert!(!Role::Adult.allows(Action::ManageRoles));
    }

    #[test]
    fn children_are_read_only() {
        assert!(!Role::Child.allows(Action::EditTasks));
        assert!(!Role::Child.allows(Action::EditCategories));
        assert!(!Role::Child.allows(Action::EditMembers));
        assert!(!Role::Child.allows(Action::EditPets));
        assert!(!Role::Child.allows(Action::RedeemRewards));
    }

    #[test]
    fn admins_can_do_everything() {
        for action in [
            Action::EditTasks,
            Action::EditCategories,
            Action::EditMembers,
            Action::EditPets,
            Action::RedeemRewards,
            Action::InviteUsers,
            Action::ManageRoles,
        ] {
            assert!(Role::Admin.allows(action), "admin should allow {action}");
        }
    }
}
