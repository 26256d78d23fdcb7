use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

/// Role
///
/// The closed set of roles the platform knows about. Every role string that
/// arrives from a token, a database row, or a request body goes through
/// [`Role::canonicalize`] before any comparison is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Role {
    SuperAdmin,
    Admin,
    Owner,
    Manager,
    Tenant,
}

impl Role {
    /// canonicalize
    ///
    /// Maps a raw role string onto the enum. Matching is case-insensitive and
    /// treats spaces and hyphens as underscores, so "Property Owner",
    /// "property-owner" and "property_owner" all resolve to `Role::Owner`.
    /// Unknown strings resolve to `None`.
    pub fn canonicalize(raw: &str) -> Option<Role> {
        let normalized: String = raw
            .trim()
            .chars()
            .map(|c| match c {
                ' ' | '-' => '_',
                other => other.to_ascii_lowercase(),
            })
            .collect();

        match normalized.as_str() {
            "super_admin" | "superadmin" => Some(Role::SuperAdmin),
            "admin" | "administrator" => Some(Role::Admin),
            "owner" | "property_owner" | "landlord" => Some(Role::Owner),
            "manager" | "property_manager" => Some(Role::Manager),
            "tenant" | "resident" | "renter" => Some(Role::Tenant),
            _ => None,
        }
    }

    /// The canonical wire name, as stored in tokens and database rows.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::Admin => "admin",
            Role::Owner => "owner",
            Role::Manager => "manager",
            Role::Tenant => "tenant",
        }
    }

    /// Internal staff accounts. These live in `admin_accounts` and carry no customer id.
    pub fn is_internal(&self) -> bool {
        matches!(self, Role::SuperAdmin | Role::Admin)
    }

    pub fn room(&self) -> RoleRoom {
        match self {
            Role::SuperAdmin | Role::Admin => RoleRoom::Admins,
            Role::Owner => RoleRoom::Owners,
            Role::Manager => RoleRoom::Managers,
            Role::Tenant => RoleRoom::Tenants,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// RoleRoom
///
/// The four well-known role groups a real-time connection can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleRoom {
    Admins,
    Owners,
    Managers,
    Tenants,
}

impl RoleRoom {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleRoom::Admins => "admins",
            RoleRoom::Owners => "owners",
            RoleRoom::Managers => "managers",
            RoleRoom::Tenants => "tenants",
        }
    }

    pub fn parse(raw: &str) -> Option<RoleRoom> {
        match raw {
            "admins" => Some(RoleRoom::Admins),
            "owners" => Some(RoleRoom::Owners),
            "managers" => Some(RoleRoom::Managers),
            "tenants" => Some(RoleRoom::Tenants),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_synonyms_collapse_to_one_role() {
        let synonyms = [
            "owner",
            "OWNER",
            "property_owner",
            "property owner",
            "Property-Owner",
            "  owner ",
        ];
        for raw in synonyms {
            assert_eq!(Role::canonicalize(raw), Some(Role::Owner), "{raw}");
        }
    }

    #[test]
    fn unknown_roles_do_not_canonicalize() {
        assert_eq!(Role::canonicalize("student"), None);
        assert_eq!(Role::canonicalize(""), None);
        assert_eq!(Role::canonicalize("owner_admin"), None);
    }

    #[test]
    fn canonical_names_round_trip() {
        for role in [Role::SuperAdmin, Role::Admin, Role::Owner, Role::Manager, Role::Tenant] {
            assert_eq!(Role::canonicalize(role.as_str()), Some(role));
        }
    }

    #[test]
    fn both_admin_roles_share_the_admins_room() {
        assert_eq!(Role::SuperAdmin.room(), RoleRoom::Admins);
        assert_eq!(Role::Admin.room(), RoleRoom::Admins);
        assert!(Role::SuperAdmin.is_internal());
        assert!(!Role::Owner.is_internal());
    }
}
