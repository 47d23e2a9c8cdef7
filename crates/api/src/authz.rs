//! API-side authorization guard for commands.
//!
//! This enforces authorization at the command boundary (before dispatch),
//! while keeping domain aggregates and infra auth-agnostic.

use stocktake_auth::{
    AuthzError, CommandAuthorization, Permission, Principal, TenantMembership, authorize,
};

use crate::context::{PrincipalContext, TenantContext};

/// Check authorization for a command in the current request context.
///
/// This is intended to be called **before** dispatching a command.
pub fn authorize_command<C: CommandAuthorization>(
    tenant: &TenantContext,
    principal: &PrincipalContext,
    command: &C,
) -> Result<(), AuthzError> {
    let membership = TenantMembership {
        tenant_id: tenant.tenant_id(),
        roles: principal.roles().to_vec(),
        permissions: permissions_from_roles(principal.roles()),
    };

    let principal = Principal {
        principal_id: principal.principal_id(),
        active_tenant_id: tenant.tenant_id(),
        membership,
    };

    for perm in command.required_permissions() {
        authorize(&principal, perm)?;
    }

    Ok(())
}

/// Role expansion over the permission vocabulary of this service:
/// `audits.manage` (plan, run, complete, cancel, delete), `audits.count`,
/// `audits.verify` and `reports.generate`.
///
/// Kept in code until a real policy source exists (e.g. DB-backed).
fn permissions_from_roles(roles: &[stocktake_auth::Role]) -> Vec<Permission> {
    let mut perms = Vec::new();
    for role in roles {
        match role.as_str() {
            // "admin" grants all permissions in the current tenant.
            "admin" => return vec![Permission::new("*")],
            // Supervisors own the audit lifecycle and the report pipeline.
            "supervisor" => perms.extend([
                Permission::new("audits.manage"),
                Permission::new("audits.count"),
                Permission::new("audits.verify"),
                Permission::new("reports.generate"),
            ]),
            // Counters work the floor: record and verify counts only.
            "counter" => perms.extend([
                Permission::new("audits.count"),
                Permission::new("audits.verify"),
            ]),
            _ => {}
        }
    }
    perms
}
