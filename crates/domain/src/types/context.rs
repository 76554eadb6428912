//! Request context threaded through every engine call

use serde::{Deserialize, Serialize};

use crate::errors::{Result, WorkTrackError};
use crate::impl_domain_status_conversions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ChangeSelectedEmployee,
    AllowDeleteTime,
    AllowModifyTime,
    AllowManualTime,
}

impl_domain_status_conversions!(Permission {
    ChangeSelectedEmployee => "change_selected_employee",
    AllowDeleteTime => "allow_delete_time",
    AllowModifyTime => "allow_modify_time",
    AllowManualTime => "allow_manual_time",
});

/// Who is calling, for which tenant.
///
/// Replaces ambient request state: the engine never looks these values up on
/// its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub tenant_id: String,
    pub organization_id: Option<String>,
    /// `None` for system callers such as the scheduler.
    pub employee_id: Option<String>,
    pub permissions: Vec<Permission>,
}

impl RequestContext {
    pub fn for_employee(
        tenant_id: impl Into<String>,
        organization_id: impl Into<String>,
        employee_id: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            organization_id: Some(organization_id.into()),
            employee_id: Some(employee_id.into()),
            permissions: Vec::new(),
        }
    }

    /// Context for background jobs acting across employees.
    pub fn system(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            organization_id: None,
            employee_id: None,
            permissions: vec![Permission::ChangeSelectedEmployee],
        }
    }

    #[must_use]
    pub fn with_permission(mut self, permission: Permission) -> Self {
        if !self.permissions.contains(&permission) {
            self.permissions.push(permission);
        }
        self
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }

    pub fn current_tenant_id(&self) -> Result<&str> {
        if self.tenant_id.trim().is_empty() {
            return Err(WorkTrackError::InvalidInput("missing tenant context".into()));
        }
        Ok(&self.tenant_id)
    }

    pub fn current_employee_id(&self) -> Result<&str> {
        self.employee_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| WorkTrackError::InvalidInput("missing employee context".into()))
    }

    /// Employee the request acts on.
    ///
    /// Callers without `CHANGE_SELECTED_EMPLOYEE` always act on themselves,
    /// whatever they asked for.
    pub fn resolve_employee<'a>(&'a self, requested: Option<&'a str>) -> Result<&'a str> {
        match requested {
            Some(id) if self.has_permission(Permission::ChangeSelectedEmployee) => Ok(id),
            _ => self.current_employee_id(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn employee_scope_follows_permission() {
        let ctx = RequestContext::for_employee("t", "o", "me");
        assert_eq!(ctx.resolve_employee(Some("other")).unwrap(), "me");

        let ctx = ctx.with_permission(Permission::ChangeSelectedEmployee);
        assert_eq!(ctx.resolve_employee(Some("other")).unwrap(), "other");
        assert_eq!(ctx.resolve_employee(None).unwrap(), "me");
    }

    #[test]
    fn missing_context_is_rejected() {
        let ctx = RequestContext::system("");
        assert!(matches!(ctx.current_tenant_id(), Err(WorkTrackError::InvalidInput(_))));
        assert!(ctx.current_employee_id().is_err());
    }
}
