//! Employee lookup data consumed by the engine

use serde::{Deserialize, Serialize};

/// The slice of an employee record the engine reads, plus the
/// `total_work_hours` rollup it owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    pub id: String,
    pub tenant_id: String,
    pub organization_id: String,
    /// Weekly limit in hours; `None` means unlimited.
    pub re_weekly_limit: Option<f64>,
    pub bill_rate_value: Option<f64>,
    pub future_date_allowed: bool,
    pub timezone: Option<String>,
    pub total_work_hours: i64,
}

impl Employee {
    pub fn new(
        id: impl Into<String>,
        tenant_id: impl Into<String>,
        organization_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            tenant_id: tenant_id.into(),
            organization_id: organization_id.into(),
            re_weekly_limit: None,
            bill_rate_value: None,
            future_date_allowed: false,
            timezone: None,
            total_work_hours: 0,
        }
    }

    /// Weekly limit in seconds, if any.
    pub fn weekly_limit_secs(&self) -> Option<i64> {
        self.re_weekly_limit.filter(|hours| *hours > 0.0).map(|hours| (hours * 3_600.0) as i64)
    }
}
