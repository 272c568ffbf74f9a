//! Overdue sweep planning
//!
//! The decision of which loans become overdue is a pure function of the
//! loans and the clock. Persisting the result is a separate store call.

use chrono::{DateTime, Utc};

use crate::models::loan::{Loan, LoanStatus};

/// Result of planning a sweep over a set of loans
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepPlan {
    /// Input loans with overdue statuses applied
    pub loans: Vec<Loan>,
    /// Ids whose status changed from active to overdue
    pub changed: Vec<i32>,
}

/// Promote every active loan due before `now` to overdue.
///
/// Returned and already-overdue loans pass through untouched, so running the
/// plan twice changes nothing the second time.
pub fn plan_sweep(loans: Vec<Loan>, now: DateTime<Utc>) -> SweepPlan {
    let mut changed = Vec::new();
    let loans = loans
        .into_iter()
        .map(|mut loan| {
            if loan.status == LoanStatus::Active && loan.due_date < now {
                loan.status = LoanStatus::Overdue;
                changed.push(loan.id);
            }
            loan
        })
        .collect();

    SweepPlan { loans, changed }
}
