//! Record orderings for credits and refunds
//!
//! Credits fill the oldest obligation first; refunds undo the most recent
//! first. Both are keyed on (`payment_start_date`, `id`) and never rely on
//! the order rows come back from the store.
//!
//! Undated records sort after every dated record oldest-first, and therefore
//! before them most-recent-first. This matches PostgreSQL's default
//! `NULLS LAST` for `ASC` and `NULLS FIRST` for `DESC`.

use std::cmp::Ordering;

use crate::record::ObligationRecord;

/// Direction in which an amount walks an identity's records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationOrder {
    /// Ascending by (`payment_start_date`, `id`), used for credits
    OldestFirst,
    /// Descending by (`payment_start_date`, `id`), used for refunds
    MostRecentFirst,
}

impl AllocationOrder {
    /// Compares two records in this order
    pub fn compare(self, a: &ObligationRecord, b: &ObligationRecord) -> Ordering {
        match self {
            AllocationOrder::OldestFirst => oldest_first(a, b),
            AllocationOrder::MostRecentFirst => oldest_first(b, a),
        }
    }

    /// Returns the records sorted in this order
    pub fn sort<'a, I>(self, records: I) -> Vec<&'a ObligationRecord>
    where
        I: IntoIterator<Item = &'a ObligationRecord>,
    {
        let mut sorted: Vec<_> = records.into_iter().collect();
        sorted.sort_by(|a, b| self.compare(a, b));
        sorted
    }
}

fn oldest_first(a: &ObligationRecord, b: &ObligationRecord) -> Ordering {
    let date = match (a.payment_start_date, b.payment_start_date) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    date.then_with(|| a.id.cmp(&b.id))
}

/// Returns the single overflow record of an identity, if any
///
/// The store enforces one overflow record per email. Should more ever be
/// present, the highest id wins.
pub fn find_overflow(records: &[ObligationRecord]) -> Option<&ObligationRecord> {
    records
        .iter()
        .filter(|r| r.is_overflow())
        .max_by_key(|r| r.id)
}

/// Returns the identity's most recently created record (highest id)
pub fn most_recent(records: &[ObligationRecord]) -> Option<&ObligationRecord> {
    records.iter().max_by_key(|r| r.id)
}
