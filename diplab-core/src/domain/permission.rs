//! Daily permissions and the date-keyed lookup the simulator queries every hour.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

/// Trading permission for one UTC calendar day.
///
/// A `permitted` day allows the strategy to look for an entry on the
/// following day. `ma_value` may be NaN while the moving average warms up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyPermission {
    pub date: NaiveDate,
    pub permitted: bool,
    pub reference_close: f64,
    pub ma_value: f64,
}

#[derive(Debug, Error, PartialEq)]
pub enum PermissionError {
    #[error("duplicate permission for date {date} (row {index})")]
    DuplicateDate { index: usize, date: NaiveDate },
}

/// Immutable date → permission mapping, built once before the simulation loop.
#[derive(Debug, Clone, Default)]
pub struct PermissionMap {
    by_date: BTreeMap<NaiveDate, DailyPermission>,
}

impl PermissionMap {
    /// Build the lookup. Rejects the first duplicated date.
    pub fn build(rows: &[DailyPermission]) -> Result<Self, PermissionError> {
        let mut by_date = BTreeMap::new();
        let mut seen = HashSet::with_capacity(rows.len());
        for (index, row) in rows.iter().enumerate() {
            if !seen.insert(row.date) {
                return Err(PermissionError::DuplicateDate {
                    index,
                    date: row.date,
                });
            }
            by_date.insert(row.date, row.clone());
        }
        Ok(Self { by_date })
    }

    pub fn get(&self, date: NaiveDate) -> Option<&DailyPermission> {
        self.by_date.get(&date)
    }

    /// True if `date` exists and is permitted.
    pub fn is_permitted(&self, date: NaiveDate) -> bool {
        self.by_date.get(&date).is_some_and(|p| p.permitted)
    }

    pub fn len(&self) -> usize {
        self.by_date.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_date.is_empty()
    }

    pub fn permitted_count(&self) -> usize {
        self.by_date.values().filter(|p| p.permitted).count()
    }

    /// Iterate in ascending date order.
    pub fn iter(&self) -> impl Iterator<Item = &DailyPermission> {
        self.by_date.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(day: u32, permitted: bool) -> DailyPermission {
        DailyPermission {
            date: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
            permitted,
            reference_close: 100.0,
            ma_value: 95.0,
        }
    }

    #[test]
    fn lookup_by_date() {
        let map = PermissionMap::build(&[row(1, true), row(2, false)]).unwrap();
        assert_eq!(map.len(), 2);
        assert!(map.is_permitted(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()));
        assert!(!map.is_permitted(NaiveDate::from_ymd_opt(2024, 3, 2).unwrap()));
        assert!(!map.is_permitted(NaiveDate::from_ymd_opt(2024, 3, 3).unwrap()));
        assert_eq!(map.permitted_count(), 1);
    }

    #[test]
    fn duplicate_dates_are_rejected() {
        let err = PermissionMap::build(&[row(1, true), row(2, false), row(1, false)]).unwrap_err();
        assert_eq!(
            err,
            PermissionError::DuplicateDate {
                index: 2,
                date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            }
        );
    }
}
