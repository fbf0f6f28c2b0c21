//! Utility functions for the registry service

use chrono::{Local, NaiveDate};

/// Today's calendar date, the unit records are touched with
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Whole days elapsed from `earlier` to `later` (negative if reversed)
pub fn days_between(earlier: NaiveDate, later: NaiveDate) -> i64 {
    (later - earlier).num_days()
}

/// Keep the first occurrence of every item, preserving order
pub fn dedup_preserving_order<T: PartialEq + Clone>(items: &[T]) -> Vec<T> {
    let mut unique: Vec<T> = Vec::with_capacity(items.len());
    for item in items {
        if !unique.contains(item) {
            unique.push(item.clone());
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_days_between() {
        let a = NaiveDate::from_ymd_opt(2024, 2, 25).unwrap();
        let b = NaiveDate::from_ymd_opt(2024, 3, 6).unwrap();
        assert_eq!(days_between(a, b), 10);
        assert_eq!(days_between(b, a), -10);
        assert_eq!(days_between(a, a), 0);
    }

    #[test]
    fn test_dedup_preserving_order() {
        let ids = vec!["b", "a", "b", "c", "a"];
        assert_eq!(dedup_preserving_order(&ids), vec!["b", "a", "c"]);
    }
}
