// SPDX-FileCopyrightText: 2026 Mailroom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Occurrence arithmetic for recurring schedules.
//!
//! Occurrences are counted from the schedule's anchor rather than from the
//! previous run, so a monthly schedule anchored on the 31st fires on the last
//! day of short months and returns to the 31st afterwards.

use chrono::{DateTime, Duration, Months, Utc};
use mailroom_core::Recurrence;

/// The `n`th occurrence after `anchor` (`n = 0` is the anchor itself).
pub fn occurrence(anchor: DateTime<Utc>, rule: Recurrence, n: u32) -> Option<DateTime<Utc>> {
    match rule {
        Recurrence::Daily => anchor.checked_add_signed(Duration::days(i64::from(n))),
        Recurrence::Weekly => anchor.checked_add_signed(Duration::weeks(i64::from(n))),
        // chrono clamps the day to the end of shorter months.
        Recurrence::Monthly => anchor.checked_add_months(Months::new(n)),
    }
}

/// The first occurrence strictly later than `after`.
///
/// Missed occurrences are skipped, never replayed. `None` only on calendar
/// overflow.
pub fn next_occurrence(
    anchor: DateTime<Utc>,
    rule: Recurrence,
    after: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if anchor > after {
        return Some(anchor);
    }
    let mut n = estimate(anchor, rule, after);
    loop {
        let candidate = occurrence(anchor, rule, n)?;
        if candidate > after {
            return Some(candidate);
        }
        n = n.checked_add(1)?;
    }
}

/// A lower bound on the index of the next occurrence, so the search loop
/// runs a handful of steps even after long outages.
fn estimate(anchor: DateTime<Utc>, rule: Recurrence, after: DateTime<Utc>) -> u32 {
    let elapsed = after - anchor;
    let whole = match rule {
        Recurrence::Daily => elapsed.num_days(),
        Recurrence::Weekly => elapsed.num_weeks(),
        Recurrence::Monthly => elapsed.num_days() / 31,
    };
    u32::try_from(whole.max(0)).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use proptest::prelude::*;

    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn daily_advances_past_run_time() {
        let anchor = at(2026, 3, 1, 9);
        assert_eq!(
            next_occurrence(anchor, Recurrence::Daily, anchor),
            Some(at(2026, 3, 2, 9))
        );
        assert_eq!(
            next_occurrence(anchor, Recurrence::Daily, at(2026, 3, 5, 8)),
            Some(at(2026, 3, 5, 9))
        );
    }

    #[test]
    fn missed_occurrences_are_skipped() {
        let anchor = at(2026, 1, 5, 9);
        assert_eq!(
            next_occurrence(anchor, Recurrence::Weekly, at(2026, 2, 20, 12)),
            Some(at(2026, 2, 23, 9))
        );
    }

    #[test]
    fn monthly_clamps_without_drifting() {
        let anchor = at(2026, 1, 31, 9);
        assert_eq!(
            next_occurrence(anchor, Recurrence::Monthly, anchor),
            Some(at(2026, 2, 28, 9))
        );
        assert_eq!(
            next_occurrence(anchor, Recurrence::Monthly, at(2026, 2, 28, 9)),
            Some(at(2026, 3, 31, 9))
        );
        assert_eq!(
            next_occurrence(anchor, Recurrence::Monthly, at(2026, 4, 1, 0)),
            Some(at(2026, 4, 30, 9))
        );
    }

    #[test]
    fn future_anchor_is_its_own_next_occurrence() {
        let anchor = at(2027, 1, 1, 0);
        assert_eq!(
            next_occurrence(anchor, Recurrence::Monthly, at(2026, 6, 1, 0)),
            Some(anchor)
        );
    }

    fn rules() -> impl Strategy<Value = Recurrence> {
        prop_oneof![
            Just(Recurrence::Daily),
            Just(Recurrence::Weekly),
            Just(Recurrence::Monthly),
        ]
    }

    proptest! {
        #[test]
        fn next_is_strictly_later_and_minimal(
            rule in rules(),
            anchor_secs in 1_600_000_000i64..1_900_000_000,
            offset_secs in 0i64..200_000_000,
        ) {
            let anchor = Utc.timestamp_opt(anchor_secs, 0).unwrap();
            let after = anchor + Duration::seconds(offset_secs);
            let next = next_occurrence(anchor, rule, after).unwrap();
            prop_assert!(next > after);

            // No occurrence lies strictly between `after` and `next`.
            let mut n = 0;
            while let Some(candidate) = occurrence(anchor, rule, n) {
                if candidate >= next {
                    break;
                }
                prop_assert!(candidate <= after);
                n += 1;
            }
        }
    }
}
