use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    Excused,
}

impl AttendanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::Late => "late",
            AttendanceStatus::Excused => "excused",
        }
    }

    pub fn parse(s: &str) -> Option<AttendanceStatus> {
        match s {
            "present" => Some(AttendanceStatus::Present),
            "absent" => Some(AttendanceStatus::Absent),
            "late" => Some(AttendanceStatus::Late),
            "excused" => Some(AttendanceStatus::Excused),
            _ => None,
        }
    }
}

/// Status counts for one scope (a session, a class, a date range).
/// `total` is always the true record count; only percentage math
/// substitutes a divisor of 1 when it is zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AttendanceStats {
    pub present: usize,
    pub absent: usize,
    pub late: usize,
    pub excused: usize,
    pub total: usize,
}

impl AttendanceStats {
    pub fn record(&mut self, status: AttendanceStatus) {
        match status {
            AttendanceStatus::Present => self.present += 1,
            AttendanceStatus::Absent => self.absent += 1,
            AttendanceStatus::Late => self.late += 1,
            AttendanceStatus::Excused => self.excused += 1,
        }
        self.total += 1;
    }

    pub fn percentages(&self) -> StatusPercentages {
        StatusPercentages {
            present: percent(self.present, self.total),
            absent: percent(self.absent, self.total),
            late: percent(self.late, self.total),
            excused: percent(self.excused, self.total),
        }
    }
}

/// Whole-percent breakdown. Rounded independently per status, so the four
/// values need not sum to exactly 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusPercentages {
    pub present: u32,
    pub absent: u32,
    pub late: u32,
    pub excused: u32,
}

/// `round(count / max(total, 1) * 100)`, half away from zero.
/// A zero total yields 0, never a division error.
pub fn percent(count: usize, total: usize) -> u32 {
    (count as f64 / total.max(1) as f64 * 100.0).round() as u32
}

pub fn aggregate<I>(statuses: I) -> AttendanceStats
where
    I: IntoIterator<Item = AttendanceStatus>,
{
    let mut stats = AttendanceStats::default();
    for status in statuses {
        stats.record(status);
    }
    stats
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DayStats {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub stats: AttendanceStats,
}

/// One AttendanceStats per requested date, in the requested order.
/// Dates with no matching records get all-zero stats rather than being
/// dropped; callers rely on index alignment with their date labels.
pub fn daily_series(
    records: &[(NaiveDate, AttendanceStatus)],
    dates: &[NaiveDate],
) -> Vec<DayStats> {
    let mut by_date: HashMap<NaiveDate, AttendanceStats> = HashMap::new();
    for &(date, status) in records {
        by_date.entry(date).or_default().record(status);
    }
    dates
        .iter()
        .map(|&date| DayStats {
            date,
            stats: by_date.get(&date).copied().unwrap_or_default(),
        })
        .collect()
}

/// Last bucket's present% minus the first bucket's. Empty series → 0.
pub fn trend(series: &[DayStats]) -> i32 {
    let first = match series.first() {
        Some(d) => d.stats.percentages().present as i32,
        None => return 0,
    };
    let last = series
        .last()
        .map(|d| d.stats.percentages().present as i32)
        .unwrap_or(0);
    last - first
}

/// Bucket with the highest present%. Ties go to the earliest bucket, so the
/// scan only replaces on a strict improvement.
pub fn best_day(series: &[DayStats]) -> Option<&DayStats> {
    let mut best: Option<&DayStats> = None;
    for day in series {
        let pct = day.stats.percentages().present;
        match best {
            Some(b) if b.stats.percentages().present >= pct => {}
            _ => best = Some(day),
        }
    }
    best
}

/// Bucket with the lowest present%. Ties go to the earliest bucket.
pub fn worst_day(series: &[DayStats]) -> Option<&DayStats> {
    let mut worst: Option<&DayStats> = None;
    for day in series {
        let pct = day.stats.percentages().present;
        match worst {
            Some(w) if w.stats.percentages().present <= pct => {}
            _ => worst = Some(day),
        }
    }
    worst
}

/// Ascending calendar days ending at `today`, `n` entries.
pub fn last_n_days(today: NaiveDate, n: u32) -> Vec<NaiveDate> {
    (0..n)
        .rev()
        .map(|back| today - Duration::days(back as i64))
        .collect()
}

/// Deterministic status assignment for demo data: 85% present, 7% absent,
/// 5% late, 3% excused.
pub fn seed_status(student_index: usize, day_offset: usize) -> AttendanceStatus {
    let seed = (student_index * 3 + day_offset * 7) % 100;
    if seed < 85 {
        AttendanceStatus::Present
    } else if seed < 92 {
        AttendanceStatus::Absent
    } else if seed < 97 {
        AttendanceStatus::Late
    } else {
        AttendanceStatus::Excused
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("test date")
    }

    #[test]
    fn aggregate_counts_every_status_once() {
        let stats = aggregate([
            AttendanceStatus::Present,
            AttendanceStatus::Present,
            AttendanceStatus::Absent,
            AttendanceStatus::Late,
        ]);
        assert_eq!(
            stats,
            AttendanceStats {
                present: 2,
                absent: 1,
                late: 1,
                excused: 0,
                total: 4,
            }
        );
        let pct = stats.percentages();
        assert_eq!((pct.present, pct.absent, pct.late, pct.excused), (50, 25, 25, 0));
    }

    #[test]
    fn aggregate_conserves_counts() {
        let input = vec![
            AttendanceStatus::Present,
            AttendanceStatus::Excused,
            AttendanceStatus::Late,
            AttendanceStatus::Absent,
            AttendanceStatus::Present,
            AttendanceStatus::Late,
            AttendanceStatus::Present,
        ];
        let stats = aggregate(input.iter().copied());
        assert_eq!(stats.total, input.len());
        assert_eq!(
            stats.present + stats.absent + stats.late + stats.excused,
            input.len()
        );
    }

    #[test]
    fn aggregate_is_order_independent() {
        let forward = vec![
            AttendanceStatus::Present,
            AttendanceStatus::Absent,
            AttendanceStatus::Late,
            AttendanceStatus::Excused,
            AttendanceStatus::Present,
        ];
        let mut reversed = forward.clone();
        reversed.reverse();
        assert_eq!(
            aggregate(forward.iter().copied()),
            aggregate(reversed.iter().copied())
        );
    }

    #[test]
    fn empty_input_yields_zeros_not_errors() {
        let stats = aggregate(std::iter::empty());
        assert_eq!(stats, AttendanceStats::default());
        let pct = stats.percentages();
        assert_eq!((pct.present, pct.absent, pct.late, pct.excused), (0, 0, 0, 0));
    }

    #[test]
    fn percentages_stay_within_bounds() {
        for present in 0..=7usize {
            for absent in 0..=7usize {
                let stats = AttendanceStats {
                    present,
                    absent,
                    late: 0,
                    excused: 0,
                    total: present + absent,
                };
                let pct = stats.percentages();
                for v in [pct.present, pct.absent, pct.late, pct.excused] {
                    assert!(v <= 100, "{present}/{absent} gave {v}");
                }
            }
        }
    }

    #[test]
    fn all_excused_is_a_full_bucket() {
        let stats = aggregate([AttendanceStatus::Excused; 3]);
        assert_eq!(stats.total, 3);
        let pct = stats.percentages();
        assert_eq!(pct.excused, 100);
        assert_eq!((pct.present, pct.absent, pct.late), (0, 0, 0));
    }

    #[test]
    fn series_aligns_with_requested_dates() {
        let dates = vec![d("2024-01-01"), d("2024-01-02"), d("2024-01-03")];
        let records = vec![
            (d("2024-01-02"), AttendanceStatus::Present),
            (d("2024-01-02"), AttendanceStatus::Present),
        ];
        let series = daily_series(&records, &dates);
        assert_eq!(series.len(), dates.len());
        for (day, date) in series.iter().zip(&dates) {
            assert_eq!(day.date, *date);
        }
        assert_eq!(series[0].stats.total, 0);
        assert_eq!(series[1].stats.present, 2);
        assert_eq!(series[1].stats.total, 2);
        assert_eq!(series[2].stats.total, 0);
    }

    #[test]
    fn buckets_are_isolated() {
        let dates = vec![d("2024-03-04"), d("2024-03-05")];
        let base = vec![(d("2024-03-04"), AttendanceStatus::Present)];
        let mut extended = base.clone();
        extended.push((d("2024-03-05"), AttendanceStatus::Absent));
        extended.push((d("2024-03-05"), AttendanceStatus::Late));

        let before = daily_series(&base, &dates);
        let after = daily_series(&extended, &dates);
        assert_eq!(before[0], after[0]);
        assert_eq!(after[1].stats.total, 2);
    }

    #[test]
    fn trend_is_last_minus_first_present_rate() {
        // 60% present on day one, 80% on day seven.
        let mut records = Vec::new();
        let first = d("2024-02-01");
        for i in 0..5 {
            let status = if i < 3 {
                AttendanceStatus::Present
            } else {
                AttendanceStatus::Absent
            };
            records.push((first, status));
        }
        let last = d("2024-02-07");
        for i in 0..5 {
            let status = if i < 4 {
                AttendanceStatus::Present
            } else {
                AttendanceStatus::Absent
            };
            records.push((last, status));
        }
        let dates = last_n_days(last, 7);
        let series = daily_series(&records, &dates);
        assert_eq!(trend(&series), 20);

        // Reversed rates give a negative trend.
        let swapped: Vec<_> = records
            .iter()
            .map(|&(date, status)| {
                let other = if date == first { last } else { first };
                (other, status)
            })
            .collect();
        let series = daily_series(&swapped, &dates);
        assert_eq!(trend(&series), -20);
    }

    #[test]
    fn best_day_tie_goes_to_earliest() {
        let dates = vec![d("2024-05-01"), d("2024-05-02"), d("2024-05-03")];
        let records = vec![
            (d("2024-05-01"), AttendanceStatus::Present),
            (d("2024-05-02"), AttendanceStatus::Absent),
            (d("2024-05-03"), AttendanceStatus::Present),
        ];
        let series = daily_series(&records, &dates);
        assert_eq!(best_day(&series).map(|b| b.date), Some(d("2024-05-01")));
        assert_eq!(worst_day(&series).map(|w| w.date), Some(d("2024-05-02")));
    }

    #[test]
    fn worst_day_tie_goes_to_earliest() {
        let dates = vec![d("2024-05-01"), d("2024-05-02")];
        let series = daily_series(&[], &dates);
        assert_eq!(worst_day(&series).map(|w| w.date), Some(d("2024-05-01")));
        assert_eq!(best_day(&series).map(|b| b.date), Some(d("2024-05-01")));
    }

    #[test]
    fn last_n_days_is_ascending_and_ends_today() {
        let today = d("2024-06-10");
        let days = last_n_days(today, 7);
        assert_eq!(days.len(), 7);
        assert_eq!(days[0], d("2024-06-04"));
        assert_eq!(days[6], today);
        assert!(days.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn seed_status_follows_the_fixed_distribution() {
        // seed = (i*3 + day*7) % 100
        assert_eq!(seed_status(0, 0), AttendanceStatus::Present);
        assert_eq!(seed_status(29, 0), AttendanceStatus::Absent); // 87
        assert_eq!(seed_status(31, 0), AttendanceStatus::Late); // 93
        assert_eq!(seed_status(33, 0), AttendanceStatus::Excused); // 99
        assert_eq!(seed_status(33, 1), seed_status(33, 1));
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            AttendanceStatus::Present,
            AttendanceStatus::Absent,
            AttendanceStatus::Late,
            AttendanceStatus::Excused,
        ] {
            assert_eq!(AttendanceStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(AttendanceStatus::parse("tardy"), None);
    }
}
