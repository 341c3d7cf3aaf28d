//! 解答履歴から 1 日分の解答数と獲得ポイントを集計する。

use chrono::{Days, NaiveDate};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::datetime::{local_date, parse_instant};
use crate::dreamhack::SolveEntry;

/// 最後に日次レポートを送った日付。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsCursor {
    #[serde(rename = "updated", default)]
    pub last_reported_date: Option<NaiveDate>,
}

/// 解答をどの日の集計に含めるか。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportDay {
    /// ローカル日付の翌日が基準日と一致する解答（前日分）を集計する。
    #[default]
    Previous,
    /// ローカル日付が基準日と一致する解答（当日分）を集計する。
    Current,
}

impl ReportDay {
    /// 基準日 `today` に対して集計対象となる暦日を返す。
    pub fn target_date(self, today: NaiveDate) -> Option<NaiveDate> {
        match self {
            ReportDay::Previous => today.checked_sub_days(Days::new(1)),
            ReportDay::Current => Some(today),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DailyStats {
    pub solved_count: u64,
    pub earned_points: u64,
}

/// 今日の分をまだ報告していなければ true を返す。
pub fn should_check_today(cursor: &StatsCursor, today: NaiveDate) -> bool {
    cursor
        .last_reported_date
        .is_none_or(|reported| reported < today)
}

/// `today` を基準に、`report_day` が示す日に解答されたエントリを集計する。
///
/// `solved_at` がない、またはパースできないエントリは除外する。
pub fn aggregate(
    entries: &[SolveEntry],
    today: NaiveDate,
    zone: Tz,
    report_day: ReportDay,
) -> DailyStats {
    let Some(target) = report_day.target_date(today) else {
        return DailyStats::default();
    };

    entries
        .iter()
        .filter(|entry| {
            parse_instant(entry.solved_at.as_deref())
                .is_some_and(|solved_at| local_date(solved_at, zone) == target)
        })
        .fold(DailyStats::default(), |acc, entry| DailyStats {
            solved_count: acc.solved_count.saturating_add(1),
            earned_points: acc.earned_points.saturating_add(entry.earned_points),
        })
}
