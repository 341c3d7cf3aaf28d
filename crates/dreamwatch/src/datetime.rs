//! API のタイムスタンプを設定タイムゾーンのローカル時刻に変換する。

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

/// Dreamhack API が返すタイムスタンプ形式（小数秒 + オフセット）。小数秒は必須。
const API_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f%z";
/// `YYYY-MM-DDTHH:MM:SS` の長さ。直後に小数点が続く必要がある。
const SECONDS_END: usize = 19;

/// API のタイムスタンプ文字列を UTC の時刻にパースする。
///
/// 値がない場合もパースに失敗した場合も `None` を返す。
/// 呼び出し側はどちらも「値なし」として扱う。
pub fn parse_instant(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }

    // `%.f` は小数秒を省略できてしまうので、ここで必須にする
    if raw.get(SECONDS_END..SECONDS_END + 1) != Some(".") {
        return None;
    }

    // `%z` は `Z` を受け付けないので数値オフセットに置き換える
    let normalized = raw.strip_suffix('Z').map(|rest| format!("{rest}+00:00"));

    DateTime::parse_from_str(normalized.as_deref().unwrap_or(raw), API_TIMESTAMP_FORMAT)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// IANA タイムゾーン名を解決する。不正な名前の場合は UTC にフォールバックする。
pub fn resolve_zone(name: &str) -> Tz {
    match name.parse::<Tz>() {
        Ok(tz) => tz,
        Err(e) => {
            tracing::warn!(timezone = %name, error = %e, "Invalid timezone, falling back to UTC");
            Tz::UTC
        }
    }
}

pub fn to_local(instant: DateTime<Utc>, zone: Tz) -> DateTime<Tz> {
    instant.with_timezone(&zone)
}

/// 通知埋め込み用に `YYYY-MM-DD HH:MM TZ` 形式へ整形する。
pub fn format_display(local: &DateTime<Tz>) -> String {
    local.format("%Y-%m-%d %H:%M %Z").to_string()
}

/// 指定タイムゾーンでの暦日を返す。
pub fn local_date(instant: DateTime<Utc>, zone: Tz) -> NaiveDate {
    to_local(instant, zone).date_naive()
}
