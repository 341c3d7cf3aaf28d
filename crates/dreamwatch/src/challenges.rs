//! 前回のスナップショットと最新の一覧を比較し、新着チャレンジを検出する。

use std::collections::HashSet;

use crate::dreamhack::{Challenge, ChallengeId};

/// スナップショットに含まれるチャレンジ ID の集合を返す。
pub fn known_ids(snapshot: &[Challenge]) -> HashSet<ChallengeId> {
    snapshot.iter().map(|c| c.id).collect()
}

/// `previous` に含まれない ID のチャレンジを、取得順を保ったまま返す。
///
/// 初回起動時（`previous` が空）は取得した一覧すべてが新着になる。
/// 削除や並び替えは検出しない。内容の変更も無視し、ID の有無だけで判定する。
pub fn diff<'a>(previous: &HashSet<ChallengeId>, fetched: &'a [Challenge]) -> Vec<&'a Challenge> {
    fetched
        .iter()
        .filter(|c| !previous.contains(&c.id))
        .collect()
}

/// チャレンジページの URL を組み立てる。
pub fn challenge_link(site_base: &str, id: ChallengeId) -> String {
    format!("{}/wargame/challenges/{}/", site_base.trim_end_matches('/'), id)
}
