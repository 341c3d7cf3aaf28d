//! 新着チャレンジと日次集計を定期的にチェックし、Webhook に通知する監視ループ。
//!
//! 1 tick ごとに「新着チャレンジの確認」→「日次集計の確認」の順で実行する。
//! どちらかが失敗してもログに記録するだけで、もう一方と次の tick は継続する。

use std::future::Future;

use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, error, info};

use crate::challenges::{challenge_link, diff, known_ids};
use crate::config::Config;
use crate::datetime::{format_display, local_date, parse_instant, resolve_zone, to_local};
use crate::dreamhack::WargameApi;
use crate::notify::{Notification, Notifier};
use crate::stats::{DailyStats, StatsCursor, aggregate, should_check_today};
use crate::store::StateStore;

/// 日次集計チェックの結果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsOutcome {
    /// 今日の分は報告済み
    AlreadyReported,
    /// 解答履歴が空だったため、次の tick で再確認する
    NoStats,
    /// 集計してカーソルを進めた
    Reported(DailyStats),
}

pub struct Watcher<A, N, S> {
    config: Config,
    api: A,
    notifier: N,
    store: S,
}

impl<A, N, S> Watcher<A, N, S>
where
    A: WargameApi,
    N: Notifier,
    S: StateStore,
{
    pub fn new(config: Config, api: A, notifier: N, store: S) -> Self {
        Self {
            config,
            api,
            notifier,
            store,
        }
    }

    /// `shutdown` が完了するまで tick と待機を繰り返す。
    ///
    /// 待機中に `shutdown` が完了した場合は次の tick を待たずに終了する。
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let interval = self.config.watch.interval;
        info!(
            interval = %humantime::format_duration(interval),
            timezone = %self.config.watch.timezone,
            "Starting watcher"
        );

        tokio::pin!(shutdown);

        loop {
            self.tick(Utc::now()).await;

            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping watcher");
                    break;
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }

    /// 1 回分のチェックを実行する。エラーはログに記録し、呼び出し元には返さない。
    pub async fn tick(&self, now: DateTime<Utc>) {
        // 1 tick の中では同じタイムゾーンを使い続ける
        let zone = resolve_zone(&self.config.watch.timezone);

        match self.check_challenges(now, zone).await {
            Ok(notified) => debug!(notified, "Challenge check finished"),
            Err(e) => error!(error = %format!("{e:#}"), "Challenge check failed"),
        }

        match self.check_stats(now, zone).await {
            Ok(outcome) => debug!(?outcome, "Stats check finished"),
            Err(e) => error!(error = %format!("{e:#}"), "Stats check failed"),
        }
    }

    /// 新着チャレンジを検出して通知し、通知できた件数を返す。
    ///
    /// 取得に成功した一覧は通知の成否に関わらず保存する。
    /// 保存に失敗した場合は通知せずに終了し、次の tick で再検出させる。
    pub async fn check_challenges(&self, now: DateTime<Utc>, zone: Tz) -> Result<usize> {
        let snapshot = self
            .store
            .load_snapshot()
            .context("Failed to load challenge snapshot")?;
        let previous = known_ids(&snapshot);

        let fetched = self
            .api
            .fetch_challenges()
            .await
            .context("Failed to fetch challenges")?;

        self.store
            .save_snapshot(&fetched)
            .context("Failed to save challenge snapshot")?;

        let new_challenges = diff(&previous, &fetched);
        if new_challenges.is_empty() {
            return Ok(0);
        }
        info!(count = new_challenges.len(), "Found new challenges");

        let mut notified = 0;
        for challenge in new_challenges {
            let link = challenge_link(&self.config.dreamhack.site_base, challenge.id);
            let published_at_local = parse_instant(challenge.public_at.as_deref())
                .map(|published_at| format_display(&to_local(published_at, zone)));

            let embed = Notification::NewChallenge {
                challenge,
                link: link.clone(),
                published_at_local,
            }
            .into_embed(&now);

            match self.notifier.send(&embed).await {
                Ok(()) => {
                    notified += 1;
                    info!(
                        challenge_id = challenge.id,
                        title = %challenge.title,
                        link = %link,
                        "Notified new challenge"
                    );
                }
                Err(e) => {
                    error!(
                        challenge_id = challenge.id,
                        error = %e,
                        "Failed to send new challenge notification"
                    );
                }
            }
        }

        Ok(notified)
    }

    /// 今日の分が未報告なら解答履歴を集計して通知し、カーソルを進める。
    ///
    /// 取得に失敗した場合と履歴が空だった場合はカーソルを進めない。
    /// 通知の失敗はカーソルの更新を妨げない。
    pub async fn check_stats(&self, now: DateTime<Utc>, zone: Tz) -> Result<StatsOutcome> {
        let today = local_date(now, zone);

        let cursor = self
            .store
            .load_cursor()
            .context("Failed to load stats cursor")?;
        if !should_check_today(&cursor, today) {
            return Ok(StatsOutcome::AlreadyReported);
        }

        info!(%today, "Checking stats");
        let entries = self
            .api
            .fetch_solves(&self.config.dreamhack.user_id)
            .await
            .context("Failed to fetch solve history")?;

        if entries.is_empty() {
            info!("No stats found");
            return Ok(StatsOutcome::NoStats);
        }

        let stats = aggregate(&entries, today, zone, self.config.watch.report_day);
        info!(
            solved_count = stats.solved_count,
            earned_points = stats.earned_points,
            "Aggregated daily stats"
        );

        let embed = Notification::DailySummary {
            date_local: today,
            solved_count: stats.solved_count,
            earned_points: stats.earned_points,
        }
        .into_embed(&to_local(now, zone));

        match self.notifier.send(&embed).await {
            Ok(()) => info!(%today, "Notified daily stats"),
            Err(e) => error!(error = %e, "Failed to send daily stats notification"),
        }

        self.store
            .save_cursor(&StatsCursor {
                last_reported_date: Some(today),
            })
            .context("Failed to save stats cursor")?;

        Ok(StatsOutcome::Reported(stats))
    }
}
