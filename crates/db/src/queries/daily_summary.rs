//! Per-(user, date) summary cache: computed stats plus an optional analysis.
//!
//! Stats are tagged with the timezone they were computed in; the same date
//! covers a different window in another timezone.

use crate::{Database, DbResult};
use focuslog_core::{DailyAnalysis, DailyStats};
use tracing::warn;

/// What the cache holds for one user-day. Either half may be absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CachedDaily {
    pub stats: Option<DailyStats>,
    pub analysis: Option<DailyAnalysis>,
}

type SummaryRow = (
    Option<String>,
    Option<String>,
    Option<i64>,
    Option<String>,
    Option<String>,
    Option<i64>,
);

impl Database {
    /// Look up a cached day. Returns `None` when no row exists.
    ///
    /// Stats computed in a timezone other than `timezone`, or whose blob no
    /// longer decodes, are reported as absent so the caller recomputes them.
    pub async fn get_daily_summary(
        &self,
        user_id: &str,
        date: &str,
        timezone: &str,
    ) -> DbResult<Option<CachedDaily>> {
        let row: Option<SummaryRow> = sqlx::query_as(
            r#"
            SELECT stats_json, stats_timezone, ai_score, ai_result, ai_model, ai_generated_at
            FROM daily_summaries
            WHERE user_id = ?1 AND date = ?2
            "#,
        )
        .bind(user_id)
        .bind(date)
        .fetch_optional(self.pool())
        .await?;

        let Some((stats_json, stats_timezone, ai_score, ai_result, ai_model, ai_generated_at)) =
            row
        else {
            return Ok(None);
        };

        let stats_json = stats_json.filter(|_| stats_timezone.as_deref() == Some(timezone));
        let stats = stats_json.and_then(|json| match serde_json::from_str(&json) {
            Ok(stats) => Some(stats),
            Err(e) => {
                warn!(user_id, date, error = %e, "Discarding undecodable cached stats");
                None
            }
        });

        let analysis = match (ai_result, ai_model, ai_generated_at) {
            (Some(result), Some(model), Some(generated_at)) => Some(DailyAnalysis {
                score: ai_score,
                result,
                model,
                generated_at,
            }),
            _ => None,
        };

        Ok(Some(CachedDaily { stats, analysis }))
    }

    /// Store stats computed in `timezone` for a day, leaving any analysis
    /// in place.
    ///
    /// Past-day stats are deterministic per timezone, so rewriting an
    /// existing blob replaces it with the same value, repairs an
    /// undecodable one, or moves it to the user's new timezone.
    pub async fn put_daily_stats(
        &self,
        user_id: &str,
        date: &str,
        timezone: &str,
        stats: &DailyStats,
        now: i64,
    ) -> DbResult<()> {
        let json = serde_json::to_string(stats)?;
        sqlx::query(
            r#"
            INSERT INTO daily_summaries (
                user_id, date, stats_json, stats_timezone, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            ON CONFLICT(user_id, date) DO UPDATE SET
                stats_json = excluded.stats_json,
                stats_timezone = excluded.stats_timezone,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(date)
        .bind(&json)
        .bind(timezone)
        .bind(now)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Store (or replace) the analysis for a day without touching its stats.
    pub async fn put_daily_analysis(
        &self,
        user_id: &str,
        date: &str,
        analysis: &DailyAnalysis,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO daily_summaries (
                user_id, date, ai_score, ai_result, ai_model, ai_generated_at,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, ?6)
            ON CONFLICT(user_id, date) DO UPDATE SET
                ai_score = excluded.ai_score,
                ai_result = excluded.ai_result,
                ai_model = excluded.ai_model,
                ai_generated_at = excluded.ai_generated_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(date)
        .bind(analysis.score)
        .bind(&analysis.result)
        .bind(&analysis.model)
        .bind(analysis.generated_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }
}
