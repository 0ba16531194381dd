use crate::customer_quality::aggregate_customer_quality;
use crate::db_storage::{MarketStorage, QuoteContext};
use crate::errors::{AppError, ResultExt};
use crate::lead_scoring::{
    get_score_explanations, get_score_rating, is_within_eligibility, LeadScoringEngine,
    TradieCandidate,
};
use crate::models::*;
use crate::price_benchmark::{
    compare_quote, select_benchmark, summarize_quotes, PricePoint, BENCHMARK_WINDOW_MONTHS,
    TRADIE_HISTORY_MONTHS,
};
use chrono::{DateTime, Months, Utc};
use sqlx::{PgConnection, PgPool};
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

pub const DEFAULT_LEAD_FEED_LIMIT: i64 = 50;
pub const MAX_LEAD_FEED_LIMIT: i64 = 200;

/// Result of recalculating one tradie's lead scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecalculationOutcome {
    /// No profile exists for the tradie; nothing was written.
    ProfileNotFound,
    /// The tradie's score set was replaced.
    Recalculated { scores_written: usize },
}

impl RecalculationOutcome {
    pub fn scores_written(&self) -> usize {
        match self {
            RecalculationOutcome::ProfileNotFound => 0,
            RecalculationOutcome::Recalculated { scores_written } => *scores_written,
        }
    }
}

// ============ Lead scoring ============

/// Open jobs within 1.5x the tradie's service radius.
pub fn eligible_jobs(tradie: &TradieCandidate, open_jobs: Vec<Job>) -> Vec<Job> {
    open_jobs
        .into_iter()
        .filter(|job| job.status == JobStatus::Open)
        .filter(|job| {
            is_within_eligibility(tradie.distance_to(job), tradie.profile.service_radius_km)
        })
        .collect()
}

/// Scores every job, ordered by job id so repeated runs compare equal.
pub fn score_jobs(
    engine: &LeadScoringEngine,
    tradie: &TradieCandidate,
    jobs: &[Job],
    qualities: &HashMap<Uuid, CustomerQuality>,
) -> Vec<LeadScore> {
    let mut scores: Vec<LeadScore> = jobs
        .iter()
        .map(|job| engine.calculate_score(job, tradie, qualities.get(&job.customer_id)))
        .collect();
    scores.sort_by_key(|score| score.job_id);
    scores
}

/// Recalculates and serves tradie lead scores.
pub struct LeadScoringService {
    storage: MarketStorage,
}

impl LeadScoringService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            storage: MarketStorage::new(pool),
        }
    }

    pub async fn recalculate_all_scores_for_tradie(
        &self,
        tradie_id: Uuid,
    ) -> Result<RecalculationOutcome, AppError> {
        self.recalculate_scores_at(tradie_id, Utc::now()).await
    }

    /// Replaces the tradie's whole score set in one transaction.
    ///
    /// Dropping the returned future before it completes rolls everything back.
    pub async fn recalculate_scores_at(
        &self,
        tradie_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<RecalculationOutcome, AppError> {
        let mut tx = self.storage.begin().await?;

        MarketStorage::lock_tradie(&mut tx, tradie_id).await?;

        let Some(tradie) = MarketStorage::load_tradie_candidate(&mut tx, tradie_id).await? else {
            tracing::info!("No profile for tradie {}, skipping lead scoring", tradie_id);
            return Ok(RecalculationOutcome::ProfileNotFound);
        };

        let open_jobs = MarketStorage::load_open_jobs(&mut tx).await?;
        let open_count = open_jobs.len();
        let jobs = eligible_jobs(&tradie, open_jobs);

        let customer_ids: Vec<Uuid> = jobs
            .iter()
            .map(|job| job.customer_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let qualities = MarketStorage::load_customer_qualities(&mut tx, &customer_ids).await?;

        let engine = LeadScoringEngine::new(now);
        let scores = score_jobs(&engine, &tradie, &jobs, &qualities);

        MarketStorage::replace_lead_scores(&mut tx, tradie_id, &scores).await?;
        tx.commit()
            .await
            .with_context(|| format!("Failed to commit lead scores for tradie {}", tradie_id))?;

        tracing::info!(
            "Recalculated lead scores for tradie {}: {} of {} open jobs eligible",
            tradie_id,
            scores.len(),
            open_count
        );

        Ok(RecalculationOutcome::Recalculated {
            scores_written: scores.len(),
        })
    }

    /// Recalculates every tradie. One tradie failing does not stop the rest.
    pub async fn recalculate_all_tradies(&self) -> Result<RefreshSummary, AppError> {
        let tradie_ids = self.storage.list_tradie_ids().await?;
        let mut summary = RefreshSummary::default();

        for tradie_id in tradie_ids {
            match self.recalculate_all_scores_for_tradie(tradie_id).await {
                Ok(outcome) => {
                    summary.tradies_processed += 1;
                    summary.scores_written += outcome.scores_written();
                }
                Err(e) => {
                    summary.tradies_failed += 1;
                    tracing::error!("Lead refresh failed for tradie {}: {}", tradie_id, e);
                }
            }
        }

        tracing::info!(
            "Lead refresh complete: {} tradies, {} failed, {} scores written",
            summary.tradies_processed,
            summary.tradies_failed,
            summary.scores_written
        );

        Ok(summary)
    }

    /// The tradie's stored leads, best first, with rating and explanations.
    pub async fn get_leads_for_tradie(
        &self,
        tradie_id: Uuid,
        min_score: Option<i32>,
        limit: Option<i64>,
    ) -> Result<Vec<LeadView>, AppError> {
        let min_score = min_score.unwrap_or(0).clamp(0, 100);
        let limit = limit
            .unwrap_or(DEFAULT_LEAD_FEED_LIMIT)
            .clamp(1, MAX_LEAD_FEED_LIMIT);

        let rows = self
            .storage
            .load_lead_feed(tradie_id, min_score, limit)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| LeadView {
                rating: get_score_rating(row.score.total_score),
                explanations: get_score_explanations(&row.score),
                score: row.score,
                job_title: row.job_title,
                postcode: row.postcode,
            })
            .collect())
    }
}

// ============ Customer quality ============

pub struct CustomerQualityService {
    storage: MarketStorage,
}

impl CustomerQualityService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            storage: MarketStorage::new(pool),
        }
    }

    /// Rebuilds the customer's quality row from their full history.
    ///
    /// Returns `None` without writing anything when the customer does not exist.
    pub async fn recalculate_customer_quality(
        &self,
        customer_id: Uuid,
    ) -> Result<Option<CustomerQuality>, AppError> {
        let mut tx = self.storage.begin().await?;

        if !MarketStorage::customer_exists(&mut tx, customer_id).await? {
            tracing::info!("Customer {} not found, skipping quality recalculation", customer_id);
            return Ok(None);
        }

        let history = MarketStorage::load_customer_history(&mut tx, customer_id).await?;
        let quality = aggregate_customer_quality(customer_id, &history, Utc::now());

        MarketStorage::upsert_customer_quality(&mut tx, &quality).await?;
        tx.commit()
            .await
            .with_context(|| format!("Failed to commit quality for customer {}", customer_id))?;

        tracing::debug!(
            "Customer {} quality: {} jobs, reliability {:.2}",
            customer_id,
            quality.total_jobs_posted,
            quality.payment_reliability
        );

        Ok(Some(quality))
    }

    pub async fn get_customer_quality(
        &self,
        customer_id: Uuid,
    ) -> Result<Option<CustomerQuality>, AppError> {
        self.storage.get_customer_quality(customer_id).await
    }
}

// ============ Price benchmarks ============

pub struct PriceBenchmarkService {
    storage: MarketStorage,
}

impl PriceBenchmarkService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            storage: MarketStorage::new(pool),
        }
    }

    /// Market statistics for a category, narrowed to the postcode region when
    /// it has enough data. `None` when neither sample reaches the minimum size.
    pub async fn get_benchmark(
        &self,
        trade_category_id: Uuid,
        postcode: Option<&str>,
    ) -> Result<Option<PriceBenchmark>, AppError> {
        let mut tx = self.storage.begin_snapshot().await?;

        let Some(category) =
            MarketStorage::load_trade_category(&mut tx, trade_category_id).await?
        else {
            tracing::debug!("Unknown trade category {}", trade_category_id);
            return Ok(None);
        };

        let now = Utc::now();
        let points = load_price_points(&mut tx, trade_category_id, now).await?;
        Ok(select_benchmark(category.id, &category.name, &points, postcode, now))
    }

    /// Compares one quote with its market. `None` only when the quote is absent.
    pub async fn compare_quote_price(
        &self,
        quote_id: Uuid,
    ) -> Result<Option<QuoteComparison>, AppError> {
        let mut tx = self.storage.begin_snapshot().await?;

        let Some(context) = MarketStorage::load_quote_context(&mut tx, quote_id).await? else {
            return Ok(None);
        };

        let now = Utc::now();
        let points = load_price_points(&mut tx, context.trade_category_id, now).await?;
        Ok(Some(compare_context(&context, &points, now)))
    }

    /// The tradie's last three months of quotes, each compared with its market.
    pub async fn get_tradie_quotes_comparison(
        &self,
        tradie_id: Uuid,
    ) -> Result<TradieQuotesComparison, AppError> {
        let mut tx = self.storage.begin_snapshot().await?;

        let now = Utc::now();
        let contexts =
            MarketStorage::load_tradie_quote_contexts(&mut tx, tradie_id, tradie_history_start(now))
                .await?;

        // Price history is loaded once per category for this request.
        let mut points_by_category: HashMap<Uuid, Vec<PricePoint>> = HashMap::new();
        let mut comparisons = Vec::with_capacity(contexts.len());

        for context in &contexts {
            if !points_by_category.contains_key(&context.trade_category_id) {
                let points = load_price_points(&mut tx, context.trade_category_id, now).await?;
                points_by_category.insert(context.trade_category_id, points);
            }
            let points = points_by_category
                .get(&context.trade_category_id)
                .map(Vec::as_slice)
                .unwrap_or_default();
            comparisons.push(compare_context(context, points, now));
        }

        Ok(summarize_quotes(tradie_id, comparisons))
    }
}

/// Start of the window qualifying prices are drawn from.
pub fn benchmark_window_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now.checked_sub_months(Months::new(BENCHMARK_WINDOW_MONTHS))
        .unwrap_or(now)
}

/// Start of the window a tradie's own quotes are compared over.
pub fn tradie_history_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now.checked_sub_months(Months::new(TRADIE_HISTORY_MONTHS))
        .unwrap_or(now)
}

async fn load_price_points(
    conn: &mut PgConnection,
    trade_category_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Vec<PricePoint>, AppError> {
    MarketStorage::load_price_points(conn, trade_category_id, benchmark_window_start(now)).await
}

fn compare_context(
    context: &QuoteContext,
    points: &[PricePoint],
    now: DateTime<Utc>,
) -> QuoteComparison {
    let benchmark = select_benchmark(
        context.trade_category_id,
        &context.trade_category_name,
        points,
        Some(context.postcode.as_str()),
        now,
    );
    compare_quote(&context.quote, &context.trade_category_name, benchmark.as_ref())
}
