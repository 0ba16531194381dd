use crate::customer_quality::CustomerHistory;
use crate::errors::{AppError, ResultExt};
use crate::lead_scoring::TradieCandidate;
use crate::models::{
    CustomerQuality, Job, LeadFeedRow, LeadScore, Payment, Quote, Review, TradeCategory,
    TradieLicence, TradieProfile,
};
use crate::price_benchmark::PricePoint;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection, PgPool, Postgres, Transaction};
use std::collections::HashMap;
use uuid::Uuid;

/// A quote together with the job fields needed to benchmark it.
#[derive(Debug, Clone, FromRow)]
pub struct QuoteContext {
    #[sqlx(flatten)]
    pub quote: Quote,
    pub trade_category_id: Uuid,
    pub trade_category_name: String,
    pub postcode: String,
}

/// Postgres access for the scoring and benchmarking core.
///
/// Reads go straight to the pool. Anything that writes takes a
/// `&mut PgConnection` so the caller decides the transaction boundary.
#[derive(Clone)]
pub struct MarketStorage {
    pool: PgPool,
}

impl MarketStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>, AppError> {
        self.pool
            .begin()
            .await
            .context("Failed to open transaction")
    }

    /// Read-only transaction whose statements all see one snapshot.
    pub async fn begin_snapshot(&self) -> Result<Transaction<'static, Postgres>, AppError> {
        let mut tx = self.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await
            .context("Failed to start snapshot transaction")?;
        Ok(tx)
    }

    // ============ Lead scoring ============

    /// Serializes recalculations for one tradie until the transaction ends.
    pub async fn lock_tradie(conn: &mut PgConnection, tradie_id: Uuid) -> Result<(), AppError> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))")
            .bind(tradie_id)
            .execute(&mut *conn)
            .await
            .with_context(|| format!("Failed to lock tradie {}", tradie_id))?;
        Ok(())
    }

    /// Profile, licences and accepted-quote categories for a tradie.
    pub async fn load_tradie_candidate(
        conn: &mut PgConnection,
        tradie_id: Uuid,
    ) -> Result<Option<TradieCandidate>, AppError> {
        let profile = sqlx::query_as::<_, TradieProfile>(
            r#"
            SELECT id, user_id, latitude, longitude, service_radius_km,
                   preferred_job_size_min, preferred_job_size_max, subscription_tier
            FROM tradie_profiles
            WHERE id = $1
            "#,
        )
        .bind(tradie_id)
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to load tradie profile")?;

        let Some(profile) = profile else {
            return Ok(None);
        };

        let licences = sqlx::query_as::<_, TradieLicence>(
            r#"
            SELECT id, tradie_id, trade_category_id, licence_number, verified, expires_on
            FROM tradie_licences
            WHERE tradie_id = $1
            "#,
        )
        .bind(tradie_id)
        .fetch_all(&mut *conn)
        .await
        .context("Failed to load tradie licences")?;

        let accepted_categories: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT j.trade_category_id
            FROM quotes q
            JOIN jobs j ON j.id = q.job_id
            WHERE q.tradie_id = $1 AND q.status = 'accepted'
            "#,
        )
        .bind(tradie_id)
        .fetch_all(&mut *conn)
        .await
        .context("Failed to load accepted quote categories")?;

        Ok(Some(TradieCandidate {
            profile,
            licences,
            accepted_categories: accepted_categories.into_iter().map(|(id,)| id).collect(),
        }))
    }

    pub async fn load_open_jobs(conn: &mut PgConnection) -> Result<Vec<Job>, AppError> {
        sqlx::query_as::<_, Job>(
            r#"
            SELECT id, trade_category_id, customer_id, title, latitude, longitude,
                   budget_min, budget_max, preferred_start_date, flexible_dates,
                   postcode, status, created_at
            FROM jobs
            WHERE status = 'open'
            "#,
        )
        .fetch_all(&mut *conn)
        .await
        .context("Failed to load open jobs")
    }

    /// Cached quality rows for the given customers, keyed by customer id.
    pub async fn load_customer_qualities(
        conn: &mut PgConnection,
        customer_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, CustomerQuality>, AppError> {
        if customer_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query_as::<_, CustomerQuality>(
            r#"
            SELECT customer_id, total_jobs_posted, jobs_completed, jobs_cancelled,
                   average_job_value, reviews_given, average_rating_given,
                   payment_reliability, average_response_hours, last_calculated_at
            FROM customer_quality
            WHERE customer_id = ANY($1)
            "#,
        )
        .bind(customer_ids)
        .fetch_all(&mut *conn)
        .await
        .context("Failed to load customer quality")?;

        Ok(rows.into_iter().map(|q| (q.customer_id, q)).collect())
    }

    /// Deletes every stored score for the tradie and inserts `scores`.
    ///
    /// Run inside a transaction so readers never see a mix of old and new rows.
    pub async fn replace_lead_scores(
        conn: &mut PgConnection,
        tradie_id: Uuid,
        scores: &[LeadScore],
    ) -> Result<u64, AppError> {
        let deleted = sqlx::query("DELETE FROM lead_scores WHERE tradie_id = $1")
            .bind(tradie_id)
            .execute(&mut *conn)
            .await
            .context("Failed to delete old lead scores")?
            .rows_affected();

        tracing::debug!(
            "Deleted {} stale lead scores for tradie {}",
            deleted,
            tradie_id
        );

        if scores.is_empty() {
            return Ok(0);
        }

        let job_ids: Vec<Uuid> = scores.iter().map(|s| s.job_id).collect();
        let distance: Vec<i32> = scores.iter().map(|s| s.distance_score).collect();
        let budget: Vec<i32> = scores.iter().map(|s| s.budget_score).collect();
        let skill: Vec<i32> = scores.iter().map(|s| s.skill_score).collect();
        let customer: Vec<i32> = scores.iter().map(|s| s.customer_quality_score).collect();
        let urgency: Vec<i32> = scores.iter().map(|s| s.urgency_score).collect();
        let total: Vec<i32> = scores.iter().map(|s| s.total_score).collect();
        let km: Vec<f64> = scores.iter().map(|s| s.distance_km).collect();
        let calculated_at: Vec<DateTime<Utc>> = scores.iter().map(|s| s.calculated_at).collect();

        let inserted = sqlx::query(
            r#"
            INSERT INTO lead_scores (
                tradie_id, job_id, distance_score, budget_score, skill_score,
                customer_quality_score, urgency_score, total_score, distance_km, calculated_at
            )
            SELECT $1, s.*
            FROM UNNEST(
                $2::uuid[], $3::int4[], $4::int4[], $5::int4[], $6::int4[],
                $7::int4[], $8::int4[], $9::float8[], $10::timestamptz[]
            ) AS s
            "#,
        )
        .bind(tradie_id)
        .bind(&job_ids)
        .bind(&distance)
        .bind(&budget)
        .bind(&skill)
        .bind(&customer)
        .bind(&urgency)
        .bind(&total)
        .bind(&km)
        .bind(&calculated_at)
        .execute(&mut *conn)
        .await
        .context("Failed to insert lead scores")?
        .rows_affected();

        Ok(inserted)
    }

    pub async fn list_tradie_ids(&self) -> Result<Vec<Uuid>, AppError> {
        sqlx::query_scalar::<_, Uuid>("SELECT id FROM tradie_profiles ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list tradie profiles")
    }

    /// Stored scores for a tradie on jobs that are still open, best first.
    pub async fn load_lead_feed(
        &self,
        tradie_id: Uuid,
        min_score: i32,
        limit: i64,
    ) -> Result<Vec<LeadFeedRow>, AppError> {
        sqlx::query_as::<_, LeadFeedRow>(
            r#"
            SELECT ls.tradie_id, ls.job_id, ls.distance_score, ls.budget_score,
                   ls.skill_score, ls.customer_quality_score, ls.urgency_score,
                   ls.total_score, ls.distance_km, ls.calculated_at,
                   j.title AS job_title, j.postcode
            FROM lead_scores ls
            JOIN jobs j ON j.id = ls.job_id
            WHERE ls.tradie_id = $1
              AND ls.total_score >= $2
              AND j.status = 'open'
            ORDER BY ls.total_score DESC, ls.distance_km ASC
            LIMIT $3
            "#,
        )
        .bind(tradie_id)
        .bind(min_score)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load lead feed")
    }

    // ============ Customer quality ============

    pub async fn customer_exists(
        conn: &mut PgConnection,
        customer_id: Uuid,
    ) -> Result<bool, AppError> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
            .bind(customer_id)
            .fetch_one(&mut *conn)
            .await
            .context("Failed to check customer")
    }

    /// Jobs, reviews given, payments and received quotes for one customer.
    pub async fn load_customer_history(
        conn: &mut PgConnection,
        customer_id: Uuid,
    ) -> Result<CustomerHistory, AppError> {
        let jobs = sqlx::query_as::<_, Job>(
            r#"
            SELECT id, trade_category_id, customer_id, title, latitude, longitude,
                   budget_min, budget_max, preferred_start_date, flexible_dates,
                   postcode, status, created_at
            FROM jobs
            WHERE customer_id = $1
            "#,
        )
        .bind(customer_id)
        .fetch_all(&mut *conn)
        .await
        .context("Failed to load customer jobs")?;

        let reviews_given = sqlx::query_as::<_, Review>(
            r#"
            SELECT id, job_id, reviewer_id, reviewee_id, rating, created_at
            FROM reviews
            WHERE reviewer_id = $1
            "#,
        )
        .bind(customer_id)
        .fetch_all(&mut *conn)
        .await
        .context("Failed to load customer reviews")?;

        let payments = sqlx::query_as::<_, Payment>(
            r#"
            SELECT id, job_id, payer_id, amount, status, created_at
            FROM payments
            WHERE payer_id = $1
            "#,
        )
        .bind(customer_id)
        .fetch_all(&mut *conn)
        .await
        .context("Failed to load customer payments")?;

        let quotes_received = sqlx::query_as::<_, Quote>(
            r#"
            SELECT q.id, q.job_id, q.tradie_id, q.price, q.status, q.created_at, q.responded_at
            FROM quotes q
            JOIN jobs j ON j.id = q.job_id
            WHERE j.customer_id = $1
            "#,
        )
        .bind(customer_id)
        .fetch_all(&mut *conn)
        .await
        .context("Failed to load quotes received")?;

        Ok(CustomerHistory {
            jobs,
            reviews_given,
            payments,
            quotes_received,
        })
    }

    /// Writes the whole row, replacing any previous values.
    pub async fn upsert_customer_quality(
        conn: &mut PgConnection,
        quality: &CustomerQuality,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO customer_quality (
                customer_id, total_jobs_posted, jobs_completed, jobs_cancelled,
                average_job_value, reviews_given, average_rating_given,
                payment_reliability, average_response_hours, last_calculated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (customer_id) DO UPDATE
            SET total_jobs_posted = EXCLUDED.total_jobs_posted,
                jobs_completed = EXCLUDED.jobs_completed,
                jobs_cancelled = EXCLUDED.jobs_cancelled,
                average_job_value = EXCLUDED.average_job_value,
                reviews_given = EXCLUDED.reviews_given,
                average_rating_given = EXCLUDED.average_rating_given,
                payment_reliability = EXCLUDED.payment_reliability,
                average_response_hours = EXCLUDED.average_response_hours,
                last_calculated_at = EXCLUDED.last_calculated_at
            "#,
        )
        .bind(quality.customer_id)
        .bind(quality.total_jobs_posted)
        .bind(quality.jobs_completed)
        .bind(quality.jobs_cancelled)
        .bind(&quality.average_job_value)
        .bind(quality.reviews_given)
        .bind(quality.average_rating_given)
        .bind(quality.payment_reliability)
        .bind(quality.average_response_hours)
        .bind(quality.last_calculated_at)
        .execute(&mut *conn)
        .await
        .with_context(|| {
            format!("Failed to store quality for customer {}", quality.customer_id)
        })?;

        Ok(())
    }

    pub async fn get_customer_quality(
        &self,
        customer_id: Uuid,
    ) -> Result<Option<CustomerQuality>, AppError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .context("Failed to acquire connection")?;
        let mut rows = Self::load_customer_qualities(&mut conn, &[customer_id]).await?;
        Ok(rows.remove(&customer_id))
    }

    // ============ Price benchmarks ============

    pub async fn load_trade_category(
        conn: &mut PgConnection,
        id: Uuid,
    ) -> Result<Option<TradeCategory>, AppError> {
        sqlx::query_as::<_, TradeCategory>("SELECT id, name FROM trade_categories WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .context("Failed to load trade category")
    }

    /// Accepted or completed-job quote prices in a category since `since`.
    pub async fn load_price_points(
        conn: &mut PgConnection,
        trade_category_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<PricePoint>, AppError> {
        sqlx::query_as::<_, PricePoint>(
            r#"
            SELECT q.price, j.postcode
            FROM quotes q
            JOIN jobs j ON j.id = q.job_id
            WHERE j.trade_category_id = $1
              AND (q.status = 'accepted' OR j.status = 'completed')
              AND q.created_at >= $2
            "#,
        )
        .bind(trade_category_id)
        .bind(since)
        .fetch_all(&mut *conn)
        .await
        .context("Failed to load benchmark prices")
    }

    pub async fn load_quote_context(
        conn: &mut PgConnection,
        quote_id: Uuid,
    ) -> Result<Option<QuoteContext>, AppError> {
        sqlx::query_as::<_, QuoteContext>(
            r#"
            SELECT q.id, q.job_id, q.tradie_id, q.price, q.status, q.created_at, q.responded_at,
                   j.trade_category_id, tc.name AS trade_category_name, j.postcode
            FROM quotes q
            JOIN jobs j ON j.id = q.job_id
            JOIN trade_categories tc ON tc.id = j.trade_category_id
            WHERE q.id = $1
            "#,
        )
        .bind(quote_id)
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to load quote")
    }

    /// A tradie's quotes since `since`, newest first.
    pub async fn load_tradie_quote_contexts(
        conn: &mut PgConnection,
        tradie_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<QuoteContext>, AppError> {
        sqlx::query_as::<_, QuoteContext>(
            r#"
            SELECT q.id, q.job_id, q.tradie_id, q.price, q.status, q.created_at, q.responded_at,
                   j.trade_category_id, tc.name AS trade_category_name, j.postcode
            FROM quotes q
            JOIN jobs j ON j.id = q.job_id
            JOIN trade_categories tc ON tc.id = j.trade_category_id
            WHERE q.tradie_id = $1 AND q.created_at >= $2
            ORDER BY q.created_at DESC
            "#,
        )
        .bind(tradie_id)
        .bind(since)
        .fetch_all(&mut *conn)
        .await
        .context("Failed to load tradie quotes")
    }
}
