use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============ Enumerations ============

/// Error raised when a status or rating string is not one of the known names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    /// Name of the enumeration being parsed (e.g. "job status").
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} '{}'", self.kind, self.value)
    }
}

impl std::error::Error for ParseEnumError {}

/// Declares a closed set of named states that crosses the store and JSON
/// boundaries as its canonical string.
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            /// Canonical string name.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( $name::$variant => $text ),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $text => Ok($name::$variant), )+
                    other => Err(ParseEnumError {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = ParseEnumError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.as_str().to_string()
            }
        }
    };
}

string_enum! {
    /// Lifecycle of a job. Only `Open` jobs are scored.
    JobStatus, "job status" {
        Draft => "draft",
        Open => "open",
        Quoted => "quoted",
        Accepted => "accepted",
        InProgress => "in_progress",
        Completed => "completed",
        Cancelled => "cancelled",
    }
}

string_enum! {
    QuoteStatus, "quote status" {
        Pending => "pending",
        Accepted => "accepted",
        Rejected => "rejected",
        Withdrawn => "withdrawn",
    }
}

string_enum! {
    /// Payment state as recorded by the payments collaborator.
    /// Only `Released` counts towards payment reliability.
    PaymentStatus, "payment status" {
        Pending => "pending",
        Held => "held",
        Released => "released",
        Refunded => "refunded",
        Failed => "failed",
    }
}

string_enum! {
    SubscriptionTier, "subscription tier" {
        Free => "free",
        Professional => "professional",
        Business => "business",
    }
}

string_enum! {
    /// Bucket for a total lead score.
    ScoreRating, "score rating" {
        Excellent => "Excellent",
        Good => "Good",
        Fair => "Fair",
        Low => "Low",
    }
}

string_enum! {
    /// Position of a quote against the market benchmark.
    ///
    /// `Unknown` means there was not enough market data; it is not "at market".
    PriceRating, "price rating" {
        Premium => "Premium",
        AboveMarket => "Above Market",
        AtMarket => "At Market",
        BelowMarket => "Below Market",
        Budget => "Budget",
        Unknown => "Unknown",
    }
}

// ============ Database Models ============

/// A tradie's service profile. Owned by the profile-management collaborator.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct TradieProfile {
    pub id: Uuid,
    /// Owning user account.
    pub user_id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
    /// Declared service radius, always > 0.
    pub service_radius_km: f64,
    /// Lower bound of the preferred job size.
    pub preferred_job_size_min: Option<BigDecimal>,
    /// Upper bound of the preferred job size.
    pub preferred_job_size_max: Option<BigDecimal>,
    #[sqlx(try_from = "String")]
    pub subscription_tier: SubscriptionTier,
}

/// A trade licence held by a tradie.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct TradieLicence {
    pub id: Uuid,
    pub tradie_id: Uuid,
    pub trade_category_id: Uuid,
    pub licence_number: String,
    /// Whether an admin has verified the licence.
    pub verified: bool,
    /// Expiry date, if the licence expires.
    pub expires_on: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct TradeCategory {
    pub id: Uuid,
    pub name: String,
}

/// A job posted by a customer.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub trade_category_id: Uuid,
    pub customer_id: Uuid,
    pub title: String,
    pub latitude: f64,
    pub longitude: f64,
    pub budget_min: Option<BigDecimal>,
    pub budget_max: Option<BigDecimal>,
    pub preferred_start_date: Option<NaiveDate>,
    pub flexible_dates: bool,
    pub postcode: String,
    #[sqlx(try_from = "String")]
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// Budget used for matching: the stated maximum, else the minimum.
    pub fn effective_budget(&self) -> Option<&BigDecimal> {
        self.budget_max.as_ref().or(self.budget_min.as_ref())
    }
}

/// A tradie's quote on a job.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Quote {
    pub id: Uuid,
    pub job_id: Uuid,
    pub tradie_id: Uuid,
    pub price: BigDecimal,
    #[sqlx(try_from = "String")]
    pub status: QuoteStatus,
    pub created_at: DateTime<Utc>,
    /// When the customer accepted or rejected the quote.
    pub responded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Review {
    pub id: Uuid,
    pub job_id: Uuid,
    pub reviewer_id: Uuid,
    pub reviewee_id: Uuid,
    /// Star rating, 1 to 5.
    pub rating: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub job_id: Uuid,
    pub payer_id: Uuid,
    pub amount: BigDecimal,
    #[sqlx(try_from = "String")]
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

/// Cached reputation summary for a customer.
///
/// Always rewritten in full by a recalculation, never patched.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct CustomerQuality {
    pub customer_id: Uuid,
    pub total_jobs_posted: i32,
    pub jobs_completed: i32,
    pub jobs_cancelled: i32,
    /// Mean effective budget of the customer's jobs that state one.
    pub average_job_value: Option<BigDecimal>,
    pub reviews_given: i32,
    pub average_rating_given: Option<f64>,
    /// Released payments / all payments; 1.0 with no payment history.
    pub payment_reliability: f64,
    /// Mean hours between receiving a quote and responding to it.
    pub average_response_hours: Option<f64>,
    pub last_calculated_at: DateTime<Utc>,
}

impl CustomerQuality {
    /// Completed / posted, or `None` when the customer has posted nothing.
    pub fn completion_rate(&self) -> Option<f64> {
        if self.total_jobs_posted <= 0 {
            None
        } else {
            Some(self.jobs_completed as f64 / self.total_jobs_posted as f64)
        }
    }
}

/// Score of one open job for one tradie. Unique per (tradie_id, job_id).
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct LeadScore {
    pub tradie_id: Uuid,
    pub job_id: Uuid,
    pub distance_score: i32,
    pub budget_score: i32,
    pub skill_score: i32,
    pub customer_quality_score: i32,
    pub urgency_score: i32,
    /// Sum of the five sub-scores, 0 to 100.
    pub total_score: i32,
    /// Distance between tradie and job, rounded to 0.1 km.
    pub distance_km: f64,
    pub calculated_at: DateTime<Utc>,
}

// ============ Price Benchmark Models ============

/// Market-rate statistics for a trade category. Computed per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBenchmark {
    pub trade_category_id: Uuid,
    pub trade_category_name: String,
    /// Postcode prefix the sample was narrowed to; `None` for category-wide.
    pub postcode: Option<String>,
    pub min_price: BigDecimal,
    pub max_price: BigDecimal,
    pub mean_price: BigDecimal,
    pub median_price: BigDecimal,
    pub sample_size: usize,
    pub computed_at: DateTime<Utc>,
}

/// A single quote measured against its benchmark.
///
/// When no benchmark exists `rating` is `Unknown` and `market_average` and
/// `percentage_difference` are zero. Check `rating` before reading the numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteComparison {
    pub quote_id: Uuid,
    pub job_id: Uuid,
    pub trade_category_name: String,
    pub your_price: BigDecimal,
    pub market_average: BigDecimal,
    pub market_min: Option<BigDecimal>,
    pub market_max: Option<BigDecimal>,
    pub sample_size: usize,
    pub percentage_difference: f64,
    pub rating: PriceRating,
    pub explanation: String,
    pub quoted_at: DateTime<Utc>,
}

impl QuoteComparison {
    pub fn has_benchmark(&self) -> bool {
        self.rating != PriceRating::Unknown
    }
}

/// A tradie's recent quotes with an aggregate market position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradieQuotesComparison {
    pub tradie_id: Uuid,
    /// Newest first.
    pub quotes: Vec<QuoteComparison>,
    /// Number of quotes that had a benchmark.
    pub benchmarked_quotes: usize,
    /// Mean percentage difference over benchmarked quotes (0 when none).
    pub average_percentage_difference: f64,
    pub below_market: usize,
    pub at_market: usize,
    pub above_market: usize,
}

// ============ API Request/Response Models ============

/// Stored lead score joined with the job fields the feed displays.
#[derive(Debug, Clone, FromRow)]
pub struct LeadFeedRow {
    #[sqlx(flatten)]
    pub score: LeadScore,
    pub job_title: String,
    pub postcode: String,
}

/// One entry in a tradie's lead feed.
#[derive(Debug, Clone, Serialize)]
pub struct LeadView {
    #[serde(flatten)]
    pub score: LeadScore,
    pub job_title: String,
    pub postcode: String,
    pub rating: ScoreRating,
    pub explanations: Vec<String>,
}

/// Query parameters for the lead feed.
#[derive(Debug, Deserialize)]
pub struct LeadFeedParams {
    /// Only return leads scoring at least this much.
    pub min_score: Option<i32>,
    /// Maximum number of leads (default 50, max 200).
    pub limit: Option<i64>,
}

/// Query parameters for a benchmark lookup.
#[derive(Debug, Deserialize)]
pub struct BenchmarkParams {
    pub trade_category_id: Uuid,
    pub postcode: Option<String>,
}

/// Response for a per-tradie recalculation.
#[derive(Debug, Clone, Serialize)]
pub struct RecalculationResponse {
    pub tradie_id: Uuid,
    /// Always "recalculated"; a missing profile is answered with 404.
    pub status: String,
    pub scores_written: usize,
}

/// Response for a full refresh across every tradie.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RefreshSummary {
    pub tradies_processed: usize,
    pub tradies_failed: usize,
    pub scores_written: usize,
}

/// Live sessions for one user.
#[derive(Debug, Clone, Serialize)]
pub struct PresenceStatus {
    pub user_id: Uuid,
    pub online: bool,
    pub sessions: Vec<Uuid>,
}

/// Returned when a session is registered.
#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    pub user_id: Uuid,
    pub session_id: Uuid,
    pub online_users: usize,
}
