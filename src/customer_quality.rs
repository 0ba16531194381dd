//! Customer reputation aggregation.
//!
//! Rebuilds a [`CustomerQuality`] summary from a customer's full history.
//! The result replaces the stored row wholesale.

use crate::models::{CustomerQuality, Job, JobStatus, Payment, PaymentStatus, Quote, Review};
use bigdecimal::{BigDecimal, RoundingMode};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Reliability assumed for customers who have never paid through the platform.
pub const DEFAULT_PAYMENT_RELIABILITY: f64 = 1.0;

/// Raw history loaded for one customer.
#[derive(Debug, Clone, Default)]
pub struct CustomerHistory {
    /// Every job the customer posted.
    pub jobs: Vec<Job>,
    /// Reviews the customer wrote.
    pub reviews_given: Vec<Review>,
    /// Payments made by the customer.
    pub payments: Vec<Payment>,
    /// Quotes received on the customer's jobs.
    pub quotes_received: Vec<Quote>,
}

/// Computes every field of the summary from scratch.
pub fn aggregate_customer_quality(
    customer_id: Uuid,
    history: &CustomerHistory,
    now: DateTime<Utc>,
) -> CustomerQuality {
    let jobs = &history.jobs;

    let jobs_completed = jobs
        .iter()
        .filter(|job| job.status == JobStatus::Completed)
        .count();
    let jobs_cancelled = jobs
        .iter()
        .filter(|job| job.status == JobStatus::Cancelled)
        .count();

    CustomerQuality {
        customer_id,
        total_jobs_posted: jobs.len() as i32,
        jobs_completed: jobs_completed as i32,
        jobs_cancelled: jobs_cancelled as i32,
        average_job_value: average_job_value(jobs),
        reviews_given: history.reviews_given.len() as i32,
        average_rating_given: average_rating(&history.reviews_given),
        payment_reliability: payment_reliability(&history.payments),
        average_response_hours: average_response_hours(&history.quotes_received),
        last_calculated_at: now,
    }
}

/// Mean effective budget over jobs that state one, to the cent.
pub fn average_job_value(jobs: &[Job]) -> Option<BigDecimal> {
    let budgets: Vec<&BigDecimal> = jobs.iter().filter_map(Job::effective_budget).collect();
    if budgets.is_empty() {
        return None;
    }

    let total: BigDecimal = budgets.iter().copied().sum();
    Some((total / BigDecimal::from(budgets.len() as i64)).with_scale_round(2, RoundingMode::HalfUp))
}

fn average_rating(reviews: &[Review]) -> Option<f64> {
    if reviews.is_empty() {
        return None;
    }
    let total: i64 = reviews.iter().map(|r| r.rating as i64).sum();
    let mean = total as f64 / reviews.len() as f64;
    Some((mean * 100.0).round() / 100.0)
}

/// Share of payments that were released to the tradie.
pub fn payment_reliability(payments: &[Payment]) -> f64 {
    if payments.is_empty() {
        return DEFAULT_PAYMENT_RELIABILITY;
    }
    let released = payments
        .iter()
        .filter(|p| p.status == PaymentStatus::Released)
        .count();
    released as f64 / payments.len() as f64
}

/// Mean hours from a quote arriving to the customer answering it.
///
/// Quotes still awaiting an answer are ignored.
pub fn average_response_hours(quotes: &[Quote]) -> Option<f64> {
    let hours: Vec<f64> = quotes
        .iter()
        .filter_map(|q| {
            q.responded_at
                .map(|responded| (responded - q.created_at).num_seconds().max(0) as f64 / 3600.0)
        })
        .collect();

    if hours.is_empty() {
        return None;
    }
    let mean = hours.iter().sum::<f64>() / hours.len() as f64;
    Some((mean * 10.0).round() / 10.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QuoteStatus;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn job(customer: Uuid, status: JobStatus, budget_max: Option<i64>) -> Job {
        Job {
            id: Uuid::new_v4(),
            trade_category_id: Uuid::new_v4(),
            customer_id: customer,
            title: "Fix leaking tap".to_string(),
            latitude: -33.87,
            longitude: 151.21,
            budget_min: None,
            budget_max: budget_max.map(BigDecimal::from),
            preferred_start_date: None,
            flexible_dates: true,
            postcode: "2000".to_string(),
            status,
            created_at: now(),
        }
    }

    fn payment(payer: Uuid, status: PaymentStatus) -> Payment {
        Payment {
            id: Uuid::new_v4(),
            job_id: Uuid::new_v4(),
            payer_id: payer,
            amount: BigDecimal::from(100),
            status,
            created_at: now(),
        }
    }

    #[test]
    fn test_empty_history_gives_benefit_of_the_doubt() {
        let customer = Uuid::new_v4();
        let quality = aggregate_customer_quality(customer, &CustomerHistory::default(), now());

        assert_eq!(quality.customer_id, customer);
        assert_eq!(quality.total_jobs_posted, 0);
        assert_eq!(quality.payment_reliability, 1.0);
        assert_eq!(quality.average_job_value, None);
        assert_eq!(quality.average_rating_given, None);
        assert_eq!(quality.average_response_hours, None);
        assert_eq!(quality.last_calculated_at, now());
    }

    #[test]
    fn test_counts_and_rates() {
        let customer = Uuid::new_v4();
        let history = CustomerHistory {
            jobs: vec![
                job(customer, JobStatus::Completed, Some(1000)),
                job(customer, JobStatus::Completed, Some(2000)),
                job(customer, JobStatus::Cancelled, None),
                job(customer, JobStatus::Open, Some(3000)),
            ],
            reviews_given: vec![
                Review {
                    id: Uuid::new_v4(),
                    job_id: Uuid::new_v4(),
                    reviewer_id: customer,
                    reviewee_id: Uuid::new_v4(),
                    rating: 5,
                    created_at: now(),
                },
                Review {
                    id: Uuid::new_v4(),
                    job_id: Uuid::new_v4(),
                    reviewer_id: customer,
                    reviewee_id: Uuid::new_v4(),
                    rating: 4,
                    created_at: now(),
                },
            ],
            payments: vec![
                payment(customer, PaymentStatus::Released),
                payment(customer, PaymentStatus::Released),
                payment(customer, PaymentStatus::Released),
                payment(customer, PaymentStatus::Refunded),
            ],
            quotes_received: Vec::new(),
        };

        let quality = aggregate_customer_quality(customer, &history, now());
        assert_eq!(quality.total_jobs_posted, 4);
        assert_eq!(quality.jobs_completed, 2);
        assert_eq!(quality.jobs_cancelled, 1);
        assert_eq!(quality.average_job_value, Some(BigDecimal::from(2000)));
        assert_eq!(quality.reviews_given, 2);
        assert_eq!(quality.average_rating_given, Some(4.5));
        assert_eq!(quality.payment_reliability, 0.75);
    }

    #[test]
    fn test_average_job_value_rounds_half_up() {
        use std::str::FromStr;

        let customer = Uuid::new_v4();
        let jobs: Vec<Job> = ["100.00", "100.01"]
            .into_iter()
            .map(|budget| Job {
                budget_max: Some(BigDecimal::from_str(budget).unwrap()),
                ..job(customer, JobStatus::Completed, None)
            })
            .collect();

        assert_eq!(
            average_job_value(&jobs),
            Some(BigDecimal::from_str("100.01").unwrap())
        );
    }

    #[test]
    fn test_response_hours_skip_unanswered_quotes() {
        let created = now();
        let quote = |responded: Option<DateTime<Utc>>| Quote {
            id: Uuid::new_v4(),
            job_id: Uuid::new_v4(),
            tradie_id: Uuid::new_v4(),
            price: BigDecimal::from(500),
            status: QuoteStatus::Accepted,
            created_at: created,
            responded_at: responded,
        };

        let quotes = vec![
            quote(Some(created + Duration::hours(2))),
            quote(Some(created + Duration::hours(6))),
            quote(None),
        ];
        assert_eq!(average_response_hours(&quotes), Some(4.0));
        assert_eq!(average_response_hours(&[quote(None)]), None);
    }
}
