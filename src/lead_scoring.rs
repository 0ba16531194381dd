//! Rule-based lead scoring.
//!
//! Scores one open job for one tradie from five capped sub-scores:
//!
//! | Dimension        | Max |
//! |------------------|-----|
//! | Distance         | 25  |
//! | Budget match     | 25  |
//! | Skill match      | 25  |
//! | Customer quality | 15  |
//! | Urgency          | 10  |
//!
//! The total is the plain sum, so it is always within 0..=100. Everything in
//! this module is pure: the orchestrator loads the job, tradie and customer
//! snapshot and hands it over.

use crate::geo;
use crate::models::{
    CustomerQuality, Job, LeadScore, ScoreRating, SubscriptionTier, TradieLicence, TradieProfile,
};
use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashSet;
use uuid::Uuid;

pub const MAX_DISTANCE_SCORE: i32 = 25;
pub const MAX_BUDGET_SCORE: i32 = 25;
pub const MAX_SKILL_SCORE: i32 = 25;
pub const MAX_CUSTOMER_QUALITY_SCORE: i32 = 15;
pub const MAX_URGENCY_SCORE: i32 = 10;

/// Jobs further than this multiple of the service radius are never scored.
pub const ELIGIBILITY_RADIUS_FACTOR: f64 = 1.5;

/// Everything the engine needs to know about a tradie.
#[derive(Debug, Clone, PartialEq)]
pub struct TradieCandidate {
    pub profile: TradieProfile,
    pub licences: Vec<TradieLicence>,
    /// Trade categories in which the tradie has had a quote accepted.
    pub accepted_categories: HashSet<Uuid>,
}

impl TradieCandidate {
    pub fn new(profile: TradieProfile) -> Self {
        Self {
            profile,
            licences: Vec::new(),
            accepted_categories: HashSet::new(),
        }
    }

    /// Verified licence for the category that has not expired as of `today`.
    pub fn has_valid_licence(&self, trade_category_id: Uuid, today: NaiveDate) -> bool {
        self.licences.iter().any(|licence| {
            licence.trade_category_id == trade_category_id
                && licence.verified
                && licence.expires_on.map_or(true, |expiry| expiry >= today)
        })
    }

    pub fn distance_to(&self, job: &Job) -> f64 {
        geo::distance_km(
            self.profile.latitude,
            self.profile.longitude,
            job.latitude,
            job.longitude,
        )
    }
}

/// Whether a job at `distance_km` is inside the eligibility window.
pub fn is_within_eligibility(distance_km: f64, service_radius_km: f64) -> bool {
    distance_km <= service_radius_km * ELIGIBILITY_RADIUS_FACTOR
}

/// Scores leads relative to a fixed instant.
#[derive(Debug, Clone, Copy)]
pub struct LeadScoringEngine {
    now: DateTime<Utc>,
}

impl LeadScoringEngine {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    fn today(&self) -> NaiveDate {
        self.now.date_naive()
    }

    /// Computes the composite score of `job` for `tradie`.
    ///
    /// `customer_quality` is the cached summary of the job's customer, if any.
    pub fn calculate_score(
        &self,
        job: &Job,
        tradie: &TradieCandidate,
        customer_quality: Option<&CustomerQuality>,
    ) -> LeadScore {
        let profile = &tradie.profile;
        let distance_km = tradie.distance_to(job);

        let distance = distance_score(distance_km, profile.service_radius_km);
        let budget = budget_score(
            job.effective_budget(),
            profile.preferred_job_size_min.as_ref(),
            profile.preferred_job_size_max.as_ref(),
        );
        let skill = skill_score(job.trade_category_id, tradie, self.today());
        let customer = customer_quality_score(customer_quality);
        let urgency = urgency_score(job.preferred_start_date, job.flexible_dates, self.today());

        LeadScore {
            tradie_id: profile.id,
            job_id: job.id,
            distance_score: distance,
            budget_score: budget,
            skill_score: skill,
            customer_quality_score: customer,
            urgency_score: urgency,
            total_score: distance + budget + skill + customer + urgency,
            distance_km: geo::round_km(distance_km),
            calculated_at: self.now,
        }
    }
}

/// Distance sub-score: steep near the tradie, soft tail to 1.5x the radius.
pub fn distance_score(distance_km: f64, service_radius_km: f64) -> i32 {
    if distance_km <= 5.0 {
        25
    } else if distance_km <= 10.0 {
        22
    } else if distance_km <= 15.0 {
        18
    } else if distance_km <= 20.0 {
        15
    } else if distance_km <= service_radius_km * 0.5 {
        12
    } else if distance_km <= service_radius_km {
        8
    } else if is_within_eligibility(distance_km, service_radius_km) {
        4
    } else {
        0
    }
}

/// Budget sub-score against the tradie's preferred job-size window.
///
/// A missing bound leaves that side of the window open. Outside the window
/// the score depends on how far off the budget is, measured the same way on
/// both sides: `budget / min` below, `max / budget` above.
pub fn budget_score(
    job_budget: Option<&BigDecimal>,
    preferred_min: Option<&BigDecimal>,
    preferred_max: Option<&BigDecimal>,
) -> i32 {
    if preferred_min.is_none() && preferred_max.is_none() {
        return 15;
    }
    let Some(budget) = job_budget else {
        return 10;
    };

    let budget = budget.to_f64().unwrap_or(0.0);
    let min = preferred_min.and_then(|v| v.to_f64()).unwrap_or(0.0);
    let max = preferred_max
        .and_then(|v| v.to_f64())
        .unwrap_or(f64::INFINITY);

    if budget >= min && budget <= max {
        return 25;
    }

    let ratio = if budget < min { budget / min } else { max / budget };
    budget_ratio_score(ratio)
}

fn budget_ratio_score(ratio: f64) -> i32 {
    if ratio >= 0.75 {
        18
    } else if ratio >= 0.5 {
        12
    } else {
        5
    }
}

/// Skill sub-score: licence, then experience, then subscription tier.
pub fn skill_score(trade_category_id: Uuid, tradie: &TradieCandidate, today: NaiveDate) -> i32 {
    if tradie.has_valid_licence(trade_category_id, today) {
        return 25;
    }
    if tradie.accepted_categories.contains(&trade_category_id) {
        return 18;
    }
    match tradie.profile.subscription_tier {
        SubscriptionTier::Business => 15,
        SubscriptionTier::Professional => 12,
        SubscriptionTier::Free => 8,
    }
}

/// Customer quality sub-score. Customers with no summary get a neutral 8.
pub fn customer_quality_score(quality: Option<&CustomerQuality>) -> i32 {
    let Some(quality) = quality else {
        return 8;
    };

    let completion = match quality.completion_rate() {
        None => 3,
        Some(rate) if rate >= 0.9 => 6,
        Some(rate) if rate >= 0.75 => 4,
        Some(rate) if rate >= 0.5 => 2,
        Some(_) => 0,
    };

    let reliability = quality.payment_reliability;
    let payment = if reliability >= 0.95 {
        5
    } else if reliability >= 0.85 {
        4
    } else if reliability >= 0.7 {
        3
    } else if reliability >= 0.5 {
        2
    } else {
        0
    };

    let response = match quality.average_response_hours {
        None => 2,
        Some(hours) if hours <= 2.0 => 4,
        Some(hours) if hours <= 6.0 => 3,
        Some(hours) if hours <= 24.0 => 2,
        Some(hours) if hours <= 48.0 => 1,
        Some(_) => 0,
    };

    (completion + payment + response).min(MAX_CUSTOMER_QUALITY_SCORE)
}

/// Urgency sub-score from the days remaining until the preferred start.
pub fn urgency_score(
    preferred_start: Option<NaiveDate>,
    flexible_dates: bool,
    today: NaiveDate,
) -> i32 {
    let Some(start) = preferred_start else {
        return if flexible_dates { 3 } else { 5 };
    };

    let days = (start - today).num_days();
    match days {
        d if d <= 1 => 10,
        d if d <= 3 => 8,
        d if d <= 7 => 6,
        d if d <= 14 => 4,
        d if d <= 30 => 3,
        _ => 2,
    }
}

pub fn get_score_rating(total_score: i32) -> ScoreRating {
    if total_score >= 80 {
        ScoreRating::Excellent
    } else if total_score >= 60 {
        ScoreRating::Good
    } else if total_score >= 40 {
        ScoreRating::Fair
    } else {
        ScoreRating::Low
    }
}

/// Human-readable reasons behind a score, one per dimension at most.
///
/// Ordered distance, budget, skill, customer, urgency. Neutral bands say
/// nothing.
pub fn get_score_explanations(score: &LeadScore) -> Vec<String> {
    let mut explanations = Vec::new();
    let km = score.distance_km;

    match score.distance_score {
        25 => explanations.push(format!("Very close to you ({:.1} km away)", km)),
        22 | 18 => explanations.push(format!("Close to you ({:.1} km away)", km)),
        15 | 12 => explanations.push(format!("Within easy reach ({:.1} km away)", km)),
        8 => explanations.push(format!("Within your service area ({:.1} km away)", km)),
        4 => explanations.push(format!("Just outside your service area ({:.1} km away)", km)),
        _ => {}
    }

    match score.budget_score {
        25 => explanations.push("Budget matches your preferred job size".to_string()),
        18 => explanations.push("Budget is close to your preferred job size".to_string()),
        12 => explanations.push("Budget is somewhat outside your preferred job size".to_string()),
        10 => explanations.push("Customer has not stated a budget".to_string()),
        5 => explanations.push("Budget is well outside your preferred job size".to_string()),
        _ => {}
    }

    match score.skill_score {
        25 => explanations.push("You hold a verified licence for this trade".to_string()),
        18 => explanations.push("You have won jobs in this trade before".to_string()),
        15 | 12 => {
            explanations.push("Your subscription gives you priority for this trade".to_string())
        }
        _ => {}
    }

    match score.customer_quality_score {
        s if s >= 12 => explanations.push("Customer has an excellent track record".to_string()),
        s if s >= 8 => explanations.push("Customer has a reasonable track record".to_string()),
        s if s < 5 => explanations.push("Customer has a mixed track record".to_string()),
        _ => {}
    }

    match score.urgency_score {
        10 => explanations.push("Customer wants to start within a day".to_string()),
        8 => explanations.push("Customer wants to start within 3 days".to_string()),
        6 => explanations.push("Customer wants to start this week".to_string()),
        _ => {}
    }

    explanations
}
