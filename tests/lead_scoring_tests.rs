use bigdecimal::BigDecimal;
use chrono::{Duration, TimeZone, Utc};
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

use tradie_leads_api::lead_scoring::{
    budget_score, get_score_explanations, get_score_rating, is_within_eligibility,
    LeadScoringEngine, TradieCandidate,
};
use tradie_leads_api::models::{
    Job, JobStatus, ScoreRating, SubscriptionTier, TradieLicence, TradieProfile,
};
use tradie_leads_api::services::{eligible_jobs, score_jobs};

const SYDNEY_LAT: f64 = -33.87;
const SYDNEY_LON: f64 = 151.21;

fn money(value: &str) -> BigDecimal {
    BigDecimal::from_str(value).unwrap()
}

fn tradie(radius_km: f64) -> TradieCandidate {
    TradieCandidate::new(TradieProfile {
        id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        latitude: SYDNEY_LAT,
        longitude: SYDNEY_LON,
        service_radius_km: radius_km,
        preferred_job_size_min: None,
        preferred_job_size_max: None,
        subscription_tier: SubscriptionTier::Free,
    })
}

fn licence(tradie: &TradieCandidate, category: Uuid) -> TradieLicence {
    TradieLicence {
        id: Uuid::new_v4(),
        tradie_id: tradie.profile.id,
        trade_category_id: category,
        licence_number: "EC-12345".to_string(),
        verified: true,
        expires_on: None,
    }
}

/// A job `km` kilometres due north of the tradie.
fn job_north(category: Uuid, km: f64) -> Job {
    Job {
        id: Uuid::new_v4(),
        trade_category_id: category,
        customer_id: Uuid::new_v4(),
        title: "Rewire kitchen".to_string(),
        latitude: SYDNEY_LAT + km / 111.195,
        longitude: SYDNEY_LON,
        budget_min: None,
        budget_max: Some(money("5000")),
        preferred_start_date: None,
        flexible_dates: false,
        postcode: "2000".to_string(),
        status: JobStatus::Open,
        created_at: Utc::now(),
    }
}

#[test]
fn test_licensed_tradie_close_job_scores_excellent() {
    let now = Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap();
    let category = Uuid::new_v4();

    let mut tradie = tradie(25.0);
    tradie.licences.push(licence(&tradie, category));

    let mut job = job_north(category, 8.0);
    job.preferred_start_date = Some(now.date_naive());

    let score = LeadScoringEngine::new(now).calculate_score(&job, &tradie, None);

    assert_eq!(score.distance_score, 22);
    assert_eq!(score.budget_score, 15);
    assert_eq!(score.skill_score, 25);
    assert_eq!(score.customer_quality_score, 8);
    assert_eq!(score.urgency_score, 10);
    assert_eq!(score.total_score, 80);
    assert!((score.distance_km - 8.0).abs() < 0.15);
    assert_eq!(score.calculated_at, now);
    assert_eq!(get_score_rating(score.total_score), ScoreRating::Excellent);
}

#[test]
fn test_rating_boundaries() {
    assert_eq!(get_score_rating(100), ScoreRating::Excellent);
    assert_eq!(get_score_rating(80), ScoreRating::Excellent);
    assert_eq!(get_score_rating(79), ScoreRating::Good);
    assert_eq!(get_score_rating(60), ScoreRating::Good);
    assert_eq!(get_score_rating(59), ScoreRating::Fair);
    assert_eq!(get_score_rating(40), ScoreRating::Fair);
    assert_eq!(get_score_rating(39), ScoreRating::Low);
    assert_eq!(get_score_rating(0), ScoreRating::Low);
}

#[test]
fn test_eligibility_window_is_inclusive() {
    assert!(is_within_eligibility(37.5, 25.0));
    assert!(!is_within_eligibility(37.5 + 1e-9, 25.0));
}

#[test]
fn test_eligible_jobs_drops_far_and_closed_jobs() {
    let category = Uuid::new_v4();
    let tradie = tradie(20.0);

    let near = job_north(category, 10.0);
    let edge = job_north(category, 29.0);
    let far = job_north(category, 31.0);
    let mut closed = job_north(category, 2.0);
    closed.status = JobStatus::Completed;

    let kept: Vec<Uuid> = eligible_jobs(
        &tradie,
        vec![near.clone(), edge.clone(), far, closed],
    )
    .into_iter()
    .map(|job| job.id)
    .collect();

    assert_eq!(kept, vec![near.id, edge.id]);
}

#[test]
fn test_score_jobs_is_repeatable() {
    let now = Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap();
    let category = Uuid::new_v4();
    let tradie = tradie(30.0);
    let jobs: Vec<Job> = (1..=5)
        .map(|i| job_north(category, i as f64 * 4.0))
        .collect();
    let engine = LeadScoringEngine::new(now);

    let first = score_jobs(&engine, &tradie, &jobs, &HashMap::new());
    let mut reversed = jobs.clone();
    reversed.reverse();
    let second = score_jobs(&engine, &tradie, &reversed, &HashMap::new());

    assert_eq!(first, second);
    assert_eq!(first.len(), 5);
    assert!(first.windows(2).all(|pair| pair[0].job_id < pair[1].job_id));
}

#[test]
fn test_budget_outside_window_is_scored_symmetrically() {
    let min = money("1000");
    let max = money("2000");

    // 800 is 0.8 of the minimum; 2500 puts the maximum at 0.8 of the budget.
    assert_eq!(budget_score(Some(&money("800")), Some(&min), Some(&max)), 18);
    assert_eq!(budget_score(Some(&money("2500")), Some(&min), Some(&max)), 18);

    assert_eq!(budget_score(Some(&money("600")), Some(&min), Some(&max)), 12);
    assert_eq!(budget_score(Some(&money("3500")), Some(&min), Some(&max)), 12);

    assert_eq!(budget_score(Some(&money("100")), Some(&min), Some(&max)), 5);
    assert_eq!(budget_score(Some(&money("9000")), Some(&min), Some(&max)), 5);
}

#[test]
fn test_expired_licence_falls_back_to_experience() {
    let now = Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap();
    let category = Uuid::new_v4();

    let mut tradie = tradie(25.0);
    let mut expired = licence(&tradie, category);
    expired.expires_on = Some((now - Duration::days(1)).date_naive());
    tradie.licences.push(expired);
    tradie.accepted_categories.insert(category);

    let score =
        LeadScoringEngine::new(now).calculate_score(&job_north(category, 3.0), &tradie, None);

    assert_eq!(score.skill_score, 18);
}

#[test]
fn test_explanations_follow_sub_scores() {
    let now = Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap();
    let category = Uuid::new_v4();

    let mut tradie = tradie(25.0);
    tradie.licences.push(licence(&tradie, category));
    let mut job = job_north(category, 3.0);
    job.preferred_start_date = Some(now.date_naive());

    let score = LeadScoringEngine::new(now).calculate_score(&job, &tradie, None);
    let explanations = get_score_explanations(&score);

    assert!(explanations[0].starts_with("Very close to you"));
    assert!(explanations
        .iter()
        .any(|e| e == "You hold a verified licence for this trade"));
    assert!(explanations
        .iter()
        .any(|e| e == "Customer wants to start within a day"));
}
