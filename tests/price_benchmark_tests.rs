use bigdecimal::BigDecimal;
use std::str::FromStr;
use chrono::Utc;
use uuid::Uuid;

use tradie_leads_api::models::{PriceRating, Quote, QuoteStatus};
use tradie_leads_api::price_benchmark::{
    calculate_percentage_difference, compare_quote, compute_stats, get_price_rating, median,
    select_benchmark, summarize_quotes, PricePoint,
};

fn point(price: i64, postcode: &str) -> PricePoint {
    PricePoint {
        price: BigDecimal::from(price),
        postcode: postcode.to_string(),
    }
}

fn quote(price: i64) -> Quote {
    Quote {
        id: Uuid::new_v4(),
        job_id: Uuid::new_v4(),
        tradie_id: Uuid::new_v4(),
        price: BigDecimal::from(price),
        status: QuoteStatus::Pending,
        created_at: Utc::now(),
        responded_at: None,
    }
}

#[test]
fn test_median_matches_textbook_definition() {
    let even: Vec<BigDecimal> = [10, 20, 30, 40].into_iter().map(BigDecimal::from).collect();
    let odd: Vec<BigDecimal> = [10, 20, 30].into_iter().map(BigDecimal::from).collect();

    assert_eq!(median(&even), Some(BigDecimal::from(25)));
    assert_eq!(median(&odd), Some(BigDecimal::from(20)));
}

#[test]
fn test_regional_sample_used_when_large_enough() {
    let category = Uuid::new_v4();
    let mut points: Vec<PricePoint> = (1..=5).map(|i| point(i * 100, "2000")).collect();
    points.extend((1..=5).map(|i| point(i * 1000, "3000")));

    let benchmark =
        select_benchmark(category, "Electrical", &points, Some("2010"), Utc::now()).unwrap();

    assert_eq!(benchmark.postcode.as_deref(), Some("20"));
    assert_eq!(benchmark.sample_size, 5);
    assert_eq!(benchmark.median_price, BigDecimal::from(300));
}

#[test]
fn test_short_region_falls_back_to_category_wide() {
    let category = Uuid::new_v4();
    // Neither the region (4) nor the other region (2) is large enough alone.
    let mut points: Vec<PricePoint> = (1..=4).map(|i| point(i * 100, "2000")).collect();
    points.extend((1..=2).map(|i| point(i * 1000, "4000")));

    let benchmark =
        select_benchmark(category, "Plumbing", &points, Some("2000"), Utc::now()).unwrap();

    assert_eq!(benchmark.postcode, None);
    assert_eq!(benchmark.sample_size, 6);
    assert_eq!(benchmark.min_price, BigDecimal::from(100));
    assert_eq!(benchmark.max_price, BigDecimal::from(2000));
    assert_eq!(benchmark.trade_category_name, "Plumbing");
}

#[test]
fn test_single_character_postcode_uses_category_wide_sample() {
    let points: Vec<PricePoint> = (1..=5).map(|i| point(i * 100, "2000")).collect();

    let benchmark =
        select_benchmark(Uuid::new_v4(), "Fencing", &points, Some("2"), Utc::now()).unwrap();

    assert_eq!(benchmark.postcode, None);
    assert_eq!(benchmark.sample_size, 5);
}

#[test]
fn test_no_benchmark_when_category_is_short_too() {
    let points: Vec<PricePoint> = (1..=4).map(|i| point(i * 100, "2000")).collect();

    assert!(select_benchmark(Uuid::new_v4(), "Roofing", &points, Some("2000"), Utc::now())
        .is_none());
    assert!(select_benchmark(Uuid::new_v4(), "Roofing", &points, None, Utc::now()).is_none());
}

#[test]
fn test_percentage_difference() {
    assert_eq!(
        calculate_percentage_difference(&BigDecimal::from(110), &BigDecimal::from(100)),
        10.0
    );
    let below = calculate_percentage_difference(&BigDecimal::from(100), &BigDecimal::from(300));
    assert!((below + 66.7).abs() < 1e-9);
    assert_eq!(
        calculate_percentage_difference(&BigDecimal::from(110), &BigDecimal::from(0)),
        0.0
    );
}

#[test]
fn test_percentage_difference_rounds_halves_away_from_zero() {
    let average = BigDecimal::from(100);
    let price = |s: &str| BigDecimal::from_str(s).unwrap();

    let just_above = calculate_percentage_difference(&price("105.05"), &average);
    assert!((just_above - 5.1).abs() < 1e-9);
    assert_eq!(get_price_rating(just_above), PriceRating::AboveMarket);

    let ten = calculate_percentage_difference(&price("110.25"), &average);
    assert!((ten - 10.3).abs() < 1e-9);
    let below = calculate_percentage_difference(&price("94.95"), &average);
    assert!((below + 5.1).abs() < 1e-9);
    assert_eq!(get_price_rating(below), PriceRating::BelowMarket);
}

#[test]
fn test_mean_rounds_half_up_to_cents() {
    let prices: Vec<BigDecimal> = ["100.00", "100.00", "100.00", "100.00", "100.025"]
        .into_iter()
        .map(|s| BigDecimal::from_str(s).unwrap())
        .collect();

    let stats = compute_stats(&prices).unwrap();

    // 500.025 / 5 = 100.005
    assert_eq!(stats.mean, BigDecimal::from_str("100.01").unwrap());
}

#[test]
fn test_price_rating_bands() {
    assert_eq!(get_price_rating(21.0), PriceRating::Premium);
    assert_eq!(get_price_rating(20.0), PriceRating::AboveMarket);
    assert_eq!(get_price_rating(5.0), PriceRating::AtMarket);
    assert_eq!(get_price_rating(-5.0), PriceRating::AtMarket);
    assert_eq!(get_price_rating(-20.0), PriceRating::BelowMarket);
    assert_eq!(get_price_rating(-21.0), PriceRating::Budget);
}

#[test]
fn test_quote_without_benchmark_is_unknown_not_at_market() {
    let comparison = compare_quote(&quote(450), "Painting", None);

    assert_eq!(comparison.rating, PriceRating::Unknown);
    assert_eq!(comparison.market_average, BigDecimal::from(0));
    assert_eq!(comparison.percentage_difference, 0.0);
    assert!(!comparison.has_benchmark());
    assert!(comparison.explanation.contains("Not enough market data"));
}

#[test]
fn test_quote_compared_against_mean() {
    let points: Vec<PricePoint> = [80, 90, 100, 110, 120]
        .into_iter()
        .map(|p| point(p, "2000"))
        .collect();
    let benchmark =
        select_benchmark(Uuid::new_v4(), "Painting", &points, None, Utc::now()).unwrap();

    let comparison = compare_quote(&quote(130), "Painting", Some(&benchmark));

    assert_eq!(comparison.percentage_difference, 30.0);
    assert_eq!(comparison.rating, PriceRating::Premium);
    assert_eq!(comparison.market_min, Some(BigDecimal::from(80)));
    assert_eq!(comparison.sample_size, 5);
    assert!(comparison.explanation.contains("30.0% above"));
}

#[test]
fn test_summary_skips_unbenchmarked_quotes() {
    let points: Vec<PricePoint> = [100, 100, 100, 100, 100]
        .into_iter()
        .map(|p| point(p, "2000"))
        .collect();
    let benchmark =
        select_benchmark(Uuid::new_v4(), "Tiling", &points, None, Utc::now()).unwrap();

    let comparisons = vec![
        compare_quote(&quote(90), "Tiling", Some(&benchmark)),
        compare_quote(&quote(103), "Tiling", Some(&benchmark)),
        compare_quote(&quote(125), "Tiling", Some(&benchmark)),
        compare_quote(&quote(999), "Tiling", None),
    ];

    let tradie_id = Uuid::new_v4();
    let summary = summarize_quotes(tradie_id, comparisons);

    assert_eq!(summary.tradie_id, tradie_id);
    assert_eq!(summary.quotes.len(), 4);
    assert_eq!(summary.benchmarked_quotes, 3);
    assert_eq!(summary.below_market, 1);
    assert_eq!(summary.at_market, 1);
    assert_eq!(summary.above_market, 1);
    assert_eq!(summary.average_percentage_difference, 6.0);
}
