//! Market price benchmarks and quote comparison.
//!
//! Benchmarks are built from recent accepted (or completed-job) quotes in a
//! trade category. A postcode narrows the sample to jobs sharing the first
//! two characters of the postcode; if that region has fewer than
//! [`MIN_SAMPLE_SIZE`] prices the category-wide sample is used instead, and if
//! that is also short there is no benchmark at all.

use crate::models::{
    PriceBenchmark, PriceRating, Quote, QuoteComparison, TradieQuotesComparison,
};
use bigdecimal::{BigDecimal, RoundingMode, ToPrimitive, Zero};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Fewest prices a benchmark may be computed from.
pub const MIN_SAMPLE_SIZE: usize = 5;
/// How far back qualifying quotes are taken from.
pub const BENCHMARK_WINDOW_MONTHS: u32 = 6;
/// How far back a tradie's own quotes are compared.
pub const TRADIE_HISTORY_MONTHS: u32 = 3;
/// Half-width of the "at market" band, in percent.
pub const AT_MARKET_BAND_PERCENT: f64 = 5.0;

/// A qualifying historical price and the postcode of its job.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct PricePoint {
    pub price: BigDecimal,
    pub postcode: String,
}

/// Summary statistics of a price sample.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceStats {
    pub min: BigDecimal,
    pub max: BigDecimal,
    pub mean: BigDecimal,
    pub median: BigDecimal,
    pub sample_size: usize,
}

/// Regional bucket of a postcode: its first two characters.
///
/// Returns `None` for postcodes shorter than two characters.
pub fn postcode_prefix(postcode: &str) -> Option<String> {
    let trimmed = postcode.trim();
    if trimmed.chars().count() < 2 {
        return None;
    }
    Some(trimmed.chars().take(2).collect())
}

/// Median of an ascending slice. Even lengths average the two middle values.
pub fn median(sorted: &[BigDecimal]) -> Option<BigDecimal> {
    let len = sorted.len();
    if len == 0 {
        return None;
    }
    let mid = len / 2;
    if len % 2 == 0 {
        Some((&sorted[mid - 1] + &sorted[mid]) / BigDecimal::from(2))
    } else {
        Some(sorted[mid].clone())
    }
}

/// Statistics for a sample, or `None` if it is smaller than [`MIN_SAMPLE_SIZE`].
pub fn compute_stats(prices: &[BigDecimal]) -> Option<PriceStats> {
    if prices.len() < MIN_SAMPLE_SIZE {
        return None;
    }

    let mut sorted = prices.to_vec();
    sorted.sort();

    let total: BigDecimal = sorted.iter().sum();
    let mean = (total / BigDecimal::from(sorted.len() as i64))
        .with_scale_round(2, RoundingMode::HalfUp);

    Some(PriceStats {
        min: sorted[0].clone(),
        max: sorted[sorted.len() - 1].clone(),
        mean,
        median: median(&sorted)?,
        sample_size: sorted.len(),
    })
}

/// Picks the regional sample when it is large enough, else the category-wide one.
///
/// `points` is the category-wide qualifying set. The fallback happens at most once.
pub fn select_benchmark(
    trade_category_id: Uuid,
    trade_category_name: &str,
    points: &[PricePoint],
    postcode: Option<&str>,
    now: DateTime<Utc>,
) -> Option<PriceBenchmark> {
    let build = |stats: PriceStats, prefix: Option<String>| PriceBenchmark {
        trade_category_id,
        trade_category_name: trade_category_name.to_string(),
        postcode: prefix,
        min_price: stats.min,
        max_price: stats.max,
        mean_price: stats.mean,
        median_price: stats.median,
        sample_size: stats.sample_size,
        computed_at: now,
    };

    if let Some(prefix) = postcode.and_then(postcode_prefix) {
        let regional: Vec<BigDecimal> = points
            .iter()
            .filter(|p| postcode_prefix(&p.postcode).as_deref() == Some(prefix.as_str()))
            .map(|p| p.price.clone())
            .collect();

        if let Some(stats) = compute_stats(&regional) {
            return Some(build(stats, Some(prefix)));
        }
        tracing::debug!(
            "Only {} prices in postcode region {} for category {}, falling back to category-wide",
            regional.len(),
            prefix,
            trade_category_id
        );
    }

    let all: Vec<BigDecimal> = points.iter().map(|p| p.price.clone()).collect();
    compute_stats(&all).map(|stats| build(stats, None))
}

/// `(your_price - market_average) / market_average * 100`, to one decimal place
/// with halves rounded away from zero.
///
/// A zero market average yields 0.
pub fn calculate_percentage_difference(
    your_price: &BigDecimal,
    market_average: &BigDecimal,
) -> f64 {
    if market_average.is_zero() {
        return 0.0;
    }
    let diff = (your_price - market_average) * BigDecimal::from(100) / market_average.clone();
    diff.with_scale_round(1, RoundingMode::HalfUp).to_f64().unwrap_or(0.0)
}

pub fn get_price_rating(percentage_difference: f64) -> PriceRating {
    if percentage_difference > 20.0 {
        PriceRating::Premium
    } else if percentage_difference > AT_MARKET_BAND_PERCENT {
        PriceRating::AboveMarket
    } else if percentage_difference >= -AT_MARKET_BAND_PERCENT {
        PriceRating::AtMarket
    } else if percentage_difference >= -20.0 {
        PriceRating::BelowMarket
    } else {
        PriceRating::Budget
    }
}

pub fn price_explanation(
    rating: PriceRating,
    percentage_difference: f64,
    category: &str,
) -> String {
    let pct = percentage_difference.abs();
    match rating {
        PriceRating::Premium => format!(
            "Your quote is {:.1}% above the average {} price. Make sure it shows the extra value you offer.",
            pct, category
        ),
        PriceRating::AboveMarket => {
            format!("Your quote is {:.1}% above the average {} price.", pct, category)
        }
        PriceRating::AtMarket => format!("Your quote is in line with the average {} price.", category),
        PriceRating::BelowMarket => {
            format!("Your quote is {:.1}% below the average {} price.", pct, category)
        }
        PriceRating::Budget => format!(
            "Your quote is {:.1}% below the average {} price. Check that it still covers your costs.",
            pct, category
        ),
        PriceRating::Unknown => format!("Not enough market data available for {} yet.", category),
    }
}

/// Compares a quote with its benchmark, or reports `Unknown` without one.
pub fn compare_quote(
    quote: &Quote,
    trade_category_name: &str,
    benchmark: Option<&PriceBenchmark>,
) -> QuoteComparison {
    let Some(benchmark) = benchmark else {
        return QuoteComparison {
            quote_id: quote.id,
            job_id: quote.job_id,
            trade_category_name: trade_category_name.to_string(),
            your_price: quote.price.clone(),
            market_average: BigDecimal::zero(),
            market_min: None,
            market_max: None,
            sample_size: 0,
            percentage_difference: 0.0,
            rating: PriceRating::Unknown,
            explanation: price_explanation(PriceRating::Unknown, 0.0, trade_category_name),
            quoted_at: quote.created_at,
        };
    };

    let diff = calculate_percentage_difference(&quote.price, &benchmark.mean_price);
    let rating = get_price_rating(diff);

    QuoteComparison {
        quote_id: quote.id,
        job_id: quote.job_id,
        trade_category_name: trade_category_name.to_string(),
        your_price: quote.price.clone(),
        market_average: benchmark.mean_price.clone(),
        market_min: Some(benchmark.min_price.clone()),
        market_max: Some(benchmark.max_price.clone()),
        sample_size: benchmark.sample_size,
        percentage_difference: diff,
        rating,
        explanation: price_explanation(rating, diff, trade_category_name),
        quoted_at: quote.created_at,
    }
}

/// Aggregates a tradie's comparisons. Quotes without a benchmark stay in the
/// list but are left out of the average and the counts.
pub fn summarize_quotes(tradie_id: Uuid, quotes: Vec<QuoteComparison>) -> TradieQuotesComparison {
    let mut below_market = 0;
    let mut at_market = 0;
    let mut above_market = 0;
    let mut total = 0.0;
    let mut benchmarked = 0;

    for comparison in quotes.iter().filter(|c| c.has_benchmark()) {
        let diff = comparison.percentage_difference;
        total += diff;
        benchmarked += 1;

        if diff < -AT_MARKET_BAND_PERCENT {
            below_market += 1;
        } else if diff > AT_MARKET_BAND_PERCENT {
            above_market += 1;
        } else {
            at_market += 1;
        }
    }

    let average = if benchmarked == 0 {
        0.0
    } else {
        ((total / benchmarked as f64) * 10.0).round() / 10.0
    };

    TradieQuotesComparison {
        tradie_id,
        quotes,
        benchmarked_quotes: benchmarked,
        average_percentage_difference: average,
        below_market,
        at_market,
        above_market,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prices(values: &[i64]) -> Vec<BigDecimal> {
        values.iter().copied().map(BigDecimal::from).collect()
    }

    #[test]
    fn test_median_even_and_odd() {
        assert_eq!(median(&prices(&[10, 20, 30, 40])), Some(BigDecimal::from(25)));
        assert_eq!(median(&prices(&[10, 20, 30])), Some(BigDecimal::from(20)));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn test_stats_need_minimum_sample() {
        assert!(compute_stats(&prices(&[100, 200, 300, 400])).is_none());

        let stats = compute_stats(&prices(&[500, 100, 400, 200, 300])).unwrap();
        assert_eq!(stats.min, BigDecimal::from(100));
        assert_eq!(stats.max, BigDecimal::from(500));
        assert_eq!(stats.mean, BigDecimal::from(300));
        assert_eq!(stats.median, BigDecimal::from(300));
        assert_eq!(stats.sample_size, 5);
    }

    #[test]
    fn test_postcode_prefix() {
        assert_eq!(postcode_prefix("2000"), Some("20".to_string()));
        assert_eq!(postcode_prefix(" 3121 "), Some("31".to_string()));
        assert_eq!(postcode_prefix("2"), None);
        assert_eq!(postcode_prefix(""), None);
    }

    #[test]
    fn test_zero_average_guard() {
        let zero = BigDecimal::zero();
        assert_eq!(calculate_percentage_difference(&BigDecimal::from(150), &zero), 0.0);
    }

    #[test]
    fn test_at_market_explanation_is_neutral_for_both_signs() {
        let above = price_explanation(PriceRating::AtMarket, 4.0, "Plumbing");
        let below = price_explanation(PriceRating::AtMarket, -4.0, "Plumbing");
        assert_eq!(above, below);
        assert_eq!(above, "Your quote is in line with the average Plumbing price.");
    }
}
