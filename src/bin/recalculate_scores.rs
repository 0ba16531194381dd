//! One-shot lead score refresh, meant for cron.
//!
//! ```text
//! recalculate_scores                     # every tradie
//! recalculate_scores --tradie <uuid>     # one tradie
//! recalculate_scores --customer <uuid>   # one customer's quality, then every tradie
//! ```

use dotenvy::dotenv;
use tradie_leads_api::db::Database;
use tradie_leads_api::services::{CustomerQualityService, LeadScoringService};
use uuid::Uuid;

#[derive(Debug, Default, PartialEq)]
struct Args {
    tradie: Option<Uuid>,
    customer: Option<Uuid>,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> anyhow::Result<Args> {
    let mut parsed = Args::default();
    let mut args = args.into_iter();

    while let Some(flag) = args.next() {
        let value = args
            .next()
            .ok_or_else(|| anyhow::anyhow!("{} needs a UUID argument", flag))?;
        let id = Uuid::parse_str(&value)
            .map_err(|e| anyhow::anyhow!("{} is not a valid UUID: {}", value, e))?;

        match flag.as_str() {
            "--tradie" => parsed.tradie = Some(id),
            "--customer" => parsed.customer = Some(id),
            other => anyhow::bail!("Unknown argument: {}", other),
        }
    }

    Ok(parsed)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt::init();

    let args = parse_args(std::env::args().skip(1))?;

    let database_url = std::env::var("DATABASE_URL")
        .or_else(|_| std::env::var("DB_URL"))
        .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;
    let db = Database::with_max_connections(&database_url, 5).await?;

    tracing::info!("Connected to database. Starting recalculation...");

    if let Some(customer_id) = args.customer {
        let service = CustomerQualityService::new(db.pool.clone());
        match service.recalculate_customer_quality(customer_id).await? {
            Some(quality) => tracing::info!(
                "Customer {} recalculated: {} jobs posted, reliability {:.2}",
                customer_id,
                quality.total_jobs_posted,
                quality.payment_reliability
            ),
            None => tracing::warn!("Customer {} not found", customer_id),
        }
    }

    let service = LeadScoringService::new(db.pool.clone());
    match args.tradie {
        Some(tradie_id) => {
            let outcome = service.recalculate_all_scores_for_tradie(tradie_id).await?;
            tracing::info!(
                "Tradie {}: {:?}, {} scores written",
                tradie_id,
                outcome,
                outcome.scores_written()
            );
        }
        None => {
            let summary = service.recalculate_all_tradies().await?;
            if summary.tradies_failed > 0 {
                anyhow::bail!(
                    "{} of {} tradies failed to recalculate",
                    summary.tradies_failed,
                    summary.tradies_failed + summary.tradies_processed
                );
            }
        }
    }

    Ok(())
}
