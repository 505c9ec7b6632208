use chrono::{DateTime, NaiveDate, Utc};
use clipbrain::account::{AccountContext, IdeaOutcome, MetricWeights, OutcomeMetrics};
use clipbrain::analytics::AnalysisReport;
use clipbrain::cli::{AccountAction, Cli, Commands, ConfigAction};
use clipbrain::config::{Config, ConfigValidator};
use clipbrain::content::ContentType;
use clipbrain::error::{BrainError, Result};
use clipbrain::retrieval::{SearchFilters, SearchQuery};
use clipbrain::storage::StorageStats;
use clipbrain::Brain;
use serde::Serialize;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

fn main() {
    let cli = Cli::parse_args();

    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose {
        "clipbrain=debug"
    } else {
        "clipbrain=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let json = cli.json;

    if let Commands::Config { action } = cli.command {
        return cmd_config(cli.config, cli.profile, action, json);
    }

    let config = load_config(cli.config, cli.profile)?;
    let brain = Brain::open(config)?;
    let runtime = tokio::runtime::Runtime::new().map_err(|e| BrainError::Io {
        source: e,
        context: "Failed to create tokio runtime".to_string(),
    })?;

    match cli.command {
        Commands::Import { file } => {
            let report = brain.import_videos(&file)?;
            if json {
                return print_json(&report);
            }
            println!("✓ Imported {} videos", report.imported);
            for rejected in &report.rejected {
                println!(
                    "  ✗ #{} ({}): {}",
                    rejected.index,
                    rejected.video_id.as_deref().unwrap_or("no id"),
                    rejected.reason
                );
            }
        }
        Commands::Index { video_id } => {
            let indexed = runtime.block_on(brain.index_video(&video_id))?;
            if json {
                return print_json(&serde_json::json!({ "video_id": video_id, "indexed": indexed }));
            }
            if indexed {
                println!("✓ Indexed {}", video_id);
            } else {
                println!("{} has no usable text, nothing indexed", video_id);
            }
        }
        Commands::Reindex { owner } => {
            let cancel = CancellationToken::new();
            let report = runtime.block_on(async {
                let watcher = cancel.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        tracing::warn!("Interrupt received, finishing videos in flight");
                        watcher.cancel();
                    }
                });
                brain.reindex_all(&owner, cancel).await
            })?;

            if json {
                return print_json(&report);
            }
            let status = if report.cancelled { "Cancelled" } else { "✓ Reindexed" };
            println!(
                "{} {} of {} videos ({} empty, {} failed) in {}ms",
                status,
                report.indexed_count,
                report.total_videos,
                report.empty_count,
                report.failures.len(),
                report.duration_ms
            );
            for failure in &report.failures {
                println!("  ✗ {}: {}", failure.video_id, failure.error);
            }
        }
        Commands::Search {
            owner,
            query,
            top_k,
            content_types,
            theme,
            min_views,
            after,
            before,
            diversify,
            diversity_threshold,
        } => {
            let filters = SearchFilters {
                content_types: content_types
                    .iter()
                    .map(|t| t.parse::<ContentType>())
                    .collect::<Result<Vec<_>>>()?,
                published_after: after.as_deref().map(|d| parse_date("after", d, false)).transpose()?,
                published_before: before
                    .as_deref()
                    .map(|d| parse_date("before", d, true))
                    .transpose()?,
                min_views,
                theme,
            };
            let query = SearchQuery {
                owner_id: owner,
                text: query,
                top_k,
                filters,
                diversify,
                diversity_threshold,
            };

            let response = runtime.block_on(brain.search(&query))?;
            if json {
                return print_json(&response);
            }

            if response.degraded {
                println!("⚠ Similarity search unavailable, results ordered by recency");
            }
            println!(
                "{} hits of {} candidates ({}ms)",
                response.hits.len(),
                response.total_results,
                response.search_time_ms
            );
            for (rank, hit) in response.hits.iter().enumerate() {
                println!(
                    "\n{}. [{:.3}] {} {} - {}",
                    rank + 1,
                    hit.final_score,
                    hit.vector.video_id,
                    hit.vector.content_type,
                    hit.explanation
                );
                println!("   {}", preview(&hit.vector.text, 100));
            }
            if !response.facets.themes.is_empty() {
                println!("\nThemes:");
                for facet in &response.facets.themes {
                    println!("  {} - {} ({:.1}%)", facet.value, facet.count, facet.percentage);
                }
            }
        }
        Commands::Clusters { owner } => {
            let report = brain.get_cluster_analysis(&owner)?;
            if json {
                return print_json(&report);
            }
            if print_insufficient(&report) {
                return Ok(());
            }
            println!("{} clusters", report.items().len());
            for cluster in report.items() {
                println!(
                    "\n{} [{}] score {:.1}, {} videos, trend {:?}",
                    cluster.name,
                    cluster.id,
                    cluster.optimization_score,
                    cluster.video_count,
                    cluster.performance_trend
                );
                for video in &cluster.top_videos {
                    println!("  {} - {} views", video.video_id, video.views);
                }
            }
        }
        Commands::Predict { owner, videos } => {
            let report = brain.get_viral_predictions(&owner, &videos)?;
            if json {
                return print_json(&report);
            }
            if print_insufficient(&report) {
                return Ok(());
            }
            for prediction in report.items() {
                println!(
                    "{}: {:.0}% viral, ~{:.0} views, confidence {:.0} [{}]",
                    prediction.video_id,
                    prediction.viral_probability * 100.0,
                    prediction.predicted_views,
                    prediction.confidence_score,
                    prediction.key_factors.join(", ")
                );
            }
        }
        Commands::Insights {
            owner,
            list,
            all,
            dismiss,
        } => {
            if let Some(insight_id) = dismiss {
                brain.dismiss_insight(&owner, &insight_id)?;
                if json {
                    return print_json(&serde_json::json!({ "dismissed": insight_id }));
                }
                println!("✓ Dismissed {}", insight_id);
                return Ok(());
            }

            let insights = if list {
                brain.list_insights(&owner, all)?
            } else {
                let report = brain.generate_insights(&owner)?;
                if !json && print_insufficient(&report) {
                    return Ok(());
                }
                report.into_items()
            };

            if json {
                return print_json(&insights);
            }
            println!("{} insights", insights.len());
            for insight in &insights {
                println!(
                    "\n[{}] {} ({}, confidence {:.0}){}",
                    insight.priority.as_str(),
                    insight.title,
                    insight.kind,
                    insight.confidence,
                    if insight.dismissed { " - dismissed" } else { "" }
                );
                println!("  {}", insight.description);
                println!("  id: {}", insight.id);
            }
        }
        Commands::Outcome {
            owner,
            title,
            status,
            retention,
            saves,
            follows,
        } => {
            let metrics = OutcomeMetrics {
                retention_pct: retention,
                saves_per_1k: saves,
                follows_per_1k: follows,
            };
            let outcome = IdeaOutcome {
                owner_id: owner,
                idea_title: title,
                status: status.parse()?,
                metrics: (!metrics.is_empty()).then_some(metrics),
                recorded_at: Utc::now(),
            };

            let receipt = brain.record_idea_outcome(&outcome)?;
            if json {
                return print_json(&receipt);
            }
            println!("✓ Outcome recorded");
            if receipt.adjusted {
                println!(
                    "  Weights: retention {:.3}, saves {:.3}, follows {:.3}",
                    receipt.weights.retention, receipt.weights.saves, receipt.weights.follows
                );
            }
        }
        Commands::Outcomes { owner } => {
            let outcomes = brain.list_idea_outcomes(&owner)?;
            if json {
                return print_json(&outcomes);
            }
            if outcomes.is_empty() {
                println!("No outcomes recorded for {}", owner);
            }
            for outcome in &outcomes {
                println!(
                    "{} [{}] {}",
                    outcome.recorded_at.format("%Y-%m-%d"),
                    outcome.status,
                    outcome.idea_title
                );
                if let Some(metrics) = &outcome.metrics {
                    let show = |v: Option<f64>| v.map_or("-".to_string(), |v| format!("{:.1}", v));
                    println!(
                        "  retention {}  saves/1k {}  follows/1k {}",
                        show(metrics.retention_pct),
                        show(metrics.saves_per_1k),
                        show(metrics.follows_per_1k)
                    );
                }
            }
        }
        Commands::Account { action } => cmd_account(&brain, action, json)?,
        Commands::Stats { owner } => {
            let stats = brain.corpus_stats(&owner)?;
            if json {
                return print_json(&stats);
            }
            println!("clipbrain stats for {}", owner);
            println!("=====================");
            println!("Videos:          {}", stats.db.video_count);
            println!("Indexed videos:  {}", stats.db.indexed_video_count);
            println!("Vectors:         {}", stats.db.vector_count);
            println!("Outcomes:        {}", stats.db.outcome_count);
            println!("Open insights:   {}", stats.db.insight_count);
            println!("Corpus version:  {}", stats.db.corpus_version);
            println!(
                "Database size:   {}",
                StorageStats::format_size(stats.database_size)
            );
        }
        Commands::Config { .. } => {}
    }

    Ok(())
}

fn cmd_account(brain: &Brain, action: AccountAction, json: bool) -> Result<()> {
    match action {
        AccountAction::Show { owner } => {
            let context = brain
                .get_account_context(&owner)?
                .ok_or_else(|| BrainError::not_found("Account context", owner.as_str()))?;
            if json {
                return print_json(&context);
            }
            println!("Account: {}", context.owner_id);
            println!("Mission: {}", context.mission.as_deref().unwrap_or("-"));
            println!("Themes:  {}", context.themes.join(", "));
            println!("Bets:    {}", context.strategic_bets.join(", "));
            println!(
                "Weights: retention {:.3}, saves {:.3}, follows {:.3}",
                context.weights.retention, context.weights.saves, context.weights.follows
            );
        }
        AccountAction::Set {
            owner,
            mission,
            themes,
            bets,
            weights,
        } => {
            let mut context = brain
                .get_account_context(&owner)?
                .unwrap_or_else(|| AccountContext::new(owner.as_str()));

            if let Some(mission) = mission {
                context.mission = Some(mission);
            }
            if let Some(themes) = themes {
                context.themes = themes;
            }
            if let Some(bets) = bets {
                context.strategic_bets = bets;
            }
            if let Some(weights) = weights {
                let [retention, saves, follows] = weights[..] else {
                    return Err(BrainError::validation(
                        "weights",
                        "Expected exactly three values: retention,saves,follows",
                    ));
                };
                context.weights = MetricWeights {
                    retention,
                    saves,
                    follows,
                };
            }
            context.updated_at = Utc::now();

            brain.save_account_context(&context)?;
            if json {
                return print_json(&context);
            }
            println!("✓ Account context saved for {}", owner);
        }
    }
    Ok(())
}

fn cmd_config(
    config_path: Option<PathBuf>,
    profile: Option<String>,
    action: ConfigAction,
    json: bool,
) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path, profile)?;
            if json {
                return print_json(&config);
            }
            println!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            ConfigValidator::validate(&config)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| BrainError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>, profile: Option<String>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'clipbrain config init' to create one."
        );
        let mut config = Config::default();
        config.apply_env_overrides();
        if let Some(profile) = profile {
            config.apply_profile(&profile)?;
        }
        ConfigValidator::validate(&config)?;
        return Ok(config);
    }

    if let Some(profile) = profile {
        Config::load_with_profile(&path, &profile)
    } else {
        Config::load(&path)
    }
}

/// Parse YYYY-MM-DD as the start (or end) of that day in UTC
fn parse_date(field: &str, value: &str, end_of_day: bool) -> Result<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|e| {
        BrainError::validation(field, format!("Expected YYYY-MM-DD, got '{}': {}", value, e))
    })?;
    let time = if end_of_day {
        date.and_hms_opt(23, 59, 59)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    time.map(|t| t.and_utc())
        .ok_or_else(|| BrainError::validation(field, format!("Invalid date '{}'", value)))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(|e| BrainError::Json {
        source: e,
        context: "Failed to serialize output".to_string(),
    })?;
    println!("{}", json);
    Ok(())
}

/// Print the insufficient-data notice; true when there is nothing else to show
fn print_insufficient<T>(report: &AnalysisReport<T>) -> bool {
    match report {
        AnalysisReport::InsufficientData {
            indexed_videos,
            required,
        } => {
            println!(
                "Not enough data: {} indexed videos, {} required",
                indexed_videos, required
            );
            true
        }
        AnalysisReport::Ready { .. } => false,
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    let line = text.lines().next().unwrap_or_default();
    if line.chars().count() <= max_chars {
        line.to_string()
    } else {
        format!("{}…", line.chars().take(max_chars).collect::<String>())
    }
}
