use log::{debug, info, warn};

use sensory_analysis::*;
use snafu::{prelude::*, Snafu};

use std::collections::{BTreeSet, HashSet};
use std::fs;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::args::Args;
use crate::report::cache::ReportCache;
use crate::report::config_reader::*;
use crate::report::insights::{CommandInsightGenerator, InsightGenerator, NoInsightGenerator};
use crate::report::store::{ReportType, SqliteStore};

pub mod cache;
pub mod config_reader;
pub mod insights;
pub mod io_seed;
pub mod store;

const DEFAULT_DATABASE: &str = "sensory.db";

#[derive(Debug, Snafu)]
pub enum ReportError {
    #[snafu(display("evaluation {evaluation_id} not found or has no responses"))]
    NotFound { evaluation_id: RecordId },
    #[snafu(display("database error: {source}"))]
    Persistence { source: rusqlite::Error },
    #[snafu(display("Error opening file {path}: {source}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing JSON: {source}"))]
    ParsingJson { source: serde_json::Error },
    #[snafu(display("Error writing file {path}: {source}"))]
    WritingOutput {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Invalid configuration: {message}"))]
    InvalidConfig { message: String },
    #[snafu(display("Analysis failed: {source}"))]
    Analysis { source: AnalysisErrors },
    #[snafu(display("Could not run the insight command {command}: {source}"))]
    InsightSpawn {
        source: std::io::Error,
        command: String,
    },
    #[snafu(display("The insight command failed: {message}"))]
    InsightOutput { message: String },
    #[snafu(display("Difference detected between the generated report and the reference report"))]
    ReferenceMismatch {},

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

impl ReportError {
    /// Process exit code. A missing evaluation is a client error, everything else
    /// is an internal failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            ReportError::NotFound { .. } => 4,
            _ => 5,
        }
    }
}

pub type ReportResult<T> = Result<T, ReportError>;

// ******** JSON encoding of the report *********

fn timestamp_js(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

pub fn product_to_json(p: &Product) -> JSValue {
    json!({
        "id": p.id,
        "name": p.name,
        "code": p.code,
        "description": p.description,
        "position": p.position,
    })
}

pub fn evaluation_to_json(ev: &PanelistEvaluation) -> JSValue {
    let preferences: Vec<JSValue> = ev
        .preferences
        .iter()
        .map(|p| {
            json!({
                "product_id": p.product_id,
                "position": p.position,
                "reason": p.reason,
            })
        })
        .collect();
    json!({
        "id": ev.id,
        "panelist_id": ev.panelist_id,
        "panelist_name": ev.panelist_name,
        "preferences": preferences,
        "submitted_at": ev.submitted_at,
    })
}

pub fn stats_to_json(stats: &[PreferenceStats]) -> Vec<JSValue> {
    stats
        .iter()
        .map(|s| {
            json!({
                "product_id": s.product_id,
                "product_name": s.product_name,
                "first_place_count": s.first_place_count,
                "second_place_count": s.second_place_count,
                "third_place_count": s.third_place_count,
                "total_votes": s.total_votes,
                "percentage": s.percentage,
                "average_position": s.average_position,
            })
        })
        .collect()
}

pub fn analysis_to_json(analysis: &StatisticalAnalysis) -> JSValue {
    let ft = &analysis.friedman_test;
    let pairwise: Vec<JSValue> = analysis
        .pairwise_comparisons
        .iter()
        .map(|c| {
            json!({
                "product_a": c.product_a,
                "product_b": c.product_b,
                "difference_significant": c.difference_significant,
                "confidence_level": c.confidence_level,
            })
        })
        .collect();
    json!({
        "friedman_test": {
            "chi_square": ft.chi_square,
            "degrees_of_freedom": ft.degrees_of_freedom,
            "p_value": ft.p_value,
            "significant": ft.significant,
            "critical_value": ft.critical_value,
            "interpretation": ft.interpretation,
        },
        "pairwise_comparisons": pairwise,
        "overall_significance": analysis.overall_significance,
    })
}

fn feedback_to_json(fb: &QualitativeFeedback) -> JSValue {
    json!({
        "top_positive_comments": fb.top_positive_comments,
        "top_negative_comments": fb.top_negative_comments,
        "common_themes": fb.common_themes,
    })
}

/// Share of the submissions that place every registered product, in percent.
fn completion_rate(products: &[Product], evaluations: &[PanelistEvaluation]) -> f64 {
    if products.is_empty() || evaluations.is_empty() {
        return 0.0;
    }
    let product_ids: HashSet<RecordId> = products.iter().map(|p| p.id).collect();
    let complete = evaluations
        .iter()
        .filter(|ev| {
            let ranked: HashSet<RecordId> =
                ev.preferences.iter().map(|p| p.product_id).collect();
            product_ids.is_subset(&ranked)
        })
        .count();
    round1(complete as f64 / evaluations.len() as f64 * 100.0)
}

/// All the elements that go into one report.
pub struct ReportContents<'a> {
    pub evaluation_id: RecordId,
    pub evaluation_title: String,
    pub products: &'a [Product],
    pub evaluations: &'a [PanelistEvaluation],
    pub analysis: &'a SensoryAnalysis,
    pub insights: &'a [String],
    pub generated_at: DateTime<Utc>,
}

pub fn build_report_js(c: &ReportContents) -> JSValue {
    let total_panelists = c
        .evaluations
        .iter()
        .map(|ev| ev.panelist_id.as_str())
        .collect::<BTreeSet<&str>>()
        .len();
    let products: Vec<JSValue> = c.products.iter().map(product_to_json).collect();
    json!({
        "evaluation_id": c.evaluation_id,
        "evaluation_title": c.evaluation_title,
        "total_panelists": total_panelists,
        "total_evaluations": c.evaluations.len(),
        "completion_rate": completion_rate(c.products, c.evaluations),
        "products": products,
        "preference_analysis": stats_to_json(&c.analysis.preference_stats),
        "statistical_analysis": analysis_to_json(&c.analysis.statistical_analysis),
        "qualitative_feedback": feedback_to_json(&c.analysis.qualitative_feedback),
        "recommendations": c.analysis.recommendations,
        "insights": c.insights,
        "generated_at": timestamp_js(&c.generated_at),
    })
}

// ******** Command line entry point *********

fn make_insight_generator(command: &Option<Vec<String>>) -> ReportResult<Box<dyn InsightGenerator>> {
    match command.as_deref() {
        None | Some([]) => Ok(Box::new(NoInsightGenerator {})),
        Some([program, args @ ..]) if !program.is_empty() => {
            Ok(Box::new(CommandInsightGenerator::new(program, args)))
        }
        Some(x) => InvalidConfigSnafu {
            message: format!("invalid insight command: {:?}", x),
        }
        .fail(),
    }
}

fn write_output(out: &Option<String>, contents: &str) -> ReportResult<()> {
    match out.as_deref() {
        None | Some("stdout") => {
            println!("{}", contents);
        }
        Some(path) => {
            info!("Writing report to {:?}", path);
            fs::write(path, contents).context(WritingOutputSnafu { path })?;
        }
    }
    Ok(())
}

fn strip_timestamp(js: &JSValue) -> JSValue {
    let mut res = js.clone();
    if let Some(obj) = res.as_object_mut() {
        obj.remove("generated_at");
    }
    res
}

/// Compares a report with a reference report. The generation timestamps are ignored.
pub fn check_reference(report_data: &str, reference: &JSValue) -> ReportResult<()> {
    let report_js: JSValue = serde_json::from_str(report_data).context(ParsingJsonSnafu {})?;
    let pretty_report =
        serde_json::to_string_pretty(&strip_timestamp(&report_js)).context(ParsingJsonSnafu {})?;
    let pretty_reference =
        serde_json::to_string_pretty(&strip_timestamp(reference)).context(ParsingJsonSnafu {})?;
    if pretty_reference != pretty_report {
        warn!("Found differences with the reference report");
        print_diff(pretty_reference.as_str(), pretty_report.as_str(), "\n");
        return ReferenceMismatchSnafu {}.fail();
    }
    Ok(())
}

pub fn run_report(args: &Args) -> ReportResult<()> {
    let config = match &args.config {
        Some(path) => read_config(path)?,
        None => ReportConfig::default(),
    };
    debug!("run_report: config: {:?}", config);

    let rules = validate_rules(&config.rules)?;
    let ttl = cache_ttl(&config)?;

    let db_path = args
        .database
        .clone()
        .or_else(|| config.database.clone())
        .unwrap_or_else(|| DEFAULT_DATABASE.to_string());
    info!("Opening database {:?}", db_path);
    let store = SqliteStore::open(&db_path)?;

    if let Some(seed_path) = &args.seed {
        let dataset = io_seed::read_seed(seed_path)?;
        io_seed::apply_seed(&store, &dataset)?;
    }

    let evaluation_id = match args.evaluation {
        Some(x) => x,
        None if args.seed.is_some() => {
            info!("No evaluation requested, stopping after loading the seed");
            return Ok(());
        }
        None => whatever!("No evaluation specified (use --evaluation)"),
    };

    if args.history {
        for r in store.list_reports(evaluation_id, ReportType::Sensory)? {
            println!(
                "{}\t{}\t{}\t{}\tvalid={}",
                r.id,
                r.report_type.as_str(),
                timestamp_js(&r.generated_at),
                timestamp_js(&r.expires_at),
                r.is_valid
            );
        }
        return Ok(());
    }

    let command = args
        .insight_command
        .clone()
        .or_else(|| config.insight_command.clone());
    let insight_generator = make_insight_generator(&command)?;

    let cache = ReportCache::new(&store, insight_generator.as_ref())
        .with_rules(rules)
        .with_ttl(ttl);
    let report = cache.generate_report(evaluation_id, args.force)?;
    info!(
        "Report {} for evaluation {} generated at {}",
        report.id,
        evaluation_id,
        timestamp_js(&report.generated_at)
    );

    write_output(&args.out, &report.report_data)?;

    // The reference report, if provided for comparison
    if let Some(reference_path) = &args.reference {
        let reference = read_reference(reference_path)?;
        check_reference(&report.report_data, &reference)?;
        info!("The report matches the reference {:?}", reference_path);
    }
    Ok(())
}
