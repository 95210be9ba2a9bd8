//! Report generation with a persisted cache.
//!
//! For each evaluation, the cache holds a history of reports. A report is served
//! again until it expires or is invalidated. Forcing a regeneration invalidates
//! every stored report of the evaluation and inserts a new one.
//!
//! Concurrent misses for the same evaluation are not coordinated: both requests
//! generate and insert a report, and the most recent one is served afterwards.

use crate::report::insights::{fallback_insights, InsightContext, InsightGenerator};
use crate::report::store::{GeneratedReport, NewReport, ReportStore, ReportType};
use crate::report::*;

use crate::report::config_reader::DEFAULT_CACHE_TTL_DAYS;

pub struct ReportCache<'a> {
    store: &'a dyn ReportStore,
    insights: &'a dyn InsightGenerator,
    rules: AnalysisRules,
    ttl: chrono::Duration,
}

impl<'a> ReportCache<'a> {
    pub fn new(store: &'a dyn ReportStore, insights: &'a dyn InsightGenerator) -> ReportCache<'a> {
        ReportCache {
            store,
            insights,
            rules: AnalysisRules::DEFAULT_RULES,
            ttl: chrono::Duration::days(DEFAULT_CACHE_TTL_DAYS),
        }
    }

    pub fn with_rules(self, rules: AnalysisRules) -> ReportCache<'a> {
        ReportCache { rules, ..self }
    }

    pub fn with_ttl(self, ttl: chrono::Duration) -> ReportCache<'a> {
        ReportCache { ttl, ..self }
    }

    pub fn generate_report(
        &self,
        evaluation_id: RecordId,
        force_regenerate: bool,
    ) -> ReportResult<GeneratedReport> {
        self.generate_report_at(evaluation_id, force_regenerate, Utc::now())
    }

    /// Returns the cached sensory report of the evaluation, or generates a new one.
    ///
    /// `now` is the reference time for expiry checks and for the new report.
    pub fn generate_report_at(
        &self,
        evaluation_id: RecordId,
        force_regenerate: bool,
        now: DateTime<Utc>,
    ) -> ReportResult<GeneratedReport> {
        let report_type = ReportType::Sensory;
        if force_regenerate {
            let n = self.store.invalidate_reports(evaluation_id, report_type)?;
            info!(
                "generate_report: evaluation {}: invalidated {} cached reports",
                evaluation_id, n
            );
        } else if let Some(cached) =
            self.store
                .latest_valid_report(evaluation_id, report_type, now)?
        {
            info!(
                "generate_report: evaluation {}: serving cached report {}",
                evaluation_id, cached.id
            );
            return Ok(cached);
        }

        let evaluations = self.store.load_evaluations(evaluation_id)?;
        if evaluations.is_empty() {
            return NotFoundSnafu { evaluation_id }.fail();
        }
        let products = self.store.load_products(evaluation_id)?;
        let evaluation_title = self
            .store
            .evaluation_title(evaluation_id)?
            .unwrap_or_else(|| format!("Evaluación {}", evaluation_id));

        let analysis = match run_sensory_analysis(&products, &evaluations, &self.rules) {
            Ok(x) => x,
            Err(AnalysisErrors::NoResponses) => {
                return NotFoundSnafu { evaluation_id }.fail();
            }
            Err(e) => return Err(ReportError::Analysis { source: e }),
        };

        let context = InsightContext {
            evaluations: &evaluations,
            products: &products,
            stats: &analysis.preference_stats,
            analysis: &analysis.statistical_analysis,
        };
        let insights = match self.insights.generate(&context) {
            Ok(x) => x,
            Err(e) => {
                warn!(
                    "generate_report: evaluation {}: insight generation failed, using fallback: {}",
                    evaluation_id, e
                );
                fallback_insights()
            }
        };

        let report_js = build_report_js(&ReportContents {
            evaluation_id,
            evaluation_title,
            products: &products,
            evaluations: &evaluations,
            analysis: &analysis,
            insights: &insights,
            generated_at: now,
        });
        let report_data = serde_json::to_string(&report_js).context(ParsingJsonSnafu {})?;

        let expires_at = match now.checked_add_signed(self.ttl) {
            Some(x) => x,
            None => {
                return InvalidConfigSnafu {
                    message: format!("cache lifetime out of range: {}", self.ttl),
                }
                .fail()
            }
        };
        self.store.insert_report(&NewReport {
            evaluation_id,
            report_type,
            report_data: &report_data,
            generated_at: now,
            expires_at,
        })
    }
}
