use crate::report::*;

use serde::{Deserialize, Serialize};

/// Default lifetime of a cached report.
pub const DEFAULT_CACHE_TTL_DAYS: i64 = 30;

#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportRules {
    #[serde(rename = "minProducts")]
    pub min_products: Option<usize>,
    #[serde(rename = "minPanelists")]
    pub min_panelists: Option<usize>,
    #[serde(rename = "pairwiseThreshold")]
    pub pairwise_threshold: Option<f64>,
    #[serde(rename = "maxComments")]
    pub max_comments: Option<usize>,
    #[serde(rename = "flagshipThreshold")]
    pub flagship_threshold: Option<f64>,
    #[serde(rename = "reviewThreshold")]
    pub review_threshold: Option<f64>,
}

#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportConfig {
    pub database: Option<String>,
    #[serde(rename = "cacheTtlDays")]
    pub cache_ttl_days: Option<i64>,
    #[serde(rename = "insightCommand")]
    pub insight_command: Option<Vec<String>>,
    pub rules: Option<ReportRules>,
}

pub fn read_config(path: &str) -> ReportResult<ReportConfig> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let config: ReportConfig =
        serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
    Ok(config)
}

pub fn read_reference(path: &str) -> ReportResult<JSValue> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let js: JSValue = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
    Ok(js)
}

/// Fills the missing rules with the defaults and checks the result.
pub fn validate_rules(rules: &Option<ReportRules>) -> ReportResult<AnalysisRules> {
    let d = AnalysisRules::DEFAULT_RULES;
    let res = match rules {
        None => d,
        Some(r) => AnalysisRules {
            min_products: r.min_products.unwrap_or(d.min_products),
            min_panelists: r.min_panelists.unwrap_or(d.min_panelists),
            pairwise_threshold: r.pairwise_threshold.unwrap_or(d.pairwise_threshold),
            max_comments: r.max_comments.unwrap_or(d.max_comments),
            flagship_threshold: r.flagship_threshold.unwrap_or(d.flagship_threshold),
            review_threshold: r.review_threshold.unwrap_or(d.review_threshold),
        },
    };
    if let Err(e) = res.check() {
        return InvalidConfigSnafu {
            message: e.to_string(),
        }
        .fail();
    }
    Ok(res)
}

pub fn cache_ttl(config: &ReportConfig) -> ReportResult<chrono::Duration> {
    match config.cache_ttl_days {
        None => Ok(chrono::Duration::days(DEFAULT_CACHE_TTL_DAYS)),
        Some(days) if days > 0 => match chrono::Duration::try_days(days) {
            Some(ttl) => Ok(ttl),
            None => InvalidConfigSnafu {
                message: format!("cacheTtlDays is too large: {}", days),
            }
            .fail(),
        },
        Some(days) => InvalidConfigSnafu {
            message: format!("cacheTtlDays must be positive, got {}", days),
        }
        .fail(),
    }
}
