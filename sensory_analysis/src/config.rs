// ********* Input data structures ***********

use std::error::Error;
use std::fmt::Display;

/// Identifier of a row in the relational store.
pub type RecordId = i64;

/// One sample under test in an evaluation.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Product {
    pub id: RecordId,
    pub evaluation_id: RecordId,
    pub name: String,
    pub code: Option<String>,
    pub description: Option<String>,
    /// Presentation order of the sample, starting at 1.
    pub position: u32,
    pub is_deleted: bool,
}

/// The place given by a panelist to one product.
///
/// Position 1 is the most preferred product. Only the positions 1, 2 and 3 are
/// tabulated, any other value is carried but ignored by the aggregation.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Preference {
    pub product_id: RecordId,
    pub position: u32,
    pub reason: Option<String>,
}

/// The full ranking submitted by one panelist for one evaluation.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct PanelistEvaluation {
    pub id: RecordId,
    pub evaluation_id: RecordId,
    pub panelist_id: String,
    pub panelist_name: Option<String>,
    pub panelist_email: Option<String>,
    pub preferences: Vec<Preference>,
    /// RFC 3339 timestamp, as recorded by the store.
    pub submitted_at: String,
    pub is_deleted: bool,
}

// ******** Output data structures *********

/// Ranking statistics for one product.
#[derive(PartialEq, Debug, Clone)]
pub struct PreferenceStats {
    pub product_id: RecordId,
    pub product_name: String,
    pub first_place_count: u64,
    pub second_place_count: u64,
    pub third_place_count: u64,
    pub total_votes: u64,
    /// Share of the panelists that placed this product, in percent.
    pub percentage: f64,
    /// Vote-weighted mean position. Lower is better, 3 when nobody placed the product.
    pub average_position: f64,
}

#[derive(PartialEq, Debug, Clone)]
pub struct FriedmanTest {
    pub chi_square: f64,
    pub degrees_of_freedom: u32,
    pub p_value: f64,
    pub significant: bool,
    pub critical_value: f64,
    pub interpretation: String,
}

#[derive(PartialEq, Debug, Clone)]
pub struct PairwiseComparison {
    pub product_a: String,
    pub product_b: String,
    pub difference_significant: bool,
    pub confidence_level: u32,
}

#[derive(PartialEq, Debug, Clone)]
pub struct StatisticalAnalysis {
    pub friedman_test: FriedmanTest,
    pub pairwise_comparisons: Vec<PairwiseComparison>,
    pub overall_significance: bool,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct QualitativeFeedback {
    pub top_positive_comments: Vec<String>,
    pub top_negative_comments: Vec<String>,
    pub common_themes: Vec<String>,
}

/// Everything computed from the raw submissions of one evaluation.
#[derive(PartialEq, Debug, Clone)]
pub struct SensoryAnalysis {
    pub preference_stats: Vec<PreferenceStats>,
    pub statistical_analysis: StatisticalAnalysis,
    pub qualitative_feedback: QualitativeFeedback,
    pub recommendations: Vec<String>,
}

/// Errors that prevent the analysis from completing.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum AnalysisErrors {
    /// No panelist submission was provided.
    NoResponses,
    /// A ranking refers to a product that was not registered.
    UnknownProduct(String),
    /// The rules cannot be applied (for example a zero comment limit).
    InvalidRules(String),
}

impl Error for AnalysisErrors {}

impl Display for AnalysisErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisErrors::NoResponses => write!(f, "the evaluation has no responses"),
            AnalysisErrors::UnknownProduct(name) => write!(f, "unknown product: {}", name),
            AnalysisErrors::InvalidRules(msg) => write!(f, "invalid analysis rules: {}", msg),
        }
    }
}

// ********* Configuration **********

/// The thresholds that drive the analysis.
///
/// The defaults are the values the reports have always been produced with.
/// Changing them changes the observable content of the reports.
#[derive(PartialEq, Debug, Clone)]
pub struct AnalysisRules {
    /// Below this number of products, the Friedman test is not attempted.
    pub min_products: usize,
    /// Below this number of panelists, the Friedman test is not attempted.
    pub min_panelists: usize,
    /// Difference of average positions above which two products are declared different.
    pub pairwise_threshold: f64,
    /// Maximum number of comments kept per bucket.
    pub max_comments: usize,
    /// Average position strictly below which a product is proposed as flagship.
    pub flagship_threshold: f64,
    /// Average position strictly above which a product formulation should be reviewed.
    pub review_threshold: f64,
}

impl AnalysisRules {
    pub const DEFAULT_RULES: AnalysisRules = AnalysisRules {
        min_products: 3,
        min_panelists: 3,
        pairwise_threshold: 0.5,
        max_comments: 5,
        flagship_threshold: 2.0,
        review_threshold: 2.5,
    };
}

impl Default for AnalysisRules {
    fn default() -> Self {
        AnalysisRules::DEFAULT_RULES
    }
}
