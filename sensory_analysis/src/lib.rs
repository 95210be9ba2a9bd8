mod config;
mod feedback;
mod recommendations;

pub mod builder;
pub mod manual;

use log::{debug, info};

use std::collections::HashMap;

pub use crate::config::*;
pub use crate::feedback::extract_feedback;
pub use crate::recommendations::synthesize_recommendations;

/// Position assumed for a product that nobody placed. It is the worst
/// tabulated position, which keeps unplaced products at the end of the ranking.
pub const UNPLACED_AVERAGE_POSITION: f64 = 3.0;

const INTERPRETATION_SIGNIFICANT: &str =
    "Existen diferencias estadísticamente significativas en la preferencia entre los productos (p < 0.05).";
const INTERPRETATION_NOT_SIGNIFICANT: &str =
    "No se encontraron diferencias estadísticamente significativas en la preferencia entre los productos (p ≥ 0.05).";
const INTERPRETATION_INSUFFICIENT: &str =
    "Datos insuficientes para el análisis estadístico: se requieren al menos 3 productos y 3 panelistas.";

impl AnalysisRules {
    /// Checks that the rules can be applied.
    pub fn check(&self) -> Result<(), AnalysisErrors> {
        if self.min_products < 2 {
            return Err(AnalysisErrors::InvalidRules(format!(
                "min_products must be at least 2, got {}",
                self.min_products
            )));
        }
        if self.max_comments == 0 {
            return Err(AnalysisErrors::InvalidRules(
                "max_comments must be positive".to_string(),
            ));
        }
        if !self.pairwise_threshold.is_finite() || self.pairwise_threshold < 0.0 {
            return Err(AnalysisErrors::InvalidRules(format!(
                "pairwise_threshold must be a non-negative number, got {}",
                self.pairwise_threshold
            )));
        }
        if self.flagship_threshold > self.review_threshold {
            return Err(AnalysisErrors::InvalidRules(format!(
                "flagship_threshold {} is above review_threshold {}",
                self.flagship_threshold, self.review_threshold
            )));
        }
        Ok(())
    }
}

/// Runs the full analysis of one evaluation.
///
/// Arguments:
/// * `products` the registered products of the evaluation
/// * `evaluations` the submissions of the panelists. Each submission counts as one panelist.
/// * `rules` the thresholds of the analysis
pub fn run_sensory_analysis(
    products: &[Product],
    evaluations: &[PanelistEvaluation],
    rules: &AnalysisRules,
) -> Result<SensoryAnalysis, AnalysisErrors> {
    info!(
        "run_sensory_analysis: processing {:?} submissions over {:?} products",
        evaluations.len(),
        products.len()
    );
    rules.check()?;
    if evaluations.is_empty() {
        return Err(AnalysisErrors::NoResponses);
    }

    let preference_stats = aggregate_preferences(products, evaluations);
    let statistical_analysis =
        analyze_significance(&preference_stats, evaluations.len(), rules);
    let qualitative_feedback = extract_feedback(evaluations, rules);
    let recommendations =
        synthesize_recommendations(&preference_stats, &statistical_analysis, rules);

    info!(
        "run_sensory_analysis: chi_square: {:.3} significant: {:?}",
        statistical_analysis.friedman_test.chi_square, statistical_analysis.overall_significance
    );
    Ok(SensoryAnalysis {
        preference_stats,
        statistical_analysis,
        qualitative_feedback,
        recommendations,
    })
}

/// Tallies the positions given to each product.
///
/// Every product gets an entry, even without any vote. Preferences that refer to
/// an unknown product or to a position outside 1..=3 are skipped.
/// The result is sorted by increasing average position (best first). Products with
/// the same average position keep their input order.
pub fn aggregate_preferences(
    products: &[Product],
    evaluations: &[PanelistEvaluation],
) -> Vec<PreferenceStats> {
    let mut stats: Vec<PreferenceStats> = products
        .iter()
        .map(|p| PreferenceStats {
            product_id: p.id,
            product_name: p.name.clone(),
            first_place_count: 0,
            second_place_count: 0,
            third_place_count: 0,
            total_votes: 0,
            percentage: 0.0,
            average_position: UNPLACED_AVERAGE_POSITION,
        })
        .collect();
    // If the same id is registered twice, the first registration wins.
    let mut index_by_id: HashMap<RecordId, usize> = HashMap::new();
    for (idx, p) in products.iter().enumerate() {
        index_by_id.entry(p.id).or_insert(idx);
    }

    for ev in evaluations.iter() {
        for pref in ev.preferences.iter() {
            let entry = match index_by_id.get(&pref.product_id) {
                Some(&idx) => &mut stats[idx],
                None => {
                    debug!(
                        "aggregate_preferences: submission {:?}: skipping unknown product {:?}",
                        ev.id, pref.product_id
                    );
                    continue;
                }
            };
            match pref.position {
                1 => entry.first_place_count += 1,
                2 => entry.second_place_count += 1,
                3 => entry.third_place_count += 1,
                x => {
                    debug!(
                        "aggregate_preferences: submission {:?}: ignoring position {:?}",
                        ev.id, x
                    );
                    continue;
                }
            }
            entry.total_votes += 1;
        }
    }

    let total_panelists = evaluations.len();
    for s in stats.iter_mut() {
        s.percentage = if total_panelists == 0 {
            0.0
        } else {
            (s.total_votes as f64 / total_panelists as f64) * 100.0
        };
        if s.total_votes > 0 {
            let weighted =
                s.first_place_count + 2 * s.second_place_count + 3 * s.third_place_count;
            s.average_position = weighted as f64 / s.total_votes as f64;
        }
    }

    // sort_by is stable: ties keep the product order.
    stats.sort_by(|a, b| a.average_position.total_cmp(&b.average_position));
    debug!("aggregate_preferences: stats: {:?}", stats);
    stats
}

/// The chi-square critical value at alpha = 0.05 for the given degrees of freedom.
///
/// Tabulated up to 10 degrees of freedom, approximated as `2.5 * df` above.
pub fn critical_value(degrees_of_freedom: u32) -> f64 {
    match degrees_of_freedom {
        1 => 3.84,
        2 => 5.99,
        3 => 7.81,
        4 => 9.49,
        5 => 11.07,
        6 => 12.59,
        7 => 14.07,
        8 => 15.51,
        9 => 16.92,
        10 => 18.31,
        df => df as f64 * 2.5,
    }
}

/// Friedman test over the aggregated rankings, and pairwise comparisons.
///
/// The statistic uses the average position of each product as its mean rank, in a
/// single pass. It is an approximation of the test computed over the full rank
/// matrix. The p-value is a proxy: 0.01 for a significant result, 0.15 otherwise.
///
/// Below `rules.min_products` products or `rules.min_panelists` panelists, a
/// non-significant result is returned without computing anything.
pub fn analyze_significance(
    stats: &[PreferenceStats],
    panelist_count: usize,
    rules: &AnalysisRules,
) -> StatisticalAnalysis {
    let k = stats.len();
    let n = panelist_count;
    let degrees_of_freedom = k.saturating_sub(1) as u32;
    let critical = critical_value(degrees_of_freedom);

    if k < rules.min_products || n < rules.min_panelists {
        debug!(
            "analyze_significance: not enough data: {:?} products, {:?} panelists",
            k, n
        );
        return StatisticalAnalysis {
            friedman_test: FriedmanTest {
                chi_square: 0.0,
                degrees_of_freedom,
                p_value: 1.0,
                significant: false,
                critical_value: critical,
                interpretation: INTERPRETATION_INSUFFICIENT.to_string(),
            },
            pairwise_comparisons: Vec::new(),
            overall_significance: false,
        };
    }

    let kf = k as f64;
    let mean_rank = (kf + 1.0) / 2.0;
    let sum_squares: f64 = stats
        .iter()
        .map(|s| (s.average_position - mean_rank).powi(2))
        .sum();
    let chi_square = (12.0 * n as f64 / (kf * (kf + 1.0))) * sum_squares;
    let significant = chi_square > critical;
    debug!(
        "analyze_significance: chi_square: {:?} df: {:?} critical: {:?}",
        chi_square, degrees_of_freedom, critical
    );

    let mut pairwise_comparisons: Vec<PairwiseComparison> = Vec::new();
    for (idx, a) in stats.iter().enumerate() {
        for b in stats[idx + 1..].iter() {
            let difference_significant =
                (a.average_position - b.average_position).abs() > rules.pairwise_threshold;
            pairwise_comparisons.push(PairwiseComparison {
                product_a: a.product_name.clone(),
                product_b: b.product_name.clone(),
                difference_significant,
                confidence_level: if difference_significant { 95 } else { 80 },
            });
        }
    }

    StatisticalAnalysis {
        friedman_test: FriedmanTest {
            chi_square,
            degrees_of_freedom,
            p_value: if significant { 0.01 } else { 0.15 },
            significant,
            critical_value: critical,
            interpretation: if significant {
                INTERPRETATION_SIGNIFICANT.to_string()
            } else {
                INTERPRETATION_NOT_SIGNIFICANT.to_string()
            },
        },
        pairwise_comparisons,
        overall_significance: significant,
    }
}
