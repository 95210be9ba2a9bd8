use crate::config::*;

/// Produces the recommendation lines of a report.
///
/// `stats` is expected in ranking order (best product first), as returned by
/// `aggregate_preferences`.
pub fn synthesize_recommendations(
    stats: &[PreferenceStats],
    analysis: &StatisticalAnalysis,
    rules: &AnalysisRules,
) -> Vec<String> {
    let mut res: Vec<String> = Vec::new();

    if let Some(top) = stats.first() {
        res.push(format!(
            "{} es el producto preferido, elegido por el {:.1}% de los panelistas.",
            top.product_name, top.percentage
        ));
    }

    if analysis.overall_significance {
        res.push(
            "Las diferencias de preferencia entre los productos son estadísticamente significativas."
                .to_string(),
        );
    } else {
        res.push(
            "Las diferencias de preferencia entre los productos no son estadísticamente significativas; considere ampliar el panel."
                .to_string(),
        );
    }

    for s in stats.iter() {
        if s.average_position < rules.flagship_threshold {
            res.push(format!(
                "Promover {} como producto insignia (posición promedio {:.2}).",
                s.product_name, s.average_position
            ));
        } else if s.average_position > rules.review_threshold {
            res.push(format!(
                "Revisar la formulación de {} (posición promedio {:.2}).",
                s.product_name, s.average_position
            ));
        }
    }
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze_significance;

    fn stats_for(name: &str, percentage: f64, average_position: f64) -> PreferenceStats {
        PreferenceStats {
            product_id: 0,
            product_name: name.to_string(),
            first_place_count: 0,
            second_place_count: 0,
            third_place_count: 0,
            total_votes: 0,
            percentage,
            average_position,
        }
    }

    #[test]
    fn lines_follow_ranking() {
        let stats = vec![
            stats_for("A", 66.666, 1.4),
            stats_for("B", 50.0, 2.0),
            stats_for("C", 50.0, 2.5),
            stats_for("D", 25.0, 2.75),
        ];
        let analysis = analyze_significance(&stats, 2, &AnalysisRules::DEFAULT_RULES);
        let res = synthesize_recommendations(&stats, &analysis, &AnalysisRules::DEFAULT_RULES);
        assert_eq!(
            res,
            vec![
                "A es el producto preferido, elegido por el 66.7% de los panelistas.".to_string(),
                "Las diferencias de preferencia entre los productos no son estadísticamente significativas; considere ampliar el panel.".to_string(),
                "Promover A como producto insignia (posición promedio 1.40).".to_string(),
                "Revisar la formulación de D (posición promedio 2.75).".to_string(),
            ]
        );
    }

    #[test]
    fn significance_line_without_products() {
        let analysis = analyze_significance(&[], 0, &AnalysisRules::DEFAULT_RULES);
        let res = synthesize_recommendations(&[], &analysis, &AnalysisRules::DEFAULT_RULES);
        assert_eq!(res.len(), 1);
        assert!(res[0].contains("no son estadísticamente significativas"));
    }
}
