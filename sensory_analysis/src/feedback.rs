use log::debug;

use crate::config::*;

// Keywords are matched as lowercase substrings. The two lists are checked
// independently: "no me gusta" is both positive ("me gusta") and negative.
const POSITIVE_KEYWORDS: &[&str] = &[
    "bueno",
    "buena",
    "excelente",
    "mejor",
    "me gusta",
    "rico",
    "agradable",
    "delicioso",
];

const NEGATIVE_KEYWORDS: &[&str] = &[
    "malo",
    "mala",
    "peor",
    "regular",
    "no me gusta",
    "mejorar",
    "desagradable",
];

const COMMON_THEMES: &[&str] = &["Sabor", "Textura", "Aroma", "Apariencia"];

fn contains_any(comment: &str, keywords: &[&str]) -> bool {
    let lowered = comment.to_lowercase();
    keywords.iter().any(|k| lowered.contains(k))
}

/// Buckets the comments of the panelists into positive and negative remarks.
///
/// Comments are kept in the order they are encountered, up to `rules.max_comments`
/// per bucket. A comment may land in both buckets, or in none.
pub fn extract_feedback(
    evaluations: &[PanelistEvaluation],
    rules: &AnalysisRules,
) -> QualitativeFeedback {
    let comments: Vec<&str> = evaluations
        .iter()
        .flat_map(|ev| ev.preferences.iter())
        .filter_map(|p| p.reason.as_deref())
        .filter(|r| !r.is_empty())
        .collect();
    debug!("extract_feedback: {:?} comments", comments.len());

    let top_positive_comments: Vec<String> = comments
        .iter()
        .filter(|c| contains_any(c, POSITIVE_KEYWORDS))
        .take(rules.max_comments)
        .map(|c| c.to_string())
        .collect();
    let top_negative_comments: Vec<String> = comments
        .iter()
        .filter(|c| contains_any(c, NEGATIVE_KEYWORDS))
        .take(rules.max_comments)
        .map(|c| c.to_string())
        .collect();

    QualitativeFeedback {
        top_positive_comments,
        top_negative_comments,
        common_themes: COMMON_THEMES.iter().map(|s| s.to_string()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;

    fn panel_with_comments(comments: &[&str]) -> Builder {
        let mut builder = Builder::new(1)
            .unwrap()
            .products(&["A".to_string()])
            .unwrap();
        for (idx, c) in comments.iter().enumerate() {
            builder
                .add_ranking(
                    &format!("p{}", idx),
                    &[("A".to_string(), Some(c.to_string()))],
                )
                .unwrap();
        }
        builder
    }

    #[test]
    fn buckets_are_independent() {
        let builder = panel_with_comments(&[
            "Muy BUENO",
            "sabor regular",
            "No me gusta la textura",
            "",
            "sin opinión",
        ]);
        let fb = extract_feedback(builder.evaluation_list(), &AnalysisRules::DEFAULT_RULES);
        assert_eq!(
            fb.top_positive_comments,
            vec!["Muy BUENO".to_string(), "No me gusta la textura".to_string()]
        );
        assert_eq!(
            fb.top_negative_comments,
            vec![
                "sabor regular".to_string(),
                "No me gusta la textura".to_string()
            ]
        );
        assert_eq!(fb.common_themes, vec!["Sabor", "Textura", "Aroma", "Apariencia"]);
    }

    #[test]
    fn keeps_first_comments_in_order() {
        let builder = panel_with_comments(&[
            "rico 1", "rico 2", "malo 1", "rico 3", "rico 4", "rico 5", "rico 6",
        ]);
        let fb = extract_feedback(builder.evaluation_list(), &AnalysisRules::DEFAULT_RULES);
        assert_eq!(
            fb.top_positive_comments,
            vec!["rico 1", "rico 2", "rico 3", "rico 4", "rico 5"]
        );
        assert_eq!(fb.top_negative_comments, vec!["malo 1"]);
    }

    #[test]
    fn no_comments() {
        let fb = extract_feedback(&[], &AnalysisRules::DEFAULT_RULES);
        assert!(fb.top_positive_comments.is_empty());
        assert!(fb.top_negative_comments.is_empty());
        assert_eq!(fb.common_themes.len(), 4);
    }
}
