pub use crate::config::*;

/// A builder for registering products and panelist rankings.
///
/// Identifiers are assigned in insertion order, starting at 1.
///
/// ```
/// pub use sensory_analysis::builder::Builder;
/// # use sensory_analysis::AnalysisErrors;
///
/// let mut builder = Builder::new(1)?
///     .products(&["Sample 101".to_string(), "Sample 202".to_string()])?;
///
/// builder.add_ranking_simple("panelist-1", &["Sample 202".to_string(), "Sample 101".to_string()])?;
///
/// # Ok::<(), AnalysisErrors>(())
/// ```
pub struct Builder {
    pub(crate) _evaluation_id: RecordId,
    pub(crate) _products: Vec<Product>,
    pub(crate) _evaluations: Vec<PanelistEvaluation>,
}

impl Builder {
    pub fn new(evaluation_id: RecordId) -> Result<Builder, AnalysisErrors> {
        Ok(Builder {
            _evaluation_id: evaluation_id,
            _products: Vec::new(),
            _evaluations: Vec::new(),
        })
    }

    /// Registers the products, in presentation order. Previous rankings are dropped.
    pub fn products(self, names: &[String]) -> Result<Builder, AnalysisErrors> {
        let evaluation_id = self._evaluation_id;
        Ok(Builder {
            _evaluation_id: evaluation_id,
            _products: names
                .iter()
                .enumerate()
                .map(|(idx, name)| Product {
                    id: (idx + 1) as RecordId,
                    evaluation_id,
                    name: name.clone(),
                    code: None,
                    description: None,
                    position: (idx + 1) as u32,
                    is_deleted: false,
                })
                .collect(),
            _evaluations: Vec::new(),
        })
    }

    /// Adds the ranking of a panelist, from the most preferred product to the least preferred.
    pub fn add_ranking_simple(
        &mut self,
        panelist_id: &str,
        ranking: &[String],
    ) -> Result<(), AnalysisErrors> {
        let with_reasons: Vec<(String, Option<String>)> =
            ranking.iter().map(|name| (name.clone(), None)).collect();
        self.add_ranking(panelist_id, &with_reasons)
    }

    /// Adds the ranking of a panelist, with an optional comment for each product.
    ///
    /// ranking: the product names in order of preference. Every name must have been
    /// registered with `products`.
    pub fn add_ranking(
        &mut self,
        panelist_id: &str,
        ranking: &[(String, Option<String>)],
    ) -> Result<(), AnalysisErrors> {
        let mut preferences: Vec<Preference> = Vec::new();
        for (idx, (name, reason)) in ranking.iter().enumerate() {
            let product = self
                ._products
                .iter()
                .find(|p| p.name == *name)
                .ok_or_else(|| AnalysisErrors::UnknownProduct(name.clone()))?;
            preferences.push(Preference {
                product_id: product.id,
                position: (idx + 1) as u32,
                reason: reason.clone(),
            });
        }
        let id = (self._evaluations.len() + 1) as RecordId;
        self.add_evaluation(&PanelistEvaluation {
            id,
            evaluation_id: self._evaluation_id,
            panelist_id: panelist_id.to_string(),
            panelist_name: None,
            panelist_email: None,
            preferences,
            submitted_at: String::new(),
            is_deleted: false,
        })
    }

    pub fn add_evaluation(&mut self, evaluation: &PanelistEvaluation) -> Result<(), AnalysisErrors> {
        self._evaluations.push(evaluation.clone());
        Ok(())
    }

    pub fn product_list(&self) -> &[Product] {
        &self._products
    }

    pub fn evaluation_list(&self) -> &[PanelistEvaluation] {
        &self._evaluations
    }

    pub fn build(self) -> (Vec<Product>, Vec<PanelistEvaluation>) {
        (self._products, self._evaluations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rankings_get_consecutive_positions() {
        let mut builder = Builder::new(3)
            .unwrap()
            .products(&["A".to_string(), "B".to_string()])
            .unwrap();
        builder
            .add_ranking(
                "p1",
                &[
                    ("B".to_string(), Some("muy bueno".to_string())),
                    ("A".to_string(), None),
                ],
            )
            .unwrap();
        let (products, evaluations) = builder.build();
        assert_eq!(products[1].id, 2);
        assert_eq!(products[1].evaluation_id, 3);
        let prefs = &evaluations[0].preferences;
        assert_eq!(prefs[0].product_id, 2);
        assert_eq!(prefs[0].position, 1);
        assert_eq!(prefs[0].reason.as_deref(), Some("muy bueno"));
        assert_eq!(prefs[1].product_id, 1);
        assert_eq!(prefs[1].position, 2);
    }

    #[test]
    fn unknown_product_is_rejected() {
        let mut builder = Builder::new(3)
            .unwrap()
            .products(&["A".to_string()])
            .unwrap();
        let res = builder.add_ranking_simple("p1", &["Q".to_string()]);
        assert_eq!(res, Err(AnalysisErrors::UnknownProduct("Q".to_string())));
        assert!(builder.evaluation_list().is_empty());
    }
}
