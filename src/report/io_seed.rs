// Loading of evaluation datasets described in JSON.

use crate::report::store::SqliteStore;
use crate::report::*;

use serde::{Deserialize, Serialize};

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct SeedEvaluation {
    pub id: RecordId,
    pub title: String,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct SeedProduct {
    pub id: RecordId,
    pub name: String,
    pub code: Option<String>,
    pub description: Option<String>,
    pub position: Option<u32>,
    #[serde(rename = "isDeleted")]
    pub is_deleted: Option<bool>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct SeedPreference {
    #[serde(rename = "productId")]
    pub product_id: RecordId,
    pub position: u32,
    pub reason: Option<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct SeedPanelist {
    pub id: Option<RecordId>,
    #[serde(rename = "panelistId")]
    pub panelist_id: String,
    #[serde(rename = "panelistName")]
    pub panelist_name: Option<String>,
    #[serde(rename = "panelistEmail")]
    pub panelist_email: Option<String>,
    pub preferences: Vec<SeedPreference>,
    #[serde(rename = "submittedAt")]
    pub submitted_at: Option<String>,
    #[serde(rename = "isDeleted")]
    pub is_deleted: Option<bool>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct SeedDataset {
    pub evaluation: SeedEvaluation,
    pub products: Vec<SeedProduct>,
    pub panelists: Vec<SeedPanelist>,
}

pub fn read_seed(path: &str) -> ReportResult<SeedDataset> {
    info!("Attempting to read seed file {:?}", path);
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    parse_seed(&contents)
}

pub fn parse_seed(contents: &str) -> ReportResult<SeedDataset> {
    let dataset: SeedDataset = serde_json::from_str(contents).context(ParsingJsonSnafu {})?;
    let mut seen: HashSet<RecordId> = HashSet::new();
    for p in dataset.products.iter() {
        if !seen.insert(p.id) {
            whatever!("Duplicate product id {} in the seed", p.id);
        }
    }
    Ok(dataset)
}

/// Writes the dataset into the store, in a single transaction.
///
/// Rows with the same ids are replaced, as long as they belong to the same
/// evaluation. An id that belongs to another evaluation is an error, and nothing
/// is written.
pub fn apply_seed(store: &SqliteStore, dataset: &SeedDataset) -> ReportResult<()> {
    let evaluation_id = dataset.evaluation.id;
    let tx = store.transaction()?;
    store.insert_evaluation(evaluation_id, &dataset.evaluation.title)?;

    for (idx, p) in dataset.products.iter().enumerate() {
        if let Some(owner) = store.product_owner(p.id)? {
            if owner != evaluation_id {
                whatever!(
                    "Product id {} already belongs to evaluation {}, not to evaluation {}",
                    p.id,
                    owner,
                    evaluation_id
                );
            }
        }
        store.insert_product(&Product {
            id: p.id,
            evaluation_id,
            name: p.name.clone(),
            code: match p.code.clone() {
                Some(x) if x.is_empty() => None,
                x => x,
            },
            description: p.description.clone(),
            position: p.position.unwrap_or((idx + 1) as u32),
            is_deleted: p.is_deleted.unwrap_or(false),
        })?;
    }

    let default_submitted_at = timestamp_js(&Utc::now());
    for sp in dataset.panelists.iter() {
        if let Some(id) = sp.id {
            if let Some(owner) = store.submission_owner(id)? {
                if owner != evaluation_id {
                    whatever!(
                        "Submission id {} already belongs to evaluation {}, not to evaluation {}",
                        id,
                        owner,
                        evaluation_id
                    );
                }
            }
        }
        let evaluation = PanelistEvaluation {
            id: sp.id.unwrap_or(0),
            evaluation_id,
            panelist_id: sp.panelist_id.clone(),
            panelist_name: sp.panelist_name.clone(),
            panelist_email: sp.panelist_email.clone(),
            preferences: sp
                .preferences
                .iter()
                .map(|p| Preference {
                    product_id: p.product_id,
                    position: p.position,
                    reason: p.reason.clone(),
                })
                .collect(),
            submitted_at: sp
                .submitted_at
                .clone()
                .unwrap_or_else(|| default_submitted_at.clone()),
            is_deleted: sp.is_deleted.unwrap_or(false),
        };
        let id = store.insert_panelist_evaluation(sp.id, &evaluation)?;
        debug!(
            "apply_seed: evaluation {}: stored submission {} of panelist {:?}",
            evaluation_id, id, sp.panelist_id
        );
    }
    tx.commit().context(PersistenceSnafu {})?;
    info!(
        "Loaded evaluation {} with {} products and {} submissions",
        evaluation_id,
        dataset.products.len(),
        dataset.panelists.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::store::ReportStore;

    const SEED: &str = r#"{
        "evaluation": {"id": 12, "title": "Galletas de avena"},
        "products": [
            {"id": 1, "name": "Muestra 101", "code": "101"},
            {"id": 2, "name": "Muestra 202", "code": ""},
            {"id": 3, "name": "Muestra 303", "isDeleted": true}
        ],
        "panelists": [
            {"panelistId": "p-1", "submittedAt": "2024-02-01T10:00:00Z",
             "preferences": [{"productId": 1, "position": 1, "reason": "Excelente sabor"},
                             {"productId": 2, "position": 2}]},
            {"id": 40, "panelistId": "p-2", "submittedAt": "2024-02-01T11:00:00Z",
             "preferences": [{"productId": 2, "position": 1}]}
        ]
    }"#;

    #[test]
    fn seed_is_stored() {
        let store = SqliteStore::open_in_memory().unwrap();
        let dataset = parse_seed(SEED).unwrap();
        apply_seed(&store, &dataset).unwrap();

        assert_eq!(
            store.evaluation_title(12).unwrap().as_deref(),
            Some("Galletas de avena")
        );
        let products = store.load_products(12).unwrap();
        assert_eq!(products.len(), 2);
        assert_eq!(products[0].code.as_deref(), Some("101"));
        assert_eq!(products[1].code, None);
        assert_eq!(products[1].position, 2);

        let evaluations = store.load_evaluations(12).unwrap();
        assert_eq!(evaluations.len(), 2);
        assert_eq!(evaluations[0].panelist_id, "p-1");
        assert_eq!(
            evaluations[0].preferences[0].reason.as_deref(),
            Some("Excelente sabor")
        );
        assert_eq!(evaluations[1].id, 40);
    }

    #[test]
    fn seeding_twice_replaces_rows() {
        let store = SqliteStore::open_in_memory().unwrap();
        let dataset = parse_seed(SEED).unwrap();
        apply_seed(&store, &dataset).unwrap();
        apply_seed(&store, &dataset).unwrap();
        assert_eq!(store.load_products(12).unwrap().len(), 2);
        // The submission without id is appended again, the one with an id is replaced.
        assert_eq!(store.load_evaluations(12).unwrap().len(), 3);
    }

    #[test]
    fn product_ids_stay_with_their_evaluation() {
        let store = SqliteStore::open_in_memory().unwrap();
        apply_seed(&store, &parse_seed(SEED).unwrap()).unwrap();

        let other = parse_seed(
            r#"{"evaluation": {"id": 13, "title": "Yogur"},
                "products": [{"id": 7, "name": "Natural"}, {"id": 1, "name": "Griego"}],
                "panelists": [{"panelistId": "p-9",
                               "preferences": [{"productId": 7, "position": 1}]}]}"#,
        )
        .unwrap();
        let res = apply_seed(&store, &other);
        assert!(matches!(res, Err(ReportError::Whatever { .. })));

        // Evaluation 12 is untouched and nothing of evaluation 13 was written.
        let names: Vec<String> = store
            .load_products(12)
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["Muestra 101", "Muestra 202"]);
        assert_eq!(store.evaluation_title(13).unwrap(), None);
        assert!(store.load_products(13).unwrap().is_empty());
        assert!(store.load_evaluations(13).unwrap().is_empty());
    }

    #[test]
    fn submission_ids_stay_with_their_evaluation() {
        let store = SqliteStore::open_in_memory().unwrap();
        apply_seed(&store, &parse_seed(SEED).unwrap()).unwrap();

        let other = parse_seed(
            r#"{"evaluation": {"id": 13, "title": "Yogur"},
                "products": [{"id": 7, "name": "Natural"}],
                "panelists": [{"id": 40, "panelistId": "p-9",
                               "preferences": [{"productId": 7, "position": 1}]}]}"#,
        )
        .unwrap();
        assert!(apply_seed(&store, &other).is_err());
        assert_eq!(store.load_evaluations(12).unwrap().len(), 2);
        assert!(store.load_products(13).unwrap().is_empty());
    }

    #[test]
    fn duplicate_products_are_rejected() {
        let res = parse_seed(
            r#"{"evaluation": {"id": 1, "title": "t"},
                "products": [{"id": 1, "name": "a"}, {"id": 1, "name": "b"}],
                "panelists": []}"#,
        );
        assert!(matches!(res, Err(ReportError::Whatever { .. })));
    }

    #[test]
    fn malformed_seed() {
        assert!(matches!(
            parse_seed("{\"evaluation\": 3}"),
            Err(ReportError::ParsingJson { .. })
        ));
    }
}
