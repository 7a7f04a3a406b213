//! Import of XGBoost JSON model dumps (`Booster.save_model("model.json")`).
//!
//! Only tree boosters with numerical splits are supported. Leaf values live in
//! `split_conditions` for nodes whose left child is `-1`.

use crate::ensemble::{Node, Objective, Tree, TreeEnsemble};
use crate::error::MlError;
use crate::schema::{FeatureSchema, FieldSpec, FieldType};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct XgbDocument {
    learner: XgbLearner,
}

#[derive(Debug, Deserialize)]
struct XgbLearner {
    #[serde(default)]
    feature_names: Vec<String>,
    #[serde(default)]
    feature_types: Vec<String>,
    gradient_booster: XgbBooster,
    learner_model_param: XgbLearnerParam,
    objective: XgbObjective,
}

#[derive(Debug, Deserialize)]
struct XgbBooster {
    name: String,
    #[serde(default)]
    model: Option<XgbTreeModel>,
}

#[derive(Debug, Deserialize)]
struct XgbTreeModel {
    trees: Vec<XgbTree>,
}

#[derive(Debug, Deserialize)]
struct XgbTree {
    left_children: Vec<i64>,
    right_children: Vec<i64>,
    split_indices: Vec<i64>,
    split_conditions: Vec<f64>,
    default_left: Vec<XgbFlag>,
    #[serde(default)]
    split_type: Vec<i64>,
}

/// Older dumps write booleans, newer ones write 0/1.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
enum XgbFlag {
    Bool(bool),
    Int(i64),
}

impl XgbFlag {
    fn is_set(self) -> bool {
        match self {
            XgbFlag::Bool(b) => b,
            XgbFlag::Int(i) => i != 0,
        }
    }
}

#[derive(Debug, Deserialize)]
struct XgbLearnerParam {
    base_score: String,
    #[serde(default)]
    num_feature: Option<String>,
}

#[derive(Debug, Deserialize)]
struct XgbObjective {
    name: String,
}

/// A model imported from XGBoost: its input schema and its trees.
#[derive(Debug, Clone)]
pub struct ImportedModel {
    pub schema: FeatureSchema,
    pub ensemble: TreeEnsemble,
}

/// True if the JSON value looks like an XGBoost model dump.
pub fn is_xgboost_document(value: &serde_json::Value) -> bool {
    value
        .get("learner")
        .and_then(|l| l.get("gradient_booster"))
        .is_some()
}

/// Parse an XGBoost JSON model.
pub fn import_xgboost_json(json: &str) -> Result<ImportedModel, MlError> {
    let doc: XgbDocument = serde_json::from_str(json)?;
    let learner = doc.learner;

    if learner.gradient_booster.name != "gbtree" {
        return Err(MlError::model(format!(
            "unsupported booster '{}', only gbtree is supported",
            learner.gradient_booster.name
        )));
    }
    if learner.feature_names.is_empty() {
        return Err(MlError::model(
            "model carries no feature names; retrain with a named DataFrame",
        ));
    }
    if let Some(num_feature) = &learner.learner_model_param.num_feature {
        let declared: usize = num_feature
            .parse()
            .map_err(|_| MlError::model(format!("invalid num_feature '{num_feature}'")))?;
        if declared != learner.feature_names.len() {
            return Err(MlError::model(format!(
                "num_feature is {declared} but {} feature names are listed",
                learner.feature_names.len()
            )));
        }
    }

    let fields = learner
        .feature_names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let dtype = learner
                .feature_types
                .get(i)
                .map(|t| FieldType::from_xgboost(t))
                .unwrap_or(FieldType::Float);
            FieldSpec::new(name.clone(), dtype)
        })
        .collect();
    let schema = FeatureSchema::new(fields)?;

    let objective = Objective::from_xgboost(&learner.objective.name)?;
    let base_score = parse_base_score(&learner.learner_model_param.base_score)?;

    let model = learner
        .gradient_booster
        .model
        .ok_or_else(|| MlError::model("gbtree booster has no model section"))?;
    let trees = model
        .trees
        .into_iter()
        .enumerate()
        .map(|(i, t)| convert_tree(t).map_err(|e| MlError::model(format!("tree {i}: {e}"))))
        .collect::<Result<Vec<_>, _>>()?;

    let ensemble = TreeEnsemble::new(schema.len(), objective, base_score, trees)?;
    tracing::debug!(
        features = schema.len(),
        trees = ensemble.num_trees(),
        ?objective,
        base_score,
        "Imported XGBoost model"
    );
    Ok(ImportedModel { schema, ensemble })
}

/// Accepts both `"5E-1"` and the bracketed vector form `"[5E-1]"`.
fn parse_base_score(raw: &str) -> Result<f64, MlError> {
    let trimmed = raw.trim().trim_start_matches('[').trim_end_matches(']');
    let first = trimmed.split(',').next().unwrap_or("").trim();
    first
        .parse::<f64>()
        .map_err(|_| MlError::model(format!("invalid base_score '{raw}'")))
}

fn convert_tree(tree: XgbTree) -> Result<Tree, MlError> {
    let n = tree.left_children.len();
    if tree.right_children.len() != n
        || tree.split_indices.len() != n
        || tree.split_conditions.len() != n
        || tree.default_left.len() != n
    {
        return Err(MlError::model("node arrays have inconsistent lengths"));
    }
    if tree.split_type.iter().any(|&t| t != 0) {
        return Err(MlError::model("categorical splits are not supported"));
    }

    let mut nodes = Vec::with_capacity(n);
    for i in 0..n {
        let left = tree.left_children[i];
        if left == -1 {
            nodes.push(Node::Leaf {
                value: tree.split_conditions[i],
            });
            continue;
        }
        let right = tree.right_children[i];
        let feature = tree.split_indices[i];
        if left < 0 || right < 0 || feature < 0 {
            return Err(MlError::model(format!("node {i} has negative indices")));
        }
        nodes.push(Node::Split {
            feature: feature as usize,
            threshold: tree.split_conditions[i],
            left: left as usize,
            right: right as usize,
            default_left: tree.default_left[i].is_set(),
        });
    }
    Tree::new(nodes)
}
