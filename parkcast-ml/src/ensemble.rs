//! Gradient-boosted regression tree ensembles.
//!
//! Trees are stored as flat node arrays, the same layout XGBoost uses in its
//! JSON dumps, and evaluated by walking from the root until a leaf is reached.
//! The ensemble output is `link⁻¹(base_margin + Σ leaf)`.

use crate::error::MlError;
use serde::{Deserialize, Serialize};

/// Training objective, which fixes the link between margin and prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    SquaredError,
    AbsoluteError,
    PseudoHuber,
    Poisson,
    Tweedie,
    Gamma,
}

impl Objective {
    /// Parse an XGBoost objective name such as `reg:squarederror`.
    pub fn from_xgboost(name: &str) -> Result<Self, MlError> {
        match name {
            "reg:squarederror" | "reg:linear" => Ok(Objective::SquaredError),
            "reg:absoluteerror" => Ok(Objective::AbsoluteError),
            "reg:pseudohubererror" => Ok(Objective::PseudoHuber),
            "count:poisson" => Ok(Objective::Poisson),
            "reg:tweedie" => Ok(Objective::Tweedie),
            "reg:gamma" => Ok(Objective::Gamma),
            other => Err(MlError::UnsupportedObjective(other.to_string())),
        }
    }

    fn uses_log_link(self) -> bool {
        matches!(
            self,
            Objective::Poisson | Objective::Tweedie | Objective::Gamma
        )
    }

    /// Convert a base score given in output space into margin space.
    pub fn base_margin(self, base_score: f64) -> f64 {
        if self.uses_log_link() {
            base_score.ln()
        } else {
            base_score
        }
    }

    /// Convert an accumulated margin into the prediction.
    pub fn transform(self, margin: f64) -> f64 {
        if self.uses_log_link() {
            margin.exp()
        } else {
            margin
        }
    }
}

/// A single tree node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        /// Branch taken when the feature value is missing (NaN).
        #[serde(default)]
        default_left: bool,
    },
    Leaf {
        value: f64,
    },
}

/// A regression tree; node 0 is the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Node>", into = "Vec<Node>")]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    /// Build a tree, checking that every child index points forward and in range.
    ///
    /// Forward-only children rule out cycles, so evaluation always terminates.
    pub fn new(nodes: Vec<Node>) -> Result<Self, MlError> {
        if nodes.is_empty() {
            return Err(MlError::model("tree has no nodes"));
        }
        for (idx, node) in nodes.iter().enumerate() {
            if let Node::Split { left, right, .. } = node {
                for child in [*left, *right] {
                    if child <= idx || child >= nodes.len() {
                        return Err(MlError::model(format!(
                            "node {idx} has invalid child index {child}"
                        )));
                    }
                }
            }
        }
        Ok(Self { nodes })
    }

    pub fn leaf(value: f64) -> Self {
        Self {
            nodes: vec![Node::Leaf { value }],
        }
    }

    /// One split on `feature`: values below `threshold` go left.
    pub fn stump(feature: usize, threshold: f64, left_value: f64, right_value: f64) -> Self {
        Self {
            nodes: vec![
                Node::Split {
                    feature,
                    threshold,
                    left: 1,
                    right: 2,
                    default_left: true,
                },
                Node::Leaf { value: left_value },
                Node::Leaf { value: right_value },
            ],
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Highest feature index referenced by any split.
    pub fn max_feature(&self) -> Option<usize> {
        self.nodes
            .iter()
            .filter_map(|n| match n {
                Node::Split { feature, .. } => Some(*feature),
                Node::Leaf { .. } => None,
            })
            .max()
    }

    /// Walk the tree for one row. Callers guarantee `features` covers `max_feature`.
    pub fn evaluate(&self, features: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    default_left,
                } => {
                    let x = features[*feature];
                    idx = if x.is_nan() {
                        if *default_left { *left } else { *right }
                    } else if x < *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }
}

impl TryFrom<Vec<Node>> for Tree {
    type Error = MlError;

    fn try_from(nodes: Vec<Node>) -> Result<Self, Self::Error> {
        Tree::new(nodes)
    }
}

impl From<Tree> for Vec<Node> {
    fn from(tree: Tree) -> Self {
        tree.nodes
    }
}

/// Additive ensemble of regression trees over a fixed number of features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "EnsembleRepr", into = "EnsembleRepr")]
pub struct TreeEnsemble {
    num_features: usize,
    objective: Objective,
    /// Base score in output space, as XGBoost reports it.
    base_score: f64,
    trees: Vec<Tree>,
}

#[derive(Serialize, Deserialize)]
struct EnsembleRepr {
    num_features: usize,
    objective: Objective,
    base_score: f64,
    trees: Vec<Tree>,
}

impl TryFrom<EnsembleRepr> for TreeEnsemble {
    type Error = MlError;

    fn try_from(repr: EnsembleRepr) -> Result<Self, Self::Error> {
        TreeEnsemble::new(repr.num_features, repr.objective, repr.base_score, repr.trees)
    }
}

impl From<TreeEnsemble> for EnsembleRepr {
    fn from(ensemble: TreeEnsemble) -> Self {
        Self {
            num_features: ensemble.num_features,
            objective: ensemble.objective,
            base_score: ensemble.base_score,
            trees: ensemble.trees,
        }
    }
}

impl TreeEnsemble {
    pub fn new(
        num_features: usize,
        objective: Objective,
        base_score: f64,
        trees: Vec<Tree>,
    ) -> Result<Self, MlError> {
        if num_features == 0 {
            return Err(MlError::model("ensemble must have at least one feature"));
        }
        if !base_score.is_finite() {
            return Err(MlError::model(format!("base score {base_score} is not finite")));
        }
        if objective.uses_log_link() && base_score <= 0.0 {
            return Err(MlError::model(format!(
                "base score {base_score} must be positive for {objective:?}"
            )));
        }
        for (i, tree) in trees.iter().enumerate() {
            if let Some(max) = tree.max_feature() {
                if max >= num_features {
                    return Err(MlError::model(format!(
                        "tree {i} splits on feature {max} but the ensemble has {num_features} features"
                    )));
                }
            }
        }
        Ok(Self {
            num_features,
            objective,
            base_score,
            trees,
        })
    }

    pub fn num_features(&self) -> usize {
        self.num_features
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn objective(&self) -> Objective {
        self.objective
    }

    pub fn base_score(&self) -> f64 {
        self.base_score
    }

    /// Raw additive score before the objective's link is applied.
    pub fn predict_margin(&self, features: &[f64]) -> Result<f64, MlError> {
        if features.len() != self.num_features {
            return Err(MlError::invalid_input(format!(
                "expected {} feature values, got {}",
                self.num_features,
                features.len()
            )));
        }
        let base = self.objective.base_margin(self.base_score);
        Ok(self
            .trees
            .iter()
            .fold(base, |acc, tree| acc + tree.evaluate(features)))
    }

    pub fn predict(&self, features: &[f64]) -> Result<f64, MlError> {
        self.predict_margin(features)
            .map(|margin| self.objective.transform(margin))
    }
}
