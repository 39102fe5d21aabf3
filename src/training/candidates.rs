//! The candidate regressor lineup.
//!
//! Every benchmark run fits the same fixed set of smartcore regressors so
//! reports stay comparable across datasets. The [`Regressor`] enum erases
//! the concrete model type while staying bincode-serializable.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::linear::elastic_net::{ElasticNet, ElasticNetParameters};
use smartcore::linear::lasso::{Lasso, LassoParameters};
use smartcore::linear::linear_regression::{LinearRegression, LinearRegressionParameters};
use smartcore::linear::ridge_regression::{RidgeRegression, RidgeRegressionParameters};
use smartcore::tree::decision_tree_regressor::{
    DecisionTreeRegressor, DecisionTreeRegressorParameters,
};

pub type Matrix = DenseMatrix<f64>;

/// Flatten row-major feature vectors into a `DenseMatrix`.
pub fn to_matrix(x: &[Vec<f64>]) -> Result<Matrix> {
    if x.is_empty() {
        anyhow::bail!("cannot build a matrix from zero rows");
    }
    let n_samples = x.len();
    let n_features = x[0].len();

    let mut flat_data = Vec::with_capacity(n_samples * n_features);
    for row in x {
        if row.len() != n_features {
            anyhow::bail!("all feature vectors must have the same length");
        }
        flat_data.extend_from_slice(row);
    }

    Ok(DenseMatrix::new(n_samples, n_features, flat_data, false))
}

/// The fixed benchmark lineup, in report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateKind {
    Linear,
    Ridge,
    Lasso,
    ElasticNet,
    DecisionTree,
    RandomForest,
}

impl CandidateKind {
    pub const ALL: [CandidateKind; 6] = [
        CandidateKind::Linear,
        CandidateKind::Ridge,
        CandidateKind::Lasso,
        CandidateKind::ElasticNet,
        CandidateKind::DecisionTree,
        CandidateKind::RandomForest,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CandidateKind::Linear => "linear_regression",
            CandidateKind::Ridge => "ridge",
            CandidateKind::Lasso => "lasso",
            CandidateKind::ElasticNet => "elastic_net",
            CandidateKind::DecisionTree => "decision_tree",
            CandidateKind::RandomForest => "random_forest",
        }
    }

    /// Fit this candidate on a (scaled) training matrix.
    pub fn fit(&self, x: &Matrix, y: &[f64], seed: u64) -> Result<Regressor> {
        // smartcore fits against an owned target container type.
        let y = y.to_vec();
        let model = match self {
            CandidateKind::Linear => Regressor::Linear(
                LinearRegression::fit(x, &y, LinearRegressionParameters::default())
                    .map_err(|e| anyhow::anyhow!("linear regression fit failed: {:?}", e))?,
            ),
            CandidateKind::Ridge => Regressor::Ridge(
                RidgeRegression::fit(x, &y, RidgeRegressionParameters::default().with_alpha(1.0))
                    .map_err(|e| anyhow::anyhow!("ridge fit failed: {:?}", e))?,
            ),
            CandidateKind::Lasso => Regressor::Lasso(
                Lasso::fit(x, &y, LassoParameters::default().with_alpha(0.1))
                    .map_err(|e| anyhow::anyhow!("lasso fit failed: {:?}", e))?,
            ),
            CandidateKind::ElasticNet => Regressor::ElasticNet(
                ElasticNet::fit(
                    x,
                    &y,
                    ElasticNetParameters::default()
                        .with_alpha(0.1)
                        .with_l1_ratio(0.5),
                )
                .map_err(|e| anyhow::anyhow!("elastic net fit failed: {:?}", e))?,
            ),
            CandidateKind::DecisionTree => Regressor::DecisionTree(
                DecisionTreeRegressor::fit(
                    x,
                    &y,
                    DecisionTreeRegressorParameters::default()
                        .with_max_depth(15)
                        .with_min_samples_split(5)
                        .with_min_samples_leaf(2),
                )
                .map_err(|e| anyhow::anyhow!("decision tree fit failed: {:?}", e))?,
            ),
            CandidateKind::RandomForest => Regressor::RandomForest(
                RandomForestRegressor::fit(
                    x,
                    &y,
                    RandomForestRegressorParameters {
                        max_depth: Some(15),
                        min_samples_leaf: 2,
                        min_samples_split: 5,
                        n_trees: 100,
                        m: None,
                        keep_samples: false,
                        seed,
                    },
                )
                .map_err(|e| anyhow::anyhow!("random forest fit failed: {:?}", e))?,
            ),
        };
        Ok(model)
    }
}

/// A fitted candidate. Tree models are not `Clone`, so the benchmark hands
/// these out by move or reference only.
#[derive(Debug, Serialize, Deserialize)]
pub enum Regressor {
    Linear(LinearRegression<f64, f64, Matrix, Vec<f64>>),
    Ridge(RidgeRegression<f64, f64, Matrix, Vec<f64>>),
    Lasso(Lasso<f64, f64, Matrix, Vec<f64>>),
    ElasticNet(ElasticNet<f64, f64, Matrix, Vec<f64>>),
    DecisionTree(DecisionTreeRegressor<f64, f64, Matrix, Vec<f64>>),
    RandomForest(RandomForestRegressor<f64, f64, Matrix, Vec<f64>>),
}

impl Regressor {
    pub fn predict(&self, x: &Matrix) -> Result<Vec<f64>> {
        let preds = match self {
            Regressor::Linear(m) => m.predict(x),
            Regressor::Ridge(m) => m.predict(x),
            Regressor::Lasso(m) => m.predict(x),
            Regressor::ElasticNet(m) => m.predict(x),
            Regressor::DecisionTree(m) => m.predict(x),
            Regressor::RandomForest(m) => m.predict(x),
        };
        preds.map_err(|e| anyhow::anyhow!("prediction failed: {:?}", e))
    }

    /// Predict from row-major feature vectors.
    pub fn predict_rows(&self, x: &[Vec<f64>]) -> Result<Vec<f64>> {
        self.predict(&to_matrix(x)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_dataset() -> (Vec<Vec<f64>>, Vec<f64>) {
        // y = 2a + 3b + 1
        let x: Vec<Vec<f64>> = (0..40)
            .map(|i| vec![i as f64, (i % 7) as f64])
            .collect();
        let y = x.iter().map(|r| 2.0 * r[0] + 3.0 * r[1] + 1.0).collect();
        (x, y)
    }

    #[test]
    fn to_matrix_rejects_ragged_rows() {
        let err = to_matrix(&[vec![1.0, 2.0], vec![3.0]]).unwrap_err();
        assert!(err.to_string().contains("same length"));
    }

    #[test]
    fn to_matrix_rejects_empty_input() {
        assert!(to_matrix(&[]).is_err());
    }

    #[test]
    fn every_candidate_fits_and_predicts() {
        let (x, y) = linear_dataset();
        let matrix = to_matrix(&x).unwrap();
        for kind in CandidateKind::ALL {
            let model = kind.fit(&matrix, &y, 42).unwrap();
            let preds = model.predict(&matrix).unwrap();
            assert_eq!(preds.len(), y.len(), "{}", kind.name());
        }
    }

    #[test]
    fn linear_candidate_recovers_linear_relationship() {
        let (x, y) = linear_dataset();
        let matrix = to_matrix(&x).unwrap();
        let model = CandidateKind::Linear.fit(&matrix, &y, 42).unwrap();
        let preds = model.predict(&matrix).unwrap();
        for (p, t) in preds.iter().zip(&y) {
            assert!((p - t).abs() < 1e-6);
        }
    }

    #[test]
    fn regressor_round_trips_through_bincode() {
        let (x, y) = linear_dataset();
        let matrix = to_matrix(&x).unwrap();
        let model = CandidateKind::Ridge.fit(&matrix, &y, 42).unwrap();
        let before = model.predict(&matrix).unwrap();

        let bytes = bincode::serialize(&model).unwrap();
        let restored: Regressor = bincode::deserialize(&bytes).unwrap();
        let after = restored.predict(&matrix).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn candidate_names_are_unique() {
        let names: std::collections::HashSet<_> =
            CandidateKind::ALL.iter().map(|k| k.name()).collect();
        assert_eq!(names.len(), CandidateKind::ALL.len());
    }
}
