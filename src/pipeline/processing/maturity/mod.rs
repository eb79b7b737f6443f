//! Saturation Maturity Level: clusters district feature vectors and names the clusters.
//!
//! Cluster ids from the clusterer are never exposed. Labels come from ranking centroids:
//! by growth coordinate ascending, then by volatility coordinate descending, then by the
//! centroid coordinates themselves. The lowest ranked cluster is High Churn, the highest is
//! Mature and everything in between is Emerging.
//!
//! A fit where any cluster holds less than `MIN_CLUSTER_SHARE` of the districts is not used.
//! Labels then come from the 67th percentile of standardized growth and volatility: high
//! growth alone is Mature, high volatility alone is High Churn, both compares the two
//! z-scores and neither is Emerging.

pub mod kmeans;

pub use kmeans::{ClusterFit, Clusterer, KMeans};

use crate::config::ClassifierConfig;
use crate::constants::{MIN_CLUSTER_SHARE, QUANTILE_CUT_PERCENTILE};
use crate::domain::{ClusterLabel, DistrictKey, EvaluationWindow, MaturityLabel, ScoreOutcome};
use crate::metrics::ClassifierMetrics;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::{info, warn};

const OVS: usize = 0;
const GROWTH: usize = 3;

/// How the labels of a run were assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierMethod {
    KMeans,
    Quantile,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClassifierRun {
    pub labels: BTreeMap<DistrictKey, ClusterLabel>,
    /// Districts left unlabelled: too little data or an undefined feature
    pub excluded: Vec<DistrictKey>,
    /// True when fewer districts than clusters were eligible
    pub skipped: bool,
    pub inertia: Option<f64>,
    /// `None` when the run was skipped
    pub method: Option<ClassifierMethod>,
}

pub struct MaturityClassifier {
    clusterer: Box<dyn Clusterer>,
    k: usize,
}

impl MaturityClassifier {
    pub fn new(clusterer: Box<dyn Clusterer>, k: usize) -> Self {
        Self { clusterer, k }
    }

    pub fn from_config(config: &ClassifierConfig) -> Self {
        Self::new(
            Box::new(KMeans::new(config.k, config.n_init, config.max_iter, config.seed)),
            config.k,
        )
    }

    pub fn classify(
        &self,
        districts: &BTreeMap<DistrictKey, ScoreOutcome>,
        window: &EvaluationWindow,
    ) -> ClassifierRun {
        let mut keys = Vec::new();
        let mut raw = Vec::new();
        let mut excluded = Vec::new();

        for (key, outcome) in districts {
            let features = outcome
                .features()
                .and_then(|fv| Some(vec![fv.ovs?, fv.mii?, fv.dhr?, fv.growth_rate?]));
            match features {
                Some(f) => {
                    keys.push(key.clone());
                    raw.push(f);
                }
                None => excluded.push(key.clone()),
            }
        }

        if keys.len() < self.k {
            warn!(
                eligible = keys.len(),
                k = self.k,
                "Too few districts to classify, leaving all unlabelled"
            );
            ClassifierMetrics::record_skipped();
            excluded.extend(keys);
            excluded.sort();
            return ClassifierRun {
                excluded,
                skipped: true,
                ..Default::default()
            };
        }

        let scaled = standardize(&raw);
        let Some(fit) = self.clusterer.fit(&scaled) else {
            ClassifierMetrics::record_skipped();
            excluded.extend(keys);
            excluded.sort();
            return ClassifierRun {
                excluded,
                skipped: true,
                ..Default::default()
            };
        };

        let (method, assigned) = if is_balanced(&fit.assignments, self.k) {
            let names = rank_labels(&fit.centroids);
            let assigned: Vec<(MaturityLabel, f64)> = scaled
                .iter()
                .zip(&fit.assignments)
                .map(|(point, &cluster)| {
                    (
                        names[cluster],
                        kmeans::squared_distance(point, &fit.centroids[cluster]).sqrt(),
                    )
                })
                .collect();
            (ClassifierMethod::KMeans, assigned)
        } else {
            warn!(
                k = self.k,
                points = scaled.len(),
                "A cluster holds under {:.0}% of districts, falling back to quantile labels",
                MIN_CLUSTER_SHARE * 100.0
            );
            ClassifierMetrics::record_quantile_fallback();
            let names = quantile_labels(&scaled);
            let distances = distances_to_group_means(&scaled, &names);
            (ClassifierMethod::Quantile, names.into_iter().zip(distances).collect())
        };

        let labels: BTreeMap<DistrictKey, ClusterLabel> = keys
            .into_iter()
            .zip(assigned)
            .map(|(key, (label, centroid_distance))| {
                let label = ClusterLabel {
                    district: key.clone(),
                    window: *window,
                    label,
                    centroid_distance,
                };
                (key, label)
            })
            .collect();

        ClassifierMetrics::record_run(labels.len(), excluded.len(), fit.inertia);
        info!(
            labelled = labels.len(),
            excluded = excluded.len(),
            inertia = fit.inertia,
            method = ?method,
            "Maturity classification complete"
        );

        ClassifierRun {
            labels,
            excluded,
            skipped: false,
            inertia: Some(fit.inertia),
            method: Some(method),
        }
    }
}

/// Every cluster id below `k` holds at least `MIN_CLUSTER_SHARE` of the points.
fn is_balanced(assignments: &[usize], k: usize) -> bool {
    if assignments.is_empty() {
        return false;
    }
    let total = assignments.len() as f64;
    (0..k).all(|cluster| {
        let count = assignments.iter().filter(|&&a| a == cluster).count();
        count as f64 / total >= MIN_CLUSTER_SHARE
    })
}

/// Percentile with linear interpolation between closest ranks; `p` is in 0..=100.
pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let rank = (p / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * (rank - lower as f64))
}

/// Labels from growth and volatility quantiles over standardized points.
///
/// A column with no spread marks nobody as high on it.
pub fn quantile_labels(scaled: &[Vec<f64>]) -> Vec<MaturityLabel> {
    let high_flags = |dim: usize| -> Vec<bool> {
        let column: Vec<f64> = scaled.iter().map(|p| p[dim]).collect();
        let spread = column.iter().any(|v| *v != column[0]);
        match percentile(&column, QUANTILE_CUT_PERCENTILE) {
            Some(cut) if spread => column.iter().map(|v| *v >= cut).collect(),
            _ => vec![false; column.len()],
        }
    };
    let high_growth = high_flags(GROWTH);
    let high_ovs = high_flags(OVS);

    scaled
        .iter()
        .enumerate()
        .map(|(i, point)| match (high_growth[i], high_ovs[i]) {
            (true, false) => MaturityLabel::Mature,
            (false, true) => MaturityLabel::HighChurn,
            (true, true) if point[GROWTH] >= point[OVS] => MaturityLabel::Mature,
            (true, true) => MaturityLabel::HighChurn,
            (false, false) => MaturityLabel::Emerging,
        })
        .collect()
}

/// Distance from each point to the mean of the points sharing its label.
fn distances_to_group_means(scaled: &[Vec<f64>], labels: &[MaturityLabel]) -> Vec<f64> {
    let mut sums: BTreeMap<MaturityLabel, (Vec<f64>, usize)> = BTreeMap::new();
    for (point, label) in scaled.iter().zip(labels) {
        let (sum, count) = sums
            .entry(*label)
            .or_insert_with(|| (vec![0.0; point.len()], 0));
        for (s, v) in sum.iter_mut().zip(point) {
            *s += v;
        }
        *count += 1;
    }
    let means: BTreeMap<MaturityLabel, Vec<f64>> = sums
        .into_iter()
        .map(|(label, (sum, count))| (label, sum.into_iter().map(|s| s / count as f64).collect()))
        .collect();

    scaled
        .iter()
        .zip(labels)
        .map(|(point, label)| {
            means
                .get(label)
                .map_or(0.0, |mean| kmeans::squared_distance(point, mean).sqrt())
        })
        .collect()
}

/// Z-score each column with the population standard deviation of this batch.
/// A constant column is centred and left at zero.
pub fn standardize(rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
    if rows.is_empty() {
        return Vec::new();
    }
    let n = rows.len() as f64;
    let dims = rows[0].len();

    let means: Vec<f64> = (0..dims).map(|d| rows.iter().map(|r| r[d]).sum::<f64>() / n).collect();
    let stds: Vec<f64> = (0..dims)
        .map(|d| (rows.iter().map(|r| (r[d] - means[d]).powi(2)).sum::<f64>() / n).sqrt())
        .collect();

    rows.iter()
        .map(|r| {
            (0..dims)
                .map(|d| if stds[d] > 0.0 { (r[d] - means[d]) / stds[d] } else { 0.0 })
                .collect()
        })
        .collect()
}

/// Label for each cluster id, following the ranking rule in the module docs.
pub fn rank_labels(centroids: &[Vec<f64>]) -> Vec<MaturityLabel> {
    let mut order: Vec<usize> = (0..centroids.len()).collect();
    order.sort_by(|&a, &b| {
        let (ca, cb) = (&centroids[a], &centroids[b]);
        ca[GROWTH]
            .total_cmp(&cb[GROWTH])
            .then_with(|| cb[OVS].total_cmp(&ca[OVS]))
            .then_with(|| {
                ca.iter()
                    .zip(cb.iter())
                    .map(|(x, y)| x.total_cmp(y))
                    .find(|o| *o != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            })
    });

    let last = order.len().saturating_sub(1);
    let mut labels = vec![MaturityLabel::Emerging; centroids.len()];
    for (rank, cluster) in order.into_iter().enumerate() {
        labels[cluster] = if rank == 0 {
            MaturityLabel::HighChurn
        } else if rank == last {
            MaturityLabel::Mature
        } else {
            MaturityLabel::Emerging
        };
    }
    labels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FeatureVector, TlpClass, WeekdayProfile};
    use chrono::NaiveDate;

    fn window() -> EvaluationWindow {
        EvaluationWindow::trailing(NaiveDate::from_ymd_opt(2025, 6, 30).unwrap(), 90)
    }

    fn scored(district: &str, ovs: f64, mii: f64, dhr: f64, growth: f64) -> (DistrictKey, ScoreOutcome) {
        let w = window();
        let fv = FeatureVector {
            state: "STATE".into(),
            district: district.into(),
            pincode: None,
            window_start: w.start,
            window_end: w.end,
            observations: 30,
            ovs: Some(ovs),
            ovs_class: None,
            mii: Some(mii),
            mii_class: None,
            dhr: Some(dhr),
            dhr_class: None,
            tlp: [0.0; 12],
            weekday_profile: WeekdayProfile {
                shares: [0.0; 7],
                classification: TlpClass::Balanced,
                recommendation: String::new(),
            },
            enrolment_count: 100,
            adult_enrolment_count: 20,
            biometric_updates: 0,
            demographic_updates: 0,
            growth_rate: Some(growth),
        };
        (DistrictKey::new("STATE", district), ScoreOutcome::Scored(fv))
    }

    fn districts() -> BTreeMap<DistrictKey, ScoreOutcome> {
        vec![
            scored("A1", 8.0, 0.2, 1.0, -40.0),
            scored("A2", 8.5, 0.2, 1.1, -42.0),
            scored("A3", 7.5, 0.2, 0.9, -38.0),
            scored("B1", 3.0, 0.3, 0.5, 10.0),
            scored("B2", 3.2, 0.3, 0.6, 12.0),
            scored("B3", 2.8, 0.3, 0.4, 8.0),
            scored("C1", 1.0, 0.1, 0.2, 60.0),
            scored("C2", 1.1, 0.1, 0.2, 62.0),
            scored("C3", 0.9, 0.1, 0.2, 58.0),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_labels_follow_growth_ranking() {
        let classifier = MaturityClassifier::from_config(&ClassifierConfig::default());
        let run = classifier.classify(&districts(), &window());
        assert_eq!(run.labels.len(), 9);
        assert!(!run.skipped);
        assert_eq!(run.method, Some(ClassifierMethod::KMeans));
        let label = |d: &str| run.labels[&DistrictKey::new("STATE", d)].label;
        for d in ["A1", "A2", "A3"] {
            assert_eq!(label(d), MaturityLabel::HighChurn);
        }
        for d in ["B1", "B2", "B3"] {
            assert_eq!(label(d), MaturityLabel::Emerging);
        }
        for d in ["C1", "C2", "C3"] {
            assert_eq!(label(d), MaturityLabel::Mature);
        }
    }

    #[test]
    fn test_same_seed_reproduces_labels() {
        let classifier = MaturityClassifier::from_config(&ClassifierConfig::default());
        let first = classifier.classify(&districts(), &window());
        let second = MaturityClassifier::from_config(&ClassifierConfig::default()).classify(&districts(), &window());
        assert_eq!(first, second);
    }

    #[test]
    fn test_insufficient_and_undefined_districts_are_excluded() {
        let mut input = districts();
        input.insert(
            DistrictKey::new("STATE", "THIN"),
            ScoreOutcome::InsufficientData {
                state: "STATE".into(),
                district: "THIN".into(),
                pincode: None,
                observations: 3,
                required: 7,
            },
        );
        let (key, mut outcome) = scored("NOGROWTH", 1.0, 0.1, 0.1, 0.0);
        if let ScoreOutcome::Scored(fv) = &mut outcome {
            fv.growth_rate = None;
        }
        input.insert(key, outcome);

        let run = MaturityClassifier::from_config(&ClassifierConfig::default()).classify(&input, &window());
        assert_eq!(run.labels.len(), 9);
        assert_eq!(run.excluded.len(), 2);
        assert!(!run.labels.contains_key(&DistrictKey::new("STATE", "THIN")));
    }

    #[test]
    fn test_fewer_districts_than_clusters_leaves_all_unlabelled() {
        let input: BTreeMap<_, _> = vec![scored("A", 1.0, 0.1, 0.1, 5.0), scored("B", 2.0, 0.2, 0.2, 6.0)]
            .into_iter()
            .collect();
        let run = MaturityClassifier::from_config(&ClassifierConfig::default()).classify(&input, &window());
        assert!(run.skipped);
        assert!(run.labels.is_empty());
        assert_eq!(run.excluded.len(), 2);
    }

    /// Puts every point but the first in cluster 0, leaving cluster 2 empty.
    struct Lopsided;

    impl Clusterer for Lopsided {
        fn fit(&self, points: &[Vec<f64>]) -> Option<ClusterFit> {
            let mut assignments = vec![0; points.len()];
            assignments[0] = 1;
            Some(ClusterFit {
                centroids: vec![vec![0.0; 4]; 3],
                assignments,
                inertia: 1.0,
            })
        }
    }

    #[test]
    fn test_unbalanced_fit_falls_back_to_quantiles() {
        let run = MaturityClassifier::new(Box::new(Lopsided), 3).classify(&districts(), &window());
        assert_eq!(run.method, Some(ClassifierMethod::Quantile));
        assert_eq!(run.labels.len(), 9);
        let label = |d: &str| run.labels[&DistrictKey::new("STATE", d)].label;
        // Growth cut falls between B and C, volatility cut between B and A
        for d in ["A1", "A2", "A3"] {
            assert_eq!(label(d), MaturityLabel::HighChurn);
        }
        for d in ["B1", "B2", "B3"] {
            assert_eq!(label(d), MaturityLabel::Emerging);
        }
        for d in ["C1", "C2", "C3"] {
            assert_eq!(label(d), MaturityLabel::Mature);
        }
        assert!(run.labels.values().all(|l| l.centroid_distance.is_finite()));
    }

    #[test]
    fn test_single_district_cluster_is_unbalanced() {
        assert!(is_balanced(&[0, 0, 0, 1, 1, 1, 2, 2, 2, 2], 3));
        // 1 of 11 is under a tenth
        assert!(!is_balanced(&[0, 0, 0, 0, 0, 1, 1, 1, 1, 1, 2], 3));
        assert!(!is_balanced(&[0, 0, 1, 1], 3));
    }

    #[test]
    fn test_percentile_interpolates_between_ranks() {
        let values = [4.0, 1.0, 3.0, 2.0];
        assert_eq!(percentile(&values, 0.0), Some(1.0));
        assert_eq!(percentile(&values, 100.0), Some(4.0));
        assert_eq!(percentile(&values, 50.0), Some(2.5));
        assert!((percentile(&values, 67.0).unwrap() - 3.01).abs() < 1e-9);
        assert_eq!(percentile(&[], 67.0), None);
    }

    #[test]
    fn test_quantile_labels_ignore_flat_volatility() {
        let scaled = vec![
            vec![0.0, 0.0, 0.0, -1.0],
            vec![0.0, 0.0, 0.0, 0.0],
            vec![0.0, 0.0, 0.0, 1.0],
        ];
        assert_eq!(
            quantile_labels(&scaled),
            vec![MaturityLabel::Emerging, MaturityLabel::Emerging, MaturityLabel::Mature]
        );
    }

    #[test]
    fn test_standardize_constant_column_is_zero() {
        let scaled = standardize(&[vec![1.0, 5.0], vec![3.0, 5.0]]);
        assert_eq!(scaled, vec![vec![-1.0, 0.0], vec![1.0, 0.0]]);
    }

    #[test]
    fn test_rank_labels_tie_breaks_on_volatility() {
        let centroids = vec![vec![0.5, 0.0, 0.0, 0.0], vec![2.0, 0.0, 0.0, 0.0], vec![0.0, 0.0, 0.0, 1.0]];
        let labels = rank_labels(&centroids);
        // Equal growth: the more volatile centroid ranks lower
        assert_eq!(labels[1], MaturityLabel::HighChurn);
        assert_eq!(labels[0], MaturityLabel::Emerging);
        assert_eq!(labels[2], MaturityLabel::Mature);
    }
}
