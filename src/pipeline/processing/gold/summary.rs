use crate::constants::TOP_N_SUMMARY;
use crate::domain::{ClusterLabel, DistrictKey, EvaluationWindow, FeatureVector, ScoreOutcome};
use crate::pipeline::processing::maturity::ClassifierMethod;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Volume totals over the evaluation window, across every district.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowTotals {
    pub states: usize,
    pub districts: usize,
    pub pincodes: usize,
    pub enrolments: u64,
    pub biometric_updates: u64,
    pub demographic_updates: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedEntry {
    pub state: String,
    pub district: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub pincode: Option<String>,
    pub value: f64,
}

/// National aggregates served by `summary()`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NationalSummary {
    pub window: Option<EvaluationWindow>,
    pub totals: WindowTotals,
    /// Updates as a share of all transactions in the window
    pub saturation_rate: Option<f64>,
    pub districts_scored: usize,
    pub districts_insufficient: usize,
    pub pincodes_scored: usize,
    pub temporary_camps: usize,
    pub migration_hotspots: usize,
    pub high_risk_districts: usize,
    /// District count per maturity label
    pub maturity_distribution: BTreeMap<String, usize>,
    #[serde(default)]
    pub maturity_method: Option<ClassifierMethod>,
    pub top_volatile_pincodes: Vec<RankedEntry>,
    pub top_migration_districts: Vec<RankedEntry>,
    pub top_high_risk_districts: Vec<RankedEntry>,
}

impl NationalSummary {
    pub fn build(
        window: EvaluationWindow,
        totals: WindowTotals,
        districts: &BTreeMap<DistrictKey, ScoreOutcome>,
        pincodes: &BTreeMap<String, ScoreOutcome>,
        labels: &BTreeMap<DistrictKey, ClusterLabel>,
    ) -> Self {
        let updates = totals.biometric_updates + totals.demographic_updates;
        let transactions = updates + totals.enrolments;
        let saturation_rate = (transactions > 0).then(|| updates as f64 / transactions as f64);

        let scored: Vec<&FeatureVector> = districts.values().filter_map(ScoreOutcome::features).collect();
        let scored_pincodes: Vec<&FeatureVector> = pincodes.values().filter_map(ScoreOutcome::features).collect();

        let mut maturity_distribution = BTreeMap::new();
        for label in labels.values() {
            *maturity_distribution.entry(label.label.to_string()).or_insert(0) += 1;
        }

        Self {
            window: Some(window),
            saturation_rate,
            districts_scored: scored.len(),
            districts_insufficient: districts.values().filter(|o| o.is_insufficient()).count(),
            pincodes_scored: scored_pincodes.len(),
            temporary_camps: scored.iter().filter(|fv| fv.is_volatile_camp()).count(),
            migration_hotspots: scored.iter().filter(|fv| fv.is_migration_hotspot()).count(),
            high_risk_districts: scored.iter().filter(|fv| fv.is_high_risk()).count(),
            maturity_distribution,
            maturity_method: None,
            top_volatile_pincodes: top_n(&scored_pincodes, |fv| fv.ovs),
            top_migration_districts: top_n(&scored, |fv| fv.mii),
            top_high_risk_districts: top_n(&scored, |fv| fv.dhr),
            totals,
        }
    }
}

/// Highest values first; ties broken by state, district then pincode so the order is stable.
fn top_n<F>(vectors: &[&FeatureVector], value: F) -> Vec<RankedEntry>
where
    F: Fn(&FeatureVector) -> Option<f64>,
{
    let mut entries: Vec<RankedEntry> = vectors
        .iter()
        .filter_map(|fv| {
            value(*fv).map(|v| RankedEntry {
                state: fv.state.clone(),
                district: fv.district.clone(),
                pincode: fv.pincode.clone(),
                value: v,
            })
        })
        .collect();

    entries.sort_by(|a, b| {
        b.value
            .total_cmp(&a.value)
            .then_with(|| a.state.cmp(&b.state))
            .then_with(|| a.district.cmp(&b.district))
            .then_with(|| a.pincode.cmp(&b.pincode))
    });
    entries.truncate(TOP_N_SUMMARY);
    entries
}
