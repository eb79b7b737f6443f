//! Read-only query surface over the current Gold snapshot. Nothing here recomputes.

use crate::domain::{ClusterLabel, DistrictKey, EvaluationWindow, ScoreOutcome};
use crate::pipeline::processing::gold::{self, GoldStore, NationalSummary, OperationalInsights};
use crate::pipeline::processing::silver::normalize_name;
use serde::Serialize;
use std::sync::Arc;

/// A district's Gold entry together with its maturity label, if it has one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistrictView {
    pub key: DistrictKey,
    pub window: Option<EvaluationWindow>,
    pub outcome: ScoreOutcome,
    pub label: Option<ClusterLabel>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PincodeView {
    pub pincode: String,
    pub window: Option<EvaluationWindow>,
    pub outcome: ScoreOutcome,
}

#[derive(Clone)]
pub struct MetricsStore {
    gold: Arc<GoldStore>,
}

impl MetricsStore {
    pub fn new(gold: Arc<GoldStore>) -> Self {
        Self { gold }
    }

    /// National aggregates, or `None` before the first Gold run.
    pub fn summary(&self) -> Option<NationalSummary> {
        gold::latest_table(&self.gold).map(|snap| snap.data.summary.clone())
    }

    /// Shadows, utilization, age ladder and the other national insights of the current table.
    pub fn insights(&self) -> Option<OperationalInsights> {
        gold::latest_table(&self.gold).map(|snap| snap.data.insights.clone())
    }

    /// Look a district up by name alone. Names are matched the way Silver normalizes them;
    /// if the name exists in several states the first in key order is returned.
    pub fn by_district(&self, name: &str) -> Option<DistrictView> {
        let wanted = normalize_name(name);
        let snap = gold::latest_table(&self.gold)?;
        let table = &snap.data;
        table
            .districts
            .iter()
            .find(|(key, _)| key.district == wanted)
            .map(|(key, outcome)| DistrictView {
                key: key.clone(),
                window: table.window,
                outcome: outcome.clone(),
                label: table.labels.get(key).cloned(),
            })
    }

    pub fn by_district_in_state(&self, state: &str, name: &str) -> Option<DistrictView> {
        let key = DistrictKey::new(normalize_name(state), normalize_name(name));
        let snap = gold::latest_table(&self.gold)?;
        let table = &snap.data;
        table.districts.get(&key).map(|outcome| DistrictView {
            label: table.labels.get(&key).cloned(),
            window: table.window,
            outcome: outcome.clone(),
            key,
        })
    }

    pub fn by_pincode(&self, code: &str) -> Option<PincodeView> {
        let code = code.trim();
        let snap = gold::latest_table(&self.gold)?;
        let table = &snap.data;
        table.pincodes.get(code).map(|outcome| PincodeView {
            pincode: code.to_string(),
            window: table.window,
            outcome: outcome.clone(),
        })
    }

    /// Version and window of the Gold snapshot queries are currently served from.
    pub fn current_version(&self) -> Option<(EvaluationWindow, u64)> {
        let snap = gold::latest_table(&self.gold)?;
        snap.data.window.map(|w| (w, snap.version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FeatureVector, MaturityLabel, TlpClass, WeekdayProfile};
    use crate::pipeline::processing::gold::GoldTable;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn window() -> EvaluationWindow {
        EvaluationWindow::trailing(NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(), 90)
    }

    fn vector(state: &str, district: &str, pincode: Option<&str>) -> FeatureVector {
        let w = window();
        FeatureVector {
            state: state.into(),
            district: district.into(),
            pincode: pincode.map(String::from),
            window_start: w.start,
            window_end: w.end,
            observations: 10,
            ovs: Some(1.0),
            ovs_class: None,
            mii: Some(0.2),
            mii_class: None,
            dhr: Some(0.5),
            dhr_class: None,
            tlp: [0.0; 12],
            weekday_profile: WeekdayProfile {
                shares: [0.0; 7],
                classification: TlpClass::Balanced,
                recommendation: String::new(),
            },
            enrolment_count: 10,
            adult_enrolment_count: 2,
            biometric_updates: 1,
            demographic_updates: 1,
            growth_rate: Some(0.0),
        }
    }

    fn store() -> MetricsStore {
        let gold = Arc::new(GoldStore::new("gold", 2));
        let goa = DistrictKey::new("GOA", "NORTH GOA");
        let mut districts = BTreeMap::new();
        districts.insert(goa.clone(), ScoreOutcome::Scored(vector("GOA", "NORTH GOA", None)));
        districts.insert(
            DistrictKey::new("KERALA", "IDUKKI"),
            ScoreOutcome::Scored(vector("KERALA", "IDUKKI", None)),
        );
        let mut labels = BTreeMap::new();
        labels.insert(
            goa.clone(),
            ClusterLabel {
                district: goa,
                window: window(),
                label: MaturityLabel::Mature,
                centroid_distance: 0.3,
            },
        );
        let mut pincodes = BTreeMap::new();
        pincodes.insert(
            "403001".to_string(),
            ScoreOutcome::Scored(vector("GOA", "NORTH GOA", Some("403001"))),
        );

        let table = GoldTable {
            sequence: 1,
            window: Some(window()),
            districts,
            pincodes,
            labels,
            ..Default::default()
        };
        gold.commit(&window(), 0, table).unwrap();
        MetricsStore::new(gold)
    }

    #[test]
    fn test_by_district_matches_case_insensitively() {
        let view = store().by_district("  north goa").unwrap();
        assert_eq!(view.key, DistrictKey::new("GOA", "NORTH GOA"));
        assert_eq!(view.label.unwrap().label, MaturityLabel::Mature);
    }

    #[test]
    fn test_by_district_in_state_and_missing() {
        let s = store();
        let view = s.by_district_in_state("kerala", "Idukki").unwrap();
        assert!(view.label.is_none());
        assert!(s.by_district_in_state("goa", "idukki").is_none());
        assert!(s.by_district("Atlantis").is_none());
    }

    #[test]
    fn test_insights_served_from_current_table() {
        let insights = store().insights().unwrap();
        assert_eq!(insights, OperationalInsights::default());
    }

    #[test]
    fn test_by_pincode() {
        let s = store();
        let view = s.by_pincode("403001").unwrap();
        assert_eq!(view.outcome.features().unwrap().pincode.as_deref(), Some("403001"));
        assert!(s.by_pincode("999999").is_none());
    }

    #[test]
    fn test_empty_store_has_no_summary() {
        let s = MetricsStore::new(Arc::new(GoldStore::new("gold", 2)));
        assert!(s.summary().is_none());
        assert!(s.insights().is_none());
        assert!(s.current_version().is_none());
    }
}
