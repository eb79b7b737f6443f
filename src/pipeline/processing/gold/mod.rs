//! Gold layer: scored feature vectors per district and per pincode, annotated with maturity
//! labels, one versioned partition per evaluation window.

pub mod insights;
pub mod pulse;
pub mod summary;

pub use insights::OperationalInsights;
pub use pulse::SeriesInput;
pub use summary::{NationalSummary, RankedEntry, WindowTotals};

use crate::config::{GoldConfig, PulseConfig, Thresholds};
use crate::constants::AGE_18_GREATER;
use crate::domain::{CleanFact, ClusterLabel, DistrictKey, EvaluationWindow, SchemaType, ScoreOutcome};
use crate::error::Result;
use crate::metrics::TransformMetrics;
use crate::pipeline::processing::maturity::MaturityClassifier;
use crate::pipeline::processing::silver::{SilverStore, SilverTable};
use crate::pipeline::storage::{Snapshot, SnapshotTable};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

pub type GoldStore = SnapshotTable<EvaluationWindow, GoldTable>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GoldTable {
    /// Increases with every Gold commit across all windows; the highest is current
    pub sequence: u64,
    pub window: Option<EvaluationWindow>,
    /// Silver version per schema type this table was computed from
    pub silver_versions: BTreeMap<String, u64>,
    pub config_fingerprint: String,
    pub districts: BTreeMap<DistrictKey, ScoreOutcome>,
    pub pincodes: BTreeMap<String, ScoreOutcome>,
    pub labels: BTreeMap<DistrictKey, ClusterLabel>,
    pub summary: NationalSummary,
    #[serde(default)]
    pub insights: OperationalInsights,
}

/// What changed in Silver since the Gold table a run may build on.
#[derive(Debug, Clone, Default)]
pub struct SilverChanges {
    /// Silver versions before the Silver runs that produced `touched_districts`
    pub baseline_versions: BTreeMap<String, u64>,
    pub touched_districts: BTreeSet<DistrictKey>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GoldRunResult {
    pub window: Option<EvaluationWindow>,
    pub gold_version: u64,
    pub committed: bool,
    /// Untouched districts were carried over from the previous table
    pub incremental: bool,
    pub districts_recomputed: usize,
    pub districts_scored: usize,
    pub districts_insufficient: usize,
    pub pincodes_scored: usize,
    pub labelled: usize,
    pub unlabelled: usize,
}

#[derive(Debug, Default)]
struct WindowGroups {
    districts: BTreeMap<DistrictKey, SeriesInput>,
    pincodes: BTreeMap<String, PincodeGroup>,
    totals: WindowTotals,
}

#[derive(Debug, Default)]
struct PincodeGroup {
    input: SeriesInput,
    districts: BTreeSet<DistrictKey>,
}

#[derive(Debug, Clone, Copy, Default)]
struct RunStats {
    incremental: bool,
    recomputed: usize,
}

pub struct GoldAggregator {
    silver: Arc<SilverStore>,
    gold: Arc<GoldStore>,
    gold_config: GoldConfig,
    thresholds: Thresholds,
    classifier: MaturityClassifier,
    config_fingerprint: String,
}

impl GoldAggregator {
    pub fn new(silver: Arc<SilverStore>, gold: Arc<GoldStore>, config: &PulseConfig) -> Self {
        let fingerprint_source = format!("{:?}|{:?}|{:?}", config.gold, config.thresholds, config.classifier);
        let mut hasher = Sha256::new();
        hasher.update(fingerprint_source.as_bytes());

        Self {
            silver,
            gold,
            gold_config: config.gold.clone(),
            thresholds: config.thresholds.clone(),
            classifier: MaturityClassifier::from_config(&config.classifier),
            config_fingerprint: hex::encode(hasher.finalize()),
        }
    }

    /// Score the current Silver snapshot and commit a classifier-annotated Gold table.
    ///
    /// The window ends on the latest enrolment date. When the previous table for the same
    /// window was built from `changes.baseline_versions`, only touched districts are rescored.
    pub fn run(&self, changes: &SilverChanges) -> Result<GoldRunResult> {
        let started = Instant::now();
        let silver: BTreeMap<SchemaType, Snapshot<SilverTable>> =
            SchemaType::ALL.iter().map(|s| (*s, self.silver.read(s))).collect();
        let current_versions: BTreeMap<String, u64> = silver
            .iter()
            .map(|(schema, snap)| (schema.as_str().to_string(), snap.version))
            .collect();

        let Some(end) = silver
            .get(&SchemaType::Enrolment)
            .and_then(|snap| snap.data.last_date())
        else {
            info!("No enrolment facts in Silver yet, skipping Gold");
            return Ok(GoldRunResult::default());
        };

        let window = EvaluationWindow::trailing(end, self.gold_config.window_days);
        let groups = group_facts(&silver, &window);

        let updated = self.gold.update(&window, |previous| {
            let prev = &previous.data;
            let reusable = previous.version > 0 && prev.config_fingerprint == self.config_fingerprint;
            if reusable && prev.silver_versions == current_versions {
                debug!(window = %window, "Silver unchanged since last Gold run");
                return Ok((None, RunStats::default()));
            }

            let touched = (reusable && prev.silver_versions == changes.baseline_versions)
                .then_some(&changes.touched_districts);
            let sequence = self
                .gold
                .snapshot_all()
                .values()
                .map(|s| s.data.sequence)
                .max()
                .unwrap_or(0)
                + 1;

            let derived = OperationalInsights::derive(window_facts(&silver, &window), &window);
            let (table, stats) = self.build_table(
                &groups,
                derived,
                window,
                prev,
                touched,
                current_versions.clone(),
                sequence,
            );
            Ok((Some(table), stats))
        })?;

        let table = self.gold.read(&window).data;
        let districts_scored = table.districts.values().filter(|o| !o.is_insufficient()).count();
        let districts_insufficient = table.districts.len() - districts_scored;
        let result = GoldRunResult {
            window: Some(window),
            gold_version: updated.version,
            committed: updated.committed,
            incremental: updated.outcome.incremental,
            districts_recomputed: updated.outcome.recomputed,
            districts_scored,
            districts_insufficient,
            pincodes_scored: table.pincodes.values().filter(|o| !o.is_insufficient()).count(),
            labelled: table.labels.len(),
            unlabelled: table.districts.len() - table.labels.len(),
        };

        let elapsed = started.elapsed().as_secs_f64();
        if updated.committed {
            TransformMetrics::record_gold_run(districts_scored, districts_insufficient, elapsed);
        }
        info!(
            window = %window,
            version = result.gold_version,
            committed = result.committed,
            incremental = result.incremental,
            recomputed = result.districts_recomputed,
            scored = result.districts_scored,
            insufficient = result.districts_insufficient,
            "Gold run complete in {:.3}s",
            elapsed
        );
        Ok(result)
    }

    #[allow(clippy::too_many_arguments)]
    fn build_table(
        &self,
        groups: &WindowGroups,
        mut derived: OperationalInsights,
        window: EvaluationWindow,
        previous: &GoldTable,
        touched: Option<&BTreeSet<DistrictKey>>,
        silver_versions: BTreeMap<String, u64>,
        sequence: u64,
    ) -> (GoldTable, RunStats) {
        let is_touched = |key: &DistrictKey| touched.map_or(true, |t| t.contains(key));

        let fresh_districts: BTreeMap<DistrictKey, ScoreOutcome> = groups
            .districts
            .par_iter()
            .filter(|(key, _)| is_touched(*key) || !previous.districts.contains_key(*key))
            .map(|(key, input)| {
                (
                    key.clone(),
                    pulse::score(input, &window, &self.gold_config, &self.thresholds),
                )
            })
            .collect::<Vec<_>>()
            .into_iter()
            .collect();

        let fresh_pincodes: BTreeMap<String, ScoreOutcome> = groups
            .pincodes
            .par_iter()
            .filter(|(code, group)| group.districts.iter().any(is_touched) || !previous.pincodes.contains_key(*code))
            .map(|(code, group)| {
                (
                    code.clone(),
                    pulse::score(&group.input, &window, &self.gold_config, &self.thresholds),
                )
            })
            .collect::<Vec<_>>()
            .into_iter()
            .collect();

        let recomputed = fresh_districts.len();
        let districts = merge(groups.districts.keys(), fresh_districts, &previous.districts);
        let pincodes = merge(groups.pincodes.keys(), fresh_pincodes, &previous.pincodes);

        let classified = self.classifier.classify(&districts, &window);
        let mut summary = NationalSummary::build(window, groups.totals.clone(), &districts, &pincodes, &classified.labels);
        summary.maturity_method = classified.method;
        derived.migration_hotspots = insights::migration_hotspots(&districts);

        let table = GoldTable {
            sequence,
            window: Some(window),
            silver_versions,
            config_fingerprint: self.config_fingerprint.clone(),
            districts,
            pincodes,
            labels: classified.labels,
            summary,
            insights: derived,
        };
        (
            table,
            RunStats {
                incremental: touched.is_some(),
                recomputed,
            },
        )
    }
}

/// Deterministic merge: every current key takes its fresh outcome, else the carried-over one.
fn merge<'a, K: Ord + Clone + 'a>(
    keys: impl Iterator<Item = &'a K>,
    mut fresh: BTreeMap<K, ScoreOutcome>,
    previous: &BTreeMap<K, ScoreOutcome>,
) -> BTreeMap<K, ScoreOutcome> {
    keys.filter_map(|key| {
        fresh
            .remove(key)
            .or_else(|| previous.get(key).cloned())
            .map(|outcome| (key.clone(), outcome))
    })
    .collect()
}

/// Every Silver fact dated inside the window, across schema types.
fn window_facts<'a>(
    silver: &'a BTreeMap<SchemaType, Snapshot<SilverTable>>,
    window: &EvaluationWindow,
) -> impl Iterator<Item = &'a CleanFact> + 'a {
    let (start, end) = (window.start, window.end);
    silver
        .values()
        .flat_map(move |snap| snap.data.partitions.range(start..=end))
        .flat_map(|(_, facts)| facts.iter())
}

fn group_facts(silver: &BTreeMap<SchemaType, Snapshot<SilverTable>>, window: &EvaluationWindow) -> WindowGroups {
    let mut groups = WindowGroups::default();
    let mut states = BTreeSet::new();

    for (schema, snap) in silver {
        let in_window = snap
            .data
            .partitions
            .range(window.start..=window.end)
            .flat_map(|(_, facts)| facts.iter());

        for fact in in_window {
            let key = fact.district_key();
            states.insert(fact.state.clone());

            let district = groups.districts.entry(key.clone()).or_insert_with(|| SeriesInput {
                state: fact.state.clone(),
                district: fact.district.clone(),
                ..Default::default()
            });
            accumulate(district, *schema, fact);

            let pincode = groups.pincodes.entry(fact.pincode.clone()).or_insert_with(|| PincodeGroup {
                input: SeriesInput {
                    state: fact.state.clone(),
                    district: fact.district.clone(),
                    pincode: Some(fact.pincode.clone()),
                    ..Default::default()
                },
                districts: BTreeSet::new(),
            });
            accumulate(&mut pincode.input, *schema, fact);
            pincode.districts.insert(key);

            let total = fact.total();
            match schema {
                SchemaType::Enrolment => groups.totals.enrolments += total,
                SchemaType::BiometricUpdate => groups.totals.biometric_updates += total,
                SchemaType::DemographicUpdate => groups.totals.demographic_updates += total,
            }
        }
    }

    groups.totals.states = states.len();
    groups.totals.districts = groups.districts.len();
    groups.totals.pincodes = groups.pincodes.len();
    groups
}

fn accumulate(input: &mut SeriesInput, schema: SchemaType, fact: &CleanFact) {
    match schema {
        SchemaType::Enrolment => {
            *input.daily_enrolment.entry(fact.date).or_insert(0) += fact.total();
            input.adult_enrolment += fact.measure(AGE_18_GREATER);
        }
        SchemaType::BiometricUpdate => input.biometric_updates += fact.total(),
        SchemaType::DemographicUpdate => input.demographic_updates += fact.total(),
    }
}

/// The most recently committed Gold table, whatever its window.
pub fn latest_table(gold: &GoldStore) -> Option<Snapshot<GoldTable>> {
    gold.snapshot_all()
        .into_values()
        .max_by_key(|snap| snap.data.sequence)
}

/// Current Silver version per schema type, keyed like `GoldTable::silver_versions`.
pub fn silver_versions(silver: &SilverStore) -> BTreeMap<String, u64> {
    SchemaType::ALL
        .iter()
        .map(|s| (s.as_str().to_string(), silver.version(s)))
        .collect()
}
