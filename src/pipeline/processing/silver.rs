//! Silver layer: typed, normalized, deduplicated facts rebuilt from a Bronze snapshot.

use crate::constants::{self, COL_DATE, COL_DISTRICT, COL_PINCODE, COL_STATE};
use crate::domain::{CleanFact, DistrictKey, RawRecord, SchemaType};
use crate::error::Result;
use crate::gateway::{self, date_parser};
use crate::metrics::TransformMetrics;
use crate::pipeline::storage::{BronzeTable, RawStore, Snapshot, SnapshotTable};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub type SilverStore = SnapshotTable<SchemaType, SilverTable>;

/// Silver contents of one schema type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SilverTable {
    pub partitions: BTreeMap<NaiveDate, Arc<Vec<CleanFact>>>,
    /// sha256 of the serialized partitions
    pub fingerprint: String,
    pub bronze_version: u64,
}

impl SilverTable {
    pub fn fact_count(&self) -> usize {
        self.partitions.values().map(|p| p.len()).sum()
    }

    pub fn facts(&self) -> impl Iterator<Item = &CleanFact> {
        self.partitions.values().flat_map(|p| p.iter())
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.partitions.keys().next_back().copied()
    }
}

/// Something Silver noticed about its input that did not stop the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DataQualityEvent {
    DuplicateDropped {
        date: NaiveDate,
        pincode: String,
        batch_id: Uuid,
        source_row: u64,
    },
    Uncastable {
        batch_id: Uuid,
        source_row: u64,
        detail: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct SilverRunResult {
    pub schema_type: SchemaType,
    pub bronze_version: u64,
    /// Silver version before this run
    pub previous_version: u64,
    pub silver_version: u64,
    /// False when the rebuilt table was identical to the current one
    pub committed: bool,
    pub facts: usize,
    pub partitions: usize,
    pub duplicates_dropped: usize,
    pub fingerprint: String,
    pub quality_events: Vec<DataQualityEvent>,
    pub touched_districts: BTreeSet<DistrictKey>,
}

pub struct SilverTransformer {
    raw_store: Arc<RawStore>,
    silver: Arc<SilverStore>,
}

impl SilverTransformer {
    pub fn new(raw_store: Arc<RawStore>, silver: Arc<SilverStore>) -> Self {
        Self { raw_store, silver }
    }

    /// Rebuild Silver for one schema type from the current Bronze snapshot.
    ///
    /// A new version is committed only when the output differs from what is already there.
    pub fn run(&self, schema: SchemaType) -> Result<SilverRunResult> {
        let bronze = self.raw_store.snapshot(schema);
        let (table, quality_events) = build(&bronze)?;
        let duplicates_dropped = quality_events
            .iter()
            .filter(|e| matches!(e, DataQualityEvent::DuplicateDropped { .. }))
            .count();

        let updated = self.silver.update(&schema, |current| {
            if current.data.fingerprint == table.fingerprint {
                return Ok((None, (current.version, BTreeSet::new())));
            }
            let touched = touched_districts(&current.data, &table);
            Ok((Some(table.clone()), (current.version, touched)))
        })?;
        let (previous_version, touched_districts) = updated.outcome;

        TransformMetrics::record_silver_run(schema.as_str(), table.fact_count(), duplicates_dropped, updated.committed);
        info!(
            schema = %schema,
            bronze_version = bronze.version,
            silver_version = updated.version,
            facts = table.fact_count(),
            duplicates_dropped,
            committed = updated.committed,
            touched = touched_districts.len(),
            "Silver run complete"
        );

        Ok(SilverRunResult {
            schema_type: schema,
            bronze_version: bronze.version,
            previous_version,
            silver_version: updated.version,
            committed: updated.committed,
            facts: table.fact_count(),
            partitions: table.partitions.len(),
            duplicates_dropped,
            fingerprint: table.fingerprint,
            quality_events,
            touched_districts,
        })
    }
}

/// Pure rebuild of a Silver table from a Bronze snapshot.
///
/// Bronze partitions are walked in date order and rows in append order, so "first seen" for
/// duplicate `(date, pincode)` keys is the earliest ingested row.
pub fn build(bronze: &Snapshot<BronzeTable>) -> Result<(SilverTable, Vec<DataQualityEvent>)> {
    let mut partitions: BTreeMap<NaiveDate, Arc<Vec<CleanFact>>> = BTreeMap::new();
    let mut events = Vec::new();

    for records in bronze.data.partitions.values() {
        let mut seen: HashSet<(NaiveDate, String)> = HashSet::new();
        for record in records.iter() {
            let fact = match cast(record) {
                Ok(fact) => fact,
                Err(detail) => {
                    warn!(batch_id = %record.ingest_batch_id, row = record.source_row, "Bronze row failed to cast: {}", detail);
                    events.push(DataQualityEvent::Uncastable {
                        batch_id: record.ingest_batch_id,
                        source_row: record.source_row,
                        detail,
                    });
                    continue;
                }
            };

            if !seen.insert((fact.date, fact.pincode.clone())) {
                warn!(
                    schema = %fact.schema_type,
                    date = %fact.date,
                    pincode = %fact.pincode,
                    batch_id = %record.ingest_batch_id,
                    row = record.source_row,
                    "Dropping duplicate fact, keeping first seen"
                );
                events.push(DataQualityEvent::DuplicateDropped {
                    date: fact.date,
                    pincode: fact.pincode,
                    batch_id: record.ingest_batch_id,
                    source_row: record.source_row,
                });
                continue;
            }

            let partition = partitions.entry(fact.date).or_default();
            Arc::make_mut(partition).push(fact);
        }
    }

    let fingerprint = fingerprint(&partitions)?;
    Ok((
        SilverTable {
            partitions,
            fingerprint,
            bronze_version: bronze.version,
        },
        events,
    ))
}

fn raw_field<'a>(record: &'a RawRecord, name: &str) -> std::result::Result<&'a str, String> {
    record
        .raw_fields
        .get(name)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| format!("missing '{}'", name))
}

fn cast(record: &RawRecord) -> std::result::Result<CleanFact, String> {
    let field = |name: &str| raw_field(record, name);

    let date = date_parser::parse_date(field(COL_DATE)?).map_err(|r| r.to_string())?;
    let pincode = gateway::parse_pincode(field(COL_PINCODE)?).map_err(|r| r.to_string())?;

    let mut measures = BTreeMap::new();
    for &column in constants::measure_columns(record.schema_type) {
        let count = gateway::parse_count(column, field(column)?).map_err(|r| r.to_string())?;
        measures.insert(column.to_string(), count);
    }

    Ok(CleanFact {
        schema_type: record.schema_type,
        date,
        state: normalize_name(field(COL_STATE)?),
        district: normalize_name(field(COL_DISTRICT)?),
        pincode: pincode.to_string(),
        measures,
    })
}

/// Trim, collapse inner whitespace and upper-case a place name.
pub fn normalize_name(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

fn fingerprint(partitions: &BTreeMap<NaiveDate, Arc<Vec<CleanFact>>>) -> Result<String> {
    let bytes = serde_json::to_vec(partitions)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

/// Districts whose facts differ between two versions of a Silver table.
fn touched_districts(old: &SilverTable, new: &SilverTable) -> BTreeSet<DistrictKey> {
    let mut touched = BTreeSet::new();
    let dates: BTreeSet<&NaiveDate> = old.partitions.keys().chain(new.partitions.keys()).collect();

    for date in dates {
        let (before, after) = (old.partitions.get(date), new.partitions.get(date));
        if let (Some(b), Some(a)) = (before, after) {
            if Arc::ptr_eq(b, a) || b == a {
                continue;
            }
        }

        let by_pincode = |facts: Option<&Arc<Vec<CleanFact>>>| -> BTreeMap<String, CleanFact> {
            facts
                .map(|f| f.iter().map(|fact| (fact.pincode.clone(), fact.clone())).collect())
                .unwrap_or_default()
        };
        let (before, after) = (by_pincode(before), by_pincode(after));
        let pincodes: BTreeSet<&String> = before.keys().chain(after.keys()).collect();
        for pincode in pincodes {
            let (b, a) = (before.get(pincode), after.get(pincode));
            if b != a {
                touched.extend(b.map(CleanFact::district_key));
                touched.extend(a.map(CleanFact::district_key));
            }
        }
    }

    touched
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::SchemaGatekeeper;
    use crate::pipeline::storage::BronzeBatch;
    use chrono::Utc;

    const HEADER: &str = "date,state,district,pincode,age_0_5,age_5_17,age_18_greater\n";

    fn ingest(store: &RawStore, rows: &str) {
        let content = format!("{}{}", HEADER, rows);
        let screened = SchemaGatekeeper::screen(content.as_bytes(), "f.csv").unwrap();
        store
            .append(&BronzeBatch::from_screened(&screened, "f.csv", Utc::now()))
            .unwrap();
    }

    fn transformer() -> (Arc<RawStore>, Arc<SilverStore>, SilverTransformer) {
        let raw = Arc::new(RawStore::new(4));
        let silver = Arc::new(SilverStore::new("silver", 4));
        let t = SilverTransformer::new(raw.clone(), silver.clone());
        (raw, silver, t)
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  north   goa "), "NORTH GOA");
        assert_eq!(normalize_name("Mysuru"), "MYSURU");
    }

    #[test]
    fn test_casts_and_normalizes() {
        let (raw, silver, t) = transformer();
        ingest(&raw, "2025-03-01, karnataka , mysuru ,570001,1,2,3\n");
        let result = t.run(SchemaType::Enrolment).unwrap();
        assert_eq!(result.facts, 1);

        let snap = silver.read(&SchemaType::Enrolment);
        let fact = snap.data.facts().next().unwrap();
        assert_eq!(fact.state, "KARNATAKA");
        assert_eq!(fact.district, "MYSURU");
        assert_eq!(fact.measure("age_18_greater"), 3);
        assert_eq!(fact.total(), 6);
    }

    #[test]
    fn test_duplicate_key_keeps_first_seen() {
        let (raw, silver, t) = transformer();
        ingest(&raw, "01-03-2025,Karnataka,Mysuru,570001,1,1,1\n");
        ingest(&raw, "2025-03-01,Karnataka,Mysuru,570001,9,9,9\n02-03-2025,Karnataka,Mysuru,570001,2,2,2\n");

        let result = t.run(SchemaType::Enrolment).unwrap();
        assert_eq!(result.facts, 2);
        assert_eq!(result.duplicates_dropped, 1);
        assert!(matches!(
            result.quality_events[0],
            DataQualityEvent::DuplicateDropped { source_row: 2, .. }
        ));

        let snap = silver.read(&SchemaType::Enrolment);
        let march_1 = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        assert_eq!(snap.data.partitions[&march_1][0].measure("age_0_5"), 1);
    }

    #[test]
    fn test_rerun_is_byte_identical_and_does_not_commit() {
        let (raw, silver, t) = transformer();
        ingest(&raw, "01-03-2025,Karnataka,Mysuru,570001,1,1,1\n02-03-2025,Kerala,Idukki,685501,2,2,2\n");

        let first = t.run(SchemaType::Enrolment).unwrap();
        let first_bytes = serde_json::to_vec(&silver.read(&SchemaType::Enrolment).data.partitions).unwrap();
        let second = t.run(SchemaType::Enrolment).unwrap();
        let second_bytes = serde_json::to_vec(&silver.read(&SchemaType::Enrolment).data.partitions).unwrap();

        assert!(first.committed);
        assert!(!second.committed);
        assert_eq!(first.fingerprint, second.fingerprint);
        assert_eq!(first_bytes, second_bytes);
        assert_eq!(second.silver_version, first.silver_version);
        assert!(second.touched_districts.is_empty());
    }

    #[test]
    fn test_touched_districts_only_cover_changed_facts() {
        let (raw, _silver, t) = transformer();
        ingest(&raw, "01-03-2025,Karnataka,Mysuru,570001,1,1,1\n01-03-2025,Kerala,Idukki,685501,2,2,2\n");
        let first = t.run(SchemaType::Enrolment).unwrap();
        assert_eq!(first.touched_districts.len(), 2);

        ingest(&raw, "01-03-2025,Kerala,Idukki,685502,5,5,5\n");
        let second = t.run(SchemaType::Enrolment).unwrap();
        let expected: BTreeSet<DistrictKey> = [DistrictKey::new("KERALA", "IDUKKI")].into_iter().collect();
        assert_eq!(second.touched_districts, expected);
    }

    #[test]
    fn test_empty_bronze_builds_empty_silver() {
        let (_raw, _silver, t) = transformer();
        let result = t.run(SchemaType::BiometricUpdate).unwrap();
        assert_eq!(result.facts, 0);
        assert_eq!(result.bronze_version, 0);
    }
}
