//! Domain data shapes shared across the Bronze, Silver and Gold layers.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// The closed set of record types the gatekeeper knows how to classify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaType {
    Enrolment,
    BiometricUpdate,
    DemographicUpdate,
}

impl SchemaType {
    pub const ALL: [SchemaType; 3] = [
        SchemaType::Enrolment,
        SchemaType::BiometricUpdate,
        SchemaType::DemographicUpdate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaType::Enrolment => "enrolment",
            SchemaType::BiometricUpdate => "biometric_update",
            SchemaType::DemographicUpdate => "demographic_update",
        }
    }
}

impl fmt::Display for SchemaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchemaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "enrolment" | "enrollment" => Ok(SchemaType::Enrolment),
            "biometric_update" | "biometric" => Ok(SchemaType::BiometricUpdate),
            "demographic_update" | "demographic" => Ok(SchemaType::DemographicUpdate),
            other => Err(format!("unknown schema type '{}'", other)),
        }
    }
}

/// Identifies a district. District names repeat across states, so the state is part of the key.
///
/// Serialized as `STATE|DISTRICT` so it can key JSON maps in archived snapshots.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct DistrictKey {
    pub state: String,
    pub district: String,
}

impl DistrictKey {
    pub fn new(state: impl Into<String>, district: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            district: district.into(),
        }
    }
}

impl fmt::Display for DistrictKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.state, self.district)
    }
}

impl From<DistrictKey> for String {
    fn from(key: DistrictKey) -> Self {
        key.to_string()
    }
}

impl TryFrom<String> for DistrictKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.split_once('|') {
            Some((state, district)) => Ok(DistrictKey::new(state, district)),
            None => Err(format!("district key '{}' is missing the state separator", value)),
        }
    }
}

/// Bronze record: a validated but otherwise untouched source row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub schema_type: SchemaType,
    pub ingest_batch_id: Uuid,
    /// Line number in the source file (the header is line 1)
    pub source_row: u64,
    pub source_row_hash: String,
    pub raw_fields: BTreeMap<String, String>,
    pub ingested_at: DateTime<Utc>,
}

/// Silver record: a typed, normalized fact. Counts are unsigned so negatives cannot exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanFact {
    pub schema_type: SchemaType,
    pub date: NaiveDate,
    pub state: String,
    pub district: String,
    pub pincode: String,
    pub measures: BTreeMap<String, u64>,
}

impl CleanFact {
    pub fn measure(&self, name: &str) -> u64 {
        self.measures.get(name).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.measures.values().sum()
    }

    pub fn district_key(&self) -> DistrictKey {
        DistrictKey::new(self.state.clone(), self.district.clone())
    }
}

/// Returned by the raw store for every accepted file, and again for any re-submission of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReceipt {
    pub batch_id: Uuid,
    pub schema_type: SchemaType,
    pub content_hash: String,
    pub source_name: String,
    pub accepted_rows: usize,
    pub rejected_rows: usize,
    pub bronze_version: u64,
    pub ingested_at: DateTime<Utc>,
}

/// Why a row was rejected by the gatekeeper. The batch continues regardless.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum RejectionReason {
    MissingField { column: String },
    UnparseableDate { value: String },
    AmbiguousDate { value: String, candidates: Vec<NaiveDate> },
    DateOutOfRange { value: String },
    InvalidPincode { value: String },
    InvalidCount { column: String, value: String },
    NegativeCount { column: String, value: String },
    MalformedRow { detail: String },
}

impl RejectionReason {
    pub fn code(&self) -> &'static str {
        match self {
            RejectionReason::MissingField { .. } => "missing_field",
            RejectionReason::UnparseableDate { .. } => "unparseable_date",
            RejectionReason::AmbiguousDate { .. } => "ambiguous_date",
            RejectionReason::DateOutOfRange { .. } => "date_out_of_range",
            RejectionReason::InvalidPincode { .. } => "invalid_pincode",
            RejectionReason::InvalidCount { .. } => "invalid_count",
            RejectionReason::NegativeCount { .. } => "negative_count",
            RejectionReason::MalformedRow { .. } => "malformed_row",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::MissingField { column } => write!(f, "missing value for '{}'", column),
            RejectionReason::UnparseableDate { value } => write!(f, "cannot parse date '{}'", value),
            RejectionReason::AmbiguousDate { value, candidates } => {
                let dates: Vec<String> = candidates.iter().map(|d| d.to_string()).collect();
                write!(f, "date '{}' is ambiguous ({})", value, dates.join(" or "))
            }
            RejectionReason::DateOutOfRange { value } => write!(f, "date '{}' is out of range", value),
            RejectionReason::InvalidPincode { value } => write!(f, "pincode '{}' is not 6 digits", value),
            RejectionReason::InvalidCount { column, value } => {
                write!(f, "'{}' value '{}' is not an integer", column, value)
            }
            RejectionReason::NegativeCount { column, value } => {
                write!(f, "'{}' value '{}' is negative", column, value)
            }
            RejectionReason::MalformedRow { detail } => write!(f, "malformed row: {}", detail),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub row: u64,
    pub reason: RejectionReason,
}

/// Inclusive date range a Gold snapshot was scored over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EvaluationWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl EvaluationWindow {
    /// Trailing window of `days` days ending on `end` (inclusive).
    pub fn trailing(end: NaiveDate, days: u32) -> Self {
        let span = i64::from(days.max(1)) - 1;
        Self {
            start: end - chrono::Duration::days(span),
            end,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Last day of the first half; growth compares the two halves of the window.
    pub fn midpoint(&self) -> NaiveDate {
        self.start + chrono::Duration::days(self.days() / 2 - 1)
    }
}

impl fmt::Display for EvaluationWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OvsClass {
    #[serde(rename = "Temporary Camp")]
    TemporaryCamp,
    #[serde(rename = "Permanent Center")]
    PermanentCenter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MiiClass {
    #[serde(rename = "Migration Hotspot")]
    MigrationHotspot,
    #[serde(rename = "Mixed Population")]
    MixedPopulation,
    #[serde(rename = "Birth-Rate Driven")]
    BirthRateDriven,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DhrClass {
    #[serde(rename = "High Risk")]
    HighRisk,
    #[serde(rename = "Normal Maintenance")]
    NormalMaintenance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TlpClass {
    #[serde(rename = "Weekend Warrior Zone")]
    WeekendWarrior,
    #[serde(rename = "School Drive Zone")]
    SchoolDrive,
    #[serde(rename = "Balanced Load")]
    Balanced,
}

/// Share of enrolment volume per weekday, Monday first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeekdayProfile {
    pub shares: [f64; 7],
    pub classification: TlpClass,
    pub recommendation: String,
}

/// Gold feature vector for one district (or one pincode) over one evaluation window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub state: String,
    pub district: String,
    /// Set for pincode-level vectors
    pub pincode: Option<String>,
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    /// Days in the window with enrolment data
    pub observations: usize,
    pub ovs: Option<f64>,
    pub ovs_class: Option<OvsClass>,
    pub mii: Option<f64>,
    pub mii_class: Option<MiiClass>,
    pub dhr: Option<f64>,
    pub dhr_class: Option<DhrClass>,
    /// Monthly load share, January first
    pub tlp: [f64; 12],
    pub weekday_profile: WeekdayProfile,
    pub enrolment_count: u64,
    pub adult_enrolment_count: u64,
    pub biometric_updates: u64,
    pub demographic_updates: u64,
    /// Percentage change of enrolment between the two halves of the window
    pub growth_rate: Option<f64>,
}

impl FeatureVector {
    pub fn district_key(&self) -> DistrictKey {
        DistrictKey::new(self.state.clone(), self.district.clone())
    }

    pub fn is_volatile_camp(&self) -> bool {
        self.ovs_class == Some(OvsClass::TemporaryCamp)
    }

    pub fn is_migration_hotspot(&self) -> bool {
        self.mii_class == Some(MiiClass::MigrationHotspot)
    }

    pub fn is_high_risk(&self) -> bool {
        self.dhr_class == Some(DhrClass::HighRisk)
    }
}

/// Scoring result for one district or pincode. Thin series are reported, never scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScoreOutcome {
    Scored(FeatureVector),
    InsufficientData {
        state: String,
        district: String,
        pincode: Option<String>,
        observations: usize,
        required: usize,
    },
}

impl ScoreOutcome {
    pub fn features(&self) -> Option<&FeatureVector> {
        match self {
            ScoreOutcome::Scored(fv) => Some(fv),
            ScoreOutcome::InsufficientData { .. } => None,
        }
    }

    pub fn is_insufficient(&self) -> bool {
        matches!(self, ScoreOutcome::InsufficientData { .. })
    }
}

/// Saturation Maturity Level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MaturityLabel {
    Emerging,
    Mature,
    #[serde(rename = "High Churn")]
    HighChurn,
}

impl MaturityLabel {
    pub fn description(&self) -> &'static str {
        match self {
            MaturityLabel::Emerging => "High new enrolment activity, expanding coverage",
            MaturityLabel::Mature => "Stable region with steady enrolment growth",
            MaturityLabel::HighChurn => "Volatile or shrinking activity, requires monitoring",
        }
    }
}

impl fmt::Display for MaturityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MaturityLabel::Emerging => "Emerging",
            MaturityLabel::Mature => "Mature",
            MaturityLabel::HighChurn => "High Churn",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterLabel {
    pub district: DistrictKey,
    pub window: EvaluationWindow,
    pub label: MaturityLabel,
    /// Euclidean distance to the assigned centroid in standardized feature space
    pub centroid_distance: f64,
}
