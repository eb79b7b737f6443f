//! Operational insights: national and state-level findings that sit beside the per-district
//! scores. Each list is recomputed in full from the window's Silver facts on every Gold commit.

use crate::constants::{
    ADULT_SHARE_ANOMALY_PCT, AGE_0_5, AGE_18_GREATER, AGE_5_17, BIO_AGE_17_PLUS, BIO_AGE_5_17,
    DIGITAL_MATURITY_FIXING_BELOW, DIGITAL_MATURITY_MATURE_FROM, DIGITAL_MATURITY_NO_DEMOGRAPHIC,
    DIGITAL_RECOMMEND_FIXING, DIGITAL_RECOMMEND_MATURE, DIGITAL_RECOMMEND_NORMAL, LOW_ENROLMENT_DISTRICT_MAX,
    MIGRATION_LABOR_INFLUX, MIGRATION_SETTLEMENT, MONTH_ABBREVIATIONS, SHADOW_MIN_ENROLMENT, SPIKE_Z_SCORE,
    TOP_N_UTILIZATION, UTILIZATION_FLAG_PCT,
};
use crate::domain::{CleanFact, DistrictKey, EvaluationWindow, SchemaType, ScoreOutcome};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationalInsights {
    /// Districts enrolling adults with no adult biometric updates at all
    pub service_shadows: Vec<ServiceShadow>,
    /// Pincodes running close to their peak day every day
    pub high_utilization: Vec<UtilizationEntry>,
    pub age_ladder: Vec<AgeLadderRung>,
    pub student_surge: StudentSurge,
    pub digital_maturity: DigitalMaturity,
    pub synchronized_spikes: Vec<SpikeDay>,
    pub migration_hotspots: Vec<MigrationHotspot>,
    pub low_enrolment_districts: Vec<LowEnrolmentDistrict>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceShadow {
    pub state: String,
    pub district: String,
    pub total_enrolments: u64,
    pub adult_enrolments: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtilizationEntry {
    pub state: String,
    pub district: String,
    pub pincode: String,
    /// Mean daily enrolment as a percentage of the busiest day
    pub utilization_pct: f64,
    pub avg_daily: f64,
    pub max_daily: u64,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgeLadderRung {
    pub state: String,
    pub age_0_5: u64,
    pub age_5_17: u64,
    pub age_18_greater: u64,
    pub total: u64,
    /// Adult share of enrolment, percent, one decimal
    pub adult_pct: f64,
    pub is_anomaly: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudentSurge {
    /// School-age biometric updates per calendar month, January first
    pub monthly: [u64; 12],
    pub peak_month: Option<String>,
    pub peak_value: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DigitalMaturityClass {
    #[serde(rename = "Fixing Phase")]
    FixingPhase,
    #[default]
    #[serde(rename = "Normal Operation")]
    NormalOperation,
    #[serde(rename = "Mature Usage")]
    MatureUsage,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DigitalMaturity {
    /// Biometric over demographic updates, two decimals
    pub score: f64,
    pub classification: DigitalMaturityClass,
    pub recommendation: String,
    pub total_biometric: u64,
    pub total_demographic: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpikeDay {
    pub date: NaiveDate,
    /// Enrolment plus updates on that day, all schema types
    pub volume: u64,
    pub z_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MigrationVerdict {
    #[serde(rename = "Labor Influx")]
    LaborInflux,
    #[serde(rename = "Settlement Zone")]
    SettlementZone,
    #[serde(rename = "Migration Detected")]
    MigrationDetected,
}

impl MigrationVerdict {
    pub fn for_mii(mii: f64) -> Self {
        if mii > MIGRATION_LABOR_INFLUX {
            MigrationVerdict::LaborInflux
        } else if mii > MIGRATION_SETTLEMENT {
            MigrationVerdict::SettlementZone
        } else {
            MigrationVerdict::MigrationDetected
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationHotspot {
    pub state: String,
    pub district: String,
    pub mii: f64,
    pub verdict: MigrationVerdict,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LowEnrolmentDistrict {
    pub state: String,
    pub district: String,
    pub total_enrolments: u64,
}

#[derive(Debug, Default)]
struct DistrictTally {
    total_enrolments: u64,
    adult_enrolments: u64,
    adult_biometric: u64,
}

#[derive(Debug, Default)]
struct PincodeTally {
    key: Option<DistrictKey>,
    daily: BTreeMap<NaiveDate, u64>,
}

#[derive(Debug, Default)]
struct StateTally {
    age_0_5: u64,
    age_5_17: u64,
    age_18_greater: u64,
}

impl OperationalInsights {
    /// Everything except the migration hotspots, which need the scored districts.
    pub fn derive<'a>(facts: impl Iterator<Item = &'a CleanFact>, window: &EvaluationWindow) -> Self {
        let mut districts: BTreeMap<DistrictKey, DistrictTally> = BTreeMap::new();
        let mut pincodes: BTreeMap<String, PincodeTally> = BTreeMap::new();
        let mut states: BTreeMap<String, StateTally> = BTreeMap::new();
        let mut daily_volume: BTreeMap<NaiveDate, u64> = BTreeMap::new();
        let mut surge = [0u64; 12];
        let mut surge_seen = false;
        let (mut total_biometric, mut total_demographic) = (0u64, 0u64);

        for fact in facts.filter(|f| window.contains(f.date)) {
            *daily_volume.entry(fact.date).or_insert(0) += fact.total();
            match fact.schema_type {
                SchemaType::Enrolment => {
                    let district = districts.entry(fact.district_key()).or_default();
                    district.total_enrolments += fact.total();
                    district.adult_enrolments += fact.measure(AGE_18_GREATER);

                    let pincode = pincodes.entry(fact.pincode.clone()).or_default();
                    pincode.key.get_or_insert_with(|| fact.district_key());
                    *pincode.daily.entry(fact.date).or_insert(0) += fact.total();

                    let state = states.entry(fact.state.clone()).or_default();
                    state.age_0_5 += fact.measure(AGE_0_5);
                    state.age_5_17 += fact.measure(AGE_5_17);
                    state.age_18_greater += fact.measure(AGE_18_GREATER);
                }
                SchemaType::BiometricUpdate => {
                    total_biometric += fact.total();
                    surge[fact.date.month0() as usize] += fact.measure(BIO_AGE_5_17);
                    surge_seen = true;
                    districts.entry(fact.district_key()).or_default().adult_biometric +=
                        fact.measure(BIO_AGE_17_PLUS);
                }
                SchemaType::DemographicUpdate => total_demographic += fact.total(),
            }
        }

        Self {
            service_shadows: service_shadows(&districts),
            high_utilization: high_utilization(&pincodes),
            age_ladder: age_ladder(&states),
            student_surge: student_surge(surge, surge_seen),
            digital_maturity: digital_maturity(total_biometric, total_demographic),
            synchronized_spikes: synchronized_spikes(&daily_volume),
            migration_hotspots: Vec::new(),
            low_enrolment_districts: low_enrolment(&districts),
        }
    }
}

fn service_shadows(districts: &BTreeMap<DistrictKey, DistrictTally>) -> Vec<ServiceShadow> {
    let mut out: Vec<ServiceShadow> = districts
        .iter()
        .filter(|(_, t)| t.total_enrolments > SHADOW_MIN_ENROLMENT && t.adult_biometric == 0)
        .map(|(key, t)| ServiceShadow {
            state: key.state.clone(),
            district: key.district.clone(),
            total_enrolments: t.total_enrolments,
            adult_enrolments: t.adult_enrolments,
        })
        .collect();
    // Stable sort keeps key order among equal totals
    out.sort_by(|a, b| b.total_enrolments.cmp(&a.total_enrolments));
    out
}

fn high_utilization(pincodes: &BTreeMap<String, PincodeTally>) -> Vec<UtilizationEntry> {
    let mut out: Vec<UtilizationEntry> = pincodes
        .iter()
        .filter_map(|(code, tally)| {
            let key = tally.key.as_ref()?;
            let max_daily = tally.daily.values().copied().max()?;
            if max_daily == 0 {
                return None;
            }
            let total: u64 = tally.daily.values().sum();
            let avg_daily = total as f64 / tally.daily.len() as f64;
            let utilization_pct = avg_daily / max_daily as f64 * 100.0;
            (utilization_pct > UTILIZATION_FLAG_PCT).then(|| UtilizationEntry {
                state: key.state.clone(),
                district: key.district.clone(),
                pincode: code.clone(),
                utilization_pct,
                avg_daily,
                max_daily,
                total,
            })
        })
        .collect();
    out.sort_by(|a, b| b.utilization_pct.total_cmp(&a.utilization_pct));
    out.truncate(TOP_N_UTILIZATION);
    out
}

fn age_ladder(states: &BTreeMap<String, StateTally>) -> Vec<AgeLadderRung> {
    let mut out: Vec<AgeLadderRung> = states
        .iter()
        .map(|(state, t)| {
            let total = t.age_0_5 + t.age_5_17 + t.age_18_greater;
            let adult_pct = if total > 0 {
                round_to(t.age_18_greater as f64 / total as f64 * 100.0, 1)
            } else {
                0.0
            };
            AgeLadderRung {
                state: state.clone(),
                age_0_5: t.age_0_5,
                age_5_17: t.age_5_17,
                age_18_greater: t.age_18_greater,
                total,
                adult_pct,
                is_anomaly: adult_pct > ADULT_SHARE_ANOMALY_PCT,
            }
        })
        .collect();
    out.sort_by(|a, b| b.total.cmp(&a.total));
    out
}

fn student_surge(monthly: [u64; 12], seen: bool) -> StudentSurge {
    if !seen {
        return StudentSurge::default();
    }
    // First month wins a tie
    let (peak, value) = monthly
        .iter()
        .enumerate()
        .fold((0, 0), |best, (month, v)| if *v > best.1 { (month, *v) } else { best });
    StudentSurge {
        monthly,
        peak_month: Some(MONTH_ABBREVIATIONS[peak].to_string()),
        peak_value: value,
    }
}

fn digital_maturity(total_biometric: u64, total_demographic: u64) -> DigitalMaturity {
    let score = if total_demographic == 0 {
        DIGITAL_MATURITY_NO_DEMOGRAPHIC
    } else {
        total_biometric as f64 / total_demographic as f64
    };
    let (classification, recommendation) = if score < DIGITAL_MATURITY_FIXING_BELOW {
        (DigitalMaturityClass::FixingPhase, DIGITAL_RECOMMEND_FIXING)
    } else if score < DIGITAL_MATURITY_MATURE_FROM {
        (DigitalMaturityClass::NormalOperation, DIGITAL_RECOMMEND_NORMAL)
    } else {
        (DigitalMaturityClass::MatureUsage, DIGITAL_RECOMMEND_MATURE)
    };
    DigitalMaturity {
        score: round_to(score, 2),
        classification,
        recommendation: recommendation.to_string(),
        total_biometric,
        total_demographic,
    }
}

/// Days whose combined volume sits more than `SPIKE_Z_SCORE` sample deviations from the mean.
fn synchronized_spikes(daily: &BTreeMap<NaiveDate, u64>) -> Vec<SpikeDay> {
    if daily.len() < 2 {
        return Vec::new();
    }
    let n = daily.len() as f64;
    let mean = daily.values().map(|v| *v as f64).sum::<f64>() / n;
    let std = (daily.values().map(|v| (*v as f64 - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt();
    if std == 0.0 {
        return Vec::new();
    }
    daily
        .iter()
        .filter_map(|(date, volume)| {
            let z_score = (*volume as f64 - mean) / std;
            (z_score.abs() > SPIKE_Z_SCORE).then_some(SpikeDay {
                date: *date,
                volume: *volume,
                z_score,
            })
        })
        .collect()
}

fn low_enrolment(districts: &BTreeMap<DistrictKey, DistrictTally>) -> Vec<LowEnrolmentDistrict> {
    let mut out: Vec<LowEnrolmentDistrict> = districts
        .iter()
        .filter(|(_, t)| t.total_enrolments > 0 && t.total_enrolments < LOW_ENROLMENT_DISTRICT_MAX)
        .map(|(key, t)| LowEnrolmentDistrict {
            state: key.state.clone(),
            district: key.district.clone(),
            total_enrolments: t.total_enrolments,
        })
        .collect();
    out.sort_by_key(|d| d.total_enrolments);
    out
}

/// Flagged migration hotspots, highest MII first, each with a verdict.
pub fn migration_hotspots(districts: &BTreeMap<DistrictKey, ScoreOutcome>) -> Vec<MigrationHotspot> {
    let mut out: Vec<MigrationHotspot> = districts
        .values()
        .filter_map(ScoreOutcome::features)
        .filter(|fv| fv.is_migration_hotspot())
        .filter_map(|fv| {
            let mii = fv.mii?;
            Some(MigrationHotspot {
                state: fv.state.clone(),
                district: fv.district.clone(),
                mii,
                verdict: MigrationVerdict::for_mii(mii),
            })
        })
        .collect();
    out.sort_by(|a, b| b.mii.total_cmp(&a.mii));
    out
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}
