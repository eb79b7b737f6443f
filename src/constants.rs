/// Column signatures and fixed labels shared across the pipeline stages.
/// Thresholds live in `config::Thresholds` so deployments can tune them.
use crate::domain::SchemaType;

// Columns common to every record type
pub const COL_DATE: &str = "date";
pub const COL_STATE: &str = "state";
pub const COL_DISTRICT: &str = "district";
pub const COL_PINCODE: &str = "pincode";

// Enrolment measures
pub const AGE_0_5: &str = "age_0_5";
pub const AGE_5_17: &str = "age_5_17";
pub const AGE_18_GREATER: &str = "age_18_greater";

// Biometric update measures
pub const BIO_AGE_5_17: &str = "bio_age_5_17";
pub const BIO_AGE_17_PLUS: &str = "bio_age_17_";

// Demographic update measures
pub const DEMO_AGE_5_17: &str = "demo_age_5_17";
pub const DEMO_AGE_17_PLUS: &str = "demo_age_17_";

const ENROLMENT_MEASURES: &[&str] = &[AGE_0_5, AGE_5_17, AGE_18_GREATER];
const BIOMETRIC_MEASURES: &[&str] = &[BIO_AGE_5_17, BIO_AGE_17_PLUS];
const DEMOGRAPHIC_MEASURES: &[&str] = &[DEMO_AGE_5_17, DEMO_AGE_17_PLUS];

pub const DIMENSION_COLUMNS: &[&str] = &[COL_DATE, COL_STATE, COL_DISTRICT, COL_PINCODE];

/// The count columns a record type carries, in signature order.
pub fn measure_columns(schema: SchemaType) -> &'static [&'static str] {
    match schema {
        SchemaType::Enrolment => ENROLMENT_MEASURES,
        SchemaType::BiometricUpdate => BIOMETRIC_MEASURES,
        SchemaType::DemographicUpdate => DEMOGRAPHIC_MEASURES,
    }
}

/// Full required column set for a record type: dimensions followed by measures.
pub fn required_columns(schema: SchemaType) -> Vec<&'static str> {
    DIMENSION_COLUMNS
        .iter()
        .chain(measure_columns(schema).iter())
        .copied()
        .collect()
}

// Accepted calendar years; anything outside is treated as a typo
pub const MIN_ACCEPTED_YEAR: i32 = 1900;
pub const MAX_ACCEPTED_YEAR: i32 = 2100;

pub const DAY_NAMES: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

// Weekday indices (Monday = 0)
pub const WEEKEND_DAYS: [usize; 2] = [5, 6];
pub const SCHOOL_DRIVE_DAYS: [usize; 2] = [1, 2];

pub const TOP_N_SUMMARY: usize = 10;

pub const TLP_RECOMMEND_WEEKEND: &str = "Deploy Mobile Van on Saturdays and Sundays";
pub const TLP_RECOMMEND_SCHOOL: &str = "Coordinate with schools for Tuesday/Wednesday drives";
pub const TLP_RECOMMEND_BALANCED: &str = "Standard staffing schedule recommended";
pub const TLP_RECOMMEND_EMPTY: &str = "Insufficient data for scheduling recommendation";

// Maturity classifier: every k-means cluster must hold this share of districts,
// otherwise labels come from growth and volatility quantiles
pub const MIN_CLUSTER_SHARE: f64 = 0.10;
pub const QUANTILE_CUT_PERCENTILE: f64 = 67.0;

pub const MONTH_ABBREVIATIONS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

// Operational insights
pub const SHADOW_MIN_ENROLMENT: u64 = 50;
pub const UTILIZATION_FLAG_PCT: f64 = 90.0;
pub const TOP_N_UTILIZATION: usize = 5;
pub const ADULT_SHARE_ANOMALY_PCT: f64 = 10.0;
pub const SPIKE_Z_SCORE: f64 = 3.0;
/// Districts with less window enrolment than this are listed as stalled
pub const LOW_ENROLMENT_DISTRICT_MAX: u64 = 100;
pub const MIGRATION_LABOR_INFLUX: f64 = 0.6;
pub const MIGRATION_SETTLEMENT: f64 = 0.5;
/// Biometric to demographic ratio reported when there are no demographic updates
pub const DIGITAL_MATURITY_NO_DEMOGRAPHIC: f64 = 2.0;
pub const DIGITAL_MATURITY_FIXING_BELOW: f64 = 0.5;
pub const DIGITAL_MATURITY_MATURE_FROM: f64 = 1.5;

pub const DIGITAL_RECOMMEND_FIXING: &str = "High address change volume - investigate data quality";
pub const DIGITAL_RECOMMEND_NORMAL: &str = "Healthy balance of updates";
pub const DIGITAL_RECOMMEND_MATURE: &str = "Strong biometric verification culture";

/// Namespace for deterministic batch ids derived from file content hashes.
pub const BATCH_ID_NAMESPACE: uuid::Uuid = uuid::Uuid::from_u128(0x6a1f_3c52_9e0b_4d7a_8c21_55e3_b0f4_1d97);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_columns_start_with_dimensions() {
        let cols = required_columns(SchemaType::BiometricUpdate);
        assert_eq!(
            cols,
            vec!["date", "state", "district", "pincode", "bio_age_5_17", "bio_age_17_"]
        );
    }

    #[test]
    fn test_enrolment_has_three_measures() {
        assert_eq!(measure_columns(SchemaType::Enrolment).len(), 3);
        assert_eq!(required_columns(SchemaType::Enrolment).len(), 7);
    }
}
