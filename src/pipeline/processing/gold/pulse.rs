//! Pulse Analytics: the per-district (or per-pincode) scoring formulas.
//!
//! Every function here is pure. Zero denominators yield `None`, never `0` or `NaN`.

use crate::config::{GoldConfig, Thresholds};
use crate::constants::{
    SCHOOL_DRIVE_DAYS, TLP_RECOMMEND_BALANCED, TLP_RECOMMEND_EMPTY, TLP_RECOMMEND_SCHOOL, TLP_RECOMMEND_WEEKEND,
    WEEKEND_DAYS,
};
use crate::domain::{
    DhrClass, EvaluationWindow, FeatureVector, MiiClass, OvsClass, ScoreOutcome, TlpClass, WeekdayProfile,
};
use chrono::{Datelike, NaiveDate};
use std::collections::BTreeMap;

/// Windowed inputs for one district or pincode.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesInput {
    pub state: String,
    pub district: String,
    pub pincode: Option<String>,
    /// Total enrolment per day; only days with enrolment rows are present
    pub daily_enrolment: BTreeMap<NaiveDate, u64>,
    pub adult_enrolment: u64,
    pub biometric_updates: u64,
    pub demographic_updates: u64,
}

impl SeriesInput {
    pub fn enrolment_total(&self) -> u64 {
        self.daily_enrolment.values().sum()
    }
}

/// OVS: sample standard deviation over mean, times ten.
pub fn operational_volatility(series: &[f64]) -> Option<f64> {
    if series.len() < 2 {
        return None;
    }
    let n = series.len() as f64;
    let mean = series.iter().sum::<f64>() / n;
    if mean == 0.0 {
        return None;
    }
    let variance = series.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some(variance.sqrt() / mean * 10.0)
}

pub fn classify_ovs(ovs: f64, thresholds: &Thresholds) -> OvsClass {
    if ovs > thresholds.ovs_camp {
        OvsClass::TemporaryCamp
    } else {
        OvsClass::PermanentCenter
    }
}

/// MII: share of enrolment that is adult.
pub fn migration_impact(adult: u64, total: u64) -> Option<f64> {
    if total == 0 {
        return None;
    }
    Some(adult as f64 / total as f64)
}

pub fn classify_mii(mii: f64, thresholds: &Thresholds) -> MiiClass {
    if mii > thresholds.mii_hotspot {
        MiiClass::MigrationHotspot
    } else if mii < thresholds.mii_birth_rate {
        MiiClass::BirthRateDriven
    } else {
        MiiClass::MixedPopulation
    }
}

/// DHR: correction volume relative to new enrolment.
pub fn data_hygiene(biometric: u64, demographic: u64, enrolment: u64) -> Option<f64> {
    if enrolment == 0 {
        return None;
    }
    Some((biometric + demographic) as f64 / enrolment as f64)
}

pub fn classify_dhr(dhr: f64, thresholds: &Thresholds) -> DhrClass {
    if dhr > thresholds.dhr_high_risk {
        DhrClass::HighRisk
    } else {
        DhrClass::NormalMaintenance
    }
}

/// Monthly load share, January first. All zeros when there is no volume.
pub fn monthly_load_profile(daily: &BTreeMap<NaiveDate, u64>) -> [f64; 12] {
    let mut volume = [0u64; 12];
    for (date, count) in daily {
        volume[date.month0() as usize] += count;
    }
    shares(&volume)
}

pub fn weekday_profile(daily: &BTreeMap<NaiveDate, u64>, thresholds: &Thresholds) -> WeekdayProfile {
    let mut volume = [0u64; 7];
    for (date, count) in daily {
        volume[date.weekday().num_days_from_monday() as usize] += count;
    }

    if volume.iter().sum::<u64>() == 0 {
        return WeekdayProfile {
            shares: [0.0; 7],
            classification: TlpClass::Balanced,
            recommendation: TLP_RECOMMEND_EMPTY.to_string(),
        };
    }

    let shares = shares(&volume);
    let weekend: f64 = WEEKEND_DAYS.iter().map(|d| shares[*d]).sum();
    let school: f64 = SCHOOL_DRIVE_DAYS.iter().map(|d| shares[*d]).sum();

    let (classification, recommendation) = if weekend > thresholds.tlp_weekend {
        (TlpClass::WeekendWarrior, TLP_RECOMMEND_WEEKEND)
    } else if school > thresholds.tlp_school_drive {
        (TlpClass::SchoolDrive, TLP_RECOMMEND_SCHOOL)
    } else {
        (TlpClass::Balanced, TLP_RECOMMEND_BALANCED)
    };

    WeekdayProfile {
        shares,
        classification,
        recommendation: recommendation.to_string(),
    }
}

fn shares<const N: usize>(volume: &[u64; N]) -> [f64; N] {
    let total: u64 = volume.iter().sum();
    let mut out = [0.0; N];
    if total == 0 {
        return out;
    }
    for (share, count) in out.iter_mut().zip(volume.iter()) {
        *share = *count as f64 / total as f64;
    }
    out
}

/// Percentage change of enrolment from the first half of the window to the second.
pub fn growth_rate(daily: &BTreeMap<NaiveDate, u64>, window: &EvaluationWindow) -> Option<f64> {
    let midpoint = window.midpoint();
    let (mut first, mut second) = (0u64, 0u64);
    for (date, count) in daily {
        if !window.contains(*date) {
            continue;
        }
        if *date <= midpoint {
            first += count;
        } else {
            second += count;
        }
    }
    if first == 0 {
        return None;
    }
    Some((second as f64 - first as f64) / first as f64 * 100.0)
}

/// Score one series, or report it as too thin to score.
pub fn score(
    input: &SeriesInput,
    window: &EvaluationWindow,
    config: &GoldConfig,
    thresholds: &Thresholds,
) -> ScoreOutcome {
    let observations = input.daily_enrolment.len();
    if observations < config.min_observations {
        return ScoreOutcome::InsufficientData {
            state: input.state.clone(),
            district: input.district.clone(),
            pincode: input.pincode.clone(),
            observations,
            required: config.min_observations,
        };
    }

    let series: Vec<f64> = input.daily_enrolment.values().map(|v| *v as f64).collect();
    let enrolment = input.enrolment_total();

    let transactions = enrolment + input.biometric_updates + input.demographic_updates;

    let ovs = operational_volatility(&series);
    let mii = migration_impact(input.adult_enrolment, enrolment);
    let dhr = data_hygiene(input.biometric_updates, input.demographic_updates, enrolment);

    // Low-volume series keep their scores but never raise a flag
    let ovs_class = ovs.map(|v| match classify_ovs(v, thresholds) {
        OvsClass::TemporaryCamp if enrolment < thresholds.min_volume_camp_flag => OvsClass::PermanentCenter,
        class => class,
    });
    let mii_class = mii.map(|v| match classify_mii(v, thresholds) {
        MiiClass::MigrationHotspot if enrolment < thresholds.min_enrolment_migration_flag => {
            MiiClass::MixedPopulation
        }
        class => class,
    });
    let dhr_class = dhr.map(|v| match classify_dhr(v, thresholds) {
        DhrClass::HighRisk if transactions < thresholds.min_transactions_fraud_flag => DhrClass::NormalMaintenance,
        class => class,
    });

    ScoreOutcome::Scored(FeatureVector {
        state: input.state.clone(),
        district: input.district.clone(),
        pincode: input.pincode.clone(),
        window_start: window.start,
        window_end: window.end,
        observations,
        ovs,
        ovs_class,
        mii,
        mii_class,
        dhr,
        dhr_class,
        tlp: monthly_load_profile(&input.daily_enrolment),
        weekday_profile: weekday_profile(&input.daily_enrolment, thresholds),
        enrolment_count: enrolment,
        adult_enrolment_count: input.adult_enrolment,
        biometric_updates: input.biometric_updates,
        demographic_updates: input.demographic_updates,
        growth_rate: growth_rate(&input.daily_enrolment, window),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    fn daily(values: &[u64]) -> BTreeMap<NaiveDate, u64> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| (day(i as u32 + 1), *v))
            .collect()
    }

    #[test]
    fn test_ovs_constant_series_is_zero() {
        let ovs = operational_volatility(&[25.0; 10]).unwrap();
        assert_eq!(ovs, 0.0);
        assert_eq!(classify_ovs(ovs, &Thresholds::default()), OvsClass::PermanentCenter);
    }

    #[test]
    fn test_ovs_spiky_series_is_camp() {
        let ovs = operational_volatility(&[10.0, 10.0, 10.0, 500.0, 10.0]).unwrap();
        assert!(ovs > 4.0, "ovs was {}", ovs);
        assert_eq!(classify_ovs(ovs, &Thresholds::default()), OvsClass::TemporaryCamp);
    }

    #[test]
    fn test_ovs_undefined_for_zero_mean() {
        assert_eq!(operational_volatility(&[0.0, 0.0, 0.0]), None);
        assert_eq!(operational_volatility(&[3.0]), None);
    }

    #[test]
    fn test_mii_boundary_is_not_hotspot() {
        let mii = migration_impact(400, 1000).unwrap();
        assert!((mii - 0.40).abs() < 1e-12);
        assert_eq!(classify_mii(mii, &Thresholds::default()), MiiClass::MixedPopulation);
        assert_eq!(classify_mii(0.41, &Thresholds::default()), MiiClass::MigrationHotspot);
        assert_eq!(classify_mii(0.04, &Thresholds::default()), MiiClass::BirthRateDriven);
        assert_eq!(classify_mii(0.05, &Thresholds::default()), MiiClass::MixedPopulation);
        assert_eq!(migration_impact(0, 0), None);
    }

    #[test]
    fn test_dhr_boundary_is_not_high_risk() {
        let dhr = data_hygiene(100, 50, 100).unwrap();
        assert_eq!(dhr, 1.5);
        assert_eq!(classify_dhr(dhr, &Thresholds::default()), DhrClass::NormalMaintenance);
        assert_eq!(classify_dhr(1.51, &Thresholds::default()), DhrClass::HighRisk);
        assert_eq!(data_hygiene(10, 10, 0), None);
    }

    #[test]
    fn test_weekday_profile_weekend_warrior() {
        // 2025-03-01 is a Saturday, 2025-03-02 a Sunday, 2025-03-03 a Monday
        let mut series = BTreeMap::new();
        series.insert(day(1), 40);
        series.insert(day(2), 30);
        series.insert(day(3), 30);
        let profile = weekday_profile(&series, &Thresholds::default());
        assert_eq!(profile.classification, TlpClass::WeekendWarrior);
        assert_eq!(profile.recommendation, TLP_RECOMMEND_WEEKEND);
        assert!((profile.shares[5] - 0.4).abs() < 1e-12);
        assert!((profile.shares.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_weekday_profile_school_drive_and_empty() {
        // 2025-03-04 Tuesday, 2025-03-05 Wednesday, 2025-03-07 Friday
        let mut series = BTreeMap::new();
        series.insert(day(4), 40);
        series.insert(day(5), 40);
        series.insert(day(7), 20);
        let profile = weekday_profile(&series, &Thresholds::default());
        assert_eq!(profile.classification, TlpClass::SchoolDrive);

        let empty = weekday_profile(&BTreeMap::new(), &Thresholds::default());
        assert_eq!(empty.classification, TlpClass::Balanced);
        assert_eq!(empty.recommendation, TLP_RECOMMEND_EMPTY);
    }

    #[test]
    fn test_monthly_profile_sums_to_one() {
        let mut series = daily(&[10, 10]);
        series.insert(NaiveDate::from_ymd_opt(2025, 4, 1).unwrap(), 20);
        let tlp = monthly_load_profile(&series);
        assert_eq!(tlp[2], 0.5);
        assert_eq!(tlp[3], 0.5);
        assert_eq!(monthly_load_profile(&BTreeMap::new()), [0.0; 12]);
    }

    #[test]
    fn test_growth_rate_compares_window_halves() {
        let window = EvaluationWindow::trailing(day(10), 10);
        // first half: 1..=5, second half: 6..=10
        let series = daily(&[10, 10, 10, 10, 10, 15, 15, 15, 15, 15]);
        let growth = growth_rate(&series, &window).unwrap();
        assert!((growth - 50.0).abs() < 1e-9);

        let late_only = daily(&[0, 0, 0, 0, 0, 5]);
        assert_eq!(growth_rate(&late_only, &window), None);
    }

    #[test]
    fn test_three_observations_are_insufficient() {
        let input = SeriesInput {
            state: "KERALA".into(),
            district: "IDUKKI".into(),
            daily_enrolment: daily(&[5, 6, 7]),
            ..Default::default()
        };
        let window = EvaluationWindow::trailing(day(3), 90);
        let outcome = score(&input, &window, &GoldConfig::default(), &Thresholds::default());
        assert_eq!(
            outcome,
            ScoreOutcome::InsufficientData {
                state: "KERALA".into(),
                district: "IDUKKI".into(),
                pincode: None,
                observations: 3,
                required: 7,
            }
        );
        assert!(outcome.features().is_none());
    }

    #[test]
    fn test_score_fills_every_parameter() {
        let input = SeriesInput {
            state: "KARNATAKA".into(),
            district: "MYSURU".into(),
            pincode: None,
            daily_enrolment: daily(&[100, 100, 100, 100, 100, 100, 100, 100]),
            adult_enrolment: 400,
            biometric_updates: 600,
            demographic_updates: 700,
        };
        let window = EvaluationWindow::trailing(day(8), 8);
        let outcome = score(&input, &window, &GoldConfig::default(), &Thresholds::default());
        let fv = outcome.features().unwrap();
        assert_eq!(fv.observations, 8);
        assert_eq!(fv.ovs, Some(0.0));
        assert_eq!(fv.mii, Some(0.5));
        assert_eq!(fv.mii_class, Some(MiiClass::MigrationHotspot));
        assert_eq!(fv.dhr, Some(1.625));
        assert!(fv.is_high_risk());
        assert_eq!(fv.growth_rate, Some(0.0));
        assert_eq!(fv.enrolment_count, 800);
    }

    #[test]
    fn test_volume_guards_suppress_flags_on_small_series() {
        let input = SeriesInput {
            state: "GOA".into(),
            district: "NORTH GOA".into(),
            pincode: None,
            daily_enrolment: daily(&[1, 1, 1, 1, 1, 1, 60]),
            adult_enrolment: 40,
            biometric_updates: 100,
            demographic_updates: 50,
        };
        let window = EvaluationWindow::trailing(day(7), 7);

        let unguarded = score(&input, &window, &GoldConfig::default(), &Thresholds::default());
        let fv = unguarded.features().unwrap();
        assert!(fv.is_volatile_camp());
        assert!(fv.is_migration_hotspot());
        assert!(fv.is_high_risk());

        let thresholds = Thresholds {
            min_volume_camp_flag: 500,
            min_enrolment_migration_flag: 100,
            min_transactions_fraud_flag: 1000,
            ..Thresholds::default()
        };
        let guarded = score(&input, &window, &GoldConfig::default(), &thresholds);
        let fv = guarded.features().unwrap();
        assert_eq!(fv.ovs_class, Some(OvsClass::PermanentCenter));
        assert_eq!(fv.mii_class, Some(MiiClass::MixedPopulation));
        assert_eq!(fv.dhr_class, Some(DhrClass::NormalMaintenance));
        // The scores themselves are unchanged
        assert_eq!(fv.ovs, unguarded.features().unwrap().ovs);
        assert_eq!(fv.dhr, Some(150.0 / 66.0));
    }
}
