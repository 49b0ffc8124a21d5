use chrono::{Duration, NaiveDate};
use pricing_tool::price_history::{TrendConfig, analyze_samples};
use pricing_tool::{EngineState, PriceSample, TrendDirection, VolatilityBucket};

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn sample(resource: &str, date: NaiveDate, price: f64) -> PriceSample {
    PriceSample {
        resource_id: resource.into(),
        date,
        price,
        source: Some("survey".into()),
        notes: None,
    }
}

fn monthly_series(start: NaiveDate, prices: &[f64]) -> Vec<PriceSample> {
    prices
        .iter()
        .enumerate()
        .map(|(idx, price)| sample("ST-1", start + Duration::days(30 * idx as i64), *price))
        .collect()
}

#[test]
fn rising_series_scenario() {
    // Six monthly samples 1000..1250: +25%, an exact fit, medium CV.
    let samples = monthly_series(d(2026, 1, 1), &[1000.0, 1050.0, 1100.0, 1150.0, 1200.0, 1250.0]);
    let report = analyze_samples("ST-1", &samples, None, &TrendConfig::default()).unwrap();

    let stats = report.stats.unwrap();
    assert_eq!(stats.count, 6);
    assert_eq!(stats.mean, 1125.0);
    assert_eq!(stats.median, 1125.0);
    assert_eq!(stats.min, 1000.0);
    assert_eq!(stats.max, 1250.0);
    assert_eq!(stats.duration_days, 150);

    let change = report.change.unwrap();
    assert_eq!(change.absolute, 250.0);
    assert_eq!(change.percentage, 0.25);
    assert!(change.annualized > 0.5); // 25% over ~5 months compounds past 50%/yr

    let trend = report.trend.unwrap();
    assert_eq!(trend.direction, TrendDirection::Upward);
    assert!((trend.slope - 50.0 / 30.0).abs() < 1e-9);
    assert_eq!(trend.r_squared, 1.0);
    assert!(trend.p_value < 0.05);

    let volatility = report.volatility.unwrap();
    assert!((volatility.coefficient_of_variation - 8.3148).abs() < 0.01);
    assert_eq!(volatility.bucket, VolatilityBucket::Medium);
}

#[test]
fn falling_series_reads_downward() {
    let samples = monthly_series(d(2026, 1, 1), &[1250.0, 1200.0, 1150.0, 1100.0, 1050.0, 1000.0]);
    let report = analyze_samples("ST-1", &samples, None, &TrendConfig::default()).unwrap();
    assert_eq!(report.trend.unwrap().direction, TrendDirection::Downward);
    assert_eq!(report.change.unwrap().percentage, -0.2);
}

#[test]
fn noisy_flat_series_has_no_significant_trend() {
    let samples = monthly_series(
        d(2026, 1, 1),
        &[1000.0, 1040.0, 980.0, 1025.0, 995.0, 1010.0],
    );
    let report = analyze_samples("ST-1", &samples, None, &TrendConfig::default()).unwrap();
    assert_eq!(
        report.trend.unwrap().direction,
        TrendDirection::NoSignificantTrend
    );
}

#[test]
fn volatility_buckets_follow_thresholds() {
    // Tight series: CV below 5%.
    let calm = monthly_series(d(2026, 1, 1), &[1000.0, 1005.0, 995.0, 1002.0]);
    let report = analyze_samples("ST-1", &calm, None, &TrendConfig::default()).unwrap();
    assert_eq!(report.volatility.unwrap().bucket, VolatilityBucket::Low);

    // Wild series: CV above 15%.
    let wild = monthly_series(d(2026, 1, 1), &[1000.0, 1500.0, 700.0, 1400.0]);
    let report = analyze_samples("ST-1", &wild, None, &TrendConfig::default()).unwrap();
    assert_eq!(report.volatility.unwrap().bucket, VolatilityBucket::High);
}

#[test]
fn one_sample_returns_stats_without_change_or_trend() {
    let samples = vec![sample("ST-1", d(2026, 1, 1), 980.0)];
    let report = analyze_samples("ST-1", &samples, None, &TrendConfig::default()).unwrap();
    let stats = report.stats.unwrap();
    assert_eq!(stats.count, 1);
    assert_eq!(stats.mean, 980.0);
    assert_eq!(stats.range, 0.0);
    assert!(report.change.is_none());
    assert!(report.trend.is_none());
    assert!(report.volatility.is_none());
}

#[test]
fn two_samples_give_change_but_no_regression() {
    let samples = vec![
        sample("ST-1", d(2026, 1, 1), 1000.0),
        sample("ST-1", d(2026, 2, 1), 1100.0),
    ];
    let report = analyze_samples("ST-1", &samples, None, &TrendConfig::default()).unwrap();
    assert!(report.change.is_some());
    assert!(report.trend.is_none());
}

#[test]
fn no_samples_is_insufficient_history() {
    let err = analyze_samples("ST-1", &[], None, &TrendConfig::default()).unwrap_err();
    assert_eq!(err.kind(), "InsufficientHistory");
}

#[test]
fn date_window_filters_samples() {
    let samples = monthly_series(d(2026, 1, 1), &[1000.0, 1050.0, 1100.0, 1150.0]);
    let report = analyze_samples(
        "ST-1",
        &samples,
        Some((d(2026, 1, 15), d(2026, 3, 15))),
        &TrendConfig::default(),
    )
    .unwrap();
    assert_eq!(report.stats.unwrap().count, 2);
}

#[test]
fn engine_state_trend_uses_recorded_samples() {
    let mut state = EngineState::new();
    for (offset, price) in [(0, 100.0), (30, 105.0), (60, 111.0), (90, 118.0)] {
        state
            .price_history
            .record_sample(sample("ST-9", d(2026, 1, 1) + Duration::days(offset), price))
            .unwrap();
    }
    let report = state.price_trend("ST-9", None).unwrap();
    assert_eq!(report.stats.unwrap().count, 4);
    assert_eq!(report.trend.unwrap().direction, TrendDirection::Upward);

    assert_eq!(
        state.price_trend("missing", None).unwrap_err().kind(),
        "InsufficientHistory"
    );
}
