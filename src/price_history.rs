use crate::error::{EngineError, EngineResult};
use crate::rounding::round4;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSample {
    pub resource_id: String,
    pub date: NaiveDate,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Per-resource sample series, date ascending; recording a second sample
/// for the same date replaces the first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceHistoryStore {
    series: BTreeMap<String, Vec<PriceSample>>,
}

impl PriceHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sample(&mut self, sample: PriceSample) -> EngineResult<()> {
        if sample.resource_id.trim().is_empty() {
            return Err(EngineError::validation_field(
                "price sample requires a resource id",
                "resource_id",
            ));
        }
        if !sample.price.is_finite() || sample.price < 0.0 {
            return Err(EngineError::validation_field(
                format!("price sample {} is invalid", sample.price),
                "price",
            ));
        }
        let series = self.series.entry(sample.resource_id.clone()).or_default();
        match series.binary_search_by(|existing| existing.date.cmp(&sample.date)) {
            Ok(idx) => series[idx] = sample,
            Err(idx) => series.insert(idx, sample),
        }
        Ok(())
    }

    pub fn samples(&self, resource_id: &str) -> &[PriceSample] {
        self.series
            .get(resource_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn resources(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    pub fn remove_series(&mut self, resource_id: &str) -> bool {
        self.series.remove(resource_id).is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Upward,
    Downward,
    Stable,
    NoSignificantTrend,
}

impl TrendDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendDirection::Upward => "upward",
            TrendDirection::Downward => "downward",
            TrendDirection::Stable => "stable",
            TrendDirection::NoSignificantTrend => "no_significant_trend",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolatilityBucket {
    Low,
    Medium,
    High,
}

impl VolatilityBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            VolatilityBucket::Low => "low",
            VolatilityBucket::Medium => "medium",
            VolatilityBucket::High => "high",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub range: f64,
    pub count: usize,
    pub duration_days: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeSummary {
    pub absolute: f64,
    /// (last - first) / first.
    pub percentage: f64,
    /// Compound annual rate over the sampled span.
    pub annualized: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendSummary {
    /// Price change per day.
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
    pub p_value: f64,
    pub std_err: f64,
    pub direction: TrendDirection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolatilitySummary {
    /// stddev / mean, in percent.
    pub coefficient_of_variation: f64,
    pub bucket: VolatilityBucket,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceHistoryReport {
    pub resource_id: String,
    pub status: AnalysisStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<SummaryStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change: Option<ChangeSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trend: Option<TrendSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volatility: Option<VolatilitySummary>,
}

/// Thresholds governing trend/volatility classification.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendConfig {
    pub significance_level: f64,
    /// Absolute daily slope below which a significant trend reads as
    /// stable rather than directional.
    pub stable_slope_threshold: f64,
    pub volatility_low_pct: f64,
    pub volatility_high_pct: f64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            significance_level: 0.05,
            stable_slope_threshold: 0.01,
            volatility_low_pct: 5.0,
            volatility_high_pct: 15.0,
        }
    }
}

/// Analyze one resource's samples inside an optional date window.
///
/// Needs at least 1 sample for summary stats, 2 for change rates, 3 for
/// the regression. Fewer than 1 is `InsufficientHistory`.
pub fn analyze_samples(
    resource_id: &str,
    samples: &[PriceSample],
    window: Option<(NaiveDate, NaiveDate)>,
    config: &TrendConfig,
) -> EngineResult<PriceHistoryReport> {
    let filtered: Vec<&PriceSample> = samples
        .iter()
        .filter(|sample| match window {
            Some((start, end)) => sample.date >= start && sample.date <= end,
            None => true,
        })
        .collect();

    if filtered.is_empty() {
        return Err(EngineError::InsufficientHistory {
            required: 1,
            available: 0,
        });
    }

    let prices: Vec<f64> = filtered.iter().map(|sample| sample.price).collect();
    let first = filtered.first().expect("non-empty");
    let last = filtered.last().expect("non-empty");
    let duration_days = (last.date - first.date).num_days();

    let stats = summary_stats(&prices, duration_days);

    let change = if filtered.len() >= 2 && first.price > 0.0 {
        let absolute = last.price - first.price;
        let percentage = absolute / first.price;
        let annualized = if duration_days > 0 {
            (last.price / first.price).powf(365.0 / duration_days as f64) - 1.0
        } else {
            0.0
        };
        Some(ChangeSummary {
            absolute,
            percentage: round4(percentage),
            annualized: round4(annualized),
        })
    } else {
        None
    };

    let trend = if filtered.len() >= 3 {
        Some(regress(&filtered, config))
    } else {
        None
    };

    let volatility = if filtered.len() >= 2 && stats.mean > 0.0 {
        let cv = stats.std_dev / stats.mean * 100.0;
        let bucket = if cv < config.volatility_low_pct {
            VolatilityBucket::Low
        } else if cv <= config.volatility_high_pct {
            VolatilityBucket::Medium
        } else {
            VolatilityBucket::High
        };
        Some(VolatilitySummary {
            coefficient_of_variation: round4(cv),
            bucket,
        })
    } else {
        None
    };

    Ok(PriceHistoryReport {
        resource_id: resource_id.to_string(),
        status: AnalysisStatus::Success,
        message: format!("analyzed {} samples", filtered.len()),
        stats: Some(stats),
        change,
        trend,
        volatility,
    })
}

fn summary_stats(prices: &[f64], duration_days: i64) -> SummaryStats {
    let count = prices.len();
    let min = prices.iter().copied().fold(f64::INFINITY, f64::min);
    let max = prices.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mean = prices.iter().sum::<f64>() / count as f64;

    let mut sorted = prices.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let median = if count % 2 == 1 {
        sorted[count / 2]
    } else {
        (sorted[count / 2 - 1] + sorted[count / 2]) / 2.0
    };

    // Sample standard deviation (n - 1); a single sample has no spread.
    let std_dev = if count >= 2 {
        let variance =
            prices.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / (count - 1) as f64;
        variance.sqrt()
    } else {
        0.0
    };

    SummaryStats {
        min,
        max,
        mean,
        median,
        std_dev,
        range: max - min,
        count,
        duration_days,
    }
}

/// Ordinary least squares of price on days since the first sample.
fn regress(samples: &[&PriceSample], config: &TrendConfig) -> TrendSummary {
    let n = samples.len() as f64;
    let origin = samples[0].date;
    let xs: Vec<f64> = samples
        .iter()
        .map(|sample| (sample.date - origin).num_days() as f64)
        .collect();
    let ys: Vec<f64> = samples.iter().map(|sample| sample.price).collect();

    let sum_x: f64 = xs.iter().sum();
    let sum_y: f64 = ys.iter().sum();
    let sum_xy: f64 = xs.iter().zip(&ys).map(|(x, y)| x * y).sum();
    let sum_x2: f64 = xs.iter().map(|x| x * x).sum();
    let mean_x = sum_x / n;
    let mean_y = sum_y / n;

    let sxx = sum_x2 - n * mean_x * mean_x;
    if sxx == 0.0 {
        // All samples share one date; no trend can be fitted.
        return TrendSummary {
            slope: 0.0,
            intercept: mean_y,
            r_squared: 0.0,
            p_value: 1.0,
            std_err: 0.0,
            direction: TrendDirection::NoSignificantTrend,
        };
    }

    let slope = (sum_xy - n * mean_x * mean_y) / sxx;
    let intercept = mean_y - slope * mean_x;

    let ss_tot: f64 = ys.iter().map(|y| (y - mean_y).powi(2)).sum();
    let ss_res: f64 = xs
        .iter()
        .zip(&ys)
        .map(|(x, y)| {
            let predicted = intercept + slope * x;
            (y - predicted).powi(2)
        })
        .sum();
    let r_squared = if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 1.0 };

    let df = n - 2.0;
    let std_err = if df > 0.0 { (ss_res / df / sxx).sqrt() } else { 0.0 };
    let p_value = if std_err > 0.0 {
        let t = (slope / std_err).abs();
        2.0 * (1.0 - student_t_cdf(t, df))
    } else if slope == 0.0 {
        1.0
    } else {
        // A perfect directional fit.
        0.0
    };

    let direction = if p_value < config.significance_level {
        if slope.abs() < config.stable_slope_threshold {
            TrendDirection::Stable
        } else if slope > 0.0 {
            TrendDirection::Upward
        } else {
            TrendDirection::Downward
        }
    } else {
        TrendDirection::NoSignificantTrend
    };

    TrendSummary {
        slope,
        intercept,
        r_squared: round4(r_squared),
        p_value,
        std_err,
        direction,
    }
}

/// CDF of Student's t for t >= 0 via the regularized incomplete beta
/// function (Abramowitz & Stegun 26.5.8 / 26.7.1).
fn student_t_cdf(t: f64, df: f64) -> f64 {
    if t <= 0.0 {
        return 0.5;
    }
    let x = df / (df + t * t);
    1.0 - 0.5 * incomplete_beta(df / 2.0, 0.5, x)
}

fn incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    let ln_front =
        ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln();
    let front = ln_front.exp();
    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_continued_fraction(a, b, x) / a
    } else {
        1.0 - incomplete_beta(b, a, 1.0 - x)
    }
}

fn beta_continued_fraction(a: f64, b: f64, x: f64) -> f64 {
    const MAX_ITER: usize = 200;
    const EPS: f64 = 1e-12;
    const TINY: f64 = 1e-30;

    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;
    let mut c = 1.0;
    let mut d = 1.0 - qab * x / qap;
    if d.abs() < TINY {
        d = TINY;
    }
    d = 1.0 / d;
    let mut result = d;

    for m in 1..=MAX_ITER {
        let m = m as f64;
        let m2 = 2.0 * m;

        let aa = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 + aa * d;
        if d.abs() < TINY {
            d = TINY;
        }
        c = 1.0 + aa / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1.0 / d;
        result *= d * c;

        let aa = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 + aa * d;
        if d.abs() < TINY {
            d = TINY;
        }
        c = 1.0 + aa / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1.0 / d;
        let delta = d * c;
        result *= delta;

        if (delta - 1.0).abs() < EPS {
            break;
        }
    }
    result
}

/// Lanczos approximation.
fn ln_gamma(x: f64) -> f64 {
    const COEFFICIENTS: [f64; 6] = [
        76.18009172947146,
        -86.50532032941677,
        24.01409824083091,
        -1.231739572450155,
        0.1208650973866179e-2,
        -0.5395239384953e-5,
    ];
    let mut y = x;
    let tmp = x + 5.5;
    let tmp = tmp - (x + 0.5) * tmp.ln();
    let mut series = 1.000000000190015;
    for coefficient in COEFFICIENTS {
        y += 1.0;
        series += coefficient / y;
    }
    -tmp + (2.5066282746310005 * series / x).ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(date: NaiveDate, price: f64) -> PriceSample {
        PriceSample {
            resource_id: "M-1".into(),
            date,
            price,
            source: None,
            notes: None,
        }
    }

    fn d(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn same_date_sample_keeps_the_last() {
        let mut store = PriceHistoryStore::new();
        store.record_sample(sample(d(2026, 1, 1), 100.0)).unwrap();
        store.record_sample(sample(d(2026, 1, 1), 110.0)).unwrap();
        let series = store.samples("M-1");
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].price, 110.0);
    }

    #[test]
    fn samples_stay_date_ordered() {
        let mut store = PriceHistoryStore::new();
        store.record_sample(sample(d(2026, 3, 1), 120.0)).unwrap();
        store.record_sample(sample(d(2026, 1, 1), 100.0)).unwrap();
        store.record_sample(sample(d(2026, 2, 1), 110.0)).unwrap();
        let dates: Vec<NaiveDate> = store.samples("M-1").iter().map(|s| s.date).collect();
        assert_eq!(dates, vec![d(2026, 1, 1), d(2026, 2, 1), d(2026, 3, 1)]);
    }

    #[test]
    fn monthly_rise_reads_as_upward() {
        let samples: Vec<PriceSample> = (0..6)
            .map(|idx| {
                sample(
                    d(2026, 1, 1) + chrono::Duration::days(30 * idx),
                    1000.0 + 50.0 * idx as f64,
                )
            })
            .collect();
        let report =
            analyze_samples("M-1", &samples, None, &TrendConfig::default()).unwrap();
        let change = report.change.unwrap();
        assert_eq!(change.percentage, 0.25);
        let trend = report.trend.unwrap();
        assert_eq!(trend.direction, TrendDirection::Upward);
        let volatility = report.volatility.unwrap();
        // Sample stddev 93.54 over mean 1125 -> CV about 8.3%.
        assert_eq!(volatility.bucket, VolatilityBucket::Medium);
        assert!((volatility.coefficient_of_variation - 8.3148).abs() < 0.01);
    }

    #[test]
    fn single_sample_reports_stats_only() {
        let samples = vec![sample(d(2026, 1, 1), 500.0)];
        let report =
            analyze_samples("M-1", &samples, None, &TrendConfig::default()).unwrap();
        assert_eq!(report.status, AnalysisStatus::Success);
        let stats = report.stats.unwrap();
        assert_eq!(stats.count, 1);
        assert_eq!(stats.std_dev, 0.0);
        assert!(report.change.is_none());
        assert!(report.trend.is_none());
    }

    #[test]
    fn empty_window_is_insufficient_history() {
        let samples = vec![sample(d(2026, 1, 1), 500.0)];
        let err = analyze_samples(
            "M-1",
            &samples,
            Some((d(2027, 1, 1), d(2027, 12, 31))),
            &TrendConfig::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "InsufficientHistory");
    }
}
