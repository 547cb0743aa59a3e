//! Summary statistics and histograms of column values.

use std::collections::HashMap;

use serde::Serialize;

/// One histogram bin covering `[x, x + dx)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bin {
    pub x: f64,
    pub dx: f64,
    /// Number of values in the bin.
    pub y: usize,
}

/// Statistics of a number column over a set of rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Number of rows, including missing ones.
    pub count: usize,
    pub max_bin: usize,
    pub hist: Vec<Bin>,
    /// Number of rows without a value.
    pub missing: usize,
}

/// Count of one category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryCount {
    pub cat: String,
    pub y: usize,
}

/// Histogram of a categorical column over a set of rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoricalStatistics {
    pub max_bin: usize,
    pub hist: Vec<CategoryCount>,
    /// Number of rows without any category.
    pub missing: usize,
}

/// Number of histogram bins for `count` values (Sturges' formula).
pub fn number_of_bins(count: usize) -> usize {
    if count == 0 {
        return 1;
    }
    (count as f64).log2().ceil() as usize + 1
}

/// Summarize `values` (NaN marks a missing value) binned over `range`.
///
/// Values outside `range` count towards min/max/mean but are not binned.
pub fn compute_stats(values: &[f64], range: [f64; 2]) -> Statistics {
    compute_stats_with_bins(values, range, number_of_bins(values.len()))
}

pub fn compute_stats_with_bins(values: &[f64], range: [f64; 2], bins: usize) -> Statistics {
    if values.is_empty() {
        return Statistics {
            min: f64::NAN,
            max: f64::NAN,
            mean: f64::NAN,
            count: 0,
            max_bin: 0,
            hist: Vec::new(),
            missing: 0,
        };
    }

    let present: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    let missing = values.len() - present.len();

    let bins = bins.max(1);
    let [lo, hi] = range;
    let dx = (hi - lo) / bins as f64;
    let mut hist: Vec<Bin> = (0..bins)
        .map(|i| Bin {
            x: lo + i as f64 * dx,
            dx,
            y: 0,
        })
        .collect();
    for &v in &present {
        if v < lo || v > hi {
            continue;
        }
        let index = if dx > 0.0 {
            (((v - lo) / dx).floor() as usize).min(bins - 1)
        } else {
            0
        };
        hist[index].y += 1;
    }

    let (min, max, mean) = if present.is_empty() {
        (f64::NAN, f64::NAN, f64::NAN)
    } else {
        (
            present.iter().copied().fold(f64::INFINITY, f64::min),
            present.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            present.iter().sum::<f64>() / present.len() as f64,
        )
    };

    Statistics {
        min,
        max,
        mean,
        count: values.len(),
        max_bin: hist.iter().map(|b| b.y).max().unwrap_or(0),
        hist,
        missing,
    }
}

/// Count categories of each row.
///
/// Known `categories` come first in their order, with zero counts kept;
/// unknown categories follow in order of appearance.
pub fn compute_hist(rows: &[Vec<String>], categories: &[String]) -> CategoricalStatistics {
    let mut hist: Vec<CategoryCount> = categories
        .iter()
        .map(|cat| CategoryCount {
            cat: cat.clone(),
            y: 0,
        })
        .collect();
    let mut index: HashMap<String, usize> = categories
        .iter()
        .enumerate()
        .map(|(i, cat)| (cat.clone(), i))
        .collect();
    let mut missing = 0;

    for row in rows {
        if row.is_empty() {
            missing += 1;
            continue;
        }
        for cat in row {
            let slot = *index.entry(cat.clone()).or_insert_with(|| {
                hist.push(CategoryCount {
                    cat: cat.clone(),
                    y: 0,
                });
                hist.len() - 1
            });
            hist[slot].y += 1;
        }
    }

    CategoricalStatistics {
        max_bin: hist.iter().map(|c| c.y).max().unwrap_or(0),
        hist,
        missing,
    }
}
