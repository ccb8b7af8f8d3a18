//! Sample dataset served to users without an uploaded dataset of their own
//! (when configuration allows it).
//!
//! Loaded from a CSV when one is configured and readable, otherwise generated
//! deterministically from a seed: 50 companies over 2015 to 2025 with uniform
//! random metrics.

use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::Result;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use super::source;
use super::{Cell, Dataset};

const COMPANY_COUNT: i64 = 50;
const FIRST_YEAR: i64 = 2015;
const LAST_YEAR: i64 = 2025;

const INDUSTRIES: [&str; 5] = ["Retail", "Technology", "Healthcare", "Finance", "Energy"];
const REGIONS: [&str; 4] = ["North America", "Europe", "Asia", "Latin America"];

/// Uniform ranges for generated metrics, in column order after `Year`.
const METRIC_RANGES: [(&str, f64, f64); 11] = [
    ("Revenue", 100.0, 5000.0),
    ("ProfitMargin", -5.0, 15.0),
    ("MarketCap", 100.0, 20000.0),
    ("GrowthRate", -20.0, 30.0),
    ("ESG_Overall", 40.0, 80.0),
    ("ESG_Environmental", 30.0, 80.0),
    ("ESG_Social", 20.0, 90.0),
    ("ESG_Governance", 30.0, 85.0),
    ("CarbonEmissions", 10000.0, 300000.0),
    ("WaterUsage", 5000.0, 150000.0),
    ("EnergyConsumption", 20000.0, 600000.0),
];

/// Source of the fallback dataset handed out by the resolver.
pub trait DatasetProvider: Send + Sync {
    fn dataset(&self) -> Result<Dataset>;
}

/// CSV-or-generated sample data, built once per provider instance.
#[derive(Debug)]
pub struct SampleDataset {
    path: Option<PathBuf>,
    seed: u64,
    cache: OnceLock<Dataset>,
}

impl SampleDataset {
    pub fn new(path: Option<PathBuf>, seed: u64) -> Self {
        Self {
            path,
            seed,
            cache: OnceLock::new(),
        }
    }

    fn build(&self) -> Dataset {
        if let Some(path) = &self.path {
            match source::read_csv(path) {
                Ok(dataset) => return dataset,
                Err(e) => eprintln!("sample dataset: {e:#}; using generated data"),
            }
        }
        generate(self.seed)
    }
}

impl DatasetProvider for SampleDataset {
    fn dataset(&self) -> Result<Dataset> {
        Ok(self.cache.get_or_init(|| self.build()).clone())
    }
}

/// Generate the seeded sample dataset.
pub fn generate(seed: u64) -> Dataset {
    let mut rng = StdRng::seed_from_u64(seed);

    let mut columns = vec![
        "CompanyID".to_string(),
        "CompanyName".to_string(),
        "Industry".to_string(),
        "Region".to_string(),
        "Year".to_string(),
    ];
    columns.extend(METRIC_RANGES.iter().map(|(name, _, _)| name.to_string()));

    let mut dataset = Dataset::new(columns);
    for id in 1..=COMPANY_COUNT {
        for year in FIRST_YEAR..=LAST_YEAR {
            let industry = INDUSTRIES.choose(&mut rng).copied().unwrap_or(INDUSTRIES[0]);
            let region = REGIONS.choose(&mut rng).copied().unwrap_or(REGIONS[0]);

            let mut row = vec![
                Cell::Int(id),
                Cell::Text(format!("Company_{id}")),
                Cell::Text(industry.to_string()),
                Cell::Text(region.to_string()),
                Cell::Int(year),
            ];
            row.extend(
                METRIC_RANGES
                    .iter()
                    .map(|&(_, lo, hi)| Cell::Float(rng.gen_range(lo..hi))),
            );
            dataset.push_row(row);
        }
    }

    dataset
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_dataset_shape() {
        let ds = generate(42);
        assert_eq!(ds.len(), 50 * 11);
        assert_eq!(ds.columns().len(), 16);
        assert_eq!(ds.rows()[0][1], Cell::Text("Company_1".into()));
    }

    #[test]
    fn generation_is_deterministic() {
        assert_eq!(generate(7), generate(7));
        assert_ne!(generate(7), generate(8));
    }

    #[test]
    fn metrics_stay_in_range() {
        let ds = generate(42);
        let esg: Vec<f64> = ds.numbers("ESG_Overall").flatten().collect();
        assert_eq!(esg.len(), ds.len());
        assert!(esg.iter().all(|v| (40.0..80.0).contains(v)));
    }

    #[test]
    fn unreadable_path_falls_back_to_generated() {
        let provider = SampleDataset::new(Some(PathBuf::from("/nonexistent/esg.csv")), 42);
        assert_eq!(provider.dataset().unwrap(), generate(42));
    }
}
