//! CLI command implementations.
//!
//! Provides subcommand handlers for:
//! - `esg-analytics serve`: run the HTTP API
//! - `esg-analytics query <view> --file data.csv`: run one view offline
//! - `esg-analytics config show|init|set|reset`: configuration management

use std::path::Path;

use anyhow::{Context, Result, bail};
use colored::Colorize;
use serde_json::Value;

use crate::analytics::ranking::{Category, DEFAULT_LIMIT, Performer, RankRequest};
use crate::analytics::views::{
    CorrelationMatrix, ExportView, FilterDomain, GroupSummary, Overview, TrendPoint,
};
use crate::analytics::{self, View, ViewResult};
use crate::config;
use crate::dataset::source;
use crate::filter::FilterSpec;
use crate::web;

/// Output format for `query`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
}

impl OutputFormat {
    pub fn from_str_opt(s: Option<&str>) -> Self {
        match s {
            Some("json") => Self::Json,
            _ => Self::Table,
        }
    }
}

/// Maximum rows printed by the `export` table.
const EXPORT_TABLE_ROWS: usize = 20;

// ---------------------------------------------------------------------------
// esg-analytics serve
// ---------------------------------------------------------------------------

/// Start the HTTP API, with optional command-line overrides of the config.
pub fn run_serve(addr: Option<String>, workers: Option<usize>) -> Result<()> {
    let mut cfg = config::load();
    if let Some(addr) = addr {
        cfg.server.addr = addr;
    }
    if let Some(workers) = workers {
        cfg.server.workers = workers;
    }
    web::serve(cfg)
}

// ---------------------------------------------------------------------------
// esg-analytics query
// ---------------------------------------------------------------------------

/// Options of one offline query.
#[derive(Debug, Clone)]
pub struct QueryOptions<'a> {
    pub view: &'a str,
    pub file: &'a Path,
    pub filters: Option<&'a str>,
    pub category: Option<&'a str>,
    pub limit: Option<usize>,
    pub format: OutputFormat,
}

/// Run a view over a local CSV/JSON file and print it.
pub fn run_query(opts: &QueryOptions<'_>) -> Result<()> {
    let result = query(opts)?;
    match opts.format {
        OutputFormat::Json => {
            let json =
                serde_json::to_string_pretty(&result).context("failed to serialize view")?;
            println!("{json}");
        }
        OutputFormat::Table => print_view_table(opts.view, &result),
    }
    Ok(())
}

/// Compute the view for `opts` without printing it.
pub fn query(opts: &QueryOptions<'_>) -> Result<ViewResult> {
    let Some(view) = View::from_name(opts.view) else {
        let known: Vec<&str> = View::ALL.iter().map(|v| v.name()).collect();
        bail!("unknown view '{}' (expected one of: {})", opts.view, known.join(", "));
    };

    let raw = source::read_path(opts.file)?;

    let spec = match opts.filters {
        Some(text) if view.is_filtered() => {
            let value: Value =
                serde_json::from_str(text).context("--filters is not valid JSON")?;
            FilterSpec::from_json(&value)
        }
        _ => FilterSpec::default(),
    };
    let rank = RankRequest {
        category: opts.category.map(Category::parse).unwrap_or_default(),
        limit: opts.limit.unwrap_or(DEFAULT_LIMIT).max(1),
    };

    let dataset = analytics::pipeline(raw, &spec);
    Ok(analytics::compute(view, &dataset, &rank))
}

fn print_view_table(name: &str, result: &ViewResult) {
    println!("{}", format!("ESG Analytics: {name}").bold().cyan());
    println!("{}", "=".repeat(60));
    println!();

    match result {
        ViewResult::Filters(domain) => print_filters_table(domain),
        ViewResult::Overview(overview) => print_overview_table(overview),
        ViewResult::TopPerformers(performers) => print_performers_table(performers),
        ViewResult::Groups(groups) => print_groups_table(groups),
        ViewResult::Trends(points) => print_trends_table(points),
        ViewResult::Correlations(matrix) => print_correlations_table(matrix),
        ViewResult::Export(export) => print_export_table(export),
    }
}

fn print_filters_table(domain: &FilterDomain) {
    println!("  {} {}", "Industries:".bold(), list_or_none(&domain.industries));
    println!("  {} {}", "Regions:   ".bold(), list_or_none(&domain.regions));
    println!(
        "  {} {}",
        "Years:     ".bold(),
        format_range(&domain.year_range.min.to_string(), &domain.year_range.max.to_string())
    );
    println!(
        "  {} {}",
        "Revenue:   ".bold(),
        format_range(
            &format_amount(domain.revenue_range.min),
            &format_amount(domain.revenue_range.max)
        )
    );
}

fn print_overview_table(o: &Overview) {
    if o.total_companies == 0 {
        println!("{}", "No data matches the current filters.".yellow());
        return;
    }
    let rows = [
        ("Companies", o.total_companies.to_string()),
        ("Avg ESG score", format!("{:.2}", o.avg_esg_score)),
        ("Avg environmental", format!("{:.2}", o.avg_environmental_score)),
        ("Avg social", format!("{:.2}", o.avg_social_score)),
        ("Avg governance", format!("{:.2}", o.avg_governance_score)),
        ("Avg revenue", format_amount(o.avg_revenue)),
        ("Avg growth rate", format!("{:.2}%", o.avg_growth_rate)),
        ("Total emissions", format_amount(o.total_carbon_emissions)),
    ];
    for (label, value) in rows {
        println!("  {:<20} {:>16}", label.bold(), value);
    }
}

fn print_performers_table(performers: &[Performer]) {
    if performers.is_empty() {
        println!("{}", "No companies to rank.".yellow());
        return;
    }
    println!(
        "  {:>3} {:<24} {:<14} {:>8} {:>8} {:>8} {:>8}",
        "#", "Company", "Industry", "Overall", "Env", "Social", "Gov"
    );
    println!("  {}", "-".repeat(80));
    for (i, p) in performers.iter().enumerate() {
        let line = format!(
            "  {:>3} {:<24} {:<14} {:>8} {:>8} {:>8} {:>8}",
            i + 1,
            truncate(&p.company_name, 24),
            truncate(p.industry.as_deref().unwrap_or("-"), 14),
            format_opt(p.esg_overall),
            format_opt(p.esg_environmental),
            format_opt(p.esg_social),
            format_opt(p.esg_governance),
        );
        print_striped(i, &line);
    }
}

fn print_groups_table(groups: &[GroupSummary]) {
    let Some(first) = groups.first() else {
        println!("{}", "No groups in the filtered data.".yellow());
        return;
    };
    println!(
        "  {:<20} {:>8} {:>8} {:>8} {:>8} {:>14} {:>14} {:>6}",
        first.dimension.column(),
        "ESG",
        "Env",
        "Social",
        "Gov",
        "Revenue",
        "Emissions",
        "Cos"
    );
    println!("  {}", "-".repeat(96));
    for (i, g) in groups.iter().enumerate() {
        let line = format!(
            "  {:<20} {:>8} {:>8} {:>8} {:>8} {:>14} {:>14} {:>6}",
            truncate(&g.key, 20),
            format_opt(g.esg[0]),
            format_opt(g.esg[1]),
            format_opt(g.esg[2]),
            format_opt(g.esg[3]),
            g.revenue.map_or_else(|| "-".to_string(), format_amount),
            g.carbon_emissions.map_or_else(|| "-".to_string(), format_amount),
            g.company_count,
        );
        print_striped(i, &line);
    }
}

fn print_trends_table(points: &[TrendPoint]) {
    if points.is_empty() {
        println!("{}", "No yearly data.".yellow());
        return;
    }
    println!(
        "  {:<6} {:>8} {:>8} {:>8} {:>8} {:>14} {:>14} {:>8}",
        "Year", "ESG", "Env", "Social", "Gov", "Revenue", "Emissions", "Growth"
    );
    println!("  {}", "-".repeat(84));
    for (i, p) in points.iter().enumerate() {
        let line = format!(
            "  {:<6} {:>8} {:>8} {:>8} {:>8} {:>14} {:>14} {:>8}",
            p.year,
            format_opt(p.esg_overall),
            format_opt(p.esg_environmental),
            format_opt(p.esg_social),
            format_opt(p.esg_governance),
            p.revenue.map_or_else(|| "-".to_string(), format_amount),
            p.carbon_emissions.map_or_else(|| "-".to_string(), format_amount),
            format_opt(p.growth_rate),
        );
        print_striped(i, &line);
    }
}

fn print_correlations_table(matrix: &CorrelationMatrix) {
    let columns = matrix.columns();
    print!("  {:<18}", "");
    for c in columns {
        print!(" {:>16}", truncate(c, 16));
    }
    println!();
    for a in columns {
        print!("  {:<18}", truncate(a, 18).bold());
        for b in columns {
            let cell = match matrix.get(a, b) {
                Some(r) if r >= 0.5 => format!("{r:>16.3}").green(),
                Some(r) if r <= -0.5 => format!("{r:>16.3}").red(),
                Some(r) => format!("{r:>16.3}").normal(),
                None => format!("{:>16}", "-").dimmed(),
            };
            print!(" {cell}");
        }
        println!();
    }
}

fn print_export_table(export: &ExportView) {
    let dataset = &export.dataset;
    println!("  {} {}", "Rows:".bold(), export.count());
    if dataset.is_empty() {
        return;
    }
    println!("  {}", dataset.columns().join(" | ").dimmed());
    for (i, row) in dataset.rows().iter().take(EXPORT_TABLE_ROWS).enumerate() {
        let cells: Vec<String> = row
            .iter()
            .map(|c| match c.to_json() {
                Value::Null => "-".to_string(),
                Value::String(s) => s,
                other => other.to_string(),
            })
            .collect();
        print_striped(i, &format!("  {}", cells.join(" | ")));
    }
    if export.count() > EXPORT_TABLE_ROWS {
        println!(
            "  {}",
            format!(
                "… {} more rows (use --format json for all)",
                export.count() - EXPORT_TABLE_ROWS
            )
            .dimmed()
        );
    }
}

// ---------------------------------------------------------------------------
// esg-analytics config show | init | set | reset
// ---------------------------------------------------------------------------

/// Show the effective (merged) configuration as TOML.
pub fn run_config_show() -> Result<()> {
    let toml_str = config::show_effective_config()?;
    println!("{}", "Effective esg-analytics Configuration".bold().cyan());
    println!("{}", "=".repeat(50));
    println!();
    println!("{toml_str}");

    let global_exists = config::global_config_file()
        .map(|p| p.exists())
        .unwrap_or(false);
    let project_exists = config::project_config_file()
        .map(|p| p.exists())
        .unwrap_or(false);
    println!("{}", "Sources (highest priority last):".dimmed());
    println!("  {} built-in defaults", "·".dimmed());
    print_source(global_exists, "~/.esg-analytics/config.toml");
    print_source(project_exists, ".esg-analytics.toml");
    println!("  {} {}", "·".dimmed(), "ESG_* environment variables".dimmed());

    Ok(())
}

fn print_source(exists: bool, name: &str) {
    if exists {
        println!("  {} {}", "✓".green(), name.dimmed());
    } else {
        println!("  {} {}", "·".dimmed(), format!("{name} (not found)").dimmed());
    }
}

/// Initialize a default config file at `~/.esg-analytics/config.toml`.
pub fn run_config_init(force: bool) -> Result<()> {
    let path = config::init_config(force)?;
    println!(
        "{} Config written to {}",
        "✓".green().bold(),
        path.display()
    );
    println!("  {}", "Edit the file to customize the service.".dimmed());
    Ok(())
}

/// Set a single configuration value in the global config file.
pub fn run_config_set(key: &str, value: &str) -> Result<()> {
    config::set_config_value(key, value)?;
    println!("{} Set {} = {}", "✓".green().bold(), key.bold(), value);
    Ok(())
}

/// Reset configuration to defaults.
pub fn run_config_reset() -> Result<()> {
    let path = config::reset_config()?;
    println!(
        "{} Config reset to defaults at {}",
        "✓".green().bold(),
        path.display()
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Formatting helpers
// ---------------------------------------------------------------------------

fn print_striped(i: usize, line: &str) {
    if i % 2 == 0 {
        println!("{line}");
    } else {
        println!("{}", line.dimmed());
    }
}

fn list_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "(none)".to_string()
    } else {
        items.join(", ")
    }
}

fn format_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.2}"))
}

/// Two decimals with comma separators in the integer part.
fn format_range(min: &str, max: &str) -> String {
    format!("{min} to {max}")
}

fn format_amount(value: f64) -> String {
    let text = format!("{:.2}", value.abs());
    let (int_part, frac) = text.split_once('.').unwrap_or((text.as_str(), "00"));
    let mut grouped = String::new();
    for (i, ch) in int_part.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let int_part: String = grouped.chars().rev().collect();
    let sign = if value < 0.0 && text != "0.00" { "-" } else { "" };
    format!("{sign}{int_part}.{frac}")
}

/// Truncate a string to `max_len` characters, appending "…" if truncated.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(1)).collect();
        format!("{kept}…")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
