use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use promo_catalog::config::CatalogConfig;
use promo_catalog::data::domain::{ColumnDomain, Domain};
use promo_catalog::data::export::save_csv;
use promo_catalog::data::filter::{FilterOutcome, FilterState};
use promo_catalog::data::loader::{load_catalog, load_file};
use promo_catalog::data::model::{columns, ProductTable};
use promo_catalog::data::predicate::Constraint;
use promo_catalog::data::view::{group_by_category_series, CategoryGroup};
use promo_catalog::normalize::{apply_update, CascadeSelection, Merger};
use promo_catalog::state::Session;

#[derive(Parser)]
#[command(version, about = "Filter a product catalog by its typed spec columns.")]
struct Cli {
    /// JSON config file (defaults apply when omitted).
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the filter pipeline and print domains, counts and matching products.
    Filter {
        /// Catalog table (.csv, .json, .parquet or a workbook).
        table: PathBuf,

        #[arg(long)]
        category: Option<String>,

        /// Series to keep (repeatable).
        #[arg(long)]
        series: Vec<String>,

        /// Case-insensitive substring of the product name.
        #[arg(long, default_value = "")]
        search: String,

        #[arg(long)]
        product_group: Option<String>,

        /// Lifecycle values to keep (repeatable).
        #[arg(long)]
        lifecycle: Vec<String>,

        /// JSON object of spec header → constraint.
        #[arg(long, value_name = "FILE.json")]
        constraints: Option<PathBuf>,

        /// Print a JSON summary instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Normalize a PIM export and merge it into an output catalog.
    Merge {
        /// Source workbook or table.
        input: PathBuf,

        /// Existing output catalog (CSV); started empty if it does not exist.
        #[arg(long, value_name = "OUT.csv")]
        output: Option<PathBuf>,

        /// Level 02 values to keep (repeatable).
        #[arg(long)]
        level2: Vec<String>,

        /// Level 03 values to keep (repeatable).
        #[arg(long)]
        level3: Vec<String>,

        /// Level 04 values to keep (repeatable).
        #[arg(long)]
        level4: Vec<String>,

        /// Catalog descriptions to keep (repeatable).
        #[arg(long)]
        select: Vec<String>,

        /// Apply every conflicting row in full instead of only reporting it.
        #[arg(long)]
        accept_updates: bool,

        /// Where to write the merged table (defaults to --output).
        #[arg(long, value_name = "PATH")]
        write: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config = CatalogConfig::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Command::Filter {
            table,
            category,
            series,
            search,
            product_group,
            lifecycle,
            constraints,
            json,
        } => {
            let catalog = Arc::new(load_catalog(&table, &config.load_options())?);
            let mut session = Session::new(Arc::clone(&catalog), config.pipeline_options());
            session.set_lifecycle(lifecycle.into_iter().collect());
            session.set_search(&search);
            session.set_product_group(product_group);
            session.set_series(series.into_iter().collect());
            session.set_category(category);
            if let Some(path) = constraints {
                for (column, constraint) in read_constraints(&path)? {
                    session
                        .set_constraint(&column, constraint)
                        .with_context(|| format!("constraint on {column:?}"))?;
                }
            }
            if json {
                print_json(&catalog, session.outcome())?;
            } else {
                print_text(&catalog, session.outcome());
            }
        }
        Command::Merge {
            input,
            output,
            level2,
            level3,
            level4,
            select,
            accept_updates,
            write,
        } => {
            let source = load_file(&input)?;
            config
                .mapping
                .check_source(&source)
                .with_context(|| format!("validating {}", input.display()))?;

            let mut existing = match &output {
                Some(path) if path.exists() => load_file(path)?,
                _ => ProductTable::default(),
            };

            let selection = CascadeSelection::pim(
                level2.into_iter().collect(),
                level3.into_iter().collect(),
                level4.into_iter().collect(),
                select.into_iter().collect(),
            );
            let (rows, _) = selection.apply(&source);
            let merger = Merger::from_config(&config);
            let report = merger.process(&mut existing, &rows);

            for event in &report.events {
                println!("{event}");
            }
            println!(
                "{} inserted, {} unchanged, {} with differences",
                report.inserted,
                report.unchanged,
                report.pending.len()
            );
            for pending in &report.pending {
                println!("Differences for '{}':", pending.key);
                for delta in &pending.deltas {
                    println!("  {}: {} -> {}", delta.field, delta.existing, delta.new);
                }
                if accept_updates {
                    for event in apply_update(&mut existing, pending, &merger.key_column, None)? {
                        println!("{event}");
                    }
                }
            }

            match write.as_ref().or(output.as_ref()) {
                Some(path) => save_csv(&existing, path)?,
                None => log::warn!("No --output or --write given; merged table not saved"),
            }
        }
    }
    Ok(())
}

fn read_constraints(path: &Path) -> Result<BTreeMap<String, Constraint>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading constraints {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing constraints {}", path.display()))
}

fn describe(domain: &Domain) -> String {
    match domain {
        Domain::Lov { options } => {
            let options: Vec<&str> = options.iter().map(String::as_str).collect();
            options.join(" | ")
        }
        Domain::Number { min, .. } if domain.is_fixed() => format!("fixed at {min}"),
        Domain::Number { min, max, .. } | Domain::Range { min, max, .. } => {
            format!("{min} ..= {max}")
        }
        Domain::Logical => "Any | True | False".to_string(),
    }
}

fn print_text(table: &ProductTable, outcome: &FilterOutcome) {
    if let Some(reset) = &outcome.category_reset {
        println!(
            "Category '{}' does not hold the selected series; using {}",
            reset.from,
            reset.to.as_deref().unwrap_or("All")
        );
    }

    println!("Filters:");
    for ColumnDomain { column, domain, .. } in &outcome.domains {
        if let Some(domain) = domain {
            println!("  {}: {}", domain.label(&column.name), describe(domain));
        }
    }
    for header in &outcome.dormant {
        println!("  {header}: constraint not applied");
    }

    println!(
        "{} products, {} spec filter(s) applied",
        outcome.displayed_count, outcome.applied_count
    );
    let rows = outcome.rows(table);
    for group in group_by_category_series(&rows) {
        println!("{} ({})", group.category, group.len());
        for series in &group.series {
            println!("  {}", series.series);
            for product in &series.products {
                println!("    {}", product.text(columns::NAME).unwrap_or_default());
            }
        }
    }
}

#[derive(Serialize)]
struct JsonSummary<'a> {
    displayed_count: usize,
    applied_count: usize,
    dormant: &'a [String],
    state: &'a FilterState,
    domains: Vec<&'a ColumnDomain>,
    groups: Vec<CategoryGroup<'a>>,
}

fn print_json(table: &ProductTable, outcome: &FilterOutcome) -> Result<()> {
    let rows = outcome.rows(table);
    let summary = JsonSummary {
        displayed_count: outcome.displayed_count,
        applied_count: outcome.applied_count,
        dormant: &outcome.dormant,
        state: &outcome.state,
        domains: outcome.domains.iter().filter(|d| d.is_offered()).collect(),
        groups: group_by_category_series(&rows),
    };
    let text = serde_json::to_string_pretty(&summary).context("serializing summary")?;
    println!("{text}");
    Ok(())
}
