use std::collections::BTreeSet;

use pretty_assertions::assert_eq;
use promo_catalog::config::CatalogConfig;
use promo_catalog::data::export::save_csv;
use promo_catalog::data::loader::load_file;
use promo_catalog::data::model::ProductTable;
use promo_catalog::normalize::{apply_update, CascadeSelection, Merger, SchemaEvent};

const PIM_EXPORT: &str = "\
<Publication Link.|Node|.Description Level 02>,<Publication Link.|Node|.Description Level 03>,<Publication Link.|Node|.Description Level 04>,Catalog Description,Item Long Description,Primary Image link,Poles;number
Automation,Sensors,X100,Prox A,Inductive sensor v2,a.png,2
Automation,Sensors,X100,Prox B,Inductive sensor,b.png,4
Automation,Relays,R1,Relay K,Safety relay,k.png,
Healthcare,Monitors,M1,BP Pro,Blood pressure,m.png,
";

const OUTPUT: &str = "\
Product Group,Category,Series,Name,Description,Featured image
Automation,Sensors,X100,Prox A,Inductive sensor,a.png
";

fn set(values: &[&str]) -> BTreeSet<String> {
    values.iter().map(|v| v.to_string()).collect()
}

#[test]
fn merge_selected_products_into_existing_catalog() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("pim.csv");
    let output = dir.path().join("out.csv");
    std::fs::write(&input, PIM_EXPORT).unwrap();
    std::fs::write(&output, OUTPUT).unwrap();

    let config = CatalogConfig::default();
    let source = load_file(&input).unwrap();
    config.mapping.check_source(&source).unwrap();
    let mut existing = load_file(&output).unwrap();

    let selection = CascadeSelection::pim(set(&["Automation"]), set(&["Sensors"]), set(&[]), set(&[]));
    let (rows, options) = selection.apply(&source);
    assert_eq!(options[0], set(&["Automation", "Healthcare"]));
    assert_eq!(options[1], set(&["Relays", "Sensors"]));
    assert_eq!(rows.len(), 2);

    let merger = Merger::from_config(&config);
    let report = merger.process(&mut existing, &rows);
    assert_eq!(report.inserted, 1);
    assert_eq!(report.events, vec![SchemaEvent::ColumnAdded("Poles;number".into())]);
    assert_eq!(report.pending.len(), 1);

    let pending = &report.pending[0];
    assert_eq!(pending.key, "Prox A");
    let fields: Vec<&str> = pending.deltas.iter().map(|d| d.field.as_str()).collect();
    assert_eq!(fields, vec!["Description", "Poles;number"]);

    apply_update(&mut existing, pending, &merger.key_column, None).unwrap();
    save_csv(&existing, &output).unwrap();

    let reloaded = load_file(&output).unwrap();
    assert_eq!(
        reloaded.column_names,
        vec!["Product Group", "Category", "Series", "Name", "Description", "Featured image", "Poles;number"]
    );
    assert_eq!(reloaded.len(), 2);
    assert_eq!(reloaded.rows[0].text("Description").as_deref(), Some("Inductive sensor v2"));
    assert_eq!(reloaded.rows[1].text("Poles;number").as_deref(), Some("4"));
    assert_eq!(reloaded.spec_columns.len(), 1);
}

#[test]
fn rerunning_a_merge_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("pim.csv");
    std::fs::write(&input, PIM_EXPORT).unwrap();
    let source = load_file(&input).unwrap();
    let merger = Merger::default();

    let mut existing = ProductTable::default();
    let first = merger.process(&mut existing, &source.all_rows());
    assert_eq!(first.inserted, 4);

    let second = merger.process(&mut existing, &source.all_rows());
    assert_eq!(second.inserted, 0);
    assert_eq!(second.unchanged, 4);
    assert!(second.pending.is_empty());
    assert!(second.events.is_empty());
}
