use serde::Serialize;

use super::model::{columns, Product, RowSet};

/// Products of one series within a category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesGroup<'a> {
    pub series: String,
    pub products: Vec<&'a Product>,
}

/// Products of one category, split by series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryGroup<'a> {
    pub category: String,
    pub series: Vec<SeriesGroup<'a>>,
}

impl CategoryGroup<'_> {
    pub fn len(&self) -> usize {
        self.series.iter().map(|s| s.products.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.series.iter().all(|s| s.products.is_empty())
    }
}

/// Group rows by category then series, both in order of first appearance.
/// Products with a blank category or series land under an empty label.
pub fn group_by_category_series<'a>(rows: &RowSet<'a>) -> Vec<CategoryGroup<'a>> {
    let mut groups: Vec<CategoryGroup<'a>> = Vec::new();
    for product in rows.iter() {
        let category = product.text(columns::CATEGORY).unwrap_or_default();
        let series = product.text(columns::SERIES).unwrap_or_default();

        let cat_pos = match groups.iter().position(|g| g.category == category) {
            Some(pos) => pos,
            None => {
                groups.push(CategoryGroup {
                    category: category.into_owned(),
                    series: Vec::new(),
                });
                groups.len() - 1
            }
        };
        let group = &mut groups[cat_pos];
        match group.series.iter_mut().find(|s| s.series == series) {
            Some(existing) => existing.products.push(product),
            None => group.series.push(SeriesGroup {
                series: series.into_owned(),
                products: vec![product],
            }),
        }
    }
    groups
}
