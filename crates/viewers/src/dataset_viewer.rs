//! Dataset viewer - column catalog plus a sortable, filterable table

use shared::dataset::{format_value, Dataset};
use std::cmp::Ordering;

struct CatalogRow {
    name: String,
    label: String,
    kind: String,
    coding: String,
}

/// Dataset viewer state
pub struct DatasetViewer {
    title: String,
    catalog: Vec<CatalogRow>,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    sort_column: Option<usize>,
    sort_ascending: bool,
    filter_text: String,
    filtered_indices: Vec<usize>,
    show_catalog: bool,
}

impl DatasetViewer {
    pub fn new(dataset: &Dataset) -> Self {
        let catalog = dataset
            .columns()
            .iter()
            .map(|c| {
                let d = c.descriptor;
                CatalogRow {
                    name: d.name.to_string(),
                    label: d.label.to_string(),
                    kind: d.kind.display_name().to_string(),
                    coding: d
                        .value_labels
                        .iter()
                        .map(|(code, label)| format!("{} = {}", code, label))
                        .collect::<Vec<_>>()
                        .join(", "),
                }
            })
            .collect();

        let mut headers = vec!["model".to_string()];
        headers.extend(dataset.column_names().into_iter().map(str::to_string));

        let rows = dataset
            .row_labels()
            .iter()
            .enumerate()
            .map(|(row, label)| {
                let mut cells = vec![label.clone()];
                cells.extend(dataset.columns().iter().map(|c| format_value(c.values[row])));
                cells
            })
            .collect();

        let mut viewer = Self {
            title: format!("{} ({} rows)", dataset.name(), dataset.row_count()),
            catalog,
            headers,
            rows,
            sort_column: None,
            sort_ascending: true,
            filter_text: String::new(),
            filtered_indices: Vec::new(),
            show_catalog: true,
        };
        viewer.update_filtered_indices();
        viewer
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn filtered_count(&self) -> usize {
        self.filtered_indices.len()
    }

    pub fn set_filter(&mut self, text: &str) {
        self.filter_text = text.to_string();
        self.update_filtered_indices();
    }

    /// Rows currently shown, in display order
    pub fn visible_rows(&self) -> impl Iterator<Item = &[String]> {
        self.filtered_indices
            .iter()
            .filter_map(|&i| self.rows.get(i).map(Vec::as_slice))
    }

    fn update_filtered_indices(&mut self) {
        let filter_lower = self.filter_text.trim().to_lowercase();

        self.filtered_indices = (0..self.rows.len())
            .filter(|&i| {
                filter_lower.is_empty()
                    || self.rows[i]
                        .iter()
                        .any(|cell| cell.to_lowercase().contains(&filter_lower))
            })
            .collect();

        if let Some(col) = self.sort_column {
            let rows = &self.rows;
            let ascending = self.sort_ascending;
            self.filtered_indices.sort_by(|&a, &b| {
                let cmp = compare_cells(
                    rows[a].get(col).map(String::as_str).unwrap_or(""),
                    rows[b].get(col).map(String::as_str).unwrap_or(""),
                );
                if ascending {
                    cmp
                } else {
                    cmp.reverse()
                }
            });
        }
    }

    pub fn sort_by_column(&mut self, col: usize) {
        if self.sort_column == Some(col) {
            self.sort_ascending = !self.sort_ascending;
        } else {
            self.sort_column = Some(col);
            self.sort_ascending = true;
        }
        self.update_filtered_indices();
    }

    pub fn ui(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.strong(&self.title);
            ui.separator();
            ui.checkbox(&mut self.show_catalog, "Columns");
        });

        if self.show_catalog {
            egui::CollapsingHeader::new("Column catalog")
                .default_open(true)
                .show(ui, |ui| {
                    egui::Grid::new("dataset_catalog")
                        .num_columns(4)
                        .striped(true)
                        .show(ui, |ui| {
                            for header in ["Column", "Meaning", "Type", "Coding"] {
                                ui.strong(header);
                            }
                            ui.end_row();
                            for row in &self.catalog {
                                ui.monospace(&row.name);
                                ui.label(&row.label);
                                ui.label(&row.kind);
                                ui.label(&row.coding);
                                ui.end_row();
                            }
                        });
                });
        }

        ui.separator();

        ui.horizontal(|ui| {
            ui.label("Filter:");
            if ui.text_edit_singleline(&mut self.filter_text).changed() {
                self.update_filtered_indices();
            }
            ui.separator();
            ui.label(format!(
                "{} / {} rows",
                self.filtered_count(),
                self.row_count()
            ));
        });

        egui::ScrollArea::both()
            .auto_shrink([false, false])
            .show(ui, |ui| {
                egui::Grid::new("dataset_table")
                    .num_columns(self.headers.len())
                    .striped(true)
                    .min_col_width(40.0)
                    .show(ui, |ui| {
                        let mut clicked_col: Option<usize> = None;
                        for (col, header) in self.headers.iter().enumerate() {
                            let arrow = match (self.sort_column == Some(col), self.sort_ascending) {
                                (true, true) => " ^",
                                (true, false) => " v",
                                _ => "",
                            };
                            if ui.button(format!("{}{}", header, arrow)).clicked() {
                                clicked_col = Some(col);
                            }
                        }
                        ui.end_row();

                        for row in self.visible_rows() {
                            for cell in row {
                                ui.label(cell);
                            }
                            ui.end_row();
                        }

                        if let Some(col) = clicked_col {
                            self.sort_by_column(col);
                        }
                    });
            });
    }
}

/// Numeric when both cells parse, text otherwise
fn compare_cells(a: &str, b: &str) -> Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.total_cmp(&y),
        _ => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewer() -> DatasetViewer {
        DatasetViewer::new(&Dataset::mtcars().unwrap())
    }

    #[test]
    fn test_table_shape() {
        let v = viewer();
        assert_eq!(v.row_count(), 32);
        assert_eq!(v.headers.len(), 12);
        assert_eq!(v.headers[0], "model");
        let first = v.visible_rows().next().unwrap();
        assert_eq!(first[0], "Mazda RX4");
        // cyl is stored as 6.0 but shown as 6
        assert_eq!(first[2], "6");
        assert_eq!(v.catalog[8].coding, "0 = automatic, 1 = manual");
    }

    #[test]
    fn test_filter_is_case_insensitive() {
        let mut v = viewer();
        v.set_filter("merc");
        assert!(v.filtered_count() >= 2);
        assert!(v.visible_rows().all(|r| r[0].starts_with("Merc")));

        v.set_filter("   ");
        assert_eq!(v.filtered_count(), 32);
    }

    #[test]
    fn test_numeric_sort_toggles() {
        let mut v = viewer();
        let hp = v.headers.iter().position(|h| h == "hp").unwrap();

        v.sort_by_column(hp);
        let asc: Vec<f64> = v.visible_rows().map(|r| r[hp].parse().unwrap()).collect();
        assert!(asc.windows(2).all(|w| w[0] <= w[1]));
        // numeric, not lexical: 52 sorts before 110
        assert_eq!(asc[0], 52.0);

        v.sort_by_column(hp);
        let first: f64 = v.visible_rows().next().unwrap()[hp].parse().unwrap();
        assert_eq!(first, 335.0);
    }

    #[test]
    fn test_compare_cells() {
        assert_eq!(compare_cells("9", "10"), Ordering::Less);
        assert_eq!(compare_cells("Valiant", "AMC Javelin"), Ordering::Greater);
    }
}
