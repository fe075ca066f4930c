//! The built-in motor-trend dataset and its column catalog.
//!
//! The table is fixed: 32 cars, 11 numeric columns. Column access always goes
//! through [`Dataset::column`], which checks the name against the catalog and
//! returns a typed error on a miss.

use serde::Serialize;
use thiserror::Error;

use crate::chart::{Categorical, Level};

const MTCARS_CSV: &str = include_str!("../data/mtcars.csv");

/// Header of the row-label column in the embedded CSV
const ROW_LABEL_HEADER: &str = "model";

/// Minimum Jaro-Winkler similarity for a "did you mean" suggestion
const SUGGESTION_THRESHOLD: f64 = 0.75;

/// How a column's values should be read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ColumnKind {
    /// Measured quantity
    Continuous,
    /// Small set of integer counts (cylinders, gears, ...)
    Discrete,
    /// 0/1 code standing for two named categories
    BinaryCoded,
}

impl ColumnKind {
    pub fn display_name(&self) -> &'static str {
        match self {
            ColumnKind::Continuous => "continuous",
            ColumnKind::Discrete => "discrete",
            ColumnKind::BinaryCoded => "binary-coded",
        }
    }
}

/// Static description of one dataset column
#[derive(Debug, Clone, Serialize)]
pub struct ColumnDescriptor {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: ColumnKind,
    /// Value-to-label mapping for coded categoricals
    pub value_labels: &'static [(i64, &'static str)],
}

impl ColumnDescriptor {
    /// Label for a stored value, if the column is coded
    pub fn value_label(&self, value: f64) -> Option<&'static str> {
        self.value_labels
            .iter()
            .find(|(code, _)| *code as f64 == value)
            .map(|(_, label)| *label)
    }
}

/// Column catalog of the motor-trend table, in CSV order
pub const MTCARS_COLUMNS: &[ColumnDescriptor] = &[
    ColumnDescriptor {
        name: "mpg",
        label: "Miles per (US) gallon",
        kind: ColumnKind::Continuous,
        value_labels: &[],
    },
    ColumnDescriptor {
        name: "cyl",
        label: "Number of cylinders",
        kind: ColumnKind::Discrete,
        value_labels: &[],
    },
    ColumnDescriptor {
        name: "disp",
        label: "Displacement (cu. in.)",
        kind: ColumnKind::Continuous,
        value_labels: &[],
    },
    ColumnDescriptor {
        name: "hp",
        label: "Gross horsepower",
        kind: ColumnKind::Continuous,
        value_labels: &[],
    },
    ColumnDescriptor {
        name: "drat",
        label: "Rear axle ratio",
        kind: ColumnKind::Continuous,
        value_labels: &[],
    },
    ColumnDescriptor {
        name: "wt",
        label: "Weight (1000 lbs)",
        kind: ColumnKind::Continuous,
        value_labels: &[],
    },
    ColumnDescriptor {
        name: "qsec",
        label: "1/4 mile time (seconds)",
        kind: ColumnKind::Continuous,
        value_labels: &[],
    },
    ColumnDescriptor {
        name: "vs",
        label: "Engine shape",
        kind: ColumnKind::BinaryCoded,
        value_labels: &[(0, "V-shaped"), (1, "straight")],
    },
    ColumnDescriptor {
        name: "am",
        label: "Transmission",
        kind: ColumnKind::BinaryCoded,
        value_labels: &[(0, "automatic"), (1, "manual")],
    },
    ColumnDescriptor {
        name: "gear",
        label: "Number of forward gears",
        kind: ColumnKind::Discrete,
        value_labels: &[],
    },
    ColumnDescriptor {
        name: "carb",
        label: "Number of carburetors",
        kind: ColumnKind::Discrete,
        value_labels: &[],
    },
];

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DatasetError {
    #[error("unknown column '{name}'{}", suggestion_hint(.suggestion))]
    UnknownColumn {
        name: String,
        suggestion: Option<String>,
    },

    #[error("column '{column}' is missing from the embedded dataset")]
    MissingColumn { column: String },

    #[error("failed to parse embedded dataset: {0}")]
    Parse(String),
}

fn suggestion_hint(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(name) => format!(" (did you mean '{}'?)", name),
        None => String::new(),
    }
}

/// One column: its catalog entry plus the stored values
#[derive(Debug, Clone)]
pub struct Column {
    pub descriptor: &'static ColumnDescriptor,
    pub values: Vec<f64>,
}

impl Column {
    pub fn name(&self) -> &'static str {
        self.descriptor.name
    }
}

/// Fixed in-memory table
#[derive(Debug, Clone)]
pub struct Dataset {
    name: &'static str,
    row_labels: Vec<String>,
    columns: Vec<Column>,
}

impl Dataset {
    /// Load the embedded motor-trend table
    pub fn mtcars() -> Result<Self, DatasetError> {
        Self::from_csv("mtcars", MTCARS_CSV, MTCARS_COLUMNS)
    }

    fn from_csv(
        name: &'static str,
        text: &str,
        catalog: &'static [ColumnDescriptor],
    ) -> Result<Self, DatasetError> {
        let mut reader = csv::Reader::from_reader(text.as_bytes());
        let headers = reader
            .headers()
            .map_err(|e| DatasetError::Parse(e.to_string()))?
            .clone();

        let label_idx = headers.iter().position(|h| h == ROW_LABEL_HEADER);
        let mut indices = Vec::with_capacity(catalog.len());
        for descriptor in catalog {
            let idx = headers
                .iter()
                .position(|h| h == descriptor.name)
                .ok_or_else(|| DatasetError::MissingColumn {
                    column: descriptor.name.to_string(),
                })?;
            indices.push(idx);
        }

        let mut row_labels = Vec::new();
        let mut columns: Vec<Column> = catalog
            .iter()
            .map(|descriptor| Column {
                descriptor,
                values: Vec::new(),
            })
            .collect();

        for (row, record) in reader.records().enumerate() {
            let record = record.map_err(|e| DatasetError::Parse(e.to_string()))?;
            let label = label_idx
                .and_then(|i| record.get(i))
                .map(str::to_string)
                .unwrap_or_else(|| format!("row {}", row + 1));
            row_labels.push(label);

            for (column, &idx) in columns.iter_mut().zip(&indices) {
                let cell = record.get(idx).unwrap_or("").trim();
                let value = cell.parse::<f64>().map_err(|_| {
                    DatasetError::Parse(format!(
                        "row {}: column '{}' has non-numeric value '{}'",
                        row + 1,
                        column.name(),
                        cell
                    ))
                })?;
                column.values.push(value);
            }
        }

        Ok(Self {
            name,
            row_labels,
            columns,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn row_count(&self) -> usize {
        self.row_labels.len()
    }

    pub fn row_labels(&self) -> &[String] {
        &self.row_labels
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(Column::name).collect()
    }

    /// Look a column up by exact name
    pub fn column(&self, name: &str) -> Result<&Column, DatasetError> {
        self.columns
            .iter()
            .find(|c| c.name() == name)
            .ok_or_else(|| DatasetError::UnknownColumn {
                name: name.to_string(),
                suggestion: self.closest_column(name),
            })
    }

    fn closest_column(&self, name: &str) -> Option<String> {
        let wanted = name.trim().to_lowercase();
        self.columns
            .iter()
            .map(|c| (c.name(), strsim::jaro_winkler(&wanted, c.name())))
            .filter(|(_, score)| *score >= SUGGESTION_THRESHOLD)
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(name, _)| name.to_string())
    }

    /// Treat a column as discrete categories, whatever its stored encoding.
    ///
    /// Levels are the distinct values in ascending order. Every grouping or
    /// faceting role goes through here.
    pub fn categorical(&self, name: &str) -> Result<Categorical, DatasetError> {
        let column = self.column(name)?;

        let mut distinct = column.values.clone();
        distinct.sort_by(|a, b| a.total_cmp(b));
        distinct.dedup();

        let codes = column
            .values
            .iter()
            .map(|v| {
                distinct
                    .iter()
                    .position(|d| d == v)
                    .unwrap_or_default()
            })
            .collect();

        let levels = distinct
            .into_iter()
            .map(|value| Level {
                value,
                key: format_value(value),
                label: column.descriptor.value_label(value).map(str::to_string),
            })
            .collect();

        Ok(Categorical {
            column: column.name().to_string(),
            levels,
            codes,
        })
    }

    /// Column catalog as a markdown table
    pub fn catalog_markdown(&self) -> String {
        let mut out = String::from("| Column | Meaning | Type | Coding |\n|---|---|---|---|\n");
        for column in &self.columns {
            let d = column.descriptor;
            let coding = d
                .value_labels
                .iter()
                .map(|(code, label)| format!("{} = {}", code, label))
                .collect::<Vec<_>>()
                .join(", ");
            out.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                d.name,
                d.label,
                d.kind.display_name(),
                coding
            ));
        }
        out
    }
}

/// Format a stored value the way a category key reads: `4`, not `4.0`
pub fn format_value(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}
