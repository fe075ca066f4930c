//! Chart specifications and the session's display state.
//!
//! A [`ChartSpec`] is the resolved description of one chart: geometry,
//! coordinate mappings, categorical groupings, optional trend overlay and
//! facets. It is built from a single tool call and consumed by one
//! [`ChartRenderer::render`] call.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::dataset::Dataset;

/// Base layer of a chart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Geometry {
    /// Point markup keyed on (x, y)
    Points,
    /// Smoothed density curve keyed on x
    Density,
}

impl Geometry {
    pub fn display_name(&self) -> &'static str {
        match self {
            Geometry::Points => "scatter plot",
            Geometry::Density => "density plot",
        }
    }
}

/// One category of a categorical column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Level {
    /// Stored value
    pub value: f64,
    /// Value as shown on axes and legends (`"4"`, `"0"`)
    pub key: String,
    /// Coded meaning, e.g. `"manual"` for `am = 1`
    pub label: Option<String>,
}

impl Level {
    pub fn display(&self) -> String {
        match &self.label {
            Some(label) => format!("{} ({})", self.key, label),
            None => self.key.clone(),
        }
    }
}

/// A column read as discrete categories
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Categorical {
    pub column: String,
    /// Distinct values, ascending
    pub levels: Vec<Level>,
    /// Per-row index into `levels`
    pub codes: Vec<usize>,
}

impl Categorical {
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Level a row falls in
    pub fn level_at(&self, row: usize) -> Option<&Level> {
        self.codes.get(row).and_then(|&code| self.levels.get(code))
    }

    /// Number of rows falling in each level
    pub fn counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.levels.len()];
        for &code in &self.codes {
            if let Some(count) = counts.get_mut(code) {
                *count += 1;
            }
        }
        counts
    }
}

/// Trend-fitting method for the smoothing overlay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SmoothingMethod {
    /// Linear least squares
    Lm,
    /// Locally weighted regression
    Loess,
}

impl SmoothingMethod {
    /// Largest row count for which automatic selection picks loess
    pub const AUTO_LOESS_MAX_ROWS: usize = 1000;

    /// Parse an explicit method name; `None` for anything unsupported
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "lm" => Some(SmoothingMethod::Lm),
            "loess" => Some(SmoothingMethod::Loess),
            _ => None,
        }
    }

    /// Method used when none is requested
    pub fn automatic(rows: usize) -> Self {
        if rows < Self::AUTO_LOESS_MAX_ROWS {
            SmoothingMethod::Loess
        } else {
            SmoothingMethod::Lm
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SmoothingMethod::Lm => "lm",
            SmoothingMethod::Loess => "loess",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            SmoothingMethod::Lm => "linear trend",
            SmoothingMethod::Loess => "loess trend",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Smoothing {
    pub method: SmoothingMethod,
    /// True when the method was picked automatically
    pub automatic: bool,
}

/// Resolved description of one chart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    pub title: Option<String>,
    pub geometry: Geometry,
    pub x: String,
    /// Scatter only
    pub y: Option<String>,
    pub color: Option<Categorical>,
    /// Scatter only
    pub shape: Option<Categorical>,
    /// Scatter only
    pub smoothing: Option<Smoothing>,
    pub facet: Option<Categorical>,
}

impl ChartSpec {
    /// Number of sub-panels: one per facet level, or a single panel
    pub fn panel_count(&self) -> usize {
        self.facet.as_ref().map_or(1, |f| f.len().max(1))
    }

    /// Number of color groups, or 1 when ungrouped
    pub fn group_count(&self) -> usize {
        self.color.as_ref().map_or(1, |c| c.len().max(1))
    }

    /// Every column the chart reads
    pub fn columns(&self) -> Vec<&str> {
        let mut cols = vec![self.x.as_str()];
        if let Some(y) = &self.y {
            cols.push(y);
        }
        for cat in [&self.color, &self.shape, &self.facet].into_iter().flatten() {
            if !cols.contains(&cat.column.as_str()) {
                cols.push(&cat.column);
            }
        }
        cols
    }

    /// One-line summary, e.g. "scatter plot of hp vs mpg (3 color groups by gear)"
    pub fn describe(&self) -> String {
        let mut out = match &self.y {
            Some(y) => format!("{} of {} vs {}", self.geometry.display_name(), y, self.x),
            None => format!("{} of {}", self.geometry.display_name(), self.x),
        };

        let mut extras = Vec::new();
        if let Some(color) = &self.color {
            extras.push(format!("{} color groups by {}", color.len(), color.column));
        }
        if let Some(shape) = &self.shape {
            extras.push(format!("{} shapes by {}", shape.len(), shape.column));
        }
        if let Some(smoothing) = &self.smoothing {
            let mut s = smoothing.method.display_name().to_string();
            if smoothing.automatic {
                s.push_str(" (auto)");
            }
            extras.push(s);
        }
        if let Some(facet) = &self.facet {
            extras.push(format!("{} panels by {}", facet.len(), facet.column));
        }

        if !extras.is_empty() {
            out.push_str(&format!(" ({})", extras.join(", ")));
        }
        out
    }
}

/// Output of a renderer: the document handed to the charting library
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedChart {
    /// Full Vega-Lite document with data inlined
    pub vega_lite: serde_json::Value,
    /// Standalone page, when an output directory is configured
    pub html_path: Option<PathBuf>,
}

/// The chart currently on display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveChart {
    pub revision: u64,
    pub spec: ChartSpec,
    pub rendered: RenderedChart,
}

/// Session-scoped display state: at most one live chart
#[derive(Debug, Default)]
pub struct ChartDisplay {
    live: Option<LiveChart>,
    revision: u64,
}

impl ChartDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live(&self) -> Option<&LiveChart> {
        self.live.as_ref()
    }

    /// Number of successful replacements so far
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Swap in a new chart, dropping the previous one
    pub fn replace(&mut self, spec: ChartSpec, rendered: RenderedChart) -> &LiveChart {
        self.revision += 1;
        self.live.insert(LiveChart {
            revision: self.revision,
            spec,
            rendered,
        })
    }
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("chart reads column '{0}' that the dataset does not provide")]
    MissingColumn(String),

    #[error("failed to serialize chart: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write chart page {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Turns a chart specification into something a display surface can show
pub trait ChartRenderer: Send + Sync {
    fn render(&self, spec: &ChartSpec, dataset: &Dataset) -> Result<RenderedChart, RenderError>;
}
