//! `plot_scatter`: points on two columns with optional grouping, trend and facets.

use serde::Deserialize;
use serde_json::{json, Value};
use shared::chart::{ChartSpec, Geometry};
use shared::dataset::Dataset;
use shared::tool::{Tool, ToolError, PLOT_SCATTER};

use crate::charting::{column_hint, given, grouping, parse_params, required_column, smoothing};

#[derive(Debug, Deserialize)]
struct ScatterParams {
    #[serde(default)]
    title: Option<String>,
    x: String,
    y: String,
    #[serde(default)]
    color: Option<String>,
    #[serde(default)]
    shape: Option<String>,
    #[serde(default)]
    smoothing_line: Option<bool>,
    #[serde(default)]
    smoothing_method: Option<String>,
    #[serde(default)]
    facet: Option<String>,
}

pub struct PlotScatter;

impl Tool for PlotScatter {
    fn name(&self) -> &'static str {
        PLOT_SCATTER
    }

    fn description(&self) -> &'static str {
        "Draw a scatter plot of two columns of the dataset. Optionally color and/or shape \
         the points by a column (treated as categories), overlay a trend line per color \
         group, and split into one panel per category of a facet column. Replaces the \
         chart currently on display."
    }

    fn input_schema(&self, dataset: &Dataset) -> Value {
        let columns = column_hint(dataset);
        json!({
            "type": "object",
            "properties": {
                "title": {
                    "type": "string",
                    "description": "Optional chart title."
                },
                "x": {
                    "type": "string",
                    "description": format!("Column for the horizontal axis. {}", columns)
                },
                "y": {
                    "type": "string",
                    "description": format!("Column for the vertical axis. {}", columns)
                },
                "color": {
                    "type": "string",
                    "description": format!("Optional column to color points by, as categories. {}", columns)
                },
                "shape": {
                    "type": "string",
                    "description": format!("Optional column to set point shapes by, as categories. {}", columns)
                },
                "smoothing_line": {
                    "type": "boolean",
                    "description": "Overlay a trend line. Defaults to false."
                },
                "smoothing_method": {
                    "type": "string",
                    "description": "Trend method when smoothing_line is true: \"lm\" (linear), \"loess\", or \"auto\" (default)."
                },
                "facet": {
                    "type": "string",
                    "description": format!("Optional column to split into one panel per category. {}", columns)
                }
            },
            "required": ["x", "y"]
        })
    }

    fn build_spec(&self, input: &Value, dataset: &Dataset) -> Result<ChartSpec, ToolError> {
        let params: ScatterParams = parse_params(PLOT_SCATTER, input)?;

        let x = required_column(dataset, &params.x)?;
        let y = required_column(dataset, &params.y)?;
        let color = grouping(dataset, given(&params.color))?;
        let shape = grouping(dataset, given(&params.shape))?;
        let facet = grouping(dataset, given(&params.facet))?;

        let smoothing = if params.smoothing_line.unwrap_or(false) {
            Some(smoothing(given(&params.smoothing_method), dataset.row_count())?)
        } else {
            None
        };

        Ok(ChartSpec {
            title: given(&params.title).map(str::to_string),
            geometry: Geometry::Points,
            x,
            y: Some(y),
            color,
            shape,
            smoothing,
            facet,
        })
    }
}
