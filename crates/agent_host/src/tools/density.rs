//! `plot_density`: smoothed distribution of one column.

use serde::Deserialize;
use serde_json::{json, Value};
use shared::chart::{ChartSpec, Geometry};
use shared::dataset::Dataset;
use shared::tool::{Tool, ToolError, PLOT_DENSITY};

use crate::charting::{column_hint, given, grouping, parse_params, required_column};

#[derive(Debug, Deserialize)]
struct DensityParams {
    x: String,
    #[serde(default)]
    color: Option<String>,
    #[serde(default)]
    facet: Option<String>,
}

pub struct PlotDensity;

impl Tool for PlotDensity {
    fn name(&self) -> &'static str {
        PLOT_DENSITY
    }

    fn description(&self) -> &'static str {
        "Draw a density curve of one column of the dataset. Optionally draw one curve per \
         category of a color column, and split into one panel per category of a facet \
         column. Replaces the chart currently on display."
    }

    fn input_schema(&self, dataset: &Dataset) -> Value {
        let columns = column_hint(dataset);
        json!({
            "type": "object",
            "properties": {
                "x": {
                    "type": "string",
                    "description": format!("Column whose distribution is drawn. {}", columns)
                },
                "color": {
                    "type": "string",
                    "description": format!("Optional column to split curves by, as categories. {}", columns)
                },
                "facet": {
                    "type": "string",
                    "description": format!("Optional column to split into one panel per category. {}", columns)
                }
            },
            "required": ["x"]
        })
    }

    fn build_spec(&self, input: &Value, dataset: &Dataset) -> Result<ChartSpec, ToolError> {
        let params: DensityParams = parse_params(PLOT_DENSITY, input)?;

        Ok(ChartSpec {
            title: None,
            geometry: Geometry::Density,
            x: required_column(dataset, &params.x)?,
            y: None,
            color: grouping(dataset, given(&params.color))?,
            shape: None,
            smoothing: None,
            facet: grouping(dataset, given(&params.facet))?,
        })
    }
}
