//! Vega-Lite rendering of chart specifications.
//!
//! Density estimation and trend fitting are left to Vega-Lite transforms;
//! this module only lays out the document and inlines the rows it reads.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{json, Map, Value};
use shared::chart::{
    Categorical, ChartRenderer, ChartSpec, Geometry, RenderError, RenderedChart, SmoothingMethod,
};
use shared::dataset::Dataset;
use tracing::debug;

const SCHEMA: &str = "https://vega.github.io/schema/vega-lite/v5.json";
const PAGE_NAME: &str = "current_chart.html";
const ROW_LABEL_FIELD: &str = "model";
const PANEL_WIDTH: u32 = 420;
const PANEL_HEIGHT: u32 = 300;

pub struct VegaLiteRenderer {
    output_dir: Option<PathBuf>,
}

impl VegaLiteRenderer {
    /// Keep charts in memory only
    pub fn new() -> Self {
        Self { output_dir: None }
    }

    /// Also write a standalone page into `dir` on every render
    pub fn with_output_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: Some(dir.into()),
        }
    }

    pub fn output_dir(&self) -> Option<&Path> {
        self.output_dir.as_deref()
    }

    /// Build the Vega-Lite document for `spec`
    pub fn document(&self, spec: &ChartSpec, dataset: &Dataset) -> Result<Value, RenderError> {
        let values = inline_rows(spec, dataset)?;
        let layers = match spec.geometry {
            Geometry::Points => point_layers(spec),
            Geometry::Density => vec![density_layer(spec)],
        };

        let mut doc = Map::new();
        doc.insert("$schema".into(), json!(SCHEMA));
        if let Some(title) = &spec.title {
            doc.insert("title".into(), json!(title));
        }
        doc.insert("description".into(), json!(spec.describe()));
        doc.insert("data".into(), json!({ "values": values }));

        let inner = json!({
            "width": PANEL_WIDTH,
            "height": PANEL_HEIGHT,
            "layer": layers,
        });
        match &spec.facet {
            Some(facet) => {
                doc.insert(
                    "facet".into(),
                    json!({
                        "field": level_field(&facet.column),
                        "type": "nominal",
                        "title": facet.column,
                    }),
                );
                doc.insert("columns".into(), json!(facet.len().min(3)));
                doc.insert("spec".into(), inner);
            }
            None => {
                if let Value::Object(inner) = inner {
                    doc.extend(inner);
                }
            }
        }

        Ok(Value::Object(doc))
    }

    fn write_page(&self, dir: &Path, spec: &ChartSpec, doc: &Value) -> Result<PathBuf, RenderError> {
        let path = dir.join(PAGE_NAME);
        let io_err = |source| RenderError::Io {
            path: path.clone(),
            source,
        };
        fs::create_dir_all(dir).map_err(io_err)?;

        let title = spec.title.clone().unwrap_or_else(|| spec.describe());
        let page = html_page(&title, &serde_json::to_string(doc)?);
        fs::write(&path, page).map_err(io_err)?;
        debug!(path = %path.display(), "wrote chart page");
        Ok(path)
    }
}

impl Default for VegaLiteRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl ChartRenderer for VegaLiteRenderer {
    fn render(&self, spec: &ChartSpec, dataset: &Dataset) -> Result<RenderedChart, RenderError> {
        let vega_lite = self.document(spec, dataset)?;
        let html_path = match &self.output_dir {
            Some(dir) => Some(self.write_page(dir, spec, &vega_lite)?),
            None => None,
        };
        Ok(RenderedChart {
            vega_lite,
            html_path,
        })
    }
}

/// Field holding the display string of a categorical role
fn level_field(column: &str) -> String {
    format!("{}_level", column)
}

/// One object per row with every column the chart reads
fn inline_rows(spec: &ChartSpec, dataset: &Dataset) -> Result<Vec<Value>, RenderError> {
    let mut columns = Vec::new();
    for name in spec.columns() {
        let column = dataset
            .column(name)
            .map_err(|_| RenderError::MissingColumn(name.to_string()))?;
        columns.push(column);
    }
    let groupings: Vec<&Categorical> = [&spec.color, &spec.shape, &spec.facet]
        .into_iter()
        .flatten()
        .collect();

    let rows = dataset
        .row_labels()
        .iter()
        .enumerate()
        .map(|(row, label)| {
            let mut obj = Map::new();
            obj.insert(ROW_LABEL_FIELD.into(), json!(label));
            for column in &columns {
                obj.insert(column.name().into(), json!(column.values[row]));
            }
            for cat in &groupings {
                if let Some(level) = cat.level_at(row) {
                    obj.insert(level_field(&cat.column), json!(level.display()));
                }
            }
            Value::Object(obj)
        })
        .collect();
    Ok(rows)
}

fn nominal(cat: &Categorical) -> Value {
    json!({
        "field": level_field(&cat.column),
        "type": "nominal",
        "title": cat.column,
    })
}

fn quantitative(field: &str) -> Value {
    json!({ "field": field, "type": "quantitative", "title": field })
}

/// Group-by fields the statistical transforms must keep
fn groupby(spec: &ChartSpec) -> Vec<String> {
    let mut fields: Vec<String> = Vec::new();
    for cat in [&spec.color, &spec.facet].into_iter().flatten() {
        let field = level_field(&cat.column);
        if !fields.contains(&field) {
            fields.push(field);
        }
    }
    fields
}

fn point_layers(spec: &ChartSpec) -> Vec<Value> {
    let y = spec.y.as_deref().unwrap_or(spec.x.as_str());

    let mut encoding = Map::new();
    encoding.insert("x".into(), quantitative(&spec.x));
    encoding.insert("y".into(), quantitative(y));
    if let Some(color) = &spec.color {
        encoding.insert("color".into(), nominal(color));
    }
    if let Some(shape) = &spec.shape {
        encoding.insert("shape".into(), nominal(shape));
    }
    encoding.insert(
        "tooltip".into(),
        json!([
            { "field": ROW_LABEL_FIELD, "type": "nominal" },
            { "field": spec.x, "type": "quantitative" },
            { "field": y, "type": "quantitative" },
        ]),
    );

    let mut layers = vec![json!({
        "mark": { "type": "point", "filled": true, "size": 60 },
        "encoding": encoding,
    })];

    if let Some(smoothing) = &spec.smoothing {
        let transform = match smoothing.method {
            SmoothingMethod::Lm => json!({
                "regression": y,
                "on": spec.x,
                "method": "linear",
                "groupby": groupby(spec),
            }),
            SmoothingMethod::Loess => json!({
                "loess": y,
                "on": spec.x,
                "groupby": groupby(spec),
            }),
        };
        let mut trend_encoding = Map::new();
        trend_encoding.insert("x".into(), quantitative(&spec.x));
        trend_encoding.insert("y".into(), quantitative(y));
        if let Some(color) = &spec.color {
            trend_encoding.insert("color".into(), nominal(color));
        }
        layers.push(json!({
            "transform": [transform],
            "mark": { "type": "line", "strokeWidth": 2 },
            "encoding": trend_encoding,
        }));
    }

    layers
}

fn density_layer(spec: &ChartSpec) -> Value {
    let mut encoding = Map::new();
    encoding.insert(
        "x".into(),
        json!({ "field": "value", "type": "quantitative", "title": spec.x }),
    );
    encoding.insert(
        "y".into(),
        json!({ "field": "density", "type": "quantitative", "title": "density" }),
    );
    if let Some(color) = &spec.color {
        encoding.insert("color".into(), nominal(color));
    }

    json!({
        "transform": [{
            "density": spec.x,
            "groupby": groupby(spec),
            "as": ["value", "density"],
        }],
        "mark": { "type": "area", "opacity": 0.35, "line": true },
        "encoding": encoding,
    })
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn html_page(title: &str, spec_json: &str) -> String {
    // "</" inside a string literal would end the script element early
    let spec_json = spec_json.replace("</", "<\\/");
    format!(
        r##"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{title}</title>
<script src="https://cdn.jsdelivr.net/npm/vega@5"></script>
<script src="https://cdn.jsdelivr.net/npm/vega-lite@5"></script>
<script src="https://cdn.jsdelivr.net/npm/vega-embed@6"></script>
<style>body {{ font-family: sans-serif; margin: 24px; }}</style>
</head>
<body>
<div id="chart"></div>
<script>
vegaEmbed("#chart", {spec_json}, {{ actions: true }}).catch(console.error);
</script>
</body>
</html>
"##,
        title = escape_html(title),
        spec_json = spec_json,
    )
}
