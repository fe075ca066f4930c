//! Chart viewer - summary of the live chart, its Vega-Lite source, and a
//! button to open the rendered page in the browser

use anyhow::{anyhow, Result};
use egui::{self, ScrollArea};
use shared::chart::{Categorical, Geometry, LiveChart};

pub struct ChartViewer {
    chart: Option<LiveChart>,
    source: String,
    show_source: bool,
    last_error: Option<String>,
}

impl Default for ChartViewer {
    fn default() -> Self {
        Self::new()
    }
}

impl ChartViewer {
    pub fn new() -> Self {
        Self {
            chart: None,
            source: String::new(),
            show_source: false,
            last_error: None,
        }
    }

    /// Show a new chart, dropping the previous one
    pub fn set_chart(&mut self, chart: LiveChart) {
        self.source = serde_json::to_string_pretty(&chart.rendered.vega_lite).unwrap_or_default();
        self.chart = Some(chart);
        self.last_error = None;
    }

    pub fn chart(&self) -> Option<&LiveChart> {
        self.chart.as_ref()
    }

    pub fn revision(&self) -> u64 {
        self.chart.as_ref().map_or(0, |c| c.revision)
    }

    /// Open the standalone page of the live chart
    pub fn open_in_browser(&self) -> Result<()> {
        let chart = self.chart.as_ref().ok_or_else(|| anyhow!("No chart yet"))?;
        let path = chart
            .rendered
            .html_path
            .as_ref()
            .ok_or_else(|| anyhow!("Chart pages are not being written to disk"))?;
        open::that(path)?;
        Ok(())
    }

    pub fn ui(&mut self, ui: &mut egui::Ui) {
        let Some(chart) = &self.chart else {
            ui.centered_and_justified(|ui| {
                ui.label("No chart yet. Ask for a plot in the chat.");
            });
            return;
        };

        // Toolbar
        let mut open_clicked = false;
        let mut copy_clicked = false;
        ui.horizontal(|ui| {
            ui.strong(format!("Chart #{}", chart.revision));
            ui.separator();
            let can_open = chart.rendered.html_path.is_some();
            if ui
                .add_enabled(can_open, egui::Button::new("Open in Browser"))
                .clicked()
            {
                open_clicked = true;
            }
            if ui.button("Copy Vega-Lite").clicked() {
                copy_clicked = true;
            }
            ui.checkbox(&mut self.show_source, "Show Source");
        });

        ui.label(chart.spec.title.clone().unwrap_or_else(|| chart.spec.describe()));
        ui.separator();

        egui::Grid::new("chart_summary")
            .num_columns(2)
            .striped(true)
            .show(ui, |ui| {
                for (key, value) in summary_lines(chart) {
                    ui.label(egui::RichText::new(key).strong());
                    ui.label(value);
                    ui.end_row();
                }
            });

        if let Some(path) = &chart.rendered.html_path {
            ui.small(path.display().to_string());
        }

        if copy_clicked {
            let text = self.source.clone();
            ui.output_mut(|o| o.copied_text = text);
        }
        if open_clicked {
            self.last_error = self.open_in_browser().err().map(|e| e.to_string());
        }
        if let Some(err) = &self.last_error {
            ui.colored_label(egui::Color32::from_rgb(200, 80, 80), err);
        }

        if self.show_source {
            ui.separator();
            ScrollArea::vertical()
                .auto_shrink([false, false])
                .show(ui, |ui| {
                    ui.add(
                        egui::TextEdit::multiline(&mut self.source.as_str())
                            .code_editor()
                            .desired_width(f32::INFINITY),
                    );
                });
        }
    }
}

fn levels(cat: &Categorical) -> String {
    let names: Vec<String> = cat
        .levels
        .iter()
        .zip(cat.counts())
        .map(|(level, n)| format!("{}: {}", level.display(), n))
        .collect();
    format!("{} ({})", cat.column, names.join(", "))
}

/// Key/value rows describing a chart
pub fn summary_lines(chart: &LiveChart) -> Vec<(&'static str, String)> {
    let spec = &chart.spec;
    let mut lines = vec![(
        "Type",
        match spec.geometry {
            Geometry::Points => "Scatter".to_string(),
            Geometry::Density => "Density".to_string(),
        },
    )];

    lines.push(("X", spec.x.clone()));
    if let Some(y) = &spec.y {
        lines.push(("Y", y.clone()));
    }
    if let Some(color) = &spec.color {
        lines.push(("Color", levels(color)));
    }
    if let Some(shape) = &spec.shape {
        lines.push(("Shape", levels(shape)));
    }
    if let Some(smoothing) = &spec.smoothing {
        let mut trend = smoothing.method.display_name().to_string();
        if smoothing.automatic {
            trend.push_str(" (picked automatically)");
        }
        lines.push(("Trend", trend));
    }
    if let Some(facet) = &spec.facet {
        lines.push(("Panels", format!("{} by {}", facet.len(), levels(facet))));
    }
    lines
}
