//! Side-panel viewers for Chart Chat
//!
//! - Chart: summary of the live chart, Vega-Lite source, open in browser
//! - Dataset: column catalog and a sortable, filterable table

pub mod chart_viewer;
pub mod dataset_viewer;

pub use chart_viewer::ChartViewer;
pub use dataset_viewer::DatasetViewer;

/// Tabs of the side panel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PanelTab {
    #[default]
    Chart,
    Dataset,
}

impl PanelTab {
    pub const ALL: [PanelTab; 2] = [PanelTab::Chart, PanelTab::Dataset];

    pub fn display_name(&self) -> &'static str {
        match self {
            PanelTab::Chart => "Chart",
            PanelTab::Dataset => "Dataset",
        }
    }
}
