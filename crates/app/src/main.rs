use eframe::egui;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use viewers::PanelTab;

mod state;
mod types;
mod utils;

use state::AppState;
use types::{ChatEntry, Role};
use utils::{load_settings_or_default, save_settings};

fn main() -> eframe::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let (settings, found) = load_settings_or_default();
    if !found {
        tracing::info!("no settings file, running with defaults");
    }
    let dark_mode = settings.dark_mode;

    let state = match AppState::new(settings) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "failed to start");
            eprintln!("Chart Chat could not start: {:#}", e);
            std::process::exit(1);
        }
    };

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1200.0, 800.0])
            .with_min_inner_size([800.0, 600.0]),
        vsync: true,
        ..Default::default()
    };
    eframe::run_native(
        "Chart Chat",
        options,
        Box::new(move |cc| {
            cc.egui_ctx.set_visuals(visuals(dark_mode));
            Box::new(ChartChatApp {
                state: Arc::new(Mutex::new(state)),
            })
        }),
    )
}

struct ChartChatApp {
    state: Arc<Mutex<AppState>>,
}

fn visuals(dark: bool) -> egui::Visuals {
    if dark {
        egui::Visuals::dark()
    } else {
        egui::Visuals::light()
    }
}

impl eframe::App for ChartChatApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let mut s = self.state.lock();

        // Poll the running turn (non-blocking)
        s.poll_session();
        if s.is_thinking {
            ctx.request_repaint();
        }

        let dark = s.settings.dark_mode;

        egui::TopBottomPanel::top("header").show(ctx, |ui| {
            ui.add_space(6.0);
            ui.horizontal(|ui| {
                ui.heading("Chart Chat");
                ui.label(egui::RichText::new("mtcars").weak());

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    let theme = if dark { "Light" } else { "Dark" };
                    if ui.button(theme).on_hover_text("Switch theme").clicked() {
                        s.settings.dark_mode = !dark;
                        ctx.set_visuals(visuals(s.settings.dark_mode));
                        save_settings(&s.settings);
                    }
                    if ui
                        .add_enabled(!s.is_thinking, egui::Button::new("Clear"))
                        .on_hover_text("Start a new conversation")
                        .clicked()
                    {
                        s.clear_chat();
                    }
                });
            });
            ui.add_space(6.0);
        });

        egui::SidePanel::right("viewer_panel")
            .resizable(true)
            .default_width(480.0)
            .min_width(320.0)
            .show(ctx, |ui| {
                ui.add_space(6.0);
                ui.horizontal(|ui| {
                    for tab in PanelTab::ALL {
                        if ui
                            .selectable_label(s.panel_tab == tab, tab.display_name())
                            .clicked()
                        {
                            s.panel_tab = tab;
                        }
                    }
                });
                ui.separator();
                match s.panel_tab {
                    PanelTab::Chart => s.chart_viewer.ui(ui),
                    PanelTab::Dataset => s.dataset_viewer.ui(ui),
                }
            });

        egui::TopBottomPanel::bottom("input_panel").show(ctx, |ui| {
            ui.add_space(8.0);
            ui.horizontal(|ui| {
                let is_busy = s.is_thinking;

                let response = ui.add_sized(
                    [ui.available_width() - 80.0, 40.0],
                    egui::TextEdit::singleline(&mut s.input_text)
                        .hint_text("Ask for a chart, e.g. mpg against weight colored by cylinders")
                        .font(egui::FontId::new(15.0, egui::FontFamily::Proportional)),
                );

                if response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
                    s.send_message();
                    response.request_focus();
                }

                let btn = if is_busy {
                    egui::Button::new("Stop").fill(egui::Color32::from_rgb(180, 80, 80))
                } else {
                    egui::Button::new("Send").fill(egui::Color32::from_rgb(70, 130, 180))
                };
                if ui.add_sized([70.0, 40.0], btn).clicked() {
                    if is_busy {
                        s.cancel();
                    } else {
                        s.send_message();
                    }
                }
            });
            ui.add_space(8.0);
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical()
                .auto_shrink([false, false])
                .stick_to_bottom(true)
                .show(ui, |ui| {
                    for entry in &s.entries {
                        ui.add_space(6.0);
                        render_message(ui, entry, dark);
                        ui.add_space(6.0);
                    }

                    if s.is_thinking {
                        ui.add_space(6.0);
                        render_thinking(ui, &s, dark);
                    }
                });
        });
    }
}

fn render_thinking(ui: &mut egui::Ui, s: &AppState, dark: bool) {
    egui::Frame::none()
        .fill(if dark {
            egui::Color32::from_rgb(50, 50, 58)
        } else {
            egui::Color32::from_rgb(230, 230, 235)
        })
        .rounding(egui::Rounding::same(12.0))
        .inner_margin(egui::Margin::same(12.0))
        .show(ui, |ui| {
            ui.horizontal(|ui| {
                ui.spinner();
                let status = s.status.clone().unwrap_or_else(|| "Thinking".to_string());
                ui.label(
                    egui::RichText::new(format!("{} ({}s)", status, s.thinking_secs()))
                        .color(if dark {
                            egui::Color32::from_rgb(160, 160, 180)
                        } else {
                            egui::Color32::from_rgb(60, 60, 70)
                        })
                        .italics(),
                );
            });
        });
}

fn render_message(ui: &mut egui::Ui, entry: &ChatEntry, dark: bool) {
    match entry.role {
        Role::User => {
            // User message - right aligned, blue
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Min), |ui| {
                ui.add_space(8.0);
                egui::Frame::none()
                    .fill(egui::Color32::from_rgb(70, 130, 180))
                    .rounding(egui::Rounding::same(12.0))
                    .inner_margin(egui::Margin::same(12.0))
                    .show(ui, |ui| {
                        ui.set_max_width(500.0);
                        ui.label(
                            egui::RichText::new(&entry.content)
                                .color(egui::Color32::WHITE)
                                .size(15.0),
                        );
                    });
            });
        }
        Role::Diagnostic => {
            egui::Frame::none()
                .fill(if dark {
                    egui::Color32::from_rgb(70, 58, 40)
                } else {
                    egui::Color32::from_rgb(252, 243, 224)
                })
                .rounding(egui::Rounding::same(8.0))
                .inner_margin(egui::Margin::symmetric(12.0, 6.0))
                .show(ui, |ui| {
                    ui.set_max_width(600.0);
                    ui.label(
                        egui::RichText::new(&entry.content)
                            .color(if dark {
                                egui::Color32::from_rgb(230, 190, 120)
                            } else {
                                egui::Color32::from_rgb(140, 90, 20)
                            })
                            .size(13.0),
                    );
                });
        }
        Role::Assistant => {
            egui::Frame::none()
                .fill(if dark {
                    egui::Color32::from_rgb(50, 50, 58)
                } else {
                    egui::Color32::from_rgb(245, 245, 248)
                })
                .rounding(egui::Rounding::same(12.0))
                .inner_margin(egui::Margin::same(12.0))
                .show(ui, |ui| {
                    ui.set_max_width(600.0);

                    let text_color = if dark {
                        egui::Color32::from_rgb(220, 220, 230)
                    } else {
                        egui::Color32::from_rgb(40, 40, 50)
                    };
                    ui.label(
                        egui::RichText::new(&entry.content)
                            .color(text_color)
                            .size(15.0),
                    );

                    ui.add_space(8.0);
                    ui.horizontal(|ui| {
                        if ui
                            .small_button("Copy")
                            .on_hover_text("Copy to clipboard")
                            .clicked()
                        {
                            let copied = if let Some(details) = &entry.details {
                                format!("{}\n\nDetails:\n{}", entry.content, details)
                            } else {
                                entry.content.clone()
                            };
                            ui.output_mut(|o| o.copied_text = copied);
                        }
                        ui.label(
                            egui::RichText::new(entry.timestamp.format("%H:%M").to_string())
                                .size(11.0)
                                .weak(),
                        );
                    });

                    if let Some(details) = &entry.details {
                        ui.add_space(6.0);
                        let details_color = if dark {
                            egui::Color32::from_rgb(150, 150, 165)
                        } else {
                            egui::Color32::from_rgb(110, 110, 125)
                        };
                        egui::CollapsingHeader::new("Details")
                            .id_source(entry.timestamp.timestamp_nanos_opt())
                            .default_open(false)
                            .show(ui, |ui| {
                                ui.label(
                                    egui::RichText::new(details)
                                        .monospace()
                                        .size(12.0)
                                        .color(details_color),
                                );
                            });
                    }
                });
        }
    }
}
