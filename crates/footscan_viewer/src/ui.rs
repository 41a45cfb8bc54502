use scan_transfer::UploadResult;
use std::{path::PathBuf, time::Instant};

#[derive(Debug, Clone, Default)]
pub enum TransferStatus {
    #[default]
    Idle,
    Uploading { file: PathBuf, started: Instant },
    Done(UploadResult),
    Failed(String),
}

/// Everything the overlay shows, owned by the app and refreshed per frame.
#[derive(Debug, Default)]
pub struct Hud {
    pub status: TransferStatus,
    pub rendered_points: u32,
    /// Decode error for a processed file that arrived but could not be shown.
    pub decode_error: Option<String>,
}

impl Hud {
    pub fn status_line(&self) -> String {
        match &self.status {
            TransferStatus::Idle => "Idle".to_owned(),
            TransferStatus::Uploading { file, started } => format!(
                "Uploading {} ({}s)",
                file.display(),
                started.elapsed().as_secs()
            ),
            TransferStatus::Done(result) => match result.processing_succeeded {
                Some(false) => "Done (service flagged processing as unsuccessful)".to_owned(),
                _ => "Done".to_owned(),
            },
            TransferStatus::Failed(message) => format!("Failed: {message}"),
        }
    }
}

/// Measurements render as two decimals; a value the service did not report as `n/a`.
pub fn format_measurement(value: f64) -> String {
    if value.is_finite() {
        format!("{value:.2}")
    } else {
        "n/a".to_owned()
    }
}

pub fn draw_hud(ctx: &egui::Context, hud: &Hud) {
    egui::Window::new("Scan")
        .default_pos([12.0, 12.0])
        .resizable(false)
        .show(ctx, |ui| {
            ui.label(hud.status_line());
            ui.label(format!("Rendered points: {}", hud.rendered_points));
            if let Some(err) = &hud.decode_error {
                ui.colored_label(egui::Color32::LIGHT_RED, err);
            }

            let TransferStatus::Done(result) = &hud.status else {
                return;
            };

            ui.separator();
            egui::Grid::new("measurements")
                .num_columns(2)
                .striped(true)
                .show(ui, |ui| {
                    for (label, value) in result.measurements.labelled() {
                        ui.label(label);
                        ui.label(format_measurement(value));
                        ui.end_row();
                    }
                    ui.label("Points (service)");
                    ui.label(result.point_count.to_string());
                    ui.end_row();
                });

            if let Some(overview) = &result.overview_text {
                ui.separator();
                ui.label("Overview");
                egui::ScrollArea::vertical()
                    .max_height(160.0)
                    .show(ui, |ui| ui.label(overview));
            }
            if let Some(source) = &result.analysis_source {
                ui.label(format!("Source: {source}"));
            }
            ui.separator();
            ui.label(format!("Saved to {}", result.saved_file_path.display()));
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use scan_transfer::Measurements;

    fn result(processing_succeeded: Option<bool>) -> UploadResult {
        UploadResult {
            measurements: Measurements {
                foot_length: 245.3,
                foot_width: f64::NAN,
                circumference: 240.0,
                dorsum_height_50: 61.25,
                ahi: 0.29,
            },
            point_count: 15420,
            overview_text: None,
            analysis_source: None,
            processing_succeeded,
            saved_file_path: PathBuf::from("/tmp/processed.ply"),
            suggested_filename: "processed.ply".into(),
        }
    }

    #[test]
    fn nan_renders_as_not_available() {
        assert_eq!(format_measurement(f64::NAN), "n/a");
        assert_eq!(format_measurement(245.3), "245.30");
        assert_eq!(format_measurement(0.0), "0.00");
    }

    #[test]
    fn status_lines() {
        let mut hud = Hud::default();
        assert_eq!(hud.status_line(), "Idle");

        hud.status = TransferStatus::Failed("HTTP 500: boom".into());
        assert_eq!(hud.status_line(), "Failed: HTTP 500: boom");

        hud.status = TransferStatus::Done(result(None));
        assert_eq!(hud.status_line(), "Done");
        hud.status = TransferStatus::Done(result(Some(false)));
        assert!(hud.status_line().contains("unsuccessful"));
    }

    #[test]
    fn hud_draws_without_panicking() {
        let ctx = egui::Context::default();
        let hud = Hud {
            status: TransferStatus::Done(result(Some(true))),
            rendered_points: 15420,
            decode_error: None,
        };
        let _ = ctx.run(egui::RawInput::default(), |ctx| draw_hud(ctx, &hud));
    }
}
