use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

use eframe::egui;
use egui::{Color32, Key, RichText, Stroke, StrokeKind};
use rfd::FileDialog;

use crate::app::{EqAction, EqApp};
use crate::bands::{MAX_GAIN, MIN_GAIN};
use crate::playhead::{self, PlayheadController};
use crate::spectrum::{weighted_spectrum, FrequencyScale, SpectrogramData, SpectrumData};
use crate::transport::Channel;
use crate::view_sync::{ChartSurface, ViewRange};

// UI Constants
const CHART_HEIGHT: f32 = 130.0;
const SPECTROGRAM_HEIGHT: f32 = 90.0;
const SPECTRUM_HEIGHT: f32 = 170.0;
const CHART_BACKGROUND: Color32 = Color32::from_rgb(30, 30, 30);
const CHART_BORDER_COLOR: Color32 = Color32::from_rgb(60, 60, 60);
const ZERO_LINE_COLOR: Color32 = Color32::from_rgb(50, 50, 50);
const WAVEFORM_COLOR: Color32 = Color32::from_rgb(100, 160, 220);
const PROCESSED_COLOR: Color32 = Color32::from_rgb(120, 210, 140);
const PLAYHEAD_COLOR: Color32 = Color32::from_rgb(255, 50, 50);
const BAND_FILL_COLOR: Color32 = Color32::from_rgba_premultiplied(60, 60, 20, 60);
const BAND_GAIN_COLOR: Color32 = Color32::from_rgb(230, 200, 80);
const LABEL_COLOR: Color32 = Color32::from_rgb(200, 200, 200);
const DEGRADED_COLOR: Color32 = Color32::from_rgb(220, 160, 80);

/// Bins the full asset is peak-reduced into for waveform drawing.
const WAVEFORM_BINS: usize = 2048;
/// Narrowest zoom window, in seconds.
const MIN_VISIBLE_SPAN: f64 = 0.01;

/// The egui side of one waveform chart: pan/zoom viewport plus a
/// peak-reduced copy of the asset. User pans and zooms land in
/// `pending_user_change` for the sync controller to pick up; programmatic
/// writes via `apply_view_range` deliberately do not.
pub struct EqChartSurface {
    view: ViewRange,
    pending_user_change: Option<ViewRange>,
    peaks: Vec<(f32, f32)>,
}

impl Default for EqChartSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl EqChartSurface {
    pub fn new() -> Self {
        Self {
            view: ViewRange::full(0.0),
            pending_user_change: None,
            peaks: Vec::new(),
        }
    }

    pub fn has_waveform(&self) -> bool {
        !self.peaks.is_empty()
    }

    /// Reduce the asset to per-bin min/max pairs spanning its whole length.
    pub fn set_waveform(&mut self, samples: &[f32]) {
        self.peaks.clear();
        if samples.is_empty() {
            return;
        }
        let bins = WAVEFORM_BINS.min(samples.len());
        let per_bin = samples.len() as f32 / bins as f32;
        for bin in 0..bins {
            let start = (bin as f32 * per_bin) as usize;
            let end = (((bin + 1) as f32 * per_bin) as usize).min(samples.len());
            let mut lo = f32::MAX;
            let mut hi = f32::MIN;
            for &s in &samples[start..end.max(start + 1)] {
                lo = lo.min(s);
                hi = hi.max(s);
            }
            self.peaks.push((lo, hi));
        }
    }

    pub fn clear_waveform(&mut self) {
        self.peaks.clear();
    }

    fn record_user_change(&mut self, range: ViewRange) {
        self.view = range;
        self.pending_user_change = Some(range);
    }
}

impl ChartSurface for EqChartSurface {
    fn view_range(&self) -> ViewRange {
        self.view
    }

    fn apply_view_range(&mut self, range: ViewRange) {
        self.view = range;
    }

    fn take_user_change(&mut self) -> Option<ViewRange> {
        self.pending_user_change.take()
    }
}

/// What the pointer did to a waveform chart this frame, in pixels
/// relative to the chart's left edge.
struct ChartResponse {
    width: f32,
    clicked_at: Option<f32>,
    drag_started_at: Option<f32>,
    dragged_to: Option<f32>,
    drag_released: bool,
}

struct WaveformChart<'a> {
    title: &'a str,
    surface: &'a mut EqChartSurface,
    total_duration: f64,
    marker_time: Option<f64>,
}

impl<'a> WaveformChart<'a> {
    fn draw(&mut self, ui: &mut egui::Ui) -> ChartResponse {
        let available_width = ui.available_width();
        let (rect, response) = ui.allocate_exact_size(
            egui::Vec2::new(available_width, CHART_HEIGHT),
            egui::Sense::click_and_drag(),
        );
        let painter = ui.painter_at(rect);
        painter.rect_filled(rect, 0.0, CHART_BACKGROUND);
        painter.rect_stroke(rect, 0.0, Stroke::new(1.0, CHART_BORDER_COLOR), StrokeKind::Inside);

        let view = self.surface.view_range();
        let span = view.x_span();
        let y_span = view.y_range[1] - view.y_range[0];

        // y = 0 reference line
        if y_span > 0.0 {
            let zero_frac = (0.0 - view.y_range[0]) / y_span;
            let zero_y = rect.bottom() - zero_frac as f32 * rect.height();
            painter.line_segment(
                [
                    egui::Pos2::new(rect.left(), zero_y),
                    egui::Pos2::new(rect.right(), zero_y),
                ],
                Stroke::new(1.0, ZERO_LINE_COLOR),
            );
        }

        // One min/max column per pixel, sourced from the peak bins
        if !self.surface.peaks.is_empty() && self.total_duration > 0.0 && span > 0.0 && y_span > 0.0
        {
            let bins = self.surface.peaks.len();
            let width_px = rect.width() as usize;
            for px in 0..width_px {
                let t0 = view.x_range[0] + px as f64 / width_px as f64 * span;
                let t1 = view.x_range[0] + (px + 1) as f64 / width_px as f64 * span;
                let b0 = ((t0 / self.total_duration) * bins as f64).floor() as isize;
                let b1 = ((t1 / self.total_duration) * bins as f64).ceil() as isize;
                let b0 = b0.clamp(0, bins as isize - 1) as usize;
                let b1 = b1.clamp(b0 as isize + 1, bins as isize) as usize;
                let mut lo = f32::MAX;
                let mut hi = f32::MIN;
                for &(bin_lo, bin_hi) in &self.surface.peaks[b0..b1] {
                    lo = lo.min(bin_lo);
                    hi = hi.max(bin_hi);
                }
                let x = rect.left() + px as f32;
                let to_y = |v: f32| {
                    let frac = ((v as f64 - view.y_range[0]) / y_span).clamp(0.0, 1.0);
                    rect.bottom() - frac as f32 * rect.height()
                };
                painter.line_segment(
                    [egui::Pos2::new(x, to_y(lo)), egui::Pos2::new(x, to_y(hi))],
                    Stroke::new(1.0, WAVEFORM_COLOR),
                );
            }
        }

        painter.text(
            egui::Pos2::new(rect.left() + 6.0, rect.top() + 4.0),
            egui::Align2::LEFT_TOP,
            self.title,
            egui::FontId::proportional(12.0),
            LABEL_COLOR,
        );

        // Scroll-wheel zoom anchored at the pointer
        if self.total_duration > 0.0 {
            if let Some(hover) = response.hover_pos() {
                let scroll = ui.input(|i| i.raw_scroll_delta.y);
                if scroll != 0.0 && span > 0.0 {
                    let factor = (-scroll as f64 * 0.002).exp();
                    let new_span = (span * factor)
                        .clamp(MIN_VISIBLE_SPAN.min(self.total_duration), self.total_duration);
                    let anchor_frac = ((hover.x - rect.left()) / rect.width()) as f64;
                    let anchor_time = view.x_range[0] + anchor_frac * span;
                    let mut x0 = anchor_time - anchor_frac * new_span;
                    x0 = x0.clamp(0.0, self.total_duration - new_span);
                    self.surface.record_user_change(ViewRange {
                        x_range: [x0, x0 + new_span],
                        y_range: view.y_range,
                    });
                }
            }

            // Middle-drag pan
            if response.dragged_by(egui::PointerButton::Middle) && span > 0.0 {
                let delta = response.drag_delta();
                let mut x0 = view.x_range[0] - delta.x as f64 * span / rect.width() as f64;
                x0 = x0.clamp(0.0, (self.total_duration - span).max(0.0));
                self.surface.record_user_change(ViewRange {
                    x_range: [x0, x0 + span],
                    y_range: view.y_range,
                });
            }
        }

        // Playback marker
        if let Some(time) = self.marker_time {
            if let Some(x) = playhead::marker_x(time, self.total_duration, &view, rect.width()) {
                painter.line_segment(
                    [
                        egui::Pos2::new(rect.left() + x, rect.top()),
                        egui::Pos2::new(rect.left() + x, rect.bottom()),
                    ],
                    Stroke::new(2.0, PLAYHEAD_COLOR),
                );
            }
        }

        let rel = |pos: egui::Pos2| pos.x - rect.left();
        let primary = egui::PointerButton::Primary;
        ChartResponse {
            width: rect.width(),
            clicked_at: if response.clicked() {
                response.interact_pointer_pos().map(rel)
            } else {
                None
            },
            drag_started_at: if response.drag_started_by(primary) {
                response.interact_pointer_pos().map(rel)
            } else {
                None
            },
            dragged_to: if response.dragged_by(primary) {
                response.interact_pointer_pos().map(rel)
            } else {
                None
            },
            drag_released: response.drag_stopped_by(primary),
        }
    }
}

struct SpectrumChart<'a> {
    title: &'a str,
    spectrum: &'a SpectrumData,
    /// Local preview of the engine's mask applied to `spectrum`, drawn as
    /// a second polyline when present.
    preview: Option<Vec<f32>>,
    bands: Vec<(f32, f32, f32)>, // start, end, gain
    scale: FrequencyScale,
}

impl<'a> SpectrumChart<'a> {
    fn draw(&self, ui: &mut egui::Ui) {
        let available_width = ui.available_width();
        let (rect, _response) = ui.allocate_exact_size(
            egui::Vec2::new(available_width, SPECTRUM_HEIGHT),
            egui::Sense::hover(),
        );
        let painter = ui.painter_at(rect);
        painter.rect_filled(rect, 0.0, CHART_BACKGROUND);
        painter.rect_stroke(rect, 0.0, Stroke::new(1.0, CHART_BORDER_COLOR), StrokeKind::Inside);

        let title = if self.spectrum.degraded {
            format!("{} (approx)", self.title)
        } else {
            self.title.to_string()
        };
        painter.text(
            egui::Pos2::new(rect.left() + 6.0, rect.top() + 4.0),
            egui::Align2::LEFT_TOP,
            title,
            egui::FontId::proportional(12.0),
            if self.spectrum.degraded {
                DEGRADED_COLOR
            } else {
                LABEL_COLOR
            },
        );

        if self.spectrum.frequencies.len() < 2 {
            return;
        }
        // Cached payloads stay on the linear axis; the display scale is
        // applied here, so no recompute is needed to switch
        let freqs = self.scale.map_all(&self.spectrum.frequencies);
        let max_freq = freqs[freqs.len() - 1].max(1.0);
        let max_mag = self
            .spectrum
            .magnitudes
            .iter()
            .chain(self.preview.iter().flatten())
            .fold(0.0f32, |m, &v| m.max(v))
            .max(f32::MIN_POSITIVE);

        let to_x = |freq: f32| rect.left() + (freq / max_freq).clamp(0.0, 1.0) * rect.width();
        let to_y = |mag: f32| rect.bottom() - (mag / max_mag).clamp(0.0, 1.0) * (rect.height() - 18.0);

        // Band regions behind the curves, gain drawn as a horizontal bar,
        // on the same display scale as the curves
        for &(start, end, gain) in &self.bands {
            let x0 = to_x(self.scale.map(start));
            let x1 = to_x(self.scale.map(end));
            if x1 <= x0 {
                continue;
            }
            let band_rect =
                egui::Rect::from_min_max(egui::Pos2::new(x0, rect.top()), egui::Pos2::new(x1, rect.bottom()));
            painter.rect_filled(band_rect, 0.0, BAND_FILL_COLOR);
            let gain_y = rect.bottom() - (gain / MAX_GAIN).clamp(0.0, 1.0) * rect.height();
            painter.line_segment(
                [egui::Pos2::new(x0, gain_y), egui::Pos2::new(x1, gain_y)],
                Stroke::new(1.5, BAND_GAIN_COLOR),
            );
        }

        let polyline = |mags: &[f32], color: Color32| {
            let points: Vec<egui::Pos2> = freqs
                .iter()
                .zip(mags.iter())
                .map(|(&f, &m)| egui::Pos2::new(to_x(f), to_y(m)))
                .collect();
            painter.add(egui::Shape::line(points, Stroke::new(1.0, color)));
        };
        polyline(&self.spectrum.magnitudes, WAVEFORM_COLOR);
        if let Some(preview) = &self.preview {
            polyline(preview, PROCESSED_COLOR);
        }
    }
}

struct SpectrogramChart<'a> {
    title: &'a str,
    spectrogram: &'a SpectrogramData,
    scale: FrequencyScale,
}

impl<'a> SpectrogramChart<'a> {
    fn draw(&self, ui: &mut egui::Ui) {
        let available_width = ui.available_width();
        let (rect, _response) = ui.allocate_exact_size(
            egui::Vec2::new(available_width, SPECTROGRAM_HEIGHT),
            egui::Sense::hover(),
        );
        let painter = ui.painter_at(rect);
        painter.rect_filled(rect, 0.0, CHART_BACKGROUND);
        painter.rect_stroke(rect, 0.0, Stroke::new(1.0, CHART_BORDER_COLOR), StrokeKind::Inside);
        painter.text(
            egui::Pos2::new(rect.left() + 6.0, rect.top() + 4.0),
            egui::Align2::LEFT_TOP,
            self.title,
            egui::FontId::proportional(12.0),
            LABEL_COLOR,
        );

        let frames = &self.spectrogram.magnitudes;
        if frames.is_empty() || frames[0].is_empty() {
            return;
        }
        let max_mag = frames
            .iter()
            .flat_map(|frame| frame.iter())
            .fold(0.0f32, |m, &v| m.max(v))
            .max(f32::MIN_POSITIVE);

        // Nearest-frame, nearest-bin heatmap at a coarse cell size. Each
        // display row is placed by its frequency on the chosen scale.
        let mapped_freqs = self.scale.map_all(&self.spectrogram.frequencies);
        let mapped_max = mapped_freqs.last().copied().unwrap_or(1.0).max(1.0);
        let cell = 3.0;
        let cols = (rect.width() / cell) as usize;
        let rows = (rect.height() / cell) as usize;
        for col in 0..cols {
            let frame = &frames[(col * frames.len() / cols.max(1)).min(frames.len() - 1)];
            for row in 0..rows {
                let target = (row as f32 + 0.5) / rows.max(1) as f32 * mapped_max;
                let bin = mapped_freqs
                    .partition_point(|&f| f < target)
                    .min(frame.len() - 1);
                // log-ish brightness so quiet content stays visible
                let level = (frame[bin] / max_mag).sqrt().clamp(0.0, 1.0);
                let shade = (level * 255.0) as u8;
                if shade < 8 {
                    continue;
                }
                let x = rect.left() + col as f32 * cell;
                let y = rect.bottom() - (row + 1) as f32 * cell;
                painter.rect_filled(
                    egui::Rect::from_min_size(egui::Pos2::new(x, y), egui::Vec2::splat(cell)),
                    0.0,
                    Color32::from_rgb(shade / 4, shade / 2, shade),
                );
            }
        }
    }
}

struct TransportControls<'a> {
    input_playing: bool,
    output_playing: bool,
    has_input: bool,
    has_output: bool,
    rate: f64,
    processing: bool,
    on_open: &'a mut dyn FnMut(),
    on_test_signal: &'a mut dyn FnMut(),
    on_toggle_input: &'a mut dyn FnMut(),
    on_toggle_output: &'a mut dyn FnMut(),
    on_stop: &'a mut dyn FnMut(),
    on_rate_change: &'a mut dyn FnMut(f64),
    on_reset_view: &'a mut dyn FnMut(),
    on_export: &'a mut dyn FnMut(),
}

impl<'a> TransportControls<'a> {
    fn draw(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.add_space(8.0);

            if ui
                .button(RichText::new("📂").size(18.0))
                .on_hover_text("Open audio file")
                .clicked()
            {
                (self.on_open)();
            }
            if ui
                .button(RichText::new("🎵").size(18.0))
                .on_hover_text("Load test signal")
                .clicked()
            {
                (self.on_test_signal)();
            }

            ui.add_space(16.0);
            ui.separator();

            ui.label(RichText::new("Original:").size(14.0));
            let input_icon = if self.input_playing { "⏸" } else { "▶" };
            if ui
                .add_enabled(self.has_input, egui::Button::new(RichText::new(input_icon).size(18.0)))
                .on_hover_text("Play/pause the original")
                .clicked()
            {
                (self.on_toggle_input)();
            }

            ui.label(RichText::new("Processed:").size(14.0));
            let output_icon = if self.output_playing { "⏸" } else { "▶" };
            if ui
                .add_enabled(
                    self.has_output,
                    egui::Button::new(RichText::new(output_icon).size(18.0)),
                )
                .on_hover_text("Play/pause the processed result")
                .clicked()
            {
                (self.on_toggle_output)();
            }

            if ui
                .button(RichText::new("⏹").size(18.0))
                .on_hover_text("Stop")
                .clicked()
            {
                (self.on_stop)();
            }

            ui.add_space(16.0);
            ui.label(RichText::new("Rate:").size(14.0));
            let mut rate = self.rate;
            ui.add(egui::Slider::new(&mut rate, 0.25..=2.0).step_by(0.05));
            if rate != self.rate {
                (self.on_rate_change)(rate);
            }

            ui.add_space(16.0);
            if ui
                .button(RichText::new("🔍").size(18.0))
                .on_hover_text("Reset zoom")
                .clicked()
            {
                (self.on_reset_view)();
            }
            if ui
                .add_enabled(self.has_output, egui::Button::new(RichText::new("💾").size(18.0)))
                .on_hover_text("Export processed WAV")
                .clicked()
            {
                (self.on_export)();
            }

            if self.processing {
                ui.add_space(16.0);
                ui.spinner();
                ui.label(RichText::new("Processing…").size(12.0).color(LABEL_COLOR));
            }
        });
    }
}

struct BandControls<'a> {
    bands: Vec<(u64, f32, f32, f32)>, // id, start, end, gain
    draft: &'a mut (f32, f32),
    on_gain_change: &'a mut dyn FnMut(u64, f32),
    on_range_change: &'a mut dyn FnMut(u64, f32, f32),
    on_remove: &'a mut dyn FnMut(u64),
    on_add: &'a mut dyn FnMut(f32, f32),
}

impl<'a> BandControls<'a> {
    fn draw(&mut self, ui: &mut egui::Ui) {
        ui.label(RichText::new("Bands").size(16.0));
        ui.add_space(4.0);

        for &(id, start, end, gain) in &self.bands {
            ui.horizontal(|ui| {
                let mut new_start = start;
                let mut new_end = end;
                ui.add(
                    egui::DragValue::new(&mut new_start)
                        .speed(10.0)
                        .range(0.0..=24000.0)
                        .suffix(" Hz"),
                );
                ui.label("–");
                ui.add(
                    egui::DragValue::new(&mut new_end)
                        .speed(10.0)
                        .range(0.0..=24000.0)
                        .suffix(" Hz"),
                );
                if (new_start != start || new_end != end) && new_start < new_end {
                    (self.on_range_change)(id, new_start, new_end);
                }
                if ui
                    .button(RichText::new("✖").size(12.0))
                    .on_hover_text("Remove band")
                    .clicked()
                {
                    (self.on_remove)(id);
                }
            });
            let mut new_gain = gain;
            ui.add(egui::Slider::new(&mut new_gain, MIN_GAIN..=MAX_GAIN).text("gain"));
            if new_gain != gain {
                (self.on_gain_change)(id, new_gain);
            }
            ui.add_space(4.0);
        }

        ui.separator();
        ui.horizontal(|ui| {
            ui.add(
                egui::DragValue::new(&mut self.draft.0)
                    .speed(10.0)
                    .range(0.0..=24000.0)
                    .suffix(" Hz"),
            );
            ui.label("–");
            ui.add(
                egui::DragValue::new(&mut self.draft.1)
                    .speed(10.0)
                    .range(0.0..=24000.0)
                    .suffix(" Hz"),
            );
            if ui.button("+ Add").clicked() {
                (self.on_add)(self.draft.0, self.draft.1);
            }
        });
    }
}

struct PresetControls<'a> {
    names: Vec<String>,
    selected: &'a mut String,
    save_name: &'a mut String,
    on_load: &'a mut dyn FnMut(String),
    on_save: &'a mut dyn FnMut(String),
    on_delete: &'a mut dyn FnMut(String),
}

impl<'a> PresetControls<'a> {
    fn draw(&mut self, ui: &mut egui::Ui) {
        ui.label(RichText::new("Presets").size(16.0));
        ui.add_space(4.0);

        egui::ComboBox::from_id_salt("preset_select")
            .selected_text(if self.selected.is_empty() {
                "choose…"
            } else {
                self.selected.as_str()
            })
            .show_ui(ui, |ui| {
                for name in &self.names {
                    ui.selectable_value(self.selected, name.clone(), name);
                }
            });
        ui.horizontal(|ui| {
            if ui
                .add_enabled(!self.selected.is_empty(), egui::Button::new("Load"))
                .clicked()
            {
                (self.on_load)(self.selected.clone());
            }
            if ui
                .add_enabled(!self.selected.is_empty(), egui::Button::new("Delete"))
                .clicked()
            {
                (self.on_delete)(self.selected.clone());
            }
        });

        ui.add_space(4.0);
        ui.horizontal(|ui| {
            ui.add(egui::TextEdit::singleline(self.save_name).desired_width(100.0));
            if ui
                .add_enabled(!self.save_name.is_empty(), egui::Button::new("Save"))
                .clicked()
            {
                (self.on_save)(self.save_name.clone());
            }
        });
    }
}

/// Turn a chart's pointer activity into playhead drags and seeks.
fn handle_chart_response(
    response: &ChartResponse,
    view: ViewRange,
    total_duration: f64,
    current_time: f64,
    playhead: &mut PlayheadController,
    actions: &Rc<RefCell<Vec<EqAction>>>,
) {
    if let Some(px) = response.drag_started_at {
        playhead.on_drag_start(px, current_time);
    }
    if let Some(px) = response.dragged_to {
        if let Some(time) = playhead.on_drag_move(px, total_duration, &view, response.width) {
            actions.borrow_mut().push(EqAction::Seek(time));
        }
    }
    if response.drag_released {
        playhead.on_drag_end();
    }
    if let Some(px) = response.clicked_at {
        if total_duration > 0.0 && response.width > 0.0 {
            let time = view.x_range[0] + px as f64 / response.width as f64 * view.x_span();
            actions.borrow_mut().push(EqAction::Seek(time));
        }
    }
}

fn format_time(seconds: f64) -> String {
    let whole = seconds.max(0.0) as u64;
    format!("{}:{:04.1}", whole / 60, seconds.max(0.0) % 60.0)
}

impl eframe::App for EqApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        ctx.set_visuals(egui::Visuals::dark());

        // Force continuous repaints at 60 FPS
        ctx.request_repaint_after(std::time::Duration::from_secs_f32(1.0 / 60.0));

        let now = Instant::now();
        self.tick(now);

        if ctx.input(|i| i.key_pressed(Key::Space)) {
            self.dispatch(EqAction::TogglePlay(Channel::Input), now);
        }

        // Store state values locally to use in UI closures
        let transport = self.playback.transport();
        let input_playing = transport.is_playing(Channel::Input);
        let output_playing = transport.is_playing(Channel::Output);
        let has_input = self.playback.has_asset(Channel::Input);
        let has_output = self.playback.has_asset(Channel::Output);
        let rate = transport.rate();
        let total_duration = transport.total_duration();
        let position = transport.position(now);
        let marker_time = transport.marker_visible().then_some(position);
        let processing = self.scheduler.is_processing();
        let band_rows: Vec<(u64, f32, f32, f32)> = self
            .bands
            .bands()
            .iter()
            .map(|b| (b.id, b.start_freq, b.end_freq, b.gain))
            .collect();
        let band_regions: Vec<(f32, f32, f32)> = self
            .bands
            .bands()
            .iter()
            .map(|b| (b.start_freq, b.end_freq, b.gain))
            .collect();
        let preset_names = self.preset_names();
        let status = self.status.clone();
        let freq_scale = self.freq_scale;

        let actions: Rc<RefCell<Vec<EqAction>>> = Rc::new(RefCell::new(Vec::new()));

        egui::TopBottomPanel::top("transport_controls").show(ctx, |ui| {
            let actions_clone = actions.clone();
            TransportControls {
                input_playing,
                output_playing,
                has_input,
                has_output,
                rate,
                processing,
                on_open: &mut || {
                    if let Some(path) = FileDialog::new()
                        .add_filter("Audio", &["wav", "mp3", "flac", "ogg"])
                        .pick_file()
                    {
                        actions_clone.borrow_mut().push(EqAction::LoadFile(path));
                    }
                },
                on_test_signal: &mut || {
                    actions_clone.borrow_mut().push(EqAction::LoadTestSignal);
                },
                on_toggle_input: &mut || {
                    actions_clone
                        .borrow_mut()
                        .push(EqAction::TogglePlay(Channel::Input));
                },
                on_toggle_output: &mut || {
                    actions_clone
                        .borrow_mut()
                        .push(EqAction::TogglePlay(Channel::Output));
                },
                on_stop: &mut || {
                    actions_clone.borrow_mut().push(EqAction::Stop);
                },
                on_rate_change: &mut |new_rate| {
                    actions_clone
                        .borrow_mut()
                        .push(EqAction::SetPlaybackRate(new_rate));
                },
                on_reset_view: &mut || {
                    actions_clone.borrow_mut().push(EqAction::ResetView);
                },
                on_export: &mut || {
                    if let Some(path) = FileDialog::new()
                        .add_filter("WAV", &["wav"])
                        .set_file_name("processed.wav")
                        .save_file()
                    {
                        actions_clone
                            .borrow_mut()
                            .push(EqAction::ExportProcessed(path));
                    }
                },
            }
            .draw(ui);
        });

        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label(
                    RichText::new(format!(
                        "{} / {}",
                        format_time(position),
                        format_time(total_duration)
                    ))
                    .size(12.0),
                );
                if let Some(status) = &status {
                    ui.separator();
                    ui.label(RichText::new(status).size(12.0).color(DEGRADED_COLOR));
                }
            });
        });

        egui::SidePanel::left("band_panel")
            .default_width(230.0)
            .show(ctx, |ui| {
                let actions_clone = actions.clone();
                BandControls {
                    bands: band_rows,
                    draft: &mut self.draft_band,
                    on_gain_change: &mut |id, gain| {
                        actions_clone
                            .borrow_mut()
                            .push(EqAction::SetBandGain { id, gain });
                    },
                    on_range_change: &mut |id, start_freq, end_freq| {
                        actions_clone.borrow_mut().push(EqAction::SetBandRange {
                            id,
                            start_freq,
                            end_freq,
                        });
                    },
                    on_remove: &mut |id| {
                        actions_clone.borrow_mut().push(EqAction::RemoveBand(id));
                    },
                    on_add: &mut |start_freq, end_freq| {
                        actions_clone.borrow_mut().push(EqAction::AddBand {
                            start_freq,
                            end_freq,
                        });
                    },
                }
                .draw(ui);

                ui.add_space(8.0);
                ui.separator();
                ui.add_space(8.0);

                let actions_clone = actions.clone();
                PresetControls {
                    names: preset_names,
                    selected: &mut self.selected_preset,
                    save_name: &mut self.preset_name,
                    on_load: &mut |name| {
                        actions_clone.borrow_mut().push(EqAction::LoadPreset(name));
                    },
                    on_save: &mut |name| {
                        actions_clone.borrow_mut().push(EqAction::SavePreset(name));
                    },
                    on_delete: &mut |name| {
                        actions_clone
                            .borrow_mut()
                            .push(EqAction::DeletePreset(name));
                    },
                }
                .draw(ui);
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical().show(ui, |ui| {
                let input_view = self.input_chart.view_range();
                let input_response = WaveformChart {
                    title: "Original",
                    surface: &mut self.input_chart,
                    total_duration,
                    marker_time,
                }
                .draw(ui);
                handle_chart_response(
                    &input_response,
                    input_view,
                    total_duration,
                    position,
                    &mut self.playhead,
                    &actions,
                );

                ui.add_space(8.0);

                let output_view = self.output_chart.view_range();
                let output_response = WaveformChart {
                    title: "Processed",
                    surface: &mut self.output_chart,
                    total_duration,
                    marker_time,
                }
                .draw(ui);
                handle_chart_response(
                    &output_response,
                    output_view,
                    total_duration,
                    position,
                    &mut self.playhead,
                    &actions,
                );

                ui.add_space(8.0);

                ui.horizontal(|ui| {
                    ui.label(RichText::new("Frequency scale:").size(12.0));
                    for scale in [FrequencyScale::Linear, FrequencyScale::Audiogram] {
                        if ui
                            .selectable_label(freq_scale == scale, scale.label())
                            .clicked()
                        {
                            actions
                                .borrow_mut()
                                .push(EqAction::SetFrequencyScale(scale));
                        }
                    }
                });

                ui.columns(2, |columns| {
                    let preview = if self.spectra.input_spectrum.frequencies.is_empty() {
                        None
                    } else {
                        Some(weighted_spectrum(
                            &self.spectra.input_spectrum.frequencies,
                            &self.spectra.input_spectrum.magnitudes,
                            self.bands.bands(),
                        ))
                    };
                    SpectrumChart {
                        title: "Input spectrum",
                        spectrum: &self.spectra.input_spectrum,
                        preview,
                        bands: band_regions.clone(),
                        scale: freq_scale,
                    }
                    .draw(&mut columns[0]);
                    SpectrumChart {
                        title: "Output spectrum",
                        spectrum: &self.spectra.output_spectrum,
                        preview: None,
                        bands: Vec::new(),
                        scale: freq_scale,
                    }
                    .draw(&mut columns[1]);
                });

                ui.add_space(8.0);

                ui.columns(2, |columns| {
                    SpectrogramChart {
                        title: "Input spectrogram",
                        spectrogram: &self.spectra.input_spectrogram,
                        scale: freq_scale,
                    }
                    .draw(&mut columns[0]);
                    SpectrogramChart {
                        title: "Output spectrogram",
                        spectrogram: &self.spectra.output_spectrogram,
                        scale: freq_scale,
                    }
                    .draw(&mut columns[1]);
                });
            });
        });

        let collected = actions.borrow_mut().drain(..).collect::<Vec<_>>();
        for action in collected {
            self.dispatch(action, now);
        }
    }
}
