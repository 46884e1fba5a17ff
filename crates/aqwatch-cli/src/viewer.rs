use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use aqwatch_core::render::ids;
use aqwatch_core::{
    spawn_subscription, Actuator, ChartSeries, ChartSurface, Commander, Dashboard,
    DashboardConfig, DeviceStore, DisplayMode, Renderer, StyleProp, ViewSurface,
};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::symbols;
use ratatui::text::{Line, Span};
use ratatui::widgets::{Axis, Block, Borders, Chart, Dataset, Gauge, GraphType, Paragraph};
use ratatui::Terminal;
use tokio::sync::mpsc;
use tracing::error;

#[derive(Debug, Default, Clone)]
struct Element {
    text: String,
    class: String,
    background: Option<String>,
    display: Option<DisplayMode>,
    width: Option<u8>,
}

/// Terminal stand-in for the element tree the renderer writes into.
#[derive(Debug, Default)]
struct BoardView {
    elements: HashMap<String, Element>,
}

impl BoardView {
    fn get(&self, id: &str) -> Option<&Element> {
        self.elements.get(id)
    }

    fn text(&self, id: &str) -> &str {
        self.get(id).map(|e| e.text.as_str()).unwrap_or("--")
    }

    fn class(&self, id: &str) -> &str {
        self.get(id).map(|e| e.class.as_str()).unwrap_or("")
    }

    fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

impl ViewSurface for BoardView {
    fn set_text(&mut self, id: &str, text: &str) {
        self.elements.entry(id.to_string()).or_default().text = text.to_string();
    }

    fn set_class(&mut self, id: &str, class: &str) {
        self.elements.entry(id.to_string()).or_default().class = class.to_string();
    }

    fn set_style(&mut self, id: &str, style: StyleProp) {
        let element = self.elements.entry(id.to_string()).or_default();
        match style {
            StyleProp::BackgroundColor(color) => element.background = Some(color),
            StyleProp::Display(mode) => element.display = Some(mode),
            StyleProp::WidthPercent(width) => element.width = Some(width),
        }
    }
}

#[derive(Debug, Default)]
struct AqiChart {
    points: Vec<(f64, f64)>,
    first_label: String,
    last_label: String,
    bounds: [f64; 2],
    capacity: usize,
}

impl ChartSurface for AqiChart {
    fn redraw(&mut self, series: &ChartSeries) {
        self.points = series
            .points()
            .enumerate()
            .map(|(idx, p)| (idx as f64, p.aqi))
            .collect();
        self.first_label = series.first().map(|p| p.label.clone()).unwrap_or_default();
        self.last_label = series.last().map(|p| p.label.clone()).unwrap_or_default();
        self.bounds = series.bounds();
        self.capacity = series.capacity();
    }
}

#[derive(Debug, Clone, Copy)]
enum Action {
    Toggle(Actuator),
    Acknowledge,
}

impl Action {
    fn label(self) -> &'static str {
        match self {
            Action::Toggle(Actuator::Sprinkler) => "sprinkler toggle",
            Action::Toggle(Actuator::Buzzer) => "buzzer toggle",
            Action::Acknowledge => "fire acknowledge",
        }
    }
}

fn dispatch<S>(commander: &Commander<S>, action: Action, notices: mpsc::UnboundedSender<String>)
where
    S: DeviceStore + ?Sized + 'static,
{
    let commander = commander.clone();
    tokio::spawn(async move {
        let result = match action {
            Action::Toggle(actuator) => commander.toggle(actuator).await,
            Action::Acknowledge => commander.acknowledge_fire().await,
        };
        let notice = match result {
            Ok(()) => format!("{} sent", action.label()),
            Err(err) => {
                error!(%err, action = action.label(), "command failed");
                format!("{} failed: {err}", action.label())
            }
        };
        let _ = notices.send(notice);
    });
}

pub async fn run_viewer<S>(store: Arc<S>, config: &DashboardConfig) -> Result<()>
where
    S: DeviceStore + ?Sized + 'static,
{
    let (mut inbox, subscription) = spawn_subscription(store.clone(), config.inbox_capacity);
    let renderer = Renderer::new(
        BoardView::default(),
        AqiChart::default(),
        ChartSeries::new(config.series_capacity),
    );
    let mut dashboard = Dashboard::new(renderer);
    let commander = Commander::new(store, dashboard.mirror());
    let (notice_tx, mut notice_rx) = mpsc::unbounded_channel();
    let mut notice = String::new();

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let run_result = async {
        loop {
            if event::poll(Duration::from_millis(50))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind != KeyEventKind::Release {
                        let action = match key.code {
                            KeyCode::Char('q') | KeyCode::Esc => break,
                            KeyCode::Char('s') => Some(Action::Toggle(Actuator::Sprinkler)),
                            KeyCode::Char('b') => Some(Action::Toggle(Actuator::Buzzer)),
                            KeyCode::Char('a') => Some(Action::Acknowledge),
                            _ => None,
                        };
                        if let Some(action) = action {
                            dispatch(&commander, action, notice_tx.clone());
                        }
                    }
                }
            }

            dashboard.drain(&mut inbox);
            while let Ok(next) = notice_rx.try_recv() {
                notice = next;
            }

            terminal.draw(|frame| draw_ui(frame.size(), frame, &dashboard, &config.device_id, &notice))?;
        }

        Ok::<(), anyhow::Error>(())
    }
    .await;

    subscription.abort();
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    run_result
}

fn hex_color(hex: &str) -> Option<Color> {
    let hex = hex.strip_prefix('#')?;
    if hex.len() != 6 {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(hex.get(range)?, 16).ok();
    Some(Color::Rgb(channel(0..2)?, channel(2..4)?, channel(4..6)?))
}

fn class_color(class: &str) -> Color {
    match class.rsplit('-').next() {
        Some("success") | Some("online") => Color::Green,
        Some("warning") => Color::Yellow,
        Some("danger") | Some("offline") => Color::Red,
        Some("dark") => Color::DarkGray,
        _ => Color::Gray,
    }
}

fn draw_ui(
    area: Rect,
    frame: &mut ratatui::Frame<'_>,
    dashboard: &Dashboard<BoardView, AqiChart>,
    device_id: &str,
    notice: &str,
) {
    let view = dashboard.renderer().view();
    let alert_visible = view
        .get(ids::FIRE_ALERT)
        .and_then(|e| e.display)
        .is_some_and(|d| d == DisplayMode::Block);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(if alert_visible { 3 } else { 0 }),
            Constraint::Length(9),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(area);

    frame.render_widget(render_header(view, device_id), rows[0]);
    if alert_visible {
        frame.render_widget(render_fire_alert(), rows[1]);
    }

    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(40),
            Constraint::Percentage(30),
            Constraint::Percentage(30),
        ])
        .split(rows[2]);

    render_air_quality(frame, cols[0], view);
    frame.render_widget(render_sensors(view), cols[1]);
    frame.render_widget(render_controls(view), cols[2]);
    render_aqi_chart(frame, rows[3], dashboard.renderer().chart());
    frame.render_widget(render_footer(dashboard, notice), rows[4]);
}

fn render_header(view: &BoardView, device_id: &str) -> Paragraph<'static> {
    let status = view.class(ids::DEVICE_STATUS);
    let line = Line::from(vec![
        Span::styled("Air Quality Monitor  ", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::raw(format!("device={device_id}  ")),
        Span::styled(
            view.text(ids::DEVICE_STATUS).to_string(),
            Style::default().fg(class_color(status)).add_modifier(Modifier::BOLD),
        ),
    ]);

    Paragraph::new(line).block(Block::default().borders(Borders::ALL).title("Status"))
}

fn render_fire_alert() -> Paragraph<'static> {
    let style = Style::default().fg(Color::White).bg(Color::Red).add_modifier(Modifier::BOLD);
    Paragraph::new(Line::from(Span::styled(
        " FIRE / SMOKE DETECTED - press 'a' to acknowledge ",
        style,
    )))
    .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Red)))
}

fn render_air_quality(frame: &mut ratatui::Frame<'_>, area: Rect, view: &BoardView) {
    let block = Block::default().borders(Borders::ALL).title("Air Quality");
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let parts = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(3)])
        .split(inner);

    let circle_bg = view
        .get(ids::AQI_CIRCLE)
        .and_then(|e| e.background.as_deref())
        .and_then(hex_color)
        .unwrap_or(Color::DarkGray);
    let badge_class = view.class(ids::AQI_CATEGORY);

    let lines = vec![
        Line::from(vec![
            Span::styled(
                format!(" {:>3} ", view.text(ids::AQI_CIRCLE)),
                Style::default().fg(Color::White).bg(circle_bg).add_modifier(Modifier::BOLD),
            ),
            Span::raw("  "),
            Span::raw(view.text(ids::AQI_VALUE).to_string()),
        ]),
        Line::from(" "),
        Line::from(Span::styled(
            view.text(ids::AQI_CATEGORY).to_string(),
            Style::default().fg(class_color(badge_class)).add_modifier(Modifier::BOLD),
        )),
    ];
    frame.render_widget(Paragraph::new(lines), parts[0]);

    let width = view.get(ids::AIR_SCORE_BAR).and_then(|e| e.width).unwrap_or(0);
    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title("Air Score"))
        .gauge_style(Style::default().fg(class_color(view.class(ids::AIR_SCORE_BAR))))
        .percent(u16::from(width.min(100)))
        .label(view.text(ids::AIR_SCORE_BAR).to_string());
    frame.render_widget(gauge, parts[1]);
}

fn render_sensors(view: &BoardView) -> Paragraph<'static> {
    let row = |label: &str, id: &str, unit: &str| {
        Line::from(vec![
            Span::styled(format!("{label:<12}"), Style::default().fg(Color::Gray)),
            Span::raw(format!("{} {unit}", view.text(id))),
        ])
    };

    Paragraph::new(vec![
        row("Temperature", ids::TEMPERATURE, "°C"),
        row("Humidity", ids::HUMIDITY, "%"),
        row("Noise", ids::NOISE, "dB"),
        row("PM2.5", ids::PM25, "µg/m³"),
    ])
    .block(Block::default().borders(Borders::ALL).title("Sensors"))
}

fn render_controls(view: &BoardView) -> Paragraph<'static> {
    let state = |id: &str| {
        let text = view.text(id).to_string();
        let color = if text == "ON" { Color::Green } else { Color::Gray };
        Span::styled(text, Style::default().fg(color).add_modifier(Modifier::BOLD))
    };

    Paragraph::new(vec![
        Line::from(vec![Span::raw("Sprinkler  "), state(ids::SPRINKLER_STATUS)]),
        Line::from(vec![Span::raw("Buzzer     "), state(ids::BUZZER_STATUS)]),
        Line::from(" "),
        Line::from(Span::styled("[s] sprinkler  [b] buzzer", Style::default().fg(Color::DarkGray))),
        Line::from(Span::styled("[a] acknowledge  [q] quit", Style::default().fg(Color::DarkGray))),
    ])
    .block(Block::default().borders(Borders::ALL).title("Controls"))
}

fn render_aqi_chart(frame: &mut ratatui::Frame<'_>, area: Rect, chart: &AqiChart) {
    let dataset = Dataset::default()
        .name("AQI")
        .marker(symbols::Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(Color::Rgb(75, 192, 192)))
        .data(&chart.points);

    let x_max = (chart.capacity.max(2) - 1) as f64;
    let y_bounds = if chart.points.is_empty() { [0.0, 1.0] } else { chart.bounds };

    let widget = Chart::new(vec![dataset])
        .block(Block::default().borders(Borders::ALL).title("AQI History"))
        .x_axis(
            Axis::default()
                .title("time")
                .style(Style::default().fg(Color::Gray))
                .bounds([0.0, x_max])
                .labels(vec![
                    Span::raw(chart.first_label.clone()),
                    Span::raw(chart.last_label.clone()),
                ]),
        )
        .y_axis(
            Axis::default()
                .title("AQI")
                .style(Style::default().fg(Color::Gray))
                .bounds(y_bounds)
                .labels(vec![
                    Span::raw(format!("{:.0}", y_bounds[0])),
                    Span::raw(format!("{:.0}", (y_bounds[0] + y_bounds[1]) / 2.0)),
                    Span::raw(format!("{:.0}", y_bounds[1])),
                ]),
        );

    frame.render_widget(widget, area);
}

fn render_footer(dashboard: &Dashboard<BoardView, AqiChart>, notice: &str) -> Paragraph<'static> {
    let mut spans = vec![Span::raw(format!(
        "snapshots={} read_errors={}",
        dashboard.snapshots(),
        dashboard.read_errors()
    ))];

    if dashboard.renderer().view().is_empty() {
        spans.push(Span::raw("  waiting for first snapshot..."));
    }
    if let Some(err) = dashboard.last_error() {
        spans.push(Span::styled(format!("  last error: {err}"), Style::default().fg(Color::Red)));
    }
    if !notice.is_empty() {
        spans.push(Span::styled(format!("  {notice}"), Style::default().fg(Color::Yellow)));
    }

    Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_colors_parse_to_rgb() {
        assert_eq!(hex_color("#dc3545"), Some(Color::Rgb(0xdc, 0x35, 0x45)));
        assert_eq!(hex_color("dc3545"), None);
        assert_eq!(hex_color("#12"), None);
    }

    #[test]
    fn classes_map_to_palette() {
        assert_eq!(class_color("badge bg-success"), Color::Green);
        assert_eq!(class_color("progress-bar bg-warning"), Color::Yellow);
        assert_eq!(class_color("status-badge status-offline"), Color::Red);
        assert_eq!(class_color("badge bg-dark"), Color::DarkGray);
    }

    #[test]
    fn board_view_tracks_rendered_elements() {
        // Arrange
        let mut renderer = Renderer::new(BoardView::default(), AqiChart::default(), ChartSeries::new(20));
        let snapshot = aqwatch_core::SensorSnapshot {
            aqi: 175.0,
            online: true,
            smoke: true,
            sprinkler: "on".to_string(),
            ..aqwatch_core::SensorSnapshot::default()
        };

        // Act
        renderer.render_at(Some(&snapshot), "10:00:00");

        // Assert
        let view = renderer.view();
        assert_eq!(view.text(ids::AQI_CATEGORY), "Unhealthy");
        assert_eq!(view.get(ids::AIR_SCORE_BAR).and_then(|e| e.width), Some(40));
        assert_eq!(
            view.get(ids::AQI_CIRCLE).and_then(|e| e.background.clone()),
            Some("#dc3545".to_string())
        );
        assert_eq!(view.get(ids::FIRE_ALERT).and_then(|e| e.display), Some(DisplayMode::Block));
        assert_eq!(view.text(ids::SPRINKLER_STATUS), "ON");

        let chart = renderer.chart();
        assert_eq!(chart.points, vec![(0.0, 175.0)]);
        assert_eq!(chart.last_label, "10:00:00");
        assert_eq!(chart.capacity, 20);
    }
}
