use ratatui::{
  Frame,
  layout::{Alignment, Constraint, Layout, Rect},
  style::{Color, Modifier, Style},
  text::{Line, Span},
  widgets::{Block, BorderType, Gauge, List, ListItem, Padding, Paragraph},
};

use crate::api::SearchFilters;
use crate::app::{App, AppMode};
use crate::playback::PlaybackState;

const ACCENT: Color = Color::LightRed;
const MUTED: Color = Color::DarkGray;
const BORDER: Color = Color::DarkGray;

// --- Helpers ---

/// Compute the display width of the first `n` chars (accounting for double-width CJK).
pub fn display_width(s: &str, n: usize) -> usize {
  use unicode_width::UnicodeWidthChar;
  s.chars().take(n).map(|c| c.width().unwrap_or(0)).sum()
}

/// Truncate a string to `max_width` characters, appending "…" if truncated.
fn truncate_str(s: &str, max_width: usize) -> String {
  if s.chars().count() <= max_width {
    s.to_string()
  } else {
    let truncated: String = s.chars().take(max_width.saturating_sub(1)).collect();
    format!("{}…", truncated)
  }
}

/// Seconds to a clock string, hours shown only when present.
fn clock(secs: f64) -> String {
  let total = secs.max(0.0) as u64;
  let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
  if h > 0 { format!("{}:{:02}:{:02}", h, m, s) } else { format!("{}:{:02}", m, s) }
}

fn filter_labels(filters: &SearchFilters) -> [String; 4] {
  [
    format!("sort:{}", filters.sort.label()),
    format!("length:{}", filters.duration.api_value()),
    format!("hd:{}", if filters.hd { "on" } else { "off" }),
    format!("cc:{}", if filters.captions { "on" } else { "off" }),
  ]
}

// --- UI Rendering ---

pub fn ui(frame: &mut Frame, app: &mut App) {
  let [header_area, main_area, status_area, input_area, footer_area] = Layout::vertical([
    Constraint::Length(1),
    Constraint::Min(3),
    Constraint::Length(1),
    Constraint::Length(3),
    Constraint::Length(1),
  ])
  .areas(frame.area());

  render_header(frame, app, header_area);
  render_main(frame, app, main_area);
  render_status(frame, app, status_area);
  render_input(frame, app, input_area);
  render_footer(frame, app, footer_area);
}

fn render_header(frame: &mut Frame, app: &App, area: Rect) {
  let left = Line::from(Span::styled(" ▶ tubedeck ", Style::default().fg(ACCENT).add_modifier(Modifier::BOLD)));
  frame.render_widget(left, area);

  let total = app.search.total_results();
  let right = if total > 0 { format!("{} results · v{} ", total, env!("CARGO_PKG_VERSION")) } else { format!("v{} ", env!("CARGO_PKG_VERSION")) };
  let right_area =
    Rect { x: area.x + area.width.saturating_sub(right.len() as u16), width: right.len() as u16, ..area };
  frame.render_widget(Line::from(Span::styled(&right, Style::default().fg(MUTED))), right_area);
}

fn render_main(frame: &mut Frame, app: &mut App, area: Rect) {
  if app.mode == AppMode::Player && app.playback.has_session() {
    render_player(frame, app, area);
  } else if !app.search.items().is_empty() {
    render_results(frame, app, area);
  } else {
    render_welcome(frame, area);
  }
}

fn render_welcome(frame: &mut Frame, area: Rect) {
  let text = vec![
    Line::from(""),
    Line::from(Span::styled("▶  tubedeck", Style::default().fg(ACCENT).add_modifier(Modifier::BOLD))),
    Line::from(""),
    Line::from("Search YouTube. Play with mpv. In the terminal."),
    Line::from(""),
    Line::from(Span::styled("Type a query below; results appear as you pause.", Style::default().fg(MUTED))),
  ];
  let paragraph = Paragraph::new(text)
    .alignment(Alignment::Center)
    .block(Block::bordered().border_type(BorderType::Rounded).border_style(Style::default().fg(BORDER)));
  frame.render_widget(paragraph, area);
}

fn render_results(frame: &mut Frame, app: &mut App, area: Rect) {
  let inner_w = area.width.saturating_sub(4) as usize;
  let items: Vec<ListItem> = app
    .search
    .items()
    .iter()
    .map(|item| {
      let meta = format!("{} · {} views · {}", item.channel_title, item.views, item.published);
      let title_w = inner_w.saturating_sub(item.duration.len() + 3);
      let line1 = Line::from(vec![
        Span::styled(format!("{:>8} ", item.duration), Style::default().fg(MUTED)),
        Span::raw(truncate_str(&item.title, title_w)),
      ]);
      let line2 = Line::from(Span::styled(format!("         {}", truncate_str(&meta, inner_w)), Style::default().fg(MUTED)));
      ListItem::new(vec![line1, line2])
    })
    .collect();

  let mut title_spans = vec![Span::styled(" Results ", Style::default().fg(ACCENT).add_modifier(Modifier::BOLD))];
  if app.search.has_prev_page() {
    title_spans.push(Span::styled("‹p ", Style::default().fg(MUTED)));
  }
  if app.search.has_next_page() {
    title_spans.push(Span::styled("n› ", Style::default().fg(MUTED)));
  }
  if app.search.is_loading() {
    title_spans.push(Span::styled("… ", Style::default().fg(MUTED)));
  }

  let list = List::new(items)
    .block(
      Block::bordered()
        .title(Line::from(title_spans))
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(BORDER)),
    )
    .highlight_style(Style::default().fg(ACCENT).add_modifier(Modifier::BOLD))
    .highlight_symbol("▶ ");
  frame.render_stateful_widget(list, area, &mut app.list_state);
}

fn render_player(frame: &mut Frame, app: &mut App, area: Rect) {
  let Some(item) = app.playback.item().cloned() else { return };
  let state = app.playback.state();

  let mut flags = Vec::new();
  if app.playback.is_muted() {
    flags.push("muted");
  }
  if app.playback.captions() {
    flags.push("cc");
  }
  if app.playback.is_fullscreen() {
    flags.push("fullscreen");
  }
  if app.playback.is_pip() {
    flags.push("pip");
  }
  if app.playback.autoplay_next {
    flags.push("autoplay");
  }
  let flags = if flags.is_empty() { String::new() } else { format!("  [{}]", flags.join(" ")) };

  let title = Line::from(vec![
    Span::styled(" Now Playing ", Style::default().fg(ACCENT).add_modifier(Modifier::BOLD)),
    Span::styled(format!("[{}] ", state.label()), Style::default().fg(MUTED)),
  ]);
  let block = Block::bordered()
    .title(title)
    .border_type(BorderType::Rounded)
    .border_style(Style::default().fg(BORDER))
    .padding(Padding::horizontal(1));
  let inner = block.inner(area);
  frame.render_widget(block, area);

  let [info_area, gauge_area, rest_area] =
    Layout::vertical([Constraint::Length(6), Constraint::Length(1), Constraint::Min(0)]).areas(inner);

  let inner_w = inner.width as usize;
  let status_line = match state {
    PlaybackState::Error => Line::from(Span::styled(
      app.playback.error().unwrap_or("Playback failed").to_string(),
      Style::default().fg(Color::Red),
    )),
    _ => Line::from(Span::styled(
      format!(
        "{} / {}  vol {:.0}%  {}x{}",
        clock(app.playback.position()),
        clock(app.playback.duration()),
        app.playback.volume() * 100.0,
        app.playback.rate(),
        flags
      ),
      Style::default().fg(MUTED),
    )),
  };

  let lines = vec![
    Line::from(""),
    Line::from(Span::styled(truncate_str(&item.title, inner_w), Style::default().add_modifier(Modifier::BOLD))),
    Line::from(Span::styled(truncate_str(&item.channel_title, inner_w), Style::default().fg(MUTED))),
    Line::from(format!("{} views · {} likes · {} comments · {}", item.views, item.likes, item.comments, item.published)),
    Line::from(""),
    status_line,
  ];
  frame.render_widget(Paragraph::new(lines), info_area);

  let duration = app.playback.duration();
  let ratio = if duration > 0.0 { (app.playback.position() / duration).clamp(0.0, 1.0) } else { 0.0 };
  let gauge = Gauge::default()
    .ratio(ratio)
    .label("")
    .gauge_style(Style::default().fg(ACCENT).bg(Color::Black));
  frame.render_widget(gauge, gauge_area);

  if rest_area.height > 1 && !item.description.is_empty() {
    let desc = Paragraph::new(Span::styled(
      truncate_str(&item.description, inner_w * rest_area.height.saturating_sub(1) as usize),
      Style::default().fg(MUTED),
    ))
    .wrap(ratatui::widgets::Wrap { trim: true });
    let desc_area = Rect { y: rest_area.y + 1, height: rest_area.height - 1, ..rest_area };
    frame.render_widget(desc, desc_area);
  }
}

fn render_status(frame: &mut Frame, app: &App, area: Rect) {
  if app.mode == AppMode::Filters {
    let labels = filter_labels(&app.search.filters());
    let mut spans = vec![Span::styled(" filters: ", Style::default().fg(MUTED))];
    for (i, label) in labels.iter().enumerate() {
      let style = if i == app.filter_slot {
        Style::default().fg(ACCENT).add_modifier(Modifier::BOLD)
      } else {
        Style::default()
      };
      spans.push(Span::styled(format!("[{}] ", label), style));
    }
    frame.render_widget(Line::from(spans), area);
    return;
  }

  let line = if let Some(ref err) = app.last_error {
    Line::from(Span::styled(format!(" ✗ {}", err), Style::default().fg(Color::Red)))
  } else if let Some(ref err) = app.search.error() {
    Line::from(vec![
      Span::styled(format!(" ✗ {}", err), Style::default().fg(Color::Red)),
      Span::styled("  (r to retry)", Style::default().fg(MUTED)),
    ])
  } else if let Some(ref msg) = app.status_message {
    Line::from(Span::styled(format!(" {}", msg), Style::default().fg(MUTED)))
  } else if let Some(ref msg) = app.info_message {
    Line::from(Span::styled(format!(" ℹ {}", msg), Style::default().fg(MUTED)))
  } else {
    let labels = filter_labels(&app.search.filters());
    Line::from(Span::styled(format!(" {}", labels.join("  ")), Style::default().fg(MUTED)))
  };
  frame.render_widget(line, area);
}

fn render_input(frame: &mut Frame, app: &mut App, area: Rect) {
  let inner_w = area.width.saturating_sub(2) as usize;

  // Keep the cursor visible by scrolling the window over the input text.
  if app.cursor_position < app.input_scroll {
    app.input_scroll = app.cursor_position;
  } else if app.cursor_position.saturating_sub(app.input_scroll) >= inner_w {
    app.input_scroll = app.cursor_position.saturating_sub(inner_w.saturating_sub(1));
  }
  let visible: String = app.input.chars().skip(app.input_scroll).take(inner_w).collect();

  let border_style = if app.mode == AppMode::Input {
    Style::default().fg(ACCENT)
  } else {
    Style::default().fg(BORDER)
  };
  let block = Block::bordered()
    .title(Span::styled(" Search ", Style::default().fg(ACCENT)))
    .border_type(BorderType::Rounded)
    .border_style(border_style);
  frame.render_widget(Paragraph::new(visible).block(block), area);

  if app.mode == AppMode::Input {
    let cursor_x =
      area.x + 1 + display_width(&app.input.chars().skip(app.input_scroll).collect::<String>(), app.cursor_position - app.input_scroll) as u16;
    frame.set_cursor_position((cursor_x.min(area.x + area.width.saturating_sub(2)), area.y + 1));
  }
}

fn render_footer(frame: &mut Frame, app: &App, area: Rect) {
  let hints = match app.mode {
    AppMode::Input => " enter search · ↑ history · ↓ results · esc clear · ^c quit",
    AppMode::Results => " enter play · j/k move · n/p pages · f filters · / search · tab player · ^c quit",
    AppMode::Filters => " ←/→ control · ↑/↓ change · esc done",
    AppMode::Player => " space pause · ←/→ seek · ↑/↓ vol · m mute · </> rate · f full · i pip · c cc · a auto · n/N track · s stop · esc list",
  };
  frame.render_widget(Line::from(Span::styled(hints, Style::default().fg(MUTED))), area);
}
