use ratatui::crossterm::event::{self, KeyCode, KeyModifiers};

use crate::app::{App, AppMode, FILTER_SLOTS};
use crate::constants::constants;

// --- Helpers ---

/// Convert a char index to a byte offset within the string.
pub fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
  s.char_indices().nth(char_idx).map_or(s.len(), |(i, _)| i)
}

// --- Event Handling ---

pub fn handle_key_event(app: &mut App, key: event::KeyEvent) {
  if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
    app.should_quit = true;
    return;
  }

  match app.mode {
    AppMode::Input => handle_input_key(app, key),
    AppMode::Results => handle_results_key(app, key),
    AppMode::Filters => handle_filters_key(app, key),
    AppMode::Player => handle_player_key(app, key),
  }
}

fn handle_input_key(app: &mut App, key: event::KeyEvent) {
  app.clear_error();
  match key.code {
    KeyCode::Enter => {
      app.trigger_search();
    }
    KeyCode::Char(c) => {
      let byte_idx = char_to_byte_index(&app.input, app.cursor_position);
      app.input.insert(byte_idx, c);
      app.cursor_position += 1;
      app.input_edited();
    }
    KeyCode::Backspace => {
      if app.cursor_position > 0 {
        app.cursor_position -= 1;
        let byte_idx = char_to_byte_index(&app.input, app.cursor_position);
        app.input.remove(byte_idx);
        app.input_edited();
      }
    }
    KeyCode::Delete => {
      if app.cursor_position < app.input.chars().count() {
        let byte_idx = char_to_byte_index(&app.input, app.cursor_position);
        app.input.remove(byte_idx);
        app.input_edited();
      }
    }
    KeyCode::Left => {
      app.cursor_position = app.cursor_position.saturating_sub(1);
    }
    KeyCode::Right => {
      if app.cursor_position < app.input.chars().count() {
        app.cursor_position += 1;
      }
    }
    KeyCode::Home => {
      app.cursor_position = 0;
    }
    KeyCode::End => {
      app.cursor_position = app.input.chars().count();
    }
    KeyCode::Up => {
      app.recall_history();
    }
    KeyCode::Esc => {
      if !app.input.is_empty() {
        app.input.clear();
        app.cursor_position = 0;
        app.input_scroll = 0;
        app.input_edited();
      } else if !app.search.items().is_empty() {
        app.mode = AppMode::Results;
      } else {
        app.should_quit = true;
      }
    }
    KeyCode::Down => {
      if !app.search.items().is_empty() {
        app.mode = AppMode::Results;
      }
    }
    _ => {}
  }
}

fn handle_results_key(app: &mut App, key: event::KeyEvent) {
  match key.code {
    KeyCode::Enter => {
      app.play_selected();
    }
    KeyCode::Char('/') => {
      app.mode = AppMode::Input;
    }
    KeyCode::Char('f') => {
      app.mode = AppMode::Filters;
    }
    KeyCode::Char('r') => {
      app.retry_search();
    }
    KeyCode::Down | KeyCode::Char('j') => {
      let count = app.search.items().len();
      if count > 0 {
        let i = app.list_state.selected().map_or(0, |i| (i + 1) % count);
        app.list_state.select(Some(i));
      }
    }
    KeyCode::Up | KeyCode::Char('k') => {
      let count = app.search.items().len();
      if count > 0 {
        let i = app.list_state.selected().map_or(0, |i| if i == 0 { count - 1 } else { i - 1 });
        app.list_state.select(Some(i));
      }
    }
    KeyCode::Char('n') | KeyCode::PageDown => {
      app.trigger_load_more();
    }
    KeyCode::Char('p') | KeyCode::PageUp => {
      app.trigger_load_previous();
    }
    KeyCode::Tab => {
      if app.playback.has_session() {
        app.mode = AppMode::Player;
      }
    }
    KeyCode::Char(' ') => {
      app.playback.toggle_play_pause();
    }
    KeyCode::Esc => {
      app.mode = AppMode::Input;
    }
    _ => {}
  }
}

fn handle_filters_key(app: &mut App, key: event::KeyEvent) {
  match key.code {
    KeyCode::Left | KeyCode::Char('h') => {
      app.filter_slot = if app.filter_slot == 0 { FILTER_SLOTS - 1 } else { app.filter_slot - 1 };
    }
    KeyCode::Right | KeyCode::Char('l') => {
      app.filter_slot = (app.filter_slot + 1) % FILTER_SLOTS;
    }
    KeyCode::Up | KeyCode::Char('k') | KeyCode::Char(' ') => {
      app.cycle_filter(app.filter_slot, true);
    }
    KeyCode::Down | KeyCode::Char('j') => {
      app.cycle_filter(app.filter_slot, false);
    }
    KeyCode::Enter | KeyCode::Esc => {
      app.mode = AppMode::Results;
    }
    _ => {}
  }
}

fn handle_player_key(app: &mut App, key: event::KeyEvent) {
  let c = constants();
  match key.code {
    KeyCode::Char(' ') => {
      app.playback.toggle_play_pause();
    }
    KeyCode::Char('m') => {
      app.playback.toggle_mute();
      app.save_config();
    }
    KeyCode::Char('f') => {
      app.playback.toggle_fullscreen();
    }
    KeyCode::Char('i') => {
      app.playback.toggle_pip();
    }
    KeyCode::Char('c') => {
      app.playback.toggle_captions();
      app.save_config();
    }
    KeyCode::Char('a') => {
      app.playback.autoplay_next = !app.playback.autoplay_next;
      app.info_message =
        Some(if app.playback.autoplay_next { "Autoplay on".to_string() } else { "Autoplay off".to_string() });
      app.save_config();
    }
    KeyCode::Left => {
      app.playback.seek_relative(-c.seek_step_small);
    }
    KeyCode::Right => {
      app.playback.seek_relative(c.seek_step_small);
    }
    KeyCode::PageUp | KeyCode::Char('L') => {
      app.playback.seek_relative(c.seek_step_large);
    }
    KeyCode::PageDown | KeyCode::Char('J') => {
      app.playback.seek_relative(-c.seek_step_large);
    }
    KeyCode::Char(d @ '0'..='9') => {
      // Digit keys jump to a fraction of the total duration.
      app.playback.seek_fraction(d.to_digit(10).unwrap_or(0));
    }
    KeyCode::Up => {
      app.playback.volume_step(0.05);
      app.save_config();
    }
    KeyCode::Down => {
      app.playback.volume_step(-0.05);
      app.save_config();
    }
    KeyCode::Char('>') => {
      app.playback.cycle_rate(true);
      app.save_config();
    }
    KeyCode::Char('<') => {
      app.playback.cycle_rate(false);
      app.save_config();
    }
    KeyCode::Char('n') => {
      app.play_offset(1);
    }
    KeyCode::Char('N') => {
      app.play_offset(-1);
    }
    KeyCode::Char('s') => {
      app.stop_playback();
    }
    KeyCode::Tab | KeyCode::Esc => {
      // The session keeps playing; this only returns focus to the list.
      app.mode = AppMode::Results;
    }
    _ => {}
  }
}
