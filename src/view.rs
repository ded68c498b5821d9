//! Player state and the status view drawn from it

use std::path::PathBuf;

use playdeck::decoder::Packet;
use playdeck::term::{Attr, Console, Screen, TerminalError};

/// Color pair handles for the view roles
pub const PAIR_TITLE: u8 = 1;
pub const PAIR_STATUS: u8 = 2;
pub const PAIR_HELP: u8 = 3;
pub const PAIR_ERROR: u8 = 4;

const HELP: &str = "p/space pause  s stop  n/b next/prev  \u{2190}/\u{2192} seek  q quit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayState {
    Stopped,
    Paused,
    Playing,
}

/// Attributes per role, paired with the color pair handles above
#[derive(Debug, Clone, Copy, Default)]
pub struct RoleAttrs {
    pub title: Attr,
    pub status: Attr,
    pub help: Attr,
    pub error: Attr,
}

/// What the decoder told us, plus the track list
#[derive(Debug)]
pub struct Player {
    tracks: Vec<PathBuf>,
    current: usize,
    pub state: PlayState,
    title: Option<String>,
    /// Seconds played and remaining
    position: Option<(f64, f64)>,
    pub error: Option<String>,
}

/// What the control loop should do after a packet
#[derive(Debug, PartialEq, Eq)]
pub enum Followup {
    None,
    /// Track finished; load the next one
    Advance,
}

impl Player {
    pub fn new(tracks: Vec<PathBuf>) -> Self {
        Self {
            tracks,
            current: 0,
            state: PlayState::Stopped,
            title: None,
            position: None,
            error: None,
        }
    }

    pub fn current_track(&self) -> Option<&PathBuf> {
        self.tracks.get(self.current)
    }

    /// Step `delta` tracks, wrapping around. Returns the new track.
    pub fn step(&mut self, delta: isize) -> Option<&PathBuf> {
        if self.tracks.is_empty() {
            return None;
        }
        let len = self.tracks.len() as isize;
        self.current = (self.current as isize + delta).rem_euclid(len) as usize;
        self.title = None;
        self.position = None;
        self.tracks.get(self.current)
    }

    /// `LOAD` command for the current track.
    pub fn load_command(&self) -> Option<String> {
        self.current_track()
            .map(|path| format!("LOAD {}", path.display()))
    }

    /// Fold one decoder status line into the state.
    pub fn apply_packet(&mut self, packet: &Packet) -> Followup {
        let body = packet.body().trim();
        match packet.tag() {
            "@P" => {
                let previous = self.state;
                self.state = match body {
                    "1" => PlayState::Paused,
                    "2" => PlayState::Playing,
                    _ => PlayState::Stopped,
                };
                if body == "0" && previous == PlayState::Playing && self.tracks.len() > 1 {
                    return Followup::Advance;
                }
            }
            "@F" => {
                let fields: Vec<&str> = body.split_whitespace().collect();
                if let [_, _, played, left] = fields.as_slice() {
                    if let (Ok(played), Ok(left)) = (played.parse(), left.parse()) {
                        self.position = Some((played, left));
                    }
                }
                self.state = PlayState::Playing;
            }
            "@I" => {
                let info = body.strip_prefix("ID3:").unwrap_or(body).trim();
                if !info.is_empty() {
                    self.title = Some(info.to_string());
                }
            }
            "@E" => self.error = Some(body.to_string()),
            _ => {}
        }
        Followup::None
    }

    fn title_line(&self) -> String {
        match (&self.title, self.current_track()) {
            (Some(title), _) => title.clone(),
            (None, Some(path)) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            (None, None) => "no tracks".to_string(),
        }
    }

    fn status_line(&self) -> String {
        let state = match self.state {
            PlayState::Stopped => "stopped",
            PlayState::Paused => "paused",
            PlayState::Playing => "playing",
        };
        let mut line = format!(
            "[{}/{}] {}",
            (self.current + 1).min(self.tracks.len()),
            self.tracks.len(),
            state
        );
        if let Some((played, left)) = self.position {
            line.push_str(&format!("  {} / {}", clock(played), clock(played + left)));
        }
        line
    }

    /// Draw title, status, help and error rows.
    pub fn draw<C: Console>(
        &self,
        screen: &mut Screen<C>,
        attrs: &RoleAttrs,
    ) -> Result<(), TerminalError> {
        let geometry = screen.size()?;
        let width = usize::from(geometry.cols);
        let rows = [
            (0, self.title_line(), attrs.title, PAIR_TITLE),
            (1, self.status_line(), attrs.status, PAIR_STATUS),
            (3, HELP.to_string(), attrs.help, PAIR_HELP),
        ];
        for (row, text, attr, pair) in rows {
            if row >= geometry.rows {
                break;
            }
            screen.move_cursor(row, 0)?;
            screen.write_text(&format!(" {}", text), width * 4, attr, pair)?;
            screen.clear_to_end_of_line()?;
        }

        if let Some(error) = &self.error {
            if geometry.rows > 5 {
                screen.move_cursor(5, 0)?;
                screen.write_text(&format!(" {}", error), width * 4, attrs.error, PAIR_ERROR)?;
                screen.clear_to_end_of_line()?;
            }
        }
        screen.refresh()
    }
}

/// `m:ss` for a seconds count.
fn clock(secs: f64) -> String {
    let secs = secs.max(0.0) as u64;
    format!("{}:{:02}", secs / 60, secs % 60)
}
