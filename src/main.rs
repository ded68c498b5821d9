//! playdeck - a terminal front-end for mpg123-style decoders
//!
//! Runs the decoder in remote mode, shows the current track and play state,
//! and forwards key presses as decoder commands.
//!
//! # Quick Start
//!
//! ```text
//! playdeck song.mp3 other.mp3     # Play with mpg123 -R
//! playdeck -d mpg321 *.mp3        # Use a different decoder
//! ```
//!
//! # Keys
//!
//! | Key | Action |
//! |-----|--------|
//! | p, space | Pause/resume |
//! | s | Stop |
//! | n / b | Next/previous track |
//! | Left/Right | Seek 5 seconds |
//! | q | Quit |

mod view;

use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use playdeck::config::Config;
use playdeck::decoder::paths::{self, FileKind};
use playdeck::decoder::DecoderProcess;
use playdeck::link::{Link, LinkEvent};
use playdeck::term::{Key, Screen, Session, SessionOptions};

use crate::view::{Followup, PlayState, Player, RoleAttrs};

/// Version string from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// How long the control loop waits for an event before checking the quit flag
const TICK: Duration = Duration::from_millis(100);

/// Seek step for the arrow keys, in seconds
const SEEK_SECS: u32 = 5;

/// Command line options
#[derive(Debug, Default)]
struct Args {
    decoder: Option<String>,
    decoder_args: Vec<String>,
    no_color: bool,
    config: Option<PathBuf>,
    write_config: bool,
    tracks: Vec<PathBuf>,
}

fn print_version() {
    eprintln!("playdeck {}", VERSION);
}

fn print_help() {
    eprintln!("playdeck {} - terminal audio player", VERSION);
    eprintln!();
    eprintln!("Usage: playdeck [OPTIONS] <TRACK>...");
    eprintln!();
    eprintln!("Decoder options:");
    eprintln!("  (default)               From config.toml or mpg123 -R");
    eprintln!("  -d, --decoder <PROG>    Decoder program");
    eprintln!("  -a, --decoder-arg <ARG> Decoder argument (repeatable, replaces config args)");
    eprintln!();
    eprintln!("Display options:");
    eprintln!("  --no-color              Monochrome output");
    eprintln!();
    eprintln!("Other options:");
    eprintln!("  -c, --config <PATH>     Config file (default ~/.playdeck/config.toml)");
    eprintln!("  --write-config          Write the effective config and exit");
    eprintln!("  -v, --version           Show version");
    eprintln!("  -h, --help              Show this help");
    eprintln!();
    eprintln!("Keys:");
    eprintln!("  p, space                Pause/resume");
    eprintln!("  s                       Stop");
    eprintln!("  n / b                   Next/previous track");
    eprintln!("  Left/Right              Seek {} seconds", SEEK_SECS);
    eprintln!("  q                       Quit");
    eprintln!();
    eprintln!("Log file: ~/.playdeck/playdeck.log (level from PLAYDECK_LOG)");
}

fn parse_args() -> Result<Args, String> {
    let argv: Vec<String> = env::args().collect();
    let mut args = Args::default();
    let mut i = 1;

    while i < argv.len() {
        match argv[i].as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-v" | "--version" => {
                print_version();
                std::process::exit(0);
            }
            "-d" | "--decoder" => {
                i += 1;
                let program = argv.get(i).ok_or("Missing decoder argument")?;
                args.decoder = Some(program.clone());
            }
            "-a" | "--decoder-arg" => {
                i += 1;
                let arg = argv.get(i).ok_or("Missing decoder-arg argument")?;
                args.decoder_args.push(arg.clone());
            }
            "--no-color" => {
                args.no_color = true;
            }
            "-c" | "--config" => {
                i += 1;
                let path = argv.get(i).ok_or("Missing config path")?;
                args.config = Some(PathBuf::from(path));
            }
            "--write-config" => {
                args.write_config = true;
            }
            "--" => {
                args.tracks.extend(argv[i + 1..].iter().map(PathBuf::from));
                break;
            }
            arg if arg.starts_with('-') && arg.len() > 1 => {
                return Err(format!("Unknown argument: {}. Use -h for help.", arg));
            }
            track => args.tracks.push(PathBuf::from(track)),
        }
        i += 1;
    }

    Ok(args)
}

/// Log to `~/.playdeck/playdeck.log`; the terminal is in raw mode.
fn init_logging(level: &str) {
    let log_path = Config::data_dir()
        .map(|dir| dir.join("playdeck.log"))
        .unwrap_or_else(|| PathBuf::from("playdeck.log"));

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .ok();

    if let Some(file) = log_file {
        let filter = EnvFilter::try_from_env("PLAYDECK_LOG")
            .or_else(|_| EnvFilter::try_new(level))
            .unwrap_or_else(|_| EnvFilter::new("info"));
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}

/// Keep only tracks that exist as regular files.
fn check_tracks(tracks: Vec<PathBuf>) -> anyhow::Result<Vec<PathBuf>> {
    let mut playable = Vec::with_capacity(tracks.len());
    for track in tracks {
        match paths::classify(&track) {
            FileKind::Regular => playable.push(track),
            FileKind::Missing => eprintln!("playdeck: {}: no such file", track.display()),
            FileKind::Directory => eprintln!("playdeck: {}: is a directory", track.display()),
            FileKind::Other => eprintln!("playdeck: {}: not a regular file", track.display()),
        }
    }
    if playable.is_empty() {
        bail!("no playable tracks");
    }
    Ok(playable)
}

/// SIGINT, SIGTERM and SIGHUP set the returned flag so the loop can restore
/// the terminal before exiting.
#[cfg(unix)]
fn install_quit_flag() -> anyhow::Result<Arc<AtomicBool>> {
    use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};

    let quit = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM, SIGHUP] {
        signal_hook::flag::register(signal, Arc::clone(&quit))
            .with_context(|| format!("failed to register signal {}", signal))?;
    }
    Ok(quit)
}

#[cfg(not(unix))]
fn install_quit_flag() -> anyhow::Result<Arc<AtomicBool>> {
    Ok(Arc::new(AtomicBool::new(false)))
}

fn main() -> anyhow::Result<()> {
    let args = match parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            std::process::exit(1);
        }
    };

    let mut config = Config::load(args.config.as_deref());
    init_logging(&config.log_level);
    info!("playdeck {} starting", VERSION);

    // Command line overrides config file
    if let Some(program) = args.decoder {
        config.decoder.program = program;
    }
    if !args.decoder_args.is_empty() {
        config.decoder.args = args.decoder_args;
    }
    if args.no_color {
        config.display.color = false;
    }

    if args.write_config {
        let path = config.save(args.config.as_deref())?;
        eprintln!("Wrote {}", path.display());
        return Ok(());
    }

    let tracks = check_tracks(args.tracks)?;
    run(config, tracks)
}

fn run(config: Config, tracks: Vec<PathBuf>) -> anyhow::Result<()> {
    let cursor = config.display.cursor_mode()?;
    let styles = &config.styles;
    let (title_fg, title_bg, title) = styles.title.resolve()?;
    let (status_fg, status_bg, status) = styles.status.resolve()?;
    let (help_fg, help_bg, help) = styles.help.resolve()?;
    let (error_fg, error_bg, error) = styles.error.resolve()?;
    let attrs = RoleAttrs {
        title,
        status,
        help,
        error,
    };

    let (decoder, channel) = DecoderProcess::spawn(&config.decoder)
        .with_context(|| format!("cannot start decoder '{}'", config.decoder.program))?;
    let quit = install_quit_flag()?;

    let session = Session::open(SessionOptions {
        color: config.display.color,
        ..SessionOptions::default()
    })?;
    let mut screen = Screen::new(&session);
    if screen.has_color() {
        screen.init_pair(view::PAIR_TITLE, title_fg, title_bg)?;
        screen.init_pair(view::PAIR_STATUS, status_fg, status_bg)?;
        screen.init_pair(view::PAIR_HELP, help_fg, help_bg)?;
        screen.init_pair(view::PAIR_ERROR, error_fg, error_bg)?;
    }
    screen.set_cursor_visibility(cursor)?;

    let mut link = Link::start(session, screen, decoder, channel);
    let mut player = Player::new(tracks);
    let result = control_loop(&mut link, &mut player, &attrs, &quit);

    if let Err(e) = link.send_command("QUIT") {
        // The decoder may already be gone.
        info!("QUIT not delivered: {}", e);
    }
    let closed = link.shutdown();
    result?;
    closed?;
    info!("playdeck exiting");
    Ok(())
}

fn load_current(link: &mut Link, player: &mut Player) {
    if let Some(command) = player.load_command() {
        info!("{}", command);
        if let Err(e) = link.send_command(&command) {
            player.error = Some(e.to_string());
        }
    }
}

fn control_loop(
    link: &mut Link,
    player: &mut Player,
    attrs: &RoleAttrs,
    quit: &AtomicBool,
) -> anyhow::Result<()> {
    load_current(link, player);
    link.screen_mut().erase()?;
    player.draw(link.screen_mut(), attrs)?;

    while !quit.load(Ordering::Relaxed) {
        let event = match link.recv_timeout(TICK) {
            Some(event) => event,
            None => continue,
        };

        match event {
            LinkEvent::Key(key) => {
                let command = match key {
                    Key::Char('q') | Key::Char('Q') => break,
                    Key::Char('p') | Key::Char(' ') => Some("PAUSE".to_string()),
                    Key::Char('s') => {
                        player.state = PlayState::Stopped;
                        Some("STOP".to_string())
                    }
                    Key::Char('n') => {
                        player.step(1);
                        player.load_command()
                    }
                    Key::Char('b') => {
                        player.step(-1);
                        player.load_command()
                    }
                    Key::Left => Some(format!("JUMP -{}s", SEEK_SECS)),
                    Key::Right => Some(format!("JUMP +{}s", SEEK_SECS)),
                    Key::Resize => {
                        link.screen_mut().erase()?;
                        None
                    }
                    _ => None,
                };
                if let Some(command) = command {
                    if let Err(e) = link.send_command(&command) {
                        warn!("command '{}' failed: {}", command, e);
                        player.error = Some(e.to_string());
                    }
                }
            }
            LinkEvent::Packet(packet) => {
                if packet.was_truncated() {
                    warn!("decoder line truncated: {}", packet.tag());
                }
                if player.apply_packet(&packet) == Followup::Advance {
                    player.step(1);
                    load_current(link, player);
                }
            }
            LinkEvent::DecoderClosed => {
                player.state = PlayState::Stopped;
                player.error = Some("decoder exited".to_string());
            }
            LinkEvent::DecoderLost(e) => {
                player.state = PlayState::Stopped;
                player.error = Some(e.to_string());
            }
            LinkEvent::InputFailed(e) => {
                error!("keyboard input lost: {}", e);
                return Err(e.into());
            }
        }
        player.draw(link.screen_mut(), attrs)?;
    }
    Ok(())
}
