//! Async driver for UCI chess engine subprocesses.
//!
//! Spawns an engine binary, speaks the Universal Chess Interface over its
//! stdin/stdout, and hides the concurrent reader behind a thread-safe
//! [`Engine`] handle: `info` lines stream into a bounded history while a
//! search runs, and `uciok`/`readyok`/`bestmove` are delivered to awaiting
//! callers through rendezvous channels.
//!
//! The crate is a pure transport and protocol driver. It does not validate
//! FEN strings or moves, and it speaks to any UCI engine, not just a
//! particular one.
//!
//! ```no_run
//! use std::time::Duration;
//! use uci_driver::{Engine, EngineConfig};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), uci_driver::UciError> {
//! let engine = Engine::startup(EngineConfig::new("/usr/bin/stockfish")).await?;
//! engine.send_fen("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1").await?;
//! engine.send_command("go movetime 100").await?;
//! let best = engine.wait_best_move(Duration::from_secs(5)).await?;
//! println!("best move: {}", best.bestmove);
//! engine.send_quit().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod session;
pub mod stream;
pub mod uci;

pub use config::{engines_from_config, load_config, EngineConfig, OptionConfig};
pub use session::Engine;
pub use stream::{OutputStream, DEFAULT_LINE_BUFFER_SIZE, DEFAULT_LINE_CHANNEL_CAPACITY};
pub use uci::{parse_uci_message, UciError, UciMessage};

/// An option descriptor advertised by the engine between `uci` and `uciok`.
///
/// All values are kept as raw strings; numeric fields can be parsed into
/// native types at the caller's discretion once more is known about a
/// specific engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineOption {
    /// Name of the option.
    pub name: String,
    /// The option's `type` keyword (`check`, `spin`, `combo`, `button`,
    /// `string`). The set is not enforced.
    pub kind: String,
    /// Default value of the option.
    pub default: String,
    /// Minimum possible value.
    pub min: String,
    /// Maximum possible value.
    pub max: String,
    /// Predefined values of a `combo` option, in advertised order.
    pub var: Vec<String>,
}

/// An option the caller has applied via [`Engine::send_option`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetOption {
    pub name: String,
    /// Empty for button options, which carry no value.
    pub value: String,
}

/// A search score reported on an `info` line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Score {
    /// Centipawns, or mate distance in plies when `mate` is set.
    pub value: i32,
    pub mate: bool,
    pub lowerbound: bool,
    pub upperbound: bool,
}

/// A snapshot parsed from one `info` line.
///
/// Fields the engine did not report are zero-valued.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Info {
    /// Search depth in plies.
    pub depth: u32,
    /// Selective search depth in plies.
    pub seldepth: u32,
    /// Time searched in milliseconds.
    pub time_ms: u64,
    /// Nodes searched.
    pub nodes: u64,
    /// Nodes per second.
    pub nps: u64,
    /// Rank within a multipv search, 0 when multipv is not active.
    pub multipv: u32,
    pub score: Score,
    /// Move currently being searched.
    pub currmove: String,
    pub currmovenumber: u32,
    /// Hash table fullness in permill.
    pub hashfull: u32,
    /// Endgame tablebase hits.
    pub tbhits: u64,
    /// Shredder endgame database hits.
    pub sbhits: u64,
    /// CPU usage in permill.
    pub cpuload: u32,
    /// Free-form text following the `string` keyword.
    pub string: String,
    /// First move refuted by the remaining moves of the line.
    pub refutation: Vec<String>,
    /// Line the engine is currently calculating.
    pub currline: Vec<String>,
    /// Principal variation, the engine's currently-best line.
    pub pv: Vec<String>,
}

/// The terminal line of a search: the best move and an optional ponder move.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BestMove {
    pub bestmove: String,
    /// Empty when the engine suggested no ponder move.
    pub ponder: String,
}
