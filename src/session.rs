//! Engine session: process supervisor, stdout reader pipeline, and the
//! rendezvous primitives that turn asynchronous engine output into
//! synchronous caller operations.
//!
//! Each session runs exactly two background tasks for the lifetime of the
//! subprocess: a pump that re-frames stdout bytes into lines, and a
//! dispatcher that parses each line and publishes the result. Caller methods
//! may be invoked concurrently from any task or thread.

use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time;

use crate::config::EngineConfig;
use crate::stream::{OutputStream, DEFAULT_LINE_CHANNEL_CAPACITY};
use crate::uci::{parse_uci_message, UciError, UciMessage};
use crate::{BestMove, EngineOption, Info, SetOption};

/// How long [`Engine::startup`] waits for `readyok` after applying options.
const READY_TIMEOUT: Duration = Duration::from_secs(5);

/// Poll interval while [`Engine::send_quit`] waits for the line channel to
/// drain.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Size of chunk reads against the engine's stdout pipe.
const READ_CHUNK_SIZE: usize = 4096;

/// Mutable session state behind the session's reader/writer lock.
///
/// Engine-derived fields are written only by the dispatcher task;
/// `display_name` and `set_options` are written only by caller methods.
#[derive(Debug, Default)]
struct SessionState {
    name: String,
    author: String,
    display_name: String,
    default_options: Vec<EngineOption>,
    set_options: Vec<SetOption>,
    info_buf: VecDeque<Info>,
    info_buf_cap: usize,
    last_bestmove: BestMove,
    uciok_seen: bool,
}

impl SessionState {
    /// Append an info snapshot, evicting the oldest entries once the ring is
    /// over capacity. A capacity of 0 keeps everything.
    fn push_info(&mut self, info: Info) {
        self.info_buf.push_back(info);
        if self.info_buf_cap > 0 {
            while self.info_buf.len() > self.info_buf_cap {
                self.info_buf.pop_front();
            }
        }
    }

    /// Record an applied option, superseding any earlier entry with the same
    /// name.
    fn apply_set_option(&mut self, name: &str, value: &str) {
        self.set_options.retain(|o| o.name != name);
        self.set_options.push(SetOption {
            name: name.to_string(),
            value: value.to_string(),
        });
    }

    /// The last `last` info entries in emission order; every held entry when
    /// `last` is negative or exceeds the held count.
    fn info_window(&self, last: isize) -> Vec<Info> {
        let held = self.info_buf.len();
        let take = if last < 0 || last as usize > held {
            held
        } else {
            last as usize
        };
        self.info_buf.iter().skip(held - take).cloned().collect()
    }
}

fn lock_read(state: &RwLock<SessionState>) -> RwLockReadGuard<'_, SessionState> {
    state.read().unwrap_or_else(PoisonError::into_inner)
}

fn lock_write(state: &RwLock<SessionState>) -> RwLockWriteGuard<'_, SessionState> {
    state.write().unwrap_or_else(PoisonError::into_inner)
}

/// Sender halves owned by the dispatcher task.
struct ReaderChannels {
    uciok: Option<oneshot::Sender<()>>,
    readyok: mpsc::Sender<()>,
    bestmove: watch::Sender<Option<BestMove>>,
}

/// Receiver halves awaited by caller methods.
struct Rendezvous {
    uciok: Mutex<Option<oneshot::Receiver<()>>>,
    readyok: Mutex<mpsc::Receiver<()>>,
    bestmove: Mutex<watch::Receiver<Option<BestMove>>>,
}

fn rendezvous_pair() -> (ReaderChannels, Rendezvous) {
    let (uciok_tx, uciok_rx) = oneshot::channel();
    let (readyok_tx, readyok_rx) = mpsc::channel(1);
    let (bestmove_tx, bestmove_rx) = watch::channel(None);

    (
        ReaderChannels {
            uciok: Some(uciok_tx),
            readyok: readyok_tx,
            bestmove: bestmove_tx,
        },
        Rendezvous {
            uciok: Mutex::new(Some(uciok_rx)),
            readyok: Mutex::new(readyok_rx),
            bestmove: Mutex::new(bestmove_rx),
        },
    )
}

/// A running engine subprocess and its protocol state.
///
/// All methods take `&self` and are safe to call concurrently; wrap the
/// handle in an [`Arc`] to share it across tasks. Dropping the handle kills
/// and reaps the subprocess.
pub struct Engine {
    child: Mutex<Child>,
    stdin: Mutex<BufWriter<ChildStdin>>,
    line_tx: mpsc::WeakSender<String>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    state: Arc<RwLock<SessionState>>,
    faulted: Arc<AtomicBool>,
    exited: AtomicBool,
    rendezvous: Rendezvous,
}

impl Engine {
    /// Spawn the configured engine binary and start its stdout pipeline.
    ///
    /// The UCI handshake is not performed here; see [`Engine::startup`] for
    /// the full orchestration. On failure no subprocess is left running.
    pub async fn spawn(config: EngineConfig) -> Result<Self, UciError> {
        config.validate()?;

        let mut child = Command::new(&config.path)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(UciError::SpawnFailed)?;
        tracing::info!(path = %config.path, "engine process spawned");

        let stdin = child.stdin.take().ok_or(UciError::NoStdin)?;
        let stdout = child.stdout.take().ok_or(UciError::NoStdout)?;

        let state = Arc::new(RwLock::new(SessionState {
            display_name: config.display_name.clone(),
            info_buf_cap: config.info_buf_cap,
            ..SessionState::default()
        }));
        let faulted = Arc::new(AtomicBool::new(false));
        let (chans, rendezvous) = rendezvous_pair();

        let (line_tx, dispatcher) = start_reader(
            stdout,
            config.line_buf_size,
            Arc::clone(&state),
            Arc::clone(&faulted),
            chans,
        );

        Ok(Self {
            child: Mutex::new(child),
            stdin: Mutex::new(BufWriter::new(stdin)),
            line_tx,
            dispatcher: Mutex::new(Some(dispatcher)),
            state,
            faulted,
            exited: AtomicBool::new(false),
            rendezvous,
        })
    }

    /// Spawn an engine and drive it through the full startup sequence:
    /// `uci` handshake, configured options, then `isready`.
    pub async fn startup(config: EngineConfig) -> Result<Self, UciError> {
        let options = config.uci_options.clone();
        let engine = Self::spawn(config).await?;

        engine.uci().await?;
        for option in &options {
            engine.send_option(&option.name, &option.value).await?;
        }
        engine.wait_ready_ok(READY_TIMEOUT).await?;

        Ok(engine)
    }

    /// Send one raw UCI command line. A newline is appended; the content is
    /// not validated.
    pub async fn send_command(&self, command: &str) -> Result<(), UciError> {
        if self.faulted.load(Ordering::Acquire) {
            return Err(UciError::SessionFaulted);
        }

        tracing::debug!("UCI >> {command}");
        let mut stdin = self.stdin.lock().await;
        stdin
            .write_all(command.as_bytes())
            .await
            .map_err(UciError::WriteFailed)?;
        stdin.write_all(b"\n").await.map_err(UciError::WriteFailed)?;
        stdin.flush().await.map_err(UciError::WriteFailed)?;
        Ok(())
    }

    /// Update the engine position from a FEN string. The string passes
    /// through opaquely; no validation is performed.
    pub async fn send_fen(&self, fen: &str) -> Result<(), UciError> {
        self.send_command(&format!("position fen {fen}")).await
    }

    /// Send `ucinewgame`.
    pub async fn send_uci_new_game(&self) -> Result<(), UciError> {
        self.send_command("ucinewgame").await
    }

    /// Send `stop`, ending the current search. The engine answers with a
    /// `bestmove` line, observable via [`Engine::wait_best_move`].
    pub async fn send_stop(&self) -> Result<(), UciError> {
        self.send_command("stop").await
    }

    /// Apply an option. An empty value sends the button form
    /// (`setoption name <name>`).
    ///
    /// UCI provides no acknowledgement for `setoption`, so this returns as
    /// soon as the command is written. The applied option supersedes any
    /// earlier application with the same name in [`Engine::set_options`].
    pub async fn send_option(&self, name: &str, value: &str) -> Result<(), UciError> {
        let command = if value.is_empty() {
            format!("setoption name {name}")
        } else {
            format!("setoption name {name} value {value}")
        };
        self.send_command(&command).await?;

        lock_write(&self.state).apply_set_option(name, value);
        Ok(())
    }

    /// Send `uci` and wait for `uciok`.
    ///
    /// Identity and option discovery happen on the dispatcher task while this
    /// call is suspended. There is no built-in timeout; wrap the future in
    /// [`tokio::time::timeout`] if one is needed. Calling a second time fails
    /// with [`UciError::HandshakeComplete`].
    pub async fn uci(&self) -> Result<(), UciError> {
        let rx = self
            .rendezvous
            .uciok
            .lock()
            .await
            .take()
            .ok_or(UciError::HandshakeComplete)?;

        if let Err(e) = self.send_command("uci").await {
            *self.rendezvous.uciok.lock().await = Some(rx);
            return Err(e);
        }

        rx.await.map_err(|_| UciError::SessionFaulted)
    }

    /// Send `isready` and wait up to `timeout` for `readyok`.
    ///
    /// Other engine output continues to be consumed normally while waiting.
    /// A timed-out wait leaves the protocol action in flight; a late
    /// `readyok` is discarded by the next wait.
    pub async fn wait_ready_ok(&self, timeout: Duration) -> Result<(), UciError> {
        let mut rx = self.rendezvous.readyok.lock().await;
        while rx.try_recv().is_ok() {}

        self.send_command("isready").await?;
        match time::timeout(timeout, rx.recv()).await {
            Ok(Some(())) => Ok(()),
            Ok(None) => Err(UciError::SessionFaulted),
            Err(_) => Err(UciError::Timeout),
        }
    }

    /// Wait up to `timeout` for the next `bestmove`.
    ///
    /// The value observed is always the most recently parsed bestmove, never
    /// a stale one from an earlier search. A bestmove that arrives after a
    /// timeout is still recorded as [`Engine::last_best_move`] and satisfies
    /// the next wait.
    pub async fn wait_best_move(&self, timeout: Duration) -> Result<BestMove, UciError> {
        let mut rx = self.rendezvous.bestmove.lock().await;
        match time::timeout(timeout, rx.changed()).await {
            Ok(Ok(())) => Ok(rx.borrow_and_update().clone().unwrap_or_default()),
            Ok(Err(_)) => Err(UciError::SessionFaulted),
            Err(_) => Err(UciError::Timeout),
        }
    }

    /// Send `quit`, wait for the stdout line channel to drain, then reap the
    /// process.
    ///
    /// Returns once the engine has exited. Subsequent calls fail with
    /// [`UciError::AlreadyExited`]. An engine that already died is still
    /// reaped; the failed `quit` write only means nobody was left to read it.
    pub async fn send_quit(&self) -> Result<(), UciError> {
        if self.exited.swap(true, Ordering::AcqRel) {
            return Err(UciError::AlreadyExited);
        }

        if let Err(e) = self.send_command("quit").await {
            tracing::warn!("quit write failed: {e}");
        }

        // Let the dispatcher consume every line that arrived before quit.
        loop {
            match self.line_tx.upgrade() {
                Some(tx) if tx.capacity() < tx.max_capacity() => {
                    time::sleep(DRAIN_POLL_INTERVAL).await;
                }
                _ => break,
            }
        }
        // Once the pump is gone the weak sender no longer observes queued
        // lines; joining the dispatcher covers that tail.
        if let Some(handle) = self.dispatcher.lock().await.take() {
            let _ = handle.await;
        }

        let status = self
            .child
            .lock()
            .await
            .wait()
            .await
            .map_err(UciError::Io)?;
        tracing::info!(%status, "engine exited");
        Ok(())
    }

    /// Engine-reported name from the `uci` handshake.
    pub fn name(&self) -> String {
        lock_read(&self.state).name.clone()
    }

    /// Engine-reported author from the `uci` handshake.
    pub fn author(&self) -> String {
        lock_read(&self.state).author.clone()
    }

    /// Display name: caller-supplied, or the engine-reported name once the
    /// handshake completed.
    pub fn display_name(&self) -> String {
        lock_read(&self.state).display_name.clone()
    }

    /// Overwrite the display name.
    pub fn set_display_name(&self, display_name: &str) {
        lock_write(&self.state).display_name = display_name.to_string();
    }

    /// Options advertised by the engine between `uci` and `uciok`, in
    /// advertised order.
    pub fn default_options(&self) -> Vec<EngineOption> {
        lock_read(&self.state).default_options.clone()
    }

    /// Options applied by the caller, ordered by each name's most recent
    /// application.
    pub fn set_options(&self) -> Vec<SetOption> {
        lock_read(&self.state).set_options.clone()
    }

    /// The most recent `bestmove` received.
    pub fn last_best_move(&self) -> BestMove {
        lock_read(&self.state).last_bestmove.clone()
    }

    /// A copy of the last `last` info entries in engine-emission order, or
    /// every held entry when `last` is negative or exceeds the held count.
    pub fn get_info(&self, last: isize) -> Vec<Info> {
        lock_read(&self.state).info_window(last)
    }

    /// Dump identity and option state to stdout.
    pub fn print_info(&self) {
        let st = lock_read(&self.state);
        println!("Name: {}", st.name);
        println!("Author: {}", st.author);
        println!("Display Name: {}\n", st.display_name);

        println!("Default Options:");
        for option in &st.default_options {
            println!("{option:?}");
        }
        println!();

        println!("Set Options:");
        for option in &st.set_options {
            println!("{option:?}");
        }
    }
}

/// Start the stdout pipeline: a pump task that re-frames bytes into lines
/// and a dispatcher task that parses each line and publishes the results.
///
/// Returns a weak handle to the line channel, used to observe drain progress
/// without keeping the channel open after the pump exits, and the dispatcher
/// task handle.
fn start_reader<R>(
    stdout: R,
    line_buf_size: usize,
    state: Arc<RwLock<SessionState>>,
    faulted: Arc<AtomicBool>,
    chans: ReaderChannels,
) -> (mpsc::WeakSender<String>, JoinHandle<()>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (line_tx, line_rx) = mpsc::channel(DEFAULT_LINE_CHANNEL_CAPACITY);
    let weak_tx = line_tx.downgrade();

    tokio::spawn(pump_stdout(stdout, line_tx, line_buf_size, faulted));
    let dispatcher = tokio::spawn(run_dispatcher(line_rx, state, chans));

    (weak_tx, dispatcher)
}

/// Pump task: read stdout chunks and feed them through the line buffer.
///
/// Exits on EOF. An I/O error or a line buffer overflow faults the session;
/// the offending line is lost, so the protocol state cannot be trusted
/// afterwards.
async fn pump_stdout<R>(
    mut stdout: R,
    line_tx: mpsc::Sender<String>,
    line_buf_size: usize,
    faulted: Arc<AtomicBool>,
) where
    R: AsyncRead + Unpin,
{
    let mut stream = OutputStream::new(line_tx, line_buf_size);
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    loop {
        match stdout.read(&mut chunk).await {
            Ok(0) => {
                tracing::debug!("engine stdout closed");
                break;
            }
            Ok(n) => {
                if let Err(e) = stream.write(&chunk[..n]).await {
                    tracing::error!("engine stdout framing failed: {e}");
                    faulted.store(true, Ordering::Release);
                    break;
                }
            }
            Err(e) => {
                tracing::error!("engine stdout read failed: {e}");
                faulted.store(true, Ordering::Release);
                break;
            }
        }
    }
}

/// Dispatcher task: parse each line and publish the result to session state
/// and the rendezvous channels. Exits when the line channel closes.
async fn run_dispatcher(
    mut line_rx: mpsc::Receiver<String>,
    state: Arc<RwLock<SessionState>>,
    mut chans: ReaderChannels,
) {
    while let Some(line) = line_rx.recv().await {
        let line = line.trim_end_matches('\n');
        dispatch_line(line, &state, &mut chans);
    }
    tracing::debug!("engine reader exited");
}

fn dispatch_line(line: &str, state: &RwLock<SessionState>, chans: &mut ReaderChannels) {
    tracing::trace!("UCI << {line}");

    match parse_uci_message(line) {
        Ok(UciMessage::Id { field, value }) => {
            let mut st = lock_write(state);
            match field.as_str() {
                "name" => st.name = value,
                "author" => st.author = value,
                _ => {}
            }
        }
        Ok(UciMessage::Option(option)) => {
            let mut st = lock_write(state);
            // The advertised option set is frozen once uciok is seen.
            if !st.uciok_seen {
                st.default_options.push(option);
            }
        }
        Ok(UciMessage::UciOk) => {
            {
                let mut st = lock_write(state);
                st.uciok_seen = true;
                if st.display_name.is_empty() {
                    st.display_name = st.name.clone();
                }
            }
            if let Some(tx) = chans.uciok.take() {
                let _ = tx.send(());
            }
        }
        Ok(UciMessage::ReadyOk) => {
            // A full slot means the previous ack was never drained; keep it.
            let _ = chans.readyok.try_send(());
        }
        Ok(UciMessage::BestMove(best)) => {
            lock_write(state).last_bestmove = best.clone();
            chans.bestmove.send_replace(Some(best));
        }
        Ok(UciMessage::Info(info)) => {
            lock_write(state).push_info(info);
        }
        Err(UciError::UnknownMessage(_)) => {
            tracing::trace!("ignoring engine line: {line}");
        }
        Err(e) => {
            tracing::debug!("discarding unparsable engine line: {e}");
        }
    }
}
