//! TCP controller simulation over an in-memory frame store.

use std::{
    collections::HashMap,
    io::{self, Read, Write},
    net::{SocketAddr, TcpListener, TcpStream},
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread::JoinHandle,
};

use cartfs_proto::{
    CommandWord, FRAME_SIZE, FrameBuf, MAX_CARTRIDGES, MAX_FRAMES_PER_CARTRIDGE, Opcode,
};

/// Per-opcode exchange counters.
struct ExchangeCounts {
    counts: [AtomicU64; 6],
}

impl ExchangeCounts {
    fn new() -> Self {
        Self { counts: [const { AtomicU64::new(0) }; 6] }
    }

    fn record(&self, opcode: Opcode) {
        self.counts[opcode.to_u8() as usize].fetch_add(1, Ordering::Relaxed);
    }

    fn count(&self, opcode: Opcode) -> u64 {
        self.counts[opcode.to_u8() as usize].load(Ordering::Relaxed)
    }

    fn total(&self) -> u64 {
        self.counts.iter().map(|c| c.load(Ordering::Relaxed)).sum()
    }
}

/// The simulated device: sparse frame contents plus the loaded cartridge.
///
/// Frames that were never written (or were zeroed) read back as all-zero,
/// which is exactly what the real controller guarantees after ZERO.
struct FrameStore {
    frames: HashMap<(u16, u16), Box<FrameBuf>>,
    loaded: Option<u16>,
}

impl FrameStore {
    fn new() -> Self {
        Self { frames: HashMap::new(), loaded: None }
    }

    fn load(&mut self, cart: u16) -> bool {
        if cart >= MAX_CARTRIDGES {
            return false;
        }
        self.loaded = Some(cart);
        true
    }

    fn zero(&mut self) -> bool {
        let Some(loaded) = self.loaded else {
            return false;
        };
        self.frames.retain(|&(cart, _), _| cart != loaded);
        true
    }

    fn read(&self, frame: u16) -> Option<FrameBuf> {
        let loaded = self.loaded?;
        if frame >= MAX_FRAMES_PER_CARTRIDGE {
            return None;
        }
        Some(self.frames.get(&(loaded, frame)).map_or([0u8; FRAME_SIZE], |buf| **buf))
    }

    fn write(&mut self, frame: u16, payload: &FrameBuf) -> bool {
        let Some(loaded) = self.loaded else {
            return false;
        };
        if frame >= MAX_FRAMES_PER_CARTRIDGE {
            return false;
        }
        self.frames.insert((loaded, frame), Box::new(*payload));
        true
    }
}

/// In-process controller bound to a loopback TCP port.
///
/// Serves connections sequentially on a background thread until dropped or
/// [`SimController::stop`] is called. The driver under test holds one
/// connection at a time, and POWEROFF ends a connection without ending the
/// controller, so a test can power the driver on again.
pub struct SimController {
    addr: SocketAddr,
    counts: Arc<ExchangeCounts>,
    store: Arc<Mutex<FrameStore>>,
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl SimController {
    /// Bind a fresh loopback port and start serving.
    pub fn spawn() -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;

        let counts = Arc::new(ExchangeCounts::new());
        let store = Arc::new(Mutex::new(FrameStore::new()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let thread = {
            let counts = Arc::clone(&counts);
            let store = Arc::clone(&store);
            let shutdown = Arc::clone(&shutdown);
            std::thread::Builder::new().name("sim-controller".into()).spawn(move || {
                serve(&listener, &counts, &store, &shutdown);
            })?
        };

        tracing::debug!(%addr, "simulated controller listening");
        Ok(Self { addr, counts, store, shutdown, thread: Some(thread) })
    }

    /// Address the controller is listening on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// How many exchanges of `opcode` have been served so far.
    pub fn exchanges(&self, opcode: Opcode) -> u64 {
        self.counts.count(opcode)
    }

    /// Total exchanges served across all opcodes.
    pub fn total_exchanges(&self) -> u64 {
        self.counts.total()
    }

    /// Cartridge currently loaded on the device, if any.
    pub fn loaded_cart(&self) -> Option<u16> {
        self.lock_store().loaded
    }

    /// Snapshot of one frame's device-side contents.
    ///
    /// `None` if the frame was never written (it would read back as zeros).
    pub fn frame(&self, cart: u16, frame: u16) -> Option<FrameBuf> {
        self.lock_store().frames.get(&(cart, frame)).map(|buf| **buf)
    }

    /// Stop serving and join the background thread.
    pub fn stop(&mut self) {
        if !self.shutdown.swap(true, Ordering::SeqCst) {
            // Unblock the accept loop.
            drop(TcpStream::connect(self.addr));
        }
        if let Some(thread) = self.thread.take() {
            drop(thread.join());
        }
    }

    fn lock_store(&self) -> std::sync::MutexGuard<'_, FrameStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for SimController {
    fn drop(&mut self) {
        self.stop();
    }
}

fn serve(
    listener: &TcpListener,
    counts: &ExchangeCounts,
    store: &Mutex<FrameStore>,
    shutdown: &AtomicBool,
) {
    while !shutdown.load(Ordering::SeqCst) {
        let stream = match listener.accept() {
            Ok((stream, _peer)) => stream,
            Err(err) => {
                tracing::warn!(%err, "accept failed");
                continue;
            },
        };
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        if let Err(err) = serve_connection(stream, counts, store) {
            tracing::debug!(%err, "connection ended with error");
        }
    }
}

/// Serve bus exchanges on one connection until POWEROFF or EOF.
fn serve_connection(
    mut stream: TcpStream,
    counts: &ExchangeCounts,
    store: &Mutex<FrameStore>,
) -> io::Result<()> {
    loop {
        let mut word = [0u8; CommandWord::WIRE_SIZE];
        match stream.read_exact(&mut word) {
            Ok(()) => {},
            // Client hung up between commands.
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(err) => return Err(err),
        }

        let request = match CommandWord::from_be_bytes(word) {
            Ok(request) => request,
            Err(err) => {
                tracing::warn!(%err, "dropping connection");
                return Ok(());
            },
        };
        counts.record(request.opcode);

        let respond = |stream: &mut TcpStream, ret: bool, payload: Option<&FrameBuf>| {
            let response = CommandWord { ret, ..request };
            stream.write_all(&response.to_be_bytes())?;
            if let Some(payload) = payload {
                stream.write_all(payload)?;
            }
            Ok::<_, io::Error>(())
        };

        let mut store = store.lock().unwrap_or_else(PoisonError::into_inner);
        match request.opcode {
            Opcode::Init => respond(&mut stream, false, None)?,
            Opcode::Zero => {
                let ok = store.zero();
                respond(&mut stream, !ok, None)?;
            },
            Opcode::Load => {
                let ok = store.load(request.cart);
                respond(&mut stream, !ok, None)?;
            },
            Opcode::Read => {
                // The client always consumes a payload after a READ
                // response, so one is sent even on rejection.
                match store.read(request.frame) {
                    Some(payload) => respond(&mut stream, false, Some(&payload))?,
                    None => respond(&mut stream, true, Some(&[0u8; FRAME_SIZE]))?,
                }
            },
            Opcode::Write => {
                let mut payload = [0u8; FRAME_SIZE];
                stream.read_exact(&mut payload)?;
                let ok = store.write(request.frame, &payload);
                respond(&mut stream, !ok, None)?;
            },
            Opcode::Poweroff => {
                store.loaded = None;
                respond(&mut stream, false, None)?;
                return Ok(());
            },
        }
    }
}
