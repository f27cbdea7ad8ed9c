//! Thin wrapper around a `portable-pty` process

use anyhow::{Context, Result};
use portable_pty::{native_pty_system, Child, ChildKiller, CommandBuilder, MasterPty, PtySize};
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Writer half of the PTY master, shared with blocking write tasks.
///
/// `None` once the PTY has been closed.
pub type SharedWriter = Arc<Mutex<Option<Box<dyn Write + Send>>>>;

/// What to launch inside the PTY
#[derive(Debug, Clone)]
pub struct PtyCommand {
    pub shell: String,
    pub cwd: PathBuf,
    pub cols: u16,
    pub rows: u16,
    pub env: Vec<(String, String)>,
}

/// A process running inside a pseudo-terminal.
///
/// Owns the master side (for resizing), the writer and a killer handle. The
/// reader and the child itself are handed out once at spawn time through
/// [`PtyIo`] so they can be driven from dedicated threads. [`PtyProcess::close`]
/// releases the master and writer; later writes and resizes fail.
pub struct PtyProcess {
    master: Mutex<Option<Box<dyn MasterPty + Send>>>,
    writer: SharedWriter,
    killer: Mutex<Box<dyn ChildKiller + Send + Sync>>,
    pid: Option<u32>,
}

/// Blocking I/O halves handed to the reader and waiter threads
pub struct PtyIo {
    pub reader: PtyReader,
    pub child: Box<dyn Child + Send + Sync>,
}

impl std::fmt::Debug for PtyProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PtyProcess").field("pid", &self.pid).finish()
    }
}

impl PtyProcess {
    /// Open a PTY and start the shell in it
    pub fn spawn(command: &PtyCommand) -> Result<(Self, PtyIo)> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: command.rows,
                cols: command.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .context("Failed to open PTY")?;

        let mut cmd = CommandBuilder::new(&command.shell);
        cmd.cwd(&command.cwd);
        cmd.env("TERM", "xterm-256color");
        for (key, value) in &command.env {
            cmd.env(key, value);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .with_context(|| format!("Failed to spawn {} in PTY", command.shell))?;
        // The slave must be closed on our side, otherwise the reader never sees EOF
        drop(pair.slave);

        let reader = PtyReader::open(&*pair.master)?;
        let writer = pair
            .master
            .take_writer()
            .context("Failed to take PTY writer")?;

        let pid = child.process_id();
        let killer = child.clone_killer();

        Ok((
            Self {
                master: Mutex::new(Some(pair.master)),
                writer: Arc::new(Mutex::new(Some(writer))),
                killer: Mutex::new(killer),
                pid,
            },
            PtyIo { reader, child },
        ))
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Shared writer for off-thread writes
    pub fn writer(&self) -> SharedWriter {
        self.writer.clone()
    }

    pub fn resize(&self, cols: u16, rows: u16) -> Result<()> {
        let master = self.master.lock().unwrap_or_else(|e| e.into_inner());
        let Some(master) = master.as_ref() else {
            anyhow::bail!("PTY is closed");
        };
        master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .context("Failed to resize PTY")
    }

    /// Kill the child process
    pub fn kill(&self) -> io::Result<()> {
        let mut killer = self.killer.lock().unwrap_or_else(|e| e.into_inner());
        killer.kill()
    }

    /// Drop the master and writer. Once the reader goes too, the kernel hangs
    /// up the terminal for anything still attached to the slave.
    pub fn close(&self) {
        self.writer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        self.master
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
    }
}

/// Write and flush through a shared writer
pub fn write_to(writer: &SharedWriter, data: &[u8]) -> io::Result<()> {
    let mut writer = writer.lock().unwrap_or_else(|e| e.into_inner());
    let Some(writer) = writer.as_mut() else {
        return Err(io::Error::new(io::ErrorKind::BrokenPipe, "PTY is closed"));
    };
    writer.write_all(data)?;
    writer.flush()
}

/// Reader half of the PTY master.
///
/// Reads wait at most a given timeout so the reading thread can notice a
/// disposed session even while something else keeps the slave side open.
pub struct PtyReader {
    #[cfg(unix)]
    file: std::fs::File,
    #[cfg(not(unix))]
    inner: Box<dyn Read + Send>,
}

impl PtyReader {
    #[cfg(unix)]
    fn open(master: &(dyn MasterPty + Send)) -> Result<Self> {
        use std::os::fd::FromRawFd;

        let fd = master
            .as_raw_fd()
            .context("PTY master has no file descriptor")?;
        let cloned = unsafe { libc::fcntl(fd, libc::F_DUPFD_CLOEXEC, 0) };
        if cloned < 0 {
            return Err(io::Error::last_os_error()).context("Failed to clone PTY reader");
        }
        // The duplicate is owned by nothing else
        let file = unsafe { std::fs::File::from_raw_fd(cloned) };
        Ok(Self { file })
    }

    #[cfg(not(unix))]
    fn open(master: &(dyn MasterPty + Send)) -> Result<Self> {
        let inner = master
            .try_clone_reader()
            .context("Failed to clone PTY reader")?;
        Ok(Self { inner })
    }

    /// Read whatever is available, waiting at most `timeout`.
    ///
    /// `Ok(None)` means nothing arrived in time, `Ok(Some(0))` is end of stream.
    #[cfg(unix)]
    pub fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<Option<usize>> {
        use std::os::fd::AsRawFd;

        let mut pollfd = libc::pollfd {
            fd: self.file.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let millis = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
        let rc = unsafe { libc::poll(&mut pollfd, 1, millis) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            return match err.kind() {
                io::ErrorKind::Interrupted => Ok(None),
                _ => Err(err),
            };
        }
        if rc == 0 {
            return Ok(None);
        }
        self.file.read(buf).map(Some)
    }

    /// Blocks until data arrives; there is no timeout off unix
    #[cfg(not(unix))]
    pub fn read_timeout(&mut self, buf: &mut [u8], _timeout: Duration) -> io::Result<Option<usize>> {
        self.inner.read(buf).map(Some)
    }
}

/// Incremental UTF-8 decoder for PTY reads.
///
/// A read can end in the middle of a multibyte sequence; the incomplete tail
/// is held back and prepended to the next read. Invalid bytes become U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the next read, returning everything that forms complete chars
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::with_capacity(self.pending.len());
        let mut rest: &[u8] = &self.pending;

        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    rest = &[];
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    // Safe: from_utf8 just validated this prefix
                    out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match e.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[bad..];
                        }
                        None => {
                            // Incomplete sequence at the end: keep it for the next read
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }

        self.pending = rest.to_vec();
        out
    }

    /// Flush whatever is left once the stream ends
    pub fn finish(&mut self) -> String {
        let rest = std::mem::take(&mut self.pending);
        String::from_utf8_lossy(&rest).into_owned()
    }
}
