//! Redirection of the standard output channels into publish events.
//!
//! The backend runs native code that writes straight to file descriptors 1
//! and 2, so capture happens at the descriptor level: each channel is
//! pointed at a pipe whose contents go through a [`StreamBuffer`] that
//! publishes complete lines. A pump thread keeps the pipe from filling up;
//! [`StreamCapture::flush`] drains it on the caller's thread so output is
//! published before whatever the caller publishes next.
//!
//! The redirection is process-wide. Only one [`StreamCapture`] of the
//! standard channels may exist at a time, and [`StreamCapture::restore`]
//! puts the original descriptors back exactly. Dropping the capture restores
//! too, so abnormal exits do not leave the process writing into a pipe.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;

use crate::publish::{Publisher, StreamName};

/// Set while the standard channels are redirected
static STD_CHANNELS_CAPTURED: AtomicBool = AtomicBool::new(false);

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("output capture is already installed in this process")]
    AlreadyInstalled,
    #[error("output capture is not supported on this platform")]
    Unsupported,
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Buffers written bytes and hands complete lines to `sink`.
///
/// Whatever is left without a trailing newline is handed over on
/// [`flush`](StreamBuffer::flush) or when the buffer is dropped.
pub struct StreamBuffer<F: FnMut(&str)> {
    pending: Vec<u8>,
    sink: F,
}

impl<F: FnMut(&str)> StreamBuffer<F> {
    pub fn new(sink: F) -> Self {
        StreamBuffer {
            pending: Vec::new(),
            sink,
        }
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
        if let Some(last_newline) = self.pending.iter().rposition(|&b| b == b'\n') {
            let lines: Vec<u8> = self.pending.drain(..=last_newline).collect();
            (self.sink)(&String::from_utf8_lossy(&lines));
        }
    }

    pub fn flush(&mut self) {
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            (self.sink)(&String::from_utf8_lossy(&rest));
        }
    }
}

impl<F: FnMut(&str)> io::Write for StreamBuffer<F> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.feed(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        StreamBuffer::flush(self);
        Ok(())
    }
}

impl<F: FnMut(&str)> Drop for StreamBuffer<F> {
    fn drop(&mut self) {
        self.flush();
    }
}

fn flush_std_channels() {
    use std::io::Write;
    // Errors here only mean there was nothing left to write out.
    let _ = io::stdout().flush();
    let _ = io::stderr().flush();
}

/// Live redirection of one or more descriptors
pub struct StreamCapture {
    channels: Vec<sys::Redirect>,
    owns_std_channels: bool,
}

impl StreamCapture {
    /// Redirect stdout and stderr of this process to `publisher`
    #[cfg(unix)]
    pub fn install(publisher: Arc<dyn Publisher>) -> Result<Self, CaptureError> {
        if STD_CHANNELS_CAPTURED.swap(true, Ordering::SeqCst) {
            return Err(CaptureError::AlreadyInstalled);
        }

        let targets = [
            (libc::STDOUT_FILENO, StreamName::Stdout),
            (libc::STDERR_FILENO, StreamName::Stderr),
        ];
        match Self::install_on(&targets, publisher) {
            Ok(mut capture) => {
                capture.owns_std_channels = true;
                Ok(capture)
            }
            Err(e) => {
                STD_CHANNELS_CAPTURED.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    #[cfg(not(unix))]
    pub fn install(_publisher: Arc<dyn Publisher>) -> Result<Self, CaptureError> {
        Err(CaptureError::Unsupported)
    }

    /// Redirect arbitrary descriptors, each tagged with the stream it feeds
    #[cfg(unix)]
    pub fn install_on(
        targets: &[(std::os::fd::RawFd, StreamName)],
        publisher: Arc<dyn Publisher>,
    ) -> Result<Self, CaptureError> {
        flush_std_channels();

        let mut capture = StreamCapture {
            channels: Vec::with_capacity(targets.len()),
            owns_std_channels: false,
        };
        for &(fd, name) in targets {
            let redirect = sys::Redirect::install(fd, name, Arc::clone(&publisher))?;
            capture.channels.push(redirect);
        }
        Ok(capture)
    }

    pub fn is_installed(&self) -> bool {
        !self.channels.is_empty()
    }

    /// Publish everything written so far, partial lines included.
    ///
    /// Runs on the calling thread: once it returns, every byte written to
    /// the captured descriptors before the call has been published.
    pub fn flush(&mut self) -> Result<(), CaptureError> {
        flush_std_channels();
        for redirect in &mut self.channels {
            redirect.flush()?;
        }
        Ok(())
    }

    /// Put the original descriptors back. Calling it again does nothing.
    ///
    /// Pending output is published first. Never waits for processes that
    /// inherited a captured descriptor.
    pub fn restore(&mut self) -> Result<(), CaptureError> {
        if !self.is_installed() {
            return Ok(());
        }
        flush_std_channels();

        let mut first_error = None;
        for mut redirect in self.channels.drain(..).rev() {
            if let Err(e) = redirect.restore() {
                first_error.get_or_insert(e);
            }
        }

        if self.owns_std_channels {
            self.owns_std_channels = false;
            STD_CHANNELS_CAPTURED.store(false, Ordering::SeqCst);
        }
        first_error.map_or(Ok(()), |e| Err(CaptureError::Io(e)))
    }
}

impl Drop for StreamCapture {
    fn drop(&mut self) {
        // Nowhere left to report a failure to.
        let _ = self.restore();
    }
}

#[cfg(not(unix))]
mod sys {
    use std::io;

    pub(super) enum Redirect {}

    impl Redirect {
        pub(super) fn flush(&mut self) -> io::Result<()> {
            match *self {}
        }

        pub(super) fn restore(&mut self) -> io::Result<()> {
            match *self {}
        }
    }
}

#[cfg(unix)]
mod sys {
    use std::fs::File;
    use std::io::{self, Read};
    use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
    use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
    use std::thread::{self, JoinHandle};

    use super::StreamBuffer;
    use crate::publish::{PublishEvent, Publisher, StreamName};

    type Sink = Box<dyn FnMut(&str) + Send>;

    fn check(ret: libc::c_int) -> io::Result<libc::c_int> {
        if ret < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(ret)
        }
    }

    fn dup_cloexec(fd: RawFd) -> io::Result<OwnedFd> {
        // SAFETY: F_DUPFD_CLOEXEC returns a fresh descriptor we now own.
        let copy = check(unsafe { libc::fcntl(fd, libc::F_DUPFD_CLOEXEC, 0) })?;
        Ok(unsafe { OwnedFd::from_raw_fd(copy) })
    }

    fn pipe_cloexec() -> io::Result<(OwnedFd, OwnedFd)> {
        let mut fds = [0 as libc::c_int; 2];
        // SAFETY: `fds` has room for the two descriptors pipe writes.
        check(unsafe { libc::pipe(fds.as_mut_ptr()) })?;
        let (read_end, write_end) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
        for fd in [&read_end, &write_end] {
            check(unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_SETFD, libc::FD_CLOEXEC) })?;
        }
        Ok((read_end, write_end))
    }

    fn set_nonblocking(fd: &OwnedFd) -> io::Result<()> {
        // SAFETY: plain flag manipulation on a descriptor we own.
        let flags = check(unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_GETFL) })?;
        check(unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_SETFL, flags | libc::O_NONBLOCK) })?;
        Ok(())
    }

    fn stream_sink(name: StreamName, publisher: Arc<dyn Publisher>) -> Sink {
        Box::new(move |text: &str| publisher.publish(PublishEvent::stream(name, text)))
    }

    /// The non-blocking read end of a pipe and the buffer it feeds.
    ///
    /// Every read happens with the lock held, so whoever holds it has seen
    /// all bytes read so far.
    struct Drain {
        source: File,
        buffer: StreamBuffer<Sink>,
    }

    impl Drain {
        /// Read until the pipe is empty; `Ok(true)` means end of file
        fn read_available(&mut self) -> io::Result<bool> {
            let mut chunk = [0u8; 4096];
            loop {
                match self.source.read(&mut chunk) {
                    Ok(0) => return Ok(true),
                    Ok(n) => self.buffer.feed(&chunk[..n]),
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e),
                }
            }
        }
    }

    fn lock(drain: &Mutex<Drain>) -> MutexGuard<'_, Drain> {
        drain.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Background reader that keeps the pipe from filling up while native
    /// code writes more than the pipe holds. Stops when `wake` becomes
    /// readable or hangs up.
    fn pump(drain: Arc<Mutex<Drain>>, wake: OwnedFd) {
        // No logging in here: stderr may be the very pipe being drained.
        let source = lock(&drain).source.as_raw_fd();
        let mut fds = [
            libc::pollfd {
                fd: source,
                events: libc::POLLIN,
                revents: 0,
            },
            libc::pollfd {
                fd: wake.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            },
        ];
        loop {
            // SAFETY: `fds` outlives the call and both descriptors stay open.
            let ready = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, -1) };
            if ready < 0 {
                if io::Error::last_os_error().kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return;
            }
            if fds[1].revents != 0 {
                return;
            }
            if fds[0].revents != 0 && !matches!(lock(&drain).read_available(), Ok(false)) {
                return;
            }
        }
    }

    /// One descriptor pointed at a pipe, with the original saved aside
    pub(super) struct Redirect {
        target: RawFd,
        saved: OwnedFd,
        drain: Arc<Mutex<Drain>>,
        /// Dropping this wakes the pump and makes it exit
        wake: Option<OwnedFd>,
        pump: Option<JoinHandle<()>>,
    }

    impl Redirect {
        pub(super) fn install(target: RawFd, name: StreamName, publisher: Arc<dyn Publisher>) -> io::Result<Self> {
            let saved = dup_cloexec(target)?;
            let (read_end, write_end) = pipe_cloexec()?;
            set_nonblocking(&read_end)?;
            let (wake_read, wake_write) = pipe_cloexec()?;

            let drain = Arc::new(Mutex::new(Drain {
                source: File::from(read_end),
                buffer: StreamBuffer::new(stream_sink(name, publisher)),
            }));

            let pump_drain = Arc::clone(&drain);
            let handle = thread::Builder::new()
                .name(format!("jitcell-{}", name))
                .spawn(move || pump(pump_drain, wake_read))?;

            // SAFETY: both descriptors are open; dup2 atomically replaces `target`.
            if let Err(e) = check(unsafe { libc::dup2(write_end.as_raw_fd(), target) }) {
                drop(wake_write);
                let _ = handle.join();
                return Err(e);
            }
            drop(write_end);

            Ok(Redirect {
                target,
                saved,
                drain,
                wake: Some(wake_write),
                pump: Some(handle),
            })
        }

        pub(super) fn flush(&mut self) -> io::Result<()> {
            let mut drain = lock(&self.drain);
            let result = drain.read_available();
            drain.buffer.flush();
            result.map(|_| ())
        }

        pub(super) fn restore(&mut self) -> io::Result<()> {
            // SAFETY: `saved` stays open for the lifetime of `self`.
            check(unsafe { libc::dup2(self.saved.as_raw_fd(), self.target) })?;
            let flushed = self.flush();

            // Children may still hold the write end, so EOF is not waited for.
            drop(self.wake.take());
            if let Some(pump) = self.pump.take() {
                let _ = pump.join();
            }
            flushed
        }
    }
}
