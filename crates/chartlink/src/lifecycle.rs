//! Process-level plumbing around a session.
//!
//! The worker's stdin is a pipe from the controller; nothing ever arrives
//! on it, and its closure is the only signal that the controller is gone.
//! stdout/stderr carry diagnostics only and must reach the controller's
//! console without buffering delays.

use tokio::io::AsyncReadExt;

/// Switch stdout and stderr to synchronous writes so diagnostics are
/// visible to the controller as soon as they are emitted.
#[cfg(unix)]
pub fn set_unbuffered_stdio() {
    use std::os::fd::BorrowedFd;

    use nix::fcntl::{FcntlArg, OFlag, fcntl};

    for raw_fd in [1, 2] {
        // Safety: stdout/stderr stay open for the life of the process.
        let fd = unsafe { BorrowedFd::borrow_raw(raw_fd) };
        match fcntl(fd, FcntlArg::F_GETFL) {
            Ok(flags) => {
                let flags = OFlag::from_bits_retain(flags) | OFlag::O_SYNC;
                if let Err(e) = fcntl(fd, FcntlArg::F_SETFL(flags)) {
                    tracing::warn!(fd = raw_fd, error = %e, "Could not unbuffer stream");
                }
            }
            Err(e) => {
                tracing::warn!(fd = raw_fd, error = %e, "Could not read stream flags");
            }
        }
    }
}

#[cfg(not(unix))]
pub fn set_unbuffered_stdio() {}

/// Resolves when the controlling pipe closes, i.e. when the controller
/// process has terminated. Input is not expected and is discarded.
pub async fn controller_eof() {
    let mut stdin = tokio::io::stdin();
    let mut buf = [0u8; 1024];
    loop {
        match stdin.read(&mut buf).await {
            Ok(0) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!(error = %e, "Error reading controlling pipe, treating as closed");
                break;
            }
        }
    }
}
