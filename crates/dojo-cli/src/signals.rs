//! OS signal subscription.

use dojo_runtime::supervisor::CaughtSignal;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;

/// Installs handlers for SIGINT, SIGTERM and SIGHUP and forwards every
/// delivery to `tx` until the receiver is gone.
///
/// Must be called from within the runtime, before the work starts, so that
/// no signal falls back to the default disposition.
///
/// # Errors
///
/// Returns an error if a handler cannot be installed.
pub fn forward(tx: mpsc::Sender<CaughtSignal>) -> std::io::Result<()> {
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;
    let _ = tokio::spawn(async move {
        loop {
            let caught = tokio::select! {
                Some(()) = interrupt.recv() => CaughtSignal::Interrupt,
                Some(()) = terminate.recv() => CaughtSignal::Terminate,
                Some(()) = hangup.recv() => CaughtSignal::Other(SignalKind::hangup().as_raw_value()),
                else => break,
            };
            if tx.send(caught).await.is_err() {
                break;
            }
        }
    });
    Ok(())
}
