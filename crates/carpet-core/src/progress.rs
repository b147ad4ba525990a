//! The reporting capability the engine drives.

use std::io;

/// Where the engine reports to.
///
/// The core never names UI widgets; a console front-end, a GUI, or a test
/// recorder all fit behind these four operations. Implementations must be
/// callable from the driver task without blocking the transfer for longer
/// than the user takes to respond to a prompt.
pub trait ProgressSink: Send + Sync {
    /// Append one line of transfer narration.
    fn log(&self, line: &str);

    /// Update the percentage for the file currently in flight.
    fn progress(&self, percent: u8);

    /// Ask the user for the passphrase shown on the receiving end.
    ///
    /// Called once per sending transfer, before any wireless mutation.
    ///
    /// # Errors
    ///
    /// Returns an error if input is unavailable (for example, stdin
    /// closed).
    fn prompt_passphrase(&self) -> io::Result<String>;

    /// Show the generated passphrase so the user can read it to the
    /// sending side. Called once per receiving transfer.
    fn show_passphrase(&self, passphrase: &str);
}
