//! Console progress sink: stdout narration, an indicatif bar per file,
//! and the passphrase prompt.

use carpet_core::ProgressSink;
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::sync::Mutex;

/// Terminal implementation of the engine's reporting capability.
pub struct ConsoleSink {
    bar: Mutex<Option<ProgressBar>>,
}

impl ConsoleSink {
    /// Create a sink writing to the current terminal.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn fresh_bar() -> ProgressBar {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("[{wide_bar:.cyan/blue}] {pos:>3}%")
                .expect("invalid progress bar template")
                .progress_chars("#>-"),
        );
        bar
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for ConsoleSink {
    fn log(&self, line: &str) {
        // Print above the bar when one is active so it stays put.
        match &*self.bar.lock().expect("progress bar lock poisoned") {
            Some(bar) => bar.println(line),
            None => println!("{line}"),
        }
    }

    fn progress(&self, percent: u8) {
        let mut slot = self.bar.lock().expect("progress bar lock poisoned");
        let bar = slot.get_or_insert_with(Self::fresh_bar);
        bar.set_position(u64::from(percent));
        if percent >= 100 {
            bar.finish();
            *slot = None;
        }
    }

    fn prompt_passphrase(&self) -> io::Result<String> {
        rpassword::prompt_password("Enter password from receiving end: ")
    }

    fn show_passphrase(&self, passphrase: &str) {
        self.log("=============================");
        self.log(&format!("Transfer password: {passphrase}"));
        self.log("Please use this password on sending end when prompted to start transfer.");
        self.log("=============================");
    }
}
