use chrono::Utc;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// File inside the logs directory that collects one line per finished epoch split.
pub const LOG_FILE: &str = "log.txt";

/// Running loss and timing of the current epoch split, echoed to the terminal and
/// appended to the training log.
pub struct Stats {
    stopwatch: Instant,
    batch_size: usize,
    l: f32,
    log_output: String,
    log_path: PathBuf,
    f_handle: File,
}

impl Stats {
    /// Opens `<logs_dir>/log.txt` for appending and starts the session with a timestamp.
    pub fn new(logs_dir: impl AsRef<Path>, batch_size: usize) -> io::Result<Self> {
        let log_path = logs_dir.as_ref().join(LOG_FILE);
        let f_handle = File::options().create(true).append(true).open(&log_path)?;
        let now = Utc::now();

        writeln!(&f_handle, "\n----{}----\n", now.format("%Y-%m-%d %H:%M:%S"))?;

        Ok(Stats {
            stopwatch: Instant::now(),
            batch_size,
            l: 0.0,
            log_output: String::new(),
            log_path,
            f_handle,
        })
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Adds the loss of step `iteration` (1-based) and redraws the progress line.
    ///
    /// Step `0` is ignored.
    pub fn update(&mut self, loss: f32, iteration: usize, name: &str, epoch: usize) {
        if iteration == 0 {
            return;
        }

        self.l += loss;

        let elapsed = self.stopwatch.elapsed().as_secs();

        self.log_output = format!(
            "{},E:{:<6.3},I:{:<6.3},L:{:<6.3},T:{:<}m{:<}s",
            name,
            epoch,
            iteration * self.batch_size,
            self.l / iteration as f32,
            (elapsed / 60),
            elapsed % 60
        );

        print!("{}\r", &self.log_output);
        io::stdout().flush().ok();
    }

    /// Writes the last progress line to the log and resets for the next split.
    pub fn flush(&mut self) -> io::Result<()> {
        writeln!(self.f_handle, "{}", self.log_output)?;
        self.stopwatch = Instant::now();
        self.l = 0.0;
        self.log_output.clear();
        println!();
        Ok(())
    }
}
