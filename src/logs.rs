//! Engine logs.
//!
//! Everything logged through the `log` macros goes to
//! `<cache_dir>/logs/main.log`, rotated every 1000 lines and keeping the 3
//! latest files. The host app can also receive every line through
//! [`set_log_sink`] (e.g. for a debug screen while driving) and bundle the log
//! folder into a zip with [`export`] when a user reports a missed alert.

use std::{
    fs::{self, File},
    io,
    path::Path,
    sync::{mpsc, LazyLock, Mutex},
    thread,
};

use anyhow::Result;
use file_rotate::{
    compression::Compression,
    suffix::{AppendTimestamp, FileLimit},
    {ContentLimit, FileRotate},
};
use log::Log;
use simplelog::{ConfigBuilder, LevelFilter, WriteLogger};

pub type LogSink = Box<dyn Fn(String) + Send>;

static LOG_SINK: LazyLock<Mutex<Option<LogSink>>> = LazyLock::new(|| Mutex::new(None));

static LOG_SENDER: LazyLock<Mutex<Option<mpsc::Sender<String>>>> =
    LazyLock::new(|| Mutex::new(None));

pub struct MainLogger {
    write_logger: Box<WriteLogger<FileRotate<AppendTimestamp>>>,
}

impl MainLogger {
    fn new(write_logger: Box<WriteLogger<FileRotate<AppendTimestamp>>>) -> Self {
        Self { write_logger }
    }
}

impl Log for MainLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.write_logger.enabled(metadata)
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        self.write_logger.log(record);

        let message = format!(
            "{}:{} -- {}",
            record.level(),
            record.target(),
            record.args()
        );
        if let Some(tx) = LOG_SENDER.lock().unwrap().as_ref() {
            // the dispatcher is gone only if the process is shutting down
            let _ = tx.send(message);
        }
    }

    fn flush(&self) {
        self.write_logger.flush();
    }
}

const LOG_FOLDER: &str = "logs";
const MAX_LOG_FILES: usize = 3;
const MAX_LINES_PER_FILE: usize = 1000;

pub fn init(cache_dir: &str) -> Result<()> {
    let path = Path::new(cache_dir).join(LOG_FOLDER).join("main.log");
    let log = FileRotate::new(
        path,
        AppendTimestamp::default(FileLimit::MaxFiles(MAX_LOG_FILES)),
        ContentLimit::Lines(MAX_LINES_PER_FILE),
        Compression::None,
        #[cfg(unix)]
        None,
    );
    let config = ConfigBuilder::new().set_time_format_rfc3339().build();
    let write_logger = WriteLogger::new(LevelFilter::Info, config, log);
    let main_logger = MainLogger::new(write_logger);
    log::set_boxed_logger(Box::new(main_logger))?;
    log::set_max_level(LevelFilter::Info);

    init_dispatcher();

    Ok(())
}

// Lines are handed to the sink on their own thread, so logging never blocks
// on a slow consumer.
fn init_dispatcher() {
    let mut guard = LOG_SENDER.lock().unwrap();
    if guard.is_some() {
        return;
    }

    let (tx, rx) = mpsc::channel::<String>();
    *guard = Some(tx);

    thread::spawn(move || {
        while let Ok(message) = rx.recv() {
            if let Some(sink) = LOG_SINK.lock().unwrap().as_ref() {
                sink(message);
            }
        }
    });
}

pub fn set_log_sink(sink: LogSink) {
    *LOG_SINK.lock().unwrap() = Some(sink);
}

pub fn export(cache_dir: &str, target_file_path: &str) -> Result<()> {
    let mut zip = zip::ZipWriter::new(File::create(target_file_path)?);
    let default_options =
        zip::write::SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);

    let log_folder = Path::new(cache_dir).join(LOG_FOLDER);
    for entry in (fs::read_dir(&log_folder)?).flatten() {
        let path = entry.path();
        if path.is_file() {
            if let Some(name) = path.strip_prefix(cache_dir)?.to_str() {
                zip.start_file(name, default_options)?;
                let mut log_file = File::open(&path)?;
                io::copy(&mut log_file, &mut zip)?;
            }
        }
    }

    zip.finish()?;
    Ok(())
}
