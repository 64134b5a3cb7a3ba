use std::{
    fs::OpenOptions,
    io::{self, Write},
    path::PathBuf,
};

/// Destination for raw playlist bodies, kept for offline inspection.
pub trait DebugCapture: Send + Sync {
    fn open(&self, name: &str) -> io::Result<Box<dyn Write + Send>>;
}

/// Writes every captured playlist into one directory.
pub struct DirCapture {
    dir: PathBuf,
}

impl DirCapture {
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }
}

impl DebugCapture for DirCapture {
    fn open(&self, name: &str) -> io::Result<Box<dyn Write + Send>> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(self.dir.join(name))?;
        Ok(Box::new(file))
    }
}

/// Copies `body` into the capture sink, if any. Failures are logged and
/// otherwise ignored.
pub(crate) fn tee(capture: Option<&dyn DebugCapture>, name: &str, body: &[u8]) {
    let Some(capture) = capture else {
        return;
    };

    let result = capture
        .open(name)
        .and_then(|mut writer| writer.write_all(body).and_then(|_| writer.flush()));
    if let Err(e) = result {
        log::warn!("Failed to capture {name}: {e}");
    }
}
