use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
    io::{self, BufRead, BufReader, Read},
    path::PathBuf,
    process::{Child, ChildStderr, Command, Stdio},
    sync::Arc,
    thread::JoinHandle,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{locator::playlist_position, StreamProvider};
use crate::error::{MusicError, MusicResult};

/// Preferencia de formato: webm, luego el mejor audio, luego lo que haya
const FORMAT_PREFERENCE: &str = "bestaudio[ext=webm]/bestaudio/best";

/// Notificaciones del proceso que produce el stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Llegaron los primeros bytes
    Data,
    /// Fin de datos con salida limpia
    Ended,
    /// Salida anormal con el texto de diagnóstico del proceso
    Failed(String),
}

/// Stream de audio en vivo, de un solo uso y no reiniciable.
///
/// El lector y el canal de eventos se separan con [`ByteSource::into_parts`]
/// porque el lector termina en el hilo del mixer de songbird.
pub struct ByteSource {
    locator: String,
    reader: ByteReader,
    events: mpsc::UnboundedReceiver<StreamEvent>,
}

impl ByteSource {
    /// Envuelve cualquier lector; útil para fuentes en memoria
    pub fn from_reader(locator: impl Into<String>, reader: impl Read + Send + Sync + 'static) -> Self {
        Self::build(locator.into(), Box::new(reader), None, Diagnostics::default())
    }

    /// Toma stdout y stderr de un proceso ya lanzado
    fn from_child(locator: String, mut child: Child) -> MusicResult<Self> {
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MusicError::StreamError("yt-dlp sin stdout".to_string()))?;

        let diagnostics = child
            .stderr
            .take()
            .map(Diagnostics::collect)
            .unwrap_or_default();

        Ok(Self::build(locator, Box::new(stdout), Some(child), diagnostics))
    }

    fn build(
        locator: String,
        inner: Box<dyn Read + Send + Sync>,
        child: Option<Child>,
        diagnostics: Diagnostics,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            locator,
            reader: ByteReader {
                inner,
                child,
                diagnostics,
                events: tx,
                started: false,
                finished: false,
            },
            events: rx,
        }
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }

    pub fn into_parts(self) -> (ByteReader, mpsc::UnboundedReceiver<StreamEvent>) {
        (self.reader, self.events)
    }
}

impl std::fmt::Debug for ByteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteSource").field("locator", &self.locator).finish()
    }
}

/// Stderr del proceso, acumulado por un hilo lector
#[derive(Default)]
struct Diagnostics {
    text: Arc<Mutex<String>>,
    collector: Option<JoinHandle<()>>,
}

impl Diagnostics {
    /// Lee stderr en un hilo aparte, omitiendo las líneas de progreso
    fn collect(stderr: ChildStderr) -> Self {
        let text = Arc::new(Mutex::new(String::new()));
        let buffer = text.clone();

        let collector = std::thread::Builder::new()
            .name("yt-dlp-stderr".to_string())
            .spawn(move || {
                for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                    let line = line.trim();
                    if line.is_empty() || is_progress_line(line) {
                        continue;
                    }
                    debug!("yt-dlp: {}", line);
                    let mut text = buffer.lock();
                    text.push_str(line);
                    text.push('\n');
                }
            })
            .map_err(|e| warn!("⚠️ No se pudo leer stderr de yt-dlp: {}", e))
            .ok();

        Self { text, collector }
    }

    /// Texto completo; espera a que el hilo lector llegue al final de stderr
    fn take(&mut self) -> String {
        if let Some(collector) = self.collector.take() {
            if collector.join().is_err() {
                warn!("⚠️ El lector de stderr de yt-dlp terminó con pánico");
            }
        }
        self.text.lock().trim().to_string()
    }
}

/// Mitad de lectura de un [`ByteSource`]. Al soltarse termina el proceso.
pub struct ByteReader {
    inner: Box<dyn Read + Send + Sync>,
    child: Option<Child>,
    diagnostics: Diagnostics,
    events: mpsc::UnboundedSender<StreamEvent>,
    started: bool,
    finished: bool,
}

impl ByteReader {
    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;

        let event = match self.child.as_mut().map(Child::wait) {
            Some(Ok(status)) if !status.success() => {
                info!("yt-dlp terminó con código: {:?}", status.code());
                let diagnostics = self.diagnostics.take();
                if diagnostics.is_empty() {
                    StreamEvent::Failed(format!("yt-dlp terminó con {}", status))
                } else {
                    StreamEvent::Failed(diagnostics)
                }
            }
            Some(Err(e)) => StreamEvent::Failed(e.to_string()),
            Some(Ok(status)) => {
                info!("yt-dlp terminó con código: {:?}", status.code());
                StreamEvent::Ended
            }
            None => StreamEvent::Ended,
        };

        let _ = self.events.send(event);
    }

    fn fail(&mut self, error: &io::Error) {
        if self.finished {
            return;
        }
        self.finished = true;
        let _ = self.events.send(StreamEvent::Failed(error.to_string()));
    }
}

impl Read for ByteReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inner.read(buf) {
            Ok(0) if !buf.is_empty() => {
                self.finish();
                Ok(0)
            }
            Ok(n) => {
                if n > 0 && !self.started {
                    self.started = true;
                    let _ = self.events.send(StreamEvent::Data);
                }
                Ok(n)
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Err(e),
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }
}

impl Drop for ByteReader {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Ok(None) = child.try_wait() {
                debug!("🔪 Terminando proceso yt-dlp");
                let _ = child.kill();
                let _ = child.wait();
            }
        }
    }
}

/// Proveedor de streams que lanza un yt-dlp por llamada, sin reutilización.
pub struct YtDlpStreamProvider {
    ytdlp: PathBuf,
    cookies: Option<PathBuf>,
}

impl YtDlpStreamProvider {
    pub fn new(ytdlp: PathBuf, cookies: Option<PathBuf>) -> Self {
        Self { ytdlp, cookies }
    }

    fn command(&self, locator: &str) -> Command {
        let mut cmd = Command::new(&self.ytdlp);
        cmd.args(["-f", FORMAT_PREFERENCE, "-o", "-", "--no-warnings", "--no-playlist"]);
        if let Some(position) = playlist_position(locator) {
            cmd.arg("--playlist-items").arg(position.to_string());
        }

        if let Some(cookies) = &self.cookies {
            cmd.arg("--cookies").arg(cookies);
        }

        cmd.arg(locator)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

#[async_trait]
impl StreamProvider for YtDlpStreamProvider {
    async fn open_stream(&self, locator: &str) -> MusicResult<ByteSource> {
        info!("🎧 Iniciando stream yt-dlp para: {}", locator);

        let child = self
            .command(locator)
            .spawn()
            .map_err(|e| MusicError::StreamError(format!("no se pudo lanzar yt-dlp: {}", e)))?;

        ByteSource::from_child(locator.to_string(), child)
    }
}

fn is_progress_line(line: &str) -> bool {
    line.contains("[download]") || line.contains('%')
}
