use rodio::{Decoder, OutputStream, Sink};
use std::{
    fs::File,
    io::BufReader,
    path::PathBuf,
    sync::{
        mpsc::{self, Sender},
        Arc, Mutex,
    },
    thread,
};

enum PlayerCommand {
    Enqueue(PathBuf),
    Stop,
}

/// Serialized playback of queued reaction assets.
///
/// A dedicated thread owns the non-Send rodio objects; the sink plays
/// appended sources strictly one after another, so enqueue order is playback
/// order and a new asset starts only when the previous one finished. Assets
/// that fail to open or decode are skipped, never fatal.
pub struct AlertPlayer {
    tx: Arc<Mutex<Option<Sender<PlayerCommand>>>>,
}

impl AlertPlayer {
    pub fn new() -> Self {
        Self {
            tx: Arc::new(Mutex::new(None)),
        }
    }

    fn ensure_thread(&self) -> anyhow::Result<Sender<PlayerCommand>> {
        if let Some(tx) = self.tx.lock().unwrap().as_ref() {
            return Ok(tx.clone());
        }

        let (tx, rx) = mpsc::channel::<PlayerCommand>();

        thread::Builder::new()
            .name("alert-player".to_string())
            .spawn(move || {
                let mut _stream: Option<OutputStream> = None;
                let mut sink: Option<Sink> = None;

                fn ensure_sink(
                    stream: &mut Option<OutputStream>,
                    sink: &mut Option<Sink>,
                ) -> anyhow::Result<()> {
                    if sink.is_none() {
                        let (s, handle) = OutputStream::try_default()?;
                        let new_sink = Sink::try_new(&handle)?;
                        *stream = Some(s);
                        *sink = Some(new_sink);
                    }
                    Ok(())
                }

                while let Ok(cmd) = rx.recv() {
                    match cmd {
                        PlayerCommand::Enqueue(path) => {
                            if let Err(err) = ensure_sink(&mut _stream, &mut sink) {
                                log::error!("audio output unavailable, dropping alert: {err}");
                                continue;
                            }
                            let Some(ref s) = sink else { continue };
                            match File::open(&path) {
                                Ok(file) => match Decoder::new(BufReader::new(file)) {
                                    Ok(source) => {
                                        log::info!("playing reaction asset {}", path.display());
                                        s.append(source);
                                    }
                                    Err(err) => {
                                        log::warn!(
                                            "failed to decode {}: {err}",
                                            path.display()
                                        );
                                    }
                                },
                                Err(err) => {
                                    log::warn!("failed to open {}: {err}", path.display());
                                }
                            }
                        }
                        PlayerCommand::Stop => {
                            if let Some(s_old) = sink.take() {
                                s_old.stop();
                            }
                            _stream = None;
                        }
                    }
                }
            })?;

        let tx_clone = tx.clone();
        *self.tx.lock().unwrap() = Some(tx);
        Ok(tx_clone)
    }

    /// Append an asset to the playback queue.
    pub fn enqueue(&self, path: PathBuf) -> anyhow::Result<()> {
        let tx = self.ensure_thread()?;
        tx.send(PlayerCommand::Enqueue(path))
            .map_err(|err| anyhow::anyhow!("alert player thread is gone: {err}"))
    }

    /// Stop playback and discard anything still queued in the sink.
    pub fn stop(&self) {
        if let Ok(Some(tx)) = self.tx.lock().map(|guard| guard.clone()) {
            let _ = tx.send(PlayerCommand::Stop);
        }
    }
}

impl Default for AlertPlayer {
    fn default() -> Self {
        Self::new()
    }
}
