//! The relay loop
//!
//! Wires one guild's engine together: pipeline, effects chain, CPU gauge
//! and quality controller. PCM flows from a reader through the pump on a
//! dedicated thread while the controller and an event logger run as tasks.

use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use soundbridge_audio::{
    AudioPipeline, BroadcastEventSink, CpuGauge, EffectsChain, QualityController, ReaderSource,
    StreamPump, WriterSink,
};
use soundbridge_core::{AudioEvent, GuildId};
use std::io::{Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How long a cancelled relay waits for the pump to notice
const PUMP_GRACE: Duration = Duration::from_millis(200);

/// Engine components for one relayed guild
pub struct Relay {
    config: RelayConfig,
    guild_id: GuildId,
    events: Arc<BroadcastEventSink>,
    pipeline: Arc<AudioPipeline>,
    effects: Arc<EffectsChain>,
    gauge: Arc<CpuGauge>,
    controller: Arc<QualityController>,
}

impl Relay {
    pub fn new(config: RelayConfig) -> Result<Self> {
        config.validate()?;

        let guild_id = GuildId::new(config.relay.guild_id);
        let events = Arc::new(BroadcastEventSink::new(config.relay.event_capacity));
        let gauge = Arc::new(CpuGauge::new());
        let pipeline = Arc::new(
            AudioPipeline::new(events.clone())
                .with_default_config(config.audio.clone())?
                .with_cpu_probe(gauge.clone()),
        );
        let effects = Arc::new(EffectsChain::new(Arc::clone(&pipeline), events.clone()));
        let controller = Arc::new(QualityController::new(
            Arc::clone(&pipeline),
            gauge.clone(),
            events.clone(),
            config.quality.clone(),
        ));

        if let Some(preset) = config.audio.eq_preset.as_deref() {
            effects.apply_eq_preset(guild_id, preset)?;
        }

        Ok(Self {
            config,
            guild_id,
            events,
            pipeline,
            effects,
            gauge,
            controller,
        })
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn pipeline(&self) -> &Arc<AudioPipeline> {
        &self.pipeline
    }

    pub fn effects(&self) -> &Arc<EffectsChain> {
        &self.effects
    }

    /// Relay `input` to `output` until the input ends or `shutdown` fires
    ///
    /// Returns the number of bytes written. On shutdown the pump gets a
    /// short grace period; a pump still blocked reading `input` after that
    /// is left to exit on its own once the read returns.
    pub async fn run<R, W>(&self, input: R, output: W, shutdown: CancellationToken) -> Result<u64>
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        self.pipeline.start_processing(self.guild_id);
        let tasks = shutdown.child_token();

        let logger = spawn_event_logger(self.events.subscribe(), tasks.clone());
        let controller = Arc::clone(&self.controller).spawn(tasks.clone());

        let written_so_far = Arc::new(AtomicU64::new(0));
        let output = CountingWriter {
            inner: output,
            count: Arc::clone(&written_so_far),
        };
        let mut pump = StreamPump::new(
            self.guild_id,
            ReaderSource::new(input, self.config.relay.chunk_bytes),
            WriterSink::new(output),
            Arc::clone(&self.pipeline),
        )
        .with_effects(Arc::clone(&self.effects))
        .with_gauge(Arc::clone(&self.gauge));

        // A plain thread rather than spawn_blocking: a read that never returns
        // must not hold up runtime shutdown
        let (done_tx, mut done) = oneshot::channel();
        let spawned = std::thread::Builder::new()
            .name("soundbridge-pump".to_string())
            .spawn(move || {
                let _ = done_tx.send(pump.run());
            });

        let written = match spawned {
            Ok(_) => {
                tokio::select! {
                    finished = &mut done => finished
                        .map_err(|_| RelayError::Task("pump thread exited without a result".to_string()))
                        .and_then(|r| r.map_err(RelayError::from)),
                    () = shutdown.cancelled() => {
                        info!(guild = %self.guild_id, "Shutdown requested");
                        // Stopping the guild makes the pump return after its current chunk
                        self.pipeline.stop_processing(self.guild_id);
                        match tokio::time::timeout(PUMP_GRACE, &mut done).await {
                            Ok(Ok(result)) => result.map_err(RelayError::from),
                            _ => {
                                warn!(
                                    guild = %self.guild_id,
                                    "Pump still blocked on input, not waiting for it"
                                );
                                Ok(written_so_far.load(Ordering::Relaxed))
                            }
                        }
                    }
                }
            }
            Err(e) => Err(RelayError::Io(e)),
        };

        self.pipeline.stop_processing(self.guild_id);
        tasks.cancel();
        if let Err(e) = controller.await {
            warn!(error = %e, "Quality controller task ended abnormally");
        }
        if let Err(e) = logger.await {
            warn!(error = %e, "Event logger task ended abnormally");
        }

        let written = written?;
        info!(guild = %self.guild_id, bytes = written, "Relay finished");
        Ok(written)
    }
}

/// Output wrapper keeping a running byte count visible outside the pump thread
struct CountingWriter<W> {
    inner: W,
    count: Arc<AtomicU64>,
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

/// Log every engine event until cancelled
fn spawn_event_logger(
    mut events: broadcast::Receiver<AudioEvent>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                received = events.recv() => match received {
                    Ok(event) => log_event(&event),
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "Event logger fell behind");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
    })
}

fn log_event(event: &AudioEvent) {
    match event {
        AudioEvent::QualityChanged {
            guild_id,
            previous,
            quality,
            reason,
        } => info!(
            guild = %guild_id,
            from = %previous,
            to = %quality,
            ?reason,
            "event: {}",
            event.name()
        ),
        _ => info!(guild = %event.guild_id(), "event: {}", event.name()),
    }
}
