//! Chunk sources, playback sinks and the pump between them
//!
//! A [`StreamPump`] pulls raw int16 PCM chunks from a [`StreamSource`],
//! runs them through the guild's pipeline and effects chain, and writes
//! the result to a [`PlaybackSink`]. Voice transport stays outside the
//! engine; anything that can hand over bytes or take them can be plugged in.

use crate::effects::EffectsChain;
use crate::error::{AudioError, Result};
use crate::pipeline::AudioPipeline;
use crate::quality::CpuGauge;
use soundbridge_core::{EffectKind, GuildId};
use std::io::{ErrorKind, Read, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

/// Supplier of raw PCM chunks
pub trait StreamSource: Send {
    /// Next chunk of int16 LE PCM
    ///
    /// # Returns
    /// * `Ok(Some(bytes))` - A chunk (may be empty if nothing is ready yet)
    /// * `Ok(None)` - The source is exhausted
    /// * `Err(_)` - Read failure
    fn read_chunk(&mut self) -> Result<Option<Vec<u8>>>;

    /// Whether the source has no more data
    fn is_finished(&self) -> bool;
}

/// Consumer of processed PCM chunks
pub trait PlaybackSink: Send {
    fn write(&mut self, chunk: &[u8]) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Source reading fixed-size chunks from any [`Read`]
///
/// The final chunk may be shorter than `chunk_bytes`.
pub struct ReaderSource<R> {
    reader: R,
    chunk_bytes: usize,
    finished: bool,
}

impl<R: Read + Send> ReaderSource<R> {
    pub fn new(reader: R, chunk_bytes: usize) -> Self {
        Self {
            reader,
            chunk_bytes: chunk_bytes.max(1),
            finished: false,
        }
    }
}

impl<R: Read + Send> StreamSource for ReaderSource<R> {
    fn read_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        if self.finished {
            return Ok(None);
        }

        let mut chunk = vec![0u8; self.chunk_bytes];
        let mut filled = 0;
        while filled < chunk.len() {
            match self.reader.read(&mut chunk[filled..]) {
                Ok(0) => {
                    self.finished = true;
                    break;
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(AudioError::Io(e)),
            }
        }

        if filled == 0 {
            return Ok(None);
        }
        chunk.truncate(filled);
        Ok(Some(chunk))
    }

    fn is_finished(&self) -> bool {
        self.finished
    }
}

/// Sink writing chunks to any [`Write`]
pub struct WriterSink<W> {
    writer: W,
    written: u64,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    /// Total bytes written so far
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> PlaybackSink for WriterSink<W> {
    fn write(&mut self, chunk: &[u8]) -> Result<()> {
        self.writer.write_all(chunk)?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Outcome of one pump step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpStatus {
    /// Processed and wrote this many bytes
    Wrote(usize),
    /// Source had nothing ready
    Idle,
    /// Source is exhausted
    Ended,
    /// Guild is no longer processing
    Stopped,
}

/// Moves chunks from a source through a guild's processing into a sink
pub struct StreamPump<S, K> {
    guild_id: GuildId,
    source: S,
    sink: K,
    pipeline: Arc<AudioPipeline>,
    effects: Option<Arc<EffectsChain>>,
    gauge: Option<Arc<CpuGauge>>,
}

impl<S: StreamSource, K: PlaybackSink> StreamPump<S, K> {
    pub fn new(guild_id: GuildId, source: S, sink: K, pipeline: Arc<AudioPipeline>) -> Self {
        Self {
            guild_id,
            source,
            sink,
            pipeline,
            effects: None,
            gauge: None,
        }
    }

    /// Run the guild's effects chain after the pipeline
    pub fn with_effects(mut self, effects: Arc<EffectsChain>) -> Self {
        self.effects = Some(effects);
        self
    }

    /// Report processing load to `gauge` after every chunk
    pub fn with_gauge(mut self, gauge: Arc<CpuGauge>) -> Self {
        self.gauge = Some(gauge);
        self
    }

    /// Process a single chunk
    pub fn step(&mut self) -> Result<PumpStatus> {
        if !self.pipeline.is_active(self.guild_id) {
            return Ok(PumpStatus::Stopped);
        }
        let Some(chunk) = self.source.read_chunk()? else {
            return Ok(PumpStatus::Ended);
        };
        if chunk.is_empty() {
            return Ok(PumpStatus::Idle);
        }

        let started = Instant::now();
        let mut config = self.pipeline.get_config(self.guild_id);

        let chain = self
            .effects
            .as_ref()
            .filter(|_| config.effects_enabled);
        // An enabled equalizer effect replaces the pipeline's own EQ stage
        if chain.is_some_and(|c| c.has_enabled(self.guild_id, EffectKind::Equalizer)) {
            config.eq_enabled = false;
        }

        let mut out = self.pipeline.process(self.guild_id, &chunk, &config);
        if let Some(chain) = chain {
            out = chain.process(self.guild_id, &out, &config);
        }

        if let Some(gauge) = &self.gauge {
            let frames = chunk.len() / config.frame_bytes();
            let audio = Duration::from_secs_f64(frames as f64 / f64::from(config.sample_rate.max(1)));
            gauge.record_processing(self.guild_id, started.elapsed(), audio);
        }

        if out.is_empty() {
            return Ok(PumpStatus::Idle);
        }
        self.sink.write(&out)?;
        trace!(guild = %self.guild_id, bytes = out.len(), "Chunk written");
        Ok(PumpStatus::Wrote(out.len()))
    }

    /// Pump until the source ends or the guild stops, returning bytes written
    pub fn run(&mut self) -> Result<u64> {
        let mut total = 0u64;
        loop {
            match self.step()? {
                PumpStatus::Wrote(n) => total += n as u64,
                PumpStatus::Idle => {}
                status @ (PumpStatus::Ended | PumpStatus::Stopped) => {
                    debug!(guild = %self.guild_id, ?status, "Pump finished");
                    break;
                }
            }
        }
        self.sink.flush()?;
        info!(guild = %self.guild_id, bytes = total, "Stream drained");
        Ok(total)
    }

    pub fn into_parts(self) -> (S, K) {
        (self.source, self.sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::CpuUsageProbe;
    use soundbridge_core::{AudioConfig, NullEventSink};
    use soundbridge_dsp::pcm::{bytes_to_i16, i16_to_bytes};
    use std::io::Cursor;

    #[test]
    fn reader_source_chunks_and_ends() {
        let mut source = ReaderSource::new(Cursor::new(vec![7u8; 10]), 4);
        assert_eq!(source.read_chunk().unwrap().map(|c| c.len()), Some(4));
        assert_eq!(source.read_chunk().unwrap().map(|c| c.len()), Some(4));
        assert_eq!(source.read_chunk().unwrap().map(|c| c.len()), Some(2));
        assert!(source.is_finished());
        assert_eq!(source.read_chunk().unwrap(), None);
    }

    #[test]
    fn pump_stops_for_inactive_guild() {
        let pipeline = Arc::new(AudioPipeline::new(Arc::new(NullEventSink)));
        let source = ReaderSource::new(Cursor::new(vec![0u8; 8]), 8);
        let mut pump = StreamPump::new(GuildId::new(1), source, WriterSink::new(Vec::new()), pipeline);
        assert_eq!(pump.step().unwrap(), PumpStatus::Stopped);
    }

    #[test]
    fn pump_processes_until_end() {
        let pipeline = Arc::new(AudioPipeline::new(Arc::new(NullEventSink)));
        let guild = GuildId::new(1);
        pipeline
            .set_config(
                guild,
                AudioConfig {
                    master_volume: 0.5,
                    normalization_enabled: false,
                    ..Default::default()
                },
            )
            .unwrap();
        pipeline.start_processing(guild);

        let input = i16_to_bytes(&[1000i16; 64]);
        let gauge = Arc::new(CpuGauge::new());
        let mut pump = StreamPump::new(
            guild,
            ReaderSource::new(Cursor::new(input), 32),
            WriterSink::new(Vec::new()),
            Arc::clone(&pipeline),
        )
        .with_gauge(Arc::clone(&gauge));

        assert_eq!(pump.run().unwrap(), 128);
        let (_, sink) = pump.into_parts();
        let samples = bytes_to_i16(&sink.into_inner());
        assert!(samples.iter().all(|&s| (i32::from(s) - 500).abs() <= 1));
        assert!(gauge.cpu_usage(guild).is_some());
    }
}
