//! Audio file reading and writing
//!
//! WAV goes through `hound`; any other container is probed and decoded with
//! `symphonia`. Everything is downmixed to mono and brought to the analysis
//! sample rate before it reaches the pipeline.

use log::{debug, warn};
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::dataset::TrackEntry;
use crate::error::{UnmixError, UnmixResult};
use crate::target::{Target, TrackReferences};

/// Decoded audio before downmix and resampling
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Samples per channel
    pub channels: Vec<Vec<f64>>,

    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn num_samples(&self) -> usize {
        self.channels.iter().map(Vec::len).min().unwrap_or(0)
    }

    /// Average of all channels
    pub fn to_mono(&self) -> Vec<f64> {
        match self.channels.len() {
            0 => Vec::new(),
            1 => self.channels[0].clone(),
            n => {
                let scale = 1.0 / n as f64;
                (0..self.num_samples())
                    .map(|i| self.channels.iter().map(|ch| ch[i]).sum::<f64>() * scale)
                    .collect()
            }
        }
    }
}

/// Decode `path` without changing channel layout or rate
pub fn decode<P: AsRef<Path>>(path: P) -> UnmixResult<DecodedAudio> {
    let path = path.as_ref();
    let is_wav = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("wav"))
        .unwrap_or(false);

    if is_wav {
        decode_wav(path)
    } else {
        decode_symphonia(path)
    }
}

/// Read `path` as mono at `sample_rate`
pub fn read_mono<P: AsRef<Path>>(path: P, sample_rate: u32) -> UnmixResult<Vec<f64>> {
    let path = path.as_ref();
    let audio = decode(path)?;
    let mono = audio.to_mono();
    if audio.sample_rate == sample_rate {
        return Ok(mono);
    }
    debug!(
        "resampling {} from {} Hz to {} Hz",
        path.display(),
        audio.sample_rate,
        sample_rate
    );
    Ok(resample_linear(&mono, audio.sample_rate, sample_rate))
}

/// Write a mono signal as 32-bit float WAV
pub fn write_mono<P: AsRef<Path>>(path: P, signal: &[f64], sample_rate: u32) -> UnmixResult<()> {
    let path = path.as_ref();
    let write_err = |e: hound::Error| UnmixError::Write(format!("{}: {}", path.display(), e));

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec).map_err(write_err)?;
    for &sample in signal {
        writer.write_sample(sample as f32).map_err(write_err)?;
    }
    writer.finalize().map_err(write_err)?;
    Ok(())
}

/// Linear-interpolation resampling
pub fn resample_linear(signal: &[f64], from_rate: u32, to_rate: u32) -> Vec<f64> {
    if from_rate == to_rate || signal.is_empty() || from_rate == 0 {
        return signal.to_vec();
    }
    let ratio = to_rate as f64 / from_rate as f64;
    let new_len = (signal.len() as f64 * ratio) as usize;

    (0..new_len)
        .map(|i| {
            let src_pos = i as f64 / ratio;
            let src_idx = src_pos.floor() as usize;
            let frac = src_pos - src_idx as f64;
            match (signal.get(src_idx), signal.get(src_idx + 1)) {
                (Some(&a), Some(&b)) => a * (1.0 - frac) + b * frac,
                (Some(&a), None) => a,
                _ => 0.0,
            }
        })
        .collect()
}

fn decode_wav(path: &Path) -> UnmixResult<DecodedAudio> {
    let load_err = |e: hound::Error| UnmixError::Load(format!("{}: {}", path.display(), e));

    let reader = hound::WavReader::open(path).map_err(load_err)?;
    let spec = reader.spec();
    let num_channels = spec.channels.max(1) as usize;

    let samples: Vec<f64> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .map(|s| s.map(f64::from))
            .collect::<Result<_, _>>()
            .map_err(load_err)?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f64;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f64 / scale))
                .collect::<Result<_, _>>()
                .map_err(load_err)?
        }
    };

    Ok(DecodedAudio {
        channels: deinterleave(&samples, num_channels),
        sample_rate: spec.sample_rate,
    })
}

fn decode_symphonia(path: &Path) -> UnmixResult<DecodedAudio> {
    let load_err = |e: SymphoniaError| UnmixError::Load(format!("{}: {}", path.display(), e));

    let file = std::fs::File::open(path)
        .map_err(|e| UnmixError::Load(format!("{}: {}", path.display(), e)))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(load_err)?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| UnmixError::Load(format!("{}: no audio track", path.display())))?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| UnmixError::Load(format!("{}: unknown sample rate", path.display())))?;
    let num_channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(1).max(1);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(load_err)?;

    let mut interleaved: Vec<f64> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(load_err(e)),
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let mut buffer = SampleBuffer::<f64>::new(decoded.capacity() as u64, *decoded.spec());
                buffer.copy_interleaved_ref(decoded);
                interleaved.extend_from_slice(buffer.samples());
            }
            Err(SymphoniaError::DecodeError(e)) => {
                warn!("{}: skipping corrupt packet ({})", path.display(), e);
            }
            Err(e) => return Err(load_err(e)),
        }
    }

    Ok(DecodedAudio {
        channels: deinterleave(&interleaved, num_channels),
        sample_rate,
    })
}

fn deinterleave(samples: &[f64], num_channels: usize) -> Vec<Vec<f64>> {
    let frames = samples.len() / num_channels;
    let mut channels = vec![Vec::with_capacity(frames); num_channels];
    for frame in samples.chunks_exact(num_channels) {
        for (channel, &sample) in channels.iter_mut().zip(frame) {
            channel.push(sample);
        }
    }
    channels
}

/// Mixture and references of one track, mono at the analysis rate
#[derive(Debug, Clone)]
pub struct TrackAudio {
    pub mixture: Vec<f64>,
    pub references: TrackReferences,
}

/// Source of per-track audio for the evaluator
pub trait TrackLoader: Send + Sync {
    /// Load the mixture and one reference per target
    fn load(&self, track: &TrackEntry, targets: &[Target], sample_rate: u32) -> UnmixResult<TrackAudio>;
}

/// Reads `mixture.wav` and `<target>.wav` from the track directory
#[derive(Debug, Clone, Copy, Default)]
pub struct WavTrackLoader;

impl TrackLoader for WavTrackLoader {
    fn load(&self, track: &TrackEntry, targets: &[Target], sample_rate: u32) -> UnmixResult<TrackAudio> {
        let mixture = read_mono(track.mixture_path(), sample_rate)?;
        let mut references = TrackReferences::new();
        for &target in targets {
            references.insert(target, read_mono(track.source_path(target), sample_rate)?);
        }
        Ok(TrackAudio { mixture, references })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tempfile::TempDir;

    fn write_int_wav(path: &Path, channels: u16, sample_rate: u32, frames: &[[i16; 2]]) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for frame in frames {
            for &s in &frame[..channels as usize] {
                writer.write_sample(s).unwrap();
            }
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_float_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tone.wav");
        let signal: Vec<f64> = (0..100).map(|i| (i as f64 * 0.1).sin() * 0.5).collect();

        write_mono(&path, &signal, 22050).unwrap();
        let loaded = read_mono(&path, 22050).unwrap();

        assert_eq!(loaded.len(), signal.len());
        for (a, b) in loaded.iter().zip(signal.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_int_scaling_and_downmix() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stereo.wav");
        write_int_wav(&path, 2, 8000, &[[16384, 0], [-32768, -32768], [0, 16384]]);

        let mono = read_mono(&path, 8000).unwrap();
        assert_eq!(mono.len(), 3);
        assert_relative_eq!(mono[0], 0.25, epsilon = 1e-12);
        assert_relative_eq!(mono[1], -1.0, epsilon = 1e-12);
        assert_relative_eq!(mono[2], 0.25, epsilon = 1e-12);
    }

    #[test]
    fn test_read_resamples() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("low.wav");
        write_mono(&path, &vec![0.5; 100], 11025).unwrap();

        let loaded = read_mono(&path, 22050).unwrap();
        assert_eq!(loaded.len(), 200);
        assert!(loaded.iter().all(|&s| (s - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_resample_linear_interpolates() {
        let up = resample_linear(&[0.0, 1.0, 2.0], 1, 2);
        assert_eq!(up.len(), 6);
        assert_relative_eq!(up[1], 0.5, epsilon = 1e-12);
        assert_relative_eq!(up[5], 2.0, epsilon = 1e-12);

        let same = resample_linear(&[1.0, 2.0], 44100, 44100);
        assert_eq!(same, vec![1.0, 2.0]);
    }

    #[test]
    fn test_missing_file_is_load_error() {
        let result = read_mono("/nonexistent/mixture.wav", 44100);
        assert!(matches!(result, Err(UnmixError::Load(_))));
    }

    #[test]
    fn test_write_into_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let result = write_mono(dir.path().join("missing/out.wav"), &[0.0], 44100);
        assert!(matches!(result, Err(UnmixError::Write(_))));
    }

    #[test]
    fn test_wav_track_loader() {
        let dir = TempDir::new().unwrap();
        let track = TrackEntry::new("song", dir.path());
        write_mono(track.mixture_path(), &[0.1; 32], 8000).unwrap();
        for target in Target::PRIORITY {
            write_mono(track.source_path(target), &[0.025; 32], 8000).unwrap();
        }

        let audio = WavTrackLoader.load(&track, &Target::PRIORITY, 8000).unwrap();
        assert_eq!(audio.mixture.len(), 32);
        assert_eq!(audio.references.len(), 4);
    }

    #[test]
    fn test_wav_track_loader_missing_stem() {
        let dir = TempDir::new().unwrap();
        let track = TrackEntry::new("song", dir.path());
        write_mono(track.mixture_path(), &[0.1; 32], 8000).unwrap();

        let result = WavTrackLoader.load(&track, &[Target::Vocals], 8000);
        assert!(matches!(result, Err(UnmixError::Load(_))));
    }
}
