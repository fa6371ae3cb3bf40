use crate::error::{Result, StemError};

use anyhow::anyhow;
use std::{fs::File, path::Path};
use symphonia::core::{
    formats::FormatOptions, io::MediaSourceStream, meta::MetadataOptions, probe::Hint,
};

/// Assumed duration when the input cannot be inspected.
pub const FALLBACK_DURATION_SECS: f64 = 180.0;

/// Duration of an audio file in seconds.
///
/// WAV headers are read with hound; other containers go through symphonia's probe.
pub fn duration_secs(path: &Path) -> Result<f64> {
    let is_wav = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("wav"))
        .unwrap_or(false);

    if is_wav {
        if let Ok(reader) = hound::WavReader::open(path) {
            let spec = reader.spec();
            if spec.sample_rate > 0 {
                return Ok(reader.duration() as f64 / spec.sample_rate as f64);
            }
        }
    }

    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| StemError::Anyhow(anyhow!("unsupported audio format: {}", e)))?;

    let track = probed
        .format
        .default_track()
        .ok_or_else(|| anyhow!("no audio track in {}", path.display()))?;
    let params = &track.codec_params;
    match (params.n_frames, params.sample_rate) {
        (Some(frames), Some(rate)) if rate > 0 => Ok(frames as f64 / rate as f64),
        _ => Err(anyhow!("unknown length for {}", path.display()).into()),
    }
}

/// Like [`duration_secs`], falling back to [`FALLBACK_DURATION_SECS`].
pub fn duration_or_default(path: &Path) -> f64 {
    match duration_secs(path) {
        Ok(d) => d,
        Err(e) => {
            log::debug!("could not read duration of {}: {}", path.display(), e);
            FALLBACK_DURATION_SECS
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, seconds: u32, rate: u32) {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut w = hound::WavWriter::create(path, spec).unwrap();
        for _ in 0..(seconds * rate * 2) {
            w.write_sample(0i16).unwrap();
        }
        w.finalize().unwrap();
    }

    #[test]
    fn reads_wav_duration() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("tone.wav");
        write_wav(&p, 2, 8000);
        assert!((duration_secs(&p).unwrap() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn unreadable_input_uses_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("noise.mp3");
        std::fs::write(&p, b"definitely not audio").unwrap();
        assert_eq!(duration_or_default(&p), FALLBACK_DURATION_SECS);
        assert_eq!(duration_or_default(&dir.path().join("missing.wav")), FALLBACK_DURATION_SECS);
    }
}
