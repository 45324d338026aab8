use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("WAV decode error: {0}")]
    Wav(#[from] hound::Error),
    #[error("FLAC decode error: {0}")]
    Flac(#[from] claxon::Error),
    #[error("No audio samples in {0}")]
    Empty(String),
}

/// Mono samples ready for fingerprinting.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl DecodedAudio {
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Load a local audio file and down-mix it to mono f32 in [-1, 1].
pub fn load_audio(path: &Path) -> Result<DecodedAudio, DecodeError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let audio = match ext.as_str() {
        "wav" => load_wav(path)?,
        "flac" => load_flac(path)?,
        other => return Err(DecodeError::UnsupportedFormat(other.to_string())),
    };

    if audio.samples.is_empty() || audio.sample_rate == 0 {
        return Err(DecodeError::Empty(path.display().to_string()));
    }

    log::debug!(
        "Decoded {}: {:.1}s @ {} Hz, {} channel(s)",
        path.display(),
        audio.duration_secs(),
        audio.sample_rate,
        audio.channels
    );
    Ok(audio)
}

fn load_wav(path: &Path) -> Result<DecodedAudio, DecodeError> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = int_scale(spec.bits_per_sample as u32);
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };

    Ok(DecodedAudio {
        samples: to_mono(&interleaved, spec.channels as usize),
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    })
}

fn load_flac(path: &Path) -> Result<DecodedAudio, DecodeError> {
    let mut reader = claxon::FlacReader::open(path)?;
    let info = reader.streaminfo();
    let scale = int_scale(info.bits_per_sample);

    let interleaved: Vec<f32> = reader
        .samples()
        .map(|s| s.map(|v| v as f32 / scale))
        .collect::<Result<_, _>>()?;

    Ok(DecodedAudio {
        samples: to_mono(&interleaved, info.channels as usize),
        sample_rate: info.sample_rate,
        channels: info.channels as u16,
    })
}

fn int_scale(bits: u32) -> f32 {
    (1u64 << (bits.clamp(1, 32) - 1)) as f32
}

fn to_mono(input: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return input.to_vec();
    }
    input
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}
