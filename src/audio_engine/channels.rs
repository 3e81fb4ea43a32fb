use crate::audio_engine::errors::DecodeError;

/// Maps interleaved audio from one channel layout to another.
///
/// Currently supports:
/// - Same channel count: no conversion needed
/// - Mono → N channels: duplicates the mono signal to every channel
/// - N channels → Mono: averages each frame
/// - N → M channels with M < N: keeps the first M channels
///
/// # Errors
///
/// [`DecodeError::UnsupportedChannels`] for zero channels or for up-mixing anything
/// other than mono.
pub fn map_channels(
    samples: Vec<f32>,
    file_channels: usize,
    output_channels: usize,
) -> Result<Vec<f32>, DecodeError> {
    if file_channels == 0 || output_channels == 0 {
        return Err(DecodeError::UnsupportedChannels {
            file_channels,
            output_channels,
        });
    }

    if file_channels == output_channels {
        return Ok(samples);
    }

    match (file_channels, output_channels) {
        // Mono → N: duplicate each sample
        (1, n) => {
            let mut out = Vec::with_capacity(samples.len() * n);
            for s in samples {
                out.extend(std::iter::repeat_n(s, n));
            }
            Ok(out)
        }
        // N → Mono: average each frame
        (n, 1) => {
            let scale = 1.0 / n as f32;
            Ok(samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() * scale)
                .collect())
        }
        // N → fewer: truncate each frame
        (n, m) if m < n => {
            let mut out = Vec::with_capacity(samples.len() / n * m);
            for frame in samples.chunks_exact(n) {
                out.extend_from_slice(&frame[..m]);
            }
            Ok(out)
        }
        _ => Err(DecodeError::UnsupportedChannels {
            file_channels,
            output_channels,
        }),
    }
}
