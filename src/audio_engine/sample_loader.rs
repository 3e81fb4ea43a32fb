//! Audio decoding into render-ready sample buffers.
//!
//! This module turns raw audio bytes (any container/codec Symphonia understands) into a
//! [`SampleBuffer`] already matching the output channel count and sample rate, so the
//! render thread only ever copies frames.

use std::io::Cursor;
use std::sync::Arc;
use symphonia::core::{
    audio::SampleBuffer as SymphoniaSampleBuffer, codecs::DecoderOptions,
    errors::Error as SymphoniaError, formats::FormatOptions, io::MediaSourceStream,
    meta::MetadataOptions, probe::Hint,
};
use symphonia::default::{get_codecs, get_probe};

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::audio_engine::channels::map_channels;
use crate::audio_engine::errors::DecodeError;
use crate::messages::SampleBuffer;

/// Decodes in-memory audio data into a sample buffer with the specified output format.
///
/// # Parameters
///
/// - `bytes`: Complete encoded audio data (WAV, FLAC, MP3, OGG, ...)
/// - `extension_hint`: Optional file extension to speed up format probing
/// - `output_channels`: Number of output channels
/// - `output_rate_hz`: Output sample rate in Hz
///
/// # Errors
///
/// - Data not recognized as audio, or corrupt
/// - Missing track, sample rate or channel information
/// - Unsupported channel mapping
/// - Zero decoded frames
pub fn decode_audio_bytes(
    bytes: Vec<u8>,
    extension_hint: Option<&str>,
    output_channels: usize,
    output_rate_hz: u32,
) -> Result<SampleBuffer, DecodeError> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension_hint {
        hint.with_extension(ext);
    }

    let probed = get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let track = format.default_track().ok_or(DecodeError::NoDefaultTrack)?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let file_rate_hz = codec_params
        .sample_rate
        .ok_or(DecodeError::MissingSampleRate)?;
    let file_channels = codec_params
        .channels
        .ok_or(DecodeError::MissingChannels)?
        .count();

    let mut decoder = get_codecs().make(&codec_params, &DecoderOptions::default())?;

    let mut decoded: Vec<f32> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(err) => return Err(DecodeError::Decode(err)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let audio_buf = match decoder.decode(&packet) {
            Ok(audio_buf) => audio_buf,
            Err(SymphoniaError::DecodeError(err)) => {
                log::warn!("Skipping corrupt packet: {err}");
                continue;
            }
            Err(err) => return Err(DecodeError::Decode(err)),
        };
        let spec = *audio_buf.spec();
        let duration = audio_buf.capacity() as u64;

        let mut sample_buf = SymphoniaSampleBuffer::<f32>::new(duration, spec);
        sample_buf.copy_interleaved_ref(audio_buf);
        decoded.extend_from_slice(sample_buf.samples());
    }

    if decoded.len() < file_channels {
        return Err(DecodeError::Empty);
    }

    let mut mapped = map_channels(decoded, file_channels, output_channels)?;
    if file_rate_hz != output_rate_hz {
        mapped = resample_interleaved(&mapped, output_channels, file_rate_hz, output_rate_hz)?;
    }

    log::debug!(
        "Decoded {} frames ({} ch@{} Hz -> {} ch@{} Hz)",
        mapped.len() / output_channels,
        file_channels,
        file_rate_hz,
        output_channels,
        output_rate_hz
    );

    Ok(SampleBuffer {
        channels: output_channels,
        samples: Arc::from(mapped.into_boxed_slice()),
    })
}

/// Converts interleaved audio between sample rates with a windowed-sinc resampler.
///
/// The result starts at the first input frame and holds `ceil(frames * ratio)` frames.
pub fn resample_interleaved(
    samples: &[f32],
    channels: usize,
    from_hz: u32,
    to_hz: u32,
) -> Result<Vec<f32>, DecodeError> {
    let frames = samples.len() / channels;
    if frames == 0 {
        return Err(DecodeError::Empty);
    }

    let ratio = to_hz as f64 / from_hz as f64;
    let expected = (frames as f64 * ratio).ceil() as usize;

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, frames, channels)?;

    let planar: Vec<Vec<f32>> = (0..channels)
        .map(|channel| {
            samples
                .chunks_exact(channels)
                .map(|frame| frame[channel])
                .collect()
        })
        .collect();

    let mut resampled = resampler.process(&planar, None)?;
    let tail = resampler.process_partial::<Vec<f32>>(None, None)?;
    for (channel, rest) in resampled.iter_mut().zip(tail) {
        channel.extend(rest);
    }

    let mut out = Vec::with_capacity(expected * channels);
    for frame in 0..expected {
        for channel in &resampled {
            out.push(channel.get(frame).copied().unwrap_or(0.0));
        }
    }
    Ok(out)
}
