//! Peak/RMS level readout from the playback engine
//!
//! The engine exposes its audio statistics as a structured property whose
//! values are numbers encoded as text (mpv's `af-metadata/astats`). This
//! module turns that loosely-typed bag into a [`PeakSample`].
//!
//! - `meter` - display-side smoothing and peak hold
//! - `mpv_ipc` - a [`PropertySource`] backed by mpv's JSON IPC socket

pub mod meter;
#[cfg(unix)]
pub mod mpv_ipc;

pub use meter::PeakMeter;
#[cfg(unix)]
pub use mpv_ipc::MpvIpcSource;

use crate::error::{BridgeError, Result};
use crate::model::PeakSample;

/// Property holding the astats filter metadata
pub const ASTATS_PROPERTY: &str = "af-metadata/astats";

/// Labelled filter that makes the engine produce [`ASTATS_PROPERTY`]
pub const ASTATS_FILTER: &str = "@astats:astats=metadata=1:reset=1:measure_overall=none";

const LEFT_PEAK_KEY: &str = "lavfi.astats.1.Peak_level";
const RIGHT_PEAK_KEY: &str = "lavfi.astats.2.Peak_level";
const LEFT_RMS_KEY: &str = "lavfi.astats.1.RMS_level";
const RIGHT_RMS_KEY: &str = "lavfi.astats.2.RMS_level";

/// A structured value returned by the engine
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyNode {
    None,
    Flag(bool),
    Int64(i64),
    Double(f64),
    String(String),
    Array(Vec<PropertyNode>),
    /// Key/value pairs in the order the engine reported them
    Map(Vec<(String, PropertyNode)>),
}

impl PropertyNode {
    fn kind(&self) -> &'static str {
        match self {
            PropertyNode::None => "none",
            PropertyNode::Flag(_) => "flag",
            PropertyNode::Int64(_) => "int64",
            PropertyNode::Double(_) => "double",
            PropertyNode::String(_) => "string",
            PropertyNode::Array(_) => "array",
            PropertyNode::Map(_) => "map",
        }
    }
}

/// Backend seam: anything that can be asked for a named property.
///
/// Implementations return [`BridgeError::Unavailable`] when the property does
/// not exist yet. The node is returned by value, so whatever the backend
/// allocated for it is released when the caller drops it.
pub trait PropertySource {
    fn get_property(&self, name: &str) -> Result<PropertyNode>;
}

impl<T: PropertySource + ?Sized> PropertySource for Box<T> {
    fn get_property(&self, name: &str) -> Result<PropertyNode> {
        (**self).get_property(name)
    }
}

impl<T: PropertySource + ?Sized> PropertySource for std::sync::Arc<T> {
    fn get_property(&self, name: &str) -> Result<PropertyNode> {
        (**self).get_property(name)
    }
}

/// Reads per-channel peak and RMS levels from a [`PropertySource`]
pub struct PeakReader<S> {
    source: S,
    property: String,
}

impl<S: PropertySource> PeakReader<S> {
    pub fn new(source: S) -> Self {
        Self::with_property(source, ASTATS_PROPERTY)
    }

    pub fn with_property(source: S, property: impl Into<String>) -> Self {
        Self {
            source,
            property: property.into(),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Read levels, leaving channels the engine did not report at zero
    pub fn read_peaks(&self) -> Result<PeakSample> {
        self.read_peaks_with(PeakSample::default())
    }

    /// Read levels on top of `defaults`.
    ///
    /// Fields whose keys are missing keep their default; this covers the
    /// window right after the filter is inserted, before it has reported
    /// every channel.
    pub fn read_peaks_with(&self, defaults: PeakSample) -> Result<PeakSample> {
        let node = self.source.get_property(&self.property)?;
        extract_peaks(&node, defaults)
    }

    /// Levels for a meter: silence when not playing or when the read fails
    pub fn read_peaks_or_silence(&self, playing: bool) -> PeakSample {
        if !playing {
            return PeakSample::SILENCE;
        }
        match self.read_peaks() {
            Ok(sample) => sample,
            Err(e) => {
                tracing::trace!("Peak read failed: {}", e);
                PeakSample::SILENCE
            }
        }
    }
}

/// Pull the four level fields out of an astats metadata map.
///
/// Works on a copy of `defaults`, so an error leaves nothing half-written.
pub fn extract_peaks(node: &PropertyNode, defaults: PeakSample) -> Result<PeakSample> {
    let PropertyNode::Map(entries) = node else {
        return Err(BridgeError::FormatMismatch(format!(
            "expected map, got {}",
            node.kind()
        )));
    };

    let mut sample = defaults;
    let mut found = 0;
    for (key, value) in entries {
        if found == 4 {
            break;
        }
        let slot = match key.as_str() {
            LEFT_PEAK_KEY => &mut sample.left_peak,
            RIGHT_PEAK_KEY => &mut sample.right_peak,
            LEFT_RMS_KEY => &mut sample.left_rms,
            RIGHT_RMS_KEY => &mut sample.right_rms,
            _ => continue,
        };
        let PropertyNode::String(text) = value else {
            return Err(BridgeError::FormatMismatch(format!(
                "{} is {}, expected string",
                key,
                value.kind()
            )));
        };
        *slot = parse_level(text);
        found += 1;
    }

    if found < 4 {
        tracing::trace!("Astats reported {} of 4 level keys", found);
    }
    Ok(sample)
}

/// Lenient text-to-float: the longest numeric prefix, or 0.0
pub fn parse_level(text: &str) -> f64 {
    let text = text.trim_start();
    if let Ok(v) = text.trim_end().parse::<f64>() {
        return v;
    }

    let bytes = text.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut digits = end - int_start;
    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        digits += frac_end - frac_start;
        if digits > 0 {
            end = frac_end;
        }
    }
    if digits == 0 {
        return 0.0;
    }
    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }
    text[..end].parse().unwrap_or(0.0)
}
