//! Model sources, stem name resolution and the output manifest
//!
//! The model always produces four sources. A requested stem resolves to one
//! of them, or to a sum of several:
//!
//! | requested              | output name       | sources              |
//! |------------------------|-------------------|----------------------|
//! | vocal, vocals          | `vocals`          | vocals               |
//! | drums                  | `drums`           | drums                |
//! | bass                   | `bass`            | bass                 |
//! | instrumental           | `instrumental`    | drums + bass + other |
//! | guitar, piano, other   | requested name    | other                |
//!
//! Guitar and piano are not isolated by a 4-source model; they alias `other`.

use std::path::{Path, PathBuf};

use ndarray::Array2;
use serde::ser::{Serialize, SerializeMap, Serializer};

use super::audio::AudioBuffer;
use super::error::{Result, SeparationError};

/// One of the model's output channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    Drums,
    Bass,
    Other,
    Vocals,
}

impl Source {
    pub const ALL: [Source; 4] = [Source::Drums, Source::Bass, Source::Other, Source::Vocals];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Drums => "drums",
            Self::Bass => "bass",
            Self::Other => "other",
            Self::Vocals => "vocals",
        }
    }

    /// Position in a [`SeparationResult`]
    pub(crate) fn index(&self) -> usize {
        match self {
            Self::Drums => 0,
            Self::Bass => 1,
            Self::Other => 2,
            Self::Vocals => 3,
        }
    }
}

/// The four separated sources, all sharing one shape and sample rate
#[derive(Debug, Clone)]
pub struct SeparationResult {
    sources: [AudioBuffer; 4],
}

impl SeparationResult {
    /// Build from per-source buffers, keyed by [`Source`]
    pub fn new(
        drums: AudioBuffer,
        bass: AudioBuffer,
        other: AudioBuffer,
        vocals: AudioBuffer,
    ) -> Result<Self> {
        let sources = [drums, bass, other, vocals];
        let first = &sources[0];
        for (source, buffer) in Source::ALL.iter().zip(&sources) {
            if buffer.samples().dim() != first.samples().dim()
                || buffer.sample_rate() != first.sample_rate()
            {
                return Err(SeparationError::SeparationFailed(format!(
                    "Source {} has shape {:?} @ {}Hz, expected {:?} @ {}Hz",
                    source.name(),
                    buffer.samples().dim(),
                    buffer.sample_rate(),
                    first.samples().dim(),
                    first.sample_rate()
                )));
            }
        }
        Ok(Self { sources })
    }

    pub fn get(&self, source: Source) -> &AudioBuffer {
        &self.sources[source.index()]
    }

    /// Sum the given sources sample by sample
    pub fn mix(&self, sources: &[Source]) -> AudioBuffer {
        let first = &self.sources[0];
        let mut sum = Array2::<f32>::zeros(first.samples().dim());
        for source in sources {
            sum += self.get(*source).samples();
        }
        AudioBuffer::new(sum, first.sample_rate())
    }

    pub fn sample_rate(&self) -> u32 {
        self.sources[0].sample_rate()
    }

    /// Samples per channel
    pub fn frames(&self) -> usize {
        self.sources[0].frames()
    }
}

/// A recognized stem request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StemRequest {
    /// Name used for the output file and manifest key
    pub output_name: String,
    /// Sources summed to produce the stem
    pub sources: &'static [Source],
}

impl StemRequest {
    /// Resolve a requested name (case-insensitive); `None` for unknown stems
    pub fn resolve(requested: &str) -> Option<Self> {
        let lower = requested.trim().to_lowercase();
        let (output_name, sources): (&str, &'static [Source]) = match lower.as_str() {
            "vocal" | "vocals" => ("vocals", &[Source::Vocals]),
            "drums" => ("drums", &[Source::Drums]),
            "bass" => ("bass", &[Source::Bass]),
            "instrumental" => ("instrumental", &[Source::Drums, Source::Bass, Source::Other]),
            "guitar" | "piano" | "other" => (lower.as_str(), &[Source::Other]),
            _ => return None,
        };
        Some(Self {
            output_name: output_name.to_string(),
            sources,
        })
    }

    /// File this stem is written to inside `output_dir`
    pub fn output_path(&self, output_dir: &Path) -> PathBuf {
        output_dir.join(format!("{}.wav", self.output_name))
    }

    /// Render the stem from separated sources
    pub fn render(&self, result: &SeparationResult) -> AudioBuffer {
        match self.sources {
            [single] => result.get(*single).clone(),
            many => result.mix(many),
        }
    }
}

/// Stem name → written file, in the order the stems were written
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputManifest {
    entries: Vec<(String, PathBuf)>,
}

impl OutputManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a written stem, replacing an earlier entry with the same name
    pub fn insert(&mut self, stem: impl Into<String>, path: PathBuf) {
        let stem = stem.into();
        match self.entries.iter_mut().find(|(name, _)| *name == stem) {
            Some(entry) => entry.1 = path,
            None => self.entries.push((stem, path)),
        }
    }

    pub fn get(&self, stem: &str) -> Option<&Path> {
        self.entries
            .iter()
            .find(|(name, _)| name == stem)
            .map(|(_, path)| path.as_path())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.entries
            .iter()
            .map(|(name, path)| (name.as_str(), path.as_path()))
    }

    pub fn stems(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }
}

impl Serialize for OutputManifest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, path) in self.iter() {
            map.serialize_entry(name, &path.to_string_lossy())?;
        }
        map.end()
    }
}
