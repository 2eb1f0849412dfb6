//! Local WAV concatenation against the artifact storage root.

use async_trait::async_trait;
use chrono::Local;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::fs;
use std::path::{Path, PathBuf};

use crate::backend::{RenderError, StitchOutcome, Stitcher};
use crate::error::PodcastError;

/// Extensions the rendering collaborators write artifacts with.
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "aac", "opus", "flac", "m4a"];

const MAX_GAP_SECONDS: f32 = 60.0;

/// Stitches `{segment_id}.wav` artifacts from the storage root into one file.
#[derive(Debug, Clone)]
pub struct LocalWavStitcher {
    root: PathBuf,
    output: PathBuf,
    gap_seconds: f32,
}

impl LocalWavStitcher {
    pub fn new(root: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            output: output.into(),
            gap_seconds: 0.0,
        }
    }

    pub fn with_gap(mut self, gap_seconds: f32) -> Self {
        self.gap_seconds = gap_seconds.clamp(0.0, MAX_GAP_SECONDS);
        self
    }

    /// Artifacts to merge, in order. Ids with no file are skipped.
    fn source_files(&self, segment_ids: Option<&[String]>) -> Result<Vec<String>, RenderError> {
        if !self.root.is_dir() {
            return Err(RenderError::rejected(
                404,
                "Audio storage directory not found",
                Some(self.root.display().to_string()),
            ));
        }

        let entries = fs::read_dir(&self.root)
            .map_err(|e| RenderError::fault(format!("Failed to list storage: {}", e)))?;
        let mut audio: Vec<String> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| audio_extension(name).is_some())
            .collect();
        audio.sort();

        let files = match segment_ids {
            Some(ids) => {
                let files: Vec<String> = ids
                    .iter()
                    .filter_map(|id| artifact_for(&audio, id))
                    .collect();
                if files.is_empty() {
                    return Err(RenderError::rejected(
                        404,
                        "No matching audio files found for provided segment_ids",
                        None,
                    ));
                }
                files
            }
            None => {
                if audio.is_empty() {
                    return Err(RenderError::rejected(
                        404,
                        "No audio files found in storage directory",
                        None,
                    ));
                }
                audio
            }
        };

        Ok(files)
    }

    fn stitch_blocking(
        &self,
        episode_name: &str,
        segment_ids: Option<&[String]>,
    ) -> Result<StitchOutcome, RenderError> {
        if episode_name.trim().is_empty() {
            return Err(RenderError::rejected(
                400,
                "Invalid episode_name. Must be a non-empty string.",
                None,
            ));
        }

        let source_files = self.source_files(segment_ids)?;
        if let Some(other) = source_files.iter().find(|f| audio_extension(f) != Some("wav")) {
            return Err(RenderError::rejected(
                415,
                "Unsupported audio format for local stitching",
                Some(format!(
                    "{} is not WAV; configure [stitch] url to use a remote stitcher",
                    other
                )),
            ));
        }
        let paths: Vec<PathBuf> = source_files.iter().map(|f| self.root.join(f)).collect();

        fs::create_dir_all(&self.output)
            .map_err(|e| RenderError::fault(format!("Failed to create output directory: {}", e)))?;

        let filename = output_filename(episode_name, &Local::now().format("%Y-%m-%d").to_string());
        let filepath = self.output.join(&filename);

        concat_wav_files(&paths, &filepath, self.gap_seconds).map_err(|e| match e {
            PodcastError::StitchError(message) => RenderError::rejected(422, message, None),
            other => RenderError::rejected(500, "Failed to stitch audio files", Some(other.to_string())),
        })?;

        let size = fs::metadata(&filepath)
            .map_err(|e| RenderError::fault(format!("Failed to stat output: {}", e)))?
            .len();

        tracing::info!(
            file = %filepath.display(),
            files = source_files.len(),
            size,
            "stitched episode"
        );

        Ok(StitchOutcome {
            filename,
            filepath: filepath.display().to_string(),
            size,
            files_stitched: source_files.len(),
            source_files,
        })
    }
}

#[async_trait]
impl Stitcher for LocalWavStitcher {
    async fn stitch(
        &self,
        episode_name: &str,
        segment_ids: Option<&[String]>,
    ) -> Result<StitchOutcome, RenderError> {
        let stitcher = self.clone();
        let episode_name = episode_name.to_string();
        let segment_ids = segment_ids.map(<[String]>::to_vec);

        tokio::task::spawn_blocking(move || {
            stitcher.stitch_blocking(&episode_name, segment_ids.as_deref())
        })
        .await
        .map_err(|e| RenderError::fault(format!("Stitch task failed: {}", e)))?
    }
}

/// Concatenate WAV files sharing one format, with `gap_seconds` of silence
/// between them.
pub fn concat_wav_files(inputs: &[PathBuf], output: &Path, gap_seconds: f32) -> Result<(), PodcastError> {
    let Some(first) = inputs.first() else {
        return Err(PodcastError::StitchError("No input files to stitch".to_string()));
    };

    let spec = WavReader::open(first)?.spec();
    let gap_frames = (gap_seconds.clamp(0.0, MAX_GAP_SECONDS) * spec.sample_rate as f32) as usize;
    let gap_samples = gap_frames.saturating_mul(spec.channels as usize);

    let mut writer = WavWriter::create(output, spec)?;

    for (i, path) in inputs.iter().enumerate() {
        let mut reader = WavReader::open(path)?;
        if !same_format(&reader.spec(), &spec) {
            return Err(PodcastError::StitchError(format!(
                "{} does not match the format of {}",
                path.display(),
                first.display()
            )));
        }

        if i > 0 {
            write_silence(&mut writer, &spec, gap_samples)?;
        }

        match spec.sample_format {
            SampleFormat::Float => {
                for sample in reader.samples::<f32>() {
                    writer.write_sample(sample?)?;
                }
            }
            SampleFormat::Int => {
                for sample in reader.samples::<i32>() {
                    writer.write_sample(sample?)?;
                }
            }
        }
    }

    writer.finalize()?;
    Ok(())
}

fn audio_extension(name: &str) -> Option<&'static str> {
    let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
    AUDIO_EXTENSIONS.iter().copied().find(|known| *known == ext)
}

/// The stored artifact for `id`, preferring one that can be stitched locally.
fn artifact_for(audio: &[String], id: &str) -> Option<String> {
    let candidates: Vec<&String> = audio
        .iter()
        .filter(|name| Path::new(name.as_str()).file_stem().and_then(|s| s.to_str()) == Some(id))
        .collect();
    candidates
        .iter()
        .find(|name| audio_extension(name) == Some("wav"))
        .or_else(|| candidates.first())
        .map(|name| name.to_string())
}

fn same_format(a: &WavSpec, b: &WavSpec) -> bool {
    a.channels == b.channels
        && a.sample_rate == b.sample_rate
        && a.bits_per_sample == b.bits_per_sample
        && a.sample_format == b.sample_format
}

fn write_silence<W>(writer: &mut WavWriter<W>, spec: &WavSpec, samples: usize) -> Result<(), PodcastError>
where
    W: std::io::Write + std::io::Seek,
{
    for _ in 0..samples {
        match spec.sample_format {
            SampleFormat::Float => writer.write_sample(0.0f32)?,
            SampleFormat::Int => writer.write_sample(0i32)?,
        }
    }
    Ok(())
}

/// `{slug}-{date}.wav`
pub fn output_filename(episode_name: &str, date: &str) -> String {
    let slug = slugify(episode_name);
    let slug = if slug.is_empty() { "episode".to_string() } else { slug };
    format!("{}-{}.wav", slug, date)
}

/// Lowercase, dash-separated, word characters only.
pub fn slugify(text: &str) -> String {
    let lowered = text.trim().to_lowercase();

    let dashed = regex::Regex::new(r"\s+")
        .map(|re| re.replace_all(&lowered, "-").into_owned())
        .unwrap_or(lowered);
    let cleaned: String = dashed
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    let collapsed = regex::Regex::new(r"-{2,}")
        .map(|re| re.replace_all(&cleaned, "-").into_owned())
        .unwrap_or(cleaned);

    collapsed.trim_matches('-').to_string()
}
