//! Model management for stem separation
//!
//! Handles downloading, caching, and locating ONNX models for audio separation.
//! Models are downloaded on first use and cached locally.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::config::ModelType;
use super::error::{Result, SeparationError};

/// Download progress callback (0.0 to 1.0)
pub type DownloadProgress = Box<dyn Fn(f32) + Send>;

/// Manages model downloads and caching
pub struct ModelManager {
    /// Directory where models are cached
    cache_dir: PathBuf,
}

impl ModelManager {
    /// Create a new ModelManager with the default cache directory
    ///
    /// Default location: `~/.cache/stemsep/models/`
    pub fn new() -> Result<Self> {
        let cache_dir = Self::default_cache_dir()?;
        Ok(Self { cache_dir })
    }

    /// Create a ModelManager with a custom cache directory
    pub fn with_cache_dir(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    fn default_cache_dir() -> Result<PathBuf> {
        let base = dirs::cache_dir().ok_or_else(|| {
            SeparationError::InvalidConfig("Could not determine cache directory".to_string())
        })?;
        Ok(base.join("stemsep").join("models"))
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Cached model path, fetching any missing file first
    ///
    /// `progress` runs from 0.0 to 1.0 over the whole fetch. Byte progress is
    /// only reported for the last missing file, which for models with external
    /// data is the weights file and makes up nearly all of the transfer.
    pub fn ensure_model(
        &self,
        model: ModelType,
        progress: Option<DownloadProgress>,
    ) -> Result<PathBuf> {
        let progress = progress.as_deref();
        let missing: Vec<(&'static str, PathBuf)> = self
            .files(model)
            .into_iter()
            .filter(|(_, path)| !path.exists())
            .collect();

        let Some(((last_url, last_path), leading)) = missing.split_last() else {
            log::info!("{} is cached in {:?}", model.display_name(), self.cache_dir);
            if let Some(cb) = progress {
                cb(1.0);
            }
            return Ok(self.model_path(model));
        };

        log::info!(
            "Fetching {} file(s) for {} into {:?}",
            missing.len(),
            model.display_name(),
            self.cache_dir
        );

        for (url, path) in leading {
            self.download_file(url, path, None)?;
        }

        // Small leading files account for the first 2%
        let offset = if leading.is_empty() { 0.0 } else { 0.02 };
        if let Some(cb) = progress.filter(|_| !leading.is_empty()) {
            cb(offset);
        }
        let scaled = progress.map(|cb| move |p: f32| cb(offset + p * (1.0 - offset)));
        self.download_file(
            last_url,
            last_path,
            scaled.as_ref().map(|f| f as &dyn Fn(f32)),
        )?;

        Ok(self.model_path(model))
    }

    /// Every file a model needs in the cache, paired with where it comes from
    fn files(&self, model: ModelType) -> Vec<(&'static str, PathBuf)> {
        let mut files = vec![(model.download_url(), self.model_path(model))];
        if model.has_external_data() {
            files.push((model.data_download_url(), self.data_path(model)));
        }
        files
    }

    /// Cache location of the `.onnx.data` weights
    pub fn data_path(&self, model: ModelType) -> PathBuf {
        self.cache_dir.join(model.data_filename())
    }

    /// Cache location of the `.onnx` graph
    pub fn model_path(&self, model: ModelType) -> PathBuf {
        self.cache_dir.join(model.filename())
    }

    /// True when every file of `model` is in the cache
    pub fn is_model_available(&self, model: ModelType) -> bool {
        self.files(model).iter().all(|(_, path)| path.exists())
    }

    /// Stream `url` into `target_path` via a `.tmp` sibling, renamed on success
    fn download_file(
        &self,
        url: &str,
        target_path: &Path,
        progress: Option<&dyn Fn(f32)>,
    ) -> Result<()> {
        fs::create_dir_all(&self.cache_dir)?;
        let temp_path = target_path.with_extension("tmp");

        log::info!("GET {} -> {:?}", url, temp_path);

        let response = ureq::get(url)
            .call()
            .map_err(|e| SeparationError::ModelDownloadFailed(format!("{}: {}", url, e)))?;

        let content_length: Option<u64> = response
            .header("Content-Length")
            .and_then(|s| s.parse().ok());

        let mut sink = ProgressWriter {
            inner: fs::File::create(&temp_path)?,
            written: 0,
            total: content_length,
            progress,
        };
        let copied = io::copy(&mut response.into_reader(), &mut sink);
        let flushed = copied.and_then(|n| sink.flush().map(|_| n));
        drop(sink);

        let received = match flushed {
            Ok(n) => n,
            Err(e) => {
                fs::remove_file(&temp_path).ok();
                return Err(SeparationError::ModelDownloadFailed(format!(
                    "Transfer of {} interrupted: {}",
                    url, e
                )));
            }
        };

        if let Some(expected) = content_length.filter(|&len| len != received) {
            fs::remove_file(&temp_path).ok();
            return Err(SeparationError::ModelDownloadFailed(format!(
                "Truncated transfer of {}: {} of {} bytes",
                url, received, expected
            )));
        }

        fs::rename(&temp_path, target_path)?;
        log::info!("Stored {:?} ({} bytes)", target_path, received);

        if let Some(cb) = progress {
            cb(1.0);
        }
        Ok(())
    }

    /// Remove every cached file of `model`; absent files are ignored
    pub fn delete_model(&self, model: ModelType) -> Result<()> {
        for (_, path) in self.files(model) {
            match fs::remove_file(&path) {
                Ok(()) => log::info!("Removed {:?}", path),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Bytes used by the cached files of all known models
    pub fn cache_size(&self) -> u64 {
        ModelType::all()
            .iter()
            .flat_map(|model| self.files(*model))
            .filter_map(|(_, path)| fs::metadata(path).ok())
            .map(|meta| meta.len())
            .sum()
    }

    pub fn clear_cache(&self) -> Result<()> {
        ModelType::all()
            .iter()
            .try_for_each(|model| self.delete_model(*model))
    }
}

/// File writer that reports byte progress against an expected total
struct ProgressWriter<'a, W: Write> {
    inner: W,
    written: u64,
    total: Option<u64>,
    progress: Option<&'a dyn Fn(f32)>,
}

impl<W: Write> Write for ProgressWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        if let (Some(cb), Some(total)) = (self.progress, self.total) {
            // Capped until the size check passes
            cb((self.written as f32 / total as f32).min(0.99));
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_model_path() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ModelManager::with_cache_dir(dir.path().to_path_buf());

        let path = manager.model_path(ModelType::HtDemucs);
        assert_eq!(path, dir.path().join("htdemucs.onnx"));
        assert_eq!(
            manager.data_path(ModelType::HtDemucs),
            dir.path().join("htdemucs.onnx.data")
        );
    }

    #[test]
    fn test_is_model_available_false() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ModelManager::with_cache_dir(dir.path().join("empty"));

        assert!(!manager.is_model_available(ModelType::HtDemucs));
        assert_eq!(manager.cache_size(), 0);
    }

    #[test]
    fn test_cached_model_is_not_downloaded() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ModelManager::with_cache_dir(dir.path().to_path_buf());
        fs::write(manager.model_path(ModelType::HtDemucs), b"graph").unwrap();
        fs::write(manager.data_path(ModelType::HtDemucs), b"weights").unwrap();

        assert!(manager.is_model_available(ModelType::HtDemucs));
        assert_eq!(manager.cache_size(), 12);

        let reported = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reported);
        let path = manager
            .ensure_model(
                ModelType::HtDemucs,
                Some(Box::new(move |p: f32| sink.lock().unwrap().push(p))),
            )
            .unwrap();

        assert_eq!(path, manager.model_path(ModelType::HtDemucs));
        assert_eq!(*reported.lock().unwrap(), vec![1.0]);
    }

    #[test]
    fn test_clear_cache() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ModelManager::with_cache_dir(dir.path().to_path_buf());
        fs::write(manager.model_path(ModelType::HtDemucs), b"graph").unwrap();
        fs::write(manager.data_path(ModelType::HtDemucs), b"weights").unwrap();

        manager.clear_cache().unwrap();

        assert!(!manager.is_model_available(ModelType::HtDemucs));
        assert_eq!(manager.cache_size(), 0);
    }

    #[test]
    fn test_partial_cache_is_unavailable_and_deletable() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ModelManager::with_cache_dir(dir.path().to_path_buf());
        fs::write(manager.model_path(ModelType::HtDemucs), b"graph").unwrap();

        assert!(!manager.is_model_available(ModelType::HtDemucs));
        assert_eq!(manager.cache_size(), 5);

        manager.delete_model(ModelType::HtDemucs).unwrap();
        assert!(!manager.model_path(ModelType::HtDemucs).exists());
    }

    #[test]
    fn test_progress_writer_reports_fraction() {
        let reported = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reported);
        let cb: DownloadProgress = Box::new(move |p: f32| sink.lock().unwrap().push(p));

        let mut writer = ProgressWriter {
            inner: Vec::new(),
            written: 0,
            total: Some(8),
            progress: Some(&*cb),
        };
        writer.write_all(&[0u8; 4]).unwrap();
        writer.write_all(&[0u8; 4]).unwrap();

        assert_eq!(writer.inner.len(), 8);
        assert_eq!(*reported.lock().unwrap(), vec![0.5, 0.99]);
    }
}
