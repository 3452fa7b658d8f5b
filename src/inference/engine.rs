//! Spectrogram engine boundary
//!
//! Syllable extraction and spectrogram synthesis happen in an external
//! program. The prediction driver only sees the [`SpectrogramEngine`] trait,
//! so tests can substitute a fake that writes images directly.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::utils::config::EngineConfig;
use crate::utils::error::{BirdsongError, Result};

/// Turns one audio recording into a directory of spectrogram images
pub trait SpectrogramEngine {
    /// Prepare the engine; called once before any synthesis
    fn start(&mut self) -> Result<()>;

    /// Write spectrograms for `audio_path` into `output_dir` and return their paths
    fn synthesize_spectrograms(&mut self, audio_path: &Path, output_dir: &Path) -> Result<Vec<PathBuf>>;

    /// Release the engine; must tolerate being called after a failed start
    fn shutdown(&mut self);
}

/// Runs a MATLAB function in batch mode for each recording
#[derive(Debug, Clone)]
pub struct MatlabEngine {
    program: String,
    script_dir: PathBuf,
    function: String,
    started: bool,
}

impl MatlabEngine {
    /// `script_dir` in the config is resolved against `project_root`
    pub fn new(config: &EngineConfig, project_root: &Path) -> Self {
        Self {
            program: config.program.clone(),
            script_dir: project_root.join(&config.script_dir),
            function: config.function.clone(),
            started: false,
        }
    }

    pub fn script_dir(&self) -> &Path {
        &self.script_dir
    }

    /// The statement passed to `-batch`
    pub fn batch_statement(&self, audio_path: &Path, output_dir: &Path) -> String {
        format!(
            "addpath(genpath('{}')); {}('{}', '{}')",
            matlab_quote(&self.script_dir),
            self.function,
            matlab_quote(audio_path),
            matlab_quote(output_dir)
        )
    }
}

/// Escape a path for a single-quoted MATLAB char array
fn matlab_quote(path: &Path) -> String {
    path.display().to_string().replace('\'', "''")
}

impl SpectrogramEngine for MatlabEngine {
    fn start(&mut self) -> Result<()> {
        if !self.script_dir.is_dir() {
            return Err(BirdsongError::Engine(format!(
                "engine script directory not found: {}",
                self.script_dir.display()
            )));
        }
        info!("Using {} with scripts from {:?}", self.program, self.script_dir);
        self.started = true;
        Ok(())
    }

    fn synthesize_spectrograms(&mut self, audio_path: &Path, output_dir: &Path) -> Result<Vec<PathBuf>> {
        if !self.started {
            return Err(BirdsongError::Engine("engine used before start".to_string()));
        }

        let statement = self.batch_statement(audio_path, output_dir);
        debug!(program = %self.program, statement = %statement, "Running spectrogram engine");

        let output = Command::new(&self.program)
            .arg("-batch")
            .arg(&statement)
            .output()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => {
                    BirdsongError::Engine(format!("engine program '{}' not found", self.program))
                }
                _ => BirdsongError::Engine(format!("failed to launch '{}': {}", self.program, e)),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BirdsongError::Engine(format!(
                "Exit code: {:?}, stderr: {}",
                output.status.code(),
                stderr.trim()
            )));
        }

        Ok(list_spectrograms(output_dir))
    }

    fn shutdown(&mut self) {
        if self.started {
            debug!("Spectrogram engine released");
        }
        self.started = false;
    }
}

/// `*.jpg` files directly inside `dir`, sorted
pub fn list_spectrograms(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .map(|ext| ext.eq_ignore_ascii_case("jpg"))
                    .unwrap_or(false)
        })
        .collect()
}

/// Scoped engine plus scratch directory
///
/// Opening starts the engine and creates an empty scratch directory. Dropping
/// the session shuts the engine down and deletes the directory, whichever way
/// the prediction ends.
pub struct EngineSession<E: SpectrogramEngine> {
    engine: E,
    scratch_dir: PathBuf,
}

impl<E: SpectrogramEngine> EngineSession<E> {
    pub fn open(engine: E, scratch_dir: &Path) -> Result<Self> {
        if scratch_dir.exists() {
            std::fs::remove_dir_all(scratch_dir)?;
        }
        std::fs::create_dir_all(scratch_dir)?;

        // From here on, Drop cleans up even if start fails
        let mut session = Self {
            engine,
            scratch_dir: scratch_dir.to_path_buf(),
        };
        session.engine.start()?;
        Ok(session)
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Synthesize spectrograms for `audio_path` into the scratch directory
    pub fn synthesize(&mut self, audio_path: &Path) -> Result<Vec<PathBuf>> {
        let files = self.engine.synthesize_spectrograms(audio_path, &self.scratch_dir)?;
        info!("Engine produced {} spectrogram(s)", files.len());
        Ok(files)
    }
}

impl<E: SpectrogramEngine> Drop for EngineSession<E> {
    fn drop(&mut self) {
        self.engine.shutdown();
        if self.scratch_dir.exists() {
            if let Err(e) = std::fs::remove_dir_all(&self.scratch_dir) {
                warn!("Could not remove {:?}: {}", self.scratch_dir, e);
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Writes `count` images per call and records lifecycle calls
    pub(crate) struct FakeEngine {
        pub count: usize,
        /// Extra images written to the output directory but left out of the returned list
        pub unreported: usize,
        pub image_size: u32,
        pub fail_start: bool,
        pub fail_synthesis: bool,
        pub shutdowns: Arc<AtomicUsize>,
    }

    impl FakeEngine {
        pub(crate) fn new(count: usize) -> Self {
            Self {
                count,
                unreported: 0,
                image_size: 24,
                fail_start: false,
                fail_synthesis: false,
                shutdowns: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl SpectrogramEngine for FakeEngine {
        fn start(&mut self) -> Result<()> {
            if self.fail_start {
                return Err(BirdsongError::Engine("fake start failure".to_string()));
            }
            Ok(())
        }

        fn synthesize_spectrograms(&mut self, _audio_path: &Path, output_dir: &Path) -> Result<Vec<PathBuf>> {
            if self.fail_synthesis {
                return Err(BirdsongError::Engine("fake synthesis failure".to_string()));
            }
            let mut files = Vec::new();
            for i in 0..self.count + self.unreported {
                let img = ImageBuffer::from_fn(self.image_size, self.image_size, |x, y| {
                    Rgb([(x * 9) as u8, (y * 5) as u8, (i * 20) as u8])
                });
                let path = output_dir.join(format!("syllable_{:03}.jpg", i));
                img.save(&path).map_err(|e| BirdsongError::Engine(e.to_string()))?;
                if i < self.count {
                    files.push(path);
                }
            }
            Ok(files)
        }

        fn shutdown(&mut self) {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_batch_statement() {
        let config = EngineConfig::default();
        let engine = MatlabEngine::new(&config, Path::new("/proj"));
        let statement = engine.batch_statement(Path::new("/audio/o'neil.mp3"), Path::new("/proj/temp_predict"));
        assert_eq!(
            statement,
            "addpath(genpath('/proj/matlab')); process_single_audio('/audio/o''neil.mp3', '/proj/temp_predict')"
        );
    }

    #[test]
    fn test_matlab_engine_requires_script_dir() {
        let dir = TempDir::new().unwrap();
        let mut engine = MatlabEngine::new(&EngineConfig::default(), dir.path());
        assert!(engine.start().is_err());

        std::fs::create_dir(dir.path().join("matlab")).unwrap();
        assert!(engine.start().is_ok());
    }

    #[test]
    fn test_missing_program_is_engine_error() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("matlab")).unwrap();
        let config = EngineConfig {
            program: "definitely-not-an-installed-engine".to_string(),
            ..EngineConfig::default()
        };
        let mut engine = MatlabEngine::new(&config, dir.path());
        engine.start().unwrap();

        let err = engine
            .synthesize_spectrograms(Path::new("a.mp3"), dir.path())
            .unwrap_err();
        assert!(matches!(err, BirdsongError::Engine(_)));
    }

    #[test]
    fn test_session_cleans_up_on_success() {
        let dir = TempDir::new().unwrap();
        let scratch = dir.path().join("temp_predict");
        let engine = FakeEngine::new(3);
        let shutdowns = engine.shutdowns.clone();

        {
            let mut session = EngineSession::open(engine, &scratch).unwrap();
            let files = session.synthesize(Path::new("bird.mp3")).unwrap();
            assert_eq!(files.len(), 3);
            assert!(scratch.is_dir());
        }

        assert!(!scratch.exists());
        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_session_cleans_up_on_failure() {
        let dir = TempDir::new().unwrap();
        let scratch = dir.path().join("temp_predict");

        let mut engine = FakeEngine::new(3);
        engine.fail_synthesis = true;
        let shutdowns = engine.shutdowns.clone();
        let result = EngineSession::open(engine, &scratch).and_then(|mut s| s.synthesize(Path::new("x.mp3")));
        assert!(result.is_err());
        assert!(!scratch.exists());
        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);

        let mut engine = FakeEngine::new(1);
        engine.fail_start = true;
        let shutdowns = engine.shutdowns.clone();
        assert!(EngineSession::open(engine, &scratch).is_err());
        assert!(!scratch.exists());
        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stale_scratch_dir_is_cleared() {
        let dir = TempDir::new().unwrap();
        let scratch = dir.path().join("temp_predict");
        std::fs::create_dir_all(&scratch).unwrap();
        std::fs::write(scratch.join("stale.jpg"), b"old").unwrap();

        let session = EngineSession::open(FakeEngine::new(0), &scratch).unwrap();
        assert!(list_spectrograms(session.scratch_dir()).is_empty());
    }
}
