//! Synthesized audio held in a scoped temporary file.

use std::io::Write;
use std::path::{Path, PathBuf};

use base64::Engine;
use tempfile::NamedTempFile;

/// Suffix of every artifact written by the synthesizer.
pub const AUDIO_SUFFIX: &str = ".flac";

/// Audio bytes on disk. The file is deleted when the artifact is dropped,
/// unless [`AudioArtifact::keep`] is called.
#[derive(Debug)]
pub struct AudioArtifact {
    file: NamedTempFile,
    len: usize,
    mime: String,
}

impl AudioArtifact {
    /// Persist `bytes` to a fresh `.flac` temp file.
    pub fn write(bytes: &[u8], mime: impl Into<String>) -> std::io::Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix("story-")
            .suffix(AUDIO_SUFFIX)
            .tempfile()?;
        file.write_all(bytes)?;
        file.flush()?;
        Ok(Self {
            file,
            len: bytes.len(),
            mime: mime.into(),
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Content type reported by the endpoint (or assumed).
    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn read(&self) -> std::io::Result<Vec<u8>> {
        std::fs::read(self.file.path())
    }

    /// Convenience: file contents as standard base64
    pub fn to_base64(&self) -> std::io::Result<String> {
        Ok(base64::engine::general_purpose::STANDARD.encode(self.read()?))
    }

    /// Stop tracking the file and leave it on disk.
    pub fn keep(self) -> std::io::Result<PathBuf> {
        let (_, path) = self.file.keep().map_err(|e| e.error)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_and_read_back() {
        let artifact = AudioArtifact::write(b"fLaC-data", "audio/flac").unwrap();
        assert_eq!(artifact.read().unwrap(), b"fLaC-data");
        assert_eq!(artifact.len(), 9);
        assert_eq!(artifact.mime(), "audio/flac");
        assert!(artifact.path().to_string_lossy().ends_with(AUDIO_SUFFIX));
    }

    #[test]
    fn test_base64() {
        let artifact = AudioArtifact::write(b"AUDIO", "audio/flac").unwrap();
        assert_eq!(artifact.to_base64().unwrap(), "QVVESU8=");
    }

    #[test]
    fn test_drop_removes_file() {
        let artifact = AudioArtifact::write(b"AUDIO", "audio/flac").unwrap();
        let path = artifact.path().to_path_buf();
        assert!(path.exists());
        drop(artifact);
        assert!(!path.exists());
    }

    #[test]
    fn test_keep_leaves_file() {
        let artifact = AudioArtifact::write(b"AUDIO", "audio/flac").unwrap();
        let path = artifact.keep().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"AUDIO");
        std::fs::remove_file(path).unwrap();
    }
}
