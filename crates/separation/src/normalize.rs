//! Output normalization: reconcile backend-specific layouts into the
//! canonical artifact pair at the job output root.
//!
//! The demucs backend nests results under a model-name/track-name
//! subdirectory (`<out>/htdemucs/<track>/vocals.wav` and
//! `no_vocals.wav`); the fallback writes flat canonical files directly.
//! Resolution order: the nested layout if present, otherwise a full-tree
//! scan for recognizable stem markers. Producing neither canonical file
//! is a fatal error for the job, never a silent no-op.

use std::path::{Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;

use unmixer_common::{ProcessingError, Result, StemKind};

/// Locate the produced stems under `output_dir` and materialize the
/// canonical pair at its root. Returns (vocals, accompaniment) paths.
pub fn normalize_outputs(output_dir: &Path) -> Result<(PathBuf, PathBuf)> {
    let vocals_dest = output_dir.join(StemKind::Vocals.canonical_filename());
    let accompaniment_dest = output_dir.join(StemKind::Accompaniment.canonical_filename());

    if let Some(track_dir) = nested_track_dir(output_dir) {
        debug!("Using nested model output layout: {}", track_dir.display());
        copy_if_present(&track_dir.join("vocals.wav"), &vocals_dest)?;
        copy_if_present(&track_dir.join("no_vocals.wav"), &accompaniment_dest)?;
    }

    if !vocals_dest.exists() {
        if let Some(found) = scan_for(output_dir, &vocals_dest, is_vocal_marker) {
            std::fs::copy(&found, &vocals_dest)?;
        }
    }
    if !accompaniment_dest.exists() {
        if let Some(found) = scan_for(output_dir, &accompaniment_dest, is_accompaniment_marker) {
            std::fs::copy(&found, &accompaniment_dest)?;
        }
    }

    match (vocals_dest.exists(), accompaniment_dest.exists()) {
        (true, true) => {
            info!("Canonical artifact pair ready in {}", output_dir.display());
            Ok((vocals_dest, accompaniment_dest))
        }
        (false, true) => Err(ProcessingError::Normalization(format!(
            "no vocal stem found in {}",
            output_dir.display()
        ))),
        (true, false) => Err(ProcessingError::Normalization(format!(
            "no accompaniment stem found in {}",
            output_dir.display()
        ))),
        (false, false) => Err(ProcessingError::Normalization(format!(
            "no separation output found in {}",
            output_dir.display()
        ))),
    }
}

/// Find the track directory of the nested model layout: the first
/// subdirectory of a first-level model directory that holds a
/// `vocals.wav`. Entries are visited in name order for determinism.
fn nested_track_dir(output_dir: &Path) -> Option<PathBuf> {
    for model_dir in sorted_subdirs(output_dir) {
        for track_dir in sorted_subdirs(&model_dir) {
            if track_dir.join("vocals.wav").is_file() {
                return Some(track_dir);
            }
        }
    }
    None
}

fn sorted_subdirs(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    dirs
}

/// Scan the full output tree for the first file whose name matches the
/// marker predicate, skipping the canonical destination itself.
fn scan_for(
    output_dir: &Path,
    dest: &Path,
    marker: impl Fn(&str) -> bool,
) -> Option<PathBuf> {
    WalkDir::new(output_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path() != dest)
        .find(|e| {
            e.file_name()
                .to_str()
                .map(&marker)
                .unwrap_or(false)
        })
        .map(|e| e.into_path())
}

fn is_vocal_marker(name: &str) -> bool {
    name.contains("vocals") && !name.contains("no_vocals")
}

fn is_accompaniment_marker(name: &str) -> bool {
    name.contains("accompaniment") || name.contains("no_vocals")
}

fn copy_if_present(src: &Path, dest: &Path) -> Result<()> {
    if src.is_file() {
        std::fs::copy(src, dest)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_nested_model_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let track = tmp.path().join("htdemucs").join("song");
        touch(&track.join("vocals.wav"), "v");
        touch(&track.join("no_vocals.wav"), "a");

        let (vocals, accompaniment) = normalize_outputs(tmp.path()).unwrap();
        assert_eq!(vocals, tmp.path().join("vocals.wav"));
        assert_eq!(accompaniment, tmp.path().join("accompaniment.wav"));
        assert_eq!(std::fs::read_to_string(&vocals).unwrap(), "v");
        assert_eq!(std::fs::read_to_string(&accompaniment).unwrap(), "a");
    }

    #[test]
    fn test_flat_canonical_layout_is_left_in_place() {
        let tmp = tempfile::tempdir().unwrap();
        touch(&tmp.path().join("vocals.wav"), "v");
        touch(&tmp.path().join("accompaniment.wav"), "a");

        let (vocals, accompaniment) = normalize_outputs(tmp.path()).unwrap();
        assert_eq!(std::fs::read_to_string(vocals).unwrap(), "v");
        assert_eq!(std::fs::read_to_string(accompaniment).unwrap(), "a");
    }

    #[test]
    fn test_marker_scan_resolves_odd_names() {
        let tmp = tempfile::tempdir().unwrap();
        touch(&tmp.path().join("deep").join("mytrack_vocals.wav"), "v");
        touch(&tmp.path().join("deep").join("mytrack_no_vocals.wav"), "a");

        let (vocals, accompaniment) = normalize_outputs(tmp.path()).unwrap();
        assert_eq!(std::fs::read_to_string(vocals).unwrap(), "v");
        assert_eq!(std::fs::read_to_string(accompaniment).unwrap(), "a");
    }

    #[test]
    fn test_no_vocals_marker_never_claims_vocal_stem() {
        // Only an accompaniment-named file exists; the vocal stem must
        // be reported missing rather than mis-resolved.
        let tmp = tempfile::tempdir().unwrap();
        touch(&tmp.path().join("no_vocals.wav"), "a");

        let err = normalize_outputs(tmp.path()).unwrap_err();
        assert!(matches!(err, ProcessingError::Normalization(_)));
        assert!(err.to_string().contains("vocal"));
    }

    #[test]
    fn test_empty_output_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let err = normalize_outputs(tmp.path()).unwrap_err();
        assert!(matches!(err, ProcessingError::Normalization(_)));
    }

    #[test]
    fn test_exactly_two_canonical_files_after_normalization() {
        let tmp = tempfile::tempdir().unwrap();
        let track = tmp.path().join("htdemucs").join("song");
        touch(&track.join("vocals.wav"), "v");
        touch(&track.join("no_vocals.wav"), "a");

        normalize_outputs(tmp.path()).unwrap();

        let canonical: Vec<_> = std::fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file())
            .collect();
        assert_eq!(canonical.len(), 2);
    }
}
