//! Renames separator output files to canonical stem names.

use crate::{error::Result, types::JobResult};

use std::{
    fs, io,
    path::{Path, PathBuf},
};

/// Canonical stem name and the filename fragments that identify it.
///
/// Order matters: the first stem with a matching fragment wins.
pub const STEM_SYNONYMS: &[(&str, &[&str])] = &[
    ("vocals", &["vocals", "vocal"]),
    ("drums", &["drums", "drum"]),
    ("bass", &["bass"]),
    ("other", &["other", "no_vocals", "instrumental"]),
    ("guitar", &["guitar"]),
    ("piano", &["piano", "keys"]),
];

/// Canonical stem for a file stem such as `song_(Vocals)`.
pub fn canonical_stem(file_stem: &str) -> Option<&'static str> {
    let lower = file_stem.to_lowercase();
    STEM_SYNONYMS
        .iter()
        .find(|(_, patterns)| patterns.iter().any(|p| lower.contains(p)))
        .map(|(stem, _)| *stem)
}

/// Move each recognised output to `<output_dir>/<stem>.<ext>`.
///
/// Relative paths are taken relative to `output_dir`. Files matching no stem
/// are left alone and omitted from the result.
pub fn normalize(raw_paths: &[PathBuf], output_dir: &Path) -> Result<JobResult> {
    let mut result = JobResult::default();

    for raw in raw_paths {
        let src = if raw.is_absolute() {
            raw.clone()
        } else {
            output_dir.join(raw)
        };
        let Some(file_stem) = src.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let Some(stem) = canonical_stem(file_stem) else {
            log::debug!("no stem matches {}", src.display());
            continue;
        };

        let ext = src.extension().and_then(|e| e.to_str()).unwrap_or("wav");
        let dst = output_dir.join(format!("{}.{}", stem, ext));
        if src != dst {
            move_file(&src, &dst)?;
        }
        log::info!("  {}: {}", stem, dst.display());
        result.stems.insert(stem.to_string(), dst);
    }
    Ok(result)
}

fn move_file(src: &Path, dst: &Path) -> io::Result<()> {
    if dst.exists() {
        fs::remove_file(dst)?;
    }
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        // Cross-device moves cannot be renamed.
        Err(_) => {
            fs::copy(src, dst)?;
            fs::remove_file(src)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str, body: &str) -> PathBuf {
        let p = dir.join(name);
        fs::write(&p, body).unwrap();
        p
    }

    #[test]
    fn matches_synonyms_case_insensitively() {
        assert_eq!(canonical_stem("song_(Vocals)"), Some("vocals"));
        assert_eq!(canonical_stem("SONG_DRUM"), Some("drums"));
        assert_eq!(canonical_stem("song_(Instrumental)"), Some("other"));
        assert_eq!(canonical_stem("take2_Keys"), Some("piano"));
        assert_eq!(canonical_stem("click_track"), None);
    }

    #[test]
    fn first_stem_in_table_order_wins() {
        // "no_vocals" also contains "vocals", which comes first.
        assert_eq!(canonical_stem("song_no_vocals"), Some("vocals"));
        assert_eq!(canonical_stem("bass_and_drums"), Some("drums"));
    }

    #[test]
    fn renames_two_stem_output() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path();
        let raw = vec![
            touch(out, "song_(Vocals).wav", "v"),
            PathBuf::from("song_(Instrumental).wav"),
        ];
        touch(out, "song_(Instrumental).wav", "i");

        let result = normalize(&raw, out).unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result.get("vocals"), Some(&out.join("vocals.wav")));
        assert_eq!(result.get("other"), Some(&out.join("other.wav")));
        assert_eq!(fs::read_to_string(out.join("vocals.wav")).unwrap(), "v");
        assert_eq!(fs::read_to_string(out.join("other.wav")).unwrap(), "i");
        assert!(!out.join("song_(Vocals).wav").exists());
    }

    #[test]
    fn overwrites_existing_canonical_file_and_keeps_extension() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path();
        touch(out, "drums.flac", "old");
        let raw = vec![touch(out, "mix_(Drums).flac", "new")];

        let result = normalize(&raw, out).unwrap();
        assert_eq!(result.get("drums"), Some(&out.join("drums.flac")));
        assert_eq!(fs::read_to_string(out.join("drums.flac")).unwrap(), "new");
    }

    #[test]
    fn unmatched_outputs_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let raw = vec![touch(dir.path(), "song_residual.wav", "x")];
        let result = normalize(&raw, dir.path()).unwrap();
        assert!(result.is_empty());
        assert!(dir.path().join("song_residual.wav").exists());
    }

    #[test]
    fn is_idempotent_on_canonical_names() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path();
        let raw = vec![touch(out, "x_(Vocals).wav", "v"), touch(out, "x_(Bass).wav", "b")];
        let first = normalize(&raw, out).unwrap();

        let canonical: Vec<PathBuf> = first.stems.values().cloned().collect();
        let second = normalize(&canonical, out).unwrap();
        assert_eq!(first, second);
        assert_eq!(fs::read_to_string(out.join("bass.wav")).unwrap(), "b");
    }
}
