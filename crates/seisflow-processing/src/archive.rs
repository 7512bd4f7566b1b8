//! Zip extraction and packaging.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::PipelineError;

/// Extract every entry of `archive_path` into `target`.
///
/// All entry names are checked before anything is written; a single entry that
/// would resolve outside `target` (absolute path, `..` component) fails the whole
/// extraction with [`PipelineError::PathTraversal`].
pub fn extract(archive_path: &Path, target: &Path) -> Result<usize, PipelineError> {
    let file = File::open(archive_path).map_err(PipelineError::io(archive_path))?;
    let mut archive = ZipArchive::new(file).map_err(PipelineError::InvalidArchive)?;

    let mut entries = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let entry = archive.by_index(i).map_err(PipelineError::InvalidArchive)?;
        match entry.enclosed_name() {
            Some(relative) => entries.push((i, relative.to_path_buf(), entry.is_dir())),
            None => {
                return Err(PipelineError::PathTraversal {
                    entry: entry.name().to_string(),
                })
            }
        }
    }

    fs::create_dir_all(target).map_err(PipelineError::io(target))?;
    let mut written = 0;
    for (i, relative, is_dir) in entries {
        let out_path = target.join(&relative);
        if is_dir {
            fs::create_dir_all(&out_path).map_err(PipelineError::io(&out_path))?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent).map_err(PipelineError::io(parent))?;
        }
        let mut entry = archive.by_index(i).map_err(PipelineError::InvalidArchive)?;
        let mut out = File::create(&out_path).map_err(PipelineError::io(&out_path))?;
        io::copy(&mut entry, &mut out).map_err(PipelineError::io(&out_path))?;
        written += 1;
    }

    tracing::debug!(
        archive = %archive_path.display(),
        files = written,
        "Extracted archive"
    );
    Ok(written)
}

fn file_options() -> FileOptions {
    FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644)
}

/// Write `files` into a new zip at `dest`. Each tuple is (source path, name inside the archive).
pub fn zip_files(dest: &Path, files: &[(PathBuf, String)]) -> Result<(), PipelineError> {
    let package_err = |source| PipelineError::Package {
        path: dest.to_path_buf(),
        source,
    };

    let out = File::create(dest).map_err(PipelineError::io(dest))?;
    let mut zip = ZipWriter::new(out);
    for (source, name) in files {
        let data = fs::read(source).map_err(PipelineError::io(source))?;
        zip.start_file(name.as_str(), file_options())
            .map_err(package_err)?;
        zip.write_all(&data).map_err(PipelineError::io(dest))?;
    }
    zip.finish().map_err(package_err)?;
    Ok(())
}

/// Zip the directory `src` recursively into `dest`, with entries rooted at `src`'s own name
/// (so `QaData/limits.txt` stays `QaData/limits.txt`).
pub fn zip_directory(src: &Path, dest: &Path) -> Result<usize, PipelineError> {
    let base = src.parent().unwrap_or(src);
    let mut files = Vec::new();
    collect_files(src, &mut files)?;
    files.sort();

    let entries: Vec<(PathBuf, String)> = files
        .into_iter()
        .filter_map(|path| {
            let name = path
                .strip_prefix(base)
                .ok()?
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            Some((path, name))
        })
        .collect();

    zip_files(dest, &entries)?;
    Ok(entries.len())
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), PipelineError> {
    for entry in fs::read_dir(dir).map_err(PipelineError::io(dir))? {
        let path = entry.map_err(PipelineError::io(dir))?.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::test_support::build_zip;
    use super::*;
    use std::io::Read;

    fn write_zip(dir: &Path, entries: &[(&str, &[u8])]) -> PathBuf {
        let path = dir.join("in.zip");
        fs::write(&path, build_zip(entries)).unwrap();
        path
    }

    #[test]
    fn extracts_nested_entries() {
        let dir = tempfile::tempdir().unwrap();
        let zip = write_zip(
            dir.path(),
            &[("Save/a.sgy", b"A"), ("QaData/limits.txt", b"max_frequency=40")],
        );
        let target = dir.path().join("out");

        assert_eq!(extract(&zip, &target).unwrap(), 2);
        assert_eq!(fs::read(target.join("Save/a.sgy")).unwrap(), b"A");
        assert!(target.join("QaData/limits.txt").is_file());
    }

    #[test]
    fn rejects_parent_traversal_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let zip = write_zip(
            dir.path(),
            &[("user.cfg", b"name=x"), ("../../evil.txt", b"pwned")],
        );
        let target = dir.path().join("nested/out");

        let err = extract(&zip, &target).unwrap_err();

        assert!(matches!(err, PipelineError::PathTraversal { ref entry } if entry == "../../evil.txt"));
        assert!(!dir.path().join("evil.txt").exists());
        assert!(!target.join("user.cfg").exists());
    }

    #[test]
    fn rejects_absolute_entry() {
        let dir = tempfile::tempdir().unwrap();
        let zip = write_zip(dir.path(), &[("/etc/evil", b"x")]);
        assert!(matches!(
            extract(&zip, &dir.path().join("out")),
            Err(PipelineError::PathTraversal { .. })
        ));
    }

    #[test]
    fn garbage_bytes_are_invalid_archive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.zip");
        fs::write(&path, b"definitely not a zip").unwrap();
        assert!(matches!(
            extract(&path, &dir.path().join("out")),
            Err(PipelineError::InvalidArchive(_))
        ));
    }

    #[test]
    fn zip_directory_keeps_directory_name() {
        let dir = tempfile::tempdir().unwrap();
        let qa = dir.path().join("QaData");
        fs::create_dir_all(qa.join("plots")).unwrap();
        fs::write(qa.join("limits.txt"), b"max_frequency=40").unwrap();
        fs::write(qa.join("plots/p1.png"), b"png").unwrap();
        let dest = dir.path().join("qa.zip");

        assert_eq!(zip_directory(&qa, &dest).unwrap(), 2);

        let mut archive = ZipArchive::new(File::open(&dest).unwrap()).unwrap();
        let mut names: Vec<String> = archive.file_names().map(String::from).collect();
        names.sort();
        assert_eq!(names, vec!["QaData/limits.txt", "QaData/plots/p1.png"]);

        let mut contents = String::new();
        archive
            .by_name("QaData/limits.txt")
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "max_frequency=40");
    }
}
