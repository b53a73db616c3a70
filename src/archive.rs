//! Moves already-fetched email files out of the new-documents directory.
//!
//! Runs before each fetch so the next sync only sees mail that has not been
//! indexed yet. Native move semantics: a same-named file already present in
//! the archive is overwritten.

use anyhow::{Context, Result};
use std::path::Path;

use crate::config::Config;

/// Move every regular file from the new-documents directory to the archive
/// directory. Returns the number of files moved.
pub fn archive_new_documents(config: &Config) -> Result<usize> {
    archive_dir(&config.dirs.new_dir, &config.dirs.archive_dir)
}

fn archive_dir(new_dir: &Path, archive_dir: &Path) -> Result<usize> {
    if !new_dir.exists() {
        return Ok(0);
    }
    std::fs::create_dir_all(archive_dir)
        .with_context(|| format!("Failed to create archive dir: {}", archive_dir.display()))?;

    let mut moved = 0usize;
    for entry in std::fs::read_dir(new_dir)
        .with_context(|| format!("Failed to read new-documents dir: {}", new_dir.display()))?
    {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let src = entry.path();
        let dst = archive_dir.join(entry.file_name());
        move_file(&src, &dst)
            .with_context(|| format!("Failed to archive {}", src.display()))?;
        moved += 1;
    }

    Ok(moved)
}

/// Rename, falling back to copy+remove when src and dst are on different
/// filesystems.
fn move_file(src: &Path, dst: &Path) -> Result<()> {
    match std::fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(_) => {
            std::fs::copy(src, dst)?;
            std::fs::remove_file(src)?;
            Ok(())
        }
    }
}

/// CLI entry point.
pub fn run_archive(config: &Config) -> Result<()> {
    let moved = archive_new_documents(config)?;
    println!("archive");
    println!("  files moved: {}", moved);
    println!("ok");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn moves_all_files_and_empties_source() {
        let tmp = TempDir::new().unwrap();
        let new_dir = tmp.path().join("new");
        let arch_dir = tmp.path().join("archive");
        std::fs::create_dir_all(&new_dir).unwrap();

        for i in 0..3 {
            std::fs::write(new_dir.join(format!("mail{}.html", i)), "<p>x</p>").unwrap();
        }

        let moved = archive_dir(&new_dir, &arch_dir).unwrap();
        assert_eq!(moved, 3);
        assert_eq!(std::fs::read_dir(&new_dir).unwrap().count(), 0);
        assert_eq!(std::fs::read_dir(&arch_dir).unwrap().count(), 3);
    }

    #[test]
    fn missing_source_dir_is_a_noop() {
        let tmp = TempDir::new().unwrap();
        let moved = archive_dir(&tmp.path().join("absent"), &tmp.path().join("archive")).unwrap();
        assert_eq!(moved, 0);
    }

    #[test]
    fn name_collision_overwrites() {
        let tmp = TempDir::new().unwrap();
        let new_dir = tmp.path().join("new");
        let arch_dir = tmp.path().join("archive");
        std::fs::create_dir_all(&new_dir).unwrap();
        std::fs::create_dir_all(&arch_dir).unwrap();

        std::fs::write(new_dir.join("same.html"), "fresh").unwrap();
        std::fs::write(arch_dir.join("same.html"), "stale").unwrap();

        archive_dir(&new_dir, &arch_dir).unwrap();
        let content = std::fs::read_to_string(arch_dir.join("same.html")).unwrap();
        assert_eq!(content, "fresh");
    }

    #[test]
    fn subdirectories_are_left_in_place() {
        let tmp = TempDir::new().unwrap();
        let new_dir = tmp.path().join("new");
        let arch_dir = tmp.path().join("archive");
        std::fs::create_dir_all(new_dir.join("nested")).unwrap();
        std::fs::write(new_dir.join("a.html"), "x").unwrap();

        let moved = archive_dir(&new_dir, &arch_dir).unwrap();
        assert_eq!(moved, 1);
        assert!(new_dir.join("nested").exists());
    }
}
