//! Tar archiving of run artifacts.

use crate::RunResult;
use bzip2::write::BzEncoder;
use flate2::write::GzEncoder;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tar::Builder;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Bzip2,
}

impl Compression {
    fn suffix(self) -> &'static str {
        match self {
            Compression::None => "",
            Compression::Gzip => ".gz",
            Compression::Bzip2 => ".bz2",
        }
    }
}

impl std::str::FromStr for Compression {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" | "tar" => Ok(Compression::None),
            "gz" | "gzip" => Ok(Compression::Gzip),
            "bz2" | "bzip2" => Ok(Compression::Bzip2),
            other => Err(format!("unknown compression '{}'", other)),
        }
    }
}

/// Bundle `files` into a tar archive at `tar_path` (plus the compression
/// suffix), overwriting any previous archive. Members are stored by file
/// name only. Returns the archive path.
pub fn archive_files(
    files: &[PathBuf],
    tar_path: &Path,
    compression: Compression,
) -> RunResult<PathBuf> {
    let mut out_path = tar_path.as_os_str().to_owned();
    out_path.push(compression.suffix());
    let out_path = PathBuf::from(out_path);

    let out = File::create(&out_path)?;
    match compression {
        Compression::None => {
            let mut builder = Builder::new(out);
            append_all(&mut builder, files)?;
            builder.into_inner()?;
        }
        Compression::Gzip => {
            let mut builder = Builder::new(GzEncoder::new(out, flate2::Compression::default()));
            append_all(&mut builder, files)?;
            builder.into_inner()?.finish()?;
        }
        Compression::Bzip2 => {
            let mut builder = Builder::new(BzEncoder::new(out, bzip2::Compression::default()));
            append_all(&mut builder, files)?;
            builder.into_inner()?.finish()?;
        }
    }
    info!("archived {} files to {}", files.len(), out_path.display());
    Ok(out_path)
}

fn append_all<W: Write>(builder: &mut Builder<W>, files: &[PathBuf]) -> RunResult<()> {
    let mut last_printed = 0u32;
    for (i, path) in files.iter().enumerate() {
        let name = path.file_name().unwrap_or(path.as_os_str());
        builder.append_path_with_name(path, Path::new(name))?;

        // Archiving large batches is slow; report in 5% steps.
        let percent = ((i + 1) as f64 / files.len() as f64 * 100.0) as u32;
        if percent >= last_printed + 5 || percent == 100 && last_printed < 100 {
            last_printed = percent;
            println!("Archiving... {}%", percent);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn compression_names_parse() {
        assert_eq!("gz".parse::<Compression>().unwrap(), Compression::Gzip);
        assert_eq!("bzip2".parse::<Compression>().unwrap(), Compression::Bzip2);
        assert_eq!("none".parse::<Compression>().unwrap(), Compression::None);
        assert!("zip".parse::<Compression>().is_err());
    }

    #[test]
    fn plain_tar_round_trips_member_names() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("p1.out");
        let b = dir.path().join("p1.sum");
        fs::write(&a, "daily rows").unwrap();
        fs::write(&b, "summary").unwrap();

        let tar_path = dir.path().join("apsimData.tar");
        let written = archive_files(&[a, b], &tar_path, Compression::None).unwrap();
        assert_eq!(written, tar_path);

        let mut archive = tar::Archive::new(File::open(&written).unwrap());
        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().display().to_string())
            .collect();
        assert_eq!(names, vec!["p1.out", "p1.sum"]);
    }

    #[test]
    fn gzip_archive_gets_suffix_and_decodes() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("p1.out");
        fs::write(&a, "daily rows").unwrap();

        let written = archive_files(
            &[a],
            &dir.path().join("apsimData.tar"),
            Compression::Gzip,
        )
        .unwrap();
        assert!(written.to_string_lossy().ends_with(".tar.gz"));

        let decoder = flate2::read::GzDecoder::new(File::open(&written).unwrap());
        let mut archive = tar::Archive::new(decoder);
        assert_eq!(archive.entries().unwrap().count(), 1);
    }
}
