//! Expanded XLSX packages: extraction into a working directory and repackaging

use anyhow::{Context, Result};
use regex::Regex;
use std::fs::{self, File};
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tempfile::{NamedTempFile, TempDir};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

static WORKSHEET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^xl/worksheets/sheet(\d+)\.xml$").expect("worksheet pattern is valid")
});

/// A worksheet part and its ordinal from the part name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorksheetPart {
    pub ordinal: usize,
    pub name: String,
}

/// A package unpacked into its own working directory.
///
/// The directory is removed when the value is dropped.
#[derive(Debug)]
pub struct ExpandedPackage {
    dir: TempDir,
    /// Entry names in archive order
    entries: Vec<String>,
}

impl ExpandedPackage {
    /// Extract `source` into a fresh `<work_dir>/<task_id>-XXXX` directory
    pub fn extract(source: &Path, work_dir: &Path, task_id: &str) -> Result<Self> {
        fs::create_dir_all(work_dir)
            .with_context(|| format!("Failed to create work dir {}", work_dir.display()))?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("{task_id}-"))
            .tempdir_in(work_dir)
            .with_context(|| format!("Failed to create task dir in {}", work_dir.display()))?;

        let file = File::open(source)
            .with_context(|| format!("Failed to open {}", source.display()))?;
        let mut archive = ZipArchive::new(BufReader::new(file))
            .with_context(|| format!("{} is not a zip package", source.display()))?;

        let entries = (0..archive.len())
            .map(|i| archive.by_index_raw(i).map(|entry| entry.name().to_string()))
            .collect::<Result<Vec<_>, _>>()?;

        archive
            .extract(dir.path())
            .with_context(|| format!("Failed to extract {}", source.display()))?;

        Ok(Self { dir, entries })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// On-disk path of a part such as `xl/styles.xml`
    pub fn part_path(&self, part: &str) -> PathBuf {
        part.split('/')
            .fold(self.dir.path().to_path_buf(), |path, segment| path.join(segment))
    }

    pub fn has_part(&self, part: &str) -> bool {
        self.entries.iter().any(|e| e == part)
    }

    /// Worksheet parts ordered by their number
    pub fn worksheets(&self) -> Vec<WorksheetPart> {
        let mut sheets: Vec<WorksheetPart> = self
            .entries
            .iter()
            .filter_map(|name| {
                let ordinal = WORKSHEET_RE.captures(name)?.get(1)?.as_str().parse().ok()?;
                Some(WorksheetPart {
                    ordinal,
                    name: name.clone(),
                })
            })
            .collect();
        sheets.sort_by_key(|s| s.ordinal);
        sheets
    }

    /// Zip the directory back into `dest`, keeping the original entry order.
    ///
    /// The archive is written beside `dest` and moved into place once complete.
    pub fn repack(&self, dest: &Path) -> Result<()> {
        let parent = dest
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let mut tmp = NamedTempFile::new_in(parent)
            .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;

        let options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut zip_writer = ZipWriter::new(tmp.as_file_mut());

        for name in &self.entries {
            if name.ends_with('/') {
                zip_writer.add_directory(name.as_str(), options)?;
                continue;
            }
            let path = self.part_path(name);
            let mut part = File::open(&path)
                .with_context(|| format!("Missing extracted part {name}"))?;
            zip_writer.start_file(name.as_str(), options)?;
            io::copy(&mut part, &mut zip_writer)?;
        }

        zip_writer.finish()?.flush()?;

        tmp.persist(dest)
            .map_err(|e| e.error)
            .with_context(|| format!("Failed to write {}", dest.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn build_zip(path: &Path, entries: &[(&str, &str)]) {
        let file = File::create(path).unwrap();
        let mut zip = ZipWriter::new(file);
        let options = SimpleFileOptions::default();
        for (name, content) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_extract_enumerates_worksheets() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("report.xlsx");
        build_zip(
            &source,
            &[
                ("[Content_Types].xml", "<Types/>"),
                ("xl/worksheets/sheet10.xml", "<worksheet/>"),
                ("xl/worksheets/sheet2.xml", "<worksheet/>"),
                ("xl/worksheets/_rels/sheet2.xml.rels", "<Relationships/>"),
                ("xl/worksheets/sheet1.xml", "<worksheet/>"),
            ],
        );

        let work = dir.path().join("work");
        let package = ExpandedPackage::extract(&source, &work, "77").unwrap();

        let ordinals: Vec<usize> = package.worksheets().iter().map(|s| s.ordinal).collect();
        assert_eq!(ordinals, vec![1, 2, 10]);
        assert!(package.part_path("xl/worksheets/sheet2.xml").is_file());
        assert!(package.has_part("[Content_Types].xml"));
        assert!(
            package
                .root()
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("77-"))
        );

        let root = package.root().to_path_buf();
        drop(package);
        assert!(!root.exists());
    }

    #[test]
    fn test_repack_keeps_entry_order() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("report.xlsx");
        build_zip(
            &source,
            &[
                ("[Content_Types].xml", "<Types/>"),
                ("xl/workbook.xml", "<workbook/>"),
                ("xl/worksheets/sheet1.xml", "<worksheet/>"),
            ],
        );

        let package = ExpandedPackage::extract(&source, &dir.path().join("work"), "0").unwrap();
        fs::write(package.part_path("xl/workbook.xml"), "<workbook changed=\"1\"/>").unwrap();

        let dest = dir.path().join("out.xlsx");
        package.repack(&dest).unwrap();

        let mut archive = ZipArchive::new(File::open(&dest).unwrap()).unwrap();
        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        assert_eq!(
            names,
            vec!["[Content_Types].xml", "xl/workbook.xml", "xl/worksheets/sheet1.xml"]
        );

        let mut workbook = archive.by_name("xl/workbook.xml").unwrap();
        assert_eq!(workbook.compression(), CompressionMethod::Deflated);
        let mut content = String::new();
        workbook.read_to_string(&mut content).unwrap();
        assert_eq!(content, "<workbook changed=\"1\"/>");
    }

    #[test]
    fn test_extract_rejects_non_zip() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("report.xlsx");
        fs::write(&source, "not a zip").unwrap();
        assert!(ExpandedPackage::extract(&source, dir.path(), "0").is_err());
    }
}
