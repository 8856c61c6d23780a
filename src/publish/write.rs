// src/publish/write.rs
use anyhow::{Context, Result};
use arrow::{csv::WriterBuilder, record_batch::RecordBatch};
use parquet::{arrow::ArrowWriter, basic::Compression, file::properties::WriterProperties};
use std::{
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

/// Hidden sibling used while a file is being written.
fn tmp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.tmp", name))
}

/// Write via a temp file in the same directory, then rename over `path`, so a
/// reader never sees a half-written snapshot.
fn write_atomically<F>(path: &Path, fill: F) -> Result<()>
where
    F: FnOnce(File) -> Result<()>,
{
    let tmp = tmp_path(path);
    let file = File::create(&tmp).with_context(|| format!("creating {}", tmp.display()))?;
    let result = fill(file)
        .with_context(|| format!("writing {}", tmp.display()))
        .and_then(|()| {
            fs::rename(&tmp, path)
                .with_context(|| format!("renaming {} -> {}", tmp.display(), path.display()))
        });
    if let Err(e) = result {
        if let Err(rm) = fs::remove_file(&tmp) {
            warn!(path = %tmp.display(), error = %rm, "could not remove temp file");
        }
        return Err(e);
    }
    debug!(path = %path.display(), "written");
    Ok(())
}

pub fn write_parquet(batch: &RecordBatch, path: &Path) -> Result<()> {
    write_atomically(path, |file| {
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))
            .context("creating Arrow writer")?;
        writer.write(batch).context("writing batch")?;
        writer.close().context("closing parquet writer")?;
        Ok(())
    })
}

pub fn write_csv(batch: &RecordBatch, path: &Path) -> Result<()> {
    let mut buf = Vec::new();
    {
        let mut writer = WriterBuilder::new().with_header(true).build(&mut buf);
        writer.write(batch).context("encoding CSV")?;
    }
    write_text_bytes(path, &buf)
}

pub fn write_text(path: &Path, text: &str) -> Result<()> {
    write_text_bytes(path, text.as_bytes())
}

fn write_text_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    write_atomically(path, |mut file| {
        file.write_all(bytes)?;
        file.sync_all()?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{ArrayRef, Float64Array, Int32Array};
    use arrow::datatypes::{DataType, Field, Schema};
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn batch() -> RecordBatch {
        let schema = Schema::new(vec![
            Field::new("year", DataType::Int32, false),
            Field::new("FS1", DataType::Float64, true),
        ]);
        let year = Arc::new(Int32Array::from(vec![2023, 2024, 2025])) as ArrayRef;
        let fs1 = Arc::new(Float64Array::from(vec![Some(1.0), None, Some(5.0)])) as ArrayRef;
        RecordBatch::try_new(Arc::new(schema), vec![year, fs1]).unwrap()
    }

    #[test]
    fn parquet_round_trip_and_no_temp_left() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("snap.parquet");
        write_parquet(&batch(), &path)?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(&path)?)?.build()?;
        let rows: usize = reader.map(|b| b.map(|b| b.num_rows())).sum::<Result<usize, _>>()?;
        assert_eq!(rows, 3);
        assert!(!tmp_path(&path).exists());
        Ok(())
    }

    #[test]
    fn csv_has_header_and_blank_missing() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("snap.csv");
        write_csv(&batch(), &path)?;
        let text = fs::read_to_string(&path)?;
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "year,FS1");
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[2], "2024,");
        Ok(())
    }

    #[test]
    fn failed_write_leaves_no_temp_file() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("clean.csv");
        let res = write_atomically(&path, |mut file| {
            file.write_all(b"partial")?;
            anyhow::bail!("encoder gave up")
        });
        assert!(res.is_err());
        assert!(!tmp_path(&path).exists());
        assert!(!path.exists());

        // rename onto a directory fails after the temp file is complete
        let blocked = dir.path().join("blocked");
        fs::create_dir(&blocked)?;
        fs::write(blocked.join("keep"), "x")?;
        assert!(write_text(&blocked, "text").is_err());
        assert!(!tmp_path(&blocked).exists());
        Ok(())
    }

    #[test]
    fn rewrite_supersedes_previous_file() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("summary.txt");
        write_text(&path, "first run\n")?;
        write_text(&path, "second\n")?;
        assert_eq!(fs::read_to_string(&path)?, "second\n");
        Ok(())
    }
}
