use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::row::Row;

/// On-disk contents of a list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub next_id: i64,
    pub items: Vec<Row>,
}

/// Write a snapshot as gzip-compressed JSON
pub fn save_snapshot(snapshot: &Snapshot, path: &Path) -> std::io::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(GzEncoder::new(file, Compression::default()));

    serde_json::to_writer(&mut writer, snapshot)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    writer.flush()?;

    let encoder = writer.into_inner().map_err(|e| e.into_error())?;
    encoder.finish()?;
    Ok(())
}

pub fn load_snapshot(path: &Path) -> std::io::Result<Snapshot> {
    let file = File::open(path)?;
    let reader = BufReader::new(GzDecoder::new(file));

    let snapshot: Snapshot = serde_json::from_reader(reader)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    Ok(snapshot)
}
