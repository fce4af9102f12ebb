//! Zip packing of downloaded document components.

use bytes::Bytes;
use rmsync_core::Error;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

fn archive_error(err: impl std::fmt::Display) -> Error {
    Error::Archive(err.to_string())
}

/// Pack `(name, content)` pairs into a deflated zip archive.
pub fn build_archive(files: &[(String, Bytes)]) -> Result<Vec<u8>, Error> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (name, content) in files {
        writer.start_file(name.as_str(), options).map_err(archive_error)?;
        writer.write_all(content).map_err(archive_error)?;
    }

    Ok(writer.finish().map_err(archive_error)?.into_inner())
}
