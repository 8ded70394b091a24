//! ZIP bundling for individual-mode output

use crate::error::ArchiveError;
use crate::request::NamedPdf;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Seek, Write};
use std::path::Path;
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Write every PDF into a new ZIP at `output_path`.
///
/// Entry names come from [`NamedPdf::name`]; repeated names get a ` (2)`,
/// ` (3)`, ... suffix so no entry is lost. A failed write leaves no file.
pub fn write_zip(pdfs: &[NamedPdf], output_path: impl AsRef<Path>) -> Result<u64, ArchiveError> {
    let output_path = output_path.as_ref();
    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let result = File::create(output_path)
        .map_err(ArchiveError::from)
        .and_then(|file| write_entries(pdfs, file));

    match result {
        Ok(()) => {
            let bytes = fs::metadata(output_path)?.len();
            info!(
                path = %output_path.display(),
                entries = pdfs.len(),
                bytes,
                "ZIP written"
            );
            Ok(bytes)
        }
        Err(e) => {
            let _ = fs::remove_file(output_path);
            Err(e)
        }
    }
}

/// Write the archive into an in-memory buffer.
pub fn zip_to_vec(pdfs: &[NamedPdf]) -> Result<Vec<u8>, ArchiveError> {
    let mut cursor = io::Cursor::new(Vec::new());
    write_entries(pdfs, &mut cursor)?;
    Ok(cursor.into_inner())
}

fn write_entries<W: Write + Seek>(pdfs: &[NamedPdf], sink: W) -> Result<(), ArchiveError> {
    let mut zip = ZipWriter::new(sink);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut taken = HashSet::new();

    for pdf in pdfs {
        let name = unique_entry_name(&pdf.name, &mut taken);
        debug!(entry = %name, source = %pdf.path.display(), "Adding ZIP entry");
        zip.start_file(name, options)?;
        io::copy(&mut File::open(&pdf.path)?, &mut zip)?;
    }

    zip.finish()?;
    Ok(())
}

fn unique_entry_name(name: &str, taken: &mut HashSet<String>) -> String {
    if taken.insert(name.to_string()) {
        return name.to_string();
    }

    let path = Path::new(name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut n = 2;
    loop {
        let candidate = format!("{stem} ({n}){ext}");
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}
