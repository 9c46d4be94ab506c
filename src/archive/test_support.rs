// Fixtures shared by the archive and restore tests.
use flate2::Compression;
use flate2::write::GzEncoder;
use std::io::Write;
use tar::{Builder, EntryType, Header};

/// Builds a header with the raw name bytes, bypassing the path checks
/// `tar::Builder` applies, so hostile names can be produced.
fn raw_header(name: &str, size: u64, entry_type: EntryType) -> Header {
    let mut header = Header::new_old();
    let bytes = name.as_bytes();
    header.as_old_mut().name[..bytes.len()].copy_from_slice(bytes);
    header.set_size(size);
    header.set_mode(0o644);
    header.set_entry_type(entry_type);
    header.set_cksum();
    header
}

/// Builds an archive in memory. Names ending in `/` become directory entries.
pub fn build_tar(entries: &[(&str, &[u8])], gzip: bool) -> Vec<u8> {
    let mut builder = Builder::new(Vec::new());
    for (name, data) in entries {
        if name.ends_with('/') {
            let header = raw_header(name, 0, EntryType::Directory);
            builder.append(&header, std::io::empty()).unwrap();
        } else {
            let header = raw_header(name, data.len() as u64, EntryType::Regular);
            builder.append(&header, *data).unwrap();
        }
    }
    let tar = builder.into_inner().unwrap();

    if gzip {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&tar).unwrap();
        encoder.finish().unwrap()
    } else {
        tar
    }
}

/// Lists `(name, contents)` of every regular entry of an archive on disk.
pub fn read_entries(path: &std::path::Path, gzip: bool) -> Vec<(String, Vec<u8>)> {
    use std::io::Read;

    let file = std::fs::File::open(path).unwrap();
    let reader: Box<dyn Read> = if gzip {
        Box::new(flate2::read::GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    let mut archive = tar::Archive::new(reader);
    let mut out = Vec::new();
    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        let name = entry.path().unwrap().to_string_lossy().into_owned();
        let mut data = Vec::new();
        entry.read_to_end(&mut data).unwrap();
        out.push((name, data));
    }
    out
}
