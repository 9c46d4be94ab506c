//! Streaming tar / tar.gz handling: selective extraction of call entries
//! and repackaging of the extracted files into a new archive.
mod extract;
mod package;

pub use extract::{EntryMatcher, extract_from_stream};
pub use package::package_files;

#[cfg(test)]
pub(crate) mod test_support;
