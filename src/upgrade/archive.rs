use flate2::read::GzDecoder;
use std::io::Read;
use tracing::debug;

use super::download::prealloc;
use super::error::UpgradeError;

/// File name prefix of the executable inside release archives.
pub const EXECUTABLE_PREFIX: &str = "cf";

/// The executable pulled out of a release archive.
#[derive(Debug)]
pub struct ExtractedExecutable {
    pub name: String,
    /// Size recorded in the tar header.
    pub declared_size: u64,
    pub bytes: Vec<u8>,
}

/// Find the first regular file in a `.tar.gz` whose base name starts with
/// `prefix` and return its contents.
///
/// Entries after the match are never read.
pub fn extract_executable(
    archive: &[u8],
    prefix: &str,
) -> Result<ExtractedExecutable, UpgradeError> {
    let mut ar = tar::Archive::new(GzDecoder::new(archive));

    for entry in ar.entries().map_err(UpgradeError::ArchiveCorrupt)? {
        let mut e = entry.map_err(UpgradeError::ArchiveCorrupt)?;
        if !e.header().entry_type().is_file() {
            continue;
        }
        let name = {
            let path = e.path().map_err(UpgradeError::ArchiveCorrupt)?;
            match path.file_name().and_then(|s| s.to_str()) {
                Some(name) if name.starts_with(prefix) => name.to_string(),
                _ => continue,
            }
        };

        let declared_size = e.size();
        debug!(%name, declared_size, "executable found in archive");
        let mut bytes = Vec::with_capacity(prealloc(declared_size));
        e.read_to_end(&mut bytes).map_err(UpgradeError::ArchiveCorrupt)?;
        return Ok(ExtractedExecutable {
            name,
            declared_size,
            bytes,
        });
    }

    Err(UpgradeError::ExecutableNotFound {
        prefix: prefix.to_string(),
    })
}
