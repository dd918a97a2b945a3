//! Compressed repository documents.
//!
//! Repository indexes are published plain, gzip-compressed (`repository.xml.gz`)
//! or packed in a zip archive next to the bundles (`repository.zip`). The
//! container is detected from the leading magic bytes, never from the file name.

use std::io::{Cursor, Read};

use flate2::read::GzDecoder;

use crate::errors::{ObrError, ObrResult};

/// Entry looked up inside zip archives.
pub const ZIP_ENTRY_NAME: &str = "repository.xml";

/// Container formats recognised for repository documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    Plain,
    Gzip,
    Zip,
}

impl Container {
    /// Detect the container from magic bytes.
    ///
    /// - Gzip: `1f 8b`
    /// - Zip: `50 4b 03 04` (`PK\x03\x04`)
    pub fn sniff(data: &[u8]) -> Self {
        if data.starts_with(&[0x1f, 0x8b]) {
            Self::Gzip
        } else if data.starts_with(b"PK\x03\x04") {
            Self::Zip
        } else {
            Self::Plain
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Gzip => "gzip",
            Self::Zip => "zip",
        }
    }
}

impl std::fmt::Display for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Unwrap a fetched document: gunzip or extract `repository.xml` as needed.
///
/// `uri` is only used for error messages.
pub fn decode_document(uri: &str, data: Vec<u8>) -> ObrResult<Vec<u8>> {
    let container = Container::sniff(&data);
    tracing::debug!("Repository document {uri} uses {container} container");
    match container {
        Container::Plain => Ok(data),
        Container::Gzip => {
            let mut out = Vec::with_capacity(data.len() * 4);
            GzDecoder::new(data.as_slice())
                .read_to_end(&mut out)
                .map_err(|e| ObrError::RepositoryFormat {
                    uri: uri.to_string(),
                    message: format!("corrupt gzip stream: {e}"),
                })?;
            Ok(out)
        }
        Container::Zip => {
            let mut archive =
                zip::ZipArchive::new(Cursor::new(data)).map_err(|e| ObrError::RepositoryFormat {
                    uri: uri.to_string(),
                    message: format!("corrupt zip archive: {e}"),
                })?;
            let mut entry =
                archive
                    .by_name(ZIP_ENTRY_NAME)
                    .map_err(|_| ObrError::RepositoryFormat {
                        uri: uri.to_string(),
                        message: format!("zip archive has no {ZIP_ENTRY_NAME} entry"),
                    })?;
            let mut out = Vec::new();
            entry
                .read_to_end(&mut out)
                .map_err(|e| ObrError::RepositoryFormat {
                    uri: uri.to_string(),
                    message: format!("failed to extract {ZIP_ENTRY_NAME}: {e}"),
                })?;
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniff_detects_containers() {
        assert_eq!(Container::sniff(&[0x1f, 0x8b, 0x08]), Container::Gzip);
        assert_eq!(Container::sniff(b"PK\x03\x04rest"), Container::Zip);
        assert_eq!(Container::sniff(b"<repository/>"), Container::Plain);
        assert_eq!(Container::sniff(b""), Container::Plain);
        assert_eq!(Container::sniff(&[0x1f]), Container::Plain);
    }

    #[test]
    fn plain_passes_through() {
        let out = decode_document("mem:", b"{}".to_vec()).unwrap();
        assert_eq!(out, b"{}");
    }

    #[test]
    fn truncated_gzip_is_format_error() {
        let err = decode_document("mem:", vec![0x1f, 0x8b, 0x08, 0x00]).unwrap_err();
        assert!(matches!(err, ObrError::RepositoryFormat { .. }), "got: {err}");
    }
}
