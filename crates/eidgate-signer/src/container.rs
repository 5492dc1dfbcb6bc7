//! OpenDocument container access and finalisation.
//!
//! A container is a ZIP archive of named parts. One part,
//! [`SIGNATURE_PART`], holds the document signatures; every other
//! non-directory part is signable content.

use std::io::{Cursor, Read, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{SignerError, SignerResult};
use crate::xml;

/// Reserved part holding the signature manifest.
pub const SIGNATURE_PART: &str = "META-INF/documentsignatures.xml";

const MANIFEST_NAMESPACE: &str = "urn:oasis:names:tc:opendocument:xmlns:digitalsignature:1.0";
const MANIFEST_CLOSE: &str = "</document-signatures>";

// ---------------------------------------------------------------------------
// Container
// ---------------------------------------------------------------------------

pub struct Container {
    bytes: Vec<u8>,
    names: Vec<String>,
    directories: Vec<bool>,
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("size", &self.bytes.len())
            .field("parts", &self.names)
            .finish()
    }
}

impl Container {
    /// Parse an archive. Anything that is not a readable ZIP archive is an
    /// unsupported container format.
    pub fn parse(bytes: Vec<u8>) -> SignerResult<Self> {
        let (names, directories) = list_parts(&bytes)
            .map_err(|e| SignerError::UnsupportedContainerFormat(e.to_string()))?;
        Ok(Self {
            bytes,
            names,
            directories,
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Part names in archive order.
    pub fn part_names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn read_part(&self, name: &str) -> SignerResult<Vec<u8>> {
        let mut archive = ZipArchive::new(Cursor::new(self.bytes.as_slice()))?;
        let mut file = archive.by_name(name)?;
        let mut content = Vec::new();
        file.read_to_end(&mut content)?;
        Ok(content)
    }

    /// Part content as it is digested: XML parts with normalised line endings.
    pub fn digest_input(&self, name: &str) -> SignerResult<Vec<u8>> {
        let content = self.read_part(name)?;
        if is_xml_part(name) {
            Ok(normalize_line_endings(&content))
        } else {
            Ok(content)
        }
    }

    /// Every non-directory part except the signature manifest, in archive order.
    pub fn signable_parts(&self) -> Vec<&str> {
        self.names
            .iter()
            .zip(&self.directories)
            .filter(|(name, is_dir)| !**is_dir && name.as_str() != SIGNATURE_PART)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Current signature manifest, if the container was signed before.
    pub fn signature_manifest(&self) -> SignerResult<Option<String>> {
        if !self.contains(SIGNATURE_PART) {
            return Ok(None);
        }
        let bytes = self.read_part(SIGNATURE_PART)?;
        String::from_utf8(bytes)
            .map(Some)
            .map_err(|e| SignerError::MalformedSignatureBlock(e.to_string()))
    }

    /// Resolve a reference URI against this container.
    ///
    /// `#id` fragments resolve within `signature_block`; anything else is a
    /// part name relative to the container root. Returns `None` when the
    /// container holds nothing under that URI.
    pub fn dereference(&self, uri: &str, signature_block: &str) -> SignerResult<Option<Vec<u8>>> {
        if let Some(id) = uri.strip_prefix('#') {
            return Ok(xml::find_by_id(signature_block, id).map(|e| e.outer.as_bytes().to_vec()));
        }
        if uri.contains("://") {
            return Ok(None);
        }
        let name = percent_decode(uri.strip_prefix("./").unwrap_or(uri));
        if name == SIGNATURE_PART || !self.contains(&name) {
            return Ok(None);
        }
        self.digest_input(&name).map(Some)
    }

    /// Copy the container with `signature` added to the signature manifest.
    ///
    /// Every other part is copied raw, keeping order and compressed bytes.
    /// An existing manifest is replaced in place; a new one goes last.
    pub fn finalize(&self, signature: &str) -> SignerResult<Vec<u8>> {
        let manifest = merge_manifest(self.signature_manifest()?.as_deref(), signature)?;
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        let mut archive = ZipArchive::new(Cursor::new(self.bytes.as_slice()))?;
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let mut written = false;
        for index in 0..archive.len() {
            let file = archive.by_index_raw(index)?;
            if file.name() == SIGNATURE_PART {
                writer.start_file(SIGNATURE_PART, options)?;
                writer.write_all(manifest.as_bytes())?;
                written = true;
            } else {
                writer.raw_copy_file(file)?;
            }
        }
        if !written {
            writer.start_file(SIGNATURE_PART, options)?;
            writer.write_all(manifest.as_bytes())?;
        }
        let out = writer.finish()?;
        tracing::debug!(
            parts = archive.len() + usize::from(!written),
            appended = !written,
            "container finalized"
        );
        Ok(out.into_inner())
    }
}

fn list_parts(bytes: &[u8]) -> zip::result::ZipResult<(Vec<String>, Vec<bool>)> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut names = Vec::with_capacity(archive.len());
    let mut directories = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let file = archive.by_index_raw(index)?;
        names.push(file.name().to_string());
        directories.push(file.is_dir());
    }
    Ok((names, directories))
}

fn merge_manifest(existing: Option<&str>, signature: &str) -> SignerResult<String> {
    match existing {
        None => Ok(format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<document-signatures xmlns=\"{}\">\n{}\n{}\n",
            MANIFEST_NAMESPACE, signature, MANIFEST_CLOSE
        )),
        Some(manifest) => {
            let close = manifest.rfind(MANIFEST_CLOSE).ok_or_else(|| {
                SignerError::MalformedSignatureBlock("signature manifest is not closed".into())
            })?;
            let mut merged = String::with_capacity(manifest.len() + signature.len() + 1);
            merged.push_str(&manifest[..close]);
            merged.push_str(signature);
            merged.push('\n');
            merged.push_str(&manifest[close..]);
            Ok(merged)
        }
    }
}

// ---------------------------------------------------------------------------
// Part names and content
// ---------------------------------------------------------------------------

pub fn is_xml_part(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".xml") || lower.ends_with(".rdf")
}

/// CRLF and lone CR become LF.
pub fn normalize_line_endings(content: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len());
    let mut iter = content.iter().peekable();
    while let Some(&b) = iter.next() {
        if b == b'\r' {
            if iter.peek() == Some(&&b'\n') {
                iter.next();
            }
            out.push(b'\n');
        } else {
            out.push(b);
        }
    }
    out
}

/// Encode a part name for use as a reference URI.
pub fn percent_encode(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for &b in name.as_bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~' | b'/') {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    out
}

/// Malformed escapes are kept literally.
pub fn percent_decode(uri: &str) -> String {
    let bytes = uri.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Some(value) = std::str::from_utf8(&bytes[i + 1..i + 3])
                .ok()
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
            {
                out.push(value);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
