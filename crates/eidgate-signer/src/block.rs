//! The signature block: an XML-DSig shaped `ds:Signature` element with
//! XAdES style signed properties.
//!
//! ```text
//! ds:Signature Id=<id>
//!   ds:SignedInfo            <- digested, the digest is what the card signs
//!     ds:Reference URI=part  (one per signed part, then extra references)
//!     ds:Reference URI=#<id>-signed-properties
//!   ds:SignatureValue
//!   ds:KeyInfo / ds:X509Data / ds:X509Certificate*   (leaf first)
//!   ds:Object / xd:QualifyingProperties / xd:SignedProperties
//! ```

use base64::{engine::general_purpose::STANDARD, Engine};
use eidgate_core::{Certificate, Timestamp};

use crate::digest::{DigestAlgorithm, SIGNATURE_METHOD_ED25519};
use crate::error::{SignerError, SignerResult};
use crate::xml::{self, escape};

pub const DSIG_NAMESPACE: &str = "http://www.w3.org/2000/09/xmldsig#";
pub const XADES_NAMESPACE: &str = "http://uri.etsi.org/01903/v1.3.2#";
pub const SIGNED_PROPERTIES_TYPE: &str = "http://uri.etsi.org/01903#SignedProperties";
/// Reference type of a file digested by the client outside the container.
pub const EXTERNAL_FILE_TYPE: &str = "urn:eidgate:reference:external-file";
const CANONICALIZATION_METHOD: &str = "http://www.w3.org/2006/12/xml-c14n11";

pub fn signed_properties_id(signature_id: &str) -> String {
    format!("{}-signed-properties", signature_id)
}

// ---------------------------------------------------------------------------
// References
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub uri: String,
    pub reference_type: Option<String>,
    pub digest_algorithm: DigestAlgorithm,
    pub digest_value: Vec<u8>,
}

impl Reference {
    pub fn to_xml(&self) -> String {
        let type_attr = self
            .reference_type
            .as_deref()
            .map(|t| format!(" Type=\"{}\"", escape(t)))
            .unwrap_or_default();
        format!(
            "<ds:Reference{} URI=\"{}\"><ds:DigestMethod Algorithm=\"{}\"/><ds:DigestValue>{}</ds:DigestValue></ds:Reference>",
            type_attr,
            escape(&self.uri),
            self.digest_algorithm.uri(),
            STANDARD.encode(&self.digest_value)
        )
    }

    fn parse(element: &xml::Element<'_>) -> SignerResult<Self> {
        let uri = element
            .attribute("URI")
            .ok_or_else(|| malformed("reference without URI"))?;
        let method = element
            .child("ds:DigestMethod")
            .and_then(|m| m.attribute("Algorithm"))
            .ok_or_else(|| malformed("reference without digest method"))?;
        let digest_algorithm = DigestAlgorithm::from_uri(&method)
            .ok_or(SignerError::UnsupportedDigestAlgorithm(method))?;
        let digest_value = decode_b64(
            &element
                .child("ds:DigestValue")
                .ok_or_else(|| malformed("reference without digest value"))?
                .text(),
        )?;
        Ok(Self {
            uri,
            reference_type: element.attribute("Type"),
            digest_algorithm,
            digest_value,
        })
    }
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

pub fn signed_properties(
    signature_id: &str,
    signing_time: &Timestamp,
    digest_algorithm: DigestAlgorithm,
    signing_certificate: Option<&Certificate>,
) -> SignerResult<String> {
    let mut out = format!(
        "<xd:SignedProperties Id=\"{}\"><xd:SignedSignatureProperties><xd:SigningTime>{}</xd:SigningTime>",
        escape(&signed_properties_id(signature_id)),
        signing_time.to_rfc3339()
    );
    if let Some(certificate) = signing_certificate {
        let digest = digest_algorithm.digest(&certificate.encode()?);
        out.push_str(&format!(
            "<xd:SigningCertificate><xd:Cert><xd:CertDigest><ds:DigestMethod Algorithm=\"{}\"/><ds:DigestValue>{}</ds:DigestValue></xd:CertDigest><xd:IssuerSerial>{}</xd:IssuerSerial></xd:Cert></xd:SigningCertificate>",
            digest_algorithm.uri(),
            STANDARD.encode(digest),
            escape(&certificate.issuer)
        ));
    }
    out.push_str("</xd:SignedSignatureProperties></xd:SignedProperties>");
    Ok(out)
}

pub fn signed_info(references: &[Reference]) -> String {
    let mut out = format!(
        "<ds:SignedInfo><ds:CanonicalizationMethod Algorithm=\"{}\"/><ds:SignatureMethod Algorithm=\"{}\"/>",
        CANONICALIZATION_METHOD, SIGNATURE_METHOD_ED25519
    );
    for reference in references {
        out.push_str(&reference.to_xml());
    }
    out.push_str("</ds:SignedInfo>");
    out
}

/// Assemble the complete block around the exact SignedInfo and
/// SignedProperties text produced at pre-sign time.
pub fn signature(
    signature_id: &str,
    signed_info: &str,
    signed_properties: &str,
    signature_value: &[u8],
    chain: &[Certificate],
) -> SignerResult<String> {
    let mut certificates = String::new();
    for certificate in chain {
        certificates.push_str(&format!(
            "<ds:X509Certificate>{}</ds:X509Certificate>",
            STANDARD.encode(certificate.encode()?)
        ));
    }
    Ok(format!(
        "<ds:Signature xmlns:ds=\"{ds}\" Id=\"{id}\">{info}<ds:SignatureValue>{value}</ds:SignatureValue><ds:KeyInfo><ds:X509Data>{certs}</ds:X509Data></ds:KeyInfo><ds:Object><xd:QualifyingProperties xmlns:xd=\"{xd}\" Target=\"#{id}\">{props}</xd:QualifyingProperties></ds:Object></ds:Signature>",
        ds = DSIG_NAMESPACE,
        id = escape(signature_id),
        info = signed_info,
        value = STANDARD.encode(signature_value),
        certs = certificates,
        xd = XADES_NAMESPACE,
        props = signed_properties,
    ))
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// A signature block read back from a manifest.
#[derive(Debug, Clone)]
pub struct ParsedSignature {
    pub signature_id: String,
    /// Exact SignedInfo text, as digested at signing time.
    pub signed_info: String,
    pub references: Vec<Reference>,
    pub signature_value: Vec<u8>,
    pub chain: Vec<Certificate>,
    pub signing_time: Option<String>,
    pub certificate_digest: Option<(DigestAlgorithm, Vec<u8>)>,
    /// The whole `ds:Signature` element, for same-document references.
    pub block: String,
}

impl ParsedSignature {
    /// Digest algorithm the SignedInfo was hashed with before signing.
    pub fn signed_info_digest_algorithm(&self) -> DigestAlgorithm {
        self.references
            .iter()
            .find(|r| r.reference_type.as_deref() == Some(SIGNED_PROPERTIES_TYPE))
            .map(|r| r.digest_algorithm)
            .unwrap_or_default()
    }
}

/// Every signature block of a manifest. Blocks that cannot be read are
/// returned as errors in place, so one bad block does not hide the others.
pub fn parse_manifest(manifest: &str) -> Vec<(String, SignerResult<ParsedSignature>)> {
    xml::elements(manifest, "ds:Signature")
        .into_iter()
        .map(|element| {
            let id = element.attribute("Id").unwrap_or_default();
            (id, parse_signature(&element))
        })
        .collect()
}

fn parse_signature(element: &xml::Element<'_>) -> SignerResult<ParsedSignature> {
    let signature_id = element
        .attribute("Id")
        .ok_or_else(|| malformed("signature without Id"))?;
    let signed_info = element
        .child("ds:SignedInfo")
        .ok_or_else(|| malformed("signature without SignedInfo"))?;
    let references = signed_info
        .children("ds:Reference")
        .iter()
        .map(Reference::parse)
        .collect::<SignerResult<Vec<_>>>()?;
    let signature_value = decode_b64(
        &element
            .child("ds:SignatureValue")
            .ok_or_else(|| malformed("signature without SignatureValue"))?
            .text(),
    )?;
    let chain = element
        .child("ds:KeyInfo")
        .map(|key_info| key_info.children("ds:X509Certificate"))
        .unwrap_or_default()
        .iter()
        .map(|c| {
            let der = decode_b64(&c.text())?;
            Certificate::decode(&der).map_err(|e| malformed(&e.to_string()))
        })
        .collect::<SignerResult<Vec<_>>>()?;

    let properties = xml::find_by_id(element.outer, &signed_properties_id(&signature_id));
    let signing_time = properties
        .and_then(|p| p.child("xd:SigningTime"))
        .map(|t| t.text());
    let certificate_digest = match properties.and_then(|p| p.child("xd:CertDigest")) {
        Some(cert_digest) => {
            let method = cert_digest
                .child("ds:DigestMethod")
                .and_then(|m| m.attribute("Algorithm"))
                .ok_or_else(|| malformed("certificate digest without method"))?;
            let algorithm = DigestAlgorithm::from_uri(&method)
                .ok_or(SignerError::UnsupportedDigestAlgorithm(method))?;
            let value = decode_b64(
                &cert_digest
                    .child("ds:DigestValue")
                    .ok_or_else(|| malformed("certificate digest without value"))?
                    .text(),
            )?;
            Some((algorithm, value))
        }
        None => None,
    };

    Ok(ParsedSignature {
        signature_id,
        signed_info: signed_info.outer.to_string(),
        references,
        signature_value,
        chain,
        signing_time,
        certificate_digest,
        block: element.outer.to_string(),
    })
}

fn decode_b64(text: &str) -> SignerResult<Vec<u8>> {
    STANDARD
        .decode(text.as_bytes())
        .map_err(|e| malformed(&format!("invalid base64: {}", e)))
}

fn malformed(reason: &str) -> SignerError {
    SignerError::MalformedSignatureBlock(reason.to_string())
}
