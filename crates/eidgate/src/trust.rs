use eidgate_core::{AuthenticationService, Certificate, ErrorCode, ProviderError, ProviderResult, Timestamp};

/// Accepts authentication chains issued by a configured set of issuers.
///
/// Every certificate in the chain must be within its validity window and
/// the chain's last certificate must come from a trusted issuer. An empty
/// issuer list trusts every issuer.
pub struct IssuerAllowList {
    trusted_issuers: Vec<String>,
}

impl IssuerAllowList {
    pub fn new(trusted_issuers: Vec<String>) -> Self {
        Self { trusted_issuers }
    }

    fn is_trusted(&self, issuer: &str) -> bool {
        self.trusted_issuers.is_empty() || self.trusted_issuers.iter().any(|t| t == issuer)
    }
}

impl AuthenticationService for IssuerAllowList {
    fn validate_certificate_chain(&self, chain: &[Certificate]) -> ProviderResult<()> {
        let (leaf, anchor) = match (chain.first(), chain.last()) {
            (Some(leaf), Some(anchor)) => (leaf, anchor),
            _ => {
                return Err(ProviderError::refused(
                    ErrorCode::Certificate,
                    "empty certificate chain",
                ))
            }
        };
        let now = Timestamp::now();
        if let Some(expired) = chain.iter().find(|c| !c.is_valid_at(&now)) {
            return Err(ProviderError::refused(
                ErrorCode::CertificateExpired,
                format!("certificate {} outside its validity period", expired.subject),
            ));
        }
        if !self.is_trusted(&anchor.issuer) {
            tracing::info!(subject = %leaf.subject, issuer = %anchor.issuer, "untrusted issuer");
            return Err(ProviderError::refused(
                ErrorCode::CertificateNotTrusted,
                format!("issuer {} is not trusted", anchor.issuer),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn certificate(issuer: &str, not_after_offset: i64) -> Certificate {
        let now = Timestamp::now().seconds_since_epoch;
        Certificate {
            subject: "CN=Alice".into(),
            issuer: issuer.into(),
            public_key: vec![1; 32],
            not_before: Timestamp::from_seconds(now - 3600),
            not_after: Timestamp::from_seconds((now as i64 + not_after_offset) as u64),
        }
    }

    fn code(result: ProviderResult<()>) -> Option<ErrorCode> {
        match result {
            Err(ProviderError::Refused { code, .. }) => Some(code),
            _ => None,
        }
    }

    #[test]
    fn test_trusted_issuer_accepted() {
        let trust = IssuerAllowList::new(vec!["CN=Citizen CA".into()]);
        assert!(trust
            .validate_certificate_chain(&[certificate("CN=Citizen CA", 3600)])
            .is_ok());
    }

    #[test]
    fn test_untrusted_issuer_refused() {
        let trust = IssuerAllowList::new(vec!["CN=Citizen CA".into()]);
        assert_eq!(
            code(trust.validate_certificate_chain(&[certificate("CN=Rogue CA", 3600)])),
            Some(ErrorCode::CertificateNotTrusted)
        );
    }

    #[test]
    fn test_empty_list_trusts_everyone() {
        let trust = IssuerAllowList::new(Vec::new());
        assert!(trust
            .validate_certificate_chain(&[certificate("CN=Anyone", 3600)])
            .is_ok());
    }

    #[test]
    fn test_expired_certificate_refused() {
        let trust = IssuerAllowList::new(Vec::new());
        assert_eq!(
            code(trust.validate_certificate_chain(&[certificate("CN=Citizen CA", -60)])),
            Some(ErrorCode::CertificateExpired)
        );
    }

    #[test]
    fn test_empty_chain_refused() {
        let trust = IssuerAllowList::new(Vec::new());
        assert_eq!(
            code(trust.validate_certificate_chain(&[])),
            Some(ErrorCode::Certificate)
        );
    }
}
