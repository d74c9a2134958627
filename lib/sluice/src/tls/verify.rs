//! Peer identity checks layered on top of the engine's own chain
//! verification.

use crate::tls::engine::Certificate;

/// True when `hostname` is covered by the certificate's identities. The
/// subjectAltName DNS entries are authoritative when present; the subject
/// common name is only a fallback for certificates without any. An
/// embedded NUL in either side is an automatic mismatch, closing the
/// classic truncated-comparison hole.
pub fn matches_hostname(cert: &dyn Certificate, hostname: &str) -> bool {
    let alt_names = cert.alt_names();

    if !alt_names.is_empty() {
        return alt_names.iter().any(|name| name_matches(name, hostname));
    }

    match cert.subject_common_name() {
        Some(name) => name_matches(name, hostname),
        None => false,
    }
}

/// Exact match, or a single leftmost-label wildcard (`*.example.com`).
/// The wildcard never spans a dot and never matches a bare domain.
fn name_matches(pattern: &str, hostname: &str) -> bool {
    if pattern.contains('\0') || hostname.contains('\0') {
        return false;
    }

    if let Some(suffix) = strip_wildcard(pattern) {
        let mut labels = hostname.splitn(2, '.');
        let first = labels.next().unwrap_or("");
        let rest = match labels.next() {
            Some(rest) => rest,
            None => return false,
        };
        return !first.is_empty() && rest.eq_ignore_ascii_case(suffix);
    }

    pattern.eq_ignore_ascii_case(hostname)
}

fn strip_wildcard(pattern: &str) -> Option<&str> {
    if pattern.len() > 2 && pattern.as_bytes()[0] == b'*' && pattern.as_bytes()[1] == b'.' {
        Some(&pattern[2..])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestCert {
        cn: Option<String>,
        alt: Vec<String>,
    }

    impl Certificate for TestCert {
        fn subject_common_name(&self) -> Option<&str> {
            self.cn.as_deref()
        }

        fn alt_names(&self) -> &[String] {
            &self.alt
        }
    }

    fn cert(cn: Option<&str>, alt: &[&str]) -> TestCert {
        TestCert {
            cn: cn.map(str::to_owned),
            alt: alt.iter().map(|name| (*name).to_owned()).collect(),
        }
    }

    #[test]
    fn test_exact_cn_match() {
        let cert = cert(Some("example.com"), &[]);
        assert!(matches_hostname(&cert, "example.com"));
        assert!(matches_hostname(&cert, "EXAMPLE.COM"));
        assert!(!matches_hostname(&cert, "other.com"));
    }

    #[test]
    fn test_alt_names_override_cn() {
        let cert = cert(Some("cn.example.com"), &["alt.example.com"]);
        assert!(matches_hostname(&cert, "alt.example.com"));
        // With SANs present the CN no longer counts.
        assert!(!matches_hostname(&cert, "cn.example.com"));
    }

    #[test]
    fn test_wildcard_leftmost_label() {
        let cert = cert(None, &["*.example.com"]);
        assert!(matches_hostname(&cert, "www.example.com"));
        assert!(matches_hostname(&cert, "api.EXAMPLE.com"));
        // The wildcard covers exactly one label.
        assert!(!matches_hostname(&cert, "a.b.example.com"));
        assert!(!matches_hostname(&cert, "example.com"));
    }

    #[test]
    fn test_embedded_nul_rejected() {
        let cert_cn = cert(Some("example.com\0evil.test"), &[]);
        assert!(!matches_hostname(&cert_cn, "example.com\0evil.test"));

        let cert_alt = cert(None, &["good.com\0bad.com"]);
        assert!(!matches_hostname(&cert_alt, "good.com"));
    }

    #[test]
    fn test_no_identities() {
        let cert = cert(None, &[]);
        assert!(!matches_hostname(&cert, "example.com"));
    }
}
