//! Indicator classification
//!
//! Derives the data type of an artifact payload. Checks run in a fixed order:
//! IP literal, domain, URL, email, hash (by length), CPE. Anything else is
//! unclassified and therefore an invalid artifact.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::CoreError;

/// Recognized indicator shapes
///
/// The declaration order is the sort order used during normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// IPv4 or IPv6 literal
    Ip,
    /// Domain name
    Domain,
    /// http(s) URL
    Url,
    /// Email address
    Mail,
    /// MD5 hash
    Md5,
    /// SHA1 hash
    Sha1,
    /// SHA256 hash
    Sha256,
    /// CPE string (2.2 URI or 2.3 formatted)
    Cpe,
}

impl DataType {
    pub const ALL: [DataType; 8] = [
        DataType::Ip,
        DataType::Domain,
        DataType::Url,
        DataType::Mail,
        DataType::Md5,
        DataType::Sha1,
        DataType::Sha256,
        DataType::Cpe,
    ];

    /// Every data type, used as the default allow-list of a rule
    pub fn all() -> Vec<DataType> {
        Self::ALL.to_vec()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Ip => "ip",
            DataType::Domain => "domain",
            DataType::Url => "url",
            DataType::Mail => "mail",
            DataType::Md5 => "md5",
            DataType::Sha1 => "sha1",
            DataType::Sha256 => "sha256",
            DataType::Cpe => "cpe",
        }
    }

    /// Classify a payload, returning `None` when it matches no known shape
    pub fn classify(data: &str) -> Option<DataType> {
        if data.parse::<IpAddr>().is_ok() {
            return Some(DataType::Ip);
        }
        if DOMAIN_REGEX.is_match(data) {
            return Some(DataType::Domain);
        }
        if URL_REGEX.is_match(data) {
            return Some(DataType::Url);
        }
        if EMAIL_REGEX.is_match(data) {
            return Some(DataType::Mail);
        }
        if HEX_REGEX.is_match(data) {
            match data.len() {
                32 => return Some(DataType::Md5),
                40 => return Some(DataType::Sha1),
                64 => return Some(DataType::Sha256),
                _ => {}
            }
        }
        if CPE_REGEX.is_match(data) {
            return Some(DataType::Cpe);
        }
        None
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DataType::ALL
            .into_iter()
            .find(|dt| dt.as_str() == s)
            .ok_or_else(|| CoreError::Validation(format!("unknown data type: {}", s)))
    }
}

/// Extract the host of a URL payload
pub fn url_host(url: &str) -> Option<&str> {
    URL_REGEX
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

static DOMAIN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[a-zA-Z0-9_](?:[a-zA-Z0-9_-]{0,61}[a-zA-Z0-9])?\.)+[a-zA-Z]{2,63}\.?$").unwrap()
});

static URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i:https?)://(?:[^\s@/?#]*@)?(\[[0-9a-fA-F:.]+\]|[^\s:/?#\[\]]+)(?::\d{1,5})?(?:[/?#]\S*)?$")
        .unwrap()
});

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@(?:[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?\.)+[A-Za-z]{2,}$").unwrap()
});

static HEX_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-fA-F0-9]+$").unwrap());

static CPE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^cpe:(?:/[aho](?::[^:\s]*)*|2\.3:[aho*\-](?::[^:\s]*){10})$").unwrap()
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_ip() {
        assert_eq!(DataType::classify("1.2.3.4"), Some(DataType::Ip));
        assert_eq!(DataType::classify("2001:db8::1"), Some(DataType::Ip));
        assert_eq!(DataType::classify("999.1.1.1"), None);
    }

    #[test]
    fn test_classify_domain_and_url() {
        assert_eq!(DataType::classify("evil.example.com"), Some(DataType::Domain));
        assert_eq!(
            DataType::classify("https://evil.example.com/login?next=1"),
            Some(DataType::Url)
        );
        assert_eq!(DataType::classify("ftp://example.com"), None);
        assert_eq!(DataType::classify("localhost"), None);
    }

    #[test]
    fn test_classify_mail() {
        assert_eq!(DataType::classify("admin@example.com"), Some(DataType::Mail));
    }

    #[test]
    fn test_classify_hashes() {
        assert_eq!(
            DataType::classify("d41d8cd98f00b204e9800998ecf8427e"),
            Some(DataType::Md5)
        );
        assert_eq!(
            DataType::classify("da39a3ee5e6b4b0d3255bfef95601890afd80709"),
            Some(DataType::Sha1)
        );
        assert_eq!(
            DataType::classify(
                "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
            ),
            Some(DataType::Sha256)
        );
        // hex but no hash length
        assert_eq!(DataType::classify("deadbeef"), None);
    }

    #[test]
    fn test_classify_cpe() {
        assert_eq!(
            DataType::classify("cpe:/a:apache:http_server:2.4.49"),
            Some(DataType::Cpe)
        );
        assert_eq!(
            DataType::classify("cpe:2.3:a:apache:http_server:2.4.49:*:*:*:*:*:*:*"),
            Some(DataType::Cpe)
        );
    }

    #[test]
    fn test_unclassified() {
        assert_eq!(DataType::classify(""), None);
        assert_eq!(DataType::classify("not an indicator"), None);
    }

    #[test]
    fn test_url_host() {
        assert_eq!(url_host("https://user@evil.example.com:8443/x"), Some("evil.example.com"));
        assert_eq!(url_host("http://1.2.3.4/"), Some("1.2.3.4"));
        assert_eq!(url_host("evil.example.com"), None);
    }

    #[test]
    fn test_from_str_roundtrips_names() {
        for dt in DataType::ALL {
            assert_eq!(dt.as_str().parse::<DataType>().unwrap(), dt);
        }
        assert!("hash".parse::<DataType>().is_err());
    }
}
