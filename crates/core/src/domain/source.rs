use std::fmt;

use serde::{Deserialize, Serialize};

const URL_DOMAIN: &[u8] = b"pricelens.source.url\0";
const DOCUMENT_DOMAIN: &[u8] = b"pricelens.source.document\0";

/// Content-addressed identity of a pricing source, used as the cache key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(pub String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PricingSource {
    Url { url: String },
    Document { content: String },
}

impl PricingSource {
    pub fn url(url: impl Into<String>) -> Self {
        Self::Url { url: url.into() }
    }

    pub fn document(content: impl Into<String>) -> Self {
        Self::Document { content: content.into() }
    }

    /// URLs hash their trimmed string, documents hash their exact bytes. The two
    /// kinds are domain-separated so a document whose text is a URL never
    /// collides with that URL.
    pub fn fingerprint(&self) -> Fingerprint {
        let mut hasher = blake3::Hasher::new();
        match self {
            Self::Url { url } => {
                hasher.update(URL_DOMAIN);
                hasher.update(url.trim().as_bytes());
            }
            Self::Document { content } => {
                hasher.update(DOCUMENT_DOMAIN);
                hasher.update(content.as_bytes());
            }
        }
        Fingerprint(hasher.finalize().to_hex().to_string())
    }

    /// Human-readable reference used in plan traces and logs.
    pub fn label(&self) -> String {
        match self {
            Self::Url { url } => url.trim().to_string(),
            Self::Document { .. } => format!("document:{}", self.fingerprint().short()),
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            Self::Url { url } => url.trim().is_empty(),
            Self::Document { content } => content.trim().is_empty(),
        }
    }
}
