//! Link extraction: find URL-like tokens in message text, keeping their byte spans.

use std::{ops::Range, sync::OnceLock};

use regex::Regex;

use crate::{affiliate::Rewrite, resolver::Resolution};

/// A URL-like substring of the original text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CandidateUrl {
    /// Byte offset of the first character in the source text.
    pub start: usize,
    /// Byte length of the token in the source text.
    pub len: usize,
    /// The token exactly as it appears in the text.
    pub text: String,
}

impl CandidateUrl {
    pub fn span(&self) -> Range<usize> {
        self.start..self.start + self.len
    }

    pub fn has_scheme(&self) -> bool {
        let lower = self.text.to_ascii_lowercase();
        lower.starts_with("http://") || lower.starts_with("https://")
    }

    /// Fetchable form: bare `host.tld/path` tokens get an `https://` scheme.
    pub fn absolute(&self) -> String {
        if self.has_scheme() {
            self.text.clone()
        } else {
            format!("https://{}", self.text)
        }
    }
}

/// A candidate plus its canonical form. Merchant matching only ever sees `canonical()`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedUrl {
    pub candidate: CandidateUrl,
    pub resolution: Resolution,
}

impl ResolvedUrl {
    pub fn canonical(&self) -> &str {
        self.resolution.url()
    }
}

/// A resolved URL after the merchant rules ran over it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RewrittenLink {
    pub resolved: ResolvedUrl,
    pub rewrite: Rewrite,
}

impl RewrittenLink {
    pub fn candidate(&self) -> &CandidateUrl {
        &self.resolved.candidate
    }

    pub fn canonical(&self) -> &str {
        self.resolved.canonical()
    }
}

fn url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)\bhttps?://[^\s<>"]+|\b(?:[a-z0-9](?:[a-z0-9-]*[a-z0-9])?\.)+[a-z]{2,}/[^\s<>"]*"#)
            .expect("valid regex")
    })
}

/// Extract candidate URLs in order of appearance. Spans never overlap.
pub fn extract_links(text: &str) -> Vec<CandidateUrl> {
    url_regex()
        .find_iter(text)
        .filter_map(|m| {
            let token = trim_trailing_punctuation(m.as_str());
            if token.is_empty() {
                return None;
            }
            Some(CandidateUrl {
                start: m.start(),
                len: token.len(),
                text: token.to_string(),
            })
        })
        .collect()
}

/// Drop sentence punctuation that the greedy pattern swallowed.
///
/// A closing bracket is kept when the token contains its opening pair
/// (e.g. wikipedia-style `/Foo_(bar)`).
fn trim_trailing_punctuation(token: &str) -> &str {
    let mut out = token;
    loop {
        let Some(last) = out.chars().last() else {
            return out;
        };
        let strip = match last {
            '.' | ',' | ';' | ':' | '!' | '?' | '\'' | '*' | '…' => true,
            ')' => out.matches('(').count() < out.matches(')').count(),
            ']' => out.matches('[').count() < out.matches(']').count(),
            '}' => out.matches('{').count() < out.matches('}').count(),
            _ => false,
        };
        if !strip {
            return out;
        }
        out = &out[..out.len() - last.len_utf8()];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_scheme_urls_with_spans() {
        let text = "Confira: https://amzn.to/abc123";
        let links = extract_links(text);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].text, "https://amzn.to/abc123");
        assert_eq!(&text[links[0].span()], "https://amzn.to/abc123");
        assert!(links[0].has_scheme());
    }

    #[test]
    fn finds_bare_host_path_tokens() {
        let links = extract_links("oferta em amzn.to/xyz hoje");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].text, "amzn.to/xyz");
        assert_eq!(links[0].absolute(), "https://amzn.to/xyz");
    }

    #[test]
    fn bare_domain_without_path_is_not_a_link() {
        assert!(extract_links("visit example.com today").is_empty());
        assert!(extract_links("no links here").is_empty());
    }

    #[test]
    fn preserves_order_and_does_not_overlap() {
        let text = "a https://x.com/1 b https://x.com/12 c shop.com.br/p/3";
        let links = extract_links(text);
        let got: Vec<_> = links.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(got, vec!["https://x.com/1", "https://x.com/12", "shop.com.br/p/3"]);
        for pair in links.windows(2) {
            assert!(pair[0].span().end <= pair[1].start);
        }
    }

    #[test]
    fn trims_trailing_punctuation() {
        let links = extract_links("Veja (https://a.com/b). Ou https://c.com/d!");
        let got: Vec<_> = links.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(got, vec!["https://a.com/b", "https://c.com/d"]);
    }

    #[test]
    fn keeps_balanced_parentheses() {
        let links = extract_links("https://en.wikipedia.org/wiki/Rust_(language)");
        assert_eq!(links[0].text, "https://en.wikipedia.org/wiki/Rust_(language)");
    }

    #[test]
    fn spans_are_byte_offsets_with_multibyte_prefix() {
        let text = "🔥 Promo: https://amzn.to/q";
        let links = extract_links(text);
        assert_eq!(&text[links[0].span()], "https://amzn.to/q");
    }
}
