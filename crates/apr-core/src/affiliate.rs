//! Per-merchant affiliate rewriting.
//!
//! Merchants are a registered list of [`MerchantRule`]s. Matching is done on the
//! canonical URL's host; the first registered rule that matches wins. Every
//! rewrite is total: anything the rule cannot parse comes back unchanged.

use serde::{Deserialize, Serialize};
use url::{form_urlencoded, Url};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerchantRule {
    pub name: String,
    /// Host fragments, e.g. `amazon.com.br`. Matched as a substring of the host.
    pub domains: Vec<String>,
    pub strategy: RewriteStrategy,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RewriteStrategy {
    /// Add `key=value` to the query string.
    AppendParam { key: String, value: String },
    /// Replace the whole link with a static referral URL.
    Substitute { url: String },
    /// Insert `segment` at path index `position`, keeping the product path after it.
    PathSplice {
        segment: String,
        #[serde(default)]
        position: usize,
        /// On the affiliate host, an existing segment with this prefix is replaced
        /// rather than pushed right.
        #[serde(default)]
        replace_prefix: Option<String>,
        /// Affiliate storefront host to move the link to.
        #[serde(default)]
        host: Option<String>,
    },
}

/// Result of running a URL through the rule set. Every variant carries a usable URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rewrite {
    Applied { rule: String, url: String },
    /// A rule matched but left the URL as is (already tagged, or unparseable shape).
    Kept { rule: String, url: String },
    Unmatched(String),
}

impl Rewrite {
    pub fn url(&self) -> &str {
        match self {
            Rewrite::Applied { url, .. } | Rewrite::Kept { url, .. } => url,
            Rewrite::Unmatched(url) => url,
        }
    }

    pub fn rule(&self) -> Option<&str> {
        match self {
            Rewrite::Applied { rule, .. } | Rewrite::Kept { rule, .. } => Some(rule),
            Rewrite::Unmatched(_) => None,
        }
    }
}

impl MerchantRule {
    pub fn matches_host(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        self.domains
            .iter()
            .map(|d| d.trim().to_ascii_lowercase())
            .any(|d| !d.is_empty() && host.contains(&d))
    }

    /// Apply this rule's strategy. `None` means "leave the URL alone".
    fn apply(&self, url: &str) -> Option<String> {
        let out = match &self.strategy {
            RewriteStrategy::AppendParam { key, value } => append_param(url, key, value),
            RewriteStrategy::Substitute { url: target } => Some(target.clone()),
            RewriteStrategy::PathSplice {
                segment,
                position,
                replace_prefix,
                host,
            } => splice_path(
                url,
                segment,
                *position,
                replace_prefix.as_deref(),
                host.as_deref(),
            ),
        }?;
        (out != url).then_some(out)
    }
}

/// Ordered merchant rule table.
#[derive(Clone, Debug, Default)]
pub struct RuleSet {
    rules: Vec<MerchantRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<MerchantRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[MerchantRule] {
        &self.rules
    }

    /// Every domain fragment of every rule, lowercased, in registration order.
    pub fn domains(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for d in self.rules.iter().flat_map(|r| r.domains.iter()) {
            let d = d.trim().to_ascii_lowercase();
            if !d.is_empty() && !out.contains(&d) {
                out.push(d);
            }
        }
        out
    }

    pub fn find(&self, url: &str) -> Option<&MerchantRule> {
        let host = host_of(url)?;
        self.rules.iter().find(|r| r.matches_host(&host))
    }

    pub fn rewrite(&self, url: &str) -> Rewrite {
        let Some(rule) = self.find(url) else {
            return Rewrite::Unmatched(url.to_string());
        };

        match rule.apply(url) {
            Some(rewritten) => Rewrite::Applied {
                rule: rule.name.clone(),
                url: rewritten,
            },
            None => {
                tracing::debug!(url, rule = %rule.name, "merchant rule left URL unchanged");
                Rewrite::Kept {
                    rule: rule.name.clone(),
                    url: url.to_string(),
                }
            }
        }
    }
}

pub fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()?
        .host_str()
        .map(|h| h.to_ascii_lowercase())
}

fn append_param(url: &str, key: &str, value: &str) -> Option<String> {
    let mut parsed = Url::parse(url).ok()?;
    let pairs: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();
    let occurrences = pairs.iter().filter(|(k, _)| k == key).count();

    if occurrences == 0 {
        // Plain textual append keeps the rest of the URL byte-for-byte.
        let (base, fragment) = match url.split_once('#') {
            Some((b, f)) => (b, Some(f)),
            None => (url, None),
        };
        let sep = match base.find('?') {
            None => "?",
            Some(_) if base.ends_with('?') || base.ends_with('&') => "",
            Some(_) => "&",
        };
        let key_enc: String = form_urlencoded::byte_serialize(key.as_bytes()).collect();
        let value_enc: String = form_urlencoded::byte_serialize(value.as_bytes()).collect();
        let mut out = format!("{base}{sep}{key_enc}={value_enc}");
        if let Some(f) = fragment {
            out.push('#');
            out.push_str(f);
        }
        return Some(out);
    }

    let already_ours = occurrences == 1 && pairs.iter().any(|(k, v)| k == key && v == value);
    if already_ours {
        return None;
    }

    // Foreign or duplicated tag: keep the first slot, drop the rest.
    let mut seen = false;
    let rebuilt: Vec<(String, String)> = pairs
        .into_iter()
        .filter_map(|(k, v)| {
            if k != key {
                return Some((k, v));
            }
            if seen {
                return None;
            }
            seen = true;
            Some((k, value.to_string()))
        })
        .collect();
    parsed.query_pairs_mut().clear().extend_pairs(rebuilt);
    Some(parsed.to_string())
}

fn splice_path(
    url: &str,
    segment: &str,
    position: usize,
    replace_prefix: Option<&str>,
    host: Option<&str>,
) -> Option<String> {
    let mut parsed = Url::parse(url).ok()?;
    let trailing_slash = parsed.path().ends_with('/');
    let mut segments: Vec<String> = parsed
        .path_segments()?
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if segments.is_empty() {
        // Nothing product-identifying to keep.
        return None;
    }

    let on_target_host = host.map_or(true, |h| {
        parsed
            .host_str()
            .is_some_and(|current| same_site(current, h))
    });
    let pos = position.min(segments.len());
    let replace = on_target_host
        && replace_prefix
            .zip(segments.get(pos))
            .is_some_and(|(prefix, existing)| existing.starts_with(prefix));
    if replace {
        segments[pos] = segment.to_string();
    } else {
        segments.insert(pos, segment.to_string());
    }

    if let Some(h) = host {
        parsed.set_host(Some(h)).ok()?;
    }
    let mut path = format!("/{}", segments.join("/"));
    if trailing_slash {
        path.push('/');
    }
    parsed.set_path(&path);
    parsed.set_query(None);
    parsed.set_fragment(None);
    Some(parsed.to_string())
}

/// Host equality ignoring case and a leading `www.`.
fn same_site(a: &str, b: &str) -> bool {
    fn bare(h: &str) -> String {
        let h = h.to_ascii_lowercase();
        match h.strip_prefix("www.") {
            Some(rest) => rest.to_string(),
            None => h,
        }
    }
    bare(a) == bare(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amazon(tag: &str) -> MerchantRule {
        MerchantRule {
            name: "amazon".to_string(),
            domains: vec!["amazon.com".to_string()],
            strategy: RewriteStrategy::AppendParam {
                key: "tag".to_string(),
                value: tag.to_string(),
            },
        }
    }

    fn magalu() -> MerchantRule {
        MerchantRule {
            name: "magalu".to_string(),
            domains: vec![
                "magazineluiza.com.br".to_string(),
                "magazinevoce.com.br".to_string(),
            ],
            strategy: RewriteStrategy::PathSplice {
                segment: "magazinepromo".to_string(),
                position: 0,
                replace_prefix: Some("magazine".to_string()),
                host: Some("www.magazinevoce.com.br".to_string()),
            },
        }
    }

    #[test]
    fn appends_tag_to_canonical_amazon_url() {
        let rules = RuleSet::new(vec![amazon("XYZ-20")]);
        let out = rules.rewrite("https://www.amazon.com.br/dp/B001");
        assert_eq!(
            out,
            Rewrite::Applied {
                rule: "amazon".to_string(),
                url: "https://www.amazon.com.br/dp/B001?tag=XYZ-20".to_string()
            }
        );
    }

    #[test]
    fn appends_with_ampersand_before_fragment() {
        let rules = RuleSet::new(vec![amazon("XYZ-20")]);
        let out = rules.rewrite("https://www.amazon.com.br/dp/B001?th=1#reviews");
        assert_eq!(
            out.url(),
            "https://www.amazon.com.br/dp/B001?th=1&tag=XYZ-20#reviews"
        );
    }

    #[test]
    fn append_param_is_idempotent() {
        let rules = RuleSet::new(vec![amazon("XYZ-20")]);
        let once = rules.rewrite("https://www.amazon.com.br/dp/B001");
        let twice = rules.rewrite(once.url());
        assert!(matches!(twice, Rewrite::Kept { .. }));
        assert_eq!(twice.url().matches("tag=").count(), 1);
    }

    #[test]
    fn foreign_tag_is_replaced_not_duplicated() {
        let rules = RuleSet::new(vec![amazon("XYZ-20")]);
        let out = rules.rewrite("https://www.amazon.com.br/dp/B001?tag=other-20&psc=1&tag=x");
        assert_eq!(out.url(), "https://www.amazon.com.br/dp/B001?tag=XYZ-20&psc=1");
    }

    #[test]
    fn substitutes_whole_link() {
        let rules = RuleSet::new(vec![MerchantRule {
            name: "shopee".to_string(),
            domains: vec!["shopee.com.br".to_string()],
            strategy: RewriteStrategy::Substitute {
                url: "https://s.shopee.com.br/ref123".to_string(),
            },
        }]);
        let out = rules.rewrite("https://shopee.com.br/product/1/2?sp_atk=abc");
        assert_eq!(out.url(), "https://s.shopee.com.br/ref123");
        assert_eq!(out.rule(), Some("shopee"));
    }

    #[test]
    fn path_splice_moves_to_affiliate_store() {
        let rules = RuleSet::new(vec![magalu()]);
        let out = rules.rewrite("https://www.magazineluiza.com.br/fone-jbl/p/abc123/te/fone/?utm=x");
        assert_eq!(
            out.url(),
            "https://www.magazinevoce.com.br/magazinepromo/fone-jbl/p/abc123/te/fone/"
        );
    }

    #[test]
    fn path_splice_replaces_existing_store_segment() {
        let rules = RuleSet::new(vec![magalu()]);
        let out = rules.rewrite("https://www.magazinevoce.com.br/magazineoutro/fone-jbl/p/abc123/");
        assert_eq!(
            out.url(),
            "https://www.magazinevoce.com.br/magazinepromo/fone-jbl/p/abc123/"
        );
        let again = rules.rewrite(out.url());
        assert!(matches!(again, Rewrite::Kept { .. }));
    }

    #[test]
    fn path_splice_replaces_store_segment_on_bare_host() {
        let rules = RuleSet::new(vec![magalu()]);
        let out = rules.rewrite("https://magazinevoce.com.br/magazineoutro/fone/p/abc123/");
        assert_eq!(
            out.url(),
            "https://www.magazinevoce.com.br/magazinepromo/fone/p/abc123/"
        );
        assert!(same_site("WWW.magazinevoce.com.br", "magazinevoce.com.br"));
        assert!(!same_site("magazineluiza.com.br", "www.magazinevoce.com.br"));
    }

    #[test]
    fn path_splice_without_path_is_kept() {
        let rules = RuleSet::new(vec![magalu()]);
        let out = rules.rewrite("https://www.magazineluiza.com.br/");
        assert_eq!(
            out,
            Rewrite::Kept {
                rule: "magalu".to_string(),
                url: "https://www.magazineluiza.com.br/".to_string()
            }
        );
    }

    #[test]
    fn unmatched_and_unparseable_urls_pass_through() {
        let rules = RuleSet::new(vec![amazon("XYZ-20")]);
        assert_eq!(
            rules.rewrite("https://example.com/page"),
            Rewrite::Unmatched("https://example.com/page".to_string())
        );
        assert_eq!(
            rules.rewrite("amazon.com/no-scheme"),
            Rewrite::Unmatched("amazon.com/no-scheme".to_string())
        );
    }

    #[test]
    fn first_registered_rule_wins() {
        let rules = RuleSet::new(vec![amazon("FIRST-20"), amazon("SECOND-20")]);
        let out = rules.rewrite("https://amazon.com/dp/X");
        assert_eq!(out.url(), "https://amazon.com/dp/X?tag=FIRST-20");
    }

    #[test]
    fn rules_deserialize_from_json() {
        let raw = r#"[
          {"name":"kabum","domains":["kabum.com.br"],
           "strategy":{"type":"append_param","key":"awc","value":"123"}},
          {"name":"nike","domains":["nike.com.br"],
           "strategy":{"type":"path_splice","segment":"afiliado"}}
        ]"#;
        let rules: Vec<MerchantRule> = serde_json::from_str(raw).unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(
            rules[1].strategy,
            RewriteStrategy::PathSplice {
                segment: "afiliado".to_string(),
                position: 0,
                replace_prefix: None,
                host: None,
            }
        );
    }

    #[test]
    fn domains_are_deduplicated_in_order() {
        let rules = RuleSet::new(vec![amazon("a"), magalu(), amazon("b")]);
        assert_eq!(
            rules.domains(),
            vec!["amazon.com", "magazineluiza.com.br", "magazinevoce.com.br"]
        );
    }
}
