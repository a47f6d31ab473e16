//! Content gate: decide whether a message is worth relaying.

use std::str::FromStr;

use crate::{
    affiliate::{host_of, Rewrite},
    formatting::Substitution,
    links::RewrittenLink,
};

/// What to do with links that are present but not on the merchant allowlist.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UnrecognizedLinkPolicy {
    /// Leave them in the text as written.
    #[default]
    Keep,
    /// Remove them from the text.
    Strip,
    /// Drop the whole message.
    Reject,
}

impl FromStr for UnrecognizedLinkPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keep" => Ok(Self::Keep),
            "strip" | "remove" => Ok(Self::Strip),
            "reject" | "drop" => Ok(Self::Reject),
            other => Err(format!("unknown unrecognized-link policy: {other}")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DropReason {
    NoLinks,
    NoRecognizedMerchant,
    UnrecognizedLink(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GateDecision {
    Accept,
    Drop(DropReason),
}

#[derive(Clone, Debug)]
pub struct ContentGate {
    allowlist: Vec<String>,
    policy: UnrecognizedLinkPolicy,
}

impl ContentGate {
    pub fn new(allowlist: Vec<String>, policy: UnrecognizedLinkPolicy) -> Self {
        let allowlist = allowlist
            .into_iter()
            .map(|d| d.trim().to_ascii_lowercase())
            .filter(|d| !d.is_empty())
            .collect();
        Self { allowlist, policy }
    }

    /// Domain containment against the host of the canonical URL, never the
    /// shortened form. Path and query are not looked at.
    pub fn is_recognized(&self, canonical: &str) -> bool {
        let Some(host) = host_of(canonical) else {
            return false;
        };
        self.allowlist.iter().any(|d| host.contains(d.as_str()))
    }

    pub fn evaluate(&self, links: &[RewrittenLink]) -> GateDecision {
        if links.is_empty() {
            return GateDecision::Drop(DropReason::NoLinks);
        }

        if self.policy == UnrecognizedLinkPolicy::Reject {
            if let Some(foreign) = links.iter().find(|l| !self.is_recognized(l.canonical())) {
                return GateDecision::Drop(DropReason::UnrecognizedLink(
                    foreign.canonical().to_string(),
                ));
            }
        }

        if links.iter().any(|l| self.is_recognized(l.canonical())) {
            GateDecision::Accept
        } else {
            GateDecision::Drop(DropReason::NoRecognizedMerchant)
        }
    }

    /// Text edits for an accepted message, in span order.
    ///
    /// Rewritten links always replace their span; recognized ones are swapped for
    /// their canonical form; the rest follow the policy.
    pub fn substitutions(&self, links: &[RewrittenLink]) -> Vec<Substitution> {
        links
            .iter()
            .filter_map(|l| {
                let replacement = match &l.rewrite {
                    Rewrite::Applied { url, .. } => url.clone(),
                    _ if self.is_recognized(l.canonical()) => l.rewrite.url().to_string(),
                    _ => match self.policy {
                        UnrecognizedLinkPolicy::Strip => String::new(),
                        UnrecognizedLinkPolicy::Keep | UnrecognizedLinkPolicy::Reject => {
                            return None
                        }
                    },
                };
                Some(Substitution {
                    span: l.candidate().span(),
                    replacement,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        links::{extract_links, ResolvedUrl},
        resolver::Resolution,
    };

    fn link(text: &str, canonical: &str, rewrite: Rewrite) -> RewrittenLink {
        let candidate = extract_links(text).remove(0);
        RewrittenLink {
            resolved: ResolvedUrl {
                candidate,
                resolution: Resolution::Resolved(canonical.to_string()),
            },
            rewrite,
        }
    }

    fn gate(policy: UnrecognizedLinkPolicy) -> ContentGate {
        ContentGate::new(vec!["amazon.com".into(), " Kabum.com.br ".into()], policy)
    }

    #[test]
    fn parses_policy_names() {
        assert_eq!("strip".parse::<UnrecognizedLinkPolicy>(), Ok(UnrecognizedLinkPolicy::Strip));
        assert_eq!(" Reject ".parse::<UnrecognizedLinkPolicy>(), Ok(UnrecognizedLinkPolicy::Reject));
        assert!("maybe".parse::<UnrecognizedLinkPolicy>().is_err());
    }

    #[test]
    fn drops_messages_without_links() {
        let g = gate(UnrecognizedLinkPolicy::Keep);
        assert_eq!(g.evaluate(&[]), GateDecision::Drop(DropReason::NoLinks));
    }

    #[test]
    fn matches_canonical_not_shortened_form() {
        let g = gate(UnrecognizedLinkPolicy::Keep);
        let l = link(
            "https://amzn.to/abc",
            "https://www.amazon.com.br/dp/B1",
            Rewrite::Unmatched("https://www.amazon.com.br/dp/B1".into()),
        );
        assert_eq!(g.evaluate(&[l]), GateDecision::Accept);

        let shortened_only = link(
            "https://amazon.com.evil.example/x",
            "https://example.com/landing",
            Rewrite::Unmatched("https://example.com/landing".into()),
        );
        assert_eq!(
            g.evaluate(&[shortened_only]),
            GateDecision::Drop(DropReason::NoRecognizedMerchant)
        );
    }

    #[test]
    fn merchant_name_outside_the_host_is_not_recognized() {
        let g = gate(UnrecognizedLinkPolicy::Keep);
        let l = link(
            "https://bit.ly/x",
            "https://example.com/page?ref=amazon.com",
            Rewrite::Unmatched("https://example.com/page?ref=amazon.com".into()),
        );
        assert!(!g.is_recognized("https://example.com/amazon.com/dp/1"));
        assert_eq!(
            g.evaluate(&[l.clone()]),
            GateDecision::Drop(DropReason::NoRecognizedMerchant)
        );

        let good = link(
            "https://amazon.com/dp/1",
            "https://amazon.com/dp/1",
            Rewrite::Unmatched("https://amazon.com/dp/1".into()),
        );
        assert_eq!(
            gate(UnrecognizedLinkPolicy::Reject).evaluate(&[good.clone(), l.clone()]),
            GateDecision::Drop(DropReason::UnrecognizedLink(
                "https://example.com/page?ref=amazon.com".into()
            ))
        );
        let strip = gate(UnrecognizedLinkPolicy::Strip).substitutions(&[good, l]);
        assert_eq!(strip[1].replacement, "");
    }

    #[test]
    fn recognition_is_independent_of_rewrites() {
        let g = gate(UnrecognizedLinkPolicy::Keep);
        let l = link(
            "https://www.kabum.com.br/produto/1",
            "https://www.kabum.com.br/produto/1",
            Rewrite::Unmatched("https://www.kabum.com.br/produto/1".into()),
        );
        assert_eq!(g.evaluate(&[l]), GateDecision::Accept);
    }

    #[test]
    fn reject_policy_drops_mixed_messages() {
        let good = link(
            "https://amazon.com/dp/1",
            "https://amazon.com/dp/1",
            Rewrite::Unmatched("https://amazon.com/dp/1".into()),
        );
        let bad = link(
            "https://example.com/x",
            "https://example.com/x",
            Rewrite::Unmatched("https://example.com/x".into()),
        );
        let links = [good, bad];

        assert_eq!(gate(UnrecognizedLinkPolicy::Keep).evaluate(&links), GateDecision::Accept);
        assert_eq!(
            gate(UnrecognizedLinkPolicy::Reject).evaluate(&links),
            GateDecision::Drop(DropReason::UnrecognizedLink("https://example.com/x".into()))
        );
    }

    #[test]
    fn substitutions_follow_policy() {
        let text = "https://amzn.to/a e https://example.com/x";
        let mut found = extract_links(text);
        let other = found.pop().unwrap();
        let short = found.pop().unwrap();

        let links = vec![
            RewrittenLink {
                resolved: ResolvedUrl {
                    candidate: short,
                    resolution: Resolution::Resolved("https://amazon.com/dp/1".into()),
                },
                rewrite: Rewrite::Applied {
                    rule: "amazon".into(),
                    url: "https://amazon.com/dp/1?tag=t-20".into(),
                },
            },
            RewrittenLink {
                resolved: ResolvedUrl {
                    candidate: other,
                    resolution: Resolution::Fallback("https://example.com/x".into()),
                },
                rewrite: Rewrite::Unmatched("https://example.com/x".into()),
            },
        ];

        let keep = gate(UnrecognizedLinkPolicy::Keep).substitutions(&links);
        assert_eq!(keep.len(), 1);
        assert_eq!(keep[0].replacement, "https://amazon.com/dp/1?tag=t-20");
        assert_eq!(keep[0].span, 0..17);

        let strip = gate(UnrecognizedLinkPolicy::Strip).substitutions(&links);
        assert_eq!(strip.len(), 2);
        assert_eq!(strip[1].replacement, "");
    }
}
