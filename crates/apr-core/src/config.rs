use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    affiliate::{MerchantRule, RewriteStrategy, RuleSet},
    domain::ChatId,
    errors::Error,
    formatting::{PromoTemplate, DEFAULT_HEADER},
    gate::UnrecognizedLinkPolicy,
    resolver::{ResolverConfig, MAX_REDIRECT_HOPS},
    security::SourcePolicy,
    Result,
};

const MAGALU_HOST: &str = "www.magazinevoce.com.br";

/// Typed configuration for the relay.
#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub telegram_bot_token: String,
    pub source: SourcePolicy,

    // Delivery
    pub delivery_interval: Duration,
    pub delivery_log_path: Option<PathBuf>,
    pub delivery_log_json: bool,

    // Pipeline
    pub resolver: ResolverConfig,
    pub template: PromoTemplate,
    pub unrecognized_links: UnrecognizedLinkPolicy,
    pub rules: Vec<MerchantRule>,
    pub allowlist: Vec<String>,
}

impl RelayConfig {
    /// Load from the process environment (after reading `.env` if present).
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load from an arbitrary key lookup.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let vars = Vars(get);

        let telegram_bot_token = vars.str("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let destination = vars.i64("DESTINATION_CHAT_ID").ok_or_else(|| {
            Error::Config("DESTINATION_CHAT_ID environment variable is required".to_string())
        })?;
        let source_chat = vars.i64("SOURCE_CHAT_ID").map(ChatId);
        let authorized_senders = vars.csv_i64("AUTHORIZED_SENDERS");
        if source_chat.is_none() && authorized_senders.is_empty() {
            return Err(Error::Config(
                "SOURCE_CHAT_ID or AUTHORIZED_SENDERS is required".to_string(),
            ));
        }
        if source_chat == Some(ChatId(destination)) {
            return Err(Error::Config(
                "SOURCE_CHAT_ID and DESTINATION_CHAT_ID must differ".to_string(),
            ));
        }

        let delivery_interval =
            Duration::from_secs(vars.u64("DELIVERY_INTERVAL_SECS").unwrap_or(30));
        let delivery_log_path = vars.str("DELIVERY_LOG_PATH").and_then(non_empty).map(PathBuf::from);
        let delivery_log_json = vars.bool("DELIVERY_LOG_JSON").unwrap_or(true);

        let resolver = ResolverConfig {
            timeout: Duration::from_millis(vars.u64("RESOLVE_TIMEOUT_MS").unwrap_or(10_000)),
            max_redirects: vars
                .u64("RESOLVE_MAX_REDIRECTS")
                .map(|n| n as usize)
                .unwrap_or(MAX_REDIRECT_HOPS)
                .min(MAX_REDIRECT_HOPS),
            ..ResolverConfig::default()
        };

        let header = match vars.str("PROMO_HEADER") {
            Some(h) => non_empty(unescape_newlines(&h)),
            None => Some(DEFAULT_HEADER.to_string()),
        };
        let footer = vars
            .str("PROMO_FOOTER")
            .map(|f| unescape_newlines(&f))
            .and_then(non_empty)
            .or_else(|| {
                vars.str("AFFILIATE_LINK")
                    .and_then(non_empty)
                    .map(|link| format!("🔗 Compre aqui: {}", link.trim()))
            });
        let template = PromoTemplate { header, footer };

        let unrecognized_links = match vars.str("UNRECOGNIZED_LINKS").and_then(non_empty) {
            Some(raw) => raw
                .parse::<UnrecognizedLinkPolicy>()
                .map_err(Error::Config)?,
            None => UnrecognizedLinkPolicy::default(),
        };

        let mut rules = builtin_rules(&vars);
        if let Some(path) = vars.str("AFFILIATE_RULES_FILE").and_then(non_empty) {
            rules.extend(load_rules_file(Path::new(&path))?);
        }
        for rule in &rules {
            validate_rule(rule)?;
        }

        let allowlist = match vars.csv_lower("MERCHANT_ALLOWLIST") {
            explicit if !explicit.is_empty() => explicit,
            _ => RuleSet::new(rules.clone()).domains(),
        };
        if allowlist.is_empty() {
            return Err(Error::Config(
                "no merchants configured: set a merchant affiliate id or MERCHANT_ALLOWLIST"
                    .to_string(),
            ));
        }

        Ok(Self {
            telegram_bot_token,
            source: SourcePolicy {
                source_chat,
                authorized_senders,
                destination: ChatId(destination),
            },
            delivery_interval,
            delivery_log_path,
            delivery_log_json,
            resolver,
            template,
            unrecognized_links,
            rules,
            allowlist,
        })
    }

    pub fn destination(&self) -> ChatId {
        self.source.destination
    }
}

/// Merchants enabled by their affiliate id variables, in matching order.
fn builtin_rules<F: Fn(&str) -> Option<String>>(vars: &Vars<F>) -> Vec<MerchantRule> {
    let mut rules = Vec::new();

    if let Some(tag) = vars.str("AMAZON_TAG").and_then(non_empty) {
        rules.push(MerchantRule {
            name: "amazon".to_string(),
            domains: vec!["amazon.com".to_string()],
            strategy: RewriteStrategy::AppendParam {
                key: "tag".to_string(),
                value: tag.trim().to_string(),
            },
        });
    }

    if let Some(store) = vars.str("MAGALU_STORE").and_then(non_empty) {
        rules.push(MerchantRule {
            name: "magalu".to_string(),
            domains: vec![
                "magazineluiza.com.br".to_string(),
                "magazinevoce.com.br".to_string(),
            ],
            strategy: RewriteStrategy::PathSplice {
                segment: format!("magazine{}", store.trim()),
                position: 0,
                replace_prefix: Some("magazine".to_string()),
                host: Some(MAGALU_HOST.to_string()),
            },
        });
    }

    let static_links = [
        (
            "mercadolivre",
            "MERCADOLIVRE_LINK",
            &["mercadolivre.com", "mercadolibre.com"][..],
        ),
        ("shopee", "SHOPEE_LINK", &["shopee.com"][..]),
        ("aliexpress", "ALIEXPRESS_LINK", &["aliexpress.com"][..]),
    ];
    for (name, key, domains) in static_links {
        if let Some(link) = vars.str(key).and_then(non_empty) {
            rules.push(MerchantRule {
                name: name.to_string(),
                domains: domains.iter().map(|d| d.to_string()).collect(),
                strategy: RewriteStrategy::Substitute {
                    url: link.trim().to_string(),
                },
            });
        }
    }

    rules
}

/// Load extra merchant rules from a JSON array file.
pub fn load_rules_file(path: &Path) -> Result<Vec<MerchantRule>> {
    if !path.exists() {
        return Err(Error::Config(format!(
            "AFFILIATE_RULES_FILE not found: {}",
            path.display()
        )));
    }
    let raw = fs::read_to_string(path)?;
    let rules: Vec<MerchantRule> = serde_json::from_str(&raw)?;
    Ok(rules)
}

fn validate_rule(rule: &MerchantRule) -> Result<()> {
    let invalid = |reason: &str| Err(Error::Config(format!("merchant rule {}: {reason}", rule.name)));

    if rule.domains.iter().all(|d| d.trim().is_empty()) {
        return invalid("no domains");
    }
    match &rule.strategy {
        RewriteStrategy::AppendParam { key, value } if key.is_empty() || value.is_empty() => {
            invalid("append_param needs key and value")
        }
        RewriteStrategy::Substitute { url } if url::Url::parse(url).is_err() => {
            invalid("substitute url is not absolute")
        }
        RewriteStrategy::PathSplice { segment, .. }
            if segment.is_empty() || segment.contains('/') =>
        {
            invalid("path_splice segment must be a single non-empty path segment")
        }
        _ => Ok(()),
    }
}

struct Vars<F>(F);

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    fn str(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }

    fn bool(&self, key: &str) -> Option<bool> {
        self.str(key).map(|s| {
            matches!(
                s.trim().to_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
    }

    fn u64(&self, key: &str) -> Option<u64> {
        self.str(key).and_then(|s| s.trim().parse::<u64>().ok())
    }

    fn i64(&self, key: &str) -> Option<i64> {
        self.str(key).and_then(|s| s.trim().parse::<i64>().ok())
    }

    fn csv_i64(&self, key: &str) -> Vec<i64> {
        self.str(key)
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .filter_map(|s| s.parse::<i64>().ok())
            .collect()
    }

    fn csv_lower(&self, key: &str) -> Vec<String> {
        self.str(key)
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn unescape_newlines(s: &str) -> String {
    s.replace("\\n", "\n")
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
