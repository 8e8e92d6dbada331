//! Plugin configuration block parsing.
//!
//! The DNS plugin is configured with a text block in the style of its host
//! server's config file:
//!
//! ```text
//! fabdns global {
//!     fallthrough in-addr.arpa ip6.arpa
//!     kubeconfig /etc/fabdns/kubeconfig
//!     masterurl https://10.20.8.24:6443
//!     cluster beijing
//!     cluster-zone beijing
//!     cluster-region north
//!     ttl 30
//! }
//! ```
//!
//! Any key outside this set is a configuration error.

use hickory_proto::rr::{LowerName, Name};

use crate::error::Error;
use crate::types::ClusterInfo;

/// Default TTL for answers, in seconds.
pub const DEFAULT_TTL: u32 = 5;

/// Root zone served when the block names none.
pub const DEFAULT_ZONE: &str = "global.";

/// Name of the configuration directive.
const DIRECTIVE: &str = "fabdns";

/// Upper bound for the configurable TTL, in seconds.
const MAX_TTL: u32 = 3600;

/// Parsed plugin settings.
#[derive(Debug, Clone)]
pub struct FabDnsSettings {
    /// Root zones this plugin is authoritative for.
    pub zones: Vec<Name>,
    /// TTL applied uniformly to every answer.
    pub ttl: u32,
    /// Identity of the local cluster, used for locality preference.
    pub cluster: ClusterInfo,
    /// Zones for which declined queries are delegated onward.
    pub fallthrough: Fallthrough,
    /// Path of the control-plane credentials file, when the store is fed
    /// from a cluster control plane.
    pub kubeconfig: Option<String>,
    /// Control-plane URL override.
    pub master_url: Option<String>,
}

impl Default for FabDnsSettings {
    fn default() -> Self {
        Self {
            zones: vec![Name::from_ascii(DEFAULT_ZONE).expect("default zone name")],
            ttl: DEFAULT_TTL,
            cluster: ClusterInfo::default(),
            fallthrough: Fallthrough::default(),
            kubeconfig: None,
            master_url: None,
        }
    }
}

/// Fallthrough policy: which declined names are handed to the next
/// handler instead of being answered with a name error.
#[derive(Debug, Clone, Default)]
pub struct Fallthrough {
    enabled: bool,
    zones: Vec<LowerName>,
}

impl Fallthrough {
    /// Enable fallthrough for the given zones; no zones means all names.
    pub fn set_zones(&mut self, zones: &[String]) -> Result<(), Error> {
        self.enabled = true;
        self.zones.clear();
        for zone in zones {
            let name = parse_zone(zone)?;
            self.zones.push(LowerName::from(name));
        }
        Ok(())
    }

    /// Whether a declined query for `name` should be delegated.
    pub fn matches(&self, name: &LowerName) -> bool {
        self.enabled && (self.zones.is_empty() || self.zones.iter().any(|z| z.zone_of(name)))
    }
}

/// Parse a `fabdns` configuration block into settings.
pub fn parse_settings(input: &str) -> Result<FabDnsSettings, Error> {
    let mut lines = input
        .lines()
        .map(strip_comment)
        .filter(|line| !line.trim().is_empty());

    let header = lines
        .next()
        .ok_or_else(|| Error::Config("empty plugin configuration".to_string()))?;
    let mut header_tokens: Vec<&str> = header.split_whitespace().collect();
    if header_tokens.first() != Some(&DIRECTIVE) {
        return Err(Error::Config(format!(
            "expected '{DIRECTIVE}' directive, got '{header}'",
        )));
    }
    header_tokens.remove(0);

    let has_block = header_tokens.last() == Some(&"{");
    if has_block {
        header_tokens.pop();
    }

    let mut settings = FabDnsSettings::default();
    if !header_tokens.is_empty() {
        settings.zones = header_tokens
            .iter()
            .map(|zone| parse_zone(zone))
            .collect::<Result<Vec<Name>, Error>>()?;
    }

    if !has_block {
        if lines.next().is_some() {
            return Err(Error::Config(
                "properties must be wrapped in a '{ }' block".to_string(),
            ));
        }
        return Ok(settings);
    }

    let mut closed = false;
    for line in lines {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let (key, args) = match tokens.split_first() {
            Some(split) => split,
            None => continue,
        };

        if closed {
            return Err(Error::Config(format!("unexpected content after block: '{key}'")));
        }

        match *key {
            "}" => closed = true,
            "fallthrough" => {
                let zones: Vec<String> = args.iter().map(|s| s.to_string()).collect();
                settings.fallthrough.set_zones(&zones)?;
            }
            "kubeconfig" => settings.kubeconfig = Some(single_arg(key, args)?),
            "masterurl" => settings.master_url = Some(single_arg(key, args)?),
            "cluster" => settings.cluster.name = single_arg(key, args)?,
            "cluster-zone" => settings.cluster.zone = single_arg(key, args)?,
            "cluster-region" => settings.cluster.region = single_arg(key, args)?,
            "ttl" => {
                let raw = single_arg(key, args)?;
                let ttl: u32 = raw
                    .parse()
                    .map_err(|_| Error::Config(format!("ttl '{raw}' is not a number")))?;
                if ttl == 0 || ttl > MAX_TTL {
                    return Err(Error::Config(format!(
                        "ttl must be in range [1, {MAX_TTL}], got {ttl}"
                    )));
                }
                settings.ttl = ttl;
            }
            unknown => return Err(Error::Config(format!("unknown property '{unknown}'"))),
        }
    }

    if !closed {
        return Err(Error::Config("unclosed '{' in plugin configuration".to_string()));
    }

    Ok(settings)
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(idx) => &line[..idx],
        None => line,
    }
}

fn single_arg(key: &str, args: &[&str]) -> Result<String, Error> {
    match args {
        [value] => Ok(value.to_string()),
        _ => Err(Error::Config(format!("'{key}' takes exactly one argument"))),
    }
}

fn parse_zone(zone: &str) -> Result<Name, Error> {
    let mut name = Name::from_ascii(zone)?;
    name.set_fqdn(true);
    Ok(name)
}
