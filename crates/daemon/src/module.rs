//! Modules and their access-control rules.

use std::net::IpAddr;
use std::path::PathBuf;

use serde::Deserialize;

use crate::DaemonError;

/// A named filesystem root exposed by the daemon.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Module {
    /// Name clients request after the greeting.
    pub name: String,
    /// Filesystem root served for this module.
    pub path: PathBuf,
    /// Free-text comment shown in module listings.
    #[serde(default)]
    pub comment: String,
    /// Whether receiver-role (upload) transfers are allowed.
    #[serde(default)]
    pub writable: bool,
    /// Ordered ACL rules, e.g. `"allow 10.0.0.0/8"`, `"deny all"`.
    #[serde(default)]
    pub acl: Vec<String>,
}

impl Module {
    /// Validates the definition and pre-parses the ACL rules.
    pub fn compile(&self) -> Result<Vec<AclRule>, DaemonError> {
        if self.name.is_empty() {
            return Err(DaemonError::InvalidModule("module has no name".into()));
        }
        if self.path.as_os_str().is_empty() {
            return Err(DaemonError::InvalidModule(format!(
                "module {:?} has an empty path",
                self.name
            )));
        }
        self.acl.iter().map(|rule| AclRule::parse(rule)).collect()
    }
}

/// Whether a rule admits or rejects a match.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum AclAction {
    Allow,
    Deny,
}

/// Which addresses a rule applies to.
#[derive(Clone, Debug)]
enum AclScope {
    All,
    Net(IpNet),
}

/// One parsed access-control rule.
#[derive(Clone, Debug)]
pub struct AclRule {
    action: AclAction,
    scope: AclScope,
    source: String,
}

impl AclRule {
    /// Parses `allow|deny all|<cidr>`.
    pub fn parse(rule: &str) -> Result<Self, DaemonError> {
        let invalid = || DaemonError::InvalidAcl(rule.to_owned());

        let (action, who) = rule.trim().split_once(' ').ok_or_else(invalid)?;
        let action = match action {
            "allow" => AclAction::Allow,
            "deny" => AclAction::Deny,
            _ => return Err(invalid()),
        };
        let scope = match who.trim() {
            "all" => AclScope::All,
            net => AclScope::Net(IpNet::parse(net).ok_or_else(invalid)?),
        };
        Ok(Self {
            action,
            scope,
            source: rule.to_owned(),
        })
    }

    fn matches(&self, ip: IpAddr) -> bool {
        match &self.scope {
            AclScope::All => true,
            AclScope::Net(net) => net.contains(ip),
        }
    }
}

/// Applies `rules` to a remote address: first match decides; a non-empty
/// list with no match denies; an empty list admits everyone.
pub fn check_acl(rules: &[AclRule], ip: IpAddr) -> Result<(), DaemonError> {
    if rules.is_empty() {
        return Ok(());
    }
    for rule in rules {
        if rule.matches(ip) {
            return match rule.action {
                AclAction::Allow => Ok(()),
                AclAction::Deny => Err(DaemonError::AccessDenied(rule.source.clone())),
            };
        }
    }
    Err(DaemonError::AccessDenied("default deny".to_owned()))
}

/// A CIDR prefix over v4 or v6 addresses.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct IpNet {
    addr: IpAddr,
    prefix: u8,
}

impl IpNet {
    fn parse(text: &str) -> Option<Self> {
        let (addr, prefix) = match text.split_once('/') {
            Some((addr, prefix)) => (addr.parse().ok()?, prefix.parse().ok()?),
            None => {
                let addr: IpAddr = text.parse().ok()?;
                let full = if addr.is_ipv4() { 32 } else { 128 };
                (addr, full)
            }
        };
        let max = if addr.is_ipv4() { 32 } else { 128 };
        (prefix <= max).then_some(Self { addr, prefix })
    }

    fn contains(&self, ip: IpAddr) -> bool {
        match (self.addr, ip) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = if self.prefix == 0 {
                    0
                } else {
                    u32::MAX << (32 - u32::from(self.prefix))
                };
                u32::from(net) & mask == u32::from(ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = if self.prefix == 0 {
                    0
                } else {
                    u128::MAX << (128 - u32::from(self.prefix))
                };
                u128::from(net) & mask == u128::from(ip) & mask
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(list: &[&str]) -> Vec<AclRule> {
        list.iter().map(|r| AclRule::parse(r).unwrap()).collect()
    }

    fn ip(text: &str) -> IpAddr {
        text.parse().unwrap()
    }

    #[test]
    fn empty_acl_admits_everyone() {
        assert!(check_acl(&[], ip("203.0.113.9")).is_ok());
    }

    #[test]
    fn first_match_wins() {
        let rules = rules(&["deny 10.0.0.0/8", "allow all"]);
        assert!(check_acl(&rules, ip("10.1.2.3")).is_err());
        assert!(check_acl(&rules, ip("192.168.1.1")).is_ok());
    }

    #[test]
    fn exhausted_rules_deny() {
        let rules = rules(&["allow 192.168.0.0/16"]);
        assert!(check_acl(&rules, ip("192.168.44.7")).is_ok());
        assert!(check_acl(&rules, ip("10.0.0.1")).is_err());
    }

    #[test]
    fn bare_address_is_a_host_rule() {
        let rules = rules(&["allow 127.0.0.1", "deny all"]);
        assert!(check_acl(&rules, ip("127.0.0.1")).is_ok());
        assert!(check_acl(&rules, ip("127.0.0.2")).is_err());
    }

    #[test]
    fn v6_prefixes_match() {
        let rules = rules(&["allow fc00::/7", "deny all"]);
        assert!(check_acl(&rules, ip("fd12::1")).is_ok());
        assert!(check_acl(&rules, ip("2001:db8::1")).is_err());
    }

    #[test]
    fn v4_rule_never_matches_v6_peer() {
        let rules = rules(&["allow 0.0.0.0/0"]);
        assert!(check_acl(&rules, ip("::1")).is_err());
    }

    #[test]
    fn malformed_rules_are_rejected() {
        for bad in ["permit all", "allow", "allow 10.0.0.0/40", "deny 10.0.0.0/-1"] {
            assert!(AclRule::parse(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn module_validation_requires_name_and_path() {
        let module = Module {
            name: String::new(),
            path: PathBuf::from("/srv"),
            comment: String::new(),
            writable: false,
            acl: Vec::new(),
        };
        assert!(module.compile().is_err());
    }
}
