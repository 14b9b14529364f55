//! Supported device dialects and their CLI interaction profiles.
//!
//! A dialect describes one vendor CLI flavor: what its prompts look like,
//! how privilege escalation works, how pagination is disabled, and which
//! commands the batch pipeline needs (full configuration dump, config-mode
//! enter/exit). Profiles are static and built once; a dialect is never
//! cached per device and is rediscovered on every connection.

use once_cell::sync::Lazy;
use regex::{Regex, RegexSet};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Command dialects this crate can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    CiscoIos,
    CiscoNxos,
    CiscoAsa,
    CiscoFtd,
}

/// Detection priority order. The first dialect that authenticates and
/// reaches privileged mode wins; later dialects are never tried.
pub const DIALECT_ORDER: &[Dialect] = &[
    Dialect::CiscoIos,
    Dialect::CiscoNxos,
    Dialect::CiscoAsa,
    Dialect::CiscoFtd,
];

/// CLI interaction profile for one dialect.
pub struct DialectProfile {
    /// Matches an unprivileged prompt at the end of the receive buffer.
    pub user_prompt: Regex,
    /// Matches a privileged prompt at the end of the receive buffer.
    pub privileged_prompt: Regex,
    /// Matches a configuration-mode prompt.
    pub config_prompt: Regex,
    /// Matches the password request during privilege escalation.
    pub password_prompt: Regex,
    /// Matches a pagination stop. Answered with a space.
    pub more_prompt: Regex,
    /// Device output lines that indicate a rejected command.
    pub errors: RegexSet,
    /// Privilege escalation command. `None` when login already lands in
    /// privileged mode.
    pub elevate: Option<&'static str>,
    /// Command that disables output pagination for the session.
    pub disable_paging: Option<&'static str>,
    /// Command that dumps the full running configuration.
    pub show_running: &'static str,
    /// Command that enters configuration mode.
    pub config_enter: &'static str,
    /// Command that leaves configuration mode.
    pub config_exit: &'static str,
}

fn regex(pattern: &str) -> Regex {
    match Regex::new(pattern) {
        Ok(re) => re,
        Err(err) => panic!("invalid dialect regex '{pattern}': {err}"),
    }
}

fn regex_set(patterns: &[&str]) -> RegexSet {
    match RegexSet::new(patterns) {
        Ok(set) => set,
        Err(err) => panic!("invalid dialect error patterns: {err}"),
    }
}

static CISCO_IOS: Lazy<DialectProfile> = Lazy::new(|| DialectProfile {
    user_prompt: regex(r"[\w.\-]+>\s*$"),
    privileged_prompt: regex(r"[\w.\-]+#\s*$"),
    config_prompt: regex(r"[\w.\-]+\(config[\w.\-]*\)#\s*$"),
    password_prompt: regex(r"(?i)password:\s*$"),
    more_prompt: regex(r"--\s?More\s?--"),
    errors: regex_set(&[
        r"% Invalid input",
        r"% Incomplete command",
        r"% Ambiguous command",
        r"% Access denied",
    ]),
    elevate: Some("enable"),
    disable_paging: Some("terminal length 0"),
    show_running: "show running-config",
    config_enter: "configure terminal",
    config_exit: "end",
});

static CISCO_NXOS: Lazy<DialectProfile> = Lazy::new(|| DialectProfile {
    user_prompt: regex(r"[\w.\-]+>\s*$"),
    privileged_prompt: regex(r"[\w.\-]+#\s*$"),
    config_prompt: regex(r"[\w.\-]+\(config[\w.\-]*\)#\s*$"),
    password_prompt: regex(r"(?i)password:\s*$"),
    more_prompt: regex(r"--\s?More\s?--"),
    errors: regex_set(&[
        r"% Invalid command",
        r"% Permission denied",
        r"(?m)^ERROR:",
    ]),
    // NX-OS admin sessions land in privileged mode directly.
    elevate: None,
    disable_paging: Some("terminal length 0"),
    show_running: "show running-config",
    config_enter: "configure terminal",
    config_exit: "end",
});

static CISCO_ASA: Lazy<DialectProfile> = Lazy::new(|| DialectProfile {
    user_prompt: regex(r"[\w.\-]+>\s*$"),
    privileged_prompt: regex(r"[\w.\-]+#\s*$"),
    config_prompt: regex(r"[\w.\-]+\(config[\w.\-]*\)#\s*$"),
    password_prompt: regex(r"(?i)password:\s*$"),
    more_prompt: regex(r"<--- More --->"),
    errors: regex_set(&[r"(?m)^ERROR: %?", r"% Invalid input", r"Command authorization failed"]),
    elevate: Some("enable"),
    disable_paging: Some("terminal pager 0"),
    show_running: "show running-config",
    config_enter: "configure terminal",
    config_exit: "end",
});

static CISCO_FTD: Lazy<DialectProfile> = Lazy::new(|| DialectProfile {
    user_prompt: regex(r"[\w.\-]+>\s*$"),
    // FTD CLISH keeps a single `>` prompt for management sessions.
    privileged_prompt: regex(r"(?m)(^|[\w.\-])>\s*$"),
    config_prompt: regex(r"[\w.\-]+\(config[\w.\-]*\)#\s*$"),
    password_prompt: regex(r"(?i)password:\s*$"),
    more_prompt: regex(r"--\s?More\s?--"),
    errors: regex_set(&[r"(?m)^ERROR:", r"Syntax error", r"(?m)^Invalid command"]),
    elevate: None,
    disable_paging: None,
    show_running: "show running-config",
    config_enter: "configure terminal",
    config_exit: "end",
});

impl Dialect {
    /// Stable identifier used in logs and result lines.
    pub fn name(&self) -> &'static str {
        match self {
            Dialect::CiscoIos => "cisco_ios",
            Dialect::CiscoNxos => "cisco_nxos",
            Dialect::CiscoAsa => "cisco_asa",
            Dialect::CiscoFtd => "cisco_ftd",
        }
    }

    /// Interaction profile for this dialect.
    pub fn profile(&self) -> &'static DialectProfile {
        match self {
            Dialect::CiscoIos => &CISCO_IOS,
            Dialect::CiscoNxos => &CISCO_NXOS,
            Dialect::CiscoAsa => &CISCO_ASA,
            Dialect::CiscoFtd => &CISCO_FTD,
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
