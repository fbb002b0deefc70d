use crate::domain::NodeRecord;
use serde::{Deserialize, Serialize};
use std::net::{AddrParseError, IpAddr};
use thiserror::Error;
use time::{Duration, OffsetDateTime};

pub const ANY: &str = "*";
pub const DEFAULT_PAGE: &str = "generic";

/// One `allowed_clients` entry as written in the configuration file.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct AllowedClient {
    pub ipaddress: String,
    #[serde(default = "any")]
    pub id: String,
    #[serde(default = "any")]
    pub lease: String,
    #[serde(default)]
    pub tglist: Vec<String>,
}

fn any() -> String {
    ANY.to_string()
}

impl AllowedClient {
    pub fn local_default() -> Self {
        Self {
            ipaddress: "127.0.0.1".to_string(),
            id: any(),
            lease: any(),
            tglist: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TalkgroupPattern {
    Exact(String),
    /// `209*`
    Prefix(String),
    /// `100..200`, inclusive on both ends.
    Range { low: i64, high: i64 },
}

impl TalkgroupPattern {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if let Some(star) = raw.find('*') {
            return Self::Prefix(raw[..star].to_string());
        }
        if let Some((low, high)) = raw.split_once("..") {
            if let (Ok(low), Ok(high)) = (low.trim().parse(), high.trim().parse()) {
                return Self::Range { low, high };
            }
        }
        Self::Exact(raw.to_string())
    }

    pub fn matches(&self, talkgroup: &str) -> bool {
        let talkgroup = talkgroup.trim();
        match self {
            Self::Exact(exact) => exact == talkgroup,
            Self::Prefix(prefix) => talkgroup.starts_with(prefix.as_str()),
            Self::Range { low, high } => talkgroup
                .parse::<i64>()
                .is_ok_and(|value| *low <= value && value <= *high),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PageId {
    Any,
    Exact(String),
}

impl PageId {
    fn parse(raw: &str) -> Self {
        match raw.trim() {
            ANY => Self::Any,
            page => Self::Exact(page.to_string()),
        }
    }

    fn accepts(&self, page: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(exact) => exact == page,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Lease {
    Forever,
    Until(OffsetDateTime),
}

impl Lease {
    fn is_active(self, now: OffsetDateTime) -> bool {
        match self {
            Self::Forever => true,
            Self::Until(expires_at) => now < expires_at,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AllowEntry {
    pub address: IpAddr,
    pub page: PageId,
    pub lease: Lease,
    pub talkgroups: Vec<TalkgroupPattern>,
}

impl AllowEntry {
    fn grants(&self, address: IpAddr, page: &str, now: OffsetDateTime) -> bool {
        self.address == address && self.page.accepts(page) && self.lease.is_active(now)
    }
}

#[derive(Debug, Error)]
pub enum AccessConfigError {
    #[error("allowed client {address:?}: invalid address: {source}")]
    InvalidAddress {
        address: String,
        source: AddrParseError,
    },

    #[error("allowed client {address}: lease must be '*' or a number of days, got {lease:?}")]
    InvalidLease { address: String, lease: String },
}

/// How a connecting observer is treated for the rest of its life.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Admission {
    Rejected,
    /// Dashboard page: every snapshot, unfiltered.
    Page,
    /// Direct service connection: snapshots gated by its allow-list entry.
    Service,
}

/// Observers the external page-session bookkeeping already knows about.
pub trait SessionLookup: Send + Sync {
    fn is_page_session(&self, address: IpAddr) -> bool;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoSessions;

impl SessionLookup for NoSessions {
    fn is_page_session(&self, _address: IpAddr) -> bool {
        false
    }
}

/// The allow-list, resolved once at startup.
#[derive(Clone, Debug, Default)]
pub struct AccessPolicy {
    entries: Vec<AllowEntry>,
}

impl AccessPolicy {
    /// Day-count leases are counted from `loaded_at`.
    pub fn from_config(
        clients: &[AllowedClient],
        loaded_at: OffsetDateTime,
    ) -> Result<Self, AccessConfigError> {
        let entries = clients
            .iter()
            .map(|client| {
                let address = client.ipaddress.trim().parse::<IpAddr>().map_err(|source| {
                    AccessConfigError::InvalidAddress {
                        address: client.ipaddress.clone(),
                        source,
                    }
                })?;
                let lease = match client.lease.trim() {
                    ANY => Lease::Forever,
                    days => {
                        let days = days.parse::<u32>().map_err(|_| {
                            AccessConfigError::InvalidLease {
                                address: client.ipaddress.clone(),
                                lease: client.lease.clone(),
                            }
                        })?;
                        loaded_at
                            .checked_add(Duration::days(i64::from(days)))
                            .map_or(Lease::Forever, Lease::Until)
                    }
                };
                Ok(AllowEntry {
                    address: address.to_canonical(),
                    page: PageId::parse(&client.id),
                    lease,
                    talkgroups: client
                        .tglist
                        .iter()
                        .map(|pattern| TalkgroupPattern::parse(pattern))
                        .collect(),
                })
            })
            .collect::<Result<Vec<_>, AccessConfigError>>()?;
        Ok(Self { entries })
    }

    /// An empty allow-list admits everyone and filters nothing.
    pub fn is_open(&self) -> bool {
        self.entries.is_empty()
    }

    fn granting_entry(&self, address: IpAddr, page: &str, now: OffsetDateTime) -> Option<&AllowEntry> {
        let address = address.to_canonical();
        self.entries
            .iter()
            .find(|entry| entry.grants(address, page, now))
    }

    pub fn admit(&self, address: IpAddr, page: &str, now: OffsetDateTime) -> Admission {
        if self.is_open() {
            return Admission::Service;
        }
        match self.granting_entry(address, page, now) {
            Some(entry) if entry.page == PageId::Any => Admission::Page,
            Some(_) => Admission::Service,
            None => Admission::Rejected,
        }
    }

    /// Whether a service observer gets this tick's snapshot. All-or-nothing: the whole
    /// snapshot is gated on its active talkgroup.
    pub fn allows_snapshot(
        &self,
        address: IpAddr,
        page: &str,
        active_talkgroup: Option<&str>,
        now: OffsetDateTime,
    ) -> bool {
        if self.is_open() {
            return true;
        }
        let Some(entry) = self.granting_entry(address, page, now) else {
            return false;
        };
        if entry.talkgroups.is_empty() {
            return true;
        }
        let Some(talkgroup) = active_talkgroup else {
            return false;
        };
        entry
            .talkgroups
            .iter()
            .any(|pattern| pattern.matches(talkgroup))
    }
}

/// The talkgroup a snapshot is "about": the most recent transmitter's, else the most
/// recently started node's non-empty one.
pub fn active_talkgroup(snapshot: &[NodeRecord]) -> Option<&str> {
    let transmitting = latest_start(snapshot.iter().filter(|record| record.is_transmitting()));
    if let Some(talkgroup) = transmitting.filter(|talkgroup| !talkgroup.is_empty()) {
        return Some(talkgroup);
    }
    latest_start(snapshot.iter().filter(|record| !record.talkgroup_id.is_empty()))
}

fn latest_start<'a>(records: impl Iterator<Item = &'a NodeRecord>) -> Option<&'a str> {
    records
        .max_by_key(|record| record.start_xmit_epoch_ms)
        .map(|record| record.talkgroup_id.as_str())
}
