use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Deserializer, Serialize};
use crate::protocol::PLACEHOLDER_DELIMITER;

/// Hardware (MAC) address of a host.
///
/// Always displayed and persisted in canonical form: uppercase hex pairs
/// separated by colons, e.g. `AA:BB:CC:DD:EE:FF`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    pub fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseMacError(String);

impl fmt::Display for ParseMacError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid hardware address: {:?}", self.0)
    }
}

impl std::error::Error for ParseMacError {}

impl FromStr for MacAddress {
    type Err = ParseMacError;

    /// Accepts six hex pairs separated uniformly by `:` or `-`, in any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseMacError(s.to_string());

        let sep = match s.as_bytes().get(2) {
            Some(b':') => ':',
            Some(b'-') => '-',
            _ => return Err(err()),
        };

        let mut octets = [0u8; 6];
        let mut parts = s.split(sep);
        for octet in octets.iter_mut() {
            let part = parts.next().ok_or_else(err)?;
            if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(err());
            }
            *octet = u8::from_str_radix(part, 16).map_err(|_| err())?;
        }
        if parts.next().is_some() {
            return Err(err());
        }

        Ok(Self(octets))
    }
}

impl TryFrom<String> for MacAddress {
    type Error = ParseMacError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MacAddress> for String {
    fn from(value: MacAddress) -> Self {
        value.to_string()
    }
}

/// Persistent per-host provisioning state, keyed by `hwa`.
///
/// Fields are declared in alphabetical order so the serialized document keeps
/// sorted keys at every level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRecord {
    #[serde(default)]
    pub hostname: Option<String>,

    pub hwa: MacAddress,

    /// OS image to install. Older stores call this field `img`.
    #[serde(default, alias = "img")]
    pub image: Option<String>,

    /// Whether the host is eligible for automated install and PXE config
    #[serde(default)]
    pub managed: bool,

    /// Default PXE boot-menu label
    #[serde(default)]
    pub pxe_default: Option<String>,
}

impl HostRecord {
    /// A freshly seen host: unmanaged, nothing assigned.
    pub fn new(hwa: MacAddress) -> Self {
        Self {
            hostname: None,
            hwa,
            image: None,
            managed: false,
            pxe_default: None,
        }
    }

    /// The value substituted for `placeholder`, or `None` when the field is unset.
    pub fn field_value(&self, placeholder: Placeholder) -> Option<String> {
        match placeholder {
            Placeholder::Hwa => Some(self.hwa.to_string()),
            Placeholder::Image => self.image.clone(),
            Placeholder::Hostname => self.hostname.clone(),
            Placeholder::Managed => Some(self.managed.to_string()),
            Placeholder::PxeDefault => self.pxe_default.clone(),
        }
    }
}

/// Closed set of template placeholders, one per `HostRecord` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placeholder {
    Hwa,
    Image,
    Hostname,
    Managed,
    PxeDefault,
}

impl Placeholder {
    pub const ALL: [Placeholder; 5] = [
        Placeholder::Hwa,
        Placeholder::Image,
        Placeholder::Hostname,
        Placeholder::Managed,
        Placeholder::PxeDefault,
    ];

    /// Name of the `HostRecord` field this placeholder stands for
    pub fn field_name(self) -> &'static str {
        match self {
            Placeholder::Hwa => "hwa",
            Placeholder::Image => "image",
            Placeholder::Hostname => "hostname",
            Placeholder::Managed => "managed",
            Placeholder::PxeDefault => "pxe_default",
        }
    }

    /// Literal token as it appears in a template, e.g. `___PXE_DEFAULT___`
    pub fn token(self) -> String {
        format!(
            "{PLACEHOLDER_DELIMITER}{}{PLACEHOLDER_DELIMITER}",
            self.field_name().to_uppercase()
        )
    }
}

/// Partial update of a `HostRecord` submitted through the management API.
///
/// An absent field is left untouched; an explicit `null` clears an optional field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostUpdate {
    #[serde(default, alias = "img", deserialize_with = "present")]
    pub image: Option<Option<String>>,

    #[serde(default, deserialize_with = "present")]
    pub hostname: Option<Option<String>>,

    #[serde(default)]
    pub managed: Option<bool>,

    #[serde(default, deserialize_with = "present")]
    pub pxe_default: Option<Option<String>>,
}

/// Distinguishes an explicit `null` (`Some(None)`) from an absent field (`None`).
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl HostUpdate {
    /// Apply to `record`. Returns true if any field changed.
    pub fn apply(&self, record: &mut HostRecord) -> bool {
        let before = record.clone();

        if let Some(image) = &self.image {
            record.image = image.clone();
        }
        if let Some(hostname) = &self.hostname {
            record.hostname = hostname.clone();
        }
        if let Some(managed) = self.managed {
            record.managed = managed;
        }
        if let Some(pxe_default) = &self.pxe_default {
            record.pxe_default = pxe_default.clone();
        }

        *record != before
    }
}
