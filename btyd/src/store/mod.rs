pub mod file;
pub mod hash;

use std::collections::BTreeMap;
use shared::types::{HostRecord, MacAddress};

/// All known hosts keyed by hardware address; iteration order is sorted.
pub type Hosts = BTreeMap<MacAddress, HostRecord>;
