/// Route serving the bootstrap script to a booting host
pub const BOOTSTRAP_PATH: &str = "/bootstrap";

/// Management routes
pub const MANAGE_PATH: &str = "/manage";
pub const MANAGE_DIGEST_PATH: &str = "/manage/digest";
pub const MANAGE_HOST_PATH: &str = "/manage/hosts/:hwa";

/// Delimiter wrapped around upper-cased field names in templates, e.g. `___HOSTNAME___`
pub const PLACEHOLDER_DELIMITER: &str = "___";

/// PXELINUX looks up `01-<mac>`: ARP hardware type 1 (Ethernet) followed by
/// the lowercase, hyphen-separated MAC address.
pub const PXE_FILENAME_PREFIX: &str = "01-";

/// Default template file names
pub const INSTALL_TEMPLATE: &str = "bootstrap.sh";
pub const CANCEL_TEMPLATE: &str = "bootstrap_cancel.sh";
pub const PXE_TEMPLATE: &str = "pxeconfig.tmpl";
