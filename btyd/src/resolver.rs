use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use shared::types::MacAddress;
use crate::config::ResolverConfig;

/// Resolves network addresses to hardware addresses by querying the
/// neighbour (ARP) table through an external tool, `arp -a <ip>` by default.
#[derive(Debug, Clone)]
pub struct AddressResolver {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl AddressResolver {
    pub fn new(config: &ResolverConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            timeout: config.timeout(),
        }
    }

    /// Look up the hardware address for `address`.
    ///
    /// Returns `None` when the address is empty, the table has no entry, or the
    /// lookup tool fails or exceeds its timeout. These cases are not told apart.
    pub async fn resolve(&self, address: &str) -> Option<MacAddress> {
        let address = address.trim();
        if address.is_empty() {
            return None;
        }

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(address)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                tracing::warn!("Failed to run {} for {}: {}", self.program, address, e);
                return None;
            }
            Err(_) => {
                tracing::warn!(
                    "{} timed out after {:?} resolving {}",
                    self.program,
                    self.timeout,
                    address
                );
                return None;
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let hwa = parse_hwa(&stdout);
        if hwa.is_none() {
            tracing::debug!("No hardware address for {} in {:?}", address, stdout);
        }
        hwa
    }
}

/// Returns the first whitespace-separated token in `output` that is a MAC
/// address with a uniform `:` or `-` separator, in canonical form.
pub fn parse_hwa(output: &str) -> Option<MacAddress> {
    output
        .split_whitespace()
        .map(|token| token.trim_matches(|c: char| !c.is_ascii_hexdigit()))
        .find_map(|token| token.parse::<MacAddress>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver(program: &str, args: &[&str], timeout_ms: u64) -> AddressResolver {
        AddressResolver::new(&ResolverConfig {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            timeout_ms,
        })
    }

    #[test]
    fn test_parse_arp_output() {
        let hwa = parse_hwa("? (10.0.0.5) at aa:bb:cc:11:22:33 [ether] on eth0").unwrap();
        assert_eq!(hwa.to_string(), "AA:BB:CC:11:22:33");
    }

    #[test]
    fn test_parse_accepts_any_case_and_separator() {
        for line in [
            "10.0.0.5 dev eth0 lladdr AA:BB:CC:11:22:33 REACHABLE",
            "  10.0.0.5            aa-bb-cc-11-22-33     dynamic",
            "host (10.0.0.5) at Aa:bB:Cc:11:22:33",
        ] {
            assert_eq!(
                parse_hwa(line).map(|h| h.to_string()).as_deref(),
                Some("AA:BB:CC:11:22:33"),
                "line: {line:?}"
            );
        }
    }

    #[test]
    fn test_parse_takes_first_match() {
        let out = "a (10.0.0.5) at 00:00:00:00:00:01 [ether] on eth0\n\
                   b (10.0.0.5) at 00:00:00:00:00:02 [ether] on eth1\n";
        assert_eq!(parse_hwa(out).unwrap().to_string(), "00:00:00:00:00:01");
    }

    #[test]
    fn test_parse_no_match() {
        assert!(parse_hwa("").is_none());
        assert!(parse_hwa("? (10.0.0.5) at <incomplete> on eth0").is_none());
        assert!(parse_hwa("10.0.0.5 (10.0.0.5) -- no entry").is_none());
        assert!(parse_hwa("aa:bb-cc:11:22:33").is_none());
    }

    #[tokio::test]
    async fn test_resolve_empty_address() {
        let resolver = resolver("echo", &["aa:bb:cc:11:22:33"], 1000);
        assert!(resolver.resolve("").await.is_none());
        assert!(resolver.resolve("   ").await.is_none());
    }

    #[tokio::test]
    async fn test_resolve_via_command() {
        let resolver = resolver("echo", &["? (10.0.0.5) at aa:bb:cc:11:22:33 [ether] on eth0"], 1000);
        let hwa = resolver.resolve("10.0.0.5").await.unwrap();
        assert_eq!(hwa.to_string(), "AA:BB:CC:11:22:33");
    }

    #[tokio::test]
    async fn test_resolve_missing_program() {
        let resolver = resolver("/nonexistent/bty-arp", &[], 1000);
        assert!(resolver.resolve("10.0.0.5").await.is_none());
    }

    #[tokio::test]
    async fn test_resolve_times_out() {
        // GNU sleep adds up its arguments, so the appended address only lengthens the wait
        let resolver = resolver("sleep", &["5"], 50);
        assert!(resolver.resolve("1").await.is_none());
    }
}
