//! Per-session frame statistics.
//!
//! Counters reset with the session; the summary line is logged on
//! teardown so operators can spot filter misconfiguration and parse-error
//! storms without debug logging.

/// Counters for one LNS session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    /// Rx jobs delivered by the RAL.
    pub rx_received: u64,
    /// Uplinks forwarded to the LNS.
    pub rx_forwarded: u64,
    /// Frames dropped for PHY parse errors (length, major version).
    pub rx_parse_dropped: u64,
    /// Frames dropped by the JoinEUI/NetID filters.
    pub rx_filtered: u64,
    /// Mirror frames merged into a richer duplicate.
    pub rx_merged: u64,
    /// Downlink jobs received from the LNS.
    pub dn_received: u64,
    /// Downlinks confirmed transmitted.
    pub dn_sent: u64,
    /// Downlinks reported failed.
    pub dn_failed: u64,
}

impl SessionStats {
    pub fn summary(&self) -> String {
        format!(
            "rx {}/{} fwd (parse-drop {}, filtered {}, merged {}), dn {}/{} ok ({} failed)",
            self.rx_forwarded,
            self.rx_received,
            self.rx_parse_dropped,
            self.rx_filtered,
            self.rx_merged,
            self.dn_sent,
            self.dn_received,
            self.dn_failed,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_mentions_every_counter() {
        let s = SessionStats {
            rx_received: 10,
            rx_forwarded: 7,
            rx_parse_dropped: 1,
            rx_filtered: 2,
            rx_merged: 1,
            dn_received: 4,
            dn_sent: 3,
            dn_failed: 1,
        };
        let line = s.summary();
        assert!(line.contains("7/10"));
        assert!(line.contains("3/4"));
    }
}
