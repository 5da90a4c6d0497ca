//! The downlink job queue.
//!
//! Jobs are totally ordered by effective transmit xtime, ties broken by
//! priority (higher first) then arrival order. Capacity is bounded; on
//! overflow the oldest lowest-priority job is evicted so the reactor never
//! grows without bound.

use crate::constants::MAX_DNQUEUE;
use crate::phy::Eui;
use crate::s2e::msg::DeviceClass;
use std::cmp::Ordering;

/// The RX2 (or otherwise alternative) transmission window of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AltWindow {
    pub dr: u8,
    pub freq_hz: u32,
    pub xtime: i64,
}

/// One pending downlink.
#[derive(Debug, Clone, PartialEq)]
pub struct TxJob {
    pub diid: i64,
    pub dev_eui: Eui,
    pub class: DeviceClass,
    pub payload: Vec<u8>,
    pub dr: u8,
    pub freq_hz: u32,
    /// Effective transmit xtime of the primary window.
    pub xtime: i64,
    pub rx2: Option<AltWindow>,
    pub priority: u8,
    pub rctx: i64,
    pub gpstime: Option<i64>,
    pub seq: u64,
}

impl TxJob {
    fn order_key(&self) -> (i64, std::cmp::Reverse<u8>, u64) {
        (self.xtime, std::cmp::Reverse(self.priority), self.seq)
    }

    /// Demotes the job to its alternative window, if it has one.
    pub fn demote(mut self) -> Option<TxJob> {
        let alt = self.rx2.take()?;
        self.dr = alt.dr;
        self.freq_hz = alt.freq_hz;
        self.xtime = alt.xtime;
        Some(self)
    }
}

#[derive(Debug, Default)]
pub struct TxQueue {
    jobs: Vec<TxJob>,
    next_seq: u64,
}

impl TxQueue {
    pub fn new() -> Self {
        TxQueue::default()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Inserts a job in order. Returns the evicted job when the bounded
    /// capacity overflows.
    pub fn insert(&mut self, mut job: TxJob) -> Option<TxJob> {
        job.seq = self.next_seq;
        self.next_seq += 1;
        let key = job.order_key();
        let idx = self
            .jobs
            .partition_point(|j| j.order_key().cmp(&key) == Ordering::Less);
        self.jobs.insert(idx, job);
        if self.jobs.len() <= MAX_DNQUEUE {
            return None;
        }
        // Evict the oldest job of the lowest priority present.
        let min_prio = self.jobs.iter().map(|j| j.priority).min().unwrap();
        let victim = self
            .jobs
            .iter()
            .enumerate()
            .filter(|(_, j)| j.priority == min_prio)
            .min_by_key(|(_, j)| j.seq)
            .map(|(i, _)| i)
            .unwrap();
        Some(self.jobs.remove(victim))
    }

    /// Re-inserts a deferred job without assigning a new arrival number.
    pub fn reinsert(&mut self, job: TxJob) {
        let key = job.order_key();
        let idx = self
            .jobs
            .partition_point(|j| j.order_key().cmp(&key) == Ordering::Less);
        self.jobs.insert(idx, job);
    }

    /// Earliest effective transmit time in the queue.
    pub fn next_xtime(&self) -> Option<i64> {
        self.jobs.first().map(|j| j.xtime)
    }

    /// Pops the earliest job whose window opens within `slack_us` of
    /// `now_xtime`.
    pub fn pop_due(&mut self, now_xtime: i64, slack_us: u64) -> Option<TxJob> {
        let due = self.jobs.first()?.xtime - slack_us as i64 <= now_xtime;
        due.then(|| self.jobs.remove(0))
    }

    /// Drops a job the LNS rescinded.
    pub fn drop_diid(&mut self, diid: i64) -> Option<TxJob> {
        let idx = self.jobs.iter().position(|j| j.diid == diid)?;
        Some(self.jobs.remove(idx))
    }

    /// Drops everything (session teardown). Returns the number of jobs
    /// discarded.
    pub fn clear(&mut self) -> usize {
        let n = self.jobs.len();
        self.jobs.clear();
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(diid: i64, xtime: i64, priority: u8) -> TxJob {
        TxJob {
            diid,
            dev_eui: Eui(diid as u64),
            class: DeviceClass::A,
            payload: vec![0; 8],
            dr: 0,
            freq_hz: 868_100_000,
            xtime,
            rx2: None,
            priority,
            rctx: 0,
            gpstime: None,
            seq: 0,
        }
    }

    #[test]
    fn ordered_by_time_then_priority_then_arrival() {
        let mut q = TxQueue::new();
        q.insert(job(1, 3000, 0));
        q.insert(job(2, 1000, 0));
        q.insert(job(3, 1000, 5));
        q.insert(job(4, 1000, 5));
        assert_eq!(q.pop_due(10_000, 0).unwrap().diid, 3);
        assert_eq!(q.pop_due(10_000, 0).unwrap().diid, 4);
        assert_eq!(q.pop_due(10_000, 0).unwrap().diid, 2);
        assert_eq!(q.pop_due(10_000, 0).unwrap().diid, 1);
    }

    #[test]
    fn pop_due_respects_slack() {
        let mut q = TxQueue::new();
        q.insert(job(1, 100_000, 0));
        assert!(q.pop_due(50_000, 10_000).is_none());
        assert!(q.pop_due(90_000, 10_000).is_some());
    }

    #[test]
    fn overflow_evicts_oldest_lowest_priority() {
        let mut q = TxQueue::new();
        for i in 0..MAX_DNQUEUE as i64 {
            let prio = if i == 3 { 0 } else { 1 };
            assert!(q.insert(job(i, 1000 + i, prio)).is_none());
        }
        let evicted = q.insert(job(999, 5, 7)).unwrap();
        assert_eq!(evicted.diid, 3);
        assert_eq!(q.len(), MAX_DNQUEUE);
    }

    #[test]
    fn drop_by_diid() {
        let mut q = TxQueue::new();
        q.insert(job(10, 1000, 0));
        q.insert(job(11, 2000, 0));
        assert!(q.drop_diid(10).is_some());
        assert!(q.drop_diid(10).is_none());
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn demote_moves_to_rx2() {
        let mut j = job(1, 1000, 0);
        j.rx2 = Some(AltWindow {
            dr: 0,
            freq_hz: 869_525_000,
            xtime: 2000,
        });
        let d = j.demote().unwrap();
        assert_eq!(d.freq_hz, 869_525_000);
        assert_eq!(d.xtime, 2000);
        assert!(d.rx2.is_none());
        assert!(d.demote().is_none());
    }
}
