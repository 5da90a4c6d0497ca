//! A scripted concentrator simulator.
//!
//! Implements the [`Concentrator`] trait with a manually advanced clock so
//! unit and integration tests (and the `--sim` mode) can drive the whole
//! station without hardware. Time never advances on its own: tests call
//! [`SimConcentrator::tick`].

use crate::phy::airtime;
use crate::ral::chanplan::ChipConfig;
use crate::ral::hal::{Concentrator, HalError, Modulation, RxPacket, TxPacket, TxStatus};
use rand::Rng;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// RSSI reported for frequencies without a scripted level.
const QUIET_RSSI_DBM: f32 = -120.0;

pub struct SimConcentrator {
    started: bool,
    config: Option<ChipConfig>,
    now_us: u32,
    session: u16,
    rx_queue: VecDeque<RxPacket>,
    in_flight: Option<TxPacket>,
    sent: Vec<TxPacket>,
    pps: Option<u32>,
    gps_enabled: bool,
    gps_toggles: u32,
    channel_rssi: HashMap<u32, f32>,
    rx_busy_until: Option<u32>,
    fail_next_send: bool,
}

impl Default for SimConcentrator {
    fn default() -> Self {
        Self::new()
    }
}

impl SimConcentrator {
    pub fn new() -> Self {
        SimConcentrator {
            started: false,
            config: None,
            now_us: 0,
            session: 1,
            rx_queue: VecDeque::new(),
            in_flight: None,
            sent: Vec::new(),
            pps: None,
            gps_enabled: true,
            gps_toggles: 0,
            channel_rssi: HashMap::new(),
            rx_busy_until: None,
            fail_next_send: false,
        }
    }

    /// Advances the simulated radio counter.
    pub fn tick(&mut self, delta_us: u32) {
        self.now_us = self.now_us.wrapping_add(delta_us);
    }

    pub fn now_us(&self) -> u32 {
        self.now_us
    }

    /// Queues a packet for the next `receive` poll, stamped at the current
    /// counter unless the packet carries its own.
    pub fn push_rx(&mut self, mut pkt: RxPacket) {
        if pkt.count_us == 0 {
            pkt.count_us = self.now_us;
        }
        self.rx_queue.push_back(pkt);
    }

    /// Latches a PPS edge at the given counter value.
    pub fn latch_pps(&mut self, count_us: u32) {
        self.pps = Some(count_us);
    }

    /// Scripts the RSSI the next CCA scans will observe on a frequency.
    pub fn set_channel_rssi(&mut self, freq_hz: u32, rssi_dbm: f32) {
        self.channel_rssi.insert(freq_hz, rssi_dbm);
    }

    /// Scripts an ongoing reception ending at `count_us`.
    pub fn set_rx_busy_until(&mut self, count_us: Option<u32>) {
        self.rx_busy_until = count_us;
    }

    /// Makes the next `send` fail with a hardware error.
    pub fn fail_next_send(&mut self) {
        self.fail_next_send = true;
    }

    /// Simulates a slave restart: new session id, counter resets.
    pub fn restart(&mut self) {
        self.session = self.session.wrapping_add(1);
        self.now_us = 0;
        self.pps = None;
        self.in_flight = None;
    }

    pub fn gps_toggle_count(&self) -> u32 {
        self.gps_toggles
    }

    pub fn gps_enabled(&self) -> bool {
        self.gps_enabled
    }

    /// Transmissions that completed emission.
    pub fn sent(&self) -> &[TxPacket] {
        &self.sent
    }

    pub fn chip_config(&self) -> Option<&ChipConfig> {
        self.config.as_ref()
    }

    fn airtime_of(pkt: &TxPacket) -> u32 {
        match pkt.modulation {
            Modulation::Lora { sf, bw_khz } => {
                airtime::lora_airtime_us(sf, bw_khz, pkt.payload.len()) as u32
            }
            Modulation::Fsk => airtime::fsk_airtime_us(pkt.payload.len()) as u32,
        }
    }

    fn settle_tx(&mut self) {
        let emitted = match &self.in_flight {
            Some(pkt) => {
                let end = pkt.count_us.wrapping_add(Self::airtime_of(pkt));
                self.now_us.wrapping_sub(end) < u32::MAX / 2
            }
            None => false,
        };
        if emitted {
            let done = self.in_flight.take().unwrap();
            self.sent.push(done);
        }
    }
}

impl Concentrator for SimConcentrator {
    fn start(&mut self, config: &ChipConfig) -> Result<(), HalError> {
        self.started = true;
        self.config = Some(config.clone());
        Ok(())
    }

    fn stop(&mut self) -> Result<(), HalError> {
        self.started = false;
        Ok(())
    }

    fn receive(&mut self) -> Result<Vec<RxPacket>, HalError> {
        Ok(self.rx_queue.drain(..).collect())
    }

    fn send(&mut self, pkt: TxPacket) -> Result<(), HalError> {
        if self.fail_next_send {
            self.fail_next_send = false;
            return Err(HalError::Spi);
        }
        if self.in_flight.is_some() {
            return Err(HalError::TxBusy);
        }
        self.in_flight = Some(pkt);
        Ok(())
    }

    fn tx_status(&mut self, _rf_chain: u8) -> Result<TxStatus, HalError> {
        self.settle_tx();
        match &self.in_flight {
            None => Ok(TxStatus::Free),
            Some(pkt) if self.now_us.wrapping_sub(pkt.count_us) < u32::MAX / 2 => {
                Ok(TxStatus::Emitting)
            }
            Some(_) => Ok(TxStatus::Scheduled),
        }
    }

    fn abort_tx(&mut self, _rf_chain: u8) -> Result<(), HalError> {
        self.in_flight = None;
        Ok(())
    }

    fn instcnt(&mut self) -> Result<u32, HalError> {
        Ok(self.now_us)
    }

    fn pps_latch(&mut self) -> Result<Option<u32>, HalError> {
        Ok(self.pps)
    }

    fn rssi_scan(&mut self, freq_hz: u32, _scan_time_us: u32) -> Result<f32, HalError> {
        let base = self
            .channel_rssi
            .get(&freq_hz)
            .copied()
            .unwrap_or(QUIET_RSSI_DBM);
        let noise: f32 = rand::thread_rng().gen_range(-0.5..0.5);
        Ok(base + noise)
    }

    fn set_gps_enable(&mut self, enabled: bool) -> Result<(), HalError> {
        if enabled != self.gps_enabled {
            self.gps_toggles += 1;
        }
        self.gps_enabled = enabled;
        Ok(())
    }

    fn session_id(&mut self) -> Result<u16, HalError> {
        Ok(self.session)
    }

    fn rx_busy_until(&mut self) -> Result<Option<u32>, HalError> {
        Ok(self.rx_busy_until)
    }
}

/// A cloneable handle to a [`SimConcentrator`] so a test can keep
/// scripting the radio after handing ownership to the RAL.
#[derive(Clone, Default)]
pub struct SharedSim {
    inner: Arc<Mutex<SimConcentrator>>,
}

impl SharedSim {
    pub fn new() -> Self {
        SharedSim {
            inner: Arc::new(Mutex::new(SimConcentrator::new())),
        }
    }

    /// Runs a closure against the underlying simulator.
    pub fn with<R>(&self, f: impl FnOnce(&mut SimConcentrator) -> R) -> R {
        f(&mut self.inner.lock().unwrap())
    }
}

impl Concentrator for SharedSim {
    fn start(&mut self, config: &ChipConfig) -> Result<(), HalError> {
        self.inner.lock().unwrap().start(config)
    }

    fn stop(&mut self) -> Result<(), HalError> {
        self.inner.lock().unwrap().stop()
    }

    fn receive(&mut self) -> Result<Vec<RxPacket>, HalError> {
        self.inner.lock().unwrap().receive()
    }

    fn send(&mut self, pkt: TxPacket) -> Result<(), HalError> {
        self.inner.lock().unwrap().send(pkt)
    }

    fn tx_status(&mut self, rf_chain: u8) -> Result<TxStatus, HalError> {
        self.inner.lock().unwrap().tx_status(rf_chain)
    }

    fn abort_tx(&mut self, rf_chain: u8) -> Result<(), HalError> {
        self.inner.lock().unwrap().abort_tx(rf_chain)
    }

    fn instcnt(&mut self) -> Result<u32, HalError> {
        self.inner.lock().unwrap().instcnt()
    }

    fn pps_latch(&mut self) -> Result<Option<u32>, HalError> {
        self.inner.lock().unwrap().pps_latch()
    }

    fn rssi_scan(&mut self, freq_hz: u32, scan_time_us: u32) -> Result<f32, HalError> {
        self.inner.lock().unwrap().rssi_scan(freq_hz, scan_time_us)
    }

    fn set_gps_enable(&mut self, enabled: bool) -> Result<(), HalError> {
        self.inner.lock().unwrap().set_gps_enable(enabled)
    }

    fn session_id(&mut self) -> Result<u16, HalError> {
        self.inner.lock().unwrap().session_id()
    }

    fn rx_busy_until(&mut self) -> Result<Option<u32>, HalError> {
        self.inner.lock().unwrap().rx_busy_until()
    }
}
